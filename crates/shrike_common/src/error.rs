use thiserror::Error;

/// Convenience alias for `Result<T, ShrikeError>`.
pub type ShrikeResult<T> = Result<T, ShrikeError>;

/// Error classification for propagation decisions.
///
/// - `Interrupted`        — cooperative cancellation; scoped resources have
///   been unwound and the caller may retry or give up
/// - `Fatal`              — serializer I/O failure or on-disk corruption;
///   the cluster layer should quarantine the store
/// - `ContractViolation`  — a precondition a caller was required to uphold
///   (region/arity/metainfo); debug-asserted, recoverable in release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Interrupted,
    Fatal,
    ContractViolation,
}

/// Top-level error type that all crate-specific errors convert into.
#[derive(Error, Debug)]
pub enum ShrikeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Storage adapter errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The interruptor fired while this operation was suspended.
    #[error("operation interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corruption: {0}")]
    Corruption(#[from] CodecError),

    /// The caller's expected metainfo disagrees with the persisted map.
    #[error("metainfo mismatch over {domain}")]
    MetainfoMismatch { domain: String },
}

/// Query routing contract violations.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("region mismatch: {context}")]
    RegionMismatch { context: String },

    #[error("arity mismatch: expected {expected} responses, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("region map invariant violated: {0}")]
    InvariantViolated(String),
}

/// Decode failures for metainfo encodings, backfill frames, and the
/// serializer file format.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("negative buffer size: {0}")]
    NegativeSize(i64),

    #[error("varint overflow")]
    VarintOverflow,

    #[error("unknown bound mode byte: {0:#04x}")]
    BadBoundMode(u8),

    #[error("unknown chunk tag: {0:#04x}")]
    BadChunkTag(u8),

    #[error("key length {0} exceeds limit")]
    KeyTooLong(usize),

    #[error("malformed region encoding: {0}")]
    BadRegion(String),

    #[error("bad file magic")]
    BadMagic,

    #[error("unsupported format version: {0}")]
    BadVersion(u32),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("snapshot decode: {0}")]
    Snapshot(String),
}

impl ShrikeError {
    /// Classify this error for propagation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShrikeError::Store(StoreError::Interrupted) => ErrorKind::Interrupted,
            ShrikeError::Store(StoreError::MetainfoMismatch { .. }) => {
                ErrorKind::ContractViolation
            }
            ShrikeError::Store(_) => ErrorKind::Fatal,
            ShrikeError::Codec(_) => ErrorKind::Fatal,
            ShrikeError::Routing(_) => ErrorKind::ContractViolation,
            ShrikeError::Internal(_) => ErrorKind::ContractViolation,
        }
    }

    /// True if this error is the interruptor firing.
    pub fn is_interrupted(&self) -> bool {
        matches!(self.kind(), ErrorKind::Interrupted)
    }

    /// True if the store should be quarantined.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal)
    }

    /// True if a caller broke a routing/metainfo precondition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::ContractViolation)
    }
}
