//! Order tokens: issue-order stamps threaded through operations so the
//! engine can verify it observes them in the order they were issued.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing stamp with a call-site label.
///
/// Ordering and equality consider only the bucket; the tag exists for
/// diagnostics.
#[derive(Clone, Copy)]
pub struct OrderToken {
    bucket: u64,
    tag: &'static str,
}

impl OrderToken {
    /// A token that order checkpoints accept unconditionally.
    pub const IGNORE: OrderToken = OrderToken {
        bucket: 0,
        tag: "ignore",
    };

    pub fn bucket(&self) -> u64 {
        self.bucket
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn is_ignore(&self) -> bool {
        self.bucket == 0
    }
}

impl PartialEq for OrderToken {
    fn eq(&self, other: &Self) -> bool {
        self.bucket == other.bucket
    }
}

impl Eq for OrderToken {}

impl PartialOrd for OrderToken {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderToken {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.bucket.cmp(&other.bucket)
    }
}

impl fmt::Debug for OrderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderToken({}@{})", self.bucket, self.tag)
    }
}

/// Mints order tokens in strictly increasing bucket order.
#[derive(Debug)]
pub struct OrderSource {
    next: AtomicU64,
}

impl OrderSource {
    pub fn new() -> OrderSource {
        OrderSource {
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next token, stamped with a call-site label.
    pub fn check_in(&self, tag: &'static str) -> OrderToken {
        OrderToken {
            bucket: self.next.fetch_add(1, Ordering::SeqCst),
            tag,
        }
    }
}

impl Default for OrderSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_mint_in_increasing_order() {
        let source = OrderSource::new();
        let a = source.check_in("first");
        let b = source.check_in("second");
        assert!(a < b);
        assert!(!a.is_ignore());
    }

    #[test]
    fn test_ignore_token_sorts_first() {
        let source = OrderSource::new();
        let a = source.check_in("op");
        assert!(OrderToken::IGNORE < a);
        assert!(OrderToken::IGNORE.is_ignore());
    }

    #[test]
    fn test_equality_ignores_tag() {
        let a = OrderToken {
            bucket: 5,
            tag: "x",
        };
        let b = OrderToken {
            bucket: 5,
            tag: "y",
        };
        assert_eq!(a, b);
    }
}
