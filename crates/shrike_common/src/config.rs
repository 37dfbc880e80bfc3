use serde::{Deserialize, Serialize};

/// Per-store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Cache sizing; the dirty budget bounds unflushed mutation bytes before
/// a commit forces a serializer flush.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cache size in bytes.
    pub max_size: u64,
    /// Maximum unflushed dirty bytes before commits flush inline.
    pub max_dirty_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1024 * 1024 * 1024,      // 1 GiB
            max_dirty_size: 512 * 1024 * 1024, // 512 MiB
        }
    }
}

impl StoreConfig {
    /// A small configuration that flushes on every commit; used by tests
    /// that want durability without dirty-budget slack.
    pub fn durable_for_tests() -> StoreConfig {
        StoreConfig {
            cache: CacheConfig {
                max_size: 16 * 1024 * 1024,
                max_dirty_size: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment_sizing() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.max_size, 1 << 30);
        assert_eq!(cfg.max_dirty_size, 512 << 20);
    }
}
