//! Lock timeout policy.

use serde::{Deserialize, Serialize};

/// Lease timeout bounds applied to every client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// TTL used when the client passes no timeout (or a non-positive one).
    pub default_timeout_ms: u64,
    /// Clamp floor for client-supplied timeouts.
    pub min_timeout_ms: u64,
    /// Clamp ceiling for client-supplied timeouts.
    pub max_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            min_timeout_ms: 1_000,
            max_timeout_ms: 300_000,
        }
    }
}

impl LockConfig {
    /// Normalize a client-supplied timeout: non-positive values fall back to
    /// the default, everything else is clamped into `[min, max]`.
    pub fn normalize_timeout(&self, requested_ms: i64) -> u64 {
        if requested_ms <= 0 {
            return self.default_timeout_ms;
        }
        (requested_ms as u64).clamp(self.min_timeout_ms, self.max_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_uses_default() {
        let config = LockConfig::default();
        assert_eq!(config.normalize_timeout(0), 30_000);
        assert_eq!(config.normalize_timeout(-5), 30_000);
    }

    #[test]
    fn clamps_to_bounds() {
        let config = LockConfig::default();
        assert_eq!(config.normalize_timeout(10), 1_000);
        assert_eq!(config.normalize_timeout(5_000), 5_000);
        assert_eq!(config.normalize_timeout(10_000_000), 300_000);
    }
}
