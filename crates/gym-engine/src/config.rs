//! # Engine Configuration
//!
//! Knobs for the stock ledger and the background sweeps.
//!
//! ```rust
//! use std::time::Duration;
//! use gym_engine::EngineConfig;
//!
//! let config = EngineConfig::default()
//!     .max_attempts(5)
//!     .store_timeout(Duration::from_secs(2));
//! assert_eq!(config.max_attempts, 5);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Conditional-write attempts before giving up with
    /// `ConcurrentModification`.
    pub max_attempts: u32,

    /// Upper bound on any single store call.
    pub store_timeout: Duration,

    /// Page size used when sweeping expired memberships.
    pub sweep_batch_size: u32,

    /// Page size used when scanning for stale sales.
    pub reconcile_batch_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_attempts: 3,
            store_timeout: Duration::from_secs(5),
            sweep_batch_size: 200,
            reconcile_batch_size: 100,
        }
    }
}

impl EngineConfig {
    /// Sets conditional-write attempts (at least 1).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn sweep_batch_size(mut self, size: u32) -> Self {
        self.sweep_batch_size = size.max(1);
        self
    }

    pub fn reconcile_batch_size(mut self, size: u32) -> Self {
        self.reconcile_batch_size = size.max(1);
        self
    }
}
