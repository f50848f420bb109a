use std::time::Duration;

/// Tunables for the chat core.
///
/// The defaults are what the services ship with; embedders override fields
/// as needed before wiring the services up.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Upper bound on any single store call
    pub store_timeout: Duration,

    /// Total attempts for a store call failing transiently (1 = no retry)
    pub store_attempts: u32,

    /// First retry delay; doubles per attempt
    pub retry_base_delay: Duration,

    /// Ceiling for the backoff curve
    pub retry_max_delay: Duration,

    /// Pause before re-opening a dropped change feed
    pub resubscribe_delay: Duration,

    /// Shard count of the direct-pair lock table
    pub pair_lock_shards: usize,

    /// Page size for message listing when the caller passes none
    pub default_message_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            store_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
            resubscribe_delay: Duration::from_millis(500),
            pair_lock_shards: 64,
            default_message_limit: 100,
        }
    }
}
