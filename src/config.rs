/// Read-only environment configuration consumed by [`crate::dispatcher`].
///
/// Constructed by the embedding engine and injected wherever it's needed;
/// nothing here is a process-wide static.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentConfig {
    pub gc_txn_acquire_timeout_ms: u64,
    pub env_txn_replay_timeout_ms: u64,
    pub max_simultaneous_transactions: u32,
}

impl EnvironmentConfig {
    pub fn new(
        gc_txn_acquire_timeout_ms: u64,
        env_txn_replay_timeout_ms: u64,
        max_simultaneous_transactions: u32,
    ) -> Self {
        Self {
            gc_txn_acquire_timeout_ms,
            env_txn_replay_timeout_ms,
            max_simultaneous_transactions,
        }
    }
}
