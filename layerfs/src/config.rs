/// How the batch allocator reserves superblock blocks for a checkpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocStrategy {
    /// One contiguous run for every secondary layer. Fails if no run is large enough.
    Contiguous,
    /// One block at a time, wherever space is found.
    Scattered,
}

/// Options used when formatting or mounting a forest.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ForestConfig {
    /// Superblock reservation strategy
    pub strategy:           AllocStrategy,
    /// Priority given to superblock pages queued for write-back
    pub writeback_priority: u8,
}

impl ForestConfig {
    /// Returns a copy of this config using a different allocation strategy.
    #[cfg(feature = "stable")]
    pub fn with_strategy(mut self, strategy: AllocStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        ForestConfig {
            strategy:           AllocStrategy::Contiguous,
            writeback_priority: 1,
        }
    }
}
