//! Bulk Loading Configuration

use serde::{Deserialize, Serialize};

/// How the bulk loader fetches related objects.
///
/// The mode is an explicit external switch, never inferred from result-set
/// cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStrategy {
    /// Separate key-set queries against the junction and target sources
    Naive,
    /// One query joining the target to a sub-query over the junction
    Optimized,
}

/// Configuration for bulk association loading
#[derive(Debug, Clone, PartialEq)]
pub struct BulkLoadConfig {
    /// Fetch strategy
    pub strategy: LoadStrategy,

    /// Upper bound on the number of keys per key-set query
    pub chunk_size: usize,
}

impl Default for BulkLoadConfig {
    fn default() -> Self {
        Self {
            strategy: LoadStrategy::Naive,
            chunk_size: 512,
        }
    }
}

impl BulkLoadConfig {
    /// Select the fetch strategy
    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bound the number of keys per key-set query
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}
