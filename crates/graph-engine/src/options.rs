//! Run configuration

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::node::StreamMode;

/// Default values for [`RunOptions`]
pub mod defaults {
    /// Concurrent initiators in parallel mode
    pub const MAX_PARALLELISM: usize = 4;
    /// Nesting limit for trigger propagation and data pulls
    pub const MAX_CALL_DEPTH: usize = 256;
    /// Iteration ceiling for condition-driven loops
    pub const LOOP_ITERATION_LIMIT: usize = 10_000;
}

/// How initiator nodes are launched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One after another, in declaration order
    #[default]
    Sequential,
    /// As concurrent tasks sharing the run's storage
    Parallel,
}

/// Options for a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    /// Upper bound on concurrently running initiators
    pub max_parallelism: usize,
    /// Maximum nesting of trigger propagation; exceeding it fails the run
    pub max_call_depth: usize,
    /// Stream mode for nodes that do not declare one
    pub stream_mode: StreamMode,
    /// Iteration ceiling for While / Do While / Repeat Until
    pub loop_iteration_limit: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            max_parallelism: defaults::MAX_PARALLELISM,
            max_call_depth: defaults::MAX_CALL_DEPTH,
            stream_mode: StreamMode::Sequential,
            loop_iteration_limit: defaults::LOOP_ITERATION_LIMIT,
        }
    }
}

impl RunOptions {
    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parallel mode with the given parallelism
    pub fn parallel(max_parallelism: usize) -> Self {
        Self::default()
            .with_mode(ExecutionMode::Parallel)
            .with_max_parallelism(max_parallelism)
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_stream_mode(mut self, stream_mode: StreamMode) -> Self {
        self.stream_mode = stream_mode;
        self
    }

    pub fn with_loop_iteration_limit(mut self, limit: usize) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    /// Whether initiators should be launched concurrently
    pub fn runs_in_parallel(&self) -> bool {
        self.mode == ExecutionMode::Parallel && self.max_parallelism > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.mode, ExecutionMode::Sequential);
        assert_eq!(options.max_call_depth, defaults::MAX_CALL_DEPTH);
        assert_eq!(options.stream_mode, StreamMode::Sequential);
        assert!(!options.runs_in_parallel());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let options = RunOptions::from_json(r#"{"mode": "parallel", "maxParallelism": 8}"#).unwrap();
        assert_eq!(options.mode, ExecutionMode::Parallel);
        assert_eq!(options.max_parallelism, 8);
        assert_eq!(options.loop_iteration_limit, defaults::LOOP_ITERATION_LIMIT);
        assert!(options.runs_in_parallel());
    }

    #[test]
    fn test_from_json_rejects_bad_mode() {
        assert!(RunOptions::from_json(r#"{"mode": "sideways"}"#).is_err());
    }

    #[test]
    fn test_parallelism_of_one_is_sequential() {
        assert!(!RunOptions::parallel(1).runs_in_parallel());
        assert_eq!(RunOptions::default().with_max_parallelism(0).max_parallelism, 1);
    }
}
