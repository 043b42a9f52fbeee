use std::collections::HashMap;
use std::time::Duration;

/// Batching knobs for the layer that wraps a session. The session itself never batches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchingConfig {
    /// Rows to accumulate before a batch is dispatched.
    pub max_batch: usize,
    pub max_delay: Duration,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch: 8,
            max_delay: Duration::from_millis(5),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Upper bound on devices to use per class, keyed by class name ("cpu", "gpu").
    pub device_count: HashMap<String, usize>,
    pub batching: Option<BatchingConfig>,
}

impl SessionOptions {
    pub fn with_device_count(mut self, class: &str, count: usize) -> Self {
        self.device_count.insert(class.to_ascii_lowercase(), count);
        self
    }

    pub fn with_batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = Some(batching);
        self
    }

    pub fn device_limit(&self, class: &str) -> Option<usize> {
        self.device_count
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(class))
            .map(|(_, v)| *v)
    }
}
