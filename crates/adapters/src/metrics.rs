// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metrics sink adapter.
//!
//! The agent reports a small fixed set of series: peak memory per function
//! and exit-status counts. Sinks must never fail the caller; a metric that
//! cannot be delivered is dropped.

/// Outbound metrics surface.
pub trait MetricsSink: Send + Sync {
    fn gauge(&self, name: &'static str, value: f64, tags: &[(&'static str, &str)]);
    fn counter(&self, name: &'static str, tags: &[(&'static str, &str)]);
}

/// Production sink: structured `tracing` events under the `fx::metrics`
/// target, picked up by the log pipeline.
#[derive(Clone, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }

    fn render_tags(tags: &[(&'static str, &str)]) -> String {
        tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
    }
}

impl MetricsSink for TracingSink {
    fn gauge(&self, name: &'static str, value: f64, tags: &[(&'static str, &str)]) {
        tracing::info!(target: "fx::metrics", metric = name, value, tags = %Self::render_tags(tags), kind = "gauge");
    }

    fn counter(&self, name: &'static str, tags: &[(&'static str, &str)]) {
        tracing::info!(target: "fx::metrics", metric = name, tags = %Self::render_tags(tags), kind = "counter");
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSink, MetricCall};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum MetricCall {
        Gauge { name: &'static str, value: f64, tags: Vec<(String, String)> },
        Counter { name: &'static str, tags: Vec<(String, String)> },
    }

    /// Recording metrics double.
    #[derive(Clone, Default)]
    pub struct FakeSink {
        calls: Arc<Mutex<Vec<MetricCall>>>,
    }

    impl FakeSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<MetricCall> {
            self.calls.lock().clone()
        }

        /// Count of counter emissions for `name` with a matching tag value.
        pub fn counter_count(&self, name: &str, tag: (&str, &str)) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| match c {
                    MetricCall::Counter { name: n, tags } => {
                        *n == name && tags.iter().any(|(k, v)| k == tag.0 && v == tag.1)
                    }
                    _ => false,
                })
                .count()
        }
    }

    impl MetricsSink for FakeSink {
        fn gauge(&self, name: &'static str, value: f64, tags: &[(&'static str, &str)]) {
            self.calls.lock().push(MetricCall::Gauge {
                name,
                value,
                tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            });
        }

        fn counter(&self, name: &'static str, tags: &[(&'static str, &str)]) {
            self.calls.lock().push(MetricCall::Counter {
                name,
                tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            });
        }
    }
}
