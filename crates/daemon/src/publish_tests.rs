// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fx_adapters::{FakeBus, FakeSink, MetricCall};
use fx_core::{ExecOutcome, ExecStatus, JobRequest};

fn publisher(bus: FakeBus, sink: FakeSink) -> ResultPublisher {
    let config = Arc::new(AgentConfig::for_tests(std::env::temp_dir()));
    ResultPublisher::new(Arc::new(bus), Arc::new(sink), config)
}

fn envelope(request: &JobRequest, status: ExecStatus) -> ResultEnvelope {
    ResultEnvelope::new(request, ExecOutcome::failed_before_exec(status, "reason"))
}

#[tokio::test]
async fn publishes_on_request_channel() {
    let bus = FakeBus::new();
    let publisher = publisher(bus.clone(), FakeSink::new());
    let request = JobRequest::builder().request_id("r7").build();

    publisher.publish(&envelope(&request, ExecStatus::Succeeded)).await.unwrap();

    assert_eq!(bus.channels(), vec!["fx:result:r7".to_string()]);
    let (_, payload) = &bus.published()[0];
    let parsed: serde_json::Value = serde_json::from_slice(payload).unwrap();
    assert_eq!(parsed["request_id"], "r7");
    assert_eq!(parsed["status"], "succeeded");
}

#[tokio::test(start_paused = true)]
async fn retries_transient_failures_with_backoff() {
    let bus = FakeBus::new();
    bus.fail_next(2);
    let publisher = publisher(bus.clone(), FakeSink::new());
    let request = JobRequest::builder().build();

    publisher.publish(&envelope(&request, ExecStatus::Succeeded)).await.unwrap();
    assert_eq!(bus.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_three_attempts() {
    let bus = FakeBus::new();
    bus.fail_next(3);
    let publisher = publisher(bus.clone(), FakeSink::new());
    let request = JobRequest::builder().build();

    let err = publisher.publish(&envelope(&request, ExecStatus::Succeeded)).await.unwrap_err();
    assert!(matches!(err, PublishError::Transport(_)));
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn reports_gauge_and_counter() {
    let sink = FakeSink::new();
    let publisher = publisher(FakeBus::new(), sink.clone());
    let request = JobRequest::builder().function_id("fn-9").build();

    let mut env = envelope(&request, ExecStatus::TimedOut);
    env.peak_memory_bytes = 2048;
    publisher.report(&request, &env);

    let calls = sink.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        MetricCall::Gauge { name: "function_peak_memory_bytes", value, tags }
            if *value == 2048.0
                && tags.contains(&("function_id".to_string(), "fn-9".to_string()))
                && tags.contains(&("runtime".to_string(), "python".to_string()))
    )));
    assert_eq!(sink.counter_count("function_exit", ("status", "timed_out")), 1);
}
