// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! At-least-once behavior: infra failures keep messages alive.

use crate::prelude::*;
use fx_adapters::ExecResult;
use std::time::Duration;

#[tokio::test]
async fn saturated_pool_executes_some_and_keeps_the_rest() {
    let p = Pipeline::new(|config| {
        config.warm_pool.python_size = 2;
        config.limits.max_in_flight = Some(2);
        config.sqs.visibility_timeout_seconds = 1;
    });
    p.store.seed(CODE_BUCKET, "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));
    // Two long-running jobs occupy both slots past the rent deadline.
    for _ in 0..2 {
        p.daemon.queue_exec_matching_delayed(
            "python3",
            ExecResult {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::ZERO,
            },
            Duration::from_secs(30),
        );
    }

    for i in 0..10 {
        p.queue.push(job_body(&format!("s{}", i), "python", "k.zip", 2_000, 128));
    }
    let run = p.start();

    // While both permits are held, the other eight messages stay queued
    // and undeleted.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(p.queue.deleted().is_empty());
    assert_eq!(p.queue.pending_len(), 8);

    // As the long jobs hit their budget and free capacity, the rest
    // execute; every message ends deleted exactly once, none lost.
    wait_until(|| p.queue.deleted().len() == 10).await;
    assert_eq!(p.bus.published().len(), 10);
    assert_eq!(p.queue.pending_len(), 0);

    p.stop(run).await;
}

#[tokio::test]
async fn publish_failure_leaves_message_for_redelivery() {
    let p = Pipeline::new(|_| {});
    p.store.seed(CODE_BUCKET, "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));
    p.bus.fail_next(3);

    p.queue.push(job_body("b1", "python", "k.zip", 5_000, 128));
    let run = p.start();

    wait_until(|| {
        p.sink.calls().iter().any(|c| matches!(
            c,
            fx_adapters::MetricCall::Counter { name: "publish_failure", .. }
        ))
    })
    .await;

    // Exactly-one-terminal-publish per delete: zero publishes, zero deletes.
    assert!(p.bus.published().is_empty());
    assert!(p.queue.deleted().is_empty());

    // After redelivery (simulated by pushing the same body again with the
    // bus healthy), the job publishes and deletes normally.
    p.queue.push(job_body("b1", "python", "k.zip", 5_000, 128));
    wait_until(|| !p.queue.deleted().is_empty()).await;
    let (channel, envelope) = p.envelope(0);
    assert_eq!(channel, "fx:result:b1");
    assert_eq!(envelope["status"], "succeeded");

    p.stop(run).await;
}

#[tokio::test]
async fn visibility_heartbeat_runs_while_job_is_active() {
    let p = Pipeline::new(|config| {
        config.sqs.visibility_timeout_seconds = 3;
    });
    p.store.seed(CODE_BUCKET, "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));
    p.daemon.queue_exec_matching_delayed(
        "python3",
        ExecResult {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        },
        Duration::from_millis(1_500),
    );

    let msg = p.queue.push(job_body("h1", "python", "k.zip", 10_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let extensions = p.queue.extensions();
    assert!(!extensions.is_empty());
    assert!(extensions.iter().all(|(handle, timeout)| {
        *handle == msg.receipt_handle && *timeout == Duration::from_secs(3)
    }));

    p.stop(run).await;
}
