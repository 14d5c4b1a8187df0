// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeouts, OOM kills, bad archives, invalid intake, output floods.

use crate::prelude::*;
use fx_adapters::ExecResult;
use fx_core::{ELISION_MARKER, STREAM_CAP_BYTES};
use std::time::Duration;

fn ok_after(delay: Duration) -> (ExecResult, Duration) {
    (
        ExecResult {
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        },
        delay,
    )
}

#[tokio::test]
async fn go_job_past_budget_is_timed_out_and_slot_replaced() {
    let p = Pipeline::new(|config| {
        config.warm_pool.go_size = 1;
    });
    p.store.seed(
        CODE_BUCKET,
        "sleep.zip",
        &zip_bytes(&[("main.go", b"package main"), ("run.sh", b"go run main.go")]),
    );
    let (result, delay) = ok_after(Duration::from_secs(60));
    p.daemon.queue_exec_matching_delayed("bash", result, delay);

    p.queue.push(job_body("g1", "go", "sleep.zip", 1_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    assert_eq!(envelope["status"], "timed_out");
    assert!(envelope["duration_ms"].as_u64().unwrap() >= 1_000);
    // The dirty slot is destroyed rather than reused.
    wait_until(|| p.daemon.container_count() == 0).await;

    p.stop(run).await;
}

#[tokio::test]
async fn cpp_allocation_past_cap_reports_memory_exceeded() {
    let p = Pipeline::new(|_| {});
    p.store.seed(
        CODE_BUCKET,
        "mem.zip",
        &zip_bytes(&[("main.cpp", b"int main(){}"), ("run.sh", b"g++ main.cpp && ./a.out")]),
    );
    p.daemon.set_stats_rss(80 * 1024 * 1024);
    p.daemon.queue_exec_matching_delayed(
        "bash",
        ExecResult {
            exit_code: Some(137),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        },
        Duration::from_millis(600),
    );

    p.queue.push(job_body("c1", "cpp", "mem.zip", 10_000, 64));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    assert_eq!(envelope["status"], "memory_exceeded");
    assert!(envelope["peak_memory_bytes"].as_u64().unwrap() >= 64 * 1024 * 1024);
    // The memory cap came from the request.
    assert!(p.daemon.calls().iter().any(|c| matches!(
        c,
        fx_adapters::DaemonCall::SetMemory { memory_mb: 64, .. }
    )));

    p.stop(run).await;
}

#[tokio::test]
async fn traversal_archive_fails_staging_without_touching_containers() {
    let p = Pipeline::new(|_| {});
    p.store.seed(
        CODE_BUCKET,
        "evil.zip",
        &zip_bytes(&[("../../etc/passwd", b"root:x:0:0::/root:/bin/sh")]),
    );

    p.queue.push(job_body("e1", "python", "evil.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    assert_eq!(envelope["status"], "stage_error");
    assert!(envelope["stderr"].as_str().unwrap().contains("escapes"));
    assert_eq!(p.daemon.container_count(), 0);

    p.stop(run).await;
}

#[tokio::test]
async fn runtime_mismatch_is_stage_error() {
    let p = Pipeline::new(|_| {});
    p.store.seed(CODE_BUCKET, "js.zip", &zip_bytes(&[("index.js", b"console.log(1)")]));

    p.queue.push(job_body("m1", "python", "js.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    assert_eq!(envelope["status"], "stage_error");
    assert!(envelope["stderr"].as_str().unwrap().contains("mismatch"));

    p.stop(run).await;
}

#[tokio::test]
async fn stdout_flood_is_capped_with_elision_marker() {
    let p = Pipeline::new(|_| {});
    p.store.seed(CODE_BUCKET, "loud.zip", &zip_bytes(&[("main.py", b"print('x'*10485760)")]));
    let flood = "x".repeat(10 * 1024 * 1024);
    p.daemon.queue_exec_matching(
        "python3",
        ExecResult {
            exit_code: Some(0),
            stdout: flood,
            stderr: String::new(),
            duration: Duration::from_millis(50),
        },
    );

    p.queue.push(job_body("f1", "python", "loud.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    let stdout = envelope["stdout"].as_str().unwrap();
    assert!(stdout.starts_with(ELISION_MARKER));
    assert_eq!(stdout.len(), ELISION_MARKER.len() + STREAM_CAP_BYTES);

    p.stop(run).await;
}

#[tokio::test]
async fn zero_timeout_is_rejected_at_intake() {
    let p = Pipeline::new(|_| {});
    p.queue.push(job_body("z1", "python", "k.zip", 0, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (channel, envelope) = p.envelope(0);
    assert_eq!(channel, "fx:result:z1");
    assert_eq!(envelope["status"], "internal_error");
    // No container work happened.
    assert_eq!(p.daemon.container_count(), 0);

    p.stop(run).await;
}
