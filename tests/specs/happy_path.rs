// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end success paths.

use crate::prelude::*;
use fx_adapters::ExecResult;
use std::time::Duration;

#[tokio::test]
async fn python_job_round_trips_stdout_and_outputs() {
    let p = Pipeline::new(|_| {});
    p.store.seed(
        CODE_BUCKET,
        "k.zip",
        &zip_bytes(&[("main.py", b"print('hello')\nopen('output/out.txt','w').write('data!')")]),
    );
    p.daemon.queue_exec_matching(
        "python3",
        ExecResult {
            exit_code: Some(0),
            stdout: "hello\n".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(12),
        },
    );
    // The program wrote one artifact into its output directory.
    p.daemon.seed_file("ctr-0001", "/workspace-root/r1/output/out.txt", b"data!");

    p.queue.push(job_body("r1", "python", "k.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (channel, envelope) = p.envelope(0);
    assert_eq!(channel, "fx:result:r1");
    assert_eq!(envelope["status"], "succeeded");
    assert_eq!(envelope["exit_code"], 0);
    assert_eq!(envelope["stdout"], "hello\n");
    assert_eq!(envelope["outputs"][0]["path"], "out.txt");
    assert_eq!(envelope["outputs"][0]["size"], 5);
    assert_eq!(envelope["outputs"][0]["locator"], "results/r1/out.txt");

    // Round-trip: the stored object holds the exact bytes.
    assert_eq!(p.store.object(DATA_BUCKET, "results/r1/out.txt").unwrap(), b"data!");

    p.stop(run).await;
}

#[tokio::test]
async fn non_zero_exit_still_harvests_outputs() {
    let p = Pipeline::new(|_| {});
    p.store.seed(CODE_BUCKET, "k.zip", &zip_bytes(&[("main.py", b"raise SystemExit(3)")]));
    p.daemon.queue_exec_matching(
        "python3",
        ExecResult {
            exit_code: Some(3),
            stdout: String::new(),
            stderr: "SystemExit: 3\n".to_string(),
            duration: Duration::from_millis(4),
        },
    );
    p.daemon.seed_file("ctr-0001", "/workspace-root/r2/output/partial.txt", b"kept");

    p.queue.push(job_body("r2", "python", "k.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    assert_eq!(envelope["status"], "failed_non_zero_exit");
    assert_eq!(envelope["exit_code"], 3);
    // Failed execution, but produced outputs are still delivered.
    assert_eq!(envelope["outputs"][0]["path"], "partial.txt");

    p.stop(run).await;
}

#[tokio::test]
async fn nodejs_bundle_dispatches_through_descriptor_table() {
    let p = Pipeline::new(|_| {});
    p.store.seed(CODE_BUCKET, "js.zip", &zip_bytes(&[("index.js", b"console.log('ok')")]));
    p.daemon.queue_exec_matching(
        "node",
        ExecResult {
            exit_code: Some(0),
            stdout: "ok\n".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(3),
        },
    );

    p.queue.push(job_body("r3", "nodejs", "js.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| !p.queue.deleted().is_empty()).await;

    let (_, envelope) = p.envelope(0);
    assert_eq!(envelope["status"], "succeeded");
    assert_eq!(envelope["stdout"], "ok\n");

    p.stop(run).await;
}

#[tokio::test]
async fn same_request_id_twice_publishes_twice() {
    let p = Pipeline::new(|config| {
        config.warm_pool.python_size = 2;
    });
    p.store.seed(CODE_BUCKET, "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));

    p.queue.push(job_body("dup", "python", "k.zip", 5_000, 128));
    p.queue.push(job_body("dup", "python", "k.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| p.queue.deleted().len() == 2).await;

    // Both executions proceed; idempotency is the consumer's job.
    let channels = p.bus.channels();
    assert_eq!(channels.len(), 2);
    assert!(channels.iter().all(|c| c == "fx:result:dup"));

    p.stop(run).await;
}

#[tokio::test]
async fn workspace_is_cleaned_before_slot_reuse() {
    let p = Pipeline::new(|config| {
        config.warm_pool.python_size = 1;
    });
    p.store.seed(CODE_BUCKET, "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));

    p.queue.push(job_body("a1", "python", "k.zip", 5_000, 128));
    let run = p.start();
    wait_until(|| p.queue.deleted().len() == 1).await;

    p.queue.push(job_body("a2", "python", "k.zip", 5_000, 128));
    wait_until(|| p.queue.deleted().len() == 2).await;

    // One container served both jobs, and neither workspace survives its
    // job's return.
    assert_eq!(p.daemon.container_count(), 1);
    let creates = p
        .daemon
        .calls()
        .iter()
        .filter(|c| matches!(c, fx_adapters::DaemonCall::Create { .. }))
        .count();
    assert_eq!(creates, 1);
    let files = p.daemon.files_of("ctr-0001");
    assert!(!files.iter().any(|f| f.starts_with("/workspace-root/a1/")));
    assert!(!files.iter().any(|f| f.starts_with("/workspace-root/a2/")));

    p.stop(run).await;
}
