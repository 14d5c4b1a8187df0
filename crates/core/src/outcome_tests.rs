// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::request::JobRequest;

#[yare::parameterized(
    succeeded = { ExecStatus::Succeeded, "succeeded" },
    non_zero  = { ExecStatus::FailedNonZeroExit, "failed_non_zero_exit" },
    timed_out = { ExecStatus::TimedOut, "timed_out" },
    oom       = { ExecStatus::MemoryExceeded, "memory_exceeded" },
    stage     = { ExecStatus::StageError, "stage_error" },
    internal  = { ExecStatus::InternalError, "internal_error" },
)]
fn status_serializes_snake_case(status: ExecStatus, wire: &str) {
    assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{}\"", wire));
    assert_eq!(status.to_string(), wire);
}

#[test]
fn envelope_copies_request_identity() {
    let req = JobRequest::builder().request_id("r42").function_id("fn-a").build();
    let outcome = ExecOutcome {
        status: ExecStatus::Succeeded,
        exit_code: Some(0),
        stdout: "hello\n".into(),
        stderr: String::new(),
        duration_ms: 12,
        peak_memory_bytes: 1024,
        outputs: vec![OutputEntry {
            path: "out.txt".into(),
            size: 6,
            locator: "results/r42/out.txt".into(),
        }],
    };
    let envelope = ResultEnvelope::new(&req, outcome);
    assert_eq!(envelope.request_id, RequestId::new("r42"));
    assert_eq!(envelope.function_id, FunctionId::new("fn-a"));
    assert_eq!(envelope.channel("fx:result:"), "fx:result:r42");
}

#[test]
fn envelope_wire_format_uses_snake_keys() {
    let req = JobRequest::builder().build();
    let envelope =
        ResultEnvelope::new(&req, ExecOutcome::failed_before_exec(ExecStatus::StageError, "gone"));
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["status"], "stage_error");
    assert_eq!(json["exit_code"], serde_json::Value::Null);
    assert_eq!(json["stderr"], "gone");
    assert!(json.get("peak_memory_bytes").is_some());
}

#[test]
fn failed_before_exec_has_no_process_fields() {
    let outcome = ExecOutcome::failed_before_exec(ExecStatus::InternalError, "boom");
    assert_eq!(outcome.exit_code, None);
    assert_eq!(outcome.duration_ms, 0);
    assert!(outcome.outputs.is_empty());
}
