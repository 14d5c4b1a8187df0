// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Only the connection-level knobs are overridable by environment: the AWS
//! region, the queue URL, and the bus host/port. Everything else comes from
//! the config file.

/// AWS region override (`FX_AWS_REGION`).
pub fn aws_region() -> Option<String> {
    std::env::var("FX_AWS_REGION").ok().filter(|s| !s.is_empty())
}

/// Queue URL override (`FX_SQS_QUEUE_URL`).
pub fn sqs_queue_url() -> Option<String> {
    std::env::var("FX_SQS_QUEUE_URL").ok().filter(|s| !s.is_empty())
}

/// Bus host override (`FX_REDIS_HOST`).
pub fn redis_host() -> Option<String> {
    std::env::var("FX_REDIS_HOST").ok().filter(|s| !s.is_empty())
}

/// Bus port override (`FX_REDIS_PORT`).
pub fn redis_port() -> Option<u16> {
    std::env::var("FX_REDIS_PORT").ok().and_then(|s| s.parse().ok())
}
