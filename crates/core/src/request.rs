// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound job request model.
//!
//! A [`JobRequest`] is the parsed body of one queue message. It is immutable
//! after receipt; `request_id` doubles as the idempotency key for result
//! publication.

use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable request identifier, assigned by the submitting tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of the function whose bundle is being executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub String);

impl FunctionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Object-store location of a code bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLocator {
    pub bucket: String,
    pub key: String,
}

/// One job, as received from the queue.
///
/// Wire format is the camelCase JSON of §6:
/// `{"requestId", "functionId", "runtime", "s3Bucket", "s3Key",
///   "timeoutMs", "memoryMb"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobRequest {
    pub request_id: RequestId,
    pub function_id: FunctionId,
    pub runtime: RuntimeKind,
    pub s3_bucket: String,
    pub s3_key: String,
    pub timeout_ms: u64,
    pub memory_mb: u64,
}

/// Intake validation failures. These never reach execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("timeoutMs must be positive")]
    ZeroTimeout,
    #[error("memoryMb must be positive")]
    ZeroMemory,
    #[error("empty requestId")]
    EmptyRequestId,
    #[error("empty s3Key")]
    EmptyKey,
}

impl JobRequest {
    /// Validate budget and identity fields at intake.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.request_id.as_str().is_empty() {
            return Err(RequestError::EmptyRequestId);
        }
        if self.timeout_ms == 0 {
            return Err(RequestError::ZeroTimeout);
        }
        if self.memory_mb == 0 {
            return Err(RequestError::ZeroMemory);
        }
        if self.s3_key.is_empty() {
            return Err(RequestError::EmptyKey);
        }
        Ok(())
    }

    pub fn bundle(&self) -> BundleLocator {
        BundleLocator { bucket: self.s3_bucket.clone(), key: self.s3_key.clone() }
    }
}

/// Test builder: a minimal valid python request, with setters for the
/// fields specs actually vary.
#[cfg(any(test, feature = "test-support"))]
pub struct JobRequestBuilder {
    request: JobRequest,
}

#[cfg(any(test, feature = "test-support"))]
impl JobRequest {
    pub fn builder() -> JobRequestBuilder {
        JobRequestBuilder {
            request: JobRequest {
                request_id: RequestId::new("req-test"),
                function_id: FunctionId::new("fn-test"),
                runtime: RuntimeKind::Python,
                s3_bucket: "code-bucket".to_string(),
                s3_key: "bundle.zip".to_string(),
                timeout_ms: 5_000,
                memory_mb: 128,
            },
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobRequestBuilder {
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request.request_id = RequestId::new(id);
        self
    }

    pub fn function_id(mut self, id: impl Into<String>) -> Self {
        self.request.function_id = FunctionId::new(id);
        self
    }

    pub fn runtime(mut self, runtime: RuntimeKind) -> Self {
        self.request.runtime = runtime;
        self
    }

    pub fn s3_key(mut self, key: impl Into<String>) -> Self {
        self.request.s3_key = key.into();
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request.timeout_ms = timeout_ms;
        self
    }

    pub fn memory_mb(mut self, memory_mb: u64) -> Self {
        self.request.memory_mb = memory_mb;
        self
    }

    pub fn build(self) -> JobRequest {
        self.request
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
