// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object store adapter: code-bundle download and artifact upload.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },
    #[error("object too large: s3://{bucket}/{key} is {size} bytes (cap {cap})")]
    TooLarge { bucket: String, key: String, size: u64, cap: u64 },
    #[error("object store transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download an object to `dest`, failing with [`StoreError::TooLarge`]
    /// before transferring a body bigger than `max_bytes`.
    /// Returns the number of bytes written.
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<u64, StoreError>;

    /// Upload a host file to `bucket`/`key`.
    async fn put(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StoreError>;
}

/// AWS S3 binding.
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(
        &self,
        bucket: &str,
        key: &str,
        dest: &Path,
        max_bytes: u64,
    ) -> Result<u64, StoreError> {
        use tokio::io::AsyncWriteExt;

        let result = self.client.get_object().bucket(bucket).key(key).send().await;
        let mut object = match result {
            Ok(object) => object,
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                return Err(if not_found {
                    StoreError::NotFound { bucket: bucket.to_string(), key: key.to_string() }
                } else {
                    StoreError::Transport(err.to_string())
                });
            }
        };

        if let Some(len) = object.content_length {
            if len as u64 > max_bytes {
                return Err(StoreError::TooLarge {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    size: len as u64,
                    cap: max_bytes,
                });
            }
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StoreError::Transport(format!("create {}: {}", dest.display(), e)))?;
        let mut written: u64 = 0;
        while let Some(chunk) = object
            .body
            .try_next()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
        {
            written += chunk.len() as u64;
            // Content-length can lie; enforce the cap on actual bytes too.
            if written > max_bytes {
                return Err(StoreError::TooLarge {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    size: written,
                    cap: max_bytes,
                });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| StoreError::Transport(format!("write {}: {}", dest.display(), e)))?;
        }
        file.flush()
            .await
            .map_err(|e| StoreError::Transport(format!("flush {}: {}", dest.display(), e)))?;
        Ok(written)
    }

    async fn put(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StoreError> {
        let body = aws_sdk_s3::primitives::ByteStream::from_path(src)
            .await
            .map_err(|e| StoreError::Transport(format!("read {}: {}", src.display(), e)))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeStore;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct Inner {
        objects: HashMap<(String, String), Vec<u8>>,
        fail_put_keys: Vec<String>,
        puts: Vec<(String, String)>,
    }

    /// In-memory object store double.
    #[derive(Clone, Default)]
    pub struct FakeStore {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, bucket: &str, key: &str, bytes: &[u8]) {
            self.inner
                .lock()
                .objects
                .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        }

        /// Make subsequent puts to `key` fail with a transport error.
        pub fn fail_put_key(&self, key: &str) {
            self.inner.lock().fail_put_keys.push(key.to_string());
        }

        pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
            self.inner.lock().objects.get(&(bucket.to_string(), key.to_string())).cloned()
        }

        /// (bucket, key) pairs in upload order.
        pub fn puts(&self) -> Vec<(String, String)> {
            self.inner.lock().puts.clone()
        }
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn get(
            &self,
            bucket: &str,
            key: &str,
            dest: &Path,
            max_bytes: u64,
        ) -> Result<u64, StoreError> {
            let bytes = self
                .inner
                .lock()
                .objects
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?;
            if bytes.len() as u64 > max_bytes {
                return Err(StoreError::TooLarge {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    size: bytes.len() as u64,
                    cap: max_bytes,
                });
            }
            std::fs::write(dest, &bytes)
                .map_err(|e| StoreError::Transport(format!("write {}: {}", dest.display(), e)))?;
            Ok(bytes.len() as u64)
        }

        async fn put(&self, bucket: &str, key: &str, src: &Path) -> Result<(), StoreError> {
            {
                let inner = self.inner.lock();
                if inner.fail_put_keys.iter().any(|k| key.contains(k.as_str())) {
                    return Err(StoreError::Transport(format!("scripted put failure: {}", key)));
                }
            }
            let bytes = std::fs::read(src)
                .map_err(|e| StoreError::Transport(format!("read {}: {}", src.display(), e)))?;
            let mut inner = self.inner.lock();
            inner.puts.push((bucket.to_string(), key.to_string()));
            inner.objects.insert((bucket.to_string(), key.to_string()), bytes);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
