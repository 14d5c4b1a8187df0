// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration.
//!
//! Loaded from a TOML file; the connection-level knobs (AWS region, queue
//! URL, bus host/port) can be overridden by environment (see [`crate::env`]).

use fx_core::RuntimeKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AwsConfig {
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqsConfig {
    pub queue_url: String,
    #[serde(default = "default_wait_time")]
    pub wait_time_seconds: u64,
    #[serde(default = "default_max_messages")]
    pub max_number_of_messages: u32,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    pub code_bucket: String,
    pub user_data_bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DockerConfig {
    pub python_image: Option<String>,
    pub cpp_image: Option<String>,
    pub nodejs_image: Option<String>,
    pub go_image: Option<String>,
    pub work_dir_root: String,
    pub default_timeout_ms: u64,
    pub output_mount_path: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            python_image: None,
            cpp_image: None,
            nodejs_image: None,
            go_image: None,
            work_dir_root: "/workspace-root".to_string(),
            default_timeout_ms: 30_000,
            output_mount_path: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WarmPoolConfig {
    pub enabled: bool,
    pub python_size: usize,
    pub cpp_size: usize,
    pub nodejs_size: usize,
    pub go_size: usize,
    /// Retire a slot after this many jobs (0 disables).
    pub max_uses: u32,
    /// Retire a slot after this age (0 disables).
    pub max_age_secs: u64,
    /// Interval of the idle liveness sweep.
    pub health_check_secs: u64,
}

impl Default for WarmPoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            python_size: 2,
            cpp_size: 1,
            nodejs_size: 1,
            go_size: 1,
            max_uses: 50,
            max_age_secs: 3600,
            health_check_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub result_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            result_prefix: "fx:result:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    pub enabled: bool,
    /// Host-side scratch root for harvested outputs.
    pub base_dir: Option<PathBuf>,
    pub s3_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { enabled: true, base_dir: None, s3_prefix: "results".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StageConfig {
    pub max_archive_bytes: u64,
    pub max_unpacked_bytes: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self { max_archive_bytes: 64 * 1024 * 1024, max_unpacked_bytes: 256 * 1024 * 1024 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Concurrent job cap. Defaults to the sum of warm pool sizes.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { dir: None, level: "info".to_string() }
    }
}

/// Root configuration for one agent process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub aws: AwsConfig,
    pub sqs: SqsConfig,
    pub s3: S3Config,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub warm_pool: WarmPoolConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub stage: StageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default = "default_task_base_dir")]
    pub task_base_dir: PathBuf,
}

fn default_wait_time() -> u64 {
    20
}
fn default_max_messages() -> u32 {
    10
}
fn default_visibility_timeout() -> u64 {
    120
}
fn default_task_base_dir() -> PathBuf {
    PathBuf::from("/tmp/fx-tasks")
}

impl AgentConfig {
    /// Load from a TOML file, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config = Self::from_toml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(region) = crate::env::aws_region() {
            self.aws.region = Some(region);
        }
        if let Some(url) = crate::env::sqs_queue_url() {
            self.sqs.queue_url = url;
        }
        if let Some(host) = crate::env::redis_host() {
            self.redis.host = host;
        }
        if let Some(port) = crate::env::redis_port() {
            self.redis.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sqs.queue_url.is_empty() {
            return Err(ConfigError::Invalid("sqs.queue_url is empty".into()));
        }
        if self.s3.code_bucket.is_empty() || self.s3.user_data_bucket.is_empty() {
            return Err(ConfigError::Invalid("s3 buckets must be configured".into()));
        }
        if self.warm_pool.enabled {
            if self.max_in_flight() == 0 {
                return Err(ConfigError::Invalid("all warm pool sizes are zero".into()));
            }
        } else if self.limits.max_in_flight.unwrap_or(0) == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_in_flight is required when warm_pool is disabled".into(),
            ));
        }
        if !self.docker.work_dir_root.starts_with('/') {
            return Err(ConfigError::Invalid("docker.work_dir_root must be absolute".into()));
        }
        Ok(())
    }

    /// Container image for a runtime: config override or the table default.
    pub fn image_for(&self, runtime: RuntimeKind) -> String {
        let override_ = match runtime {
            RuntimeKind::Python => &self.docker.python_image,
            RuntimeKind::Cpp => &self.docker.cpp_image,
            RuntimeKind::Nodejs => &self.docker.nodejs_image,
            RuntimeKind::Go => &self.docker.go_image,
        };
        override_.clone().unwrap_or_else(|| runtime.descriptor().default_image.to_string())
    }

    pub fn pool_size(&self, runtime: RuntimeKind) -> usize {
        if !self.warm_pool.enabled {
            return 0;
        }
        match runtime {
            RuntimeKind::Python => self.warm_pool.python_size,
            RuntimeKind::Cpp => self.warm_pool.cpp_size,
            RuntimeKind::Nodejs => self.warm_pool.nodejs_size,
            RuntimeKind::Go => self.warm_pool.go_size,
        }
    }

    /// Concurrent job cap: explicit limit, or the sum of pool sizes.
    pub fn max_in_flight(&self) -> usize {
        if let Some(explicit) = self.limits.max_in_flight {
            return explicit;
        }
        RuntimeKind::ALL.iter().map(|r| self.pool_size(*r)).sum()
    }

    /// In-container workspace for one request.
    pub fn workspace_path(&self, request_id: &str) -> String {
        format!("{}/{}", self.docker.work_dir_root.trim_end_matches('/'), request_id)
    }

    /// The longest wall-clock budget any job may run: the shutdown grace.
    pub fn largest_timeout_ms(&self) -> u64 {
        RuntimeKind::ALL
            .iter()
            .map(|r| r.descriptor().default_wall_clock_ms)
            .chain([self.docker.default_timeout_ms])
            .max()
            .unwrap_or(self.docker.default_timeout_ms)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl AgentConfig {
    /// Minimal valid config for tests.
    pub fn for_tests(task_base_dir: PathBuf) -> Self {
        let raw = r#"
            [sqs]
            queue_url = "https://sqs.test/queue/fx-jobs"

            [s3]
            code_bucket = "fx-code"
            user_data_bucket = "fx-user-data"
        "#;
        let mut config = Self::from_toml(raw).unwrap_or_else(|_| unreachable!("static test toml"));
        config.task_base_dir = task_base_dir;
        config
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
