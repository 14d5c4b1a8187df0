// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for pipeline specs.

use fx_adapters::{FakeBus, FakeDaemon, FakeQueue, FakeSink, FakeStore};
use fx_core::TestClock;
use fx_daemon::dispatch::FatalError;
use fx_daemon::{AgentConfig, AgentContext, Dispatcher, WarmPool};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const CODE_BUCKET: &str = "fx-code";
pub const DATA_BUCKET: &str = "fx-user-data";

pub struct Pipeline {
    pub dispatcher: Dispatcher<TestClock>,
    pub queue: FakeQueue,
    pub store: FakeStore,
    pub bus: FakeBus,
    pub daemon: FakeDaemon,
    pub sink: FakeSink,
    pub shutdown: CancellationToken,
    _tmp: tempfile::TempDir,
}

impl Pipeline {
    pub fn new(configure: impl FnOnce(&mut AgentConfig)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AgentConfig::for_tests(tmp.path().to_path_buf());
        config.warm_pool.max_uses = 0;
        config.warm_pool.max_age_secs = 0;
        config.sqs.visibility_timeout_seconds = 2;
        configure(&mut config);
        let config = Arc::new(config);

        let queue = FakeQueue::new();
        let store = FakeStore::new();
        let bus = FakeBus::new();
        let daemon = FakeDaemon::new();
        let sink = FakeSink::new();
        let clock = TestClock::new();

        let ctx = AgentContext {
            config: config.clone(),
            queue: Arc::new(queue.clone()),
            store: Arc::new(store.clone()),
            bus: Arc::new(bus.clone()),
            daemon: Arc::new(daemon.clone()),
            metrics: Arc::new(sink.clone()),
            clock: clock.clone(),
        };
        let pool = WarmPool::new(ctx.daemon.clone(), config, clock);
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(ctx, pool, shutdown.clone());
        Self { dispatcher, queue, store, bus, daemon, sink, shutdown, _tmp: tmp }
    }

    /// Run the dispatcher in the background until [`Self::stop`].
    pub fn start(&self) -> tokio::task::JoinHandle<Result<(), FatalError>> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await })
    }

    pub async fn stop(&self, run: tokio::task::JoinHandle<Result<(), FatalError>>) {
        self.shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    /// First published envelope, parsed.
    pub fn envelope(&self, index: usize) -> (String, serde_json::Value) {
        let (channel, payload) = self.bus.published().remove(index);
        (channel, serde_json::from_slice(&payload).unwrap())
    }
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Queue message body in the §6 wire format.
pub fn job_body(request_id: &str, runtime: &str, key: &str, timeout_ms: u64, memory_mb: u64) -> String {
    format!(
        r#"{{"requestId":"{}","functionId":"fn-{}","runtime":"{}","s3Bucket":"{}","s3Key":"{}","timeoutMs":{},"memoryMb":{}}}"#,
        request_id, request_id, runtime, CODE_BUCKET, key, timeout_ms, memory_mb
    )
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..600 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 6s");
}
