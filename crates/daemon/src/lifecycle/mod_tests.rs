// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fx_adapters::FakeDaemon;

#[tokio::test]
async fn preflight_passes_with_live_daemon() {
    let daemon = FakeDaemon::new();
    assert!(preflight(&daemon).await.is_ok());
}

#[tokio::test]
async fn preflight_fails_when_daemon_is_down() {
    let daemon = FakeDaemon::new();
    daemon.set_ping_ok(false);
    let err = preflight(&daemon).await.unwrap_err();
    assert!(matches!(err, StartupError::Daemon(ContainerError::DaemonUnavailable(_))));
}

#[test]
fn config_errors_convert_to_startup_errors() {
    let config_err = crate::config::AgentConfig::from_toml("not = valid = toml").unwrap_err();
    let startup_err: StartupError = config_err.into();
    assert!(matches!(startup_err, StartupError::Config(_)));
}
