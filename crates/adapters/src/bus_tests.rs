// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn publish_records_channel_and_payload() {
    let bus = FakeBus::new();
    bus.publish("fx:result:r1", b"{\"status\":\"succeeded\"}").await.unwrap();
    let published = bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "fx:result:r1");
}

#[tokio::test]
async fn scripted_failures_then_recovery() {
    let bus = FakeBus::new();
    bus.fail_next(2);
    assert!(bus.publish("c", b"x").await.is_err());
    assert!(bus.publish("c", b"x").await.is_err());
    assert!(bus.publish("c", b"x").await.is_ok());
    assert_eq!(bus.published().len(), 1);
}
