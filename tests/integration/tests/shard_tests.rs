//! Shard manager tests
//!
//! Run with: cargo test -p integration-tests --test shard_tests

use std::time::Duration;

use anyhow::Result;
use arke_gateway::{CloseCode, ConnectionState, GatewayError, OpCode, ShardManager};
use integration_tests::*;
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn test_shards_identify_one_slot_apart() -> Result<()> {
    let (transport, mut servers) = MockGatewayTransport::new();
    let (manager, mut events) = ShardManager::new(gateway_config(3), transport);
    let fleet = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    let mut live = Vec::new();
    for id in 0..3_u32 {
        let mut server = servers.next().await?;
        let identify = server.accept_identify(&format!("session-{id}")).await?;
        assert_eq!(identify.as_identify().unwrap().shard, Some([id, 3]));
        live.push(server);
    }

    for pair in live.windows(2) {
        assert!(pair[1].connected_at - pair[0].connected_at >= Duration::from_secs(5));
    }

    let mut ready = Vec::new();
    for _ in 0..3 {
        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "READY");
        ready.push(event.shard_id);
    }
    assert_eq!(ready, [0, 1, 2]);

    manager.shutdown_handle().shutdown();
    fleet.await??;
    for server in &mut live {
        assert_eq!(server.expect_close().await?, 1000);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_statuses_report_every_shard() -> Result<()> {
    let (transport, mut servers) = MockGatewayTransport::new();
    let (manager, _events) = ShardManager::new(gateway_config(2), transport);
    let fleet = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    let mut first = servers.next().await?;
    first.accept_identify("A").await?;
    let mut second = servers.next().await?;
    second.accept_identify("B").await?;
    second.dispatch("MESSAGE_CREATE", 1, json!({}));

    // Let both sessions drain their frames
    tokio::time::sleep(Duration::from_millis(10)).await;

    let statuses = manager.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[&0].state, ConnectionState::Connected);
    assert_eq!(statuses[&0].session_id.as_deref(), Some("A"));
    assert_eq!(statuses[&1].session_id.as_deref(), Some("B"));
    assert_eq!(statuses[&1].sequence, Some(1));

    manager.shutdown_handle().shutdown();
    fleet.await??;
    assert!(manager
        .statuses()
        .values()
        .all(|status| status.state == ConnectionState::Closed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fatal_close_stops_every_shard() -> Result<()> {
    let (transport, mut servers) = MockGatewayTransport::new();
    let (manager, _events) = ShardManager::new(gateway_config(2), transport.clone());
    let fleet = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    let mut healthy = servers.next().await?;
    healthy.accept_identify("A").await?;

    let mut failing = servers.next().await?;
    failing.hello(45_000);
    failing.expect_op(OpCode::Identify).await?;
    failing.close(CloseCode::AuthenticationFailed.as_u16());

    let result = fleet.await?;
    assert!(matches!(
        result,
        Err(GatewayError::FatalClose(CloseCode::AuthenticationFailed))
    ));
    assert_eq!(healthy.expect_close().await?, 1000);
    assert_eq!(transport.connect_count(), 2);
    assert!(servers.try_next().is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_shard_is_restarted() -> Result<()> {
    let mut config = gateway_config(1);
    config.max_reconnect_attempts = 0;
    let (transport, mut servers) = MockGatewayTransport::new();
    transport.refuse_next(1);
    let (manager, mut events) = ShardManager::new(config, transport.clone());
    let fleet = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    let mut server = servers.next().await?;
    server.accept_identify("restarted").await?;
    assert_eq!(transport.connect_count(), 2);

    let event = events.recv().await.unwrap();
    assert_eq!(event.shard_id, 0);
    assert_eq!(event.name, "READY");

    manager.shutdown_handle().shutdown();
    fleet.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_startup_skips_remaining_shards() -> Result<()> {
    let (transport, mut servers) = MockGatewayTransport::new();
    let (manager, _events) = ShardManager::new(gateway_config(4), transport.clone());
    let fleet = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run().await })
    };

    let mut first = servers.next().await?;
    first.accept_identify("A").await?;
    manager.shutdown_handle().shutdown();

    fleet.await??;
    assert_eq!(first.expect_close().await?, 1000);
    assert!(transport.connect_count() < 4);
    Ok(())
}
