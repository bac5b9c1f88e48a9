//! Gateway session tests against a scripted server
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arke_common::GatewayConfig;
use arke_gateway::{
    CloseCode, ConnectionState, Event, GatewayError, GatewayFrame, GatewaySession, IdentifyQueue,
    OpCode, ShardInfo,
};
use integration_tests::*;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Harness {
    servers: MockServers,
    transport: Arc<MockGatewayTransport>,
    events: mpsc::Receiver<Event>,
    status: tokio::sync::watch::Receiver<arke_gateway::SessionStatus>,
    shutdown: arke_gateway::ShutdownHandle,
    task: JoinHandle<Result<(), GatewayError>>,
}

fn start(config: GatewayConfig) -> Harness {
    let (transport, servers) = MockGatewayTransport::new();
    let (sender, events) = mpsc::channel(64);
    let queue = Arc::new(IdentifyQueue::from_config(&config));
    let session = GatewaySession::new(
        ShardInfo::new(0, 1),
        config,
        transport.clone(),
        queue,
        sender,
    );
    let status = session.status();
    let shutdown = session.shutdown_handle();
    let task = tokio::spawn(session.run());

    Harness {
        servers,
        transport,
        events,
        status,
        shutdown,
        task,
    }
}

#[tokio::test(start_paused = true)]
async fn test_resumable_close_resumes_with_stored_session() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    let identify = server.expect_op(OpCode::Identify).await?;
    assert_eq!(identify.as_identify().unwrap().token, TEST_TOKEN);
    server.ready(0, "S");
    server.dispatch("MESSAGE_CREATE", 1, json!({ "content": "hi" }));
    server.close(4000);

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    let resume = server.expect_frame().await?;
    assert_eq!(resume.op, OpCode::Resume, "expected Resume, got {resume}");
    let resume = resume.as_resume().unwrap();
    assert_eq!(resume.session_id, "S");
    assert_eq!(resume.seq, 1);

    server.dispatch("RESUMED", 2, json!({}));
    let mut status = harness.status.clone();
    status
        .wait_for(|s| s.state == ConnectionState::Connected && s.sequence == Some(2))
        .await?;

    let names: Vec<_> = [
        harness.events.recv().await.unwrap(),
        harness.events.recv().await.unwrap(),
        harness.events.recv().await.unwrap(),
    ]
    .into_iter()
    .map(|e| e.name)
    .collect();
    assert_eq!(names, ["READY", "MESSAGE_CREATE", "RESUMED"]);

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connection_resumes() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    server.dispatch("GUILD_CREATE", 4, json!({ "id": "1" }));
    server.drop_connection();

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    let resume = server.expect_op(OpCode::Resume).await?;
    assert_eq!(resume.as_resume().unwrap().seq, 4);

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missed_ack_reconnects_and_resumes() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.hello(1_000);
    server.expect_op(OpCode::Identify).await?;
    server.ready(0, "S");
    server.dispatch("MESSAGE_CREATE", 3, json!({}));

    // Never acknowledge: the first heartbeat goes unanswered
    assert_eq!(server.expect_heartbeat().await?, Some(3));
    let code = server.expect_close().await?;
    assert_ne!(code, 1000, "a zombied connection must stay resumable");
    assert_eq!(harness.status.borrow().session_id.as_deref(), Some("S"));

    let mut server = harness.servers.next().await?;
    server.hello(1_000);
    let resume = server.expect_op(OpCode::Resume).await?;
    let resume = resume.as_resume().unwrap();
    assert_eq!(resume.session_id, "S");
    assert_eq!(resume.seq, 3);

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_heartbeats_keep_connection() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.hello(1_000);
    server.expect_op(OpCode::Identify).await?;
    server.ready(0, "S");

    for _ in 0..5 {
        server.expect_heartbeat().await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.heartbeat_ack();
    }

    let mut status = harness.status.clone();
    status.wait_for(|s| s.latency.is_some()).await?;
    assert_eq!(status.borrow().latency, Some(Duration::from_millis(20)));
    assert_eq!(harness.transport.connect_count(), 1);
    assert!(harness.servers.try_next().is_none());

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_carries_latest_sequence() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.hello(1_000);
    server.expect_op(OpCode::Identify).await?;
    server.ready(0, "S");
    for seq in 1..=3 {
        server.dispatch("TYPING_START", seq, json!({}));
    }
    // An out-of-order sequence never moves the counter backwards
    server.dispatch("TYPING_START", 2, json!({}));

    assert_eq!(server.expect_heartbeat().await?, Some(3));

    for expected in [Some(0), Some(1), Some(2), Some(3), Some(2)] {
        assert_eq!(harness.events.recv().await.unwrap().sequence, expected);
    }

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_non_resumable_invalid_session_identifies_fresh() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    server.dispatch("MESSAGE_CREATE", 5, json!({}));
    server.send(GatewayFrame::invalid_session(false));

    let mut server = harness.servers.next().await?;
    assert_eq!(server.url, GATEWAY_URL);
    server.hello(45_000);
    server.expect_op(OpCode::Identify).await?;
    server.ready(0, "T");

    let mut status = harness.status.clone();
    status
        .wait_for(|s| s.session_id.as_deref() == Some("T"))
        .await?;

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_resumable_invalid_session_resumes() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    server.dispatch("MESSAGE_CREATE", 2, json!({}));
    server.send(GatewayFrame::invalid_session(true));

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    let resume = server.expect_op(OpCode::Resume).await?;
    assert_eq!(resume.as_resume().unwrap().session_id, "S");

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_session_timeout_close_identifies_fresh() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    server.close(CloseCode::SessionTimedOut.as_u16());

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    server.expect_op(OpCode::Identify).await?;

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_resume_falls_back_to_identify() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    server.dispatch("MESSAGE_CREATE", 9, json!({}));
    server.send(GatewayFrame::reconnect());

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    server.expect_op(OpCode::Resume).await?;
    server.send(GatewayFrame::invalid_session(false));

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    server.expect_op(OpCode::Identify).await?;

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fatal_close_ends_session() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    server.expect_op(OpCode::Identify).await?;
    server.close(CloseCode::AuthenticationFailed.as_u16());

    let err = harness.task.await?.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.close_code(), Some(4004));
    assert_eq!(harness.status.borrow().state, ConnectionState::Closed);
    assert_eq!(harness.transport.connect_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disallowed_intents_is_fatal_even_after_ready() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    server.close(CloseCode::DisallowedIntents.as_u16());

    let err = harness.task.await?.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::FatalClose(CloseCode::DisallowedIntents)
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_resume_uses_resume_gateway_url() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.hello(45_000);
    server.expect_op(OpCode::Identify).await?;
    server.send(GatewayFrame::ready(0, "S", Some("wss://resume.test")));
    server.send(GatewayFrame::reconnect());

    let server = harness.servers.next().await?;
    assert_eq!(server.url, "wss://resume.test/?v=10&encoding=json");

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_hello_times_out_and_reconnects() -> Result<()> {
    let mut config = gateway_config(1);
    config.handshake_timeout_ms = 5_000;
    let mut harness = start(config);

    let first = harness.servers.next().await?;
    let second = harness.servers.next().await?;
    assert!(second.connected_at - first.connected_at >= Duration::from_secs(5));

    harness.shutdown.shutdown();
    harness.task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refused_connects_give_up_after_ceiling() -> Result<()> {
    let mut config = gateway_config(1);
    config.max_reconnect_attempts = 2;
    let harness = start(config);
    harness.transport.refuse_next(10);

    let err = harness.task.await?.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::ReconnectExhausted { attempts: 3 }
    ));
    assert!(!err.is_fatal());
    assert_eq!(harness.transport.connect_count(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_normally() -> Result<()> {
    let mut harness = start(gateway_config(1));

    let mut server = harness.servers.next().await?;
    server.accept_identify("S").await?;
    let mut status = harness.status.clone();
    status.wait_for(|s| s.state.is_connected()).await?;

    harness.shutdown.shutdown();
    assert_eq!(server.expect_close().await?, 1000);
    harness.task.await??;
    assert_eq!(harness.status.borrow().state, ConnectionState::Closed);
    Ok(())
}
