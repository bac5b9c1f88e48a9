//! Shard manager
//!
//! Starts every shard in order, one identify slot apart, restarts shards that
//! fail with a retriable error, and stops the whole fleet on a fatal close:
//! all shards share one token, so an auth failure on one is a failure on all.

use super::{IdentifyQueue, ShardInfo};
use crate::error::{GatewayError, GatewayResult};
use crate::event::{Event, EventStream};
use crate::session::{ConnectionState, GatewaySession, SessionStatus};
use crate::shutdown::ShutdownHandle;
use crate::transport::GatewayTransport;
use arke_common::GatewayConfig;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

type ShardExit = (u32, GatewayResult<()>);

/// Runs a fleet of gateway sessions
///
/// Cheap to clone. The event stream ends once every clone is dropped.
#[derive(Clone)]
pub struct ShardManager {
    config: GatewayConfig,
    transport: Arc<dyn GatewayTransport>,
    events: mpsc::Sender<Event>,
    identify_queue: Arc<IdentifyQueue>,
    shutdown: ShutdownHandle,
    statuses: Arc<DashMap<u32, watch::Receiver<SessionStatus>>>,
}

impl ShardManager {
    pub fn new(config: GatewayConfig, transport: Arc<dyn GatewayTransport>) -> (Self, EventStream) {
        let (events, stream) = EventStream::channel(config.event_buffer);
        let identify_queue = Arc::new(IdentifyQueue::from_config(&config));
        let manager = Self {
            config,
            transport,
            events,
            identify_queue,
            shutdown: ShutdownHandle::new(),
            statuses: Arc::new(DashMap::new()),
        };
        (manager, stream)
    }

    pub fn shard_count(&self) -> u32 {
        self.config.total_shards()
    }

    /// Stops every shard when triggered
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn identify_queue(&self) -> &Arc<IdentifyQueue> {
        &self.identify_queue
    }

    /// Latest status of every started shard
    pub fn statuses(&self) -> BTreeMap<u32, SessionStatus> {
        self.statuses
            .iter()
            .map(|entry| (*entry.key(), entry.value().borrow().clone()))
            .collect()
    }

    /// Start all shards and supervise them until shutdown or a fatal error
    pub async fn run(&self) -> GatewayResult<()> {
        let total = self.shard_count();
        tracing::info!(
            shards = total,
            max_concurrency = self.identify_queue.max_concurrency(),
            "Starting shards"
        );

        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ShardExit>();
        let mut restarts: HashMap<u32, u32> = HashMap::new();
        let mut running = 0_u32;

        for id in 0..total {
            while let Ok(exit) = exit_rx.try_recv() {
                running -= 1;
                self.handle_exit(exit, &mut restarts, &mut running, &exit_tx, &mut exit_rx)
                    .await?;
            }
            if self.shutdown.is_shutdown() {
                break;
            }

            let mut status = self.spawn_shard(ShardInfo::new(id, total), Duration::ZERO, &exit_tx);
            running += 1;

            // The next shard starts once this one holds its identify slot
            tokio::select! {
                () = self.shutdown.wait() => break,
                _ = status.wait_for(|s| s.state != ConnectionState::Disconnected) => {}
            }
        }

        while running > 0 {
            let Some(exit) = exit_rx.recv().await else {
                break;
            };
            running -= 1;
            self.handle_exit(exit, &mut restarts, &mut running, &exit_tx, &mut exit_rx)
                .await?;
        }

        tracing::info!("All shards stopped");
        Ok(())
    }

    /// React to a finished shard: restart it, or stop everything on a fatal error
    async fn handle_exit(
        &self,
        (id, result): ShardExit,
        restarts: &mut HashMap<u32, u32>,
        running: &mut u32,
        exit_tx: &mpsc::UnboundedSender<ShardExit>,
        exit_rx: &mut mpsc::UnboundedReceiver<ShardExit>,
    ) -> GatewayResult<()> {
        match result {
            Ok(()) => {
                tracing::info!(shard_id = id, "Shard stopped");
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                tracing::error!(
                    shard_id = id,
                    error = %err,
                    "Fatal gateway error, stopping all shards"
                );
                self.shutdown.shutdown();
                while *running > 0 {
                    if exit_rx.recv().await.is_none() {
                        break;
                    }
                    *running -= 1;
                }
                Err(err)
            }
            Err(err) => {
                if self.shutdown.is_shutdown() {
                    return Ok(());
                }

                let attempt = restarts.entry(id).or_insert(0);
                let delay = self.config.restart_backoff.delay_for_attempt(*attempt);
                *attempt += 1;
                tracing::warn!(
                    shard_id = id,
                    error = %err,
                    attempt = *attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Shard failed, restarting"
                );

                self.spawn_shard(ShardInfo::new(id, self.shard_count()), delay, exit_tx);
                *running += 1;
                Ok(())
            }
        }
    }

    /// Spawn a fresh session for `shard` after `delay`
    fn spawn_shard(
        &self,
        shard: ShardInfo,
        delay: Duration,
        exits: &mpsc::UnboundedSender<ShardExit>,
    ) -> watch::Receiver<SessionStatus> {
        let session = GatewaySession::new(
            shard,
            self.config.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.identify_queue),
            self.events.clone(),
        )
        .with_shutdown(self.shutdown.clone());

        let status = session.status();
        self.statuses.insert(shard.id, status.clone());

        let shutdown = self.shutdown.clone();
        let exits = exits.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    () = shutdown.wait() => {
                        let _ = exits.send((shard.id, Ok(())));
                        return;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }

            tracing::debug!(shard_id = shard.id, "Shard session starting");
            let result = session.run().await;
            let _ = exits.send((shard.id, result));
        });

        status
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("shards", &self.shard_count())
            .field("running", &self.statuses.len())
            .field("shutdown", &self.shutdown.is_shutdown())
            .finish()
    }
}
