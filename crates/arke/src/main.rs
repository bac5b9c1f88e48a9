//! Demo bot
//!
//! Run with:
//! ```bash
//! ARKE_TOKEN=... cargo run -p arke --bin arke-bot
//! ```
//!
//! Logs every gateway event and answers `!ping` with `pong`.

use anyhow::Context;
use arke::{Client, ClientConfig, Event, Method, Request, Route, Snowflake};
use arke_common::{try_init_tracing, Environment, TracingConfig};
use futures::StreamExt;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let tracing = TracingConfig::for_environment(Environment::from_env());
    if let Err(e) = try_init_tracing(&tracing) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run().await {
        error!(error = %e, "Bot stopped with an error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting arke-bot...");

    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    info!(
        env = ?config.app.env,
        intents = %config.gateway.intents,
        shards = config.gateway.shard_count,
        "Configuration loaded"
    );

    let client = Client::from_config(config)?;
    let (shards, mut events) = client.start_gateway().await?;
    let shutdown = shards.shutdown_handle();

    let runner = shards.clone();
    let mut fleet = tokio::spawn(async move { runner.run().await });

    loop {
        tokio::select! {
            result = &mut fleet => {
                client.shutdown();
                result.context("Shard manager panicked")??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                shutdown.shutdown();
                client.shutdown();
                (&mut fleet).await.context("Shard manager panicked")??;
                return Ok(());
            }
            event = events.next() => match event {
                Some(event) => handle_event(&client, event).await,
                None => return Ok(()),
            },
        }
    }
}

async fn handle_event(client: &Client, event: Event) {
    info!(shard_id = event.shard_id, event = %event.name, seq = ?event.sequence, "Event");

    if event.name != "MESSAGE_CREATE" || event.data["content"] != "!ping" {
        return;
    }
    let Some(channel_id) = event.data["channel_id"]
        .as_str()
        .and_then(|id| Snowflake::parse(id).ok())
    else {
        return;
    };

    let route = Route::new(Method::Post, "/channels/{channel_id}/messages").channel_id(channel_id);
    let request = match Request::new(route).json(&serde_json::json!({ "content": "pong" })) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to build reply");
            return;
        }
    };
    if let Err(e) = client.rest().send(request).await {
        warn!(error = %e, channel_id = %channel_id, "Failed to reply");
    }
}
