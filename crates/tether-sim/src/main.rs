//! Simulate a Tether child against a simulated parent.
//!
//! Runs one child through a number of page loads over a shared durable slot.
//! The parent answers announcements, sends a few application messages once
//! the child is up, and records what the child told it. Everything is
//! reported through `tracing`; set `RUST_LOG=debug` to follow every message.

use std::{process::ExitCode, time::Duration};

use clap::Parser;
use serde_json::json;
use tether_core::{ChildConfig, ConfigError, MemorySlot, SessionPersistence};
use tether_harness::{
    CounterIds, IdSource, RecordingCallbacks, SeededIds, SimError, SimHandle, SimHost, SimParent,
    SimParentConfig,
};
use tether_proto::ProtocolError;
use tether_runtime::{Runtime, RuntimeError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the parent looks at what the child posted.
const RELAY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(
    name = "tether-sim",
    about = "Run a Tether child handshake against a simulated parent",
    version
)]
struct Cli {
    /// Handshake expiry limit in milliseconds
    #[arg(long, default_value_t = 5_000)]
    expiry_ms: u64,

    /// Origin the child accepts messages from and posts to
    #[arg(long)]
    origin: Option<String>,

    /// Host the child in an embedding frame
    #[arg(long)]
    embedded: bool,

    /// Origin the parent sends from
    #[arg(long, default_value = "https://parent.example")]
    parent_origin: String,

    /// Parent ignores the child's first announcement
    #[arg(long)]
    drop_handshake: bool,

    /// Page reloads after the first load
    #[arg(long, default_value_t = 0)]
    reloads: u32,

    /// Name of the root context
    #[arg(long, default_value = "root")]
    root_name: String,

    /// Seed for parent-generated ids (counter ids when absent)
    #[arg(long)]
    seed: Option<u64>,

    /// Application messages the parent sends once the child is up
    #[arg(long, default_value_t = 1)]
    messages: u32,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid child configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError<SimError>),

    #[error("parent could not decode the child: {0}")]
    Protocol(#[from] ProtocolError),
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "simulation failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut builder = ChildConfig::builder()
        .handshake_expiry_limit(Duration::from_millis(cli.expiry_ms))
        .embedded(cli.embedded);
    if let Some(origin) = &cli.origin {
        builder = builder.origin(origin.clone());
    }
    let config = builder.build()?;

    let ids: Box<dyn IdSource> = match cli.seed {
        Some(seed) => Box::new(SeededIds::with_seed(seed)),
        None => Box::new(CounterIds::new()),
    };
    let parent_config = SimParentConfig {
        root_name: cli.root_name.clone(),
        origin: cli.parent_origin.clone(),
        ..SimParentConfig::default()
    };
    let mut parent = SimParent::new(parent_config, ids);
    let slot = MemorySlot::new();

    for load in 0..=cli.reloads {
        let drop_replies = cli.drop_handshake && load == 0;
        page_load(load, &cli, config.clone(), &slot, &mut parent, drop_replies).await?;
    }

    for (id, child) in parent.children() {
        info!(
            %id,
            name = %child.identity.name,
            parent_name = %child.identity.parent_name,
            announcements = child.announcements,
            acknowledged = child.acknowledged,
            messages = child.messages.len(),
            "parent view of child"
        );
    }
    Ok(())
}

/// One page lifetime: activate, wait for the handshake to settle, exchange
/// messages, unload.
async fn page_load(
    load: u32,
    cli: &Cli,
    config: ChildConfig,
    slot: &MemorySlot,
    parent: &mut SimParent,
    drop_replies: bool,
) -> Result<(), CliError> {
    let host = if cli.embedded { SimHost::frame() } else { SimHost::window() };
    let (driver, handle) = host.build();
    let callbacks = RecordingCallbacks::new();
    let persistence = SessionPersistence::new(Box::new(slot.clone()));
    let mut runtime = Runtime::new(driver, config, persistence, callbacks.clone());
    info!(load, "page loaded");

    let child_side = async { runtime.run().await.map_err(CliError::from) };
    let parent_side = async {
        let mut ticker = tokio::time::interval(RELAY_INTERVAL);
        loop {
            ticker.tick().await;
            relay(parent, &handle, drop_replies)?;
            let log = callbacks.snapshot();
            if !log.initialized.is_empty() || log.expiries > 0 {
                break;
            }
        }

        for seq in 0..cli.messages {
            let message = parent.communicate(&json!({ "seq": seq, "load": load }))?;
            handle.deliver(message, parent.origin());
        }
        ticker.tick().await;
        relay(parent, &handle, false)?;
        handle.unload();
        Ok::<_, CliError>(())
    };
    tokio::try_join!(child_side, parent_side)?;

    // Teardown notice
    relay(parent, &handle, false)?;

    let log = callbacks.snapshot();
    info!(
        load,
        state = ?runtime.endpoint().state(),
        id = ?runtime.tab_info().id,
        initialized = log.initialized.len(),
        expiries = log.expiries,
        communications = log.communications.len(),
        "page unloaded"
    );
    Ok(())
}

/// Hand what the child posted to the parent and deliver its replies.
fn relay(parent: &mut SimParent, handle: &SimHandle, drop_replies: bool) -> Result<(), CliError> {
    for posted in handle.drain_posted() {
        for reply in parent.receive(&posted.message)? {
            if drop_replies {
                warn!("parent reply lost");
                continue;
            }
            handle.deliver(reply, parent.origin());
        }
    }
    Ok(())
}
