//! knxgotd - KNX-IoT Group Object Table manager daemon
//!
//! Restores the table from storage, joins the multicast groups it needs and
//! serves the operator shell on stdin.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use knx_cfgmgr_common::{FileStore, KnxMgr, LoadState, MemoryStore, PersistenceStore};
use knx_gotd::{
    event_channel, AppKind, DeviceEvent, GotMgr, GotMgrConfig, KnxApp, LoggingRegistrar,
    LoggingSModeSender, GOT_MAX_ENTRIES,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// KNX-IoT Group Object Table manager
#[derive(Parser, Debug)]
#[command(name = "knxgotd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of the persistent store (volatile store when omitted)
    #[arg(short = 's', long)]
    storage_dir: Option<PathBuf>,

    /// Number of Group Object Table slots
    #[arg(short = 'c', long, default_value_t = GOT_MAX_ENTRIES)]
    capacity: usize,

    /// Application profile
    #[arg(short = 'a', long, value_enum, default_value_t = AppKind::Actuator)]
    app: AppKind,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting knxgotd ---");

    match run(args).await {
        Ok(()) => {
            info!("knxgotd exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("knxgotd exiting with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let store: Arc<dyn PersistenceStore> = match &args.storage_dir {
        Some(dir) => {
            let store = FileStore::open(dir)
                .with_context(|| format!("opening store at {}", dir.display()))?;
            info!("Persistent store at {}", dir.display());
            Arc::new(store)
        }
        None => {
            warn!("No storage directory given, configuration is volatile");
            Arc::new(MemoryStore::new())
        }
    };

    let config = GotMgrConfig {
        capacity: args.capacity,
        ..Default::default()
    };
    let mgr = GotMgr::new(config, Arc::new(LoggingRegistrar::new()), store);

    let restored = mgr.restore().await.context("restoring Group Object Table")?;
    mgr.set_load_state(LoadState::Loaded).await;
    info!("{} ready with {} entries", mgr.name(), restored);

    let app = KnxApp::new(args.app, mgr, Arc::new(LoggingSModeSender));
    let (tx, rx) = event_channel();
    let app_task = tokio::spawn(app.run(rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let (reply_tx, reply_rx) = oneshot::channel();
                tx.send(DeviceEvent::Command { line, reply: reply_tx })
                    .await
                    .context("application task stopped")?;
                let response = reply_rx.await.context("application task dropped the reply")?;
                println!("{}", response);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT");
                break;
            }
        }
    }

    if tx.send(DeviceEvent::Shutdown).await.is_err() {
        warn!("Application task already stopped");
    }
    app_task.await.context("joining application task")?;
    Ok(())
}
