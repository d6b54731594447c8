//! Cabinet controller daemon and command-line tool
//!
//! `cabinetd listen` keeps connections to every active cabinet and prints a
//! JSON line for each shelf that closes. The other subcommands send single
//! commands to a controller.

use anyhow::{anyhow, Context, Result};
use cabinetconfig::FleetConfig;
use cabinetlistener::{
    fleet, CabinetId, CabinetListener, CommandOptions, CommandSender, ListenerOptions,
    MemoryStore, ShelfId, ShelfOperation, TcpConnector, DEFAULT_CABINET_PORT,
};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cabinetd")]
#[command(about = "Cabinet controller listener and command tool", long_about = None)]
struct Cli {
    /// Cabinet configuration file path
    #[arg(
        short = 'c',
        long,
        env = "CABINET_CONF",
        default_value = "/etc/cabinet/cabinet.conf"
    )]
    conf: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for shelf notifications until interrupted
    Listen {
        /// Only listen to this cabinet
        #[arg(long)]
        cabinet_id: Option<CabinetId>,
    },
    /// Open a panel of a cabinet
    Open {
        #[arg(long)]
        cabinet_id: CabinetId,
        /// Panel number
        #[arg(long)]
        panel: i64,
    },
    /// Send the configured open or close command of a shelf
    Shelf {
        #[arg(long)]
        shelf_id: ShelfId,
        /// Close instead of open
        #[arg(long)]
        close: bool,
    },
    /// Send a raw hex command
    SendHex {
        #[arg(long)]
        cabinet_id: CabinetId,
        /// Command bytes, e.g. "68 04 09 01 0B 15"
        hex: String,
    },
    /// Print the canonical form of a hex command
    Normalize {
        hex: String,
    },
    /// Check that a controller accepts connections
    Probe {
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = DEFAULT_CABINET_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Normalize { hex } = &cli.command {
        match cabinetproto::normalize(hex).context("Invalid hex command")? {
            Some(canonical) => println!("{}", canonical),
            None => println!(),
        }
        return Ok(());
    }

    let config = if Path::new(&cli.conf).exists() {
        debug!("Loading configuration from: {}", cli.conf);
        FleetConfig::from_file(&cli.conf).context("Failed to parse cabinet.conf")?
    } else {
        debug!("Configuration file not found: {}", cli.conf);
        FleetConfig::default()
    };
    let store = Arc::new(fleet::load_store(&config).context("Failed to load cabinet fleet")?);

    match cli.command {
        Commands::Listen { cabinet_id } => listen(&config, store, cabinet_id).await,
        Commands::Open { cabinet_id, panel } => {
            let sender = command_sender(&config, &store);
            let cabinet = store
                .cabinet(cabinet_id)
                .await
                .ok_or_else(|| anyhow!("Cabinet {} not found", cabinet_id))?;
            let panel = cabinetproto::command::panel_byte(panel)?;
            sender
                .send_open_command(&cabinet, panel)
                .await
                .context("Failed to send open command")?;
            sender.close_all().await;
            Ok(())
        }
        Commands::Shelf { shelf_id, close } => {
            let sender = command_sender(&config, &store);
            let shelf = store
                .shelf(shelf_id)
                .await
                .ok_or_else(|| anyhow!("Shelf {} not found", shelf_id))?;
            let cabinet_id = shelf
                .cabinet_id
                .ok_or_else(|| anyhow!("Shelf {} is not linked to a cabinet", shelf_id))?;
            let cabinet = store
                .cabinet(cabinet_id)
                .await
                .ok_or_else(|| anyhow!("Cabinet {} not found", cabinet_id))?;
            let operation = if close {
                ShelfOperation::Close
            } else {
                ShelfOperation::Open
            };
            let sent = sender
                .send_shelf_command(&cabinet, &shelf, operation)
                .await
                .context("Failed to send shelf command")?;
            if !sent {
                eprintln!("Shelf {} has no close command; nothing sent", shelf_id);
            }
            sender.close_all().await;
            Ok(())
        }
        Commands::SendHex { cabinet_id, hex } => {
            let sender = command_sender(&config, &store);
            let cabinet = store
                .cabinet(cabinet_id)
                .await
                .ok_or_else(|| anyhow!("Cabinet {} not found", cabinet_id))?;
            sender
                .send_hex(&cabinet, &hex)
                .await
                .context("Failed to send command")?;
            sender.close_all().await;
            Ok(())
        }
        Commands::Probe { host, port } => {
            let sender = command_sender(&config, &store);
            if sender.probe(&host, port).await {
                println!("{}:{} reachable", host, port);
                Ok(())
            } else {
                Err(anyhow!("{}:{} unreachable", host, port))
            }
        }
        Commands::Normalize { .. } => Ok(()),
    }
}

fn command_sender(config: &FleetConfig, store: &Arc<MemoryStore>) -> CommandSender {
    CommandSender::new(
        CommandOptions::from_config(config),
        Arc::new(TcpConnector),
        store.clone(),
    )
}

async fn listen(
    config: &FleetConfig,
    store: Arc<MemoryStore>,
    cabinet_id: Option<CabinetId>,
) -> Result<()> {
    let mut listener = CabinetListener::new(
        ListenerOptions::from_config(config),
        store,
        Arc::new(TcpConnector),
    )
    .only_cabinet(cabinet_id);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            let _ = shutdown_tx.send(true);
        }
    });

    let watched = tokio::select! {
        started = listener.start() => started.context("Failed to load cabinets")?,
        Ok(()) = shutdown_rx.changed() => {
            listener.shutdown().await;
            return Ok(());
        }
    };
    if watched == 0 {
        info!("Nothing to listen to");
        return Ok(());
    }

    let mut events = listener.notifier().subscribe().await;
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode shelf event: {}", e),
            }
        }
    });

    listener.run(shutdown_rx).await?;
    drop(listener);
    let _ = printer.await;
    Ok(())
}
