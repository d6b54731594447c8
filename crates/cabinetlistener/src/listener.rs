//! The listener event loop
//!
//! A single task owns the connection registry and drives it:
//!
//! 1. stop if shutdown was requested, also mid-pass
//! 2. sleep when nothing is connected, otherwise wait for readable sockets
//! 3. decode whatever arrived and dispatch each frame
//! 4. advance the reconnect cadence and sweep when it fires
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::watch::channel(false);
//! let mut listener = CabinetListener::new(options, store, Arc::new(TcpConnector));
//! if listener.start().await? > 0 {
//!     listener.run(rx).await?;
//! }
//! ```

use crate::connector::Connector;
use crate::dispatcher::{DispatchStats, NotificationDispatcher};
use crate::error::Result;
use crate::notifier::ShelfNotifier;
use crate::options::ListenerOptions;
use crate::registry::{ConnectionRegistry, ReadOutcome};
use crate::store::CabinetStore;
use crate::supervisor::{ReconnectCadence, ReconnectSupervisor};
use crate::types::CabinetId;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What one pass of the loop did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// No connection was open; slept one idle unit
    Idle,
    /// Nothing became readable within the poll timeout
    TimedOut,
    /// `ready` sockets produced a read result carrying `frames` frames in total
    Processed { ready: usize, frames: usize },
}

pub struct CabinetListener {
    options: ListenerOptions,
    store: Arc<dyn CabinetStore>,
    connector: Arc<dyn Connector>,
    notifier: Arc<ShelfNotifier>,
    registry: ConnectionRegistry,
    dispatcher: NotificationDispatcher,
    supervisor: ReconnectSupervisor,
    cadence: ReconnectCadence,
    only: Option<CabinetId>,
}

impl CabinetListener {
    pub fn new(
        options: ListenerOptions,
        store: Arc<dyn CabinetStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let notifier = Arc::new(ShelfNotifier::new());
        Self {
            registry: ConnectionRegistry::new(options.read_chunk()),
            dispatcher: NotificationDispatcher::new(Arc::clone(&store), Arc::clone(&notifier)),
            supervisor: ReconnectSupervisor::new(
                options.connect_timeout(),
                options.cabinet_revive_closed,
            ),
            cadence: ReconnectCadence::new(options.reconnect_every()),
            options,
            store,
            connector,
            notifier,
            only: None,
        }
    }

    /// Restrict the listener to a single cabinet
    pub fn only_cabinet(mut self, cabinet_id: Option<CabinetId>) -> Self {
        self.only = cabinet_id;
        self
    }

    pub fn notifier(&self) -> Arc<ShelfNotifier> {
        Arc::clone(&self.notifier)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Load the active cabinets and connect to each of them
    ///
    /// Returns the number of cabinets now watched. Zero means there is
    /// nothing to listen to. Connection failures are logged and left to the
    /// reconnect sweep.
    pub async fn start(&mut self) -> Result<usize> {
        let cabinets = self.store.active_cabinets(self.only).await?;
        if cabinets.is_empty() {
            match self.only {
                Some(id) => warn!(cabinet_id = id, "No active cabinet with this id"),
                None => warn!("No active cabinets configured"),
            }
            return Ok(0);
        }

        info!("Starting listener for {} cabinet(s)", cabinets.len());
        for cabinet in &cabinets {
            if let Err(e) = self
                .registry
                .open(cabinet, self.connector.as_ref(), self.options.connect_timeout())
                .await
            {
                error!(cabinet_id = cabinet.id, "{}", e);
            }
        }

        let count = cabinets.len();
        self.supervisor.watch(cabinets);
        Ok(count)
    }

    /// Loop until `shutdown` becomes true, then close every connection
    ///
    /// A pass in progress is abandoned as soon as the flag flips, including
    /// a reconnect sweep waiting on connect timeouts.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Listening on {} connection(s), {} watched",
            self.registry.open_count(),
            self.supervisor.watched().len()
        );
        let mut signal_live = true;
        while !*shutdown.borrow() {
            if !signal_live {
                self.run_once().await;
                continue;
            }
            tokio::select! {
                _ = self.run_once() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: the flag can never flip again
                        debug!("Shutdown handle dropped, running until cancelled");
                        signal_live = false;
                    }
                }
            }
        }
        info!("Shutdown requested");
        self.shutdown().await;
        Ok(())
    }

    /// One pass of the loop
    pub async fn run_once(&mut self) -> Iteration {
        let iteration = if self.registry.open_count() == 0 {
            tokio::time::sleep(self.options.idle_sleep()).await;
            Iteration::Idle
        } else {
            match self.registry.wait_readable(self.options.poll_timeout()).await {
                None => Iteration::TimedOut,
                Some(ready) => {
                    let count = ready.len();
                    let mut frames = 0;
                    for (cabinet_id, outcome) in ready {
                        frames += self.handle_read(cabinet_id, outcome).await;
                    }
                    Iteration::Processed {
                        ready: count,
                        frames,
                    }
                }
            }
        };

        if self.cadence.tick() {
            self.supervisor
                .sweep(&mut self.registry, self.connector.as_ref())
                .await;
        }
        iteration
    }

    pub async fn shutdown(&mut self) {
        self.registry.close_all().await;
        let stats = self.dispatcher.stats();
        info!(
            "Listener stopped: {} applied, {} unmatched, {} unparsed, {} failed",
            stats.applied, stats.unmatched, stats.unparsed, stats.failed
        );
    }

    async fn handle_read(&mut self, cabinet_id: CabinetId, outcome: ReadOutcome) -> usize {
        match outcome {
            ReadOutcome::Data(data) => {
                debug!(cabinet_id, hex = %hex::encode(&data), "Read {} byte(s)", data.len());
                let frames = self.registry.ingest(cabinet_id, &data);
                for frame in &frames {
                    self.dispatcher.dispatch(cabinet_id, frame).await;
                }
                frames.len()
            }
            ReadOutcome::Eof => {
                warn!(cabinet_id, "Cabinet closed the connection");
                0
            }
            ReadOutcome::Failed(e) => {
                error!(cabinet_id, "Read failed, connection dropped: {}", e);
                0
            }
        }
    }
}
