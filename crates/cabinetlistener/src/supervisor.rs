//! Periodic reconnection of cabinets that dropped off
//!
//! The event loop advances a [`ReconnectCadence`] once per iteration. When it
//! fires, the [`ReconnectSupervisor`] walks the watched cabinets and tries to
//! open every one without a live connection. There is no backoff; a cabinet
//! that fails is simply tried again on the next sweep.

use crate::connector::Connector;
use crate::registry::ConnectionRegistry;
use crate::types::{Cabinet, CabinetId, ConnectionState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fires on every `every`th tick
#[derive(Debug, Clone)]
pub struct ReconnectCadence {
    every: u64,
    iteration: u64,
}

impl ReconnectCadence {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            iteration: 0,
        }
    }

    /// Count one loop iteration; true when a sweep is due
    pub fn tick(&mut self) -> bool {
        self.iteration = self.iteration.wrapping_add(1);
        self.iteration % self.every == 0
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: Vec<CabinetId>,
    pub reconnected: Vec<CabinetId>,
    pub failed: Vec<CabinetId>,
}

pub struct ReconnectSupervisor {
    watched: Vec<Cabinet>,
    connect_timeout: Duration,
    revive_closed: bool,
}

impl ReconnectSupervisor {
    pub fn new(connect_timeout: Duration, revive_closed: bool) -> Self {
        Self {
            watched: Vec::new(),
            connect_timeout,
            revive_closed,
        }
    }

    /// Replace the set of cabinets the supervisor keeps connected
    pub fn watch(&mut self, cabinets: Vec<Cabinet>) {
        self.watched = cabinets;
    }

    pub fn watched(&self) -> &[Cabinet] {
        &self.watched
    }

    /// Whether `cabinet_id` should get a connection attempt
    pub fn needs_connection(&self, registry: &ConnectionRegistry, cabinet_id: CabinetId) -> bool {
        match registry.state(cabinet_id) {
            None => true,
            Some(ConnectionState::Open) => false,
            Some(ConnectionState::Closed) => self.revive_closed,
        }
    }

    /// Try to open every watched cabinet that is not connected
    pub async fn sweep(&self, registry: &mut ConnectionRegistry, connector: &dyn Connector) -> SweepReport {
        let mut report = SweepReport::default();

        for cabinet in &self.watched {
            if !self.needs_connection(registry, cabinet.id) {
                continue;
            }
            if registry.state(cabinet.id) == Some(ConnectionState::Closed) {
                info!(cabinet_id = cabinet.id, "Reopening connection closed by peer");
            }

            report.attempted.push(cabinet.id);
            match registry.open(cabinet, connector, self.connect_timeout).await {
                Ok(()) => {
                    info!(cabinet_id = cabinet.id, "Reconnected to cabinet {}", cabinet);
                    report.reconnected.push(cabinet.id);
                }
                Err(e) => {
                    warn!(cabinet_id = cabinet.id, "Reconnect failed: {}", e);
                    report.failed.push(cabinet.id);
                }
            }
        }

        if !report.attempted.is_empty() {
            debug!(
                "Reconnect sweep: {} attempted, {} reconnected, {} failed",
                report.attempted.len(),
                report.reconnected.len(),
                report.failed.len()
            );
        }
        report
    }
}
