//! Cabinet and shelf records shared by the listener and the command sender

use serde::Serialize;
use std::fmt;
use std::time::SystemTime;

pub type CabinetId = u64;
pub type ShelfId = u64;

pub const DEFAULT_CABINET_PORT: u16 = 8080;

/// A cabinet controller reachable over TCP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cabinet {
    pub id: CabinetId,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Function byte placed in generated open-panel commands
    pub function_byte: u8,
    /// Offset added to the panel id to form the command checksum
    pub checksum_offset: i32,
    pub active: bool,
    /// Updated on every accepted notification frame and every sent command
    pub last_seen: Option<SystemTime>,
}

impl Cabinet {
    pub fn new(id: CabinetId, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            name: format!("cabinet.{}", id),
            host: host.into(),
            port,
            function_byte: 0x01,
            checksum_offset: 0,
            active: true,
            last_seen: None,
        }
    }

    /// "host:port", also the key of the outbound connection pool
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Cabinet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id={}, {})", self.name, self.id, self.addr())
    }
}

/// A shelf addressed by the column index of its panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shelf {
    pub id: ShelfId,
    pub cabinet_id: Option<CabinetId>,
    pub name: String,
    /// Panel/addressing index used on the wire
    pub column_index: u32,
    pub is_open: bool,
    /// Canonical hex sent instead of the generated open packet
    pub open_command: Option<String>,
    /// Canonical hex sent on close; closing without one is a no-op
    pub close_command: Option<String>,
}

impl Shelf {
    pub fn new(id: ShelfId, cabinet_id: CabinetId, column_index: u32) -> Self {
        Self {
            id,
            cabinet_id: Some(cabinet_id),
            name: format!("shelf.{}", id),
            column_index,
            is_open: false,
            open_command: None,
            close_command: None,
        }
    }
}

/// Liveness of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket is polled for notifications
    Open,
    /// Peer closed the stream; the entry stays until it is reopened
    Closed,
}

/// Observable shelf state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShelfEvent {
    pub shelf_id: ShelfId,
    pub cabinet_id: CabinetId,
    pub panel_id: u8,
    pub is_open: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl ShelfEvent {
    pub fn closed(shelf_id: ShelfId, cabinet_id: CabinetId, panel_id: u8, at: SystemTime) -> Self {
        let timestamp_ms = at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            shelf_id,
            cabinet_id,
            panel_id,
            is_open: false,
            timestamp_ms,
        }
    }
}

/// Operation requested for a shelf command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfOperation {
    Open,
    Close,
}
