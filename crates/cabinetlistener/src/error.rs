//! Error types for the cabinet listener

use crate::types::{CabinetId, ShelfId};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ListenerError>;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to connect to cabinet {cabinet_id} at {addr}: {source}")]
    Connect {
        cabinet_id: CabinetId,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {timeout:?} connecting to cabinet {cabinet_id} at {addr}")]
    ConnectTimeout {
        cabinet_id: CabinetId,
        addr: String,
        timeout: Duration,
    },

    #[error("Failed to write command to cabinet {cabinet_id}: {source}")]
    Write {
        cabinet_id: CabinetId,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown cabinet: {0}")]
    UnknownCabinet(CabinetId),

    #[error("Unknown shelf: {0}")]
    UnknownShelf(ShelfId),

    #[error("Shelf {0} is not linked to a cabinet controller")]
    UnlinkedShelf(ShelfId),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] cabinetproto::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] cabinetconfig::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
