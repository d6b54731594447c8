//! Cabinet controller connectivity
//!
//! This crate keeps persistent TCP connections to the cabinet controllers,
//! decodes the notification frames they push and reconciles shelf state:
//! a frame naming a panel marks the matching shelves closed.
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: one connection per cabinet, polled for readiness
//! - [`CabinetListener`]: the single-task event loop
//! - [`NotificationDispatcher`]: frame to shelf updates
//! - [`ReconnectSupervisor`]: periodic reconnection of dropped cabinets
//! - [`ShelfNotifier`]: fan-out of shelf closed events
//! - [`CommandSender`]: pooled outbound command connections
//!
//! Device records are read and updated through the [`CabinetStore`] trait;
//! [`MemoryStore`] is filled from the `[cabinet.N]` and `[shelf.N]` sections
//! of cabinet.conf by [`fleet::load_store`].

pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod fleet;
pub mod listener;
pub mod notifier;
pub mod options;
pub mod registry;
pub mod sender;
pub mod store;
pub mod supervisor;
pub mod types;

pub use connector::{BoxStream, CabinetStream, Connector, TcpConnector};
pub use dispatcher::{DispatchOutcome, DispatchStats, NotificationDispatcher};
pub use error::{ListenerError, Result};
pub use listener::{CabinetListener, Iteration};
pub use notifier::ShelfNotifier;
pub use options::{CommandOptions, ListenerOptions};
pub use registry::{ConnectionRegistry, ReadOutcome};
pub use sender::CommandSender;
pub use store::{CabinetStore, MemoryStore};
pub use supervisor::{ReconnectCadence, ReconnectSupervisor, SweepReport};
pub use types::{
    Cabinet, CabinetId, ConnectionState, Shelf, ShelfEvent, ShelfId, ShelfOperation,
    DEFAULT_CABINET_PORT,
};
