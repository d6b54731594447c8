//! Storage-cabinet controller wire protocol
//!
//! Cabinet controllers speak a tiny fixed binary protocol over plain TCP:
//!
//! - inbound notifications: `68 03 08 <func> <panel>` (5 bytes, unframed)
//! - outbound commands: operator-supplied hex or the generated open-panel
//!   packet `68 04 09 <func> <panel> <checksum>`
//!
//! # Example
//!
//! ```
//! use cabinetproto::{command, FrameDecoder};
//!
//! let mut decoder = FrameDecoder::new();
//! decoder.extend(&[0xff, 0x68, 0x03, 0x08, 0x01, 0x02]);
//! let frame = decoder.next_frame().unwrap();
//! assert_eq!(frame.panel_id(), 2);
//!
//! assert_eq!(command::normalize("68-04-09").unwrap().as_deref(), Some("68 04 09"));
//! ```

pub mod command;
pub mod error;
pub mod frame;

pub use command::{normalize, to_binary, OpenPanelCommand};
pub use error::{Error, Result};
pub use frame::{parse_notification, DecoderState, FrameDecoder, NotificationFrame};
