//! Outbound command encoding
//!
//! Operators enter commands as free-form hex ("68-04-09", "68 04 09 01 0b 15").
//! Commands are stored in a canonical form (uppercase byte pairs separated by a
//! single space) and converted to raw bytes right before they are written to a
//! cabinet socket.

use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

pub const COMMAND_LEN_BYTE: u8 = 0x04;
pub const COMMAND_GROUP_BYTE: u8 = 0x09;
pub const OPEN_COMMAND_LEN: usize = 6;

/// Normalize a hex command into spaced uppercase byte pairs (e.g. "68 04 09")
///
/// Returns `Ok(None)` when the input holds no hex digits at all.
pub fn normalize(text: &str) -> Result<Option<String>> {
    let clean = sanitize(text);
    if clean.is_empty() {
        return Ok(None);
    }
    check_even(&clean)?;

    let mut out = String::with_capacity(clean.len() + clean.len() / 2);
    for (i, c) in clean.chars().enumerate() {
        if i > 0 && i % 2 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    Ok(Some(out))
}

/// Convert a hex command string into the raw bytes sent over the socket
pub fn to_binary(text: &str) -> Result<Bytes> {
    let clean = sanitize(text);
    if clean.is_empty() {
        return Err(Error::format_error(
            "Hex command must contain hexadecimal characters",
        ));
    }
    check_even(&clean)?;

    let raw = hex::decode(&clean).map_err(|e| {
        Error::Format(format!(
            "Unable to convert hex command to binary payload: {}",
            e
        ))
    })?;
    Ok(Bytes::from(raw))
}

fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn check_even(clean: &str) -> Result<()> {
    if clean.len() % 2 != 0 {
        return Err(Error::format_error(
            "Hex command must have an even number of characters",
        ));
    }
    Ok(())
}

/// Generated "open panel" packet
///
/// Structure: [Header] [Len] [Group] [Function] [Panel_ID] [Checksum], where
/// the checksum is the panel id plus a per-cabinet offset, modulo 256.
/// Example for a cabinet with function 0x01 and offset 0x0A opening panel 11:
/// `68 04 09 01 0B 15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPanelCommand {
    pub function: u8,
    pub panel_id: u8,
    pub checksum_offset: i32,
}

impl OpenPanelCommand {
    pub fn new(function: u8, panel_id: u8, checksum_offset: i32) -> Self {
        Self {
            function,
            panel_id,
            checksum_offset,
        }
    }

    pub fn checksum(&self) -> u8 {
        (i64::from(self.panel_id) + i64::from(self.checksum_offset)).rem_euclid(256) as u8
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(OPEN_COMMAND_LEN);
        dst.put_u8(crate::frame::SYNC_BYTE);
        dst.put_u8(COMMAND_LEN_BYTE);
        dst.put_u8(COMMAND_GROUP_BYTE);
        dst.put_u8(self.function);
        dst.put_u8(self.panel_id);
        dst.put_u8(self.checksum());
        dst.freeze()
    }
}

/// Map a panel number supplied by a caller onto the single addressing byte
pub fn panel_byte(panel: i64) -> Result<u8> {
    u8::try_from(panel).map_err(|_| Error::PanelOutOfRange(panel))
}

/// Render raw bytes in the canonical spaced form
pub fn display(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("68-04-09").unwrap().as_deref(), Some("68 04 09"));
        assert_eq!(normalize("680409").unwrap().as_deref(), Some("68 04 09"));
        assert_eq!(
            normalize("  68 04 09 01 0b 15 ").unwrap().as_deref(),
            Some("68 04 09 01 0B 15")
        );
        // 'x' is not a hex digit, so "0xab" sanitizes to the odd "0AB"
        assert!(normalize("0xab").is_err());
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize("").unwrap(), None);
        assert_eq!(normalize("   ").unwrap(), None);
        assert_eq!(normalize("zz-!").unwrap(), None);
    }

    #[test]
    fn test_normalize_odd_is_format_error() {
        // 'G' is stripped, leaving "68049"
        let err = normalize("6804G9").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
        assert_eq!(err.category(), "Format");
    }

    #[test]
    fn test_to_binary() {
        assert_eq!(to_binary("680409").unwrap().as_ref(), &[0x68, 0x04, 0x09]);
        assert_eq!(
            to_binary("68 04 09 01 0b 15").unwrap().as_ref(),
            &[0x68, 0x04, 0x09, 0x01, 0x0b, 0x15]
        );
    }

    #[test]
    fn test_to_binary_rejects_empty_and_odd() {
        assert!(matches!(to_binary(""), Err(Error::Format(_))));
        assert!(matches!(to_binary("--"), Err(Error::Format(_))));
        assert!(matches!(to_binary("680"), Err(Error::Format(_))));
    }

    #[test]
    fn test_open_panel_command() {
        let cmd = OpenPanelCommand::new(0x01, 11, 0x0a);
        assert_eq!(cmd.checksum(), 0x15);
        assert_eq!(
            cmd.encode().as_ref(),
            &[0x68, 0x04, 0x09, 0x01, 0x0b, 0x15]
        );
        assert_eq!(display(&cmd.encode()), "68 04 09 01 0B 15");
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(OpenPanelCommand::new(0x03, 250, 12).checksum(), 6);
        assert_eq!(OpenPanelCommand::new(0x03, 2, -5).checksum(), 253);
    }

    #[test]
    fn test_panel_byte() {
        assert_eq!(panel_byte(0).unwrap(), 0);
        assert_eq!(panel_byte(255).unwrap(), 255);
        assert_eq!(panel_byte(256), Err(Error::PanelOutOfRange(256)));
        assert_eq!(panel_byte(-1), Err(Error::PanelOutOfRange(-1)));
    }
}
