//! Loading the cabinet fleet from cabinet.conf
//!
//! ```text
//! [cabinet.1]
//! name = Archive A
//! host = 192.168.1.50
//! port = 8080
//! function_byte = 01
//! checksum_offset = 10
//!
//! [shelf.7]
//! cabinet = 1
//! column = 2
//! open_command = 68 04 09 01 03 0D
//! ```

use crate::error::{ListenerError, Result};
use crate::store::MemoryStore;
use crate::types::{Cabinet, Shelf, DEFAULT_CABINET_PORT};
use cabinetconfig::{ConfigError, Count, FleetConfig, HexByte};

pub fn load_cabinets(config: &FleetConfig) -> Result<Vec<Cabinet>> {
    let mut cabinets = Vec::new();
    for (id, section) in config.numbered_sections("cabinet")? {
        let host: String = config.require(&section, "host")?;
        let port = match config.get_parsed::<Count>(&section, "port")? {
            Some(Count(port)) => u16::try_from(port)
                .map_err(|_| invalid(&section, "port", "port must fit in 16 bits"))?,
            None => DEFAULT_CABINET_PORT,
        };
        let checksum_offset = match config.get_parsed::<i64>(&section, "checksum_offset")? {
            Some(offset) => i32::try_from(offset)
                .map_err(|_| invalid(&section, "checksum_offset", "offset out of range"))?,
            None => 0,
        };

        cabinets.push(Cabinet {
            id,
            name: config
                .get_parsed(&section, "name")?
                .unwrap_or_else(|| section.clone()),
            host,
            port,
            function_byte: config
                .get_parsed::<HexByte>(&section, "function_byte")?
                .map_or(0x01, |b| b.0),
            checksum_offset,
            active: config.get_parsed(&section, "active")?.unwrap_or(true),
            last_seen: None,
        });
    }
    Ok(cabinets)
}

pub fn load_shelves(config: &FleetConfig) -> Result<Vec<Shelf>> {
    let mut shelves = Vec::new();
    for (id, section) in config.numbered_sections("shelf")? {
        let Count(cabinet_id) = config.require(&section, "cabinet")?;
        let Count(column) = config.require(&section, "column")?;
        let column_index = u32::try_from(column)
            .map_err(|_| invalid(&section, "column", "column index out of range"))?;

        shelves.push(Shelf {
            id,
            cabinet_id: Some(cabinet_id),
            name: config
                .get_parsed(&section, "name")?
                .unwrap_or_else(|| section.clone()),
            column_index,
            is_open: config.get_parsed(&section, "open")?.unwrap_or(false),
            open_command: command_option(config, &section, "open_command")?,
            close_command: command_option(config, &section, "close_command")?,
        });
    }
    Ok(shelves)
}

/// Build the in-memory store holding every configured cabinet and shelf
pub fn load_store(config: &FleetConfig) -> Result<MemoryStore> {
    let cabinets = load_cabinets(config)?;
    let shelves = load_shelves(config)?;

    for shelf in &shelves {
        if let Some(cabinet_id) = shelf.cabinet_id {
            if !cabinets.iter().any(|c| c.id == cabinet_id) {
                tracing::warn!(
                    shelf_id = shelf.id,
                    cabinet_id,
                    "Shelf refers to a cabinet that is not configured"
                );
            }
        }
    }

    tracing::debug!(
        "Loaded {} cabinet(s) and {} shelf record(s)",
        cabinets.len(),
        shelves.len()
    );
    Ok(MemoryStore::with_records(cabinets, shelves))
}

fn command_option(config: &FleetConfig, section: &str, key: &str) -> Result<Option<String>> {
    match config.get(section, key) {
        None => Ok(None),
        Some(raw) => cabinetproto::normalize(raw).map_err(|e| invalid(section, key, &e.to_string())),
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> ListenerError {
    ListenerError::Config(ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLEET: &str = r#"
[cabinet.1]
name = Archive A
host = 192.168.1.50
function_byte = 01
checksum_offset = 0x0A

[cabinet.2]
host = 192.168.1.51
port = 9000
function_byte = 03
checksum_offset = 12
active = false

[shelf.7]
cabinet = 1
column = 2
name = Left wall
open_command = 68-04-09-01-03-0d

[shelf.8]
cabinet = 1
column = 5
open = yes
"#;

    #[test]
    fn test_load_cabinets() {
        let config = FleetConfig::parse(FLEET).unwrap();
        let cabinets = load_cabinets(&config).unwrap();

        assert_eq!(cabinets.len(), 2);
        assert_eq!(cabinets[0].name, "Archive A");
        assert_eq!(cabinets[0].port, DEFAULT_CABINET_PORT);
        assert_eq!(cabinets[0].checksum_offset, 10);
        assert!(cabinets[0].active);
        assert_eq!(cabinets[1].name, "cabinet.2");
        assert_eq!(cabinets[1].addr(), "192.168.1.51:9000");
        assert_eq!(cabinets[1].function_byte, 0x03);
        assert!(!cabinets[1].active);
    }

    #[test]
    fn test_load_shelves() {
        let config = FleetConfig::parse(FLEET).unwrap();
        let shelves = load_shelves(&config).unwrap();

        assert_eq!(shelves.len(), 2);
        assert_eq!(shelves[0].cabinet_id, Some(1));
        assert_eq!(shelves[0].column_index, 2);
        assert_eq!(shelves[0].open_command.as_deref(), Some("68 04 09 01 03 0D"));
        assert_eq!(shelves[0].close_command, None);
        assert!(shelves[1].is_open);
    }

    #[test]
    fn test_missing_host_is_an_error() {
        let config = FleetConfig::parse("[cabinet.1]\nport = 8080\n").unwrap();
        assert!(matches!(
            load_cabinets(&config),
            Err(ListenerError::Config(ConfigError::MissingOption(_)))
        ));
    }

    #[test]
    fn test_malformed_command_is_an_error() {
        let config =
            FleetConfig::parse("[shelf.1]\ncabinet = 1\ncolumn = 0\nclose_command = 680\n").unwrap();
        assert!(matches!(
            load_shelves(&config),
            Err(ListenerError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[tokio::test]
    async fn test_load_store() {
        let config = FleetConfig::parse(FLEET).unwrap();
        let store = load_store(&config).unwrap();
        assert!(store.cabinet(2).await.is_some());
        assert_eq!(store.shelf(7).await.unwrap().name, "Left wall");
    }
}
