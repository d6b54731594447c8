//! Outbound commands to cabinet controllers
//!
//! Connections are pooled per `host:port` and reused across commands.
//! Establishing one is retried with a linearly growing delay. A write that
//! fails on a pooled connection drops it, reconnects once and writes again.

use crate::connector::{BoxStream, Connector};
use crate::error::{ListenerError, Result};
use crate::options::CommandOptions;
use crate::store::CabinetStore;
use crate::types::{Cabinet, Shelf, ShelfOperation};
use cabinetproto::command::{display, panel_byte};
use cabinetproto::{to_binary, OpenPanelCommand};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct CommandSender {
    options: CommandOptions,
    connector: Arc<dyn Connector>,
    store: Arc<dyn CabinetStore>,
    pool: Mutex<HashMap<String, BoxStream>>,
}

impl CommandSender {
    pub fn new(
        options: CommandOptions,
        connector: Arc<dyn Connector>,
        store: Arc<dyn CabinetStore>,
    ) -> Self {
        Self {
            options,
            connector,
            store,
            pool: Mutex::new(HashMap::new()),
        }
    }

    /// Send the generated open packet for `panel_id`
    pub async fn send_open_command(&self, cabinet: &Cabinet, panel_id: u8) -> Result<()> {
        let command = OpenPanelCommand::new(cabinet.function_byte, panel_id, cabinet.checksum_offset);
        info!(cabinet_id = cabinet.id, panel_id, "Opening panel");
        self.send_bytes(cabinet, &command.encode()).await
    }

    /// Send the command configured for `shelf`
    ///
    /// Returns `Ok(false)` when closing a shelf that has no close command;
    /// nothing is sent in that case. Opening without a configured command
    /// falls back to the generated open packet for the shelf's panel.
    pub async fn send_shelf_command(
        &self,
        cabinet: &Cabinet,
        shelf: &Shelf,
        operation: ShelfOperation,
    ) -> Result<bool> {
        if shelf.cabinet_id.is_none() {
            return Err(ListenerError::UnlinkedShelf(shelf.id));
        }

        match operation {
            ShelfOperation::Open => match &shelf.open_command {
                Some(command) => self.send_hex(cabinet, command).await?,
                None => {
                    let panel = (i64::from(shelf.column_index) + 1).max(1);
                    self.send_open_command(cabinet, panel_byte(panel)?).await?
                }
            },
            ShelfOperation::Close => match &shelf.close_command {
                Some(command) => self.send_hex(cabinet, command).await?,
                None => {
                    debug!(shelf_id = shelf.id, "No close command configured, nothing sent");
                    return Ok(false);
                }
            },
        }
        Ok(true)
    }

    /// Decode `text` as hex and send the raw bytes
    pub async fn send_hex(&self, cabinet: &Cabinet, text: &str) -> Result<()> {
        let bytes = to_binary(text)?;
        self.send_bytes(cabinet, &bytes).await
    }

    /// Drop the pooled connection to `cabinet`, if any
    pub async fn close_connection(&self, cabinet: &Cabinet) -> bool {
        let removed = self.pool.lock().await.remove(&cabinet.addr());
        match removed {
            Some(mut stream) => {
                let _ = stream.shutdown().await;
                debug!(cabinet_id = cabinet.id, "Closed command connection");
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&self) {
        let drained: Vec<(String, BoxStream)> = self.pool.lock().await.drain().collect();
        for (addr, mut stream) in drained {
            let _ = stream.shutdown().await;
            debug!("Closed command connection to {}", addr);
        }
    }

    pub async fn pooled(&self) -> usize {
        self.pool.lock().await.len()
    }

    /// Check that `host:port` accepts connections
    pub async fn probe(&self, host: &str, port: u16) -> bool {
        let timeout = self.options.probe_timeout();
        match tokio::time::timeout(timeout, self.connector.connect(host, port)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                true
            }
            Ok(Err(e)) => {
                debug!("Probe of {}:{} failed: {}", host, port, e);
                false
            }
            Err(_) => {
                debug!("Probe of {}:{} timed out after {:?}", host, port, timeout);
                false
            }
        }
    }

    async fn send_bytes(&self, cabinet: &Cabinet, bytes: &[u8]) -> Result<()> {
        let key = cabinet.addr();

        // The stream leaves the pool while in use so a slow connect to one
        // controller never holds up commands to the others.
        let pooled = self.pool.lock().await.remove(&key);
        let mut stream = match pooled {
            Some(stream) => stream,
            None => self.acquire(cabinet).await?,
        };

        if let Err(e) = write_command(&mut stream, bytes).await {
            warn!(cabinet_id = cabinet.id, "Write on pooled connection failed, reconnecting: {}", e);
            let _ = stream.shutdown().await;
            stream = self.acquire(cabinet).await?;
            write_command(&mut stream, bytes)
                .await
                .map_err(|source| ListenerError::Write {
                    cabinet_id: cabinet.id,
                    source,
                })?;
        }

        let displaced = self.pool.lock().await.insert(key, stream);
        if let Some(mut extra) = displaced {
            let _ = extra.shutdown().await;
        }

        let hex = display(bytes);
        info!(cabinet_id = cabinet.id, hex = %hex, "Command sent");
        if let Err(e) = self.store.touch_cabinet(cabinet.id, SystemTime::now()).await {
            error!(cabinet_id = cabinet.id, "Failed to refresh last-seen time: {}", e);
        }
        Ok(())
    }

    async fn acquire(&self, cabinet: &Cabinet) -> Result<BoxStream> {
        let attempts = self.options.attempts();
        let timeout = self.options.command_timeout();
        let mut last_error = None;

        for attempt in 1..=attempts {
            let err = match tokio::time::timeout(timeout, self.connector.connect(&cabinet.host, cabinet.port)).await {
                Ok(Ok(stream)) => {
                    debug!(cabinet_id = cabinet.id, attempt, "Command connection established");
                    return Ok(stream);
                }
                Ok(Err(source)) => ListenerError::Connect {
                    cabinet_id: cabinet.id,
                    addr: cabinet.addr(),
                    source,
                },
                Err(_) => ListenerError::ConnectTimeout {
                    cabinet_id: cabinet.id,
                    addr: cabinet.addr(),
                    timeout,
                },
            };

            warn!(cabinet_id = cabinet.id, attempt, attempts, "{}", err);
            last_error = Some(err);
            if attempt < attempts {
                tokio::time::sleep(self.options.retry_delay() * attempt).await;
            }
        }

        Err(last_error.unwrap_or(ListenerError::UnknownCabinet(cabinet.id)))
    }
}

async fn write_command(stream: &mut BoxStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}
