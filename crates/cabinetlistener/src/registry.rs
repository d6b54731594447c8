//! Live inbound connections, one per cabinet
//!
//! The registry is owned by the listener task and never shared, so nothing
//! in here takes a lock. Each entry carries the stream, the frame decoder
//! for that stream and a scratch buffer sized to the read chunk.
//!
//! Readiness is detected by polling every open stream inside a single
//! future. A stream that returns data, end-of-stream or an error is reported
//! back; streams that would block are left alone until the next wait.

use crate::connector::{BoxStream, Connector};
use crate::error::{ListenerError, Result};
use crate::types::{Cabinet, CabinetId, ConnectionState};
use bytes::Bytes;
use cabinetproto::{FrameDecoder, NotificationFrame};
use std::collections::BTreeMap;
use std::io;
use std::pin::Pin;
use std::task::Poll;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tracing::{debug, info, trace, warn};

/// Result of one non-blocking read on a ready stream
#[derive(Debug)]
pub enum ReadOutcome {
    Data(Bytes),
    /// Zero-byte read: the controller closed its end
    Eof,
    Failed(io::Error),
}

struct CabinetConnection {
    addr: String,
    stream: BoxStream,
    decoder: FrameDecoder,
    state: ConnectionState,
    opened_at: Instant,
    last_read: Option<Instant>,
    scratch: Vec<u8>,
}

impl CabinetConnection {
    async fn shutdown(mut self, cabinet_id: CabinetId) {
        if let Err(e) = self.stream.shutdown().await {
            trace!(cabinet_id, "Ignoring shutdown error on {}: {}", self.addr, e);
        }
        debug!(
            cabinet_id,
            "Closed connection to {} after {:?}",
            self.addr,
            self.opened_at.elapsed()
        );
    }
}

pub struct ConnectionRegistry {
    connections: BTreeMap<CabinetId, CabinetConnection>,
    read_chunk: usize,
}

impl ConnectionRegistry {
    pub fn new(read_chunk: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            read_chunk: read_chunk.max(1),
        }
    }

    /// Connect to `cabinet` and register the stream
    ///
    /// An existing entry for the same cabinet is closed and replaced. On
    /// failure the cabinet is left without an entry.
    pub async fn open(
        &mut self,
        cabinet: &Cabinet,
        connector: &dyn Connector,
        timeout: Duration,
    ) -> Result<()> {
        if let Some(old) = self.connections.remove(&cabinet.id) {
            debug!(cabinet_id = cabinet.id, "Replacing existing connection");
            old.shutdown(cabinet.id).await;
        }

        let addr = cabinet.addr();
        let stream = match tokio::time::timeout(timeout, connector.connect(&cabinet.host, cabinet.port)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ListenerError::Connect {
                    cabinet_id: cabinet.id,
                    addr,
                    source,
                })
            }
            Err(_) => {
                return Err(ListenerError::ConnectTimeout {
                    cabinet_id: cabinet.id,
                    addr,
                    timeout,
                })
            }
        };

        info!(cabinet_id = cabinet.id, "Connected to cabinet {}", cabinet);
        self.connections.insert(
            cabinet.id,
            CabinetConnection {
                addr,
                stream,
                decoder: FrameDecoder::new(),
                state: ConnectionState::Open,
                opened_at: Instant::now(),
                last_read: None,
                scratch: vec![0u8; self.read_chunk],
            },
        );
        Ok(())
    }

    /// Shut down and forget the connection for `cabinet_id`
    pub async fn close(&mut self, cabinet_id: CabinetId) -> bool {
        match self.connections.remove(&cabinet_id) {
            Some(conn) => {
                conn.shutdown(cabinet_id).await;
                true
            }
            None => false,
        }
    }

    pub async fn close_all(&mut self) {
        let connections = std::mem::take(&mut self.connections);
        if !connections.is_empty() {
            info!("Closing {} cabinet connection(s)", connections.len());
        }
        for (cabinet_id, conn) in connections {
            conn.shutdown(cabinet_id).await;
        }
    }

    /// Ids of connections that are still polled, in ascending order
    pub fn all_open(&self) -> Vec<CabinetId> {
        self.connections
            .iter()
            .filter(|(_, c)| c.state == ConnectionState::Open)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn state(&self, cabinet_id: CabinetId) -> Option<ConnectionState> {
        self.connections.get(&cabinet_id).map(|c| c.state)
    }

    pub fn is_live(&self, cabinet_id: CabinetId) -> bool {
        self.state(cabinet_id) == Some(ConnectionState::Open)
    }

    pub fn contains(&self, cabinet_id: CabinetId) -> bool {
        self.connections.contains_key(&cabinet_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.connections
            .values()
            .filter(|c| c.state == ConnectionState::Open)
            .count()
    }

    /// When data last arrived on the connection of `cabinet_id`
    pub fn last_read(&self, cabinet_id: CabinetId) -> Option<Instant> {
        self.connections.get(&cabinet_id)?.last_read
    }

    /// Bytes held by the decoder of `cabinet_id` waiting for the rest of a frame
    pub fn buffered(&self, cabinet_id: CabinetId) -> Option<&[u8]> {
        self.connections
            .get(&cabinet_id)
            .map(|c| c.decoder.buffered())
    }

    /// Bytes thrown away while resynchronizing the stream of `cabinet_id`
    pub fn discarded(&self, cabinet_id: CabinetId) -> Option<u64> {
        self.connections.get(&cabinet_id).map(|c| c.decoder.discarded())
    }

    /// Append `data` to the decoder of `cabinet_id` and take every complete frame
    pub fn ingest(&mut self, cabinet_id: CabinetId, data: &[u8]) -> Vec<NotificationFrame> {
        let Some(conn) = self.connections.get_mut(&cabinet_id) else {
            warn!(cabinet_id, "Dropping {} byte(s) for unregistered cabinet", data.len());
            return Vec::new();
        };
        conn.decoder.extend(data);
        let frames = conn.decoder.drain_frames();
        let dropped = conn.decoder.take_dropped();
        if !dropped.is_empty() {
            debug!(
                cabinet_id,
                discarded = dropped.len(),
                hex = %hex::encode(&dropped),
                "Dropped bytes outside any notification frame"
            );
        }
        trace!(
            cabinet_id,
            "Decoded {} frame(s), {} byte(s) left buffered",
            frames.len(),
            conn.decoder.len()
        );
        frames
    }

    /// Wait until at least one open stream yields a read result
    ///
    /// Each ready stream is read once, at most one chunk. End-of-stream marks
    /// the entry `Closed` and it stops being polled; a read error removes the
    /// entry. Returns `None` if nothing became ready within `timeout`.
    pub async fn wait_readable(
        &mut self,
        timeout: Duration,
    ) -> Option<Vec<(CabinetId, ReadOutcome)>> {
        let connections = &mut self.connections;
        let poll_all = std::future::poll_fn(|cx| {
            let mut ready = Vec::new();
            for (cabinet_id, conn) in connections.iter_mut() {
                if conn.state != ConnectionState::Open {
                    continue;
                }
                let mut buf = ReadBuf::new(conn.scratch.as_mut_slice());
                let outcome = match Pin::new(&mut conn.stream).poll_read(cx, &mut buf) {
                    Poll::Pending => continue,
                    Poll::Ready(Ok(())) if buf.filled().is_empty() => ReadOutcome::Eof,
                    Poll::Ready(Ok(())) => ReadOutcome::Data(Bytes::copy_from_slice(buf.filled())),
                    Poll::Ready(Err(e)) => ReadOutcome::Failed(e),
                };
                ready.push((*cabinet_id, outcome));
            }
            if ready.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(ready)
            }
        });

        let ready = tokio::time::timeout(timeout, poll_all).await.ok()?;

        for (cabinet_id, outcome) in &ready {
            match outcome {
                ReadOutcome::Eof => {
                    if let Some(conn) = self.connections.get_mut(cabinet_id) {
                        conn.state = ConnectionState::Closed;
                    }
                }
                ReadOutcome::Failed(_) => {
                    if let Some(conn) = self.connections.remove(cabinet_id) {
                        conn.shutdown(*cabinet_id).await;
                    }
                }
                ReadOutcome::Data(_) => {
                    if let Some(conn) = self.connections.get_mut(cabinet_id) {
                        conn.last_read = Some(Instant::now());
                    }
                }
            }
        }
        Some(ready)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}
