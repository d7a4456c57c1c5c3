//! A single registered I/O endpoint, spec §4.1.
//!
//! Mirrors the teacher's pattern of wrapping a raw socket in a small worker
//! object that owns its receive/send buffers (`bytes::BytesMut`), rather
//! than exposing the socket directly to the scheduler.

use std::io::{self, Read, Write};

use bytes::BytesMut;
use mio::event::Source;

/// Anything `IoMultiplexer` can poll and shuttle bytes through.
pub trait Endpoint: Read + Write + Source + Send {}
impl<T: Read + Write + Source + Send> Endpoint for T {}

const RECV_CHUNK: usize = 8192;

pub struct Worker {
    endpoint: Box<dyn Endpoint>,
    recv_buf: BytesMut,
    send_buf: BytesMut,
    closed: bool,
}

impl Worker {
    pub fn new(endpoint: impl Endpoint + 'static) -> Worker {
        Worker {
            endpoint: Box::new(endpoint),
            recv_buf: BytesMut::new(),
            send_buf: BytesMut::new(),
            closed: false,
        }
    }

    pub fn source(&mut self) -> &mut dyn Source {
        &mut *self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn mark_closed(&mut self) {
        self.closed = true;
    }

    /// Bytes buffered from the remote end, oldest first.
    pub fn received(&self) -> &[u8] {
        &self.recv_buf
    }

    pub fn consume_received(&mut self, n: usize) {
        let _ = self.recv_buf.split_to(n.min(self.recv_buf.len()));
    }

    /// Queue bytes to be sent as the worker becomes writable. Fire-and-forget
    /// (spec §4.1 / §4.2, matching the original `IOWorker.send`).
    pub fn queue_send(&mut self, data: &[u8]) {
        self.send_buf.extend_from_slice(data);
    }

    pub fn has_pending_send(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Reads one chunk. `Ok(true)` if data arrived and was buffered,
    /// `Ok(false)` on a clean EOF (empty read — the remote end closed and
    /// this worker must be closed per spec §4.1).
    pub fn service_readable(&mut self) -> io::Result<bool> {
        let mut chunk = [0u8; RECV_CHUNK];
        match self.endpoint.read(&mut chunk) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.recv_buf.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Flushes as much of the send buffer as the endpoint accepts right now.
    pub fn service_writable(&mut self) -> io::Result<()> {
        if self.send_buf.is_empty() {
            return Ok(());
        }
        match self.endpoint.write(&self.send_buf) {
            Ok(n) if n > 0 => {
                let _ = self.send_buf.split_to(n);
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}
