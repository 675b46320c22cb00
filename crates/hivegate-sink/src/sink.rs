//! Sink interface and the downstream transports.

use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

use bytes::{BufMut, BytesMut};
use hivegate_packet::SensorRecord;

use crate::{RenderError, Renderer, SendError, SinkError, SinkResult};

/// Default address of the spreadsheet collector.
pub const DEFAULT_COLLECTOR_ADDR: &str = "127.0.0.1:50910";

/// Terminator appended to every line sent over UDP.
pub const LINE_TERMINATOR: u8 = 0;

/// Command that makes the spreadsheet collector exit.
pub const CLOSE_COMMAND: &str = "close";

/// A downstream destination for rendered records.
///
/// `open` and `close` run once per process; `render` and `forward` run once
/// per accepted record.
pub trait Sink {
    /// Name used in logs and metric labels.
    fn name(&self) -> &str;

    /// Set up the outbound connection.
    fn open(&mut self) -> SinkResult<()> {
        Ok(())
    }

    /// Render a record in the layout this sink expects.
    fn render(
        &self,
        channel_id: u8,
        device_id: u8,
        record: &SensorRecord,
    ) -> Result<String, RenderError>;

    /// Deliver one rendered line.
    fn forward(&mut self, line: &str) -> Result<(), SendError>;

    /// Tear down the outbound connection.
    fn close(&mut self) {}
}

/// Sends each line as one NUL-terminated UDP datagram.
#[derive(Debug)]
pub struct UdpSink {
    name: String,
    destination: SocketAddr,
    renderer: Renderer,
    socket: Option<UdpSocket>,
    send_close_on_shutdown: bool,
}

impl UdpSink {
    /// Create a sink for `destination`. Call [`Sink::open`] before forwarding.
    pub fn new(name: impl Into<String>, destination: SocketAddr, renderer: Renderer) -> Self {
        UdpSink {
            name: name.into(),
            destination,
            renderer,
            socket: None,
            send_close_on_shutdown: false,
        }
    }

    /// Send the collector's `close` command when the sink is closed.
    pub fn with_close_on_shutdown(mut self, enabled: bool) -> Self {
        self.send_close_on_shutdown = enabled;
        self
    }

    /// Where lines are sent.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Local address of the outbound socket, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn send_datagram(&self, payload: &[u8]) -> Result<(), SendError> {
        let socket = self.socket.as_ref().ok_or(SendError::NotOpen)?;
        let sent = socket.send_to(payload, self.destination)?;
        if sent != payload.len() {
            return Err(SendError::ShortWrite {
                sent,
                expected: payload.len(),
            });
        }
        Ok(())
    }
}

impl Sink for UdpSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> SinkResult<()> {
        let bind_addr: SocketAddr = match self.destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).map_err(|source| SinkError::Open {
            name: self.name.clone(),
            source,
        })?;
        log::debug!("Sink {} sending to {}", self.name, self.destination);
        self.socket = Some(socket);
        Ok(())
    }

    fn render(
        &self,
        channel_id: u8,
        device_id: u8,
        record: &SensorRecord,
    ) -> Result<String, RenderError> {
        self.renderer.render(channel_id, device_id, record)
    }

    fn forward(&mut self, line: &str) -> Result<(), SendError> {
        let mut datagram = BytesMut::with_capacity(line.len() + 1);
        datagram.put_slice(line.as_bytes());
        datagram.put_u8(LINE_TERMINATOR);
        self.send_datagram(&datagram)
    }

    fn close(&mut self) {
        if self.send_close_on_shutdown && self.socket.is_some() {
            if let Err(e) = self.send_datagram(CLOSE_COMMAND.as_bytes()) {
                log::warn!("Sink {} failed to send close: {}", self.name, e);
            }
        }
        self.socket = None;
    }
}

/// Writes each line, newline terminated, to a byte stream.
///
/// With [`WriterSink::stdout`] this is the gateway's local fallback when no
/// collector is running.
pub struct WriterSink<W: Write> {
    name: String,
    renderer: Renderer,
    writer: W,
}

impl WriterSink<io::Stdout> {
    /// A sink printing to standard output.
    pub fn stdout(name: impl Into<String>, renderer: Renderer) -> Self {
        WriterSink::new(name, renderer, io::stdout())
    }
}

impl<W: Write> WriterSink<W> {
    /// Wrap an arbitrary writer.
    pub fn new(name: impl Into<String>, renderer: Renderer, writer: W) -> Self {
        WriterSink {
            name: name.into(),
            renderer,
            writer,
        }
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for WriterSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn render(
        &self,
        channel_id: u8,
        device_id: u8,
        record: &SensorRecord,
    ) -> Result<String, RenderError> {
        self.renderer.render(channel_id, device_id, record)
    }

    fn forward(&mut self, line: &str) -> Result<(), SendError> {
        let mut buf = BytesMut::with_capacity(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("Sink {} failed to flush: {}", self.name, e);
        }
    }
}
