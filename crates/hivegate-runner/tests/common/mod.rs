//! Shared fixtures for the gateway integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;

use crossbeam_channel::{Receiver, Sender};
use hivegate_packet::{RawRecord, SensorRecord, RECORD_SIZE};
use hivegate_runner::{DatagramSource, Readiness};
use hivegate_sink::{RenderError, Renderer, SendError, Sink};

/// The bench record: device 1, sequence 2, 2018-08-12 15:25:30 at Tokyo
/// station, big-endian.
pub fn bench_record() -> RawRecord {
    let mut r = [0u8; RECORD_SIZE];
    r[..9].copy_from_slice(&[1, 2, 1, 18, 8, 12, 15, 25, 30]);
    r[9..13].copy_from_slice(&35_681_167u32.to_be_bytes());
    r[13..17].copy_from_slice(&139_767_052u32.to_be_bytes());
    let words: [u16; 13] = [101, 201, 301, 401, 112, 222, 332, 442, 123, 223, 323, 423, 501];
    for (i, w) in words.iter().enumerate() {
        let at = 17 + 2 * i;
        r[at..at + 2].copy_from_slice(&w.to_be_bytes());
    }
    r
}

/// The bench record for another device and sequence number.
pub fn record_for(device_id: u8, seq_no: u8) -> RawRecord {
    let mut r = bench_record();
    r[0] = device_id;
    r[1] = seq_no;
    r
}

/// Routed line of the bench record on channel 1.
pub const BENCH_ROUTED_LINE: &str = "write,01-01,180812152530,139.767052,35.681167,\
     10.1,11.2,12.3,20.1,22.2,22.3,30.1,33.2,32.3,40.1,44.2,42.3,5.01";

/// Plain line of the bench record.
pub const BENCH_PLAIN_LINE: &str = "1,2,1,18,8,12,15,25,30,35.681167,139.767052,\
     10.1,20.1,30.1,40.1,11.2,22.2,33.2,44.2,12.3,22.3,32.3,42.3,5.01";

/// A source that replays a fixed list of datagrams, then reports idle.
#[derive(Default)]
pub struct ScriptedSource {
    queue: VecDeque<io::Result<Vec<u8>>>,
}

impl ScriptedSource {
    pub fn new<I, D>(datagrams: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: AsRef<[u8]>,
    {
        ScriptedSource {
            queue: datagrams.into_iter().map(|d| Ok(d.as_ref().to_vec())).collect(),
        }
    }

    /// Append a fatal receive error.
    pub fn then_fail(mut self) -> Self {
        self.queue
            .push_back(Err(io::Error::new(io::ErrorKind::ConnectionAborted, "source gone")));
        self
    }
}

impl DatagramSource for ScriptedSource {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Readiness> {
        match self.queue.pop_front() {
            Some(Ok(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(Readiness::Datagram(len))
            }
            Some(Err(e)) => Err(e),
            None => Ok(Readiness::Idle),
        }
    }
}

/// A sink that renders with a real renderer and hands lines to a channel.
pub struct CaptureSink {
    name: String,
    renderer: Renderer,
    tx: Sender<String>,
}

impl CaptureSink {
    pub fn new(name: &str, renderer: Renderer) -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            CaptureSink {
                name: name.to_string(),
                renderer,
                tx,
            },
            rx,
        )
    }
}

impl Sink for CaptureSink {
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
        self.tx.send(line.to_string()).map_err(|_| {
            SendError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"))
        })
    }
}
