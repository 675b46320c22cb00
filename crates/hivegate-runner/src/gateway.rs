//! The validate, deduplicate, render and forward loop.
//!
//! A [`Gateway`] owns one inbound [`DatagramSource`], the [`DedupStore`] and
//! one [`Sink`] per channel. [`Gateway::run`] waits on the source with a
//! bounded timeout, processes each datagram to completion, and checks the
//! [`CancelToken`] once per iteration. Channels are serialized through the
//! single loop.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hivegate_metrics::{metric_defs, MetricLabels};
use hivegate_packet::{validate, CodecConfig, FrameLimits, RejectReason, SensorRecord};
use hivegate_sink::{routing_label, Sink, SinkError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, GatewayConfig};
use crate::dedup::DedupStore;
use crate::source::{DatagramSource, Readiness, RECV_BUFFER_SIZE};

/// Errors that stop the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every channel needs exactly one sink.
    #[error("expected one sink per channel ({expected}), got {actual}")]
    RouteCount { expected: usize, actual: usize },

    /// The configuration is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A sink failed to open.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The inbound source failed.
    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),
}

/// Shared shutdown flag.
///
/// Clones observe the same flag; the loop checks it once per iteration, so a
/// request takes effect within one poll timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Waiting for input.
    Idle,
    /// A datagram has been read.
    Readable,
    /// A datagram is being validated and forwarded.
    Processing,
    /// The loop has exited and sinks are closed.
    Shutdown,
}

/// What happened to one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Rendered and delivered to the channel's sink.
    Forwarded,
    /// Identical to the device's last accepted record.
    Duplicate,
    /// Failed validation.
    Rejected(RejectReason),
    /// Accepted but could not be rendered.
    RenderFailed,
    /// Rendered but the sink could not deliver it.
    SendFailed,
}

/// Counters over the life of a gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Non-empty datagrams processed.
    pub received: u64,
    /// Records delivered.
    pub forwarded: u64,
    /// Records suppressed as duplicates.
    pub duplicates: u64,
    /// Datagrams that failed validation.
    pub rejected: u64,
    /// Records that could not be rendered.
    pub render_failed: u64,
    /// Records a sink failed to deliver.
    pub send_failed: u64,
}

impl GatewayStats {
    fn record(&mut self, outcome: Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Forwarded => self.forwarded += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::Rejected(_) => self.rejected += 1,
            Outcome::RenderFailed => self.render_failed += 1,
            Outcome::SendFailed => self.send_failed += 1,
        }
    }
}

struct Route {
    sink: Box<dyn Sink>,
    labels: Vec<(&'static str, String)>,
    open: bool,
}

/// The gateway pipeline.
pub struct Gateway<S> {
    source: S,
    limits: FrameLimits,
    codec: CodecConfig,
    dedup: DedupStore,
    routes: Vec<Route>,
    cancel: CancelToken,
    state: GatewayState,
    stats: GatewayStats,
    buf: Vec<u8>,
}

impl<S: DatagramSource> Gateway<S> {
    /// Create a gateway. `sinks[c]` receives the records of channel `c`.
    pub fn new(
        source: S,
        limits: FrameLimits,
        codec: CodecConfig,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Result<Self, GatewayError> {
        if sinks.len() != limits.max_channels as usize {
            return Err(GatewayError::RouteCount {
                expected: limits.max_channels as usize,
                actual: sinks.len(),
            });
        }
        let routes = sinks
            .into_iter()
            .enumerate()
            .map(|(channel, sink)| Route {
                labels: MetricLabels::new(channel as u8, sink.name()).to_labels(),
                sink,
                open: false,
            })
            .collect();

        Ok(Gateway {
            source,
            limits,
            codec,
            dedup: DedupStore::new(limits.max_channels, limits.max_devices),
            routes,
            cancel: CancelToken::new(),
            state: GatewayState::Idle,
            stats: GatewayStats::default(),
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Create a gateway with the limits, codec and sinks in `config`.
    ///
    /// The configuration is validated first, so every channel has exactly
    /// one sink of its own.
    pub fn from_config(source: S, config: &GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        Self::new(source, config.frame_limits(), config.codec, config.build_sinks())
    }

    /// Use `token` to request shutdown.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that stops [`Gateway::run`] when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current loop state.
    pub fn state(&self) -> GatewayState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    /// The last-record store.
    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Run every sink's open hook. If one fails, the sinks already opened
    /// are closed again, the gateway enters [`GatewayState::Shutdown`] and the
    /// error is returned.
    pub fn open(&mut self) -> Result<(), GatewayError> {
        for index in 0..self.routes.len() {
            let route = &mut self.routes[index];
            if route.open {
                continue;
            }
            if let Err(e) = route.sink.open() {
                error!("Failed to open sink {}: {}", route.sink.name(), e);
                self.shutdown();
                return Err(e.into());
            }
            route.open = true;
            debug!("Channel {} -> sink {}", index, route.sink.name());
        }
        Ok(())
    }

    /// Run until cancelled or the source fails, then close every sink.
    pub fn run(&mut self) -> Result<GatewayStats, GatewayError> {
        self.open()?;
        info!("Gateway running with {} channels", self.routes.len());

        let result = loop {
            if self.cancel.is_cancelled() {
                info!("Shutdown requested");
                break Ok(());
            }
            if let Err(e) = self.poll_once() {
                break Err(e);
            }
        };

        self.shutdown();
        let stats = self.stats;
        info!(
            "Gateway stopped: received={} forwarded={} duplicates={} rejected={} \
             render_failed={} send_failed={}",
            stats.received,
            stats.forwarded,
            stats.duplicates,
            stats.rejected,
            stats.render_failed,
            stats.send_failed
        );
        result.map(|()| stats)
    }

    /// Wait once for input and process it.
    ///
    /// Returns `None` when the wait timed out or the datagram was empty.
    pub fn poll_once(&mut self) -> Result<Option<Outcome>, GatewayError> {
        self.state = GatewayState::Idle;
        let len = match self.source.recv_datagram(&mut self.buf) {
            Ok(Readiness::Datagram(len)) => len,
            Ok(Readiness::Idle) => return Ok(None),
            Err(e) => {
                error!("Receive failed: {}", e);
                self.state = GatewayState::Shutdown;
                return Err(GatewayError::Recv(e));
            }
        };
        self.state = GatewayState::Readable;

        if len == 0 {
            debug!("Ignoring empty datagram");
            self.state = GatewayState::Idle;
            return Ok(None);
        }

        let datagram = std::mem::take(&mut self.buf);
        let outcome = self.process_datagram(&datagram[..len.min(datagram.len())]);
        self.buf = datagram;
        self.state = GatewayState::Idle;
        Ok(Some(outcome))
    }

    /// Validate, deduplicate, render and forward one datagram.
    pub fn process_datagram(&mut self, datagram: &[u8]) -> Outcome {
        self.state = GatewayState::Processing;
        let started = Instant::now();
        metrics::counter!(metric_defs::DATAGRAMS_RECEIVED.name).increment(1);

        let outcome = self.dispatch(datagram);

        self.stats.record(outcome);
        metrics::histogram!(metric_defs::PIPELINE_PROCESS_TIME.name)
            .record(started.elapsed().as_secs_f64() * 1_000_000.0);
        outcome
    }

    fn dispatch(&mut self, datagram: &[u8]) -> Outcome {
        let packet = match validate(datagram, &self.limits) {
            Ok(packet) => packet,
            Err(reason) => {
                warn!("Discarding datagram ({}): {}", reason, hex::encode(datagram));
                let reason_label = reason.as_str();
                metrics::counter!(metric_defs::DATAGRAMS_REJECTED.name, "reason" => reason_label)
                    .increment(1);
                return Outcome::Rejected(reason);
            }
        };

        let channel_id = packet.channel_id;
        let device_id = packet.device_id;
        let route = &mut self.routes[channel_id as usize];

        // The entry stays committed even if rendering or sending fails below.
        if !self.dedup.is_new_and_commit(channel_id, device_id, packet.record) {
            debug!("Duplicate record from {}", routing_label(channel_id, device_id));
            metrics::counter!(metric_defs::RECORDS_DUPLICATE.name, &route.labels).increment(1);
            return Outcome::Duplicate;
        }

        let record = SensorRecord::decode(packet.record, &self.codec);
        let line = match route.sink.render(channel_id, device_id, &record) {
            Ok(line) => line,
            Err(e) => {
                error!(
                    "Failed to render record from {}: {}",
                    routing_label(channel_id, device_id),
                    e
                );
                metrics::counter!(metric_defs::RECORDS_RENDER_FAILED.name, &route.labels)
                    .increment(1);
                return Outcome::RenderFailed;
            }
        };

        match route.sink.forward(&line) {
            Ok(()) => {
                info!(
                    "{} -> {}: {}",
                    routing_label(channel_id, device_id),
                    route.sink.name(),
                    line
                );
                metrics::counter!(metric_defs::RECORDS_FORWARDED.name, &route.labels).increment(1);
                Outcome::Forwarded
            }
            Err(e) => {
                error!("Sink {} failed to forward: {}", route.sink.name(), e);
                metrics::counter!(metric_defs::RECORDS_SEND_FAILED.name, &route.labels)
                    .increment(1);
                Outcome::SendFailed
            }
        }
    }
}

impl<S> Gateway<S> {
    /// Close every open sink and enter [`GatewayState::Shutdown`].
    ///
    /// Each sink's close hook runs at most once no matter how often this is
    /// called.
    pub fn shutdown(&mut self) {
        self.close_routes();
        self.state = GatewayState::Shutdown;
    }

    fn close_routes(&mut self) {
        for route in self.routes.iter_mut().filter(|r| r.open) {
            route.sink.close();
            route.open = false;
            debug!("Closed sink {}", route.sink.name());
        }
    }
}

impl<S> Drop for Gateway<S> {
    fn drop(&mut self) {
        self.close_routes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivegate_packet::{encode_datagram, RawRecord, DATAGRAM_SIZE, RECORD_SIZE};
    use crate::config::{RouteConfig, SinkConfig};
    use hivegate_sink::{RenderError, Schema, SendError, SinkResult};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Script(VecDeque<io::Result<Vec<u8>>>);

    impl DatagramSource for Script {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Readiness> {
            match self.0.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(Readiness::Datagram(bytes.len()))
                }
                Some(Err(e)) => Err(e),
                None => Ok(Readiness::Idle),
            }
        }
    }

    #[derive(Default)]
    struct Journal {
        opened: u32,
        closed: u32,
        lines: Vec<String>,
    }

    struct RecordingSink {
        name: String,
        journal: Arc<Mutex<Journal>>,
        fail_open: bool,
        fail_render: bool,
        fail_send: bool,
    }

    impl RecordingSink {
        fn new(name: &str, journal: &Arc<Mutex<Journal>>) -> Self {
            RecordingSink {
                name: name.to_string(),
                journal: Arc::clone(journal),
                fail_open: false,
                fail_render: false,
                fail_send: false,
            }
        }
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn open(&mut self) -> SinkResult<()> {
            if self.fail_open {
                return Err(SinkError::Open {
                    name: self.name.clone(),
                    source: io::Error::new(io::ErrorKind::AddrInUse, "busy"),
                });
            }
            self.journal.lock().unwrap().opened += 1;
            Ok(())
        }

        fn render(
            &self,
            channel_id: u8,
            device_id: u8,
            record: &SensorRecord,
        ) -> Result<String, RenderError> {
            if self.fail_render {
                return Err(RenderError::Overflow { max: 1, actual: 2 });
            }
            Ok(format!("{}-{}-{}", channel_id, device_id, record.seq_no))
        }

        fn forward(&mut self, line: &str) -> Result<(), SendError> {
            if self.fail_send {
                return Err(SendError::ShortWrite { sent: 0, expected: line.len() + 1 });
            }
            self.journal.lock().unwrap().lines.push(line.to_string());
            Ok(())
        }

        fn close(&mut self) {
            self.journal.lock().unwrap().closed += 1;
        }
    }

    fn record(device_id: u8, seq_no: u8) -> RawRecord {
        let mut r = [0u8; RECORD_SIZE];
        r[0] = device_id;
        r[1] = seq_no;
        r
    }

    fn gateway_with(sinks: Vec<RecordingSink>, script: Script) -> Gateway<Script> {
        let sinks = sinks.into_iter().map(|s| Box::new(s) as Box<dyn Sink>).collect();
        Gateway::new(script, FrameLimits::default(), CodecConfig::default(), sinks).unwrap()
    }

    fn two_channels(journal: &Arc<Mutex<Journal>>) -> Vec<RecordingSink> {
        vec![RecordingSink::new("a", journal), RecordingSink::new("b", journal)]
    }

    #[test]
    fn test_route_count_must_match_channels() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let sinks: Vec<Box<dyn Sink>> = vec![Box::new(RecordingSink::new("a", &journal))];
        let limits = FrameLimits::default();
        let err = Gateway::new(Script::default(), limits, CodecConfig::default(), sinks)
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::RouteCount { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_forward_then_duplicate() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut gateway = gateway_with(two_channels(&journal), Script::default());
        gateway.open().unwrap();

        let datagram = encode_datagram(1, &record(5, 9));
        assert_eq!(gateway.process_datagram(&datagram), Outcome::Forwarded);
        assert_eq!(gateway.process_datagram(&datagram), Outcome::Duplicate);
        assert_eq!(journal.lock().unwrap().lines, vec!["1-5-9"]);
        assert_eq!(gateway.dedup().entry(1, 5), &record(5, 9));
    }

    #[test]
    fn test_rejected_datagram_leaves_store_untouched() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut gateway = gateway_with(two_channels(&journal), Script::default());
        gateway.open().unwrap();

        let mut datagram = encode_datagram(1, &record(5, 9));
        datagram[0] = 0x11;
        assert!(matches!(
            gateway.process_datagram(&datagram),
            Outcome::Rejected(RejectReason::BadVersion { .. })
        ));
        assert_eq!(
            gateway.process_datagram(&datagram[..DATAGRAM_SIZE - 1]),
            Outcome::Rejected(RejectReason::BadLength {
                expected: DATAGRAM_SIZE,
                actual: DATAGRAM_SIZE - 1
            })
        );
        assert_eq!(gateway.dedup().entry(1, 5), &[0u8; RECORD_SIZE]);
        assert!(journal.lock().unwrap().lines.is_empty());
        assert_eq!(gateway.stats().rejected, 2);
    }

    #[test]
    fn test_render_failure_keeps_entry() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut sinks = two_channels(&journal);
        sinks[0].fail_render = true;
        let mut gateway = gateway_with(sinks, Script::default());
        gateway.open().unwrap();

        let datagram = encode_datagram(0, &record(3, 1));
        assert_eq!(gateway.process_datagram(&datagram), Outcome::RenderFailed);
        // The retransmission is still suppressed.
        assert_eq!(gateway.process_datagram(&datagram), Outcome::Duplicate);
    }

    #[test]
    fn test_send_failure_is_counted() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut sinks = two_channels(&journal);
        sinks[1].fail_send = true;
        let mut gateway = gateway_with(sinks, Script::default());
        gateway.open().unwrap();

        let to_failing = encode_datagram(1, &record(3, 1));
        let to_working = encode_datagram(0, &record(3, 1));
        assert_eq!(gateway.process_datagram(&to_failing), Outcome::SendFailed);
        assert_eq!(gateway.process_datagram(&to_working), Outcome::Forwarded);
        let stats = gateway.stats();
        assert_eq!(stats.send_failed, 1);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.received, 2);
    }

    #[test]
    fn test_open_failure_closes_opened_sinks() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut sinks = two_channels(&journal);
        sinks[1].fail_open = true;
        let mut gateway = gateway_with(sinks, Script::default());

        assert!(matches!(gateway.open(), Err(GatewayError::Sink(_))));
        assert_eq!(gateway.state(), GatewayState::Shutdown);
        let j = journal.lock().unwrap();
        assert_eq!(j.opened, 1);
        assert_eq!(j.closed, 1);
    }

    #[test]
    fn test_run_open_failure_ends_in_shutdown() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut sinks = two_channels(&journal);
        sinks[0].fail_open = true;
        let script = Script(VecDeque::from(vec![Ok(encode_datagram(0, &record(1, 1)).to_vec())]));
        let mut gateway = gateway_with(sinks, script);

        assert!(matches!(gateway.run(), Err(GatewayError::Sink(_))));
        assert_eq!(gateway.state(), GatewayState::Shutdown);
        assert_eq!(gateway.stats().received, 0);
        assert!(journal.lock().unwrap().lines.is_empty());
    }

    fn stdout_route(channel: u8) -> RouteConfig {
        RouteConfig {
            channel,
            sink: SinkConfig::Stdout {
                schema: Schema::Routed,
            },
        }
    }

    #[test]
    fn test_from_config_rejects_duplicate_route() {
        let config = GatewayConfig {
            routes: vec![stdout_route(0), stdout_route(0)],
            ..GatewayConfig::default()
        };
        let err = Gateway::from_config(Script::default(), &config).err().unwrap();
        assert!(matches!(err, GatewayError::Config(ConfigError::Invalid(_))));
        assert!(err.to_string().contains("more than one route"));
    }

    #[test]
    fn test_from_config_rejects_missing_route() {
        let config = GatewayConfig {
            max_channels: 3,
            routes: vec![stdout_route(0), stdout_route(2)],
            ..GatewayConfig::default()
        };
        let err = Gateway::from_config(Script::default(), &config).err().unwrap();
        assert!(err.to_string().contains("channel 1 has no route"));
    }

    #[test]
    fn test_from_config_routes_each_channel() {
        let config = GatewayConfig {
            routes: vec![stdout_route(1), stdout_route(0)],
            ..GatewayConfig::default()
        };
        let gateway = Gateway::from_config(Script::default(), &config).unwrap();
        let names: Vec<&str> = gateway.routes.iter().map(|r| r.sink.name()).collect();
        assert_eq!(names, vec!["stdout-0", "stdout-1"]);
    }

    #[test]
    fn test_poll_once_states() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let script = Script(VecDeque::from(vec![
            Ok(Vec::new()),
            Ok(encode_datagram(0, &record(1, 1)).to_vec()),
            Err(io::Error::new(io::ErrorKind::Other, "socket closed")),
        ]));
        let mut gateway = gateway_with(two_channels(&journal), script);
        gateway.open().unwrap();

        assert_eq!(gateway.poll_once().unwrap(), None);
        assert_eq!(gateway.state(), GatewayState::Idle);
        assert_eq!(gateway.poll_once().unwrap(), Some(Outcome::Forwarded));
        assert_eq!(gateway.state(), GatewayState::Idle);
        assert!(matches!(gateway.poll_once(), Err(GatewayError::Recv(_))));
        assert_eq!(gateway.state(), GatewayState::Shutdown);
        assert_eq!(gateway.stats().received, 1);
    }

    #[test]
    fn test_run_stops_on_fatal_error_and_closes_once() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let script = Script(VecDeque::from(vec![
            Ok(encode_datagram(0, &record(1, 1)).to_vec()),
            Err(io::Error::new(io::ErrorKind::Other, "socket closed")),
        ]));
        let mut gateway = gateway_with(two_channels(&journal), script);

        assert!(gateway.run().is_err());
        assert_eq!(gateway.state(), GatewayState::Shutdown);
        gateway.shutdown();
        drop(gateway);

        let j = journal.lock().unwrap();
        assert_eq!(j.opened, 2);
        assert_eq!(j.closed, 2);
        assert_eq!(j.lines.len(), 1);
    }

    #[test]
    fn test_cancelled_before_run_exits_immediately() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let token = CancelToken::new();
        let mut gateway = gateway_with(two_channels(&journal), Script::default())
            .with_cancel_token(token.clone());
        token.cancel();

        let stats = gateway.run().unwrap();
        assert_eq!(stats, GatewayStats::default());
        assert_eq!(journal.lock().unwrap().closed, 2);
    }

    #[test]
    fn test_cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
