//! Metrics for the SmartHive gateway.
//!
//! Every metric the gateway emits is declared once in [`metric_defs`] as a
//! [`Metric`] constant, so names and label keys cannot drift between the
//! pipeline and whatever scrapes it. The `metrics` crate is re-exported.
//!
//! ```rust,ignore
//! use hivegate_metrics::{metric_defs, MetricLabels};
//!
//! let labels = MetricLabels::new(1, "sheet");
//! metrics::counter!(metric_defs::RECORDS_FORWARDED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Counter, gauge or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic count.
    Counter,
    /// Value that can go up and down.
    Gauge,
    /// Distribution of samples.
    Histogram,
}

impl MetricKind {
    /// Lowercase name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration.
///
/// ```rust
/// use hivegate_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const DROPPED: Metric = Metric::counter("hivegate.example.dropped")
///     .with_description("Datagrams dropped")
///     .with_unit(Unit::Count)
///     .with_labels(&["channel"]);
///
/// assert_eq!(DROPPED.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name.
    pub name: &'static str,
    /// Metric kind.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit, if any.
    pub unit: Option<Unit>,
    /// Label keys the metric is recorded with.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn with_kind(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Histogram)
    }

    /// Set the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description)
            }
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All gateway metrics.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on every route-scoped metric.
    pub const ROUTE_LABELS: &[&str] = &["channel", "sink"];

    /// Datagrams read from the inbound socket, before validation.
    pub const DATAGRAMS_RECEIVED: Metric = Metric::counter("hivegate.datagrams.received")
        .with_description("Datagrams read from the inbound socket")
        .with_unit(Unit::Count);

    /// Datagrams discarded by validation.
    ///
    /// Labels: reason (bad_length, bad_version, bad_type, unknown_channel, unknown_device)
    pub const DATAGRAMS_REJECTED: Metric = Metric::counter("hivegate.datagrams.rejected")
        .with_description("Datagrams discarded by validation")
        .with_unit(Unit::Count)
        .with_labels(&["reason"]);

    /// Records identical to the last accepted record for their device.
    pub const RECORDS_DUPLICATE: Metric = Metric::counter("hivegate.records.duplicate")
        .with_description("Records suppressed as unchanged retransmissions")
        .with_unit(Unit::Count)
        .with_labels(ROUTE_LABELS);

    /// Records delivered to their sink.
    pub const RECORDS_FORWARDED: Metric = Metric::counter("hivegate.records.forwarded")
        .with_description("Records delivered to their sink")
        .with_unit(Unit::Count)
        .with_labels(ROUTE_LABELS);

    /// Records that could not be rendered.
    pub const RECORDS_RENDER_FAILED: Metric = Metric::counter("hivegate.records.render_failed")
        .with_description("Records dropped because rendering failed")
        .with_unit(Unit::Count)
        .with_labels(ROUTE_LABELS);

    /// Records the sink failed to deliver.
    pub const RECORDS_SEND_FAILED: Metric = Metric::counter("hivegate.records.send_failed")
        .with_description("Records dropped because the sink failed")
        .with_unit(Unit::Count)
        .with_labels(ROUTE_LABELS);

    /// Wall-clock time spent on one datagram.
    pub const PIPELINE_PROCESS_TIME: Metric = Metric::histogram("hivegate.pipeline.process_time_us")
        .with_description("Time to validate, deduplicate, render and forward one datagram")
        .with_unit(Unit::Microseconds);

    /// Every metric above.
    pub const ALL: &[&Metric] = &[
        &DATAGRAMS_RECEIVED,
        &DATAGRAMS_REJECTED,
        &RECORDS_DUPLICATE,
        &RECORDS_FORWARDED,
        &RECORDS_RENDER_FAILED,
        &RECORDS_SEND_FAILED,
        &PIPELINE_PROCESS_TIME,
    ];
}

/// Labels identifying one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    /// Inbound channel id.
    pub channel: u8,
    /// Sink name.
    pub sink: String,
}

impl MetricLabels {
    /// Labels for a channel and its sink.
    pub fn new(channel: u8, sink: impl Into<String>) -> Self {
        Self {
            channel,
            sink: sink.into(),
        }
    }

    /// Labels as key/value pairs for the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("channel", self.channel.to_string()), ("sink", self.sink.clone())]
    }
}

/// Register descriptions for every gateway metric.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Error installing a metrics exporter.
#[cfg(feature = "prometheus")]
#[derive(Debug, thiserror::Error)]
#[error("failed to install metrics exporter: {0}")]
pub struct ExporterError(String);

/// Install a Prometheus scrape endpoint on `addr` and describe all metrics.
#[cfg(feature = "prometheus")]
pub fn install_prometheus(addr: std::net::SocketAddr) -> Result<(), ExporterError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ExporterError(e.to_string()))?;
    describe_metrics();
    Ok(())
}
