//! Metric store fed by channel records and rendered for Prometheus.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::debug;

use crate::config::PrometheusConfig;
use crate::parser::ChannelRecord;

/// Per-channel metric families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelMetric {
    /// Identity series carrying the channel attributes as labels.
    Info,
    Power,
    SnrMer,
    UnerroredCodewords,
    CorrectableCodewords,
    UncorrectableCodewords,
}

impl ChannelMetric {
    pub const ALL: [ChannelMetric; 6] = [
        Self::Info,
        Self::Power,
        Self::SnrMer,
        Self::UnerroredCodewords,
        Self::CorrectableCodewords,
        Self::UncorrectableCodewords,
    ];

    /// Metric name without the prefix.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Info => "channel_info",
            Self::Power => "power",
            Self::SnrMer => "snrmer",
            Self::UnerroredCodewords => "unerrored_codewords",
            Self::CorrectableCodewords => "correctable_codewords",
            Self::UncorrectableCodewords => "uncorrectable_codewords",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Self::Info => "Channel attributes, always 1",
            Self::Power => "Power in dBmV",
            Self::SnrMer => "SNR/MER in dB",
            Self::UnerroredCodewords => "number of unerrored codewords",
            Self::CorrectableCodewords => "number of correctable codewords",
            Self::UncorrectableCodewords => "number of uncorrectable codewords",
        }
    }

    /// The value this metric takes from a record, if it parsed.
    fn value_of(&self, record: &ChannelRecord) -> Option<f64> {
        match self {
            Self::Info => Some(1.0),
            Self::Power => record.power_dbmv,
            Self::SnrMer => record.snr_mer_db,
            Self::UnerroredCodewords => record.unerrored_codewords,
            Self::CorrectableCodewords => record.correctable_codewords,
            Self::UncorrectableCodewords => record.uncorrectable_codewords,
        }
    }

    /// Built-in label names, in exposition order.
    fn label_names(&self) -> &'static [&'static str] {
        match self {
            Self::Info => &[
                "channel",
                "lock_status",
                "modulation",
                "channel_id",
                "frequency",
            ],
            _ => &["channel"],
        }
    }

    fn label_values<'a>(&self, record: &'a ChannelRecord) -> Vec<&'a str> {
        match self {
            Self::Info => vec![
                record.channel.as_str(),
                record.lock_status.as_str(),
                record.modulation.as_str(),
                record.channel_id.as_str(),
                record.frequency.as_str(),
            ],
            _ => vec![record.channel.as_str()],
        }
    }
}

/// A unique identifier for a metric time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    /// Metric family.
    pub metric: ChannelMetric,
    /// Sorted label key-value pairs.
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    /// Build the key of `metric` for a channel record.
    pub fn for_record(
        metric: ChannelMetric,
        record: &ChannelRecord,
        default_labels: &HashMap<String, String>,
    ) -> Self {
        let mut labels: Vec<(String, String)> = metric
            .label_names()
            .iter()
            .zip(metric.label_values(record))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        // Add default labels (don't override built-in ones)
        for (k, v) in default_labels {
            if !labels.iter().any(|(lk, _)| lk == k) {
                labels.push((k.clone(), v.clone()));
            }
        }

        labels.sort_by(|a, b| a.0.cmp(&b.0));

        Self { metric, labels }
    }

    /// Format labels for Prometheus exposition format.
    pub fn format_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();

        format!("{{{}}}", parts.join(","))
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: f64,
    channel: String,
    /// Projection that last wrote this series.
    generation: u64,
}

/// Store statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Completed projections.
    pub scrapes: u64,
    /// Channel records projected over all cycles.
    pub records_projected: u64,
    /// Numeric fields that failed to parse.
    pub field_errors: u64,
    /// Channels in the latest projection.
    pub last_channels: usize,
    /// Unix time of the latest projection.
    pub last_scrape_secs: Option<f64>,
    /// Series dropped by stale channel eviction.
    pub stale_series_removed: u64,
}

/// Thread-safe metric store.
///
/// The poller is the only writer; HTTP handlers only render.
pub struct MetricStore {
    series: RwLock<HashMap<SeriesKey, StoredValue>>,
    config: PrometheusConfig,
    evict_stale: bool,
    stats: RwLock<StoreStats>,
}

impl MetricStore {
    /// Create an empty store.
    ///
    /// With `evict_stale` unset, series of channels that disappear keep their
    /// last value forever.
    pub fn new(config: PrometheusConfig, evict_stale: bool) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            config,
            evict_stale,
            stats: RwLock::new(StoreStats::default()),
        }
    }

    /// Project one cycle's channel records onto the metric series.
    ///
    /// Numeric series are only written for fields that parsed; the others
    /// keep their previous value.
    pub fn project(&self, records: &[ChannelRecord]) {
        let generation = {
            let mut stats = self.stats.write();
            stats.scrapes += 1;
            stats.records_projected += records.len() as u64;
            stats.last_channels = records.len();
            stats.last_scrape_secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs_f64());
            stats.scrapes
        };

        let mut series = self.series.write();

        for record in records {
            for metric in ChannelMetric::ALL {
                let Some(value) = metric.value_of(record) else {
                    continue;
                };

                let key = SeriesKey::for_record(metric, record, &self.config.default_labels);
                series.insert(
                    key,
                    StoredValue {
                        value,
                        channel: record.channel.clone(),
                        generation,
                    },
                );
            }
        }

        if !self.evict_stale {
            return;
        }

        let seen: HashSet<&str> = records.iter().map(|r| r.channel.as_str()).collect();
        let before = series.len();

        series.retain(|key, stored| match key.metric {
            ChannelMetric::Info => stored.generation == generation,
            _ => seen.contains(stored.channel.as_str()),
        });

        let removed = before - series.len();
        if removed > 0 {
            debug!(removed, remaining = series.len(), "Evicted stale channel series");
            self.stats.write().stale_series_removed += removed as u64;
        }
    }

    /// Count numeric fields that failed to parse this cycle.
    pub fn record_field_errors(&self, count: usize) {
        self.stats.write().field_errors += count as u64;
    }

    /// Current value of a channel's numeric series.
    pub fn value(&self, metric: ChannelMetric, channel: &str) -> Option<f64> {
        self.series
            .read()
            .iter()
            .find(|(key, stored)| key.metric == metric && stored.channel == channel)
            .map(|(_, stored)| stored.value)
    }

    /// Whether at least one cycle has been projected.
    pub fn is_ready(&self) -> bool {
        self.stats.read().scrapes > 0
    }

    /// Get the current number of stored series.
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        self.stats.read().clone()
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.config.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.config.prefix, suffix)
        }
    }

    /// Render metrics in Prometheus exposition format.
    pub fn render(&self) -> String {
        let series = self.series.read();
        let mut output = Vec::with_capacity(series.len() * 100);

        let mut sorted: Vec<_> = series.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        for metric in ChannelMetric::ALL {
            let family: Vec<_> = sorted
                .iter()
                .filter(|(key, _)| key.metric == metric)
                .collect();
            if family.is_empty() {
                continue;
            }

            let name = self.metric_name(metric.suffix());
            writeln!(output, "# HELP {} {}", name, metric.help()).ok();
            writeln!(output, "# TYPE {} gauge", name).ok();

            for (key, stored) in family {
                writeln!(
                    output,
                    "{}{} {}",
                    name,
                    key.format_labels(),
                    format_value(stored.value)
                )
                .ok();
            }
        }

        // Add exporter stats as metrics
        let stats = self.stats.read();
        writeln!(output).ok();

        let scrapes = self.metric_name("exporter_scrapes_total");
        writeln!(output, "# TYPE {} counter", scrapes).ok();
        writeln!(output, "{} {}", scrapes, stats.scrapes).ok();

        let field_errors = self.metric_name("exporter_field_errors_total");
        writeln!(output, "# TYPE {} counter", field_errors).ok();
        writeln!(output, "{} {}", field_errors, stats.field_errors).ok();

        let channels = self.metric_name("exporter_channels");
        writeln!(output, "# TYPE {} gauge", channels).ok();
        writeln!(output, "{} {}", channels, stats.last_channels).ok();

        if let Some(ts) = stats.last_scrape_secs {
            let last = self.metric_name("exporter_last_scrape_timestamp_seconds");
            writeln!(output, "# TYPE {} gauge", last).ok();
            writeln!(output, "{} {}", last, format_value(ts)).ok();
        }

        String::from_utf8(output).unwrap_or_default()
    }
}

/// Create a shareable store handle.
pub type SharedStore = Arc<MetricStore>;

/// Check a metric name prefix against `[a-zA-Z_:][a-zA-Z0-9_:]*`.
///
/// The empty prefix is allowed.
pub fn is_valid_metric_prefix(prefix: &str) -> bool {
    prefix.chars().enumerate().all(|(i, c)| {
        c.is_ascii_alphabetic() || c == '_' || c == ':' || (i > 0 && c.is_ascii_digit())
    })
}

/// Check a label name against `[a-zA-Z_][a-zA-Z0-9_]*`, rejecting reserved `__` names.
pub fn is_valid_label_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with("__")
        && name
            .chars()
            .enumerate()
            .all(|(i, c)| c.is_ascii_alphabetic() || c == '_' || (i > 0 && c.is_ascii_digit()))
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
