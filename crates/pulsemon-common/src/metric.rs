//! Metric model shared by agent and server.
//!
//! Two kinds are supported: gauges (float values, updates replace) and
//! counters (integer deltas, updates accumulate). The JSON wire form is
//! `{"id": ..., "type": "gauge"|"counter", "delta": ..?, "value": ..?}` with
//! the slot that doesn't match the kind omitted.

use serde::{Deserialize, Serialize};

use crate::error::MetricsError;

pub const GAUGE_KIND: &str = "gauge";
pub const COUNTER_KIND: &str = "counter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "{GAUGE_KIND}"),
            MetricKind::Counter => write!(f, "{COUNTER_KIND}"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            GAUGE_KIND => Ok(MetricKind::Gauge),
            COUNTER_KIND => Ok(MetricKind::Counter),
            other => Err(MetricsError::BadData(format!(
                "invalid metric type '{other}'"
            ))),
        }
    }
}

/// The value slot of a metric. The variant is the kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricPayload", into = "MetricPayload")]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn new_gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn new_counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    /// Parses `text` as a fresh metric of the kind named by `kind_tag`.
    /// Unknown tags and unparsable values are bad-data errors.
    pub fn parse(id: impl Into<String>, text: &str, kind_tag: &str) -> Result<Self, MetricsError> {
        let kind: MetricKind = kind_tag.parse()?;
        let id = id.into();
        let value = parse_value(&id, text, kind)?;
        Ok(Self { id, value })
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Applies a textual update: gauges are replaced, counters accumulate.
    pub fn update_from_text(&mut self, text: &str) -> Result<(), MetricsError> {
        let parsed = parse_value(&self.id, text, self.kind())?;
        match (&mut self.value, parsed) {
            (MetricValue::Gauge(v), MetricValue::Gauge(new)) => *v = new,
            (MetricValue::Counter(d), MetricValue::Counter(new)) => *d = d.wrapping_add(new),
            _ => unreachable!("parse_value returns the requested kind"),
        }
        Ok(())
    }

    /// Replaces the value from text for both kinds.
    pub fn set_from_text(&mut self, text: &str) -> Result<(), MetricsError> {
        self.value = parse_value(&self.id, text, self.kind())?;
        Ok(())
    }

    /// Merges another observation of the same metric: gauge replaces,
    /// counter accumulates. Kinds must match.
    pub fn merge(&mut self, other: &Metric) -> Result<(), MetricsError> {
        match (&mut self.value, other.value) {
            (MetricValue::Gauge(v), MetricValue::Gauge(new)) => *v = new,
            (MetricValue::Counter(d), MetricValue::Counter(new)) => *d = d.wrapping_add(new),
            _ => {
                return Err(MetricsError::BadData(format!(
                    "kind mismatch updating metric '{}': have {}, got {}",
                    self.id,
                    self.kind(),
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    /// Text form of the value: shortest round-trip decimal for gauges,
    /// base-10 for counters.
    pub fn value_text(&self) -> String {
        match self.value {
            MetricValue::Gauge(v) => v.to_string(),
            MetricValue::Counter(d) => d.to_string(),
        }
    }
}

fn parse_value(id: &str, text: &str, kind: MetricKind) -> Result<MetricValue, MetricsError> {
    match kind {
        MetricKind::Gauge => text.parse::<f64>().map(MetricValue::Gauge).map_err(|_| {
            MetricsError::BadData(format!(
                "invalid data '{text}' for metric '{id}' of type '{kind}'"
            ))
        }),
        MetricKind::Counter => text.parse::<i64>().map(MetricValue::Counter).map_err(|_| {
            MetricsError::BadData(format!(
                "invalid data '{text}' for metric '{id}' of type '{kind}'"
            ))
        }),
    }
}

/// Raw wire shape. The slot not matching `type` is omitted when encoding and
/// rejected as bad data when decoding leaves the matching slot empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl TryFrom<MetricPayload> for Metric {
    type Error = MetricsError;

    fn try_from(p: MetricPayload) -> Result<Self, Self::Error> {
        let value = match p.kind {
            MetricKind::Gauge => MetricValue::Gauge(p.value.ok_or_else(|| {
                MetricsError::BadData(format!("no value for metric '{}' of type gauge", p.id))
            })?),
            MetricKind::Counter => MetricValue::Counter(p.delta.ok_or_else(|| {
                MetricsError::BadData(format!("no value for metric '{}' of type counter", p.id))
            })?),
        };
        Ok(Metric { id: p.id, value })
    }
}

impl From<Metric> for MetricPayload {
    fn from(m: Metric) -> Self {
        let kind = m.kind();
        let (delta, value) = match m.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        MetricPayload {
            id: m.id,
            kind,
            delta,
            value,
        }
    }
}

/// Read-request shape for the JSON value endpoint: id and kind only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
}
