use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The type of a metric, which determines its merge behavior in storage.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// A point-in-time floating measurement. Last write wins.
    Gauge,
    /// A monotonic-intent integer. Writes are deltas added to the stored
    /// total.
    Counter,
}

impl MetricType {
    /// Returns the lowercase name used on the wire and in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized metric type name.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("unsupported metric type `{0}`")]
pub struct ParseMetricTypeError(pub String);

impl FromStr for MetricType {
    type Err = ParseMetricTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(ParseMetricTypeError(other.to_owned())),
        }
    }
}

/// Wire representation of a single metric.
///
/// Gauges carry their measurement in `value`, counters carry their increment
/// in `delta`. The unused field is omitted from the serialized form. A batch
/// is a plain JSON array of these records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricDto {
    /// Metric name.
    pub id: String,
    /// Metric kind.
    #[serde(rename = "type")]
    pub ty: MetricType,
    /// Gauge payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Counter payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl MetricDto {
    /// Creates a gauge record.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            ty: MetricType::Gauge,
            value: Some(value),
            delta: None,
        }
    }

    /// Creates a counter record.
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            ty: MetricType::Counter,
            value: None,
            delta: Some(delta),
        }
    }
}
