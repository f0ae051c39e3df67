use serde::{Deserialize, Serialize};

use crate::MetricType;

/// The value of a [`Metric`], tagged by its type.
///
/// Serializes to `{"type": "gauge", "value": 100.5}` or
/// `{"type": "counter", "value": 3}`, which makes persisted records
/// self-describing and allows them to be reconstructed polymorphically on
/// load.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    /// A 64-bit floating measurement, replaced on every write.
    Gauge(f64),
    /// A 64-bit signed running total, merged by addition on every write.
    Counter(i64),
}

/// Error returned when a canonical string value cannot be parsed back into a
/// [`MetricValue`].
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("value `{value}` is not a valid {expected}")]
pub struct ParseMetricError {
    /// The offending raw value.
    pub value: String,
    /// The primitive type the metric type requires.
    pub expected: &'static str,
}

impl MetricValue {
    /// Returns the type tag of this value.
    pub fn ty(&self) -> MetricType {
        match self {
            Self::Gauge(_) => MetricType::Gauge,
            Self::Counter(_) => MetricType::Counter,
        }
    }

    /// Renders the value in its canonical string form, as persisted by the
    /// SQL backend.
    ///
    /// Floats use the shortest representation that round-trips.
    pub fn to_canonical_string(&self) -> String {
        match self {
            Self::Gauge(value) => value.to_string(),
            Self::Counter(delta) => delta.to_string(),
        }
    }

    /// Parses a canonical string back into a value of the given type.
    pub fn from_canonical_string(ty: MetricType, raw: &str) -> Result<Self, ParseMetricError> {
        match ty {
            MetricType::Gauge => raw.trim().parse().map(Self::Gauge).map_err(|_| {
                ParseMetricError {
                    value: raw.to_owned(),
                    expected: "f64",
                }
            }),
            MetricType::Counter => raw.trim().parse().map(Self::Counter).map_err(|_| {
                ParseMetricError {
                    value: raw.to_owned(),
                    expected: "i64",
                }
            }),
        }
    }

    /// Folds an incoming write into this value.
    ///
    /// Counters add, gauges replace. Merging values of different types
    /// replaces the stored value wholesale; storage keys include the type,
    /// so this only happens if a caller mixes keys deliberately.
    pub fn merge(&mut self, incoming: MetricValue) {
        match (self, incoming) {
            (Self::Counter(total), Self::Counter(delta)) => *total += delta,
            (slot, incoming) => *slot = incoming,
        }
    }
}

/// A single named measurement, the internal domain value.
///
/// Metrics are immutable snapshots; the only mutation in the pipeline is the
/// counter merge inside storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name.
    pub name: String,
    /// The typed value.
    #[serde(flatten)]
    pub value: MetricValue,
}

impl Metric {
    /// Creates a gauge metric.
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    /// Creates a counter metric.
    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    /// Returns the type tag of this metric.
    pub fn ty(&self) -> MetricType {
        self.value.ty()
    }

    /// Returns the `{name}_{type}` key under which this metric is stored.
    pub fn storage_key(&self) -> String {
        storage_key(&self.name, self.ty())
    }
}

/// Builds the `{name}_{type}` storage key for a metric identity.
pub fn storage_key(name: &str, ty: MetricType) -> String {
    format!("{name}_{ty}")
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_counter_merge_adds() {
        let mut value = MetricValue::Counter(40);
        value.merge(MetricValue::Counter(2));
        assert_eq!(value, MetricValue::Counter(42));
    }

    #[test]
    fn test_counter_merge_negative_delta() {
        let mut value = MetricValue::Counter(10);
        value.merge(MetricValue::Counter(-4));
        assert_eq!(value, MetricValue::Counter(6));
    }

    #[test]
    fn test_gauge_merge_replaces() {
        let mut value = MetricValue::Gauge(100.0);
        value.merge(MetricValue::Gauge(55.5));
        assert_eq!(value, MetricValue::Gauge(55.5));
    }

    #[test]
    fn test_canonical_string_roundtrip() {
        let gauge = MetricValue::Gauge(0.1 + 0.2);
        let raw = gauge.to_canonical_string();
        assert_eq!(
            MetricValue::from_canonical_string(MetricType::Gauge, &raw).unwrap(),
            gauge
        );

        let counter = MetricValue::Counter(-7);
        let raw = counter.to_canonical_string();
        assert_eq!(
            MetricValue::from_canonical_string(MetricType::Counter, &raw).unwrap(),
            counter
        );
    }

    #[test]
    fn test_canonical_string_malformed() {
        let err = MetricValue::from_canonical_string(MetricType::Counter, "12.5").unwrap_err();
        assert_eq!(err.expected, "i64");
        assert!(MetricValue::from_canonical_string(MetricType::Gauge, "abc").is_err());
    }

    #[test]
    fn test_self_describing_json() {
        let metric = Metric::gauge("Alloc", 100.5);
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(json, r#"{"name":"Alloc","type":"gauge","value":100.5}"#);
        assert_eq!(serde_json::from_str::<Metric>(&json).unwrap(), metric);

        let metric = Metric::counter("PollCount", 3);
        let json = serde_json::to_string(&metric).unwrap();
        assert_eq!(json, r#"{"name":"PollCount","type":"counter","value":3}"#);
        assert_eq!(serde_json::from_str::<Metric>(&json).unwrap(), metric);
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(Metric::gauge("Alloc", 1.0).storage_key(), "Alloc_gauge");
        assert_eq!(
            Metric::counter("PollCount", 1).storage_key(),
            "PollCount_counter"
        );
    }
}
