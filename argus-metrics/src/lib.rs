//! Metric model and wire protocol shared between the Argus agent and server.
//!
//! A metric is identified by its `(name, type)` pair. There are two kinds:
//!
//!  - **Gauges** hold a point-in-time floating measurement; every write
//!    replaces the stored value.
//!  - **Counters** hold a signed integer total; every write carries a delta
//!    that is added to the stored value.
//!
//! [`MetricDto`] is the JSON shape exchanged over the wire, [`Metric`] is the
//! internal domain value, and [`to_domain`] / [`to_response`] translate
//! between the two.

mod digest;
mod mapper;
mod metric;
mod protocol;

pub use self::digest::{payload_digest, verify_digest, DIGEST_HEADER};
pub use self::mapper::{to_domain, to_response, ValidationError};
pub use self::metric::{storage_key, Metric, MetricValue, ParseMetricError};
pub use self::protocol::{MetricDto, MetricType, ParseMetricTypeError};
