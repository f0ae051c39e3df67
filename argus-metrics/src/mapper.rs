use crate::{Metric, MetricDto, MetricType, MetricValue};

/// Error returned when a wire record fails validation.
///
/// Each variant names the field that failed, so the error message can be
/// returned to the submitting client verbatim.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The `id` field is empty.
    #[error("metric name must not be empty")]
    EmptyName,
    /// A gauge record without the `value` field.
    #[error("gauge metric `{0}` is missing the `value` field")]
    MissingValue(String),
    /// A counter record without the `delta` field.
    #[error("counter metric `{0}` is missing the `delta` field")]
    MissingDelta(String),
}

/// Translates a wire record into the internal domain value.
///
/// The metric type is already constrained by [`MetricType`] at the
/// deserialization boundary; this checks that the payload field matching the
/// type is present. Extraneous payload fields are ignored, matching the
/// tolerant read side of the original protocol.
pub fn to_domain(dto: &MetricDto) -> Result<Metric, ValidationError> {
    if dto.id.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let value = match dto.ty {
        MetricType::Gauge => match dto.value {
            Some(value) => MetricValue::Gauge(value),
            None => return Err(ValidationError::MissingValue(dto.id.clone())),
        },
        MetricType::Counter => match dto.delta {
            Some(delta) => MetricValue::Counter(delta),
            None => return Err(ValidationError::MissingDelta(dto.id.clone())),
        },
    };

    Ok(Metric {
        name: dto.id.clone(),
        value,
    })
}

/// Translates a stored metric back into its wire record. Lossless inverse of
/// [`to_domain`] for values that passed validation.
pub fn to_response(metric: &Metric) -> MetricDto {
    match metric.value {
        MetricValue::Gauge(value) => MetricDto::gauge(metric.name.clone(), value),
        MetricValue::Counter(delta) => MetricDto::counter(metric.name.clone(), delta),
    }
}
