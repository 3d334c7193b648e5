use thiserror::Error;

/// Why an incoming state could not be recorded.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("state {raw:?} is not a number")]
    Malformed { raw: String },

    #[error("state {value} is not finite")]
    NonFinite { value: f64 },

    #[error("entity {source_id} is not a source of this sensor")]
    UnknownSource { source_id: String },
}

impl IngestError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::NonFinite { .. } => "non_finite",
            Self::UnknownSource { .. } => "unknown_source",
        }
    }
}

/// Why a persisted value could not seed the sensor.
#[derive(Debug, Error, PartialEq)]
pub enum RestoreError {
    #[error("persisted state {raw:?} is not a finite number")]
    Malformed { raw: String },
}

/// Sensor construction failures.
#[derive(Debug, Error, PartialEq)]
pub enum SensorError {
    #[error("sensor {0} has no source entities")]
    NoSources(String),

    #[error("sensor {0} has a zero scan interval")]
    ZeroInterval(String),
}
