use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::extrema::Extrema;

/// Descriptive metadata of a sensor, shared with every report it emits.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    /// Slug the sensor is configured under.
    pub id: Arc<str>,
    pub unique_id: Option<String>,
    pub friendly_name: Option<String>,
    pub unit_of_measurement: Option<String>,
    pub icon: Option<String>,
    pub device_class: Option<String>,
    pub state_class: Option<String>,
    /// Source entity ids, in configured order.
    pub entities: Vec<Arc<str>>,
}

impl SensorInfo {
    /// Repeated entity ids are kept once, at their first position.
    pub fn new<I, S>(id: &str, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<Arc<str>> = Vec::new();
        for entity in entities {
            let entity = entity.as_ref();
            if !unique.iter().any(|e| &**e == entity) {
                unique.push(Arc::from(entity));
            }
        }

        Self {
            id: Arc::from(id),
            unique_id: None,
            friendly_name: None,
            unit_of_measurement: None,
            icon: None,
            device_class: None,
            state_class: None,
            entities: unique,
        }
    }
}

/// Extrema attached to a report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportedExtrema {
    /// Extrema tracking is disabled for this sensor.
    Untracked,
    /// Extrema of the interval just closed; `None` if it saw no samples.
    Tracked(Option<Extrema>),
}

/// A changed sensor value, ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub info: Arc<SensorInfo>,
    /// Rounded to the sensor's precision.
    pub value: f64,
    pub updated_at: DateTime<Utc>,
    pub extrema: ReportedExtrema,
}

impl Report {
    pub fn sensor(&self) -> &str {
        &self.info.id
    }
}
