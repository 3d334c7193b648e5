use std::sync::Arc;

use serde::Serialize;

use crate::sensor::{Report, ReportedExtrema};

/// JSON schema of one published report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportJson {
    pub sensor: Arc<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    pub attributes: AttributesJson,
    /// RFC 3339, UTC.
    pub updated_at: String,
}

/// Report attributes. The extrema group is present only for sensors that
/// track extrema, and is null when the interval saw no samples.
#[derive(Debug, Clone, Serialize)]
pub struct AttributesJson {
    pub entity_id: Vec<Arc<str>>,
    #[serde(flatten)]
    pub extrema: Option<ExtremaJson>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtremaJson {
    pub min_value: Option<f64>,
    pub min_entity_id: Option<Arc<str>>,
    pub max_value: Option<f64>,
    pub max_entity_id: Option<Arc<str>>,
}

impl From<&Report> for ReportJson {
    fn from(report: &Report) -> Self {
        let info = &report.info;

        let extrema = match &report.extrema {
            ReportedExtrema::Untracked => None,
            ReportedExtrema::Tracked(None) => Some(ExtremaJson {
                min_value: None,
                min_entity_id: None,
                max_value: None,
                max_entity_id: None,
            }),
            ReportedExtrema::Tracked(Some(e)) => Some(ExtremaJson {
                min_value: Some(e.min.value),
                min_entity_id: Some(Arc::clone(&e.min.source)),
                max_value: Some(e.max.value),
                max_entity_id: Some(Arc::clone(&e.max.source)),
            }),
        };

        Self {
            sensor: Arc::clone(&info.id),
            unique_id: info.unique_id.clone(),
            friendly_name: info.friendly_name.clone(),
            value: report.value,
            unit_of_measurement: info.unit_of_measurement.clone(),
            icon: info.icon.clone(),
            device_class: info.device_class.clone(),
            state_class: info.state_class.clone(),
            attributes: AttributesJson {
                entity_id: info.entities.clone(),
                extrema,
            },
            updated_at: report
                .updated_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}
