use anyhow::Result;

use crate::sensor::{Report, ReportedExtrema};

/// Emits every report as a structured log event.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "log"
    }

    pub async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    pub async fn publish(&self, report: &Report) -> Result<()> {
        let unit = report.info.unit_of_measurement.as_deref().unwrap_or("");

        match &report.extrema {
            ReportedExtrema::Tracked(Some(extrema)) => tracing::info!(
                sensor = report.sensor(),
                value = report.value,
                unit,
                min_value = extrema.min.value,
                min_entity_id = %extrema.min.source,
                max_value = extrema.max.value,
                max_entity_id = %extrema.max.source,
                updated_at = %report.updated_at,
                "sensor updated",
            ),
            _ => tracing::info!(
                sensor = report.sensor(),
                value = report.value,
                unit,
                updated_at = %report.updated_at,
                "sensor updated",
            ),
        }

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
