use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::export::health::HealthMetrics;
use crate::sensor::{AverageSensor, IngestError, Ingested, RawValue};

/// Outcome of routing one state update to its subscribed sensors.
#[derive(Debug, PartialEq)]
pub enum Routed {
    /// Recorded by this many sensors.
    Accepted(usize),
    /// Unavailable/unknown state, ignored by every sensor.
    Dropped,
    /// The state could not be parsed.
    Rejected(IngestError),
    /// No sensor subscribes to the entity.
    UnknownEntity,
}

/// Maps entity ids to the sensors averaging them and fans state updates
/// out accordingly.
pub struct EntityRouter {
    sensors: Vec<Arc<AverageSensor>>,
    routes: HashMap<Arc<str>, Vec<usize>>,
    health: Arc<HealthMetrics>,
}

impl EntityRouter {
    pub fn new(sensors: Vec<Arc<AverageSensor>>, health: Arc<HealthMetrics>) -> Self {
        let mut routes: HashMap<Arc<str>, Vec<usize>> = HashMap::new();
        for (idx, sensor) in sensors.iter().enumerate() {
            for entity in &sensor.info().entities {
                let subscribers = routes.entry(Arc::clone(entity)).or_default();
                if !subscribers.contains(&idx) {
                    subscribers.push(idx);
                }
            }
        }

        Self {
            sensors,
            routes,
            health,
        }
    }

    pub fn sensors(&self) -> &[Arc<AverageSensor>] {
        &self.sensors
    }

    pub fn sensor(&self, id: &str) -> Option<&Arc<AverageSensor>> {
        self.sensors.iter().find(|s| s.id() == id)
    }

    /// Number of distinct entities with at least one subscriber.
    pub fn entity_count(&self) -> usize {
        self.routes.len()
    }

    /// Delivers one state update to every sensor subscribed to `entity`.
    pub fn ingest(&self, entity: &str, timestamp: DateTime<Utc>, raw: &RawValue) -> Routed {
        let Some(subscribers) = self.routes.get(entity) else {
            self.health.unknown_entities.inc();
            debug!(entity, "state update for unsubscribed entity");
            return Routed::UnknownEntity;
        };

        let mut accepted = 0usize;
        let mut dropped = false;
        let mut rejected = None;

        for sensor in subscribers.iter().filter_map(|&idx| self.sensors.get(idx)) {
            match sensor.ingest(entity, timestamp, raw) {
                Ok(Ingested::Recorded) => {
                    accepted += 1;
                    self.health
                        .samples_ingested
                        .with_label_values(&[sensor.id()])
                        .inc();
                }
                Ok(Ingested::Dropped) => {
                    dropped = true;
                    self.health
                        .samples_dropped
                        .with_label_values(&[sensor.id()])
                        .inc();
                    debug!(sensor = sensor.id(), entity, state = ?raw, "ignoring unavailable state");
                }
                Err(e) => {
                    self.health
                        .samples_rejected
                        .with_label_values(&[sensor.id(), e.reason()])
                        .inc();
                    warn!(sensor = sensor.id(), entity, error = %e, "rejected state");
                    rejected = Some(e);
                }
            }
        }

        match (accepted, dropped, rejected) {
            (n, _, _) if n > 0 => Routed::Accepted(n),
            (_, true, _) => Routed::Dropped,
            (_, _, Some(e)) => Routed::Rejected(e),
            _ => Routed::UnknownEntity,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::sensor::{SensorInfo, SensorSettings};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sensor(id: &str, entities: &[&str]) -> Arc<AverageSensor> {
        let settings = SensorSettings::new(SensorInfo::new(id, entities));
        Arc::new(AverageSensor::new(settings).expect("sensor"))
    }

    fn router() -> EntityRouter {
        let health = Arc::new(HealthMetrics::new().expect("metrics"));
        EntityRouter::new(
            vec![
                sensor("house_power", &["sensor.phase_a", "sensor.phase_b"]),
                sensor("phase_a_only", &["sensor.phase_a"]),
            ],
            health,
        )
    }

    #[test]
    fn test_fan_out_to_subscribers() {
        let router = router();
        assert_eq!(router.entity_count(), 2);

        let routed = router.ingest("sensor.phase_a", at(0), &RawValue::from(230.0));
        assert_eq!(routed, Routed::Accepted(2));

        let routed = router.ingest("sensor.phase_b", at(0), &RawValue::from("115"));
        assert_eq!(routed, Routed::Accepted(1));

        let house = router.sensor("house_power").expect("sensor");
        assert_eq!(house.snapshot().buffered_samples, 2);
        let phase_a = router.sensor("phase_a_only").expect("sensor");
        assert_eq!(phase_a.snapshot().buffered_samples, 1);
    }

    #[test]
    fn test_unknown_entity() {
        let router = router();
        let routed = router.ingest("sensor.other", at(0), &RawValue::from(1.0));
        assert_eq!(routed, Routed::UnknownEntity);

        let text = router.health.render().expect("render");
        assert!(text.contains("tw_average_unknown_entities_total 1"));
    }

    #[test]
    fn test_sentinel_is_dropped() {
        let router = router();
        let routed = router.ingest("sensor.phase_a", at(0), &RawValue::from("unavailable"));
        assert_eq!(routed, Routed::Dropped);

        for sensor in router.sensors() {
            assert_eq!(sensor.snapshot().buffered_samples, 0);
        }
    }

    #[test]
    fn test_malformed_is_rejected() {
        let router = router();
        let routed = router.ingest("sensor.phase_b", at(0), &RawValue::from("n/a"));
        assert_eq!(
            routed,
            Routed::Rejected(IngestError::Malformed {
                raw: "n/a".to_string()
            })
        );

        let text = router.health.render().expect("render");
        assert!(text.contains("reason=\"malformed\""));
    }
}
