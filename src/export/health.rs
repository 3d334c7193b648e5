use anyhow::Result;
use prometheus::{Counter, CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "tw_average";

/// Prometheus metrics for service health and observability.
///
/// All metrics use the "tw_average" namespace and a private registry that
/// the HTTP server renders at `/metrics`.
pub struct HealthMetrics {
    registry: Registry,

    /// Samples recorded, by sensor.
    pub samples_ingested: CounterVec,
    /// Samples rejected, by sensor and reason (malformed, non_finite).
    pub samples_rejected: CounterVec,
    /// Unavailable/unknown states dropped, by sensor.
    pub samples_dropped: CounterVec,
    /// State updates for entities no sensor subscribes to.
    pub unknown_entities: Counter,
    /// Ticks executed, by sensor.
    pub ticks: CounterVec,
    /// Reports handed to publishers, by sensor.
    pub reports: CounterVec,
    /// Publish failures, by publisher.
    pub publish_errors: CounterVec,
    /// State store write failures.
    pub state_store_errors: Counter,
    /// Last reported value, by sensor.
    pub sensor_value: GaugeVec,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let samples_ingested = CounterVec::new(
            Opts::new("samples_ingested_total", "Total samples recorded by sensor.")
                .namespace(NAMESPACE),
            &["sensor"],
        )?;
        let samples_rejected = CounterVec::new(
            Opts::new(
                "samples_rejected_total",
                "Total samples rejected by sensor and reason.",
            )
            .namespace(NAMESPACE),
            &["sensor", "reason"],
        )?;
        let samples_dropped = CounterVec::new(
            Opts::new(
                "samples_dropped_total",
                "Total unavailable or unknown states dropped by sensor.",
            )
            .namespace(NAMESPACE),
            &["sensor"],
        )?;
        let unknown_entities = Counter::with_opts(
            Opts::new(
                "unknown_entities_total",
                "Total state updates for entities without a subscribed sensor.",
            )
            .namespace(NAMESPACE),
        )?;
        let ticks = CounterVec::new(
            Opts::new("ticks_total", "Total interval ticks by sensor.").namespace(NAMESPACE),
            &["sensor"],
        )?;
        let reports = CounterVec::new(
            Opts::new("reports_total", "Total value changes reported by sensor.")
                .namespace(NAMESPACE),
            &["sensor"],
        )?;
        let publish_errors = CounterVec::new(
            Opts::new("publish_errors_total", "Total publish errors by publisher.")
                .namespace(NAMESPACE),
            &["publisher"],
        )?;
        let state_store_errors = Counter::with_opts(
            Opts::new(
                "state_store_errors_total",
                "Total failures persisting the state store.",
            )
            .namespace(NAMESPACE),
        )?;
        let sensor_value = GaugeVec::new(
            Opts::new("sensor_value", "Last reported value by sensor.").namespace(NAMESPACE),
            &["sensor"],
        )?;

        registry.register(Box::new(samples_ingested.clone()))?;
        registry.register(Box::new(samples_rejected.clone()))?;
        registry.register(Box::new(samples_dropped.clone()))?;
        registry.register(Box::new(unknown_entities.clone()))?;
        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(reports.clone()))?;
        registry.register(Box::new(publish_errors.clone()))?;
        registry.register(Box::new(state_store_errors.clone()))?;
        registry.register(Box::new(sensor_value.clone()))?;

        Ok(Self {
            registry,
            samples_ingested,
            samples_rejected,
            samples_dropped,
            unknown_entities,
            ticks,
            reports,
            publish_errors,
            state_store_errors,
            sensor_value,
        })
    }

    /// Renders all metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }
}
