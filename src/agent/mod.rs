pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::export::health::HealthMetrics;
use crate::export::Publisher;
use crate::sensor::AverageSensor;
use crate::server::Server;
use crate::state::StateStore;

use self::router::EntityRouter;

/// Agent orchestrates all components: sensors, publishers, state store,
/// tick loops and the HTTP server.
pub struct Agent {
    cfg: Config,
    health: Arc<HealthMetrics>,
    server: Server,
    router: Option<Arc<EntityRouter>>,
    publishers: Arc<[Publisher]>,
    state: Option<Arc<StateStore>>,
    tasks: JoinSet<()>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
}

impl Agent {
    /// Creates a new Agent, initializing health metrics.
    pub fn new(cfg: Config) -> Result<Self> {
        let health = Arc::new(HealthMetrics::new().context("creating health metrics")?);
        let server = Server::new(&cfg.server.addr);

        Ok(Self {
            cfg,
            health,
            server,
            router: None,
            publishers: Arc::from(Vec::new()),
            state: None,
            tasks: JoinSet::new(),
            local_addr: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Address the HTTP server is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn router(&self) -> Option<&Arc<EntityRouter>> {
        self.router.as_ref()
    }

    /// Start all components and begin averaging.
    pub async fn start(&mut self) -> Result<()> {
        // 1. Load persisted values.
        let state = match &self.cfg.state_file {
            Some(path) => {
                let store = StateStore::load(path).context("loading state store")?;
                info!(path = %path.display(), sensors = store.len(), "loaded state store");
                Some(Arc::new(store))
            }
            None => None,
        };

        // 2. Build sensors and restore their last value.
        let mut sensors = Vec::with_capacity(self.cfg.sensors.len());
        for settings in self.cfg.sensor_settings() {
            let sensor = AverageSensor::new(settings).context("creating sensor")?;

            if let Some(prior) = state.as_ref().and_then(|s| s.get(sensor.id())) {
                match sensor.restore(Some(prior.as_str())) {
                    Ok(()) => {
                        if let Some(value) = sensor.current_value() {
                            self.health
                                .sensor_value
                                .with_label_values(&[sensor.id()])
                                .set(value);
                            debug!(sensor = sensor.id(), value, "restored value");
                        }
                    }
                    Err(e) => {
                        warn!(sensor = sensor.id(), error = %e, "ignoring persisted state");
                    }
                }
            }

            info!(
                sensor = sensor.id(),
                entities = sensor.info().entities.len(),
                method = %sensor.settings().method,
                total_method = %sensor.settings().total_method,
                interval = ?sensor.settings().interval,
                "sensor configured",
            );
            sensors.push(Arc::new(sensor));
        }

        let router = Arc::new(EntityRouter::new(sensors, Arc::clone(&self.health)));

        // 3. Start publishers.
        let mut publishers = Publisher::from_config(&self.cfg.publishers);
        for publisher in &mut publishers {
            publisher
                .start()
                .await
                .with_context(|| format!("starting {} publisher", publisher.name()))?;
        }
        if publishers.is_empty() {
            warn!("no publishers enabled, reports are only exposed via the API");
        }
        self.publishers = Arc::from(publishers);

        // 4. Start the HTTP server.
        let local_addr = self
            .server
            .start(Arc::clone(&router), Arc::clone(&self.health))
            .await
            .context("starting HTTP server")?;
        self.local_addr = Some(local_addr);

        // 5. One tick loop per sensor.
        for sensor in router.sensors() {
            self.spawn_tick_loop(Arc::clone(sensor), state.clone());
        }

        self.router = Some(router);
        self.state = state;

        info!(addr = %local_addr, "agent fully started");

        Ok(())
    }

    /// Gracefully stop all components.
    pub async fn stop(&mut self) -> Result<()> {
        // Signal all tick loops to stop and wait for in-flight ticks.
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "tick task failed");
            }
        }

        self.server.stop().await?;

        for publisher in self.publishers.iter() {
            if let Err(e) = publisher.stop().await {
                error!(publisher = publisher.name(), error = %e, "error stopping publisher");
            }
        }

        // Persist last so the final tick of every sensor is included.
        if let Some(state) = &self.state {
            state.persist().await.context("persisting state store")?;
        }

        Ok(())
    }

    /// Spawn the periodic tick loop of one sensor.
    fn spawn_tick_loop(&mut self, sensor: Arc<AverageSensor>, state: Option<Arc<StateStore>>) {
        let cancel = self.cancel.clone();
        let health = Arc::clone(&self.health);
        let publishers = Arc::clone(&self.publishers);
        let period = sensor.settings().interval;

        self.tasks.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        run_tick(&sensor, &publishers, state.as_deref(), &health).await;
                    }
                }
            }
        });
    }
}

/// Closes the current interval of `sensor` and publishes a changed value.
pub async fn run_tick(
    sensor: &AverageSensor,
    publishers: &[Publisher],
    state: Option<&StateStore>,
    health: &HealthMetrics,
) {
    health.ticks.with_label_values(&[sensor.id()]).inc();

    let Some(report) = sensor.tick(Utc::now()) else {
        debug!(sensor = sensor.id(), "no change this interval");
        return;
    };

    health.reports.with_label_values(&[sensor.id()]).inc();
    health
        .sensor_value
        .with_label_values(&[sensor.id()])
        .set(report.value);

    for publisher in publishers {
        if let Err(e) = publisher.publish(&report).await {
            health
                .publish_errors
                .with_label_values(&[publisher.name()])
                .inc();
            error!(
                publisher = publisher.name(),
                sensor = sensor.id(),
                error = %e,
                "failed to publish report",
            );
        }
    }

    if let Some(state) = state {
        state.set(sensor.id(), report.value);
        if let Err(e) = state.persist().await {
            health.state_store_errors.inc();
            warn!(error = %e, "failed to persist state");
        }
    }
}
