use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::sensor::{
    AverageMethod, AverageOver, SensorInfo, SensorSettings, TotalMethod, DEFAULT_PRECISION,
    DEFAULT_SCAN_INTERVAL,
};

/// Top-level configuration for the tw-average service.
///
/// Fields at this level are platform defaults; every sensor may override
/// them individually.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Tick period, also the nominal interval length. Default: 60s.
    #[serde(default = "default_scan_interval", with = "humantime_serde")]
    pub scan_interval: Duration,

    /// Unit attached to reports of sensors that set none.
    #[serde(default)]
    pub unit_of_measurement: Option<String>,

    /// Icon attached to reports of sensors that set none.
    #[serde(default)]
    pub icon: Option<String>,

    /// Decimals of reported values. Default: 1.
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Track per-interval min/max and their sources. Default: false.
    #[serde(default)]
    pub extremas: bool,

    #[serde(default)]
    pub method: AverageMethod,

    #[serde(default)]
    pub total_method: TotalMethod,

    #[serde(default)]
    pub average_over: AverageOver,

    /// File holding the last reported values across restarts.
    #[serde(default)]
    pub state_file: Option<PathBuf>,

    /// Ingestion, status and metrics server.
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub publishers: PublishersConfig,

    /// Sensors keyed by slug.
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorConfig>,
}

/// HTTP server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Listen address. Default: ":8080".
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

/// Report publisher configuration.
#[derive(Debug, Deserialize)]
pub struct PublishersConfig {
    /// Log every report. Default: true.
    #[serde(default = "default_true")]
    pub log: bool,

    #[serde(default)]
    pub http: HttpPublisherConfig,
}

/// HTTP report publisher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpPublisherConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint receiving one JSON POST per report.
    #[serde(default)]
    pub address: String,

    /// Request timeout. Default: 10s.
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Extra request headers (e.g. authorization).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// One averaged sensor. Unset fields inherit the platform value.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub unique_id: Option<String>,

    #[serde(default)]
    pub friendly_name: Option<String>,

    #[serde(default)]
    pub unit_of_measurement: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub device_class: Option<String>,

    #[serde(default)]
    pub state_class: Option<String>,

    #[serde(default, with = "humantime_serde")]
    pub scan_interval: Option<Duration>,

    #[serde(default)]
    pub precision: Option<u32>,

    #[serde(default)]
    pub extremas: Option<bool>,

    #[serde(default)]
    pub method: Option<AverageMethod>,

    #[serde(default)]
    pub total_method: Option<TotalMethod>,

    #[serde(default)]
    pub average_over: Option<AverageOver>,

    /// Source entity ids.
    #[serde(default)]
    pub entities: Vec<String>,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

fn default_true() -> bool {
    true
}

fn default_server_addr() -> String {
    ":8080".to_string()
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            scan_interval: default_scan_interval(),
            unit_of_measurement: None,
            icon: None,
            precision: default_precision(),
            extremas: false,
            method: AverageMethod::default(),
            total_method: TotalMethod::default(),
            average_over: AverageOver::default(),
            state_file: None,
            server: ServerConfig::default(),
            publishers: PublishersConfig::default(),
            sensors: BTreeMap::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

impl Default for PublishersConfig {
    fn default() -> Self {
        Self {
            log: true,
            http: HttpPublisherConfig::default(),
        }
    }
}

impl Default for HttpPublisherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: String::new(),
            timeout: default_http_timeout(),
            headers: HashMap::new(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.sensors.is_empty() {
            bail!("at least one sensor is required");
        }

        if self.scan_interval.is_zero() {
            bail!("scan_interval must be positive");
        }

        for (slug, sensor) in &self.sensors {
            if !is_valid_slug(slug) {
                bail!("sensor slug {slug:?} must be lowercase [a-z0-9_]");
            }

            if sensor.entities.is_empty() {
                bail!("sensor {slug} requires at least one entity");
            }

            if sensor.entities.iter().any(|e| e.trim().is_empty()) {
                bail!("sensor {slug} has an empty entity id");
            }

            if sensor.scan_interval.is_some_and(|d| d.is_zero()) {
                bail!("sensor {slug} scan_interval must be positive");
            }
        }

        let http = &self.publishers.http;
        if http.enabled {
            if http.address.is_empty() {
                bail!("http address is required when enabled");
            }
            if http.timeout.is_zero() {
                bail!("http timeout must be positive when enabled");
            }
        }

        Ok(())
    }

    /// Resolves every sensor against the platform defaults, in slug order.
    pub fn sensor_settings(&self) -> Vec<SensorSettings> {
        self.sensors
            .iter()
            .map(|(slug, sensor)| self.resolve_sensor(slug, sensor))
            .collect()
    }

    fn resolve_sensor(&self, slug: &str, sensor: &SensorConfig) -> SensorSettings {
        let mut info = SensorInfo::new(slug, &sensor.entities);
        info.unique_id = sensor.unique_id.clone();
        info.friendly_name = sensor.friendly_name.clone();
        info.unit_of_measurement = sensor
            .unit_of_measurement
            .clone()
            .or_else(|| self.unit_of_measurement.clone());
        info.icon = sensor.icon.clone().or_else(|| self.icon.clone());
        info.device_class = sensor.device_class.clone();
        info.state_class = sensor.state_class.clone();

        let mut settings = SensorSettings::new(info);
        settings.interval = sensor.scan_interval.unwrap_or(self.scan_interval);
        settings.precision = sensor.precision.unwrap_or(self.precision);
        settings.extremas = sensor.extremas.unwrap_or(self.extremas);
        settings.method = sensor.method.unwrap_or(self.method);
        settings.total_method = sensor.total_method.unwrap_or(self.total_method);
        settings.average_over = sensor.average_over.unwrap_or(self.average_over);
        settings
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
