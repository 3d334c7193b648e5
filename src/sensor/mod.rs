pub mod aggregate;
pub mod buffer;
pub mod error;
pub mod extrema;
pub mod report;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

pub use self::aggregate::{AverageMethod, AverageOver, TotalMethod};
pub use self::buffer::Sample;
pub use self::error::{IngestError, RestoreError, SensorError};
pub use self::extrema::{Extrema, Extremum};
pub use self::report::{Report, ReportedExtrema, SensorInfo};

use self::buffer::SampleBuffer;

/// Upstream states that mean "no reading" rather than a bad reading.
const UNAVAILABLE_STATES: [&str; 2] = ["unavailable", "unknown"];

/// Default precision of reported values.
pub const DEFAULT_PRECISION: u32 = 1;

/// Default scan interval, also the nominal interval length.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// A state as received from upstream: either already numeric or text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Parses the state into a finite number. `Ok(None)` marks an
    /// unavailable or unknown state.
    pub fn parse(&self) -> Result<Option<f64>, IngestError> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => {
                let text = text.trim();
                if UNAVAILABLE_STATES
                    .iter()
                    .any(|s| text.eq_ignore_ascii_case(s))
                {
                    return Ok(None);
                }
                text.parse::<f64>().map_err(|_| IngestError::Malformed {
                    raw: text.to_string(),
                })?
            }
        };

        if !value.is_finite() {
            return Err(IngestError::NonFinite { value });
        }
        Ok(Some(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RawValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Result of a successful `ingest` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// The sample was buffered.
    Recorded,
    /// The state was an unavailable/unknown sentinel and was ignored.
    Dropped,
}

/// Aggregation settings of one sensor.
#[derive(Debug, Clone)]
pub struct SensorSettings {
    pub info: Arc<SensorInfo>,
    /// Scan interval; time-weighted integrals are divided by it.
    pub interval: Duration,
    pub precision: u32,
    pub extremas: bool,
    pub method: AverageMethod,
    pub total_method: TotalMethod,
    pub average_over: AverageOver,
}

impl SensorSettings {
    /// Settings with default interval, precision and methods.
    pub fn new(info: SensorInfo) -> Self {
        Self {
            info: Arc::new(info),
            interval: DEFAULT_SCAN_INTERVAL,
            precision: DEFAULT_PRECISION,
            extremas: false,
            method: AverageMethod::default(),
            total_method: TotalMethod::default(),
            average_over: AverageOver::default(),
        }
    }
}

/// Point-in-time view of a sensor for status queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub info: Arc<SensorInfo>,
    pub value: Option<f64>,
    /// Extrema attached to the last report.
    pub reported_extrema: ReportedExtrema,
    /// Samples buffered for the interval in progress, seeds included.
    pub buffered_samples: usize,
}

/// Everything guarded by the sensor lock. Buffers, extrema and the
/// reported value change together.
#[derive(Debug)]
struct Window {
    buffer: SampleBuffer,
    current_value: Option<f64>,
    reported_extrema: Option<Extrema>,
}

/// Averages the states of several source entities over fixed intervals.
///
/// `ingest` may be called from any task at any time; `tick` is driven by
/// a periodic scheduler. Both hold the sensor lock only for in-memory work,
/// and reports are returned to the caller for publishing outside of it.
#[derive(Debug)]
pub struct AverageSensor {
    settings: SensorSettings,
    window: Mutex<Window>,
}

impl AverageSensor {
    pub fn new(settings: SensorSettings) -> Result<Self, SensorError> {
        if settings.info.entities.is_empty() {
            return Err(SensorError::NoSources(settings.info.id.to_string()));
        }
        if settings.interval.is_zero() {
            return Err(SensorError::ZeroInterval(settings.info.id.to_string()));
        }

        let buffer = SampleBuffer::new(&settings.info.entities, settings.extremas);
        Ok(Self {
            settings,
            window: Mutex::new(Window {
                buffer,
                current_value: None,
                reported_extrema: None,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.settings.info.id
    }

    pub fn info(&self) -> &Arc<SensorInfo> {
        &self.settings.info
    }

    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    /// Seeds the reported value from a persisted state. Unavailable
    /// sentinels and `None` leave the sensor without a value.
    pub fn restore(&self, prior: Option<&str>) -> Result<(), RestoreError> {
        let Some(raw) = prior else {
            return Ok(());
        };

        let parsed = RawValue::from(raw)
            .parse()
            .map_err(|_| RestoreError::Malformed {
                raw: raw.to_string(),
            })?;

        if let Some(value) = parsed {
            self.window.lock().current_value = Some(value);
        }
        Ok(())
    }

    /// Records one upstream state change of `source`.
    ///
    /// Sentinels are dropped before the source is looked up.
    pub fn ingest(
        &self,
        source: &str,
        timestamp: DateTime<Utc>,
        raw: &RawValue,
    ) -> Result<Ingested, IngestError> {
        let Some(value) = raw.parse()? else {
            return Ok(Ingested::Dropped);
        };

        self.window
            .lock()
            .buffer
            .push(source, Sample::new(timestamp, value))?;
        Ok(Ingested::Recorded)
    }

    /// Closes the interval ending at `now`.
    ///
    /// Every source buffer is reduced to its contribution and reseeded
    /// with its last value, and the extrema window restarts. Returns a
    /// report only when the rounded value changed.
    pub fn tick(&self, now: DateTime<Utc>) -> Option<Report> {
        let settings = &self.settings;
        let mut window = self.window.lock();

        let mut total = 0.0;
        let mut contributing = 0usize;
        for (_, buf) in window.buffer.sources_mut() {
            if let Some(value) =
                aggregate::contribution(buf, settings.method, now, settings.interval)
            {
                total += value;
                contributing += 1;
            }
            buf.reseed(now);
        }

        let extrema = window.buffer.take_extrema();

        if contributing == 0 {
            return None;
        }

        let combined = aggregate::combine(
            total,
            contributing,
            settings.info.entities.len(),
            settings.total_method,
            settings.average_over,
        );
        let value = aggregate::round(combined, settings.precision);
        if !value.is_finite() || window.current_value == Some(value) {
            return None;
        }

        window.current_value = Some(value);
        let extrema = if window.buffer.tracks_extrema() {
            window.reported_extrema = extrema.clone();
            ReportedExtrema::Tracked(extrema)
        } else {
            ReportedExtrema::Untracked
        };
        drop(window);

        Some(Report {
            info: Arc::clone(&settings.info),
            value,
            updated_at: now,
            extrema,
        })
    }

    /// Last reported (or restored) value.
    pub fn current_value(&self) -> Option<f64> {
        self.window.lock().current_value
    }

    /// Extrema of the interval in progress.
    pub fn interval_extrema(&self) -> Option<Extrema> {
        self.window.lock().buffer.extrema()
    }

    /// Buffered samples of one source, seed first.
    pub fn source_samples(&self, source: &str) -> Option<Vec<Sample>> {
        let window = self.window.lock();
        window
            .buffer
            .source(source)
            .map(|buf| buf.iter().copied().collect())
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let window = self.window.lock();
        let reported_extrema = if window.buffer.tracks_extrema() {
            ReportedExtrema::Tracked(window.reported_extrema.clone())
        } else {
            ReportedExtrema::Untracked
        };

        SensorSnapshot {
            info: Arc::clone(&self.settings.info),
            value: window.current_value,
            reported_extrema,
            buffered_samples: window.buffer.sample_count(),
        }
    }
}
