use std::borrow::Borrow;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::buffer::{Sample, SourceBuffer};

/// How a single source's samples are reduced to one number per interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AverageMethod {
    /// Integral of the step function, normalized by the scan interval.
    #[default]
    TimeWeighted,
    /// Unweighted mean of the samples, timestamps ignored.
    Linear,
}

impl AverageMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeWeighted => "time-weighted",
            Self::Linear => "linear",
        }
    }
}

impl fmt::Display for AverageMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How per-source contributions are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TotalMethod {
    #[default]
    Sum,
    Average,
}

impl TotalMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Average => "average",
        }
    }
}

impl fmt::Display for TotalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denominator used by [`TotalMethod::Average`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AverageOver {
    /// Only sources that contributed to this tick.
    #[default]
    Reporting,
    /// Every configured source, contributing or not.
    Configured,
}

/// Time-weighted integral of a step function ending at `now`, divided by
/// the nominal interval length.
///
/// Each sample holds until the next one; the last holds until `now`.
/// Out-of-order timestamps yield zero-length steps instead of negative
/// weights.
pub fn time_weighted<I, S>(samples: I, now: DateTime<Utc>, interval: Duration) -> f64
where
    I: IntoIterator<Item = S>,
    S: Borrow<Sample>,
{
    let mut samples = samples.into_iter().peekable();
    let mut integral = 0.0;

    while let Some(sample) = samples.next() {
        let sample = sample.borrow();
        let end = samples.peek().map_or(now, |next| next.borrow().timestamp);
        integral += sample.value * seconds_between(sample.timestamp, end);
    }

    integral / interval.as_secs_f64()
}

/// Arithmetic mean, or `None` for no samples.
pub fn linear(samples: &[Sample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|s| s.value).sum();
    Some(sum / samples.len() as f64)
}

/// Contribution of one source to the tick at `now`, or `None` when the
/// source has nothing to contribute.
///
/// Time-weighted sources contribute while they have fresh samples or a
/// seed that time has moved past. Samples stamped before the seed are
/// moved up to it, so nothing integrates time from a closed interval.
/// Linear sources contribute only with fresh samples.
pub fn contribution(
    buf: &SourceBuffer,
    method: AverageMethod,
    now: DateTime<Utc>,
    interval: Duration,
) -> Option<f64> {
    match method {
        AverageMethod::TimeWeighted => {
            let stale = buf.fresh().is_empty() && buf.seed().map_or(true, |s| now <= s.timestamp);
            if stale {
                return None;
            }
            let start = buf.seed().map(|s| s.timestamp);
            let steps = buf.iter().map(|s| match start {
                Some(start) if s.timestamp < start => Sample::new(start, s.value),
                _ => *s,
            });
            Some(time_weighted(steps, now, interval))
        }
        AverageMethod::Linear => linear(buf.fresh()),
    }
}

/// Combines summed contributions into the sensor value.
pub fn combine(
    total: f64,
    contributing: usize,
    configured: usize,
    method: TotalMethod,
    over: AverageOver,
) -> f64 {
    match method {
        TotalMethod::Sum => total,
        TotalMethod::Average => {
            let denominator = match over {
                AverageOver::Reporting => contributing,
                AverageOver::Configured => configured,
            };
            total / denominator.max(1) as f64
        }
    }
}

/// Rounds to `precision` decimals, half to even. Precision 0 truncates
/// toward zero.
pub fn round(value: f64, precision: u32) -> f64 {
    if precision == 0 {
        return value.trunc();
    }

    let factor = 10f64.powi(i32::try_from(precision).unwrap_or(i32::MAX));
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / factor
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    end.signed_duration_since(start)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
