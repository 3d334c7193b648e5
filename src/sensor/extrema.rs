use std::sync::Arc;

use serde::Serialize;

/// One extreme value and the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extremum {
    pub value: f64,
    pub source: Arc<str>,
}

/// Minimum and maximum observed within one interval.
///
/// Both ends are always present together; an interval without samples
/// has no `Extrema` at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extrema {
    pub min: Extremum,
    pub max: Extremum,
}

/// Tracks the extrema of the interval in progress.
///
/// Comparisons are strict, so on ties the first source to reach a value
/// keeps it.
#[derive(Debug, Default)]
pub struct ExtremaTracker {
    current: Option<Extrema>,
}

impl ExtremaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the running extrema.
    pub fn record(&mut self, source: &Arc<str>, value: f64) {
        let Some(extrema) = self.current.as_mut() else {
            let first = Extremum {
                value,
                source: Arc::clone(source),
            };
            self.current = Some(Extrema {
                min: first.clone(),
                max: first,
            });
            return;
        };

        if value < extrema.min.value {
            extrema.min = Extremum {
                value,
                source: Arc::clone(source),
            };
        } else if value > extrema.max.value {
            extrema.max = Extremum {
                value,
                source: Arc::clone(source),
            };
        }
    }

    /// Returns the extrema seen so far without resetting.
    pub fn snapshot(&self) -> Option<Extrema> {
        self.current.clone()
    }

    /// Returns the extrema seen so far and starts a new interval.
    pub fn take(&mut self) -> Option<Extrema> {
        self.current.take()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(id: &str) -> Arc<str> {
        Arc::from(id)
    }

    #[test]
    fn test_empty_tracker() {
        let tracker = ExtremaTracker::new();
        assert!(tracker.is_empty());
        assert_eq!(tracker.snapshot(), None);
    }

    #[test]
    fn test_first_sample_sets_both_ends() {
        let mut tracker = ExtremaTracker::new();
        tracker.record(&src("sensor.a"), 21.5);

        let extrema = tracker.snapshot().expect("extrema set");
        assert_eq!(extrema.min.value, 21.5);
        assert_eq!(extrema.max.value, 21.5);
        assert_eq!(&*extrema.min.source, "sensor.a");
        assert_eq!(&*extrema.max.source, "sensor.a");
    }

    #[test]
    fn test_tracks_min_and_max_sources() {
        let mut tracker = ExtremaTracker::new();
        tracker.record(&src("sensor.a"), 10.0);
        tracker.record(&src("sensor.b"), 4.0);
        tracker.record(&src("sensor.c"), 30.0);
        tracker.record(&src("sensor.a"), 12.0);

        let extrema = tracker.snapshot().expect("extrema set");
        assert_eq!(extrema.min.value, 4.0);
        assert_eq!(&*extrema.min.source, "sensor.b");
        assert_eq!(extrema.max.value, 30.0);
        assert_eq!(&*extrema.max.source, "sensor.c");
    }

    #[test]
    fn test_ties_keep_first_source() {
        let mut tracker = ExtremaTracker::new();
        tracker.record(&src("sensor.a"), 5.0);
        tracker.record(&src("sensor.b"), 1.0);
        tracker.record(&src("sensor.c"), 1.0);
        tracker.record(&src("sensor.d"), 5.0);

        let extrema = tracker.snapshot().expect("extrema set");
        assert_eq!(&*extrema.min.source, "sensor.b");
        assert_eq!(&*extrema.max.source, "sensor.a");
    }

    #[test]
    fn test_take_resets() {
        let mut tracker = ExtremaTracker::new();
        tracker.record(&src("sensor.a"), 1.0);

        assert!(tracker.take().is_some());
        assert!(tracker.is_empty());
        assert_eq!(tracker.take(), None);
    }
}
