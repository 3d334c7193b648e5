use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::error::IngestError;
use super::extrema::{Extrema, ExtremaTracker};

/// One observed state of a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples of a single source for the interval in progress.
///
/// The seed is the value carried over from the previous tick, stamped
/// with that tick's time. It starts the step function of the next
/// interval but is not itself a sample of that interval.
#[derive(Debug, Default, Clone)]
pub struct SourceBuffer {
    seed: Option<Sample>,
    samples: Vec<Sample>,
}

impl SourceBuffer {
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Carried-over sample from the previous tick, if any.
    pub fn seed(&self) -> Option<&Sample> {
        self.seed.as_ref()
    }

    /// Samples ingested since the previous tick.
    pub fn fresh(&self) -> &[Sample] {
        &self.samples
    }

    /// Seed followed by fresh samples, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.seed.iter().chain(self.samples.iter())
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last().or(self.seed.as_ref())
    }

    pub fn len(&self) -> usize {
        self.samples.len() + usize::from(self.seed.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.seed.is_none() && self.samples.is_empty()
    }

    /// Replaces the contents with a single seed `(now, last value)`.
    ///
    /// A source that never reported stays empty.
    pub fn reseed(&mut self, now: DateTime<Utc>) {
        let Some(last) = self.last().map(|s| s.value) else {
            return;
        };
        self.samples.clear();
        self.seed = Some(Sample::new(now, last));
    }
}

/// Per-sensor window state: one buffer per source plus the interval
/// extrema. Always accessed under the sensor's lock.
#[derive(Debug)]
pub struct SampleBuffer {
    sources: BTreeMap<Arc<str>, SourceBuffer>,
    extrema: Option<ExtremaTracker>,
}

impl SampleBuffer {
    /// Creates empty buffers for the given sources. Extrema are only
    /// tracked when `track_extrema` is set.
    pub fn new(sources: &[Arc<str>], track_extrema: bool) -> Self {
        Self {
            sources: sources
                .iter()
                .map(|id| (Arc::clone(id), SourceBuffer::default()))
                .collect(),
            extrema: track_extrema.then(ExtremaTracker::new),
        }
    }

    /// Appends a sample to a source and folds it into the extrema.
    pub fn push(&mut self, source: &str, sample: Sample) -> Result<(), IngestError> {
        let Some(buf) = self.sources.get_mut(source) else {
            return Err(IngestError::UnknownSource {
                source_id: source.to_string(),
            });
        };
        buf.push(sample);

        if let Some(tracker) = self.extrema.as_mut() {
            if let Some((id, _)) = self.sources.get_key_value(source) {
                tracker.record(id, sample.value);
            }
        }
        Ok(())
    }

    pub fn source(&self, source: &str) -> Option<&SourceBuffer> {
        self.sources.get(source)
    }

    /// Iterates buffers in source id order.
    pub fn sources_mut(&mut self) -> impl Iterator<Item = (&Arc<str>, &mut SourceBuffer)> {
        self.sources.iter_mut()
    }

    pub fn tracks_extrema(&self) -> bool {
        self.extrema.is_some()
    }

    /// Extrema of the interval in progress.
    pub fn extrema(&self) -> Option<Extrema> {
        self.extrema.as_ref().and_then(ExtremaTracker::snapshot)
    }

    /// Closes the extrema window, returning what it saw.
    pub fn take_extrema(&mut self) -> Option<Extrema> {
        self.extrema.as_mut().and_then(ExtremaTracker::take)
    }

    /// Total number of buffered samples, seeds included.
    pub fn sample_count(&self) -> usize {
        self.sources.values().map(SourceBuffer::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn buffer(track_extrema: bool) -> SampleBuffer {
        let ids: Vec<Arc<str>> = vec![Arc::from("sensor.a"), Arc::from("sensor.b")];
        SampleBuffer::new(&ids, track_extrema)
    }

    #[test]
    fn test_push_preserves_insertion_order() {
        let mut buf = buffer(false);
        buf.push("sensor.a", Sample::new(at(10), 1.0)).expect("push");
        buf.push("sensor.a", Sample::new(at(5), 2.0)).expect("push");
        buf.push("sensor.a", Sample::new(at(20), 3.0)).expect("push");

        let values: Vec<f64> = buf
            .source("sensor.a")
            .expect("source exists")
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(buf.source("sensor.b").expect("source exists").is_empty());
    }

    #[test]
    fn test_push_unknown_source() {
        let mut buf = buffer(true);
        let err = buf
            .push("sensor.z", Sample::new(at(0), 1.0))
            .expect_err("unknown source");
        assert_eq!(
            err,
            IngestError::UnknownSource {
                source_id: "sensor.z".to_string()
            }
        );
        assert_eq!(buf.sample_count(), 0);
        assert_eq!(buf.extrema(), None);
    }

    #[test]
    fn test_extrema_only_when_tracked() {
        let mut untracked = buffer(false);
        untracked
            .push("sensor.a", Sample::new(at(0), 1.0))
            .expect("push");
        assert!(!untracked.tracks_extrema());
        assert_eq!(untracked.extrema(), None);

        let mut tracked = buffer(true);
        tracked
            .push("sensor.a", Sample::new(at(0), 1.0))
            .expect("push");
        tracked
            .push("sensor.b", Sample::new(at(1), 7.0))
            .expect("push");
        let extrema = tracked.take_extrema().expect("extrema");
        assert_eq!(&*extrema.min.source, "sensor.a");
        assert_eq!(&*extrema.max.source, "sensor.b");
        assert_eq!(tracked.extrema(), None);
    }

    #[test]
    fn test_reseed_keeps_last_value() {
        let mut source = SourceBuffer::default();
        source.push(Sample::new(at(0), 4.0));
        source.push(Sample::new(at(10), 9.0));

        source.reseed(at(60));

        assert_eq!(source.len(), 1);
        assert!(source.fresh().is_empty());
        assert_eq!(source.seed(), Some(&Sample::new(at(60), 9.0)));
    }

    #[test]
    fn test_reseed_carries_seed_forward() {
        let mut source = SourceBuffer::default();
        source.push(Sample::new(at(0), 4.0));
        source.reseed(at(60));
        source.reseed(at(120));

        assert_eq!(source.seed(), Some(&Sample::new(at(120), 4.0)));
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_reseed_empty_source_stays_empty() {
        let mut source = SourceBuffer::default();
        source.reseed(at(60));
        assert!(source.is_empty());
        assert_eq!(source.seed(), None);
    }
}
