//! Bounded per-sensor measurement history, newest-first.

use std::{
    collections::{HashMap, VecDeque},
    time::Instant,
};

use crate::{classify::Tier, registry::SensorId};

/// Entries kept per sensor; the oldest is evicted past this.
pub const HISTORY_CAP: usize = 100;

/// One timestamped concentration reading attributed to a sensor. Immutable
/// once created; the position is the sensor's at read time.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub sensor_id: SensorId,
    pub ppm: f64,
    pub x: f64,
    pub y: f64,
    pub taken_at: Instant,
}

impl Measurement {
    pub fn new(sensor_id: SensorId, ppm: f64, x: f64, y: f64) -> Self {
        Self {
            sensor_id,
            ppm,
            x,
            y,
            taken_at: Instant::now(),
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_ppm(self.ppm)
    }
}

/// Per-sensor rings of recent measurements. Buckets are created lazily on
/// first append and only ever trimmed by capacity.
#[derive(Debug, Default)]
pub struct HistoryStore {
    buckets: HashMap<SensorId, VecDeque<Measurement>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front, then trim to [`HISTORY_CAP`].
    pub fn append(&mut self, measurement: Measurement) {
        let bucket = self
            .buckets
            .entry(measurement.sensor_id.clone())
            .or_default();
        bucket.push_front(measurement);
        bucket.truncate(HISTORY_CAP);
    }

    /// Most recent measurement for a sensor, if any.
    pub fn latest(&self, id: &SensorId) -> Option<&Measurement> {
        self.buckets.get(id).and_then(|b| b.front())
    }

    /// All retained measurements for a sensor, newest first.
    pub fn all(&self, id: &SensorId) -> impl Iterator<Item = &Measurement> {
        self.buckets.get(id).into_iter().flatten()
    }

    pub fn len(&self, id: &SensorId) -> usize {
        self.buckets.get(id).map_or(0, |b| b.len())
    }

    pub fn is_empty(&self, id: &SensorId) -> bool {
        self.len(id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(id: &str, ppm: f64) -> Measurement {
        Measurement::new(SensorId::new(id), ppm, 0.0, 0.0)
    }

    #[test]
    fn bucket_created_lazily() {
        let mut store = HistoryStore::new();
        let id = SensorId::new("S1");
        assert!(store.latest(&id).is_none());
        assert!(store.is_empty(&id));

        store.append(reading("S1", 42.0));
        assert_eq!(store.len(&id), 1);
    }

    #[test]
    fn history_is_newest_first() {
        let mut store = HistoryStore::new();
        let id = SensorId::new("S1");
        for ppm in [200.0, 90.0, 50.0] {
            store.append(reading("S1", ppm));
        }

        let values: Vec<f64> = store.all(&id).map(|m| m.ppm).collect();
        assert_eq!(values, vec![50.0, 90.0, 200.0]);
        assert_eq!(store.latest(&id).map(|m| m.ppm), Some(50.0));

        let stamps: Vec<_> = store.all(&id).map(|m| m.taken_at).collect();
        for pair in stamps.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut store = HistoryStore::new();
        let id = SensorId::new("S1");
        for i in 0..101 {
            store.append(reading("S1", f64::from(i)));
        }

        assert_eq!(store.len(&id), HISTORY_CAP);
        // newest kept at the front, entry 0 (the oldest) evicted
        assert_eq!(store.latest(&id).map(|m| m.ppm), Some(100.0));
        let oldest = store.all(&id).last().map(|m| m.ppm);
        assert_eq!(oldest, Some(1.0));
    }

    #[test]
    fn length_never_exceeds_cap() {
        let mut store = HistoryStore::new();
        let id = SensorId::new("S1");
        for i in 0..250 {
            store.append(reading("S1", f64::from(i)));
            assert!(store.len(&id) <= HISTORY_CAP);
        }
    }

    #[test]
    fn buckets_are_independent() {
        let mut store = HistoryStore::new();
        store.append(reading("S1", 10.0));
        store.append(reading("S2", 20.0));

        assert_eq!(store.latest(&SensorId::new("S1")).map(|m| m.ppm), Some(10.0));
        assert_eq!(store.latest(&SensorId::new("S2")).map(|m| m.ppm), Some(20.0));
        assert_eq!(store.len(&SensorId::new("S1")), 1);
    }
}
