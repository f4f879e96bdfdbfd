//! Sensor identity and map-position bookkeeping.

use std::fmt;

/// Id of the sensor registered at startup.
pub const PRIMARY_SENSOR: &str = "S1";

/// Sentinel returned by [`SensorRegistry::resolve`] for ids the registry
/// has never seen.
pub const UNKNOWN_SENSOR: &str = "unknown";

/// Stable identity of a sensor. Issued by the registry; unique in-session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(String);

impl SensorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_SENSOR.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_SENSOR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registered sensor: identity plus its position on the map canvas.
#[derive(Debug, Clone)]
pub struct Sensor {
    pub id: SensorId,
    pub x: f64,
    pub y: f64,
}

/// Tracks known sensors in registration order. Sensors are never removed
/// in-session.
#[derive(Debug)]
pub struct SensorRegistry {
    sensors: Vec<Sensor>,
}

impl SensorRegistry {
    /// New registry with the primary sensor already registered.
    pub fn new() -> Self {
        let mut registry = Self {
            sensors: Vec::new(),
        };
        registry.register_at(Some(PRIMARY_SENSOR), 40.0, 40.0);
        registry
    }

    /// Register a sensor at a map position. An explicit id that is already
    /// registered is returned as-is; a missing or blank id gets the first
    /// free auto id.
    pub fn register_at(&mut self, id: Option<&str>, x: f64, y: f64) -> SensorId {
        let id = match id.map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                if let Some(existing) = self.find(raw) {
                    return existing.id.clone();
                }
                SensorId::new(raw)
            }
            _ => self.next_auto_id(),
        };
        self.sensors.push(Sensor {
            id: id.clone(),
            x,
            y,
        });
        id
    }

    /// [`register_at`](Self::register_at) at the origin.
    pub fn register(&mut self, id: Option<&str>) -> SensorId {
        self.register_at(id, 0.0, 0.0)
    }

    /// First `S{n}` not already taken, with n starting past the current
    /// sensor count. Explicit registrations may occupy slots, so probe
    /// upward until a free one is found.
    fn next_auto_id(&self) -> SensorId {
        let mut n = self.sensors.len() + 1;
        loop {
            let candidate = format!("S{n}");
            if self.find(&candidate).is_none() {
                return SensorId::new(candidate);
            }
            n += 1;
        }
    }

    fn find(&self, raw: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id.as_str() == raw)
    }

    pub fn contains(&self, id: &SensorId) -> bool {
        self.find(id.as_str()).is_some()
    }

    pub fn position(&self, id: &SensorId) -> Option<(f64, f64)> {
        self.find(id.as_str()).map(|s| (s.x, s.y))
    }

    /// Move a sensor. Returns false when the id is not registered.
    pub fn set_position(&mut self, id: &SensorId, x: f64, y: f64) -> bool {
        match self.sensors.iter_mut().find(|s| &s.id == id) {
            Some(sensor) => {
                sensor.x = x;
                sensor.y = y;
                true
            }
            None => false,
        }
    }

    /// Map a raw id to its registered [`SensorId`], or the sentinel when
    /// nothing matches. Never fails.
    pub fn resolve(&self, raw: &str) -> SensorId {
        match self.find(raw.trim()) {
            Some(sensor) => sensor.id.clone(),
            None => SensorId::unknown(),
        }
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub fn ids(&self) -> impl Iterator<Item = &SensorId> {
        self.sensors.iter().map(|s| &s.id)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
