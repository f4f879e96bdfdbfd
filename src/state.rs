//! Application state: registry + histories + selection, mutated only on
//! the UI thread by the event poll loop.

use tracing::debug;

use crate::{
    classify::Tier,
    history::{HistoryStore, Measurement},
    registry::{SensorId, SensorRegistry},
};

/// Events marshaled from background producers (MQTT feeds, the simulator)
/// onto the UI thread.
pub enum SensorEvent {
    Reading { sensor_id: SensorId, ppm: f64 },
    Connected(SensorId),
    ConnectFailed { sensor_id: SensorId, reason: String },
    ConnectionLost { sensor_id: SensorId, reason: String },
    Status(String),
}

/// Presentation seam: the GUI (or a test double) observes state changes
/// through this instead of the state layer knowing about widgets.
pub trait PresentationSink {
    fn on_measurement_added(&mut self, _measurement: &Measurement) {}
    fn on_selection_changed(&mut self, _sensor_id: &SensorId) {}
}

/// Sink that traces state changes; used by the app shell.
pub struct TraceSink;

impl PresentationSink for TraceSink {
    fn on_measurement_added(&mut self, measurement: &Measurement) {
        debug!(
            "{} {:.1} ppm ({})",
            measurement.sensor_id,
            measurement.ppm,
            measurement.tier().label()
        );
    }

    fn on_selection_changed(&mut self, sensor_id: &SensorId) {
        debug!("selected {sensor_id}");
    }
}

pub struct MonitorState {
    pub registry: SensorRegistry,
    pub history: HistoryStore,
    selected: SensorId,
}

impl MonitorState {
    /// State with the primary sensor registered and selected.
    pub fn new() -> Self {
        let registry = SensorRegistry::new();
        let selected = registry.resolve(crate::registry::PRIMARY_SENSOR);
        Self {
            registry,
            history: HistoryStore::new(),
            selected,
        }
    }

    pub fn selected(&self) -> &SensorId {
        &self.selected
    }

    /// Change the selection. Unregistered ids resolve to the sentinel;
    /// the sink fires only on an actual change.
    pub fn select(&mut self, id: &SensorId, sink: &mut dyn PresentationSink) {
        let resolved = self.registry.resolve(id.as_str());
        if resolved != self.selected {
            self.selected = resolved;
            sink.on_selection_changed(&self.selected);
        }
    }

    /// Classify a reading, stamp it with the sensor's current position,
    /// and append it to that sensor's history. Ids the registry has not
    /// seen are registered on first sight, so every stored measurement
    /// belongs to a registered sensor.
    pub fn record_reading(
        &mut self,
        sensor_id: &SensorId,
        ppm: f64,
        sink: &mut dyn PresentationSink,
    ) -> Tier {
        let id = if self.registry.contains(sensor_id) {
            sensor_id.clone()
        } else {
            self.registry.register(Some(sensor_id.as_str()))
        };
        let (x, y) = self.registry.position(&id).unwrap_or((0.0, 0.0));
        let measurement = Measurement::new(id, ppm, x, y);
        let tier = measurement.tier();
        sink.on_measurement_added(&measurement);
        self.history.append(measurement);
        tier
    }

    /// Latest measurement of the selected sensor, for the summary panel.
    pub fn selected_latest(&self) -> Option<&Measurement> {
        self.history.latest(&self.selected)
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PRIMARY_SENSOR;

    #[derive(Default)]
    struct RecordingSink {
        added: Vec<(String, f64)>,
        selections: Vec<String>,
    }

    impl PresentationSink for RecordingSink {
        fn on_measurement_added(&mut self, measurement: &Measurement) {
            self.added
                .push((measurement.sensor_id.to_string(), measurement.ppm));
        }

        fn on_selection_changed(&mut self, sensor_id: &SensorId) {
            self.selections.push(sensor_id.to_string());
        }
    }

    #[test]
    fn starts_with_primary_selected() {
        let state = MonitorState::new();
        assert_eq!(state.selected().as_str(), PRIMARY_SENSOR);
        assert!(state.selected_latest().is_none());
    }

    #[test]
    fn record_classifies_and_appends() {
        let mut state = MonitorState::new();
        let mut sink = RecordingSink::default();
        let id = state.registry.resolve(PRIMARY_SENSOR);
        state.registry.set_position(&id, 30.0, 60.0);

        let tier = state.record_reading(&id, 200.0, &mut sink);
        assert_eq!(tier, Tier::Critical);

        let latest = state.selected_latest().expect("measurement recorded");
        assert_eq!(latest.ppm, 200.0);
        assert_eq!((latest.x, latest.y), (30.0, 60.0));
        assert_eq!(sink.added, vec![(PRIMARY_SENSOR.to_string(), 200.0)]);
    }

    #[test]
    fn unseen_id_registers_on_first_reading() {
        let mut state = MonitorState::new();
        let mut sink = RecordingSink::default();
        let stray = SensorId::new("S7");

        assert!(!state.registry.contains(&stray));
        state.record_reading(&stray, 42.0, &mut sink);
        assert!(state.registry.contains(&stray));
        assert_eq!(state.history.len(&stray), 1);
    }

    #[test]
    fn selection_fires_sink_only_on_change() {
        let mut state = MonitorState::new();
        let mut sink = RecordingSink::default();
        let extra = state.registry.register(None);

        state.select(&extra, &mut sink);
        state.select(&extra, &mut sink);
        assert_eq!(sink.selections, vec![extra.to_string()]);
    }

    #[test]
    fn selecting_unregistered_id_falls_back_to_sentinel() {
        let mut state = MonitorState::new();
        let mut sink = RecordingSink::default();

        state.select(&SensorId::new("nope"), &mut sink);
        assert!(state.selected().is_unknown());
        assert!(state.selected_latest().is_none());
    }
}
