//! Per-sensor telemetry feed lifecycle.

use std::{
    collections::HashMap,
    sync::mpsc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tracing::warn;

use crate::{config::MqttConfig, mqtt, registry::SensorId, state::SensorEvent};

/// How long a failed feed stays in `Error` before decaying to
/// `Disconnected`.
pub const ERROR_COOLDOWN: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnState {
    pub fn label(self) -> &'static str {
        match self {
            ConnState::Disconnected => "disconnected",
            ConnState::Connecting => "connecting",
            ConnState::Connected => "connected",
            ConnState::Error => "error",
        }
    }
}

struct Feed {
    state: ConnState,
    failed_at: Option<Instant>,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<mpsc::Sender<()>>,
}

impl Feed {
    fn idle(state: ConnState) -> Self {
        Self {
            state,
            failed_at: None,
            handle: None,
            stop_tx: None,
        }
    }
}

/// Owns one optional background feed per sensor. All transitions happen on
/// the UI thread: `connect`/`disconnect` from user input, `on_*` from the
/// event poll loop, `poll` each frame for cooldown decay.
pub struct ConnectionManager {
    feeds: HashMap<SensorId, Feed>,
    cooldown: Duration,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            feeds: HashMap::new(),
            cooldown: ERROR_COOLDOWN,
        }
    }

    #[cfg(test)]
    fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            feeds: HashMap::new(),
            cooldown,
        }
    }

    pub fn state(&self, id: &SensorId) -> ConnState {
        self.feeds
            .get(id)
            .map_or(ConnState::Disconnected, |f| f.state)
    }

    /// Spawn a feed thread for a sensor. A feed already connecting or
    /// connected is left alone.
    pub fn connect(&mut self, cfg: &MqttConfig, id: &SensorId, tx: mpsc::Sender<SensorEvent>) {
        if matches!(
            self.state(id),
            ConnState::Connecting | ConnState::Connected
        ) {
            return;
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let cfg = cfg.clone();
        let sensor_id = id.clone();
        let handle = std::thread::spawn(move || {
            if let Err(err) = mqtt::run_feed(cfg, sensor_id, tx, stop_rx) {
                warn!("feed thread error: {err:#}");
            }
        });

        self.feeds.insert(
            id.clone(),
            Feed {
                state: ConnState::Connecting,
                failed_at: None,
                handle: Some(handle),
                stop_tx: Some(stop_tx),
            },
        );
    }

    /// Stop a sensor's feed and wait for its thread to exit.
    pub fn disconnect(&mut self, id: &SensorId) {
        if let Some(feed) = self.feeds.get_mut(id) {
            if let Some(stop) = feed.stop_tx.take() {
                let _ = stop.send(());
            }
            if let Some(handle) = feed.handle.take() {
                // best-effort join; the feed exits soon after the stop signal
                let _ = handle.join();
            }
            feed.state = ConnState::Disconnected;
            feed.failed_at = None;
        }
    }

    pub fn on_connected(&mut self, id: &SensorId) {
        if let Some(feed) = self.feeds.get_mut(id) {
            feed.state = ConnState::Connected;
            feed.failed_at = None;
        }
    }

    /// A feed reported failure (before or after ConnAck). The sensor sits
    /// in `Error` until the cooldown expires; reconnecting is up to the
    /// user.
    pub fn on_feed_failed(&mut self, id: &SensorId) {
        let feed = self
            .feeds
            .entry(id.clone())
            .or_insert_with(|| Feed::idle(ConnState::Disconnected));
        if let Some(handle) = feed.handle.take() {
            let _ = handle.join();
        }
        feed.stop_tx = None;
        feed.state = ConnState::Error;
        feed.failed_at = Some(Instant::now());
    }

    /// Decay `Error` feeds back to `Disconnected` once the cooldown has
    /// elapsed. Call once per frame.
    pub fn poll(&mut self) {
        let cooldown = self.cooldown;
        for feed in self.feeds.values_mut() {
            if feed.state == ConnState::Error
                && feed.failed_at.is_some_and(|at| at.elapsed() >= cooldown)
            {
                feed.state = ConnState::Disconnected;
                feed.failed_at = None;
            }
        }
    }

    /// Stop every live feed. Used on app shutdown.
    pub fn shutdown(&mut self) {
        let ids: Vec<SensorId> = self.feeds.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id);
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
