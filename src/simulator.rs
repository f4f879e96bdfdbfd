//! Simulated reading generator: one random-walk level per tracked sensor,
//! one reading per sensor per tick.

use std::{
    collections::HashMap,
    sync::mpsc,
    thread::JoinHandle,
    time::Duration,
};

use rand::Rng;

use crate::{config::SimulationConfig, registry::SensorId, state::SensorEvent};

enum SimCommand {
    Track(SensorId),
    Stop,
}

/// Handle to the generator thread. Dropping the handle (or calling
/// [`stop`](Simulator::stop)) closes the command channel, which ends the
/// loop; at most one in-flight tick completes after that.
pub struct Simulator {
    cmd_tx: mpsc::Sender<SimCommand>,
    handle: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Start the generator, seeded with the sensors known right now.
    pub fn spawn(
        cfg: SimulationConfig,
        seeds: Vec<SensorId>,
        tx: mpsc::Sender<SensorEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let handle = std::thread::spawn(move || run(cfg, seeds, tx, cmd_rx));
        Self {
            cmd_tx,
            handle: Some(handle),
        }
    }

    /// Add a sensor registered after the generator started.
    pub fn track(&self, id: SensorId) {
        let _ = self.cmd_tx.send(SimCommand::Track(id));
    }

    /// Stop the generator and wait for the thread to exit.
    pub fn stop(&mut self) {
        let _ = self.cmd_tx.send(SimCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    cfg: SimulationConfig,
    seeds: Vec<SensorId>,
    tx: mpsc::Sender<SensorEvent>,
    cmd_rx: mpsc::Receiver<SimCommand>,
) {
    let interval = Duration::from_millis(cfg.interval_ms.max(1));
    let mut levels: HashMap<SensorId, f64> = seeds
        .into_iter()
        .map(|id| (id, cfg.start_ppm))
        .collect();
    let mut rng = rand::thread_rng();

    loop {
        match cmd_rx.recv_timeout(interval) {
            Ok(SimCommand::Track(id)) => {
                levels.entry(id).or_insert(cfg.start_ppm);
            }
            Ok(SimCommand::Stop) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                for (id, level) in levels.iter_mut() {
                    *level += rng.gen_range(cfg.walk_min..cfg.walk_max);
                    *level = level.clamp(cfg.floor_ppm, cfg.ceil_ppm);
                    let reading = SensorEvent::Reading {
                        sensor_id: id.clone(),
                        ppm: *level,
                    };
                    if tx.send(reading).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SimulationConfig {
        SimulationConfig {
            interval_ms: 5,
            ..SimulationConfig::default()
        }
    }

    fn collect_readings(
        rx: &mpsc::Receiver<SensorEvent>,
        count: usize,
    ) -> Vec<(SensorId, f64)> {
        let mut readings = Vec::new();
        while readings.len() < count {
            match rx
                .recv_timeout(Duration::from_secs(2))
                .expect("simulator produced no reading in time")
            {
                SensorEvent::Reading { sensor_id, ppm } => readings.push((sensor_id, ppm)),
                _ => {}
            }
        }
        readings
    }

    #[test]
    fn produces_one_reading_per_seeded_sensor() {
        let (tx, rx) = mpsc::channel();
        let seeds = vec![SensorId::new("S1"), SensorId::new("S2")];
        let mut sim = Simulator::spawn(fast_config(), seeds, tx);

        let readings = collect_readings(&rx, 6);
        sim.stop();

        let s1 = readings.iter().filter(|(id, _)| id.as_str() == "S1").count();
        let s2 = readings.iter().filter(|(id, _)| id.as_str() == "S2").count();
        assert!(s1 >= 2, "expected repeated S1 readings, got {s1}");
        assert!(s2 >= 2, "expected repeated S2 readings, got {s2}");
    }

    #[test]
    fn levels_stay_within_clamp_bounds() {
        let cfg = fast_config();
        let (floor, ceil) = (cfg.floor_ppm, cfg.ceil_ppm);
        let (tx, rx) = mpsc::channel();
        let mut sim = Simulator::spawn(cfg, vec![SensorId::new("S1")], tx);

        for (_, ppm) in collect_readings(&rx, 20) {
            assert!((floor..=ceil).contains(&ppm), "level {ppm} out of bounds");
        }
        sim.stop();
    }

    #[test]
    fn tracked_sensor_joins_the_tick() {
        let (tx, rx) = mpsc::channel();
        let mut sim = Simulator::spawn(fast_config(), vec![SensorId::new("S1")], tx);
        sim.track(SensorId::new("S2"));

        let readings = collect_readings(&rx, 10);
        sim.stop();
        assert!(
            readings.iter().any(|(id, _)| id.as_str() == "S2"),
            "tracked sensor never produced a reading"
        );
    }

    #[test]
    fn stop_ends_the_stream() {
        let (tx, rx) = mpsc::channel();
        let mut sim = Simulator::spawn(fast_config(), vec![SensorId::new("S1")], tx);
        collect_readings(&rx, 1);
        sim.stop();

        // drain whatever the final in-flight tick produced
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err(), "simulator kept producing after stop");
    }
}
