use eframe::{App, egui};
use std::{
    sync::mpsc,
    time::{Duration, Instant},
};

use crate::{
    classify::Tier,
    config,
    connection::{ConnState, ConnectionManager},
    mqtt,
    registry::SensorId,
    simulator::Simulator,
    state::{MonitorState, SensorEvent, TraceSink},
};

enum TestResult {
    Ok,
    Err(String),
}

const MAP_SIZE: egui::Vec2 = egui::Vec2::new(520.0, 380.0);
const DOT_RADIUS: f32 = 15.0;
const DOT_RADIUS_CRITICAL: f32 = 17.5;
/// Upper bound of the summary level bar, matching the simulator ceiling.
const LEVEL_BAR_MAX: f64 = 250.0;

fn tier_color(tier: Option<Tier>) -> egui::Color32 {
    match tier {
        Some(Tier::Normal) => egui::Color32::from_rgb(50, 205, 50),
        Some(Tier::Warning) => egui::Color32::from_rgb(255, 152, 0),
        Some(Tier::Critical) => egui::Color32::from_rgb(244, 67, 54),
        None => egui::Color32::GRAY,
    }
}

pub struct MonitorApp {
    pub cfg_paths: config::ConfigPaths,
    pub cfg: config::AppConfig,
    pub status: String,
    pub last_save: Option<Instant>,
    pub testing: bool,
    test_rx: mpsc::Receiver<TestResult>,
    test_tx: mpsc::Sender<TestResult>,
    events_rx: mpsc::Receiver<SensorEvent>,
    pub events_tx: mpsc::Sender<SensorEvent>,
    pub state: MonitorState,
    conn: ConnectionManager,
    sim: Option<Simulator>,
    sink: TraceSink,
    coord_x: String,
    coord_y: String,
}

impl Default for MonitorApp {
    fn default() -> Self {
        let (test_tx, test_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        let state = MonitorState::new();
        let (x, y) = state
            .registry
            .position(state.selected())
            .unwrap_or((0.0, 0.0));
        Self {
            cfg_paths: config::ConfigPaths::default(),
            cfg: config::AppConfig::default(),
            status: String::new(),
            last_save: None,
            testing: false,
            test_rx,
            test_tx,
            events_rx,
            events_tx,
            state,
            conn: ConnectionManager::new(),
            sim: None,
            sink: TraceSink,
            coord_x: format!("{x:.0}"),
            coord_y: format!("{y:.0}"),
        }
    }
}

impl MonitorApp {
    pub fn init() -> Self {
        let mut app = Self::default();

        match config::ConfigPaths::new() {
            Ok(paths) => app.cfg_paths = paths,
            Err(err) => {
                tracing::warn!("config path error: {err:?}");
                app.status = format!("Config path error: {err:#}");
                return app;
            }
        }

        match config::load_or_default(&app.cfg_paths) {
            Ok(cfg) => app.cfg = cfg,
            Err(err) => {
                tracing::warn!("config load error: {err:?}");
            }
        }

        app
    }

    fn save_all(&mut self) {
        match config::save(&self.cfg_paths, &self.cfg) {
            Ok(_) => {
                self.status = "Saved settings".to_string();
                self.last_save = Some(Instant::now());
            }
            Err(err) => {
                self.status = format!("Save failed: {err:#}");
            }
        }
    }

    fn poll_tests(&mut self) {
        while let Ok(msg) = self.test_rx.try_recv() {
            self.testing = false;
            match msg {
                TestResult::Ok => self.status = "MQTT test succeeded".to_string(),
                TestResult::Err(err) => self.status = format!("MQTT test failed: {err}"),
            }
        }
    }

    /// Drain producer events on the UI thread. All state mutation happens
    /// here.
    pub fn poll_events(&mut self) {
        while let Ok(ev) = self.events_rx.try_recv() {
            match ev {
                SensorEvent::Reading { sensor_id, ppm } => {
                    let tier = self.state.record_reading(&sensor_id, ppm, &mut self.sink);
                    if tier == Tier::Critical && &sensor_id == self.state.selected() {
                        self.status = format!("{sensor_id}: {}", tier.label());
                    }
                }
                SensorEvent::Connected(sensor_id) => {
                    self.conn.on_connected(&sensor_id);
                    self.status = format!("{sensor_id} telemetry connected");
                }
                SensorEvent::ConnectFailed { sensor_id, reason } => {
                    self.conn.on_feed_failed(&sensor_id);
                    self.status = format!("{sensor_id} connect failed: {reason}");
                }
                SensorEvent::ConnectionLost { sensor_id, reason } => {
                    self.conn.on_feed_failed(&sensor_id);
                    self.status = format!("{sensor_id} telemetry lost: {reason}");
                }
                SensorEvent::Status(msg) => {
                    self.status = msg;
                }
            }
        }
    }

    fn start_simulation(&mut self) {
        if self.sim.is_some() {
            return;
        }
        let seeds: Vec<SensorId> = self.state.registry.ids().cloned().collect();
        self.sim = Some(Simulator::spawn(
            self.cfg.simulation.clone(),
            seeds,
            self.events_tx.clone(),
        ));
        self.status = "Simulation started".to_string();
    }

    fn stop_simulation(&mut self) {
        if let Some(mut sim) = self.sim.take() {
            sim.stop();
            self.status = "Simulation stopped".to_string();
        }
    }

    fn set_selected_position(&mut self, x: f64, y: f64) {
        let selected = self.state.selected().clone();
        if self.state.registry.set_position(&selected, x, y) {
            self.coord_x = format!("{x:.0}");
            self.coord_y = format!("{y:.0}");
        }
    }

    fn draw_map(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(MAP_SIZE, egui::Sense::click());
        let rect = response.rect;
        painter.rect_filled(rect, egui::CornerRadius::same(6), egui::Color32::from_gray(22));
        painter.rect_stroke(
            rect,
            egui::CornerRadius::same(6),
            egui::Stroke::new(1.0, egui::Color32::from_gray(60)),
            egui::StrokeKind::Inside,
        );

        let sensors: Vec<(SensorId, f64, f64)> = self
            .state
            .registry
            .sensors()
            .iter()
            .map(|s| (s.id.clone(), s.x, s.y))
            .collect();

        let pointer_over_dot = |pos: egui::Pos2| {
            sensors.iter().any(|(_, x, y)| {
                let center = rect.min + egui::Vec2::new(*x as f32, *y as f32);
                center.distance(pos) <= DOT_RADIUS_CRITICAL
            })
        };

        if response.double_clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                if !pointer_over_dot(pos) {
                    let local = pos - rect.min;
                    let id = self.state.registry.register_at(
                        None,
                        f64::from(local.x),
                        f64::from(local.y),
                    );
                    if let Some(sim) = &self.sim {
                        sim.track(id.clone());
                    }
                    self.status = format!("Added sensor {id}");
                }
            }
        }

        let selected = self.state.selected().clone();
        for (id, x, y) in &sensors {
            let latest_tier = self.state.history.latest(id).map(|m| m.tier());
            let radius = if latest_tier == Some(Tier::Critical) {
                DOT_RADIUS_CRITICAL
            } else {
                DOT_RADIUS
            };
            let center = rect.min + egui::Vec2::new(*x as f32, *y as f32);
            let dot_rect = egui::Rect::from_center_size(center, egui::Vec2::splat(radius * 2.0));
            let dot_response = ui.interact(
                dot_rect,
                egui::Id::new(("sensor-dot", id.as_str())),
                egui::Sense::click_and_drag(),
            );

            if dot_response.dragged() {
                let delta = dot_response.drag_delta();
                let nx = (*x + f64::from(delta.x))
                    .clamp(0.0, f64::from(MAP_SIZE.x) - f64::from(radius));
                let ny = (*y + f64::from(delta.y))
                    .clamp(0.0, f64::from(MAP_SIZE.y) - f64::from(radius));
                self.state.registry.set_position(id, nx, ny);
                if *id == selected {
                    self.coord_x = format!("{nx:.0}");
                    self.coord_y = format!("{ny:.0}");
                }
            }
            if dot_response.clicked() {
                self.state.select(id, &mut self.sink);
                if let Some((sx, sy)) = self.state.registry.position(id) {
                    self.coord_x = format!("{sx:.0}");
                    self.coord_y = format!("{sy:.0}");
                }
            }

            let center = {
                // repaint at the possibly-updated position
                let (cx, cy) = self.state.registry.position(id).unwrap_or((*x, *y));
                rect.min + egui::Vec2::new(cx as f32, cy as f32)
            };
            painter.circle_filled(center, radius, tier_color(latest_tier));
            if *id == selected {
                painter.circle_stroke(
                    center,
                    radius + 2.0,
                    egui::Stroke::new(2.0, egui::Color32::WHITE),
                );
            }
            painter.text(
                center + egui::Vec2::new(0.0, radius + 10.0),
                egui::Align2::CENTER_CENTER,
                id.as_str(),
                egui::FontId::proportional(11.0),
                egui::Color32::LIGHT_GRAY,
            );
        }

        ui.label(
            egui::RichText::new("Double-click to add a sensor; drag a dot to move it")
                .italics()
                .color(egui::Color32::GRAY),
        );
    }

    fn draw_summary(&mut self, ui: &mut egui::Ui) {
        let selected = self.state.selected().clone();
        ui.heading(format!("Sensor {selected}"));
        ui.add_space(4.0);

        match self.state.selected_latest().cloned() {
            Some(latest) => {
                let tier = latest.tier();
                let color = tier_color(Some(tier));
                ui.label(
                    egui::RichText::new(format!("{:.1} ppm", latest.ppm))
                        .size(30.0)
                        .strong()
                        .color(color),
                );
                ui.label(egui::RichText::new(tier.label()).size(16.0).color(color));
                ui.add(
                    egui::ProgressBar::new((latest.ppm / LEVEL_BAR_MAX).clamp(0.0, 1.0) as f32)
                        .fill(color)
                        .desired_width(220.0),
                );
                ui.label(format!(
                    "updated {}s ago",
                    latest.taken_at.elapsed().as_secs()
                ));
            }
            None => {
                ui.label(
                    egui::RichText::new("No data")
                        .size(20.0)
                        .color(egui::Color32::GRAY),
                );
            }
        }

        ui.add_space(8.0);
        let conn_state = self.conn.state(&selected);
        ui.label(format!("Telemetry: {}", conn_state.label()));
        ui.horizontal(|ui| {
            if ui
                .add_enabled(
                    conn_state == ConnState::Disconnected,
                    egui::Button::new("Connect"),
                )
                .clicked()
            {
                self.conn
                    .connect(&self.cfg.mqtt, &selected, self.events_tx.clone());
                self.status = format!("Connecting {selected}...");
            }
            if ui
                .add_enabled(
                    matches!(conn_state, ConnState::Connecting | ConnState::Connected),
                    egui::Button::new("Disconnect"),
                )
                .clicked()
            {
                self.conn.disconnect(&selected);
                self.status = format!("{selected} telemetry stopped");
            }
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.sim.is_none(), egui::Button::new("Start demo"))
                .clicked()
            {
                self.start_simulation();
            }
            if ui
                .add_enabled(self.sim.is_some(), egui::Button::new("Stop demo"))
                .clicked()
            {
                self.stop_simulation();
            }
        });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label("X");
            ui.add(egui::TextEdit::singleline(&mut self.coord_x).desired_width(50.0));
            ui.label("Y");
            ui.add(egui::TextEdit::singleline(&mut self.coord_y).desired_width(50.0));
            if ui.button("Set").clicked() {
                // invalid input is ignored, matching the coordinate boxes'
                // forgiving behavior
                if let (Ok(x), Ok(y)) = (self.coord_x.parse(), self.coord_y.parse()) {
                    self.set_selected_position(x, y);
                }
            }
        });
    }

    fn draw_history(&self, ui: &mut egui::Ui) {
        ui.heading("History");
        let selected = self.state.selected();
        egui::ScrollArea::vertical()
            .max_height(240.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                if self.state.history.is_empty(selected) {
                    ui.label(
                        egui::RichText::new("No measurements yet")
                            .italics()
                            .color(egui::Color32::GRAY),
                    );
                    return;
                }
                for m in self.state.history.all(selected) {
                    let tier = m.tier();
                    let row = format!(
                        "{:>4}s ago  {:>6.1} ppm  {:<9} ({:.0}, {:.0})",
                        m.taken_at.elapsed().as_secs(),
                        m.ppm,
                        tier.label(),
                        m.x,
                        m.y,
                    );
                    ui.label(
                        egui::RichText::new(row)
                            .monospace()
                            .color(tier_color(Some(tier))),
                    );
                }
            });
    }

    fn draw_settings(&mut self, ui: &mut egui::Ui) {
        ui.heading("MQTT Broker");
        ui.separator();

        ui.horizontal(|ui| {
            ui.label("Host");
            ui.text_edit_singleline(&mut self.cfg.mqtt.host);
            ui.label("Port");
            ui.add(egui::DragValue::new(&mut self.cfg.mqtt.port).range(1..=65535));
        });

        ui.horizontal(|ui| {
            ui.checkbox(&mut self.cfg.mqtt.tls, "TLS");
            ui.label("CA path");
            let mut ca_str = self
                .cfg
                .mqtt
                .ca_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            if ui.text_edit_singleline(&mut ca_str).changed() {
                self.cfg.mqtt.ca_path = if ca_str.trim().is_empty() {
                    None
                } else {
                    Some(ca_str.into())
                };
            }
        });

        ui.horizontal(|ui| {
            ui.label("Client ID");
            let mut cid = self.cfg.mqtt.client_id.clone().unwrap_or_default();
            if ui.text_edit_singleline(&mut cid).changed() {
                self.cfg.mqtt.client_id = if cid.trim().is_empty() {
                    None
                } else {
                    Some(cid)
                };
            }
        });

        ui.horizontal(|ui| {
            ui.label("Topic prefix");
            let mut prefix = self.cfg.mqtt.topic_prefix.clone().unwrap_or_default();
            if ui.text_edit_singleline(&mut prefix).changed() {
                self.cfg.mqtt.topic_prefix = if prefix.trim().is_empty() {
                    None
                } else {
                    Some(prefix)
                };
            }
        });

        ui.horizontal(|ui| {
            ui.label("QoS");
            ui.add(egui::DragValue::new(&mut self.cfg.mqtt.qos).range(0..=2));
            ui.label("Keepalive (s)");
            ui.add(egui::DragValue::new(&mut self.cfg.mqtt.keepalive_secs).range(5..=1200));
            ui.label("Demo tick (ms)");
            ui.add(egui::DragValue::new(&mut self.cfg.simulation.interval_ms).range(100..=5000));
        });

        ui.horizontal(|ui| {
            if ui.button("Save settings").clicked() {
                self.save_all();
            }
            if ui
                .add_enabled(!self.testing, egui::Button::new("Test connection"))
                .clicked()
            {
                self.status = "Testing connection...".to_string();
                self.testing = true;
                let cfg = self.cfg.clone();
                let tx = self.test_tx.clone();
                std::thread::spawn(move || {
                    let result = match mqtt::test_connection(&cfg.mqtt) {
                        Ok(_) => TestResult::Ok,
                        Err(err) => TestResult::Err(format!("{err:#}")),
                    };
                    let _ = tx.send(result);
                });
            }
            if let Some(t) = self.last_save {
                ui.label(format!("Last saved {}s ago", t.elapsed().as_secs()));
            }
        });
    }
}

impl Drop for MonitorApp {
    fn drop(&mut self) {
        if let Some(mut sim) = self.sim.take() {
            sim.stop();
        }
        self.conn.shutdown();
    }
}

impl App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_tests();
        self.poll_events();
        self.conn.poll();

        // background feeds deliver between frames
        ctx.request_repaint_after(Duration::from_millis(200));
        ctx.set_visuals(egui::Visuals::dark());

        egui::TopBottomPanel::top("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("GasMap Monitor");
                ui.label(format!("Status: {}", self.status));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    egui::CollapsingHeader::new("Connection Settings")
                        .default_open(false)
                        .show(ui, |ui| self.draw_settings(ui));

                    ui.separator();
                    ui.horizontal_top(|ui| {
                        ui.vertical(|ui| self.draw_map(ui));
                        ui.add_space(12.0);
                        ui.vertical(|ui| self.draw_summary(ui));
                    });

                    ui.separator();
                    self.draw_history(ui);
                });
        });
    }
}
