use std::{
    env, fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use gasmap_monitor::{
    app::MonitorApp,
    config,
    registry::{PRIMARY_SENSOR, SensorId},
    state::SensorEvent,
};

fn make_unique_tempdir() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let base = env::temp_dir().join(format!(
        "gasmap_monitor_tests_{}_{}",
        std::process::id(),
        now
    ));
    let _ = fs::create_dir_all(&base);
    base
}

#[test]
fn test_app_initialization_with_explicit_config() {
    // Use a unique temp XDG config dir so `ConfigPaths::new()` is deterministic
    let base = make_unique_tempdir();
    let prev = env::var_os("XDG_CONFIG_HOME");
    unsafe {
        env::set_var("XDG_CONFIG_HOME", &base);
    }

    // Prepare a minimal config with a known keepalive value
    let mut cfg = config::AppConfig::default();
    cfg.mqtt.keepalive_secs = 42;
    cfg.simulation.interval_ms = 125;

    let paths = config::ConfigPaths::new().expect("failed to build config paths");
    config::save(&paths, &cfg).expect("failed to write test config");

    let app = MonitorApp::init();

    // deterministic assertions
    assert!(
        app.status.is_empty(),
        "unexpected status on init: {}",
        app.status
    );
    assert_eq!(app.cfg.mqtt.keepalive_secs, 42);
    assert_eq!(app.cfg.simulation.interval_ms, 125);

    // cleanup and restore env
    let _ = fs::remove_dir_all(&base);
    if let Some(prev) = prev {
        unsafe {
            env::set_var("XDG_CONFIG_HOME", prev);
        }
    } else {
        unsafe {
            env::remove_var("XDG_CONFIG_HOME");
        }
    }
}

#[test]
fn test_app_default_starts_with_primary_sensor() {
    let app = MonitorApp::default();
    assert!(
        app.status.is_empty(),
        "default app had non-empty status: {}",
        app.status
    );
    assert_eq!(app.state.selected().as_str(), PRIMARY_SENSOR);
    assert!(app.state.selected_latest().is_none());
}

#[test]
fn test_reading_events_flow_into_selected_history() {
    let mut app = MonitorApp::default();
    let id = SensorId::new(PRIMARY_SENSOR);

    for ppm in [200.0, 90.0, 50.0] {
        app.events_tx
            .send(SensorEvent::Reading {
                sensor_id: id.clone(),
                ppm,
            })
            .unwrap();
    }
    app.poll_events();

    let values: Vec<f64> = app.state.history.all(&id).map(|m| m.ppm).collect();
    assert_eq!(values, vec![50.0, 90.0, 200.0]);
    assert_eq!(app.state.selected_latest().map(|m| m.ppm), Some(50.0));
}

#[test]
fn test_status_events_update_status_line() {
    let mut app = MonitorApp::default();
    app.events_tx
        .send(SensorEvent::Status("probing broker".to_string()))
        .unwrap();
    app.poll_events();
    assert_eq!(app.status, "probing broker");
}

#[test]
fn test_readings_for_unseen_sensor_register_it() {
    let mut app = MonitorApp::default();
    let stray = SensorId::new("S5");

    app.events_tx
        .send(SensorEvent::Reading {
            sensor_id: stray.clone(),
            ppm: 170.0,
        })
        .unwrap();
    app.poll_events();

    assert!(app.state.registry.contains(&stray));
    assert_eq!(app.state.history.len(&stray), 1);
    // selection is unchanged, so the summary still tracks the primary sensor
    assert_eq!(app.state.selected().as_str(), PRIMARY_SENSOR);
    assert!(app.state.selected_latest().is_none());
}
