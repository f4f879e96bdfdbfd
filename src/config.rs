use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub ca_path: Option<PathBuf>,
    pub client_id: Option<String>,
    pub topic_prefix: Option<String>,
    pub qos: u8,
    pub keepalive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".to_string(),
            port: 1883,
            tls: false,
            ca_path: None,
            client_id: Some("gasmap-monitor".to_string()),
            topic_prefix: None,
            qos: 0,
            keepalive_secs: 30,
        }
    }
}

/// Random-walk generator settings. Each tracked sensor steps by a uniform
/// delta in [walk_min, walk_max) per tick, clamped to [floor_ppm, ceil_ppm].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub interval_ms: u64,
    pub start_ppm: f64,
    pub floor_ppm: f64,
    pub ceil_ppm: f64,
    pub walk_min: f64,
    pub walk_max: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            start_ppm: 50.0,
            floor_ppm: 20.0,
            ceil_ppm: 250.0,
            walk_min: -20.0,
            walk_max: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub simulation: SimulationConfig,
}

pub struct ConfigPaths {
    pub config_file: PathBuf,
}

impl ConfigPaths {
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "gasmap", "monitor")
            .context("could not determine XDG config dir")?;
        let config_file = dirs.config_dir().join("config.toml");
        Ok(Self { config_file })
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        match ConfigPaths::new() {
            Ok(p) => p,
            Err(err) => {
                warn!("ConfigPaths::default fallback: {:#}", err);
                ConfigPaths {
                    config_file: PathBuf::from("config.toml"),
                }
            }
        }
    }
}

pub fn load_or_default(paths: &ConfigPaths) -> Result<AppConfig> {
    match fs::read_to_string(&paths.config_file) {
        Ok(raw) => {
            let cfg: AppConfig = toml::from_str(&raw).with_context(|| {
                format!("failed to parse config at {}", paths.config_file.display())
            })?;
            Ok(cfg)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to read config at {}", paths.config_file.display())),
    }
}

pub fn save(paths: &ConfigPaths, cfg: &AppConfig) -> Result<()> {
    if let Some(dir) = paths.config_file.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
    }

    let serialized = toml::to_string_pretty(cfg).context("failed to serialize config")?;
    fs::write(&paths.config_file, serialized)
        .with_context(|| format!("failed to write config at {}", paths.config_file.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_broker() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.mqtt.host, "test.mosquitto.org");
        assert_eq!(cfg.mqtt.port, 1883);
        assert!(!cfg.mqtt.tls);
        assert_eq!(cfg.simulation.interval_ms, 500);
        assert_eq!(cfg.simulation.start_ppm, 50.0);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut cfg = AppConfig::default();
        cfg.mqtt.host = "broker.local".to_string();
        cfg.mqtt.topic_prefix = Some("plant/floor2".to_string());
        cfg.simulation.interval_ms = 250;

        let raw = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: AppConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(parsed.mqtt.host, "broker.local");
        assert_eq!(parsed.mqtt.topic_prefix.as_deref(), Some("plant/floor2"));
        assert_eq!(parsed.simulation.interval_ms, 250);
    }
}
