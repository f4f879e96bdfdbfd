use std::{
    fs,
    net::ToSocketAddrs,
    path::Path,
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use rumqttc::tokio_rustls::rustls::{
    ClientConfig, RootCertStore,
    pki_types::{CertificateDer, pem::PemObject},
};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use tracing::{error, trace};

use crate::{config::MqttConfig, registry::SensorId, state::SensorEvent};

/// Topic prefix used when the config leaves it unset.
pub const DEFAULT_TOPIC_PREFIX: &str = "gasmap/lab";

/// Test a one-shot MQTT connection and wait for the broker's ConnAck.
pub fn test_connection(cfg: &MqttConfig) -> Result<()> {
    socket_check(cfg)?;

    let mut opts = base_options(cfg, "probe")?;
    opts.set_clean_session(true);

    let (client, mut connection) = Client::new(opts, 10);
    client.subscribe(format!("{}/#", topic_base(cfg)), QoS::AtMostOnce)?;

    let start = Instant::now();
    let timeout = Duration::from_secs(5);

    for notification in connection.iter() {
        if start.elapsed() > timeout {
            anyhow::bail!("MQTT test timed out after {:?}", timeout);
        }
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => continue,
            Err(err) => return Err(err).context("MQTT error during test"),
        }
    }

    anyhow::bail!("MQTT test ended without ConnAck")
}

/// Run one sensor's telemetry feed and forward readings to the UI thread.
///
/// Emits `Connected` on ConnAck, `ConnectFailed` if the transport dies
/// before one, and `ConnectionLost` after one. No automatic reconnect;
/// the feed exits on the first transport error or stop signal.
pub fn run_feed(
    cfg: MqttConfig,
    sensor_id: SensorId,
    tx: mpsc::Sender<SensorEvent>,
    stop_rx: mpsc::Receiver<()>,
) -> Result<()> {
    if let Err(err) = socket_check(&cfg) {
        let _ = tx.send(SensorEvent::ConnectFailed {
            sensor_id,
            reason: format!("{err:#}"),
        });
        return Ok(());
    }

    let opts = match feed_options(&cfg, &sensor_id) {
        Ok(opts) => opts,
        Err(err) => {
            let _ = tx.send(SensorEvent::ConnectFailed {
                sensor_id,
                reason: format!("{err:#}"),
            });
            return Ok(());
        }
    };

    let (client, mut connection) = Client::new(opts, 20);
    let topic = feed_topic(&cfg, &sensor_id);
    if let Err(err) = client.subscribe(topic.clone(), qos_from(cfg.qos)) {
        let _ = tx.send(SensorEvent::ConnectFailed {
            sensor_id,
            reason: format!("{err:#}"),
        });
        return Ok(());
    }

    let mut acked = false;
    for notification in connection.iter() {
        if stop_rx.try_recv().is_ok() {
            let _ = client.disconnect();
            break;
        }
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                acked = true;
                let _ = tx.send(SensorEvent::Status(format!(
                    "{sensor_id} subscribed to {topic}"
                )));
                if tx.send(SensorEvent::Connected(sensor_id.clone())).is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let Some(ppm) = parse_concentration(&p.payload) else {
                    trace!("dropping unparseable payload on {}", p.topic);
                    continue;
                };
                let reading = SensorEvent::Reading {
                    sensor_id: sensor_id.clone(),
                    ppm,
                };
                if tx.send(reading).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                error!("MQTT feed error for {}: {:#}", sensor_id, err);
                let reason = format!("{err:#}");
                let event = if acked {
                    SensorEvent::ConnectionLost { sensor_id, reason }
                } else {
                    SensorEvent::ConnectFailed { sensor_id, reason }
                };
                let _ = tx.send(event);
                break;
            }
        }
    }

    Ok(())
}

/// Parse a telemetry payload as a concentration. Tolerates surrounding
/// whitespace and a decimal comma; anything else is a silent drop.
pub fn parse_concentration(payload: &[u8]) -> Option<f64> {
    let text = String::from_utf8_lossy(payload);
    text.trim().replace(',', ".").parse().ok()
}

/// Topic a sensor's feed subscribes to: `{prefix}/{sensor_id}`, lowercased.
pub fn feed_topic(cfg: &MqttConfig, sensor_id: &SensorId) -> String {
    format!(
        "{}/{}",
        topic_base(cfg),
        sensor_id.as_str().to_ascii_lowercase()
    )
}

// Normalize the configured prefix: strip any trailing wildcard the user may
// have entered and collapse trailing slashes.
fn topic_base(cfg: &MqttConfig) -> String {
    let raw = cfg
        .topic_prefix
        .as_deref()
        .unwrap_or(DEFAULT_TOPIC_PREFIX)
        .trim();
    raw.trim_end_matches("/#")
        .trim_end_matches('#')
        .trim_end_matches('/')
        .to_string()
}

fn base_options(cfg: &MqttConfig, suffix: &str) -> Result<MqttOptions> {
    let base = cfg.client_id.as_deref().unwrap_or("gasmap-monitor");
    let mut opts = MqttOptions::new(format!("{base}-{suffix}"), cfg.host.clone(), cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keepalive_secs.into()));
    if cfg.tls {
        let tls = tls_config(cfg.ca_path.as_deref())?;
        opts.set_transport(Transport::tls_with_config(tls));
    }
    Ok(opts)
}

// Per-sensor client id so concurrent feeds don't evict each other's broker
// session.
fn feed_options(cfg: &MqttConfig, sensor_id: &SensorId) -> Result<MqttOptions> {
    let mut opts = base_options(cfg, &sensor_id.as_str().to_ascii_lowercase())?;
    opts.set_clean_session(true);
    Ok(opts)
}

fn qos_from(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

fn tls_config(ca_path: Option<&Path>) -> Result<TlsConfiguration> {
    let mut roots = RootCertStore::empty();
    if let Some(path) = ca_path {
        let data = fs::read(path)
            .with_context(|| format!("failed to read CA file at {}", path.display()))?;
        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&data)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| anyhow::anyhow!("failed to parse CA certs"))?;
        let (added, _skipped) = roots.add_parsable_certificates(certs);
        if added == 0 {
            anyhow::bail!("no CA certs added from {}", path.display());
        }
    } else {
        let native_result = rustls_native_certs::load_native_certs();
        if !native_result.errors.is_empty() && native_result.certs.is_empty() {
            anyhow::bail!("failed to load native certs: {:?}", native_result.errors);
        }
        let (added, _skipped) = roots.add_parsable_certificates(native_result.certs);
        if added == 0 {
            anyhow::bail!("no native certificates available");
        }
    }
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConfiguration::Rustls(Arc::new(config)))
}

fn socket_check(cfg: &MqttConfig) -> Result<()> {
    let addr = format!("{}:{}", cfg.host, cfg.port);
    let mut addrs = addr.to_socket_addrs().context("invalid host/port")?;
    let target = addrs
        .next()
        .context("could not resolve host for socket check")?;
    let timeout = Duration::from_secs(3);
    std::net::TcpStream::connect_timeout(&target, timeout)
        .with_context(|| format!("failed to reach {}", target))?;
    Ok(())
}
