//! Netflux demo node
//!
//! Exchanges a [`ProcessData`] record with one partner and logs link status
//! and statistics once a second.
//!
//! Environment variables:
//! - NETFLUX_CONFIG: path to a TOML configuration (defaults apply when unset)
//! - NETFLUX_LOCAL_PORT / NETFLUX_REMOTE_PORT: override the configured ports
//! - RUST_LOG: tracing filter (default `netflux=info,netflux_node=info`)
//!
//! Two nodes on one machine:
//!
//! ```text
//! NETFLUX_LOCAL_PORT=2000 NETFLUX_REMOTE_PORT=2001 netflux-node
//! NETFLUX_LOCAL_PORT=2001 NETFLUX_REMOTE_PORT=2000 netflux-node
//! ```

mod process_data;

use std::process::ExitCode;
use std::time::Duration;

use netflux::{ConfigError, NetfluxConfig, Node};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use process_data::ProcessData;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("netflux=info,netflux_node=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<NetfluxConfig, DemoError> {
    let mut config = match std::env::var("NETFLUX_CONFIG") {
        Ok(path) => NetfluxConfig::from_file(&path)?,
        Err(_) => NetfluxConfig::default(),
    };
    if let Some(port) = port_from_env("NETFLUX_LOCAL_PORT")? {
        config.local_port = port;
    }
    if let Some(port) = port_from_env("NETFLUX_REMOTE_PORT")? {
        config.remote_port = port;
    }
    Ok(config)
}

fn port_from_env(name: &'static str) -> Result<Option<u16>, DemoError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| DemoError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

async fn run() -> Result<(), DemoError> {
    let config = load_config()?;
    let settings = config.validate()?;
    if settings.payload_size() != process_data::RECORD_SIZE {
        warn!(
            payload_size = settings.payload_size(),
            record_size = process_data::RECORD_SIZE,
            "payload size differs from the record size; records will be truncated or padded"
        );
    }

    let mut outgoing = ProcessData {
        setpoint: 42.0,
        ..Default::default()
    };
    let source = move |buf: &mut [u8]| {
        outgoing.counter = outgoing.counter.wrapping_add(1);
        outgoing.actual = (outgoing.counter % 1000) as f32 / 10.0;
        outgoing.write_to(buf);
    };
    let sink = |payload: &[u8]| match ProcessData::from_bytes(payload) {
        Ok(record) => debug!(?record, "partner data"),
        Err(e) => debug!(error = %e, "partner payload is not a record"),
    };

    let node = Node::spawn(settings, source, sink);
    let mut report = tokio::time::interval(REPORT_INTERVAL);
    report.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = report.tick() => {
                let stats = node.stats();
                let counters = node.counters();
                let partner = ProcessData::from_bytes(&node.received_payload()).ok();
                info!(
                    status = %node.status(),
                    link = ?node.link_state(),
                    sent = counters.sent,
                    accepted = counters.accepted,
                    rejected = counters.rejected(),
                    send_errors = counters.send_errors,
                    own_interval_us = stats.avg_own_interval.as_micros() as u64,
                    partner_interval_us = stats.avg_partner_interval.as_micros() as u64,
                    partner_jitter_us = stats.partner_jitter.as_micros() as u64,
                    rtt_us = stats.last_rtt.map(|rtt| rtt.as_micros() as u64),
                    partner_lost = stats.total_partner_lost_packets,
                    feedback_lost = stats.total_feedback_lost_packets,
                    "status"
                );
                if let Some(record) = partner {
                    info!(counter = record.counter, actual = record.actual, "partner record");
                }
                if let Some(watchdog) = stats.recommended_watchdog_interval() {
                    debug!(recommended_ms = watchdog.as_millis() as u64, "watchdog tuning");
                }
            }
        }
    }

    info!("shutting down");
    node.shutdown().await;
    Ok(())
}
