use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use collector_app::{http, CollectorConfig};
use influx_reporter::InfluxReporter;
use modbus_client::ModbusClient;
use poller_actor::{DeviceSession, PollerActor};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = parse_config_arg();
    let config = CollectorConfig::load_with_path(config_path).context("load config failed")?;
    init_tracing(&config.log_filter);
    config.validate().context("config validation failed")?;
    info!(
        device = %config.device.name,
        port = %config.device.port,
        unit_id = config.device.unit_id,
        interval_ms = config.poller.poll_interval.as_millis(),
        mock_reporter = config.is_mock_reporter(),
        "collector starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal_handle = tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let metrics = match config.http_listen {
        Some(_) => Some(http::install_metrics_recorder()?),
        None => None,
    };

    let Some(session) = connect_with_retry(&config, shutdown_rx.clone()).await else {
        info!("shutdown before the inverter answered");
        signal_handle.abort();
        return Ok(());
    };
    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    let reporter = InfluxReporter::from_config(config.influx.clone());
    let actor = PollerActor::new(session, reporter, config.poller.clone(), shutdown_rx.clone());

    let http_handle = match (config.http_listen.clone(), metrics) {
        (Some(listen), Some(metrics)) => {
            let app = http::router(actor.health(), metrics);
            let shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(err) = http::serve(&listen, app, shutdown).await {
                    warn!(error = %err, "http endpoint unavailable");
                }
            }))
        }
        _ => None,
    };

    actor.run().await;

    signal_handle.abort();
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }
    if let Some(handle) = watchdog_handle {
        handle.abort();
    }
    info!("collector stopped");
    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Opens the port and probes the inverter until it answers or shutdown is requested.
async fn connect_with_retry(
    config: &CollectorConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Option<DeviceSession<ModbusClient>> {
    let delay = Duration::from_millis(config.reconnect_delay_ms);
    let mut attempt = 0u64;

    loop {
        if *shutdown.borrow() {
            return None;
        }

        attempt = attempt.saturating_add(1);
        match DeviceSession::connect(config.device.clone(), config.modbus.clone()).await {
            Ok(session) => return Some(session),
            Err(err) => {
                warn!(
                    device = %config.device.name,
                    port = %config.device.port,
                    attempt,
                    kind = ?err.kind(),
                    error = %err,
                    retry_in_ms = config.reconnect_delay_ms,
                    "inverter connect failed"
                );
            }
        }

        tokio::select! {
            _ = sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return None;
                }
            }
        }
    }
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
