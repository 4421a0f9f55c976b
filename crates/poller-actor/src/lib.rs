use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use growatt_registers::StatusRecord;
use influx_reporter::{Point, Reporter, WriteError};
use modbus_client::RegisterReader;

pub mod session;

pub use session::{DeviceSession, ErrorKind, SessionError, PROBE_ADDRESS};

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    /// Measurement name of every reported point.
    pub measurement: String,
    /// Value of the static `location` tag.
    pub location: String,
    /// Consecutive write failures before the reporter is flagged degraded.
    pub degraded_after: u32,
    /// Upper bound on one reporter write; expiry counts as a failed write.
    pub write_timeout: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            measurement: "growatt_status".to_string(),
            location: "home".to_string(),
            degraded_after: 3,
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Reported,
    ReadFailed(ErrorKind),
    WriteFailed,
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Reported => "reported",
            CycleOutcome::ReadFailed(ErrorKind::Transport) => "transport_error",
            CycleOutcome::ReadFailed(ErrorKind::Decode) => "decode_error",
            CycleOutcome::WriteFailed => "write_error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerHealth {
    pub consecutive_write_failures: u32,
    pub degraded: bool,
    pub last_outcome: Option<CycleOutcome>,
}

/// Polls one inverter and forwards each status record to a reporter.
pub struct PollerActor<R, P> {
    session: DeviceSession<R>,
    reporter: P,
    config: ActorConfig,
    shutdown: watch::Receiver<bool>,
    health: watch::Sender<PollerHealth>,
}

impl<R: RegisterReader, P: Reporter> PollerActor<R, P> {
    pub fn new(
        session: DeviceSession<R>,
        reporter: P,
        config: ActorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (health, _) = watch::channel(PollerHealth::default());
        Self {
            session,
            reporter,
            config,
            shutdown,
            health,
        }
    }

    pub fn health(&self) -> watch::Receiver<PollerHealth> {
        self.health.subscribe()
    }

    pub fn session(&self) -> &DeviceSession<R> {
        &self.session
    }

    /// One read, and at most one write. Never fails: the outcome says what happened.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let outcome = match self.session.read_status().await {
            Ok(record) => {
                let point = self.build_point(&record);
                debug!(
                    unit_id = self.session.unit_id(),
                    status = %record.status,
                    fields = point.field_values().len(),
                    line = %point.to_line_protocol(),
                    "status record collected"
                );
                match self.write(&point).await {
                    Ok(()) => CycleOutcome::Reported,
                    Err(err) => {
                        warn!(
                            unit_id = self.session.unit_id(),
                            measurement = %self.config.measurement,
                            error = %err,
                            "reporter write failed"
                        );
                        CycleOutcome::WriteFailed
                    }
                }
            }
            Err(err) => {
                warn!(
                    unit_id = self.session.unit_id(),
                    kind = ?err.kind(),
                    error = %err,
                    "no status record this cycle"
                );
                CycleOutcome::ReadFailed(err.kind())
            }
        };

        self.record_outcome(outcome);
        outcome
    }

    /// Polls until shutdown. A shutdown request also cancels a cycle in flight.
    pub async fn run(mut self) {
        let mut shutdown = self.shutdown.clone();
        let mut iteration = 0u64;

        loop {
            if *shutdown.borrow() {
                info!(device = %self.session.identity().name, "poller shutdown requested");
                break;
            }

            let cycle_start = Instant::now();
            let outcome = tokio::select! {
                outcome = self.poll_once() => outcome,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(
                            device = %self.session.identity().name,
                            "poller shutdown requested, cycle abandoned"
                        );
                        break;
                    }
                    continue;
                }
            };
            iteration = iteration.wrapping_add(1);
            let elapsed = cycle_start.elapsed();
            info!(
                device = %self.session.identity().name,
                unit_id = self.session.unit_id(),
                iteration,
                outcome = outcome.as_str(),
                elapsed_ms = elapsed.as_millis(),
                delay_ms = self.config.poll_interval.as_millis(),
                "poll cycle complete"
            );

            tokio::select! {
                _ = sleep(self.config.poll_interval) => {},
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(device = %self.session.identity().name, "poller shutdown requested");
                        break;
                    }
                }
            }
        }
    }

    async fn write(&self, point: &Point) -> Result<(), WriteError> {
        let limit = self.config.write_timeout;
        match timeout(limit, self.reporter.write(point)).await {
            Ok(result) => result,
            Err(_) => Err(WriteError::Timeout {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn build_point(&self, record: &StatusRecord) -> Point {
        Point::new(self.config.measurement.as_str())
            .tag("location", self.config.location.as_str())
            .field("Module", self.session.unit_id())
            .fields(record.fields())
            .timestamp_ns(unix_ns())
    }

    fn record_outcome(&self, outcome: CycleOutcome) {
        let previous = *self.health.borrow();
        let failures = match outcome {
            CycleOutcome::Reported => 0,
            CycleOutcome::WriteFailed => previous.consecutive_write_failures.saturating_add(1),
            CycleOutcome::ReadFailed(_) => previous.consecutive_write_failures,
        };
        let degraded = failures >= self.config.degraded_after.max(1);

        if degraded && !previous.degraded {
            error!(
                device = %self.session.identity().name,
                consecutive_failures = failures,
                "reporter degraded"
            );
        } else if !degraded && previous.degraded {
            info!(device = %self.session.identity().name, "reporter recovered");
        }

        metrics::counter!("growatt_polls_total", "outcome" => outcome.as_str()).increment(1);
        metrics::gauge!("growatt_consecutive_write_failures").set(f64::from(failures));
        metrics::gauge!("growatt_reporter_degraded").set(if degraded { 1.0 } else { 0.0 });

        self.health.send_replace(PollerHealth {
            consecutive_write_failures: failures,
            degraded,
            last_outcome: Some(outcome),
        });
    }
}

fn unix_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}
