mod common;

use std::time::Duration;

use influx_reporter::{Point, Reporter, WriteError};

use common::{identity, probe_reply, status_words, FakeBus, RecordingReporter, Reply, Space};
use poller_actor::{ActorConfig, CycleOutcome, DeviceSession, ErrorKind, PollerActor};
use tokio::sync::watch;
use types::FieldValue;

/// Accepts a write and never answers, like a server that stopped responding.
struct StalledReporter;

impl Reporter for StalledReporter {
    async fn write(&self, _point: &Point) -> Result<(), WriteError> {
        std::future::pending().await
    }
}

fn actor_config() -> ActorConfig {
    ActorConfig {
        poll_interval: Duration::from_millis(10),
        measurement: "growatt_status".to_string(),
        location: "home".to_string(),
        degraded_after: 3,
        write_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn poll_once_reports_tagged_status_point() {
    let bus = FakeBus::new([probe_reply(), Reply::Words(status_words())]);
    let reporter = RecordingReporter::default();
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut actor = PollerActor::new(session, &reporter, actor_config(), shutdown_rx);

    assert_eq!(actor.poll_once().await, CycleOutcome::Reported);

    let points = reporter.points();
    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point.measurement(), "growatt_status");
    assert_eq!(point.tags().get("location").map(String::as_str), Some("home"));
    assert_eq!(point.field_values()[0].0, "Module");
    assert_eq!(point.get("Module"), Some(&FieldValue::Integer(1)));
    assert_eq!(point.get("StatusCode"), Some(&FieldValue::Integer(5)));
    assert_eq!(point.get("Status"), Some(&FieldValue::Text("PV Charge".to_string())));
    assert_eq!(point.get("Vpv1"), Some(&FieldValue::Float(25.0)));
    assert_eq!(point.get("BatterySOC"), Some(&FieldValue::Float(87.0)));
    assert_eq!(point.field_values().len(), 84);
}

#[tokio::test]
async fn transport_timeout_skips_one_cycle_only() {
    let bus = FakeBus::new([probe_reply(), Reply::Timeout, Reply::Words(status_words())]);
    let reporter = RecordingReporter::default();
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut actor = PollerActor::new(session, &reporter, actor_config(), shutdown_rx);

    assert_eq!(
        actor.poll_once().await,
        CycleOutcome::ReadFailed(ErrorKind::Transport)
    );
    assert!(reporter.points().is_empty());

    assert_eq!(actor.poll_once().await, CycleOutcome::Reported);
    assert_eq!(reporter.points().len(), 1);

    let calls = bus.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1], (Space::Input, 1, 0, 84));
    assert_eq!(calls[2], (Space::Input, 1, 0, 84));
}

#[tokio::test]
async fn decode_failure_writes_nothing() {
    let mut words = status_words();
    words[0] = 13;
    let bus = FakeBus::new([probe_reply(), Reply::Words(words)]);
    let reporter = RecordingReporter::default();
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut actor = PollerActor::new(session, &reporter, actor_config(), shutdown_rx);

    assert_eq!(
        actor.poll_once().await,
        CycleOutcome::ReadFailed(ErrorKind::Decode)
    );
    assert!(reporter.points().is_empty());
}

#[tokio::test]
async fn repeated_write_failures_flag_degraded_until_success() {
    let replies = std::iter::once(probe_reply())
        .chain((0..5).map(|_| Reply::Words(status_words())))
        .collect::<Vec<_>>();
    let bus = FakeBus::new(replies);
    let reporter = RecordingReporter::default();
    reporter.set_failing(true);
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut actor = PollerActor::new(session, &reporter, actor_config(), shutdown_rx);
    let health = actor.health();

    assert_eq!(actor.poll_once().await, CycleOutcome::WriteFailed);
    assert_eq!(actor.poll_once().await, CycleOutcome::WriteFailed);
    assert!(!health.borrow().degraded);
    assert_eq!(health.borrow().consecutive_write_failures, 2);

    assert_eq!(actor.poll_once().await, CycleOutcome::WriteFailed);
    assert!(health.borrow().degraded);

    assert_eq!(actor.poll_once().await, CycleOutcome::WriteFailed);
    assert_eq!(health.borrow().consecutive_write_failures, 4);

    reporter.set_failing(false);
    assert_eq!(actor.poll_once().await, CycleOutcome::Reported);
    assert!(!health.borrow().degraded);
    assert_eq!(health.borrow().consecutive_write_failures, 0);

    // Script exhausted: the read times out and no write is attempted.
    assert_eq!(
        actor.poll_once().await,
        CycleOutcome::ReadFailed(ErrorKind::Transport)
    );
    assert_eq!(health.borrow().consecutive_write_failures, 0);
    assert_eq!(
        health.borrow().last_outcome,
        Some(CycleOutcome::ReadFailed(ErrorKind::Transport))
    );

    assert_eq!(reporter.points().len(), 5);
}

#[tokio::test]
async fn run_stops_promptly_on_shutdown() {
    let bus = FakeBus::new([probe_reply()]);
    let reporter = RecordingReporter::default();
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut config = actor_config();
    config.poll_interval = Duration::from_secs(3_600);
    let actor = PollerActor::new(session, &reporter, config, shutdown_rx);

    let stop = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).expect("send shutdown");
    };
    let ((), ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(actor.run(), stop)
    })
    .await
    .expect("run must stop before the poll interval elapses");

    assert_eq!(bus.calls().len(), 2);
}

#[tokio::test]
async fn stalled_write_times_out_and_counts_toward_degraded() {
    let bus = FakeBus::new([
        probe_reply(),
        Reply::Words(status_words()),
        Reply::Words(status_words()),
    ]);
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut config = actor_config();
    config.write_timeout = Duration::from_millis(20);
    config.degraded_after = 2;
    let mut actor = PollerActor::new(session, StalledReporter, config, shutdown_rx);
    let health = actor.health();

    let outcome = tokio::time::timeout(Duration::from_secs(5), actor.poll_once())
        .await
        .expect("write must be bounded");
    assert_eq!(outcome, CycleOutcome::WriteFailed);
    assert_eq!(health.borrow().consecutive_write_failures, 1);

    assert_eq!(actor.poll_once().await, CycleOutcome::WriteFailed);
    assert!(health.borrow().degraded);
}

#[tokio::test]
async fn shutdown_interrupts_a_stalled_write() {
    let bus = FakeBus::new([probe_reply(), Reply::Words(status_words())]);
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut config = actor_config();
    config.write_timeout = Duration::from_secs(3_600);
    let actor = PollerActor::new(session, StalledReporter, config, shutdown_rx);

    let stop = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).expect("send shutdown");
    };
    tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(actor.run(), stop)
    })
    .await
    .expect("run must stop while a write is in flight");

    assert_eq!(bus.calls().len(), 2);
}
