mod common;

use std::io;
use std::sync::{Arc, Mutex};

use common::{identity, probe_reply, status_words, FakeBus, RecordingReporter, Reply};
use poller_actor::{ActorConfig, CycleOutcome, DeviceSession, PollerActor};
use tokio::sync::watch;

#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log lock")).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn collected_record_is_logged_with_its_values() {
    let log = CapturedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let bus = FakeBus::new([probe_reply(), Reply::Words(status_words())]);
    let reporter = RecordingReporter::default();
    let session = DeviceSession::attach(identity(), &bus).await.expect("attach");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut actor = PollerActor::new(session, &reporter, ActorConfig::default(), shutdown_rx);

    assert_eq!(actor.poll_once().await, CycleOutcome::Reported);

    let output = log.contents();
    let record_line = output
        .lines()
        .find(|line| line.contains("status record collected"))
        .expect("debug line for the collected record");
    assert!(record_line.contains("StatusCode=5i"));
    assert!(record_line.contains("Status=\"PV Charge\""));
    assert!(record_line.contains("Vpv1=25"));
    assert!(record_line.contains("BatterySOC=87"));
}
