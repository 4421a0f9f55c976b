#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use influx_reporter::{Point, Reporter, WriteError};
use modbus_client::{ClientError, RegisterReader};
use types::DeviceIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Input,
    Holding,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Words(Vec<u16>),
    Timeout,
}

/// Scripted bus: answers reads from a queue, times out once it runs dry.
#[derive(Debug, Default)]
pub struct FakeBus {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(Space, u8, u16, u16)>>,
}

impl FakeBus {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Space, u8, u16, u16)> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn answer(&self, space: Space, unit_id: u8, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((space, unit_id, start, count));
        match self.replies.lock().expect("replies lock").pop_front() {
            Some(Reply::Words(words)) => Ok(words),
            Some(Reply::Timeout) | None => Err(ClientError::Timeout { timeout_ms: 1_000 }),
        }
    }
}

impl RegisterReader for FakeBus {
    async fn read_input_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.answer(Space::Input, unit_id, start, count)
    }

    async fn read_holding_registers(
        &self,
        unit_id: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.answer(Space::Holding, unit_id, start, count)
    }
}

/// Keeps every point it is given; fails while `failing` is set.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub points: Mutex<Vec<Point>>,
    pub failing: Mutex<bool>,
}

impl RecordingReporter {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("failing lock") = failing;
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().expect("points lock").clone()
    }
}

impl Reporter for RecordingReporter {
    async fn write(&self, point: &Point) -> Result<(), WriteError> {
        self.points.lock().expect("points lock").push(point.clone());
        if *self.failing.lock().expect("failing lock") {
            return Err(WriteError::Influx("connection refused".to_string()));
        }
        Ok(())
    }
}

pub fn identity() -> DeviceIdentity {
    DeviceIdentity {
        name: "Growatt SPF5000ES".to_string(),
        port: "/dev/null".to_string(),
        unit_id: 1,
    }
}

pub fn probe_reply() -> Reply {
    Reply::Words(vec![1_001])
}

/// Status block in state "PV Charge", Vpv1 = 25.0 V, SOC 87 %.
pub fn status_words() -> Vec<u16> {
    let mut words = vec![0u16; 84];
    words[0] = 5;
    words[1] = 250;
    words[18] = 87;
    words
}
