use std::collections::VecDeque;

use crate::core::{Payload, StreamKind};
use crate::error::{Result, SyncError};
use crate::hal::traits::{CaptureSource, Delivery, SourcePoll};

/// One step of a [`ScriptedSource`]
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Deliver(Payload, Option<u64>),
    Idle,
    Fail(String),
}

/// Unpaced source that replays a fixed script, then reports exhaustion
pub struct ScriptedSource {
    id: String,
    kind: StreamKind,
    steps: VecDeque<ScriptStep>,
    open_failures: u32,
    opens: u32,
}

impl ScriptedSource {
    pub fn new(id: &str, kind: StreamKind, steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            id: id.to_string(),
            kind,
            steps: steps.into_iter().collect(),
            open_failures: 0,
            opens: 0,
        }
    }

    /// Fail the first `count` calls to `open`
    pub fn with_open_failures(mut self, count: u32) -> Self {
        self.open_failures = count;
        self
    }
}

impl CaptureSource for ScriptedSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn open(&mut self) -> Result<()> {
        self.opens += 1;
        if self.opens <= self.open_failures {
            return Err(SyncError::Capture(format!(
                "{} unavailable (attempt {})",
                self.id, self.opens
            )));
        }
        Ok(())
    }

    fn next_delivery(&mut self) -> Result<SourcePoll> {
        match self.steps.pop_front() {
            Some(ScriptStep::Deliver(payload, sensor_time)) => {
                Ok(SourcePoll::Unit(Delivery { payload, sensor_time }))
            }
            Some(ScriptStep::Idle) => Ok(SourcePoll::Idle),
            Some(ScriptStep::Fail(detail)) => Err(SyncError::ProducerLost {
                source_id: self.id.clone(),
                detail,
            }),
            None => Ok(SourcePoll::Exhausted),
        }
    }

    fn close(&mut self) {}
}
