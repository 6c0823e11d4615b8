//! Engine and sink doubles shared by the unit tests.

use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use crate::constraint::{Constraint, ConstraintError};
use crate::engine::{frame_due, AdvanceReport, Engine, EngineError};
use crate::sink::{Frame, FrameSink, SinkError, SinkFactory};

/// Counts steps instead of integrating anything. Optionally fails on the
/// n-th advance, after writing half a segment's worth of frames.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    ids: Vec<u64>,
    types: Vec<usize>,
    positions: Vec<[f64; 3]>,
    constraint: Option<Constraint>,
    advances: Vec<u64>,
    total: u64,
    fail_on: Option<u64>,
}

impl ScriptedEngine {
    pub fn failing_on(advance: u64) -> Self {
        ScriptedEngine {
            fail_on: Some(advance),
            ..ScriptedEngine::default()
        }
    }

    pub fn advances(&self) -> &[u64] {
        &self.advances
    }
}

impl Engine for ScriptedEngine {
    /// Particle count as text.
    type Source = str;

    fn initialize(&mut self, source: &str) -> Result<(), EngineError> {
        let count: u64 = source
            .split_whitespace()
            .next()
            .and_then(|word| word.parse().ok())
            .ok_or_else(|| EngineError::invalid("expected a particle count"))?;
        self.ids = (1..=count).collect();
        self.types = vec![1; count as usize];
        self.positions = vec![[0.0; 3]; count as usize];
        Ok(())
    }

    fn install_constraint(&mut self, constraint: &Constraint) -> Result<(), ConstraintError> {
        self.constraint = Some(constraint.clone());
        Ok(())
    }

    fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    fn advance(&mut self, steps: u64, sink: &mut dyn FrameSink) -> Result<AdvanceReport, EngineError> {
        self.advances.push(steps);
        let failing = self.fail_on == Some(self.advances.len() as u64);
        let limit = if failing { steps / 2 } else { steps };

        let mut report = AdvanceReport::default();
        for step in 1..=limit {
            self.total += 1;
            if frame_due(step, sink.cadence()) {
                let frame = Frame {
                    timestep: self.total,
                    bounds: [[0.0, 1.0]; 3],
                    ids: &self.ids,
                    types: &self.types,
                    positions: &self.positions,
                };
                sink.write_frame(&frame)?;
                report.frames += 1;
            }
        }
        report.steps = limit;

        if failing {
            return Err(EngineError::unstable(self.total, "scripted failure"));
        }
        Ok(report)
    }

    fn total_steps(&self) -> u64 {
        self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open(String),
    /// Artifact name and frame timestep.
    Frame(String, u64),
    Close(String),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

/// Records the sink lifecycle instead of touching the filesystem.
#[derive(Debug, Default)]
pub struct RecordingSinks {
    events: EventLog,
    refuse: Option<String>,
}

impl RecordingSinks {
    pub fn refusing(name: &str) -> Self {
        RecordingSinks {
            refuse: Some(name.to_string()),
            ..RecordingSinks::default()
        }
    }

    pub fn events(&self) -> EventLog {
        Rc::clone(&self.events)
    }
}

impl SinkFactory for RecordingSinks {
    type Sink = RecordingSink;

    fn open(&mut self, name: &str, cadence: u64) -> Result<RecordingSink, SinkError> {
        if self.refuse.as_deref() == Some(name) {
            return Err(SinkError::new(
                PathBuf::from(name),
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            ));
        }
        self.events.borrow_mut().push(Event::Open(name.to_string()));
        Ok(RecordingSink {
            name: name.to_string(),
            cadence,
            events: Rc::clone(&self.events),
        })
    }
}

#[derive(Debug)]
pub struct RecordingSink {
    name: String,
    cadence: u64,
    events: EventLog,
}

impl FrameSink for RecordingSink {
    fn cadence(&self) -> u64 {
        self.cadence
    }

    fn write_frame(&mut self, frame: &Frame<'_>) -> Result<(), SinkError> {
        self.events
            .borrow_mut()
            .push(Event::Frame(self.name.clone(), frame.timestep));
        Ok(())
    }

    fn close(self) -> Result<(), SinkError> {
        self.events.borrow_mut().push(Event::Close(self.name));
        Ok(())
    }
}
