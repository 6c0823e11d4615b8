//! Drives an [`Engine`] through a segmented run.
//!
//! The driver moves through `Uninitialized -> Initialized ->
//! ConstraintInstalled -> Running -> Completed` as a chain of types, so a
//! run cannot advance before its constraint is installed and cannot install
//! a second one. The last stage, [`Segments`], is an iterator: each `next`
//! opens one sink, advances one segment, closes the sink and yields one
//! [`ProgressRecord`].

use std::fmt;
use tracing::{debug, info, warn};

use crate::constraint::{Constraint, ConstraintError};
use crate::engine::Engine;
use crate::error::Error;
use crate::segment::{ProgressRecord, SegmentPlan};
use crate::sink::{FrameSink, SinkFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    ConstraintInstalled,
    Running,
    Completed,
    /// A segment failed; the run is over and cannot be resumed.
    Stopped,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverState::Uninitialized => "uninitialized",
            DriverState::Initialized => "initialized",
            DriverState::ConstraintInstalled => "constraint installed",
            DriverState::Running => "running",
            DriverState::Completed => "completed",
            DriverState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct Driver<E, O> {
    engine: E,
    sinks: O,
}

impl<E: Engine, O: SinkFactory> Driver<E, O> {
    pub fn new(engine: E, sinks: O) -> Self {
        Driver { engine, sinks }
    }

    pub fn state(&self) -> DriverState {
        DriverState::Uninitialized
    }

    /// Loads the initial configuration into the engine.
    pub fn initialize(mut self, source: &E::Source) -> Result<InitializedDriver<E, O>, Error> {
        self.engine.initialize(source).map_err(Error::Initialization)?;
        info!("simulation state initialized");
        Ok(InitializedDriver {
            engine: self.engine,
            sinks: self.sinks,
        })
    }
}

pub struct InitializedDriver<E, O> {
    engine: E,
    sinks: O,
}

impl<E: Engine, O: SinkFactory> InitializedDriver<E, O> {
    pub fn state(&self) -> DriverState {
        DriverState::Initialized
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Validates `constraint` and hands it to the engine for the rest of the
    /// process lifetime.
    pub fn install_constraint(mut self, constraint: Constraint) -> Result<ConstrainedDriver<E, O>, Error> {
        constraint.validate()?;
        if self.engine.constraint().is_some() {
            return Err(ConstraintError::Rejected("engine already carries a constraint".into()).into());
        }
        self.engine.install_constraint(&constraint)?;
        info!(
            temperature = constraint.temperature.target,
            coupled_axes = constraint.coupled_axes(),
            "constraint installed"
        );
        Ok(ConstrainedDriver {
            engine: self.engine,
            sinks: self.sinks,
        })
    }
}

pub struct ConstrainedDriver<E, O> {
    engine: E,
    sinks: O,
}

impl<E: Engine, O: SinkFactory> ConstrainedDriver<E, O> {
    pub fn state(&self) -> DriverState {
        DriverState::ConstraintInstalled
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Starts the run. Nothing happens until the returned iterator is polled.
    ///
    /// `naming` maps a segment index to its artifact name and must give a
    /// distinct name per index.
    pub fn run_segments<F>(self, plan: SegmentPlan, naming: F) -> Segments<E, O, F>
    where
        F: Fn(u64) -> String,
    {
        if plan.frames_per_segment() == 0 {
            warn!(
                steps = plan.steps_per_segment(),
                dump_every = plan.dump_every(),
                "dump cadence exceeds segment length; artifacts will hold no frames"
            );
        }
        Segments {
            engine: self.engine,
            sinks: self.sinks,
            plan,
            naming,
            next: 1,
            state: DriverState::Running,
        }
    }
}

/// The running stage. Yields one record per completed segment, in order,
/// and nothing after the last segment or after the first error.
pub struct Segments<E, O, F> {
    engine: E,
    sinks: O,
    plan: SegmentPlan,
    naming: F,
    next: u64,
    state: DriverState,
}

impl<E, O, F> Segments<E, O, F>
where
    E: Engine,
    O: SinkFactory,
    F: Fn(u64) -> String,
{
    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn sinks(&self) -> &O {
        &self.sinks
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    fn run_segment(&mut self, segment: u64) -> Result<ProgressRecord, Error> {
        let artifact = (self.naming)(segment);
        let mut sink = self.sinks.open(&artifact, self.plan.dump_every())?;
        debug!(segment, artifact = %artifact, "segment sink opened");

        let advanced = self.engine.advance(self.plan.steps_per_segment(), &mut sink);
        // released before any error from the advance is looked at
        let closed = sink.close();
        debug!(segment, artifact = %artifact, "segment sink closed");

        let report = advanced.map_err(|e| Error::from_advance(segment, e))?;
        closed?;

        for warning in &report.warnings {
            warn!(segment, "{}", warning);
        }

        Ok(ProgressRecord {
            segment,
            artifact,
            frames: report.frames,
        })
    }
}

impl<E, O, F> Iterator for Segments<E, O, F>
where
    E: Engine,
    O: SinkFactory,
    F: Fn(u64) -> String,
{
    type Item = Result<ProgressRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != DriverState::Running {
            return None;
        }
        let segment = self.next;
        match self.run_segment(segment) {
            Ok(record) => {
                info!(
                    segment,
                    artifact = %record.artifact,
                    frames = record.frames,
                    total_steps = self.engine.total_steps(),
                    "segment completed"
                );
                self.next += 1;
                if segment == self.plan.segments() {
                    self.state = DriverState::Completed;
                }
                Some(Ok(record))
            }
            Err(err) => {
                self.state = DriverState::Stopped;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.state != DriverState::Running {
            return (0, Some(0));
        }
        let remaining = (self.plan.segments() + 1 - self.next) as usize;
        (0, Some(remaining))
    }
}

impl<E, O, F> std::iter::FusedIterator for Segments<E, O, F>
where
    E: Engine,
    O: SinkFactory,
    F: Fn(u64) -> String,
{
}
