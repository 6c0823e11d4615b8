//! Segmented, constraint-driven simulation runs.
//!
//! A [`Driver`] loads an initial configuration into an [`Engine`], installs
//! one persistent [`Constraint`] and then advances the engine in fixed-size
//! segments, each with its own trajectory dump. [`SoftSphereEngine`] is the
//! built-in engine; anything implementing [`Engine`] can be driven the same
//! way.

pub mod config;
pub mod constraint;
pub mod data;
pub mod driver;
pub mod engine;
pub mod error;
pub mod interaction;
pub mod segment;
pub mod simulation;
pub mod sink;
pub mod thermo;

#[cfg(test)]
mod test_utils;

pub use config::RunConfig;
pub use constraint::{AxisTargets, Constraint, ConstraintError, Setpoint};
pub use data::{DataError, InitialConfig};
pub use driver::{ConstrainedDriver, Driver, DriverState, InitializedDriver, Segments};
pub use engine::{AdvanceReport, Engine, EngineError, EngineWarning};
pub use error::Error;
pub use interaction::{InteractionModel, PairCoeff};
pub use segment::{DumpNaming, ProgressRecord, SegmentPlan};
pub use simulation::{EngineSettings, SoftSphereEngine};
pub use sink::{DumpDirectory, DumpFile, Frame, FrameSink, SinkError, SinkFactory};
