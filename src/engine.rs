//! The seam between the driver and whatever integrates the equations of
//! motion.
//!
//! The driver only ever loads a state, installs a constraint once and asks
//! for whole segments of steps. How the engine stores particles, computes
//! forces or couples to the thermostat is its own business.

use std::fmt;
use thiserror::Error;

use crate::constraint::{Axis, Constraint, ConstraintError};
use crate::data::DataError;
use crate::sink::{FrameSink, SinkError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    /// The inputs were readable but cannot form a valid state.
    #[error("{0}")]
    Invalid(String),

    /// Integration blew up; the run cannot continue.
    #[error("integration became unstable at step {step}: {detail}")]
    Unstable { step: u64, detail: String },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl EngineError {
    pub fn invalid(details: impl Into<String>) -> Self {
        Self::Invalid(details.into())
    }

    pub fn unstable(step: u64, details: impl Into<String>) -> Self {
        Self::Unstable {
            step,
            detail: details.into(),
        }
    }
}

/// Non-fatal conditions observed during an advance.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineWarning {
    TemperatureOutOfBand {
        step: u64,
        value: f64,
        lower: f64,
        upper: f64,
    },
    PressureOutOfBand {
        step: u64,
        axis: Axis,
        value: f64,
        lower: f64,
        upper: f64,
    },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineWarning::TemperatureOutOfBand {
                step,
                value,
                lower,
                upper,
            } => write!(
                f,
                "step {}: temperature {:.4} outside [{}, {}]",
                step, value, lower, upper
            ),
            EngineWarning::PressureOutOfBand {
                step,
                axis,
                value,
                lower,
                upper,
            } => write!(
                f,
                "step {}: {} pressure {:.4} outside [{}, {}]",
                step, axis, value, lower, upper
            ),
        }
    }
}

/// What one `advance` call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub steps: u64,
    pub frames: u64,
    pub warnings: Vec<EngineWarning>,
}

pub trait Engine {
    /// Whatever the engine loads its initial state from.
    type Source: ?Sized;

    fn initialize(&mut self, source: &Self::Source) -> Result<(), EngineError>;

    /// Called exactly once, with an already validated constraint.
    fn install_constraint(&mut self, constraint: &Constraint) -> Result<(), ConstraintError>;

    /// The constraint currently acting on the state, if any.
    fn constraint(&self) -> Option<&Constraint>;

    /// Advances exactly `steps` integration steps, writing a frame to `sink`
    /// after every `sink.cadence()` steps counted from the start of this call.
    fn advance(&mut self, steps: u64, sink: &mut dyn FrameSink) -> Result<AdvanceReport, EngineError>;

    /// Steps executed since initialization.
    fn total_steps(&self) -> u64;
}

/// Whether local step `step` (1-based within one advance) gets a frame.
///
/// A trailing window shorter than the cadence produces nothing.
pub fn frame_due(step: u64, cadence: u64) -> bool {
    cadence > 0 && step % cadence == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_trailing_window_has_no_frame() {
        let due: Vec<u64> = (1..=25).filter(|s| frame_due(*s, 10)).collect();
        assert_eq!(due, vec![10, 20]);
    }

    #[test]
    fn zero_cadence_never_writes() {
        assert!(!(1..100).any(|s| frame_due(s, 0)));
    }

    #[test]
    fn warnings_render_axis_and_band() {
        let warning = EngineWarning::PressureOutOfBand {
            step: 2000,
            axis: Axis::X,
            value: 2.5,
            lower: 0.5,
            upper: 1.5,
        };
        assert_eq!(
            warning.to_string(),
            "step 2000: x pressure 2.5000 outside [0.5, 1.5]"
        );
    }
}
