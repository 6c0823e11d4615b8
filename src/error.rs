//! Crate-level error taxonomy.
//!
//! Every variant is fatal for the run. Module-level errors (data file
//! parsing, constraint validation, engine and sink failures) are wrapped
//! here according to the phase in which they occurred.

use thiserror::Error;

use crate::constraint::ConstraintError;
use crate::engine::EngineError;
use crate::sink::SinkError;

/// Errors surfaced by the driver and the binary.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine could not build a simulation state from the initial
    /// configuration source.
    #[error("failed to initialize simulation state: {0}")]
    Initialization(#[source] EngineError),

    /// The persistent constraint is inconsistent or was rejected by the engine.
    #[error("invalid constraint: {0}")]
    ConstraintConfig(#[from] ConstraintError),

    /// The engine failed while advancing a segment.
    #[error("engine failed during segment {segment}: {source}")]
    EngineAdvance {
        /// Index of the segment whose advance failed.
        segment: u64,
        /// Underlying engine failure.
        #[source]
        source: EngineError,
    },

    /// A segment artifact could not be created, written or flushed.
    #[error(transparent)]
    OutputSink(#[from] SinkError),

    /// Bad command line, configuration file or segment plan.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config(details.into())
    }

    /// Classifies a failure reported by `Engine::advance` for `segment`.
    ///
    /// Sink failures keep their own variant so callers can tell storage
    /// problems from numerical ones.
    pub fn from_advance(segment: u64, source: EngineError) -> Self {
        match source {
            EngineError::Sink(sink) => Self::OutputSink(sink),
            other => Self::EngineAdvance {
                segment,
                source: other,
            },
        }
    }
}
