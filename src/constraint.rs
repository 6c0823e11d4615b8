//! The standing temperature and pressure directive applied for a whole run.
//!
//! A [`Constraint`] is validated once, handed to the engine once, and never
//! touched again by the driver. Axes without a pressure target are left
//! uncoupled, so uniaxial, biaxial and hydrostatic loading are all just
//! different combinations of per-axis setpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A controlled quantity: target value, tolerance band and coupling time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoint {
    pub target: f64,
    pub lower: f64,
    pub upper: f64,
    /// Relaxation time constant of the coupling, in simulation time units.
    pub damping: f64,
}

impl Setpoint {
    pub fn new(target: f64, lower: f64, upper: f64, damping: f64) -> Self {
        Setpoint {
            target,
            lower,
            upper,
            damping,
        }
    }

    /// Setpoint with a symmetric tolerance band around `target`.
    pub fn around(target: f64, tolerance: f64, damping: f64) -> Self {
        Setpoint::new(target, target - tolerance, target + tolerance, damping)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    fn validate(&self, quantity: Quantity) -> Result<(), ConstraintError> {
        let fields = [
            ("target", self.target),
            ("lower", self.lower),
            ("upper", self.upper),
            ("damping", self.damping),
        ];
        for (field, value) in fields.iter() {
            if !value.is_finite() {
                return Err(ConstraintError::NonFinite {
                    quantity,
                    field: *field,
                    value: *value,
                });
            }
        }
        if self.lower > self.upper {
            return Err(ConstraintError::InvertedBand {
                quantity,
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.target < self.lower || self.target > self.upper {
            return Err(ConstraintError::TargetOutsideBand {
                quantity,
                target: self.target,
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.damping <= 0.0 {
            return Err(ConstraintError::NonPositiveDamping {
                quantity,
                damping: self.damping,
            });
        }
        Ok(())
    }
}

/// Per-axis pressure targets. `None` leaves that box length untouched.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisTargets {
    #[serde(default)]
    pub x: Option<Setpoint>,
    #[serde(default)]
    pub y: Option<Setpoint>,
    #[serde(default)]
    pub z: Option<Setpoint>,
}

impl AxisTargets {
    /// Targets indexed by axis (0 = x, 1 = y, 2 = z).
    pub fn by_axis(&self) -> [Option<Setpoint>; 3] {
        [self.x, self.y, self.z]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraint {
    /// Scales how strongly a pressure mismatch rescales the box.
    pub compressibility: f64,
    pub temperature: Setpoint,
    pub pressure: AxisTargets,
}

impl Default for Constraint {
    fn default() -> Self {
        Constraint {
            compressibility: 0.01,
            temperature: Setpoint::new(0.5, 0.4, 0.6, 0.1),
            pressure: AxisTargets {
                x: Some(Setpoint::new(1.0, 0.5, 1.5, 1.0)),
                y: None,
                z: None,
            },
        }
    }
}

impl Constraint {
    /// Checks every range before the constraint is allowed near an engine.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        self.temperature.validate(Quantity::Temperature)?;
        if self.temperature.lower < 0.0 {
            return Err(ConstraintError::NegativeTemperature(self.temperature.lower));
        }
        for (axis, target) in Axis::ALL.iter().zip(self.pressure.by_axis().iter()) {
            if let Some(setpoint) = target {
                setpoint.validate(Quantity::Pressure(*axis))?;
            }
        }
        if !self.compressibility.is_finite() || self.compressibility < 0.0 {
            return Err(ConstraintError::Compressibility(self.compressibility));
        }
        Ok(())
    }

    pub fn coupled_axes(&self) -> usize {
        self.pressure.by_axis().iter().filter(|t| t.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// In index order, matching `[x, y, z]` arrays.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Pressure(Axis),
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Temperature => write!(f, "temperature"),
            Quantity::Pressure(axis) => write!(f, "{} pressure", axis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstraintError {
    #[error("{quantity} {field} is not finite ({value})")]
    NonFinite {
        quantity: Quantity,
        field: &'static str,
        value: f64,
    },

    #[error("{quantity} band is inverted: lower {lower} exceeds upper {upper}")]
    InvertedBand {
        quantity: Quantity,
        lower: f64,
        upper: f64,
    },

    #[error("{quantity} target {target} lies outside its band [{lower}, {upper}]")]
    TargetOutsideBand {
        quantity: Quantity,
        target: f64,
        lower: f64,
        upper: f64,
    },

    #[error("{quantity} damping must be positive, got {damping}")]
    NonPositiveDamping { quantity: Quantity, damping: f64 },

    #[error("temperature band cannot go below zero (lower = {0})")]
    NegativeTemperature(f64),

    #[error("compressibility must be finite and non-negative, got {0}")]
    Compressibility(f64),

    /// The constraint is well formed but the engine refused it.
    #[error("engine rejected constraint: {0}")]
    Rejected(String),
}
