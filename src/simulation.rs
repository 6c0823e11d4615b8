//! Reference engine: Hertzian soft spheres in a periodic orthorhombic box.
//!
//! Velocity Verlet integration with a Berendsen-style thermostat and an
//! independent Berendsen-style barostat per coupled axis. Reduced units
//! throughout (k_B = 1). Pair forces use a plain O(N^2) minimum-image loop,
//! which is fine for the system sizes this engine is meant for.

use rand::prelude::*;
use rand_distr::StandardNormal;
use rand_pcg::Pcg64;
use std::path::Path;
use tracing::{debug, info};

use crate::constraint::{Axis, Constraint, ConstraintError, Setpoint};
use crate::data::InitialConfig;
use crate::engine::{frame_due, AdvanceReport, Engine, EngineError, EngineWarning};
use crate::interaction::{Interaction, InteractionModel, PairTable};
use crate::sink::{Frame, FrameSink};
use crate::thermo::{ThermoLog, ThermoRow};

// per-step limits on how far the couplings may rescale
const MAX_VELOCITY_SCALE: f64 = 1.25;
const MAX_BOX_STRAIN: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub dt: f64,
    /// Steps between thermo rows; 0 disables them.
    pub thermo_every: u64,
    pub seed: u64,
    /// Temperature used to draw velocities when the data file has none.
    pub initial_temperature: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            dt: 1e-3,
            thermo_every: 1000,
            seed: 0,
            initial_temperature: None,
        }
    }
}

/// Particle state, box and resolved interactions.
#[derive(Debug, Clone)]
pub struct System {
    pub ids: Vec<u64>,
    pub types: Vec<usize>,
    pub mass: Vec<f64>,
    pub x: Vec<[f64; 3]>,
    pub v: Vec<[f64; 3]>,
    pub f: Vec<[f64; 3]>,
    /// Lower box corner.
    pub lo: [f64; 3],
    /// Box lengths.
    pub b: [f64; 3],
    /// Half box lengths.
    pub bh: [f64; 3],
    pub potential: f64,
    /// Diagonal of the pair virial.
    pub virial: [f64; 3],
    pairs: PairTable,
}

impl System {
    pub fn new(config: InitialConfig, pairs: PairTable) -> Result<System, EngineError> {
        let n = config.atoms.len();
        if let Some(velocities) = &config.velocities {
            if velocities.len() != n {
                return Err(EngineError::invalid(format!(
                    "{} velocities given for {} atoms",
                    velocities.len(),
                    n
                )));
            }
        }
        if let Some(mass) = config.masses.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
            return Err(EngineError::invalid(format!("mass must be positive, got {}", mass)));
        }
        if let Some(atom) = config.atoms.iter().find(|a| a.kind == 0 || a.kind > config.masses.len()) {
            return Err(EngineError::invalid(format!(
                "atom {} has type {} outside 1..={}",
                atom.id,
                atom.kind,
                config.masses.len()
            )));
        }
        let b = config.lengths();
        let lo = [config.bounds[0][0], config.bounds[1][0], config.bounds[2][0]];

        let mut sys = System {
            ids: Vec::with_capacity(n),
            types: Vec::with_capacity(n),
            mass: Vec::with_capacity(n),
            x: Vec::with_capacity(n),
            v: config.velocities.clone().unwrap_or_else(|| vec![[0.0; 3]; n]),
            f: vec![[0.0; 3]; n],
            lo,
            b,
            bh: [0.5 * b[0], 0.5 * b[1], 0.5 * b[2]],
            potential: 0.0,
            virial: [0.0; 3],
            pairs,
        };
        for atom in config.atoms {
            sys.ids.push(atom.id);
            sys.types.push(atom.kind);
            sys.mass.push(config.masses[atom.kind - 1]);
            sys.x.push(atom.position);
        }

        sys.settle().map_err(EngineError::invalid)?;
        sys.compute_forces();
        Ok(sys)
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn volume(&self) -> f64 {
        self.b[0] * self.b[1] * self.b[2]
    }

    pub fn bounds(&self) -> [[f64; 2]; 3] {
        let mut bounds = [[0.0; 2]; 3];
        for k in 0..3 {
            bounds[k] = [self.lo[k], self.lo[k] + self.b[k]];
        }
        bounds
    }

    pub fn frame(&self, timestep: u64) -> Frame<'_> {
        Frame {
            timestep,
            bounds: self.bounds(),
            ids: &self.ids,
            types: &self.types,
            positions: &self.x,
        }
    }

    // minimum image requires every length to cover two cutoffs
    fn check_box(&self) -> Result<(), String> {
        let cutoff = self.pairs.max_cutoff();
        for (k, length) in self.b.iter().enumerate() {
            if *length < 2.0 * cutoff {
                return Err(format!(
                    "{} box length {} is shorter than twice the interaction cutoff {}",
                    Axis::ALL[k],
                    length,
                    cutoff
                ));
            }
        }
        Ok(())
    }

    fn pbc_vdr_vec(&self, i: usize, j: usize) -> [f64; 3] {
        let mut dr: [f64; 3] = [0.0, 0.0, 0.0];
        let x1 = self.x[i];
        let x2 = self.x[j];

        for k in 0..3 {
            dr[k] = x1[k] - x2[k];
            dr[k] -= self.b[k] * (dr[k] / self.b[k]).round();
        }
        dr
    }

    // periodic remap into [lo, lo + b); more than one image away means the
    // integration has run off
    fn wrap(&mut self) -> Result<(), String> {
        for i in 0..self.x.len() {
            for (k, axis) in Axis::ALL.iter().enumerate() {
                let (lo, b) = (self.lo[k], self.b[k]);
                let offset = self.x[i][k] - lo;
                if !(offset >= -b && offset < 2.0 * b) {
                    return Err(format!(
                        "atom {} is more than one box length outside the box along {} ({})",
                        self.ids[i], axis, self.x[i][k]
                    ));
                }
                let x = lo + offset.rem_euclid(b);
                self.x[i][k] = if x >= lo + b { lo } else { x };
            }
        }
        Ok(())
    }

    /// Positions and velocities finite, every atom wrapped, box still wide
    /// enough for minimum image.
    fn settle(&mut self) -> Result<(), String> {
        self.check_finite()?;
        self.wrap()?;
        self.check_box()
    }

    /// Recomputes forces, potential energy and the virial diagonal.
    pub fn compute_forces(&mut self) {
        let num = self.x.len();
        for f in self.f.iter_mut() {
            *f = [0.0; 3];
        }
        self.potential = 0.0;
        self.virial = [0.0; 3];

        for i in 0..num {
            for j in (i + 1)..num {
                let pair = *self.pairs.get(self.types[i], self.types[j]);
                let dr = self.pbc_vdr_vec(i, j);
                let norm = (dr[0] * dr[0] + dr[1] * dr[1] + dr[2] * dr[2]).sqrt();
                if norm >= pair.cutoff() || norm == 0.0 {
                    continue;
                }
                let mag = pair.force(norm);
                self.potential += pair.potential(norm);
                for k in 0..3 {
                    let comp = mag * dr[k] / norm;
                    self.f[i][k] += comp;
                    self.f[j][k] -= comp;
                    self.virial[k] += comp * dr[k];
                }
            }
        }
    }

    pub fn kinetic(&self) -> f64 {
        let mut twice = 0.0;
        for i in 0..self.v.len() {
            let v = self.v[i];
            twice += self.mass[i] * (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]);
        }
        0.5 * twice
    }

    fn degrees_of_freedom(&self) -> f64 {
        let n = self.len();
        if n > 1 {
            (3 * n - 3) as f64
        } else {
            3.0
        }
    }

    pub fn temperature(&self) -> f64 {
        2.0 * self.kinetic() / self.degrees_of_freedom()
    }

    /// Diagonal of the pressure tensor.
    pub fn pressure(&self) -> [f64; 3] {
        let volume = self.volume();
        let mut p = self.virial;
        for i in 0..self.v.len() {
            for k in 0..3 {
                p[k] += self.mass[i] * self.v[i][k] * self.v[i][k];
            }
        }
        for value in p.iter_mut() {
            *value /= volume;
        }
        p
    }

    /// Draws Maxwell-Boltzmann velocities at `temperature` with zero net
    /// momentum.
    pub fn create_velocities(&mut self, temperature: f64, rng: &mut Pcg64) {
        let mut momentum = [0.0; 3];
        let mut total_mass = 0.0;
        for i in 0..self.v.len() {
            let scale = (temperature / self.mass[i]).sqrt();
            for k in 0..3 {
                let w: f64 = rng.sample(StandardNormal);
                self.v[i][k] = scale * w;
                momentum[k] += self.mass[i] * self.v[i][k];
            }
            total_mass += self.mass[i];
        }
        if total_mass > 0.0 {
            for v in self.v.iter_mut() {
                for k in 0..3 {
                    v[k] -= momentum[k] / total_mass;
                }
            }
        }
        let current = self.temperature();
        if current > 0.0 {
            let lambda = (temperature / current).sqrt();
            for v in self.v.iter_mut() {
                for k in 0..3 {
                    v[k] *= lambda;
                }
            }
        }
    }

    fn kick(&mut self, dt: f64) {
        for i in 0..self.v.len() {
            let inv_m = 1.0 / self.mass[i];
            for k in 0..3 {
                self.v[i][k] += 0.5 * dt * self.f[i][k] * inv_m;
            }
        }
    }

    fn drift(&mut self, dt: f64) {
        for i in 0..self.x.len() {
            for k in 0..3 {
                self.x[i][k] += dt * self.v[i][k];
            }
        }
    }

    fn rescale_velocities(&mut self, setpoint: &Setpoint, dt: f64) {
        let current = self.temperature();
        if current <= 0.0 {
            return;
        }
        let lambda = (1.0 + dt / setpoint.damping * (setpoint.target / current - 1.0))
            .max(0.0)
            .sqrt()
            .min(MAX_VELOCITY_SCALE)
            .max(1.0 / MAX_VELOCITY_SCALE);
        for v in self.v.iter_mut() {
            for k in 0..3 {
                v[k] *= lambda;
            }
        }
    }

    fn rescale_box(&mut self, constraint: &Constraint, pressure: [f64; 3], dt: f64) {
        for (k, target) in constraint.pressure.by_axis().iter().enumerate() {
            let setpoint = match target {
                Some(setpoint) => setpoint,
                None => continue,
            };
            let mu = (1.0
                - constraint.compressibility * dt / setpoint.damping * (setpoint.target - pressure[k]))
                .max(1.0 - MAX_BOX_STRAIN)
                .min(1.0 + MAX_BOX_STRAIN);
            for x in self.x.iter_mut() {
                x[k] = self.lo[k] + (x[k] - self.lo[k]) * mu;
            }
            self.b[k] *= mu;
            self.bh[k] = 0.5 * self.b[k];
        }
    }

    fn check_finite(&self) -> Result<(), String> {
        for i in 0..self.x.len() {
            let finite = self.x[i].iter().chain(self.v[i].iter()).all(|c| c.is_finite());
            if !finite {
                return Err(format!("atom {} has a non-finite position or velocity", self.ids[i]));
            }
        }
        Ok(())
    }

    pub fn thermo_row(&self, step: u64) -> ThermoRow {
        ThermoRow {
            step,
            temperature: self.temperature(),
            potential: self.potential,
            kinetic: self.kinetic(),
            pressure: self.pressure(),
            volume: self.volume(),
        }
    }
}

/// Built-in [`Engine`] loading LAMMPS-style data files.
#[derive(Debug)]
pub struct SoftSphereEngine {
    settings: EngineSettings,
    interaction: InteractionModel,
    system: Option<System>,
    constraint: Option<Constraint>,
    rng: Pcg64,
    thermo: ThermoLog,
    total_steps: u64,
}

impl SoftSphereEngine {
    pub fn new(settings: EngineSettings, interaction: InteractionModel) -> SoftSphereEngine {
        let rng = Pcg64::seed_from_u64(settings.seed);
        SoftSphereEngine {
            settings,
            interaction,
            system: None,
            constraint: None,
            rng,
            thermo: ThermoLog::default(),
            total_steps: 0,
        }
    }

    pub fn system(&self) -> Option<&System> {
        self.system.as_ref()
    }

    pub fn thermo_rows(&self) -> u64 {
        self.thermo.rows()
    }

    /// Builds the state from an already parsed configuration.
    pub fn load(&mut self, config: InitialConfig) -> Result<(), EngineError> {
        if self.system.is_some() {
            return Err(EngineError::invalid("simulation state already initialized"));
        }
        if !(self.settings.dt.is_finite() && self.settings.dt > 0.0) {
            return Err(EngineError::invalid(format!("timestep must be positive, got {}", self.settings.dt)));
        }
        let pairs = PairTable::resolve(&self.interaction, config.type_count())?;
        let has_velocities = config.velocities.is_some();
        let mut system = System::new(config, pairs)?;

        if !has_velocities {
            if let Some(temperature) = self.settings.initial_temperature {
                system.create_velocities(temperature, &mut self.rng);
            }
        }

        info!(
            atoms = system.len(),
            volume = system.volume(),
            temperature = system.temperature(),
            "loaded initial configuration"
        );
        self.system = Some(system);
        Ok(())
    }

    fn out_of_band(&self, row: &ThermoRow) -> Vec<EngineWarning> {
        let mut warnings = Vec::new();
        let constraint = match &self.constraint {
            Some(constraint) => constraint,
            None => return warnings,
        };
        let t = &constraint.temperature;
        if !t.contains(row.temperature) {
            warnings.push(EngineWarning::TemperatureOutOfBand {
                step: row.step,
                value: row.temperature,
                lower: t.lower,
                upper: t.upper,
            });
        }
        for (k, target) in constraint.pressure.by_axis().iter().enumerate() {
            if let Some(setpoint) = target {
                if !setpoint.contains(row.pressure[k]) {
                    warnings.push(EngineWarning::PressureOutOfBand {
                        step: row.step,
                        axis: Axis::ALL[k],
                        value: row.pressure[k],
                        lower: setpoint.lower,
                        upper: setpoint.upper,
                    });
                }
            }
        }
        warnings
    }

    fn thermo_due(&self) -> bool {
        self.settings.thermo_every > 0 && self.total_steps % self.settings.thermo_every == 0
    }
}

impl Engine for SoftSphereEngine {
    type Source = Path;

    fn initialize(&mut self, source: &Path) -> Result<(), EngineError> {
        let config = InitialConfig::read(source)?;
        self.load(config)
    }

    fn install_constraint(&mut self, constraint: &Constraint) -> Result<(), ConstraintError> {
        if self.system.is_none() {
            return Err(ConstraintError::Rejected("no simulation state loaded".into()));
        }
        if self.constraint.is_some() {
            return Err(ConstraintError::Rejected("a constraint is already installed".into()));
        }
        self.constraint = Some(constraint.clone());
        Ok(())
    }

    fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    fn advance(&mut self, steps: u64, sink: &mut dyn FrameSink) -> Result<AdvanceReport, EngineError> {
        let dt = self.settings.dt;
        let mut report = AdvanceReport::default();

        if self.system.is_none() {
            return Err(EngineError::invalid("advance before initialization"));
        }
        if self.total_steps == 0 && self.thermo_due() {
            if let Some(system) = &self.system {
                let row = system.thermo_row(0);
                self.thermo.emit(&row);
            }
        }

        let cadence = sink.cadence();
        for step in 1..=steps {
            let system = match self.system.as_mut() {
                Some(system) => system,
                None => return Err(EngineError::invalid("advance before initialization")),
            };
            let pressure = system.pressure();

            system.kick(dt);
            system.drift(dt);
            if let Some(constraint) = &self.constraint {
                system.rescale_box(constraint, pressure, dt);
            }
            self.total_steps += 1;
            let total = self.total_steps;
            system
                .settle()
                .map_err(|detail| EngineError::unstable(total, detail))?;

            system.compute_forces();
            system.kick(dt);
            if let Some(constraint) = &self.constraint {
                system.rescale_velocities(&constraint.temperature, dt);
            }
            system
                .check_finite()
                .map_err(|detail| EngineError::unstable(total, detail))?;

            if frame_due(step, cadence) {
                sink.write_frame(&system.frame(total))?;
                report.frames += 1;
            }

            let thermo_every = self.settings.thermo_every;
            let row = if thermo_every > 0 && total % thermo_every == 0 {
                Some(system.thermo_row(total))
            } else {
                None
            };
            report.steps += 1;

            if let Some(row) = row {
                self.thermo.emit(&row);
                let warnings = self.out_of_band(&row);
                report.warnings.extend(warnings);
            }
        }

        debug!(steps = report.steps, frames = report.frames, total = self.total_steps, "advance finished");
        Ok(report)
    }

    fn total_steps(&self) -> u64 {
        self.total_steps
    }
}
