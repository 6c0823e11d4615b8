use clap::{App, Arg, ArgMatches};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::constraint::{Constraint, Setpoint};
use crate::error::Error;
use crate::interaction::InteractionModel;
use crate::segment::{DumpNaming, SegmentPlan};
use crate::simulation::EngineSettings;

/// Everything one run needs. Loaded from an optional TOML file, then
/// overridden by whatever flags were given on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Initial configuration (LAMMPS-style data file).
    pub data: PathBuf,
    pub segments: u64,
    pub steps_per_segment: u64,
    pub dump_every: u64,
    pub thermo_every: u64,
    pub dump_dir: PathBuf,
    pub dt: f64,
    pub seed: u64,
    /// Draw initial velocities at the target temperature when the data file
    /// has no `Velocities` section.
    pub create_velocities: bool,
    // tables after plain values, as TOML requires
    pub naming: DumpNaming,
    pub constraint: Constraint,
    pub interaction: InteractionModel,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            data: PathBuf::from("final_lammps.data"),
            segments: 10,
            steps_per_segment: 100_000,
            dump_every: 10_000,
            thermo_every: 1_000,
            dump_dir: PathBuf::from("."),
            dt: 1e-3,
            seed: 0,
            create_velocities: true,
            naming: DumpNaming::default(),
            constraint: Constraint::default(),
            interaction: InteractionModel::default(),
        }
    }
}

impl RunConfig {
    // initialize configuration from command line arguments
    pub fn new() -> Result<RunConfig, Error> {
        let matches = RunConfig::app().get_matches();
        RunConfig::from_matches(&matches)
    }

    pub fn from_args<I, T>(args: I) -> Result<RunConfig, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = RunConfig::app()
            .get_matches_from_safe(args)
            .map_err(|e| Error::config(e.message))?;
        RunConfig::from_matches(&matches)
    }

    fn app() -> App<'static, 'static> {
        App::new("md-drive")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Runs a constrained simulation in fixed-length segments, writing one trajectory dump per segment.")
            .arg(Arg::with_name("CONFIG")
                .short("c")
                .long("config")
                .help("TOML run configuration; created with defaults if missing")
                .takes_value(true))
            .arg(Arg::with_name("DATA")
                .short("i")
                .long("data")
                .help("Initial configuration data file")
                .takes_value(true))
            .arg(Arg::with_name("SEGMENTS")
                .short("n")
                .long("segments")
                .help("Number of segments to run")
                .takes_value(true))
            .arg(Arg::with_name("STEPS")
                .short("s")
                .long("steps")
                .help("Integration steps per segment")
                .takes_value(true))
            .arg(Arg::with_name("DUMP")
                .short("o")
                .long("dump-every")
                .help("Number of steps between dump frames")
                .takes_value(true))
            .arg(Arg::with_name("THERMO")
                .long("thermo-every")
                .help("Number of steps between thermo rows (0 disables)")
                .takes_value(true))
            .arg(Arg::with_name("DIR")
                .short("d")
                .long("dump-dir")
                .help("Directory receiving the dump files")
                .takes_value(true))
            .arg(Arg::with_name("PREFIX")
                .long("prefix")
                .help("Dump file name prefix")
                .takes_value(true))
            .arg(Arg::with_name("SUFFIX")
                .long("suffix")
                .help("Dump file name suffix")
                .takes_value(true))
            .arg(Arg::with_name("DT")
                .long("dt")
                .help("Size of the system timestep")
                .takes_value(true))
            .arg(Arg::with_name("SEED")
                .long("seed")
                .help("Random seed for initial velocities")
                .takes_value(true))
            .arg(Arg::with_name("TEMP")
                .short("t")
                .long("temp")
                .help("Target temperature; keeps the configured band width")
                .takes_value(true))
            .arg(Arg::with_name("PRESS_X")
                .long("press-x")
                .help("Target x pressure; keeps the configured band width")
                .takes_value(true))
            .arg(Arg::with_name("PRESS_Y")
                .long("press-y")
                .help("Target y pressure; keeps the configured band width")
                .takes_value(true))
            .arg(Arg::with_name("PRESS_Z")
                .long("press-z")
                .help("Target z pressure; keeps the configured band width")
                .takes_value(true))
    }

    fn from_matches(matches: &ArgMatches) -> Result<RunConfig, Error> {
        let mut config = match matches.value_of("CONFIG") {
            Some(path) => confy::load_path::<RunConfig>(path)
                .map_err(|e| Error::config(format!("cannot load {}: {}", path, e)))?,
            None => RunConfig::default(),
        };

        if let Some(data) = matches.value_of("DATA") {
            config.data = PathBuf::from(data);
        }
        if let Some(dir) = matches.value_of("DIR") {
            config.dump_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = matches.value_of("PREFIX") {
            config.naming.prefix = prefix.to_string();
        }
        if let Some(suffix) = matches.value_of("SUFFIX") {
            config.naming.suffix = suffix.to_string();
        }
        override_with(matches, "SEGMENTS", &mut config.segments)?;
        override_with(matches, "STEPS", &mut config.steps_per_segment)?;
        override_with(matches, "DUMP", &mut config.dump_every)?;
        override_with(matches, "THERMO", &mut config.thermo_every)?;
        override_with(matches, "DT", &mut config.dt)?;
        override_with(matches, "SEED", &mut config.seed)?;

        if let Some(target) = conv_match::<f64>(matches, "TEMP")? {
            config.constraint.temperature = retarget(config.constraint.temperature, target);
        }
        let axes = [
            ("PRESS_X", &mut config.constraint.pressure.x),
            ("PRESS_Y", &mut config.constraint.pressure.y),
            ("PRESS_Z", &mut config.constraint.pressure.z),
        ];
        for (tag, axis) in axes {
            if let Some(target) = conv_match::<f64>(matches, tag)? {
                let current = axis.unwrap_or_else(|| Setpoint::around(0.0, 0.5, 1.0));
                *axis = Some(retarget(current, target));
            }
        }

        Ok(config)
    }

    pub fn plan(&self) -> Result<SegmentPlan, Error> {
        SegmentPlan::new(self.segments, self.steps_per_segment, self.dump_every)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            dt: self.dt,
            thermo_every: self.thermo_every,
            seed: self.seed,
            initial_temperature: if self.create_velocities {
                Some(self.constraint.temperature.target)
            } else {
                None
            },
        }
    }

    // one-line run description for the startup log
    pub fn format_run_summary(&self) -> String {
        format!(
            "n{}_steps{}_dump{}_dt{}_seed{}",
            self.segments, self.steps_per_segment, self.dump_every, self.dt, self.seed
        )
    }
}

/// Moves `setpoint` to `target`, keeping its band width around the new target.
fn retarget(setpoint: Setpoint, target: f64) -> Setpoint {
    Setpoint::new(
        target,
        target - (setpoint.target - setpoint.lower),
        target + (setpoint.upper - setpoint.target),
        setpoint.damping,
    )
}

fn override_with<T>(matches: &ArgMatches, tag: &str, field: &mut T) -> Result<(), Error>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    if let Some(value) = conv_match::<T>(matches, tag)? {
        *field = value;
    }
    Ok(())
}

// convert matches to corresponding generic types
fn conv_match<T>(matches: &ArgMatches, tag: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    match matches.value_of(tag) {
        Some(raw) => {
            let cleaned = raw.replace('_', "");
            T::from_str(&cleaned)
                .map(Some)
                .map_err(|e| Error::config(format!("invalid value '{}' for {}: {}", raw, tag, e)))
        }
        None => Ok(None),
    }
}
