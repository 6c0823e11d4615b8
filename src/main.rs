use std::env::var;
use std::process::ExitCode;

use md_drive::{DumpDirectory, Driver, Error, RunConfig, SoftSphereEngine};
use tracing::{error, info};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{registry, EnvFilter};

fn main() -> ExitCode {
    if let Err(e) = setup() {
        eprintln!("failed to set up logging: {}", e);
        return ExitCode::FAILURE;
    }

    // parse command line options
    let config = match RunConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup() -> Result<(), tracing_subscriber::filter::ParseError> {
    let directives = match var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => "md_drive=info".to_owned(),
    };

    registry()
        .with(EnvFilter::builder().parse(directives)?)
        .with(layer())
        .init();

    Ok(())
}

fn run(config: &RunConfig) -> Result<(), Error> {
    let plan = config.plan()?;
    info!(run = %config.format_run_summary(), data = %config.data.display(), "starting run");

    // initialize the simulation
    let engine = SoftSphereEngine::new(config.engine_settings(), config.interaction.clone());
    let sinks = DumpDirectory::create(&config.dump_dir)?;

    let driver = Driver::new(engine, sinks)
        .initialize(&config.data)?
        .install_constraint(config.constraint.clone())?;

    let naming = config.naming.clone();
    for record in driver.run_segments(plan, move |i| naming.name(i)) {
        // print to terminal
        println!("{}", record?);
    }
    Ok(())
}
