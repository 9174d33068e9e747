//! foamsim: diffuse-particle post-processing for SPH snapshot sequences.
//!
//! Reads a JSON parameter file and runs the batch pipeline over the
//! configured frame range. Logging is controlled through `RUST_LOG`.

use std::{env, fs, process};

use anyhow::{Context, Result};
use foam::{FoamSimulation, SimulationParams};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let config_path = match (args.next(), args.next()) {
        (Some(path), None) => path,
        _ => {
            eprintln!("usage: foamsim <params.json>");
            process::exit(2);
        }
    };

    let text = fs::read_to_string(&config_path)
        .with_context(|| format!("reading parameter file {config_path}"))?;
    let params: SimulationParams =
        serde_json::from_str(&text).with_context(|| format!("parsing {config_path}"))?;

    let mut sim = FoamSimulation::new(params)?;
    sim.run()?;
    log::info!("run complete, {} diffuse particles alive", sim.particles().len());
    Ok(())
}
