//! Batch driver: settings JSON + corner-point grid JSON in, seismic out.
//!
//! Usage: `forward <settings.json> <grid.json> [output-dir]`

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use seis3d::eclipse::CornerPointGrid;
use seis3d::forward::{self, ConsoleReporter};
use seis3d::grid::Grid3;
use seis3d::session::Session;
use seis3d::settings::ModelSettings;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), String> {
    let mut args = std::env::args().skip(1);
    let settings_path = args.next().ok_or("usage: forward <settings.json> <grid.json> [output-dir]")?;
    let grid_path = args.next().ok_or("usage: forward <settings.json> <grid.json> [output-dir]")?;
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| ".".to_string()));

    let settings: ModelSettings = read_json(&settings_path)?;
    let eclipse: CornerPointGrid = read_json(&grid_path)?;

    let timeshift: Option<Grid3> = match settings.twt_timeshift_file.as_deref() {
        Some(path) => Some(read_json(path)?),
        None => None,
    };
    let top_time = match settings.top_time_surface.as_deref() {
        Some(path) => Some(read_json(path)?),
        None => None,
    };

    let started = Instant::now();
    let mut session =
        Session::new(settings, eclipse, top_time, timeshift).map_err(|e| e.to_string())?;

    seis3d::regrid::run(&mut session).map_err(|e| e.to_string())?;
    info!(elapsed = ?started.elapsed(), "regridding done");

    let mut reporter = ConsoleReporter::default();
    forward::run(&mut session, &out_dir, &mut reporter).map_err(|e| e.to_string())?;
    info!(elapsed = ?started.elapsed(), "run complete");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("{path}: {e}"))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| format!("{path}: {e}"))
}
