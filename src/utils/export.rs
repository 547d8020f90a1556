//! CSV export of finished simulation runs.
//!
//! Appends one `RunSummary` row per run to `<data_dir>/runs.csv`; the header is written only when
//! the file is created.

use std::{
    fs::{OpenOptions, create_dir_all},
    io,
    path::{Path, PathBuf},
};

use csv::WriterBuilder;
use log::{error, info};

use crate::utils::metrics::RunSummary;

pub const RUNS_FILE: &str = "runs.csv";

pub fn append_run_summary(data_dir: &Path, summary: &RunSummary) -> Result<PathBuf, csv::Error> {
    create_dir_all(data_dir).map_err(csv::Error::from)?;
    let path = data_dir.join(RUNS_FILE);
    let file_exists = path.exists();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(csv::Error::from)?;

    let mut wtr = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(summary)?;
    wtr.flush().map_err(csv::Error::from)?;

    Ok(path)
}

/// Logging wrapper used at the end of every run; export failures never affect the simulation.
pub fn export_run(data_dir: &Path, summary: &RunSummary) {
    match append_run_summary(data_dir, summary) {
        Ok(path) => info!("[Export] Run summary appended to {}", path.display()),
        Err(e) => error!("[Export] Failed to write run summary: {}", e),
    }
}

/// Trajectory file for a run, e.g. `data/logs/trajectory_track_2.csv`.
pub fn trajectory_path(data_dir: &Path, track: u8) -> io::Result<PathBuf> {
    let dir = data_dir.join("logs");
    create_dir_all(&dir)?;
    Ok(dir.join(format!("trajectory_track_{}.csv", track)))
}
