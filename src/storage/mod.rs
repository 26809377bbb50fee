use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RunConfig;
use crate::history::{self, RunRecord};
use crate::report::{self, Report, ReportFormat};

const LATEST_RESULTS_FILE: &str = "latest_results.json";

/// Writes the report in every requested format plus `latest_results.json`.
/// Returns the paths of the timestamped report files.
pub fn save_report(report: &Report, formats: &[ReportFormat], dir: &Path) -> Result<Vec<PathBuf>, String> {
    ensure_dir(dir)?;

    let stamp = report.metadata.started_at.format("%Y%m%d_%H%M%S").to_string();
    let mut written = Vec::with_capacity(formats.len());
    for format in formats {
        let path = unused_path(dir, &stamp, &report.metadata.run_id, format.extension());
        write_atomic(&path, &report::render(report, *format))?;
        written.push(path);
    }

    write_atomic(&dir.join(LATEST_RESULTS_FILE), &report::render(report, ReportFormat::Json))?;
    Ok(written)
}

/// Writes the configured report files and appends the run to the history.
/// Failures are logged and never change the run's outcome.
pub fn persist(report: &Report, config: &RunConfig) -> Vec<PathBuf> {
    let paths = match save_report(report, &config.report_formats, &config.report_dir) {
        Ok(paths) => {
            for path in &paths {
                tracing::info!(path = %path.display(), "Report written");
            }
            paths
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to write reports");
            Vec::new()
        }
    };

    if let Err(err) = history::append(&config.report_dir, &RunRecord::from_report(report, &paths)) {
        tracing::warn!(error = %err, "Failed to record run history");
    }
    paths
}

/// The report of the most recent run, if one was saved.
pub fn load_latest(dir: &Path) -> Result<Option<Report>, String> {
    let file = dir.join(LATEST_RESULTS_FILE);
    if !file.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&file)
        .map_err(|e| format!("Failed to read results file `{}`: {e}", file.display()))?;
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse results file `{}`: {e}", file.display()))
}

/// `test_report_<stamp>.<ext>`. When that name is taken the run id is
/// appended, then a counter, until the name is free.
fn unused_path(dir: &Path, stamp: &str, run_id: &str, extension: &str) -> PathBuf {
    let path = dir.join(format!("test_report_{stamp}.{extension}"));
    if !path.exists() {
        return path;
    }
    let short: String = run_id.chars().take(8).collect();
    let mut attempt = 1usize;
    loop {
        let name = match attempt {
            1 => format!("test_report_{stamp}_{short}.{extension}"),
            n => format!("test_report_{stamp}_{short}_{n}.{extension}"),
        };
        let path = dir.join(name);
        if !path.exists() {
            return path;
        }
        attempt += 1;
    }
}

/// Writes to a sibling temp file and renames it into place.
fn write_atomic(path: &Path, contents: &str) -> Result<(), String> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, contents)
        .map_err(|e| format!("Failed to write file `{}`: {e}", temp.display()))?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        format!("Failed to move report into place at `{}`: {e}", path.display())
    })
}

pub fn ensure_dir(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|e| format!("Failed to create report directory `{}`: {e}", path.display()))
}
