///
/// Per-worker CSV sink. One file per worker, named from the experiment name
/// and worker index, so concurrent workers never interleave output.
///
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::metrics::WindowSnapshot;

#[derive(Error, Debug)]
pub enum LogWriteError {
    #[error("cannot create log dir {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot write log {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Column layout of the CSV. `Legacy` is the original five-column schema;
/// `Extended` adds the per-window and overall hit-rate columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSchema {
    Legacy,
    Extended,
}

const LEGACY_HEADER: &str =
    "timestamp,last_second_latency,last_second_throughput,overall_latency,overall_throughput";
const EXTENDED_HEADER: &str = "timestamp,last_second_latency,last_second_throughput,\
                               last_second_hit_rate,overall_latency,overall_throughput,\
                               overall_hit_rate";

pub fn log_file_path(log_dir: &Path, experiment_name: &str, worker_id: usize) -> PathBuf {
    log_dir.join(format!("{}_{}.csv", experiment_name, worker_id))
}

pub fn create_log_dir(log_dir: &Path) -> Result<(), LogWriteError> {
    fs::create_dir_all(log_dir).map_err(|e| LogWriteError::CreateDir {
        path: log_dir.display().to_string(),
        source: e,
    })
}

/// Flush one worker's snapshot log. Called once, at the end of the worker's
/// run; a failure is reported to the caller and never retried.
pub fn write_worker_log(
    log_dir: &Path,
    experiment_name: &str,
    worker_id: usize,
    snapshots: &[WindowSnapshot],
    schema: LogSchema,
) -> Result<PathBuf, LogWriteError> {
    let path = log_file_path(log_dir, experiment_name, worker_id);
    let write_err = |e: std::io::Error| LogWriteError::Write {
        path: path.display().to_string(),
        source: e,
    };

    let file = fs::File::create(&path).map_err(write_err)?;
    let mut out = BufWriter::new(file);

    let header = match schema {
        LogSchema::Legacy => LEGACY_HEADER,
        LogSchema::Extended => EXTENDED_HEADER,
    };
    writeln!(out, "{}", header).map_err(write_err)?;

    for snap in snapshots {
        match schema {
            LogSchema::Legacy => writeln!(
                out,
                "{},{},{},{},{}",
                snap.elapsed_secs,
                snap.window_avg_latency_ms,
                snap.window_throughput,
                snap.cumulative_avg_latency_ms,
                snap.cumulative_throughput,
            ),
            LogSchema::Extended => writeln!(
                out,
                "{},{},{},{},{},{},{}",
                snap.elapsed_secs,
                snap.window_avg_latency_ms,
                snap.window_throughput,
                snap.window_hit_rate_pct,
                snap.cumulative_avg_latency_ms,
                snap.cumulative_throughput,
                snap.cumulative_hit_rate_pct,
            ),
        }
        .map_err(write_err)?;
    }
    out.flush().map_err(write_err)?;

    Ok(path)
}
