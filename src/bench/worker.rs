///
/// One worker drives one partition through its own connection and its own
/// aggregator. Workers share nothing mutable; a worker failing takes only
/// its own partition down unless fail-fast is enabled.
///
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::client::{CacheClient, ClientError};
use super::logwriter::{self, LogSchema};
use super::metrics::{Aggregator, DeadlinePolicy};
use super::partition::Workload;
use super::request::{AccessStatus, Outcome};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: usize,
    pub n_workers: usize,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub granularity: Duration,
    pub deadline_policy: DeadlinePolicy,
    /// abort this worker on the first ProtocolTimeout instead of counting
    /// it as a failed request and moving on
    pub abort_on_timeout: bool,
    /// propagate a fatal worker error to siblings through the abort flag
    pub fail_fast: bool,
    pub experiment_name: String,
    pub log_dir: Option<PathBuf>,
    pub log_schema: LogSchema,
}

/// What the driver learns about one worker after join.
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub completed: bool,
    pub error: Option<String>,
    pub n_requests: u64,
    pub n_hits: u64,
    pub n_failed: u64,
    pub log_error: Option<String>,
}

pub fn run_worker(
    cfg: &WorkerConfig,
    workload: Workload,
    start: Instant,
    abort: &AtomicBool,
) -> WorkerReport {
    info!("worker {}/{} starting", cfg.worker_id, cfg.n_workers);

    let mut agg = Aggregator::new(cfg.worker_id, start, cfg.granularity, cfg.deadline_policy);
    let mut report = WorkerReport {
        worker_id: cfg.worker_id,
        completed: false,
        error: None,
        n_requests: 0,
        n_hits: 0,
        n_failed: 0,
        log_error: None,
    };

    let mut client = match CacheClient::connect(&cfg.host, cfg.port, cfg.timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("worker {}: {}", cfg.worker_id, e);
            report.error = Some(e.to_string());
            if cfg.fail_fast {
                abort.store(true, Ordering::Relaxed);
            }
            return report;
        }
    };

    let mut fatal: Option<String> = None;
    let mut exhausted = true;
    let mut workload = workload;

    while let Some(event) = workload.next() {
        if abort.load(Ordering::Relaxed) {
            warn!("worker {}: aborting early, sibling worker failed", cfg.worker_id);
            report.error = Some(String::from("aborted after sibling worker failure"));
            exhausted = false;
            break;
        }

        match process_event(&mut client, &event.object_id, event.object_size) {
            Ok((outcome, timed_out)) => {
                agg.record(&outcome);
                if timed_out && cfg.abort_on_timeout {
                    report.error = Some(String::from("request timed out with abort-on-timeout set"));
                    exhausted = false;
                    break;
                }
            }
            Err(e) => {
                error!("worker {}: {}", cfg.worker_id, e);
                fatal = Some(e.to_string());
                exhausted = false;
                break;
            }
        }

        agg.maybe_snapshot(Instant::now());
    }

    if let Some(e) = fatal {
        report.error = Some(e);
        if cfg.fail_fast {
            abort.store(true, Ordering::Relaxed);
        }
    }

    // a modulo-filter workload ends its stream on a trace read error; that
    // worker did not see its whole partition and must not report completion
    if let Some(e) = workload.read_error() {
        error!("worker {}: trace read failed: {}", cfg.worker_id, e);
        if report.error.is_none() {
            report.error = Some(format!("trace read failed: {}", e));
        }
        exhausted = false;
    }
    report.completed = exhausted && report.error.is_none();

    report.n_requests = agg.total_requests();
    report.n_hits = agg.total_hits();
    report.n_failed = agg.total_failed();

    // flush the snapshot log, persistence disabled without a log dir
    if let Some(log_dir) = &cfg.log_dir {
        match logwriter::write_worker_log(
            log_dir,
            &cfg.experiment_name,
            cfg.worker_id,
            agg.snapshots(),
            cfg.log_schema,
        ) {
            Ok(path) => info!(
                "worker {}: wrote {} snapshots to {}",
                cfg.worker_id,
                agg.snapshots().len(),
                path.display()
            ),
            Err(e) => {
                error!("worker {}: {}", cfg.worker_id, e);
                report.log_error = Some(e.to_string());
            }
        }
    }

    info!(
        "worker {}: done, {} requests, {} hits, {} failed, completed={}",
        cfg.worker_id, report.n_requests, report.n_hits, report.n_failed, report.completed
    );
    report
}

/// One trace access: GET, and on a miss the fill SET for the same key. The
/// miss latency is the sum of both. Timeouts and server errors become
/// Failed outcomes (the bool marks a timeout, which abort-on-timeout keys
/// off); connection-level errors propagate to the caller.
fn process_event(
    client: &mut CacheClient,
    object_id: &str,
    object_size: usize,
) -> Result<(Outcome, bool), ClientError> {
    let failed = Outcome {
        status: AccessStatus::Failed,
        latency: Duration::ZERO,
    };

    let (hit, get_latency) = match client.get(object_id) {
        Ok(r) => r,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("get {}: {}", object_id, e);
            return Ok((failed, matches!(e, ClientError::Timeout(_))));
        }
    };

    if hit {
        return Ok((
            Outcome {
                status: AccessStatus::Hit,
                latency: get_latency,
            },
            false,
        ));
    }

    match client.set(object_id, object_size) {
        Ok(set_latency) => Ok((
            Outcome {
                status: AccessStatus::Miss,
                latency: get_latency + set_latency,
            },
            false,
        )),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("set {}: {}", object_id, e);
            Ok((failed, matches!(e, ClientError::Timeout(_))))
        }
    }
}
