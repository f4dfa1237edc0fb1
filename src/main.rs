mod bench;

use bench::cmd::{self, Args};
use bench::logwriter;
use bench::partition::{self, FilteredTrace, PartitionStrategy, Workload};
use bench::worker::{run_worker, WorkerConfig, WorkerReport};

use log::{error, info};
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

fn main() {
    SimpleLogger::new().init().unwrap();

    let args = cmd::parse_args();

    match run(&args) {
        Ok(reports) => {
            if !run_succeeded(&reports) {
                std::process::exit(1);
            }
        }
        Err(msg) => {
            error!("{}", msg);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<Vec<WorkerReport>, String> {
    let size_policy = args.size_policy()?;
    let strategy = args.strategy()?;
    let granularity = args.granularity()?;
    if args.num_workers == 0 {
        return Err(String::from("num-workers must be at least 1"));
    }

    let log_dir = if args.log_folder.is_empty() {
        None
    } else {
        let dir = PathBuf::from(&args.log_folder);
        logwriter::create_log_dir(&dir).map_err(|e| e.to_string())?;
        Some(dir)
    };

    info!(
        "starting experiment {} against {}:{} with {} workers on trace {}",
        args.experiment_name, args.host, args.port, args.num_workers, args.trace_path
    );

    // the trace is partitioned (or per-worker readers are opened) before any
    // worker starts issuing requests
    let workloads: Vec<Workload> = match strategy {
        PartitionStrategy::PreSplit => {
            info!("partitioning workloads...");
            partition::pre_split(&args.trace_path, args.num_workers, size_policy)
                .map_err(|e| e.to_string())?
                .into_iter()
                .map(|events| Workload::Materialized(events.into_iter()))
                .collect()
        }
        PartitionStrategy::ModuloFilter => {
            let mut workloads = Vec::with_capacity(args.num_workers);
            for worker_id in 0..args.num_workers {
                let trace =
                    FilteredTrace::open(&args.trace_path, worker_id, args.num_workers, size_policy)
                        .map_err(|e| e.to_string())?;
                workloads.push(Workload::Filtered(trace));
            }
            workloads
        }
    };

    let abort = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(args.num_workers));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(args.num_workers);
    for (worker_id, workload) in workloads.into_iter().enumerate() {
        let cfg = WorkerConfig {
            worker_id,
            n_workers: args.num_workers,
            host: args.host.clone(),
            port: args.port,
            timeout: args.timeout(),
            granularity,
            deadline_policy: args.deadline_policy(),
            abort_on_timeout: args.abort_on_timeout,
            fail_fast: args.fail_fast,
            experiment_name: args.experiment_name.clone(),
            log_dir: log_dir.clone(),
            log_schema: args.log_schema(),
        };
        let abort = Arc::clone(&abort);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            run_worker(&cfg, workload, start, &abort)
        }));
    }

    let mut reports = Vec::with_capacity(args.num_workers);
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(report) => reports.push(report),
            Err(_) => reports.push(WorkerReport {
                worker_id,
                completed: false,
                error: Some(String::from("worker panicked")),
                n_requests: 0,
                n_hits: 0,
                n_failed: 0,
                log_error: None,
            }),
        }
    }

    report_run(&reports, start.elapsed().as_secs_f64());
    Ok(reports)
}

fn report_run(reports: &[WorkerReport], runtime: f64) {
    let mut n_requests = 0u64;
    let mut n_hits = 0u64;
    let mut n_failed = 0u64;
    for report in reports {
        match &report.error {
            None => info!(
                "worker {}: completed, {} requests, {} hits, {} failed",
                report.worker_id, report.n_requests, report.n_hits, report.n_failed
            ),
            Some(e) => error!(
                "worker {}: did not complete ({}), {} requests processed",
                report.worker_id, e, report.n_requests
            ),
        }
        if let Some(e) = &report.log_error {
            error!("worker {}: log write failed: {}", report.worker_id, e);
        }
        n_requests += report.n_requests;
        n_hits += report.n_hits;
        n_failed += report.n_failed;
    }

    let n_completed = reports.iter().filter(|r| r.completed).count();
    println!(
        "{}/{} workers completed, {} req, {:.2} sec, throughput {:.2} req/s, hit ratio {:.4}, {} failed",
        n_completed,
        reports.len(),
        n_requests,
        runtime,
        n_requests as f64 / runtime,
        if n_requests > 0 {
            n_hits as f64 / n_requests as f64
        } else {
            0.0
        },
        n_failed,
    );
}

fn run_succeeded(reports: &[WorkerReport]) -> bool {
    reports
        .iter()
        .all(|r| r.completed && r.log_error.is_none())
}
