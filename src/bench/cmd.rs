///
/// Parse command line arguments.
///
///
use argparse::{ArgumentParser, Store, StoreTrue};
use std::time::Duration;

use super::logwriter::LogSchema;
use super::metrics::DeadlinePolicy;
use super::partition::PartitionStrategy;
use super::request::{SizePolicy, MAX_VALUE_LEN};

#[derive(Debug)]
pub struct Args {
    pub host: String,
    pub port: u16,
    pub num_workers: usize,
    pub trace_path: String,
    pub experiment_name: String,
    pub log_folder: String,
    pub granularity_sec: f64,
    pub timeout_ms: u64,
    pub strategy: String,
    pub size_policy: String,
    pub fixed_size: usize,
    pub legacy_log: bool,
    pub fail_fast: bool,
    pub abort_on_timeout: bool,
    pub drift_deadline: bool,
}

pub fn parse_args() -> Box<Args> {
    let mut args = Box::new(Args {
        host: String::new(),
        port: 0,
        num_workers: 1,
        trace_path: String::new(),
        experiment_name: String::from("exp"),
        log_folder: String::new(),
        granularity_sec: 1.0,
        timeout_ms: 1000,
        strategy: String::from("pre-split"),
        size_policy: String::from("fixed"),
        fixed_size: 4096,
        legacy_log: false,
        fail_fast: false,
        abort_on_timeout: false,
        drift_deadline: false,
    });

    {
        let mut ap = ArgumentParser::new();
        ap.set_description("Trace-driven cache load generator");
        ap.refer(&mut args.host)
            .add_option(&["-H", "--host"], Store, "cache server host")
            .required();
        ap.refer(&mut args.port)
            .add_option(&["-p", "--port"], Store, "cache server port")
            .required();
        ap.refer(&mut args.num_workers)
            .add_option(&["-n", "--num-workers"], Store, "number of concurrent workers");
        ap.refer(&mut args.trace_path)
            .add_option(&["-t", "--trace-file"], Store, "trace file path")
            .required();
        ap.refer(&mut args.experiment_name)
            .add_option(&["-N", "--name"], Store, "experiment name, used to name log files");
        ap.refer(&mut args.log_folder).add_option(
            &["-l", "--log-folder"],
            Store,
            "log output folder; omit to disable persistence",
        );
        ap.refer(&mut args.granularity_sec).add_option(
            &["-g", "--granularity"],
            Store,
            "snapshot window length in seconds",
        );
        ap.refer(&mut args.timeout_ms).add_option(
            &["--timeout-ms"],
            Store,
            "per-request response timeout in milliseconds",
        );
        ap.refer(&mut args.strategy).add_option(
            &["-s", "--strategy"],
            Store,
            "partitioning strategy (pre-split/modulo-filter)",
        );
        ap.refer(&mut args.size_policy).add_option(
            &["--size-policy"],
            Store,
            "object size policy (fixed/recorded)",
        );
        ap.refer(&mut args.fixed_size).add_option(
            &["--fixed-size"],
            Store,
            "object size in bytes under the fixed policy",
        );
        ap.refer(&mut args.legacy_log).add_option(
            &["--legacy-log"],
            StoreTrue,
            "write the original 5-column CSV schema without hit-rate columns",
        );
        ap.refer(&mut args.fail_fast).add_option(
            &["--fail-fast"],
            StoreTrue,
            "abort all workers when one worker fails",
        );
        ap.refer(&mut args.abort_on_timeout).add_option(
            &["--abort-on-timeout"],
            StoreTrue,
            "abort a worker on its first request timeout instead of continuing",
        );
        ap.refer(&mut args.drift_deadline).add_option(
            &["--drift-deadline"],
            StoreTrue,
            "advance snapshot deadlines from the snapshot time (original drifting behavior)",
        );

        ap.parse_args_or_exit();
    }
    args
}

impl Args {
    pub fn size_policy(&self) -> Result<SizePolicy, String> {
        match self.size_policy.to_ascii_lowercase().as_str() {
            "recorded" => Ok(SizePolicy::Recorded),
            "fixed" => {
                if self.fixed_size == 0 || self.fixed_size > MAX_VALUE_LEN {
                    Err(format!(
                        "fixed size must be within 1..={}, got {}",
                        MAX_VALUE_LEN, self.fixed_size
                    ))
                } else {
                    Ok(SizePolicy::Fixed(self.fixed_size))
                }
            }
            other => Err(format!("size policy is invalid: {}", other)),
        }
    }

    pub fn strategy(&self) -> Result<PartitionStrategy, String> {
        PartitionStrategy::parse(&self.strategy)
            .ok_or_else(|| format!("partition strategy is invalid: {}", self.strategy))
    }

    pub fn log_schema(&self) -> LogSchema {
        if self.legacy_log {
            LogSchema::Legacy
        } else {
            LogSchema::Extended
        }
    }

    pub fn deadline_policy(&self) -> DeadlinePolicy {
        if self.drift_deadline {
            DeadlinePolicy::FromNow
        } else {
            DeadlinePolicy::FixedPeriod
        }
    }

    pub fn granularity(&self) -> Result<Duration, String> {
        if self.granularity_sec <= 0.0 {
            return Err(format!("granularity must be positive, got {}", self.granularity_sec));
        }
        Ok(Duration::from_secs_f64(self.granularity_sec))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
