///
/// Per-worker metrics. Each worker owns one `Aggregator`; nothing here is
/// shared across threads. Window counters are folded into the snapshot and
/// reset each granularity period; cumulative counters run for the whole
/// experiment, so at any snapshot the cumulative totals equal the sum of all
/// window totals taken so far.
///
use log::info;
use std::time::{Duration, Instant};

use super::request::{AccessStatus, Outcome};

/// One row of the per-worker log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub elapsed_secs: f64,
    pub window_throughput: f64,
    pub window_avg_latency_ms: f64,
    pub window_hit_rate_pct: f64,
    pub cumulative_throughput: f64,
    pub cumulative_avg_latency_ms: f64,
    pub cumulative_hit_rate_pct: f64,
}

/// How the next snapshot deadline advances after a window closes.
/// `FixedPeriod` keeps windows aligned to the nominal granularity;
/// `FromNow` reproduces the original harness, whose windows drift longer
/// than nominal under load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlinePolicy {
    FixedPeriod,
    FromNow,
}

#[derive(Debug)]
pub struct Aggregator {
    worker_id: usize,
    granularity: Duration,
    deadline_policy: DeadlinePolicy,
    start: Instant,
    next_deadline: Instant,

    window_reqs: u64,
    window_hits: u64,
    window_failed: u64,
    window_latency: Duration,

    cum_reqs: u64,
    cum_hits: u64,
    cum_failed: u64,
    cum_latency: Duration,

    snapshots: Vec<WindowSnapshot>,
}

impl Aggregator {
    pub fn new(
        worker_id: usize,
        start: Instant,
        granularity: Duration,
        deadline_policy: DeadlinePolicy,
    ) -> Aggregator {
        Aggregator {
            worker_id,
            granularity,
            deadline_policy,
            start,
            next_deadline: start + granularity,
            window_reqs: 0,
            window_hits: 0,
            window_failed: 0,
            window_latency: Duration::ZERO,
            cum_reqs: 0,
            cum_hits: 0,
            cum_failed: 0,
            cum_latency: Duration::ZERO,
            snapshots: Vec::new(),
        }
    }

    /// Account one completed access. Failed requests go to their own
    /// counters and are excluded from the latency sums, so a stalled server
    /// cannot inflate the average of completed requests.
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome.status {
            AccessStatus::Hit => {
                self.window_hits += 1;
                self.cum_hits += 1;
            }
            AccessStatus::Miss => {}
            AccessStatus::Failed => {
                self.window_failed += 1;
                self.cum_failed += 1;
                return;
            }
        }
        self.window_reqs += 1;
        self.cum_reqs += 1;
        self.window_latency += outcome.latency;
        self.cum_latency += outcome.latency;
    }

    /// Close the current window if its deadline has passed. Returns true
    /// when a snapshot was taken.
    pub fn maybe_snapshot(&mut self, now: Instant) -> bool {
        if now < self.next_deadline {
            return false;
        }

        let elapsed = now.duration_since(self.start).as_secs_f64();
        let granularity_secs = self.granularity.as_secs_f64();

        let snap = WindowSnapshot {
            elapsed_secs: elapsed,
            window_throughput: self.window_reqs as f64 / granularity_secs,
            window_avg_latency_ms: avg_latency_ms(self.window_latency, self.window_reqs),
            window_hit_rate_pct: rate_pct(self.window_hits, self.window_reqs),
            cumulative_throughput: if elapsed > 0.0 {
                self.cum_reqs as f64 / elapsed
            } else {
                0.0
            },
            cumulative_avg_latency_ms: avg_latency_ms(self.cum_latency, self.cum_reqs),
            cumulative_hit_rate_pct: rate_pct(self.cum_hits, self.cum_reqs),
        };

        info!(
            "worker {}: last window latency={:.5}ms throughput={:.2} req/s hit={:.2}%",
            self.worker_id,
            snap.window_avg_latency_ms,
            snap.window_throughput,
            snap.window_hit_rate_pct,
        );
        info!(
            "worker {}: overall latency={:.5}ms throughput={:.2} req/s hit={:.2}%",
            self.worker_id,
            snap.cumulative_avg_latency_ms,
            snap.cumulative_throughput,
            snap.cumulative_hit_rate_pct,
        );

        self.snapshots.push(snap);

        self.window_reqs = 0;
        self.window_hits = 0;
        self.window_failed = 0;
        self.window_latency = Duration::ZERO;

        self.next_deadline = match self.deadline_policy {
            DeadlinePolicy::FixedPeriod => self.next_deadline + self.granularity,
            DeadlinePolicy::FromNow => now + self.granularity,
        };
        true
    }

    pub fn snapshots(&self) -> &[WindowSnapshot] {
        &self.snapshots
    }

    pub fn total_requests(&self) -> u64 {
        self.cum_reqs
    }

    pub fn total_hits(&self) -> u64 {
        self.cum_hits
    }

    pub fn total_failed(&self) -> u64 {
        self.cum_failed
    }
}

fn avg_latency_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    total.as_secs_f64() * 1000.0 / count as f64
}

fn rate_pct(hits: u64, reqs: u64) -> f64 {
    if reqs == 0 {
        return 0.0;
    }
    100.0 * hits as f64 / reqs as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: AccessStatus, ms: u64) -> Outcome {
        Outcome {
            status,
            latency: Duration::from_millis(ms),
        }
    }

    fn aggregator(policy: DeadlinePolicy) -> (Aggregator, Instant) {
        let start = Instant::now();
        (
            Aggregator::new(0, start, Duration::from_secs(1), policy),
            start,
        )
    }

    #[test]
    fn cumulative_equals_sum_of_windows() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FixedPeriod);

        let mut window_req_sum = 0u64;
        let mut window_lat_sum = Duration::ZERO;
        for window in 0..3 {
            for i in 0..5 {
                agg.record(&outcome(
                    if i % 2 == 0 {
                        AccessStatus::Hit
                    } else {
                        AccessStatus::Miss
                    },
                    window + 1,
                ));
            }
            window_req_sum += agg.window_reqs;
            window_lat_sum += agg.window_latency;
            assert_eq!(agg.cum_reqs, window_req_sum);
            assert_eq!(agg.cum_latency, window_lat_sum);

            let now = start + Duration::from_secs(window as u64 + 1);
            assert!(agg.maybe_snapshot(now));
            assert_eq!(agg.window_reqs, 0);
            assert_eq!(agg.window_latency, Duration::ZERO);
        }
        assert_eq!(agg.snapshots().len(), 3);
        assert_eq!(agg.total_requests(), 15);
    }

    #[test]
    fn empty_window_average_latency_is_zero() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FixedPeriod);
        assert!(agg.maybe_snapshot(start + Duration::from_secs(1)));
        let snap = &agg.snapshots()[0];
        assert_eq!(snap.window_avg_latency_ms, 0.0);
        assert_eq!(snap.window_throughput, 0.0);
        assert_eq!(snap.window_hit_rate_pct, 0.0);
        assert_eq!(snap.cumulative_avg_latency_ms, 0.0);
    }

    #[test]
    fn no_snapshot_before_deadline() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FixedPeriod);
        agg.record(&outcome(AccessStatus::Hit, 1));
        assert!(!agg.maybe_snapshot(start + Duration::from_millis(500)));
        assert!(agg.snapshots().is_empty());
    }

    #[test]
    fn failed_requests_tracked_apart_from_hit_and_miss() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FixedPeriod);
        agg.record(&outcome(AccessStatus::Hit, 1));
        agg.record(&outcome(AccessStatus::Failed, 1000));
        agg.record(&outcome(AccessStatus::Miss, 3));

        assert_eq!(agg.total_requests(), 2);
        assert_eq!(agg.total_hits(), 1);
        assert_eq!(agg.total_failed(), 1);
        // the timeout's latency must not leak into the completed average
        assert_eq!(agg.cum_latency, Duration::from_millis(4));

        assert!(agg.maybe_snapshot(start + Duration::from_secs(1)));
        let snap = &agg.snapshots()[0];
        assert_eq!(snap.window_hit_rate_pct, 50.0);
        assert!((snap.window_avg_latency_ms - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_period_deadline_does_not_drift() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FixedPeriod);
        // snapshot fires late, next deadline still lands on the grid
        assert!(agg.maybe_snapshot(start + Duration::from_millis(1700)));
        assert_eq!(agg.next_deadline, start + Duration::from_secs(2));
    }

    #[test]
    fn from_now_deadline_drifts_like_the_original() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FromNow);
        let late = start + Duration::from_millis(1700);
        assert!(agg.maybe_snapshot(late));
        assert_eq!(agg.next_deadline, late + Duration::from_secs(1));
    }

    #[test]
    fn hit_rate_spans_windows() {
        let (mut agg, start) = aggregator(DeadlinePolicy::FixedPeriod);
        agg.record(&outcome(AccessStatus::Miss, 1));
        agg.record(&outcome(AccessStatus::Miss, 1));
        assert!(agg.maybe_snapshot(start + Duration::from_secs(1)));
        agg.record(&outcome(AccessStatus::Hit, 1));
        agg.record(&outcome(AccessStatus::Hit, 1));
        assert!(agg.maybe_snapshot(start + Duration::from_secs(2)));

        let snaps = agg.snapshots();
        assert_eq!(snaps[0].cumulative_hit_rate_pct, 0.0);
        assert_eq!(snaps[1].window_hit_rate_pct, 100.0);
        assert_eq!(snaps[1].cumulative_hit_rate_pct, 50.0);
    }
}
