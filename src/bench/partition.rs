///
/// Round-robin trace partitioning. Event with 0-based sequence index i goes
/// to worker `i % n_workers`, so assignment is deterministic across runs.
///
/// Two equivalent strategies:
///  - pre-split: the driver reads the trace once and materializes all
///    partitions before any worker starts;
///  - modulo-filter: each worker scans the whole trace itself and keeps only
///    the lines matching its residue, trading N redundant passes for not
///    holding the full trace in memory.
///
use super::reader::{ReaderError, TraceReader};
use super::request::{AccessEvent, SizePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    PreSplit,
    ModuloFilter,
}

impl PartitionStrategy {
    pub fn parse(s: &str) -> Option<PartitionStrategy> {
        match s.to_ascii_lowercase().as_str() {
            "pre-split" | "presplit" => Some(PartitionStrategy::PreSplit),
            "modulo-filter" | "modulo" => Some(PartitionStrategy::ModuloFilter),
            _ => None,
        }
    }
}

/// The event sequence one worker consumes, in trace order.
pub enum Workload {
    Materialized(std::vec::IntoIter<AccessEvent>),
    Filtered(FilteredTrace),
}

impl Workload {
    /// The io error that cut the event stream short, if any. A materialized
    /// workload was fully read up front, so only the filtered variant can
    /// end on an error.
    pub fn read_error(&self) -> Option<&std::io::Error> {
        match self {
            Workload::Materialized(_) => None,
            Workload::Filtered(trace) => trace.read_error(),
        }
    }
}

impl Iterator for Workload {
    type Item = AccessEvent;

    fn next(&mut self) -> Option<AccessEvent> {
        match self {
            Workload::Materialized(events) => events.next(),
            Workload::Filtered(trace) => trace.next(),
        }
    }
}

/// Reads the full trace once and splits it into n ordered partitions.
pub fn pre_split(
    trace_path: &str,
    n_workers: usize,
    size_policy: SizePolicy,
) -> Result<Vec<Vec<AccessEvent>>, ReaderError> {
    assert!(n_workers > 0);
    let mut reader = TraceReader::open(trace_path, size_policy)?;
    let mut partitions: Vec<Vec<AccessEvent>> = (0..n_workers).map(|_| Vec::new()).collect();

    let mut index: usize = 0;
    loop {
        match reader.next_event() {
            Ok(event) => {
                partitions[index % n_workers].push(event);
                index += 1;
            }
            Err(ReaderError::Eof) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(partitions)
}

/// Per-worker view of the shared trace under the modulo-filter strategy.
/// Each worker owns its own reader over the same file; the file is only ever
/// read, so no coordination is needed.
pub struct FilteredTrace {
    reader: TraceReader,
    worker_id: usize,
    n_workers: usize,
    next_index: usize,
}

impl FilteredTrace {
    pub fn open(
        trace_path: &str,
        worker_id: usize,
        n_workers: usize,
        size_policy: SizePolicy,
    ) -> Result<Self, ReaderError> {
        assert!(worker_id < n_workers);
        Ok(FilteredTrace {
            reader: TraceReader::open(trace_path, size_policy)?,
            worker_id,
            n_workers,
            next_index: 0,
        })
    }

    pub fn read_error(&self) -> Option<&std::io::Error> {
        self.reader.read_error()
    }
}

impl Iterator for FilteredTrace {
    type Item = AccessEvent;

    fn next(&mut self) -> Option<AccessEvent> {
        for event in self.reader.by_ref() {
            let index = self.next_index;
            self.next_index += 1;
            if index % self.n_workers == self.worker_id {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn trace_file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const TRACE: &str = "t1 a 100 1\nt2 b 200 1\nt3 a 50 1\n";

    #[test]
    fn round_robin_assignment_two_workers() {
        let f = trace_file(TRACE);
        let parts = pre_split(f.path().to_str().unwrap(), 2, SizePolicy::Recorded).unwrap();

        let ids0: Vec<&str> = parts[0].iter().map(|e| e.object_id.as_str()).collect();
        let ids1: Vec<&str> = parts[1].iter().map(|e| e.object_id.as_str()).collect();
        assert_eq!(ids0, vec!["a", "a"]);
        assert_eq!(ids1, vec!["b"]);
    }

    #[test]
    fn modulo_filter_matches_pre_split() {
        let f = trace_file("1 a 10 1\n2 b 20 1\n3 c 30 1\n4 d 40 1\n5 e 50 1\n6 f 60 1\n7 g 70 1\n");
        let path = f.path().to_str().unwrap();
        let n = 3;
        let parts = pre_split(path, n, SizePolicy::Recorded).unwrap();

        for worker_id in 0..n {
            let filtered: Vec<AccessEvent> =
                FilteredTrace::open(path, worker_id, n, SizePolicy::Recorded)
                    .unwrap()
                    .collect();
            assert_eq!(filtered, parts[worker_id]);
        }
    }

    #[test]
    fn partitions_cover_trace_exactly_once_in_order() {
        let f = trace_file("1 a 10 1\n2 b 20 1\n3 c 30 1\n4 d 40 1\n5 e 50 1\n");
        let path = f.path().to_str().unwrap();
        let full: Vec<AccessEvent> = TraceReader::open(path, SizePolicy::Recorded)
            .unwrap()
            .collect();

        for n in 1..=5 {
            let parts = pre_split(path, n, SizePolicy::Recorded).unwrap();
            assert_eq!(parts.len(), n);
            // interleave partitions back in round-robin order
            let total: usize = parts.iter().map(|p| p.len()).sum();
            assert_eq!(total, full.len());
            let mut rebuilt = Vec::with_capacity(total);
            let mut cursors: Vec<std::slice::Iter<AccessEvent>> =
                parts.iter().map(|p| p.iter()).collect();
            'outer: loop {
                for cursor in cursors.iter_mut() {
                    match cursor.next() {
                        Some(e) => rebuilt.push(e.clone()),
                        None => break 'outer,
                    }
                }
            }
            assert_eq!(rebuilt, full);
        }
    }

    #[test]
    fn single_worker_gets_everything() {
        let f = trace_file(TRACE);
        let parts = pre_split(f.path().to_str().unwrap(), 1, SizePolicy::Recorded).unwrap();
        assert_eq!(parts[0].len(), 3);
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            PartitionStrategy::parse("pre-split"),
            Some(PartitionStrategy::PreSplit)
        );
        assert_eq!(
            PartitionStrategy::parse("modulo-filter"),
            Some(PartitionStrategy::ModuloFilter)
        );
        assert_eq!(PartitionStrategy::parse("random"), None);
    }
}
