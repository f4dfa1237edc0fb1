use lazy_static::lazy_static;
use std::fmt;
use std::time::Duration;

pub const MAX_VALUE_LEN: usize = 1024 * 1024;

lazy_static! {
    // shared filler payload, sliced to the object size on every SET
    pub static ref FILL_VALUE: Vec<u8> = vec![b'x'; MAX_VALUE_LEN];
}

/// One access from the trace. The recorded timestamp and latency columns are
/// parsed but not replayed; the size has already been passed through the
/// configured `SizePolicy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    pub object_id: String,
    pub object_size: usize,
}

/// How the object size from the trace is normalized before a SET is issued.
/// The original harness hardcoded 4 KB regardless of the trace column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePolicy {
    Recorded,
    Fixed(usize),
}

impl SizePolicy {
    pub fn apply(&self, recorded_size: usize) -> usize {
        match self {
            SizePolicy::Recorded => recorded_size.min(MAX_VALUE_LEN),
            SizePolicy::Fixed(size) => *size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Hit,
    Miss,
    /// Timeout or server error; kept apart from hit/miss in all counters.
    Failed,
}

/// Result of one trace access. For a miss the latency already includes the
/// fill SET that followed the GET.
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub status: AccessStatus,
    pub latency: Duration,
}

impl fmt::Display for AccessEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "AccessEvent(object_id={}, object_size={})",
            self.object_id, self.object_size
        )
    }
}
