///
/// Streaming reader for the four-column text trace format:
/// `<timestamp> <object_id> <object_size> <recorded_latency>`
///
use log::warn;
use std::fs;
use std::io::{BufRead, BufReader};
use thiserror::Error;

use super::request::{AccessEvent, SizePolicy};

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("cannot open trace {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("io error reading trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("EOF")]
    Eof,
    #[error("malformed trace line {line_no}")]
    MalformedLine { line_no: u64 },
}

#[derive(Debug)]
pub struct TraceReader {
    lines: std::io::Lines<BufReader<fs::File>>,
    size_policy: SizePolicy,
    pub trace_path: String,
    pub line_no: u64,
    pub n_read: u64,
    pub n_malformed: u64,
    io_error: Option<std::io::Error>,
}

impl TraceReader {
    pub fn open(trace_path: &str, size_policy: SizePolicy) -> Result<Self, ReaderError> {
        let file = fs::File::open(trace_path).map_err(|e| ReaderError::Open {
            path: trace_path.to_string(),
            source: e,
        })?;

        Ok(TraceReader {
            lines: BufReader::new(file).lines(),
            size_policy,
            trace_path: trace_path.to_string(),
            line_no: 0,
            n_read: 0,
            n_malformed: 0,
            io_error: None,
        })
    }

    /// The io error that ended iteration early, if any. Consumers that use
    /// the `Iterator` interface must check this after exhaustion to tell a
    /// clean EOF from a truncated read.
    pub fn read_error(&self) -> Option<&std::io::Error> {
        self.io_error.as_ref()
    }

    /// Next well-formed access in the trace. Malformed lines are skipped and
    /// logged, never fatal; returns `Eof` once the trace is exhausted.
    pub fn next_event(&mut self) -> Result<AccessEvent, ReaderError> {
        loop {
            let line = match self.lines.next() {
                None => return Err(ReaderError::Eof),
                Some(line) => line?,
            };
            self.line_no += 1;

            match parse_line(&line, self.line_no, self.size_policy) {
                Ok(event) => {
                    self.n_read += 1;
                    return Ok(event);
                }
                Err(e) => {
                    self.n_malformed += 1;
                    warn!("{}: skipping {}: {:?}", self.trace_path, e, line);
                }
            }
        }
    }
}

impl Iterator for TraceReader {
    type Item = AccessEvent;

    fn next(&mut self) -> Option<AccessEvent> {
        match self.next_event() {
            Ok(event) => Some(event),
            Err(ReaderError::Eof) => None,
            Err(ReaderError::Io(e)) => {
                // an io error mid-trace ends the stream; keep the error so
                // the consumer can distinguish this from a clean EOF
                warn!("{}: trace read aborted: {}", self.trace_path, e);
                self.io_error = Some(e);
                None
            }
            Err(e) => {
                warn!("{}: trace read aborted: {}", self.trace_path, e);
                None
            }
        }
    }
}

fn parse_line(line: &str, line_no: u64, size_policy: SizePolicy) -> Result<AccessEvent, ReaderError> {
    let malformed = || ReaderError::MalformedLine { line_no };

    let mut fields = line.split_whitespace();
    let _timestamp = fields.next().ok_or_else(malformed)?;
    let object_id = fields.next().ok_or_else(malformed)?;
    let size_field = fields.next().ok_or_else(malformed)?;
    let latency_field = fields.next().ok_or_else(malformed)?;
    if fields.next().is_some() {
        return Err(malformed());
    }

    let recorded_size: usize = size_field.parse().map_err(|_| malformed())?;
    let _recorded_latency: f64 = latency_field.parse().map_err(|_| malformed())?;

    Ok(AccessEvent {
        object_id: object_id.to_string(),
        object_size: size_policy.apply(recorded_size),
    })
}
