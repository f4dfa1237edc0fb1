///
/// Minimal memcached text-protocol client. One persistent connection per
/// worker; only GET and SET are issued. Responses are not parsed line by
/// line: bytes are accumulated into a buffer until a terminal marker for the
/// operation appears, which keeps the hit/miss classification identical even
/// when a marker arrives split across socket reads.
///
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::request::FILL_VALUE;

const GET_END_MARKER: &[u8] = b"END\r\n";
const STORED_MARKER: &[u8] = b"STORED\r\n";
const NOT_STORED_MARKER: &[u8] = b"NOT_STORED\r\n";
const SERVER_ERROR_MARKER: &[u8] = b"SERVER_ERROR";
const VALUE_MARKER: &[u8] = b"VALUE";
const CRLF: &[u8] = b"\r\n";

// flags and exptime sent with every SET; 0 exptime = never expires
const SET_FLAGS: u32 = 0;
const SET_EXPTIME: u32 = 0;

const RECV_CHUNK: usize = 4096;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed by server")]
    ConnectionClosed,
    #[error("no terminal marker within {0:?}")]
    Timeout(Duration),
    #[error("server error: {0}")]
    ServerError(String),
}

impl ClientError {
    /// Connection-level errors are fatal to the owning worker; timeouts and
    /// server errors become Failed outcomes and the worker may continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. } | ClientError::Io(_) | ClientError::ConnectionClosed
        )
    }
}

#[derive(Debug)]
pub struct CacheClient {
    stream: TcpStream,
    buf: Vec<u8>,
    timeout: Duration,
    // set after a timeout: the server's late reply may still arrive and
    // must not be classified as the next request's response
    desynced: bool,
}

impl CacheClient {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ClientError> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).map_err(|e| ClientError::Connect {
            addr: addr.clone(),
            source: e,
        })?;
        stream.set_nodelay(true)?;
        // short poll interval so the overall deadline check stays responsive
        stream.set_read_timeout(Some(timeout.min(Duration::from_millis(100)).max(
            Duration::from_millis(1),
        )))?;

        Ok(CacheClient {
            stream,
            buf: Vec::with_capacity(RECV_CHUNK),
            timeout,
            desynced: false,
        })
    }

    /// GET one key. Returns (hit, latency); latency spans request send to
    /// full response receipt.
    pub fn get(&mut self, key: &str) -> Result<(bool, Duration), ClientError> {
        self.resync();
        let start = Instant::now();
        self.stream
            .write_all(format!("get {}\r\n", key).as_bytes())?;
        self.read_until(|buf| {
            contains(buf, GET_END_MARKER) || starts_with(buf, SERVER_ERROR_MARKER)
        })?;
        let latency = start.elapsed();

        if starts_with(&self.buf, SERVER_ERROR_MARKER) {
            return Err(ClientError::ServerError(error_line(&self.buf)));
        }
        Ok((starts_with(&self.buf, VALUE_MARKER), latency))
    }

    /// SET one key with `size` filler bytes. Returns the latency; a
    /// NOT_STORED reply still counts as a completed request.
    pub fn set(&mut self, key: &str, size: usize) -> Result<Duration, ClientError> {
        self.resync();
        let start = Instant::now();
        let header = format!("set {} {} {} {}\r\n", key, SET_FLAGS, SET_EXPTIME, size);
        self.stream.write_all(header.as_bytes())?;
        self.stream.write_all(&FILL_VALUE[..size])?;
        self.stream.write_all(CRLF)?;
        self.read_until(|buf| {
            contains(buf, STORED_MARKER)
                || contains(buf, NOT_STORED_MARKER)
                || starts_with(buf, SERVER_ERROR_MARKER)
        })?;
        let latency = start.elapsed();

        if starts_with(&self.buf, SERVER_ERROR_MARKER) {
            return Err(ClientError::ServerError(error_line(&self.buf)));
        }
        Ok(latency)
    }

    /// Accumulate bytes until `is_terminal` matches the buffer or the
    /// bounded wait expires. The previous response is discarded first.
    fn read_until<F>(&mut self, is_terminal: F) -> Result<(), ClientError>
    where
        F: Fn(&[u8]) -> bool,
    {
        self.buf.clear();
        let start = Instant::now();
        let mut chunk = [0u8; RECV_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ClientError::ConnectionClosed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if is_terminal(&self.buf) {
                        return Ok(());
                    }
                }
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
                Err(e) => return Err(ClientError::Io(e)),
            }
            if start.elapsed() >= self.timeout {
                self.desynced = true;
                return Err(ClientError::Timeout(self.timeout));
            }
        }
    }

    /// Best-effort drain of bytes left queued by a timed-out request, so
    /// stale markers are not matched against the next response. A reply
    /// that is still in flight when this runs can still desync the
    /// connection; full recovery would need a reconnect.
    fn resync(&mut self) {
        if !self.desynced {
            return;
        }
        let mut chunk = [0u8; RECV_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }
        self.desynced = false;
    }
}

fn contains(buf: &[u8], marker: &[u8]) -> bool {
    buf.windows(marker.len()).any(|w| w == marker)
}

fn starts_with(buf: &[u8], marker: &[u8]) -> bool {
    buf.len() >= marker.len() && &buf[..marker.len()] == marker
}

fn error_line(buf: &[u8]) -> String {
    let line = match buf.windows(2).position(|w| w == CRLF) {
        Some(pos) => &buf[..pos],
        None => buf,
    };
    String::from_utf8_lossy(line).into_owned()
}
