//! Session management
//!
//! Owns the channel to one device and provides line-oriented I/O on top of it.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::{
    serial::{configure_port, open_port},
    stream::{CommunicationChannel, SerialChannel, TcpChannel},
    ProtocolError, DEFAULT_BANNER_WAIT_MS, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_SETTLE_DELAY_MS,
};

/// Address prefix selecting a TCP bridge instead of a local serial port
pub const TCP_SCHEME: &str = "tcp://";

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Serial port name, or `tcp://host:port`
    pub address: String,
    /// Baud rate (ignored for TCP)
    pub baud_rate: u32,
    /// Upper bound for a single read wait
    pub read_timeout: Duration,
    /// Wait after opening for the board to finish its reset cycle
    pub settle_delay: Duration,
    /// Extra wait before draining the startup banner
    pub banner_wait: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            banner_wait: Duration::from_millis(DEFAULT_BANNER_WAIT_MS),
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given address
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// An open line-oriented session with one device
pub struct Session {
    /// Channel handle, `None` once closed
    channel: Option<Box<dyn CommunicationChannel>>,
    /// Bytes received but not yet returned as a line
    pending: Vec<u8>,
    read_timeout: Duration,
    description: String,
    /// Metrics: cumulative bytes/lines sent & received
    tx_bytes: u64,
    rx_bytes: u64,
    tx_lines: u64,
    rx_lines: u64,
}

impl Session {
    /// Open the channel named by `config.address` and run the startup sequence
    pub fn open(config: &SessionConfig) -> Result<Self, ProtocolError> {
        if config.address.is_empty() {
            return Err(ProtocolError::InvalidConfig(
                "no port or address given".to_string(),
            ));
        }

        let channel: Box<dyn CommunicationChannel> =
            if let Some(host) = config.address.strip_prefix(TCP_SCHEME) {
                let stream = TcpStream::connect(host).map_err(|e| {
                    ProtocolError::ConnectionFailed(format!("{}: {}", config.address, e))
                })?;
                Box::new(TcpChannel::new(stream))
            } else {
                if config.baud_rate == 0 {
                    return Err(ProtocolError::InvalidConfig(
                        "baud rate must be positive".to_string(),
                    ));
                }
                let mut port = open_port(&config.address, config.baud_rate, config.read_timeout)?;
                configure_port(port.as_mut())?;
                Box::new(SerialChannel::new(port))
            };

        tracing::info!(
            "Opened {} at {} baud",
            config.address,
            config.baud_rate
        );
        Self::attach(channel, config)
    }

    /// Run the startup sequence on an already opened channel
    pub fn attach(
        mut channel: Box<dyn CommunicationChannel>,
        config: &SessionConfig,
    ) -> Result<Self, ProtocolError> {
        channel
            .set_timeout(config.read_timeout)
            .map_err(|e| ProtocolError::SerialError(e.to_string()))?;

        let mut session = Self {
            description: channel.describe(),
            channel: Some(channel),
            pending: Vec::new(),
            read_timeout: config.read_timeout,
            tx_bytes: 0,
            rx_bytes: 0,
            tx_lines: 0,
            rx_lines: 0,
        };

        tracing::debug!(
            "attach: waiting {}ms for device reset",
            config.settle_delay.as_millis()
        );
        std::thread::sleep(config.settle_delay);

        tracing::info!("Waiting for device to initialize...");
        std::thread::sleep(config.banner_wait);
        let drained = session.drain_banner();
        tracing::info!("Device ready ({} banner lines)", drained);

        Ok(session)
    }

    /// Read and log every line that is immediately available
    fn drain_banner(&mut self) -> usize {
        let mut count = 0;
        while self.has_buffered_line() || self.available() > 0 {
            match self.read_line_nonblocking() {
                Some(line) => {
                    tracing::info!("device: {}", line);
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    /// Description of the underlying channel
    pub fn address(&self) -> &str {
        &self.description
    }

    /// Whether the channel is still held
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Get cumulative tx/rx bytes and line counters
    pub fn get_counters(&self) -> (u64, u64, u64, u64) {
        (self.tx_bytes, self.rx_bytes, self.tx_lines, self.rx_lines)
    }

    /// Write `text` followed by a newline in a single write
    pub fn write_line(&mut self, text: &str) -> Result<(), ProtocolError> {
        let channel = self.channel.as_mut().ok_or(ProtocolError::NotConnected)?;

        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');

        channel.write_all(&bytes)?;
        channel.flush()?;

        tracing::debug!("write_line: sent {} bytes", bytes.len());
        self.tx_bytes = self.tx_bytes.saturating_add(bytes.len() as u64);
        self.tx_lines = self.tx_lines.saturating_add(1);
        Ok(())
    }

    /// Return the next line if one is available
    ///
    /// Nothing waiting means `None` right away. Once bytes are waiting, this
    /// blocks for at most the read timeout to see the terminator, and returns
    /// whatever arrived if the timeout hits first. Read errors are logged and
    /// reported as `None`.
    pub fn read_line_nonblocking(&mut self) -> Option<String> {
        self.read_line_within(self.read_timeout)
    }

    /// Like [`Session::read_line_nonblocking`], but waits for the terminator
    /// no longer than `max_wait` (and never longer than the read timeout)
    pub fn read_line_within(&mut self, max_wait: Duration) -> Option<String> {
        if let Some(line) = self.take_buffered_line() {
            return Some(line);
        }
        if self.available() == 0 {
            return None;
        }

        let limit = max_wait.min(self.read_timeout);
        let start = Instant::now();
        let mut buffer = [0u8; 256];
        loop {
            // Only read what is already waiting so a blocking port read
            // cannot outlast `limit`
            if self.available() == 0 {
                if start.elapsed() >= limit {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
                continue;
            }
            let channel = self.channel.as_mut()?;
            match channel.read(&mut buffer) {
                Ok(0) => {
                    tracing::debug!("read_line: read returned 0 (EOF)");
                    break;
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buffer[..n]);
                    self.rx_bytes = self.rx_bytes.saturating_add(n as u64);
                    if let Some(line) = self.take_buffered_line() {
                        return Some(line);
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    if start.elapsed() >= limit {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    tracing::warn!("read_line: read error: {}", e);
                    break;
                }
            }
            if start.elapsed() >= limit {
                break;
            }
        }

        // Terminator never came: hand back the partial line
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(self.decode(&raw))
    }

    /// Release the channel. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            tracing::debug!("close: releasing {}", channel.describe());
        }
        self.pending.clear();
    }

    fn available(&mut self) -> u32 {
        let Some(channel) = self.channel.as_mut() else {
            return 0;
        };
        match channel.bytes_to_read() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("bytes_to_read error: {}", e);
                0
            }
        }
    }

    fn has_buffered_line(&self) -> bool {
        self.pending.contains(&b'\n')
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(self.decode(&raw))
    }

    fn decode(&mut self, raw: &[u8]) -> String {
        self.rx_lines = self.rx_lines.saturating_add(1);
        decode_line(raw)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode a raw line leniently and trim trailing whitespace
///
/// Invalid UTF-8 becomes U+FFFD instead of failing; boards commonly print a
/// Latin-1 micro sign.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_string()
}
