//! Demo Mode - Simulated inference device for testing
//!
//! Stands in for the board when no hardware is attached. It prints a startup
//! banner, and answers every request line the way the firmware does: an echo
//! of the sample count, the two predictions, and the inference time.
//!
//! The "model" is a weighted centroid over a 4x4 sensor grid, so predictions
//! are deterministic for a given vector. Only the reported timing is random.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::protocol::{CommunicationChannel, SENSOR_COUNT};

/// Sensors are laid out row-major on a square grid of this width
const GRID_WIDTH: usize = 4;

/// Typical on-device inference time in microseconds
const BASE_INFERENCE_US: u64 = 14_000;

/// Simulated device speaking the line protocol
pub struct SimulatedDevice {
    /// Bytes waiting to be read by the host
    outbox: VecDeque<u8>,
    /// Partial request line written by the host
    inbox: Vec<u8>,
    /// Whether to print the timing line
    report_timing: bool,
    /// Report timing in milliseconds only, like older firmware
    millis_only: bool,
    /// Number of requests answered
    answered: u64,
    rng: StdRng,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Create a device with a random timing seed
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a device with reproducible timing
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut device = Self {
            outbox: VecDeque::new(),
            inbox: Vec::new(),
            report_timing: true,
            millis_only: false,
            answered: 0,
            rng,
        };
        device.say("Sensor position model v1");
        device.say(&format!("Expecting {} comma-separated values", SENSOR_COUNT));
        device.say("Ready");
        device
    }

    /// Omit the `Inference time:` line from replies
    pub fn without_timing(mut self) -> Self {
        self.report_timing = false;
        self
    }

    /// Report inference time as `N.NN ms` only
    pub fn millis_only(mut self) -> Self {
        self.millis_only = true;
        self
    }

    /// Number of requests answered so far
    pub fn answered(&self) -> u64 {
        self.answered
    }

    /// Predicted position for a set of readings
    ///
    /// Uses the absolute reading as weight; an all-zero vector maps to the
    /// grid center.
    pub fn predict(values: &[f64]) -> (f64, f64) {
        let span = (GRID_WIDTH - 1) as f64;
        let mut total = 0.0;
        let mut x = 0.0;
        let mut y = 0.0;
        for (i, value) in values.iter().enumerate() {
            let weight = value.abs();
            x += weight * (i % GRID_WIDTH) as f64 / span;
            y += weight * (i / GRID_WIDTH) as f64 / span;
            total += weight;
        }
        if total == 0.0 {
            return (0.5, 0.5);
        }
        (x / total, y / total)
    }

    fn say(&mut self, line: &str) {
        self.outbox.extend(line.as_bytes());
        self.outbox.extend(b"\r\n");
    }

    fn handle_request(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let parsed: Result<Vec<f64>, _> = text.split(',').map(|t| t.trim().parse::<f64>()).collect();
        let values = match parsed {
            Ok(values) if values.len() == SENSOR_COUNT => values,
            Ok(values) => {
                self.say(&format!(
                    "Error: expected {} values, got {}",
                    SENSOR_COUNT,
                    values.len()
                ));
                return;
            }
            Err(_) => {
                self.say("Error: could not parse input");
                return;
            }
        };

        let (x, y) = Self::predict(&values);
        let inference_us = BASE_INFERENCE_US + self.rng.gen_range(0..2_000);

        self.say(&format!("Received {} values", values.len()));
        self.say("Running inference...");
        self.say(&format!("Predicted X: {:.6}", x));
        self.say(&format!("Predicted Y: {:.6}", y));
        if self.report_timing {
            let ms = inference_us as f64 / 1000.0;
            if self.millis_only {
                self.say(&format!("Inference time: {:.2} ms", ms));
            } else {
                self.say(&format!("Inference time: {} μs ({:.2} ms)", inference_us, ms));
            }
        }
        self.say("---");
        self.answered += 1;
    }
}

impl Read for SimulatedDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.outbox.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.inbox);
                self.handle_request(&line);
            } else {
                self.inbox.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CommunicationChannel for SimulatedDevice {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.outbox.len() as u32)
    }

    fn describe(&self) -> String {
        "demo".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(device: &mut SimulatedDevice) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while let Ok(n) = device.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_banner_on_start() {
        let mut device = SimulatedDevice::with_seed(1);
        let banner = read_all(&mut device);
        assert!(banner.contains("Ready"));
        assert_eq!(device.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_predict_center_and_corners() {
        assert_eq!(SimulatedDevice::predict(&[0.0; SENSOR_COUNT]), (0.5, 0.5));

        let mut values = [0.0; SENSOR_COUNT];
        values[0] = 1.0;
        assert_eq!(SimulatedDevice::predict(&values), (0.0, 0.0));

        values[0] = 0.0;
        values[SENSOR_COUNT - 1] = 3.0;
        assert_eq!(SimulatedDevice::predict(&values), (1.0, 1.0));
    }

    #[test]
    fn test_reply_lines() {
        let mut device = SimulatedDevice::with_seed(7);
        read_all(&mut device);

        let mut request = vec!["0"; SENSOR_COUNT].join(",");
        request.push('\n');
        device.write_all(request.as_bytes()).unwrap();

        let reply = read_all(&mut device);
        assert!(reply.contains("Predicted X: 0.500000"));
        assert!(reply.contains("Predicted Y: 0.500000"));
        assert!(reply.contains("Inference time: "));
        assert!(reply.contains(" μs ("));
        assert_eq!(device.answered(), 1);
    }

    #[test]
    fn test_reply_without_timing() {
        let mut device = SimulatedDevice::with_seed(7).without_timing();
        read_all(&mut device);
        device.write_all(b"1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1\n").unwrap();
        let reply = read_all(&mut device);
        assert!(reply.contains("Predicted X:"));
        assert!(!reply.contains("Inference time:"));
    }

    #[test]
    fn test_rejects_short_request() {
        let mut device = SimulatedDevice::with_seed(7);
        read_all(&mut device);
        device.write_all(b"1,2,3\n").unwrap();
        let reply = read_all(&mut device);
        assert!(reply.contains("expected 16 values, got 3"));
        assert_eq!(device.answered(), 0);
    }
}
