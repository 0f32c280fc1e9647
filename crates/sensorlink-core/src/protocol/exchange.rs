//! Request/response exchange
//!
//! One exchange sends a sensor vector and collects the reply lines until all
//! three fields are known or the response deadline passes.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::{
    matcher::{apply_line, FieldUpdate},
    ProtocolError, SensorVector, Session, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POST_SEND_PAUSE_MS,
    DEFAULT_RESPONSE_DEADLINE_MS,
};

/// Fields collected from one exchange, each absent until parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeResult {
    /// Predicted X coordinate
    pub predicted_x: Option<f64>,
    /// Predicted Y coordinate
    pub predicted_y: Option<f64>,
    /// On-device inference time in microseconds
    pub inference_time_us: Option<u64>,
}

impl ExchangeResult {
    /// Both predictions are present. Timing is not required.
    pub fn is_success(&self) -> bool {
        self.predicted_x.is_some() && self.predicted_y.is_some()
    }

    /// All three fields are present
    pub fn is_complete(&self) -> bool {
        self.is_success() && self.inference_time_us.is_some()
    }

    /// True if no field has been parsed yet
    pub fn is_empty(&self) -> bool {
        self.predicted_x.is_none() && self.predicted_y.is_none() && self.inference_time_us.is_none()
    }

    /// Inference time in milliseconds
    pub fn inference_time_ms(&self) -> Option<f64> {
        self.inference_time_us.map(|us| us as f64 / 1000.0)
    }

    /// Set the field named by `update`. Fields are never cleared.
    pub fn apply(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::PredictedX(v) => self.predicted_x = Some(v),
            FieldUpdate::PredictedY(v) => self.predicted_y = Some(v),
            FieldUpdate::InferenceTimeUs(v) => self.inference_time_us = Some(v),
        }
    }
}

/// Timing policy for the send/poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause after sending, before the first poll
    pub post_send_pause: Duration,
    /// Sleep between polls when no line is waiting
    pub poll_interval: Duration,
    /// Collection budget, measured from the start of the poll loop
    pub response_deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            post_send_pause: Duration::from_millis(DEFAULT_POST_SEND_PAUSE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            response_deadline: Duration::from_millis(DEFAULT_RESPONSE_DEADLINE_MS),
        }
    }
}

impl PollPolicy {
    /// Default policy with a custom response deadline
    pub fn with_deadline(response_deadline: Duration) -> Self {
        Self {
            response_deadline,
            ..Self::default()
        }
    }
}

/// State of the collection loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectState {
    /// Nothing parsed yet
    WaitingForData,
    /// Some fields parsed
    HavePartial,
    /// All three fields parsed (terminal)
    Complete,
    /// Deadline passed first (terminal)
    TimedOut,
}

impl CollectState {
    /// Whether the loop stops in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, CollectState::Complete | CollectState::TimedOut)
    }
}

/// Accumulates reply lines into an [`ExchangeResult`]
#[derive(Debug, Clone)]
pub struct Collector {
    result: ExchangeResult,
    state: CollectState,
    lines: usize,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    /// Start in `WaitingForData` with every field absent
    pub fn new() -> Self {
        Self {
            result: ExchangeResult::default(),
            state: CollectState::WaitingForData,
            lines: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> CollectState {
        self.state
    }

    /// Fields collected so far
    pub fn result(&self) -> &ExchangeResult {
        &self.result
    }

    /// Number of lines fed
    pub fn lines_seen(&self) -> usize {
        self.lines
    }

    /// Fold one line. Lines fed after a terminal state are ignored.
    pub fn feed_line(&mut self, line: &str) -> CollectState {
        if self.state.is_terminal() {
            return self.state;
        }
        self.lines += 1;
        apply_line(&mut self.result, line);
        self.state = if self.result.is_complete() {
            CollectState::Complete
        } else if self.result.is_empty() {
            CollectState::WaitingForData
        } else {
            CollectState::HavePartial
        };
        self.state
    }

    /// Deadline reached: move any non-complete state to `TimedOut`
    pub fn expire(&mut self) -> CollectState {
        if self.state != CollectState::Complete {
            self.state = CollectState::TimedOut;
        }
        self.state
    }

    /// Final result
    pub fn finish(self) -> ExchangeResult {
        self.result
    }
}

/// Send `vector` and collect the reply under `policy`
///
/// Only a failed write is an error. Running out of time is not: whatever was
/// parsed by then is returned, possibly nothing.
pub fn exchange(
    session: &mut Session,
    vector: &SensorVector,
    policy: &PollPolicy,
) -> Result<ExchangeResult, ProtocolError> {
    let request = vector.to_request_line();
    tracing::debug!("exchange: sending '{}'", request);
    session.write_line(&request)?;
    std::thread::sleep(policy.post_send_pause);

    let mut collector = Collector::new();
    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= policy.response_deadline {
            collector.expire();
            break;
        }

        // A partial line may not hold the loop past the deadline
        match session.read_line_within(policy.response_deadline - elapsed) {
            Some(line) => {
                tracing::info!("  {}", line);
                if collector.feed_line(&line) == CollectState::Complete {
                    break;
                }
            }
            None => {
                let remaining = policy.response_deadline.saturating_sub(start.elapsed());
                std::thread::sleep(policy.poll_interval.min(remaining));
            }
        }
    }

    let elapsed = start.elapsed();
    match collector.state() {
        CollectState::Complete => {
            tracing::debug!("exchange: complete in {}ms", elapsed.as_millis())
        }
        state => tracing::debug!(
            "exchange: {:?} after {}ms with {} lines",
            state,
            elapsed.as_millis(),
            collector.lines_seen()
        ),
    }
    Ok(collector.finish())
}
