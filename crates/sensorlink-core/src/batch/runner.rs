//! Sample-by-sample driver

use std::time::Duration;

use super::{SampleRecord, SampleResult};
use crate::protocol::{exchange, PollPolicy, SensorVector, Session};

/// Default pause between two samples in milliseconds
pub const DEFAULT_INTER_SAMPLE_DELAY_MS: u64 = 500;

/// Options for a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Timing of each exchange
    pub policy: PollPolicy,
    /// Pause after each sample
    pub inter_sample_delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            policy: PollPolicy::default(),
            inter_sample_delay: Duration::from_millis(DEFAULT_INTER_SAMPLE_DELAY_MS),
        }
    }
}

/// Run every sample through the device, in order
///
/// A sample that cannot be sent, or whose reply is incomplete, is recorded
/// with `success = false` and the run moves on. `on_result` sees every row
/// as soon as it is known.
pub fn run_batch<F>(
    session: &mut Session,
    samples: &[SampleRecord],
    options: &BatchOptions,
    mut on_result: F,
) -> Vec<SampleResult>
where
    F: FnMut(&SampleResult),
{
    let total = samples.len();
    let mut results = Vec::with_capacity(total);

    for (idx, sample) in samples.iter().enumerate() {
        tracing::info!(
            "Processing sample {}/{} (ID: {})",
            idx + 1,
            total,
            sample.sample_id
        );
        tracing::info!(
            "True position: X={:.6}, Y={:.6}",
            sample.true_x,
            sample.true_y
        );

        let row = match SensorVector::new(sample.sensors) {
            Ok(vector) => {
                tracing::info!("Sending sensor data to device...");
                match exchange(session, &vector, &options.policy) {
                    Ok(result) => SampleResult::new(sample, &result),
                    Err(e) => {
                        tracing::warn!("Sample {}: send failed: {}", sample.sample_id, e);
                        SampleResult::failed(sample)
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Sample {}: skipped: {}", sample.sample_id, e);
                SampleResult::failed(sample)
            }
        };

        match row.abs_error() {
            Some((error_x, error_y)) => {
                tracing::info!("Prediction received!");
                tracing::info!("  Error X: {:.6}", error_x);
                tracing::info!("  Error Y: {:.6}", error_y);
            }
            None => tracing::warn!("Failed to get prediction for sample {}", sample.sample_id),
        }

        on_result(&row);
        results.push(row);

        if idx + 1 < total {
            std::thread::sleep(options.inter_sample_delay);
        }
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    tracing::info!(
        "Processed {} samples: {} succeeded, {} failed",
        total,
        succeeded,
        total - succeeded
    );
    results
}
