//! Batch Runs
//!
//! Runs every sample of a CSV file through the device and records the
//! predictions next to the ground truth.

mod format;
mod runner;

pub use format::{read_samples, sensor_column, write_results, RESULT_COLUMNS};
pub use runner::{run_batch, BatchOptions, DEFAULT_INTER_SAMPLE_DELAY_MS};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::{ExchangeResult, SENSOR_COUNT};

/// Errors while reading samples or writing results
#[derive(Error, Debug)]
pub enum BatchError {
    /// File could not be read or written
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Empty samples file
    #[error("{} has no header row", .0.display())]
    MissingHeader(PathBuf),

    /// Header lacks required columns
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Row has more cells than the header
    #[error("Row {row}: expected {expected} cells, found {actual}")]
    RowLength {
        /// Zero-based data row
        row: usize,
        /// Header width
        expected: usize,
        /// Cells in the row
        actual: usize,
    },

    /// Cell is not a number
    #[error("Row {row}, column {column}: '{value}' is not a number")]
    InvalidCell {
        /// Zero-based data row
        row: usize,
        /// Column name
        column: String,
        /// Offending text
        value: String,
    },
}

/// One input row: the readings plus the true position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// `sample_id` column, or the zero-based row index when absent
    pub sample_id: String,
    /// `sensor_00` .. `sensor_15`; empty cells are NaN
    pub sensors: [f64; SENSOR_COUNT],
    /// Ground truth X
    pub true_x: f64,
    /// Ground truth Y
    pub true_y: f64,
}

/// One output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Copied from the input row
    pub sample_id: String,
    /// Ground truth X
    pub true_x: f64,
    /// Ground truth Y
    pub true_y: f64,
    /// Device prediction, if received
    pub predicted_x: Option<f64>,
    /// Device prediction, if received
    pub predicted_y: Option<f64>,
    /// Reported inference time
    pub inference_time_us: Option<u64>,
    /// Same time in milliseconds
    pub inference_time_ms: Option<f64>,
    /// Both predictions were received
    pub success: bool,
    /// The readings that were sent
    pub sensors: [f64; SENSOR_COUNT],
}

impl SampleResult {
    /// Combine an input row with what the device returned
    pub fn new(sample: &SampleRecord, result: &ExchangeResult) -> Self {
        Self {
            sample_id: sample.sample_id.clone(),
            true_x: sample.true_x,
            true_y: sample.true_y,
            predicted_x: result.predicted_x,
            predicted_y: result.predicted_y,
            inference_time_us: result.inference_time_us,
            inference_time_ms: result.inference_time_ms(),
            success: result.is_success(),
            sensors: sample.sensors,
        }
    }

    /// A row for a sample that never produced a reply
    pub fn failed(sample: &SampleRecord) -> Self {
        Self::new(sample, &ExchangeResult::default())
    }

    /// Absolute prediction error per axis, when both predictions are present
    pub fn abs_error(&self) -> Option<(f64, f64)> {
        match (self.predicted_x, self.predicted_y) {
            (Some(x), Some(y)) => Some(((x - self.true_x).abs(), (y - self.true_y).abs())),
            _ => None,
        }
    }
}
