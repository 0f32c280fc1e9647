//! # SensorLink Core Library
//!
//! Host-side driver for an embedded position model running on a serial-attached board.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial (or TCP-bridged) sessions with startup banner handling
//! - The request/response exchange: one sensor vector out, predictions back
//! - Batch runs over CSV sample files with CSV result output
//! - A simulated device for running without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use sensorlink_core::protocol::{exchange, PollPolicy, SensorVector, Session, SessionConfig};
//!
//! # fn main() -> Result<(), sensorlink_core::protocol::ProtocolError> {
//! let mut session = Session::open(&SessionConfig::new("/dev/ttyACM0"))?;
//!
//! let vector = SensorVector::new([0.1; 16])?;
//! let result = exchange(&mut session, &vector, &PollPolicy::default())?;
//! println!("X={:?} Y={:?} t={:?}us", result.predicted_x, result.predicted_y, result.inference_time_us);
//!
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod demo;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::batch::{read_samples, run_batch, write_results, BatchOptions, SampleRecord, SampleResult};
    pub use crate::config::RunnerConfig;
    pub use crate::demo::SimulatedDevice;
    pub use crate::protocol::{
        exchange, CollectState, ExchangeResult, PollPolicy, ProtocolError, SensorVector, Session,
        SessionConfig,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
