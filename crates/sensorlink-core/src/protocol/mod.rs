//! Device Protocol
//!
//! Line-oriented request/response protocol spoken by the inference firmware:
//! the host sends 16 comma-separated readings, the device answers with
//! free-text lines carrying the predicted position and the inference time.

mod error;
pub mod exchange;
pub mod matcher;
pub mod serial;
pub mod session;
pub mod stream;
mod vector;

pub use error::ProtocolError;
pub use exchange::{exchange, CollectState, Collector, ExchangeResult, PollPolicy};
pub use matcher::FieldUpdate;
pub use serial::{list_ports, PortInfo};
pub use session::{Session, SessionConfig};
pub use stream::CommunicationChannel;
pub use vector::SensorVector;

/// Number of sensor channels in one request
pub const SENSOR_COUNT: usize = 16;

/// Default baud rate of the inference firmware
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default upper bound for a single read wait in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Default wait after opening the port, covers the bootloader reset
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;

/// Default extra wait before the startup banner is drained
pub const DEFAULT_BANNER_WAIT_MS: u64 = 1000;

/// Default pause between sending a request and polling for the reply
pub const DEFAULT_POST_SEND_PAUSE_MS: u64 = 100;

/// Default sleep between polls while no line is waiting
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default response collection deadline in milliseconds
pub const DEFAULT_RESPONSE_DEADLINE_MS: u64 = 3000;
