//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to the device
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Port settings could not be applied
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The session was closed
    #[error("Not connected to device")]
    NotConnected,

    /// The port or bridge could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Wrong length or a non-finite reading
    #[error("Invalid sensor vector: {0}")]
    InvalidVector(String),

    /// Unusable session settings
    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    /// Read or write on the channel failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True for failures that happen while opening the channel
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionFailed(_) | ProtocolError::SerialError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_classification() {
        assert!(ProtocolError::ConnectionFailed("busy".into()).is_connection_error());
        assert!(ProtocolError::SerialError("parity".into()).is_connection_error());
        assert!(!ProtocolError::NotConnected.is_connection_error());
    }

    #[test]
    fn test_io_error_display() {
        let err: ProtocolError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert!(err.to_string().contains("pipe closed"));
    }
}
