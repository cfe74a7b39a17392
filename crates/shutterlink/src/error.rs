//! Unified error type for the shutterlink crate.
//!
//! [`Error`] wraps module-specific errors (`ProtocolError`,
//! `TransportError`, `DeviceError`). `From` impls allow `?` to propagate
//! across module boundaries seamlessly.

use std::fmt;

use crate::device::DeviceError;
use crate::ptp::ProtocolError;
use crate::transport::TransportError;

/// Unified error type for shutterlink operations.
#[derive(Debug)]
pub enum Error {
    /// Protocol engine error (framing, session, device rejection).
    Protocol(ProtocolError),
    /// Transport error (open, send, receive).
    Transport(TransportError),
    /// Lifecycle or registry error.
    Device(DeviceError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(e) => write!(f, "{e}"),
            Error::Transport(e) => write!(f, "{e}"),
            Error::Device(e) => write!(f, "{e}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Protocol(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Device(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Error::Device(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Crate-level Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_protocol_error() {
        let e: Error = ProtocolError::SessionNotOpen.into();
        assert!(matches!(e, Error::Protocol(ProtocolError::SessionNotOpen)));
    }

    #[test]
    fn from_transport_error() {
        let e: Error = TransportError::NotFound.into();
        assert!(matches!(e, Error::Transport(TransportError::NotFound)));
    }

    #[test]
    fn from_device_error() {
        let e: Error = DeviceError::Init("event worker".into()).into();
        assert!(matches!(e, Error::Device(DeviceError::Init(_))));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn display_formats() {
        assert_eq!(
            Error::Protocol(ProtocolError::SessionNotOpen).to_string(),
            "session not open"
        );
        assert_eq!(
            Error::Transport(TransportError::NotFound).to_string(),
            "camera not found"
        );
        assert_eq!(
            Error::Config("bad multiplier".into()).to_string(),
            "Config error: bad multiplier"
        );
    }

    #[test]
    fn source_chains_inner_errors() {
        let e = Error::Protocol(ProtocolError::DeviceRejected(0x2019));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("0x2019"));

        let e = Error::Config("oops".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_protocol_to_crate() {
        fn inner() -> crate::ptp::Result<()> {
            Err(ProtocolError::SessionNotOpen)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::SessionNotOpen)
        ));
    }
}
