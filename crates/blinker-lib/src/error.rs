//! Unified error type for the blinker-lib crate.
//!
//! [`BlinkerError`] wraps module-specific errors (`InputError`, `EndpointError`,
//! `LinkError`) and domain-specific error kinds (`Config`, `Color`).
//! `From` impls allow `?` to propagate across module boundaries seamlessly.

use std::fmt;

use crate::config::ValidationError;
use crate::connection::LinkError;
use crate::endpoint::EndpointError;
use crate::input::InputError;

/// Unified error type for blinker-lib operations.
#[derive(Debug)]
pub enum BlinkerError {
    /// The physical input line could not be sampled. Fatal.
    Input(InputError),
    /// A single exchange with the lighting endpoint failed.
    Endpoint(EndpointError),
    /// The connection manager refused or gave up on a command.
    Link(LinkError),
    /// Standard I/O error (file read/write, config persistence, thread spawn).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
    /// Color parsing error.
    Color(String),
}

impl fmt::Display for BlinkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlinkerError::Input(e) => write!(f, "{e}"),
            BlinkerError::Endpoint(e) => write!(f, "{e}"),
            BlinkerError::Link(e) => write!(f, "{e}"),
            BlinkerError::Io(e) => write!(f, "I/O error: {e}"),
            BlinkerError::Config(e) => write!(f, "Config error: {e}"),
            BlinkerError::Color(e) => write!(f, "Color error: {e}"),
        }
    }
}

impl std::error::Error for BlinkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlinkerError::Input(e) => Some(e),
            BlinkerError::Endpoint(e) => Some(e),
            BlinkerError::Link(e) => Some(e),
            BlinkerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InputError> for BlinkerError {
    fn from(e: InputError) -> Self {
        BlinkerError::Input(e)
    }
}

impl From<EndpointError> for BlinkerError {
    fn from(e: EndpointError) -> Self {
        BlinkerError::Endpoint(e)
    }
}

impl From<LinkError> for BlinkerError {
    fn from(e: LinkError) -> Self {
        BlinkerError::Link(e)
    }
}

/// All validation problems, joined into one message.
impl From<Vec<ValidationError>> for BlinkerError {
    fn from(errors: Vec<ValidationError>) -> Self {
        let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        BlinkerError::Config(joined.join("; "))
    }
}

impl From<std::io::Error> for BlinkerError {
    fn from(e: std::io::Error) -> Self {
        BlinkerError::Io(e)
    }
}

/// Crate-level Result alias using [`BlinkerError`].
pub type Result<T> = std::result::Result<T, BlinkerError>;
