//! Blinker — push-button driven LED sequences for WLED controllers.

pub mod config;
pub mod connection;
pub mod debounce;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod input;
pub mod led;
pub mod reconnect;
pub mod sequence;
pub mod service;
pub mod shutdown;

pub use error::BlinkerError;
