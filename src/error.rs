//! Error types for hyprstream-channels.
//!
//! Misuse of the channel registry (invalid ids, duplicate or missing
//! entries, wrong thread) is not represented here: those are contract
//! violations and panic. This type only covers failures of the ambient
//! machinery around the registry.

use std::fmt;
use std::result;
use thiserror::Error;

/// A specialized Result type for channel operations.
pub type Result<T> = result::Result<T, ChannelError>;

/// The error type for channel operations.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to spawn I/O thread {name}: {source}")]
    IoThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build I/O runtime: {0}")]
    IoRuntime(#[source] std::io::Error),

    #[error("I/O thread {0} is no longer accepting tasks")]
    IoThreadStopped(String),

    #[error("I/O thread {name} panicked: {message}")]
    IoThreadPanicked { name: String, message: String },

    #[error("Message pipe peer is closed")]
    PeerClosed,

    #[error("Failed to create socket pair: {0}")]
    SocketPair(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Report a broken usage contract and abort the current thread.
#[track_caller]
pub(crate) fn contract_violation(args: fmt::Arguments<'_>) -> ! {
    tracing::error!("contract violation: {}", args);
    panic!("{}", args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ChannelError::IoThreadStopped("hyprstream-io".into());
        assert_eq!(
            err.to_string(),
            "I/O thread hyprstream-io is no longer accepting tasks"
        );

        let err = ChannelError::IoThreadPanicked {
            name: "hyprstream-io".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "I/O thread hyprstream-io panicked: boom");
    }

    #[test]
    fn test_source_preserved() {
        use std::error::Error as _;
        let err = ChannelError::IoRuntime(std::io::Error::new(
            std::io::ErrorKind::Other,
            "no reactor",
        ));
        assert!(err.source().is_some());
    }
}
