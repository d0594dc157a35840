//! Error types for the fluent MQTT layer
//!
//! Each failure domain gets its own enum so callers can match precisely:
//! configuration mistakes surface synchronously from builder setters,
//! transport problems from connect/publish, and payload interpretation
//! problems from message accessors. The umbrella [`Error`] exists for call
//! sites (like [`fast_build`](crate::builder::MqttBuilder::fast_build))
//! that cross domains.

use std::path::PathBuf;

use thiserror::Error;

use crate::connection::LifecycleState;

/// Invalid builder input, raised immediately at the setter call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("port {0} is out of range (expected 1..=65535)")]
    InvalidPort(u32),

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("CA bundle not found: {0:?}")]
    CaBundleNotFound(PathBuf),

    #[error("CA bundle could not be read: {path:?}")]
    CaBundleUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context} topic is invalid: {reason}")]
    InvalidTopic { context: &'static str, reason: String },

    #[error("reconnect window is invalid: min {min}s must be >= 1 and <= max {max}s")]
    InvalidReconnectWindow { min: u64, max: u64 },

    #[error("{field} is invalid: {reason}")]
    InvalidIdentityComponent { field: &'static str, reason: String },

    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("settings file could not be read: {path:?}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings file could not be parsed: {path:?}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {0} is not set")]
    MissingEnvVar(String),
}

/// Transport, auth or TLS failure while establishing a session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection failed: {0}")]
    Transport(String),

    #[error("no connection acknowledgement within {0:?}")]
    Timeout(std::time::Duration),

    #[error("connection already started; build a new connection for a fresh session")]
    AlreadyStarted,

    #[error("connection is closed")]
    Closed,

    #[error("lifecycle channel closed before the connection settled")]
    StateChannelClosed,
}

/// Publish rejected or not acknowledged.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not connected - current state: {state:?}")]
    NotConnected { state: LifecycleState },

    #[error("publish topic is invalid: {0}")]
    InvalidTopic(String),

    #[error("no acknowledgement within {0:?}")]
    AckTimeout(std::time::Duration),

    #[error("connection lost before the publish was acknowledged")]
    ConnectionLost,

    #[error("publishing failed")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Malformed topic filter or subscription transport failure.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("topic filter {filter:?} is malformed: {reason}")]
    MalformedFilter { filter: String, reason: String },

    #[error("connection is closed")]
    Closed,

    #[error("subscription failed")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A message accessor could not interpret the payload in the requested form.
///
/// Always local to the accessor call: dispatch never fails on an
/// undecodable payload, and the equality helpers fall back to not-equal.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid {charset} text")]
    NotText { charset: &'static str },

    #[error("payload is not valid JSON")]
    NotJson(#[source] serde_json::Error),

    #[error("payload has no recognized image signature")]
    NotImage,

    #[error("payload has no recognized audio signature")]
    NotAudio,

    #[error("payload is not interpretable as a boolean")]
    NotBoolean,

    #[error("payload is not interpretable as a number")]
    NotNumeric,

    #[error("unknown charset label: {0}")]
    UnknownCharset(String),
}

/// Umbrella error for operations that span configuration and transport.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Result alias for cross-domain operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_is_never_empty() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(ConfigError::InvalidPort(70000)),
            Box::new(ConfigError::EmptyUsername),
            Box::new(ConnectionError::AlreadyStarted),
            Box::new(PublishError::ConnectionLost),
            Box::new(SubscriptionError::Closed),
            Box::new(DecodeError::NotImage),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn umbrella_error_wraps_domain_errors() {
        let err: Error = ConfigError::InvalidPort(0).into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("out of range"));

        let err: Error = ConnectionError::Closed.into();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn not_connected_reports_state() {
        let err = PublishError::NotConnected {
            state: LifecycleState::Built,
        };
        assert!(err.to_string().contains("Built"));
    }
}
