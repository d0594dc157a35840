//! Immutable connection configuration
//!
//! [`MqttConfig`] is the snapshot a [`MqttBuilder`](crate::builder::MqttBuilder)
//! produces at build time. The builder owns the mutable accumulation; once a
//! connection exists its configuration never changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ProtocolVersion, QoS};

pub(crate) const DEFAULT_PORT: u16 = 1883;
pub(crate) const DEFAULT_TLS_PORT: u16 = 8883;
pub(crate) const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Session expiry requested for persistent v5 sessions unless overridden.
pub(crate) const PERSISTENT_SESSION_EXPIRY_SECS: u32 = 3600;

/// Username/password credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Transport security selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsMode {
    /// Plain TCP.
    #[default]
    None,
    /// TLS with the platform trust store.
    SystemDefault {
        allow_insecure: bool,
    },
    /// TLS trusting a custom CA bundle.
    CustomCa {
        ca_path: PathBuf,
        allow_insecure: bool,
    },
}

impl TlsMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TlsMode::None)
    }
}

/// Last Will and Testament registered with the broker at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

/// Availability announcement configuration.
///
/// When present the connection publishes `payload_online` on every
/// successful connect, publishes `payload_offline` right before a
/// deliberate disconnect, and registers `payload_offline` as the LWT for
/// unclean ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub topic: String,
    pub payload_online: String,
    pub payload_offline: String,
    pub qos: QoS,
    pub retain: bool,
}

impl Availability {
    /// The will entry this availability configuration implies.
    pub fn implied_last_will(&self) -> LastWill {
        LastWill {
            topic: self.topic.clone(),
            payload: self.payload_offline.clone(),
            qos: self.qos,
            retain: self.retain,
        }
    }
}

/// Bounds handed to the transport's reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

/// Immutable configuration snapshot for one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive: Duration,
    pub credentials: Option<Credentials>,
    pub tls: TlsMode,
    pub last_will: Option<LastWill>,
    pub availability: Option<Availability>,
    pub reconnect: Option<ReconnectPolicy>,
    pub clean_session: bool,
    pub session_expiry_secs: u32,
    pub app_name: String,
    pub instance_id: Option<String>,
    pub protocol: ProtocolVersion,
    /// Derived at build time; stable for the same device, app and instance.
    pub client_id: String,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

impl MqttConfig {
    /// The will actually registered with the broker.
    ///
    /// Availability wins over an explicitly configured will regardless of
    /// the order the builder setters were called in; the rule is resolved
    /// here, at snapshot level.
    pub fn effective_last_will(&self) -> Option<LastWill> {
        match &self.availability {
            Some(availability) => Some(availability.implied_last_will()),
            None => self.last_will.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> MqttConfig {
        MqttConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            credentials: None,
            tls: TlsMode::None,
            last_will: None,
            availability: None,
            reconnect: None,
            clean_session: true,
            session_expiry_secs: 0,
            app_name: "agent".to_string(),
            instance_id: None,
            protocol: ProtocolVersion::V3_1_1,
            client_id: "agent-test".to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    #[test]
    fn availability_overrides_explicit_will() {
        let mut config = base_config();
        config.last_will = Some(LastWill {
            topic: "other".to_string(),
            payload: "x".to_string(),
            qos: QoS::AtMostOnce,
            retain: false,
        });
        config.availability = Some(Availability {
            topic: "t".to_string(),
            payload_online: "on".to_string(),
            payload_offline: "off".to_string(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let will = config.effective_last_will().unwrap();
        assert_eq!(will.topic, "t");
        assert_eq!(will.payload, "off");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn explicit_will_survives_without_availability() {
        let mut config = base_config();
        config.last_will = Some(LastWill {
            topic: "state".to_string(),
            payload: "gone".to_string(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let will = config.effective_last_will().unwrap();
        assert_eq!(will.topic, "state");
        assert_eq!(will.payload, "gone");
    }

    #[test]
    fn no_will_by_default() {
        assert!(base_config().effective_last_will().is_none());
    }

    #[test]
    fn config_snapshot_serializes() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: MqttConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
