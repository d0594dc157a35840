//! Fluent connection builder
//!
//! The builder is the mutable accumulator; [`build`](MqttBuilder::build)
//! snapshots it into an immutable [`MqttConfig`], derives the client id and
//! wraps a pre-configured (but not yet connected) protocol client. Every
//! setter validates its own input immediately and returns
//! `Result<Self, ConfigError>` so chains fail fast with `?`.
//!
//! ```no_run
//! use fluent_mqtt::{MqttBuilder, QoS};
//!
//! # async fn demo() -> Result<(), fluent_mqtt::Error> {
//! let connection = MqttBuilder::v5("broker.local", "sensor-hub")
//!     .port(8883)?
//!     .login("sensors", "secret")?
//!     .availability("devices/sensor-hub/state", "online", "offline", QoS::AtLeastOnce, true)?
//!     .auto_reconnect(1, 30)?
//!     .fast_build()
//!     .await?;
//! # let _ = connection;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::config::{
    Availability, Credentials, LastWill, MqttConfig, ReconnectPolicy, TlsMode, DEFAULT_ACK_TIMEOUT,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_PORT, DEFAULT_TLS_PORT,
    PERSISTENT_SESSION_EXPIRY_SECS,
};
use crate::connection::Connection;
use crate::error::{ConfigError, Error};
use crate::identity;
use crate::link::rumqtt::RumqttClient;
use crate::topic::validate_topic;
use crate::types::{ProtocolVersion, QoS};

/// Mutable accumulator for connection options.
#[derive(Debug, Clone)]
pub struct MqttBuilder {
    host: String,
    port: u16,
    keep_alive: Duration,
    credentials: Option<Credentials>,
    tls: TlsMode,
    last_will: Option<LastWill>,
    availability: Option<Availability>,
    reconnect: Option<ReconnectPolicy>,
    persistent_session: bool,
    session_expiry_override: Option<u32>,
    app_name: String,
    instance_id: Option<String>,
    protocol: ProtocolVersion,
    connect_timeout: Duration,
    ack_timeout: Duration,
}

impl MqttBuilder {
    fn new(host: &str, app_name: &str, protocol: ProtocolVersion) -> Self {
        MqttBuilder {
            host: host.to_string(),
            port: DEFAULT_PORT,
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            credentials: None,
            tls: TlsMode::None,
            last_will: None,
            availability: None,
            reconnect: None,
            persistent_session: false,
            session_expiry_override: None,
            app_name: app_name.to_string(),
            instance_id: None,
            protocol,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    /// Builder for an MQTT v3.1.1 connection.
    ///
    /// `app_name` must be stable per tool/service: it feeds client-id
    /// derivation. Format validation happens once during `build()`. When
    /// the same app can run more than once against one broker, set
    /// [`instance_id`](MqttBuilder::instance_id) as well.
    pub fn v3(host: &str, app_name: &str) -> Self {
        Self::new(host, app_name, ProtocolVersion::V3_1_1)
    }

    /// Builder for an MQTT v5 connection.
    pub fn v5(host: &str, app_name: &str) -> Self {
        Self::new(host, app_name, ProtocolVersion::V5)
    }

    /// Builder from a broker URL; `mqtt://` gives plain TCP, `mqtts://`
    /// enables TLS with the platform trust store, an explicit port
    /// overrides the scheme default. The protocol revision defaults to
    /// v3.1.1; chain [`protocol`](MqttBuilder::protocol) to change it.
    pub fn from_url(broker_url: &str, app_name: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;

        let mut builder = Self::new(host, app_name, ProtocolVersion::V3_1_1);
        match url.scheme() {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => {
                builder.tls = TlsMode::SystemDefault {
                    allow_insecure: false,
                };
                builder.port = DEFAULT_TLS_PORT;
            }
            _ => return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string())),
        }
        if let Some(port) = url.port() {
            builder.port = port;
        }
        Ok(builder)
    }

    /// Select the protocol revision (mostly for [`from_url`] chains).
    pub fn protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the broker port. Default: 1883.
    pub fn port(mut self, port: u32) -> Result<Self, ConfigError> {
        if port == 0 || port > u16::MAX as u32 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port as u16;
        Ok(self)
    }

    /// Keepalive interval in seconds for PINGREQ heartbeats. Default: 60.
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.keep_alive = Duration::from_secs(secs);
        self
    }

    /// Set username and password.
    pub fn login(mut self, username: &str, password: &str) -> Result<Self, ConfigError> {
        if username.is_empty() {
            return Err(ConfigError::EmptyUsername);
        }
        self.credentials = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
        Ok(self)
    }

    /// Enable TLS with the platform trust store.
    pub fn tls(mut self) -> Self {
        self.tls = TlsMode::SystemDefault {
            allow_insecure: false,
        };
        self
    }

    /// Enable TLS with the platform trust store, flagging that certificate
    /// checks may be relaxed where the transport supports it.
    pub fn tls_insecure(mut self) -> Self {
        self.tls = TlsMode::SystemDefault {
            allow_insecure: true,
        };
        self
    }

    /// Enable TLS trusting a custom CA bundle.
    ///
    /// The bundle must exist when the setter runs; `build()` re-checks it.
    pub fn own_tls(
        mut self,
        ca_path: impl Into<PathBuf>,
        allow_insecure: bool,
    ) -> Result<Self, ConfigError> {
        let ca_path = ca_path.into();
        if !ca_path.is_file() {
            return Err(ConfigError::CaBundleNotFound(ca_path));
        }
        self.tls = TlsMode::CustomCa {
            ca_path,
            allow_insecure,
        };
        Ok(self)
    }

    /// Set the Last Will and Testament.
    ///
    /// Will topics must be concrete: wildcards are rejected here. A later
    /// [`availability`](MqttBuilder::availability) call supersedes this
    /// will at build time.
    pub fn last_will(
        mut self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<Self, ConfigError> {
        check_topic(topic, "last will")?;
        self.last_will = Some(LastWill {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos,
            retain,
        });
        Ok(self)
    }

    /// Configure an availability topic.
    ///
    /// On every successful connect, `payload_online` is published to
    /// `topic` before user on_connect hooks run; right before a deliberate
    /// disconnect, `payload_offline` is published while the session is
    /// still live. `payload_offline` also becomes the Last Will for
    /// unclean disconnects, overriding any explicitly configured will
    /// regardless of call order.
    pub fn availability(
        mut self,
        topic: &str,
        payload_online: &str,
        payload_offline: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<Self, ConfigError> {
        check_topic(topic, "availability")?;
        self.availability = Some(Availability {
            topic: topic.to_string(),
            payload_online: payload_online.to_string(),
            payload_offline: payload_offline.to_string(),
            qos,
            retain,
        });
        Ok(self)
    }

    /// [`availability`](MqttBuilder::availability) with the conventional
    /// `online`/`offline` retained QoS 1 payloads.
    pub fn availability_defaults(self, topic: &str) -> Result<Self, ConfigError> {
        self.availability(topic, "online", "offline", QoS::AtLeastOnce, true)
    }

    /// Bound the transport's reconnect backoff, in seconds.
    pub fn auto_reconnect(mut self, min_delay: u64, max_delay: u64) -> Result<Self, ConfigError> {
        if min_delay == 0 || min_delay > max_delay {
            return Err(ConfigError::InvalidReconnectWindow {
                min: min_delay,
                max: max_delay,
            });
        }
        self.reconnect = Some(ReconnectPolicy {
            min_delay: Duration::from_secs(min_delay),
            max_delay: Duration::from_secs(max_delay),
        });
        Ok(self)
    }

    /// Separate parallel instances of the same app on one broker.
    ///
    /// Different instance ids derive different client ids, which avoids
    /// broker-side disconnect fights over a duplicated identity.
    pub fn instance_id(mut self, id: &str) -> Result<Self, ConfigError> {
        let normalized = identity::validation::validate_component(id, "instance_id")?;
        self.instance_id = Some(normalized);
        Ok(self)
    }

    /// Keep broker-side session state across disconnects.
    ///
    /// Under v3.1.1 this clears the clean-session flag; under v5 it clears
    /// clean-start and requests a 3600 second session expiry (override
    /// with [`session_expiry`](MqttBuilder::session_expiry)).
    pub fn persistent_session(mut self, persistent: bool) -> Self {
        self.persistent_session = persistent;
        self
    }

    /// Explicit v5 session expiry in seconds. Ignored under v3.1.1.
    pub fn session_expiry(mut self, secs: u32) -> Self {
        self.session_expiry_override = Some(secs);
        self
    }

    /// Bound for blocking [`connect`](Connection::connect). Default: 30 s.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound for acknowledgement waits on publishes. Default: 10 s.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Snapshot the accumulated options into an immutable configuration.
    ///
    /// Re-validates the full configuration and derives the client id from
    /// device facts plus app identity. The client id is intentionally not
    /// accepted as input anywhere on the builder.
    pub fn build_config(&self) -> Result<MqttConfig, ConfigError> {
        let client_id =
            identity::build_auto_client_id(&self.app_name, self.instance_id.as_deref())?;

        if let Some(will) = &self.last_will {
            check_topic(&will.topic, "last will")?;
        }
        if let Some(availability) = &self.availability {
            check_topic(&availability.topic, "availability")?;
        }
        if let TlsMode::CustomCa { ca_path, .. } = &self.tls {
            if !ca_path.is_file() {
                return Err(ConfigError::CaBundleNotFound(ca_path.clone()));
            }
        }
        if let Some(policy) = &self.reconnect {
            if policy.min_delay > policy.max_delay || policy.min_delay.is_zero() {
                return Err(ConfigError::InvalidReconnectWindow {
                    min: policy.min_delay.as_secs(),
                    max: policy.max_delay.as_secs(),
                });
            }
        }

        let default_expiry = if self.persistent_session {
            PERSISTENT_SESSION_EXPIRY_SECS
        } else {
            0
        };
        let session_expiry_secs = match self.protocol {
            ProtocolVersion::V3_1_1 => 0,
            ProtocolVersion::V5 => self.session_expiry_override.unwrap_or(default_expiry),
        };

        debug!(client_id = %client_id, "configuration snapshot built");
        Ok(MqttConfig {
            host: self.host.clone(),
            port: self.port,
            keep_alive: self.keep_alive,
            credentials: self.credentials.clone(),
            tls: self.tls.clone(),
            last_will: self.last_will.clone(),
            availability: self.availability.clone(),
            reconnect: self.reconnect,
            clean_session: !self.persistent_session,
            session_expiry_secs,
            app_name: self.app_name.clone(),
            instance_id: self.instance_id.clone(),
            protocol: self.protocol,
            client_id,
            connect_timeout: self.connect_timeout,
            ack_timeout: self.ack_timeout,
        })
    }

    /// Create the pre-configured connection without touching the network.
    ///
    /// Repeatable: every call re-validates and yields an independent
    /// [`Connection`].
    pub fn build(&self) -> Result<Connection, ConfigError> {
        let config = self.build_config()?;
        let client = RumqttClient::from_config(&config)?;
        Ok(Connection::with_client(config, Arc::new(client)))
    }

    /// [`build`](MqttBuilder::build), then connect and wait for the
    /// session to settle.
    pub async fn fast_build(&self) -> Result<Connection, Error> {
        let connection = self.build()?;
        connection.connect().await?;
        Ok(connection)
    }
}

fn check_topic(topic: &str, context: &'static str) -> Result<(), ConfigError> {
    validate_topic(topic).map_err(|reason| ConfigError::InvalidTopic { context, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_bounds_are_enforced() {
        assert!(matches!(
            MqttBuilder::v3("localhost", "agent").port(0),
            Err(ConfigError::InvalidPort(0))
        ));
        assert!(matches!(
            MqttBuilder::v3("localhost", "agent").port(70000),
            Err(ConfigError::InvalidPort(70000))
        ));
        assert!(MqttBuilder::v3("localhost", "agent").port(1883).is_ok());
    }

    #[test]
    fn login_rejects_empty_username() {
        assert!(matches!(
            MqttBuilder::v3("localhost", "agent").login("", "secret"),
            Err(ConfigError::EmptyUsername)
        ));
        let builder = MqttBuilder::v3("localhost", "agent")
            .login("user", "secret")
            .unwrap();
        let config = builder.build_config().unwrap();
        assert_eq!(config.credentials.unwrap().username, "user");
    }

    #[test]
    fn will_topics_must_be_concrete() {
        let builder = MqttBuilder::v3("localhost", "agent");
        assert!(builder.clone().last_will("", "x", QoS::AtMostOnce, false).is_err());
        assert!(builder
            .clone()
            .last_will("state/+", "x", QoS::AtMostOnce, false)
            .is_err());
        assert!(builder
            .clone()
            .last_will("state/#", "x", QoS::AtMostOnce, false)
            .is_err());
        assert!(builder.last_will("state", "x", QoS::AtMostOnce, false).is_ok());
    }

    #[test]
    fn availability_overrides_will_in_either_order() {
        let config = MqttBuilder::v3("localhost", "agent")
            .last_will("other", "x", QoS::AtMostOnce, false)
            .unwrap()
            .availability("t", "on", "off", QoS::AtLeastOnce, true)
            .unwrap()
            .build_config()
            .unwrap();
        let will = config.effective_last_will().unwrap();
        assert_eq!((will.topic.as_str(), will.payload.as_str()), ("t", "off"));

        let config = MqttBuilder::v3("localhost", "agent")
            .availability("t", "on", "off", QoS::AtLeastOnce, true)
            .unwrap()
            .last_will("other", "x", QoS::AtMostOnce, false)
            .unwrap()
            .build_config()
            .unwrap();
        let will = config.effective_last_will().unwrap();
        assert_eq!((will.topic.as_str(), will.payload.as_str()), ("t", "off"));
    }

    #[test]
    fn reconnect_window_is_validated() {
        assert!(MqttBuilder::v3("localhost", "agent").auto_reconnect(0, 30).is_err());
        assert!(MqttBuilder::v3("localhost", "agent").auto_reconnect(30, 1).is_err());
        let config = MqttBuilder::v3("localhost", "agent")
            .auto_reconnect(1, 30)
            .unwrap()
            .build_config()
            .unwrap();
        let policy = config.reconnect.unwrap();
        assert_eq!(policy.min_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn instance_id_is_validated_and_normalized() {
        assert!(MqttBuilder::v3("localhost", "agent").instance_id("").is_err());
        assert!(MqttBuilder::v3("localhost", "agent").instance_id("no spaces").is_err());
        let config = MqttBuilder::v3("localhost", "agent")
            .instance_id("Worker-1")
            .unwrap()
            .build_config()
            .unwrap();
        assert_eq!(config.instance_id.as_deref(), Some("worker-1"));
    }

    #[test]
    fn instance_id_separates_client_ids() {
        let plain = MqttBuilder::v3("localhost", "agent").build_config().unwrap();
        let instanced = MqttBuilder::v3("localhost", "agent")
            .instance_id("worker1")
            .unwrap()
            .build_config()
            .unwrap();
        assert_ne!(plain.client_id, instanced.client_id);
    }

    #[test]
    fn repeated_builds_derive_the_same_client_id() {
        let builder = MqttBuilder::v3("localhost", "agent");
        let first = builder.build_config().unwrap();
        let second = builder.build_config().unwrap();
        assert_eq!(first.client_id, second.client_id);
    }

    #[test]
    fn app_name_is_validated_at_build() {
        let builder = MqttBuilder::v3("localhost", "not valid!");
        assert!(matches!(
            builder.build_config(),
            Err(ConfigError::InvalidIdentityComponent { .. })
        ));
    }

    #[test]
    fn session_defaults_per_protocol() {
        let v3 = MqttBuilder::v3("localhost", "agent")
            .persistent_session(true)
            .build_config()
            .unwrap();
        assert!(!v3.clean_session);
        assert_eq!(v3.session_expiry_secs, 0);

        let v5 = MqttBuilder::v5("localhost", "agent")
            .persistent_session(true)
            .build_config()
            .unwrap();
        assert!(!v5.clean_session);
        assert_eq!(v5.session_expiry_secs, 3600);

        let v5_clean = MqttBuilder::v5("localhost", "agent").build_config().unwrap();
        assert!(v5_clean.clean_session);
        assert_eq!(v5_clean.session_expiry_secs, 0);

        let v5_override = MqttBuilder::v5("localhost", "agent")
            .persistent_session(true)
            .session_expiry(120)
            .build_config()
            .unwrap();
        assert_eq!(v5_override.session_expiry_secs, 120);
    }

    #[test]
    fn own_tls_requires_an_existing_bundle() {
        assert!(matches!(
            MqttBuilder::v3("localhost", "agent").own_tls("/missing/ca.pem", false),
            Err(ConfigError::CaBundleNotFound(_))
        ));

        let ca = tempfile::NamedTempFile::new().unwrap();
        let builder = MqttBuilder::v3("localhost", "agent")
            .own_tls(ca.path(), false)
            .unwrap();
        let config = builder.build_config().unwrap();
        assert!(matches!(config.tls, TlsMode::CustomCa { .. }));
    }

    #[test]
    fn build_recheck_catches_a_deleted_bundle() {
        let ca = tempfile::NamedTempFile::new().unwrap();
        let builder = MqttBuilder::v3("localhost", "agent")
            .own_tls(ca.path(), false)
            .unwrap();
        drop(ca);
        assert!(matches!(
            builder.build_config(),
            Err(ConfigError::CaBundleNotFound(_))
        ));
    }

    #[test]
    fn from_url_maps_scheme_to_port_and_tls() {
        let plain = MqttBuilder::from_url("mqtt://broker.local", "agent")
            .unwrap()
            .build_config()
            .unwrap();
        assert_eq!((plain.host.as_str(), plain.port), ("broker.local", 1883));
        assert!(!plain.tls.is_enabled());

        let secure = MqttBuilder::from_url("mqtts://broker.local", "agent")
            .unwrap()
            .build_config()
            .unwrap();
        assert_eq!(secure.port, 8883);
        assert!(secure.tls.is_enabled());

        let explicit = MqttBuilder::from_url("mqtt://broker.local:2883", "agent")
            .unwrap()
            .build_config()
            .unwrap();
        assert_eq!(explicit.port, 2883);

        assert!(MqttBuilder::from_url("broker.local", "agent").is_err());
        assert!(MqttBuilder::from_url("http://broker.local", "agent").is_err());
    }

    #[tokio::test]
    async fn build_yields_independent_connections() {
        let builder = MqttBuilder::v3("localhost", "agent");
        let first = builder.build().unwrap();
        let second = builder.build().unwrap();
        assert_eq!(first.client_id(), second.client_id());
    }
}
