//! File/environment configuration layer
//!
//! [`BrokerSettings`] is the serde shape for TOML configuration files.
//! Credentials are referenced indirectly through environment variable
//! names (`username_env`/`password_env`) so secrets never land in config
//! files. [`MqttBuilder::from_settings`] turns a parsed settings struct
//! into a regular builder chain.
//!
//! ```toml
//! host = "broker.local"
//! app_name = "sensor-hub"
//! protocol = "v5"
//! username_env = "MQTT_USER"
//! password_env = "MQTT_PASS"
//!
//! [availability]
//! topic = "devices/sensor-hub/state"
//!
//! [reconnect]
//! min_delay_secs = 1
//! max_delay_secs = 30
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::MqttBuilder;
use crate::error::ConfigError;
use crate::types::{ProtocolVersion, QoS};

/// Broker connection settings as read from a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub app_name: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub protocol: ProtocolVersion,
    /// Environment variable holding the username.
    #[serde(default)]
    pub username_env: Option<String>,
    /// Environment variable holding the password.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub persistent_session: bool,
    #[serde(default)]
    pub tls: Option<TlsSettings>,
    #[serde(default)]
    pub availability: Option<AvailabilitySettings>,
    #[serde(default)]
    pub reconnect: Option<ReconnectSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Custom CA bundle; the platform trust store is used when absent.
    #[serde(default)]
    pub ca_path: Option<PathBuf>,
    #[serde(default)]
    pub allow_insecure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySettings {
    pub topic: String,
    #[serde(default = "default_payload_online")]
    pub payload_online: String,
    #[serde(default = "default_payload_offline")]
    pub payload_offline: String,
    #[serde(default = "default_availability_qos")]
    pub qos: QoS,
    #[serde(default = "default_availability_retain")]
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectSettings {
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_payload_online() -> String {
    "online".to_string()
}

fn default_payload_offline() -> String {
    "offline".to_string()
}

fn default_availability_qos() -> QoS {
    QoS::AtLeastOnce
}

fn default_availability_retain() -> bool {
    true
}

impl BrokerSettings {
    /// Load settings from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::SettingsParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl MqttBuilder {
    /// Build a chain from parsed settings.
    ///
    /// Credentials are resolved from the environment: a configured
    /// `username_env` must be set, a missing `password_env` resolves to an
    /// empty password.
    pub fn from_settings(settings: &BrokerSettings) -> Result<MqttBuilder, ConfigError> {
        let mut builder = match settings.protocol {
            ProtocolVersion::V3_1_1 => MqttBuilder::v3(&settings.host, &settings.app_name),
            ProtocolVersion::V5 => MqttBuilder::v5(&settings.host, &settings.app_name),
        };

        builder = builder
            .port(settings.port as u32)?
            .keep_alive(settings.keep_alive_secs)
            .persistent_session(settings.persistent_session);

        if let Some(instance_id) = &settings.instance_id {
            builder = builder.instance_id(instance_id)?;
        }

        if let Some(username_env) = &settings.username_env {
            let username = std::env::var(username_env)
                .map_err(|_| ConfigError::MissingEnvVar(username_env.clone()))?;
            let password = settings
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            builder = builder.login(&username, &password)?;
        }

        if let Some(tls) = &settings.tls {
            builder = match &tls.ca_path {
                Some(ca_path) => builder.own_tls(ca_path, tls.allow_insecure)?,
                None if tls.allow_insecure => builder.tls_insecure(),
                None => builder.tls(),
            };
        }

        if let Some(availability) = &settings.availability {
            builder = builder.availability(
                &availability.topic,
                &availability.payload_online,
                &availability.payload_offline,
                availability.qos,
                availability.retain,
            )?;
        }

        if let Some(reconnect) = &settings.reconnect {
            builder = builder.auto_reconnect(reconnect.min_delay_secs, reconnect.max_delay_secs)?;
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_settings_apply_defaults() {
        let settings: BrokerSettings = toml::from_str(
            r#"
            host = "broker.local"
            app_name = "agent"
            "#,
        )
        .unwrap();

        assert_eq!(settings.port, 1883);
        assert_eq!(settings.keep_alive_secs, 60);
        assert_eq!(settings.protocol, ProtocolVersion::V3_1_1);
        assert!(settings.availability.is_none());

        let config = MqttBuilder::from_settings(&settings)
            .unwrap()
            .build_config()
            .unwrap();
        assert_eq!(config.host, "broker.local");
        assert!(config.clean_session);
    }

    #[test]
    fn full_settings_round_trip_into_a_config() {
        let settings: BrokerSettings = toml::from_str(
            r#"
            host = "broker.local"
            port = 2883
            app_name = "sensor-hub"
            instance_id = "worker1"
            protocol = "v5"
            persistent_session = true

            [availability]
            topic = "devices/sensor-hub/state"
            qos = 1

            [reconnect]
            min_delay_secs = 2
            max_delay_secs = 60
            "#,
        )
        .unwrap();

        let config = MqttBuilder::from_settings(&settings)
            .unwrap()
            .build_config()
            .unwrap();

        assert_eq!(config.port, 2883);
        assert_eq!(config.protocol, ProtocolVersion::V5);
        assert_eq!(config.session_expiry_secs, 3600);

        let availability = config.availability.as_ref().unwrap();
        assert_eq!(availability.payload_online, "online");
        assert_eq!(availability.payload_offline, "offline");
        assert_eq!(availability.qos, QoS::AtLeastOnce);
        assert!(availability.retain);

        let will = config.effective_last_will().unwrap();
        assert_eq!(will.topic, "devices/sensor-hub/state");
        assert_eq!(will.payload, "offline");
    }

    #[test]
    fn credentials_resolve_through_the_environment() {
        std::env::set_var("FLUENT_MQTT_TEST_USER", "sensors");
        let settings: BrokerSettings = toml::from_str(
            r#"
            host = "broker.local"
            app_name = "agent"
            username_env = "FLUENT_MQTT_TEST_USER"
            password_env = "FLUENT_MQTT_TEST_PASS_UNSET"
            "#,
        )
        .unwrap();

        let config = MqttBuilder::from_settings(&settings)
            .unwrap()
            .build_config()
            .unwrap();
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.username, "sensors");
        assert_eq!(credentials.password, "");
        std::env::remove_var("FLUENT_MQTT_TEST_USER");
    }

    #[test]
    fn missing_username_env_is_an_error() {
        let settings: BrokerSettings = toml::from_str(
            r#"
            host = "broker.local"
            app_name = "agent"
            username_env = "FLUENT_MQTT_TEST_NEVER_SET"
            "#,
        )
        .unwrap();

        assert!(matches!(
            MqttBuilder::from_settings(&settings),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn settings_load_from_a_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"broker.local\"\napp_name = \"agent\"").unwrap();

        let settings = BrokerSettings::from_toml_file(file.path()).unwrap();
        assert_eq!(settings.host, "broker.local");

        assert!(matches!(
            BrokerSettings::from_toml_file("/missing/settings.toml"),
            Err(ConfigError::SettingsIo { .. })
        ));

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        writeln!(broken, "host = [not toml").unwrap();
        assert!(matches!(
            BrokerSettings::from_toml_file(broken.path()),
            Err(ConfigError::SettingsParse { .. })
        ));
    }

    #[test]
    fn invalid_settings_fail_through_builder_validation() {
        let settings: BrokerSettings = toml::from_str(
            r#"
            host = "broker.local"
            app_name = "agent"

            [reconnect]
            min_delay_secs = 30
            max_delay_secs = 1
            "#,
        )
        .unwrap();

        assert!(matches!(
            MqttBuilder::from_settings(&settings),
            Err(ConfigError::InvalidReconnectWindow { .. })
        ));
    }
}
