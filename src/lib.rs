//! fluent-mqtt - fluent connection building and message handling over rumqttc
//!
//! A configuration/builder layer wrapped around [rumqttc]. The MQTT
//! protocol itself - handshake, packet framing, QoS retry state, TLS - is
//! rumqttc's job; this crate contributes the parts every MQTT application
//! re-implements around it:
//!
//! - a fluent, fail-fast [`MqttBuilder`] that snapshots auth, TLS, last
//!   will, availability announcements, reconnect bounds and session
//!   persistence into an immutable configuration
//! - deterministic client-id derivation from durable machine identity, so
//!   the same app on the same device always presents the same id
//! - a [`Connection`] wrapper with ordered lifecycle hooks (`on_connect`,
//!   `before_disconnect`, `on_disconnect`), per-filter message callbacks
//!   and QoS-aware acknowledgement waits
//! - availability orchestration: `online` published before your
//!   on_connect hooks run, `offline` published right before a deliberate
//!   disconnect and registered as the last will for unclean ones
//! - [`MqttMessage`], a lazy, cached view of inbound payloads with
//!   text/JSON/image/audio classification and fail-closed equality
//!
//! # Quick start
//!
//! ```no_run
//! use fluent_mqtt::{MqttBuilder, QoS};
//!
//! # async fn demo() -> Result<(), fluent_mqtt::Error> {
//! let connection = MqttBuilder::v5("broker.local", "sensor-hub")
//!     .login("sensors", "secret")?
//!     .availability_defaults("devices/sensor-hub/state")?
//!     .auto_reconnect(1, 30)?
//!     .fast_build()
//!     .await?;
//!
//! connection
//!     .subscribe("commands/#", QoS::AtLeastOnce, |message| {
//!         if let Ok(text) = message.text() {
//!             println!("{}: {text}", message.topic());
//!         }
//!     })
//!     .await?;
//!
//! connection.publish("status/boot", "ready", QoS::AtLeastOnce, false).await?;
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [rumqttc]: https://docs.rs/rumqttc

pub mod builder;
pub mod config;
pub mod connection;
pub mod error;
pub mod identity;
pub mod link;
pub mod logging;
pub mod message;
pub mod settings;
pub mod testing;
pub mod topic;
pub mod types;

pub use builder::MqttBuilder;
pub use config::{Availability, Credentials, LastWill, MqttConfig, ReconnectPolicy, TlsMode};
pub use connection::{Connection, LifecycleState, PublishOptions, SubscribeOptions};
pub use error::{
    ConfigError, ConnectionError, DecodeError, Error, PublishError, Result, SubscriptionError,
};
pub use link::{ConnectAck, DisconnectReason, MessageProperties, PublishProperties};
pub use message::{AudioFormat, Charset, ImageFormat, MqttMessage};
pub use settings::BrokerSettings;
pub use types::{ProtocolVersion, QoS, RetainHandling};
