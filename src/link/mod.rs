//! Narrow seam over the underlying protocol client
//!
//! The connection core never touches rumqttc directly: it talks to a
//! [`ProtocolClient`] and consumes the [`LinkEvent`] stream its driver
//! produces. This keeps the v3/v5 duality and all wire concerns inside
//! [`rumqtt`], and lets tests substitute a scripted client.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::types::{QoS, RetainHandling};

pub mod rumqtt;

/// Publish-side MQTT v5 properties.
///
/// Accepted for every protocol version; the v3 driver drops them instead of
/// erroring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub user_properties: Vec<(String, String)>,
}

impl PublishProperties {
    pub fn is_empty(&self) -> bool {
        *self == PublishProperties::default()
    }
}

/// Properties attached to an inbound v5 publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub user_properties: Vec<(String, String)>,
}

/// Negotiated v5 connection properties surfaced to on_connect hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegotiatedProperties {
    pub session_expiry_interval: Option<u32>,
    pub assigned_client_id: Option<String>,
    pub server_keep_alive: Option<u16>,
    pub reason_string: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

/// Connection acknowledgement metadata, tagged by protocol version.
///
/// v3 and v5 hooks see different transport metadata; the tag keeps both
/// shapes statically typed instead of one loosely-filled struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectAck {
    V3 {
        session_present: bool,
    },
    V5 {
        session_present: bool,
        properties: Option<NegotiatedProperties>,
    },
}

impl ConnectAck {
    pub fn session_present(&self) -> bool {
        match self {
            ConnectAck::V3 { session_present } | ConnectAck::V5 { session_present, .. } => {
                *session_present
            }
        }
    }

    pub fn properties(&self) -> Option<&NegotiatedProperties> {
        match self {
            ConnectAck::V3 { .. } => None,
            ConnectAck::V5 { properties, .. } => properties.as_ref(),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Deliberate disconnect or close on this side.
    ClientRequested,
    /// The broker sent a DISCONNECT packet.
    Broker { reason: Option<String> },
    /// The transport failed (network, TLS, refused connection).
    Transport { message: String },
}

/// Inbound application message before wrapping.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub properties: Option<MessageProperties>,
}

/// Event stream from the driver task to the connection core.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// ConnAck received; the session is live.
    Connected(ConnectAck),
    /// Application message received on a subscribed topic.
    Message(InboundMessage),
    /// The session ended (deliberately or not).
    Disconnected(DisconnectReason),
    /// The transport assigned a packet id to an outgoing QoS>0 publish.
    PubQueued(u16),
    /// PUBACK received for a QoS 1 publish.
    PubAcked(u16),
    /// PUBCOMP received for a QoS 2 publish.
    PubCompleted(u16),
}

/// Outgoing publish request.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub properties: Option<PublishProperties>,
}

/// Subscription request with v5 options.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    pub filter: String,
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

/// Failure inside the protocol client collaborator.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport request failed: {0}")]
    Request(String),

    #[error("transport request queue is full")]
    Busy,

    #[error("driver already started")]
    AlreadyStarted,
}

/// Channels handed to the driver when the connection starts.
pub struct LinkContext {
    /// Driver-to-core event stream.
    pub events: mpsc::Sender<LinkEvent>,
    /// Set to `true` when the connection shuts down.
    pub shutdown: watch::Receiver<bool>,
}

/// Capability surface this crate needs from a native MQTT client.
///
/// The connection wrapper configures, publishes and subscribes through this
/// trait only; protocol framing, QoS retry state and TLS live behind it.
#[async_trait::async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Enqueue a publish. Returns once the request is accepted by the
    /// transport queue; acknowledgement is reported via [`LinkEvent`]s.
    async fn publish(&self, message: OutboundMessage) -> Result<(), LinkError>;

    /// Non-blocking publish for hook contexts running on the event task.
    fn try_publish(&self, message: OutboundMessage) -> Result<(), LinkError>;

    async fn subscribe(&self, request: SubscribeRequest) -> Result<(), LinkError>;

    async fn unsubscribe(&self, filter: &str) -> Result<(), LinkError>;

    /// Send the protocol-level DISCONNECT.
    async fn disconnect(&self) -> Result<(), LinkError>;

    /// Spawn the driver task feeding [`LinkEvent`]s into `link.events`.
    ///
    /// Single-flight: a second call fails with [`LinkError::AlreadyStarted`].
    fn start(&self, link: LinkContext) -> Result<JoinHandle<()>, LinkError>;
}
