//! rumqttc-backed protocol client drivers
//!
//! One driver per protocol revision. Each assembles rumqttc options from the
//! immutable [`MqttConfig`], owns the event loop until [`start`] takes it,
//! and translates rumqttc events into the crate-local [`LinkEvent`] stream.
//! Reconnect timing lives here too: rumqttc redials on the next `poll()`
//! after an error, and the driver paces those retries inside the configured
//! min/max window.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{MqttConfig, ReconnectPolicy, TlsMode};
use crate::error::ConfigError;
use crate::link::{
    ConnectAck, DisconnectReason, InboundMessage, LinkContext, LinkError, LinkEvent,
    MessageProperties, NegotiatedProperties, OutboundMessage, ProtocolClient, SubscribeRequest,
};
use crate::types::{ProtocolVersion, RetainHandling};

/// Request-queue capacity handed to rumqttc.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Accept payloads up to 256 KiB in either direction.
const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// rumqttc-backed [`ProtocolClient`], tagged by protocol revision.
pub enum RumqttClient {
    V3 {
        client: rumqttc::AsyncClient,
        event_loop: StdMutex<Option<rumqttc::EventLoop>>,
        reconnect: Option<ReconnectPolicy>,
    },
    V5 {
        client: rumqttc::v5::AsyncClient,
        event_loop: StdMutex<Option<rumqttc::v5::EventLoop>>,
        reconnect: Option<ReconnectPolicy>,
    },
}

impl RumqttClient {
    /// Build a pre-configured client from a configuration snapshot.
    ///
    /// The network is not touched here; nothing happens until the driver is
    /// started and its event loop polled.
    pub fn from_config(config: &MqttConfig) -> Result<Self, ConfigError> {
        match config.protocol {
            ProtocolVersion::V3_1_1 => {
                let options = configure_v3_options(config)?;
                let (client, event_loop) =
                    rumqttc::AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
                Ok(RumqttClient::V3 {
                    client,
                    event_loop: StdMutex::new(Some(event_loop)),
                    reconnect: config.reconnect,
                })
            }
            ProtocolVersion::V5 => {
                let options = configure_v5_options(config)?;
                let (client, event_loop) =
                    rumqttc::v5::AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
                Ok(RumqttClient::V5 {
                    client,
                    event_loop: StdMutex::new(Some(event_loop)),
                    reconnect: config.reconnect,
                })
            }
        }
    }
}

/// Assemble v3.1.1 options from the snapshot.
fn configure_v3_options(config: &MqttConfig) -> Result<rumqttc::MqttOptions, ConfigError> {
    let mut options = rumqttc::MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(config.clean_session);
    options.set_max_packet_size(MAX_PACKET_SIZE as usize, MAX_PACKET_SIZE as usize);

    if let Some(credentials) = &config.credentials {
        options.set_credentials(&credentials.username, &credentials.password);
    }

    if let Some(transport) = tls_transport(&config.tls)? {
        options.set_transport(transport);
    }

    if let Some(will) = config.effective_last_will() {
        options.set_last_will(rumqttc::LastWill::new(
            &will.topic,
            will.payload.clone(),
            will.qos.into(),
            will.retain,
        ));
    }

    Ok(options)
}

/// Assemble v5 options from the snapshot.
fn configure_v5_options(config: &MqttConfig) -> Result<rumqttc::v5::MqttOptions, ConfigError> {
    use rumqttc::v5::mqttbytes::v5::{ConnectProperties, LastWill};

    let mut options = rumqttc::v5::MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_start(config.clean_session);
    options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    if let Some(credentials) = &config.credentials {
        options.set_credentials(&credentials.username, &credentials.password);
    }

    if let Some(transport) = tls_transport(&config.tls)? {
        options.set_transport(transport);
    }

    if config.session_expiry_secs > 0 {
        options.set_connect_properties(ConnectProperties {
            session_expiry_interval: Some(config.session_expiry_secs),
            ..Default::default()
        });
    }

    if let Some(will) = config.effective_last_will() {
        options.set_last_will(LastWill::new(
            &will.topic,
            will.payload.clone(),
            will.qos.into(),
            will.retain,
            None,
        ));
    }

    Ok(options)
}

/// Map the configured TLS mode onto a rumqttc transport.
fn tls_transport(tls: &TlsMode) -> Result<Option<rumqttc::Transport>, ConfigError> {
    match tls {
        TlsMode::None => Ok(None),
        TlsMode::SystemDefault { allow_insecure } => {
            warn_if_insecure(*allow_insecure);
            Ok(Some(rumqttc::Transport::tls_with_default_config()))
        }
        TlsMode::CustomCa {
            ca_path,
            allow_insecure,
        } => {
            let ca = std::fs::read(ca_path).map_err(|source| ConfigError::CaBundleUnreadable {
                path: ca_path.clone(),
                source,
            })?;
            warn_if_insecure(*allow_insecure);
            Ok(Some(rumqttc::Transport::Tls(
                rumqttc::TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth: None,
                },
            )))
        }
    }
}

fn warn_if_insecure(allow_insecure: bool) {
    if allow_insecure {
        // rumqttc's bundled rustls transport has no verification bypass;
        // certificates stay fully verified despite the flag.
        warn!("allow_insecure is set but certificate verification remains enabled");
    }
}

#[async_trait::async_trait]
impl ProtocolClient for RumqttClient {
    async fn publish(&self, message: OutboundMessage) -> Result<(), LinkError> {
        match self {
            RumqttClient::V3 { client, .. } => client
                .publish(
                    &message.topic,
                    message.qos.into(),
                    message.retain,
                    message.payload.to_vec(),
                )
                .await
                .map_err(|e| LinkError::Request(e.to_string())),
            RumqttClient::V5 { client, .. } => {
                match message.properties.as_ref().filter(|p| !p.is_empty()) {
                    Some(props) => client
                        .publish_with_properties(
                            &message.topic,
                            message.qos.into(),
                            message.retain,
                            message.payload.to_vec(),
                            to_rumqtt_publish_properties(props),
                        )
                        .await
                        .map_err(|e| LinkError::Request(e.to_string())),
                    None => client
                        .publish(
                            &message.topic,
                            message.qos.into(),
                            message.retain,
                            message.payload.to_vec(),
                        )
                        .await
                        .map_err(|e| LinkError::Request(e.to_string())),
                }
            }
        }
    }

    fn try_publish(&self, message: OutboundMessage) -> Result<(), LinkError> {
        match self {
            RumqttClient::V3 { client, .. } => client
                .try_publish(
                    &message.topic,
                    message.qos.into(),
                    message.retain,
                    message.payload.to_vec(),
                )
                .map_err(|e| LinkError::Request(e.to_string())),
            RumqttClient::V5 { client, .. } => client
                .try_publish(
                    &message.topic,
                    message.qos.into(),
                    message.retain,
                    message.payload.to_vec(),
                )
                .map_err(|e| LinkError::Request(e.to_string())),
        }
    }

    async fn subscribe(&self, request: SubscribeRequest) -> Result<(), LinkError> {
        match self {
            // v5-only options are ignored under v3 rather than erroring
            RumqttClient::V3 { client, .. } => client
                .subscribe(&request.filter, request.qos.into())
                .await
                .map_err(|e| LinkError::Request(e.to_string())),
            RumqttClient::V5 { client, .. } => {
                use rumqttc::v5::mqttbytes::v5::Filter;

                let mut filter = Filter::new(&request.filter, request.qos.into());
                filter.nolocal = request.no_local;
                filter.preserve_retain = request.retain_as_published;
                filter.retain_forward_rule = to_rumqtt_retain_rule(request.retain_handling);
                client
                    .subscribe_many([filter])
                    .await
                    .map_err(|e| LinkError::Request(e.to_string()))
            }
        }
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), LinkError> {
        match self {
            RumqttClient::V3 { client, .. } => client
                .unsubscribe(filter)
                .await
                .map_err(|e| LinkError::Request(e.to_string())),
            RumqttClient::V5 { client, .. } => client
                .unsubscribe(filter)
                .await
                .map_err(|e| LinkError::Request(e.to_string())),
        }
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        match self {
            RumqttClient::V3 { client, .. } => client
                .disconnect()
                .await
                .map_err(|e| LinkError::Request(e.to_string())),
            RumqttClient::V5 { client, .. } => client
                .disconnect()
                .await
                .map_err(|e| LinkError::Request(e.to_string())),
        }
    }

    fn start(&self, link: LinkContext) -> Result<JoinHandle<()>, LinkError> {
        match self {
            RumqttClient::V3 {
                event_loop,
                reconnect,
                ..
            } => {
                let event_loop = event_loop
                    .lock()
                    .expect("event loop lock")
                    .take()
                    .ok_or(LinkError::AlreadyStarted)?;
                let reconnect = *reconnect;
                Ok(tokio::spawn(run_v3_loop(
                    event_loop,
                    link.events,
                    link.shutdown,
                    reconnect,
                )))
            }
            RumqttClient::V5 {
                event_loop,
                reconnect,
                ..
            } => {
                let event_loop = event_loop
                    .lock()
                    .expect("event loop lock")
                    .take()
                    .ok_or(LinkError::AlreadyStarted)?;
                let reconnect = *reconnect;
                Ok(tokio::spawn(run_v5_loop(
                    event_loop,
                    link.events,
                    link.shutdown,
                    reconnect,
                )))
            }
        }
    }
}

/// Poll loop for the v3.1.1 event loop.
async fn run_v3_loop(
    mut event_loop: rumqttc::EventLoop,
    events: mpsc::Sender<LinkEvent>,
    mut shutdown: watch::Receiver<bool>,
    reconnect: Option<ReconnectPolicy>,
) {
    info!("mqtt v3 driver started");
    let mut backoff = Backoff::new(reconnect);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("shutdown signal received, stopping v3 driver");
                    break;
                }
            }
            polled = event_loop.poll() => {
                match polled {
                    Ok(event) => {
                        if let Some(link_event) = route_v3_event(&event) {
                            if matches!(link_event, LinkEvent::Connected(_)) {
                                backoff.reset();
                            }
                            if events.send(link_event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        error!("mqtt v3 event loop error: {err}");
                        let _ = events
                            .send(LinkEvent::Disconnected(DisconnectReason::Transport {
                                message: err.to_string(),
                            }))
                            .await;
                        if !backoff.pause(&mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }
    }
    info!("mqtt v3 driver stopped");
}

/// Poll loop for the v5 event loop.
async fn run_v5_loop(
    mut event_loop: rumqttc::v5::EventLoop,
    events: mpsc::Sender<LinkEvent>,
    mut shutdown: watch::Receiver<bool>,
    reconnect: Option<ReconnectPolicy>,
) {
    info!("mqtt v5 driver started");
    let mut backoff = Backoff::new(reconnect);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("shutdown signal received, stopping v5 driver");
                    break;
                }
            }
            polled = event_loop.poll() => {
                match polled {
                    Ok(event) => {
                        if let Some(link_event) = route_v5_event(&event) {
                            if matches!(link_event, LinkEvent::Connected(_)) {
                                backoff.reset();
                            }
                            if events.send(link_event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        error!("mqtt v5 event loop error: {err}");
                        let _ = events
                            .send(LinkEvent::Disconnected(DisconnectReason::Transport {
                                message: err.to_string(),
                            }))
                            .await;
                        if !backoff.pause(&mut shutdown).await {
                            break;
                        }
                    }
                }
            }
        }
    }
    info!("mqtt v5 driver stopped");
}

/// Translate a rumqttc v3 event into a link event.
fn route_v3_event(event: &rumqttc::Event) -> Option<LinkEvent> {
    use rumqttc::{Event, Outgoing, Packet};

    match event {
        Event::Incoming(Packet::ConnAck(ack)) => Some(LinkEvent::Connected(ConnectAck::V3 {
            session_present: ack.session_present,
        })),
        Event::Incoming(Packet::Publish(publish)) => Some(LinkEvent::Message(InboundMessage {
            topic: publish.topic.clone(),
            payload: publish.payload.clone(),
            qos: publish.qos.into(),
            retain: publish.retain,
            properties: None,
        })),
        Event::Incoming(Packet::PubAck(ack)) => Some(LinkEvent::PubAcked(ack.pkid)),
        Event::Incoming(Packet::PubComp(comp)) => Some(LinkEvent::PubCompleted(comp.pkid)),
        Event::Incoming(Packet::Disconnect) => {
            Some(LinkEvent::Disconnected(DisconnectReason::Broker {
                reason: None,
            }))
        }
        Event::Incoming(other) => {
            trace!(target: "mqtt_link", "v3 event: {other:?}");
            None
        }
        Event::Outgoing(Outgoing::Publish(pkid)) => Some(LinkEvent::PubQueued(*pkid)),
        Event::Outgoing(_) => None,
    }
}

/// Translate a rumqttc v5 event into a link event.
fn route_v5_event(event: &rumqttc::v5::Event) -> Option<LinkEvent> {
    use rumqttc::v5::mqttbytes::v5::Packet;
    use rumqttc::v5::Event;
    use rumqttc::Outgoing;

    match event {
        Event::Incoming(Packet::ConnAck(ack)) => Some(LinkEvent::Connected(ConnectAck::V5 {
            session_present: ack.session_present,
            properties: ack.properties.as_ref().map(to_negotiated_properties),
        })),
        Event::Incoming(Packet::Publish(publish)) => Some(LinkEvent::Message(InboundMessage {
            topic: String::from_utf8_lossy(&publish.topic).to_string(),
            payload: publish.payload.clone(),
            qos: publish.qos.into(),
            retain: publish.retain,
            properties: publish.properties.as_ref().map(to_message_properties),
        })),
        Event::Incoming(Packet::PubAck(ack)) => Some(LinkEvent::PubAcked(ack.pkid)),
        Event::Incoming(Packet::PubComp(comp)) => Some(LinkEvent::PubCompleted(comp.pkid)),
        Event::Incoming(Packet::Disconnect(disconnect)) => {
            Some(LinkEvent::Disconnected(DisconnectReason::Broker {
                reason: Some(format!("{:?}", disconnect.reason_code)),
            }))
        }
        Event::Incoming(other) => {
            trace!(target: "mqtt_link", "v5 event: {other:?}");
            None
        }
        Event::Outgoing(Outgoing::Publish(pkid)) => Some(LinkEvent::PubQueued(*pkid)),
        Event::Outgoing(_) => None,
    }
}

fn to_negotiated_properties(
    props: &rumqttc::v5::mqttbytes::v5::ConnAckProperties,
) -> NegotiatedProperties {
    NegotiatedProperties {
        session_expiry_interval: props.session_expiry_interval,
        assigned_client_id: props.assigned_client_identifier.clone(),
        server_keep_alive: props.server_keep_alive,
        reason_string: props.reason_string.clone(),
        user_properties: props.user_properties.clone(),
    }
}

fn to_message_properties(
    props: &rumqttc::v5::mqttbytes::v5::PublishProperties,
) -> MessageProperties {
    MessageProperties {
        message_expiry_interval: props.message_expiry_interval,
        content_type: props.content_type.clone(),
        response_topic: props.response_topic.clone(),
        correlation_data: props.correlation_data.as_ref().map(|data| data.to_vec()),
        user_properties: props.user_properties.clone(),
    }
}

fn to_rumqtt_publish_properties(
    props: &crate::link::PublishProperties,
) -> rumqttc::v5::mqttbytes::v5::PublishProperties {
    rumqttc::v5::mqttbytes::v5::PublishProperties {
        message_expiry_interval: props.message_expiry_interval,
        content_type: props.content_type.clone(),
        response_topic: props.response_topic.clone(),
        correlation_data: props.correlation_data.clone().map(bytes::Bytes::from),
        user_properties: props.user_properties.clone(),
        ..Default::default()
    }
}

fn to_rumqtt_retain_rule(
    handling: RetainHandling,
) -> rumqttc::v5::mqttbytes::v5::RetainForwardRule {
    use rumqttc::v5::mqttbytes::v5::RetainForwardRule;
    match handling {
        RetainHandling::SendAll => RetainForwardRule::OnEverySubscribe,
        RetainHandling::SendIfNew => RetainForwardRule::OnNewSubscribe,
        RetainHandling::DontSend => RetainForwardRule::Never,
    }
}

/// Retry pacing between redial attempts.
///
/// Doubles from the configured minimum up to the maximum; without a policy
/// the first failure is terminal.
struct Backoff {
    policy: Option<ReconnectPolicy>,
    next_delay: Duration,
}

impl Backoff {
    fn new(policy: Option<ReconnectPolicy>) -> Self {
        let next_delay = policy.map(|p| p.min_delay).unwrap_or_default();
        Self { policy, next_delay }
    }

    fn reset(&mut self) {
        if let Some(policy) = self.policy {
            self.next_delay = policy.min_delay;
        }
    }

    /// Sleep before the next redial. Returns `false` when the driver should
    /// stop (no policy, or shutdown requested mid-sleep).
    async fn pause(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let Some(policy) = self.policy else {
            return false;
        };
        if *shutdown.borrow() {
            return false;
        }

        let delay = self.next_delay;
        self.next_delay = (delay * 2).min(policy.max_delay);
        info!("reconnecting in {delay:?}");

        tokio::select! {
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
