//! Mock protocol client for broker-free tests
//!
//! [`MockClient`] records every call into a shared, ordered journal and
//! lets tests script the event stream: automatic ConnAck on start,
//! automatic acknowledgements for QoS > 0 publishes, and on-demand
//! injection of inbound messages or disconnects. Hook closures can push
//! into the same journal, which makes ordering assertions across
//! publishes, hooks and disconnects exact.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::link::{
    ConnectAck, DisconnectReason, InboundMessage, LinkContext, LinkError, LinkEvent,
    OutboundMessage, ProtocolClient, SubscribeRequest,
};
use crate::types::QoS;

/// Shared, ordered record of everything the mock saw.
pub type Journal = Arc<StdMutex<Vec<String>>>;

/// Scripted [`ProtocolClient`] implementation.
pub struct MockClient {
    journal: Journal,
    events: StdMutex<Option<mpsc::Sender<LinkEvent>>>,
    connack_on_start: Option<ConnectAck>,
    auto_ack: bool,
    should_fail: bool,
    next_pkid: AtomicU16,
    started: AtomicBool,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    /// Mock that acknowledges the connection on start and every QoS > 0
    /// publish immediately.
    pub fn new() -> Self {
        MockClient {
            journal: Arc::new(StdMutex::new(Vec::new())),
            events: StdMutex::new(None),
            connack_on_start: Some(ConnectAck::V3 {
                session_present: false,
            }),
            auto_ack: true,
            should_fail: false,
            next_pkid: AtomicU16::new(1),
            started: AtomicBool::new(false),
        }
    }

    /// Use a specific ConnAck (e.g. a v5 one with properties).
    pub fn with_connack(mut self, ack: ConnectAck) -> Self {
        self.connack_on_start = Some(ack);
        self
    }

    /// Do not acknowledge the connection on start; tests drive it via
    /// [`emit_connected`](MockClient::emit_connected).
    pub fn manual_connect(mut self) -> Self {
        self.connack_on_start = None;
        self
    }

    /// Never acknowledge publishes; ack waits run into their timeout.
    pub fn withhold_acks(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    /// Fail every transport request.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Handle to the shared journal for ordering assertions.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Snapshot of the journal entries so far.
    pub fn journal_entries(&self) -> Vec<String> {
        self.journal.lock().expect("journal lock").clone()
    }

    /// Append a marker from test code (hooks typically record themselves).
    pub fn record(journal: &Journal, entry: impl Into<String>) {
        journal.lock().expect("journal lock").push(entry.into());
    }

    fn sender(&self) -> Option<mpsc::Sender<LinkEvent>> {
        self.events.lock().expect("events lock").clone()
    }

    /// Inject an inbound application message.
    pub async fn deliver(&self, topic: &str, payload: impl Into<Bytes>, qos: QoS, retain: bool) {
        let sender = self.sender().expect("driver not started");
        sender
            .send(LinkEvent::Message(InboundMessage {
                topic: topic.to_string(),
                payload: payload.into(),
                qos,
                retain,
                properties: None,
            }))
            .await
            .expect("event channel closed");
    }

    /// Inject a connection acknowledgement.
    pub async fn emit_connected(&self, ack: ConnectAck) {
        let sender = self.sender().expect("driver not started");
        sender
            .send(LinkEvent::Connected(ack))
            .await
            .expect("event channel closed");
    }

    /// Inject an unsolicited disconnect (broker or transport initiated).
    pub async fn emit_disconnected(&self, reason: DisconnectReason) {
        let sender = self.sender().expect("driver not started");
        sender
            .send(LinkEvent::Disconnected(reason))
            .await
            .expect("event channel closed");
    }

    fn record_publish(&self, message: &OutboundMessage) {
        let payload = String::from_utf8_lossy(&message.payload);
        Self::record(
            &self.journal,
            format!("publish {} {}", message.topic, payload),
        );
    }

    fn ack_publish(&self, qos: QoS) {
        if qos == QoS::AtMostOnce || !self.auto_ack {
            return;
        }
        let Some(sender) = self.sender() else {
            return;
        };
        let pkid = self.next_pkid.fetch_add(1, Ordering::SeqCst);
        let settle = match qos {
            QoS::AtLeastOnce => LinkEvent::PubAcked(pkid),
            QoS::ExactlyOnce => LinkEvent::PubCompleted(pkid),
            QoS::AtMostOnce => unreachable!(),
        };
        // try_send keeps this callable from sync contexts; the event
        // channel is far larger than any test's traffic.
        let _ = sender.try_send(LinkEvent::PubQueued(pkid));
        let _ = sender.try_send(settle);
    }
}

#[async_trait::async_trait]
impl ProtocolClient for MockClient {
    async fn publish(&self, message: OutboundMessage) -> Result<(), LinkError> {
        if self.should_fail {
            return Err(LinkError::Request("mock publish failure".to_string()));
        }
        self.record_publish(&message);
        self.ack_publish(message.qos);
        Ok(())
    }

    fn try_publish(&self, message: OutboundMessage) -> Result<(), LinkError> {
        if self.should_fail {
            return Err(LinkError::Request("mock publish failure".to_string()));
        }
        self.record_publish(&message);
        self.ack_publish(message.qos);
        Ok(())
    }

    async fn subscribe(&self, request: SubscribeRequest) -> Result<(), LinkError> {
        if self.should_fail {
            return Err(LinkError::Request("mock subscribe failure".to_string()));
        }
        Self::record(&self.journal, format!("subscribe {}", request.filter));
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), LinkError> {
        if self.should_fail {
            return Err(LinkError::Request("mock unsubscribe failure".to_string()));
        }
        Self::record(&self.journal, format!("unsubscribe {filter}"));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        Self::record(&self.journal, "disconnect".to_string());
        Ok(())
    }

    fn start(&self, link: LinkContext) -> Result<JoinHandle<()>, LinkError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LinkError::AlreadyStarted);
        }
        *self.events.lock().expect("events lock") = Some(link.events.clone());

        let connack = self.connack_on_start.clone();
        let events = link.events;
        let mut shutdown = link.shutdown;
        Ok(tokio::spawn(async move {
            if let Some(ack) = connack {
                let _ = events.send(LinkEvent::Connected(ack)).await;
            }
            loop {
                if shutdown.changed().await.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }))
    }
}
