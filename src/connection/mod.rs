//! Connection wrapper, lifecycle hooks and availability orchestration
//!
//! A [`Connection`] owns one configured session over the underlying
//! protocol client. It tracks lifecycle state through a watch channel,
//! fires hooks in registration order on the event task, dispatches inbound
//! messages to per-filter callbacks, and, when availability is configured,
//! announces `online` after every connect and `offline` before every
//! deliberate disconnect, with the `offline` payload doubling as the LWT
//! for unclean ones.
//!
//! Ordering guarantees:
//! - the availability `online` publish is queued before any on_connect hook
//!   runs, so hooks observe a connection that has already announced itself;
//! - deliberate shutdown runs before_disconnect hooks, then the `offline`
//!   publish, then the protocol-level disconnect, then on_disconnect hooks.

mod acks;
mod dispatch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::error::{ConnectionError, PublishError, SubscriptionError};
use crate::link::{
    ConnectAck, DisconnectReason, InboundMessage, LinkContext, LinkEvent, OutboundMessage,
    ProtocolClient, PublishProperties, SubscribeRequest,
};
use crate::message::MqttMessage;
use crate::topic::{validate_filter, validate_topic};
use crate::types::{QoS, RetainHandling};

use acks::{AckKind, AckOutcome, AckTable};
use dispatch::SubscriptionTable;

/// How long a deliberate close waits for background tasks before aborting.
const TASK_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Capacity of the driver-to-core event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of one connection.
///
/// `Unbuilt` is the builder phase; a constructed connection starts at
/// `Built`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unbuilt,
    Built,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Closed,
}

/// Options for a single publish.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub qos: QoS,
    pub retain: bool,
    /// Suspend until the broker acknowledges delivery for the QoS level
    /// (no wait for QoS 0, PUBACK for QoS 1, PUBCOMP for QoS 2).
    pub wait_for_publish: bool,
    /// v5 publish properties; ignored under v3.
    pub properties: Option<PublishProperties>,
}

/// Options for a single subscription.
///
/// Everything besides `qos` is only meaningful under protocol v5 and is
/// ignored, not rejected, under v3.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

type ConnectHook = Arc<dyn Fn(&Connection, &ConnectAck) + Send + Sync>;
type BeforeDisconnectHook = Arc<dyn Fn(&Connection) + Send + Sync>;
type DisconnectHook = Arc<dyn Fn(&Connection, &DisconnectReason) + Send + Sync>;

struct TaskHandles {
    driver: Option<JoinHandle<()>>,
    core: Option<JoinHandle<()>>,
}

struct Shared {
    config: MqttConfig,
    client: Arc<dyn ProtocolClient>,
    state_tx: watch::Sender<LifecycleState>,
    state_rx: watch::Receiver<LifecycleState>,
    on_connect: StdMutex<Vec<ConnectHook>>,
    before_disconnect: StdMutex<Vec<BeforeDisconnectHook>>,
    on_disconnect: StdMutex<Vec<DisconnectHook>>,
    subscriptions: StdMutex<SubscriptionTable>,
    acks: StdMutex<AckTable>,
    last_disconnect: StdMutex<Option<DisconnectReason>>,
    /// Keeps ack-waiter registration aligned with transport enqueue order.
    publish_order: Mutex<()>,
    /// Serializes the before_disconnect → offline → disconnect →
    /// on_disconnect sequence.
    teardown: Mutex<()>,
    handles: StdMutex<TaskHandles>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    started: AtomicBool,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // No async work possible here; signal the tasks and abort whatever
        // is still running. Graceful shutdown is close()'s job.
        let _ = self.shutdown_tx.send(true);
        let mut handles = self.handles.lock().expect("handles lock");
        if let Some(handle) = handles.driver.take() {
            handle.abort();
        }
        if let Some(handle) = handles.core.take() {
            handle.abort();
        }
    }
}

/// Handle to one configured MQTT session.
///
/// Cheap to clone; all clones address the same session. Produced by
/// [`MqttBuilder::build`](crate::builder::MqttBuilder::build).
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Wrap a pre-configured protocol client.
    ///
    /// `build()` calls this with the rumqttc-backed client; tests and
    /// custom transports can inject any [`ProtocolClient`].
    pub fn with_client(config: MqttConfig, client: Arc<dyn ProtocolClient>) -> Self {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Built);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Connection {
            shared: Arc::new(Shared {
                config,
                client,
                state_tx,
                state_rx,
                on_connect: StdMutex::new(Vec::new()),
                before_disconnect: StdMutex::new(Vec::new()),
                on_disconnect: StdMutex::new(Vec::new()),
                subscriptions: StdMutex::new(SubscriptionTable::default()),
                acks: StdMutex::new(AckTable::default()),
                last_disconnect: StdMutex::new(None),
                publish_order: Mutex::new(()),
                teardown: Mutex::new(()),
                handles: StdMutex::new(TaskHandles {
                    driver: None,
                    core: None,
                }),
                shutdown_tx,
                shutdown_rx,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// The configuration snapshot this connection was built from.
    pub fn config(&self) -> &MqttConfig {
        &self.shared.config
    }

    /// The derived client id presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.shared.config.client_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.shared.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LifecycleState::Connected
    }

    /// Subscribe to lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state_rx.clone()
    }

    // ---- hooks ------------------------------------------------------------

    /// Run `hook` after every successful connect, in registration order.
    ///
    /// Hooks run on the event task: keep them short and use
    /// [`try_publish`](Connection::try_publish) for outbound traffic.
    pub fn add_on_connect(&self, hook: impl Fn(&Connection, &ConnectAck) + Send + Sync + 'static) {
        self.shared
            .on_connect
            .lock()
            .expect("hook lock")
            .push(Arc::new(hook));
    }

    /// Run `hook` right before a deliberate disconnect, while the session
    /// is still live.
    pub fn add_before_disconnect(&self, hook: impl Fn(&Connection) + Send + Sync + 'static) {
        self.shared
            .before_disconnect
            .lock()
            .expect("hook lock")
            .push(Arc::new(hook));
    }

    /// Run `hook` after the session ended, with the disconnect reason.
    pub fn add_on_disconnect(
        &self,
        hook: impl Fn(&Connection, &DisconnectReason) + Send + Sync + 'static,
    ) {
        self.shared
            .on_disconnect
            .lock()
            .expect("hook lock")
            .push(Arc::new(hook));
    }

    // ---- connect ----------------------------------------------------------

    /// Start the session and suspend until it is connected or failed.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.connect_detached()?;
        self.await_connected().await
    }

    /// Start the session and return immediately.
    ///
    /// Transport failures after this point surface through on_disconnect
    /// hooks, not as errors.
    pub fn connect_detached(&self) -> Result<(), ConnectionError> {
        if self.state() == LifecycleState::Closed {
            return Err(ConnectionError::Closed);
        }
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(ConnectionError::AlreadyStarted);
        }

        // Transition before the driver runs so a fast ConnAck cannot be
        // overwritten by a late Connecting.
        let _ = self.shared.state_tx.send(LifecycleState::Connecting);

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let driver = self
            .shared
            .client
            .start(LinkContext {
                events: events_tx,
                shutdown: self.shared.shutdown_rx.clone(),
            })
            .map_err(|_| ConnectionError::AlreadyStarted)?;

        let core = tokio::spawn(run_event_loop(
            Arc::downgrade(&self.shared),
            events_rx,
            self.shared.shutdown_rx.clone(),
        ));

        {
            let mut handles = self.shared.handles.lock().expect("handles lock");
            handles.driver = Some(driver);
            handles.core = Some(core);
        }

        info!(client_id = %self.client_id(), "connecting");
        Ok(())
    }

    /// Wait for the lifecycle to reach `Connected`, bounded by the
    /// configured connect timeout. Notification-driven, never polling.
    async fn await_connected(&self) -> Result<(), ConnectionError> {
        let mut state_rx = self.shared.state_rx.clone();
        let timeout = self.shared.config.connect_timeout;

        let wait = async {
            loop {
                match *state_rx.borrow_and_update() {
                    LifecycleState::Connected => return Ok(()),
                    LifecycleState::Closed => return Err(ConnectionError::Closed),
                    LifecycleState::Disconnected => {
                        let reason = self
                            .shared
                            .last_disconnect
                            .lock()
                            .expect("reason lock")
                            .clone();
                        let message = match reason {
                            Some(DisconnectReason::Transport { message }) => message,
                            Some(DisconnectReason::Broker { reason }) => {
                                reason.unwrap_or_else(|| "disconnected by broker".to_string())
                            }
                            _ => "disconnected before the session settled".to_string(),
                        };
                        return Err(ConnectionError::Transport(message));
                    }
                    _ => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(ConnectionError::StateChannelClosed);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(timeout)),
        }
    }

    // ---- publish ----------------------------------------------------------

    /// Publish without waiting for acknowledgement.
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), PublishError> {
        let options = PublishOptions {
            qos,
            retain,
            ..Default::default()
        };
        self.publish_with(topic, payload, &options).await
    }

    /// Publish with full options, optionally waiting for the broker's
    /// acknowledgement per the QoS level.
    pub async fn publish_with(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        options: &PublishOptions,
    ) -> Result<(), PublishError> {
        self.ensure_publishable()?;
        validate_topic(topic).map_err(PublishError::InvalidTopic)?;

        let message = OutboundMessage {
            topic: topic.to_string(),
            payload: payload.into(),
            qos: options.qos,
            retain: options.retain,
            properties: options.properties.clone(),
        };

        if options.wait_for_publish && options.qos != QoS::AtMostOnce {
            let (ack_tx, ack_rx) = oneshot::channel();
            self.submit(message, Some(ack_tx)).await?;
            self.await_ack(ack_rx).await
        } else {
            self.submit(message, None).await
        }
    }

    /// Non-blocking publish for hook contexts running on the event task.
    ///
    /// Acknowledgements are not awaited: the transport enqueue is the only
    /// guarantee.
    pub fn try_publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), PublishError> {
        self.ensure_publishable()?;
        validate_topic(topic).map_err(PublishError::InvalidTopic)?;

        // QoS > 0 still registers a silent waiter so the packet-id FIFO
        // stays aligned with the transport queue.
        let tracked = qos != QoS::AtMostOnce;
        if tracked {
            self.shared.acks.lock().expect("ack lock").register(qos, None);
        }

        let result = self.shared.client.try_publish(OutboundMessage {
            topic: topic.to_string(),
            payload: payload.into(),
            qos,
            retain,
            properties: None,
        });
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                if tracked {
                    self.shared
                        .acks
                        .lock()
                        .expect("ack lock")
                        .cancel_last_unassigned();
                }
                Err(PublishError::Transport(Box::new(err)))
            }
        }
    }

    fn ensure_publishable(&self) -> Result<(), PublishError> {
        // Disconnecting counts: before_disconnect hooks and the availability
        // offline publish run while the session is still live.
        let state = self.state();
        if matches!(
            state,
            LifecycleState::Connected | LifecycleState::Disconnecting
        ) {
            Ok(())
        } else {
            Err(PublishError::NotConnected { state })
        }
    }

    /// Register the ack waiter and hand the message to the transport, both
    /// under the submission lock so waiter order equals enqueue order.
    async fn submit(
        &self,
        message: OutboundMessage,
        notifier: Option<oneshot::Sender<AckOutcome>>,
    ) -> Result<(), PublishError> {
        let _order = self.shared.publish_order.lock().await;
        let tracked = message.qos != QoS::AtMostOnce;
        if tracked {
            self.shared
                .acks
                .lock()
                .expect("ack lock")
                .register(message.qos, notifier);
        }

        match self.shared.client.publish(message).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if tracked {
                    self.shared
                        .acks
                        .lock()
                        .expect("ack lock")
                        .cancel_last_unassigned();
                }
                Err(PublishError::Transport(Box::new(err)))
            }
        }
    }

    async fn await_ack(&self, ack_rx: oneshot::Receiver<AckOutcome>) -> Result<(), PublishError> {
        let timeout = self.shared.config.ack_timeout;
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(AckOutcome::Acked)) => Ok(()),
            Ok(Ok(AckOutcome::ConnectionLost)) | Ok(Err(_)) => Err(PublishError::ConnectionLost),
            Err(_) => Err(PublishError::AckTimeout(timeout)),
        }
    }

    // ---- subscribe --------------------------------------------------------

    /// Register a message callback for `filter` and subscribe.
    pub async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        on_message: impl Fn(&MqttMessage) + Send + Sync + 'static,
    ) -> Result<(), SubscriptionError> {
        let options = SubscribeOptions {
            qos,
            ..Default::default()
        };
        self.subscribe_with(filter, &options, on_message).await
    }

    /// Subscribe with v5 options (ignored under v3).
    pub async fn subscribe_with(
        &self,
        filter: &str,
        options: &SubscribeOptions,
        on_message: impl Fn(&MqttMessage) + Send + Sync + 'static,
    ) -> Result<(), SubscriptionError> {
        if self.state() == LifecycleState::Closed {
            return Err(SubscriptionError::Closed);
        }
        validate_filter(filter).map_err(|reason| SubscriptionError::MalformedFilter {
            filter: filter.to_string(),
            reason,
        })?;

        let request = SubscribeRequest {
            filter: filter.to_string(),
            qos: options.qos,
            no_local: options.no_local,
            retain_as_published: options.retain_as_published,
            retain_handling: options.retain_handling,
        };

        self.shared
            .subscriptions
            .lock()
            .expect("subscription lock")
            .insert(request.clone(), Arc::new(on_message));

        if let Err(err) = self.shared.client.subscribe(request).await {
            self.shared
                .subscriptions
                .lock()
                .expect("subscription lock")
                .remove(filter);
            return Err(SubscriptionError::Transport(Box::new(err)));
        }
        Ok(())
    }

    /// Drop filter registrations; later deliveries on them are discarded.
    /// Dispatches already in flight are not cancelled.
    pub async fn unsubscribe(&self, filters: &[&str]) -> Result<(), SubscriptionError> {
        for filter in filters {
            let removed = self
                .shared
                .subscriptions
                .lock()
                .expect("subscription lock")
                .remove(filter);
            if removed {
                self.shared
                    .client
                    .unsubscribe(filter)
                    .await
                    .map_err(|e| SubscriptionError::Transport(Box::new(e)))?;
            }
        }
        Ok(())
    }

    // ---- disconnect / close ----------------------------------------------

    /// Deliberately end the session.
    ///
    /// Runs before_disconnect hooks, publishes the availability offline
    /// payload, performs the protocol disconnect, then runs on_disconnect
    /// hooks, in that order, serialized against concurrent teardowns.
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.teardown(false).await
    }

    /// Disconnect (if needed), stop the background tasks and transition to
    /// the terminal `Closed` state. Idempotent: closing a closed
    /// connection is a no-op.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        self.teardown(true).await
    }

    async fn teardown(&self, close: bool) -> Result<(), ConnectionError> {
        let _guard = self.shared.teardown.lock().await;

        let state = self.state();
        if state == LifecycleState::Closed {
            return Ok(());
        }

        let was_live = matches!(
            state,
            LifecycleState::Connected | LifecycleState::Connecting
        );

        if was_live {
            let _ = self.shared.state_tx.send(LifecycleState::Disconnecting);

            for hook in self.before_disconnect_hooks() {
                hook(self);
            }

            self.publish_availability_offline().await;

            if let Err(err) = self.shared.client.disconnect().await {
                warn!("protocol disconnect failed: {err}");
            }

            let _ = self.shared.shutdown_tx.send(true);
            let _ = self.shared.state_tx.send(LifecycleState::Disconnected);

            let reason = DisconnectReason::ClientRequested;
            *self.shared.last_disconnect.lock().expect("reason lock") = Some(reason.clone());
            for hook in self.on_disconnect_hooks() {
                hook(self, &reason);
            }
        } else {
            // Never-connected (or already disconnected) sessions have
            // nothing to announce; just stop whatever is running.
            let _ = self.shared.shutdown_tx.send(true);
        }

        self.shared.acks.lock().expect("ack lock").fail_all();

        if close {
            self.join_tasks().await;
            let _ = self.shared.state_tx.send(LifecycleState::Closed);
            info!(client_id = %self.client_id(), "connection closed");
        }

        Ok(())
    }

    /// Best-effort offline announcement while the session is still live.
    async fn publish_availability_offline(&self) {
        let Some(availability) = self.shared.config.availability.clone() else {
            return;
        };

        let message = OutboundMessage {
            topic: availability.topic.clone(),
            payload: Bytes::from(availability.payload_offline.clone()),
            qos: availability.qos,
            retain: availability.retain,
            properties: None,
        };

        let result = if availability.qos == QoS::AtMostOnce {
            self.submit(message, None).await
        } else {
            let (ack_tx, ack_rx) = oneshot::channel();
            match self.submit(message, Some(ack_tx)).await {
                Ok(()) => self.await_ack(ack_rx).await,
                Err(err) => Err(err),
            }
        };

        if let Err(err) = result {
            warn!("availability offline publish failed: {err}");
        }
    }

    async fn join_tasks(&self) {
        let (driver, core) = {
            let mut handles = self.shared.handles.lock().expect("handles lock");
            (handles.driver.take(), handles.core.take())
        };

        for handle in [driver, core].into_iter().flatten() {
            let mut handle = handle;
            match tokio::time::timeout(TASK_SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if !err.is_cancelled() => {
                    warn!("background task ended with error: {err}");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("background task did not stop in time; aborting");
                    handle.abort();
                }
            }
        }
    }

    // ---- event handling (runs on the core task) ---------------------------

    fn handle_connected(&self, ack: &ConnectAck) {
        let _ = self.shared.state_tx.send(LifecycleState::Connected);
        info!(client_id = %self.client_id(), session_present = ack.session_present(), "connected");

        self.resubscribe_all();
        self.publish_availability_online();

        for hook in self.on_connect_hooks() {
            hook(self, ack);
        }
    }

    /// Re-issue every registered subscription; brokers drop them across
    /// clean reconnects.
    fn resubscribe_all(&self) {
        let subscriptions = self
            .shared
            .subscriptions
            .lock()
            .expect("subscription lock")
            .snapshot();
        for subscription in subscriptions {
            let client = self.shared.client.clone();
            let request = subscription.request.clone();
            tokio::spawn(async move {
                if let Err(err) = client.subscribe(request.clone()).await {
                    warn!(filter = %request.filter, "re-subscription failed: {err}");
                }
            });
        }
    }

    /// Queue the online announcement ahead of the on_connect hooks.
    fn publish_availability_online(&self) {
        let Some(availability) = &self.shared.config.availability else {
            return;
        };
        match self.try_publish(
            &availability.topic,
            availability.payload_online.clone(),
            availability.qos,
            availability.retain,
        ) {
            Ok(()) => debug!(topic = %availability.topic, "availability online published"),
            Err(err) => warn!("availability online publish failed: {err}"),
        }
    }

    fn handle_message(&self, inbound: InboundMessage) {
        let message = MqttMessage::new(
            inbound.topic,
            inbound.payload,
            inbound.qos,
            inbound.retain,
            inbound.properties,
        );
        let subscriptions = self
            .shared
            .subscriptions
            .lock()
            .expect("subscription lock")
            .snapshot();
        dispatch::dispatch(&subscriptions, &message);
    }

    fn handle_link_disconnected(&self, reason: DisconnectReason) {
        self.shared.acks.lock().expect("ack lock").fail_all();

        // Deliberate teardown already owns state and hook sequencing.
        if matches!(
            self.state(),
            LifecycleState::Disconnecting | LifecycleState::Disconnected | LifecycleState::Closed
        ) {
            return;
        }

        warn!(client_id = %self.client_id(), ?reason, "connection lost");
        *self.shared.last_disconnect.lock().expect("reason lock") = Some(reason.clone());
        let _ = self.shared.state_tx.send(LifecycleState::Disconnected);

        for hook in self.on_disconnect_hooks() {
            hook(self, &reason);
        }
    }

    fn on_connect_hooks(&self) -> Vec<ConnectHook> {
        self.shared.on_connect.lock().expect("hook lock").clone()
    }

    fn before_disconnect_hooks(&self) -> Vec<BeforeDisconnectHook> {
        self.shared
            .before_disconnect
            .lock()
            .expect("hook lock")
            .clone()
    }

    fn on_disconnect_hooks(&self) -> Vec<DisconnectHook> {
        self.shared.on_disconnect.lock().expect("hook lock").clone()
    }
}

/// Core event task: consumes driver events until shutdown or until every
/// external handle is gone.
async fn run_event_loop(
    shared: Weak<Shared>,
    mut events: mpsc::Receiver<LinkEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        // Holding only a weak reference lets an abandoned connection shut
        // itself down instead of keeping the session alive forever.
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let connection = Connection { shared };

        match event {
            LinkEvent::Connected(ack) => connection.handle_connected(&ack),
            LinkEvent::Message(inbound) => connection.handle_message(inbound),
            LinkEvent::Disconnected(reason) => connection.handle_link_disconnected(reason),
            LinkEvent::PubQueued(pkid) => connection
                .shared
                .acks
                .lock()
                .expect("ack lock")
                .assign(pkid),
            LinkEvent::PubAcked(pkid) => connection
                .shared
                .acks
                .lock()
                .expect("ack lock")
                .complete(pkid, AckKind::PubAck),
            LinkEvent::PubCompleted(pkid) => connection
                .shared
                .acks
                .lock()
                .expect("ack lock")
                .complete(pkid, AckKind::PubComp),
        }
    }
    debug!("connection event loop stopped");
}
