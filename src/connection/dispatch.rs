//! Per-filter message callback registry
//!
//! One callback per topic filter, replaced on re-subscribe. Dispatch
//! snapshots the table so callbacks can subscribe or unsubscribe from
//! inside a callback without deadlocking.

use std::sync::Arc;

use tracing::debug;

use crate::link::SubscribeRequest;
use crate::message::MqttMessage;
use crate::topic::filter_matches;

/// Callback invoked for every message matching its filter.
pub type MessageCallback = Arc<dyn Fn(&MqttMessage) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Subscription {
    pub(crate) request: SubscribeRequest,
    pub(crate) callback: MessageCallback,
}

/// Registry of active subscriptions in registration order.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: Vec<Subscription>,
}

impl SubscriptionTable {
    /// Register a callback; an existing entry for the same filter is
    /// replaced in place so re-subscribing swaps handlers.
    pub(crate) fn insert(&mut self, request: SubscribeRequest, callback: MessageCallback) {
        let entry = Subscription { request, callback };
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.request.filter == entry.request.filter)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove the entry for `filter`. Returns whether one existed.
    pub(crate) fn remove(&mut self, filter: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.request.filter != filter);
        self.entries.len() != before
    }

    /// Clone the current entries for lock-free iteration.
    pub(crate) fn snapshot(&self) -> Vec<Subscription> {
        self.entries.clone()
    }
}

/// Deliver a message to every matching subscription, in registration order.
///
/// Messages matching no filter are dropped by design.
pub(crate) fn dispatch(subscriptions: &[Subscription], message: &MqttMessage) {
    let mut delivered = false;
    for subscription in subscriptions {
        if filter_matches(&subscription.request.filter, message.topic()) {
            (subscription.callback)(message);
            delivered = true;
        }
    }
    if !delivered {
        debug!(topic = %message.topic(), "no subscription matched; message dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QoS, RetainHandling};
    use std::sync::Mutex;

    fn request(filter: &str) -> SubscribeRequest {
        SubscribeRequest {
            filter: filter.to_string(),
            qos: QoS::AtMostOnce,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::SendAll,
        }
    }

    fn message(topic: &str) -> MqttMessage {
        MqttMessage::new(topic, &b"x"[..], QoS::AtMostOnce, false, None)
    }

    #[test]
    fn dispatches_to_matching_filters_only() {
        let mut table = SubscriptionTable::default();
        let hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        for filter in ["demo/#", "other/+"] {
            let hits = hits.clone();
            let name = filter.to_string();
            table.insert(
                request(filter),
                Arc::new(move |_msg| hits.lock().unwrap().push(name.clone())),
            );
        }

        dispatch(&table.snapshot(), &message("demo/x"));
        assert_eq!(*hits.lock().unwrap(), vec!["demo/#".to_string()]);
    }

    #[test]
    fn resubscribe_replaces_the_callback() {
        let mut table = SubscriptionTable::default();
        let hits: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let first = hits.clone();
        table.insert(request("demo/#"), Arc::new(move |_| first.lock().unwrap().push("first")));
        let second = hits.clone();
        table.insert(request("demo/#"), Arc::new(move |_| second.lock().unwrap().push("second")));

        dispatch(&table.snapshot(), &message("demo/x"));
        assert_eq!(*hits.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn removed_filters_stop_matching() {
        let mut table = SubscriptionTable::default();
        let hits: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));

        let counter = hits.clone();
        table.insert(request("demo/#"), Arc::new(move |_| *counter.lock().unwrap() += 1));

        assert!(table.remove("demo/#"));
        assert!(!table.remove("demo/#"));

        dispatch(&table.snapshot(), &message("demo/x"));
        assert_eq!(*hits.lock().unwrap(), 0);
    }
}
