//! Acknowledgement tracking for QoS > 0 publishes
//!
//! The underlying client reports packet ids only through its event stream:
//! an outgoing publish is announced as `PubQueued(pkid)` and settled later
//! by `PubAcked`/`PubCompleted`. Waiters are registered in submission order,
//! paired FIFO with queued packet ids, and completed by id. Every QoS > 0
//! publish registers a waiter (with or without a notifier) so the FIFO
//! stays aligned with the transport queue.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::types::QoS;

/// How a tracked publish settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    /// The broker acknowledged delivery for the publish's QoS level.
    Acked,
    /// The session ended before the acknowledgement arrived.
    ConnectionLost,
}

/// Which acknowledgement packet settled the publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckKind {
    PubAck,
    PubComp,
}

struct Waiter {
    qos: QoS,
    notifier: Option<oneshot::Sender<AckOutcome>>,
}

/// FIFO packet-id correlation table.
#[derive(Default)]
pub(crate) struct AckTable {
    unassigned: VecDeque<Waiter>,
    assigned: HashMap<u16, Waiter>,
}

impl AckTable {
    pub(crate) fn register(&mut self, qos: QoS, notifier: Option<oneshot::Sender<AckOutcome>>) {
        debug_assert!(qos != QoS::AtMostOnce, "QoS 0 publishes are not tracked");
        self.unassigned.push_back(Waiter { qos, notifier });
    }

    /// Drop the most recently registered, still unassigned waiter.
    ///
    /// Used when the publish submission itself failed after registration.
    pub(crate) fn cancel_last_unassigned(&mut self) {
        self.unassigned.pop_back();
    }

    /// Pair the oldest unassigned waiter with a queued packet id.
    pub(crate) fn assign(&mut self, pkid: u16) {
        let Some(waiter) = self.unassigned.pop_front() else {
            return;
        };
        if let Some(stale) = self.assigned.insert(pkid, waiter) {
            // Packet ids wrap at 65535; a stale entry under the same id can
            // no longer be settled.
            if let Some(notifier) = stale.notifier {
                let _ = notifier.send(AckOutcome::ConnectionLost);
            }
        }
    }

    /// Settle the waiter for `pkid`.
    ///
    /// QoS 1 settles on PUBACK, QoS 2 on PUBCOMP; the intermediate PUBREC /
    /// PUBREL exchange stays inside the underlying client.
    pub(crate) fn complete(&mut self, pkid: u16, kind: AckKind) {
        let settles = |qos: QoS| match kind {
            AckKind::PubAck => qos == QoS::AtLeastOnce,
            AckKind::PubComp => qos == QoS::ExactlyOnce,
        };

        let Some(waiter) = self.assigned.get(&pkid) else {
            return;
        };
        if !settles(waiter.qos) {
            return;
        }
        let waiter = self.assigned.remove(&pkid).expect("checked above");
        if let Some(notifier) = waiter.notifier {
            let _ = notifier.send(AckOutcome::Acked);
        }
    }

    /// Fail every outstanding waiter; called when the session ends.
    pub(crate) fn fail_all(&mut self) {
        for waiter in self
            .unassigned
            .drain(..)
            .chain(self.assigned.drain().map(|(_, waiter)| waiter))
        {
            if let Some(notifier) = waiter.notifier {
                let _ = notifier.send(AckOutcome::ConnectionLost);
            }
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.unassigned.len() + self.assigned.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos1_waiter_settles_on_puback() {
        let mut table = AckTable::default();
        let (tx, mut rx) = oneshot::channel();

        table.register(QoS::AtLeastOnce, Some(tx));
        table.assign(7);
        table.complete(7, AckKind::PubAck);

        assert_eq!(rx.try_recv().unwrap(), AckOutcome::Acked);
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn qos2_waiter_ignores_puback_and_settles_on_pubcomp() {
        let mut table = AckTable::default();
        let (tx, mut rx) = oneshot::channel();

        table.register(QoS::ExactlyOnce, Some(tx));
        table.assign(3);

        table.complete(3, AckKind::PubAck);
        assert!(rx.try_recv().is_err(), "PUBACK must not settle QoS 2");

        table.complete(3, AckKind::PubComp);
        assert_eq!(rx.try_recv().unwrap(), AckOutcome::Acked);
    }

    #[test]
    fn waiters_pair_with_pkids_in_fifo_order() {
        let mut table = AckTable::default();
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();

        table.register(QoS::AtLeastOnce, Some(tx_a));
        table.register(QoS::AtLeastOnce, Some(tx_b));
        table.assign(1);
        table.assign(2);

        table.complete(2, AckKind::PubAck);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), AckOutcome::Acked);

        table.complete(1, AckKind::PubAck);
        assert_eq!(rx_a.try_recv().unwrap(), AckOutcome::Acked);
    }

    #[test]
    fn notifier_less_waiters_keep_the_fifo_aligned() {
        let mut table = AckTable::default();
        let (tx, mut rx) = oneshot::channel();

        // Fire-and-forget publish first, waited publish second
        table.register(QoS::AtLeastOnce, None);
        table.register(QoS::AtLeastOnce, Some(tx));
        table.assign(10);
        table.assign(11);

        table.complete(10, AckKind::PubAck);
        table.complete(11, AckKind::PubAck);
        assert_eq!(rx.try_recv().unwrap(), AckOutcome::Acked);
    }

    #[test]
    fn fail_all_notifies_everyone() {
        let mut table = AckTable::default();
        let (tx_a, mut rx_a) = oneshot::channel();
        let (tx_b, mut rx_b) = oneshot::channel();

        table.register(QoS::AtLeastOnce, Some(tx_a));
        table.register(QoS::ExactlyOnce, Some(tx_b));
        table.assign(1);

        table.fail_all();
        assert_eq!(rx_a.try_recv().unwrap(), AckOutcome::ConnectionLost);
        assert_eq!(rx_b.try_recv().unwrap(), AckOutcome::ConnectionLost);
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn cancel_last_unassigned_drops_the_failed_submission() {
        let mut table = AckTable::default();
        table.register(QoS::AtLeastOnce, None);
        table.cancel_last_unassigned();
        assert_eq!(table.pending(), 0);
    }
}
