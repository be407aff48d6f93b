//! SDK event fan-out
//!
//! Listeners subscribe and get a [`Subscription`] handle; dropping or
//! cancelling the handle detaches the listener. Broadcasting never blocks:
//! a full or closed channel drops that listener.

use dashmap::DashMap;
use ethers::types::H256;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::PaymentEvent;
use crate::types::{BridgeDirection, BridgeOperation, TransactionRecord};

const CHANNEL_CAPACITY: usize = 100;

/// Events surfaced to SDK listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SdkEvent {
    PaymentSent { record: TransactionRecord },
    PaymentReceived { payment: PaymentEvent },
    DepositInitiated { operation: BridgeOperation },
    DepositCompleted { operation: BridgeOperation },
    WithdrawalInitiated { operation: BridgeOperation },
    WithdrawalCompleted { operation: BridgeOperation },
    BridgeFailed { operation: BridgeOperation },
    /// Destination event with no pending operation; kept for inspection
    OrphanBridgeEvent {
        correlation_id: String,
        destination_tx_hash: H256,
    },
}

impl SdkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SdkEvent::PaymentSent { .. } => "paymentSent",
            SdkEvent::PaymentReceived { .. } => "paymentReceived",
            SdkEvent::DepositInitiated { .. } => "depositInitiated",
            SdkEvent::DepositCompleted { .. } => "depositCompleted",
            SdkEvent::WithdrawalInitiated { .. } => "withdrawalInitiated",
            SdkEvent::WithdrawalCompleted { .. } => "withdrawalCompleted",
            SdkEvent::BridgeFailed { .. } => "bridgeFailed",
            SdkEvent::OrphanBridgeEvent { .. } => "orphanBridgeEvent",
        }
    }

    pub(crate) fn initiated(operation: BridgeOperation) -> Self {
        match operation.direction {
            BridgeDirection::Deposit => SdkEvent::DepositInitiated { operation },
            BridgeDirection::Withdrawal => SdkEvent::WithdrawalInitiated { operation },
        }
    }

    pub(crate) fn completed(operation: BridgeOperation) -> Self {
        match operation.direction {
            BridgeDirection::Deposit => SdkEvent::DepositCompleted { operation },
            BridgeDirection::Withdrawal => SdkEvent::WithdrawalCompleted { operation },
        }
    }
}

/// Cancellable receiving end of an event stream.
///
/// Used both for SDK listeners and for chain event subscriptions. Once
/// cancelled, `recv` returns `None` and the producer stops delivering.
#[derive(Debug)]
pub struct Subscription<T> {
    id: String,
    receiver: mpsc::Receiver<T>,
    cancel: CancellationToken,
}

impl<T> Subscription<T> {
    pub fn new(id: impl Into<String>, receiver: mpsc::Receiver<T>, cancel: CancellationToken) -> Self {
        Self {
            id: id.into(),
            receiver,
            cancel,
        }
    }

    /// Channel pair for producers: the sender half plus a handle sharing the token
    pub fn channel(id: impl Into<String>, cancel: CancellationToken) -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (tx, Self::new(id, rx, cancel))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next item, or `None` once cancelled or the producer is gone
    pub async fn recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            item = self.receiver.recv() => item,
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<T> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Listener {
    sender: mpsc::Sender<SdkEvent>,
    cancel: CancellationToken,
}

/// Broadcasts SDK events to all subscribed listeners
pub struct EventBroadcaster {
    listeners: DashMap<String, Listener>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener
    pub fn subscribe(&self) -> Subscription<SdkEvent> {
        let id = format!("listener-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        let (sender, subscription) = Subscription::channel(id.clone(), cancel.clone());
        self.listeners.insert(id.clone(), Listener { sender, cancel });
        log::debug!("[Events] Listener {} subscribed", id);
        subscription
    }

    /// Detach a listener by id. Its handle stops yielding events.
    pub fn unsubscribe(&self, id: &str) {
        if let Some((_, listener)) = self.listeners.remove(id) {
            listener.cancel.cancel();
            log::debug!("[Events] Listener {} unsubscribed", id);
        }
    }

    /// Deliver an event to every live listener
    pub fn broadcast(&self, event: SdkEvent) {
        let event_name = event.name();
        let mut failed = Vec::new();

        for entry in self.listeners.iter() {
            let listener = entry.value();
            if listener.cancel.is_cancelled() || listener.sender.try_send(event.clone()).is_err() {
                failed.push(entry.key().clone());
            }
        }

        for id in failed {
            self.listeners.remove(&id);
            log::debug!("[Events] Removed listener {}", id);
        }

        log::debug!(
            "[Events] Broadcast '{}' to {} listeners",
            event_name,
            self.listeners.len()
        );
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orphan(byte: u8) -> SdkEvent {
        SdkEvent::OrphanBridgeEvent {
            correlation_id: format!("id-{}", byte),
            destination_tx_hash: H256::repeat_byte(byte),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_listeners() {
        let events = EventBroadcaster::new();
        let mut a = events.subscribe();
        let mut b = events.subscribe();
        assert_ne!(a.id(), b.id());

        events.broadcast(orphan(1));

        assert_eq!(a.recv().await, Some(orphan(1)));
        assert_eq!(b.recv().await, Some(orphan(1)));
    }

    #[tokio::test]
    async fn test_cancelled_handle_stops_delivery() {
        let events = EventBroadcaster::new();
        let mut sub = events.subscribe();
        sub.cancel();

        events.broadcast(orphan(2));
        assert_eq!(sub.recv().await, None);
        assert_eq!(events.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_by_id() {
        let events = EventBroadcaster::new();
        let mut sub = events.subscribe();
        let id = sub.id().to_string();

        events.unsubscribe(&id);
        assert!(sub.is_cancelled());
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_handle_is_pruned() {
        let events = EventBroadcaster::new();
        drop(events.subscribe());
        events.broadcast(orphan(3));
        assert_eq!(events.listener_count(), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(orphan(1).name(), "orphanBridgeEvent");
        let json = serde_json::to_value(orphan(1)).unwrap();
        assert_eq!(json["event"], "orphan_bridge_event");
    }
}
