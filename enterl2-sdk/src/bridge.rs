//! Cross-chain operation correlation
//!
//! A bridge operation is opened when its source leg is submitted and closed
//! when the matching destination event arrives, the source leg reverts, or
//! the operation timeout passes. Deposits are keyed by source hash and
//! beneficiary; withdrawals by the nonce issued at request time, since their
//! destination transaction cannot be derived from the source.

use chrono::Utc;
use dashmap::DashMap;
use ethers::abi::{self, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::chain::ChainEvent;
use crate::error::BridgeError;
use crate::events::{EventBroadcaster, SdkEvent, Subscription};
use crate::types::{BridgeDirection, BridgeOperation, BridgeStatus};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What identifies both legs of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    Deposit {
        source_tx_hash: H256,
        beneficiary: Address,
    },
    Withdrawal {
        nonce: H256,
    },
}

impl CorrelationKey {
    pub fn id(&self) -> String {
        match self {
            CorrelationKey::Deposit {
                source_tx_hash,
                beneficiary,
            } => {
                let digest = keccak256(abi::encode(&[
                    Token::FixedBytes(source_tx_hash.as_bytes().to_vec()),
                    Token::Address(*beneficiary),
                ]));
                format!("deposit-0x{}", hex::encode(digest))
            }
            CorrelationKey::Withdrawal { nonce } => {
                format!("withdrawal-0x{}", hex::encode(nonce.as_bytes()))
            }
        }
    }

    pub fn direction(&self) -> BridgeDirection {
        match self {
            CorrelationKey::Deposit { .. } => BridgeDirection::Deposit,
            CorrelationKey::Withdrawal { .. } => BridgeDirection::Withdrawal,
        }
    }
}

/// Source leg as submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLeg {
    pub key: CorrelationKey,
    pub source_tx_hash: H256,
    pub beneficiary: Address,
    pub token: Address,
    pub amount: U256,
}

impl SourceLeg {
    pub fn deposit(source_tx_hash: H256, beneficiary: Address, token: Address, amount: U256) -> Self {
        Self {
            key: CorrelationKey::Deposit {
                source_tx_hash,
                beneficiary,
            },
            source_tx_hash,
            beneficiary,
            token,
            amount,
        }
    }

    pub fn withdrawal(
        source_tx_hash: H256,
        nonce: H256,
        recipient: Address,
        token: Address,
        amount: U256,
    ) -> Self {
        Self {
            key: CorrelationKey::Withdrawal { nonce },
            source_tx_hash,
            beneficiary: recipient,
            token,
            amount,
        }
    }
}

/// Result of applying a destination event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationOutcome {
    Completed(BridgeOperation),
    /// Same event delivered again; nothing changed
    Duplicate(BridgeOperation),
}

struct TrackedOperation {
    operation: BridgeOperation,
    registered_at: Instant,
}

pub struct BridgeCorrelator {
    operations: DashMap<String, TrackedOperation>,
    by_source: DashMap<H256, String>,
    events: Arc<EventBroadcaster>,
    operation_timeout: Duration,
    poll_interval: Duration,
}

impl BridgeCorrelator {
    pub fn new(events: Arc<EventBroadcaster>) -> Self {
        Self {
            operations: DashMap::new(),
            by_source: DashMap::new(),
            events,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How long a destination leg may take before the operation fails
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Open an operation for a submitted source leg. Re-registering the same
    /// leg returns the existing operation unchanged.
    pub fn register_source(&self, leg: SourceLeg) -> BridgeOperation {
        let id = leg.key.id();
        let mut created = false;

        let operation = self
            .operations
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                TrackedOperation {
                    operation: BridgeOperation {
                        id: id.clone(),
                        direction: leg.key.direction(),
                        status: BridgeStatus::Pending,
                        token_address: leg.token,
                        amount: leg.amount,
                        beneficiary: leg.beneficiary,
                        source_tx_hash: leg.source_tx_hash,
                        destination_tx_hash: None,
                        timestamp: Utc::now(),
                        failure_reason: None,
                    },
                    registered_at: Instant::now(),
                }
            })
            .operation
            .clone();

        if created {
            self.by_source.insert(leg.source_tx_hash, id.clone());
            log::info!(
                "[Bridge] {} {} opened (source {:?})",
                operation.direction,
                id,
                leg.source_tx_hash
            );
            self.events.broadcast(SdkEvent::initiated(operation.clone()));
        }
        operation
    }

    /// Source leg reverted on chain
    pub fn source_reverted(&self, id: &str) -> Result<BridgeOperation, BridgeError> {
        self.fail(id, "source transaction reverted")
    }

    /// Apply a destination-chain completion.
    ///
    /// Re-delivery of the same event is a no-op. A different destination hash
    /// for a completed operation, or any event for a failed one, is an error.
    pub fn observe_destination(
        &self,
        key: CorrelationKey,
        destination_tx_hash: H256,
    ) -> Result<DestinationOutcome, BridgeError> {
        let id = key.id();

        let outcome = match self.operations.get_mut(&id) {
            None => None,
            Some(mut tracked) => {
                let operation = &mut tracked.operation;
                Some(match (operation.status, operation.destination_tx_hash) {
                    (BridgeStatus::Pending, _) => {
                        operation.status = BridgeStatus::Completed;
                        operation.destination_tx_hash = Some(destination_tx_hash);
                        Ok(DestinationOutcome::Completed(operation.clone()))
                    }
                    (BridgeStatus::Completed, Some(existing)) if existing == destination_tx_hash => {
                        Ok(DestinationOutcome::Duplicate(operation.clone()))
                    }
                    (BridgeStatus::Completed, existing) => Err(BridgeError::ConflictingDestination {
                        id: id.clone(),
                        existing: existing.unwrap_or_default(),
                        incoming: destination_tx_hash,
                    }),
                    (BridgeStatus::Failed, _) => Err(BridgeError::AlreadyFinalized {
                        id: id.clone(),
                        status: BridgeStatus::Failed,
                    }),
                })
            }
        };

        match outcome {
            None => {
                log::warn!(
                    "[Bridge] Orphan destination event {} (tx {:?})",
                    id,
                    destination_tx_hash
                );
                self.events.broadcast(SdkEvent::OrphanBridgeEvent {
                    correlation_id: id.clone(),
                    destination_tx_hash,
                });
                Err(BridgeError::OrphanEvent {
                    correlation_id: id,
                    destination_tx_hash,
                })
            }
            Some(Ok(DestinationOutcome::Completed(operation))) => {
                log::info!(
                    "[Bridge] {} completed by {:?}",
                    operation.id,
                    destination_tx_hash
                );
                self.events.broadcast(SdkEvent::completed(operation.clone()));
                Ok(DestinationOutcome::Completed(operation))
            }
            Some(Ok(duplicate)) => {
                log::debug!("[Bridge] Duplicate destination event for {}", id);
                Ok(duplicate)
            }
            Some(Err(e)) => {
                log::warn!("[Bridge] Rejected destination event: {}", e);
                Err(e)
            }
        }
    }

    /// Route a chain event. Payment events are not bridge legs and yield `None`.
    pub fn handle_event(&self, event: &ChainEvent) -> Option<Result<DestinationOutcome, BridgeError>> {
        match event {
            ChainEvent::Payment(_) => None,
            ChainEvent::DepositFinalized(e) => Some(self.observe_destination(
                CorrelationKey::Deposit {
                    source_tx_hash: e.source_tx_hash,
                    beneficiary: e.beneficiary,
                },
                e.tx_hash,
            )),
            ChainEvent::WithdrawalFinalized(e) => Some(self.observe_destination(
                CorrelationKey::Withdrawal { nonce: e.nonce },
                e.tx_hash,
            )),
        }
    }

    /// Consume destination events until the subscription ends
    pub async fn run(&self, mut events: Subscription<ChainEvent>) {
        log::debug!("[Bridge] Listening on {}", events.id());
        while let Some(event) = events.recv().await {
            // errors are already logged and orphans broadcast
            let _ = self.handle_event(&event);
        }
        log::debug!("[Bridge] Subscription {} closed", events.id());
    }

    /// Fail every Pending operation older than the operation timeout
    pub fn expire_stale(&self) -> Vec<BridgeOperation> {
        let now = Instant::now();
        let stale: Vec<String> = self
            .operations
            .iter()
            .filter(|t| {
                t.operation.status == BridgeStatus::Pending
                    && now.duration_since(t.registered_at) >= self.operation_timeout
            })
            .map(|t| t.key().clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.fail(id, "destination leg not observed before timeout").ok())
            .filter(|op| op.status == BridgeStatus::Failed)
            .collect()
    }

    /// Wait for the operation to reach a terminal state. Fails it once the
    /// operation timeout (counted from registration) passes.
    pub async fn wait_for_completion(&self, id: &str) -> Result<BridgeOperation, BridgeError> {
        loop {
            let (operation, registered_at) = self
                .operations
                .get(id)
                .map(|t| (t.operation.clone(), t.registered_at))
                .ok_or_else(|| BridgeError::UnknownOperation(id.to_string()))?;

            if operation.is_terminal() {
                return Ok(operation);
            }

            let deadline = registered_at + self.operation_timeout;
            let now = Instant::now();
            if now >= deadline {
                return match self.fail(id, "destination leg not observed before timeout") {
                    Ok(op) => Ok(op),
                    // lost a race with a terminal transition
                    Err(BridgeError::AlreadyFinalized { .. }) => self
                        .operation(id)
                        .ok_or_else(|| BridgeError::UnknownOperation(id.to_string())),
                    Err(e) => Err(e),
                };
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    pub fn operation(&self, id: &str) -> Option<BridgeOperation> {
        self.operations.get(id).map(|t| t.operation.clone())
    }

    pub fn operation_for_source(&self, source_tx_hash: H256) -> Option<BridgeOperation> {
        let id = self.by_source.get(&source_tx_hash)?.clone();
        self.operation(&id)
    }

    pub fn operations(&self) -> Vec<BridgeOperation> {
        self.operations.iter().map(|t| t.operation.clone()).collect()
    }

    pub fn pending(&self) -> Vec<BridgeOperation> {
        self.operations
            .iter()
            .filter(|t| t.operation.status == BridgeStatus::Pending)
            .map(|t| t.operation.clone())
            .collect()
    }

    fn fail(&self, id: &str, reason: &str) -> Result<BridgeOperation, BridgeError> {
        let operation = {
            let mut tracked = self
                .operations
                .get_mut(id)
                .ok_or_else(|| BridgeError::UnknownOperation(id.to_string()))?;
            let operation = &mut tracked.operation;
            if operation.is_terminal() {
                return Err(BridgeError::AlreadyFinalized {
                    id: id.to_string(),
                    status: operation.status,
                });
            }
            operation.status = BridgeStatus::Failed;
            operation.failure_reason = Some(reason.to_string());
            operation.clone()
        };

        log::warn!("[Bridge] {} failed: {}", id, reason);
        self.events.broadcast(SdkEvent::BridgeFailed {
            operation: operation.clone(),
        });
        Ok(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DepositFinalized, WithdrawalFinalized};
    use crate::test_support::address;

    const TIMEOUT: Duration = Duration::from_secs(600);

    fn correlator() -> (Arc<EventBroadcaster>, BridgeCorrelator) {
        let events = Arc::new(EventBroadcaster::new());
        let correlator = BridgeCorrelator::new(events.clone()).with_operation_timeout(TIMEOUT);
        (events, correlator)
    }

    fn deposit_leg() -> SourceLeg {
        SourceLeg::deposit(H256::repeat_byte(1), address(2), address(9), U256::from(1_000u64))
    }

    #[test]
    fn test_correlation_ids() {
        let a = CorrelationKey::Deposit {
            source_tx_hash: H256::repeat_byte(1),
            beneficiary: address(2),
        };
        let b = CorrelationKey::Deposit {
            source_tx_hash: H256::repeat_byte(1),
            beneficiary: address(3),
        };
        assert_eq!(a.id(), a.id());
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("deposit-0x"));

        let w = CorrelationKey::Withdrawal {
            nonce: H256::repeat_byte(0xab),
        };
        assert_eq!(w.id(), format!("withdrawal-0x{}", "ab".repeat(32)));
    }

    #[tokio::test]
    async fn test_deposit_completes() {
        let (events, correlator) = correlator();
        let mut listener = events.subscribe();

        let op = correlator.register_source(deposit_leg());
        assert_eq!(op.status, BridgeStatus::Pending);
        assert!(matches!(listener.recv().await, Some(SdkEvent::DepositInitiated { .. })));

        let event = ChainEvent::DepositFinalized(DepositFinalized {
            tx_hash: H256::repeat_byte(7),
            source_tx_hash: H256::repeat_byte(1),
            beneficiary: address(2),
            token: address(9),
            amount: U256::from(1_000u64),
        });
        let outcome = correlator.handle_event(&event).unwrap().unwrap();
        let DestinationOutcome::Completed(done) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(done.destination_tx_hash, Some(H256::repeat_byte(7)));
        assert!(matches!(listener.recv().await, Some(SdkEvent::DepositCompleted { .. })));
        assert_eq!(
            correlator.operation_for_source(H256::repeat_byte(1)).unwrap().status,
            BridgeStatus::Completed
        );
    }

    #[test]
    fn test_duplicate_destination_is_noop() {
        let (_events, correlator) = correlator();
        let op = correlator.register_source(deposit_leg());
        let key = deposit_leg().key;

        correlator.observe_destination(key, H256::repeat_byte(7)).unwrap();
        let again = correlator.observe_destination(key, H256::repeat_byte(7)).unwrap();

        assert!(matches!(again, DestinationOutcome::Duplicate(_)));
        let stored = correlator.operation(&op.id).unwrap();
        assert_eq!(stored.status, BridgeStatus::Completed);
        assert_eq!(stored.destination_tx_hash, Some(H256::repeat_byte(7)));
        assert_eq!(correlator.operations().len(), 1);
    }

    #[test]
    fn test_conflicting_destination_is_rejected() {
        let (_events, correlator) = correlator();
        let op = correlator.register_source(deposit_leg());
        let key = deposit_leg().key;

        correlator.observe_destination(key, H256::repeat_byte(7)).unwrap();
        let err = correlator.observe_destination(key, H256::repeat_byte(8)).unwrap_err();

        assert!(matches!(err, BridgeError::ConflictingDestination { .. }));
        assert_eq!(
            correlator.operation(&op.id).unwrap().destination_tx_hash,
            Some(H256::repeat_byte(7))
        );
    }

    #[tokio::test]
    async fn test_orphan_event_is_reported() {
        let (events, correlator) = correlator();
        let mut listener = events.subscribe();

        let event = ChainEvent::WithdrawalFinalized(WithdrawalFinalized {
            tx_hash: H256::repeat_byte(5),
            nonce: H256::repeat_byte(6),
            recipient: address(2),
            token: address(9),
            amount: U256::one(),
        });
        let err = correlator.handle_event(&event).unwrap().unwrap_err();

        assert!(matches!(err, BridgeError::OrphanEvent { .. }));
        assert!(matches!(listener.recv().await, Some(SdkEvent::OrphanBridgeEvent { .. })));
        assert!(correlator.operations().is_empty());
    }

    #[test]
    fn test_source_revert_fails_operation() {
        let (_events, correlator) = correlator();
        let op = correlator.register_source(deposit_leg());

        let failed = correlator.source_reverted(&op.id).unwrap();
        assert_eq!(failed.status, BridgeStatus::Failed);

        // late destination does not resurrect it
        let err = correlator
            .observe_destination(deposit_leg().key, H256::repeat_byte(7))
            .unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyFinalized { .. }));
        assert_eq!(correlator.operation(&op.id).unwrap().destination_tx_hash, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deposit_without_destination_fails_after_timeout() {
        let (_events, correlator) = correlator();
        let op = correlator.register_source(deposit_leg());

        let started = Instant::now();
        let done = correlator.wait_for_completion(&op.id).await.unwrap();

        assert!(started.elapsed() >= TIMEOUT);
        assert_eq!(done.status, BridgeStatus::Failed);
        assert!(done.failure_reason.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_on_completion() {
        let (_events, correlator) = correlator();
        let op = correlator.register_source(deposit_leg());

        let relay = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            correlator
                .observe_destination(deposit_leg().key, H256::repeat_byte(7))
                .unwrap();
        };
        let (done, _) = tokio::join!(correlator.wait_for_completion(&op.id), relay);
        assert_eq!(done.unwrap().status, BridgeStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_stale() {
        let (_events, correlator) = correlator();
        let op = correlator.register_source(deposit_leg());

        tokio::time::advance(TIMEOUT / 2).await;
        assert!(correlator.expire_stale().is_empty());

        tokio::time::advance(TIMEOUT).await;
        let expired = correlator.expire_stale();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, op.id);
        assert!(correlator.pending().is_empty());
    }

    #[test]
    fn test_register_is_idempotent() {
        let (events, correlator) = correlator();
        let _listener = events.subscribe();
        let a = correlator.register_source(deposit_leg());
        let b = correlator.register_source(deposit_leg());
        assert_eq!(a, b);
        assert_eq!(correlator.operations().len(), 1);
    }

    #[test]
    fn test_unknown_operation() {
        let (_events, correlator) = correlator();
        assert!(matches!(
            correlator.source_reverted("nope"),
            Err(BridgeError::UnknownOperation(_))
        ));
    }
}
