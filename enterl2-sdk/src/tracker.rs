//! Submission and confirmation tracking
//!
//! Each tracked hash gets at most one poll loop. Further `track` calls for the
//! same hash attach to the running loop and receive its result, while each
//! caller keeps its own deadline. A loop polls the transaction and its receipt
//! at a fixed cadence, swallows transient RPC errors, and ends on a definitive
//! receipt or cancellation. It is dropped once no caller waits on it.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ethers::types::{H256, U256};

use crate::builder::{SignedTransaction, UnsignedTransaction};
use crate::chain::{ChainReceipt, ChainRpc, ChainTransaction};
use crate::error::{RpcError, TrackingError};
use crate::types::{TransactionRecord, TransactionStatus, TransactionType, NATIVE_TOKEN};

/// Default poll cadence
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

type TrackOutcome = Result<TransactionRecord, TrackingError>;

struct PollLoop {
    id: u64,
    outcome: Shared<BoxFuture<'static, TrackOutcome>>,
    cancel: CancellationToken,
    waiters: usize,
}

enum Observation {
    Pending,
    Confirmed(ChainReceipt),
    Failed(ChainReceipt),
}

pub struct ConfirmationTracker {
    chain: Arc<dyn ChainRpc>,
    records: Arc<DashMap<H256, TransactionRecord>>,
    loops: DashMap<H256, PollLoop>,
    next_loop: AtomicU64,
    poll_interval: Duration,
}

impl ConfirmationTracker {
    pub fn new(chain: Arc<dyn ChainRpc>) -> Self {
        Self {
            chain,
            records: Arc::new(DashMap::new()),
            loops: DashMap::new(),
            next_loop: AtomicU64::new(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Broadcast a signed transaction and record it as Pending.
    /// Fails fast: submission errors are never retried.
    pub async fn submit(&self, signed: &SignedTransaction) -> Result<H256, TrackingError> {
        let hash = self.chain.submit(signed).await.map_err(|e| {
            log::error!("[Tracker] Submission failed: {}", e);
            TrackingError::SubmissionFailed(e)
        })?;

        self.records
            .entry(hash)
            .or_insert_with(|| pending_record(hash, &signed.transaction));
        log::info!(
            "[Tracker] Submitted {} transaction {:?}",
            signed.transaction.kind,
            hash
        );
        Ok(hash)
    }

    /// Wait until `hash` is final or `timeout` elapses.
    ///
    /// A timeout leaves the record Pending: the transaction may still land.
    pub async fn track(
        &self,
        hash: H256,
        required_confirmations: u64,
        timeout: Duration,
    ) -> Result<TransactionRecord, TrackingError> {
        if let Some(done) = self.terminal(hash) {
            return done;
        }

        let started = Instant::now();
        let (_waiter, outcome) = self.attach_or_start(hash, required_confirmations);
        tokio::select! {
            result = outcome => result,
            _ = tokio::time::sleep(timeout) => {
                let waited = started.elapsed();
                log::warn!("[Tracker] Gave up on {:?} after {:?}; outcome unknown", hash, waited);
                Err(TrackingError::Timeout { hash, waited })
            }
        }
    }

    /// Abandon tracking of a Pending transaction. The chain is unaffected.
    ///
    /// Returns true when the record moved to Cancelled.
    pub fn cancel(&self, hash: H256) -> bool {
        if let Some(poll_loop) = self.loops.get(&hash) {
            poll_loop.cancel.cancel();
        }
        match self.records.get_mut(&hash) {
            Some(mut record) => {
                let changed = record.transition(TransactionStatus::Cancelled);
                if changed {
                    log::info!("[Tracker] Stopped tracking {:?}", hash);
                }
                changed
            }
            None => false,
        }
    }

    /// Current view of `hash`: the final record when known, otherwise the
    /// chain's answer right now. Does not change stored records.
    pub async fn lookup(&self, hash: H256) -> Result<Option<TransactionRecord>, RpcError> {
        let known = self.record(hash);
        if let Some(record) = known.as_ref().filter(|r| r.is_terminal()) {
            return Ok(Some(record.clone()));
        }

        let tx = self.chain.get_transaction(hash).await?;
        let receipt = self.chain.get_receipt(hash).await?;
        if tx.is_none() && receipt.is_none() {
            return Ok(known);
        }

        let mut view = known.unwrap_or_else(|| adopted_record(hash, tx.as_ref()));
        if let Some(receipt) = receipt {
            view.status = if receipt.succeeded() {
                TransactionStatus::Confirmed
            } else {
                TransactionStatus::Failed
            };
            view.block_number = receipt.block_number;
            view.gas_used = receipt.gas_used;
        }
        Ok(Some(view))
    }

    pub fn record(&self, hash: H256) -> Option<TransactionRecord> {
        self.records.get(&hash).map(|r| r.clone())
    }

    pub fn records(&self) -> Vec<TransactionRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Number of live poll loops
    pub fn active_loops(&self) -> usize {
        self.loops.len()
    }

    fn terminal(&self, hash: H256) -> Option<TrackOutcome> {
        let record = self.records.get(&hash)?.clone();
        terminal_outcome(record)
    }

    fn attach_or_start(
        &self,
        hash: H256,
        required_confirmations: u64,
    ) -> (Waiter<'_>, Shared<BoxFuture<'static, TrackOutcome>>) {
        let (id, outcome) = match self.loops.entry(hash) {
            Entry::Occupied(mut existing) => {
                log::debug!("[Tracker] Attaching to running poll loop for {:?}", hash);
                let poll_loop = existing.get_mut();
                poll_loop.waiters += 1;
                (poll_loop.id, poll_loop.outcome.clone())
            }
            Entry::Vacant(slot) => {
                let id = self.next_loop.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                let outcome = run_loop(
                    self.chain.clone(),
                    self.records.clone(),
                    hash,
                    required_confirmations,
                    self.poll_interval,
                    cancel.clone(),
                )
                .boxed()
                .shared();
                slot.insert(PollLoop {
                    id,
                    outcome: outcome.clone(),
                    cancel,
                    waiters: 1,
                });
                (id, outcome)
            }
        };
        let waiter = Waiter {
            loops: &self.loops,
            hash,
            id,
        };
        (waiter, outcome)
    }
}

/// One caller waiting on a poll loop. The loop is dropped with its last
/// waiter, however that waiter ends.
struct Waiter<'a> {
    loops: &'a DashMap<H256, PollLoop>,
    hash: H256,
    id: u64,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let last = match self.loops.get_mut(&self.hash) {
            Some(mut poll_loop) if poll_loop.id == self.id => {
                poll_loop.waiters -= 1;
                poll_loop.waiters == 0
            }
            _ => false,
        };
        if last {
            self.loops
                .remove_if(&self.hash, |_, l| l.id == self.id && l.waiters == 0);
        }
    }
}

async fn run_loop(
    chain: Arc<dyn ChainRpc>,
    records: Arc<DashMap<H256, TransactionRecord>>,
    hash: H256,
    required_confirmations: u64,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> TrackOutcome {
    tokio::select! {
        outcome = poll_until_final(chain.as_ref(), &records, hash, required_confirmations, poll_interval) => outcome,
        _ = cancel.cancelled() => {
            let record = records.get(&hash).map(|r| r.clone());
            record
                .and_then(terminal_outcome)
                .unwrap_or(Err(TrackingError::Cancelled(hash)))
        }
    }
}

async fn poll_until_final(
    chain: &dyn ChainRpc,
    records: &DashMap<H256, TransactionRecord>,
    hash: H256,
    required_confirmations: u64,
    poll_interval: Duration,
) -> TrackOutcome {
    loop {
        match poll_once(chain, hash, required_confirmations).await {
            Ok((_, Observation::Pending)) => {
                log::debug!("[Tracker] Waiting for {:?}...", hash);
            }
            Ok((tx, Observation::Confirmed(receipt))) => {
                return settle(records, hash, TransactionStatus::Confirmed, &receipt, tx.as_ref());
            }
            Ok((tx, Observation::Failed(receipt))) => {
                log::warn!("[Tracker] Transaction {:?} reverted", hash);
                return settle(records, hash, TransactionStatus::Failed, &receipt, tx.as_ref());
            }
            Err(e) => {
                log::warn!("[Tracker] Poll for {:?} failed: {}, retrying...", hash, e);
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// One read of transaction + receipt, plus the head block when depth matters
async fn poll_once(
    chain: &dyn ChainRpc,
    hash: H256,
    required_confirmations: u64,
) -> Result<(Option<ChainTransaction>, Observation), RpcError> {
    let tx = chain.get_transaction(hash).await?;
    let receipt = match chain.get_receipt(hash).await? {
        Some(receipt) => receipt,
        None => return Ok((tx, Observation::Pending)),
    };

    if !receipt.succeeded() {
        return Ok((tx, Observation::Failed(receipt)));
    }
    if required_confirmations == 0 {
        return Ok((tx, Observation::Confirmed(receipt)));
    }

    let included = match receipt.block_number {
        Some(block) => block,
        None => return Ok((tx, Observation::Pending)),
    };
    let current = chain.block_number().await?;
    if current.saturating_sub(included) >= required_confirmations {
        Ok((tx, Observation::Confirmed(receipt)))
    } else {
        Ok((tx, Observation::Pending))
    }
}

/// Apply a terminal observation. Only the first writer changes the record.
fn settle(
    records: &DashMap<H256, TransactionRecord>,
    hash: H256,
    status: TransactionStatus,
    receipt: &ChainReceipt,
    tx: Option<&ChainTransaction>,
) -> TrackOutcome {
    let mut record = records
        .entry(hash)
        .or_insert_with(|| adopted_record(hash, tx));

    if record.transition(status) {
        record.block_number = receipt.block_number;
        record.gas_used = receipt.gas_used;
        log::info!(
            "[Tracker] {:?} is {} (block {:?})",
            hash,
            status,
            receipt.block_number
        );
    }

    let record = record.clone();
    terminal_outcome(record).unwrap_or_else(|| Err(TrackingError::Cancelled(hash)))
}

fn terminal_outcome(record: TransactionRecord) -> Option<TrackOutcome> {
    match record.status {
        TransactionStatus::Pending => None,
        TransactionStatus::Confirmed => Some(Ok(record)),
        TransactionStatus::Failed => Some(Err(TrackingError::TransactionFailed {
            hash: record.hash,
            record: Box::new(record),
        })),
        TransactionStatus::Cancelled => Some(Err(TrackingError::Cancelled(record.hash))),
    }
}

fn pending_record(hash: H256, tx: &UnsignedTransaction) -> TransactionRecord {
    TransactionRecord {
        hash,
        tx_type: tx.tx_type(),
        status: TransactionStatus::Pending,
        from: tx.from,
        to: tx.recipient,
        amount: tx.amount,
        token: tx.token,
        fee: tx.max_fee,
        fee_payer: tx.fee_payer,
        fee_token: tx.fee_token,
        block_number: None,
        gas_used: None,
        timestamp: Some(Utc::now()),
        description: tx.description.clone(),
    }
}

/// Record for a hash this tracker did not submit
fn adopted_record(hash: H256, tx: Option<&ChainTransaction>) -> TransactionRecord {
    let from = tx.map(|t| t.from).unwrap_or_default();
    TransactionRecord {
        hash,
        tx_type: TransactionType::Transfer,
        status: TransactionStatus::Pending,
        from,
        to: tx.and_then(|t| t.to).unwrap_or_default(),
        amount: tx.map(|t| t.value).unwrap_or_default(),
        token: None,
        fee: U256::zero(),
        fee_payer: from,
        fee_token: NATIVE_TOKEN,
        block_number: None,
        gas_used: None,
        timestamp: Some(Utc::now()),
        description: None,
    }
}
