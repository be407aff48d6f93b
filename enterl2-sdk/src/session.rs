//! Connected client session
//!
//! A [`Session`] wires the collaborators (chains, signer, wallet registry) to
//! the validator, fee estimator, builder, trackers and bridge correlator, and
//! exposes the payment and bridge flows through [`PaymentService`] and
//! [`BridgeService`].

use ethers::types::{Address, H256, U256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bridge::{BridgeCorrelator, SourceLeg};
use crate::builder::TransactionBuilder;
use crate::chain::{ChainEvent, ChainRpc, EventFilter, EventTopic, NoWalletRegistry, TransactionSigner, WalletRegistry};
use crate::config::SdkConfig;
use crate::error::{Result, SdkError, TrackingError, ValidationError};
use crate::events::{EventBroadcaster, SdkEvent, Subscription};
use crate::fees::FeeEstimator;
use crate::rpc::{ContractWalletRegistry, HttpChainRpc};
use crate::signer::LocalKeySigner;
use crate::tracker::ConfirmationTracker;
use crate::types::{
    BridgeOperation, FeeEstimate, NetworkInfo, ResolvedIntent, TransactionIntent, TransactionKind,
    TransactionRecord, WalletInfo, NATIVE_TOKEN,
};
use crate::validator::PaymentValidator;

/// External collaborators a session runs against
#[derive(Clone)]
pub struct Collaborators {
    pub l2: Arc<dyn ChainRpc>,
    /// Needed for deposits and withdrawal completion only
    pub l1: Option<Arc<dyn ChainRpc>>,
    pub registry: Arc<dyn WalletRegistry>,
    pub signer: Arc<dyn TransactionSigner>,
}

impl Collaborators {
    /// JSON-RPC collaborators for the configured endpoints
    pub fn from_config(config: &SdkConfig, signer: Arc<dyn TransactionSigner>) -> Result<Self> {
        let l2 = HttpChainRpc::l2(config)?;
        let l1 = HttpChainRpc::l1(config)?;

        let registry: Arc<dyn WalletRegistry> = if config.contracts.wallet_factory.is_zero() {
            log::warn!("[Session] No wallet factory configured, treating every address as unregistered");
            Arc::new(NoWalletRegistry)
        } else {
            Arc::new(ContractWalletRegistry::new(l2.clone(), config.contracts.wallet_factory))
        };

        Ok(Self {
            l2: Arc::new(l2),
            l1: l1.map(|rpc| Arc::new(rpc) as Arc<dyn ChainRpc>),
            registry,
            signer,
        })
    }
}

/// Per-chain pipeline: validate, estimate, build, sign, submit, track
struct ChainContext {
    chain: Arc<dyn ChainRpc>,
    validator: PaymentValidator,
    fees: FeeEstimator,
    builder: TransactionBuilder,
    tracker: Arc<ConfirmationTracker>,
}

impl ChainContext {
    fn new(
        config: &SdkConfig,
        chain: Arc<dyn ChainRpc>,
        registry: Arc<dyn WalletRegistry>,
        bridge_contract: Address,
    ) -> Self {
        Self {
            validator: PaymentValidator::new(chain.clone(), registry),
            fees: FeeEstimator::new(chain.clone())
                .with_fee_token(config.fee_token)
                .with_default_fee_payer(config.default_fee_payer),
            builder: TransactionBuilder::new(chain.clone(), bridge_contract),
            tracker: Arc::new(
                ConfirmationTracker::new(chain.clone()).with_poll_interval(config.poll_interval),
            ),
            chain,
        }
    }

    async fn estimate(&self, intent: &ResolvedIntent) -> Result<FeeEstimate> {
        let (sender, recipient) = self.validator.wallets(intent).await?;
        Ok(self
            .fees
            .estimate(intent, sender.as_ref(), recipient.as_ref())
            .await?)
    }

    /// Sign and broadcast. The signature must recover to the signer.
    async fn submit(
        &self,
        signer: &dyn TransactionSigner,
        intent: &ResolvedIntent,
        sender: Option<&WalletInfo>,
        recipient: Option<&WalletInfo>,
    ) -> Result<H256> {
        let fee = self.fees.estimate(intent, sender, recipient).await?;
        let unsigned = self.builder.build(intent, &fee).await?;
        let signed = signer.sign(&unsigned).await.map_err(SdkError::Signing)?;

        let recovered = signed.recover_signer().map_err(SdkError::Signing)?;
        if recovered != signer.address() {
            return Err(SdkError::Signing(format!(
                "signature recovers to {:?}, expected {:?}",
                recovered,
                signer.address()
            )));
        }

        Ok(self.tracker.submit(&signed).await?)
    }
}

/// A connected client
pub struct Session {
    config: SdkConfig,
    signer: Arc<dyn TransactionSigner>,
    l2: ChainContext,
    l1: Option<ChainContext>,
    events: Arc<EventBroadcaster>,
    correlator: Arc<BridgeCorrelator>,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

impl Session {
    /// Connect with a hex private key against the configured JSON-RPC endpoints
    pub async fn connect_with_private_key(config: SdkConfig, private_key: &str) -> Result<Self> {
        let signer = LocalKeySigner::from_private_key(private_key).map_err(SdkError::Signing)?;
        let collaborators = Collaborators::from_config(&config, Arc::new(signer))?;
        Self::connect(config, collaborators).await
    }

    /// Wire the components and start listening for incoming payments and
    /// bridge completions
    pub async fn connect(config: SdkConfig, collaborators: Collaborators) -> Result<Self> {
        let events = Arc::new(EventBroadcaster::new());
        let correlator = Arc::new(
            BridgeCorrelator::new(events.clone())
                .with_operation_timeout(config.bridge_timeout)
                .with_poll_interval(config.poll_interval),
        );

        let l2 = ChainContext::new(
            &config,
            collaborators.l2.clone(),
            collaborators.registry.clone(),
            config.contracts.bridge,
        );
        let l1 = collaborators.l1.clone().map(|chain| {
            ChainContext::new(&config, chain, collaborators.registry.clone(), config.contracts.l1_bridge)
        });

        let session = Self {
            signer: collaborators.signer,
            l2,
            l1,
            events,
            correlator,
            connected: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
            config,
        };
        session.start_listeners().await?;

        log::info!(
            "[Session] Connected {:?} to chain {}{}",
            session.address(),
            session.l2.chain.chain_id(),
            if session.l1.is_some() { " (bridging enabled)" } else { "" }
        );
        Ok(session)
    }

    async fn start_listeners(&self) -> Result<()> {
        let incoming = self
            .l2
            .chain
            .subscribe(EventTopic::Payments, EventFilter::recipient(self.address()))
            .await?;
        tokio::spawn(forward_payments(incoming, self.events.clone(), self.shutdown.clone()));

        let deposits = self
            .l2
            .chain
            .subscribe(EventTopic::DepositsFinalized, EventFilter::default())
            .await?;
        tokio::spawn(run_correlator(deposits, self.correlator.clone(), self.shutdown.clone()));

        if let Some(l1) = &self.l1 {
            let withdrawals = l1
                .chain
                .subscribe(EventTopic::WithdrawalsFinalized, EventFilter::default())
                .await?;
            tokio::spawn(run_correlator(withdrawals, self.correlator.clone(), self.shutdown.clone()));
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stop listeners and pending bridge waits. Chain state is unaffected.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.shutdown.cancel();
            log::info!("[Session] Disconnected {:?}", self.address());
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SdkError::NotConnected)
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Register an event listener
    pub fn subscribe(&self) -> Subscription<SdkEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: &str) {
        self.events.unsubscribe(id);
    }

    /// L2 balance of the connected address; native asset when `token` is None
    pub async fn get_balance(&self, token: Option<Address>) -> Result<U256> {
        self.ensure_connected()?;
        Ok(self.l2.chain.get_balance(self.address(), token).await?)
    }

    /// Chain id, head block and gas price of the L2
    pub async fn network_info(&self) -> Result<NetworkInfo> {
        self.ensure_connected()?;
        let chain = &self.l2.chain;
        let (block_number, gas_price) = tokio::try_join!(chain.block_number(), chain.gas_price())?;
        Ok(NetworkInfo {
            network: self.config.network,
            chain_id: chain.chain_id(),
            block_number,
            gas_price,
        })
    }

    /// Current view of an L2 transaction
    pub async fn get_transaction(&self, hash: H256) -> Result<Option<TransactionRecord>> {
        self.ensure_connected()?;
        Ok(self.l2.tracker.lookup(hash).await?)
    }

    /// Wait for an L2 transaction; `timeout` defaults to the configured one
    pub async fn wait_for_transaction(
        &self,
        hash: H256,
        confirmations: u64,
        timeout: Option<Duration>,
    ) -> Result<TransactionRecord> {
        self.ensure_connected()?;
        let timeout = timeout.unwrap_or(self.config.timeout);
        Ok(self.l2.tracker.track(hash, confirmations, timeout).await?)
    }

    /// Stop tracking an L2 transaction client-side
    pub fn cancel_tracking(&self, hash: H256) -> bool {
        self.l2.tracker.cancel(hash)
    }

    pub fn payments(&self) -> PaymentService<'_> {
        PaymentService { session: self }
    }

    pub fn bridge(&self) -> BridgeService<'_> {
        BridgeService { session: self }
    }

    fn l1(&self) -> Result<&ChainContext> {
        self.l1
            .as_ref()
            .ok_or_else(|| SdkError::Config("no L1 endpoint configured".to_string()))
    }

    fn context_for(&self, kind: TransactionKind) -> Result<&ChainContext> {
        match kind {
            TransactionKind::Deposit => self.l1(),
            TransactionKind::Payment | TransactionKind::Withdrawal => Ok(&self.l2),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn forward_payments(
    mut incoming: Subscription<ChainEvent>,
    events: Arc<EventBroadcaster>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = incoming.recv() => event,
        };
        match event {
            Some(ChainEvent::Payment(payment)) => {
                log::info!(
                    "[Session] Received {} from {:?} (tx {:?})",
                    payment.amount,
                    payment.from,
                    payment.tx_hash
                );
                events.broadcast(SdkEvent::PaymentReceived { payment });
            }
            Some(_) => {}
            None => break,
        }
    }
    log::debug!("[Session] Payment listener stopped");
}

async fn run_correlator(
    destination_events: Subscription<ChainEvent>,
    correlator: Arc<BridgeCorrelator>,
    shutdown: CancellationToken,
) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = correlator.run(destination_events) => {}
    }
}

/// Payments on the L2
pub struct PaymentService<'a> {
    session: &'a Session,
}

impl PaymentService<'_> {
    /// Fee for an intent on the chain it executes on. No balance check.
    pub async fn estimate_fees(&self, intent: &TransactionIntent) -> Result<FeeEstimate> {
        self.session.ensure_connected()?;
        let resolved = intent.resolve()?;
        self.session
            .context_for(resolved.kind)?
            .estimate(&resolved)
            .await
    }

    /// Validate, sign, submit and wait for the configured confirmations
    pub async fn send_payment(&self, intent: &TransactionIntent) -> Result<TransactionRecord> {
        let session = self.session;
        session.ensure_connected()?;
        if intent.kind != TransactionKind::Payment {
            return Err(ValidationError::PolicyViolation(format!(
                "send_payment cannot send a {} intent",
                intent.kind
            ))
            .into());
        }

        let l2 = &session.l2;
        let validated = l2.validator.validate(intent, session.address()).await?;
        let hash = l2
            .submit(
                session.signer.as_ref(),
                &validated.intent,
                validated.sender.as_ref(),
                validated.recipient.as_ref(),
            )
            .await?;

        let record = l2
            .tracker
            .track(hash, session.config.required_confirmations, session.config.timeout)
            .await?;

        session.events.broadcast(SdkEvent::PaymentSent {
            record: record.clone(),
        });
        Ok(record)
    }

    /// Pay an `enterl2://pay` request from the connected address
    pub async fn pay_request(&self, url: &str) -> Result<TransactionRecord> {
        let request = crate::payment_request::parse_payment_request(url)?;
        let intent = request.to_intent(format!("{:?}", self.session.address()));
        self.send_payment(&intent).await
    }
}

/// Cross-chain transfers between the L1 and the L2
pub struct BridgeService<'a> {
    session: &'a Session,
}

impl BridgeService<'_> {
    /// Move `amount` of `token` from the L1 to `recipient` (default: self) on the L2
    pub async fn deposit(
        &self,
        token: Address,
        amount: U256,
        recipient: Option<Address>,
    ) -> Result<TransactionRecord> {
        let intent = self.intent(TransactionKind::Deposit, token, amount, recipient, None)?;
        self.bridge(intent).await
    }

    /// Move `amount` of `token` from the L2 to `recipient` (default: self) on the L1
    pub async fn withdraw(
        &self,
        token: Address,
        amount: U256,
        recipient: Option<Address>,
    ) -> Result<TransactionRecord> {
        let nonce = H256::from(rand::random::<[u8; 32]>());
        let intent = self.intent(TransactionKind::Withdrawal, token, amount, recipient, Some(nonce))?;
        self.bridge(intent).await
    }

    pub fn operation(&self, id: &str) -> Option<BridgeOperation> {
        self.session.correlator.operation(id)
    }

    /// Operation opened by a source transaction
    pub fn operation_for_source(&self, source_tx_hash: H256) -> Option<BridgeOperation> {
        self.session.correlator.operation_for_source(source_tx_hash)
    }

    pub fn operations(&self) -> Vec<BridgeOperation> {
        self.session.correlator.operations()
    }

    pub fn pending(&self) -> Vec<BridgeOperation> {
        self.session.correlator.pending()
    }

    pub async fn wait_for_completion(&self, id: &str) -> Result<BridgeOperation> {
        Ok(self.session.correlator.wait_for_completion(id).await?)
    }

    fn intent(
        &self,
        kind: TransactionKind,
        token: Address,
        amount: U256,
        recipient: Option<Address>,
        bridge_nonce: Option<H256>,
    ) -> Result<TransactionIntent> {
        let session = self.session;
        session.ensure_connected()?;
        let from = session.address();

        Ok(TransactionIntent {
            kind,
            from: format!("{:?}", from),
            to: format!("{:?}", recipient.unwrap_or(from)),
            amount: amount.to_string(),
            token: (token != NATIVE_TOKEN).then(|| format!("{:?}", token)),
            description: None,
            fee_payer: None,
            bridge_nonce,
        })
    }

    async fn bridge(&self, intent: TransactionIntent) -> Result<TransactionRecord> {
        let session = self.session;
        let context = session.context_for(intent.kind)?;

        let validated = context.validator.validate(&intent, session.address()).await?;
        let resolved = &validated.intent;
        let hash = context
            .submit(
                session.signer.as_ref(),
                resolved,
                validated.sender.as_ref(),
                validated.recipient.as_ref(),
            )
            .await?;

        let token = resolved.token.unwrap_or(NATIVE_TOKEN);
        let leg = match resolved.bridge_nonce {
            Some(nonce) => SourceLeg::withdrawal(hash, nonce, resolved.to, token, resolved.amount),
            None => SourceLeg::deposit(hash, resolved.to, token, resolved.amount),
        };
        let operation = session.correlator.register_source(leg);
        spawn_completion_wait(session, operation.id.clone());

        match context
            .tracker
            .track(hash, session.config.required_confirmations, session.config.timeout)
            .await
        {
            Ok(record) => Ok(record),
            Err(e) => {
                if matches!(e, TrackingError::TransactionFailed { .. }) {
                    let _ = session.correlator.source_reverted(&operation.id);
                }
                Err(e.into())
            }
        }
    }
}

/// Fail the operation once its deadline passes without a destination leg
fn spawn_completion_wait(session: &Session, id: String) {
    let correlator = session.correlator.clone();
    let shutdown = session.shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = correlator.wait_for_completion(&id) => match result {
                Ok(operation) => log::debug!("[Session] Bridge operation {} is {}", id, operation.status),
                Err(e) => log::warn!("[Session] Bridge operation {}: {}", id, e),
            }
        }
    });
}
