//! Session controller: turns button presses into chain calls and keeps the
//! in-memory session, the persisted mirror, and the status line in step.
//!
//! All methods take `&self`. State lives in a `RefCell` that is never
//! borrowed across an `.await`, so a browser can share one controller
//! between concurrently spawned click handlers.

use fm_api_types::{Receipt, Session, StatusMessage, WalletAddress};
use fm_chain_client::{ChainBinding, ChainError, Eip1193Provider, Sleeper, units};
use fm_storage::{KeyValueBackend, SessionStore, StorageError};
use std::cell::RefCell;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Submitting,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("a transaction is already pending; wait for it to confirm")]
    SubmissionInFlight,
    #[error("already waiting for the wallet")]
    ConnectInFlight,
    #[error("the session ended before the request completed")]
    Abandoned,
}

/// Text of the fund amount field. Kept between submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInput {
    pub fund_amount_ether: String,
}

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: Phase,
    pub session: Session,
    pub status: Option<StatusMessage>,
    pub pending: PendingInput,
    /// Ether the connected account has sent to the contract.
    pub contribution_ether: Option<String>,
    pub is_owner: Option<bool>,
}

#[derive(Debug, Default)]
struct ControllerState {
    view: Snapshot,
    /// Bumped on disconnect; results from an older epoch are dropped.
    epoch: u64,
}

struct AccountViews {
    balance: String,
    contribution: Option<String>,
    is_owner: Option<bool>,
}

type Listener = Box<dyn Fn(&Snapshot)>;

pub struct SessionController<P, S, B> {
    chain: ChainBinding<P, S>,
    store: SessionStore<B>,
    state: RefCell<ControllerState>,
    listener: RefCell<Option<Listener>>,
}

impl<P, S, B> SessionController<P, S, B>
where
    P: Eip1193Provider,
    S: Sleeper,
    B: KeyValueBackend,
{
    pub fn new(chain: ChainBinding<P, S>, store: SessionStore<B>) -> Self {
        Self {
            chain,
            store,
            state: RefCell::new(ControllerState::default()),
            listener: RefCell::new(None),
        }
    }

    /// Called with a fresh snapshot after every state change. The listener
    /// must not call back into the controller.
    pub fn subscribe(&self, listener: impl Fn(&Snapshot) + 'static) {
        *self.listener.borrow_mut() = Some(Box::new(listener));
    }

    pub fn chain(&self) -> &ChainBinding<P, S> {
        &self.chain
    }

    pub fn store(&self) -> &SessionStore<B> {
        &self.store
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().view.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().view.phase
    }

    fn epoch(&self) -> u64 {
        self.state.borrow().epoch
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.state.borrow().view)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let result = f(&mut self.state.borrow_mut().view);
        self.notify();
        result
    }

    fn notify(&self) {
        if let Some(listener) = self.listener.borrow().as_ref() {
            listener(&self.snapshot());
        }
    }

    fn set_status(&self, status: StatusMessage) {
        self.update(|view| view.status = Some(status));
    }

    fn fail<T>(&self, err: impl Into<SessionError>) -> Result<T, SessionError> {
        let err = err.into();
        warn!(error = %err, "action failed");
        self.set_status(StatusMessage::error(err.to_string()));
        Err(err)
    }

    fn persist(&self) {
        let session = self.read(|view| view.session.clone());
        if !session.connected {
            return;
        }
        if let Err(err) = self.store.save(&session) {
            warn!(error = %err, "could not persist session");
        }
    }

    /// Hydrate from the persisted session at start-up.
    ///
    /// A stored address is re-bound only if the wallet still exposes it
    /// without a prompt; otherwise the controller stays `Disconnected` and
    /// just shows the cached balance.
    pub async fn restore(&self) {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "persisted session unreadable; starting empty");
                None
            }
        };

        let Some(stored) = stored else {
            if let Ok(Some(balance)) = self.store.cached_balance() {
                self.update(|view| view.session.cached_balance_ether = balance);
            }
            return;
        };

        self.update(|view| {
            view.session.cached_balance_ether = stored.cached_balance_ether.clone();
        });
        if !self.chain.has_provider() || self.phase() != Phase::Disconnected {
            return;
        }

        let epoch = self.epoch();
        self.update(|view| view.phase = Phase::Connecting);
        let restored = self.chain.authorized_account(&stored.wallet_address).await;
        if self.epoch() != epoch {
            return;
        }

        match restored.and_then(|address| match address {
            Some(address) => self.chain.bind(&address).map(|()| Some(address)),
            None => Ok(None),
        }) {
            Ok(Some(address)) => {
                info!(wallet = %address, "session restored");
                self.enter_connected(&address);
                self.set_status(StatusMessage::info(format!("Reconnected as {address}")));
                let _ = self.refresh_balance().await;
            }
            Ok(None) => {
                debug!(wallet = %stored.wallet_address, "stored wallet no longer authorized");
                self.update(|view| view.phase = Phase::Disconnected);
                self.set_status(StatusMessage::info(format!(
                    "Last connected as {}; connect your wallet to continue",
                    stored.wallet_address
                )));
            }
            Err(err) => {
                self.update(|view| view.phase = Phase::Disconnected);
                let _ = self.fail::<()>(err);
            }
        }
    }

    pub async fn connect(&self) -> Result<WalletAddress, SessionError> {
        match self.phase() {
            Phase::Connected | Phase::Submitting => {
                let address = self.read(|view| view.session.wallet_address.clone());
                return Ok(WalletAddress(address));
            }
            Phase::Connecting => return Err(SessionError::ConnectInFlight),
            Phase::Disconnected => {}
        }

        let epoch = self.epoch();
        self.update(|view| {
            view.phase = Phase::Connecting;
            view.status = Some(StatusMessage::info("Waiting for wallet approval..."));
        });

        // Bind only after the epoch check.
        let requested = self.chain.request_account().await;
        if self.epoch() != epoch {
            return Err(SessionError::Abandoned);
        }

        match requested.and_then(|address| self.chain.bind(&address).map(|()| address)) {
            Ok(address) => {
                info!(wallet = %address, "wallet connected");
                self.enter_connected(&address);
                let connected = format!("Connected as {address}");
                self.set_status(StatusMessage::info(connected.clone()));
                match self.reload_views(epoch).await {
                    Ok(_) => {}
                    Err(SessionError::Abandoned) => return Err(SessionError::Abandoned),
                    Err(err) => {
                        warn!(error = %err, "balance unavailable after connect");
                        self.set_status(StatusMessage::info(format!(
                            "{connected} (balance unavailable: {err})"
                        )));
                    }
                }
                Ok(address)
            }
            Err(err) => {
                self.update(|view| view.phase = Phase::Disconnected);
                self.fail(err)
            }
        }
    }

    fn enter_connected(&self, address: &WalletAddress) {
        self.update(|view| {
            let cached = view.session.cached_balance_ether.clone();
            view.session = Session::connected(address, &cached);
            view.phase = Phase::Connected;
        });
        self.persist();
    }

    /// Leave the session. Pending confirmations are abandoned, not awaited.
    /// Wallet-side permission stays granted.
    pub fn disconnect(&self) {
        self.chain.unbind();
        {
            let mut state = self.state.borrow_mut();
            state.epoch += 1;
            state.view.phase = Phase::Disconnected;
            state.view.session = Session::default();
            state.view.contribution_ether = None;
            state.view.is_owner = None;
            state.view.status = Some(StatusMessage::info("Disconnected"));
        }
        self.notify();
        if let Err(err) = self.store.clear() {
            warn!(error = %err, "could not clear persisted session");
        }
        info!("wallet disconnected");
    }

    /// The wallet switched or revoked accounts. A session bound to an
    /// account that is no longer exposed is ended.
    pub fn accounts_changed(&self, accounts: &[String]) {
        let current = self.read(|view| view.session.wallet_address.clone());
        if current.is_empty() || accounts.iter().any(|a| a.eq_ignore_ascii_case(&current)) {
            return;
        }
        info!(wallet = %current, "wallet account changed");
        self.disconnect();
        self.set_status(StatusMessage::info(
            "Wallet account changed; connect again to continue",
        ));
    }

    pub async fn submit_fund(&self, amount_ether: &str) -> Result<Receipt, SessionError> {
        self.update(|view| view.pending.fund_amount_ether = amount_ether.to_owned());
        self.ensure_connected()?;

        let amount = amount_ether.trim().to_owned();
        if let Err(err) = units::parse_ether_amount(&amount) {
            return self.fail(err);
        }

        let epoch = self.begin_submission(format!("Funding {amount} ETH..."))?;
        let outcome = async {
            let tx_hash = self.chain.fund(&amount).await?;
            self.note_submitted(epoch, &tx_hash.0);
            self.chain.await_confirmation(&tx_hash).await
        }
        .await;

        self.finish_submission(epoch, outcome, |_| format!("Funded {amount} ETH successfully"))
            .await
    }

    pub async fn submit_withdraw(&self) -> Result<Receipt, SessionError> {
        self.ensure_connected()?;

        let epoch = self.begin_submission("Withdrawing funds...".to_owned())?;
        let outcome = async {
            let tx_hash = self.chain.withdraw().await?;
            self.note_submitted(epoch, &tx_hash.0);
            self.chain.await_confirmation(&tx_hash).await
        }
        .await;

        self.finish_submission(epoch, outcome, |balance| {
            format!("Withdrawal successful; contract balance is now {balance} ETH")
        })
        .await
    }

    /// Re-read the contract balance. Works in any phase; when connected the
    /// account's contribution is refreshed and the session persisted.
    pub async fn refresh_balance(&self) -> Result<String, SessionError> {
        let epoch = self.epoch();
        match self.reload_views(epoch).await {
            Ok(balance) => Ok(balance),
            Err(SessionError::Abandoned) => Err(SessionError::Abandoned),
            Err(err) => self.fail(err),
        }
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        match self.phase() {
            Phase::Connected => Ok(()),
            Phase::Submitting => Err(self.in_flight()),
            Phase::Disconnected | Phase::Connecting => self.fail(ChainError::NotConnected),
        }
    }

    /// The pending transaction keeps its progress status.
    fn in_flight(&self) -> SessionError {
        debug!("submission rejected; another is still pending");
        SessionError::SubmissionInFlight
    }

    fn begin_submission(&self, progress: String) -> Result<u64, SessionError> {
        let mut state = self.state.borrow_mut();
        if state.view.phase != Phase::Connected {
            drop(state);
            return Err(self.in_flight());
        }
        state.view.phase = Phase::Submitting;
        state.view.status = Some(StatusMessage::info(progress));
        let epoch = state.epoch;
        drop(state);
        self.notify();
        Ok(epoch)
    }

    fn note_submitted(&self, epoch: u64, tx_hash: &str) {
        if self.epoch() == epoch {
            self.set_status(StatusMessage::info(format!(
                "Transaction {tx_hash} submitted; waiting for confirmation..."
            )));
        }
    }

    async fn finish_submission(
        &self,
        epoch: u64,
        outcome: Result<Receipt, ChainError>,
        success: impl FnOnce(&str) -> String,
    ) -> Result<Receipt, SessionError> {
        if self.epoch() != epoch {
            debug!("dropping result of a submission from an ended session");
            return Err(SessionError::Abandoned);
        }

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(err) => {
                self.update(|view| view.phase = Phase::Connected);
                return self.fail(err);
            }
        };

        let refreshed = self.reload_views(epoch).await;
        if self.epoch() != epoch {
            return Err(SessionError::Abandoned);
        }
        self.update(|view| view.phase = Phase::Connected);

        let status = match refreshed {
            Ok(balance) => StatusMessage::info(success(&balance)),
            Err(err) => {
                warn!(error = %err, "balance refresh failed after confirmation");
                let cached = self.read(|view| view.session.cached_balance_ether.clone());
                StatusMessage::info(format!("{} (balance refresh failed: {err})", success(&cached)))
            }
        };
        self.set_status(status);
        Ok(receipt)
    }

    async fn reload_views(&self, epoch: u64) -> Result<String, SessionError> {
        let views = self.read_views().await?;
        if self.epoch() != epoch {
            return Err(SessionError::Abandoned);
        }

        let balance = views.balance.clone();
        self.update(|view| {
            view.session.cached_balance_ether = views.balance;
            if view.session.connected {
                view.contribution_ether = views.contribution;
                view.is_owner = views.is_owner;
            }
        });
        self.persist();
        Ok(balance)
    }

    async fn read_views(&self) -> Result<AccountViews, ChainError> {
        let balance = self.chain.read_balance().await?;
        let address = self.read(|view| view.session.wallet_address.clone());
        if address.is_empty() || !self.chain.is_bound() {
            return Ok(AccountViews {
                balance,
                contribution: None,
                is_owner: None,
            });
        }

        let address = WalletAddress(address);
        let contribution = match self.chain.funded_by(&address).await {
            Ok(funded) => Some(funded),
            Err(err) => {
                warn!(error = %err, "could not read contribution");
                None
            }
        };
        let is_owner = match self.chain.owner().await {
            Ok(owner) => Some(owner == address),
            Err(err) => {
                warn!(error = %err, "could not read contract owner");
                None
            }
        };
        Ok(AccountViews {
            balance,
            contribution,
            is_owner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::U256;
    use fm_api_types::{AppConfig, StatusKind};
    use fm_chain_client::testing::{MockProvider, YieldSleeper};
    use fm_storage::InMemoryBackend;
    use std::cell::Cell;
    use std::rc::Rc;

    const ACCOUNT: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    type TestController = SessionController<MockProvider, YieldSleeper, Rc<InMemoryBackend>>;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn one_ether() -> U256 {
        U256::exp10(18)
    }

    fn setup(provider: Option<MockProvider>) -> (TestController, Rc<InMemoryBackend>) {
        init_tracing();
        let config = AppConfig {
            max_confirmation_polls: 20,
            ..AppConfig::default()
        };
        let backend = Rc::new(InMemoryBackend::default());
        let chain = ChainBinding::new(provider, YieldSleeper, &config).unwrap();
        let store = SessionStore::new(backend.clone(), &config.storage_namespace);
        (SessionController::new(chain, store), backend)
    }

    async fn connected(balance: U256) -> (TestController, MockProvider, Rc<InMemoryBackend>) {
        let provider = MockProvider::new(ACCOUNT, balance);
        let (controller, backend) = setup(Some(provider.clone()));
        controller.connect().await.unwrap();
        provider.clear_calls();
        (controller, provider, backend)
    }

    /// In-memory backend whose operations can be switched to fail.
    #[derive(Default)]
    struct FailingBackend {
        inner: InMemoryBackend,
        fail_get: Cell<bool>,
        fail_set: Cell<bool>,
        fail_remove: Cell<bool>,
    }

    impl KeyValueBackend for FailingBackend {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_get.get() {
                return Err(StorageError::Read {
                    key: key.to_owned(),
                    reason: "SecurityError".to_owned(),
                });
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_set.get() {
                return Err(StorageError::Write {
                    key: key.to_owned(),
                    reason: "QuotaExceededError".to_owned(),
                });
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_remove.get() {
                return Err(StorageError::Write {
                    key: key.to_owned(),
                    reason: "SecurityError".to_owned(),
                });
            }
            self.inner.remove(key)
        }
    }

    fn setup_failing(
        provider: MockProvider,
    ) -> (
        SessionController<MockProvider, YieldSleeper, Rc<FailingBackend>>,
        Rc<FailingBackend>,
    ) {
        init_tracing();
        let config = AppConfig::default();
        let backend = Rc::new(FailingBackend::default());
        let chain = ChainBinding::new(Some(provider), YieldSleeper, &config).unwrap();
        let store = SessionStore::new(backend.clone(), &config.storage_namespace);
        (SessionController::new(chain, store), backend)
    }

    fn status(controller: &TestController) -> StatusMessage {
        controller.snapshot().status.expect("status should be set")
    }

    #[tokio::test]
    async fn starts_disconnected_and_empty() {
        let (controller, _) = setup(None);
        controller.restore().await;
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Disconnected);
        assert_eq!(snapshot.session, Session::default());
    }

    #[tokio::test]
    async fn connect_persists_the_provider_address() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        let (controller, _) = setup(Some(provider));

        let address = controller.connect().await.unwrap();
        let snapshot = controller.snapshot();

        assert_eq!(address.0, CHECKSUMMED);
        assert_eq!(snapshot.phase, Phase::Connected);
        assert!(snapshot.session.connected);
        assert_eq!(snapshot.session.wallet_address, address.0);
        assert_eq!(snapshot.session.cached_balance_ether, "1.0");
        assert_eq!(snapshot.is_owner, Some(true));

        let stored = controller.store().load().unwrap().unwrap();
        assert_eq!(stored.wallet_address, address.0);
        assert_eq!(stored.cached_balance_ether, "1.0");
    }

    #[tokio::test]
    async fn connect_without_wallet_stays_disconnected() {
        let (controller, backend) = setup(None);

        let err = controller.connect().await.unwrap_err();
        assert_eq!(err, SessionError::Chain(ChainError::ProviderUnavailable));
        assert_eq!(controller.phase(), Phase::Disconnected);
        assert_eq!(status(&controller).kind, StatusKind::Error);
        assert!(backend.keys().is_empty());
    }

    #[tokio::test]
    async fn rejected_permission_returns_to_disconnected() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        provider.update(|state| state.reject_connect = true);
        let (controller, _) = setup(Some(provider));

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Chain(ChainError::UserRejected(_))));
        assert_eq!(controller.phase(), Phase::Disconnected);
        assert!(!controller.chain().is_bound());
        assert!(status(&controller).is_error());
    }

    #[tokio::test]
    async fn invalid_amounts_never_reach_the_network() {
        let (controller, provider, _) = connected(one_ether()).await;

        for amount in ["", "0", "-1", "abc", "0.0"] {
            let err = controller.submit_fund(amount).await.unwrap_err();
            assert!(
                matches!(err, SessionError::Chain(ChainError::InvalidAmount(_))),
                "{amount:?} produced {err:?}"
            );
            assert_eq!(controller.phase(), Phase::Connected);
            assert!(status(&controller).is_error());
        }
        assert!(provider.calls().is_empty());
        assert_eq!(controller.snapshot().pending.fund_amount_ether, "0.0");
    }

    #[tokio::test]
    async fn fund_confirms_and_refreshes_balance() {
        let (controller, provider, backend) = connected(one_ether()).await;
        provider.update(|state| state.pending_polls = 2);

        let receipt = controller.submit_fund("0.05").await.unwrap();
        assert!(receipt.success);

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Connected);
        assert_eq!(snapshot.session.cached_balance_ether, "1.05");
        assert_eq!(snapshot.contribution_ether.as_deref(), Some("0.05"));
        let status = snapshot.status.unwrap();
        assert_eq!(status.kind, StatusKind::Informational);
        assert!(status.text.contains("0.05"));

        assert_eq!(
            backend.get("fundme:contractBalance").unwrap().as_deref(),
            Some("1.05")
        );
        assert_eq!(provider.contract_balance(), one_ether() + U256::from(50_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn declined_fund_returns_to_connected() {
        let (controller, provider, _) = connected(one_ether()).await;
        provider.update(|state| state.reject_send = true);

        let err = controller.submit_fund("0.05").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Chain(ChainError::TransactionRejected(_))
        ));
        assert_eq!(controller.phase(), Phase::Connected);
        assert_eq!(controller.snapshot().session.cached_balance_ether, "1.0");
    }

    #[tokio::test]
    async fn reverted_withdraw_leaves_balance_untouched() {
        let (controller, provider, backend) = connected(one_ether()).await;
        provider.update(|state| {
            state.withdraw_revert = Some(MockProvider::not_owner_error());
        });

        let err = controller.submit_withdraw().await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Chain(ChainError::ContractReverted(Some("NotOwner".to_owned())))
        );

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Connected);
        assert_eq!(snapshot.session.cached_balance_ether, "1.0");
        assert!(snapshot.status.unwrap().text.contains("NotOwner"));
        assert_eq!(
            backend.get("fundme:contractBalance").unwrap().as_deref(),
            Some("1.0")
        );
    }

    #[tokio::test]
    async fn withdraw_mined_as_failed_is_reported() {
        let (controller, provider, _) = connected(one_ether()).await;
        provider.update(|state| state.mine_reverted = true);

        let err = controller.submit_withdraw().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Chain(ChainError::TransactionFailed(_))
        ));
        assert_eq!(controller.phase(), Phase::Connected);
        assert_eq!(controller.snapshot().session.cached_balance_ether, "1.0");
    }

    #[tokio::test]
    async fn successful_withdraw_drains_contract() {
        let (controller, _, _) = connected(one_ether()).await;

        controller.submit_withdraw().await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.session.cached_balance_ether, "0.0");
        assert!(snapshot.status.unwrap().text.contains("Withdrawal successful"));
    }

    #[tokio::test]
    async fn withdraw_while_disconnected_makes_no_call() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        let (controller, _) = setup(Some(provider.clone()));

        let err = controller.submit_withdraw().await.unwrap_err();
        assert_eq!(err, SessionError::Chain(ChainError::NotConnected));
        assert_eq!(controller.phase(), Phase::Disconnected);
        assert!(provider.calls().is_empty());

        let err = controller.submit_fund("1").await.unwrap_err();
        assert_eq!(err, SessionError::Chain(ChainError::NotConnected));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn disconnect_clears_everything_it_owns() {
        let (controller, _, backend) = connected(one_ether()).await;
        backend.set("unrelated", "keep me").unwrap();

        controller.disconnect();
        let snapshot = controller.snapshot();

        assert_eq!(snapshot.phase, Phase::Disconnected);
        assert_eq!(snapshot.session, Session::default());
        assert_eq!(snapshot.contribution_ether, None);
        assert!(!controller.chain().is_bound());
        assert_eq!(controller.store().load().unwrap(), None);
        assert_eq!(backend.keys(), vec!["unrelated".to_owned()]);
    }

    #[tokio::test]
    async fn second_submission_is_rejected_while_one_is_pending() {
        let (controller, provider, _) = connected(one_ether()).await;
        provider.update(|state| state.pending_polls = 3);

        let (first, (before, second, after)) = tokio::join!(controller.submit_fund("0.05"), async {
            let before = controller.snapshot().status;
            let rejected = controller.submit_withdraw().await;
            (before, rejected, controller.snapshot().status)
        });

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), SessionError::SubmissionInFlight);
        // The pending fund keeps its progress line.
        assert!(before.as_ref().is_some_and(|status| status.text.starts_with("Funding 0.05")));
        assert_eq!(after, before);
        assert_eq!(controller.phase(), Phase::Connected);
        assert!(status(&controller).text.contains("0.05"));

        let sent: Vec<_> = provider
            .calls()
            .into_iter()
            .filter(|method| method == "eth_sendTransaction")
            .collect();
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn confirmation_after_disconnect_is_dropped() {
        let (controller, provider, backend) = connected(one_ether()).await;
        provider.update(|state| state.pending_polls = 3);

        let (funded, ()) = tokio::join!(controller.submit_fund("0.05"), async {
            tokio::task::yield_now().await;
            controller.disconnect();
        });

        assert_eq!(funded.unwrap_err(), SessionError::Abandoned);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Disconnected);
        assert_eq!(snapshot.session, Session::default());
        assert_eq!(snapshot.status.unwrap().text, "Disconnected");
        assert!(backend.keys().is_empty());
        // The transaction itself still landed on chain.
        assert_eq!(provider.contract_balance(), one_ether() + U256::from(50_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn restore_rebinds_an_authorized_wallet() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        provider.update(|state| state.authorized = true);
        let (controller, backend) = setup(Some(provider.clone()));
        backend.set("fundme:walletAddress", CHECKSUMMED).unwrap();
        backend.set("fundme:contractBalance", "0.5").unwrap();

        controller.restore().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Connected);
        assert_eq!(snapshot.session.wallet_address, CHECKSUMMED);
        assert_eq!(snapshot.session.cached_balance_ether, "1.0");
        assert!(controller.chain().is_bound());
        assert!(!provider.calls().contains(&"eth_requestAccounts".to_owned()));
    }

    #[tokio::test]
    async fn restore_without_permission_shows_cached_balance_only() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        let (controller, backend) = setup(Some(provider));
        backend.set("fundme:walletAddress", CHECKSUMMED).unwrap();
        backend.set("fundme:contractBalance", "0.5").unwrap();

        controller.restore().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Disconnected);
        assert!(!snapshot.session.connected);
        assert!(snapshot.session.wallet_address.is_empty());
        assert_eq!(snapshot.session.cached_balance_ether, "0.5");
        assert!(!controller.chain().is_bound());
    }

    #[tokio::test]
    async fn balance_refresh_needs_no_signer() {
        let provider = MockProvider::new(ACCOUNT, U256::exp10(17));
        let (controller, backend) = setup(Some(provider));

        assert_eq!(controller.refresh_balance().await.unwrap(), "0.1");
        assert_eq!(controller.snapshot().session.cached_balance_ether, "0.1");
        assert_eq!(controller.phase(), Phase::Disconnected);
        assert!(backend.keys().is_empty());
    }

    #[tokio::test]
    async fn listener_sees_intermediate_phases() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        let (controller, _) = setup(Some(provider));
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            controller.subscribe(move |snapshot| seen.borrow_mut().push(snapshot.phase));
        }

        controller.connect().await.unwrap();
        controller.submit_fund("1").await.unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.first(), Some(&Phase::Connecting));
        assert!(seen.contains(&Phase::Submitting));
        assert_eq!(seen.last(), Some(&Phase::Connected));
    }

    #[tokio::test]
    async fn switching_wallet_account_ends_the_session() {
        let (controller, _, backend) = connected(one_ether()).await;

        controller.accounts_changed(&[ACCOUNT.to_owned()]);
        assert_eq!(controller.phase(), Phase::Connected);

        controller.accounts_changed(&["0x0000000000000000000000000000000000000001".to_owned()]);
        assert_eq!(controller.phase(), Phase::Disconnected);
        assert!(!controller.chain().is_bound());
        assert!(backend.keys().is_empty());
        assert!(status(&controller).text.contains("account changed"));
    }

    #[tokio::test]
    async fn connect_is_idempotent_once_connected() {
        let (controller, provider, _) = connected(one_ether()).await;
        let address = controller.connect().await.unwrap();
        assert_eq!(address.0, CHECKSUMMED);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn stale_connect_leaves_newer_session_bound() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        provider.update(|state| state.connect_yields = 20);
        let (controller, _) = setup(Some(provider));

        let (first, second) = tokio::join!(controller.connect(), async {
            tokio::task::yield_now().await;
            controller.disconnect();
            controller.connect().await
        });

        assert_eq!(first.unwrap_err(), SessionError::Abandoned);
        assert_eq!(second.unwrap().0, CHECKSUMMED);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Connected);
        assert!(snapshot.session.connected);
        assert!(controller.chain().is_bound());
        controller.submit_fund("0.05").await.unwrap();
    }

    #[tokio::test]
    async fn stale_confirmation_does_not_touch_a_newer_session() {
        let (controller, provider, backend) = connected(one_ether()).await;
        provider.update(|state| state.pending_polls = 10);

        let (funded, fresh) = tokio::join!(controller.submit_fund("0.05"), async {
            tokio::task::yield_now().await;
            controller.disconnect();
            controller.connect().await.unwrap();
            controller.snapshot()
        });

        assert_eq!(funded.unwrap_err(), SessionError::Abandoned);
        assert_eq!(fresh.phase, Phase::Connected);
        assert_eq!(fresh.session.cached_balance_ether, "1.0");
        assert_eq!(controller.snapshot(), fresh);
        assert_eq!(
            backend.get("fundme:contractBalance").unwrap().as_deref(),
            Some("1.0")
        );
        assert_eq!(provider.contract_balance(), one_ether() + U256::from(50_000_000_000_000_000u64));
    }

    #[tokio::test]
    async fn connect_reports_an_unreadable_balance() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        provider.update(|state| state.fail_balance = true);
        let (controller, _) = setup(Some(provider));

        controller.connect().await.unwrap();

        assert_eq!(controller.phase(), Phase::Connected);
        let status = status(&controller);
        assert_eq!(status.kind, StatusKind::Informational);
        assert!(status.text.starts_with("Connected as"));
        assert!(status.text.contains("balance unavailable"));
    }

    #[tokio::test]
    async fn unreadable_storage_restores_an_empty_session() {
        let provider = MockProvider::new(ACCOUNT, one_ether());
        provider.update(|state| state.authorized = true);
        let (controller, backend) = setup_failing(provider);
        backend.inner.set("fundme:walletAddress", CHECKSUMMED).unwrap();
        backend.fail_get.set(true);

        controller.restore().await;

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Disconnected);
        assert_eq!(snapshot.session, Session::default());
        assert!(!controller.chain().is_bound());
    }

    #[tokio::test]
    async fn connect_survives_a_failed_save() {
        let (controller, backend) = setup_failing(MockProvider::new(ACCOUNT, one_ether()));
        backend.fail_set.set(true);

        controller.connect().await.unwrap();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Connected);
        assert!(snapshot.session.connected);
        assert!(!snapshot.status.unwrap().is_error());
        assert!(backend.inner.keys().is_empty());
    }

    #[tokio::test]
    async fn disconnect_survives_a_failed_clear() {
        let (controller, backend) = setup_failing(MockProvider::new(ACCOUNT, one_ether()));
        controller.connect().await.unwrap();
        backend.fail_remove.set(true);

        controller.disconnect();

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.phase, Phase::Disconnected);
        assert_eq!(snapshot.session, Session::default());
        assert!(!controller.chain().is_bound());
    }
}
