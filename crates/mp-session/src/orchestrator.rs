use mp_api_types::{Account, MintError, MintReceipt};
use mp_contract::{ContractHandle, ContractReference, ContractTransport, SigningContext};
use mp_wallet_provider::WalletProvider;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, warn};

use crate::session::{SessionPhase, SessionState};
use crate::subscriber::{EventSubscriber, MintSink, MintedNotice};

/// Drives one session from `Disconnected` through minting.
///
/// Methods take `&self`; the session lock is never held across a wallet or
/// chain call, and a second mint while one is in flight gets
/// [`MintError::MintInProgress`].
pub struct MintOrchestrator {
    wallet: WalletProvider,
    contract: ContractReference,
    transport: Arc<dyn ContractTransport>,
    sink: Arc<dyn MintSink>,
    subscriber: EventSubscriber,
    session: Mutex<SessionState>,
    handle: Mutex<Option<Arc<ContractHandle>>>,
}

impl MintOrchestrator {
    pub fn new(
        wallet: WalletProvider,
        contract: ContractReference,
        transport: Arc<dyn ContractTransport>,
        sink: Arc<dyn MintSink>,
    ) -> Self {
        Self {
            wallet,
            contract,
            transport,
            subscriber: EventSubscriber::new(sink.clone()),
            sink,
            session: Mutex::new(SessionState::new()),
            handle: Mutex::new(None),
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.session.lock().await.phase().clone()
    }

    pub async fn current_account(&self) -> Option<Account> {
        self.session.lock().await.current_account().cloned()
    }

    pub async fn subscribe_phases(&self) -> broadcast::Receiver<SessionPhase> {
        self.session.lock().await.subscribe()
    }

    /// Reconnects without prompting when the wallet already authorized us.
    pub async fn restore(&self) -> Result<Option<Account>, MintError> {
        let accounts = self.wallet.query_authorized_accounts().await?;
        let Some(account) = accounts.into_iter().next() else {
            info!("no authorized account found");
            return Ok(None);
        };

        info!(%account, "found an authorized account");
        self.enter_connected(account.clone()).await?;
        Ok(Some(account))
    }

    /// Asks the wallet for authorization. Already connected sessions return
    /// their current account without prompting again.
    pub async fn connect(&self) -> Result<Account, MintError> {
        if let Some(account) = self.current_account().await {
            return Ok(account);
        }

        let accounts = self.wallet.request_authorization().await.inspect_err(|err| {
            warn!("error connecting to wallet: {}", err);
        })?;
        let account = accounts
            .into_iter()
            .next()
            .ok_or_else(|| MintError::AuthorizationDenied("wallet returned no accounts".to_owned()))?;

        info!(%account, "connected");
        self.enter_connected(account.clone()).await?;
        Ok(account)
    }

    /// Submits one mint for the current account and waits for it to land.
    pub async fn mint(&self) -> Result<MintReceipt, MintError> {
        let account = self.session.lock().await.begin_mint()?;

        let handle = match self.handle_for(&account).await {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(&account, err).await),
        };

        info!(%account, "requesting mint; wallet will ask to pay gas");
        let request = match handle.mint().await {
            Ok(request) => request,
            Err(err) => return Err(self.fail(&account, err).await),
        };

        self.session
            .lock()
            .await
            .minting(account.clone(), request.hash().clone());

        match handle.await_confirmation(request).await {
            Ok(receipt) => {
                self.session.lock().await.minted(account.clone());
                self.sink.deliver(MintedNotice::confirmed(account, &receipt));
                Ok(receipt)
            }
            Err(err) => Err(self.fail(&account, err).await),
        }
    }

    async fn enter_connected(&self, account: Account) -> Result<(), MintError> {
        let changed = self.session.lock().await.connect(account.clone())?;
        if changed {
            // Handles never outlive the account they sign for.
            self.handle.lock().await.take();
        }
        self.attach_listener(&account).await;
        Ok(())
    }

    async fn attach_listener(&self, account: &Account) {
        if self.session.lock().await.listener_attached() {
            return;
        }

        let attached = match self.handle_for(account).await {
            Ok(handle) => self.subscriber.attach(&handle).await,
            Err(err) => Err(err),
        };

        match attached {
            Ok(_) => {
                self.session.lock().await.mark_listener_attached();
                info!("finished setting up event listener");
            }
            Err(err) => warn!("unable to set up event listener: {}", err),
        }
    }

    async fn handle_for(&self, account: &Account) -> Result<Arc<ContractHandle>, MintError> {
        let mut cached = self.handle.lock().await;
        if let Some(handle) = cached.as_ref().filter(|h| h.account() == account) {
            return Ok(handle.clone());
        }

        let signer = SigningContext::new(Some(account))?;
        let handle = Arc::new(ContractHandle::bind(
            self.contract.clone(),
            signer,
            self.transport.clone(),
        ));
        *cached = Some(handle.clone());
        Ok(handle)
    }

    async fn fail(&self, account: &Account, err: MintError) -> MintError {
        warn!(%account, kind = %err.kind(), "unable to mint: {}", err);
        self.session.lock().await.failed(account.clone(), err.kind());
        err
    }
}
