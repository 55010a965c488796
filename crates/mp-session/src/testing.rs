//! Scripted wallet and chain doubles for session tests.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use mp_api_types::{Account, MintError, TxHash};
use mp_contract::{ContractReference, ContractTransport, LogFilter, RawLog, TxReceipt, TxRequest};
use mp_wallet_provider::{ProviderRpcError, USER_REJECTED, WalletCapability, WalletMethod};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

pub(crate) const CONTRACT: &str = "0x925Bf916Bb018dBaf6beD4e15eF63c5650ecc842";

pub(crate) const NFT_ABI: &str = r#"{
    "contractName": "NFTContract",
    "abi": [
        {"type": "function", "name": "makeNFT", "inputs": [], "outputs": [], "stateMutability": "nonpayable"},
        {"type": "event", "name": "NewNFTMinted", "anonymous": false, "inputs": [
            {"name": "sender", "type": "address", "indexed": false},
            {"name": "tokenId", "type": "uint256", "indexed": false}
        ]}
    ]
}"#;

pub(crate) fn reference() -> ContractReference {
    ContractReference::new(CONTRACT, NFT_ABI).expect("test interface is valid")
}

pub(crate) struct MockWallet {
    authorized: Mutex<Vec<String>>,
    on_request: Result<Vec<String>, ProviderRpcError>,
    calls: Mutex<Vec<WalletMethod>>,
}

impl MockWallet {
    fn new(authorized: &[&str], on_request: Result<Vec<String>, ProviderRpcError>) -> Arc<Self> {
        Arc::new(Self {
            authorized: Mutex::new(authorized.iter().map(|a| a.to_string()).collect()),
            on_request,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Already authorized; a prompt would also return these.
    pub(crate) fn authorized(accounts: &[&str]) -> Arc<Self> {
        Self::new(accounts, Ok(accounts.iter().map(|a| a.to_string()).collect()))
    }

    /// Nothing authorized yet; the prompt grants `accounts`.
    pub(crate) fn granting(accounts: &[&str]) -> Arc<Self> {
        Self::new(&[], Ok(accounts.iter().map(|a| a.to_string()).collect()))
    }

    pub(crate) fn denying() -> Arc<Self> {
        Self::new(&[], Err(ProviderRpcError::new(USER_REJECTED, "User rejected the request.")))
    }

    /// The user picked another account in the wallet.
    pub(crate) fn switch_to(&self, account: &str) {
        *self.authorized.lock().unwrap() = vec![account.to_string()];
    }

    pub(crate) fn prompts(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| **m == WalletMethod::RequestAccounts)
            .count()
    }
}

#[async_trait]
impl WalletCapability for MockWallet {
    async fn request(&self, method: WalletMethod) -> Result<Vec<String>, ProviderRpcError> {
        self.calls.lock().unwrap().push(method);
        match method {
            WalletMethod::Accounts => Ok(self.authorized.lock().unwrap().clone()),
            WalletMethod::RequestAccounts => self.on_request.clone(),
        }
    }
}

pub(crate) enum Confirm {
    Success { token_id: Option<u64> },
    Reverted,
    Lost,
}

pub(crate) struct MockChain {
    pub(crate) reference: ContractReference,
    sends: Mutex<VecDeque<Result<TxHash, MintError>>>,
    confirms: Mutex<VecDeque<Confirm>>,
    gate: Mutex<Option<Arc<Notify>>>,
    sent: Mutex<Vec<TxRequest>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<RawLog>>>,
}

impl MockChain {
    pub(crate) fn new() -> Self {
        Self {
            reference: reference(),
            sends: Mutex::new(VecDeque::new()),
            confirms: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn will_send(&self, result: Result<TxHash, MintError>) {
        self.sends.lock().unwrap().push_back(result);
    }

    pub(crate) fn will_confirm(&self, confirm: Confirm) {
        self.confirms.lock().unwrap().push_back(confirm);
    }

    /// Holds every confirmation until the returned `Notify` is signalled.
    pub(crate) fn hold_confirmations(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub(crate) fn senders(&self) -> Vec<Account> {
        self.sent.lock().unwrap().iter().map(|r| r.from.clone()).collect()
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.lock().unwrap().len()
    }

    pub(crate) fn emit_mint(&self, token_id: u64, tx_hash: Option<&str>) {
        let log = self.mint_log(token_id, tx_hash.map(TxHash::from));
        self.emit(log);
    }

    pub(crate) fn emit_garbage(&self) {
        let log = RawLog {
            address: self.reference.address(),
            topics: vec![self.reference.interface().mint_event().selector()],
            data: vec![0xff; 7],
            transaction_hash: None,
            block_number: None,
        };
        self.emit(log);
    }

    fn emit(&self, log: RawLog) {
        for watcher in self.watchers.lock().unwrap().iter() {
            let _ = watcher.send(log.clone());
        }
    }

    fn mint_log(&self, token_id: u64, tx_hash: Option<TxHash>) -> RawLog {
        let mut data = B256::left_padding_from(Address::repeat_byte(0xde).as_slice()).to_vec();
        data.extend_from_slice(&U256::from(token_id).to_be_bytes::<32>());
        RawLog {
            address: self.reference.address(),
            topics: vec![self.reference.interface().mint_event().selector()],
            data,
            transaction_hash: tx_hash,
            block_number: Some(1),
        }
    }
}

#[async_trait]
impl ContractTransport for MockChain {
    async fn send_transaction(&self, request: TxRequest) -> Result<TxHash, MintError> {
        self.sent.lock().unwrap().push(request);
        self.sends
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(TxHash::from("0x1")))
    }

    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt, MintError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let confirm = self
            .confirms
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Confirm::Success { token_id: None });

        match confirm {
            Confirm::Success { token_id } => Ok(TxReceipt {
                hash: hash.clone(),
                status: true,
                block_number: Some(1),
                logs: token_id
                    .map(|id| vec![self.mint_log(id, Some(hash.clone()))])
                    .unwrap_or_default(),
            }),
            Confirm::Reverted => Ok(TxReceipt {
                hash: hash.clone(),
                status: false,
                block_number: Some(1),
                logs: Vec::new(),
            }),
            Confirm::Lost => Err(MintError::Transport("connection lost".to_owned())),
        }
    }

    async fn watch_logs(&self, _filter: LogFilter) -> Result<mpsc::UnboundedReceiver<RawLog>, MintError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.lock().unwrap().push(tx);
        Ok(rx)
    }
}
