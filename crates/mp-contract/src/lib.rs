pub mod abi;

use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::Event;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use mp_api_types::{Account, MintError, MintReceipt, TxHash};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use abi::{InterfaceDescriptor, LogDecodeError, MINT_EVENT, MINT_FUNCTION};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub transaction_hash: Option<TxHash>,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TxRequest {
    pub from: Account,
    pub to: Address,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub hash: TxHash,
    pub status: bool,
    pub block_number: Option<u64>,
    pub logs: Vec<RawLog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic: B256,
}

/// Reaches the chain on behalf of a [`ContractHandle`].
#[async_trait]
pub trait ContractTransport: Send + Sync {
    /// Asks the signing identity to sign and broadcast `request`.
    async fn send_transaction(&self, request: TxRequest) -> Result<TxHash, MintError>;
    /// Suspends until `hash` is included.
    async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt, MintError>;
    /// Standing registration; logs keep arriving until the receiver is dropped.
    async fn watch_logs(&self, filter: LogFilter) -> Result<mpsc::UnboundedReceiver<RawLog>, MintError>;
}

/// Deployed contract address plus its validated interface.
#[derive(Debug, Clone)]
pub struct ContractReference {
    address: Address,
    interface: Arc<InterfaceDescriptor>,
}

impl ContractReference {
    pub fn new(address: &str, interface_json: &str) -> Result<Self, MintError> {
        let address = Address::from_str(address.trim())
            .map_err(|err| MintError::InvalidInterface(format!("invalid contract address {address}: {err}")))?;
        let interface = InterfaceDescriptor::parse(interface_json)?;
        Ok(Self {
            address,
            interface: Arc::new(interface),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn interface(&self) -> &InterfaceDescriptor {
        &self.interface
    }
}

/// The account a handle signs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    account: Account,
}

impl SigningContext {
    pub fn new(current: Option<&Account>) -> Result<Self, MintError> {
        match current {
            Some(account) if !account.as_str().trim().is_empty() => Ok(Self {
                account: account.clone(),
            }),
            _ => Err(MintError::NotConnected),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

/// A submitted mint. Consumed by [`ContractHandle::await_confirmation`].
#[derive(Debug)]
pub struct MintRequest {
    hash: TxHash,
    account: Account,
}

impl MintRequest {
    pub fn hash(&self) -> &TxHash {
        &self.hash
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

pub struct DecodedLog {
    pub fields: Vec<DynSolValue>,
    pub transaction_hash: Option<TxHash>,
}

/// Decoding view over a transport log feed.
pub struct EventStream {
    event: Event,
    receiver: mpsc::UnboundedReceiver<RawLog>,
}

impl EventStream {
    /// Next decoded event; `None` once the transport stops delivering.
    pub async fn next(&mut self) -> Option<Result<DecodedLog, LogDecodeError>> {
        let log = self.receiver.recv().await?;
        Some(abi::decode_event(&self.event, &log.topics, &log.data).map(|fields| DecodedLog {
            fields,
            transaction_hash: log.transaction_hash,
        }))
    }
}

/// A contract bound to one signing account.
pub struct ContractHandle {
    id: Uuid,
    reference: ContractReference,
    signer: SigningContext,
    transport: Arc<dyn ContractTransport>,
}

impl ContractHandle {
    pub fn bind(
        reference: ContractReference,
        signer: SigningContext,
        transport: Arc<dyn ContractTransport>,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(%id, contract = %reference.address, account = %signer.account, "bound contract handle");
        Self {
            id,
            reference,
            signer,
            transport,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account(&self) -> &Account {
        self.signer.account()
    }

    pub fn reference(&self) -> &ContractReference {
        &self.reference
    }

    pub async fn mint(&self) -> Result<MintRequest, MintError> {
        let function = self.reference.interface.mint_function();
        let hash = self
            .transport
            .send_transaction(TxRequest {
                from: self.signer.account.clone(),
                to: self.reference.address,
                data: function.selector().to_vec(),
            })
            .await?;

        info!(%hash, account = %self.signer.account, "mint submitted");
        Ok(MintRequest {
            hash,
            account: self.signer.account.clone(),
        })
    }

    pub async fn await_confirmation(&self, request: MintRequest) -> Result<MintReceipt, MintError> {
        let receipt = self.transport.wait_for_receipt(&request.hash).await?;
        if !receipt.status {
            return Err(MintError::TransactionReverted { hash: request.hash });
        }

        let event = self.reference.interface.mint_event();
        let token_id = receipt
            .logs
            .iter()
            .filter(|log| log.address == self.reference.address)
            .filter_map(|log| abi::decode_event(event, &log.topics, &log.data).ok())
            .find_map(|fields| abi::normalize_mint_event(&fields).ok())
            .map(|minted| minted.token_id);

        info!(hash = %request.hash, token_id = ?token_id, "mint confirmed");
        Ok(MintReceipt {
            hash: request.hash,
            success: true,
            token_id,
            block_number: receipt.block_number,
        })
    }

    pub async fn subscribe(&self, event_name: &str) -> Result<EventStream, MintError> {
        let event = self
            .reference
            .interface
            .event(event_name)
            .cloned()
            .ok_or_else(|| MintError::InvalidInterface(format!("unknown event {event_name}")))?;
        abi::ensure_decodable(&event).inspect_err(|err| {
            warn!(event = event_name, "event cannot be decoded: {}", err);
        })?;

        let receiver = self
            .transport
            .watch_logs(LogFilter {
                address: self.reference.address,
                topic: event.selector(),
            })
            .await?;

        Ok(EventStream { event, receiver })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::tests::{NFT_ABI, word_for_address};
    use alloy_primitives::U256;
    use mp_api_types::TokenId;
    use std::sync::Mutex;

    const CONTRACT: &str = "0x925Bf916Bb018dBaf6beD4e15eF63c5650ecc842";

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<TxRequest>>,
        receipt_status: bool,
        receipt_logs: Vec<RawLog>,
        watchers: Mutex<Vec<mpsc::UnboundedSender<RawLog>>>,
    }

    #[async_trait]
    impl ContractTransport for RecordingTransport {
        async fn send_transaction(&self, request: TxRequest) -> Result<TxHash, MintError> {
            self.sent.lock().unwrap().push(request);
            Ok(TxHash::from("0x1"))
        }

        async fn wait_for_receipt(&self, hash: &TxHash) -> Result<TxReceipt, MintError> {
            Ok(TxReceipt {
                hash: hash.clone(),
                status: self.receipt_status,
                block_number: Some(9),
                logs: self.receipt_logs.clone(),
            })
        }

        async fn watch_logs(&self, _filter: LogFilter) -> Result<mpsc::UnboundedReceiver<RawLog>, MintError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.watchers.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    fn reference() -> ContractReference {
        ContractReference::new(CONTRACT, NFT_ABI).unwrap()
    }

    fn mint_log(reference: &ContractReference, token_id: u64) -> RawLog {
        let mut data = word_for_address(Address::repeat_byte(0xde)).to_vec();
        data.extend_from_slice(&U256::from(token_id).to_be_bytes::<32>());
        RawLog {
            address: reference.address(),
            topics: vec![reference.interface().mint_event().selector()],
            data,
            transaction_hash: Some(TxHash::from("0x1")),
            block_number: Some(9),
        }
    }

    fn handle(transport: Arc<RecordingTransport>) -> ContractHandle {
        let signer = SigningContext::new(Some(&Account::from("0xDEF"))).unwrap();
        ContractHandle::bind(reference(), signer, transport)
    }

    #[test]
    fn signing_context_requires_account() {
        assert_eq!(SigningContext::new(None).unwrap_err(), MintError::NotConnected);
        assert_eq!(
            SigningContext::new(Some(&Account::from(""))).unwrap_err(),
            MintError::NotConnected
        );
    }

    #[test]
    fn reference_rejects_bad_address() {
        let err = ContractReference::new("not-an-address", NFT_ABI).unwrap_err();
        assert!(err.is_startup_fatal());
    }

    #[tokio::test]
    async fn mint_sends_selector_from_bound_account() {
        let transport = Arc::new(RecordingTransport::default());
        let handle = handle(transport.clone());

        let request = handle.mint().await.unwrap();
        assert_eq!(request.hash(), &TxHash::from("0x1"));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, Account::from("0xDEF"));
        assert_eq!(sent[0].to, handle.reference().address());
        assert_eq!(sent[0].data, handle.reference().interface().mint_function().selector().to_vec());
    }

    #[tokio::test]
    async fn confirmation_reads_token_id_from_receipt() {
        let reference = reference();
        let transport = Arc::new(RecordingTransport {
            receipt_status: true,
            receipt_logs: vec![mint_log(&reference, 3)],
            ..Default::default()
        });
        let handle = handle(transport);

        let request = handle.mint().await.unwrap();
        let receipt = handle.await_confirmation(request).await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.hash, TxHash::from("0x1"));
        assert_eq!(receipt.token_id, Some(TokenId(3)));
        assert_eq!(receipt.block_number, Some(9));
    }

    #[tokio::test]
    async fn failed_status_is_reverted() {
        let handle = handle(Arc::new(RecordingTransport::default()));
        let request = handle.mint().await.unwrap();
        let err = handle.await_confirmation(request).await.unwrap_err();
        assert_eq!(
            err,
            MintError::TransactionReverted {
                hash: TxHash::from("0x1")
            }
        );
    }

    #[tokio::test]
    async fn subscription_decodes_delivered_logs() {
        let transport = Arc::new(RecordingTransport::default());
        let handle = handle(transport.clone());

        let mut stream = handle.subscribe(MINT_EVENT).await.unwrap();
        let log = mint_log(handle.reference(), 11);
        transport.watchers.lock().unwrap()[0].send(log).unwrap();

        let decoded = stream.next().await.unwrap().unwrap();
        let event = abi::normalize_mint_event(&decoded.fields).unwrap();
        assert_eq!(event.token_id, TokenId(11));
        assert_eq!(decoded.transaction_hash, Some(TxHash::from("0x1")));
    }

    #[tokio::test]
    async fn unknown_event_is_invalid_interface() {
        let handle = handle(Arc::new(RecordingTransport::default()));
        let err = handle.subscribe("Transfer").await.err().unwrap();
        assert!(matches!(err, MintError::InvalidInterface(_)));
    }
}
