//! Mint completion listener and the idempotent sink it feeds.
//!
//! Two uncorrelated paths report a finished mint: the awaited confirmation of
//! our own transaction and the contract's `NewNFTMinted` broadcast. Either may
//! arrive first, the broadcast may repeat, and both land in the same sink.

use mp_api_types::{Account, MintError, MintEvent, MintReceipt, TokenId, TxHash};
use mp_contract::abi::normalize_mint_event;
use mp_contract::{ContractHandle, MINT_EVENT};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSource {
    Confirmation,
    Broadcast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintedNotice {
    pub source: NoticeSource,
    pub account: Account,
    pub token_id: Option<TokenId>,
    pub tx_hash: Option<TxHash>,
}

impl MintedNotice {
    pub fn confirmed(account: Account, receipt: &MintReceipt) -> Self {
        Self {
            source: NoticeSource::Confirmation,
            account,
            token_id: receipt.token_id,
            tx_hash: Some(receipt.hash.clone()),
        }
    }

    pub fn broadcast(event: MintEvent, tx_hash: Option<TxHash>) -> Self {
        Self {
            source: NoticeSource::Broadcast,
            account: event.account,
            token_id: Some(event.token_id),
            tx_hash,
        }
    }
}

pub trait MintSink: Send + Sync {
    /// Returns `true` when the notice was new and passed on.
    fn deliver(&self, notice: MintedNotice) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NoticeKey {
    Token(TokenId),
    Tx(TxHash),
}

/// Keys remembered for duplicate suppression. Two per mint at most.
const SEEN_CAPACITY: usize = 1024;

/// Insertion-ordered key set that forgets its oldest entries past `capacity`.
struct SeenKeys {
    keys: HashSet<NoticeKey>,
    order: VecDeque<NoticeKey>,
    capacity: usize,
}

impl SeenKeys {
    fn contains_any(&self, keys: &[NoticeKey]) -> bool {
        keys.iter().any(|key| self.keys.contains(key))
    }

    fn remember(&mut self, keys: Vec<NoticeKey>) {
        for key in keys {
            if self.keys.insert(key.clone()) {
                self.order.push_back(key);
            }
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
    }
}

/// Forwards each distinct mint to the presentation layer once.
///
/// A notice is a duplicate when its token id or transaction hash was already
/// reported by either path. Only the most recent `SEEN_CAPACITY` keys are
/// remembered, so a long-running watcher stays bounded.
pub struct MintNotifier {
    seen: Mutex<SeenKeys>,
    outbox: mpsc::UnboundedSender<MintedNotice>,
}

impl MintNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MintedNotice>) {
        Self::with_capacity(SEEN_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<MintedNotice>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let notifier = Self {
            seen: Mutex::new(SeenKeys {
                keys: HashSet::new(),
                order: VecDeque::new(),
                capacity: capacity.max(2),
            }),
            outbox,
        };
        (Arc::new(notifier), inbox)
    }
}

impl MintSink for MintNotifier {
    fn deliver(&self, notice: MintedNotice) -> bool {
        let keys: Vec<NoticeKey> = notice
            .token_id
            .map(NoticeKey::Token)
            .into_iter()
            .chain(notice.tx_hash.clone().map(NoticeKey::Tx))
            .collect();

        {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            if seen.contains_any(&keys) {
                seen.remember(keys);
                debug!(source = ?notice.source, "duplicate mint notice suppressed");
                return false;
            }
            seen.remember(keys);
        }

        if self.outbox.send(notice).is_err() {
            debug!("mint notice dropped; nobody is listening");
        }
        true
    }
}

/// Attaches the mint listener to contract handles, at most once per handle.
///
/// Attaching to a handle that already has a listener is a no-op and reports
/// `false`. Listener tasks stop when the subscriber is dropped.
pub struct EventSubscriber {
    sink: Arc<dyn MintSink>,
    listeners: tokio::sync::Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl EventSubscriber {
    pub fn new(sink: Arc<dyn MintSink>) -> Self {
        Self {
            sink,
            listeners: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_attached(&self, handle_id: Uuid) -> bool {
        self.listeners.lock().await.contains_key(&handle_id)
    }

    pub async fn attach(&self, handle: &ContractHandle) -> Result<bool, MintError> {
        let mut listeners = self.listeners.lock().await;
        if listeners.contains_key(&handle.id()) {
            debug!(handle = %handle.id(), "listener already attached");
            return Ok(false);
        }

        let mut stream = handle.subscribe(MINT_EVENT).await?;
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            while let Some(delivered) = stream.next().await {
                let decoded = delivered.and_then(|log| {
                    normalize_mint_event(&log.fields).map(|event| (event, log.transaction_hash))
                });
                match decoded {
                    Ok((event, tx_hash)) => {
                        info!(from = %event.account, token_id = %event.token_id, "mint event received");
                        sink.deliver(MintedNotice::broadcast(event, tx_hash));
                    }
                    Err(err) => warn!("dropping undecodable {} event: {}", MINT_EVENT, err),
                }
            }
            debug!("mint event stream closed");
        });

        listeners.insert(handle.id(), task);
        Ok(true)
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        for (_, task) in self.listeners.get_mut().drain() {
            task.abort();
        }
    }
}
