//! Contract interface descriptors and log decoding.
//!
//! Parsing, selectors and event decoding go through `alloy-json-abi` and
//! `alloy-dyn-abi`. Validation here only checks the mint entry points.

use alloy_dyn_abi::{DynSolValue, EventExt, Specifier};
use alloy_json_abi::{Event, Function, JsonAbi};
use alloy_primitives::{B256, LogData, U256};
use mp_api_types::{Account, MintError, MintEvent, TokenId};
use serde::Deserialize;
use thiserror::Error;

pub const MINT_FUNCTION: &str = "makeNFT";
pub const MINT_EVENT: &str = "NewNFTMinted";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogDecodeError {
    #[error("log topic does not match event {0}")]
    TopicMismatch(String),
    #[error("failed to decode {event} log: {reason}")]
    Abi { event: String, reason: String },
    #[error("mint event has unexpected shape: {0}")]
    Shape(String),
    #[error("token id {0} does not fit in 64 bits")]
    TokenIdOverflow(U256),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AbiDocument {
    Bare(JsonAbi),
    Artifact { abi: JsonAbi },
}

/// Parsed and validated contract interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    abi: JsonAbi,
    mint: Function,
    mint_event: Event,
}

impl InterfaceDescriptor {
    /// Accepts either a bare ABI array or a compiler artifact with an `abi` field.
    pub fn parse(json: &str) -> Result<Self, MintError> {
        let document: AbiDocument = serde_json::from_str(json)
            .map_err(|err| MintError::InvalidInterface(format!("malformed ABI: {err}")))?;
        let abi = match document {
            AbiDocument::Bare(abi) | AbiDocument::Artifact { abi } => abi,
        };

        let overloads = abi
            .function(MINT_FUNCTION)
            .ok_or_else(|| MintError::InvalidInterface(format!("missing function {MINT_FUNCTION}")))?;
        let mint = overloads
            .iter()
            .find(|f| f.inputs.is_empty())
            .cloned()
            .ok_or_else(|| {
                MintError::InvalidInterface(format!("{MINT_FUNCTION} must take no arguments"))
            })?;

        let mint_event = abi
            .event(MINT_EVENT)
            .and_then(|events| events.first())
            .cloned()
            .ok_or_else(|| MintError::InvalidInterface(format!("missing event {MINT_EVENT}")))?;
        let shape: Vec<&str> = mint_event.inputs.iter().map(|p| p.ty.as_str()).collect();
        if shape.len() != 2 || shape[0] != "address" || !shape[1].starts_with("uint") {
            return Err(MintError::InvalidInterface(format!(
                "{MINT_EVENT} must be (address, uint256), found ({})",
                shape.join(",")
            )));
        }

        Ok(Self {
            abi,
            mint,
            mint_event,
        })
    }

    pub fn mint_function(&self) -> &Function {
        &self.mint
    }

    pub fn mint_event(&self) -> &Event {
        &self.mint_event
    }

    /// First overload named `name`.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.abi.function(name).and_then(|overloads| overloads.first())
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.abi.event(name).and_then(|events| events.first())
    }
}

/// Fails when a parameter type of `event` cannot be resolved for decoding.
pub fn ensure_decodable(event: &Event) -> Result<(), MintError> {
    event
        .resolve()
        .map(|_| ())
        .map_err(|err| MintError::InvalidInterface(format!("event {}: {err}", event.name)))
}

/// Decodes one log of `event` into its parameters, in declaration order.
pub fn decode_event(event: &Event, topics: &[B256], data: &[u8]) -> Result<Vec<DynSolValue>, LogDecodeError> {
    if !event.anonymous && topics.first() != Some(&event.selector()) {
        return Err(LogDecodeError::TopicMismatch(event.name.clone()));
    }

    let log = LogData::new_unchecked(topics.to_vec(), data.to_vec().into());
    let decoded = event.decode_log(&log).map_err(|err| LogDecodeError::Abi {
        event: event.name.clone(),
        reason: err.to_string(),
    })?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    event
        .inputs
        .iter()
        .map(|param| {
            let value = if param.indexed { indexed.next() } else { body.next() };
            value.ok_or_else(|| LogDecodeError::Abi {
                event: event.name.clone(),
                reason: format!("missing field {}", param.name),
            })
        })
        .collect()
}

/// Converts decoded `NewNFTMinted(address, uint256)` fields into a [`MintEvent`].
pub fn normalize_mint_event(fields: &[DynSolValue]) -> Result<MintEvent, LogDecodeError> {
    match fields {
        [DynSolValue::Address(sender), DynSolValue::Uint(raw_id, _)] => {
            let token_id = u64::try_from(*raw_id).map_err(|_| LogDecodeError::TokenIdOverflow(*raw_id))?;
            Ok(MintEvent {
                account: Account(sender.to_checksum(None)),
                token_id: TokenId(token_id),
            })
        }
        other => Err(LogDecodeError::Shape(format!("{other:?}"))),
    }
}
