//! Request and response shapes of the block-execution call sequence.

use crate::error::AppError;
use crate::gas::Gas;
use crate::types::{Address, Event, Header, ProtocolVersion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParams {
    pub max_bytes: i64,
    /// -1 disables the block gas limit.
    pub max_gas: i64,
}

impl Default for BlockParams {
    fn default() -> Self {
        BlockParams { max_bytes: 22_020_096, max_gas: -1 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub block: BlockParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: Vec<u8>,
    pub power: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestInitChain {
    pub chain_id: String,
    pub time: u64,
    pub consensus_params: ConsensusParams,
    pub validators: Vec<ValidatorUpdate>,
    /// Genesis application state as JSON.
    pub app_state_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInitChain {
    pub validators: Vec<ValidatorUpdate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBeginBlock {
    pub header: Header,
    /// Consensus addresses that signed the previous block.
    pub last_commit_signers: Vec<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBeginBlock {
    pub events: Vec<Event>,
}

/// Outcome of CheckTx, DeliverTx or Simulate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResponse {
    pub code: u32,
    pub codespace: String,
    pub data: Vec<u8>,
    pub log: String,
    pub gas_wanted: Gas,
    pub gas_used: Gas,
    pub events: Vec<Event>,
}

impl TxResponse {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    pub fn from_error(err: &AppError, gas_wanted: Gas, gas_used: Gas) -> Self {
        TxResponse {
            code: err.code(),
            codespace: err.codespace().to_string(),
            data: Vec::new(),
            log: err.to_string(),
            gas_wanted,
            gas_used,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEndBlock {
    pub height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEndBlock {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCommit {
    pub height: u64,
    pub app_hash: [u8; 32],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuery {
    pub path: String,
    pub data: Vec<u8>,
    /// 0 queries the latest committed height.
    pub height: u64,
    pub prove: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseQuery {
    pub code: u32,
    pub codespace: String,
    pub log: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Always `None`: the reference store produces no Merkle proofs.
    pub proof: Option<Vec<u8>>,
    pub height: u64,
}

impl ResponseQuery {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    pub fn from_error(err: &AppError, height: u64) -> Self {
        ResponseQuery {
            code: err.code(),
            codespace: err.codespace().to_string(),
            log: err.to_string(),
            height,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub data: String,
    pub app_version: ProtocolVersion,
    pub last_block_height: u64,
    pub last_block_app_hash: [u8; 32],
}

/// Result of ExportAppStateAndValidators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedState {
    pub app_state: serde_json::Value,
    pub validators: Vec<ValidatorUpdate>,
    pub height: u64,
}
