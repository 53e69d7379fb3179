// BLOCK REPLAY
// Drives the application through a recorded chain the way a consensus engine
// would: InitChain once over empty state, then BeginBlock, DeliverTx for each
// transaction, EndBlock and Commit per block.
//
// SAFETY INVARIANTS:
// 1. InitChain runs only while no block has been committed
// 2. Blocks at or below the last committed height are skipped, so a restarted
//    replay resumes where the persisted store left off
// 3. Every transaction of a block is decoded before BeginBlock, so a corrupt
//    block file never leaves a half-executed block behind
// 4. The first FatalError stops the replay; nothing after it is executed

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use vela_app::{AppMsg, GenesisState};
use vela_core::{
    Address, BaseApp, ConsensusParams, Event, FatalError, Header, RequestBeginBlock, RequestEndBlock,
    RequestInitChain, ValidatorUpdate,
};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Json { path: PathBuf, source: serde_json::Error },

    #[error("block {height} tx {index} is not valid base64: {source}")]
    TxEncoding { height: u64, index: usize, source: base64::DecodeError },

    #[error("chain id mismatch at height {height}: node runs {expected}, got {got}")]
    ChainId { height: u64, expected: String, got: String },

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ReplayError> {
    let raw = fs::read(path).map_err(|source| ReplayError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_slice(&raw).map_err(|source| ReplayError::Json { path: path.to_path_buf(), source })
}

/// Chain identity, consensus parameters and the application state handed to
/// InitChain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    #[serde(default)]
    pub genesis_time: u64,
    #[serde(default)]
    pub consensus_params: ConsensusParams,
    /// Consensus validators, used only when `app_state` names none.
    #[serde(default)]
    pub validators: Vec<ValidatorUpdate>,
    #[serde(default)]
    pub app_state: serde_json::Value,
}

impl GenesisDoc {
    pub fn new(chain_id: &str, app_state: &GenesisState) -> Result<Self, serde_json::Error> {
        Ok(GenesisDoc {
            chain_id: chain_id.to_string(),
            genesis_time: 0,
            consensus_params: ConsensusParams::default(),
            validators: Vec::new(),
            app_state: serde_json::to_value(app_state)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        read_json(path)
    }

    pub fn to_init_request(&self) -> Result<RequestInitChain, serde_json::Error> {
        let app_state_bytes = if self.app_state.is_null() { Vec::new() } else { serde_json::to_vec(&self.app_state)? };
        Ok(RequestInitChain {
            chain_id: self.chain_id.clone(),
            time: self.genesis_time,
            consensus_params: self.consensus_params,
            validators: self.validators.clone(),
            app_state_bytes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    pub header: Header,
    #[serde(default)]
    pub last_commit_signers: Vec<Address>,
    /// Standard base64 of each encoded transaction.
    #[serde(default)]
    pub txs: Vec<String>,
}

impl BlockEntry {
    pub fn decode_txs(&self) -> Result<Vec<Vec<u8>>, ReplayError> {
        self.txs
            .iter()
            .enumerate()
            .map(|(index, tx)| {
                STANDARD.decode(tx).map_err(|source| ReplayError::TxEncoding { height: self.header.height, index, source })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockFile {
    pub blocks: Vec<BlockEntry>,
}

impl BlockFile {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        read_json(path)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub blocks: u64,
    pub skipped: u64,
    pub txs: u64,
    pub failed_txs: u64,
    pub last_height: u64,
    pub app_hash: [u8; 32],
}

fn render(event: &Event) -> String {
    let attrs: Vec<String> = event.attributes.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}[{}]", event.kind, attrs.join(","))
}

/// Runs InitChain when nothing has been committed yet. Returns whether it ran.
pub fn init_if_fresh(app: &BaseApp<AppMsg>, genesis: &GenesisDoc, chain_id: &str) -> Result<bool, ReplayError> {
    if app.last_commit_id().version > 0 {
        debug!("Store already at height {}, skipping InitChain", app.last_commit_id().version);
        return Ok(false);
    }
    if genesis.chain_id != chain_id {
        return Err(ReplayError::ChainId { height: 0, expected: chain_id.to_string(), got: genesis.chain_id.clone() });
    }
    let request = genesis
        .to_init_request()
        .map_err(|e| FatalError::Genesis(format!("app_state: {}", e)))?;
    let response = app.init_chain(request)?;
    info!(chain_id, validators = response.validators.len(), "InitChain applied");
    Ok(true)
}

/// Replays every block above the last committed height.
pub fn replay_blocks(app: &BaseApp<AppMsg>, file: &BlockFile, chain_id: &str) -> Result<ReplaySummary, ReplayError> {
    let mut summary = ReplaySummary { last_height: app.last_commit_id().version, ..Default::default() };

    for block in &file.blocks {
        let height = block.header.height;
        if height <= summary.last_height {
            summary.skipped += 1;
            debug!(height, "Block already committed, skipping");
            continue;
        }
        if block.header.chain_id != chain_id {
            return Err(ReplayError::ChainId { height, expected: chain_id.to_string(), got: block.header.chain_id.clone() });
        }
        let txs = block.decode_txs()?;

        let begin = app.begin_block(RequestBeginBlock {
            header: block.header.clone(),
            last_commit_signers: block.last_commit_signers.clone(),
        })?;
        for event in &begin.events {
            debug!(height, event = %render(event), "BeginBlock event");
        }

        for (index, tx) in txs.iter().enumerate() {
            let res = app.deliver_tx(tx)?;
            summary.txs += 1;
            if res.is_ok() {
                info!(height, index, gas_used = res.gas_used, gas_wanted = res.gas_wanted, "DeliverTx ok");
            } else {
                summary.failed_txs += 1;
                warn!(height, index, code = res.code, codespace = %res.codespace, log = %res.log, "DeliverTx failed");
            }
        }

        let end = app.end_block(RequestEndBlock { height })?;
        for event in &end.events {
            info!(height, event = %render(event), "EndBlock event");
        }
        if !end.validator_updates.is_empty() {
            info!(height, updates = end.validator_updates.len(), "Validator set changed");
        }

        let commit = app.commit()?;
        info!(
            height = commit.height,
            app_hash = %hex::encode(commit.app_hash),
            version = app.current_version().unwrap_or(0),
            "Committed block"
        );
        summary.blocks += 1;
        summary.last_height = commit.height;
        summary.app_hash = commit.app_hash;
    }
    Ok(summary)
}
