// ERROR TAXONOMY
//
// AppError  - local to one transaction or query; converted to (codespace, code)
//             at the pipeline boundary and never aborts a block.
// FatalError - the node cannot safely keep participating in consensus; every
//             block-lifecycle call returns it and the driver halts.

use crate::types::ProtocolVersion;
use thiserror::Error;
use vela_store::StoreError;

/// Codespace of the errors raised by the pipeline itself.
pub const ROOT_CODESPACE: &str = "sdk";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("internal error: {0}")]
    Internal(String),

    #[error("tx parse error: {0}")]
    TxDecode(String),

    #[error("invalid sequence: expected {expected}, got {got}")]
    InvalidSequence { expected: u64, got: u64 },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("unknown request: {0}")]
    UnknownRequest(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid pubkey: {0}")]
    InvalidPubKey(String),

    #[error("unknown address: {0}")]
    UnknownAddress(String),

    #[error("invalid coins: {0}")]
    InvalidCoins(String),

    #[error("out of gas in location: {descriptor}; gasLimit: {limit}, gasUsed: {consumed}")]
    OutOfGas { descriptor: String, limit: u64, consumed: u64 },

    #[error("memo too large: maximum {max} characters, got {got}")]
    MemoTooLarge { max: usize, got: usize },

    #[error("insufficient fee: {0}")]
    InsufficientFee(String),

    #[error("too many signatures: maximum {max}, got {got}")]
    TooManySignatures { max: usize, got: usize },

    #[error("no signatures supplied")]
    NoSignatures,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Error raised by a module under its own codespace.
    #[error("{log}")]
    Module { codespace: String, code: u32, log: String },
}

impl AppError {
    pub fn module(codespace: &str, code: u32, log: impl Into<String>) -> Self {
        AppError::Module { codespace: codespace.to_string(), code, log: log.into() }
    }

    pub fn codespace(&self) -> &str {
        match self {
            AppError::Module { codespace, .. } => codespace,
            _ => ROOT_CODESPACE,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            AppError::Internal(_) => 1,
            AppError::TxDecode(_) => 2,
            AppError::InvalidSequence { .. } => 3,
            AppError::Unauthorized(_) => 4,
            AppError::InsufficientFunds(_) => 5,
            AppError::UnknownRequest(_) => 6,
            AppError::InvalidAddress(_) => 7,
            AppError::InvalidPubKey(_) => 8,
            AppError::UnknownAddress(_) => 9,
            AppError::InvalidCoins(_) => 10,
            AppError::OutOfGas { .. } => 11,
            AppError::MemoTooLarge { .. } => 12,
            AppError::InsufficientFee(_) => 13,
            AppError::TooManySignatures { .. } => 14,
            AppError::NoSignatures => 15,
            AppError::InvalidRequest(_) => 16,
            AppError::Module { code, .. } => *code,
        }
    }

    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, AppError::OutOfGas { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Internal(format!("value encoding: {}", err))
    }
}

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("protocol version {version} added out of sequence, expected {expected}")]
    OutOfSequence { version: ProtocolVersion, expected: ProtocolVersion },

    #[error("unknown protocol version {0}")]
    UnknownProtocolVersion(ProtocolVersion),

    #[error("no protocol has been loaded")]
    NoProtocolLoaded,

    #[error("protocol wiring failed: {0}")]
    Wiring(String),

    #[error("chain state requires protocol version {0}, which this binary does not support; upgrade required")]
    UpgradeRequired(ProtocolVersion),

    #[error("genesis state could not be applied: {0}")]
    Genesis(String),

    #[error("invalid max block gas {0}")]
    InvalidMaxBlockGas(i64),

    #[error("invalid block height: expected {expected}, got {got}")]
    InvalidHeight { expected: u64, got: u64 },

    #[error("{0} called out of order")]
    OutOfOrder(&'static str),

    #[error("block hook failed: {0}")]
    BlockHook(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("state export failed: {0}")]
    Export(String),

    #[error("halt height {0} reached")]
    HaltHeight(u64),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AppError::TxDecode("x".into()).code(), 2);
        assert_eq!(AppError::UnknownRequest("x".into()).code(), 6);
        let oog = AppError::OutOfGas { descriptor: "WriteFlat".into(), limit: 10, consumed: 9 };
        assert_eq!(oog.code(), 11);
        assert!(oog.is_out_of_gas());
        assert_eq!(oog.codespace(), ROOT_CODESPACE);
    }

    #[test]
    fn test_module_codespace() {
        let err = AppError::module("upgrade", 3, "switch period in process");
        assert_eq!(err.codespace(), "upgrade");
        assert_eq!(err.code(), 3);
        assert_eq!(err.to_string(), "switch period in process");
    }
}
