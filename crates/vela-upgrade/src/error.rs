use crate::dec::DecError;
use thiserror::Error;
use vela_core::{AppError, ProtocolVersion};

pub const CODESPACE: &str = "upgrade";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpgradeError {
    #[error("invalid upgrade proposal: {0}")]
    InvalidProposal(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("switch period in process: proposal {0} is still pending")]
    UpgradePending(u64),

    #[error("invalid version: expected {expected}, got {got}")]
    InvalidVersion { expected: ProtocolVersion, got: ProtocolVersion },

    #[error("protocol version {0} is not supported by this binary")]
    UnsupportedVersion(ProtocolVersion),

    #[error("switch height {switch_height} must be greater than the current height {current}")]
    InvalidSwitchHeight { switch_height: u64, current: u64 },

    #[error("threshold must be in (0, 1): {0}")]
    InvalidThreshold(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl UpgradeError {
    pub fn code(&self) -> u32 {
        match self {
            UpgradeError::InvalidProposal(_) => 1,
            UpgradeError::Unauthorized(_) => 2,
            UpgradeError::UpgradePending(_) => 3,
            UpgradeError::InvalidVersion { .. } => 4,
            UpgradeError::UnsupportedVersion(_) => 5,
            UpgradeError::InvalidSwitchHeight { .. } => 6,
            UpgradeError::InvalidThreshold(_) => 7,
            UpgradeError::NotFound(_) => 8,
        }
    }
}

impl From<UpgradeError> for AppError {
    fn from(err: UpgradeError) -> Self {
        AppError::module(CODESPACE, err.code(), err.to_string())
    }
}

impl From<DecError> for UpgradeError {
    fn from(err: DecError) -> Self {
        UpgradeError::InvalidThreshold(err.to_string())
    }
}
