use crate::dec::Dec;
use crate::error::UpgradeError;
use serde::{Deserialize, Serialize};
use vela_core::{Address, ProtocolVersion};

/// What an upgrade switches to, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDefinition {
    pub version: ProtocolVersion,
    /// Where operators fetch the binary, e.g. a release URL.
    pub software: String,
    /// Block at whose end the tally runs.
    pub switch_height: u64,
    /// Fraction of bonded power that must signal, strictly exceeded.
    pub threshold: Dec,
}

/// The single pending upgrade, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    pub proposal_id: u64,
    pub protocol: ProtocolDefinition,
}

/// Immutable record of one resolved upgrade attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub upgrade_config: UpgradeConfig,
    pub success: bool,
}

/// Proposal content accepted at the governance boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareUpgradeProposal {
    pub title: String,
    pub description: String,
    pub version: ProtocolVersion,
    pub software: String,
    pub switch_height: u64,
    pub threshold: Dec,
}

impl SoftwareUpgradeProposal {
    pub const MAX_TITLE_LEN: usize = 140;
    pub const MAX_DESCRIPTION_LEN: usize = 5000;

    /// Checks that need no chain state.
    pub fn validate_basic(&self) -> Result<(), UpgradeError> {
        if self.title.trim().is_empty() {
            return Err(UpgradeError::InvalidProposal("title cannot be blank".into()));
        }
        if self.title.len() > Self::MAX_TITLE_LEN {
            return Err(UpgradeError::InvalidProposal(format!("title longer than {}", Self::MAX_TITLE_LEN)));
        }
        if self.description.trim().is_empty() {
            return Err(UpgradeError::InvalidProposal("description cannot be blank".into()));
        }
        if self.description.len() > Self::MAX_DESCRIPTION_LEN {
            return Err(UpgradeError::InvalidProposal(format!(
                "description longer than {}",
                Self::MAX_DESCRIPTION_LEN
            )));
        }
        if self.software.trim().is_empty() {
            return Err(UpgradeError::InvalidProposal("software cannot be blank".into()));
        }
        if self.threshold == Dec::ZERO || self.threshold >= Dec::ONE {
            return Err(UpgradeError::InvalidThreshold(self.threshold.to_string()));
        }
        Ok(())
    }
}

/// `custom/upgrade/info` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeInfo {
    pub current_version: ProtocolVersion,
    pub last_failed_version: Option<ProtocolVersion>,
    pub upgrade_config: Option<UpgradeConfig>,
}

/// `custom/upgrade/signals/<v>` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub version: ProtocolVersion,
    pub validators: Vec<Address>,
    pub signal_power: u64,
    pub total_power: u64,
    /// signal_power / total_power, truncated; zero when nothing is bonded.
    pub signal_ratio: Dec,
}
