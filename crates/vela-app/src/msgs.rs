// MESSAGE FAMILY
// Every message this binary understands. Which variants a block can actually
// execute depends on the routes the current protocol version registers.

use crate::{bank, gov, record};
use serde::{Deserialize, Serialize};
use vela_core::{Address, AppError, Coins, Msg};
use vela_upgrade::SoftwareUpgradeProposal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from: Address,
    pub to: Address,
    pub amount: Coins,
}

/// Stands in for a passed governance proposal; only the upgrade authority may send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSoftwareUpgrade {
    pub authority: Address,
    pub proposal: SoftwareUpgradeProposal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateRecord {
    pub owner: Address,
    /// Hex sha256 of the recorded content.
    pub content_hash: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMsg {
    Send(MsgSend),
    SoftwareUpgrade(MsgSoftwareUpgrade),
    CreateRecord(MsgCreateRecord),
}

impl Msg for AppMsg {
    fn route(&self) -> &'static str {
        match self {
            AppMsg::Send(_) => bank::ROUTE,
            AppMsg::SoftwareUpgrade(_) => gov::ROUTE,
            AppMsg::CreateRecord(_) => record::ROUTE,
        }
    }

    fn msg_type(&self) -> &'static str {
        match self {
            AppMsg::Send(_) => "send",
            AppMsg::SoftwareUpgrade(_) => "software_upgrade",
            AppMsg::CreateRecord(_) => "create_record",
        }
    }

    fn validate_basic(&self) -> Result<(), AppError> {
        match self {
            AppMsg::Send(msg) => {
                if msg.from.is_empty() {
                    return Err(AppError::InvalidAddress("missing sender address".into()));
                }
                if msg.to.is_empty() {
                    return Err(AppError::InvalidAddress("missing recipient address".into()));
                }
                if msg.amount.is_empty() {
                    return Err(AppError::InvalidCoins("send amount cannot be empty".into()));
                }
                msg.amount.validate()
            }
            AppMsg::SoftwareUpgrade(msg) => {
                if msg.authority.is_empty() {
                    return Err(AppError::InvalidAddress("missing authority address".into()));
                }
                msg.proposal.validate_basic().map_err(AppError::from)
            }
            AppMsg::CreateRecord(msg) => {
                if msg.owner.is_empty() {
                    return Err(AppError::InvalidAddress("missing owner address".into()));
                }
                record::validate_record(&msg.content_hash, &msg.description)
            }
        }
    }

    fn signers(&self) -> Vec<Address> {
        match self {
            AppMsg::Send(msg) => vec![msg.from],
            AppMsg::SoftwareUpgrade(msg) => vec![msg.authority],
            AppMsg::CreateRecord(msg) => vec![msg.owner],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_validate_basic() {
        let ok = AppMsg::Send(MsgSend { from: Address([1; 20]), to: Address([2; 20]), amount: Coins::single("uvela", 5) });
        assert!(ok.validate_basic().is_ok());
        assert_eq!(ok.route(), "bank");
        assert_eq!(ok.signers(), vec![Address([1; 20])]);

        let empty = AppMsg::Send(MsgSend { from: Address([1; 20]), to: Address([2; 20]), amount: Coins::empty() });
        assert!(matches!(empty.validate_basic(), Err(AppError::InvalidCoins(_))));

        let no_to = AppMsg::Send(MsgSend { from: Address([1; 20]), to: Address::default(), amount: Coins::single("uvela", 1) });
        assert!(matches!(no_to.validate_basic(), Err(AppError::InvalidAddress(_))));
    }
}
