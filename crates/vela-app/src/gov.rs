// UPGRADE GOVERNANCE GLUE
// Routes MsgSoftwareUpgrade from the genesis upgrade authority to the
// governance boundary of the upgrade module.

use crate::msgs::AppMsg;
use crate::namespaces;
use std::sync::Arc;
use vela_core::{Address, AppError, Context, Handler, HandlerResult, Msg, ProtocolVersion};
use vela_store::KeyBuilder;
use vela_upgrade::{submit_software_upgrade, UpgradeError, UpgradeKeeper};

pub const ROUTE: &str = "upgrade";

const TAG_AUTHORITY: u8 = 0x01;

fn authority_key() -> Vec<u8> {
    KeyBuilder::new(namespaces::GOV).tag(TAG_AUTHORITY).build()
}

pub fn upgrade_authority(ctx: &mut Context<'_>) -> Result<Option<Address>, AppError> {
    ctx.get_value(&authority_key())
}

pub fn set_upgrade_authority(ctx: &mut Context<'_>, authority: &Address) -> Result<(), AppError> {
    ctx.set_value(authority_key(), authority)
}

pub struct UpgradeProposalHandler {
    keeper: UpgradeKeeper,
    supported: Arc<[ProtocolVersion]>,
}

impl UpgradeProposalHandler {
    pub fn new(keeper: UpgradeKeeper, supported: Arc<[ProtocolVersion]>) -> Self {
        UpgradeProposalHandler { keeper, supported }
    }
}

impl Handler<AppMsg> for UpgradeProposalHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &AppMsg) -> Result<HandlerResult, AppError> {
        let AppMsg::SoftwareUpgrade(upgrade) = msg else {
            return Err(AppError::UnknownRequest(format!("unrecognized upgrade message: {}", msg.msg_type())));
        };

        match upgrade_authority(ctx)? {
            Some(authority) if authority == upgrade.authority => {}
            _ => {
                return Err(UpgradeError::Unauthorized(format!(
                    "{} is not the upgrade authority",
                    upgrade.authority
                ))
                .into())
            }
        }

        let proposal_id = submit_software_upgrade(ctx, &self.keeper, &self.supported, &upgrade.proposal)?;
        Ok(HandlerResult { data: proposal_id.to_be_bytes().to_vec(), log: format!("proposal {}", proposal_id) })
    }
}
