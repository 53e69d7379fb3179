// GOVERNANCE BOUNDARY
// Turns an accepted SoftwareUpgradeProposal into the single pending
// UpgradeConfig the coordinator acts on.

use crate::error::UpgradeError;
use crate::keeper::UpgradeKeeper;
use crate::types::{ProtocolDefinition, SoftwareUpgradeProposal, UpgradeConfig};
use log::info;
use vela_core::{AppError, Context, Event, ProtocolVersion};

/// Validates `proposal` against chain state and, if it is acceptable,
/// writes the pending UpgradeConfig. Returns the new proposal id.
///
/// `supported` is every protocol version compiled into this binary.
pub fn submit_software_upgrade(
    ctx: &mut Context<'_>,
    keeper: &UpgradeKeeper,
    supported: &[ProtocolVersion],
    proposal: &SoftwareUpgradeProposal,
) -> Result<u64, AppError> {
    proposal.validate_basic()?;

    if let Some(pending) = keeper.upgrade_config(ctx)? {
        return Err(UpgradeError::UpgradePending(pending.proposal_id).into());
    }

    let current = keeper.current_version(ctx)?;
    let expected = current + 1;
    if proposal.version != expected {
        return Err(UpgradeError::InvalidVersion { expected, got: proposal.version }.into());
    }
    if !supported.contains(&proposal.version) {
        return Err(UpgradeError::UnsupportedVersion(proposal.version).into());
    }

    let height = ctx.block_height();
    if proposal.switch_height <= height {
        return Err(UpgradeError::InvalidSwitchHeight { switch_height: proposal.switch_height, current: height }.into());
    }

    let proposal_id = keeper.next_proposal_id(ctx)?;
    let config = UpgradeConfig {
        proposal_id,
        protocol: ProtocolDefinition {
            version: proposal.version,
            software: proposal.software.clone(),
            switch_height: proposal.switch_height,
            threshold: proposal.threshold,
        },
    };
    keeper.set_upgrade_config(ctx, &config)?;

    ctx.emit_event(
        Event::new(crate::coordinator::EVENT_TYPE)
            .attr("proposal_id", proposal_id)
            .attr("version", proposal.version)
            .attr("switch_height", proposal.switch_height),
    );
    info!(
        "Scheduled upgrade proposal {} to protocol version {} at height {} (threshold {})",
        proposal_id, proposal.version, proposal.switch_height, proposal.threshold
    );
    Ok(proposal_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vela_core::{Header, RunTxMode};
    use vela_store::{CacheArena, LayerId, Tree};

    fn proposal(version: ProtocolVersion, switch_height: u64) -> SoftwareUpgradeProposal {
        SoftwareUpgradeProposal {
            title: "upgrade".into(),
            description: "next version".into(),
            version,
            software: "vela".into(),
            switch_height,
            threshold: "0.8".parse().unwrap(),
        }
    }

    fn code(err: AppError) -> u32 {
        assert_eq!(err.codespace(), "upgrade");
        err.code()
    }

    #[test]
    fn test_submit_validations() {
        let mut arena = CacheArena::new(Arc::new(Tree::new()));
        let header = Header { height: 10, ..Default::default() };
        let mut ctx = Context::new(&mut arena, LayerId::ROOT, &header, RunTxMode::Deliver);
        let keeper = UpgradeKeeper::new();

        assert_eq!(code(submit_software_upgrade(&mut ctx, &keeper, &[0, 1], &proposal(2, 20)).unwrap_err()), 4);
        assert_eq!(code(submit_software_upgrade(&mut ctx, &keeper, &[0], &proposal(1, 20)).unwrap_err()), 5);
        assert_eq!(code(submit_software_upgrade(&mut ctx, &keeper, &[0, 1], &proposal(1, 10)).unwrap_err()), 6);

        let id = submit_software_upgrade(&mut ctx, &keeper, &[0, 1], &proposal(1, 20)).unwrap();
        assert_eq!(id, 1);
        assert_eq!(keeper.upgrade_config(&mut ctx).unwrap().unwrap().protocol.switch_height, 20);

        assert_eq!(code(submit_software_upgrade(&mut ctx, &keeper, &[0, 1], &proposal(1, 30)).unwrap_err()), 3);
    }
}
