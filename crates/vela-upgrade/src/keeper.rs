// UPGRADE KEEPER
// Typed access to every record the coordinator reads or writes.
//
// SAFETY INVARIANTS:
// 1. At most one UpgradeConfig exists at a time
// 2. VersionInfo records are appended, never rewritten
// 3. Proposal ids come from a counter that only increases

use crate::keys;
use crate::types::{UpgradeConfig, VersionInfo};
use vela_core::keys as main_keys;
use vela_core::{Address, AppError, Context, ProtocolVersion};

#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeKeeper;

impl UpgradeKeeper {
    pub fn new() -> Self {
        UpgradeKeeper
    }

    // --- main namespace ---

    /// Persisted current protocol version; a chain without the record runs 0.
    pub fn current_version(&self, ctx: &mut Context<'_>) -> Result<ProtocolVersion, AppError> {
        Ok(ctx.get_value(&main_keys::current_version_key())?.unwrap_or(0))
    }

    pub fn set_current_version(&self, ctx: &mut Context<'_>, version: ProtocolVersion) -> Result<(), AppError> {
        ctx.set_value(main_keys::current_version_key(), &version)
    }

    pub fn last_failed_version(&self, ctx: &mut Context<'_>) -> Result<Option<ProtocolVersion>, AppError> {
        ctx.get_value(&main_keys::last_failed_version_key())
    }

    pub fn set_last_failed_version(&self, ctx: &mut Context<'_>, version: ProtocolVersion) -> Result<(), AppError> {
        ctx.set_value(main_keys::last_failed_version_key(), &version)
    }

    pub fn upgrade_config(&self, ctx: &mut Context<'_>) -> Result<Option<UpgradeConfig>, AppError> {
        ctx.get_value(&main_keys::upgrade_config_key())
    }

    pub fn set_upgrade_config(&self, ctx: &mut Context<'_>, config: &UpgradeConfig) -> Result<(), AppError> {
        ctx.set_value(main_keys::upgrade_config_key(), config)
    }

    pub fn clear_upgrade_config(&self, ctx: &mut Context<'_>) -> Result<(), AppError> {
        ctx.delete(&main_keys::upgrade_config_key())
    }

    // --- proposal ids & history ---

    /// Allocates the next proposal id, starting at 1.
    pub fn next_proposal_id(&self, ctx: &mut Context<'_>) -> Result<u64, AppError> {
        let last: u64 = ctx.get_value(&keys::proposal_counter_key())?.unwrap_or(0);
        let next = last
            .checked_add(1)
            .ok_or_else(|| AppError::Internal("proposal id counter overflow".into()))?;
        ctx.set_value(keys::proposal_counter_key(), &next)?;
        Ok(next)
    }

    pub fn add_version_info(&self, ctx: &mut Context<'_>, info: &VersionInfo) -> Result<(), AppError> {
        let proposal_id = info.upgrade_config.proposal_id;
        let version = info.upgrade_config.protocol.version;
        ctx.set_value(keys::version_info_key(proposal_id), info)?;
        if info.success {
            ctx.set_value(keys::success_version_key(version), &proposal_id)
        } else {
            ctx.set_value(keys::failed_version_key(version, proposal_id), &proposal_id)
        }
    }

    pub fn version_info(&self, ctx: &mut Context<'_>, proposal_id: u64) -> Result<Option<VersionInfo>, AppError> {
        ctx.get_value(&keys::version_info_key(proposal_id))
    }

    /// The upgrade that made `version` current.
    pub fn success_version_info(
        &self,
        ctx: &mut Context<'_>,
        version: ProtocolVersion,
    ) -> Result<Option<VersionInfo>, AppError> {
        match ctx.get_value::<u64>(&keys::success_version_key(version))? {
            Some(proposal_id) => self.version_info(ctx, proposal_id),
            None => Ok(None),
        }
    }

    /// Every failed attempt at `version`, oldest first.
    pub fn failed_version_infos(
        &self,
        ctx: &mut Context<'_>,
        version: ProtocolVersion,
    ) -> Result<Vec<VersionInfo>, AppError> {
        let mut out = Vec::new();
        for (_, raw) in ctx.iter_prefix(&keys::failed_version_prefix(version))? {
            let proposal_id: u64 = bincode::deserialize(&raw)?;
            if let Some(info) = self.version_info(ctx, proposal_id)? {
                out.push(info);
            }
        }
        Ok(out)
    }

    // --- signals ---

    pub fn has_signal(&self, ctx: &mut Context<'_>, version: ProtocolVersion, validator: &Address) -> Result<bool, AppError> {
        ctx.has(&keys::signal_key(version, validator))
    }

    pub fn set_signal(&self, ctx: &mut Context<'_>, version: ProtocolVersion, validator: &Address) -> Result<(), AppError> {
        ctx.set_value(keys::signal_key(version, validator), &true)
    }

    pub fn delete_signal(&self, ctx: &mut Context<'_>, version: ProtocolVersion, validator: &Address) -> Result<(), AppError> {
        ctx.delete(&keys::signal_key(version, validator))
    }

    /// Validators with a live signal for `version`, in key order.
    pub fn signals(&self, ctx: &mut Context<'_>, version: ProtocolVersion) -> Result<Vec<Address>, AppError> {
        let entries = ctx.iter_prefix(&keys::signal_prefix(version))?;
        Ok(entries.iter().filter_map(|(key, _)| keys::address_from_signal_key(key)).collect())
    }

    pub fn clear_signals(&self, ctx: &mut Context<'_>, version: ProtocolVersion) -> Result<usize, AppError> {
        let entries = ctx.iter_prefix(&keys::signal_prefix(version))?;
        for (key, _) in &entries {
            ctx.delete(key)?;
        }
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProtocolDefinition;
    use std::sync::Arc;
    use vela_core::{Header, RunTxMode};
    use vela_store::{CacheArena, LayerId, Tree};

    fn config(proposal_id: u64, version: ProtocolVersion) -> UpgradeConfig {
        UpgradeConfig {
            proposal_id,
            protocol: ProtocolDefinition {
                version,
                software: "v".into(),
                switch_height: 10,
                threshold: "0.5".parse().unwrap(),
            },
        }
    }

    #[test]
    fn test_history_indexes() {
        let mut arena = CacheArena::new(Arc::new(Tree::new()));
        let header = Header::default();
        let mut ctx = Context::new(&mut arena, LayerId::ROOT, &header, RunTxMode::Deliver);
        let keeper = UpgradeKeeper::new();

        keeper.add_version_info(&mut ctx, &VersionInfo { upgrade_config: config(1, 1), success: false }).unwrap();
        keeper.add_version_info(&mut ctx, &VersionInfo { upgrade_config: config(2, 1), success: false }).unwrap();
        keeper.add_version_info(&mut ctx, &VersionInfo { upgrade_config: config(3, 1), success: true }).unwrap();

        let failed = keeper.failed_version_infos(&mut ctx, 1).unwrap();
        assert_eq!(failed.iter().map(|i| i.upgrade_config.proposal_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(keeper.success_version_info(&mut ctx, 1).unwrap().unwrap().upgrade_config.proposal_id, 3);
        assert!(keeper.success_version_info(&mut ctx, 2).unwrap().is_none());
    }

    #[test]
    fn test_signals_and_counter() {
        let mut arena = CacheArena::new(Arc::new(Tree::new()));
        let header = Header::default();
        let mut ctx = Context::new(&mut arena, LayerId::ROOT, &header, RunTxMode::Deliver);
        let keeper = UpgradeKeeper::new();
        let (a, b) = (Address([1; 20]), Address([2; 20]));

        keeper.set_signal(&mut ctx, 1, &b).unwrap();
        keeper.set_signal(&mut ctx, 1, &a).unwrap();
        keeper.set_signal(&mut ctx, 2, &a).unwrap();
        assert_eq!(keeper.signals(&mut ctx, 1).unwrap(), vec![a, b]);
        keeper.delete_signal(&mut ctx, 1, &a).unwrap();
        assert!(!keeper.has_signal(&mut ctx, 1, &a).unwrap());
        assert_eq!(keeper.clear_signals(&mut ctx, 1).unwrap(), 1);
        assert!(keeper.signals(&mut ctx, 1).unwrap().is_empty());
        assert_eq!(keeper.signals(&mut ctx, 2).unwrap(), vec![a]);

        assert_eq!(keeper.next_proposal_id(&mut ctx).unwrap(), 1);
        assert_eq!(keeper.next_proposal_id(&mut ctx).unwrap(), 2);
        assert_eq!(keeper.current_version(&mut ctx).unwrap(), 0);
    }
}
