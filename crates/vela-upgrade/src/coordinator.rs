// UPGRADE COORDINATOR
// End-of-block signal collection and voting-power tally.
//
// SAFETY INVARIANTS:
// 1. Outcomes derive only from replayable chain data: config, signals,
//    bonded power and height
// 2. The tally runs exactly at the switch height; a config found past its
//    switch height fails immediately and is never tallied late
// 3. A resolved upgrade always clears its config and signals and appends
//    exactly one VersionInfo
// 4. Success only schedules activation; the switch applies from the next block

use crate::keeper::UpgradeKeeper;
use crate::types::{UpgradeConfig, VersionInfo};
use crate::validators::{total_power, ValidatorSet};
use log::{info, warn};
use std::sync::Arc;
use vela_core::{Address, AppError, Context, Event};

pub const EVENT_TYPE: &str = "upgrade";

/// Result of one tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyResult {
    pub signal_power: u64,
    pub total_power: u64,
    pub passed: bool,
}

#[derive(Clone)]
pub struct UpgradeCoordinator {
    keeper: UpgradeKeeper,
    validators: Arc<dyn ValidatorSet>,
}

impl UpgradeCoordinator {
    pub fn new(keeper: UpgradeKeeper, validators: Arc<dyn ValidatorSet>) -> Self {
        UpgradeCoordinator { keeper, validators }
    }

    pub fn keeper(&self) -> &UpgradeKeeper {
        &self.keeper
    }

    pub fn validators(&self) -> &Arc<dyn ValidatorSet> {
        &self.validators
    }

    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> Result<(), AppError> {
        let Some(config) = self.keeper.upgrade_config(ctx)? else {
            return Ok(());
        };
        let target = config.protocol.version;
        let height = ctx.block_height();
        let switch_height = config.protocol.switch_height;

        if height > switch_height {
            warn!(
                "Upgrade proposal {} reached height {} past its switch height {} without a tally",
                config.proposal_id, height, switch_height
            );
            return self.resolve_failure(ctx, config, None);
        }

        self.record_signal(ctx, target)?;

        if height == switch_height {
            let tally = self.tally(ctx, &config)?;
            info!(
                "Upgrade proposal {} tally at height {}: signal power {} / total power {}, threshold {}, passed {}",
                config.proposal_id,
                height,
                tally.signal_power,
                tally.total_power,
                config.protocol.threshold,
                tally.passed
            );
            if tally.passed {
                return self.resolve_success(ctx, config, tally);
            }
            return self.resolve_failure(ctx, config, Some(tally));
        }
        Ok(())
    }

    /// Sets or clears the proposer's signal from the app version in its header.
    fn record_signal(&self, ctx: &mut Context<'_>, target: u64) -> Result<(), AppError> {
        let proposer = ctx.header().proposer;
        if proposer.is_empty() {
            return Ok(());
        }
        let running_target = ctx.header().app_version == target;
        let signalled = self.keeper.has_signal(ctx, target, &proposer)?;

        if running_target && !signalled {
            self.keeper.set_signal(ctx, target, &proposer)?;
            ctx.emit_event(Event::new(EVENT_TYPE).attr("signal", target).attr("validator", proposer));
        } else if !running_target && signalled {
            self.keeper.delete_signal(ctx, target, &proposer)?;
        }
        Ok(())
    }

    /// success iff signal_power / total_power > threshold. Zero total power fails.
    pub fn tally(&self, ctx: &mut Context<'_>, config: &UpgradeConfig) -> Result<TallyResult, AppError> {
        let bonded = self.validators.bonded_validators(ctx)?;
        let signalled: Vec<Address> = self.keeper.signals(ctx, config.protocol.version)?;

        let total = total_power(&bonded);
        let signal_power = bonded
            .iter()
            .filter(|(addr, _)| signalled.binary_search(addr).is_ok())
            .fold(0u64, |acc, (_, power)| acc.saturating_add(*power));

        Ok(TallyResult {
            signal_power,
            total_power: total,
            passed: config.protocol.threshold.is_exceeded_by(signal_power, total),
        })
    }

    fn resolve_success(&self, ctx: &mut Context<'_>, config: UpgradeConfig, tally: TallyResult) -> Result<(), AppError> {
        let target = config.protocol.version;
        self.keeper.set_current_version(ctx, target)?;
        ctx.schedule_activation(target);
        self.finish(ctx, config, true)?;

        ctx.emit_event(
            Event::new(EVENT_TYPE)
                .attr("switch", target)
                .attr("signal_power", tally.signal_power)
                .attr("total_power", tally.total_power),
        );
        info!("Protocol version {} will become current after block {}", target, ctx.block_height());
        Ok(())
    }

    fn resolve_failure(
        &self,
        ctx: &mut Context<'_>,
        config: UpgradeConfig,
        tally: Option<TallyResult>,
    ) -> Result<(), AppError> {
        let target = config.protocol.version;
        self.keeper.set_last_failed_version(ctx, target)?;
        self.finish(ctx, config, false)?;

        let mut event = Event::new(EVENT_TYPE).attr("tally", "failed").attr("version", target);
        if let Some(tally) = tally {
            event = event.attr("signal_power", tally.signal_power).attr("total_power", tally.total_power);
        }
        ctx.emit_event(event);
        warn!("Upgrade to protocol version {} failed at height {}", target, ctx.block_height());
        Ok(())
    }

    fn finish(&self, ctx: &mut Context<'_>, config: UpgradeConfig, success: bool) -> Result<(), AppError> {
        let target = config.protocol.version;
        self.keeper.add_version_info(ctx, &VersionInfo { upgrade_config: config, success })?;
        self.keeper.clear_upgrade_config(ctx)?;
        self.keeper.clear_signals(ctx, target)?;
        Ok(())
    }
}
