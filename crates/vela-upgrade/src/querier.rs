//! `custom/upgrade/...` queries. Responses are JSON.

use crate::coordinator::UpgradeCoordinator;
use crate::dec::Dec;
use crate::error::UpgradeError;
use crate::types::{SignalSummary, UpgradeInfo};
use crate::validators::total_power;
use serde::Serialize;
use vela_core::{AppError, Context, Querier};

pub const QUERY_ROUTE: &str = "upgrade";

pub struct UpgradeQuerier {
    coordinator: UpgradeCoordinator,
}

impl UpgradeQuerier {
    pub fn new(coordinator: UpgradeCoordinator) -> Self {
        UpgradeQuerier { coordinator }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(value).map_err(|e| AppError::Internal(format!("json: {}", e)))
}

fn parse_u64(raw: &str, what: &str) -> Result<u64, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidRequest(format!("invalid {} {:?}", what, raw)))
}

impl Querier for UpgradeQuerier {
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], _data: &[u8]) -> Result<Vec<u8>, AppError> {
        let keeper = self.coordinator.keeper();
        match path {
            ["info"] => to_json(&UpgradeInfo {
                current_version: keeper.current_version(ctx)?,
                last_failed_version: keeper.last_failed_version(ctx)?,
                upgrade_config: keeper.upgrade_config(ctx)?,
            }),
            ["proposal", id] => {
                let id = parse_u64(id, "proposal id")?;
                let info = keeper
                    .version_info(ctx, id)?
                    .ok_or_else(|| UpgradeError::NotFound(format!("proposal {}", id)))?;
                to_json(&info)
            }
            ["version", version] => {
                let version = parse_u64(version, "version")?;
                let info = keeper
                    .success_version_info(ctx, version)?
                    .ok_or_else(|| UpgradeError::NotFound(format!("successful upgrade to version {}", version)))?;
                to_json(&info)
            }
            ["failed", version] => {
                let version = parse_u64(version, "version")?;
                to_json(&keeper.failed_version_infos(ctx, version)?)
            }
            ["signals", version] => {
                let version = parse_u64(version, "version")?;
                let validators = keeper.signals(ctx, version)?;
                let bonded = self.coordinator.validators().bonded_validators(ctx)?;
                let signal_power = bonded
                    .iter()
                    .filter(|(addr, _)| validators.contains(addr))
                    .fold(0u64, |acc, (_, p)| acc.saturating_add(*p));
                let total = total_power(&bonded);
                let signal_ratio = Dec::ratio(signal_power, total).unwrap_or(Dec::ZERO);
                to_json(&SignalSummary { version, validators, signal_power, total_power: total, signal_ratio })
            }
            _ => Err(AppError::UnknownRequest(format!("unknown upgrade query: {}", path.join("/")))),
        }
    }
}
