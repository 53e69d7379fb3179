// Bonded validator set, fixed at genesis. Backs the upgrade tally.

use crate::namespaces;
use serde::{Deserialize, Serialize};
use vela_core::{Address, AppError, Context, Querier, ValidatorUpdate};
use vela_store::KeyBuilder;
use vela_upgrade::ValidatorSet;

pub const QUERY_ROUTE: &str = "staking";

const TAG_VALIDATOR: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: Address,
    pub consensus_pub_key: Vec<u8>,
    pub consensus_address: Address,
    pub power: u64,
}

impl Validator {
    pub fn new(operator: Address, consensus_pub_key: Vec<u8>, power: u64) -> Self {
        let consensus_address = Address::from_pub_key(&consensus_pub_key);
        Validator { operator, consensus_pub_key, consensus_address, power }
    }

    pub fn is_bonded(&self) -> bool {
        self.power > 0
    }

    pub fn to_update(&self) -> ValidatorUpdate {
        ValidatorUpdate { pub_key: self.consensus_pub_key.clone(), power: self.power }
    }
}

fn validator_key(consensus_address: &Address) -> Vec<u8> {
    KeyBuilder::new(namespaces::STAKING).tag(TAG_VALIDATOR).fixed(consensus_address.as_bytes()).build()
}

fn validator_prefix() -> Vec<u8> {
    KeyBuilder::new(namespaces::STAKING).tag(TAG_VALIDATOR).build()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StakingKeeper;

impl StakingKeeper {
    pub fn set_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> Result<(), AppError> {
        ctx.set_value(validator_key(&validator.consensus_address), validator)
    }

    pub fn validator(&self, ctx: &mut Context<'_>, consensus_address: &Address) -> Result<Option<Validator>, AppError> {
        ctx.get_value(&validator_key(consensus_address))
    }

    /// All validators ordered by consensus address.
    pub fn validators(&self, ctx: &mut Context<'_>) -> Result<Vec<Validator>, AppError> {
        ctx.iter_prefix(&validator_prefix())?
            .iter()
            .map(|(_, raw)| bincode::deserialize(raw).map_err(AppError::from))
            .collect()
    }
}

impl ValidatorSet for StakingKeeper {
    fn bonded_validators(&self, ctx: &mut Context<'_>) -> Result<Vec<(Address, u64)>, AppError> {
        Ok(self
            .validators(ctx)?
            .into_iter()
            .filter(Validator::is_bonded)
            .map(|v| (v.consensus_address, v.power))
            .collect())
    }
}

pub struct StakingQuerier {
    keeper: StakingKeeper,
}

impl StakingQuerier {
    pub fn new(keeper: StakingKeeper) -> Self {
        StakingQuerier { keeper }
    }
}

impl Querier for StakingQuerier {
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], _data: &[u8]) -> Result<Vec<u8>, AppError> {
        match path {
            ["validators"] => {
                let validators = self.keeper.validators(ctx)?;
                serde_json::to_vec(&validators).map_err(|e| AppError::Internal(e.to_string()))
            }
            _ => Err(AppError::UnknownRequest(format!("unknown staking query: {}", path.join("/")))),
        }
    }
}
