use vela_core::{Address, AppError, Context};

/// Bonded validator set as seen by the tally. Implemented by the staking module.
pub trait ValidatorSet: Send + Sync {
    /// `(consensus address, voting power)` of every bonded validator.
    fn bonded_validators(&self, ctx: &mut Context<'_>) -> Result<Vec<(Address, u64)>, AppError>;
}

/// Sums voting power, saturating.
pub fn total_power(validators: &[(Address, u64)]) -> u64 {
    validators.iter().fold(0u64, |acc, (_, power)| acc.saturating_add(*power))
}
