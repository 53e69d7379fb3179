// GENESIS
// JSON application state applied by InitChain and produced by export.
//
// SAFETY INVARIANTS:
// 1. Genesis is applied exactly once, at height 0, inside the InitChain context
// 2. A malformed genesis document is a fatal error, never a partial apply
// 3. Export reads committed state only; it never writes

use crate::auth::fee_collector;
use crate::gov;
use crate::protocol::Keepers;
use crate::staking::Validator;
use log::info;
use serde::{Deserialize, Serialize};
use vela_core::{Address, AppError, Coins, Context, ValidatorUpdate};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    #[serde(default)]
    pub coins: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub operator: Address,
    /// Hex ed25519 consensus key.
    pub pub_key: String,
    pub power: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeGenesis {
    /// Address allowed to submit software upgrade proposals.
    #[serde(default)]
    pub authority: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisState {
    pub accounts: Vec<GenesisAccount>,
    pub validators: Vec<GenesisValidator>,
    pub upgrade: UpgradeGenesis,
}

impl GenesisState {
    /// Empty bytes stand for the default, empty state. InitChain turns a
    /// decode failure into a fatal genesis error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AppError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(GenesisState::default());
        }
        serde_json::from_slice(bytes).map_err(|e| AppError::InvalidRequest(format!("genesis app state: {}", e)))
    }
}

fn decode_pub_key(raw: &str) -> Result<Vec<u8>, AppError> {
    hex::decode(raw).map_err(|e| AppError::InvalidPubKey(format!("{}: {}", raw, e)))
}

/// Writes accounts, balances, validators and the upgrade authority. When the
/// genesis document names no validators, the ones supplied by consensus are
/// bonded with themselves as operator.
pub fn init_genesis(
    ctx: &mut Context<'_>,
    keepers: &Keepers,
    state: &GenesisState,
    consensus_validators: &[ValidatorUpdate],
) -> Result<Vec<ValidatorUpdate>, AppError> {
    for account in &state.accounts {
        account.coins.validate()?;
        keepers.accounts.ensure_account(ctx, &account.address)?;
        keepers.bank.add_coins(ctx, &account.address, &account.coins)?;
    }

    let validators: Vec<Validator> = if state.validators.is_empty() {
        consensus_validators
            .iter()
            .map(|v| {
                let validator = Validator::new(Address::default(), v.pub_key.clone(), v.power);
                Validator { operator: validator.consensus_address, ..validator }
            })
            .collect()
    } else {
        state
            .validators
            .iter()
            .map(|v| -> Result<Validator, AppError> {
                Ok(Validator::new(v.operator, decode_pub_key(&v.pub_key)?, v.power))
            })
            .collect::<Result<_, AppError>>()?
    };
    for validator in &validators {
        keepers.staking.set_validator(ctx, validator)?;
    }

    if let Some(authority) = &state.upgrade.authority {
        gov::set_upgrade_authority(ctx, authority)?;
    }

    info!(
        "Applied genesis: {} accounts, {} validators, upgrade authority {}",
        state.accounts.len(),
        validators.len(),
        state.upgrade.authority.map_or_else(|| "none".to_string(), |a| a.to_string())
    );
    Ok(validators.iter().filter(|v| v.is_bonded()).map(Validator::to_update).collect())
}

/// Reads the current state back into a genesis document. With
/// `for_zero_height`, validators whose operator is not in a non-empty
/// `jail_whitelist` are exported with zero power.
pub fn export_genesis(
    ctx: &mut Context<'_>,
    keepers: &Keepers,
    for_zero_height: bool,
    jail_whitelist: &[String],
) -> Result<(GenesisState, Vec<ValidatorUpdate>), AppError> {
    let collector = fee_collector();
    let mut accounts = Vec::new();
    for account in keepers.accounts.accounts(ctx)? {
        if account.address == collector {
            continue;
        }
        let coins = keepers.bank.balance(ctx, &account.address)?;
        accounts.push(GenesisAccount { address: account.address, coins });
    }

    let mut validators = Vec::new();
    let mut updates = Vec::new();
    for mut validator in keepers.staking.validators(ctx)? {
        let operator = validator.operator.to_string();
        if for_zero_height && !jail_whitelist.is_empty() && !jail_whitelist.contains(&operator) {
            validator.power = 0;
        }
        if validator.is_bonded() {
            updates.push(validator.to_update());
        }
        validators.push(GenesisValidator {
            operator: validator.operator,
            pub_key: hex::encode(&validator.consensus_pub_key),
            power: validator.power,
        });
    }

    let upgrade = UpgradeGenesis { authority: gov::upgrade_authority(ctx)? };
    Ok((GenesisState { accounts, validators, upgrade }, updates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes_give_default() {
        assert_eq!(GenesisState::from_bytes(b"").unwrap(), GenesisState::default());
        assert_eq!(GenesisState::from_bytes(b"  \n").unwrap(), GenesisState::default());
    }

    #[test]
    fn test_malformed_genesis_is_rejected() {
        assert!(matches!(GenesisState::from_bytes(b"{\"accounts\": 7}"), Err(AppError::InvalidRequest(_))));
    }

    #[test]
    fn test_genesis_json_shape() {
        let raw = format!(
            r#"{{"accounts":[{{"address":"{addr}","coins":[{{"denom":"uvela","amount":"10"}}]}}],
                "upgrade":{{"authority":"{addr}"}}}}"#,
            addr = Address([7; 20])
        );
        // amounts are plain numbers; a quoted amount must be rejected
        assert!(GenesisState::from_bytes(raw.as_bytes()).is_err());

        let raw = raw.replace("\"10\"", "10");
        let state = GenesisState::from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(state.accounts[0].coins.amount_of("uvela"), 10);
        assert_eq!(state.upgrade.authority, Some(Address([7; 20])));
        assert!(state.validators.is_empty());
    }
}
