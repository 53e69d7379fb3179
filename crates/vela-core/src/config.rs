use crate::error::FatalError;
use crate::types::Coins;
use serde::{Deserialize, Serialize};
use vela_store::PruningOptions;

/// Operator-local pipeline settings. None of these affect consensus state
/// except `halt_height`, which stops the node instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Per-unit-of-gas prices such as "1uvela". Enforced in CheckTx only.
    pub minimum_gas_prices: String,
    /// Commit at this height returns a fatal halt. 0 disables.
    pub halt_height: u64,
    pub pruning: PruningOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig { minimum_gas_prices: String::new(), halt_height: 0, pruning: PruningOptions::default() }
    }
}

impl AppConfig {
    pub fn min_gas_prices(&self) -> Result<Coins, FatalError> {
        Coins::parse(&self.minimum_gas_prices)
            .map_err(|e| FatalError::Config(format!("minimum_gas_prices: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_gas_prices() {
        let mut cfg = AppConfig::default();
        assert!(cfg.min_gas_prices().unwrap().is_empty());
        cfg.minimum_gas_prices = "2uvela".into();
        assert_eq!(cfg.min_gas_prices().unwrap().amount_of("uvela"), 2);
        cfg.minimum_gas_prices = "abc".into();
        assert!(matches!(cfg.min_gas_prices(), Err(FatalError::Config(_))));
    }
}
