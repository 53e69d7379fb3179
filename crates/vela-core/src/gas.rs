// GAS ACCOUNTING
// Logical execution budget for transactions and blocks.
//
// SAFETY INVARIANTS:
// 1. A charge that would pass the limit is rejected with OutOfGas and is not
//    recorded, so `consumed()` is the gas actually spent up to the failure
// 2. Gas is never refunded by the meter
// 3. Exceeding a budget is reported as a value, never as an unwind

use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub type Gas = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasMeter {
    limit: Option<Gas>,
    consumed: Gas,
}

impl GasMeter {
    pub fn new(limit: Gas) -> Self {
        GasMeter { limit: Some(limit), consumed: 0 }
    }

    pub fn infinite() -> Self {
        GasMeter { limit: None, consumed: 0 }
    }

    /// Block meter from the consensus `max_gas` parameter (-1 means unlimited).
    pub fn for_block(max_gas: i64) -> Self {
        match u64::try_from(max_gas) {
            Ok(limit) => GasMeter::new(limit),
            Err(_) => GasMeter::infinite(),
        }
    }

    pub fn limit(&self) -> Option<Gas> {
        self.limit
    }

    pub fn consumed(&self) -> Gas {
        self.consumed
    }

    pub fn remaining(&self) -> Option<Gas> {
        self.limit.map(|limit| limit.saturating_sub(self.consumed))
    }

    pub fn consume(&mut self, amount: Gas, descriptor: &str) -> Result<(), AppError> {
        let next = self.consumed.checked_add(amount).ok_or_else(|| AppError::OutOfGas {
            descriptor: format!("{} (overflow)", descriptor),
            limit: self.limit.unwrap_or(Gas::MAX),
            consumed: self.consumed,
        })?;

        if let Some(limit) = self.limit {
            if next > limit {
                return Err(AppError::OutOfGas {
                    descriptor: descriptor.to_string(),
                    limit,
                    consumed: self.consumed,
                });
            }
        }

        self.consumed = next;
        Ok(())
    }

    /// Adds `amount`, clamping at the limit. Used by the block meter, which must
    /// account every delivered transaction even when it overflows.
    pub fn consume_saturating(&mut self, amount: Gas) {
        let next = self.consumed.saturating_add(amount);
        self.consumed = match self.limit {
            Some(limit) => next.min(limit),
            None => next,
        };
    }

    /// True once the budget is fully spent.
    pub fn is_out_of_gas(&self) -> bool {
        self.limit.map_or(false, |limit| self.consumed >= limit)
    }
}

/// Gas charged for store access through a `Context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvGasConfig {
    pub has_cost: Gas,
    pub delete_cost: Gas,
    pub read_cost_flat: Gas,
    pub read_cost_per_byte: Gas,
    pub write_cost_flat: Gas,
    pub write_cost_per_byte: Gas,
    pub iter_next_cost_flat: Gas,
}

impl Default for KvGasConfig {
    fn default() -> Self {
        KvGasConfig {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }
}
