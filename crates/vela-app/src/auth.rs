// ACCOUNTS
// Account numbers, sequences and the public key bound to each address.
//
// SAFETY INVARIANTS:
// 1. Account numbers are assigned once, from a counter that only increases
// 2. A public key, once bound to an account, never changes
// 3. The sequence increases by exactly one per authenticated transaction

use crate::namespaces;
use serde::{Deserialize, Serialize};
use vela_core::{Address, AppError, Context, Querier};
use vela_store::KeyBuilder;

pub const QUERY_ROUTE: &str = "auth";

const TAG_ACCOUNT: u8 = 0x01;
const TAG_ACCOUNT_NUMBER: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub pub_key: Option<Vec<u8>>,
    pub account_number: u64,
    pub sequence: u64,
}

fn account_key(address: &Address) -> Vec<u8> {
    KeyBuilder::new(namespaces::AUTH).tag(TAG_ACCOUNT).fixed(address.as_bytes()).build()
}

fn account_prefix() -> Vec<u8> {
    KeyBuilder::new(namespaces::AUTH).tag(TAG_ACCOUNT).build()
}

fn account_number_key() -> Vec<u8> {
    KeyBuilder::new(namespaces::AUTH).tag(TAG_ACCOUNT_NUMBER).build()
}

/// Module account that collects transaction fees.
pub fn fee_collector() -> Address {
    Address::from_pub_key(b"vela/module/fee_collector")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountKeeper;

impl AccountKeeper {
    pub fn account(&self, ctx: &mut Context<'_>, address: &Address) -> Result<Option<Account>, AppError> {
        ctx.get_value(&account_key(address))
    }

    pub fn set_account(&self, ctx: &mut Context<'_>, account: &Account) -> Result<(), AppError> {
        ctx.set_value(account_key(&account.address), account)
    }

    /// Returns the existing account, or creates one with the next account number.
    pub fn ensure_account(&self, ctx: &mut Context<'_>, address: &Address) -> Result<Account, AppError> {
        if let Some(account) = self.account(ctx, address)? {
            return Ok(account);
        }
        let number: u64 = ctx.get_value(&account_number_key())?.unwrap_or(0);
        ctx.set_value(account_number_key(), &(number + 1))?;
        let account = Account { address: *address, pub_key: None, account_number: number, sequence: 0 };
        self.set_account(ctx, &account)?;
        Ok(account)
    }

    pub fn accounts(&self, ctx: &mut Context<'_>) -> Result<Vec<Account>, AppError> {
        ctx.iter_prefix(&account_prefix())?
            .iter()
            .map(|(_, raw)| bincode::deserialize(raw).map_err(AppError::from))
            .collect()
    }
}

pub struct AuthQuerier {
    accounts: AccountKeeper,
}

impl AuthQuerier {
    pub fn new(accounts: AccountKeeper) -> Self {
        AuthQuerier { accounts }
    }
}

impl Querier for AuthQuerier {
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], _data: &[u8]) -> Result<Vec<u8>, AppError> {
        match path {
            ["account", address] => {
                let address: Address = address.parse()?;
                let account = self
                    .accounts
                    .account(ctx, &address)?
                    .ok_or_else(|| AppError::UnknownAddress(format!("account {} does not exist", address)))?;
                serde_json::to_vec(&account).map_err(|e| AppError::Internal(e.to_string()))
            }
            _ => Err(AppError::UnknownRequest(format!("unknown auth query: {}", path.join("/")))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vela_core::{Header, RunTxMode};
    use vela_store::{CacheArena, LayerId, Tree};

    #[test]
    fn test_account_numbers_increase() {
        let mut arena = CacheArena::new(Arc::new(Tree::new()));
        let header = Header::default();
        let mut ctx = Context::new(&mut arena, LayerId::ROOT, &header, RunTxMode::Deliver);
        let keeper = AccountKeeper;

        let a = keeper.ensure_account(&mut ctx, &Address([1; 20])).unwrap();
        let b = keeper.ensure_account(&mut ctx, &Address([2; 20])).unwrap();
        let a_again = keeper.ensure_account(&mut ctx, &Address([1; 20])).unwrap();
        assert_eq!((a.account_number, b.account_number), (0, 1));
        assert_eq!(a_again, a);
        assert_eq!(keeper.accounts(&mut ctx).unwrap().len(), 2);
    }
}
