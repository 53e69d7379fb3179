// BANK
// Balances and transfers.
//
// SAFETY INVARIANTS:
// 1. A transfer either moves the full amount or changes nothing
// 2. Balances never go negative; coin arithmetic is checked

use crate::auth::AccountKeeper;
use crate::msgs::AppMsg;
use crate::namespaces;
use vela_core::{Address, AppError, Coins, Context, Event, Handler, HandlerResult, Msg, Querier};
use vela_store::KeyBuilder;

pub const ROUTE: &str = "bank";

const TAG_BALANCE: u8 = 0x01;

fn balance_key(address: &Address) -> Vec<u8> {
    KeyBuilder::new(namespaces::BANK).tag(TAG_BALANCE).fixed(address.as_bytes()).build()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BankKeeper {
    accounts: AccountKeeper,
}

impl BankKeeper {
    pub fn new(accounts: AccountKeeper) -> Self {
        BankKeeper { accounts }
    }

    pub fn balance(&self, ctx: &mut Context<'_>, address: &Address) -> Result<Coins, AppError> {
        Ok(ctx.get_value(&balance_key(address))?.unwrap_or_default())
    }

    pub fn set_balance(&self, ctx: &mut Context<'_>, address: &Address, coins: &Coins) -> Result<(), AppError> {
        if coins.is_empty() {
            return ctx.delete(&balance_key(address));
        }
        ctx.set_value(balance_key(address), coins)
    }

    pub fn add_coins(&self, ctx: &mut Context<'_>, address: &Address, amount: &Coins) -> Result<(), AppError> {
        let updated = self.balance(ctx, address)?.checked_add(amount)?;
        self.set_balance(ctx, address, &updated)
    }

    pub fn subtract_coins(&self, ctx: &mut Context<'_>, address: &Address, amount: &Coins) -> Result<(), AppError> {
        let current = self.balance(ctx, address)?;
        let updated = current
            .checked_sub(amount)
            .map_err(|_| AppError::InsufficientFunds(format!("{} has {}, needs {}", address, current, amount)))?;
        self.set_balance(ctx, address, &updated)
    }

    /// Moves `amount` from `from` to `to`, creating the recipient account if needed.
    pub fn send_coins(&self, ctx: &mut Context<'_>, from: &Address, to: &Address, amount: &Coins) -> Result<(), AppError> {
        self.subtract_coins(ctx, from, amount)?;
        self.accounts.ensure_account(ctx, to)?;
        self.add_coins(ctx, to, amount)
    }
}

pub struct BankHandler {
    keeper: BankKeeper,
}

impl BankHandler {
    pub fn new(keeper: BankKeeper) -> Self {
        BankHandler { keeper }
    }
}

impl Handler<AppMsg> for BankHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &AppMsg) -> Result<HandlerResult, AppError> {
        let AppMsg::Send(send) = msg else {
            return Err(AppError::UnknownRequest(format!("unrecognized bank message: {}", msg.msg_type())));
        };
        self.keeper.send_coins(ctx, &send.from, &send.to, &send.amount)?;
        ctx.emit_event(
            Event::new("transfer")
                .attr("sender", send.from)
                .attr("recipient", send.to)
                .attr("amount", &send.amount),
        );
        Ok(HandlerResult::default())
    }
}

pub struct BankQuerier {
    keeper: BankKeeper,
}

impl BankQuerier {
    pub fn new(keeper: BankKeeper) -> Self {
        BankQuerier { keeper }
    }
}

impl Querier for BankQuerier {
    fn query(&self, ctx: &mut Context<'_>, path: &[&str], _data: &[u8]) -> Result<Vec<u8>, AppError> {
        match path {
            ["balances", address] => {
                let address: Address = address.parse()?;
                let coins = self.keeper.balance(ctx, &address)?;
                serde_json::to_vec(&coins).map_err(|e| AppError::Internal(e.to_string()))
            }
            _ => Err(AppError::UnknownRequest(format!("unknown bank query: {}", path.join("/")))),
        }
    }
}
