// ANTE HANDLER
// Authentication, fee deduction and gas setup for every transaction.
//
// SAFETY INVARIANTS:
// 1. The tx gas meter is attached before any gas is charged
// 2. The fee is deducted before any message runs and survives message failure
// 3. Every signer's sequence is bumped exactly once per accepted transaction
// 4. Signatures commit to the account number and sequence, so a replayed or
//    out-of-order tx fails verification
// 5. Simulation skips signature checks but charges the same gas

use crate::auth::{fee_collector, AccountKeeper};
use crate::bank::BankKeeper;
use crate::msgs::AppMsg;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use log::debug;
use vela_core::{sign_bytes, Address, AnteHandler, AppError, Coin, Coins, Context, FeeRefundHandler, GasMeter, Tx};

pub const TX_SIZE_COST_PER_BYTE: u64 = 10;
pub const SIG_VERIFY_COST_ED25519: u64 = 590;

#[derive(Debug, Clone, Copy, Default)]
pub struct AuthAnteHandler {
    accounts: AccountKeeper,
    bank: BankKeeper,
}

impl AuthAnteHandler {
    pub fn new(accounts: AccountKeeper, bank: BankKeeper) -> Self {
        AuthAnteHandler { accounts, bank }
    }

    fn check_min_fee(&self, ctx: &Context<'_>, tx: &Tx<AppMsg>) -> Result<(), AppError> {
        if !ctx.is_check_tx() || ctx.min_gas_prices().is_empty() {
            return Ok(());
        }
        let required = ctx.min_gas_prices().mul_gas(tx.fee.gas)?;
        if !tx.fee.amount.is_all_gte(&required) {
            return Err(AppError::InsufficientFee(format!("got {}, required {}", tx.fee.amount, required)));
        }
        Ok(())
    }
}

fn verify_ed25519(pub_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), AppError> {
    let key_bytes: &[u8; 32] = pub_key
        .try_into()
        .map_err(|_| AppError::InvalidPubKey(format!("ed25519 key must be 32 bytes, got {}", pub_key.len())))?;
    let key = VerifyingKey::from_bytes(key_bytes).map_err(|e| AppError::InvalidPubKey(e.to_string()))?;
    let signature = Signature::from_slice(signature).map_err(|e| AppError::Unauthorized(e.to_string()))?;
    key.verify(message, &signature).map_err(|_| {
        AppError::Unauthorized("signature verification failed; verify correct account sequence and chain-id".to_string())
    })
}

impl AnteHandler<AppMsg> for AuthAnteHandler {
    fn ante(&self, ctx: &mut Context<'_>, tx: &Tx<AppMsg>, tx_len: usize, simulate: bool) -> Result<(), AppError> {
        let meter = if simulate { GasMeter::infinite() } else { GasMeter::new(tx.fee.gas) };
        ctx.set_gas_meter(meter);

        if !simulate {
            self.check_min_fee(ctx, tx)?;
        }
        ctx.consume_gas(TX_SIZE_COST_PER_BYTE.saturating_mul(tx_len as u64), "txSize")?;

        let signers = tx.signers();
        let mut accounts = Vec::with_capacity(signers.len());
        for (signer, sig) in signers.iter().zip(&tx.signatures) {
            let mut account = self
                .accounts
                .account(ctx, signer)?
                .ok_or_else(|| AppError::UnknownAddress(format!("account {} does not exist", signer)))?;

            if Address::from_pub_key(&sig.pub_key) != *signer {
                return Err(AppError::InvalidPubKey(format!("pubkey does not match signer address {}", signer)));
            }
            if let Some(bound) = &account.pub_key {
                if *bound != sig.pub_key {
                    return Err(AppError::InvalidPubKey(format!("pubkey differs from the one bound to {}", signer)));
                }
            }
            account.pub_key = Some(sig.pub_key.clone());
            ctx.consume_gas(SIG_VERIFY_COST_ED25519, "ante verify: ed25519")?;

            if !simulate {
                let bytes =
                    sign_bytes(ctx.chain_id(), account.account_number, account.sequence, &tx.fee, &tx.msgs, &tx.memo)?;
                verify_ed25519(&sig.pub_key, &bytes, &sig.signature)?;
            }
            accounts.push(account);
        }

        if let Some(payer) = signers.first() {
            if !tx.fee.amount.is_empty() {
                self.bank.send_coins(ctx, payer, &fee_collector(), &tx.fee.amount)?;
            }
        }

        for mut account in accounts {
            account.sequence += 1;
            self.accounts.set_account(ctx, &account)?;
        }
        Ok(())
    }
}

/// Returns `fee * (gas_wanted - gas_used) / gas_wanted` of each denom to the payer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeRefund {
    bank: BankKeeper,
}

impl FeeRefund {
    pub fn new(bank: BankKeeper) -> Self {
        FeeRefund { bank }
    }
}

pub fn unused_fee(fee: &Coins, gas_wanted: u64, gas_used: u64) -> Result<Coins, AppError> {
    if gas_wanted == 0 || gas_used >= gas_wanted {
        return Ok(Coins::empty());
    }
    let unused = u128::from(gas_wanted - gas_used);
    let coins = fee
        .iter()
        .map(|coin| {
            let amount = u128::from(coin.amount) * unused / u128::from(gas_wanted);
            // amount <= coin.amount, so it fits back into u64
            Coin::new(&coin.denom, amount as u64)
        })
        .collect();
    Coins::new(coins)
}

impl FeeRefundHandler<AppMsg> for FeeRefund {
    fn refund(&self, ctx: &mut Context<'_>, tx: &Tx<AppMsg>, gas_used: u64) -> Result<(), AppError> {
        let Some(payer) = tx.fee_payer() else {
            return Ok(());
        };
        let refund = unused_fee(&tx.fee.amount, tx.fee.gas, gas_used)?;
        if refund.is_empty() {
            return Ok(());
        }
        debug!("Refunding {} to {} ({} of {} gas used)", refund, payer, gas_used, tx.fee.gas);
        self.bank.send_coins(ctx, &fee_collector(), &payer, &refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_fee() {
        let fee = Coins::parse("1000uvela,10stake").unwrap();
        let refund = unused_fee(&fee, 100_000, 25_000).unwrap();
        assert_eq!(refund.amount_of("uvela"), 750);
        assert_eq!(refund.amount_of("stake"), 7);

        assert!(unused_fee(&fee, 100_000, 100_000).unwrap().is_empty());
        assert!(unused_fee(&fee, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_verify_rejects_bad_key() {
        let err = verify_ed25519(&[1, 2, 3], b"msg", &[0; 64]).unwrap_err();
        assert!(matches!(err, AppError::InvalidPubKey(_)));
    }
}
