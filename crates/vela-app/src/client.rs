//! Key handling and transaction signing for clients, test drivers and the
//! node CLI.

use crate::msgs::AppMsg;
use ed25519_dalek::{Signer, SigningKey};
use vela_core::{sign_bytes, Address, AppError, BincodeCodec, Codec, Fee, StdSignature, Tx};

/// An ed25519 account key.
#[derive(Clone)]
pub struct TxSigner {
    key: SigningKey,
}

impl TxSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        TxSigner { key: SigningKey::from_bytes(&seed) }
    }

    pub fn pub_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key(&self.pub_key())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.key.sign(message).to_bytes().to_vec()
    }
}

/// One signer together with the account state its signature commits to.
pub struct SignerInfo<'a> {
    pub signer: &'a TxSigner,
    pub account_number: u64,
    pub sequence: u64,
}

/// Builds a transaction signed by `signers`, which must be given in the
/// order the messages first name them.
pub fn sign_tx(
    chain_id: &str,
    msgs: Vec<AppMsg>,
    fee: Fee,
    memo: &str,
    signers: &[SignerInfo<'_>],
) -> Result<Tx<AppMsg>, AppError> {
    let mut signatures = Vec::with_capacity(signers.len());
    for info in signers {
        let bytes = sign_bytes(chain_id, info.account_number, info.sequence, &fee, &msgs, memo)?;
        signatures.push(StdSignature { pub_key: info.signer.pub_key(), signature: info.signer.sign(&bytes) });
    }
    Ok(Tx { msgs, fee, signatures, memo: memo.to_string() })
}

pub fn encode_tx(tx: &Tx<AppMsg>) -> Result<Vec<u8>, AppError> {
    BincodeCodec::<AppMsg>::new().encode_tx(tx)
}
