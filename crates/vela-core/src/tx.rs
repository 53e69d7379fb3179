use crate::error::AppError;
use crate::gas::Gas;
use crate::types::{Address, Coins};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

pub const MAX_MEMO_CHARACTERS: usize = 256;
pub const TX_SIG_LIMIT: usize = 7;
pub const MAX_TX_BYTES: usize = 1024 * 1024;

/// One message family. Each binary defines a closed enum implementing this;
/// a Protocol version decides which variants it routes.
pub trait Msg: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Router key of the module that handles this message.
    fn route(&self) -> &'static str;

    fn msg_type(&self) -> &'static str;

    /// Stateless checks run before any gas accounting.
    fn validate_basic(&self) -> Result<(), AppError>;

    fn signers(&self) -> Vec<Address>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Coins,
    pub gas: Gas,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tx<M> {
    pub msgs: Vec<M>,
    pub fee: Fee,
    pub signatures: Vec<StdSignature>,
    pub memo: String,
}

impl<M: Msg> Tx<M> {
    /// Unique signers in first-appearance order. The first one pays the fee.
    pub fn signers(&self) -> Vec<Address> {
        let mut out: Vec<Address> = Vec::new();
        for msg in &self.msgs {
            for signer in msg.signers() {
                if !out.contains(&signer) {
                    out.push(signer);
                }
            }
        }
        out
    }

    pub fn fee_payer(&self) -> Option<Address> {
        self.signers().first().copied()
    }

    pub fn validate_basic(&self) -> Result<(), AppError> {
        if self.msgs.is_empty() {
            return Err(AppError::InvalidRequest("tx must contain at least one message".to_string()));
        }
        self.fee.amount.validate()?;

        let memo_len = self.memo.chars().count();
        if memo_len > MAX_MEMO_CHARACTERS {
            return Err(AppError::MemoTooLarge { max: MAX_MEMO_CHARACTERS, got: memo_len });
        }

        if self.signatures.is_empty() {
            return Err(AppError::NoSignatures);
        }
        if self.signatures.len() > TX_SIG_LIMIT {
            return Err(AppError::TooManySignatures { max: TX_SIG_LIMIT, got: self.signatures.len() });
        }
        let signers = self.signers();
        if signers.len() != self.signatures.len() {
            return Err(AppError::Unauthorized(format!(
                "wrong number of signers; expected {}, got {}",
                signers.len(),
                self.signatures.len()
            )));
        }

        for msg in &self.msgs {
            msg.validate_basic()?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct StdSignDoc<'a, M> {
    chain_id: &'a str,
    account_number: u64,
    sequence: u64,
    fee: &'a Fee,
    msgs: &'a [M],
    memo: &'a str,
}

/// Canonical bytes a signer commits to.
pub fn sign_bytes<M: Msg>(
    chain_id: &str,
    account_number: u64,
    sequence: u64,
    fee: &Fee,
    msgs: &[M],
    memo: &str,
) -> Result<Vec<u8>, AppError> {
    let doc = StdSignDoc { chain_id, account_number, sequence, fee, msgs, memo };
    serde_json::to_vec(&doc).map_err(|e| AppError::Internal(format!("sign doc: {}", e)))
}

/// Wire codec owned by a Protocol.
pub trait Codec<M: Msg>: Send + Sync {
    fn decode_tx(&self, bytes: &[u8]) -> Result<Tx<M>, AppError>;

    fn encode_tx(&self, tx: &Tx<M>) -> Result<Vec<u8>, AppError>;
}

/// Default codec: bincode transactions.
pub struct BincodeCodec<M> {
    _msg: PhantomData<fn() -> M>,
}

impl<M> BincodeCodec<M> {
    pub fn new() -> Self {
        BincodeCodec { _msg: PhantomData }
    }
}

impl<M> Default for BincodeCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Msg> Codec<M> for BincodeCodec<M> {
    fn decode_tx(&self, bytes: &[u8]) -> Result<Tx<M>, AppError> {
        if bytes.is_empty() {
            return Err(AppError::TxDecode("empty tx bytes".to_string()));
        }
        if bytes.len() > MAX_TX_BYTES {
            return Err(AppError::TxDecode(format!("tx of {} bytes exceeds {}", bytes.len(), MAX_TX_BYTES)));
        }
        bincode::deserialize(bytes).map_err(|e| AppError::TxDecode(e.to_string()))
    }

    fn encode_tx(&self, tx: &Tx<M>) -> Result<Vec<u8>, AppError> {
        bincode::serialize(tx).map_err(|e| AppError::Internal(format!("tx encoding: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ping {
        from: Address,
        nonce: u64,
    }

    impl Msg for Ping {
        fn route(&self) -> &'static str {
            "ping"
        }
        fn msg_type(&self) -> &'static str {
            "ping"
        }
        fn validate_basic(&self) -> Result<(), AppError> {
            if self.nonce == 0 {
                return Err(AppError::InvalidRequest("zero nonce".into()));
            }
            Ok(())
        }
        fn signers(&self) -> Vec<Address> {
            vec![self.from]
        }
    }

    fn tx(msgs: Vec<Ping>, sigs: usize) -> Tx<Ping> {
        Tx {
            msgs,
            fee: Fee { amount: Coins::empty(), gas: 100 },
            signatures: vec![StdSignature { pub_key: vec![], signature: vec![] }; sigs],
            memo: String::new(),
        }
    }

    #[test]
    fn test_signers_deduplicated() {
        let a = Address([1; 20]);
        let b = Address([2; 20]);
        let t = tx(
            vec![Ping { from: a, nonce: 1 }, Ping { from: b, nonce: 1 }, Ping { from: a, nonce: 2 }],
            2,
        );
        assert_eq!(t.signers(), vec![a, b]);
        assert_eq!(t.fee_payer(), Some(a));
        assert!(t.validate_basic().is_ok());
    }

    #[test]
    fn test_validate_basic_failures() {
        let a = Address([1; 20]);
        assert!(matches!(tx(vec![], 1).validate_basic(), Err(AppError::InvalidRequest(_))));
        assert!(matches!(tx(vec![Ping { from: a, nonce: 1 }], 0).validate_basic(), Err(AppError::NoSignatures)));
        assert!(matches!(tx(vec![Ping { from: a, nonce: 1 }], 2).validate_basic(), Err(AppError::Unauthorized(_))));
        assert!(matches!(tx(vec![Ping { from: a, nonce: 0 }], 1).validate_basic(), Err(AppError::InvalidRequest(_))));

        let mut long = tx(vec![Ping { from: a, nonce: 1 }], 1);
        long.memo = "x".repeat(MAX_MEMO_CHARACTERS + 1);
        assert!(matches!(long.validate_basic(), Err(AppError::MemoTooLarge { .. })));
    }

    #[test]
    fn test_codec_rejects_garbage() {
        let codec = BincodeCodec::<Ping>::new();
        assert!(matches!(codec.decode_tx(&[]), Err(AppError::TxDecode(_))));
        assert!(matches!(codec.decode_tx(&[0xff, 0x01]), Err(AppError::TxDecode(_))));

        let t = tx(vec![Ping { from: Address([3; 20]), nonce: 9 }], 1);
        let decoded = codec.decode_tx(&codec.encode_tx(&t).unwrap()).unwrap();
        assert_eq!(decoded.msgs[0].nonce, 9);
    }
}
