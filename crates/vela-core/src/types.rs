use crate::error::AppError;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Identifies one `Protocol` implementation. Registered strictly as 0, 1, 2, ...
pub type ProtocolVersion = u64;

pub const ADDRESS_LEN: usize = 20;

/// 20-byte account or consensus address: the first 20 bytes of sha256(pubkey).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub fn from_pub_key(pub_key: &[u8]) -> Self {
        let digest = Sha256::digest(pub_key);
        let mut raw = [0u8; ADDRESS_LEN];
        raw.copy_from_slice(&digest[..ADDRESS_LEN]);
        Address(raw)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AppError> {
        let raw: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|_| AppError::InvalidAddress(format!("expected {} bytes, got {}", ADDRESS_LEN, bytes.len())))?;
        Ok(Address(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| AppError::InvalidAddress(e.to_string()))?;
        Address::from_slice(&raw)
    }
}

// Hex in JSON (genesis, queries), raw bytes on the bincode wire.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(D::Error::custom)
        } else {
            Ok(Address(<[u8; ADDRESS_LEN]>::deserialize(deserializer)?))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u64,
}

impl Coin {
    pub fn new(denom: &str, amount: u64) -> Self {
        Coin { denom: denom.to_string(), amount }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

fn valid_denom(denom: &str) -> bool {
    (3..=16).contains(&denom.len())
        && denom.starts_with(|c: char| c.is_ascii_lowercase())
        && denom.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// Sorted set of positive coin amounts, at most one entry per denom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(Vec<Coin>);

impl Coins {
    pub fn empty() -> Self {
        Coins(Vec::new())
    }

    /// Builds a normalized set, merging duplicate denoms and dropping zeros.
    pub fn new(coins: Vec<Coin>) -> Result<Self, AppError> {
        let mut out = Coins::empty();
        for coin in coins {
            if !valid_denom(&coin.denom) {
                return Err(AppError::InvalidCoins(format!("invalid denom: {}", coin.denom)));
            }
            out = out.checked_add(&Coins(vec![coin]))?;
        }
        Ok(out)
    }

    pub fn single(denom: &str, amount: u64) -> Self {
        if amount == 0 {
            return Coins::empty();
        }
        Coins(vec![Coin::new(denom, amount)])
    }

    /// Parses "10uvela,3stake".
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let mut coins = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let split = part
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| AppError::InvalidCoins(format!("missing denom: {}", part)))?;
            let (amount, denom) = part.split_at(split);
            let amount = amount
                .parse::<u64>()
                .map_err(|e| AppError::InvalidCoins(format!("{}: {}", part, e)))?;
            coins.push(Coin::new(denom, amount));
        }
        Coins::new(coins)
    }

    /// Checks the normalized-form invariants on a set that came off the wire.
    pub fn validate(&self) -> Result<(), AppError> {
        for (i, coin) in self.0.iter().enumerate() {
            if !valid_denom(&coin.denom) {
                return Err(AppError::InvalidCoins(format!("invalid denom: {}", coin.denom)));
            }
            if coin.amount == 0 {
                return Err(AppError::InvalidCoins(format!("zero amount: {}", coin.denom)));
            }
            if i > 0 && self.0[i - 1].denom >= coin.denom {
                return Err(AppError::InvalidCoins("denoms not sorted or duplicated".to_string()));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coin> {
        self.0.iter()
    }

    pub fn amount_of(&self, denom: &str) -> u64 {
        self.0.iter().find(|c| c.denom == denom).map_or(0, |c| c.amount)
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, AppError> {
        let mut out = self.0.clone();
        for coin in &other.0 {
            if coin.amount == 0 {
                continue;
            }
            match out.binary_search_by(|c| c.denom.cmp(&coin.denom)) {
                Ok(i) => {
                    out[i].amount = out[i]
                        .amount
                        .checked_add(coin.amount)
                        .ok_or_else(|| AppError::InvalidCoins(format!("overflow in {}", coin.denom)))?;
                }
                Err(i) => out.insert(i, coin.clone()),
            }
        }
        Ok(Coins(out))
    }

    pub fn checked_sub(&self, other: &Coins) -> Result<Coins, AppError> {
        let mut out = self.0.clone();
        for coin in &other.0 {
            let have = self.amount_of(&coin.denom);
            if have < coin.amount {
                return Err(AppError::InsufficientFunds(format!("{}{} < {}", have, coin.denom, coin)));
            }
            if let Ok(i) = out.binary_search_by(|c| c.denom.cmp(&coin.denom)) {
                out[i].amount -= coin.amount;
            }
        }
        out.retain(|c| c.amount > 0);
        Ok(Coins(out))
    }

    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other.0.iter().all(|c| self.amount_of(&c.denom) >= c.amount)
    }

    /// Multiplies each amount by `gas`, used for minimum fee computation.
    pub fn mul_gas(&self, gas: u64) -> Result<Coins, AppError> {
        let mut out = Vec::with_capacity(self.0.len());
        for coin in &self.0 {
            let amount = coin
                .amount
                .checked_mul(gas)
                .ok_or_else(|| AppError::InvalidCoins(format!("overflow in {}", coin.denom)))?;
            out.push(Coin::new(&coin.denom, amount));
        }
        Ok(Coins(out))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Block header as delivered by the consensus engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub chain_id: String,
    pub height: u64,
    /// Unix seconds.
    pub time: u64,
    /// Consensus address of the proposing validator.
    pub proposer: Address,
    /// Application version reported by the proposer's running binary.
    pub app_version: ProtocolVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: &str) -> Self {
        Event { kind: kind.to_string(), attributes: Vec::new() }
    }

    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_address_json_roundtrip_is_hex() {
        let addr = Address::from_pub_key(b"validator-1");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_coins_arithmetic() {
        let a = Coins::parse("10uvela,5stake").unwrap();
        let b = Coins::parse("3uvela").unwrap();
        assert_eq!(a.checked_sub(&b).unwrap().amount_of("uvela"), 7);
        assert_eq!(a.checked_add(&b).unwrap().amount_of("uvela"), 13);
        assert!(matches!(b.checked_sub(&a), Err(AppError::InsufficientFunds(_))));
        assert!(a.is_all_gte(&b));
        assert!(!b.is_all_gte(&a));
    }

    #[test]
    fn test_coins_normalized() {
        let coins = Coins::new(vec![Coin::new("uvela", 2), Coin::new("stake", 1), Coin::new("uvela", 3)]).unwrap();
        assert_eq!(coins.to_string(), "1stake,5uvela");
        assert!(coins.validate().is_ok());
        assert!(Coins::parse("10UV").is_err());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let raw: Coins = serde_json::from_str(r#"[{"denom":"uvela","amount":0}]"#).unwrap();
        assert!(raw.validate().is_err());
    }

    fn coins_strategy() -> impl Strategy<Value = Coins> {
        proptest::collection::vec((prop::sample::select(vec!["atom", "stake", "uvela"]), 0u64..1_000_000), 0..6)
            .prop_map(|raw| Coins::new(raw.into_iter().map(|(denom, amount)| Coin::new(denom, amount)).collect()).unwrap())
    }

    proptest! {
        #[test]
        fn prop_add_keeps_normal_form(a in coins_strategy(), b in coins_strategy()) {
            let sum = a.checked_add(&b).unwrap();
            prop_assert!(sum.validate().is_ok());
            prop_assert_eq!(&sum, &b.checked_add(&a).unwrap());
            for denom in ["atom", "stake", "uvela"] {
                prop_assert_eq!(sum.amount_of(denom), a.amount_of(denom) + b.amount_of(denom));
            }
        }

        #[test]
        fn prop_sub_undoes_add(a in coins_strategy(), b in coins_strategy()) {
            let sum = a.checked_add(&b).unwrap();
            prop_assert_eq!(sum.checked_sub(&b).unwrap(), a.clone());
            prop_assert!(sum.is_all_gte(&a));
            prop_assert_eq!(b.checked_sub(&sum).is_ok(), a.is_empty());
        }
    }
}
