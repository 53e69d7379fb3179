// FIXED-POINT DECIMAL
// Thresholds are compared with integer arithmetic only so every node reaches
// the same tally result.
//
// SAFETY INVARIANTS:
// 1. A Dec is an unsigned integer scaled by 10^18; no floating point anywhere
// 2. Parsing rejects more than 18 fractional digits instead of rounding

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PRECISION: u32 = 18;
const SCALE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecError {
    #[error("empty decimal string")]
    Empty,

    #[error("invalid decimal {0:?}")]
    Invalid(String),

    #[error("too many fractional digits in {0:?} (max 18)")]
    TooPrecise(String),

    #[error("decimal {0:?} overflows")]
    Overflow(String),
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Dec(u128);

impl Dec {
    pub const ZERO: Dec = Dec(0);
    pub const ONE: Dec = Dec(SCALE);

    pub fn from_raw(raw: u128) -> Self {
        Dec(raw)
    }

    /// Scaled integer value.
    pub fn raw(&self) -> u128 {
        self.0
    }

    /// `numerator / denominator`, truncated to 18 decimals.
    pub fn ratio(numerator: u64, denominator: u64) -> Option<Dec> {
        if denominator == 0 {
            return None;
        }
        Some(Dec(u128::from(numerator) * SCALE / u128::from(denominator)))
    }

    /// Exact test of `part / total > self` without division.
    pub fn is_exceeded_by(&self, part: u64, total: u64) -> bool {
        if total == 0 {
            return false;
        }
        let lhs = u128::from(part) * SCALE;
        match self.0.checked_mul(u128::from(total)) {
            Some(rhs) => lhs > rhs,
            None => false,
        }
    }
}

impl FromStr for Dec {
    type Err = DecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DecError::Empty);
        }
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecError::Invalid(s.to_string()));
        }
        let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if !digits(int_part) || !digits(frac_part) {
            return Err(DecError::Invalid(s.to_string()));
        }
        if frac_part.len() > PRECISION as usize {
            return Err(DecError::TooPrecise(s.to_string()));
        }

        let int_value: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| DecError::Overflow(s.to_string()))?
        };
        let frac_value: u128 = if frac_part.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac_part, width = PRECISION as usize);
            padded.parse().map_err(|_| DecError::Invalid(s.to_string()))?
        };

        int_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(frac_value))
            .map(Dec)
            .ok_or_else(|| DecError::Overflow(s.to_string()))
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let int = self.0 / SCALE;
        let frac = self.0 % SCALE;
        write!(f, "{}.{:018}", int, frac)
    }
}

impl fmt::Debug for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dec({})", self)
    }
}

impl Serialize for Dec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_display() {
        let d: Dec = "0.75".parse().unwrap();
        assert_eq!(d.raw(), 750_000_000_000_000_000);
        assert_eq!(d.to_string(), "0.750000000000000000");
        assert_eq!(".5".parse::<Dec>().unwrap().raw(), SCALE / 2);
        assert_eq!("1".parse::<Dec>().unwrap(), Dec::ONE);
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!("".parse::<Dec>(), Err(DecError::Empty));
        assert!(matches!("0.5.1".parse::<Dec>(), Err(DecError::Invalid(_))));
        assert!(matches!("-0.5".parse::<Dec>(), Err(DecError::Invalid(_))));
        assert!(matches!("0.0000000000000000001".parse::<Dec>(), Err(DecError::TooPrecise(_))));
    }

    #[test]
    fn test_threshold_boundary_is_strict() {
        let threshold: Dec = "0.75".parse().unwrap();
        assert!(!threshold.is_exceeded_by(75, 100));
        assert!(threshold.is_exceeded_by(76, 100));
        assert!(!threshold.is_exceeded_by(3, 4));
        // one unit of power above exactly three quarters
        assert!(threshold.is_exceeded_by(750_000_000_001, 1_000_000_000_000));
        assert!(!threshold.is_exceeded_by(0, 0));
    }

    #[test]
    fn test_json_is_string() {
        let d: Dec = "0.5".parse().unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"0.500000000000000000\"");
        assert_eq!(serde_json::from_str::<Dec>(&json).unwrap(), d);
    }

    proptest! {
        #[test]
        fn prop_exceeded_agrees_with_truncated_ratio(part in 0u64..1_000_000, extra in 1u64..1_000_000, t in 1u128..1_000_000) {
            let total = part + extra;
            let threshold = Dec::from_raw(t * 1_000_000_000_000);
            let ratio = Dec::ratio(part, total).unwrap();
            if ratio > threshold {
                prop_assert!(threshold.is_exceeded_by(part, total));
            }
            if threshold.is_exceeded_by(part, total) {
                prop_assert!(ratio >= threshold);
            }
        }
    }
}
