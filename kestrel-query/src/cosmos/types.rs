//! Cosmos SDK value types shared by several extensions.

use kestrel_core::QueryError;
use serde::{Deserialize, Serialize};

/// An amount of one denomination, as the SDK encodes it: the amount is a
/// base-10 integer string so it can exceed 64 bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }

    /// Zero of `denom`.
    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, 0)
    }

    /// The amount as an integer; 0 if it does not parse.
    ///
    /// Coins coming out of a fetcher were already checked by [`Coin::validate`],
    /// so the fallback only applies to hand-built values.
    pub fn amount_u128(&self) -> u128 {
        self.amount.parse().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_u128() == 0
    }

    /// Reject coins whose amount is not a base-10 integer.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.denom.is_empty() {
            return Err(QueryError::decode("coin with empty denom"));
        }
        self.amount.parse::<u128>().map_err(|e| {
            QueryError::decode(format!(
                "invalid amount {:?} for {}: {}",
                self.amount, self.denom, e
            ))
        })?;
        Ok(())
    }
}

impl std::fmt::Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Parse an SDK decimal string ("1000.000000000000000000") to its integer
/// part, truncating.
pub(crate) fn parse_dec_truncated(raw: &str) -> Result<u128, QueryError> {
    let integer = raw.split('.').next().unwrap_or_default();
    let integer = if integer.is_empty() { "0" } else { integer };
    integer
        .parse()
        .map_err(|e| QueryError::decode(format!("invalid decimal {:?}: {}", raw, e)))
}
