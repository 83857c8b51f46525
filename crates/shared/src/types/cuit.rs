//! CUIT, the Argentine tax identifier.
//!
//! Eleven digits: a two-digit type prefix, an eight-digit body and a
//! modulo-11 check digit. Accepted with or without dashes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

/// Errors parsing a CUIT.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CuitError {
    /// Not eleven digits once separators are removed.
    #[error("CUIT must have 11 digits, got '{0}'")]
    InvalidLength(String),
    /// Contains something other than digits, dashes or spaces.
    #[error("CUIT contains invalid characters: '{0}'")]
    InvalidCharacters(String),
    /// The check digit does not match.
    #[error("CUIT check digit mismatch: '{0}'")]
    InvalidCheckDigit(String),
}

/// A validated tax identifier, stored as its 11 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cuit(String);

impl Cuit {
    /// Parses and validates a CUIT such as `20-11111111-2` or `20111111112`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is malformed or the check digit is wrong.
    pub fn parse(raw: &str) -> Result<Self, CuitError> {
        let digits: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | ' ' | '.'))
            .collect();

        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CuitError::InvalidCharacters(raw.to_string()));
        }
        if digits.len() != 11 {
            return Err(CuitError::InvalidLength(raw.to_string()));
        }

        let values: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();
        let sum: u32 = values
            .iter()
            .zip(WEIGHTS.iter())
            .map(|(d, w)| d * w)
            .sum();
        let expected = match 11 - (sum % 11) {
            11 => 0,
            10 => return Err(CuitError::InvalidCheckDigit(raw.to_string())),
            n => n,
        };
        if values[10] != expected {
            return Err(CuitError::InvalidCheckDigit(raw.to_string()));
        }

        Ok(Self(digits))
    }

    /// The 11 digits without separators, as sent to the authority.
    #[must_use]
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// The CUIT as a number, as some authority fields require.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0.parse().unwrap_or_default()
    }
}

impl std::fmt::Display for Cuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", &self.0[..2], &self.0[2..10], &self.0[10..])
    }
}

impl std::str::FromStr for Cuit {
    type Err = CuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cuit {
    type Error = CuitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cuit> for String {
    fn from(value: Cuit) -> Self {
        value.0
    }
}
