use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::str::FromStr;

/// Euro amount held in cents. Wire format is a two-decimal string (`"45.50"`);
/// JSON numbers are accepted on input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("not a decimal amount: {0}")]
    Invalid(String),
    #[error("more than 2 decimals")]
    TooManyDecimals,
    #[error("amount must be between 0 and 999999")]
    OutOfRange,
}

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX_CENTS: i64 = 999_999_00;

    pub fn from_cents(cents: i64) -> Result<Self, AmountError> {
        if !(0..=Self::MAX_CENTS).contains(&cents) {
            return Err(AmountError::OutOfRange);
        }
        Ok(Self(cents))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::Invalid(value.to_string()));
        }
        if !(0.0..=999_999.0).contains(&value) {
            return Err(AmountError::OutOfRange);
        }
        let scaled = value * 100.0;
        let cents = scaled.round();
        if (scaled - cents).abs() > 1e-6 {
            return Err(AmountError::TooManyDecimals);
        }
        Self::from_cents(cents as i64)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.starts_with('-') {
            return Err(AmountError::OutOfRange);
        }
        let (units, fraction) = match raw.split_once('.') {
            Some((u, f)) => (u, f),
            None => (raw, ""),
        };
        let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if units.is_empty() || !digits_only(units) || !digits_only(fraction) {
            return Err(AmountError::Invalid(s.to_string()));
        }
        if fraction.len() > 2 {
            return Err(AmountError::TooManyDecimals);
        }
        if units.len() > 6 {
            return Err(AmountError::OutOfRange);
        }

        let units: i64 = units.parse().map_err(|_| AmountError::Invalid(s.to_string()))?;
        let fraction_cents: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| AmountError::Invalid(s.to_string()))? * 10,
            _ => fraction.parse().map_err(|_| AmountError::Invalid(s.to_string()))?,
        };

        Self::from_cents(units * 100 + fraction_cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Add for Amount {
    type Output = Amount;

    // Totals may exceed the per-record ceiling.
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Loosely typed amount as received from clients, validated into [`Amount`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(f64),
}

impl AmountInput {
    pub fn parse(&self) -> Result<Amount, AmountError> {
        match self {
            AmountInput::Text(s) => s.parse(),
            AmountInput::Number(n) => Amount::from_f64(*n),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        AmountInput::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
