//! Fixed-point dollar amounts.
//!
//! Tax-form dollar values never go through floating point: a `Money` is a
//! signed count of cents. Parsing accepts the formats that show up on printed
//! forms and in model output: `1234.56`, `$1,234.56`, `(1,234.56)` for
//! negative amounts. Rendering is always a plain two-decimal string, which is
//! also the serialized form (JSON exports carry money as strings).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Accepted shapes: optional parens (negative), optional `$`, digits with
/// either well-formed thousands groups or none, up to two decimal places.
static MONEY_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?-?\$?\s?(\d{1,3}(,\d{3})+|\d+)(\.\d{1,2})?\)?$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyParseError {
    #[error("not a dollar amount: {0:?}")]
    Malformed(String),

    #[error("amount out of range: {0:?}")]
    OutOfRange(String),
}

/// A dollar amount in cents. Copy, ordered, exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Parse a printed or model-reported dollar string.
    ///
    /// Parentheses mean negative (accounting convention on brokerage
    /// statements). More than two decimal digits is rejected rather than
    /// rounded; a truncated value would silently disagree with the source
    /// document.
    pub fn parse(raw: &str) -> Result<Self, MoneyParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !MONEY_SHAPE.is_match(trimmed) {
            return Err(MoneyParseError::Malformed(raw.to_string()));
        }

        let parenthesized = trimmed.starts_with('(');
        if parenthesized != trimmed.ends_with(')') {
            return Err(MoneyParseError::Malformed(raw.to_string()));
        }

        let mut digits: String = trimmed
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | '$' | ',' | ' '))
            .collect();

        let negative = parenthesized || digits.starts_with('-');
        if digits.starts_with('-') {
            digits.remove(0);
        }

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits.as_str(), ""),
        };

        let whole: i64 = whole
            .parse()
            .map_err(|_| MoneyParseError::OutOfRange(raw.to_string()))?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| MoneyParseError::Malformed(raw.to_string()))? * 10,
            2 => frac.parse().map_err(|_| MoneyParseError::Malformed(raw.to_string()))?,
            _ => return Err(MoneyParseError::Malformed(raw.to_string())),
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(|| MoneyParseError::OutOfRange(raw.to_string()))?;

        Ok(Self {
            cents: if negative { -cents } else { cents },
        })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Money::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_amount() {
        assert_eq!(Money::parse("1234.56").unwrap().cents(), 123_456);
    }

    #[test]
    fn parses_currency_symbol_and_commas() {
        assert_eq!(Money::parse("$1,234.56").unwrap().cents(), 123_456);
        assert_eq!(Money::parse("$12,345,678.90").unwrap().cents(), 1_234_567_890);
    }

    #[test]
    fn parses_parenthesized_negative() {
        assert_eq!(Money::parse("(1,234.56)").unwrap().cents(), -123_456);
        assert_eq!(Money::parse("-45.00").unwrap().cents(), -4_500);
    }

    #[test]
    fn parses_whole_dollars_and_single_decimal() {
        assert_eq!(Money::parse("500").unwrap().cents(), 50_000);
        assert_eq!(Money::parse("500.5").unwrap().cents(), 50_050);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Money::parse("").is_err());
        assert!(Money::parse("N/A").is_err());
        assert!(Money::parse("12.345").is_err());
        assert!(Money::parse("1,23.45").is_err());
        assert!(Money::parse("(12.00").is_err());
    }

    #[test]
    fn renders_two_decimals() {
        assert_eq!(Money::from_cents(123_456).to_string(), "1234.56");
        assert_eq!(Money::from_cents(50).to_string(), "0.50");
        assert_eq!(Money::from_cents(-4_500).to_string(), "-45.00");
    }

    #[test]
    fn round_trips_through_display() {
        for raw in ["1234.56", "0.01", "-99.90", "1000000.00"] {
            let m = Money::parse(raw).unwrap();
            assert_eq!(Money::parse(&m.to_string()).unwrap(), m);
        }
    }

    #[test]
    fn serializes_as_string() {
        let m = Money::parse("1,234.56").unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"1234.56\"");
        let back: Money = serde_json::from_str("\"1234.56\"").unwrap();
        assert_eq!(back, m);
    }
}
