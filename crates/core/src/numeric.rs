//! Decimal numeric model.
//!
//! Every quantity, factor, price and total in the engine is a
//! `rust_decimal::Decimal`. There is no `f64` on any path that feeds a hash
//! or a regulatory total. Arithmetic is checked: overflow is reported as a
//! `NumericError`, never wrapped and never panicked.
//!
//! The canonical text form of a decimal is its normalized representation
//! (`1.50` and `1.5` render identically), so that two logically equal values
//! always hash to the same bytes.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors raised by checked decimal arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumericError {
    #[error("numeric overflow in {operation}: {left} and {right}")]
    Overflow {
        operation: &'static str,
        left: String,
        right: String,
    },
}

fn overflow(operation: &'static str, left: Decimal, right: Decimal) -> NumericError {
    NumericError::Overflow {
        operation,
        left: canonical_string(left),
        right: canonical_string(right),
    }
}

/// Checked addition.
pub fn add(left: Decimal, right: Decimal) -> Result<Decimal, NumericError> {
    left.checked_add(right)
        .ok_or_else(|| overflow("addition", left, right))
}

/// Checked subtraction.
pub fn sub(left: Decimal, right: Decimal) -> Result<Decimal, NumericError> {
    left.checked_sub(right)
        .ok_or_else(|| overflow("subtraction", left, right))
}

/// Checked multiplication.
pub fn mul(left: Decimal, right: Decimal) -> Result<Decimal, NumericError> {
    left.checked_mul(right)
        .ok_or_else(|| overflow("multiplication", left, right))
}

/// Checked multiplication of every factor, left to right.
pub fn product(factors: &[Decimal]) -> Result<Decimal, NumericError> {
    factors.iter().try_fold(Decimal::ONE, |acc, f| mul(acc, *f))
}

/// Checked sum, accumulated in iteration order.
///
/// Callers are responsible for presenting the terms in a fixed order.
pub fn sum<I>(terms: I) -> Result<Decimal, NumericError>
where
    I: IntoIterator<Item = Decimal>,
{
    terms.into_iter().try_fold(Decimal::ZERO, add)
}

/// Division that never produces NaN, infinity or a silent zero.
///
/// A zero denominator yields `Quotient::Undefined`.
pub fn ratio(numerator: Decimal, denominator: Decimal) -> Result<Quotient, NumericError> {
    if denominator.is_zero() {
        return Ok(Quotient::Undefined);
    }
    numerator
        .checked_div(denominator)
        .map(Quotient::Value)
        .ok_or_else(|| overflow("division", numerator, denominator))
}

/// Render a decimal in canonical form: normalized, no exponent, no
/// trailing zeros, no negative zero.
pub fn canonical_string(value: Decimal) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    value.normalize().to_string()
}

/// Parse a decimal from its textual form, accepting scientific notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

// ──────────────────────────────────────────────
// Quotient
// ──────────────────────────────────────────────

/// Result of a division whose denominator may be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quotient {
    Value(Decimal),
    /// The denominator was zero; the ratio has no value.
    Undefined,
}

impl Quotient {
    pub const UNDEFINED_TOKEN: &'static str = "undefined";

    pub fn value(self) -> Option<Decimal> {
        match self {
            Quotient::Value(v) => Some(v),
            Quotient::Undefined => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, Quotient::Undefined)
    }
}

impl fmt::Display for Quotient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quotient::Value(v) => write!(f, "{}", canonical_string(*v)),
            Quotient::Undefined => write!(f, "{}", Self::UNDEFINED_TOKEN),
        }
    }
}

impl Serialize for Quotient {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quotient {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text == Self::UNDEFINED_TOKEN {
            return Ok(Quotient::Undefined);
        }
        parse_decimal(&text)
            .map(Quotient::Value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid quotient '{}'", text)))
    }
}

// ──────────────────────────────────────────────
// Serde adapters
// ──────────────────────────────────────────────

/// `#[serde(with = "canonical_decimal")]` for `Decimal` fields.
pub mod canonical_decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&canonical_string(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer)
    }
}

/// `#[serde(with = "canonical_decimal_opt")]` for `Option<Decimal>` fields.
pub mod canonical_decimal_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&canonical_string(*v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Decimal>, D::Error> {
        Option::<Decimal>::deserialize(deserializer)
    }
}
