use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const USDT_CURRENCY_CODE: &str = "USDT";
pub const USDT_CURRENCY_CODE_LOWER: &str = "usdt";

/// Number of micro-units ("sun") in one USDT.
pub const MICRO_PER_USDT: i64 = 1_000_000;

//--------------------------------------     MicroUsdt       ---------------------------------------------------------
/// An amount of money in integer micro-units. One USDT is 10^6 micro-units (TRC20 "sun").
///
/// Fiat amounts use the same scale, so 0.01 in fiat is 10_000 micro-units. Keeping every
/// ledger figure in one integer type means balance arithmetic never touches floating point.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MicroUsdt(i64);

op!(binary MicroUsdt, Add, add);
op!(binary MicroUsdt, Sub, sub);
op!(inplace MicroUsdt, AddAssign, add_assign);
op!(inplace MicroUsdt, SubAssign, sub_assign);
op!(unary MicroUsdt, Neg, neg);

impl Mul<i64> for MicroUsdt {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MicroUsdt {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in micro-USDT: {0}")]
pub struct MicroUsdtConversionError(pub String);

impl From<i64> for MicroUsdt {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MicroUsdt {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MicroUsdt {}

impl TryFrom<u64> for MicroUsdt {
    type Error = MicroUsdtConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MicroUsdtConversionError(format!("Value {value} is too large to convert to MicroUsdt")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MicroUsdt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / MICRO_PER_USDT).unsigned_abs();
        let frac = (self.0 % MICRO_PER_USDT).unsigned_abs();
        if frac == 0 {
            write!(f, "{sign}{whole}.00")
        } else {
            let frac = format!("{frac:06}");
            write!(f, "{sign}{whole}.{}", frac.trim_end_matches('0'))
        }
    }
}

impl MicroUsdt {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// The amount as a whole number of USDT. Multiplies out, so only use for values
    /// known to fit.
    pub fn from_usdt(usdt: i64) -> Self {
        Self(usdt * MICRO_PER_USDT)
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Parses a decimal string such as `"10.0342"` exactly, without going through `f64`.
    /// At most 6 fractional digits are accepted.
    pub fn from_decimal_str(s: &str) -> Result<Self, MicroUsdtConversionError> {
        let s = s.trim();
        let (sign, s) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(MicroUsdtConversionError(s.to_string()));
        }
        if frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(MicroUsdtConversionError(s.to_string()));
        }
        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| MicroUsdtConversionError(s.to_string()))?
        };
        let mut frac_units: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| MicroUsdtConversionError(s.to_string()))?
        };
        frac_units *= 10i64.pow(6 - frac.len() as u32);
        whole
            .checked_mul(MICRO_PER_USDT)
            .and_then(|w| w.checked_add(frac_units))
            .and_then(|v| v.checked_mul(sign))
            .map(Self)
            .ok_or_else(|| MicroUsdtConversionError(s.to_string()))
    }
}

impl FromStr for MicroUsdt {
    type Err = MicroUsdtConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal_str(s)
    }
}
