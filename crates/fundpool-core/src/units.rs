//! Fixed-point native currency amounts.
//!
//! Amounts are held in base units with [`NATIVE_DECIMALS`] fractional digits, the
//! representation the ledger contract expects. Human-entered decimal text is parsed
//! exactly, with no floating point step in between.

use crate::error::FundPoolError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Fractional digits of the ledger's native currency.
pub const NATIVE_DECIMALS: u32 = 18;

const UNIT: u128 = 10u128.pow(NATIVE_DECIMALS);

/// Native currency amount in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativeAmount(u128);

impl NativeAmount {
    pub const ZERO: Self = Self(0);

    pub fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    /// Whole native units, e.g. `from_units(5)` is 5 ETH.
    pub fn from_units(units: u64) -> Self {
        Self(units as u128 * UNIT)
    }

    pub fn base_units(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse decimal text such as `"1.5"` or `".25"` into base units.
    ///
    /// Signs, exponents, and more than [`NATIVE_DECIMALS`] fractional digits are rejected.
    pub fn parse(input: &str) -> Result<Self, FundPoolError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(FundPoolError::InvalidAmount("amount is empty".to_string()));
        }

        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(FundPoolError::InvalidAmount(format!(
                "'{text}' has no digits"
            )));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(FundPoolError::InvalidAmount(format!(
                "'{text}' is not a plain decimal number"
            )));
        }
        if fraction.len() > NATIVE_DECIMALS as usize {
            return Err(FundPoolError::InvalidAmount(format!(
                "'{text}' has more than {NATIVE_DECIMALS} decimal places"
            )));
        }

        let overflow = || FundPoolError::InvalidAmount(format!("'{text}' is too large"));
        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| overflow())?
        };
        let fraction_units = if fraction.is_empty() {
            0
        } else {
            format!("{:0<width$}", fraction, width = NATIVE_DECIMALS as usize)
                .parse::<u128>()
                .map_err(|_| overflow())?
        };

        whole_units
            .checked_mul(UNIT)
            .and_then(|units| units.checked_add(fraction_units))
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Render with exactly `decimals` fractional digits, rounding half up.
    pub fn to_fixed(self, decimals: u32) -> String {
        let decimals = decimals.min(NATIVE_DECIMALS);
        let scale = 10u128.pow(NATIVE_DECIMALS - decimals);
        let rounded = self.0 / scale + u128::from((self.0 % scale) * 2 >= scale && scale > 1);

        if decimals == 0 {
            return rounded.to_string();
        }
        let precision = 10u128.pow(decimals);
        format!(
            "{}.{:0width$}",
            rounded / precision,
            rounded % precision,
            width = decimals as usize
        )
    }

    /// `percent`% of this amount, truncated to base units.
    pub fn percent(self, percent: u8) -> Self {
        let percent = u128::from(percent);
        Self((self.0 / 100) * percent + (self.0 % 100) * percent / 100)
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fraction = format!(
            "{:0width$}",
            self.0 % UNIT,
            width = NATIVE_DECIMALS as usize
        );
        let fraction = fraction.trim_end_matches('0');
        let fraction = if fraction.is_empty() { "0" } else { fraction };
        write!(f, "{}.{}", self.0 / UNIT, fraction)
    }
}

impl Serialize for NativeAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NativeAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
