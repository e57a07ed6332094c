//! Money types with fixed-point minor-unit arithmetic
//!
//! Agora never represents money as floating point. An [`Amount`] is a scaled
//! integer in the currency's minor unit (cents), and arithmetic is defined
//! only within a single currency.

use crate::error::{MarketError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Currencies accepted by the marketplace (ISO 4217)
///
/// This is a closed set. Unknown currency codes are rejected upstream; the
/// gateway boundary has its own lenient decoding (see `agora-gateway`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
}

impl Currency {
    /// Get the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }

    /// Get the lowercase code used on the gateway wire
    pub fn wire_code(&self) -> &'static str {
        match self {
            Self::USD => "usd",
            Self::EUR => "eur",
            Self::GBP => "gbp",
        }
    }

    /// Minor-unit places for this currency (all supported currencies use 2)
    pub fn decimals(&self) -> u8 {
        2
    }

    /// Parse a currency code, rejecting anything outside the closed set
    pub fn parse_code(code: &str) -> Result<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            _ => Err(MarketError::UnknownCurrency {
                code: code.to_string(),
            }),
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::USD
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A monetary amount in minor units (cents) of a single currency
///
/// Supports negative values so ledger-style debit/credit math stays closed
/// under subtraction, but every marketplace entry point validates positivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Value in minor units (e.g. cents)
    pub minor: i64,
    /// The currency
    pub currency: Currency,
}

impl Amount {
    /// Create an amount from minor units
    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Create a zero amount
    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Convenience constructor for USD cents
    pub fn usd(minor: i64) -> Self {
        Self::new(minor, Currency::USD)
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    fn require_same_currency(&self, other: &Self) -> Result<()> {
        if self.currency != other.currency {
            return Err(MarketError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                actual: other.currency.code().to_string(),
            });
        }
        Ok(())
    }

    /// Checked addition (currencies must match)
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(MarketError::AmountOverflow)?;
        Ok(Self {
            minor,
            currency: self.currency,
        })
    }

    /// Checked subtraction (currencies must match)
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let minor = self
            .minor
            .checked_sub(other.minor)
            .ok_or(MarketError::AmountOverflow)?;
        Ok(Self {
            minor,
            currency: self.currency,
        })
    }

    /// Checked multiplication by an integer quantity
    pub fn checked_mul(self, quantity: u64) -> Result<Self> {
        let minor = i64::try_from(self.minor as i128 * quantity as i128)
            .map_err(|_| MarketError::AmountOverflow)?;
        Ok(Self {
            minor,
            currency: self.currency,
        })
    }

    /// Split this amount into a fee (in basis points, half-up rounded) and
    /// the exact remainder
    ///
    /// The two parts always sum back to the original amount, so splitting is
    /// conservation-safe by construction.
    pub fn split_fee(self, bps: u32) -> Result<(Self, Self)> {
        if self.is_negative() {
            return Err(MarketError::validation("amount", "cannot split a negative amount"));
        }
        if bps > 10_000 {
            return Err(MarketError::validation("bps", "fee cannot exceed 10000 basis points"));
        }
        // Half-up rounding on the fee side
        let scaled = self.minor as i128 * bps as i128;
        let fee_minor =
            i64::try_from((scaled + 5_000) / 10_000).map_err(|_| MarketError::AmountOverflow)?;
        let fee = Self::new(fee_minor, self.currency);
        let remainder = self.checked_sub(fee)?;
        Ok((fee, remainder))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        write!(f, "{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.minor.partial_cmp(&other.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_arithmetic() {
        let a = Amount::usd(10_000);
        let b = Amount::usd(5_000);

        assert_eq!(a.checked_add(b).unwrap(), Amount::usd(15_000));
        assert_eq!(a.checked_sub(b).unwrap(), Amount::usd(5_000));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Amount::usd(100);
        let eur = Amount::new(100, Currency::EUR);

        assert!(matches!(
            usd.checked_add(eur),
            Err(MarketError::CurrencyMismatch { .. })
        ));
        assert!(usd.partial_cmp(&eur).is_none());
    }

    #[test]
    fn test_overflow_is_checked() {
        let a = Amount::usd(i64::MAX);
        assert!(matches!(
            a.checked_add(Amount::usd(1)),
            Err(MarketError::AmountOverflow)
        ));
        assert!(a.checked_mul(2).is_err());
    }

    #[test]
    fn test_comparison() {
        let a = Amount::usd(10_000);
        let b = Amount::usd(5_000);
        assert!(a > b);
        assert!(b < a);
        assert!(a >= Amount::usd(10_000));
    }

    #[test]
    fn test_quantity_multiplication() {
        let price = Amount::usd(2_50);
        assert_eq!(price.checked_mul(4).unwrap(), Amount::usd(10_00));
    }

    #[test]
    fn test_fee_split_conserves_total() {
        // 2.5% of $99.99 = 249.975 cents, half-up to 250
        let amount = Amount::usd(9_999);
        let (fee, remainder) = amount.split_fee(250).unwrap();
        assert_eq!(fee, Amount::usd(250));
        assert_eq!(remainder, Amount::usd(9_749));
        assert_eq!(fee.checked_add(remainder).unwrap(), amount);
    }

    #[test]
    fn test_fee_rounding_half_up() {
        // 1 bps of 50 cents = 0.005 cents -> rounds to 0
        let (fee, _) = Amount::usd(50).split_fee(1).unwrap();
        assert_eq!(fee.minor, 0);

        // 10% of 5 cents = 0.5 cents -> half-up to 1
        let (fee, remainder) = Amount::usd(5).split_fee(1_000).unwrap();
        assert_eq!(fee.minor, 1);
        assert_eq!(remainder.minor, 4);
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(Currency::parse_code("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::parse_code("GBP").unwrap(), Currency::GBP);
        assert!(matches!(
            Currency::parse_code("JPY"),
            Err(MarketError::UnknownCurrency { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(Amount::usd(10_050).to_string(), "100.50 USD");
        assert_eq!(Amount::new(-5, Currency::EUR).to_string(), "-0.05 EUR");
    }
}
