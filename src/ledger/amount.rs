use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Decimal places of the stablecoin the marketplace settles in.
pub(crate) const TOKEN_DECIMALS: u32 = 18;

const ONE_TOKEN: u128 = 10u128.pow(TOKEN_DECIMALS);

/// Token amount in minor units (fixed point over [`TOKEN_DECIMALS`] places).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TokenAmount(u128);

impl TokenAmount {
    pub(crate) const ZERO: Self = Self(0);

    pub(crate) const fn minor_units(self) -> u128 {
        self.0
    }

    pub(crate) const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AmountParseError {
    Empty,
    Negative,
    InvalidDigit(char),
    TooManyDecimals(usize),
    Overflow,
}

impl fmt::Display for AmountParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "amount is empty"),
            Self::Negative => write!(f, "amount must not be negative"),
            Self::InvalidDigit(c) => write!(f, "unexpected character {c:?} in amount"),
            Self::TooManyDecimals(n) => write!(
                f,
                "amount has {n} decimal places, at most {TOKEN_DECIMALS} are supported"
            ),
            Self::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for AmountParseError {}

fn parse_digits(digits: &str) -> Result<u128, AmountParseError> {
    digits.chars().try_fold(0u128, |acc, c| {
        let digit = c.to_digit(10).ok_or(AmountParseError::InvalidDigit(c))?;
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(u128::from(digit)))
            .ok_or(AmountParseError::Overflow)
    })
}

impl FromStr for TokenAmount {
    type Err = AmountParseError;

    /// Parses a human amount such as `12.5` into minor units.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if s.starts_with('-') {
            return Err(AmountParseError::Negative);
        }

        let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountParseError::Empty);
        }
        if fraction.len() > TOKEN_DECIMALS as usize {
            return Err(AmountParseError::TooManyDecimals(fraction.len()));
        }

        let whole = parse_digits(whole)?;
        let padding = TOKEN_DECIMALS - u32::try_from(fraction.len()).unwrap_or(TOKEN_DECIMALS);
        let fraction = parse_digits(fraction)? * 10u128.pow(padding);

        whole
            .checked_mul(ONE_TOKEN)
            .and_then(|units| units.checked_add(fraction))
            .map(Self)
            .ok_or(AmountParseError::Overflow)
    }
}

impl fmt::Display for TokenAmount {
    /// Two decimal places, rounding half up.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const CENT: u128 = ONE_TOKEN / 100;

        let cents = self.0 / CENT + u128::from(self.0 % CENT >= CENT / 2);
        write!(f, "{}.{:02}", cents / 100, cents % 100)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.minor_units().to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MinorUnitsVisitor;

        impl de::Visitor<'_> for MinorUnitsVisitor {
            type Value = TokenAmount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a token amount in minor units as a string or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(TokenAmount(u128::from(v)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse::<u128>().map(TokenAmount).map_err(|_| {
                    E::invalid_value(de::Unexpected::Str(v), &"a decimal string of minor units")
                })
            }
        }

        deserializer.deserialize_any(MinorUnitsVisitor)
    }
}
