use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// A strictly positive quantity in the smallest currency unit.
///
/// Amounts travel as decimal-digit strings so that no client ever has to
/// round-trip them through a float.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Amount(u128);

#[derive(Debug, Error, PartialEq, Clone)]
pub enum AmountParseError {
    #[error("Amount must be a positive integer.")]
    NotAPositiveInteger,
    #[error("Amount is too large.")]
    TooLarge,
}

impl Amount {
    pub fn new(value: u128) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn value(&self) -> u128 {
        self.0
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::NotAPositiveInteger);
        }
        let value = trimmed
            .parse::<u128>()
            .map_err(|_| AmountParseError::TooLarge)?;
        Amount::new(value).ok_or(AmountParseError::NotAPositiveInteger)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An amount as submitted by a client, before validation.
#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(untagged)]
pub enum RawAmount {
    Digits(String),
    Number(serde_json::Number),
}

impl TryFrom<&RawAmount> for Amount {
    type Error = AmountParseError;

    fn try_from(raw: &RawAmount) -> Result<Self, Self::Error> {
        match raw {
            RawAmount::Digits(digits) => digits.parse(),
            RawAmount::Number(number) => match number.as_u64() {
                Some(value) => {
                    Amount::new(u128::from(value)).ok_or(AmountParseError::NotAPositiveInteger)
                }
                None => Err(AmountParseError::NotAPositiveInteger),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Amount, AmountParseError, RawAmount};

    #[rstest]
    #[case("1",     1)]
    #[case("500",   500)]
    #[case(" 42 ",  42)]
    #[case("007",   7)]
    #[case("340282366920938463463374607431768211455", u128::MAX)]
    fn parsing_digit_strings_works(#[case] input: &str, #[case] expected: u128) {
        assert_eq!(input.parse::<Amount>().unwrap().value(), expected);
    }

    #[rstest]
    #[case("",      AmountParseError::NotAPositiveInteger)]
    #[case("0",     AmountParseError::NotAPositiveInteger)]
    #[case("000",   AmountParseError::NotAPositiveInteger)]
    #[case("12.5",  AmountParseError::NotAPositiveInteger)]
    #[case("-5",    AmountParseError::NotAPositiveInteger)]
    #[case("+5",    AmountParseError::NotAPositiveInteger)]
    #[case("abc",   AmountParseError::NotAPositiveInteger)]
    #[case("1e3",   AmountParseError::NotAPositiveInteger)]
    #[case("340282366920938463463374607431768211456", AmountParseError::TooLarge)]
    fn parsing_invalid_strings_fails(#[case] input: &str, #[case] expected: AmountParseError) {
        assert_eq!(input.parse::<Amount>(), Err(expected));
    }

    #[rstest]
    #[case(r#""500""#, Ok(500))]
    #[case("500",      Ok(500))]
    #[case("12.5",     Err(AmountParseError::NotAPositiveInteger))]
    #[case("-5",       Err(AmountParseError::NotAPositiveInteger))]
    #[case("0",        Err(AmountParseError::NotAPositiveInteger))]
    #[case(r#""abc""#, Err(AmountParseError::NotAPositiveInteger))]
    fn raw_json_amounts_are_validated(
        #[case] json: &str,
        #[case] expected: Result<u128, AmountParseError>,
    ) {
        let raw: RawAmount = serde_json::from_str(json).unwrap();
        assert_eq!(Amount::try_from(&raw).map(|amount| amount.value()), expected);
    }

    #[test]
    fn amounts_are_serialized_as_strings() {
        let amount = Amount::new(1_000).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), r#""1000""#);
    }
}
