use super::{error::NumError, params::MAX_DECIMAL_WIDTH};
use bigdecimal::{
  num_bigint::{BigInt, Sign},
  BigDecimal, ToPrimitive, Zero,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{
  fmt::{Display, Formatter},
  str::FromStr,
};

/// Fixed-point token amount with at most 18 fractional digits.
#[derive(PartialEq, PartialOrd, Debug, Clone, Default)]
pub struct Num(BigDecimal);

impl Num {
  pub fn zero() -> Self {
    Self(BigDecimal::zero())
  }

  /// Parses an amount literal, rejecting signs, exponents, whitespace,
  /// empty integer or fractional parts, and more than `max_scale`
  /// fractional digits.
  pub fn parse(s: &str, max_scale: u8) -> Result<Self, NumError> {
    let (integer, fraction) = match s.split_once('.') {
      Some((integer, fraction)) => (integer, Some(fraction)),
      None => (s, None),
    };

    if integer.is_empty() || !integer.bytes().all(|b| b.is_ascii_digit()) {
      return Err(NumError::InvalidNum(s.to_string()));
    }

    if let Some(fraction) = fraction {
      if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NumError::InvalidNum(s.to_string()));
      }
      if fraction.len() > usize::from(max_scale) {
        return Err(NumError::PrecisionOverflow {
          num: s.to_string(),
          max: max_scale,
        });
      }
    }

    BigDecimal::from_str(s)
      .map(Self)
      .map_err(|_| NumError::InvalidNum(s.to_string()))
  }

  /// Parses an integer literal such as `dec`; any dot rejects.
  pub fn parse_integer(s: &str) -> Result<Self, NumError> {
    if s.contains('.') {
      return Err(NumError::InvalidInteger(s.to_string()));
    }
    Self::parse(s, 0)
  }

  pub fn checked_add(&self, other: &Num) -> Result<Self, NumError> {
    Ok(Self(&self.0 + &other.0))
  }

  pub fn checked_sub(&self, other: &Num) -> Result<Self, NumError> {
    if self.0 < other.0 {
      return Err(NumError::Overflow {
        op: String::from("checked_sub"),
        org: self.clone(),
        other: other.clone(),
      });
    }

    Ok(Self(&self.0 - &other.0))
  }

  pub fn checked_to_u8(&self) -> Result<u8, NumError> {
    if !self.0.is_integer() {
      return Err(NumError::InvalidInteger(self.to_string()));
    }
    self.0.to_u8().ok_or(NumError::Overflow {
      op: String::from("to_u8"),
      org: self.clone(),
      other: Self::from(u64::from(u8::MAX)),
    })
  }

  pub fn sign(&self) -> Sign {
    self.0.sign()
  }

  pub fn is_zero(&self) -> bool {
    self.0.is_zero()
  }

  pub fn is_positive(&self) -> bool {
    self.sign() == Sign::Plus
  }

  /// Number of fractional digits as written.
  pub fn scale(&self) -> i64 {
    let (_, scale) = self.0.as_bigint_and_exponent();
    scale
  }

  /// Reads back an amount written with `Display`, without the precision
  /// rules applied to user input.
  pub fn from_stored(s: &str) -> Result<Self, NumError> {
    BigDecimal::from_str(s)
      .map(Self)
      .map_err(|_| NumError::InvalidNum(s.to_string()))
  }

  /// Builds an integer amount from its decimal digits, e.g. a `uint256`
  /// log field.
  pub fn from_integer_digits(digits: &str) -> Result<Self, NumError> {
    BigInt::parse_bytes(digits.as_bytes(), 10)
      .map(|n| Self(BigDecimal::from(n)))
      .ok_or_else(|| NumError::InvalidNum(digits.to_string()))
  }
}

impl From<u64> for Num {
  fn from(n: u64) -> Self {
    Self(BigDecimal::from(n))
  }
}

impl FromStr for Num {
  type Err = NumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s, MAX_DECIMAL_WIDTH)
  }
}

impl Display for Num {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

impl Serialize for Num {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&self.to_string())
  }
}

impl<'de> Deserialize<'de> for Num {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let s = String::deserialize(deserializer)?;
    Self::from_stored(&s).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_num_from_str() {
    assert_eq!(
      Num(BigDecimal::new(BigInt::from(1), 0)),
      Num::from_str("001").unwrap()
    );
    assert_eq!(
      Num(BigDecimal::new(BigInt::from(1), 1)),
      Num::from_str("00.1").unwrap()
    );
    assert_eq!(
      Num(BigDecimal::new(BigInt::from(0), 0)),
      Num::from_str("0.0").unwrap()
    );
    assert_eq!(
      Num(BigDecimal::new(BigInt::from(1), 1)),
      Num::from_str("0.100").unwrap()
    );
    assert_eq!(
      Num(BigDecimal::new(BigInt::from(101), 2)),
      Num::from_str("1.01").unwrap()
    );
    assert_eq!(
      Num(BigDecimal::new(BigInt::from(1_000_000_000_000_000_001u64), 18)),
      Num::from_str("1.000000000000000001").unwrap()
    );
  }

  #[test]
  fn test_invalid_num() {
    assert!(Num::from_str("").is_err());
    assert!(Num::from_str(" ").is_err());
    assert!(Num::from_str(".").is_err());
    assert!(Num::from_str(".5").is_err());
    assert!(Num::from_str("5.").is_err());
    assert!(Num::from_str(" 123.456").is_err());
    assert!(Num::from_str("456 ").is_err());
    assert!(Num::from_str("45 6").is_err());
    assert!(Num::from_str("123.-456").is_err());
    assert!(Num::from_str("123.+456").is_err());
    assert!(Num::from_str("+123.456").is_err());
    assert!(Num::from_str("-1.1").is_err());
    assert!(Num::from_str("123.456.789").is_err());
    assert!(Num::from_str("1e2").is_err());
    assert!(Num::from_str("100E2").is_err());
    assert!(Num::from_str("1.0000000000000000001").is_err());
  }

  #[test]
  fn test_precision_bound() {
    assert!(Num::parse("1.23", 2).is_ok());
    assert_eq!(
      Num::parse("1.234", 2).unwrap_err(),
      NumError::PrecisionOverflow {
        num: "1.234".to_string(),
        max: 2,
      }
    );
    assert!(Num::parse("1.0", 0).is_err());
    assert_eq!(Num::parse("1.230", 3).unwrap().scale(), 3);
  }

  #[test]
  fn test_parse_integer() {
    assert_eq!(Num::parse_integer("018").unwrap().checked_to_u8().unwrap(), 18);
    assert!(Num::parse_integer("1.0").is_err());
    assert!(Num::parse_integer("-1").is_err());
    assert!(Num::parse_integer("256").unwrap().checked_to_u8().is_err());
  }

  #[test]
  fn test_num_serde() {
    let num = Num::from_str("1.01").unwrap();
    assert_eq!(serde_json::to_string(&num).unwrap(), "\"1.01\"");
    assert_eq!(serde_json::from_str::<Num>("\"1.01\"").unwrap(), num);
  }

  #[test]
  fn test_num_checked_sub() {
    assert_eq!(
      Num::from_str("2.222"),
      Num::from_str("3.303")
        .unwrap()
        .checked_sub(&Num::from_str("1.081").unwrap())
    );
    assert!(Num::from_str("1")
      .unwrap()
      .checked_sub(&Num::from_str("1.5").unwrap())
      .is_err());
  }

  #[test]
  fn test_from_integer_digits() {
    assert_eq!(
      Num::from_integer_digits("500").unwrap(),
      Num::from_str("500").unwrap()
    );
    assert!(Num::from_integer_digits("5x").is_err());
  }
}
