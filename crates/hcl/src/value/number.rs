//! Arbitrary-precision numbers
//!
//! Numbers are exact rationals, so decimal literals such as `0.1` round-trip
//! without binary floating point error.

use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{FromPrimitive, One, Signed, ToPrimitive, Zero};

/// Exponents beyond this magnitude are rejected when parsing.
const MAX_EXPONENT: i64 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Number(BigRational);

impl Number {
    pub fn zero() -> Self {
        Number(BigRational::zero())
    }

    pub fn from_f64(f: f64) -> Option<Self> {
        BigRational::from_f64(f).map(Number)
    }

    /// Parse decimal notation: optional sign, digits with an optional
    /// fractional part, and an optional exponent.
    pub fn parse(s: &str) -> Option<Self> {
        let (negative, rest) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (mantissa, exponent) = match rest.find(['e', 'E']) {
            Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
            None => (rest, None),
        };
        let (int_part, frac_part) = match mantissa.find('.') {
            Some(idx) => (&mantissa[..idx], &mantissa[idx + 1..]),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut exp: i64 = match exponent {
            Some(e) => {
                let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let parsed: i64 = e.parse().ok()?;
                if parsed.abs() > MAX_EXPONENT {
                    return None;
                }
                parsed
            }
            None => 0,
        };
        exp -= frac_part.len() as i64;

        let digits = format!("{int_part}{frac_part}");
        let mut numer = BigInt::parse_bytes(digits.as_bytes(), 10)?;
        if negative {
            numer = -numer;
        }
        let ten = BigInt::from(10u8);
        let value = if exp >= 0 {
            BigRational::from_integer(numer * num_traits::pow(ten, exp as usize))
        } else {
            BigRational::new(numer, num_traits::pow(ten, (-exp) as usize))
        };
        Some(Number(value))
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.is_integer() {
            self.0.to_integer().to_i64()
        } else {
            None
        }
    }

    pub fn to_usize(&self) -> Option<usize> {
        if self.is_integer() {
            self.0.to_integer().to_usize()
        } else {
            None
        }
    }

    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    pub fn add(&self, other: &Number) -> Number {
        Number(&self.0 + &other.0)
    }

    pub fn sub(&self, other: &Number) -> Number {
        Number(&self.0 - &other.0)
    }

    pub fn mul(&self, other: &Number) -> Number {
        Number(&self.0 * &other.0)
    }

    /// `None` on division by zero.
    pub fn checked_div(&self, other: &Number) -> Option<Number> {
        if other.0.is_zero() {
            None
        } else {
            Some(Number(&self.0 / &other.0))
        }
    }

    /// Truncated remainder; the result takes the sign of the dividend.
    pub fn checked_rem(&self, other: &Number) -> Option<Number> {
        if other.0.is_zero() {
            None
        } else {
            Some(Number(&self.0 % &other.0))
        }
    }

    pub fn neg(&self) -> Number {
        Number(-&self.0)
    }

    pub fn abs(&self) -> Number {
        Number(self.0.abs())
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number(BigRational::from_integer(BigInt::from(n)))
    }
}

impl From<i32> for Number {
    fn from(n: i32) -> Self {
        Number::from(i64::from(n))
    }
}

impl From<usize> for Number {
    fn from(n: usize) -> Self {
        Number(BigRational::from_integer(BigInt::from(n)))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_integer() {
            return write!(f, "{}", self.0.to_integer());
        }
        match terminating_decimal(&self.0) {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}", self.to_f64()),
        }
    }
}

/// Exact decimal rendering when the denominator only has factors 2 and 5.
fn terminating_decimal(r: &BigRational) -> Option<String> {
    let mut denom = r.denom().clone();
    let two = BigInt::from(2u8);
    let five = BigInt::from(5u8);
    let (mut twos, mut fives) = (0usize, 0usize);
    while (&denom % &two).is_zero() {
        denom /= &two;
        twos += 1;
    }
    while (&denom % &five).is_zero() {
        denom /= &five;
        fives += 1;
    }
    if !denom.is_one() {
        return None;
    }
    let places = twos.max(fives);
    let scaled = (r * BigRational::from_integer(num_traits::pow(BigInt::from(10u8), places)))
        .to_integer();
    let negative = scaled.is_negative();
    let digits = scaled.abs().to_string();
    let digits = format!("{digits:0>width$}", width = places + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - places);
    let frac_part = frac_part.trim_end_matches('0');
    let sign = if negative { "-" } else { "" };
    Some(format!("{sign}{int_part}.{frac_part}"))
}
