use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use thiserror::Error;

/// Scaled points per point.
pub const SCALE: i64 = 65536;

/// A fixed-point length in scaled points.
///
/// All layout arithmetic is done on integers so that the same document and
/// configuration always produce the same geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Abs(i64);

impl Abs {
    pub const ZERO: Abs = Abs(0);
    pub const MAX: Abs = Abs(i64::MAX / 4);

    pub const fn raw(raw: i64) -> Abs {
        Abs(raw)
    }

    pub const fn pt(points: i64) -> Abs {
        Abs(points * SCALE)
    }

    pub const fn to_raw(self) -> i64 {
        self.0
    }

    /// Scales by `numerator / denominator`, rounding half away from zero.
    pub fn scale(self, numerator: i64, denominator: i64) -> Abs {
        Abs(div_round(self.0 as i128 * numerator as i128, denominator as i128) as i64)
    }

    pub fn min(self, other: Abs) -> Abs {
        Abs(self.0.min(other.0))
    }

    pub fn max(self, other: Abs) -> Abs {
        Abs(self.0.max(other.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator.abs() / 2;
    if (numerator < 0) != (denominator < 0) {
        (numerator - half) / denominator
    } else {
        (numerator + half) / denominator
    }
}

impl fmt::Display for Abs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = div_round(self.0 as i128 * 100, SCALE as i128);
        let sign = if hundredths < 0 { "-" } else { "" };
        let hundredths = hundredths.abs();
        let (whole, fraction) = (hundredths / 100, hundredths % 100);
        if fraction == 0 {
            write!(f, "{sign}{whole}pt")
        } else if fraction % 10 == 0 {
            write!(f, "{sign}{whole}.{}pt", fraction / 10)
        } else {
            write!(f, "{sign}{whole}.{fraction:02}pt")
        }
    }
}

impl Add for Abs {
    type Output = Abs;

    fn add(self, rhs: Abs) -> Abs {
        Abs(self.0 + rhs.0)
    }
}

impl AddAssign for Abs {
    fn add_assign(&mut self, rhs: Abs) {
        self.0 += rhs.0;
    }
}

impl Sub for Abs {
    type Output = Abs;

    fn sub(self, rhs: Abs) -> Abs {
        Abs(self.0 - rhs.0)
    }
}

impl SubAssign for Abs {
    fn sub_assign(&mut self, rhs: Abs) {
        self.0 -= rhs.0;
    }
}

impl Neg for Abs {
    type Output = Abs;

    fn neg(self) -> Abs {
        Abs(-self.0)
    }
}

impl Mul<i64> for Abs {
    type Output = Abs;

    fn mul(self, rhs: i64) -> Abs {
        Abs(self.0 * rhs)
    }
}

impl Div<i64> for Abs {
    type Output = Abs;

    fn div(self, rhs: i64) -> Abs {
        Abs(self.0 / rhs)
    }
}

impl Sum for Abs {
    fn sum<I: Iterator<Item = Abs>>(iter: I) -> Abs {
        iter.fold(Abs::ZERO, Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum LengthError {
    #[error("expected a number in '{0}'")]
    MissingNumber(String),
    #[error("expected a unit (pt, mm, cm, in, em) in '{0}'")]
    MissingUnit(String),
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("length '{0}' is out of range")]
    OutOfRange(String),
    #[error("length '{0}' must be positive")]
    NotPositive(String),
}

/// Parses a decimal length such as `4cm`, `-1.5pt` or `2em`.
///
/// Digits beyond the ninth decimal place are ignored. `em` is relative to
/// the given font size.
pub fn parse_length(text: &str, em: Abs) -> Result<Abs, LengthError> {
    let text = text.trim();
    let is_number = |index: usize, c: char| {
        c.is_ascii_digit() || c == '.' || index == 0 && matches!(c, '-' | '+')
    };
    let number_end = text
        .char_indices()
        .find(|&(index, c)| !is_number(index, c))
        .map_or(text.len(), |(index, _)| index);

    let (number, unit) = text.split_at(number_end);
    let unit = unit.trim();

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };

    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() || fraction.contains('.') {
        return Err(LengthError::MissingNumber(text.to_string()));
    }
    let fraction = &fraction[..fraction.len().min(9)];

    let out_of_range = || LengthError::OutOfRange(text.to_string());
    let mut mantissa: i128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        let digit = c.to_digit(10).ok_or_else(|| LengthError::MissingNumber(text.to_string()))?;
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|mantissa| mantissa.checked_add(digit as i128))
            .ok_or_else(out_of_range)?;
    }
    let power = 10i128.pow(fraction.len() as u32);

    let (numerator, denominator) = match unit {
        "" => return Err(LengthError::MissingUnit(text.to_string())),
        "pt" => (SCALE as i128, 1),
        "in" => (SCALE as i128 * 7227, 100),
        "cm" => (SCALE as i128 * 7227, 254),
        "mm" => (SCALE as i128 * 7227, 2540),
        "em" => (em.to_raw() as i128, 1),
        unit => return Err(LengthError::UnknownUnit(unit.to_string())),
    };

    let scaled = mantissa.checked_mul(numerator).ok_or_else(out_of_range)?;
    let raw = div_round(scaled, denominator * power);
    if raw > Abs::MAX.to_raw() as i128 {
        return Err(out_of_range());
    }

    let raw = raw as i64;
    Ok(Abs(if negative { -raw } else { raw }))
}
