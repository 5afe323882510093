use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Numeric value of a template. Every number is a double.
#[derive(Debug, Clone, PartialEq, Copy, Default)]
pub struct Number(f64);

pub const NAN: Number = Number(f64::NAN);
pub const ZERO: Number = Number(0.0);
pub const ONE: Number = Number(1.0);

impl Number {
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Truncates any fractional part.
    pub fn to_int(self) -> i64 {
        self.0 as i64
    }

    pub fn is_int(&self) -> bool {
        self.0.is_finite() && self.0.fract() == 0.0
    }

    pub fn abs(&self) -> Self {
        Number(self.0.abs())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    pub fn pow(self, exponent: Self) -> Self {
        Number(self.0.powf(exponent.0))
    }

    /// Returns the number as a position when it is a non-negative integer.
    pub fn to_index(self) -> Option<usize> {
        (self.is_int() && self.0 >= 0.0).then_some(self.0 as usize)
    }

    /// Relative position for methods such as `at` and `slice`, where negative
    /// values count back from `len`. The result is clamped to `0..=len`.
    pub fn to_relative_index(self, len: usize) -> usize {
        if self.is_nan() {
            return 0;
        }

        let position = self.0.trunc();
        if position < 0.0 {
            (len as f64 + position).max(0.0) as usize
        } else {
            position.min(len as f64) as usize
        }
    }

    /// Parses the textual form of a number. Surrounding whitespace is
    /// ignored, the empty string is zero and anything else yields NaN.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if text.is_empty() {
            return ZERO;
        }

        match text {
            "Infinity" | "+Infinity" => return Number(f64::INFINITY),
            "-Infinity" => return Number(f64::NEG_INFINITY),
            _ => {}
        }

        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16)
                .map(|n| Number(n as f64))
                .unwrap_or(NAN);
        }

        // Rust accepts spellings such as "inf" and "nan" that are not numbers here.
        if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
            return NAN;
        }

        text.parse::<f64>().map(Number).unwrap_or(NAN)
    }
}

impl Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Number(-self.0)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number(value as f64)
    }
}

impl From<u32> for Number {
    fn from(value: u32) -> Self {
        Number(value as f64)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number(value as f64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

impl From<bool> for Number {
    fn from(value: bool) -> Self {
        if value { ONE } else { ZERO }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nan() {
            write!(f, "NaN")
        } else if self.0.is_infinite() {
            write!(f, "{}", if self.0 > 0.0 { "Infinity" } else { "-Infinity" })
        } else if self.is_int() && self.0.abs() < 1e21 {
            // -0 prints as 0
            write!(f, "{}", self.0 as i128)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Add for Number {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Number(self.0 + other.0)
    }
}

impl Sub for Number {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Number(self.0 - other.0)
    }
}

impl Mul for Number {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Number(self.0 * other.0)
    }
}

impl Div for Number {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Number(self.0 / other.0)
    }
}

impl Rem for Number {
    type Output = Self;

    fn rem(self, other: Self) -> Self {
        Number(self.0 % other.0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}
