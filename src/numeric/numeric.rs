use std::fmt;

use crate::error::{Result, SyntakError};

/// Per-numeric-type capabilities the evaluator's grammar and callbacks are
/// built from: whether unary minus and signed literals are admitted,
/// whether floating literals are admitted, the literal's regex, and how to
/// decode and combine values of this type.
///
/// Implemented once per supported numeric type (the 8/16/32/64-bit signed
/// and unsigned integers, and `f32`/`f64`); `MathEvaluator<T>` is generic
/// over `T: NumericValue`.
pub trait NumericValue: Copy + fmt::Display + fmt::Debug + PartialEq + 'static {
    /// Name used in error messages and logging, e.g. `"i32"`.
    const NAME: &'static str;
    /// Whether the generated grammar should admit a unary `-` sign on
    /// numbers and parenthesized expressions.
    const IS_SIGNED: bool;
    /// Whether the generated grammar should admit floating-point literals.
    const IS_FLOAT: bool;

    /// The anchored-at-scan-position regex for this type's literal token.
    fn literal_regex() -> &'static str;

    /// Decodes a literal already known to have matched [`Self::literal_regex`].
    fn parse(text: &str) -> Result<Self>;

    fn zero() -> Self;
    fn is_zero(&self) -> bool;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    /// Caller guarantees `rhs` is non-zero; the evaluator applies the
    /// division-by-zero policy itself before calling this.
    fn div(self, rhs: Self) -> Self;
    /// Integer `%` for integer types, IEEE `fmod` for floats. Caller
    /// guarantees `rhs` is non-zero.
    fn modulo(self, rhs: Self) -> Self;
    /// Only ever invoked when [`Self::IS_SIGNED`] is true.
    fn negate(self) -> Self;
}

const INT_LITERAL_REGEX: &str = "[0-9]+";
const FLOAT_LITERAL_REGEX: &str = r"(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?";

fn parse_failure<T>(name: &str, text: &str) -> Result<T> {
    Err(SyntakError::InvariantBroken(format!(
        "{} literal {:?} matched its token regex but failed to parse",
        name, text
    )))
}

macro_rules! impl_numeric_int {
    ($t:ty, $signed:expr) => {
        impl NumericValue for $t {
            const NAME: &'static str = stringify!($t);
            const IS_SIGNED: bool = $signed;
            const IS_FLOAT: bool = false;

            fn literal_regex() -> &'static str {
                INT_LITERAL_REGEX
            }

            fn parse(text: &str) -> Result<Self> {
                text.parse::<$t>()
                    .or_else(|_| parse_failure(Self::NAME, text))
            }

            fn zero() -> Self {
                0
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            fn sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }

            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            fn div(self, rhs: Self) -> Self {
                self.wrapping_div(rhs)
            }

            fn modulo(self, rhs: Self) -> Self {
                self.wrapping_rem(rhs)
            }

            fn negate(self) -> Self {
                self.wrapping_neg()
            }
        }
    };
}

impl_numeric_int!(i8, true);
impl_numeric_int!(i16, true);
impl_numeric_int!(i32, true);
impl_numeric_int!(i64, true);

macro_rules! impl_numeric_uint {
    ($t:ty) => {
        impl NumericValue for $t {
            const NAME: &'static str = stringify!($t);
            const IS_SIGNED: bool = false;
            const IS_FLOAT: bool = false;

            fn literal_regex() -> &'static str {
                INT_LITERAL_REGEX
            }

            fn parse(text: &str) -> Result<Self> {
                text.parse::<$t>()
                    .or_else(|_| parse_failure(Self::NAME, text))
            }

            fn zero() -> Self {
                0
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }

            fn add(self, rhs: Self) -> Self {
                self.wrapping_add(rhs)
            }

            fn sub(self, rhs: Self) -> Self {
                self.wrapping_sub(rhs)
            }

            fn mul(self, rhs: Self) -> Self {
                self.wrapping_mul(rhs)
            }

            fn div(self, rhs: Self) -> Self {
                self.wrapping_div(rhs)
            }

            fn modulo(self, rhs: Self) -> Self {
                self.wrapping_rem(rhs)
            }

            /// Unsigned types never reach this: the generated grammar omits
            /// the sign marker entirely when `IS_SIGNED` is false.
            fn negate(self) -> Self {
                self
            }
        }
    };
}

impl_numeric_uint!(u8);
impl_numeric_uint!(u16);
impl_numeric_uint!(u32);
impl_numeric_uint!(u64);

macro_rules! impl_numeric_float {
    ($t:ty) => {
        impl NumericValue for $t {
            const NAME: &'static str = stringify!($t);
            const IS_SIGNED: bool = true;
            const IS_FLOAT: bool = true;

            fn literal_regex() -> &'static str {
                FLOAT_LITERAL_REGEX
            }

            fn parse(text: &str) -> Result<Self> {
                text.parse::<$t>()
                    .or_else(|_| parse_failure(Self::NAME, text))
            }

            fn zero() -> Self {
                0.0
            }

            fn is_zero(&self) -> bool {
                *self == 0.0
            }

            fn add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn div(self, rhs: Self) -> Self {
                self / rhs
            }

            fn modulo(self, rhs: Self) -> Self {
                self % rhs
            }

            fn negate(self) -> Self {
                -self
            }
        }
    };
}

impl_numeric_float!(f32);
impl_numeric_float!(f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_ints_admit_negation_and_parse_plain_digits() {
        assert!(i32::IS_SIGNED);
        assert!(!i32::IS_FLOAT);
        assert_eq!(i32::parse("42").unwrap(), 42);
        assert_eq!(42i32.negate(), -42);
    }

    #[test]
    fn unsigned_ints_report_unsigned() {
        assert!(!u32::IS_SIGNED);
        assert_eq!(u32::parse("42").unwrap(), 42);
    }

    #[test]
    fn floats_use_the_float_literal_regex_and_parse_scientific_notation() {
        assert!(f64::IS_SIGNED);
        assert!(f64::IS_FLOAT);
        assert_eq!(f64::parse("3.456e-11").unwrap(), 3.456e-11);
        assert_eq!(f64::literal_regex(), FLOAT_LITERAL_REGEX);
    }

    #[test]
    fn modulo_matches_language_semantics_for_ints_and_floats() {
        assert_eq!(9i32.modulo(5).modulo(3), 1);
        assert!((5.5f64.modulo(2.0) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn bad_literal_text_is_reported_as_an_invariant_break_not_a_panic() {
        let err = i32::parse("not-a-number").unwrap_err();
        matches!(err, SyntakError::InvariantBroken(_));
    }
}
