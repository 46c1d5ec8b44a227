//! Black-box scenarios for [`MathEvaluator`], mirroring the concrete test
//! table worked out against the reference implementation, plus a
//! deterministic pseudo-random round-trip check: generate an expression
//! with a known value, ask the evaluator to parse and evaluate its own
//! text, and check the two agree.

use syntak::evaluator::MathEvaluator;
use syntak::numeric::NumericValue;
use syntak::SyntakError;

#[test]
fn precedence_and_associativity_without_grouping() {
    let mut ev: MathEvaluator<i32> = MathEvaluator::new();
    assert_eq!(ev.evaluate("1+2+3+4+5+6+7*8*9").unwrap(), 525);
}

#[test]
fn deeply_nested_grouping() {
    let mut ev: MathEvaluator<i32> = MathEvaluator::new();
    let text = "(((((((1+2)*3+4)*5+6)*7+8)*9+10)*11+12)*13+14)*15";
    // (1+2)=3, *3+4=13, *5+6=71, *7+8=505, *9+10=4555, *11+12=50117,
    // *13+14=651535, *15=9773025.
    assert_eq!(ev.evaluate(text).unwrap(), 9773025);
}

#[test]
fn nested_unary_minus_on_doubles() {
    let mut ev: MathEvaluator<f64> = MathEvaluator::new();
    // 5+-6=-1, 4+-(-1)=5, 2+-(5)=-3, 3*-(-3)=9 — matches native evaluation
    // of the same expression under the same operator precedence.
    assert_eq!(ev.evaluate("3*-(2+-(4+-(5+-6)))").unwrap(), 9.0);
}

#[test]
fn scientific_notation_literal() {
    let mut ev: MathEvaluator<f64> = MathEvaluator::new();
    assert_eq!(ev.evaluate("-3.456e-11").unwrap(), -3.456e-11);
}

#[test]
fn modulo_chains_left_to_right() {
    let mut ev: MathEvaluator<i32> = MathEvaluator::new();
    assert_eq!(ev.evaluate("9 % 5 % 3").unwrap(), 1);
}

#[test]
fn constant_and_function_sharing_a_name_disambiguate_by_call_syntax() {
    let mut ev: MathEvaluator<f64> = MathEvaluator::new();
    ev.add_constant("sin", 1.5).unwrap();
    ev.add_function1("sin", f64::sin).unwrap();
    assert_eq!(ev.evaluate("sin(sin)").unwrap(), 1.5f64.sin());
}

#[test]
fn signed_constant_reference_applies_its_leading_sign() {
    let mut ev: MathEvaluator<f64> = MathEvaluator::new();
    ev.add_constant("pi", std::f64::consts::PI).unwrap();
    assert_eq!(ev.evaluate("-pi").unwrap(), -std::f64::consts::PI);
    assert_eq!(ev.evaluate("- pi").unwrap(), -std::f64::consts::PI);
}

#[test]
fn signed_function_call_applies_its_leading_sign_to_the_result() {
    let mut ev: MathEvaluator<f64> = MathEvaluator::new();
    ev.add_function1("sqrt", f64::sqrt).unwrap();
    assert_eq!(ev.evaluate("-sqrt(4)").unwrap(), -2.0);
}

#[test]
fn division_by_zero_is_suppressed_to_zero_when_ignored() {
    let mut ev: MathEvaluator<i32> = MathEvaluator::new();
    ev.set_ignore_division_by_zero(true);
    assert_eq!(ev.evaluate("10/0").unwrap(), 0);
}

#[test]
fn division_by_zero_errors_by_default() {
    let mut ev: MathEvaluator<i32> = MathEvaluator::new();
    let err = ev.evaluate("10/0").unwrap_err();
    assert!(matches!(err, SyntakError::DivisionByZero(_)));
}

#[test]
fn two_argument_function_call() {
    let mut ev: MathEvaluator<f64> = MathEvaluator::new();
    ev.add_function2("pow", f64::powf).unwrap();
    assert_eq!(ev.evaluate("pow(2, 3)").unwrap(), 8.0);
}

/// A minimal xorshift64 PRNG. The pack's dependency set has no
/// property-testing crate (no `proptest`/`quickcheck`), so the round-trip
/// generator below is a small in-crate generator instead of a fabricated
/// dependency — deterministic across runs given the same seed, which
/// keeps a failing case reproducible.
struct Xorshift64(u64);

impl Xorshift64 {
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn range(&mut self, lo: u64, hi_inclusive: u64) -> u64 {
        lo + self.next_u64() % (hi_inclusive - lo + 1)
    }

    fn bool(&mut self) -> bool {
        self.next_u64() & 1 == 0
    }
}

/// Builds a single linear chain of `depth` nested groups, e.g.
/// `(((1+2)*3)-4)`, in the style of the deeply-nested-grouping scenario
/// above, alternating operators and occasional unary signs, while
/// tracking the expected value via the same [`NumericValue`] arithmetic
/// the evaluator itself uses. Division/modulo steps skip a
/// zero right-hand side so the generated expression never depends on the
/// division-by-zero policy.
fn gen_chain<T: NumericValue>(rng: &mut Xorshift64, depth: u32) -> (String, T) {
    let lit = |rng: &mut Xorshift64| -> (String, T) {
        let n = rng.range(0, 999);
        let text = n.to_string();
        (text, T::parse(&n.to_string()).unwrap_or_else(|_| T::zero()))
    };

    let (text0, value0) = lit(rng);
    let mut text = if T::IS_SIGNED && rng.bool() {
        format!("-{}", text0)
    } else {
        text0
    };
    let mut value = if T::IS_SIGNED && text.starts_with('-') {
        value0.negate()
    } else {
        value0
    };

    for _ in 0..depth {
        let (rhs_text, rhs_value) = lit(rng);
        let op = rng.range(0, 4);
        let ws = if rng.bool() { " " } else { "" };
        text = match op {
            0 => {
                value = value.add(rhs_value);
                format!("({}{}+{}{})", text, ws, ws, rhs_text)
            }
            1 => {
                value = value.sub(rhs_value);
                format!("({}{}-{}{})", text, ws, ws, rhs_text)
            }
            2 => {
                value = value.mul(rhs_value);
                format!("({}{}*{}{})", text, ws, ws, rhs_text)
            }
            3 if !rhs_value.is_zero() => {
                value = value.div(rhs_value);
                format!("({}{}/{}{})", text, ws, ws, rhs_text)
            }
            _ if !rhs_value.is_zero() => {
                value = value.modulo(rhs_value);
                format!("({}{}%{}{})", text, ws, ws, rhs_text)
            }
            _ => text, // zero divisor drawn: skip this step rather than bias the policy
        };
    }

    (text, value)
}

fn assert_round_trips<T: NumericValue>(seed: u64) {
    let mut rng = Xorshift64::new(seed);
    let mut ev: MathEvaluator<T> = MathEvaluator::new();
    for i in 0..200 {
        let depth = 10 + (rng.range(0, 40) as u32);
        let (text, expected) = gen_chain::<T>(&mut rng, depth);
        let actual = ev
            .evaluate(&text)
            .unwrap_or_else(|e| panic!("case {i} ({:?}) failed to evaluate {text:?}: {e}", T::NAME));
        assert_eq!(
            actual, expected,
            "case {i} ({:?}): {text:?} evaluated to {actual:?}, expected {expected:?}",
            T::NAME
        );
    }
}

#[test]
fn round_trip_property_holds_for_i32() {
    assert_round_trips::<i32>(0x5eed_1);
}

#[test]
fn round_trip_property_holds_for_i64() {
    assert_round_trips::<i64>(0x5eed_2);
}

#[test]
fn round_trip_property_holds_for_u32() {
    assert_round_trips::<u32>(0x5eed_3);
}

#[test]
fn round_trip_property_holds_for_f64() {
    assert_round_trips::<f64>(0x5eed_4);
}
