use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, SyntakError};
use crate::grammar::{OrPolicy, RuleId, RuleSet};
use crate::node::{NodeId, ParseTree};
use crate::numeric::NumericValue;
use crate::parser::Parser;
use crate::token::TokenSpec;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(SyntakError::InvalidIdentifier(name.to_string()))
    }
}

/// A value-stack entry: either a computed `T`, or a reference to a `num`
/// parse node whose literal text has not been decoded yet. Decoding is
/// deferred to pop time so a bare literal like `42` that never
/// participates in an operator application is only ever parsed once, at
/// the point something actually consumes it.
#[derive(Clone, Copy)]
enum StackItem<T> {
    Node(NodeId),
    Value(T),
}

/// A registered function, boxed so functions of different arities can
/// share one table keyed by `(name, arity)`.
type BoxedFn<T> = Rc<dyn Fn(&[T]) -> T>;

struct Shared<T: NumericValue> {
    stack: Vec<StackItem<T>>,
    constants: HashMap<String, T>,
    functions: HashMap<(String, u8), BoxedFn<T>>,
    ignore_zero_div: bool,
}

impl<T: NumericValue> Shared<T> {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            constants: HashMap::new(),
            functions: HashMap::new(),
            ignore_zero_div: false,
        }
    }
}

/// Pops the top stack item and decodes it to a `T`, parsing a deferred
/// `num` node's captured text on demand. A leading `+`/`-` is stripped and
/// applied as a sign (only ever present when `T::IS_SIGNED`, since the
/// grammar omits the sign marker entirely for unsigned types).
fn pop_value<T: NumericValue>(shared: &mut Shared<T>, tree: &ParseTree) -> Result<T> {
    let item = shared
        .stack
        .pop()
        .ok_or_else(|| SyntakError::InvariantBroken("value stack underflow".to_string()))?;
    match item {
        StackItem::Value(v) => Ok(v),
        StackItem::Node(id) => {
            let text = tree.text(id);
            let (negative, body) = match text.as_bytes().first() {
                Some(b'-') if T::IS_SIGNED => (true, &text[1..]),
                Some(b'+') if T::IS_SIGNED => (false, &text[1..]),
                _ => (false, text),
            };
            let value = T::parse(body)?;
            Ok(if negative { value.negate() } else { value })
        }
    }
}

/// Splits a captured `ident` node's text into its sign and bare name. Only
/// ever sees a leading `+`/`-` when `T::IS_SIGNED`, since the grammar omits
/// the `[op1]` sign marker entirely for unsigned types (mirrors the sign
/// stripping [`pop_value`] does for a `num` node).
fn split_ident_sign<T: NumericValue>(text: &str) -> (bool, &str) {
    match text.as_bytes().first() {
        Some(b'-') if T::IS_SIGNED => (true, &text[1..]),
        Some(b'+') if T::IS_SIGNED => (false, &text[1..]),
        _ => (false, text),
    }
}

/// Builds a grammar and its arithmetic callbacks from a numeric type's
/// capabilities and the evaluator's currently registered constants and
/// functions, and installs it on `parser`. Runs whenever the evaluator is
/// dirty (see [`MathEvaluator::init`]).
fn build_grammar<T: NumericValue>(
    shared: &Rc<RefCell<Shared<T>>>,
) -> Result<(Vec<TokenSpec>, RuleSet)> {
    let (has_constants, has_functions, name_clash) = {
        let st = shared.borrow();
        let has_constants = !st.constants.is_empty();
        let has_functions = !st.functions.is_empty();
        let name_clash = st
            .constants
            .keys()
            .any(|c| st.functions.keys().any(|(f, _)| f == c));
        (has_constants, has_functions, name_clash)
    };
    let needs_ident = has_constants || has_functions;

    let literal_name = if T::IS_SIGNED { "unsigned_num" } else { "num" };
    let mut tokens = vec![
        TokenSpec::regex(literal_name, T::literal_regex()),
        TokenSpec::fixed("plus", "+"),
        TokenSpec::fixed("minus", "-"),
        TokenSpec::fixed("star", "*"),
        TokenSpec::fixed("slash", "/"),
        TokenSpec::fixed("percent", "%"),
        TokenSpec::fixed("lparen", "("),
        TokenSpec::fixed("rparen", ")"),
        TokenSpec::fixed("comma", ","),
    ];
    let ident_literal_name = if T::IS_SIGNED { "unsigned_ident" } else { "ident" };
    if needs_ident {
        tokens.push(TokenSpec::regex(ident_literal_name, "[A-Za-z_][A-Za-z0-9_]*"));
    }

    let mut rules = RuleSet::new();
    rules.add_tokens(&tokens);

    rules.create_or("op1", &["plus", "minus"]);
    rules.create_or("op2", &["star", "slash", "percent"]);

    if T::IS_SIGNED {
        rules.create_and("num", &["[op1]", "unsigned_num"]);
        if needs_ident {
            rules.create_and("ident", &["[op1]", "unsigned_ident"]);
        }
    }

    rules.create_and("op1_term", &["op1", "term"]);
    rules.create_and("op2_factor", &["op2", "factor"]);
    rules.create_and("expr", &["term", "[op1_term]*"]);
    rules.create_and("term", &["factor", "[op2_factor]*"]);

    if T::IS_SIGNED {
        rules.create_and("quoted_expr", &["[op1]", "lparen", "expr", "rparen"]);
    } else {
        rules.create_and("quoted_expr", &["lparen", "expr", "rparen"]);
    }

    let mut factor_alts = vec!["num".to_string(), "quoted_expr".to_string()];
    if has_constants {
        factor_alts.push("ident".to_string());
    }
    if has_functions {
        factor_alts.push("func".to_string());
    }
    let factor_alts: Vec<&str> = factor_alts.iter().map(String::as_str).collect();
    let factor_policy = if name_clash { OrPolicy::Deepest } else { OrPolicy::First };
    let factor_id = rules.create_or_with_policy("factor", factor_policy, &factor_alts);

    if has_functions {
        rules.create_and("comma_expr", &["comma", "expr"]);
        rules.create_and("arg_list", &["expr", "[comma_expr]*"]);
        rules.create_and("func", &["ident", "lparen", "arg_list", "rparen"]);
    }

    rules.create_and("expression", &["expr", "EOF"]);

    install_callbacks(&mut rules, factor_alts_index(&factor_alts), factor_id, shared)?;
    Ok((tokens, rules))
}

/// The position of the `"ident"` alternative within `factor`'s sub-rule
/// list, if present — used to attach the constant-lookup callback to that
/// one slot instead of the bare "ident" rule (which `func` also
/// references, for its function name, with no callback at all).
fn factor_alts_index(alts: &[&str]) -> Option<usize> {
    alts.iter().position(|&a| a == "ident")
}

fn install_callbacks<T: NumericValue>(
    rules: &mut RuleSet,
    ident_slot: Option<usize>,
    _factor_id: RuleId,
    shared: &Rc<RefCell<Shared<T>>>,
) -> Result<()> {
    let s = shared.clone();
    rules.connect("num", move |id, _tree| {
        s.borrow_mut().stack.push(StackItem::Node(id));
        Ok(())
    })?;

    if let Some(idx) = ident_slot {
        let s = shared.clone();
        rules.connect_sub("factor", idx, move |id, tree| {
            let mut st = s.borrow_mut();
            let (negative, name) = split_ident_sign::<T>(tree.text(id));
            let value = *st.constants.get(name).ok_or_else(|| SyntakError::UnknownIdentifier {
                name: name.to_string(),
                pos: tree.pos(id),
            })?;
            st.stack.push(StackItem::Value(if negative { value.negate() } else { value }));
            Ok(())
        })?;
    }

    let s = shared.clone();
    rules.connect("op1_term", move |id, tree| {
        let mut st = s.borrow_mut();
        let right = pop_value(&mut st, tree)?;
        let left = pop_value(&mut st, tree)?;
        let op = tree.view(id).child(0).unwrap().text();
        let result = if op == "-" { left.sub(right) } else { left.add(right) };
        st.stack.push(StackItem::Value(result));
        Ok(())
    })?;

    let s = shared.clone();
    rules.connect("op2_factor", move |id, tree| {
        let mut st = s.borrow_mut();
        let right = pop_value(&mut st, tree)?;
        let left = pop_value(&mut st, tree)?;
        let op = tree.view(id).child(0).unwrap().text();
        let result = match op {
            "*" => left.mul(right),
            "/" => {
                if right.is_zero() {
                    if st.ignore_zero_div {
                        T::zero()
                    } else {
                        return Err(SyntakError::DivisionByZero(tree.pos(id)));
                    }
                } else {
                    left.div(right)
                }
            }
            "%" => {
                if right.is_zero() {
                    if st.ignore_zero_div {
                        T::zero()
                    } else {
                        return Err(SyntakError::ModuloByZero(tree.pos(id)));
                    }
                } else {
                    left.modulo(right)
                }
            }
            other => {
                return Err(SyntakError::InvariantBroken(format!(
                    "op2_factor matched unexpected operator literal {:?}",
                    other
                )))
            }
        };
        st.stack.push(StackItem::Value(result));
        Ok(())
    })?;

    if T::IS_SIGNED {
        let s = shared.clone();
        rules.connect("quoted_expr", move |id, tree| {
            if tree.text(id).starts_with('-') {
                let mut st = s.borrow_mut();
                let inner = pop_value(&mut st, tree)?;
                st.stack.push(StackItem::Value(inner.negate()));
            }
            Ok(())
        })?;
    }

    if rules.find("func").is_some() {
        let s = shared.clone();
        rules.connect("func", move |id, tree| {
            let view = tree.view(id);
            let name_text = view.child(0).unwrap().text();
            let (negative, name) = split_ident_sign::<T>(name_text);
            let name = name.to_string();
            let arg_list = view.child(2).unwrap();
            let arity = arg_list.children().count();

            let mut st = s.borrow_mut();
            let mut args = Vec::with_capacity(arity);
            for _ in 0..arity {
                args.push(pop_value(&mut st, tree)?);
            }
            args.reverse();

            let key = (name.clone(), arity as u8);
            let f = st.functions.get(&key).cloned().ok_or_else(|| SyntakError::UnknownFunction {
                name: name.clone(),
                arity,
                pos: tree.pos(id),
            })?;
            drop(st);
            let result = f(&args);
            let result = if negative { result.negate() } else { result };
            s.borrow_mut().stack.push(StackItem::Value(result));
            Ok(())
        })?;
    }

    Ok(())
}

/// Builds a grammar from a numeric type's traits and from the caller's
/// registered constants and functions, installs callbacks driving a value
/// stack, and exposes [`MathEvaluator::evaluate`] to parse and reduce a
/// single expression to a `T`.
///
/// Mirrors [`crate::parser::Parser`]'s own lazy-rebuild discipline: a
/// single `dirty` flag is set whenever a constant or function is added,
/// and the grammar is rebuilt from scratch (not patched) on the next
/// [`MathEvaluator::init`] or [`MathEvaluator::evaluate`] call — adding a
/// function can change which `OR` policy `factor` needs, so there is no
/// incremental update cheaper than a full rebuild.
pub struct MathEvaluator<T: NumericValue> {
    shared: Rc<RefCell<Shared<T>>>,
    parser: Parser,
    dirty: bool,
}

impl<T: NumericValue> MathEvaluator<T> {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared::new())),
            parser: Parser::new(),
            dirty: true,
        }
    }

    pub fn is_signed(&self) -> bool {
        T::IS_SIGNED
    }

    pub fn is_float(&self) -> bool {
        T::IS_FLOAT
    }

    pub fn set_ignore_division_by_zero(&mut self, ignore: bool) {
        self.shared.borrow_mut().ignore_zero_div = ignore;
    }

    pub fn add_constant(&mut self, name: &str, value: T) -> Result<()> {
        check_identifier(name)?;
        self.shared.borrow_mut().constants.insert(name.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    pub fn constants(&self) -> HashMap<String, T> {
        self.shared.borrow().constants.clone()
    }

    fn add_function_n(&mut self, name: &str, arity: u8, f: BoxedFn<T>) -> Result<()> {
        check_identifier(name)?;
        self.shared.borrow_mut().functions.insert((name.to_string(), arity), f);
        self.dirty = true;
        Ok(())
    }

    pub fn add_function1(&mut self, name: &str, f: impl Fn(T) -> T + 'static) -> Result<()> {
        self.add_function_n(name, 1, Rc::new(move |args: &[T]| f(args[0])))
    }

    pub fn add_function2(&mut self, name: &str, f: impl Fn(T, T) -> T + 'static) -> Result<()> {
        self.add_function_n(name, 2, Rc::new(move |args: &[T]| f(args[0], args[1])))
    }

    pub fn add_function3(&mut self, name: &str, f: impl Fn(T, T, T) -> T + 'static) -> Result<()> {
        self.add_function_n(name, 3, Rc::new(move |args: &[T]| f(args[0], args[1], args[2])))
    }

    pub fn add_function4(
        &mut self,
        name: &str,
        f: impl Fn(T, T, T, T) -> T + 'static,
    ) -> Result<()> {
        self.add_function_n(name, 4, Rc::new(move |args: &[T]| f(args[0], args[1], args[2], args[3])))
    }

    pub fn has_functions(&self) -> bool {
        !self.shared.borrow().functions.is_empty()
    }

    pub fn function_names(&self, arity: u8) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .borrow()
            .functions
            .keys()
            .filter(|(_, a)| *a == arity)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Rebuilds the grammar now if it is dirty. Calling this eagerly is
    /// optional — [`MathEvaluator::evaluate`] does it lazily — but lets a
    /// caller pay the (re)build cost up front instead of on the first
    /// `evaluate` after a configuration change.
    pub fn init(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let (tokens, rules) = build_grammar(&self.shared)?;
        self.parser.set_tokens(tokens);
        self.parser.set_rules(rules)?;
        self.dirty = false;
        log::debug!(
            "math evaluator grammar rebuilt for {} (signed={}, float={})",
            T::NAME,
            T::IS_SIGNED,
            T::IS_FLOAT
        );
        Ok(())
    }

    /// Parses and evaluates a single expression, returning its typed
    /// result. Rebuilds the grammar first if a constant or function was
    /// registered since the last evaluation. The parse tree produced
    /// along the way is owned locally and dropped before this returns.
    pub fn evaluate(&mut self, text: &str) -> Result<T> {
        self.init()?;
        self.shared.borrow_mut().stack.clear();

        let tree = self.parser.parse(text)?;

        let mut st = self.shared.borrow_mut();
        if st.stack.len() > 1 {
            return Err(SyntakError::InvariantBroken(format!(
                "value stack held {} items after a successful parse, expected 1",
                st.stack.len()
            )));
        }
        if st.stack.is_empty() {
            // A bare literal (e.g. "42") never participates in an operator
            // application, so its `num` callback left the only stack item
            // as a deferred node rather than nothing — this branch should
            // be unreachable, but guard it rather than panic on index 0.
            return Err(SyntakError::InvariantBroken(
                "value stack was empty after a successful parse".to_string(),
            ));
        }
        let value = pop_value(&mut st, &tree)?;
        drop(st);
        drop(tree);
        Ok(value)
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// The grammar's top rule (named `"expression"`), once built by
    /// [`MathEvaluator::init`] or a prior [`MathEvaluator::evaluate`].
    pub fn expression(&self) -> Option<RuleId> {
        self.parser.rules().and_then(|r| r.top_rule())
    }

    /// A deep, independent copy: same constants, functions, and
    /// division-by-zero policy, but its own grammar (rebuilt on next use)
    /// and its own value stack. Mirrors the language-neutral API's `copy`.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Replaces `self`'s configuration with a deep copy of `other`'s.
    /// Mirrors the language-neutral API's `assign`.
    pub fn assign(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl<T: NumericValue> Default for MathEvaluator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NumericValue> Clone for MathEvaluator<T> {
    fn clone(&self) -> Self {
        let src = self.shared.borrow();
        let mut shared = Shared::new();
        shared.constants = src.constants.clone();
        shared.functions = src.functions.clone();
        shared.ignore_zero_div = src.ignore_zero_div;
        drop(src);
        Self {
            shared: Rc::new(RefCell::new(shared)),
            parser: Parser::new(),
            dirty: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_yields_zero_when_ignored() {
        let mut ev: MathEvaluator<i32> = MathEvaluator::new();
        ev.set_ignore_division_by_zero(true);
        assert_eq!(ev.evaluate("10/0").unwrap(), 0);
    }

    #[test]
    fn unknown_identifier_is_reported() {
        let mut ev: MathEvaluator<f64> = MathEvaluator::new();
        let err = ev.evaluate("unknown_name").unwrap_err();
        assert!(matches!(err, SyntakError::UnknownIdentifier { .. }));
    }

    #[test]
    fn unknown_function_arity_is_reported() {
        let mut ev: MathEvaluator<f64> = MathEvaluator::new();
        ev.add_function1("id", |x| x).unwrap();
        let err = ev.evaluate("id(1, 2)").unwrap_err();
        assert!(matches!(err, SyntakError::UnknownFunction { .. }));
    }

    #[test]
    fn invalid_constant_name_is_rejected() {
        let mut ev: MathEvaluator<f64> = MathEvaluator::new();
        let err = ev.add_constant("1bad", 1.0).unwrap_err();
        assert!(matches!(err, SyntakError::InvalidIdentifier(_)));
    }

    #[test]
    fn unsigned_evaluator_rejects_a_leading_minus() {
        let mut ev: MathEvaluator<u32> = MathEvaluator::new();
        assert!(ev.evaluate("-5").is_err());
        assert_eq!(ev.evaluate("5").unwrap(), 5);
    }

    #[test]
    fn copies_are_independent_of_the_original() {
        let mut ev: MathEvaluator<f64> = MathEvaluator::new();
        ev.add_constant("x", 10.0).unwrap();
        let mut copy = ev.copy();
        copy.add_constant("x", 20.0).unwrap();
        assert_eq!(ev.evaluate("x").unwrap(), 10.0);
        assert_eq!(copy.evaluate("x").unwrap(), 20.0);
    }
}
