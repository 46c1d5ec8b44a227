use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Result, SyntakError};
use crate::node::{NodeId, ParseTree};
use crate::token::TokenSpec;

/// A callback registered on a [`Rule`] or a [`SubRuleRef`] slot, invoked
/// during the post-parse emit walk with the node it fired on and the tree
/// it belongs to. Shares interior state with whatever registered it
/// (typically a `MathEvaluator`'s value stack) by closing over an
/// `Rc<RefCell<..>>`. Fallible: a `MathEvaluator` callback can raise
/// `UnknownIdentifier`, `UnknownFunction`, `DivisionByZero`, or
/// `ModuloByZero` mid-dispatch, which aborts the rest of the emit walk.
pub type Callback = Rc<dyn Fn(NodeId, &ParseTree) -> crate::error::Result<()>>;

/// A handle to a [`Rule`] inside a [`RuleSet`]. Cheap to copy; stays valid
/// for the lifetime of the `RuleSet` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(usize);

/// The way a `T_OR` rule resolves when more than one alternative matches
/// starting from the same cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrPolicy {
    /// Take the first alternative (in declaration order) that matches.
    /// Only this policy can short-circuit — the others must try every
    /// alternative to compare them.
    #[default]
    First,
    /// Keep the alternative whose match consumed the most characters.
    Longest,
    /// Keep the alternative whose match consumed the fewest characters.
    Shortest,
    /// Keep the alternative that produced the deepest subtree.
    Deepest,
    /// Keep the alternative that produced the shallowest subtree.
    Shallowest,
}

/// A positional reference from a composite rule (`AND`/`OR`) to another
/// rule, carrying the `[x]`-optional and `x*`-recursive markers parsed out
/// of the symbol string at rule-creation time, plus its own callback slot.
#[derive(Clone)]
pub struct SubRuleRef {
    target_name: String,
    resolved: Option<RuleId>,
    optional: bool,
    recursive: bool,
    callback: Option<Callback>,
}

impl SubRuleRef {
    /// Parses a symbol such as `"term"`, `"[op1]"`, or `"[op1_term]*"`.
    fn parse(symbol: &str) -> Self {
        let optional = symbol.starts_with('[');
        let recursive = symbol.ends_with('*');
        let mut name = symbol;
        if let Some(stripped) = name.strip_suffix('*') {
            name = stripped;
        }
        if let Some(stripped) = name.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            name = stripped;
        }
        Self {
            target_name: name.to_string(),
            resolved: None,
            optional,
            recursive,
            callback: None,
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn resolved(&self) -> Option<RuleId> {
        self.resolved
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }
}

/// The body of a [`Rule`]: what kind it is and, for composite rules, its
/// ordered sub-rule slots.
#[derive(Clone)]
pub enum RuleBody {
    Token,
    And(Vec<SubRuleRef>),
    Or(Vec<SubRuleRef>, OrPolicy),
}

/// A named production: a terminal (`TOKEN`), a sequence (`AND`), or an
/// alternation (`OR`).
#[derive(Clone)]
pub struct Rule {
    name: String,
    body: RuleBody,
    callback: Option<Callback>,
    is_top: bool,
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &RuleBody {
        &self.body
    }

    pub fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    pub fn is_top(&self) -> bool {
        self.is_top
    }

    pub fn is_token(&self) -> bool {
        matches!(self.body, RuleBody::Token)
    }

    /// Sub-rule slots for `AND`/`OR` rules; empty for `TOKEN` rules.
    pub fn sub_rules(&self) -> &[SubRuleRef] {
        match &self.body {
            RuleBody::Token => &[],
            RuleBody::And(subs) | RuleBody::Or(subs, _) => subs,
        }
    }

    pub fn or_policy(&self) -> OrPolicy {
        match &self.body {
            RuleBody::Or(_, policy) => *policy,
            _ => OrPolicy::First,
        }
    }

    /// True iff a sub-rule slot names `target`.
    fn contains(&self, target: &str) -> bool {
        self.sub_rules().iter().any(|s| s.target_name() == target)
    }
}

/// The grammar: named rules plus a finalized/checked flag, a connected
/// flag, and the designated top rule. Build it with `create_token`/
/// `create_and`/`create_or`, then call [`RuleSet::check`] once before
/// handing it to a [`crate::parser::Parser`].
#[derive(Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    index: HashMap<String, RuleId>,
    checked: bool,
    connected: bool,
    top: Option<RuleId>,
}

impl RuleSet {
    /// A fresh, empty grammar with one rule already present: a `TOKEN` rule
    /// named `"EOF"`. Every [`crate::token::Tokenizer`] always appends an
    /// `EOF` sentinel token, so grammars can reference `"EOF"` as an
    /// ordinary sub-rule name (as the generated `expression := expr "EOF"`
    /// rule does) without separately registering a [`TokenSpec`] for it.
    pub fn new() -> Self {
        let mut rules = Self::default();
        rules.insert(Rule {
            name: "EOF".to_string(),
            body: RuleBody::Token,
            callback: None,
            is_top: false,
        });
        rules
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn top_rule(&self) -> Option<RuleId> {
        self.top
    }

    pub fn find(&self, name: &str) -> Option<RuleId> {
        self.index.get(name).copied()
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    fn insert(&mut self, rule: Rule) -> RuleId {
        let id = RuleId(self.rules.len());
        self.index.insert(rule.name.clone(), id);
        self.rules.push(rule);
        self.checked = false;
        id
    }

    pub fn create_token(&mut self, spec: &TokenSpec) -> RuleId {
        self.insert(Rule {
            name: spec.name().to_string(),
            body: RuleBody::Token,
            callback: None,
            is_top: false,
        })
    }

    pub fn add_tokens(&mut self, specs: &[TokenSpec]) {
        for spec in specs {
            self.create_token(spec);
        }
    }

    pub fn create_and(&mut self, name: &str, symbols: &[&str]) -> RuleId {
        let subs = symbols.iter().map(|s| SubRuleRef::parse(s)).collect();
        self.insert(Rule {
            name: name.to_string(),
            body: RuleBody::And(subs),
            callback: None,
            is_top: false,
        })
    }

    pub fn create_or(&mut self, name: &str, symbols: &[&str]) -> RuleId {
        self.create_or_with_policy(name, OrPolicy::First, symbols)
    }

    pub fn create_or_with_policy(
        &mut self,
        name: &str,
        policy: OrPolicy,
        symbols: &[&str],
    ) -> RuleId {
        let subs = symbols.iter().map(|s| SubRuleRef::parse(s)).collect();
        self.insert(Rule {
            name: name.to_string(),
            body: RuleBody::Or(subs, policy),
            callback: None,
            is_top: false,
        })
    }

    pub fn connect(
        &mut self,
        name: &str,
        f: impl Fn(NodeId, &ParseTree) -> Result<()> + 'static,
    ) -> Result<()> {
        let id = self.require(name)?;
        self.rules[id.0].callback = Some(Rc::new(f));
        self.connected = true;
        Ok(())
    }

    pub fn connect_sub(
        &mut self,
        name: &str,
        idx: usize,
        f: impl Fn(NodeId, &ParseTree) -> Result<()> + 'static,
    ) -> Result<()> {
        let id = self.require(name)?;
        let rule = &mut self.rules[id.0];
        let subs = match &mut rule.body {
            RuleBody::And(subs) | RuleBody::Or(subs, _) => subs,
            RuleBody::Token => {
                return Err(SyntakError::InvariantBroken(format!(
                    "rule '{}' is a TOKEN rule and has no sub-rule slots",
                    name
                )))
            }
        };
        if idx >= subs.len() {
            return Err(SyntakError::InvariantBroken(format!(
                "rule '{}' has no sub-rule slot {}",
                name, idx
            )));
        }
        subs[idx].callback = Some(Rc::new(f));
        self.connected = true;
        Ok(())
    }

    fn require(&self, name: &str) -> Result<RuleId> {
        self.find(name)
            .ok_or_else(|| SyntakError::UnknownRule(name.to_string()))
    }

    /// Resolves every sub-rule's target name to a concrete [`RuleId`] and
    /// identifies the unique top rule. Idempotent: calling it again after
    /// a successful check is a no-op.
    pub fn check(&mut self) -> Result<()> {
        if self.checked {
            return Ok(());
        }

        for i in 0..self.rules.len() {
            let sub_count = self.rules[i].sub_rules().len();
            for j in 0..sub_count {
                let target = self.rules[i].sub_rules()[j].target_name().to_string();
                let resolved = self
                    .find(&target)
                    .ok_or_else(|| SyntakError::UnknownRule(target.clone()))?;
                match &mut self.rules[i].body {
                    RuleBody::And(subs) | RuleBody::Or(subs, _) => {
                        subs[j].resolved = Some(resolved);
                    }
                    RuleBody::Token => unreachable!("token rules have no sub-rules"),
                }
            }
        }

        let mut candidates = Vec::new();
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.is_token() {
                continue;
            }
            let referenced = self
                .rules
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && other.contains(&rule.name));
            if !referenced {
                candidates.push(RuleId(i));
            }
        }

        match candidates.as_slice() {
            [only] => {
                self.top = Some(*only);
                self.rules[only.0].is_top = true;
            }
            _ => return Err(SyntakError::NoTopRule),
        }

        self.checked = true;
        log::debug!(
            "grammar checked: {} rules, top = '{}'",
            self.rules.len(),
            self.rules[self.top.unwrap().0].name()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(name: &str, s: &str) -> TokenSpec {
        TokenSpec::fixed(name, s)
    }

    #[test]
    fn subrule_markers_are_parsed_from_symbol_syntax() {
        let sub = SubRuleRef::parse("[op1_term]*");
        assert_eq!(sub.target_name(), "op1_term");
        assert!(sub.is_optional());
        assert!(sub.is_recursive());

        let sub = SubRuleRef::parse("term");
        assert_eq!(sub.target_name(), "term");
        assert!(!sub.is_optional());
        assert!(!sub.is_recursive());
    }

    #[test]
    fn check_resolves_subrules_and_finds_top() {
        let mut rules = RuleSet::new();
        rules.create_token(&tok("a", "a"));
        rules.create_token(&tok("b", "b"));
        rules.create_and("ab", &["a", "b"]);
        rules.check().unwrap();

        let top = rules.top_rule().unwrap();
        assert_eq!(rules.rule(top).name(), "ab");
        let ab = rules.rule(top);
        assert!(ab.sub_rules()[0].resolved().is_some());
    }

    #[test]
    fn check_fails_on_unknown_subrule() {
        let mut rules = RuleSet::new();
        rules.create_token(&tok("a", "a"));
        rules.create_and("ab", &["a", "ghost"]);
        let err = rules.check().unwrap_err();
        assert_eq!(err, SyntakError::UnknownRule("ghost".to_string()));
    }

    #[test]
    fn check_fails_when_no_unique_top_rule_exists() {
        let mut rules = RuleSet::new();
        rules.create_token(&tok("a", "a"));
        rules.create_and("x", &["a"]);
        rules.create_and("y", &["a"]);
        // neither x nor y is referenced, so there are two candidates
        let err = rules.check().unwrap_err();
        assert_eq!(err, SyntakError::NoTopRule);
    }

    #[test]
    fn connecting_a_rule_marks_the_grammar_connected() {
        let mut rules = RuleSet::new();
        rules.create_token(&tok("a", "a"));
        rules.create_and("top", &["a"]);
        assert!(!rules.is_connected());
        rules.connect("top", |_id, _tree| Ok(())).unwrap();
        assert!(rules.is_connected());
    }
}
