use std::rc::Rc;

use crate::error::{Result, SyntakError};
use crate::grammar::{OrPolicy, Rule, RuleBody, RuleId, RuleSet, SubRuleRef};
use crate::node::{reduce_tree as reduce_tree_impl, Draft, NodeId, ParseTree};
use crate::token::{ParsedToken, TokenSpec, Tokenizer};

const DEFAULT_MAX_DEPTH: usize = 1000;

/// The recursive-descent engine: tokenizes with a [`Tokenizer`], walks a
/// checked [`RuleSet`] against the resulting tokens, and produces a
/// [`ParseTree`]. After a successful parse, if the grammar has any
/// callbacks registered, dispatches them depth-first post-order.
pub struct Parser {
    tokenizer: Option<Tokenizer>,
    rules: Option<Rc<RuleSet>>,
    max_depth: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            tokenizer: None,
            rules: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn set_tokens(&mut self, specs: Vec<TokenSpec>) {
        self.tokenizer = Some(Tokenizer::new(specs));
    }

    pub fn set_tokenizer(&mut self, tokenizer: Tokenizer) {
        self.tokenizer = Some(tokenizer);
    }

    /// Checks `rules` (see [`RuleSet::check`]) and adopts it. Fails with
    /// whatever [`RuleSet::check`] fails with if the grammar is ill-formed.
    pub fn set_rules(&mut self, mut rules: RuleSet) -> Result<()> {
        rules.check()?;
        self.rules = Some(Rc::new(rules));
        Ok(())
    }

    /// Overrides the recursion-depth guard (default 1000). A grammar
    /// nesting deeper than this on some input raises
    /// [`SyntakError::TooNested`] instead of overflowing the native call
    /// stack.
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }

    pub fn rules(&self) -> Option<&RuleSet> {
        self.rules.as_deref()
    }

    /// Tokenizes `text` and parses it against the top rule of the grammar
    /// set via [`Parser::set_rules`]. Fails with [`SyntakError::NoTopRule`]
    /// if no grammar (or one without a unique top rule) has been set, and
    /// with [`SyntakError::NoParse`] if the top rule does not match the
    /// whole input.
    pub fn parse(&self, text: &str) -> Result<ParseTree> {
        let tokenizer = self.tokenizer.as_ref().ok_or_else(|| {
            SyntakError::InvariantBroken("Parser::parse called before set_tokens".to_string())
        })?;
        let rules = self.rules.clone().ok_or(SyntakError::NoTopRule)?;
        let top = rules.top_rule().ok_or(SyntakError::NoTopRule)?;

        let tokens = tokenizer.tokenize(text)?;
        log::debug!(
            "parser: {} tokens, top rule '{}'",
            tokens.len(),
            rules.rule(top).name()
        );

        let mut cursor = 0usize;
        let draft = parse_rule(&rules, &tokens, text, &mut cursor, top, 0, self.max_depth)?
            .ok_or(SyntakError::NoParse)?;

        let mut nodes = Vec::new();
        let root = draft.flatten(&mut nodes);
        let source: Rc<str> = Rc::from(text);
        let mut tree = ParseTree::new(nodes, root, source, rules.clone());

        if rules.is_connected() {
            emit_nodes(&mut tree, root, None)?;
        }

        Ok(tree)
    }

    /// Collapses every chain of single-child nodes in `tree` down to its
    /// deepest single descendant, preserving multi-child nodes and the
    /// root's own identity. See [`crate::node::reduce_tree`].
    pub fn reduce_tree(&self, tree: &ParseTree) -> ParseTree {
        reduce_tree_impl(tree)
    }
}

/// A rule's captured length is the span from its start position to the
/// cursor's position once the rule finishes, with any trailing whitespace
/// trimmed off — mirrors the original's `Parser::Private::lengthSince`,
/// which walks back over trailing `isSpace()` characters in the source
/// rather than aggregating the lengths of whatever children happened to
/// match. This matters because a trailing sentinel (the `EOF` token) has
/// zero width but sits at the very end of the source, past any trailing
/// whitespace, and must not inflate its ancestors' reported length.
fn trimmed_length(text: &str, start: usize, tokens: &[ParsedToken], cursor: usize) -> usize {
    let raw_end = tokens[cursor].pos().offset();
    text[start..raw_end].trim_end().len()
}

fn parse_rule(
    rules: &RuleSet,
    tokens: &[ParsedToken],
    text: &str,
    cursor: &mut usize,
    rule_id: RuleId,
    depth: usize,
    max_depth: usize,
) -> Result<Option<Draft>> {
    if depth > max_depth {
        return Err(SyntakError::TooNested);
    }
    let rule = rules.rule(rule_id);
    let start_pos = tokens[*cursor].pos();

    match rule.body() {
        RuleBody::Token => Ok(parse_token(rule, tokens, cursor, rule_id, start_pos)),
        RuleBody::And(subs) => {
            parse_and(rules, tokens, text, cursor, rule_id, subs, start_pos, depth, max_depth)
        }
        RuleBody::Or(subs, policy) => parse_or(
            rules, tokens, text, cursor, rule_id, subs, *policy, start_pos, depth, max_depth,
        ),
    }
}

fn parse_token(
    rule: &Rule,
    tokens: &[ParsedToken],
    cursor: &mut usize,
    rule_id: RuleId,
    start_pos: crate::pos::SourcePosition,
) -> Option<Draft> {
    let current = &tokens[*cursor];
    if current.name() != rule.name() {
        return None;
    }
    let length = current.text().len();
    if *cursor + 1 < tokens.len() {
        *cursor += 1;
    }
    Some(Draft::leaf(rule_id, start_pos, length))
}

fn parse_and(
    rules: &RuleSet,
    tokens: &[ParsedToken],
    text: &str,
    cursor: &mut usize,
    rule_id: RuleId,
    subs: &[SubRuleRef],
    start_pos: crate::pos::SourcePosition,
    depth: usize,
    max_depth: usize,
) -> Result<Option<Draft>> {
    let saved = *cursor;
    let mut children = Vec::with_capacity(subs.len());

    for sub in subs {
        let target = sub.resolved().expect("grammar was checked before parsing");
        match parse_rule(rules, tokens, text, cursor, target, depth + 1, max_depth)? {
            Some(first) => {
                children.push(first);
                if sub.is_recursive() {
                    loop {
                        let before = *cursor;
                        match parse_rule(rules, tokens, text, cursor, target, depth + 1, max_depth)? {
                            Some(more) => children.push(more),
                            None => {
                                *cursor = before;
                                break;
                            }
                        }
                    }
                }
            }
            None => {
                if sub.is_optional() {
                    continue;
                }
                *cursor = saved;
                return Ok(None);
            }
        }
    }

    let length = trimmed_length(text, start_pos.offset(), tokens, *cursor);
    Ok(Some(Draft::branch(rule_id, start_pos, length, children)))
}

fn parse_or(
    rules: &RuleSet,
    tokens: &[ParsedToken],
    text: &str,
    cursor: &mut usize,
    rule_id: RuleId,
    subs: &[SubRuleRef],
    policy: OrPolicy,
    start_pos: crate::pos::SourcePosition,
    depth: usize,
    max_depth: usize,
) -> Result<Option<Draft>> {
    let saved = *cursor;

    if policy == OrPolicy::First {
        for sub in subs {
            *cursor = saved;
            let target = sub.resolved().expect("grammar was checked before parsing");
            if let Some(child) = parse_rule(rules, tokens, text, cursor, target, depth + 1, max_depth)? {
                let length = trimmed_length(text, start_pos.offset(), tokens, *cursor);
                return Ok(Some(Draft::branch(rule_id, start_pos, length, vec![child])));
            }
        }
        *cursor = saved;
        return Ok(None);
    }

    // Non-FIRST policies must try every alternative from the same cursor
    // and compare the candidates, so none of them can short-circuit.
    let mut candidates: Vec<(Draft, usize)> = Vec::new();
    for sub in subs {
        *cursor = saved;
        let target = sub.resolved().expect("grammar was checked before parsing");
        if let Some(child) = parse_rule(rules, tokens, text, cursor, target, depth + 1, max_depth)? {
            candidates.push((child, *cursor));
        }
    }

    if candidates.is_empty() {
        *cursor = saved;
        return Ok(None);
    }

    // First-wins tie-break: only replace `best` on a strictly better
    // candidate, never on an equal one.
    let mut best = 0usize;
    for i in 1..candidates.len() {
        let better = match policy {
            OrPolicy::Longest => candidates[i].0.span() > candidates[best].0.span(),
            OrPolicy::Shortest => candidates[i].0.span() < candidates[best].0.span(),
            OrPolicy::Deepest => candidates[i].0.depth() > candidates[best].0.depth(),
            OrPolicy::Shallowest => candidates[i].0.depth() < candidates[best].0.depth(),
            OrPolicy::First => unreachable!("handled above"),
        };
        if better {
            best = i;
        }
    }

    let (winner, winner_cursor) = candidates
        .into_iter()
        .nth(best)
        .expect("candidates is non-empty");
    *cursor = winner_cursor;
    let length = trimmed_length(text, start_pos.offset(), tokens, *cursor);
    Ok(Some(Draft::branch(rule_id, start_pos, length, vec![winner])))
}

/// Depth-first post-order callback dispatch: children always emit before
/// their parent, siblings left to right. For each node, first its own
/// rule's callback fires (if any), then — if it has a parent — every one
/// of the parent's sub-rule slots whose name matches this node gets its
/// own callback fired too (a rule can reference the same sub-rule name in
/// more than one slot, each wired to a different callback).
fn emit_nodes(tree: &mut ParseTree, id: NodeId, parent: Option<NodeId>) -> Result<()> {
    let children: Vec<NodeId> = tree.children(id).to_vec();
    for child in children {
        emit_nodes(tree, child, Some(id))?;
    }

    if let Some(cb) = tree.rule(id).callback().cloned() {
        cb(id, &*tree)?;
    }

    if let Some(parent_id) = parent {
        let name = tree.name(id).to_string();
        let sub_callbacks: Vec<_> = tree
            .rule(parent_id)
            .sub_rules()
            .iter()
            .filter(|s| s.target_name() == name)
            .filter_map(|s| s.callback())
            .cloned()
            .collect();
        for cb in sub_callbacks {
            cb(id, &*tree)?;
        }
    }

    tree.mark_emitted(id);
    Ok(())
}
