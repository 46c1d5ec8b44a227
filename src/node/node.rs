use std::rc::Rc;

use crate::grammar::{Rule, RuleId, RuleSet};
use crate::pos::SourcePosition;

/// A handle into a [`ParseTree`]'s arena. Cheap to copy; only meaningful
/// together with the `ParseTree` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// One node of a parse tree: a backing rule, the source span it captured,
/// its ordered children, and a non-owning back-reference to its parent.
///
/// Stored in a flat arena (`ParseTree::nodes`) addressed by [`NodeId`]
/// rather than linked via pointers — the original C++ implementation wires
/// parent and child pointers directly into the node and has to manage their
/// lifetime by hand; an index into a `Vec` sidesteps that entirely and
/// drops for free with the arena.
#[derive(Debug, Clone)]
pub struct ParseNode {
    rule: RuleId,
    pos: SourcePosition,
    length: usize,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    emitted: bool,
}

/// A fully parsed tree: the node arena, the source text it was parsed
/// from, and the rule set that produced it (kept around so nodes can look
/// up their own rule name).
#[derive(Clone)]
pub struct ParseTree {
    nodes: Vec<ParseNode>,
    root: NodeId,
    source: Rc<str>,
    rules: Rc<RuleSet>,
}

impl ParseTree {
    pub(crate) fn new(nodes: Vec<ParseNode>, root: NodeId, source: Rc<str>, rules: Rc<RuleSet>) -> Self {
        Self { nodes, root, source, rules }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> &ParseNode {
        &self.nodes[id.0]
    }

    pub fn rule(&self, id: NodeId) -> &Rule {
        self.rules.rule(self.node(id).rule)
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.rule(id).name()
    }

    pub fn pos(&self, id: NodeId) -> SourcePosition {
        self.node(id).pos
    }

    pub fn length(&self, id: NodeId) -> usize {
        self.node(id).length
    }

    pub fn text(&self, id: NodeId) -> &str {
        let n = self.node(id);
        let start = n.pos.offset();
        &self.source[start..start + n.length]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).children.is_empty()
    }

    pub fn is_emitted(&self, id: NodeId) -> bool {
        self.node(id).emitted
    }

    pub(crate) fn mark_emitted(&mut self, id: NodeId) {
        self.nodes[id.0].emitted = true;
    }

    /// Depth of the subtree rooted at `id`: a leaf is `0`, and every other
    /// node is `1 + max(child levels)`.
    pub fn num_child_levels(&self, id: NodeId) -> usize {
        self.children(id)
            .iter()
            .map(|&c| self.num_child_levels(c) + 1)
            .max()
            .unwrap_or(0)
    }

    /// A convenience view bundling this tree with one of its nodes, for
    /// call sites that want `view.text()` instead of `tree.text(id)`.
    pub fn view(&self, id: NodeId) -> NodeView<'_> {
        NodeView { tree: self, id }
    }

    /// A parenthesized rendering of the subtree rooted at `id`, e.g.
    /// `(expr (term (num 1)) (op1_term + (num 2)))`. With `with_content`,
    /// each node's captured text is inlined; with `with_line_breaks`, each
    /// child starts on its own indented line instead of being packed onto
    /// one line.
    pub fn to_bracket_string(&self, id: NodeId, with_content: bool, with_line_breaks: bool) -> String {
        let mut out = String::new();
        self.write_bracket_string(id, with_content, with_line_breaks, 0, &mut out);
        out
    }

    fn write_bracket_string(
        &self,
        id: NodeId,
        with_content: bool,
        with_line_breaks: bool,
        depth: usize,
        out: &mut String,
    ) {
        if with_line_breaks && depth > 0 {
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
        }
        out.push('(');
        out.push_str(self.name(id));
        if with_content {
            out.push(' ');
            out.push_str(self.text(id));
        }
        for &child in self.children(id) {
            if !with_line_breaks {
                out.push(' ');
            }
            self.write_bracket_string(child, with_content, with_line_breaks, depth + 1, out);
        }
        out.push(')');
    }
}

/// A `ParseTree` paired with one of its [`NodeId`]s, for ergonomic
/// navigation without repeating the tree argument at every call.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    tree: &'a ParseTree,
    id: NodeId,
}

impl<'a> NodeView<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        self.tree.name(self.id)
    }

    pub fn text(&self) -> &'a str {
        self.tree.text(self.id)
    }

    pub fn pos(&self) -> SourcePosition {
        self.tree.pos(self.id)
    }

    pub fn length(&self) -> usize {
        self.tree.length(self.id)
    }

    pub fn is_leaf(&self) -> bool {
        self.tree.is_leaf(self.id)
    }

    pub fn parent(&self) -> Option<NodeView<'a>> {
        self.tree.parent(self.id).map(|p| self.tree.view(p))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeView<'a>> + 'a {
        let tree = self.tree;
        tree.children(self.id).iter().map(move |&c| tree.view(c))
    }

    pub fn child(&self, idx: usize) -> Option<NodeView<'a>> {
        self.tree.children(self.id).get(idx).map(|&c| self.tree.view(c))
    }
}

/// An owned, freely-droppable draft of a node built up during a single
/// backtracking parse attempt. Candidate subtrees that lose an `OR`
/// resolution, or that belong to a failed `AND` attempt, are simply never
/// attached anywhere and get dropped by ordinary Rust ownership — there is
/// no arena bookkeeping to undo, unlike the original's manual
/// `new`/`delete` tree management.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    pub rule: RuleId,
    pub pos: SourcePosition,
    pub length: usize,
    pub children: Vec<Draft>,
}

impl Draft {
    pub fn leaf(rule: RuleId, pos: SourcePosition, length: usize) -> Self {
        Self {
            rule,
            pos,
            length,
            children: Vec::new(),
        }
    }

    /// `length` is supplied by the caller rather than derived from the
    /// children's own spans: the original computes a rule's length from
    /// the parser's cursor position at the moment the rule finishes
    /// (`Parser::Private::lengthSince`), trimmed of trailing whitespace, not
    /// by aggregating children — the difference matters because the last
    /// child of an `AND` rule can be a zero-width sentinel (the `EOF` token)
    /// sitting past any trailing whitespace in the source.
    pub fn branch(rule: RuleId, pos: SourcePosition, length: usize, children: Vec<Draft>) -> Self {
        Self {
            rule,
            pos,
            length,
            children,
        }
    }

    /// Total span consumed by this subtree; used to compare `OR`
    /// candidates under [`crate::grammar::OrPolicy::Longest`] /
    /// [`crate::grammar::OrPolicy::Shortest`].
    pub fn span(&self) -> usize {
        self.length
    }

    /// Nesting depth of this subtree; used to compare `OR` candidates
    /// under [`crate::grammar::OrPolicy::Deepest`] /
    /// [`crate::grammar::OrPolicy::Shallowest`].
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Flattens this draft into `dst`, assigning sequential `NodeId`s and
    /// back-filling parent references. Returns the id assigned to `self`.
    pub fn flatten(&self, dst: &mut Vec<ParseNode>) -> NodeId {
        let mut child_ids = Vec::with_capacity(self.children.len());
        for child in &self.children {
            child_ids.push(child.flatten(dst));
        }
        let id = NodeId(dst.len());
        dst.push(ParseNode {
            rule: self.rule,
            pos: self.pos,
            length: self.length,
            children: child_ids.clone(),
            parent: None,
            emitted: false,
        });
        for c in child_ids {
            dst[c.0].parent = Some(id);
        }
        id
    }
}

/// Builds the `(expr (term (num 1)))`-collapsed variant of `tree`: every
/// chain of single-child nodes is collapsed down to its deepest single
/// descendant, while nodes with zero or more-than-one children are kept
/// and recursed into. Mirrors the original's `Parser::reduceTree`, which
/// always keeps the root's own identity and only collapses chains among
/// its descendants.
pub fn reduce_tree(tree: &ParseTree) -> ParseTree {
    let mut dst = Vec::with_capacity(tree.len());
    let new_root = reduce_node(tree, tree.root(), &mut dst);
    ParseTree {
        nodes: dst,
        root: new_root,
        source: tree.source.clone(),
        rules: tree.rules.clone(),
    }
}

fn find_chain_target(tree: &ParseTree, mut id: NodeId) -> NodeId {
    loop {
        let children = tree.children(id);
        if children.len() == 1 {
            id = children[0];
        } else {
            return id;
        }
    }
}

fn reduce_node(tree: &ParseTree, id: NodeId, dst: &mut Vec<ParseNode>) -> NodeId {
    let mut new_children = Vec::new();
    for &c in tree.children(id) {
        let target = find_chain_target(tree, c);
        new_children.push(reduce_node(tree, target, dst));
    }
    let n = tree.node(id);
    let new_id = NodeId(dst.len());
    dst.push(ParseNode {
        rule: n.rule,
        pos: n.pos,
        length: n.length,
        children: new_children.clone(),
        parent: None,
        emitted: n.emitted,
    });
    for c in new_children {
        dst[c.0].parent = Some(new_id);
    }
    new_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::RuleSet;
    use crate::token::TokenSpec;

    fn sample_tree() -> (ParseTree, RuleId, RuleId, RuleId) {
        let mut rules = RuleSet::new();
        let num = rules.create_token(&TokenSpec::regex("num", "[0-9]+"));
        let chain = rules.create_and("chain", &["num"]);
        let top = rules.create_and("top", &["chain"]);
        rules.check().unwrap();
        let rules = Rc::new(rules);

        // top -> chain -> num("1")
        let leaf = Draft::leaf(num, SourcePosition::start(), 1);
        let chain_draft = Draft::branch(chain, SourcePosition::start(), 1, vec![leaf]);
        let top_draft = Draft::branch(top, SourcePosition::start(), 1, vec![chain_draft]);

        let mut nodes = Vec::new();
        let root = top_draft.flatten(&mut nodes);
        let tree = ParseTree::new(nodes, root, Rc::from("1"), rules);
        (tree, top, chain, num)
    }

    #[test]
    fn text_is_sliced_from_pos_and_length() {
        let (tree, ..) = sample_tree();
        assert_eq!(tree.text(tree.root()), "1");
    }

    #[test]
    fn num_child_levels_counts_the_deepest_path() {
        let (tree, ..) = sample_tree();
        // top -> chain -> num: two levels below the root.
        assert_eq!(tree.num_child_levels(tree.root()), 2);
    }

    #[test]
    fn reduce_tree_collapses_the_single_child_chain() {
        let (tree, top, _chain, num) = sample_tree();
        let reduced = reduce_tree(&tree);
        // root keeps its own identity ("top")...
        assert_eq!(reduced.rule(reduced.root()).name(), tree.rules.rule(top).name());
        // ...but its single child skips straight to the "num" leaf.
        let children = reduced.children(reduced.root());
        assert_eq!(children.len(), 1);
        assert_eq!(reduced.rule(children[0]).name(), tree.rules.rule(num).name());
        assert!(reduced.is_leaf(children[0]));
    }

    #[test]
    fn to_bracket_string_nests_by_name() {
        let (tree, ..) = sample_tree();
        assert_eq!(tree.to_bracket_string(tree.root(), false, false), "(top (chain (num)))");
    }

    #[test]
    fn view_navigates_parent_and_children() {
        let (tree, ..) = sample_tree();
        let root = tree.view(tree.root());
        let chain = root.children().next().unwrap();
        assert_eq!(chain.parent().unwrap().id(), root.id());
        let leaf = chain.child(0).unwrap();
        assert_eq!(leaf.text(), "1");
        assert!(leaf.is_leaf());
    }
}
