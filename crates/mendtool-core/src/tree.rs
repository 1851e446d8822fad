//! Program tree model.
//!
//! A [`Tree`] is an arena of [`NodeData`] addressed by [`NodeId`]. The first
//! node added is the root. Every non-root node has exactly one parent, set by
//! [`Tree::add_child`]. Subtrees are never shared between trees: reuse goes
//! through [`Tree::copy_subtree`], which clones the nodes into a fresh arena
//! and rebases their spans onto the copied text.
//!
//! The tree keeps the source it was built from. Nodes carry byte spans into
//! that source, and `value_spans` pointing at the token(s) that spell their
//! `value` (an identifier, a literal, an operator). Rendering a modified
//! fragment is a matter of splicing replacement text over those spans.
//!
//! ## Shape hash
//!
//! [`Tree::shape_hash`] digests kind, value, and the shapes of all children,
//! ignoring positions. Two subtrees with equal shape hashes are structurally
//! interchangeable. Hashes are memoized per node.

use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{ContentHash, Span};

// ============================================================================
// Identifiers and Classification
// ============================================================================

/// Index of a node within its tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Coarse syntactic category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Unit,
    Declaration,
    Statement,
    Expression,
    Type,
    Name,
    Literal,
    Other,
}

/// What a name refers to, as resolved by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Variable,
    Field,
    Method,
    Type,
    Constructor,
    Package,
    Unresolved,
}

impl Role {
    /// Variables and fields are both value-carrying names and may stand in
    /// for one another when binding.
    pub fn is_value(self) -> bool {
        matches!(self, Role::Variable | Role::Field | Role::Unresolved)
    }
}

/// Which named slot of its parent's production a node fills.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotDesc {
    pub parent_kind: String,
    pub name: String,
    /// Whether the slot holds a list of children or a single child.
    pub list: bool,
}

impl SlotDesc {
    pub fn new(parent_kind: impl Into<String>, name: impl Into<String>, list: bool) -> Self {
        SlotDesc {
            parent_kind: parent_kind.into(),
            name: name.into(),
            list,
        }
    }

    pub fn is(&self, parent_kind: &str, name: &str) -> bool {
        self.parent_kind == parent_kind && self.name == name
    }
}

impl fmt::Display for SlotDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.parent_kind, self.name)?;
        if self.list {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

// ============================================================================
// Node Data
// ============================================================================

/// One syntax element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    /// Production name, e.g. `InfixExpression`.
    pub kind: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Literal value: identifier, literal text, or operator token.
    #[serde(default)]
    pub value: String,
    /// Resolved static type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    pub span: Span,
    /// Where `value` is spelled in the source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_spans: Vec<Span>,
    /// Span of an elided statement wrapper (an expression statement
    /// including its terminator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<Span>,
    pub start_line: u32,
    pub end_line: u32,
    /// Ordinal position among the parent's children.
    pub position: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotDesc>,
    #[serde(default)]
    pub statement: bool,
    #[serde(default)]
    pub declaration: bool,
    /// Opens a lexical scope for local declarations.
    #[serde(default)]
    pub scope: bool,
    /// A template leaf whose concrete value is abstract and rebound on use.
    #[serde(default)]
    pub normalized: bool,
}

impl NodeData {
    /// Create a node with the given kind and span. Lines default to 0 and
    /// are filled by the builder.
    pub fn new(kind: impl Into<String>, category: Category, span: Span) -> Self {
        NodeData {
            kind: kind.into(),
            category,
            role: None,
            value: String::new(),
            declared_type: None,
            span,
            value_spans: Vec::new(),
            wrapper: None,
            start_line: 0,
            end_line: 0,
            position: 0,
            parent: None,
            children: Vec::new(),
            slot: None,
            statement: category == Category::Statement,
            declaration: category == Category::Declaration,
            scope: false,
            normalized: false,
        }
    }

    /// `kind::value`, the label used in reports and update matching.
    pub fn label(&self) -> String {
        format!("{}::{}", self.kind, self.value)
    }

    pub fn is_name(&self) -> bool {
        self.category == Category::Name
    }

    pub fn slot_is(&self, parent_kind: &str, name: &str) -> bool {
        self.slot.as_ref().is_some_and(|s| s.is(parent_kind, name))
    }

    /// The span a statement occupies, including an elided wrapper.
    pub fn statement_span(&self) -> Span {
        self.wrapper.unwrap_or(self.span)
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Arena of nodes over one source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "TreeRepr")]
pub struct Tree {
    source: String,
    nodes: Vec<NodeData>,
    /// Declared type name -> direct supertypes, for types declared in this
    /// source.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    supertypes: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    shapes: Vec<OnceCell<ContentHash>>,
}

/// Serialized form; memo cells are rebuilt on load.
#[derive(Deserialize)]
struct TreeRepr {
    source: String,
    nodes: Vec<NodeData>,
    #[serde(default)]
    supertypes: BTreeMap<String, Vec<String>>,
}

impl From<TreeRepr> for Tree {
    fn from(repr: TreeRepr) -> Self {
        let shapes = repr.nodes.iter().map(|_| OnceCell::new()).collect();
        Tree {
            source: repr.source,
            nodes: repr.nodes,
            supertypes: repr.supertypes,
            shapes,
        }
    }
}

impl Tree {
    pub fn new(source: impl Into<String>) -> Self {
        Tree {
            source: source.into(),
            nodes: Vec::new(),
            supertypes: BTreeMap::new(),
            shapes: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root node. Trees built by front ends and copies are never empty.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Append a detached node to the arena.
    pub fn add_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(data);
        self.shapes.push(OnceCell::new());
        id
    }

    /// Attach `child` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        let position = self.nodes[parent.index()].children.len();
        {
            let node = &mut self.nodes[child.index()];
            node.parent = Some(parent);
            node.position = position;
        }
        self.nodes[parent.index()].children.push(child);
        self.invalidate(parent);
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index())
    }

    /// Mutable access. Clears memoized shapes for the node and its ancestors.
    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        self.invalidate(id);
        &mut self.nodes[id.index()]
    }

    pub fn supertypes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.supertypes
    }

    pub fn add_supertype(&mut self, ty: impl Into<String>, supertype: impl Into<String>) {
        self.supertypes
            .entry(ty.into())
            .or_default()
            .push(supertype.into());
    }

    fn invalidate(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(n) = current {
            if let Some(cell) = self.shapes.get_mut(n.index()) {
                *cell = OnceCell::new();
            }
            current = self.nodes.get(n.index()).and_then(|d| d.parent);
        }
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn child_at(&self, id: NodeId, position: usize) -> Option<NodeId> {
        self.node(id).children.get(position).copied()
    }

    pub fn left_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let parent = node.parent?;
        node.position
            .checked_sub(1)
            .and_then(|p| self.child_at(parent, p))
    }

    pub fn right_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let parent = node.parent?;
        self.child_at(parent, node.position + 1)
    }

    /// Children of `id` that fill the named slot.
    pub fn children_in_slot(&self, id: NodeId, slot: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.node(*c).slot.as_ref().is_some_and(|s| s.name == slot))
            .collect()
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    /// Pre-order traversal of the subtree rooted at `id`, including `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// Nodes whose first line is `line`, in pre-order.
    pub fn nodes_starting_on(&self, line: u32) -> Vec<NodeId> {
        if self.is_empty() {
            return Vec::new();
        }
        self.descendants(self.root())
            .into_iter()
            .filter(|id| self.node(*id).start_line == line)
            .collect()
    }

    // ------------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------------

    pub fn text(&self, id: NodeId) -> &str {
        let span = self.node(id).span;
        self.source.get(span.start..span.end).unwrap_or("")
    }

    pub fn statement_text(&self, id: NodeId) -> &str {
        let span = self.node(id).statement_span();
        self.source.get(span.start..span.end).unwrap_or("")
    }

    pub fn label(&self, id: NodeId) -> String {
        self.node(id).label()
    }

    // ------------------------------------------------------------------------
    // Shape hash
    // ------------------------------------------------------------------------

    /// Structural digest of the subtree at `id`, ignoring positions.
    pub fn shape_hash(&self, id: NodeId) -> ContentHash {
        match self.shapes.get(id.index()) {
            Some(cell) => cell.get_or_init(|| self.compute_shape(id)).clone(),
            None => self.compute_shape(id),
        }
    }

    fn compute_shape(&self, id: NodeId) -> ContentHash {
        let node = self.node(id);
        let child_hashes: Vec<ContentHash> =
            node.children.iter().map(|c| self.shape_hash(*c)).collect();
        let mut fields: Vec<&str> = vec![&node.kind, &node.value];
        fields.extend(child_hashes.iter().map(|h| h.as_str()));
        ContentHash::of_fields(fields)
    }

    // ------------------------------------------------------------------------
    // Copy and edit
    // ------------------------------------------------------------------------

    /// Detached structural clone of the subtree at `id`.
    ///
    /// The copy owns the subtree's text (including an elided statement
    /// wrapper on the root) with all spans rebased onto it. The root keeps
    /// its slot descriptor so templates remember where they came from.
    pub fn copy_subtree(&self, id: NodeId) -> Tree {
        let root = self.node(id);
        let outer = root.statement_span();
        let base = outer.start as isize;
        let mut copy = Tree::new(self.source.get(outer.start..outer.end).unwrap_or(""));

        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(id, None)];
        while let Some((original, new_parent)) = stack.pop() {
            let data = self.node(original);
            let mut cloned = data.clone();
            cloned.children = Vec::new();
            cloned.parent = None;
            cloned.span = data.span.shifted(-base);
            cloned.value_spans = data.value_spans.iter().map(|s| s.shifted(-base)).collect();
            cloned.wrapper = data.wrapper.map(|w| w.shifted(-base));
            let start_line = root.start_line;
            cloned.start_line = data.start_line.saturating_sub(start_line) + 1;
            cloned.end_line = data.end_line.saturating_sub(start_line) + 1;
            let new_id = copy.add_node(cloned);
            match new_parent {
                Some(p) => copy.add_child(p, new_id),
                None => copy.node_mut(new_id).position = 0,
            }
            for child in data.children.iter().rev() {
                stack.push((*child, Some(new_id)));
            }
        }
        copy
    }

    /// Replace the value of `id`, rewriting every token that spells it and
    /// shifting spans that follow.
    pub fn replace_value(&mut self, id: NodeId, value: &str) {
        let mut spans = self.node(id).value_spans.clone();
        spans.sort_by(|a, b| b.start.cmp(&a.start));
        for span in spans {
            let delta = value.len() as isize - span.len() as isize;
            self.source.replace_range(span.start..span.end, value);
            for node in &mut self.nodes {
                node.span = shift_span(node.span, span, delta);
                for vs in &mut node.value_spans {
                    *vs = shift_span(*vs, span, delta);
                }
                node.wrapper = node.wrapper.map(|w| shift_span(w, span, delta));
            }
        }
        self.node_mut(id).value = value.to_string();
    }
}

/// Adjust `span` after the bytes of `edited` changed length by `delta`.
/// Offsets at or past the end of the edited region move; earlier ones stay.
fn shift_span(span: Span, edited: Span, delta: isize) -> Span {
    let moved = |o: usize| {
        if o >= edited.end {
            Span::point(o).shifted(delta).start
        } else {
            o
        }
    };
    Span::new(moved(span.start), moved(span.end))
}

/// Iterator over a node's ancestors.
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Sketch;

    fn comparison(source: &str, expr: &str) -> (Tree, NodeId) {
        let mut s = Sketch::new(source);
        let root = s.root();
        let infix = s.expr(root, "InfixExpression", expr, "");
        s.name(infix, "a", Role::Variable, Some("int"), "leftOperand");
        s.name(infix, "b", Role::Variable, Some("int"), "rightOperand");
        s.operator(infix);
        (s.finish(), infix)
    }

    mod shape_hash {
        use super::*;

        #[test]
        fn positions_do_not_matter() {
            let (t1, n1) = comparison("a == b;", "a == b");
            let (t2, n2) = comparison("  a   ==  b;", "a   ==  b");
            assert_eq!(t1.shape_hash(n1), t2.shape_hash(n2));
        }

        #[test]
        fn differing_leaf_changes_hash() {
            let (t1, n1) = comparison("a == b;", "a == b");
            let (t2, n2) = comparison("a != b;", "a != b");
            assert_ne!(t1.shape_hash(n1), t2.shape_hash(n2));
        }

        #[test]
        fn memo_cleared_by_mutation() {
            let (mut t, n) = comparison("a == b;", "a == b");
            let before = t.shape_hash(n);
            t.replace_value(n, "<=");
            assert_ne!(before, t.shape_hash(n));
        }
    }

    mod navigation {
        use super::*;

        #[test]
        fn siblings_by_position() {
            let (t, infix) = comparison("a == b;", "a == b");
            let left = t.child_at(infix, 0).unwrap();
            let right = t.child_at(infix, 1).unwrap();
            assert_eq!(t.right_sibling(left), Some(right));
            assert_eq!(t.left_sibling(right), Some(left));
            assert_eq!(t.left_sibling(left), None);
            assert!(t.is_ancestor_of(infix, left));
            assert_eq!(t.descendants(infix), vec![infix, left, right]);
        }

        #[test]
        fn children_in_slot() {
            let (t, infix) = comparison("a == b;", "a == b");
            let right = t.children_in_slot(infix, "rightOperand");
            assert_eq!(right.len(), 1);
            assert_eq!(t.text(right[0]), "b");
        }
    }

    mod copy {
        use super::*;

        #[test]
        fn copy_is_detached_and_rebased() {
            let (t, infix) = comparison("x; a == b;", "a == b");
            let copy = t.copy_subtree(infix);
            assert_eq!(copy.source(), "a == b");
            assert_eq!(copy.text(copy.root()), "a == b");
            assert!(copy.node(copy.root()).parent.is_none());
            assert_eq!(copy.shape_hash(copy.root()), t.shape_hash(infix));
            let left = copy.child_at(copy.root(), 0).unwrap();
            assert_eq!(copy.text(left), "a");
            assert_eq!(copy.node(copy.root()).start_line, 1);
        }

        #[test]
        fn replace_value_shifts_following_spans() {
            let (t, infix) = comparison("a < b;", "a < b");
            let mut copy = t.copy_subtree(infix);
            let root = copy.root();
            copy.replace_value(root, "<=");
            assert_eq!(copy.source(), "a <= b");
            let right = copy.child_at(root, 1).unwrap();
            assert_eq!(copy.text(right), "b");
            assert_eq!(copy.text(root), "a <= b");
            assert_eq!(copy.node(root).value, "<=");
        }

        #[test]
        fn serde_round_trip_recomputes_shapes() {
            let (t, infix) = comparison("a == b;", "a == b");
            let copy = t.copy_subtree(infix);
            let json = serde_json::to_string(&copy).unwrap();
            let back: Tree = serde_json::from_str(&json).unwrap();
            assert_eq!(back.shape_hash(back.root()), copy.shape_hash(copy.root()));
        }
    }
}
