//! Hand-built trees for unit tests.
//!
//! A `Sketch` places nodes by locating their text inside the parent's span,
//! scanning left to right so that repeated tokens land on successive
//! occurrences.

use std::collections::HashMap;

use crate::text::line_of;
use crate::tree::{Category, NodeData, NodeId, Role, SlotDesc, Tree};
use crate::types::Span;

pub(crate) struct Sketch {
    tree: Tree,
    cursor: HashMap<NodeId, usize>,
}

impl Sketch {
    pub fn new(source: &str) -> Self {
        let mut tree = Tree::new(source);
        let mut root = NodeData::new("CompilationUnit", Category::Unit, Span::new(0, source.len()));
        root.start_line = 1;
        root.end_line = line_of(source, source.len());
        tree.add_node(root);
        Sketch {
            tree,
            cursor: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    fn locate(&mut self, parent: NodeId, text: &str) -> Span {
        let parent_span = self.tree.node(parent).span;
        let from = self
            .cursor
            .get(&parent)
            .copied()
            .unwrap_or(parent_span.start);
        let haystack = &self.tree.source()[from..parent_span.end];
        let offset = haystack
            .find(text)
            .unwrap_or_else(|| panic!("`{}` not found under {}", text, parent));
        let span = Span::new(from + offset, from + offset + text.len());
        self.cursor.insert(parent, span.end);
        span
    }

    /// Add a node. `slot` names the parent slot; a trailing `[]` marks a
    /// list slot, and an empty string leaves the slot unset.
    pub fn add(
        &mut self,
        parent: NodeId,
        kind: &str,
        category: Category,
        text: &str,
        slot: &str,
    ) -> NodeId {
        let span = self.locate(parent, text);
        let mut data = NodeData::new(kind, category, span);
        data.start_line = line_of(self.tree.source(), span.start);
        data.end_line = line_of(self.tree.source(), span.end.saturating_sub(1).max(span.start));
        if matches!(category, Category::Name | Category::Literal | Category::Type) {
            data.value = text.to_string();
            data.value_spans = vec![span];
        }
        if !slot.is_empty() {
            let parent_kind = self.tree.node(parent).kind.clone();
            let (name, list) = match slot.strip_suffix("[]") {
                Some(name) => (name, true),
                None => (slot, false),
            };
            data.slot = Some(SlotDesc::new(parent_kind, name, list));
        }
        let id = self.tree.add_node(data);
        self.tree.add_child(parent, id);
        id
    }

    pub fn expr(&mut self, parent: NodeId, kind: &str, text: &str, slot: &str) -> NodeId {
        self.add(parent, kind, Category::Expression, text, slot)
    }

    pub fn stmt(&mut self, parent: NodeId, kind: &str, text: &str, slot: &str) -> NodeId {
        self.add(parent, kind, Category::Statement, text, slot)
    }

    /// An expression used as a statement; `text` includes the terminator.
    pub fn expr_stmt(&mut self, parent: NodeId, kind: &str, text: &str, slot: &str) -> NodeId {
        let inner = text.trim_end_matches(';').trim_end();
        let id = self.expr(parent, kind, inner, slot);
        let span = self.tree.node(id).span;
        let wrapper = Span::new(span.start, span.start + text.len());
        self.cursor.insert(parent, wrapper.end);
        let node = self.tree.node_mut(id);
        node.wrapper = Some(wrapper);
        node.statement = true;
        id
    }

    pub fn name(
        &mut self,
        parent: NodeId,
        text: &str,
        role: Role,
        ty: Option<&str>,
        slot: &str,
    ) -> NodeId {
        let id = self.add(parent, "SimpleName", Category::Name, text, slot);
        let node = self.tree.node_mut(id);
        node.role = Some(role);
        node.declared_type = ty.map(str::to_string);
        id
    }

    pub fn literal(&mut self, parent: NodeId, kind: &str, text: &str, ty: &str, slot: &str) -> NodeId {
        let id = self.add(parent, kind, Category::Literal, text, slot);
        self.tree.node_mut(id).declared_type = Some(ty.to_string());
        id
    }

    /// Set the value of an operator node from the token between (or around)
    /// its operands.
    pub fn operator(&mut self, id: NodeId) {
        let node = self.tree.node(id).clone();
        let source = self.tree.source();
        let (from, to) = match node.children.as_slice() {
            [] => (node.span.start, node.span.end),
            [only] => {
                let child = self.tree.node(*only).span;
                if child.start > node.span.start {
                    (node.span.start, child.start)
                } else {
                    (child.end, node.span.end)
                }
            }
            [first, second, ..] => (self.tree.node(*first).span.end, self.tree.node(*second).span.start),
        };
        let raw = &source[from..to];
        let token = raw.trim();
        let start = from + raw.find(token).unwrap_or(0);
        let span = Span::new(start, start + token.len());
        let token = token.to_string();
        let data = self.tree.node_mut(id);
        data.value = token;
        data.value_spans = vec![span];
    }

    pub fn set(&mut self, id: NodeId) -> &mut NodeData {
        self.tree.node_mut(id)
    }

    pub fn finish(self) -> Tree {
        self.tree
    }
}
