// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Program tree construction from a tree-sitter-java syntax tree.
//!
//! The builder walks the concrete syntax tree once, mapping grammar kinds to
//! production names, dropping trivia and modifiers, lifting the children of
//! wrapper nodes into their parents, and eliding expression statements into
//! the expression they wrap. Names are bound as they are met, against a
//! lexical scope stack plus the class-level declarations gathered by a
//! pre-pass. Expressions get a static type where one can be read off the
//! source without a classpath.

use std::collections::{HashMap, HashSet};

use mendtool_core::concretize::normalize_type;
use mendtool_core::frontend::slots;
use mendtool_core::tree::{Category, NodeData, NodeId, Role, SlotDesc, Tree};
use mendtool_core::types::Span;
use tree_sitter::Node;

use crate::mapping::{flattened, is_leaf, is_skipped, opens_scope, production, slot_for};

/// Build a program tree for `source` from its parsed root node.
pub(crate) fn build_tree(source: &str, root: Node<'_>) -> Tree {
    let mut builder = Builder {
        source,
        tree: Tree::new(source),
        decls: Declarations::default(),
        scopes: Vec::new(),
        classes: Vec::new(),
    };
    builder.collect_declarations(root);
    builder.build(root, None);
    builder.tree
}

/// Named children of `node` with the field each one fills.
fn fields_of<'t>(node: Node<'t>) -> Vec<(Option<&'static str>, Node<'t>)> {
    let mut cursor = node.walk();
    let mut out = Vec::new();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() {
                out.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

fn span_of(node: Node<'_>) -> Span {
    Span::new(node.start_byte(), node.end_byte())
}

fn camel_case(ts_kind: &str) -> String {
    ts_kind
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn category_by_suffix(ts_kind: &str) -> Category {
    if ts_kind.ends_with("_statement") {
        Category::Statement
    } else if ts_kind.ends_with("_expression") {
        Category::Expression
    } else if ts_kind.ends_with("_declaration") {
        Category::Declaration
    } else if ts_kind.ends_with("_literal") {
        Category::Literal
    } else if ts_kind.ends_with("_type") {
        Category::Type
    } else {
        Category::Other
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Class-level declarations visible from anywhere in the file.
#[derive(Debug, Default)]
struct Declarations {
    /// Field name -> declared type.
    fields: HashMap<String, String>,
    /// Method name -> return type. The first overload wins.
    methods: HashMap<String, String>,
    types: HashSet<String>,
}

/// Where a child lands in the tree being built.
struct Place<'t> {
    parent: NodeId,
    /// Grammar node the child was found under.
    ts_parent: Node<'t>,
    field: Option<&'static str>,
    /// Slot forced by a lifted wrapper or a flattened chain.
    slot: Option<(&'static str, bool)>,
}

struct Builder<'s> {
    source: &'s str,
    tree: Tree,
    decls: Declarations,
    /// Local name -> declared type, innermost scope last.
    scopes: Vec<HashMap<String, Option<String>>>,
    /// Enclosing type declarations, innermost last.
    classes: Vec<String>,
}

impl<'s> Builder<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    fn type_text(&self, node: Node<'_>) -> String {
        self.text(node).split_whitespace().collect()
    }

    // ------------------------------------------------------------------------
    // Pre-pass
    // ------------------------------------------------------------------------

    fn collect_declarations(&mut self, root: Node<'_>) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node.kind() {
                "field_declaration" | "constant_declaration" => {
                    let ty = node
                        .child_by_field_name("type")
                        .map(|t| self.type_text(t))
                        .unwrap_or_default();
                    let mut cursor = node.walk();
                    for declarator in node.children_by_field_name("declarator", &mut cursor) {
                        if let Some(name) = declarator.child_by_field_name("name") {
                            let name = self.text(name).to_string();
                            let full = format!("{}{}", ty, self.dimensions(declarator));
                            self.decls.fields.insert(name, full);
                        }
                    }
                }
                "method_declaration" => {
                    if let (Some(name), Some(ty)) =
                        (node.child_by_field_name("name"), node.child_by_field_name("type"))
                    {
                        let (name, ty) = (self.text(name).to_string(), self.type_text(ty));
                        self.decls.methods.entry(name).or_insert(ty);
                    }
                }
                "class_declaration" | "interface_declaration" | "enum_declaration"
                | "record_declaration" => {
                    if let Some(name) = node.child_by_field_name("name") {
                        let name = self.text(name).to_string();
                        self.decls.types.insert(name.clone());
                        for supertype in self.supertypes_of(node) {
                            self.tree.add_supertype(name.clone(), supertype);
                        }
                        if node.kind() == "enum_declaration" {
                            self.collect_enum_constants(node, &name);
                        }
                    }
                }
                _ => {}
            }
            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }
    }

    fn supertypes_of(&self, decl: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        for (_, child) in fields_of(decl) {
            match child.kind() {
                "superclass" => {
                    out.extend(fields_of(child).into_iter().map(|(_, t)| normalize_type(self.text(t))));
                }
                "super_interfaces" | "extends_interfaces" => {
                    for (_, list) in fields_of(child) {
                        out.extend(fields_of(list).into_iter().map(|(_, t)| normalize_type(self.text(t))));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn collect_enum_constants(&mut self, decl: Node<'_>, enum_name: &str) {
        let Some(body) = decl.child_by_field_name("body") else {
            return;
        };
        for (_, child) in fields_of(body) {
            if child.kind() == "enum_constant" {
                if let Some(name) = child.child_by_field_name("name") {
                    let name = self.text(name).to_string();
                    self.decls.fields.insert(name, enum_name.to_string());
                }
            }
        }
    }

    /// `[]` suffix for array dimensions written after a declarator's name.
    fn dimensions(&self, declarator: Node<'_>) -> String {
        let count = declarator
            .child_by_field_name("dimensions")
            .map(|d| self.text(d).matches('[').count())
            .unwrap_or(0);
        "[]".repeat(count)
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    fn build(&mut self, node: Node<'_>, place: Option<&Place<'_>>) -> Option<NodeId> {
        let ts_kind = node.kind();
        if !node.is_named() || is_skipped(ts_kind) {
            return None;
        }
        if ts_kind == "expression_statement" {
            return self.build_expression_statement(node, place);
        }
        if ts_kind == "parenthesized_expression" && place.is_some_and(is_condition) {
            let inner = fields_of(node).into_iter().map(|(_, c)| c).find(|c| !is_skipped(c.kind()))?;
            return self.build(inner, place);
        }
        if let Some(slot) = flattened(ts_kind) {
            let place = place?;
            for (field, child) in fields_of(node) {
                let lifted = Place {
                    parent: place.parent,
                    ts_parent: node,
                    field,
                    slot: Some(slot),
                };
                self.build(child, Some(&lifted));
            }
            return None;
        }

        let (kind, category) = match production(ts_kind) {
            Some((kind, category)) => (kind.to_string(), category),
            None => (camel_case(ts_kind), category_by_suffix(ts_kind)),
        };
        let kind = if ts_kind == "update_expression" && self.is_prefix_update(node) {
            "PrefixExpression".to_string()
        } else {
            kind
        };

        let mut data = NodeData::new(kind, category, span_of(node));
        data.start_line = node.start_position().row as u32 + 1;
        data.end_line = node.end_position().row as u32 + 1;
        data.scope = opens_scope(ts_kind);
        if let Some(place) = place {
            let (name, list) = place
                .slot
                .unwrap_or_else(|| slot_for(place.ts_parent.kind(), place.field, ts_kind));
            let parent_kind = self.tree.node(place.parent).kind.clone();
            data.slot = Some(SlotDesc::new(parent_kind, name, list));
        }

        let leaf = is_leaf(category, ts_kind);
        self.fill_value(node, &mut data, leaf);
        match category {
            Category::Name => self.bind_name(node, place, &mut data),
            Category::Literal => {
                data.declared_type = literal_type(ts_kind, self.text(node)).map(str::to_string);
            }
            _ if ts_kind == "this" => data.declared_type = self.classes.last().cloned(),
            _ => {}
        }

        let id = self.tree.add_node(data);
        if let Some(place) = place {
            self.tree.add_child(place.parent, id);
        }
        if leaf {
            return Some(id);
        }

        let class_name = match ts_kind {
            "class_declaration" | "interface_declaration" | "enum_declaration"
            | "record_declaration" => node.child_by_field_name("name").map(|n| self.text(n).to_string()),
            _ => None,
        };
        if let Some(name) = &class_name {
            self.classes.push(name.clone());
        }
        let scoped = opens_scope(ts_kind);
        if scoped {
            self.scopes.push(HashMap::new());
        }

        if ts_kind == "binary_expression" {
            self.build_operands(node, id);
        } else {
            for (field, child) in fields_of(node) {
                let place = Place {
                    parent: id,
                    ts_parent: node,
                    field,
                    slot: None,
                };
                self.build(child, Some(&place));
            }
        }

        if scoped {
            self.scopes.pop();
        }
        if class_name.is_some() {
            self.classes.pop();
        }
        if category == Category::Expression {
            let ty = self.infer_type(node, id);
            self.tree.node_mut(id).declared_type = ty;
        }
        Some(id)
    }

    /// The expression takes the statement's place; the statement span
    /// (with its `;`) becomes the expression's wrapper.
    fn build_expression_statement(&mut self, node: Node<'_>, place: Option<&Place<'_>>) -> Option<NodeId> {
        let inner = fields_of(node)
            .into_iter()
            .map(|(_, c)| c)
            .find(|c| !is_skipped(c.kind()))?;
        let id = self.build(inner, place)?;
        let data = self.tree.node_mut(id);
        data.wrapper = Some(span_of(node));
        data.statement = true;
        data.end_line = node.end_position().row as u32 + 1;
        Some(id)
    }

    /// Flatten a left-leaning chain of one operator into left, right, and
    /// extended operands.
    fn build_operands(&mut self, node: Node<'_>, id: NodeId) {
        let operands = self.operand_chain(node);
        for (i, operand) in operands.into_iter().enumerate() {
            let slot = match i {
                0 => (slots::LEFT_OPERAND, false),
                1 => (slots::RIGHT_OPERAND, false),
                _ => (slots::EXTENDED_OPERANDS, true),
            };
            let place = Place {
                parent: id,
                ts_parent: node,
                field: None,
                slot: Some(slot),
            };
            self.build(operand, Some(&place));
        }
    }

    fn operand_chain<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let operator = self.operator_of(node);
        let mut operands = Vec::new();
        let mut current = node;
        loop {
            if let Some(right) = current.child_by_field_name("right") {
                operands.push(right);
            }
            match current.child_by_field_name("left") {
                Some(left) if left.kind() == "binary_expression" && self.operator_of(left) == operator => {
                    current = left;
                }
                Some(left) => {
                    operands.push(left);
                    break;
                }
                None => break,
            }
        }
        operands.reverse();
        operands
    }

    fn operator_of(&self, node: Node<'_>) -> &'s str {
        node.child_by_field_name("operator")
            .map(|op| self.text(op))
            .unwrap_or("")
    }

    fn is_prefix_update(&self, node: Node<'_>) -> bool {
        node.child(0).is_some_and(|first| !first.is_named())
    }

    // ------------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------------

    fn fill_value(&self, node: Node<'_>, data: &mut NodeData, leaf: bool) {
        match node.kind() {
            "import_declaration" | "package_declaration" => {
                let mut value = String::new();
                let mut wildcard = false;
                for (_, child) in fields_of(node) {
                    match child.kind() {
                        "scoped_identifier" | "identifier" => value = self.text(child).to_string(),
                        "asterisk" => wildcard = true,
                        _ => {}
                    }
                }
                if wildcard {
                    value.push_str(".*");
                }
                data.value = value;
            }
            "binary_expression" => {
                let operator = self.operator_of(node);
                data.value = operator.to_string();
                let mut current = node;
                let mut spans = Vec::new();
                loop {
                    if let Some(op) = current.child_by_field_name("operator") {
                        spans.push(span_of(op));
                    }
                    match current.child_by_field_name("left") {
                        Some(left) if left.kind() == "binary_expression" && self.operator_of(left) == operator => {
                            current = left;
                        }
                        _ => break,
                    }
                }
                spans.reverse();
                data.value_spans = spans;
            }
            "unary_expression" | "assignment_expression" => {
                if let Some(op) = node.child_by_field_name("operator") {
                    data.value = self.text(op).to_string();
                    data.value_spans = vec![span_of(op)];
                }
            }
            "update_expression" => {
                let mut cursor = node.walk();
                let token = node.children(&mut cursor).find(|c| !c.is_named());
                if let Some(op) = token {
                    data.value = self.text(op).to_string();
                    data.value_spans = vec![span_of(op)];
                }
            }
            "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
            | "annotation_type_declaration" | "method_declaration" | "constructor_declaration"
            | "compact_constructor_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    data.value = self.text(name).to_string();
                }
            }
            _ if leaf => {
                data.value = if data.category == Category::Type {
                    self.type_text(node)
                } else {
                    self.text(node).to_string()
                };
                data.value_spans = vec![span_of(node)];
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------------

    fn declare(&mut self, name: &str, ty: Option<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn lookup_local(&self, name: &str) -> Option<Option<String>> {
        self.scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }

    fn bind_name(&mut self, node: Node<'_>, place: Option<&Place<'_>>, data: &mut NodeData) {
        if node.kind() != "identifier" {
            return;
        }
        let name = self.text(node);
        let (parent, field) = match place {
            Some(p) => (Some(p.ts_parent), p.field),
            None => (None, None),
        };
        let parent_kind = parent.map(|p| p.kind()).unwrap_or("");

        let (role, ty, declaration) = match (parent_kind, field) {
            ("variable_declarator", Some("name")) => {
                let decl = parent.and_then(|p| p.parent());
                let base = decl
                    .and_then(|d| d.child_by_field_name("type"))
                    .map(|t| self.type_text(t));
                let dims = parent.map(|p| self.dimensions(p)).unwrap_or_default();
                let ty = base.map(|b| format!("{}{}", b, dims));
                let is_field = decl.is_some_and(|d| matches!(d.kind(), "field_declaration" | "constant_declaration"));
                if is_field {
                    (Role::Field, ty, true)
                } else {
                    self.declare(name, ty.clone());
                    (Role::Variable, ty, true)
                }
            }
            ("formal_parameter" | "spread_parameter" | "enhanced_for_statement" | "resource", Some("name")) => {
                let ty = parent
                    .and_then(|p| p.child_by_field_name("type"))
                    .map(|t| self.type_text(t));
                self.declare(name, ty.clone());
                (Role::Variable, ty, true)
            }
            ("catch_formal_parameter", Some("name")) => {
                let ty = parent.and_then(|p| {
                    fields_of(p)
                        .into_iter()
                        .find(|(_, c)| c.kind() == "catch_type")
                        .map(|(_, c)| self.type_text(c))
                });
                self.declare(name, ty.clone());
                (Role::Variable, ty, true)
            }
            ("lambda_expression", Some("parameters")) | ("inferred_parameters", _) => {
                self.declare(name, None);
                (Role::Variable, None, true)
            }
            ("method_declaration", Some("name")) => {
                (Role::Method, self.decls.methods.get(name).cloned(), true)
            }
            ("constructor_declaration" | "compact_constructor_declaration", Some("name")) => {
                (Role::Constructor, Some(name.to_string()), true)
            }
            (
                "class_declaration" | "interface_declaration" | "enum_declaration" | "record_declaration"
                | "annotation_type_declaration",
                Some("name"),
            ) => (Role::Type, Some(name.to_string()), true),
            ("enum_constant", Some("name")) => (Role::Field, self.classes.last().cloned(), true),
            ("method_invocation", Some("name")) => {
                let local_call = parent
                    .and_then(|p| p.child_by_field_name("object"))
                    .is_none_or(|o| o.kind() == "this");
                let ty = if local_call {
                    self.decls.methods.get(name).cloned()
                } else {
                    None
                };
                (Role::Method, ty, false)
            }
            ("field_access", Some("field")) => {
                let on_this = parent
                    .and_then(|p| p.child_by_field_name("object"))
                    .is_some_and(|o| o.kind() == "this");
                let ty = if on_this {
                    self.decls.fields.get(name).cloned()
                } else {
                    None
                };
                (Role::Field, ty, false)
            }
            ("labeled_statement" | "break_statement" | "continue_statement", _) => return,
            _ => self.resolve_reference(name),
        };
        data.role = Some(role);
        data.declared_type = ty;
        data.declaration = declaration;
    }

    fn resolve_reference(&self, name: &str) -> (Role, Option<String>, bool) {
        if let Some(ty) = self.lookup_local(name) {
            return (Role::Variable, ty, false);
        }
        if let Some(ty) = self.decls.fields.get(name) {
            return (Role::Field, Some(ty.clone()), false);
        }
        if self.decls.types.contains(name) || name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return (Role::Type, None, false);
        }
        (Role::Unresolved, None, false)
    }

    // ------------------------------------------------------------------------
    // Typing
    // ------------------------------------------------------------------------

    fn child_type(&self, id: NodeId, slot: &str) -> Option<String> {
        self.tree
            .children_in_slot(id, slot)
            .first()
            .and_then(|c| self.tree.node(*c).declared_type.clone())
    }

    fn infer_type(&self, node: Node<'_>, id: NodeId) -> Option<String> {
        let field_text = |name: &str| node.child_by_field_name(name).map(|n| self.type_text(n));
        match node.kind() {
            "binary_expression" => self.infix_type(id),
            "instanceof_expression" => Some("boolean".to_string()),
            "unary_expression" if self.tree.node(id).value == "!" => Some("boolean".to_string()),
            "unary_expression" | "update_expression" => self.child_type(id, "operand"),
            "assignment_expression" => self.child_type(id, "leftHandSide"),
            "parenthesized_expression" => self.child_type(id, slots::EXPRESSION),
            "field_access" | "method_invocation" => self.child_type(id, slots::NAME),
            "cast_expression" | "object_creation_expression" => field_text("type"),
            "array_creation_expression" => field_text("type").map(|t| format!("{}[]", t)),
            "array_access" => self
                .child_type(id, "array")
                .and_then(|t| t.strip_suffix("[]").map(str::to_string)),
            "ternary_expression" => self
                .child_type(id, "thenExpression")
                .or_else(|| self.child_type(id, "elseExpression")),
            _ => None,
        }
    }

    fn infix_type(&self, id: NodeId) -> Option<String> {
        let node = self.tree.node(id);
        match node.value.as_str() {
            "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => return Some("boolean".to_string()),
            _ => {}
        }
        let operand_types: Vec<Option<String>> = node
            .children
            .iter()
            .map(|c| self.tree.node(*c).declared_type.clone())
            .collect();
        let is_string = |t: &Option<String>| t.as_deref().is_some_and(|t| normalize_type(t) == "String");
        if node.value == "+" && operand_types.iter().any(is_string) {
            return Some("String".to_string());
        }
        let mut widest: Option<&str> = None;
        for ty in &operand_types {
            let ty = unboxed(ty.as_deref()?)?;
            if ty == "boolean" {
                return matches!(node.value.as_str(), "&" | "|" | "^").then(|| "boolean".to_string());
            }
            let rank = NUMERIC_RANK.iter().position(|r| *r == ty)?;
            let current = widest.and_then(|w| NUMERIC_RANK.iter().position(|r| *r == w));
            if current.is_none_or(|c| rank > c) {
                widest = Some(NUMERIC_RANK[rank]);
            }
        }
        let widest = widest?;
        let promoted = if matches!(widest, "long" | "float" | "double") {
            widest
        } else {
            "int"
        };
        match node.value.as_str() {
            "<<" | ">>" | ">>>" => operand_types
                .first()
                .and_then(|t| t.as_deref())
                .and_then(unboxed)
                .map(|t| if t == "long" { "long" } else { "int" }.to_string()),
            _ => Some(promoted.to_string()),
        }
    }
}

const NUMERIC_RANK: &[&str] = &["byte", "short", "char", "int", "long", "float", "double"];

fn unboxed(ty: &str) -> Option<&str> {
    Some(match ty {
        "Byte" => "byte",
        "Short" => "short",
        "Character" => "char",
        "Integer" => "int",
        "Long" => "long",
        "Float" => "float",
        "Double" => "double",
        "Boolean" => "boolean",
        other => other,
    })
}

fn is_condition(place: &Place<'_>) -> bool {
    place.field == Some("condition")
        && matches!(
            place.ts_parent.kind(),
            "if_statement" | "while_statement" | "do_statement" | "synchronized_statement" | "switch_expression"
        )
}

/// Static type of a literal token.
pub(crate) fn literal_type(ts_kind: &str, text: &str) -> Option<&'static str> {
    let ty = match ts_kind {
        "decimal_integer_literal" | "hex_integer_literal" | "octal_integer_literal"
        | "binary_integer_literal" => {
            if text.ends_with(['l', 'L']) {
                "long"
            } else {
                "int"
            }
        }
        "decimal_floating_point_literal" | "hex_floating_point_literal" => {
            if text.ends_with(['f', 'F']) {
                "float"
            } else {
                "double"
            }
        }
        "string_literal" | "text_block" => "String",
        "character_literal" => "char",
        "true" | "false" => "boolean",
        "null_literal" => "null",
        _ => return None,
    };
    Some(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_types() {
        assert_eq!(literal_type("decimal_integer_literal", "42"), Some("int"));
        assert_eq!(literal_type("decimal_integer_literal", "42L"), Some("long"));
        assert_eq!(literal_type("decimal_floating_point_literal", "1.5f"), Some("float"));
        assert_eq!(literal_type("decimal_floating_point_literal", "1.5"), Some("double"));
        assert_eq!(literal_type("null_literal", "null"), Some("null"));
        assert_eq!(literal_type("identifier", "x"), None);
    }

    #[test]
    fn unknown_kinds_get_camel_case_names() {
        assert_eq!(camel_case("switch_rule"), "SwitchRule");
        assert_eq!(category_by_suffix("yield_statement"), Category::Statement);
        assert_eq!(category_by_suffix("element_value_pair"), Category::Other);
    }
}
