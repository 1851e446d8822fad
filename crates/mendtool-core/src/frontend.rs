//! Collaborator interfaces: language front end and tree diff.
//!
//! The engine never parses source text itself. A [`FrontEnd`] builds a
//! [`Tree`] with resolved roles and declared types, using the canonical
//! production names in [`kinds`] and slot names in [`slots`] for the
//! constructs the engine treats specially. A [`TreeDiff`] turns two trees into
//! an [`EditScript`] for mining.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{NodeId, Role, Tree};

/// Production names the engine relies on.
pub mod kinds {
    pub const COMPILATION_UNIT: &str = "CompilationUnit";
    pub const PACKAGE_DECLARATION: &str = "PackageDeclaration";
    pub const IMPORT_DECLARATION: &str = "ImportDeclaration";
    pub const TYPE_DECLARATION: &str = "TypeDeclaration";
    pub const METHOD_DECLARATION: &str = "MethodDeclaration";
    pub const BLOCK: &str = "Block";
    pub const IF_STATEMENT: &str = "IfStatement";
    pub const INFIX_EXPRESSION: &str = "InfixExpression";
    pub const PREFIX_EXPRESSION: &str = "PrefixExpression";
    pub const POSTFIX_EXPRESSION: &str = "PostfixExpression";
    pub const METHOD_INVOCATION: &str = "MethodInvocation";
    pub const SIMPLE_NAME: &str = "SimpleName";
}

/// Slot names the engine relies on.
pub mod slots {
    pub const STATEMENTS: &str = "statements";
    pub const THEN: &str = "thenStatement";
    pub const ELSE: &str = "elseStatement";
    pub const NAME: &str = "name";
    pub const EXPRESSION: &str = "expression";
    pub const ARGUMENTS: &str = "arguments";
    pub const LEFT_OPERAND: &str = "leftOperand";
    pub const RIGHT_OPERAND: &str = "rightOperand";
    pub const EXTENDED_OPERANDS: &str = "extendedOperands";

    /// Whether `name` is one of the operand slots of an infix expression.
    pub fn is_operand(name: &str) -> bool {
        matches!(name, LEFT_OPERAND | RIGHT_OPERAND | EXTENDED_OPERANDS)
    }
}

// ============================================================================
// Front End
// ============================================================================

#[derive(Debug, Error)]
pub enum FrontEndError {
    #[error("syntax error at line {line}")]
    Syntax { line: u32 },

    #[error("parser unavailable: {0}")]
    Parser(String),
}

/// Binding facts attached to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub role: Option<Role>,
    pub declared_type: Option<String>,
}

/// A language front end.
///
/// Implementations resolve bindings while building the tree, so
/// [`FrontEnd::resolve_binding`] only reads what `parse` recorded.
pub trait FrontEnd {
    /// Short language name, used in logs.
    fn language(&self) -> &str;

    /// File extension of source files, without the dot.
    fn file_extension(&self) -> &str;

    fn parse(&self, source: &str) -> Result<Tree, FrontEndError>;

    /// Source text of an import declaration for a qualified name.
    fn import_declaration(&self, qualified_name: &str) -> String;

    fn resolve_binding(&self, tree: &Tree, node: NodeId) -> Binding {
        let data = tree.node(node);
        Binding {
            role: data.role,
            declared_type: data.declared_type.clone(),
        }
    }

    /// Qualified names imported by the file.
    fn imported_names(&self, tree: &Tree) -> Vec<String> {
        if tree.is_empty() {
            return Vec::new();
        }
        tree.children(tree.root())
            .iter()
            .filter(|id| tree.node(**id).kind == kinds::IMPORT_DECLARATION)
            .map(|id| tree.node(*id).value.clone())
            .collect()
    }

    /// Byte offset after which new import lines are inserted: the end of the
    /// last import, else the end of the package declaration, else `None`
    /// (insert at the top of the file).
    fn import_anchor(&self, tree: &Tree) -> Option<usize> {
        if tree.is_empty() {
            return None;
        }
        let top = tree.children(tree.root());
        let last_of = |kind: &str| {
            top.iter()
                .filter(|id| tree.node(**id).kind == kind)
                .map(|id| tree.node(*id).span.end)
                .max()
        };
        last_of(kinds::IMPORT_DECLARATION).or_else(|| last_of(kinds::PACKAGE_DECLARATION))
    }

    /// Offset just inside the opening delimiter of a block, where a first
    /// statement would go.
    fn block_body_offset(&self, tree: &Tree, block: NodeId) -> Option<usize> {
        let span = tree.node(block).span;
        tree.text(block).find('{').map(|i| span.start + i + 1)
    }
}

// ============================================================================
// Tree Diff
// ============================================================================

/// One edit operation between a before tree and an after tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    /// `node` (after tree) was inserted under `parent` (after tree).
    Insert {
        node: NodeId,
        parent: NodeId,
        position: usize,
    },
    /// `node` (before tree) was deleted.
    Delete { node: NodeId },
    /// `node` (before tree) changed value; `to` is its after-tree twin.
    Update { node: NodeId, to: NodeId },
    /// `node` (before tree) was relocated; `to` is its after-tree twin.
    Move { node: NodeId, to: NodeId },
}

/// Ordered edit operations plus the node matching they were derived from.
#[derive(Debug, Clone, Default)]
pub struct EditScript {
    pub ops: Vec<EditOp>,
    /// Before-tree node -> matched after-tree node.
    pub matches: HashMap<NodeId, NodeId>,
}

impl EditScript {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Structural differencing collaborator.
pub trait TreeDiff {
    fn diff(&self, before: &Tree, after: &Tree) -> EditScript;
}
