// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Java front end for mendtool.
//!
//! Parses Java source with tree-sitter-java and builds the engine's program
//! tree: production names in the style of the Eclipse JDT DOM, resolved name
//! roles, and static types read from declarations in the same file.

use std::cell::RefCell;

use mendtool_core::frontend::{FrontEnd, FrontEndError};
use mendtool_core::tree::Tree;
use tracing::debug;
use tree_sitter::{Node, Parser};

mod builder;
mod mapping;

thread_local! {
    static JAVA_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // A language load failure surfaces as a missing tree at parse time.
        let _ = p.set_language(&tree_sitter_java::LANGUAGE.into());
        p
    });
}

/// The Java language front end.
#[derive(Debug, Default, Clone, Copy)]
pub struct JavaFrontEnd;

impl JavaFrontEnd {
    pub fn new() -> Self {
        JavaFrontEnd
    }
}

impl FrontEnd for JavaFrontEnd {
    fn language(&self) -> &str {
        "java"
    }

    fn file_extension(&self) -> &str {
        "java"
    }

    fn parse(&self, source: &str) -> Result<Tree, FrontEndError> {
        let parsed = JAVA_PARSER
            .with(|p| p.borrow_mut().parse(source, None))
            .ok_or_else(|| FrontEndError::Parser("tree-sitter-java produced no tree".to_string()))?;
        let root = parsed.root_node();
        if root.has_error() {
            let line = first_error_line(root);
            debug!(line, "java source has syntax errors");
            return Err(FrontEndError::Syntax { line });
        }
        let tree = builder::build_tree(source, root);
        debug!(nodes = tree.len(), "built java tree");
        Ok(tree)
    }

    fn import_declaration(&self, qualified_name: &str) -> String {
        format!("import {};", qualified_name)
    }
}

/// 1-based line of the first error or missing node, in document order.
fn first_error_line(root: Node<'_>) -> u32 {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return node.start_position().row as u32 + 1;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    root.start_position().row as u32 + 1
}
