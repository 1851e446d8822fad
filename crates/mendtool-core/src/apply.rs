//! Patch application.
//!
//! A [`Patcher`] owns one parsed file and applies changes at its locations.
//! Applies are transactional: edits are computed against the base text and
//! only reach the buffer when the apply succeeds. [`Patcher::new_source`]
//! renders the buffer plus any pending imports and resets it, so the base
//! tree is parsed once and reused across attempts.
//!
//! ## Insertion rules
//!
//! - statement lists: before/after a statement, on its own line
//! - block bodies (`under`): ahead of the first statement
//! - operands of a flattened infix chain: a new operand joined with the
//!   chain's operator
//! - `if` without `else`, after the then-branch: the else-branch
//! - a call without a receiver, before its name: the receiver

use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::{Change, ChangeKind};
use crate::concretize::{ConcretizationStrategy, Concretizer, Instance};
use crate::frontend::{kinds, slots, FrontEnd, FrontEndError};
use crate::location::{locations_on_line, slot_accepts, InsertionKind, TargetLocation};
use crate::patch_info::RepairAction;
use crate::rewrite::{splice, EditBuffer, TextEdit};
use crate::text::{indent_at, whole_line_span};
use crate::tree::{NodeId, Tree};
use crate::types::Span;

/// Result of one apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ApplyOutcome {
    NotApplied = 0,
    Applied = 1,
    NotInstantiable = 2,
    NoFixLocation = 3,
    NoChange = 4,
}

impl ApplyOutcome {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Edits and audit record of a successful apply, before commit.
struct Planned {
    edits: Vec<TextEdit>,
    before: String,
    after: String,
    method: String,
    imports: BTreeSet<String>,
}

pub struct Patcher {
    class: String,
    tree: Tree,
    front_end: Rc<dyn FrontEnd>,
    concretizer: Concretizer,
    buffer: EditBuffer,
    existing_imports: Vec<String>,
    pending_imports: Vec<String>,
    actions: Vec<RepairAction>,
}

impl std::fmt::Debug for Patcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patcher")
            .field("class", &self.class)
            .field("nodes", &self.tree.len())
            .field("pending_edits", &self.buffer.edits().len())
            .field("pending_imports", &self.pending_imports)
            .finish()
    }
}

impl Patcher {
    /// Parse `source` and collect the file's materials.
    pub fn new(
        class: impl Into<String>,
        source: &str,
        front_end: Rc<dyn FrontEnd>,
        strategy: ConcretizationStrategy,
    ) -> Result<Self, FrontEndError> {
        let tree = front_end.parse(source)?;
        Ok(Patcher::from_tree(class, tree, front_end, strategy))
    }

    pub fn from_tree(
        class: impl Into<String>,
        tree: Tree,
        front_end: Rc<dyn FrontEnd>,
        strategy: ConcretizationStrategy,
    ) -> Self {
        let existing_imports = front_end.imported_names(&tree);
        let concretizer = Concretizer::new(strategy, &tree, existing_imports.clone());
        Patcher {
            class: class.into(),
            tree,
            front_end,
            concretizer,
            buffer: EditBuffer::new(),
            existing_imports,
            pending_imports: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn source(&self) -> &str {
        self.tree.source()
    }

    pub fn concretizer(&self) -> &Concretizer {
        &self.concretizer
    }

    pub fn locations(&self, line: u32) -> Vec<TargetLocation> {
        locations_on_line(&self.tree, &self.class, line)
    }

    /// Actions applied since the last call.
    pub fn take_actions(&mut self) -> Vec<RepairAction> {
        std::mem::take(&mut self.actions)
    }

    /// Apply `change` at `loc` using concretization attempt `attempt`.
    pub fn apply(&mut self, loc: &TargetLocation, change: &Change, attempt: usize) -> ApplyOutcome {
        if loc.class != self.class || !self.tree.contains(loc.node) || self.tree.shape_hash(loc.node) != loc.shape {
            return ApplyOutcome::NoFixLocation;
        }
        let planned = match change.kind {
            ChangeKind::Delete => self.plan_delete(loc, change),
            ChangeKind::Insert => self.plan_insert(loc, change, attempt),
            ChangeKind::Update => self.plan_update(loc, change, attempt),
            ChangeKind::Replace => self.plan_replace(loc, change, attempt),
        };
        let planned = match planned {
            Ok(p) => p,
            Err(outcome) => {
                debug!(class = %self.class, line = loc.line, kind = %change.kind, ?outcome, "change not applied");
                return outcome;
            }
        };
        if planned.before == planned.after {
            return ApplyOutcome::NoChange;
        }

        let mut added = Vec::new();
        for name in change.requirements.iter().chain(&planned.imports) {
            if self.needs_import(name) {
                self.pending_imports.push(name.clone());
                added.push(name.clone());
            }
        }
        for edit in planned.edits {
            self.buffer.push(edit);
        }
        self.actions.push(RepairAction {
            kind: change.kind,
            insertion: loc.kind,
            class: self.class.clone(),
            line: loc.line,
            location: loc.label.clone(),
            before: planned.before,
            after: planned.after,
            change_hash: change.hash.clone(),
            change_id: change.id.clone(),
            method: planned.method,
            imports: added,
        });
        ApplyOutcome::Applied
    }

    fn needs_import(&self, name: &str) -> bool {
        let in_lang = name
            .strip_prefix("java.lang.")
            .is_some_and(|rest| !rest.contains('.'));
        let wildcard = name
            .rsplit_once('.')
            .map(|(pkg, _)| format!("{}.*", pkg))
            .is_some_and(|w| self.existing_imports.contains(&w));
        !in_lang
            && !wildcard
            && !self.existing_imports.iter().any(|i| i == name)
            && !self.pending_imports.iter().any(|i| i == name)
    }

    /// Render pending edits and imports over the base text, then reset.
    pub fn new_source(&mut self) -> String {
        if !self.pending_imports.is_empty() {
            let lines: Vec<String> = self
                .pending_imports
                .drain(..)
                .map(|q| self.front_end.import_declaration(&q))
                .collect();
            let edit = match self.front_end.import_anchor(&self.tree) {
                Some(offset) => TextEdit::insert(offset, format!("\n{}", lines.join("\n"))),
                None => TextEdit::insert(0, format!("{}\n\n", lines.join("\n"))),
            };
            self.buffer.push(edit);
        }
        self.buffer.render(self.tree.source())
    }

    /// Drop pending edits and imports without rendering.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending_imports.clear();
        self.actions.clear();
    }

    // ------------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------------

    fn instance(&self, loc: &TargetLocation, change: &Change, attempt: usize) -> Result<Instance, ApplyOutcome> {
        if !self.concretizer.inst_check(&self.tree, change, loc) {
            return Err(ApplyOutcome::NotInstantiable);
        }
        self.concretizer
            .instantiate(&self.tree, change, loc, attempt)
            .map_err(|_| ApplyOutcome::NotInstantiable)
    }

    fn plan_delete(&self, loc: &TargetLocation, change: &Change) -> Result<Planned, ApplyOutcome> {
        if loc.kind != InsertionKind::NotApplicable || change.payload_shape() != loc.shape {
            return Err(ApplyOutcome::NotApplied);
        }
        let edit = self.removal(loc.node).ok_or(ApplyOutcome::NotApplied)?;
        Ok(Planned {
            edits: vec![edit],
            before: self.tree.statement_text(loc.node).to_string(),
            after: String::new(),
            method: "none".to_string(),
            imports: BTreeSet::new(),
        })
    }

    /// The edit removing `id` together with its separator.
    fn removal(&self, id: NodeId) -> Option<TextEdit> {
        let tree = &self.tree;
        let source = tree.source();
        let node = tree.node(id);
        let slot = node.slot.as_ref()?;
        let parent = node.parent?;

        if node.statement && slot.list {
            return Some(TextEdit::delete(whole_line_span(source, &node.statement_span())));
        }
        if slot.is(kinds::IF_STATEMENT, slots::ELSE) {
            let then = tree.children_in_slot(parent, slots::THEN);
            let then_end = tree.node(*then.first()?).statement_span().end;
            return Some(TextEdit::delete(Span::new(then_end, node.statement_span().end)));
        }
        if slot.parent_kind == kinds::INFIX_EXPRESSION && slots::is_operand(&slot.name) {
            let operands = operands_of(tree, parent);
            let at = operands.iter().position(|o| *o == id)?;
            if operands.len() == 2 {
                let other = operands[1 - at];
                return Some(TextEdit::new(tree.node(parent).span, tree.text(other)));
            }
            let span = match (at.checked_sub(1), operands.get(at + 1)) {
                (_, Some(next)) if at == 0 => Span::new(node.span.start, tree.node(*next).span.start),
                (Some(prev), _) => Span::new(tree.node(operands[prev]).span.end, node.span.end),
                _ => return None,
            };
            return Some(TextEdit::delete(span));
        }
        if slot.list {
            let siblings = tree.children_in_slot(parent, &slot.name);
            let at = siblings.iter().position(|s| *s == id)?;
            let span = if let Some(next) = siblings.get(at + 1) {
                Span::new(node.span.start, tree.node(*next).span.start)
            } else if let Some(prev) = at.checked_sub(1) {
                Span::new(tree.node(siblings[prev]).span.end, node.span.end)
            } else {
                node.span
            };
            return Some(TextEdit::delete(span));
        }
        None
    }

    fn plan_insert(&self, loc: &TargetLocation, change: &Change, attempt: usize) -> Result<Planned, ApplyOutcome> {
        if !slot_accepts(loc, change.payload_slot()) {
            return Err(ApplyOutcome::NotApplied);
        }
        let inst = self.instance(loc, change, attempt)?;
        let edit = self.insertion(loc, &inst).ok_or(ApplyOutcome::NotApplied)?;
        Ok(Planned {
            edits: vec![edit],
            before: String::new(),
            after: if change.is_statement() { inst.text.clone() } else { inst.expr_text.clone() },
            method: inst.method,
            imports: inst.imports,
        })
    }

    fn insertion(&self, loc: &TargetLocation, inst: &Instance) -> Option<TextEdit> {
        let tree = &self.tree;
        let source = tree.source();
        let node = tree.node(loc.node);
        let slot = node.slot.as_ref();

        if slot.is_some_and(|s| s.parent_kind == kinds::INFIX_EXPRESSION && slots::is_operand(&s.name)) {
            let op = &tree.node(node.parent?).value;
            return match loc.kind {
                InsertionKind::Before => Some(TextEdit::insert(node.span.start, format!("{} {} ", inst.expr_text, op))),
                InsertionKind::After => Some(TextEdit::insert(node.span.end, format!(" {} {}", op, inst.expr_text))),
                _ => None,
            };
        }
        match loc.kind {
            InsertionKind::After if node.slot_is(kinds::IF_STATEMENT, slots::THEN) => Some(TextEdit::insert(
                node.statement_span().end,
                format!(" else {}", inst.text),
            )),
            InsertionKind::Before if node.slot_is(kinds::METHOD_INVOCATION, slots::NAME) => {
                Some(TextEdit::insert(node.span.start, format!("{}.", inst.expr_text)))
            }
            InsertionKind::Before => {
                let at = node.statement_span().start;
                let indent = indent_at(source, at);
                Some(TextEdit::insert(at, format!("{}\n{}", inst.text, indent)))
            }
            InsertionKind::After => {
                let at = node.statement_span().end;
                let indent = indent_at(source, node.statement_span().start);
                Some(TextEdit::insert(at, format!("\n{}{}", indent, inst.text)))
            }
            InsertionKind::Under => {
                let statements = tree.children_in_slot(loc.node, slots::STATEMENTS);
                match statements.first() {
                    Some(first) => {
                        let at = tree.node(*first).statement_span().start;
                        let indent = indent_at(source, at);
                        Some(TextEdit::insert(at, format!("{}\n{}", inst.text, indent)))
                    }
                    None => {
                        let at = self.front_end.block_body_offset(tree, loc.node)?;
                        Some(TextEdit::insert(at, format!(" {} ", inst.text)))
                    }
                }
            }
            InsertionKind::NotApplicable => None,
        }
    }

    fn plan_update(&self, loc: &TargetLocation, change: &Change, attempt: usize) -> Result<Planned, ApplyOutcome> {
        let node = self.tree.node(loc.node);
        if loc.kind != InsertionKind::NotApplicable
            || node.kind != change.payload_kind()
            || node.value_spans.is_empty()
        {
            return Err(ApplyOutcome::NotApplied);
        }
        let inst = self.instance(loc, change, attempt)?;
        let edits: Vec<TextEdit> = node
            .value_spans
            .iter()
            .map(|span| TextEdit::new(*span, inst.value.clone()))
            .collect();
        let before = self.tree.text(loc.node).to_string();
        let local: Vec<TextEdit> = edits
            .iter()
            .map(|e| TextEdit::new(e.span.shifted(-(node.span.start as isize)), e.text.clone()))
            .collect();
        let after = splice(&before, &local);
        Ok(Planned {
            edits,
            before,
            after,
            method: inst.method,
            imports: inst.imports,
        })
    }

    fn plan_replace(&self, loc: &TargetLocation, change: &Change, attempt: usize) -> Result<Planned, ApplyOutcome> {
        let node = self.tree.node(loc.node);
        let both_statements = change.is_statement() && node.statement;
        if loc.kind != InsertionKind::NotApplicable || !(change.anchor.shape == loc.shape || both_statements) {
            return Err(ApplyOutcome::NotApplied);
        }
        let inst = self.instance(loc, change, attempt)?;
        let (span, text) = if both_statements {
            (node.statement_span(), inst.text)
        } else {
            (node.span, inst.expr_text)
        };
        Ok(Planned {
            edits: vec![TextEdit::new(span, text.clone())],
            before: self.tree.source().get(span.start..span.end).unwrap_or("").to_string(),
            after: text,
            method: inst.method,
            imports: inst.imports,
        })
    }
}

/// Operands of a flattened infix chain in source order.
fn operands_of(tree: &Tree, infix: NodeId) -> Vec<NodeId> {
    tree.children(infix)
        .iter()
        .copied()
        .filter(|c| tree.node(*c).slot.as_ref().is_some_and(|s| slots::is_operand(&s.name)))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Anchor;
    use crate::testing::Sketch;
    use crate::tree::{Category, Role};

    /// A front end over a pre-built tree; the file has one import.
    struct Fixed(Tree);

    impl FrontEnd for Fixed {
        fn language(&self) -> &str {
            "test"
        }
        fn file_extension(&self) -> &str {
            "java"
        }
        fn parse(&self, _source: &str) -> Result<Tree, FrontEndError> {
            Ok(self.0.clone())
        }
        fn import_declaration(&self, qualified_name: &str) -> String {
            format!("import {};", qualified_name)
        }
    }

    const SRC: &str = "import a.B;\nclass K {\n  void m(int x, int y) {\n    if (x == y) {\n      go(x);\n    }\n    x = x + y + 1;\n  }\n}\n";

    struct Fixture {
        patcher: Patcher,
        cond: NodeId,
        call: NodeId,
        assign: NodeId,
        sum: NodeId,
        then: NodeId,
        go: NodeId,
    }

    fn fixture() -> Fixture {
        let mut s = Sketch::new(SRC);
        let root = s.root();
        let import = s.add(root, kinds::IMPORT_DECLARATION, Category::Declaration, "import a.B;", "imports[]");
        s.set(import).value = "a.B".to_string();
        let class = s.add(root, "TypeDeclaration", Category::Declaration, &SRC[12..SRC.len() - 1], "types[]");
        let m = s.add(
            class,
            kinds::METHOD_DECLARATION,
            Category::Declaration,
            &SRC[SRC.find("void m").unwrap()..SRC.len() - 3],
            "bodyDeclarations[]",
        );
        s.set(m).scope = true;
        for p in ["x", "y"] {
            let id = s.name(m, p, Role::Variable, Some("int"), "parameters[]");
            s.set(id).declaration = true;
        }
        let body = s.stmt(m, kinds::BLOCK, &SRC[SRC.find("{\n    if").unwrap()..SRC.len() - 3], "body");
        s.set(body).scope = true;
        let iff = s.stmt(body, kinds::IF_STATEMENT, "if (x == y) {\n      go(x);\n    }", "statements[]");
        let cond = s.expr(iff, kinds::INFIX_EXPRESSION, "x == y", "expression");
        s.name(cond, "x", Role::Variable, Some("int"), "leftOperand");
        s.name(cond, "y", Role::Variable, Some("int"), "rightOperand");
        s.operator(cond);
        s.set(cond).declared_type = Some("boolean".to_string());
        let then = s.stmt(iff, kinds::BLOCK, "{\n      go(x);\n    }", "thenStatement");
        let call = s.expr_stmt(then, kinds::METHOD_INVOCATION, "go(x);", "statements[]");
        let go = s.name(call, "go", Role::Method, None, "name");
        s.name(call, "x", Role::Variable, Some("int"), "arguments[]");
        let assign = s.expr_stmt(body, "Assignment", "x = x + y + 1;", "statements[]");
        s.name(assign, "x", Role::Variable, Some("int"), "leftHandSide");
        let sum = s.expr(assign, kinds::INFIX_EXPRESSION, "x + y + 1", "rightHandSide");
        s.name(sum, "x", Role::Variable, Some("int"), "leftOperand");
        s.name(sum, "y", Role::Variable, Some("int"), "rightOperand");
        s.literal(sum, "NumberLiteral", "1", "int", "extendedOperands[]");
        s.operator(sum);
        s.set(sum).declared_type = Some("int".to_string());
        let tree = s.finish();
        let front_end: Rc<dyn FrontEnd> = Rc::new(Fixed(tree.clone()));
        Fixture {
            patcher: Patcher::from_tree("K", tree, front_end, ConcretizationStrategy::TypeCompatible),
            cond,
            call,
            assign,
            sum,
            then,
            go,
        }
    }

    fn loc(f: &Fixture, node: NodeId, kind: InsertionKind) -> TargetLocation {
        TargetLocation::at(f.patcher.tree(), "K", node, kind)
    }

    fn comparison(op: &str, names: (&str, &str)) -> (Tree, NodeId) {
        let source = format!("{} {} {}", names.0, op, names.1);
        let mut s = Sketch::new(&source);
        let root = s.root();
        let infix = s.expr(root, kinds::INFIX_EXPRESSION, &source, "expression");
        s.name(infix, names.0, Role::Variable, Some("int"), "leftOperand");
        s.name(infix, names.1, Role::Variable, Some("int"), "rightOperand");
        s.operator(infix);
        s.set(infix).declared_type = Some("boolean".to_string());
        (s.finish(), infix)
    }

    fn replace(from: &str, to: &str, requirements: &[&str]) -> Change {
        let (before, b) = comparison(from, ("x", "y"));
        let (after, a) = comparison(to, ("x", "y"));
        Change::new(
            "p:m:0",
            ChangeKind::Replace,
            after.copy_subtree(a),
            Anchor::of(&before, b),
            requirements.iter().map(|r| r.to_string()).collect(),
        )
    }

    /// A statement template `name(arg);` mined from a block.
    fn call_statement(name: &str, arg: &str) -> Change {
        let src = format!("{{ {}({}); }}", name, arg);
        let mut s = Sketch::new(&src);
        let root = s.root();
        let block = s.stmt(root, kinds::BLOCK, &src, "body");
        let call = s.expr_stmt(block, kinds::METHOD_INVOCATION, &format!("{}({});", name, arg), "statements[]");
        s.name(call, name, Role::Method, None, "name");
        s.name(call, arg, Role::Variable, Some("int"), "arguments[]");
        let tree = s.finish();
        Change::new("p:m:1", ChangeKind::Insert, tree.copy_subtree(call), Anchor::of(&tree, block), BTreeSet::new())
    }

    mod replace_and_update {
        use super::*;

        #[test]
        fn operator_replace_renders() {
            let mut f = fixture();
            let l = loc(&f, f.cond, InsertionKind::NotApplicable);
            assert_eq!(f.patcher.apply(&l, &replace("==", "!=", &[]), 0), ApplyOutcome::Applied);
            let out = f.patcher.new_source();
            assert!(out.contains("if (x != y) {"));
            assert_eq!(out.len(), SRC.len());
            let actions = f.patcher.take_actions();
            assert_eq!(actions.len(), 1);
            assert_eq!(actions[0].before, "x == y");
            assert_eq!(actions[0].after, "x != y");
            // The buffer was reset.
            assert_eq!(f.patcher.new_source(), SRC);
        }

        #[test]
        fn shape_mismatch_is_not_applied() {
            let mut f = fixture();
            let l = loc(&f, f.sum, InsertionKind::NotApplicable);
            assert_eq!(f.patcher.apply(&l, &replace("==", "!=", &[]), 0), ApplyOutcome::NotApplied);
        }

        #[test]
        fn identical_replacement_is_no_change() {
            let mut f = fixture();
            let l = loc(&f, f.cond, InsertionKind::NotApplicable);
            let change = replace("<", "==", &[]);
            let mut same_anchor = change.clone();
            same_anchor.anchor = Anchor::of(f.patcher.tree(), f.cond);
            assert_eq!(f.patcher.apply(&l, &same_anchor, 0), ApplyOutcome::NoChange);
        }

        #[test]
        fn update_swaps_operator_value() {
            let mut f = fixture();
            let (before, b) = comparison("==", ("x", "y"));
            let (after, a) = comparison("<=", ("x", "y"));
            let change = Change::new(
                "u",
                ChangeKind::Update,
                after.copy_subtree(a),
                Anchor::of(&before, b),
                BTreeSet::new(),
            );
            let l = loc(&f, f.cond, InsertionKind::NotApplicable);
            assert_eq!(f.patcher.apply(&l, &change, 0), ApplyOutcome::Applied);
            assert!(f.patcher.new_source().contains("if (x <= y)"));
        }

        #[test]
        fn stale_location_is_rejected() {
            let mut f = fixture();
            let mut l = loc(&f, f.cond, InsertionKind::NotApplicable);
            l.node = NodeId(9999);
            assert_eq!(f.patcher.apply(&l, &replace("==", "!=", &[]), 0), ApplyOutcome::NoFixLocation);
        }
    }

    mod delete {
        use super::*;

        #[test]
        fn statement_removal_takes_the_line() {
            let mut f = fixture();
            let tree = f.patcher.tree().clone();
            let change = Change::new(
                "d",
                ChangeKind::Delete,
                tree.copy_subtree(f.assign),
                Anchor::of(&tree, tree.parent(f.assign).unwrap()),
                BTreeSet::new(),
            );
            let l = loc(&f, f.assign, InsertionKind::NotApplicable);
            assert_eq!(f.patcher.apply(&l, &change, 0), ApplyOutcome::Applied);
            let out = f.patcher.new_source();
            assert!(!out.contains("x = x + y + 1;"));
            assert!(out.contains("    }\n  }\n}\n"));
        }

        #[test]
        fn operand_removal_keeps_chain() {
            let mut f = fixture();
            let tree = f.patcher.tree().clone();
            let y = tree.children(f.sum)[1];
            let change = Change::new("d", ChangeKind::Delete, tree.copy_subtree(y), Anchor::of(&tree, f.sum), BTreeSet::new());
            let l = loc(&f, y, InsertionKind::NotApplicable);
            assert_eq!(f.patcher.apply(&l, &change, 0), ApplyOutcome::Applied);
            assert!(f.patcher.new_source().contains("x = x + 1;"));
        }

        #[test]
        fn mandatory_slot_is_kept() {
            let mut f = fixture();
            let tree = f.patcher.tree().clone();
            let change = Change::new("d", ChangeKind::Delete, tree.copy_subtree(f.cond), Anchor::of(&tree, f.cond), BTreeSet::new());
            let l = loc(&f, f.cond, InsertionKind::NotApplicable);
            assert_eq!(f.patcher.apply(&l, &change, 0), ApplyOutcome::NotApplied);
        }
    }

    mod insert {
        use super::*;

        #[test]
        fn statement_before_keeps_indent() {
            let mut f = fixture();
            let l = loc(&f, f.call, InsertionKind::Before);
            assert_eq!(f.patcher.apply(&l, &call_statement("log", "y"), 0), ApplyOutcome::Applied);
            let out = f.patcher.new_source();
            assert!(out.contains("      log(y);\n      go(x);\n"), "{}", out);
        }

        #[test]
        fn statement_after_and_under() {
            let mut f = fixture();
            let after = loc(&f, f.call, InsertionKind::After);
            assert_eq!(f.patcher.apply(&after, &call_statement("log", "y"), 0), ApplyOutcome::Applied);
            assert!(f.patcher.new_source().contains("      go(x);\n      log(y);\n"));
            let under = loc(&f, f.then, InsertionKind::Under);
            assert_eq!(f.patcher.apply(&under, &call_statement("log", "y"), 0), ApplyOutcome::Applied);
            assert!(f.patcher.new_source().contains("{\n      log(y);\n      go(x);"));
        }

        #[test]
        fn operand_joins_chain() {
            let mut f = fixture();
            let tree = f.patcher.tree().clone();
            let one = tree.children(f.sum)[2];
            let change = Change::new("i", ChangeKind::Insert, tree.copy_subtree(one), Anchor::of(&tree, f.sum), BTreeSet::new());
            let l = loc(&f, one, InsertionKind::After);
            assert_eq!(f.patcher.apply(&l, &change, 0), ApplyOutcome::Applied);
            assert!(f.patcher.new_source().contains("x = x + y + 1 + 1;"));
        }

        #[test]
        fn wrong_slot_is_not_applied() {
            let mut f = fixture();
            let l = loc(&f, f.go, InsertionKind::Before);
            assert_eq!(f.patcher.apply(&l, &call_statement("log", "y"), 0), ApplyOutcome::NotApplied);
        }
    }

    mod imports {
        use super::*;

        #[test]
        fn import_added_once_across_changes() {
            let mut f = fixture();
            let l = loc(&f, f.cond, InsertionKind::NotApplicable);
            let first = replace("==", "!=", &["java.util.List"]);
            assert_eq!(f.patcher.apply(&l, &first, 0), ApplyOutcome::Applied);
            let call = loc(&f, f.call, InsertionKind::After);
            let mut stmt = call_statement("log", "y");
            for name in ["java.util.List", "a.B", "java.lang.String"] {
                stmt.requirements.insert(name.to_string());
            }
            assert_eq!(f.patcher.apply(&call, &stmt, 0), ApplyOutcome::Applied);
            let out = f.patcher.new_source();
            assert_eq!(out.matches("import java.util.List;").count(), 1);
            assert!(out.starts_with("import a.B;\nimport java.util.List;\nclass K"));
            assert_eq!(out.matches("import a.B;").count(), 1);
            assert!(!out.contains("java.lang.String"));
            let actions = f.patcher.take_actions();
            assert_eq!(actions[0].imports, vec!["java.util.List".to_string()]);
            assert!(actions[1].imports.is_empty());
        }
    }
}
