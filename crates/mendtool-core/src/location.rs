//! Fix locations and the location strategy.
//!
//! A [`TargetLocation`] is a node plus an insertion kind. Locations are
//! collected per source line; the [`LocationStrategy`] walks ranked lines
//! with an outer cursor and the line's locations with an inner cursor,
//! computing each location's compatible changes on first visit.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::change::{Change, ChangeKind};
use crate::concretize::ConcretizationStrategy;
use crate::frontend::{kinds, slots};
use crate::pool::{ChangeId, ChangePool};
use crate::tree::{NodeId, Role, SlotDesc, Tree};
use crate::types::ContentHash;

// ============================================================================
// Target Locations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionKind {
    Before,
    After,
    Under,
    NotApplicable,
}

impl InsertionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertionKind::Before => "before",
            InsertionKind::After => "after",
            InsertionKind::Under => "under",
            InsertionKind::NotApplicable => "n/a",
        }
    }
}

/// A candidate fix point with the node facts matching needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLocation {
    pub class: String,
    pub node: NodeId,
    pub kind: InsertionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotDesc>,
    pub node_kind: String,
    pub shape: ContentHash,
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub statement: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_kind: Option<String>,
}

impl TargetLocation {
    /// Snapshot `node` of `tree` as a location.
    pub fn at(tree: &Tree, class: &str, node: NodeId, kind: InsertionKind) -> Self {
        let data = tree.node(node);
        TargetLocation {
            class: class.to_string(),
            node,
            kind,
            slot: data.slot.clone(),
            node_kind: data.kind.clone(),
            shape: tree.shape_hash(node),
            label: data.label(),
            value: data.value.clone(),
            role: data.role,
            statement: data.statement,
            declared_type: data.declared_type.clone(),
            line: data.start_line,
            parent_kind: data.parent.map(|p| tree.node(p).kind.clone()),
        }
    }

    /// `Class#line`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.class, self.line)
    }

    fn slot_is(&self, parent_kind: &str, name: &str) -> bool {
        self.slot.as_ref().is_some_and(|s| s.is(parent_kind, name))
    }
}

fn is_operand_slot(slot: Option<&SlotDesc>) -> bool {
    slot.is_some_and(|s| s.parent_kind == kinds::INFIX_EXPRESSION && slots::is_operand(&s.name))
}

/// All locations for nodes that start on `line`, in tree order.
pub fn locations_on_line(tree: &Tree, class: &str, line: u32) -> Vec<TargetLocation> {
    let mut out = Vec::new();
    for id in tree.nodes_starting_on(line) {
        let node = tree.node(id);
        if node.parent.is_none()
            || tree.ancestors(id).chain([id]).any(|a| {
                let k = &tree.node(a).kind;
                k == kinds::IMPORT_DECLARATION || k == kinds::PACKAGE_DECLARATION
            })
        {
            continue;
        }
        let mut push = |kind| out.push(TargetLocation::at(tree, class, id, kind));
        push(InsertionKind::NotApplicable);

        let parent = node.parent;
        let sibling_in = |slot: &str| parent.is_some_and(|p| !tree.children_in_slot(p, slot).is_empty());
        let list_statement = node.statement && node.slot.as_ref().is_some_and(|s| s.list);
        if list_statement || is_operand_slot(node.slot.as_ref()) {
            push(InsertionKind::Before);
            push(InsertionKind::After);
        }
        if node.kind == kinds::BLOCK {
            push(InsertionKind::Under);
        }
        if node.slot_is(kinds::IF_STATEMENT, slots::THEN) && !sibling_in(slots::ELSE) {
            push(InsertionKind::After);
        }
        if node.slot_is(kinds::METHOD_INVOCATION, slots::NAME) && !sibling_in(slots::EXPRESSION) {
            push(InsertionKind::Before);
        }
    }
    out
}

/// Whether an insertion at `loc` may place a payload that was mined in
/// `payload_slot`.
pub fn slot_accepts(loc: &TargetLocation, payload_slot: Option<&SlotDesc>) -> bool {
    let Some(payload_slot) = payload_slot else {
        return false;
    };
    match loc.kind {
        InsertionKind::NotApplicable => false,
        InsertionKind::Under => {
            loc.node_kind == kinds::BLOCK && payload_slot.is(kinds::BLOCK, slots::STATEMENTS)
        }
        InsertionKind::Before | InsertionKind::After => {
            if is_operand_slot(loc.slot.as_ref()) {
                return is_operand_slot(Some(payload_slot));
            }
            if loc.kind == InsertionKind::After && loc.slot_is(kinds::IF_STATEMENT, slots::THEN) {
                return payload_slot.is(kinds::IF_STATEMENT, slots::ELSE);
            }
            if loc.kind == InsertionKind::Before && loc.slot_is(kinds::METHOD_INVOCATION, slots::NAME) {
                return payload_slot.is(kinds::METHOD_INVOCATION, slots::EXPRESSION);
            }
            match &loc.slot {
                Some(slot) => {
                    slot.list && slot.parent_kind == payload_slot.parent_kind && slot.name == payload_slot.name
                }
                None => false,
            }
        }
    }
}

// ============================================================================
// Location Strategy
// ============================================================================

/// One fault-localization entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoveredLine {
    pub class: String,
    pub line: u32,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LocationStrategyKind {
    /// Walk lines by suspiciousness.
    Ranked,
    /// A single known faulty line.
    Perfect { class: String, line: u32 },
}

/// Builds locations for a line on demand.
pub trait LocationSource {
    /// Locations on `line` of `class`; empty when the class cannot be
    /// loaded.
    fn locations(&mut self, class: &str, line: u32) -> Vec<TargetLocation>;
}

/// Counters written to `locinfo.csv`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStats {
    pub checked_lines: usize,
    pub locations: usize,
    pub changes: usize,
    pub applied: usize,
}

pub struct LocationStrategy {
    kind: LocationStrategyKind,
    compat: ConcretizationStrategy,
    lines: Vec<CoveredLine>,
    line_cursor: Option<usize>,
    locations: Vec<TargetLocation>,
    loc_cursor: usize,
    candidates: Option<VecDeque<ChangeId>>,
    change_count: usize,
    report: Vec<String>,
    stats: LocationStats,
}

impl LocationStrategy {
    /// Rank `lines` for the walk. In ranked mode, lines scoring zero or less
    /// are dropped and the rest are ordered by score, ties keeping input
    /// order. Perfect mode ignores `lines`.
    pub fn new(kind: LocationStrategyKind, compat: ConcretizationStrategy, lines: Vec<CoveredLine>) -> Self {
        let lines = match &kind {
            LocationStrategyKind::Ranked => {
                let mut ranked: Vec<CoveredLine> = lines.into_iter().filter(|l| l.score > 0.0).collect();
                ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
                ranked
            }
            LocationStrategyKind::Perfect { class, line } => vec![CoveredLine {
                class: class.clone(),
                line: *line,
                score: 1.0,
            }],
        };
        LocationStrategy {
            kind,
            compat,
            lines,
            line_cursor: None,
            locations: Vec::new(),
            loc_cursor: 0,
            candidates: None,
            change_count: 0,
            report: Vec::new(),
            stats: LocationStats::default(),
        }
    }

    pub fn kind(&self) -> &LocationStrategyKind {
        &self.kind
    }

    pub fn covered_lines(&self) -> &[CoveredLine] {
        &self.lines
    }

    fn current_line(&self) -> Option<&CoveredLine> {
        self.line_cursor.and_then(|i| self.lines.get(i))
    }

    pub fn current_location(&self) -> Option<&TargetLocation> {
        self.locations.get(self.loc_cursor)
    }

    pub fn current_key(&self) -> Option<String> {
        self.current_line().map(|l| format!("{}#{}", l.class, l.line))
    }

    pub fn current_class(&self) -> Option<&str> {
        self.current_line().map(|l| l.class.as_str())
    }

    /// Changes handed out at the current location.
    pub fn change_count(&self) -> usize {
        self.change_count
    }

    pub fn stats(&self) -> LocationStats {
        self.stats
    }

    pub fn mark_applied(&mut self) {
        self.stats.applied += 1;
    }

    /// The current location, advancing past exhausted ones and locations
    /// with no compatible change. `None` once every line is consumed.
    pub fn select_location(
        &mut self,
        pool: &mut ChangePool,
        source: &mut dyn LocationSource,
    ) -> Option<TargetLocation> {
        loop {
            if self.loc_cursor < self.locations.len() {
                if self.candidates.is_none() {
                    let loc = self.locations[self.loc_cursor].clone();
                    let found = self.find_candidate_changes(&loc, pool);
                    self.record(&loc, found.len());
                    if found.is_empty() {
                        self.loc_cursor += 1;
                        continue;
                    }
                    self.stats.changes += found.len();
                    self.candidates = Some(found.into());
                    self.change_count = 0;
                }
                return Some(self.locations[self.loc_cursor].clone());
            }

            let next = self.line_cursor.map_or(0, |c| c + 1);
            let Some(line) = self.lines.get(next).cloned() else {
                self.line_cursor = Some(self.lines.len());
                return None;
            };
            self.line_cursor = Some(next);
            self.locations = source.locations(&line.class, line.line);
            self.loc_cursor = 0;
            self.candidates = None;
            self.stats.checked_lines += 1;
            self.stats.locations += self.locations.len();
            debug!(
                class = %line.class,
                line = line.line,
                score = line.score,
                locations = self.locations.len(),
                "visiting line"
            );
        }
    }

    /// Pop the next candidate at the current location. When the list is
    /// exhausted the strategy moves to the next location and returns `None`.
    pub fn select_change(&mut self) -> Option<ChangeId> {
        match self.candidates.as_mut().and_then(|c| c.pop_front()) {
            Some(id) => {
                self.change_count += 1;
                Some(id)
            }
            None => {
                self.next_location();
                None
            }
        }
    }

    /// Abandon the current location.
    pub fn next_location(&mut self) {
        if self.loc_cursor < self.locations.len() {
            self.loc_cursor += 1;
        }
        self.candidates = None;
        self.change_count = 0;
    }

    /// Pool changes compatible with `loc`, most frequent first. Changes that
    /// fail to load are skipped.
    pub fn find_candidate_changes(&self, loc: &TargetLocation, pool: &mut ChangePool) -> Vec<ChangeId> {
        let ids: Vec<ChangeId> = pool.change_iterator().collect();
        let mut found = Vec::new();
        for id in ids {
            match pool.get_change(id) {
                Ok(change) => {
                    if self.change_matches(&change, loc) {
                        found.push(id);
                    }
                }
                Err(e) => warn!(id = id.0, error = %e, "skipping unreadable change"),
            }
        }
        found.sort_by_key(|id| std::cmp::Reverse(pool.frequency(*id)));
        found
    }

    /// Structural compatibility of a change with a location.
    pub fn change_matches(&self, change: &Change, loc: &TargetLocation) -> bool {
        let payload = change.payload.node(change.root());
        let both_statements = payload.statement && loc.statement;
        match change.kind {
            ChangeKind::Insert => {
                slot_accepts(loc, change.payload_slot())
                    && (both_statements
                        || self.compat.compatible(
                            loc.declared_type.as_deref(),
                            payload.declared_type.as_deref(),
                            &BTreeMap::new(),
                        ))
            }
            ChangeKind::Delete => {
                loc.kind == InsertionKind::NotApplicable
                    && change.payload_shape() == loc.shape
                    && payload.role == loc.role
            }
            ChangeKind::Update => {
                if loc.kind != InsertionKind::NotApplicable || payload.kind != loc.node_kind {
                    return false;
                }
                if !change.is_normalized() && payload.value == loc.value {
                    return false;
                }
                change.anchor.shape == loc.shape
                    || both_statements
                    || (payload.role == loc.role
                        && (change.is_normalized() || change.anchor.label() == loc.label))
            }
            ChangeKind::Replace => {
                loc.kind == InsertionKind::NotApplicable
                    && change.payload_shape() != loc.shape
                    && (change.anchor.shape == loc.shape || both_statements)
            }
        }
    }

    fn record(&mut self, loc: &TargetLocation, freq: usize) {
        let score = self.current_line().map_or(0.0, |l| l.score);
        self.report.push(format!(
            "{}$${}$${}#{}:{}:{:.4}",
            loc.kind.as_str(),
            loc.label,
            loc.class,
            loc.line,
            freq,
            score
        ));
    }

    /// Visited locations, one line each.
    pub fn report(&self) -> &[String] {
        &self.report
    }

    pub fn report_text(&self) -> String {
        self.report.iter().fold(String::new(), |mut out, line| {
            let _ = writeln!(out, "{}", line);
            out
        })
    }

    /// Ranked lines as `Class#line,score`.
    pub fn covered_lines_text(&self) -> String {
        self.lines.iter().fold(String::new(), |mut out, l| {
            let _ = writeln!(out, "{}#{},{}", l.class, l.line, l.score);
            out
        })
    }

    pub fn locinfo_csv(&self) -> String {
        format!(
            "checked_lines,locations,changes,applied\n{},{},{},{}\n",
            self.stats.checked_lines, self.stats.locations, self.stats.changes, self.stats.applied
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Anchor;
    use crate::testing::Sketch;
    use crate::tree::Category;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    /// Line 1: class header; line 2: `if (a == b) {`; line 3: `foo(a);`.
    fn method() -> Tree {
        let src = "class K {\n  void m() { if (a == b) {\n    foo(a);\n  } }\n}\n";
        let mut s = Sketch::new(src);
        let root = s.root();
        let class = s.add(root, "TypeDeclaration", Category::Declaration, &src[..src.len() - 1], "types[]");
        let m = s.add(
            class,
            "MethodDeclaration",
            Category::Declaration,
            "void m() { if (a == b) {\n    foo(a);\n  } }",
            "bodyDeclarations[]",
        );
        let body = s.stmt(m, "Block", "{ if (a == b) {\n    foo(a);\n  } }", "body");
        let iff = s.stmt(body, "IfStatement", "if (a == b) {\n    foo(a);\n  }", "statements[]");
        let cond = s.expr(iff, "InfixExpression", "a == b", "expression");
        s.name(cond, "a", Role::Variable, Some("int"), "leftOperand");
        s.name(cond, "b", Role::Variable, Some("int"), "rightOperand");
        s.operator(cond);
        s.set(cond).declared_type = Some("boolean".to_string());
        let then = s.stmt(iff, "Block", "{\n    foo(a);\n  }", "thenStatement");
        let call = s.expr_stmt(then, "MethodInvocation", "foo(a);", "statements[]");
        s.name(call, "foo", Role::Method, None, "name");
        s.name(call, "a", Role::Variable, Some("int"), "arguments[]");
        s.finish()
    }

    fn comparison(op: &str) -> (Tree, NodeId) {
        let source = format!("a {} b", op);
        let mut s = Sketch::new(&source);
        let root = s.root();
        let infix = s.expr(root, kinds::INFIX_EXPRESSION, &source, "expression");
        s.name(infix, "a", Role::Variable, Some("int"), "leftOperand");
        s.name(infix, "b", Role::Variable, Some("int"), "rightOperand");
        s.operator(infix);
        (s.finish(), infix)
    }

    fn replace_eq_with_ne() -> Change {
        let (before, b) = comparison("==");
        let (after, a) = comparison("!=");
        Change::new("p:m:0", ChangeKind::Replace, after.copy_subtree(a), Anchor::of(&before, b), BTreeSet::new())
    }

    struct OneFile(Tree);

    impl LocationSource for OneFile {
        fn locations(&mut self, class: &str, line: u32) -> Vec<TargetLocation> {
            locations_on_line(&self.0, class, line)
        }
    }

    fn line(class: &str, line: u32, score: f64) -> CoveredLine {
        CoveredLine {
            class: class.to_string(),
            line,
            score,
        }
    }

    mod collection {
        use super::*;

        #[test]
        fn kinds_on_condition_line() {
            let tree = method();
            let locs = locations_on_line(&tree, "K", 2);
            let summary: Vec<(String, InsertionKind)> =
                locs.iter().map(|l| (l.node_kind.clone(), l.kind)).collect();
            assert!(summary.contains(&("IfStatement".to_string(), InsertionKind::Before)));
            assert!(summary.contains(&("InfixExpression".to_string(), InsertionKind::NotApplicable)));
            assert!(summary.contains(&("SimpleName".to_string(), InsertionKind::After)));
            // The then-block has no else sibling, and opens on this line.
            let then_after = locs
                .iter()
                .filter(|l| l.node_kind == "Block" && l.kind == InsertionKind::After)
                .count();
            assert_eq!(then_after, 1);
            assert!(locs.iter().any(|l| l.kind == InsertionKind::Under));
        }

        #[test]
        fn call_name_gets_receiver_slot() {
            let tree = method();
            let locs = locations_on_line(&tree, "K", 3);
            assert!(locs
                .iter()
                .any(|l| l.value == "foo" && l.kind == InsertionKind::Before));
            assert!(locs.iter().all(|l| l.line == 3));
        }

        #[test]
        fn operand_slots_accept_operands() {
            let tree = method();
            let locs = locations_on_line(&tree, "K", 2);
            let left = locs
                .iter()
                .find(|l| l.value == "a" && l.kind == InsertionKind::Before)
                .unwrap();
            let operand = SlotDesc::new(kinds::INFIX_EXPRESSION, slots::EXTENDED_OPERANDS, true);
            assert!(slot_accepts(left, Some(&operand)));
            let statement = SlotDesc::new(kinds::BLOCK, slots::STATEMENTS, true);
            assert!(!slot_accepts(left, Some(&statement)));
        }
    }

    mod strategy {
        use super::*;

        #[test]
        fn ranking_drops_nonpositive_and_keeps_ties() {
            let s = LocationStrategy::new(
                LocationStrategyKind::Ranked,
                ConcretizationStrategy::TypeCompatible,
                vec![line("A", 1, 0.5), line("B", 2, 0.0), line("C", 3, 0.9), line("D", 4, 0.5)],
            );
            let order: Vec<&str> = s.covered_lines().iter().map(|l| l.class.as_str()).collect();
            assert_eq!(order, vec!["C", "A", "D"]);
        }

        #[test]
        fn perfect_mode_visits_one_line() {
            let s = LocationStrategy::new(
                LocationStrategyKind::Perfect {
                    class: "K".to_string(),
                    line: 2,
                },
                ConcretizationStrategy::TypeCompatible,
                vec![line("A", 1, 0.5)],
            );
            assert_eq!(s.covered_lines(), &[line("K", 2, 1.0)]);
        }

        #[test]
        fn comparison_selected_first() {
            let dir = TempDir::new().unwrap();
            let mut pool = ChangePool::open(dir.path(), 10).unwrap();
            let id = pool.add(&replace_eq_with_ne(), 1).unwrap();
            let mut source = OneFile(method());
            let mut s = LocationStrategy::new(
                LocationStrategyKind::Ranked,
                ConcretizationStrategy::TypeCompatible,
                vec![line("K", 2, 1.0)],
            );
            let loc = s.select_location(&mut pool, &mut source).unwrap();
            assert_eq!(loc.node_kind, "InfixExpression");
            assert_eq!(loc.kind, InsertionKind::NotApplicable);
            assert_eq!(s.current_key().as_deref(), Some("K#2"));
            assert_eq!(s.select_change(), Some(id));
            assert_eq!(s.change_count(), 1);
            assert_eq!(s.select_change(), None);
            assert!(s.select_location(&mut pool, &mut source).is_none());
            assert!(s.report().iter().any(|r| r == "n/a$$InfixExpression::==$$K#2:1:1.0000"));
        }

        #[test]
        fn incompatible_line_is_skipped() {
            let dir = TempDir::new().unwrap();
            let mut pool = ChangePool::open(dir.path(), 10).unwrap();
            pool.add(&replace_eq_with_ne(), 1).unwrap();
            let mut source = OneFile(method());
            let mut s = LocationStrategy::new(
                LocationStrategyKind::Ranked,
                ConcretizationStrategy::TypeCompatible,
                vec![line("K", 3, 1.0)],
            );
            assert!(s.select_location(&mut pool, &mut source).is_none());
            assert_eq!(s.stats().checked_lines, 1);
            assert_eq!(s.stats().changes, 0);
            assert!(s.stats().locations > 0);
        }

        #[test]
        fn delete_requires_equal_shape() {
            let tree = method();
            let s = LocationStrategy::new(LocationStrategyKind::Ranked, ConcretizationStrategy::TypeCompatible, vec![]);
            let (t, node) = comparison("==");
            let delete = Change::new("d", ChangeKind::Delete, t.copy_subtree(node), Anchor::of(&t, node), BTreeSet::new());
            let locs = locations_on_line(&tree, "K", 2);
            let matching: Vec<&TargetLocation> = locs.iter().filter(|l| s.change_matches(&delete, l)).collect();
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0].node_kind, "InfixExpression");
        }

        #[test]
        fn replace_with_same_shape_is_a_no_op() {
            let tree = method();
            let s = LocationStrategy::new(LocationStrategyKind::Ranked, ConcretizationStrategy::TypeCompatible, vec![]);
            let (t, node) = comparison("==");
            let same = Change::new("r", ChangeKind::Replace, t.copy_subtree(node), Anchor::of(&t, node), BTreeSet::new());
            let locs = locations_on_line(&tree, "K", 2);
            assert!(!locs.iter().any(|l| s.change_matches(&same, l)));
        }

        #[test]
        fn report_text_and_csv() {
            let s = LocationStrategy::new(
                LocationStrategyKind::Ranked,
                ConcretizationStrategy::TypeCompatible,
                vec![line("K", 2, 0.25)],
            );
            assert_eq!(s.covered_lines_text(), "K#2,0.25\n");
            assert_eq!(s.locinfo_csv(), "checked_lines,locations,changes,applied\n0,0,0,0\n");
            assert_eq!(s.report_text(), "");
        }
    }
}
