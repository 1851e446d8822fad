//! Change extraction from before/after pairs.
//!
//! Turns an edit script into deduplicated [`Change`]s:
//!
//! 1. Moves are split into a delete at the source and an insert at the
//!    destination.
//! 2. Operations on import and package declarations are dropped.
//! 3. Operations inside a subtree that is itself inserted or deleted are
//!    subsumed by the outer operation.
//! 4. A delete and an insert at the same matched parent and position merge
//!    into one replace.
//! 5. Changes are deduplicated by content hash; repeats add frequency.
//!
//! Operator-family leaves also yield synthetic sibling variants, see
//! [`OPERATOR_FAMILIES`].

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::change::{Anchor, Change, ChangeKind};
use crate::frontend::{kinds, EditOp, EditScript, FrontEnd};
use crate::pool::{ChangePool, PoolResult};
use crate::tree::{Category, NodeId, Tree};
use crate::types::ContentHash;

// ============================================================================
// Operator Families
// ============================================================================

/// A fixed set of interchangeable operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorFamily {
    pub name: &'static str,
    pub operators: &'static [&'static str],
}

/// The operator families used for variant synthesis. Membership is fixed;
/// operators outside these families never produce variants.
pub const OPERATOR_FAMILIES: &[OperatorFamily] = &[
    OperatorFamily {
        name: "comparison",
        operators: &["==", "!=", "<", "<=", ">", ">="],
    },
    OperatorFamily {
        name: "boolean",
        operators: &["&&", "||"],
    },
    OperatorFamily {
        name: "arithmetic",
        operators: &["+", "-", "*", "/", "%"],
    },
    OperatorFamily {
        name: "increment",
        operators: &["++", "--"],
    },
];

pub fn family_of(operator: &str) -> Option<&'static OperatorFamily> {
    OPERATOR_FAMILIES
        .iter()
        .find(|f| f.operators.contains(&operator))
}

/// Productions whose value is an operator token.
pub fn is_operator_kind(kind: &str) -> bool {
    matches!(
        kind,
        kinds::INFIX_EXPRESSION | kinds::PREFIX_EXPRESSION | kinds::POSTFIX_EXPRESSION
    )
}

// ============================================================================
// Extraction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Logical {
    Insert(NodeId),
    Delete(NodeId),
    Update(NodeId, NodeId),
    Replace(NodeId, NodeId),
}

/// A deduplicated change and how often it was produced.
#[derive(Debug, Clone)]
pub struct MinedChange {
    pub change: Change,
    pub freq: u64,
    pub synthetic: bool,
}

/// Counts from mining one pair into a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MineStats {
    pub observed: usize,
    pub synthetic: usize,
    pub new_in_pool: usize,
}

#[derive(Debug, Clone)]
pub struct ChangeExtractor {
    synthesize: bool,
}

impl Default for ChangeExtractor {
    fn default() -> Self {
        ChangeExtractor { synthesize: true }
    }
}

impl ChangeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable operator-family variant synthesis.
    pub fn with_synthesis(mut self, synthesize: bool) -> Self {
        self.synthesize = synthesize;
        self
    }

    /// Extract deduplicated changes from one before/after pair.
    pub fn extract(
        &self,
        pair: &str,
        before: &Tree,
        after: &Tree,
        script: &EditScript,
        front_end: &dyn FrontEnd,
    ) -> Vec<MinedChange> {
        if script.is_empty() {
            debug!(pair, "no edits between versions");
            return Vec::new();
        }
        let imports = front_end.imported_names(after);
        let mut out: Vec<MinedChange> = Vec::new();
        let mut index: HashMap<ContentHash, usize> = HashMap::new();
        let mut push = |change: Change, synthetic: bool| match index.get(&change.hash) {
            Some(i) => out[*i].freq += 1,
            None => {
                index.insert(change.hash.clone(), out.len());
                out.push(MinedChange {
                    change,
                    freq: 1,
                    synthetic,
                });
            }
        };

        for logical in logical_ops(before, after, script) {
            let Some(change) = build_change(pair, before, after, logical, &imports) else {
                continue;
            };
            let variants = if self.synthesize {
                synthesize(&change)
            } else {
                Vec::new()
            };
            push(change, false);
            for variant in variants {
                push(variant, true);
            }
        }
        if out.is_empty() {
            warn!(pair, "edit script produced no usable changes");
        }
        out
    }

    /// Extract and add to `pool`.
    pub fn mine_into(
        &self,
        pool: &mut ChangePool,
        pair: &str,
        before: &Tree,
        after: &Tree,
        script: &EditScript,
        front_end: &dyn FrontEnd,
    ) -> PoolResult<MineStats> {
        let mut stats = MineStats::default();
        for mined in self.extract(pair, before, after, script, front_end) {
            let known = pool.id_of(&mined.change.hash).is_some();
            pool.add(&mined.change, mined.freq)?;
            if mined.synthetic {
                stats.synthetic += 1;
            } else {
                stats.observed += 1;
            }
            if !known {
                stats.new_in_pool += 1;
            }
        }
        Ok(stats)
    }
}

fn is_import_like(tree: &Tree, id: NodeId) -> bool {
    let hit = |n: NodeId| {
        let kind = &tree.node(n).kind;
        kind == kinds::IMPORT_DECLARATION || kind == kinds::PACKAGE_DECLARATION
    };
    hit(id) || tree.ancestors(id).any(hit)
}

/// Normalize an edit script into logical operations.
fn logical_ops(before: &Tree, after: &Tree, script: &EditScript) -> Vec<Logical> {
    let mut ops: Vec<Logical> = Vec::new();
    for op in &script.ops {
        match *op {
            EditOp::Insert { node, .. } => ops.push(Logical::Insert(node)),
            EditOp::Delete { node } => ops.push(Logical::Delete(node)),
            EditOp::Update { node, to } => ops.push(Logical::Update(node, to)),
            EditOp::Move { node, to } => {
                ops.push(Logical::Delete(node));
                ops.push(Logical::Insert(to));
            }
        }
    }

    ops.retain(|op| match *op {
        Logical::Insert(a) => !is_import_like(after, a),
        Logical::Delete(b) | Logical::Update(b, _) | Logical::Replace(b, _) => {
            !is_import_like(before, b)
        }
    });

    let inserted: HashSet<NodeId> = ops
        .iter()
        .filter_map(|op| match op {
            Logical::Insert(a) => Some(*a),
            _ => None,
        })
        .collect();
    let deleted: HashSet<NodeId> = ops
        .iter()
        .filter_map(|op| match op {
            Logical::Delete(b) => Some(*b),
            _ => None,
        })
        .collect();
    ops.retain(|op| match *op {
        Logical::Insert(a) => !after.ancestors(a).any(|p| inserted.contains(&p)),
        Logical::Delete(b) | Logical::Update(b, _) | Logical::Replace(b, _) => {
            !before.ancestors(b).any(|p| deleted.contains(&p))
        }
    });

    merge_replacements(before, after, script, ops)
}

/// Collapse a delete and an insert at the same slot of matched parents.
fn merge_replacements(
    before: &Tree,
    after: &Tree,
    script: &EditScript,
    ops: Vec<Logical>,
) -> Vec<Logical> {
    let mut consumed: HashSet<usize> = HashSet::new();
    let mut merged: Vec<(usize, Logical)> = Vec::new();
    for (di, op) in ops.iter().enumerate() {
        let Logical::Delete(b) = *op else { continue };
        let Some(pb) = before.parent(b) else { continue };
        let Some(&pa_match) = script.matches.get(&pb) else {
            continue;
        };
        let b_node = before.node(b);
        let twin = ops.iter().enumerate().find(|(ii, other)| {
            if consumed.contains(ii) {
                return false;
            }
            let Logical::Insert(a) = **other else {
                return false;
            };
            let a_node = after.node(a);
            after.parent(a) == Some(pa_match)
                && a_node.position == b_node.position
                && a_node.slot.as_ref().map(|s| &s.name) == b_node.slot.as_ref().map(|s| &s.name)
        });
        if let Some((ii, Logical::Insert(a))) = twin {
            let a = *a;
            consumed.insert(ii);
            consumed.insert(di);
            merged.push((di, Logical::Replace(b, a)));
        }
    }
    let mut out: Vec<Logical> = Vec::new();
    for (i, op) in ops.into_iter().enumerate() {
        if let Some((_, replace)) = merged.iter().find(|(di, _)| *di == i) {
            out.push(*replace);
        } else if !consumed.contains(&i) {
            out.push(op);
        }
    }
    out
}

fn enclosing_method(tree: &Tree, id: NodeId) -> String {
    tree.ancestors(id)
        .find(|a| tree.node(*a).kind == kinds::METHOD_DECLARATION)
        .map(|m| tree.node(m).value.clone())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "-".to_string())
}

/// Imports of the after file whose simple name appears in the payload.
fn requirements_of(payload: &Tree, imports: &[String]) -> BTreeSet<String> {
    let identifiers: HashSet<&str> = payload
        .source()
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|t| !t.is_empty())
        .collect();
    imports
        .iter()
        .filter(|q| !q.ends_with('*'))
        .filter(|q| {
            let simple = q.rsplit('.').next().unwrap_or(q);
            identifiers.contains(simple)
        })
        .cloned()
        .collect()
}

fn build_change(
    pair: &str,
    before: &Tree,
    after: &Tree,
    op: Logical,
    imports: &[String],
) -> Option<Change> {
    let (kind, payload_tree, payload_node, anchor_tree, anchor_node) = match op {
        Logical::Insert(a) => (ChangeKind::Insert, after, a, after, after.parent(a)?),
        Logical::Delete(b) => (ChangeKind::Delete, before, b, before, before.parent(b)?),
        Logical::Update(b, a) => (ChangeKind::Update, after, a, before, b),
        Logical::Replace(b, a) => (ChangeKind::Replace, after, a, before, b),
    };
    let mut payload = payload_tree.copy_subtree(payload_node);
    if kind == ChangeKind::Update {
        let root = payload.root();
        if matches!(payload.node(root).category, Category::Name | Category::Literal) {
            payload.node_mut(root).normalized = true;
        }
    }
    let requirements = requirements_of(&payload, imports);
    let id = format!(
        "{}:{}:{}",
        pair,
        enclosing_method(payload_tree, payload_node),
        payload_tree.node(payload_node).span.start
    );
    Some(Change::new(
        id,
        kind,
        payload,
        Anchor::of(anchor_tree, anchor_node),
        requirements,
    ))
}

/// Sibling-operator variants of an operator-family change.
///
/// Insert/delete of an operator node yields the same node with every other
/// operator of its family under both kinds (which includes the
/// insert/delete swap). Update/replace of an operator anchor yields a
/// variant per other family operator, excluding the anchor's own operator;
/// a replace whose payload keeps the anchor's production also yields an
/// update.
pub fn synthesize(change: &Change) -> Vec<Change> {
    let root = change.payload.node(change.root());
    let mut out = Vec::new();
    match change.kind {
        ChangeKind::Insert | ChangeKind::Delete => {
            if !is_operator_kind(&root.kind) || root.value_spans.is_empty() {
                return out;
            }
            let Some(family) = family_of(&root.value) else {
                return out;
            };
            for op in family.operators {
                for kind in [ChangeKind::Insert, ChangeKind::Delete] {
                    if kind == change.kind && *op == root.value {
                        continue;
                    }
                    out.push(change.with_payload_value(kind, op));
                }
            }
        }
        ChangeKind::Update | ChangeKind::Replace => {
            let anchor = &change.anchor;
            let same_family = is_operator_kind(&anchor.kind)
                && root.kind == anchor.kind
                && !root.value_spans.is_empty()
                && family_of(&anchor.value).is_some()
                && family_of(&anchor.value) == family_of(&root.value);
            if same_family {
                if let Some(family) = family_of(&anchor.value) {
                    for op in family.operators {
                        if *op != anchor.value && *op != root.value {
                            out.push(change.with_payload_value(change.kind, op));
                        }
                    }
                }
            }
            if change.kind == ChangeKind::Replace && root.kind == anchor.kind {
                out.push(change.with_kind(ChangeKind::Update));
            }
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
