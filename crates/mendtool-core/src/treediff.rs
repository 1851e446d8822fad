//! Default structural differ.
//!
//! `ShapeDiff` matches top-down. Identical subtrees (equal shape hash) match
//! wholesale. Otherwise two nodes of the same kind match, an `Update` is
//! emitted if their values differ, and their child lists are aligned: first
//! by a longest common subsequence over shape hashes, then by pairing
//! same-kind children positionally inside each unaligned gap. Leftover
//! children become deletes and inserts; a delete and an insert of identical
//! shape collapse into a move.

use std::collections::HashSet;

use crate::frontend::{EditOp, EditScript, TreeDiff};
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeDiff;

impl TreeDiff for ShapeDiff {
    fn diff(&self, before: &Tree, after: &Tree) -> EditScript {
        let mut script = EditScript::default();
        if before.is_empty() || after.is_empty() {
            return script;
        }
        let root_b = before.root();
        let root_a = after.root();
        if before.node(root_b).kind != after.node(root_a).kind {
            script.ops.push(EditOp::Delete { node: root_b });
            script.ops.push(EditOp::Insert {
                node: root_a,
                parent: root_a,
                position: 0,
            });
            return script;
        }
        let mut differ = Differ {
            before,
            after,
            script: &mut script,
        };
        differ.match_nodes(root_b, root_a);
        detect_moves(before, after, &mut script);
        script
    }
}

struct Differ<'a> {
    before: &'a Tree,
    after: &'a Tree,
    script: &'a mut EditScript,
}

impl Differ<'_> {
    fn match_nodes(&mut self, b: NodeId, a: NodeId) {
        if self.before.shape_hash(b) == self.after.shape_hash(a) {
            self.match_identical(b, a);
            return;
        }
        self.script.matches.insert(b, a);
        if self.before.node(b).value != self.after.node(a).value {
            self.script.ops.push(EditOp::Update { node: b, to: a });
        }
        self.align_children(b, a);
    }

    fn match_identical(&mut self, b: NodeId, a: NodeId) {
        let bs = self.before.descendants(b);
        let as_ = self.after.descendants(a);
        for (x, y) in bs.into_iter().zip(as_) {
            self.script.matches.insert(x, y);
        }
    }

    fn align_children(&mut self, b: NodeId, a: NodeId) {
        let bc: Vec<NodeId> = self.before.children(b).to_vec();
        let ac: Vec<NodeId> = self.after.children(a).to_vec();
        let anchors = lcs(
            &bc.iter().map(|n| self.before.shape_hash(*n)).collect::<Vec<_>>(),
            &ac.iter().map(|n| self.after.shape_hash(*n)).collect::<Vec<_>>(),
        );

        let mut prev = (0usize, 0usize);
        let bounds = anchors
            .iter()
            .copied()
            .chain(std::iter::once((bc.len(), ac.len())));
        for (bi, ai) in bounds {
            self.align_gap(&bc[prev.0..bi], &ac[prev.1..ai], a);
            if bi < bc.len() && ai < ac.len() {
                self.match_identical(bc[bi], ac[ai]);
            }
            prev = (bi + 1, ai + 1);
        }
    }

    /// Pair same-kind children in order; the rest are deletes and inserts.
    fn align_gap(&mut self, bs: &[NodeId], as_: &[NodeId], after_parent: NodeId) {
        let mut paired_a: HashSet<NodeId> = HashSet::new();
        let mut next_a = 0usize;
        for &b in bs {
            let kind = &self.before.node(b).kind;
            let found = as_[next_a..]
                .iter()
                .position(|a| &self.after.node(*a).kind == kind)
                .map(|i| next_a + i);
            match found {
                Some(i) => {
                    let a = as_[i];
                    paired_a.insert(a);
                    next_a = i + 1;
                    self.match_nodes(b, a);
                }
                None => self.script.ops.push(EditOp::Delete { node: b }),
            }
        }
        for &a in as_ {
            if !paired_a.contains(&a) {
                self.script.ops.push(EditOp::Insert {
                    node: a,
                    parent: after_parent,
                    position: self.after.node(a).position,
                });
            }
        }
    }
}

/// Index pairs of a longest common subsequence, in order.
fn lcs<T: PartialEq>(xs: &[T], ys: &[T]) -> Vec<(usize, usize)> {
    let n = xs.len();
    let m = ys.len();
    let mut table = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if xs[i] == ys[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if xs[i] == ys[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Replace a delete/insert pair of identical shape with a single move.
fn detect_moves(before: &Tree, after: &Tree, script: &mut EditScript) {
    let mut used_inserts: HashSet<usize> = HashSet::new();
    let mut moves: Vec<(usize, usize)> = Vec::new();
    for (di, op) in script.ops.iter().enumerate() {
        let EditOp::Delete { node: b } = op else {
            continue;
        };
        let shape = before.shape_hash(*b);
        let twin = script.ops.iter().enumerate().find(|(ii, other)| {
            !used_inserts.contains(ii)
                && matches!(other, EditOp::Insert { node, .. } if after.shape_hash(*node) == shape)
        });
        if let Some((ii, _)) = twin {
            used_inserts.insert(ii);
            moves.push((di, ii));
        }
    }
    if moves.is_empty() {
        return;
    }
    let mut drop: HashSet<usize> = HashSet::new();
    for (di, ii) in &moves {
        if let (EditOp::Delete { node }, EditOp::Insert { node: to, .. }) =
            (&script.ops[*di], &script.ops[*ii])
        {
            let (node, to) = (*node, *to);
            script.matches.insert(node, to);
            script.ops[*di] = EditOp::Move { node, to };
            drop.insert(*ii);
        }
    }
    let ops = std::mem::take(&mut script.ops);
    script.ops = ops
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !drop.contains(i))
        .map(|(_, op)| op)
        .collect();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Sketch;
    use crate::tree::Role;

    fn condition(op_source: &str) -> Tree {
        let source = format!("if ({}) x();", op_source);
        let mut s = Sketch::new(&source);
        let root = s.root();
        let iff = s.stmt(root, "IfStatement", &source, "");
        let infix = s.expr(iff, "InfixExpression", op_source, "expression");
        s.name(infix, "a", Role::Variable, Some("int"), "leftOperand");
        s.name(infix, "b", Role::Variable, Some("int"), "rightOperand");
        s.operator(infix);
        let call = s.expr_stmt(iff, "MethodInvocation", "x();", "thenStatement");
        s.name(call, "x", Role::Method, None, "name");
        s.finish()
    }

    #[test]
    fn identical_trees_produce_no_ops() {
        let t = condition("a == b");
        let script = ShapeDiff.diff(&t, &t.clone());
        assert!(script.is_empty());
        assert_eq!(script.matches.len(), t.len());
    }

    #[test]
    fn operator_change_is_an_update() {
        let before = condition("a == b");
        let after = condition("a != b");
        let script = ShapeDiff.diff(&before, &after);
        assert_eq!(script.ops.len(), 1);
        let EditOp::Update { node, to } = script.ops[0] else {
            panic!("expected update, got {:?}", script.ops[0]);
        };
        assert_eq!(before.node(node).kind, "InfixExpression");
        assert_eq!(after.node(to).value, "!=");
    }

    #[test]
    fn added_statement_is_an_insert() {
        let mut s = Sketch::new("{ a(); }");
        let root = s.root();
        let block = s.stmt(root, "Block", "{ a(); }", "");
        s.expr_stmt(block, "MethodInvocation", "a();", "statements[]");
        let before = s.finish();

        let mut s = Sketch::new("{ a(); b(); }");
        let root = s.root();
        let block = s.stmt(root, "Block", "{ a(); b(); }", "");
        s.expr_stmt(block, "MethodInvocation", "a();", "statements[]");
        let b_call = s.expr_stmt(block, "MethodInvocation", "b();", "statements[]");
        let after = s.finish();

        let script = ShapeDiff.diff(&before, &after);
        assert!(script
            .ops
            .iter()
            .any(|op| matches!(op, EditOp::Insert { node, position: 1, .. } if *node == b_call)));
    }

    #[test]
    fn swapped_statements_become_moves() {
        let build = |src: &str, order: [&str; 2]| {
            let mut s = Sketch::new(src);
            let root = s.root();
            let block = s.stmt(root, "Block", src, "");
            for stmt in order {
                s.expr_stmt(block, "MethodInvocation", stmt, "statements[]");
            }
            s.finish()
        };
        let before = build("{ a(); b(); }", ["a();", "b();"]);
        let after = build("{ b(); a(); }", ["b();", "a();"]);
        let script = ShapeDiff.diff(&before, &after);
        assert!(script.ops.iter().any(|op| matches!(op, EditOp::Move { .. })));
        assert!(!script.ops.iter().any(|op| matches!(op, EditOp::Delete { .. })));
    }

    #[test]
    fn lcs_pairs_in_order() {
        assert_eq!(lcs(&[1, 2, 3, 4], &[2, 4, 5]), vec![(1, 0), (3, 1)]);
        assert!(lcs::<u8>(&[], &[1]).is_empty());
    }
}
