//! Audit records for apply attempts.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::change::ChangeKind;
use crate::location::InsertionKind;
use crate::types::ContentHash;

/// One edit performed on a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairAction {
    pub kind: ChangeKind,
    pub insertion: InsertionKind,
    pub class: String,
    pub line: u32,
    /// Label of the location node.
    pub location: String,
    /// Text removed or rewritten; empty for insertions.
    pub before: String,
    /// Text written; empty for deletions.
    pub after: String,
    pub change_hash: ContentHash,
    /// Provenance id of the originating change.
    pub change_id: String,
    /// Concretization method, or `none` for deletions.
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
}

/// Everything known about one candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchInfo {
    pub class: String,
    pub actions: Vec<RepairAction>,
    /// Pool id of the applied change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<u32>,
    /// Pool frequency of the applied change.
    #[serde(default)]
    pub frequency: u64,
    /// Context the change was mined in, as `anchor/slot/parent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_score: Option<f64>,
}

impl PatchInfo {
    pub fn new(class: impl Into<String>) -> Self {
        PatchInfo {
            class: class.into(),
            ..Default::default()
        }
    }

    pub fn push(&mut self, action: RepairAction) {
        self.actions.push(action);
    }

    /// Human-readable summary stored as `edit` next to each candidate.
    pub fn edit_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Class:{}", self.class);
        for action in &self.actions {
            let _ = writeln!(
                out,
                "Action:{} {} {} @ line {}",
                action.kind,
                action.insertion.as_str(),
                action.location,
                action.line
            );
            let _ = writeln!(out, "Change:{} [{}]", action.change_id, action.change_hash.short());
            let _ = writeln!(out, "Method:{}", action.method);
            for line in action.before.lines() {
                let _ = writeln!(out, "- {}", line);
            }
            for line in action.after.lines() {
                let _ = writeln!(out, "+ {}", line);
            }
            for import in &action.imports {
                let _ = writeln!(out, "Import:{}", import);
            }
        }
        if let Some(id) = self.pool_id {
            let _ = writeln!(out, "Pool:{} freq={}", id, self.frequency);
        }
        if let Some(context) = &self.context {
            let _ = writeln!(out, "Context:{}", context);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_text_lists_actions() {
        let mut info = PatchInfo::new("org.demo.K");
        info.push(RepairAction {
            kind: ChangeKind::Replace,
            insertion: InsertionKind::NotApplicable,
            class: "org.demo.K".to_string(),
            line: 10,
            location: "InfixExpression::==".to_string(),
            before: "a == b".to_string(),
            after: "a != b".to_string(),
            change_hash: ContentHash::compute(b"x"),
            change_id: "fix1:m:42".to_string(),
            method: "tc#0:identity".to_string(),
            imports: vec![],
        });
        info.pool_id = Some(3);
        info.frequency = 7;
        let text = info.edit_text();
        assert!(text.starts_with("Class:org.demo.K\n"));
        assert!(text.contains("Action:replace n/a InfixExpression::== @ line 10\n"));
        assert!(text.contains("- a == b\n+ a != b\n"));
        assert!(text.contains("Pool:3 freq=7\n"));
    }
}
