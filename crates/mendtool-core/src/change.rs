//! Change templates.
//!
//! A [`Change`] is one mined, reusable edit: an operation kind, a payload
//! template (the inserted, deleted, or replacement subtree, copied out of the
//! tree it was mined from), an [`Anchor`] summarizing the node the edit was
//! attached to, and the qualified names the payload needs imported.
//!
//! Changes are immutable and identified by their content hash:
//!
//! ```text
//! sha256( kind || payload shape || X )
//!   X = anchor shape   for replace
//!       anchor label   for update
//!       empty          otherwise
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::tree::{Category, NodeId, Role, SlotDesc, Tree};
use crate::types::ContentHash;

/// Operation kind of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Delete,
    Update,
    Replace,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Delete => "delete",
            ChangeKind::Update => "update",
            ChangeKind::Replace => "replace",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of the node a change was attached to when mined.
///
/// For insert and delete this is the payload's parent; for update and
/// replace it is the node that was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub kind: String,
    pub value: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub shape: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotDesc>,
    /// Kind of the anchor's own parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_kind: Option<String>,
    pub statement: bool,
    /// Source text, for reports.
    pub code: String,
}

impl Anchor {
    pub fn of(tree: &Tree, id: NodeId) -> Self {
        let node = tree.node(id);
        Anchor {
            kind: node.kind.clone(),
            value: node.value.clone(),
            category: node.category,
            role: node.role,
            shape: tree.shape_hash(id),
            slot: node.slot.clone(),
            parent_kind: node.parent.map(|p| tree.node(p).kind.clone()),
            statement: node.statement,
            code: tree.statement_text(id).to_string(),
        }
    }

    pub fn label(&self) -> String {
        format!("{}::{}", self.kind, self.value)
    }
}

/// An atomic edit template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    /// Provenance: `<pair>:<method>:<offset>`.
    pub id: String,
    pub kind: ChangeKind,
    /// Detached payload subtree; its root is the payload node.
    pub payload: Tree,
    pub anchor: Anchor,
    pub hash: ContentHash,
    #[serde(default)]
    pub requirements: BTreeSet<String>,
}

impl Change {
    /// Build a change and compute its content hash.
    pub fn new(
        id: impl Into<String>,
        kind: ChangeKind,
        payload: Tree,
        anchor: Anchor,
        requirements: BTreeSet<String>,
    ) -> Self {
        let hash = Change::compute_hash(kind, &payload, &anchor);
        Change {
            id: id.into(),
            kind,
            payload,
            anchor,
            hash,
            requirements,
        }
    }

    /// Content hash over kind, payload shape, and the anchor's shape or label.
    pub fn compute_hash(kind: ChangeKind, payload: &Tree, anchor: &Anchor) -> ContentHash {
        let payload_shape = payload.shape_hash(payload.root());
        let extra = match kind {
            ChangeKind::Replace => anchor.shape.0.clone(),
            ChangeKind::Update => anchor.label(),
            ChangeKind::Insert | ChangeKind::Delete => String::new(),
        };
        ContentHash::of_fields([kind.as_str(), payload_shape.as_str(), extra.as_str()])
    }

    pub fn root(&self) -> NodeId {
        self.payload.root()
    }

    pub fn payload_shape(&self) -> ContentHash {
        self.payload.shape_hash(self.payload.root())
    }

    pub fn payload_kind(&self) -> &str {
        &self.payload.node(self.root()).kind
    }

    pub fn payload_role(&self) -> Option<Role> {
        self.payload.node(self.root()).role
    }

    pub fn payload_slot(&self) -> Option<&SlotDesc> {
        self.payload.node(self.root()).slot.as_ref()
    }

    pub fn is_statement(&self) -> bool {
        self.payload.node(self.root()).statement
    }

    pub fn is_normalized(&self) -> bool {
        self.payload.node(self.root()).normalized
    }

    /// Payload source text.
    pub fn code(&self) -> &str {
        self.payload.source()
    }

    /// A sibling variant with the payload root's value replaced. The
    /// provenance id is kept; the hash is recomputed.
    pub fn with_payload_value(&self, kind: ChangeKind, value: &str) -> Change {
        let mut payload = self.payload.clone();
        let root = payload.root();
        payload.replace_value(root, value);
        Change::new(
            self.id.clone(),
            kind,
            payload,
            self.anchor.clone(),
            self.requirements.clone(),
        )
    }

    /// The same payload under a different kind.
    pub fn with_kind(&self, kind: ChangeKind) -> Change {
        Change::new(
            self.id.clone(),
            kind,
            self.payload.clone(),
            self.anchor.clone(),
            self.requirements.clone(),
        )
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} [{}]",
            self.kind,
            self.code(),
            self.anchor.label(),
            self.hash.short()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
