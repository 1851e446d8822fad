//! Pool indexing contexts.
//!
//! A [`Context`] generalizes where a change was observed: the anchor's
//! production and slot, its parent's production, and the payload's category
//! and role. Literal content is left out so that many changes share one
//! context. [`ContextInfo`] keeps per-context frequencies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::change::{Change, ChangeKind};
use crate::pool::ChangeId;
use crate::tree::{Category, Role};
use crate::types::ContentHash;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    pub anchor_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_kind: Option<String>,
    pub payload_category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_role: Option<Role>,
}

impl Context {
    pub fn of(change: &Change) -> Self {
        let root = change.payload.node(change.root());
        Context {
            anchor_kind: change.anchor.kind.clone(),
            anchor_slot: change.anchor.slot.as_ref().map(|s| s.name.clone()),
            parent_kind: change.anchor.parent_kind.clone(),
            payload_category: root.category,
            payload_role: root.role,
        }
    }

    /// `anchor/slot/parent`, with `-` for a missing part.
    pub fn label(&self) -> String {
        format!(
            "{}/{}/{}",
            self.anchor_kind,
            self.anchor_slot.as_deref().unwrap_or("-"),
            self.parent_kind.as_deref().unwrap_or("-")
        )
    }

    pub fn hash(&self) -> ContentHash {
        let category = format!("{:?}", self.payload_category);
        let role = self.payload_role.map(|r| format!("{:?}", r)).unwrap_or_default();
        ContentHash::of_fields([
            self.anchor_kind.as_str(),
            self.anchor_slot.as_deref().unwrap_or(""),
            self.parent_kind.as_deref().unwrap_or(""),
            category.as_str(),
            role.as_str(),
        ])
    }
}

/// Frequencies observed for one context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInfo {
    /// Total observations in this context.
    pub freq: u64,
    /// Changes seen in this context with their observation counts, in
    /// first-seen order.
    pub changes: Vec<(ChangeId, u64)>,
    /// Observations per change kind.
    pub kind_counts: BTreeMap<ChangeKind, u64>,
}

impl ContextInfo {
    pub fn record(&mut self, id: ChangeId, kind: ChangeKind, freq: u64) {
        self.freq += freq;
        *self.kind_counts.entry(kind).or_default() += freq;
        match self.changes.iter_mut().find(|(c, _)| *c == id) {
            Some((_, f)) => *f += freq,
            None => self.changes.push((id, freq)),
        }
    }

    pub fn change_freq(&self, id: ChangeId) -> u64 {
        self.changes
            .iter()
            .find(|(c, _)| *c == id)
            .map(|(_, f)| *f)
            .unwrap_or(0)
    }

    /// Change ids ordered by frequency, most frequent first. Ties keep
    /// first-seen order.
    pub fn by_frequency(&self) -> Vec<ChangeId> {
        let mut changes = self.changes.clone();
        changes.sort_by(|a, b| b.1.cmp(&a.1));
        changes.into_iter().map(|(id, _)| id).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
