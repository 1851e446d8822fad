//! Pool mining over before/after file pairs.
//!
//! Input layout: any file under a `before` directory whose twin exists at
//! the same relative path under the sibling `after` directory forms a pair,
//! e.g. `bug-12/before/demo/Counter.java` and `bug-12/after/demo/Counter.java`.
//! The pair is named by its path with the `before` component removed.

use std::fs;
use std::path::{Component, Path, PathBuf};

use mendtool_core::error::MendError;
use mendtool_core::extract::ChangeExtractor;
use mendtool_core::frontend::{FrontEnd, TreeDiff};
use mendtool_core::pool::ChangePool;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinePair {
    pub name: String,
    pub before: PathBuf,
    pub after: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MineSummary {
    pub pairs: usize,
    /// Pairs that could not be read or parsed.
    pub skipped: usize,
    pub observed: usize,
    pub synthetic: usize,
    /// Changes not in the pool before this run.
    pub new_in_pool: usize,
    pub pool_size: usize,
}

/// Find before/after pairs under `root`, in path order.
pub fn discover_pairs(root: &Path, extension: &str) -> Vec<MinePair> {
    let mut pairs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable mining input");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|e| e != extension) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<Component<'_>> = rel.components().collect();
        let Some(split) = parts
            .iter()
            .rposition(|c| c.as_os_str() == "before")
        else {
            continue;
        };
        let mut after = root.to_path_buf();
        let mut name = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if i == split {
                after.push("after");
            } else {
                after.push(part.as_os_str());
                name.push(part.as_os_str().to_string_lossy().into_owned());
            }
        }
        if !after.is_file() {
            debug!(before = %path.display(), "no after version");
            continue;
        }
        pairs.push(MinePair {
            name: name.join("/"),
            before: path.to_path_buf(),
            after,
        });
    }
    pairs
}

/// Mine every pair into `pool` and save its index.
pub fn mine_pairs(
    pool: &mut ChangePool,
    pairs: &[MinePair],
    front_end: &dyn FrontEnd,
    differ: &dyn TreeDiff,
    extractor: &ChangeExtractor,
) -> Result<MineSummary, MendError> {
    let mut summary = MineSummary::default();
    for pair in pairs {
        let Some((before, after)) = read_pair(pair) else {
            summary.skipped += 1;
            continue;
        };
        let before_tree = match front_end.parse(&before) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(pair = %pair.name, file = %pair.before.display(), error = %e, "cannot parse; skipping pair");
                summary.skipped += 1;
                continue;
            }
        };
        let after_tree = match front_end.parse(&after) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(pair = %pair.name, file = %pair.after.display(), error = %e, "cannot parse; skipping pair");
                summary.skipped += 1;
                continue;
            }
        };
        let script = differ.diff(&before_tree, &after_tree);
        let stats = extractor.mine_into(pool, &pair.name, &before_tree, &after_tree, &script, front_end)?;
        debug!(
            pair = %pair.name,
            edits = script.ops.len(),
            observed = stats.observed,
            new = stats.new_in_pool,
            "mined pair"
        );
        summary.pairs += 1;
        summary.observed += stats.observed;
        summary.synthetic += stats.synthetic;
        summary.new_in_pool += stats.new_in_pool;
    }
    pool.save_index()?;
    summary.pool_size = pool.len();
    info!(
        pairs = summary.pairs,
        skipped = summary.skipped,
        new = summary.new_in_pool,
        pool_size = summary.pool_size,
        "mining finished"
    );
    Ok(summary)
}

fn read_pair(pair: &MinePair) -> Option<(String, String)> {
    let read = |path: &Path| match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(pair = %pair.name, file = %path.display(), error = %e, "cannot read; skipping pair");
            None
        }
    };
    Some((read(&pair.before)?, read(&pair.after)?))
}
