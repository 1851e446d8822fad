//! Change pool: persistent, context-indexed, paged store of changes.
//!
//! ## On-disk layout
//!
//! ```text
//! <pool>/
//! ├── context.json       # [{context, info}] context -> (change id, freq)
//! ├── hash_id.json       # [hash, ...]; position is the change id
//! └── changes/
//!     └── <hash>.json    # one serialized Change per unique hash
//! ```
//!
//! The index files load eagerly when the pool is opened. Change payloads
//! load lazily through [`ChangePool::get_change`] into a resident window of
//! at most `max_load_count` entries; when the window is full it is cleared
//! as a whole before the next page-in.
//!
//! The pool only grows. [`ChangePool::add`] writes a payload file the first
//! time a hash is seen and bumps frequencies every time.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use crate::change::{Change, ChangeKind};
use crate::context::{Context, ContextInfo};
use crate::types::ContentHash;

pub const CONTEXT_FILE: &str = "context.json";
pub const HASH_ID_FILE: &str = "hash_id.json";
pub const CHANGES_DIR: &str = "changes";
pub const DEFAULT_MAX_LOAD_COUNT: usize = 1000;

/// Dense change identifier, assigned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeId(pub u32);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("corrupt pool file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("unknown change id {id}")]
    UnknownChange { id: ChangeId },
}

pub type PoolResult<T> = Result<T, PoolError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PoolError + '_ {
    move |source| PoolError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write via a temp file and rename, so readers never see a partial file.
fn atomic_write(path: &Path, content: &[u8]) -> PoolResult<()> {
    let temp_path = path.with_file_name(format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id()
    ));
    fs::write(&temp_path, content).map_err(io_err(&temp_path))?;
    fs::rename(&temp_path, path).map_err(io_err(path))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> PoolResult<T> {
    let bytes = fs::read(path).map_err(io_err(path))?;
    serde_json::from_slice(&bytes).map_err(|e| PoolError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> PoolResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| PoolError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextEntry {
    context: Context,
    info: ContextInfo,
}

/// Summary counts for `mend pool stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub changes: usize,
    pub contexts: usize,
    pub observations: u64,
    pub by_kind: BTreeMap<ChangeKind, u64>,
}

pub struct ChangePool {
    dir: PathBuf,
    max_load_count: usize,
    hashes: Vec<ContentHash>,
    ids: HashMap<ContentHash, ChangeId>,
    freqs: Vec<u64>,
    contexts: BTreeMap<ContentHash, ContextEntry>,
    resident: HashMap<ChangeId, Rc<Change>>,
    page_ins: usize,
}

impl ChangePool {
    /// Open the pool at `dir`, loading its index. A missing directory yields
    /// an empty pool that is created on first write.
    pub fn open(dir: impl Into<PathBuf>, max_load_count: usize) -> PoolResult<Self> {
        let dir = dir.into();
        let mut pool = ChangePool {
            dir,
            max_load_count: max_load_count.max(1),
            hashes: Vec::new(),
            ids: HashMap::new(),
            freqs: Vec::new(),
            contexts: BTreeMap::new(),
            resident: HashMap::new(),
            page_ins: 0,
        };
        let hash_path = pool.dir.join(HASH_ID_FILE);
        if !hash_path.exists() {
            debug!(dir = %pool.dir.display(), "opening empty change pool");
            return Ok(pool);
        }

        let hashes: Vec<ContentHash> = read_json(&hash_path)?;
        let context_path = pool.dir.join(CONTEXT_FILE);
        let entries: Vec<ContextEntry> = if context_path.exists() {
            read_json(&context_path)?
        } else {
            Vec::new()
        };

        pool.freqs = vec![0; hashes.len()];
        for (i, hash) in hashes.iter().enumerate() {
            pool.ids.insert(hash.clone(), ChangeId(i as u32));
        }
        pool.hashes = hashes;
        for entry in entries {
            for (id, freq) in &entry.info.changes {
                match pool.freqs.get_mut(id.0 as usize) {
                    Some(f) => *f += freq,
                    None => {
                        return Err(PoolError::Corrupt {
                            path: context_path,
                            reason: format!("context references unknown change {}", id),
                        })
                    }
                }
            }
            pool.contexts.insert(entry.context.hash(), entry);
        }
        info!(
            dir = %pool.dir.display(),
            changes = pool.hashes.len(),
            contexts = pool.contexts.len(),
            "loaded change pool"
        );
        Ok(pool)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn max_load_count(&self) -> usize {
        self.max_load_count
    }

    /// Number of changes currently paged in.
    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    /// Number of payload reads from disk so far.
    pub fn page_ins(&self) -> usize {
        self.page_ins
    }

    pub fn id_of(&self, hash: &ContentHash) -> Option<ChangeId> {
        self.ids.get(hash).copied()
    }

    pub fn hash_of(&self, id: ChangeId) -> Option<&ContentHash> {
        self.hashes.get(id.0 as usize)
    }

    /// Total observations of a change across all contexts.
    pub fn frequency(&self, id: ChangeId) -> u64 {
        self.freqs.get(id.0 as usize).copied().unwrap_or(0)
    }

    /// Info for the context a change was mined in.
    pub fn context_info(&self, context: &Context) -> Option<&ContextInfo> {
        self.contexts.get(&context.hash()).map(|e| &e.info)
    }

    /// All change ids in insertion order.
    pub fn change_iterator(&self) -> impl Iterator<Item = ChangeId> {
        (0..self.hashes.len() as u32).map(ChangeId)
    }

    fn change_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(CHANGES_DIR).join(format!("{}.json", hash))
    }

    /// Add `freq` observations of a change. The payload is persisted the
    /// first time its hash is seen; later additions only bump frequencies.
    pub fn add(&mut self, change: &Change, freq: u64) -> PoolResult<ChangeId> {
        let id = match self.ids.get(&change.hash) {
            Some(id) => *id,
            None => {
                let changes_dir = self.dir.join(CHANGES_DIR);
                fs::create_dir_all(&changes_dir).map_err(io_err(&changes_dir))?;
                let path = self.change_path(&change.hash);
                atomic_write(&path, &to_json(&path, change)?)?;
                let id = ChangeId(self.hashes.len() as u32);
                self.hashes.push(change.hash.clone());
                self.ids.insert(change.hash.clone(), id);
                self.freqs.push(0);
                debug!(id = id.0, hash = change.hash.short(), kind = %change.kind, "stored new change");
                id
            }
        };
        self.freqs[id.0 as usize] += freq;
        let context = Context::of(change);
        self.contexts
            .entry(context.hash())
            .or_insert_with(|| ContextEntry {
                context,
                info: ContextInfo::default(),
            })
            .info
            .record(id, change.kind, freq);
        Ok(id)
    }

    /// Fetch a change, paging it in on a miss. A full resident window is
    /// cleared before the read.
    pub fn get_change(&mut self, id: ChangeId) -> PoolResult<Rc<Change>> {
        if let Some(change) = self.resident.get(&id) {
            return Ok(Rc::clone(change));
        }
        let hash = self
            .hashes
            .get(id.0 as usize)
            .cloned()
            .ok_or(PoolError::UnknownChange { id })?;
        if self.resident.len() >= self.max_load_count {
            debug!(resident = self.resident.len(), "clearing change window");
            self.resident.clear();
        }
        let change: Change = read_json(&self.change_path(&hash))?;
        self.page_ins += 1;
        let change = Rc::new(change);
        self.resident.insert(id, Rc::clone(&change));
        Ok(change)
    }

    /// Persist both index files.
    pub fn save_index(&self) -> PoolResult<()> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let hash_path = self.dir.join(HASH_ID_FILE);
        atomic_write(&hash_path, &to_json(&hash_path, &self.hashes)?)?;
        let context_path = self.dir.join(CONTEXT_FILE);
        let entries: Vec<&ContextEntry> = self.contexts.values().collect();
        atomic_write(&context_path, &to_json(&context_path, &entries)?)?;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            changes: self.hashes.len(),
            contexts: self.contexts.len(),
            ..Default::default()
        };
        for entry in self.contexts.values() {
            stats.observations += entry.info.freq;
            for (kind, count) in &entry.info.kind_counts {
                *stats.by_kind.entry(*kind).or_default() += count;
            }
        }
        stats
    }
}

impl fmt::Debug for ChangePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePool")
            .field("dir", &self.dir)
            .field("changes", &self.hashes.len())
            .field("resident", &self.resident.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
