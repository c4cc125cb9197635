#![forbid(unsafe_code)]

//! Per-batch record of written paths.
//!
//! Every write a component makes between two flushes lands here, keyed by the
//! exact path that was written. Consumers (computed invalidation, bindings,
//! watchers) ask [`ChangeLog::affects`] rather than looking up exact keys, so
//! a write to `user` is seen by a binding that reads `user.name` and the other
//! way round.
//!
//! # Invariants
//!
//! 1. A path recorded twice in one batch is a single entry holding the
//!    original old value and the final new value.
//! 2. Entries iterate in first-recorded order.
//! 3. [`ChangeLog::take`] leaves an empty log behind.

use ahash::AHashMap;

use crate::path::Path;
use crate::value::DataValue;

/// One coalesced write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    pub path: Path,
    /// Value before the first write of the batch. `None` when absent.
    pub old: Option<DataValue>,
    /// Value after the last write of the batch. `None` when removed.
    pub new: Option<DataValue>,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    entries: Vec<ChangeEntry>,
    index: AHashMap<Path, usize>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write. A repeat of an already-recorded path keeps its
    /// original `old` and takes the new `new`.
    pub fn record(&mut self, path: Path, old: Option<DataValue>, new: Option<DataValue>) {
        if let Some(&slot) = self.index.get(&path) {
            self.entries[slot].new = new;
            return;
        }
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push(ChangeEntry { path, old, new });
    }

    /// Whether any entry affects `path`.
    #[must_use]
    pub fn affects(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry.path.affects(path))
    }

    /// Whether any entry affects any of `paths`.
    #[must_use]
    pub fn affects_any<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> bool {
        paths.into_iter().any(|path| self.affects(path))
    }

    /// Exact-path lookup.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&ChangeEntry> {
        self.index.get(path).map(|&slot| &self.entries[slot])
    }

    /// Swap the batch out, leaving a fresh one.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Fold another batch into this one, entry by entry.
    pub fn absorb(&mut self, other: Self) {
        for entry in other.entries {
            self.record(entry.path, entry.old, entry.new);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

impl<'a> IntoIterator for &'a ChangeLog {
    type Item = &'a ChangeEntry;
    type IntoIter = std::slice::Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
