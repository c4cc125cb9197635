#![forbid(unsafe_code)]

//! Computed values with dynamically discovered dependencies.
//!
//! # Design
//!
//! A [`DependencyGraph`] holds one entry per [`ComputedDefinition`]. Each
//! evaluation runs the compute function against a [`ComputedScope`], the
//! read interceptor: every path the function reads is recorded, and reading
//! another computed resolves that computed first. The recording replaces the
//! entry's dependencies after every evaluation, so a function that branches
//! on data subscribes to exactly what it touched last time.
//!
//! Results live in the owning store at the top-level key of the computed's
//! name and are logged like any other write. Bindings, watchers and other
//! computeds therefore observe computed values as ordinary paths.
//!
//! # Invariants
//!
//! 1. During one pass ([`DependencyGraph::recompute`]) each computed is
//!    evaluated at most once.
//! 2. A computed is re-evaluated iff it was never evaluated or the pass's log
//!    affects one of its recorded dependencies.
//! 3. Computed dependencies are resolved before their dependents.
//!
//! # Failure Modes
//!
//! - **Cycle**: reading a computed that is already being evaluated fails the
//!   pass with [`WeftError::CyclicComputed`] naming the cycle in read order.
//!   Entries evaluated before the failure keep their new values.

use std::rc::Rc;

use ahash::AHashMap;
use weft_core::{ChangeLog, DataValue, Path, PathStore, Result, WeftError};

pub type ComputeFn = Rc<dyn Fn(&mut ComputedScope<'_>) -> Option<DataValue>>;

#[derive(Clone)]
pub struct ComputedDefinition {
    pub name: String,
    pub func: ComputeFn,
}

impl ComputedDefinition {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut ComputedScope<'_>) -> Option<DataValue> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Rc::new(func),
        }
    }
}

impl std::fmt::Debug for ComputedDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedDefinition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One recorded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    Path(Path),
    Computed(String),
}

#[derive(Debug)]
struct Entry {
    def: ComputedDefinition,
    deps: Vec<Dependency>,
    evaluated: bool,
    evaluations: u64,
}

/// Per-pass bookkeeping.
struct Pass {
    resolved: Vec<bool>,
    visiting: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    entries: Vec<Entry>,
    index: AHashMap<String, usize>,
}

impl DependencyGraph {
    /// Build a graph; later definitions replace earlier ones of the same name.
    #[must_use]
    pub fn new(defs: impl IntoIterator<Item = ComputedDefinition>) -> Self {
        let mut graph = Self::default();
        for def in defs {
            match graph.index.get(&def.name) {
                Some(&slot) => graph.entries[slot].def = def,
                None => {
                    graph.index.insert(def.name.clone(), graph.entries.len());
                    graph.entries.push(Entry {
                        def,
                        deps: Vec::new(),
                        evaluated: false,
                        evaluations: 0,
                    });
                }
            }
        }
        graph
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// How many times `name` has been evaluated.
    #[must_use]
    pub fn evaluations(&self, name: &str) -> Option<u64> {
        self.index.get(name).map(|&slot| self.entries[slot].evaluations)
    }

    /// Dependencies recorded by the latest evaluation of `name`.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<&[Dependency]> {
        self.index
            .get(name)
            .map(|&slot| self.entries[slot].deps.as_slice())
    }

    /// First evaluation of every entry, at construction. Writes go to the
    /// store but nothing is reported.
    pub fn evaluate_all(&mut self, store: &mut PathStore) -> Result<()> {
        let mut scratch = ChangeLog::new();
        self.recompute(store, &mut scratch)
    }

    /// Bring every entry up to date with `log`, appending computed changes to
    /// it.
    pub fn recompute(&mut self, store: &mut PathStore, log: &mut ChangeLog) -> Result<()> {
        if self.entries.is_empty() {
            return Ok(());
        }
        let mut pass = Pass {
            resolved: vec![false; self.entries.len()],
            visiting: Vec::new(),
        };
        for slot in 0..self.entries.len() {
            self.ensure(slot, store, log, &mut pass)?;
        }
        Ok(())
    }

    fn ensure(
        &mut self,
        slot: usize,
        store: &mut PathStore,
        log: &mut ChangeLog,
        pass: &mut Pass,
    ) -> Result<()> {
        if pass.resolved[slot] {
            return Ok(());
        }
        if let Some(pos) = pass.visiting.iter().position(|&s| s == slot) {
            let mut cycle: Vec<String> = pass.visiting[pos..]
                .iter()
                .map(|&s| self.entries[s].def.name.clone())
                .collect();
            cycle.push(self.entries[slot].def.name.clone());
            return Err(WeftError::CyclicComputed { cycle });
        }
        pass.visiting.push(slot);

        let upstream: Vec<usize> = self.entries[slot]
            .deps
            .iter()
            .filter_map(|dep| match dep {
                Dependency::Computed(name) => self.index.get(name).copied(),
                Dependency::Path(_) => None,
            })
            .collect();
        for dep in upstream {
            self.ensure(dep, store, log, pass)?;
        }

        let entry = &self.entries[slot];
        let stale = !entry.evaluated
            || entry.deps.iter().any(|dep| match dep {
                Dependency::Path(path) => log.affects(path),
                Dependency::Computed(name) => log.affects(&Path::name(name.as_str())),
            });
        if stale {
            self.evaluate(slot, store, log, pass)?;
        }

        pass.visiting.pop();
        pass.resolved[slot] = true;
        Ok(())
    }

    fn evaluate(
        &mut self,
        slot: usize,
        store: &mut PathStore,
        log: &mut ChangeLog,
        pass: &mut Pass,
    ) -> Result<()> {
        let def = self.entries[slot].def.clone();
        let mut scope = ComputedScope {
            graph: &mut *self,
            store: &mut *store,
            log: &mut *log,
            pass: &mut *pass,
            reads: Vec::new(),
            error: None,
        };
        let value = (def.func)(&mut scope);
        let ComputedScope { reads, error, .. } = scope;
        if let Some(err) = error {
            return Err(err);
        }

        let entry = &mut self.entries[slot];
        entry.deps = reads;
        entry.evaluated = true;
        entry.evaluations += 1;

        let target = Path::name(def.name.as_str());
        let changed = match value {
            Some(value) => store.set_tracked(&target, value, log)?,
            None => store.remove_tracked(&target, log),
        };
        tracing::trace!(computed = %def.name, changed, "computed evaluated");
        Ok(())
    }
}

/// Read interceptor handed to compute functions.
pub struct ComputedScope<'a> {
    graph: &'a mut DependencyGraph,
    store: &'a mut PathStore,
    log: &'a mut ChangeLog,
    pass: &'a mut Pass,
    reads: Vec<Dependency>,
    error: Option<WeftError>,
}

impl ComputedScope<'_> {
    /// Read `path` text (`a.b[0]`). Malformed text fails the evaluation with
    /// [`WeftError::InvalidPath`] and reads as absent.
    pub fn get(&mut self, path: &str) -> Option<DataValue> {
        match Path::parse(path) {
            Ok(path) => self.read(&path),
            Err(err) => {
                self.error.get_or_insert(err);
                None
            }
        }
    }

    /// Text form of a read; absent reads as `""`.
    pub fn text(&mut self, path: &str) -> String {
        weft_core::text_of(self.get(path).as_ref())
    }

    pub fn read(&mut self, path: &Path) -> Option<DataValue> {
        if self.error.is_some() {
            return None;
        }
        let computed = path
            .first_name()
            .and_then(|name| self.graph.index.get(name).copied());
        match computed {
            Some(slot) => {
                if let Err(err) = self.graph.ensure(slot, self.store, self.log, self.pass) {
                    self.error = Some(err);
                    return None;
                }
                let name = self.graph.entries[slot].def.name.clone();
                let dep = Dependency::Computed(name);
                if !self.reads.contains(&dep) {
                    self.reads.push(dep);
                }
            }
            None => {
                let dep = Dependency::Path(path.clone());
                if !self.reads.contains(&dep) {
                    self.reads.push(dep);
                }
            }
        }
        self.store.get(path).cloned()
    }
}
