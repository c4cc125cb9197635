#![forbid(unsafe_code)]

//! Path-addressed data store owned by one component.
//!
//! The store never interprets keys. Writes land at exactly the given path;
//! missing containers on the way are created from the kind of key that
//! indexes into them (an index makes a sequence padded with `Null`, a name
//! makes a map). A scalar standing where a container is needed is replaced.
//!
//! Reads of missing locations return `None`, never an error. A write whose
//! index would pad a sequence by more than [`MAX_INDEX_GAP`] slots is
//! rejected with [`WeftError::InvalidPath`] before anything is touched.

use crate::change_log::ChangeLog;
use crate::error::{Result, WeftError};
use crate::path::{Key, Path};
use crate::value::{DataMap, DataValue};

/// Most `Null` slots one write may pad a sequence with.
pub const MAX_INDEX_GAP: usize = 1 << 16;

/// Outcome of [`PathStore::set`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// The stored value already equalled the new one; nothing was written.
    Unchanged,
    Changed { old: Option<DataValue> },
}

impl Write {
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathStore {
    root: DataValue,
}

impl PathStore {
    /// An empty store (root is an empty map).
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: DataValue::map(),
        }
    }

    #[must_use]
    pub fn from_value(root: DataValue) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &DataValue {
        &self.root
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&DataValue> {
        path.keys()
            .iter()
            .try_fold(&self.root, |node, key| node.child(key))
    }

    /// Write `value` at `path` unless the stored value is already equal.
    pub fn set(&mut self, path: &Path, value: DataValue) -> Result<Write> {
        if self.get(path) == Some(&value) {
            return Ok(Write::Unchanged);
        }
        Ok(Write::Changed {
            old: self.replace(path, value)?,
        })
    }

    /// Write `value` at `path` unconditionally, returning what was there.
    pub fn replace(&mut self, path: &Path, value: DataValue) -> Result<Option<DataValue>> {
        self.check_growth(path)?;
        let Some((last, parents)) = path.keys().split_last() else {
            return Ok(Some(std::mem::replace(&mut self.root, value)));
        };
        let mut node = &mut self.root;
        for (i, key) in parents.iter().enumerate() {
            let next = &path.keys()[i + 1];
            node = slot(node, key, next);
        }
        Ok(write_child(node, last, value))
    }

    /// Reject `path` when one of its indices lies more than
    /// [`MAX_INDEX_GAP`] past the end of the sequence it would extend.
    /// Containers that do not exist yet count as empty.
    pub fn check_growth(&self, path: &Path) -> Result<()> {
        let mut node = Some(&self.root);
        for key in path.keys() {
            if let Key::Index(idx) = key {
                let len = match node {
                    Some(DataValue::Seq(items)) => items.len(),
                    _ => 0,
                };
                if idx.saturating_sub(len) > MAX_INDEX_GAP {
                    return Err(WeftError::invalid_path(
                        path.to_string(),
                        "index lies too far past the end of the sequence",
                    ));
                }
            }
            node = node.and_then(|n| n.child(key));
        }
        Ok(())
    }

    /// Remove the value at `path`. Sequence slots become `Null` so later
    /// indices keep their positions; map entries are deleted.
    pub fn remove(&mut self, path: &Path) -> Option<DataValue> {
        let (last, parents) = path.keys().split_last()?;
        let mut node = &mut self.root;
        for key in parents {
            node = match (node, key) {
                (DataValue::Map(map), Key::Name(name)) => map.get_mut(name)?,
                (DataValue::Seq(items), Key::Index(idx)) => items.get_mut(*idx)?,
                _ => return None,
            };
        }
        match (node, last) {
            (DataValue::Map(map), Key::Name(name)) => map.remove(name),
            (DataValue::Seq(items), Key::Index(idx)) => items.get_mut(*idx).map(std::mem::take),
            _ => None,
        }
    }

    /// [`set`](Self::set) and record the change in `log`. Returns whether
    /// anything changed.
    pub fn set_tracked(
        &mut self,
        path: &Path,
        value: DataValue,
        log: &mut ChangeLog,
    ) -> Result<bool> {
        Ok(match self.set(path, value.clone())? {
            Write::Unchanged => false,
            Write::Changed { old } => {
                log.record(path.clone(), old, Some(value));
                true
            }
        })
    }

    /// [`replace`](Self::replace) and record the write even when equal.
    pub fn replace_tracked(
        &mut self,
        path: &Path,
        value: DataValue,
        log: &mut ChangeLog,
    ) -> Result<()> {
        let old = self.replace(path, value.clone())?;
        log.record(path.clone(), old, Some(value));
        Ok(())
    }

    /// [`remove`](Self::remove) and record the removal when something was there.
    pub fn remove_tracked(&mut self, path: &Path, log: &mut ChangeLog) -> bool {
        match self.remove(path) {
            Some(old) => {
                log.record(path.clone(), Some(old), None);
                true
            }
            None => false,
        }
    }

    /// Write `value` at `path`, recording the finest paths that actually
    /// differ instead of `path` itself. Maps diff key by key and sequences of
    /// equal length diff index by index; anything else is recorded whole.
    ///
    /// Used for inputs pushed from an owner, so a change to `user.name` on the
    /// owner's side reaches the child as a change to `info.name`, not `info`.
    pub fn assign_tracked(
        &mut self,
        path: &Path,
        value: DataValue,
        log: &mut ChangeLog,
    ) -> Result<bool> {
        self.check_growth(path)?;
        let changed = diff_into(path, self.get(path), Some(&value), log);
        if changed {
            self.replace(path, value)?;
        }
        Ok(changed)
    }

    /// Initial data: `defaults` with top-level keys of `overrides` laid over
    /// them. Caller values win. Non-map overrides replace the defaults whole.
    #[must_use]
    pub fn merge_defaults(defaults: DataValue, overrides: DataValue) -> DataValue {
        match (defaults, overrides) {
            (DataValue::Map(mut base), DataValue::Map(extra)) => {
                base.extend(extra);
                DataValue::Map(base)
            }
            (base @ DataValue::Map(_), DataValue::Null) => base,
            (DataValue::Null, DataValue::Null) => DataValue::map(),
            (_, other) => other,
        }
    }
}

/// Descend into `key` of `node`, creating or replacing containers as needed.
/// `next` is the key that will index into the returned slot.
fn slot<'a>(node: &'a mut DataValue, key: &Key, next: &Key) -> &'a mut DataValue {
    ensure_container(node, key);
    let child = match (node, key) {
        (DataValue::Map(map), Key::Name(name)) => map.entry(name.clone()).or_default(),
        (DataValue::Seq(items), Key::Index(idx)) => {
            if items.len() <= *idx {
                items.resize(*idx + 1, DataValue::Null);
            }
            &mut items[*idx]
        }
        _ => unreachable!("container materialized above"),
    };
    ensure_container(child, next);
    child
}

fn write_child(node: &mut DataValue, key: &Key, value: DataValue) -> Option<DataValue> {
    ensure_container(node, key);
    match (node, key) {
        (DataValue::Map(map), Key::Name(name)) => map.insert(name.clone(), value),
        (DataValue::Seq(items), Key::Index(idx)) => {
            if items.len() <= *idx {
                items.resize(*idx + 1, DataValue::Null);
                items[*idx] = value;
                None
            } else {
                Some(std::mem::replace(&mut items[*idx], value))
            }
        }
        _ => unreachable!("container materialized above"),
    }
}

/// Record every differing leaf between `old` and `new` under `path`.
fn diff_into(
    path: &Path,
    old: Option<&DataValue>,
    new: Option<&DataValue>,
    log: &mut ChangeLog,
) -> bool {
    match (old, new) {
        (Some(DataValue::Map(a)), Some(DataValue::Map(b))) => {
            let mut changed = false;
            for (key, value) in a {
                let next = b.get(key);
                if next != Some(value) {
                    changed |= diff_into(&path.child(key.as_str()), Some(value), next, log);
                }
            }
            for (key, value) in b {
                if !a.contains_key(key) {
                    changed |= diff_into(&path.child(key.as_str()), None, Some(value), log);
                }
            }
            changed
        }
        (Some(DataValue::Seq(a)), Some(DataValue::Seq(b))) if a.len() == b.len() => {
            let mut changed = false;
            for (idx, (x, y)) in a.iter().zip(b).enumerate() {
                if x != y {
                    changed |= diff_into(&path.child(idx), Some(x), Some(y), log);
                }
            }
            changed
        }
        (old, new) if old != new => {
            log.record(path.clone(), old.cloned(), new.cloned());
            true
        }
        _ => false,
    }
}

/// Make `node` a container that `key` can index into.
fn ensure_container(node: &mut DataValue, key: &Key) {
    let fits = matches!(
        (&*node, key),
        (DataValue::Map(_), Key::Name(_)) | (DataValue::Seq(_), Key::Index(_))
    );
    if !fits {
        *node = match key {
            Key::Name(_) => DataValue::Map(DataMap::new()),
            Key::Index(_) => DataValue::Seq(Vec::new()),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(text: &str) -> Path {
        Path::parse(text).expect("valid path")
    }

    fn store(value: serde_json::Value) -> PathStore {
        PathStore::from_value(value.into())
    }

    #[test]
    fn get_missing_is_absent() {
        let s = store(json!({"a": {"b": 1}}));
        assert_eq!(s.get(&path("a.b")), Some(&DataValue::from(1)));
        assert_eq!(s.get(&path("a.c")), None);
        assert_eq!(s.get(&path("a.b.c")), None);
        assert_eq!(s.get(&path("a[0]")), None);
    }

    #[test]
    fn set_materializes_by_key_kind() {
        let mut s = PathStore::new();
        assert!(s.set(&path("list[2].name"), "x".into()).expect("set").is_changed());
        assert_eq!(
            serde_json::Value::from(s.root().clone()),
            json!({"list": [null, null, {"name": "x"}]})
        );
    }

    #[test]
    fn set_replaces_scalar_in_the_way() {
        let mut s = store(json!({"a": 3}));
        let write = s.set(&path("a.b"), true.into()).expect("set");
        assert_eq!(write, Write::Changed { old: None });
        assert_eq!(s.get(&path("a.b")), Some(&DataValue::from(true)));
    }

    #[test]
    fn equal_write_is_unchanged() {
        let mut s = store(json!({"name": "erik"}));
        assert_eq!(s.set(&path("name"), "erik".into()).expect("set"), Write::Unchanged);
        assert_eq!(
            s.set(&path("name"), "errorrik".into()).expect("set"),
            Write::Changed {
                old: Some("erik".into())
            }
        );
    }

    #[test]
    fn tracked_writes_log_exact_path() {
        let mut s = store(json!({"persons": [{"name": "a"}]}));
        let mut log = ChangeLog::new();
        assert!(s.set_tracked(&path("persons[0].name"), "b".into(), &mut log).expect("set"));
        assert!(!s.set_tracked(&path("persons[0].name"), "b".into(), &mut log).expect("set"));
        assert_eq!(log.len(), 1);
        assert!(log.get(&path("persons[0].name")).is_some());
        assert!(log.get(&path("persons")).is_none());
        assert!(log.affects(&path("persons")));
    }

    #[test]
    fn far_indices_are_rejected_untouched() {
        let mut s = store(json!({"list": [1]}));
        let mut log = ChangeLog::new();
        for text in ["list[18446744073709551615]", "list[4000000000000000000]", "fresh[70000].x"] {
            let err = s.set(&path(text), 1.into()).expect_err(text);
            assert!(matches!(err, WeftError::InvalidPath { .. }), "{text}: {err}");
            assert!(s.set_tracked(&path(text), 1.into(), &mut log).is_err());
            assert!(s.replace_tracked(&path(text), 1.into(), &mut log).is_err());
            assert!(s.assign_tracked(&path(text), 1.into(), &mut log).is_err());
        }
        assert!(log.is_empty());
        assert_eq!(serde_json::Value::from(s.root().clone()), json!({"list": [1.0]}));
    }

    #[test]
    fn padding_up_to_the_gap_is_allowed() {
        let mut s = store(json!({"list": [1]}));
        let edge = format!("list[{}]", 1 + MAX_INDEX_GAP);
        assert!(s.set(&path(&edge), true.into()).expect("within gap").is_changed());
        let len = match s.get(&path("list")) {
            Some(DataValue::Seq(items)) => items.len(),
            _ => 0,
        };
        assert_eq!(len, MAX_INDEX_GAP + 2);
        assert_eq!(s.get(&path("list[5]")), Some(&DataValue::Null));
    }

    #[test]
    fn remove_deletes_entries() {
        let mut s = store(json!({"a": {"b": 1, "c": [1, 2]}}));
        assert_eq!(s.remove(&path("a.b")), Some(1.into()));
        assert_eq!(s.get(&path("a.b")), None);
        assert_eq!(s.remove(&path("a.c[0]")), Some(1.into()));
        assert_eq!(s.get(&path("a.c[1]")), Some(&DataValue::from(2)));
        assert_eq!(s.remove(&path("missing.x")), None);
    }

    #[test]
    fn assign_records_finest_paths() {
        let mut s = store(json!({"info": {"name": "erik", "email": "e@x"}}));
        let mut log = ChangeLog::new();
        let next: DataValue = json!({"name": "errorrik", "email": "e@x"}).into();
        assert!(s.assign_tracked(&path("info"), next.clone(), &mut log).expect("assign"));
        assert_eq!(s.get(&path("info")), Some(&next));
        assert!(log.affects(&path("info.name")));
        assert!(!log.affects(&path("info.email")));
        assert!(log.get(&path("info")).is_none());

        assert!(!s.assign_tracked(&path("info"), next, &mut log).expect("assign"));
        assert!(s.assign_tracked(&path("info"), DataValue::from(3), &mut log).expect("assign"));
        assert!(log.get(&path("info")).is_some());
    }

    #[test]
    fn merge_defaults_caller_wins() {
        let merged = PathStore::merge_defaults(
            json!({"first": "first", "last": "last"}).into(),
            json!({"last": "xxx"}).into(),
        );
        assert_eq!(
            serde_json::Value::from(merged),
            json!({"first": "first", "last": "xxx"})
        );
        let untouched = PathStore::merge_defaults(json!({"a": 1}).into(), DataValue::Null);
        assert_eq!(serde_json::Value::from(untouched), json!({"a": 1.0}));
    }
}
