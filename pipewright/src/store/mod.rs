//! In-memory record storage.
//!
//! Every store in the engine is a [`RecordStore`]: an owned map from ID to
//! record behind a single read-write lock. Readers clone records out; writers
//! mutate through closures that run under the exclusive lock. The map itself
//! is never handed out.

use crate::errors::{EngineError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A record that can live in a [`RecordStore`].
pub trait Record: Clone + Send + Sync + 'static {
    /// Human-readable kind used in not-found errors.
    const KIND: &'static str;

    /// The record's unique ID.
    fn id(&self) -> &str;
}

/// Offset/limit window applied after filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Number of matching records to skip.
    pub offset: usize,
    /// Maximum number of records to return (`None` = unbounded).
    pub limit: Option<usize>,
}

impl Page {
    /// Applies the window to an already sorted list.
    #[must_use]
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// A map of records guarded by one read-write lock.
#[derive(Debug)]
pub struct RecordStore<T: Record> {
    records: RwLock<HashMap<String, T>>,
}

impl<T: Record> Default for RecordStore<T> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Record> RecordStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new record. Fails if the ID is already taken.
    pub fn insert(&self, record: T) -> Result<()> {
        let mut records = self.records.write();
        if records.contains_key(record.id()) {
            return Err(EngineError::AlreadyExists {
                kind: T::KIND,
                id: record.id().to_string(),
            });
        }
        records.insert(record.id().to_string(), record);
        Ok(())
    }

    /// Returns a clone of the record.
    pub fn get(&self, id: &str) -> Result<T> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(T::KIND, id))
    }

    /// Reads a record in place under the read lock, without cloning it.
    pub fn read<R, F>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.records
            .read()
            .get(id)
            .map(f)
            .ok_or_else(|| EngineError::not_found(T::KIND, id))
    }

    /// Returns true if a record with this ID exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    /// Mutates a record in place under the write lock.
    ///
    /// The closure must not block; it runs while every reader is excluded.
    pub fn update<R, F>(&self, id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found(T::KIND, id))?;
        Ok(f(record))
    }

    /// Removes and returns a record.
    pub fn remove(&self, id: &str) -> Result<T> {
        self.records
            .write()
            .remove(id)
            .ok_or_else(|| EngineError::not_found(T::KIND, id))
    }

    /// Returns clones of all records matching the predicate, in no particular order.
    pub fn filter<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(&T) -> bool,
    {
        self.records
            .read()
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: String,
        body: String,
    }

    impl Record for Note {
        const KIND: &'static str = "note";

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, body: &str) -> Note {
        Note {
            id: id.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = RecordStore::new();
        store.insert(note("a", "hello")).unwrap();

        assert_eq!(store.get("a").unwrap().body, "hello");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let store = RecordStore::new();
        store.insert(note("a", "one")).unwrap();
        assert!(store.insert(note("a", "two")).is_err());
        assert_eq!(store.get("a").unwrap().body, "one");
    }

    #[test]
    fn test_get_missing() {
        let store: RecordStore<Note> = RecordStore::new();
        let err = store.get("nope").unwrap_err();
        assert_eq!(err.to_string(), "note not found: nope");
    }

    #[test]
    fn test_update_returns_closure_value() {
        let store = RecordStore::new();
        store.insert(note("a", "x")).unwrap();

        let len = store
            .update("a", |n| {
                n.body.push_str("yz");
                n.body.len()
            })
            .unwrap();

        assert_eq!(len, 3);
        assert_eq!(store.get("a").unwrap().body, "xyz");
        assert_eq!(store.read("a", |n| n.body.len()).unwrap(), 3);
        assert!(store.read("zz", |n| n.body.len()).is_err());
    }

    #[test]
    fn test_remove_and_filter() {
        let store = RecordStore::new();
        store.insert(note("a", "keep")).unwrap();
        store.insert(note("b", "drop")).unwrap();

        store.remove("b").unwrap();
        assert!(store.remove("b").is_err());

        let kept = store.filter(|n| n.body == "keep");
        assert_eq!(kept.len(), 1);
        assert!(!store.contains("b"));
    }

    #[test]
    fn test_page_apply() {
        let page = Page {
            offset: 1,
            limit: Some(2),
        };
        assert_eq!(page.apply(vec![1, 2, 3, 4]), vec![2, 3]);
        assert_eq!(Page::default().apply(vec![1, 2]), vec![1, 2]);
    }
}
