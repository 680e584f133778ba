//! # Keyspace Storage
//!
//! Purpose: Hold every database's keys and typed values behind one lock.
//!
//! ## Design Principles
//! 1. **Tagged Values**: one enum per Redis data type; a command that meets
//!    the wrong variant replies `WRONGTYPE`.
//! 2. **Coarse Locking**: one `parking_lot::Mutex` around all databases; each
//!    command runs to completion under it, so commands are atomic.
//! 3. **No Expiry**: TTL arguments are accepted and ignored.

use std::collections::VecDeque;

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    String(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Hash(HashMap<Vec<u8>, Vec<u8>>),
    Set(HashSet<Vec<u8>>),
    // member -> score
    ZSet(HashMap<Vec<u8>, f64>),
}

impl Value {
    pub(crate) fn empty_list() -> Value {
        Value::List(VecDeque::new())
    }

    pub(crate) fn empty_hash() -> Value {
        Value::Hash(HashMap::new())
    }

    pub(crate) fn empty_set() -> Value {
        Value::Set(HashSet::new())
    }

    pub(crate) fn empty_zset() -> Value {
        Value::ZSet(HashMap::new())
    }

    pub(crate) fn as_string(&mut self) -> Option<&mut Vec<u8>> {
        match self {
            Value::String(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_list(&mut self) -> Option<&mut VecDeque<Vec<u8>>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub(crate) fn as_hash(&mut self) -> Option<&mut HashMap<Vec<u8>, Vec<u8>>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    pub(crate) fn as_set(&mut self) -> Option<&mut HashSet<Vec<u8>>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub(crate) fn as_zset(&mut self) -> Option<&mut HashMap<Vec<u8>, f64>> {
        match self {
            Value::ZSet(zset) => Some(zset),
            _ => None,
        }
    }

    /// Collections that become empty are deleted, as Redis does.
    pub(crate) fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::ZSet(zset) => zset.is_empty(),
        }
    }
}

/// One numbered database.
pub(crate) type Db = HashMap<Vec<u8>, Value>;

/// All databases of a stub server.
#[derive(Debug, Default)]
pub(crate) struct Store {
    dbs: Mutex<HashMap<i64, Db>>,
}

impl Store {
    pub(crate) fn new() -> Self {
        Store::default()
    }

    /// Runs `f` with exclusive access to database `index`.
    pub(crate) fn with_db<R>(&self, index: i64, f: impl FnOnce(&mut Db) -> R) -> R {
        let mut dbs = self.dbs.lock();
        f(dbs.entry(index).or_default())
    }

    pub(crate) fn contains_key(&self, index: i64, key: &[u8]) -> bool {
        self.dbs
            .lock()
            .get(&index)
            .map_or(false, |db| db.contains_key(key))
    }

    pub(crate) fn flush(&self, index: i64) {
        self.dbs.lock().remove(&index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn databases_are_isolated() {
        let store = Store::new();
        store.with_db(0, |db| db.insert(b"k".to_vec(), Value::String(b"v".to_vec())));
        assert!(store.contains_key(0, b"k"));
        assert!(!store.contains_key(1, b"k"));
    }

    #[test]
    fn flush_clears_one_database() {
        let store = Store::new();
        store.with_db(0, |db| db.insert(b"a".to_vec(), Value::String(Vec::new())));
        store.with_db(2, |db| db.insert(b"b".to_vec(), Value::String(Vec::new())));
        store.flush(2);
        assert!(store.contains_key(0, b"a"));
        assert!(!store.contains_key(2, b"b"));
    }

    #[test]
    fn casts_reject_other_variants() {
        let mut value = Value::empty_list();
        assert!(value.as_list().is_some());
        assert!(value.as_hash().is_none());
        assert!(value.is_empty_collection());
        assert!(!Value::String(Vec::new()).is_empty_collection());
    }
}
