//! A thin facade over an injected transactional key-value store, maintaining
//! the primary `(sourceLocalId, linkId) -> targetEntry` mapping alongside a
//! secondary `linkId -> sourceLocalId` inverted index.
//!
//! The actual B-tree-backed store is an external collaborator out of scope
//! for this crate; [`TransactionalStore`] is the contract it must satisfy.
//! Atomicity of the primary write and the conditional index update is
//! inherited entirely from that collaborator: the facade issues both calls
//! against the same `&mut dyn EnvironmentTxn` and does no locking of its own.

use crate::error::EngineResult;

/// Opaque handle to an environment read/write transaction. Mirrors
/// [`crate::dispatcher::TransactionDescriptor`]'s stance: the facade passes
/// this through to the store without ever inspecting it.
pub trait EnvironmentTxn {}

/// The external collaborator contract this facade consumes.
pub trait TransactionalStore<K, V> {
    fn get(&self, txn: &mut dyn EnvironmentTxn, key: &K) -> EngineResult<Option<V>>;
    fn put(&self, txn: &mut dyn EnvironmentTxn, key: K, value: V) -> EngineResult<()>;
    fn delete(&self, txn: &mut dyn EnvironmentTxn, key: &K) -> EngineResult<()>;
}

/// The primary store's key: a link identified by its owning entity and link
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub source_local_id: i64,
    pub link_id: i32,
}

impl LinkKey {
    pub fn new(source_local_id: i64, link_id: i32) -> Self {
        Self {
            source_local_id,
            link_id,
        }
    }
}

/// The facade itself, generic over the target entry type `V` the caller
/// stores against a link.
pub struct LinkTable<V> {
    primary: Box<dyn TransactionalStore<LinkKey, V> + Send + Sync>,
    inverted: Box<dyn TransactionalStore<i32, i64> + Send + Sync>,
}

impl<V> LinkTable<V> {
    pub fn new(
        primary: Box<dyn TransactionalStore<LinkKey, V> + Send + Sync>,
        inverted: Box<dyn TransactionalStore<i32, i64> + Send + Sync>,
    ) -> Self {
        Self { primary, inverted }
    }

    pub fn get(&self, txn: &mut dyn EnvironmentTxn, key: &LinkKey) -> EngineResult<Option<V>> {
        self.primary.get(txn, key)
    }

    pub fn source_for_link(
        &self,
        txn: &mut dyn EnvironmentTxn,
        link_id: i32,
    ) -> EngineResult<Option<i64>> {
        self.inverted.get(txn, &link_id)
    }

    /// Writes the primary entry. `no_old_value` asserts there was no prior
    /// value at `key`. Only then is the inverted index written, since it
    /// would otherwise need to distinguish "still the same source" from "a
    /// stale source that must be evicted," which the caller is expected to
    /// have already resolved.
    pub fn insert(
        &self,
        txn: &mut dyn EnvironmentTxn,
        key: LinkKey,
        target: V,
        no_old_value: bool,
    ) -> EngineResult<()> {
        self.primary.put(txn, key, target)?;
        if no_old_value {
            self.inverted.put(txn, key.link_id, key.source_local_id)?;
        }
        Ok(())
    }

    /// Removes the primary entry. `no_new_value` asserts no other primary
    /// entry for this `link_id` remains, so the inverted index entry is
    /// safe to drop along with it.
    pub fn delete(
        &self,
        txn: &mut dyn EnvironmentTxn,
        key: &LinkKey,
        no_new_value: bool,
    ) -> EngineResult<()> {
        self.primary.delete(txn, key)?;
        if no_new_value {
            self.inverted.delete(txn, &key.link_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::hash::Hash;
    use std::sync::Mutex;

    struct FakeTxn;
    impl EnvironmentTxn for FakeTxn {}

    struct FakeStore<K, V> {
        rows: Mutex<HashMap<K, V>>,
    }

    impl<K, V> FakeStore<K, V> {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
            }
        }
    }

    impl<K: Eq + Hash + Clone, V: Clone> TransactionalStore<K, V> for FakeStore<K, V> {
        fn get(&self, _txn: &mut dyn EnvironmentTxn, key: &K) -> EngineResult<Option<V>> {
            Ok(self.rows.lock().unwrap().get(key).cloned())
        }

        fn put(&self, _txn: &mut dyn EnvironmentTxn, key: K, value: V) -> EngineResult<()> {
            self.rows.lock().unwrap().insert(key, value);
            Ok(())
        }

        fn delete(&self, _txn: &mut dyn EnvironmentTxn, key: &K) -> EngineResult<()> {
            self.rows.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn table() -> LinkTable<&'static str> {
        LinkTable::new(
            Box::new(FakeStore::new()),
            Box::new(FakeStore::new()),
        )
    }

    #[test]
    fn insert_with_no_old_value_populates_the_inverted_index() {
        let table = table();
        let mut txn = FakeTxn;
        let key = LinkKey::new(1, 7);

        table.insert(&mut txn, key, "alice", true).unwrap();

        assert_eq!(table.get(&mut txn, &key).unwrap(), Some("alice"));
        assert_eq!(table.source_for_link(&mut txn, 7).unwrap(), Some(1));
    }

    #[test]
    fn insert_with_prior_value_leaves_the_inverted_index_untouched() {
        let table = table();
        let mut txn = FakeTxn;
        let key = LinkKey::new(1, 7);

        table.insert(&mut txn, key, "alice", true).unwrap();
        table.insert(&mut txn, key, "bob", false).unwrap();

        assert_eq!(table.get(&mut txn, &key).unwrap(), Some("bob"));
        // Still pointing at the value written when no_old_value was true.
        assert_eq!(table.source_for_link(&mut txn, 7).unwrap(), Some(1));
    }

    #[test]
    fn delete_with_no_new_value_evicts_the_inverted_index() {
        let table = table();
        let mut txn = FakeTxn;
        let key = LinkKey::new(1, 7);

        table.insert(&mut txn, key, "alice", true).unwrap();
        table.delete(&mut txn, &key, true).unwrap();

        assert_eq!(table.get(&mut txn, &key).unwrap(), None);
        assert_eq!(table.source_for_link(&mut txn, 7).unwrap(), None);
    }

    #[test]
    fn delete_with_remaining_value_keeps_the_inverted_index() {
        let table = table();
        let mut txn = FakeTxn;
        let key = LinkKey::new(1, 7);

        table.insert(&mut txn, key, "alice", true).unwrap();
        table.delete(&mut txn, &key, false).unwrap();

        assert_eq!(table.get(&mut txn, &key).unwrap(), None);
        assert_eq!(table.source_for_link(&mut txn, 7).unwrap(), Some(1));
    }
}
