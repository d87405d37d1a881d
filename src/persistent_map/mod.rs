//! A persistent (functional, structurally shared) 2-3 tree map keyed by
//! signed 64-bit integers.
//!
//! [`PersistentMap::begin_read`] hands out a lock-free, immutable
//! [`Snapshot`]; [`PersistentMap::begin_write`] hands out a [`Builder`]
//! forked from the current root. `Builder::commit` atomically swaps the live
//! root for the builder's, but only if nobody else committed since the fork.
//! This is the optimistic snapshot-isolation primitive index readers rely on.

mod node;


use std::sync::{Arc, Mutex};

use node::{delete, get, insert, size_of, Link};

/// A cheaply `Clone`-able handle to a persistent map; clones share the same
/// live root cell, they do not copy the tree.
pub struct PersistentMap<V> {
    root: Arc<Mutex<Link<V>>>,
}

impl<V> PersistentMap<V> {
    pub fn new() -> Self {
        Self {
            root: Arc::new(Mutex::new(None)),
        }
    }

    /// Captures the current root. Readers never block each other or block
    /// writers; this only briefly locks to clone an `Arc`.
    pub fn begin_read(&self) -> Snapshot<V> {
        Snapshot {
            root: self.root.lock().unwrap().clone(),
        }
    }

    /// Forks a mutable builder from the current root.
    pub fn begin_write(&self) -> Builder<V> {
        let forked = self.root.lock().unwrap().clone();
        Builder {
            live: Arc::clone(&self.root),
            forked_root: forked.clone(),
            current: forked,
        }
    }
}

impl<V> Clone for PersistentMap<V> {
    fn clone(&self) -> Self {
        Self {
            root: Arc::clone(&self.root),
        }
    }
}

impl<V> Default for PersistentMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable view of the map at the instant it was captured. Mutations to
/// any builder forked afterwards are never visible through this snapshot.
pub struct Snapshot<V> {
    root: Link<V>,
}

impl<V> Snapshot<V> {
    pub fn get(&self, key: i64) -> Option<&V> {
        get(&self.root, key)
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        size_of(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ascending-key iteration over the snapshot.
    pub fn iter(&self) -> Iter<'_, V> {
        let mut stack = Vec::new();
        stack.push(StackItem::Node(&self.root));
        Iter { stack }
    }
}

impl<V> Clone for Snapshot<V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

/// A mutable view forked from a snapshot. `put`/`remove` build brand new
/// nodes along the modified path; `commit` publishes them iff the live root
/// hasn't moved since the fork.
pub struct Builder<V> {
    live: Arc<Mutex<Link<V>>>,
    forked_root: Link<V>,
    current: Link<V>,
}

impl<V: Clone> Builder<V> {
    /// A missing value is unrepresentable: `V` is required, not `Option<V>`.
    pub fn put(&mut self, key: i64, value: V) {
        self.current = insert(&self.current, key, Arc::new(value));
    }

    pub fn remove(&mut self, key: i64) -> Option<V> {
        let outcome = delete(&self.current, key);
        self.current = outcome.new_link;
        outcome.removed.map(|arc| match Arc::try_unwrap(arc) {
            Ok(value) => value,
            Err(arc) => (*arc).clone(),
        })
    }

    pub fn get(&self, key: i64) -> Option<&V> {
        get(&self.current, key)
    }

    pub fn contains_key(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        size_of(&self.current)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Iter<'_, V> {
        let mut stack = Vec::new();
        stack.push(StackItem::Node(&self.current));
        Iter { stack }
    }

    /// Publishes this builder's root as the map's live root, iff the live
    /// root still equals the one this builder was forked from. Returns
    /// `false` on conflict; the caller must retry against a fresh builder.
    pub fn commit(self) -> bool {
        let mut live = self.live.lock().unwrap();
        let unchanged = match (&*live, &self.forked_root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        if unchanged {
            *live = self.current;
            true
        } else {
            false
        }
    }
}

enum StackItem<'a, V> {
    Node(&'a Link<V>),
    Entry(i64, &'a V),
}

pub struct Iter<'a, V> {
    stack: Vec<StackItem<'a, V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (i64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(item) = self.stack.pop() {
            match item {
                StackItem::Entry(k, v) => return Some((k, v)),
                StackItem::Node(link) => {
                    if let Some(node) = link {
                        match node.as_ref() {
                            node::Node::Two {
                                key,
                                value,
                                left,
                                right,
                                ..
                            } => {
                                self.stack.push(StackItem::Node(right));
                                self.stack.push(StackItem::Entry(*key, value.as_ref()));
                                self.stack.push(StackItem::Node(left));
                            }
                            node::Node::Three {
                                key1,
                                value1,
                                key2,
                                value2,
                                left,
                                mid,
                                right,
                                ..
                            } => {
                                self.stack.push(StackItem::Node(right));
                                self.stack.push(StackItem::Entry(*key2, value2.as_ref()));
                                self.stack.push(StackItem::Node(mid));
                                self.stack.push(StackItem::Entry(*key1, value1.as_ref()));
                                self.stack.push(StackItem::Node(left));
                            }
                        }
                    }
                }
            }
        }
        None
    }
}
