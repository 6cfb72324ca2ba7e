//! # Priority Queue
//!
//! Groups the keys of one [`ContentStore`] into numeric priority buckets.
//! [`PriorityQueue::export`] walks the buckets in ascending priority order and
//! each bucket in insertion order, so a smaller priority value is dispatched
//! first and equal priorities are first-in, first-out.
//!
//! Buckets are created on the first insert at a priority and dropped as soon
//! as their last key leaves. Every live key maps to exactly one bucket.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::{
    content_store::{Content, ContentEntry, ContentKey, ContentStore},
    Value,
};

/// Priority used when none is given.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Type tag under which the queue files its contents in the backing store.
pub const QUEUE_CONTENT_TYPE: &str = "priority";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueStatus {
    /// Number of non-empty buckets
    pub priorities: usize,
    /// Number of queued contents across all buckets
    pub contents: usize,
}

pub struct PriorityQueue<T, M = Value> {
    store: ContentStore<T, M>,
    buckets: BTreeMap<i32, Vec<ContentKey>>,
    priorities: HashMap<ContentKey, i32>,
}

impl<T, M> Default for PriorityQueue<T, M> {
    fn default() -> Self {
        Self {
            store: ContentStore::default(),
            buckets: BTreeMap::new(),
            priorities: HashMap::new(),
        }
    }
}

impl<T: Content, M: Clone> PriorityQueue<T, M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `content` at the end of the `priority` bucket.
    pub fn add(&mut self, content: T, priority: i32, meta: Option<M>) -> ContentKey {
        let key = self.store.add(content, meta, Some(QUEUE_CONTENT_TYPE));
        self.store.using(&key, true);
        self.buckets.entry(priority).or_default().push(key.clone());
        self.priorities.insert(key.clone(), priority);
        key
    }

    /// Removes `keys` from the queue, optionally only from the given
    /// priorities. Returns the keys that were actually removed.
    pub fn remove<'a, I>(&mut self, keys: I, priorities: Option<&[i32]>) -> Vec<ContentKey>
    where
        I: IntoIterator<Item = &'a ContentKey>,
    {
        let mut removed: Vec<ContentKey> = Vec::new();
        for key in keys {
            let Some(&priority) = self.priorities.get(key) else {
                continue;
            };
            if priorities.is_some_and(|allowed| !allowed.contains(&priority)) {
                continue;
            }
            if let Some(bucket) = self.buckets.get_mut(&priority) {
                bucket.retain(|queued| queued != key);
                if bucket.is_empty() {
                    self.buckets.remove(&priority);
                }
            }
            self.priorities.remove(key);
            removed.push(key.clone());
        }
        self.store.remove(&removed)
    }

    /// Removes every queued entry holding `content`.
    pub fn remove_content(&mut self, content: &T, priorities: Option<&[i32]>) -> Vec<ContentKey> {
        let keys = self.store.keys_of(content, Some(QUEUE_CONTENT_TYPE));
        self.remove(&keys, priorities)
    }

    /// Snapshot of the queued entries in dispatch order.
    pub fn export(&self) -> Vec<ContentEntry<T, M>> {
        self.buckets
            .values()
            .flatten()
            .filter_map(|key| self.store.get(key).cloned())
            .collect()
    }

    /// Snapshot of the queued contents in dispatch order.
    pub fn export_content(&self) -> Vec<T> {
        self.buckets
            .values()
            .flatten()
            .filter_map(|key| self.store.get(key).map(|entry| entry.content.clone()))
            .collect()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            priorities: self.buckets.len(),
            contents: self.priorities.len(),
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<&ContentEntry<T, M>> {
        self.store.get(key)
    }

    pub fn priority_of(&self, key: &ContentKey) -> Option<i32> {
        self.priorities.get(key).copied()
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.priorities.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    /// Clones of the queued entries matching `predicate`, in store order.
    pub fn filter<P>(&self, predicate: P) -> Vec<ContentEntry<T, M>>
    where
        P: Fn(&ContentEntry<T, M>) -> bool,
    {
        self.store.filter(predicate, Some(&[QUEUE_CONTENT_TYPE]))
    }

    pub fn is_using(&self, key: &ContentKey) -> bool {
        self.store.is_using(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn queue_of(items: &[(&str, i32)]) -> (PriorityQueue<Value>, Vec<ContentKey>) {
        let mut queue = PriorityQueue::new();
        let keys = items
            .iter()
            .map(|(content, priority)| queue.add(Value::from(*content), *priority, None))
            .collect();
        (queue, keys)
    }

    #[test]
    fn test_export_orders_by_priority_then_insertion() {
        let (queue, _) = queue_of(&[("l", 100), ("m", 50), ("n", 100), ("o", -5)]);
        assert_eq!(
            queue.export_content(),
            vec![
                Value::from("o"),
                Value::from("m"),
                Value::from("l"),
                Value::from("n")
            ]
        );
    }

    #[test]
    fn test_status_tracks_buckets() {
        let (mut queue, keys) = queue_of(&[("a", 1), ("b", 1), ("c", 2)]);
        assert_eq!(
            queue.status(),
            QueueStatus {
                priorities: 2,
                contents: 3
            }
        );

        queue.remove([&keys[2]], None);
        assert_eq!(
            queue.status(),
            QueueStatus {
                priorities: 1,
                contents: 2
            }
        );
        assert_eq!(queue.priority_of(&keys[2]), None);
    }

    #[test]
    fn test_remove_respects_priority_filter() {
        let (mut queue, keys) = queue_of(&[("a", 1), ("b", 2)]);
        assert!(queue.remove(&keys, Some(&[3])).is_empty());
        assert_eq!(queue.remove(&keys, Some(&[2])), vec![keys[1].clone()]);
        assert_eq!(queue.export_content(), vec![Value::from("a")]);
    }

    #[test]
    fn test_remove_twice_returns_empty() {
        let (mut queue, keys) = queue_of(&[("a", 1)]);
        assert_eq!(queue.remove(&keys, None), keys);
        assert!(queue.remove(&keys, None).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_content() {
        let (mut queue, keys) = queue_of(&[("a", 1), ("b", 1), ("a", 3)]);
        let removed = queue.remove_content(&Value::from("a"), None);
        assert_eq!(removed, vec![keys[0].clone(), keys[2].clone()]);
        assert_eq!(queue.status().priorities, 1);
    }

    #[test]
    fn test_filter_returns_queued_entries() {
        let (mut queue, keys) = queue_of(&[("a", 5), ("b", 1), ("a", 0)]);
        let hits: Vec<ContentKey> = queue
            .filter(|entry| entry.content == Value::from("a"))
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(hits, vec![keys[0].clone(), keys[2].clone()]);

        queue.remove([&keys[0]], None);
        assert_eq!(queue.filter(|_| true).len(), 2);
    }

    #[test]
    fn test_snapshot_is_detached_from_queue() {
        let (mut queue, keys) = queue_of(&[("a", 1), ("b", 2)]);
        let snapshot = queue.export();
        queue.remove(&keys, None);
        queue.add(Value::from("c"), 0, None);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].content, Value::from("a"));
    }

    #[test]
    fn test_added_keys_are_marked_in_use() {
        let (mut queue, keys) = queue_of(&[("a", 1)]);
        assert!(queue.is_using(&keys[0]));
        queue.remove(&keys, None);
        assert!(!queue.is_using(&keys[0]));
    }
}
