//! # Keyed Content Store
//!
//! A small generic object store. Every entry gets a freshly minted
//! [`ContentKey`] that is never handed out twice by the same store, even after
//! the entry is removed. The key carries the entry's content type, so the type
//! group of a key is known without a reverse index.
//!
//! Next to the entries the store keeps an independent "using" set. Marking a
//! key as used does not protect it from removal; it is advisory bookkeeping
//! for owners that build on top of the store (see
//! [`PriorityQueue`](crate::priority_queue::PriorityQueue)).

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    str::FromStr,
};

use tracing::trace;

use crate::{EmitterError, Value};

/// Something that can live in a [`ContentStore`].
pub trait Content: Clone {
    /// Type tag detected from the runtime shape of the content.
    fn content_type(&self) -> String;

    /// Identity check used by `add_unique` and `remove_content`.
    fn is_same(&self, other: &Self) -> bool;
}

impl Content for Value {
    fn content_type(&self) -> String {
        self.type_name().to_string()
    }

    fn is_same(&self, other: &Self) -> bool {
        self == other
    }
}

impl Content for String {
    fn content_type(&self) -> String {
        "string".to_string()
    }

    fn is_same(&self, other: &Self) -> bool {
        self == other
    }
}

/// Key of a stored entry, rendered as `"{type}#{sequence}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    content_type: String,
    seq: u64,
}

impl ContentKey {
    fn new(content_type: &str, seq: u64) -> Self {
        Self {
            content_type: content_type.to_string(),
            seq,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.content_type, self.seq)
    }
}

impl FromStr for ContentKey {
    type Err = EmitterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (content_type, seq) = s
            .rsplit_once('#')
            .ok_or_else(|| EmitterError::InvalidKey(s.to_string()))?;
        if content_type.is_empty() {
            return Err(EmitterError::InvalidKey(s.to_string()));
        }
        let seq = seq
            .parse::<u64>()
            .map_err(|_| EmitterError::InvalidKey(s.to_string()))?;
        Ok(Self::new(content_type, seq))
    }
}

/// A stored entry. Lookups hand out clones of these.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentEntry<T, M> {
    pub key: ContentKey,
    pub content_type: String,
    pub content: T,
    pub meta: Option<M>,
}

pub struct ContentStore<T, M = Value> {
    groups: BTreeMap<String, BTreeMap<u64, ContentEntry<T, M>>>,
    // Never pruned, so sequences are not reused after a type group empties.
    counters: HashMap<String, u64>,
    using: HashSet<ContentKey>,
}

impl<T, M> Default for ContentStore<T, M> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            counters: HashMap::new(),
            using: HashSet::new(),
        }
    }
}

impl<T: Content, M: Clone> ContentStore<T, M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `content` under a fresh key. The type is detected from the
    /// content when `content_type` is `None`.
    pub fn add(&mut self, content: T, meta: Option<M>, content_type: Option<&str>) -> ContentKey {
        let content_type = match content_type {
            Some(t) => t.to_string(),
            None => content.content_type(),
        };
        let key = self.mint_key(&content_type);
        trace!("Content added: {}", key);
        self.groups.entry(content_type.clone()).or_default().insert(
            key.seq,
            ContentEntry {
                key: key.clone(),
                content_type,
                content,
                meta,
            },
        );
        key
    }

    /// Returns the key of an entry of the same type holding identical
    /// content, or stores a new one.
    pub fn add_unique(
        &mut self,
        content: T,
        meta: Option<M>,
        content_type: Option<&str>,
    ) -> ContentKey {
        let resolved_type = match content_type {
            Some(t) => t.to_string(),
            None => content.content_type(),
        };
        let existing = self.groups.get(&resolved_type).and_then(|group| {
            group
                .values()
                .find(|entry| entry.content.is_same(&content))
                .map(|entry| entry.key.clone())
        });
        match existing {
            Some(key) => key,
            None => self.add(content, meta, Some(&resolved_type)),
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<&ContentEntry<T, M>> {
        self.groups
            .get(&key.content_type)
            .and_then(|group| group.get(&key.seq))
    }

    pub fn contains(&self, key: &ContentKey) -> bool {
        self.get(key).is_some()
    }

    pub fn get_content(&self, key: &ContentKey, default: T) -> T {
        self.get(key)
            .map(|entry| entry.content.clone())
            .unwrap_or(default)
    }

    pub fn get_meta(&self, key: &ContentKey, default: M) -> M {
        self.get(key)
            .and_then(|entry| entry.meta.clone())
            .unwrap_or(default)
    }

    /// Sets or clears the usage mark of an existing key.
    pub fn using(&mut self, key: &ContentKey, flag: bool) -> bool {
        if !self.contains(key) {
            return false;
        }
        if flag {
            self.using.insert(key.clone());
        } else {
            self.using.remove(key);
        }
        true
    }

    /// Clears usage marks. Returns how many keys were marked.
    pub fn unused<'a, I>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a ContentKey>,
    {
        keys.into_iter()
            .filter(|key| self.using.remove(*key))
            .count()
    }

    pub fn is_using(&self, key: &ContentKey) -> bool {
        self.using.contains(key)
    }

    /// Removes the entries that exist and returns their keys. Unknown keys
    /// are skipped.
    pub fn remove<'a, I>(&mut self, keys: I) -> Vec<ContentKey>
    where
        I: IntoIterator<Item = &'a ContentKey>,
    {
        let mut removed = Vec::new();
        for key in keys {
            let hit = self
                .groups
                .get_mut(&key.content_type)
                .and_then(|group| group.remove(&key.seq));
            if hit.is_some() {
                self.using.remove(key);
                removed.push(key.clone());
            }
        }
        self.groups.retain(|_, group| !group.is_empty());
        if !removed.is_empty() {
            trace!("Content removed: {:?}", removed);
        }
        removed
    }

    /// Keys of entries holding `content`, searched in `content_type` or in
    /// every type group.
    pub fn keys_of(&self, content: &T, content_type: Option<&str>) -> Vec<ContentKey> {
        self.groups
            .iter()
            .filter(|(group_type, _)| content_type.map_or(true, |t| t == group_type.as_str()))
            .flat_map(|(_, group)| group.values())
            .filter(|entry| entry.content.is_same(content))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn remove_content(&mut self, content: &T, content_type: Option<&str>) -> Vec<ContentKey> {
        let keys = self.keys_of(content, content_type);
        self.remove(&keys)
    }

    /// Clones of every entry matching `predicate`, optionally restricted to
    /// some type groups.
    pub fn filter<P>(&self, predicate: P, types: Option<&[&str]>) -> Vec<ContentEntry<T, M>>
    where
        P: Fn(&ContentEntry<T, M>) -> bool,
    {
        self.scan(types)
            .filter(|entry| predicate(entry))
            .cloned()
            .collect()
    }

    /// Clone of the first entry matching `predicate`.
    pub fn find<P>(&self, predicate: P, types: Option<&[&str]>) -> Option<ContentEntry<T, M>>
    where
        P: Fn(&ContentEntry<T, M>) -> bool,
    {
        self.scan(types).find(|entry| predicate(entry)).cloned()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn types(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    fn scan<'a>(
        &'a self,
        types: Option<&'a [&'a str]>,
    ) -> impl Iterator<Item = &'a ContentEntry<T, M>> + 'a {
        self.groups
            .iter()
            .filter(move |(group_type, _)| {
                types.map_or(true, |types| types.contains(&group_type.as_str()))
            })
            .flat_map(|(_, group)| group.values())
    }

    fn mint_key(&mut self, content_type: &str) -> ContentKey {
        let counter = self.counters.entry(content_type.to_string()).or_insert(0);
        *counter += 1;
        ContentKey::new(content_type, *counter)
    }
}
