//! Emitter id assignment.

use dashmap::DashMap;
use uuid::Uuid;

/// Hands out sequential ids per type tag (`"{type}_{n}"`).
///
/// Allocators are ordinary values: share one between emitters that must not
/// collide, create a fresh one for isolated tests.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counters: DashMap<String, u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, type_tag: &str) -> String {
        let mut counter = self.counters.entry(type_tag.to_string()).or_insert(0);
        *counter += 1;
        format!("{}_{}", type_tag, *counter)
    }
}

/// Id for an emitter built without an allocator.
pub fn random_id(type_tag: &str) -> String {
    format!("{}_{}", type_tag, Uuid::new_v4().simple())
}
