//! # Event Emitter Core
//!
//! Registration, dispatch and removal of listeners. Cross-emitter
//! following lives in [`super::link`].
//!
//! ## Locking
//!
//! All state of an emitter sits behind one mutex. The lock is only held to
//! take snapshots and to update bookkeeping; it is released before any
//! listener runs and before a follower is noticed, so listeners can add,
//! remove and emit on the same emitter.
//!
//! ## Deferred listeners
//!
//! Listeners registered with `asynchronous()` are spawned on the current
//! tokio runtime and run after a yield (or `async_delay`). A deferred call
//! that is already scheduled still runs if its listener is removed in the
//! meantime; the task owns the callable and the payload it was given.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tracing::{debug, trace, warn};

use super::{
    complete_event,
    link::{FollowerLink, FollowingLink},
    listener::{
        Callback, CallbackRegistry, Emission, Listener, ListenerList, ListenerMeta,
        ListenerOptions, Remaining, Remover, Times,
    },
    BuiltinEvent, EventNames,
};
use crate::{
    config::EmitterConfig,
    content_store::ContentKey,
    identity::{random_id, IdAllocator},
    priority_queue::{PriorityQueue, QueueStatus},
    Value,
};

/// Listeners of one event.
#[derive(Default)]
pub(crate) struct EventRegistration {
    pub(crate) queue: PriorityQueue<Callback, ListenerMeta>,
    /// listener key -> queue keys registered under it
    pub(crate) key_mapping: HashMap<String, Vec<ContentKey>>,
}

impl EventRegistration {
    /// Drops removed queue keys from the listener key mapping.
    fn forget(&mut self, removed: &[ContentKey]) {
        if removed.is_empty() {
            return;
        }
        self.key_mapping.retain(|_, keys| {
            keys.retain(|key| !removed.contains(key));
            !keys.is_empty()
        });
    }
}

pub(crate) struct EmitterState {
    pub(crate) config: EmitterConfig,
    pub(crate) events: HashMap<String, EventRegistration>,
    pub(crate) listener_seq: u64,
    pub(crate) privates: Vec<String>,
    pub(crate) mimics: Vec<String>,
    /// Emitters noticed on every non-private event, in attach order
    pub(crate) followers: Vec<FollowerLink>,
    /// Emitters this one follows, by their id
    pub(crate) following: HashMap<String, FollowingLink>,
}

pub(crate) struct EmitterInner {
    pub(crate) id: String,
    pub(crate) type_tag: String,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) state: Mutex<EmitterState>,
}

/// Handle to an emitter. Clones share the same listeners and links.
pub struct EventEmitter {
    pub(crate) inner: Arc<EmitterInner>,
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("id", &self.inner.id)
            .field("type_tag", &self.inner.type_tag)
            .finish()
    }
}

impl PartialEq for EventEmitter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning emitter handle, used for follower links and listener contexts.
#[derive(Clone)]
pub struct WeakEmitter(Weak<EmitterInner>);

impl WeakEmitter {
    pub fn upgrade(&self) -> Option<EventEmitter> {
        self.0.upgrade().map(|inner| EventEmitter { inner })
    }
}

impl fmt::Debug for WeakEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(inner) => write!(f, "WeakEmitter({})", inner.id),
            None => write!(f, "WeakEmitter(dropped)"),
        }
    }
}

#[derive(Default)]
pub struct EmitterBuilder {
    config: EmitterConfig,
    id: Option<String>,
    type_tag: Option<String>,
    allocator: Option<Arc<IdAllocator>>,
    callbacks: Option<Arc<CallbackRegistry>>,
}

impl EmitterBuilder {
    pub fn config(mut self, config: EmitterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Overrides `config.type_tag`.
    pub fn type_tag<S: Into<String>>(mut self, type_tag: S) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    pub fn allocator(mut self, allocator: Arc<IdAllocator>) -> Self {
        self.allocator = Some(allocator);
        self
    }

    pub fn callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn build(self) -> EventEmitter {
        let mut config = self.config;
        if let Some(type_tag) = self.type_tag {
            config.type_tag = type_tag;
        }
        let type_tag = config.type_tag.clone();
        let id = match (self.id, self.allocator) {
            (Some(id), _) => id,
            (None, Some(allocator)) => allocator.next_id(&type_tag),
            (None, None) => random_id(&type_tag),
        };
        debug!("Emitter created: {} ({})", id, type_tag);
        EventEmitter {
            inner: Arc::new(EmitterInner {
                id,
                type_tag,
                callbacks: self.callbacks.unwrap_or_default(),
                state: Mutex::new(EmitterState {
                    config,
                    events: HashMap::new(),
                    listener_seq: 0,
                    privates: Vec::new(),
                    mimics: Vec::new(),
                    followers: Vec::new(),
                    following: HashMap::new(),
                }),
            }),
        }
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_config(config: EmitterConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> EmitterBuilder {
        EmitterBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn type_tag(&self) -> &str {
        &self.inner.type_tag
    }

    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.inner.callbacks
    }

    pub fn downgrade(&self) -> WeakEmitter {
        WeakEmitter(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> EmitterConfig {
        self.state().config.clone()
    }

    /// Sets the soft per-event listener limit; `-1` disables it.
    pub fn set_max_listeners(&self, max_listeners: i64) {
        self.state().config.max_listeners = max_listeners;
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EmitterState> {
        // The lock is never held across a listener call.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `listeners` on every event in `events` under one listener key.
    ///
    /// Returns the listener key, or `None` when there is no event name, no
    /// listener left after resolving named listeners, or no call left
    /// (`times(0)`).
    pub fn add_listener(
        &self,
        events: impl Into<EventNames>,
        listeners: impl Into<ListenerList>,
        options: ListenerOptions,
    ) -> Option<String> {
        let names = events.into().unique();
        let callbacks: Vec<Callback> = listeners
            .into()
            .0
            .into_iter()
            .filter_map(|listener| match listener {
                Listener::Direct(f) => Some(Callback(f)),
                Listener::Named(name) => match self.inner.callbacks.get(&name) {
                    Some(f) => Some(Callback(f)),
                    None => {
                        warn!("Named listener not found: {}", name);
                        None
                    }
                },
            })
            .collect();
        if names.is_empty() || callbacks.is_empty() || options.times == Times::Limited(0) {
            return None;
        }

        let context = options.context.as_ref().map(EventEmitter::downgrade);
        let mut state = self.state();
        let listener_key = match options.key {
            Some(key) => key,
            None => {
                state.listener_seq += 1;
                format!("listener_{}", state.listener_seq)
            }
        };
        let priority = options.priority.unwrap_or(state.config.default_priority);

        for name in names {
            let current = state.events.get(&name).map_or(0, |r| r.queue.len());
            if state.config.limit_reached(current) {
                warn!(
                    "Possible listener leak: event '{}' on {} already has {} listeners (limit {})",
                    name, self.inner.id, current, state.config.max_listeners
                );
            }
            let registration = state.events.entry(name.clone()).or_default();
            for callback in &callbacks {
                let meta = ListenerMeta {
                    listener_key: listener_key.clone(),
                    priority,
                    remaining: Remaining::new(options.times),
                    is_async: options.is_async,
                    context: context.clone(),
                    event: name.clone(),
                };
                let key = registration.queue.add(callback.clone(), priority, Some(meta));
                registration
                    .key_mapping
                    .entry(listener_key.clone())
                    .or_default()
                    .push(key);
            }
            debug!(
                "Listener registered: {} on '{}' (priority {})",
                listener_key, name, priority
            );
        }
        Some(listener_key)
    }

    pub fn on(
        &self,
        events: impl Into<EventNames>,
        listeners: impl Into<ListenerList>,
        options: ListenerOptions,
    ) -> Option<String> {
        self.add_listener(events, listeners, options)
    }

    /// `add_listener` with a call count of one.
    pub fn add_once_listener(
        &self,
        events: impl Into<EventNames>,
        listeners: impl Into<ListenerList>,
        options: ListenerOptions,
    ) -> Option<String> {
        self.add_listener(events, listeners, options.once())
    }

    pub fn once(
        &self,
        events: impl Into<EventNames>,
        listeners: impl Into<ListenerList>,
        options: ListenerOptions,
    ) -> Option<String> {
        self.add_once_listener(events, listeners, options)
    }

    /// Removes listeners by key or callable from `events` (all events when
    /// `None`), optionally only at `priority`.
    ///
    /// Returns the removed queue keys per event; events without hits are
    /// left out.
    pub fn remove_listener<I, R>(
        &self,
        removers: I,
        events: Option<EventNames>,
        priority: Option<i32>,
    ) -> BTreeMap<String, Vec<ContentKey>>
    where
        I: IntoIterator<Item = R>,
        R: Into<Remover>,
    {
        let removers: Vec<Remover> = removers.into_iter().map(Into::into).collect();
        let priorities = priority.map(|p| vec![p]);
        let mut removed_by_event = BTreeMap::new();

        let mut state = self.state();
        let names = match events {
            Some(events) => events.unique(),
            None => state.events.keys().cloned().collect(),
        };
        for name in names {
            let Some(registration) = state.events.get_mut(&name) else {
                continue;
            };
            let mut removed: Vec<ContentKey> = Vec::new();
            for remover in &removers {
                let hits = match remover {
                    Remover::Key(listener_key) => {
                        let keys = registration
                            .key_mapping
                            .get(listener_key)
                            .cloned()
                            .unwrap_or_default();
                        registration.queue.remove(&keys, priorities.as_deref())
                    }
                    Remover::Callback(f) => registration
                        .queue
                        .remove_content(&Callback(f.clone()), priorities.as_deref()),
                };
                registration.forget(&hits);
                removed.extend(hits);
            }
            let drained = registration.queue.is_empty();
            if drained {
                state.events.remove(&name);
            }
            if !removed.is_empty() {
                debug!("Listeners removed from '{}': {:?}", name, removed);
                removed_by_event.insert(name, removed);
            }
        }
        removed_by_event
    }

    pub fn off<I, R>(
        &self,
        removers: I,
        events: Option<EventNames>,
        priority: Option<i32>,
    ) -> BTreeMap<String, Vec<ContentKey>>
    where
        I: IntoIterator<Item = R>,
        R: Into<Remover>,
    {
        self.remove_listener(removers, events, priority)
    }

    /// Drops every listener of `events`, or of all events. Returns how many
    /// listeners were removed.
    pub fn remove_all_listeners(&self, events: Option<EventNames>) -> usize {
        let mut state = self.state();
        let names: Vec<String> = match events {
            Some(events) => events.unique(),
            None => state.events.keys().cloned().collect(),
        };
        names
            .iter()
            .filter_map(|name| state.events.remove(name))
            .map(|registration| registration.queue.len())
            .sum()
    }

    /// Emits each event in `events`, in order, with `data`.
    pub fn emit_event<F>(
        &self,
        events: impl Into<EventNames>,
        data: impl Into<Value>,
        final_callback: Option<F>,
    ) where
        F: FnOnce(),
    {
        let data = data.into();
        for name in events.into().0 {
            trace!("Emitting '{}' on {}", name, self.inner.id);
            self.dispatch(&name, &data);
            if name != BuiltinEvent::EventEmitted.as_ref() {
                self.dispatch(
                    BuiltinEvent::EventEmitted.as_ref(),
                    &Value::List(vec![Value::from(name.as_str()), data.clone()]),
                );
            }
            self.propagate(&name, &data);
            self.dispatch(&complete_event(&name), &data);
        }
        if let Some(final_callback) = final_callback {
            final_callback();
        }
    }

    pub fn emit(&self, events: impl Into<EventNames>, data: impl Into<Value>) {
        self.emit_event(events, data, None::<fn()>)
    }

    /// `emit` followed by `final_callback` once every event was processed.
    pub fn emit_with<F>(&self, events: impl Into<EventNames>, data: impl Into<Value>, final_callback: F)
    where
        F: FnOnce(),
    {
        self.emit_event(events, data, Some(final_callback))
    }

    /// Runs the listeners of one event over a snapshot of its queue.
    pub(crate) fn dispatch(&self, event: &str, data: &Value) {
        let snapshot = match self.state().events.get(event) {
            Some(registration) => registration.queue.export(),
            None => return,
        };

        for entry in snapshot {
            let Some(meta) = entry.meta else {
                continue;
            };
            if !meta.remaining.try_consume() {
                continue;
            }
            if meta.remaining.is_exhausted() {
                self.retire(event, &entry.key);
            }

            let context = meta
                .context
                .as_ref()
                .and_then(WeakEmitter::upgrade)
                .unwrap_or_else(|| self.clone());
            let emission = Emission {
                event: event.to_string(),
                data: data.clone(),
                context,
                listener_key: meta.listener_key,
            };
            let Callback(callback) = entry.content;
            if meta.is_async {
                self.schedule(move || callback(&emission));
            } else {
                trace!("Invoking {} for '{}'", emission.listener_key, event);
                callback(&emission);
            }
        }
    }

    /// Unregisters an exhausted listener.
    fn retire(&self, event: &str, key: &ContentKey) {
        let mut state = self.state();
        let Some(registration) = state.events.get_mut(event) else {
            return;
        };
        let removed = registration.queue.remove([key], None);
        registration.forget(&removed);
        if registration.queue.is_empty() {
            state.events.remove(event);
        }
        trace!("Listener exhausted: {} on '{}'", key, event);
    }

    /// Runs `f` on a later turn of the tokio scheduler.
    pub(crate) fn schedule<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.state().config.async_delay;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(delay).await;
                    }
                    f();
                });
            }
            Err(_) => {
                warn!("No tokio runtime for deferred call on {}; running inline", self.inner.id);
                f();
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.state()
            .events
            .get(event)
            .map_or(0, |registration| registration.queue.len())
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    /// Events with at least one listener, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().events.keys().cloned().collect();
        names.sort();
        names
    }

    /// Listener keys registered on `event`, sorted.
    pub fn listener_keys(&self, event: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .state()
            .events
            .get(event)
            .map(|registration| registration.key_mapping.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn queue_status(&self, event: &str) -> Option<QueueStatus> {
        self.state()
            .events
            .get(event)
            .map(|registration| registration.queue.status())
    }

    /// Remaining call count of every listener registered under `listener_key`
    /// on `event`, in dispatch order.
    pub fn remaining_calls(&self, event: &str, listener_key: &str) -> Vec<Times> {
        let state = self.state();
        let Some(registration) = state.events.get(event) else {
            return Vec::new();
        };
        registration
            .queue
            .export()
            .into_iter()
            .filter_map(|entry| entry.meta)
            .filter(|meta| meta.listener_key == listener_key)
            .map(|meta| meta.remaining.get())
            .collect()
    }
}
