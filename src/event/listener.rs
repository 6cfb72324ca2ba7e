//! Listener types: callables, call-count limits, registration options and
//! removal handles.

use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;

use crate::{
    content_store::Content, EmitterError, EmitterResult, EventEmitter, Value, WeakEmitter,
};

/// What a listener receives when it is invoked.
#[derive(Debug, Clone)]
pub struct Emission {
    /// Name of the dispatched event
    pub event: String,
    /// Payload of the emission (`Value::Null` when none was given)
    pub data: Value,
    /// Emitter the listener is bound to; the registering emitter by default
    pub context: EventEmitter,
    /// Key shared by every listener registered in the same call
    pub listener_key: String,
}

pub type ListenerFn = Arc<dyn Fn(&Emission) + Send + Sync>;

/// A listener as given to `add_listener`.
///
/// `Named` listeners are looked up in the emitter's [`CallbackRegistry`] once,
/// at registration time. Unknown names are dropped.
#[derive(Clone)]
pub enum Listener {
    Direct(ListenerFn),
    Named(String),
}

impl Listener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Emission) + Send + Sync + 'static,
    {
        Listener::Direct(Arc::new(f))
    }

    pub fn named<S: Into<String>>(name: S) -> Self {
        Listener::Named(name.into())
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Direct(callback) => {
                write!(f, "Direct({:p})", Arc::as_ptr(callback) as *const ())
            }
            Listener::Named(name) => write!(f, "Named({})", name),
        }
    }
}

impl From<ListenerFn> for Listener {
    fn from(f: ListenerFn) -> Self {
        Listener::Direct(f)
    }
}

/// One or more listeners registered under a single listener key.
#[derive(Debug, Clone, Default)]
pub struct ListenerList(pub Vec<Listener>);

impl From<Listener> for ListenerList {
    fn from(listener: Listener) -> Self {
        ListenerList(vec![listener])
    }
}

impl From<Vec<Listener>> for ListenerList {
    fn from(listeners: Vec<Listener>) -> Self {
        ListenerList(listeners)
    }
}

impl From<ListenerFn> for ListenerList {
    fn from(f: ListenerFn) -> Self {
        ListenerList(vec![Listener::Direct(f)])
    }
}

/// Queue content of a registered listener. Identity is the callable's address.
#[derive(Clone)]
pub(crate) struct Callback(pub(crate) ListenerFn);

impl Callback {
    pub(crate) fn is(&self, other: &ListenerFn) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(other))
    }
}

impl Content for Callback {
    fn content_type(&self) -> String {
        "listener".to_string()
    }

    fn is_same(&self, other: &Self) -> bool {
        self.is(&other.0)
    }
}

/// How many times a listener may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Times {
    #[default]
    Forever,
    Limited(u64),
}

const FOREVER: i64 = -1;

/// Remaining call count shared by every copy of a listener's meta, so a
/// snapshot taken before a nested emission still sees its decrements.
#[derive(Debug, Clone)]
pub struct Remaining(Arc<AtomicI64>);

impl Remaining {
    pub fn new(times: Times) -> Self {
        let raw = match times {
            Times::Forever => FOREVER,
            Times::Limited(n) => n.min(i64::MAX as u64) as i64,
        };
        Self(Arc::new(AtomicI64::new(raw)))
    }

    pub fn get(&self) -> Times {
        match self.0.load(Ordering::SeqCst) {
            FOREVER => Times::Forever,
            n => Times::Limited(n as u64),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.0.load(Ordering::SeqCst) == 0
    }

    /// Takes one call. Returns false when nothing is left.
    pub fn try_consume(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                FOREVER => Some(FOREVER),
                n if n > 0 => Some(n - 1),
                _ => None,
            })
            .is_ok()
    }
}

/// Bookkeeping stored next to every queued listener.
#[derive(Debug, Clone)]
pub struct ListenerMeta {
    pub listener_key: String,
    pub priority: i32,
    pub remaining: Remaining,
    pub is_async: bool,
    pub context: Option<WeakEmitter>,
    pub event: String,
}

/// Options of `add_listener`.
#[derive(Debug, Clone, Default)]
pub struct ListenerOptions {
    pub priority: Option<i32>,
    pub times: Times,
    pub context: Option<EventEmitter>,
    pub key: Option<String>,
    pub is_async: bool,
}

impl ListenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn times(mut self, times: u64) -> Self {
        self.times = Times::Limited(times);
        self
    }

    pub fn once(self) -> Self {
        self.times(1)
    }

    pub fn context(mut self, context: &EventEmitter) -> Self {
        self.context = Some(context.clone());
        self
    }

    pub fn key<S: Into<String>>(mut self, key: S) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// Named callables that `Listener::Named` resolves against.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: DashMap<String, ListenerFn>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S, F>(&self, name: S, f: F)
    where
        S: Into<String>,
        F: Fn(&Emission) + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<ListenerFn> {
        self.callbacks.get(name).map(|f| f.value().clone())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.callbacks.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Selects listeners to remove: by listener key or by callable.
#[derive(Clone)]
pub enum Remover {
    Key(String),
    Callback(ListenerFn),
}

impl fmt::Debug for Remover {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remover::Key(key) => write!(f, "Key({})", key),
            Remover::Callback(callback) => {
                write!(f, "Callback({:p})", Arc::as_ptr(callback) as *const ())
            }
        }
    }
}

impl From<&str> for Remover {
    fn from(key: &str) -> Self {
        Remover::Key(key.to_string())
    }
}

impl From<String> for Remover {
    fn from(key: String) -> Self {
        Remover::Key(key)
    }
}

impl From<ListenerFn> for Remover {
    fn from(f: ListenerFn) -> Self {
        Remover::Callback(f)
    }
}

impl From<&ListenerFn> for Remover {
    fn from(f: &ListenerFn) -> Self {
        Remover::Callback(f.clone())
    }
}

impl TryFrom<Value> for Remover {
    type Error = EmitterError;

    fn try_from(value: Value) -> EmitterResult<Self> {
        match value {
            Value::String(key) => Ok(Remover::Key(key)),
            other => Err(EmitterError::invalid_argument(format!(
                "listener remover must be a key or a callable, got {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_limited() {
        let remaining = Remaining::new(Times::Limited(2));
        assert!(remaining.try_consume());
        assert_eq!(remaining.get(), Times::Limited(1));
        assert!(remaining.try_consume());
        assert!(remaining.is_exhausted());
        assert!(!remaining.try_consume());
        assert_eq!(remaining.get(), Times::Limited(0));
    }

    #[test]
    fn test_remaining_forever_never_exhausts() {
        let remaining = Remaining::new(Times::Forever);
        for _ in 0..100 {
            assert!(remaining.try_consume());
        }
        assert_eq!(remaining.get(), Times::Forever);
    }

    #[test]
    fn test_remaining_is_shared_between_copies() {
        let remaining = Remaining::new(Times::Limited(1));
        let copy = remaining.clone();
        assert!(copy.try_consume());
        assert!(remaining.is_exhausted());
    }

    #[test]
    fn test_callback_identity() {
        let f: ListenerFn = Arc::new(|_: &Emission| {});
        let g: ListenerFn = Arc::new(|_: &Emission| {});
        let callback = Callback(f.clone());
        assert!(callback.is(&f));
        assert!(!callback.is(&g));
        assert!(callback.is_same(&Callback(f)));
    }

    #[test]
    fn test_remover_from_value() {
        assert!(matches!(
            Remover::try_from(Value::from("listener_1")),
            Ok(Remover::Key(key)) if key == "listener_1"
        ));
        assert!(matches!(
            Remover::try_from(Value::from(42)),
            Err(EmitterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_callback_registry() {
        let registry = CallbackRegistry::new();
        registry.register("log", |_| {});
        assert!(registry.contains("log"));
        assert!(registry.get("log").is_some());
        assert!(registry.unregister("log"));
        assert!(registry.get("log").is_none());
    }

    #[test]
    fn test_options_builder() {
        let options = ListenerOptions::new().priority(5).once().key("k").asynchronous();
        assert_eq!(options.priority, Some(5));
        assert_eq!(options.times, Times::Limited(1));
        assert_eq!(options.key.as_deref(), Some("k"));
        assert!(options.is_async);
    }
}
