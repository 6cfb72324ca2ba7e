//! # Event Emitter
//!
//! The emitter keeps one [`PriorityQueue`](crate::priority_queue::PriorityQueue)
//! of listeners per event name and dispatches them in priority order.
//!
//! ## Emission Flow
//!
//! ```text
//! emit("x", data)
//!   │
//!   ├─▶ snapshot listeners of "x" ──▶ invoke (sync) / schedule (async)
//!   ├─▶ dispatch "event_emitted" with ["x", data]
//!   ├─▶ notice followers (unless "x" is private)
//!   └─▶ dispatch "x_complete" with data
//! ```
//!
//! Listeners added while an emission is running are not part of its snapshot
//! and only fire on the next emission.
//!
//! ## Following
//!
//! An emitter can be attached to another one as a follower. Every non-private
//! event of the followed emitter is delivered to the follower's
//! [`notice`](EventEmitter::notice), which re-emits it either verbatim (mimic
//! rules) or wrapped in an envelope under seven derived names:
//!
//! ```text
//! ID.E   T.E   noticed.ID.E   noticed.ID   noticed.T.E   noticed.T   noticed
//! ```

pub mod emitter;
pub mod link;
pub mod listener;

pub use emitter::{EmitterBuilder, EventEmitter, WeakEmitter};
pub use link::{notice_event_names, LinkFilter};
pub use listener::{
    CallbackRegistry, Emission, Listener, ListenerFn, ListenerList, ListenerMeta,
    ListenerOptions, Remaining, Remover, Times,
};

/// Events the emitter dispatches on its own.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinEvent {
    /// Dispatched after every emission with `[event, data]`
    EventEmitted,
    /// Dispatched on the followed emitter before a follower is dropped
    Detach,
    /// Dispatched on the follower after it stopped following
    Detached,
    /// Catch-all name of notice envelopes
    Noticed,
}

/// Name of the event dispatched after `event` completed.
pub fn complete_event(event: &str) -> String {
    format!("{}_complete", event)
}

/// Event names accepted by `add_listener`, `emit` and `remove_listener`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventNames(pub Vec<String>);

impl EventNames {
    /// Names with duplicates dropped, first occurrence kept.
    pub fn unique(self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.0.len());
        for name in self.0 {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl From<&str> for EventNames {
    fn from(name: &str) -> Self {
        EventNames(vec![name.to_string()])
    }
}

impl From<String> for EventNames {
    fn from(name: String) -> Self {
        EventNames(vec![name])
    }
}

impl From<&String> for EventNames {
    fn from(name: &String) -> Self {
        EventNames(vec![name.clone()])
    }
}

impl From<BuiltinEvent> for EventNames {
    fn from(event: BuiltinEvent) -> Self {
        EventNames(vec![event.to_string()])
    }
}

impl From<Vec<String>> for EventNames {
    fn from(names: Vec<String>) -> Self {
        EventNames(names)
    }
}

impl From<Vec<&str>> for EventNames {
    fn from(names: Vec<&str>) -> Self {
        EventNames(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for EventNames {
    fn from(names: &[&str]) -> Self {
        EventNames(names.iter().map(|name| name.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        EventNames(names.iter().map(|name| name.to_string()).collect())
    }
}
