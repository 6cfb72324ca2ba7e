//! Following between emitters: private/mimic rules, attach/detach and the
//! notice protocol.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::{BuiltinEvent, EventEmitter, WeakEmitter};
use crate::{EmitterError, EmitterResult, Value};

/// Event filter of a follower link. An empty `only` list admits every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub only: Vec<String>,
    pub excepts: Vec<String>,
}

impl LinkFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn except<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excepts.extend(events.into_iter().map(Into::into));
        self
    }

    pub fn accepts(&self, event: &str) -> bool {
        (self.only.is_empty() || self.only.iter().any(|e| e == event))
            && !self.excepts.iter().any(|e| e == event)
    }
}

/// Followed side: who to notice and how.
#[derive(Debug, Clone)]
pub(crate) struct FollowerLink {
    pub(crate) id: String,
    pub(crate) target: WeakEmitter,
    pub(crate) is_async: bool,
}

/// Follower side: what it follows and which events it takes.
#[derive(Debug, Clone)]
pub(crate) struct FollowingLink {
    pub(crate) type_tag: String,
    pub(crate) filter: LinkFilter,
    pub(crate) source: WeakEmitter,
}

/// The seven names a notice envelope is emitted under.
pub fn notice_event_names(id: &str, type_tag: &str, event: &str) -> Vec<String> {
    let noticed = BuiltinEvent::Noticed.as_ref();
    vec![
        format!("{}.{}", id, event),
        format!("{}.{}", type_tag, event),
        format!("{}.{}.{}", noticed, id, event),
        format!("{}.{}", noticed, id),
        format!("{}.{}.{}", noticed, type_tag, event),
        format!("{}.{}", noticed, type_tag),
        noticed.to_string(),
    ]
}

fn mimic_candidates(type_tag: &str, event: &str) -> [String; 3] {
    [
        event.to_string(),
        format!("{}.*", type_tag),
        format!("{}.{}", type_tag, event),
    ]
}

impl EventEmitter {
    /// Marks events that are never passed on to followers.
    pub fn private<I, S>(&self, events: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state()
            .privates
            .extend(events.into_iter().map(Into::into));
    }

    /// Adds mimic rules: an event from a followed emitter of type `T` matching
    /// `E`, `T.*` or `T.E` is re-emitted as is instead of as a notice.
    pub fn mimic<I, S>(&self, rules: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().mimics.extend(rules.into_iter().map(Into::into));
    }

    pub fn is_private(&self, event: &str) -> bool {
        self.state().privates.iter().any(|e| e == event)
    }

    /// First mimic rule matching `event` from an emitter of type `type_tag`.
    pub fn mimic_rule(&self, type_tag: &str, event: &str) -> Option<String> {
        let state = self.state();
        mimic_candidates(type_tag, event)
            .into_iter()
            .find(|candidate| state.mimics.contains(candidate))
    }

    /// Makes `other` follow this emitter, noticed on a later scheduler turn.
    ///
    /// Returns `Ok(false)` if `other` already follows.
    pub fn attach(&self, other: &EventEmitter, filter: LinkFilter) -> EmitterResult<bool> {
        self.attach_with(other, filter, true)
    }

    /// Like [`attach`](Self::attach), but `other` is noticed synchronously.
    pub fn attach_hard(&self, other: &EventEmitter, filter: LinkFilter) -> EmitterResult<bool> {
        self.attach_with(other, filter, false)
    }

    /// Makes this emitter follow `other`.
    pub fn attach_to(&self, other: &EventEmitter, filter: LinkFilter) -> EmitterResult<bool> {
        other.attach_with(self, filter, true)
    }

    pub fn attach_hard_to(&self, other: &EventEmitter, filter: LinkFilter) -> EmitterResult<bool> {
        other.attach_with(self, filter, false)
    }

    /// Links `other` as a follower. Mutual or circular following is not
    /// detected: an event passed around a cycle is noticed without end.
    pub fn attach_with(
        &self,
        other: &EventEmitter,
        filter: LinkFilter,
        is_async: bool,
    ) -> EmitterResult<bool> {
        if other.id() == self.id() {
            return Err(EmitterError::invalid_argument(format!(
                "emitter {} cannot follow itself",
                self.id()
            )));
        }
        {
            let mut state = self.state();
            if state.followers.iter().any(|link| link.id == other.id()) {
                return Ok(false);
            }
            state.followers.push(FollowerLink {
                id: other.id().to_string(),
                target: other.downgrade(),
                is_async,
            });
        }
        other.state().following.insert(
            self.id().to_string(),
            FollowingLink {
                type_tag: self.type_tag().to_string(),
                filter,
                source: self.downgrade(),
            },
        );
        debug!(
            "{} attached to {} ({})",
            other.id(),
            self.id(),
            if is_async { "async" } else { "sync" }
        );
        Ok(true)
    }

    /// Stops `other` from following this emitter. `detach` is emitted here and
    /// `detached` on `other`, each with the id of the counterpart, while the
    /// link still exists.
    ///
    /// A hard-attached `other` is noticed of `detach` like any other event. A
    /// deferred notice of it runs after the link is gone and is dropped.
    ///
    /// Returns `Ok(false)` if `other` was not following.
    pub fn detach(&self, other: &EventEmitter) -> EmitterResult<bool> {
        if other.id() == self.id() {
            return Err(EmitterError::invalid_argument(format!(
                "emitter {} cannot detach from itself",
                self.id()
            )));
        }
        if !self.has_follower(other) {
            return Ok(false);
        }
        self.emit(BuiltinEvent::Detach, Value::from(other.id()));
        other.emit(BuiltinEvent::Detached, Value::from(self.id()));

        self.state().followers.retain(|link| link.id != other.id());
        other.state().following.remove(self.id());
        debug!("{} detached from {}", other.id(), self.id());
        Ok(true)
    }

    /// Stops this emitter from following `other`.
    pub fn detach_from(&self, other: &EventEmitter) -> EmitterResult<bool> {
        other.detach(self)
    }

    pub fn has_follower(&self, other: &EventEmitter) -> bool {
        self.state()
            .followers
            .iter()
            .any(|link| link.id == other.id())
    }

    pub fn is_following(&self, other: &EventEmitter) -> bool {
        self.state().following.contains_key(other.id())
    }

    /// Ids of the emitters following this one, in attach order.
    pub fn followers(&self) -> Vec<String> {
        self.state()
            .followers
            .iter()
            .map(|link| link.id.clone())
            .collect()
    }

    /// Ids of the emitters this one follows, with their link filters.
    pub fn following(&self) -> HashMap<String, LinkFilter> {
        self.state()
            .following
            .iter()
            .map(|(id, link)| (id.clone(), link.filter.clone()))
            .collect()
    }

    /// Passes a non-private event on to every live follower.
    pub(crate) fn propagate(&self, event: &str, data: &Value) {
        let followers = {
            let mut state = self.state();
            if state.privates.iter().any(|e| e == event) {
                return;
            }
            state.followers.retain(|link| link.target.upgrade().is_some());
            state.followers.clone()
        };

        for link in followers {
            let Some(target) = link.target.upgrade() else {
                continue;
            };
            if link.is_async {
                let source_id = self.id().to_string();
                let event = event.to_string();
                let data = data.clone();
                self.schedule(move || target.notice(&source_id, &event, data));
            } else {
                target.notice(self.id(), event, data.clone());
            }
        }
    }

    /// Receives `event` from a followed emitter.
    ///
    /// Events from unknown sources or rejected by the link filter are
    /// dropped. A mimic rule match (this emitter's rules first, then the
    /// source's) re-emits the event unchanged; otherwise the envelope
    /// `{id, type, event, data}` is emitted under the names of
    /// [`notice_event_names`].
    pub fn notice(&self, source_id: &str, event: &str, data: Value) {
        let Some(link) = self.state().following.get(source_id).cloned() else {
            trace!("{} ignores notice from unknown {}", self.id(), source_id);
            return;
        };
        if !link.filter.accepts(event) {
            trace!("{} filters '{}' from {}", self.id(), event, source_id);
            return;
        }

        let mimicked = self.mimic_rule(&link.type_tag, event).is_some()
            || link
                .source
                .upgrade()
                .is_some_and(|source| source.mimic_rule(&link.type_tag, event).is_some());
        if mimicked {
            trace!("{} mimics '{}' from {}", self.id(), event, source_id);
            self.emit(event, data);
            return;
        }

        let envelope = Value::Map(HashMap::from([
            ("id".to_string(), Value::from(source_id)),
            ("type".to_string(), Value::from(link.type_tag.as_str())),
            ("event".to_string(), Value::from(event)),
            ("data".to_string(), data),
        ]));
        self.emit(
            notice_event_names(source_id, &link.type_tag, event),
            envelope,
        );
    }
}
