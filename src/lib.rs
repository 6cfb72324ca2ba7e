//! # Priority Emitter
//!
//! Priority-ordered event dispatch for in-process components.
//!
//! ## Layers
//!
//! ```text
//! EventEmitter ──▶ PriorityQueue (one per event) ──▶ ContentStore
//! ```
//!
//! - [`content_store`]: generic keyed store with advisory "using" marks
//! - [`priority_queue`]: stable priority buckets over one store
//! - [`event`]: listeners, call-count limits, sync/deferred dispatch and
//!   following between emitters
//!
//! ## Example
//!
//! ```rust,no_run
//! use priority_emitter::{EventEmitter, Listener, ListenerOptions, Value};
//!
//! let emitter = EventEmitter::new();
//! emitter.on(
//!     "saved",
//!     Listener::new(|emission| println!("saved: {:?}", emission.data)),
//!     ListenerOptions::new().priority(10),
//! );
//! emitter.emit("saved", Value::from("report.txt"));
//! ```

pub mod config;
pub mod content_store;
pub mod error;
pub mod event;
pub mod identity;
pub mod priority_queue;
pub mod value;

// Re-exports
pub use config::EmitterConfig;
pub use error::*;
pub use event::*;
pub use value::Value;
