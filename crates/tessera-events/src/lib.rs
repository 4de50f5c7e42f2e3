//! Tessera Events - module lifecycle events and their delivery.
//!
//! This crate provides:
//! - `ModuleEvent`, the record of one lifecycle transition
//! - The `ModuleListener` trait and a registry of listeners
//! - `EventDispatcher`, which delivers events in two tiers
//!
//! # Delivery tiers
//!
//! 1. **Synchronous listeners** run on the firing task before `fire`
//!    returns. The runtime uses this tier for its own bookkeeping.
//!
//! 2. **Asynchronous listeners** run on a single delivery worker, in the
//!    order events were fired. A slow listener delays other asynchronous
//!    listeners but never the module that fired the event.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_events::prelude::*;
//! use tessera_resource::{Resource, Version};
//!
//! # async fn example() {
//! let dispatcher = EventDispatcher::new();
//! dispatcher.add_listener(
//!     Arc::new(FnListener::new("log", |event: &ModuleEvent| println!("{event}"))),
//!     ListenerTier::Asynchronous,
//! );
//!
//! let resource = Resource::builder()
//!     .identity("alpha", Version::new(1, 0, 0))
//!     .build()
//!     .unwrap();
//! dispatcher.fire(ModuleEvent::new(
//!     "runtime",
//!     ModuleEventKind::Installed,
//!     ModuleId(1),
//!     Arc::new(resource),
//! ));
//! dispatcher.flush().await;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod dispatcher;
mod event;
mod listener;

pub use dispatcher::{DEFAULT_QUEUE_WARN_DEPTH, EventDispatcher};
pub use event::{EventMetadata, ModuleEvent, ModuleEventKind, ModuleId};
pub use listener::{
    EventFilter, FnListener, ListenerId, ListenerRegistry, ListenerTier, ModuleListener,
};
