//! Common imports for working with module events.
//!
//! ```
//! use tessera_events::prelude::*;
//! ```

pub use crate::{
    EventDispatcher, FnListener, ListenerId, ListenerTier, ModuleEvent, ModuleEventKind,
    ModuleId, ModuleListener,
};
