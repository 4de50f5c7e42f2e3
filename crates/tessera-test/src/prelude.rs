//! Common imports for tests.
//!
//! ```
//! use tessera_test::prelude::*;
//! ```

pub use crate::{
    ActivatorCalls, RecordingActivator, RecordingInstaller, RecordingListener, TestHost,
    init_test_logging, service_module, service_requirement,
};
