//! # psmon
//!
//! Live message monitoring for a pub/sub messaging service: tail pull subscriptions or whole
//! topics into bounded in-memory buffers and forward every message to a presentation layer.

#![deny(missing_docs)]

pub use psmon_core::*;

#[cfg(feature = "in-memory")]
/// In-memory messaging backend and recording event sink.
pub mod mem {
    //! Contains the in-memory backend for the `psmon` crate.
    pub use psmon_mem::*;
}

pub mod prelude {
    //! The prelude module for the `psmon` crate.
    pub use psmon_core::prelude::*;

    #[cfg(feature = "in-memory")]
    pub use super::mem::*;
}
