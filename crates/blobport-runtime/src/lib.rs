//! Batching and serialization layer around [`blobport_core::ServingSession`]s.
//!
//! Requests flow batcher -> scheduler -> worker. Each worker exclusively owns
//! one session, which gives the at-most-one-call-in-flight guarantee sessions
//! rely on.

pub mod batcher;
pub mod pipeline;
pub mod request;
pub mod scheduler;
pub mod worker;

pub use batcher::*;
pub use pipeline::*;
pub use request::*;
pub use scheduler::*;
pub use worker::*;
