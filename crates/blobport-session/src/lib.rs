//! Serving adapter over the blobport engine.
//!
//! A [`BlobSession`] owns one [`blobport_engine::Net`], binds caller-facing
//! names to its blobs, grows the batch capacity on demand and translates
//! named [`blobport_core::Tensor`]s to and from engine buffers.

pub mod bindings;
pub mod capacity;
pub mod device;
pub mod session;

pub use bindings::BindingTable;
pub use capacity::{estimate_capacity, CapacityManager};
pub use device::{current_device, init_execution_mode, select_device, DeviceProbe, EngineProbe};
pub use session::BlobSession;
