//! Reference fixed-topology inference engine.
//!
//! A [`Net`] owns an ordered list of named [`Blob`]s. Some are declared as
//! inputs, and those never consumed by a later layer are outputs. Input blob
//! shapes may be changed in place, followed by [`Net::reshape`] to propagate
//! the change to every downstream blob.

pub mod blob;
pub mod error;
pub mod layer;
pub mod mode;
pub mod net;
pub mod proto;

pub use blob::Blob;
pub use error::{EngineError, Result};
pub use layer::Layer;
pub use mode::Mode;
pub use net::{CopyReport, Net};
pub use proto::{
    read_net_from_binary_file, write_net_to_binary_file, BlobProto, BlobShape, InputParameter,
    InnerProductParameter, LayerKind, LayerParameter, NetParameter,
};
