pub mod error;
pub mod options;
pub mod session;
pub mod spec;
pub mod tensor;

pub use error::*;
pub use options::*;
pub use session::*;
pub use spec::*;
pub use tensor::*;
