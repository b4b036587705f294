mod children;
pub mod conformance;
mod error;
mod memory;
mod traits;

pub use children::{ChildRef, RecordChildren};
pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage};
pub use traits::RcaStorage;
