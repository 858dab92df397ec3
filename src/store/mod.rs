//! Persistence layer for models and time-indexed data points.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use traits::{DataPoint, Storage};
