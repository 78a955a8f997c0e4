pub mod engine;
pub mod filter;
pub mod local;
pub mod memory;
pub mod metadata;
pub mod object;
pub mod options;

pub use engine::*;
pub use filter::*;
pub use local::LocalBucket;
pub use memory::MemoryBucket;
pub use metadata::*;
pub use object::*;
pub use options::*;
