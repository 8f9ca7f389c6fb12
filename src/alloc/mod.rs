/*!
 * Allocator Core
 *
 * Hierarchical slot allocation, chunk locators, and the segregated pool.
 */

pub mod chunk;
pub mod hierarchical;
pub mod manager;
pub mod pool;
pub mod types;

pub use chunk::{ChunkLocator, DirectChunkLocator, HierarchicalChunkLocator};
pub use hierarchical::{HierarchicalConfig, HierarchicalSlotAllocator};
pub use manager::{BlockSource, BufferLease, BufferManager, BufferPayload, BufferRequest, BufferTraits};
pub use pool::{PoolConfig, PoolStats, SegregatedPool};
pub use types::MemoryBlock;
