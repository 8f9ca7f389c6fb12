/*!
 * Runtime Allocator Library
 * Memory allocation core for a multi-backend GPU/CPU compute runtime
 */

pub mod alloc;
pub mod backend;
pub mod core;
pub mod lease;

pub use crate::alloc::hierarchical::{HierarchicalConfig, HierarchicalSlotAllocator};
pub use crate::alloc::pool::{PoolConfig, SegregatedPool};
pub use crate::alloc::{BufferManager, MemoryBlock};
pub use crate::backend::{BufferView, HeapOps, HeapRegion, LaunchParams, Resource, ReuseToken};
pub use crate::core::{AllocError, AllocResult, BufferId};
pub use crate::lease::{Handle, Lease, PoolManager, PoolManagerConfig, SlotPool};
