/*!
 * CPU Backend
 * Reference HeapOps/Resource implementations over POSIX memory primitives
 */

use super::traits::{HeapOps, Resource};
use super::types::{BufferView, HeapRegion, ReuseToken};
use crate::core::{AllocError, AllocResult, Size};
use nix::sys::mman::{mmap_anonymous, mprotect, munmap, MapFlags, ProtFlags};
use std::alloc::Layout;
use std::num::NonZeroUsize;
use std::os::raw::c_void;
use std::ptr::NonNull;

/// Minimum alignment applied when callers pass 0
const DEFAULT_ALIGNMENT: Size = 16;

#[inline]
fn effective_alignment(alignment: Size) -> Size {
    if alignment == 0 {
        DEFAULT_ALIGNMENT
    } else {
        alignment.next_power_of_two()
    }
}

/// Virtual-address operations backed by mmap.
///
/// `reserve` maps an anonymous PROT_NONE range (address space only), `map`
/// upgrades it to read/write, `unmap` returns it to the system. This mirrors
/// how device backends split reservation from page binding.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuHeapOps;

impl CpuHeapOps {
    pub fn new() -> Self {
        Self
    }
}

impl HeapOps for CpuHeapOps {
    fn reserve(&self, size: Size) -> AllocResult<HeapRegion> {
        let Some(len) = NonZeroUsize::new(size) else {
            return Ok(HeapRegion::empty());
        };
        let ptr = unsafe {
            mmap_anonymous(None, len, ProtFlags::PROT_NONE, MapFlags::MAP_PRIVATE)
        }
        .map_err(|e| AllocError::OutOfMemory(format!("cpu heap ops: reserve({size}): {e}")))?;
        Ok(HeapRegion::new(ptr.as_ptr() as usize, size))
    }

    fn map(&self, region: HeapRegion) -> AllocResult<BufferView> {
        if region.is_empty() {
            return Ok(BufferView::empty());
        }
        let ptr = NonNull::new(region.addr as *mut c_void).ok_or_else(|| {
            AllocError::NullPointer("cpu heap ops: map of null region".into())
        })?;
        unsafe { mprotect(ptr, region.size, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE) }
            .map_err(|e| {
                AllocError::OperationFailed(format!(
                    "cpu heap ops: map({:#x}, {}): {e}",
                    region.addr, region.size
                ))
            })?;
        Ok(BufferView::new(region.addr, 0, region.size))
    }

    fn unmap(&self, view: BufferView, size: Size) -> AllocResult<()> {
        if view.is_null() || size == 0 {
            return Ok(());
        }
        let ptr = NonNull::new(view.chunk_base() as *mut c_void).ok_or_else(|| {
            AllocError::NullPointer("cpu heap ops: unmap of null view".into())
        })?;
        unsafe { munmap(ptr, size) }.map_err(|e| {
            AllocError::OperationFailed(format!(
                "cpu heap ops: unmap({:#x}, {size}): {e}",
                view.addr
            ))
        })
    }
}

/// Raw aligned heap allocations; synchronous backend.
///
/// The CPU executes work inline, so every completion query answers true and
/// deferred reuse degenerates to immediate reuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuResource;

impl CpuResource {
    pub fn new() -> Self {
        Self
    }
}

impl Resource for CpuResource {
    fn allocate(&self, size: Size, alignment: Size) -> AllocResult<BufferView> {
        if size == 0 {
            return Ok(BufferView::empty());
        }
        let align = effective_alignment(alignment);
        let layout = Layout::from_size_align(size, align).map_err(|e| {
            AllocError::InvalidArgument(format!("cpu resource: allocate({size}, {align}): {e}"))
        })?;
        // SAFETY: layout has non-zero size, checked above.
        let base = unsafe { std::alloc::alloc(layout) };
        if base.is_null() {
            return Err(AllocError::OutOfMemory(format!(
                "cpu resource: allocate({size}, {align})"
            )));
        }
        Ok(BufferView::new(base as usize, 0, size))
    }

    fn deallocate(&self, view: BufferView, size: Size, alignment: Size) {
        if view.is_null() || view.is_empty() {
            return;
        }
        let align = effective_alignment(alignment);
        let Ok(layout) = Layout::from_size_align(size, align) else {
            log::error!(
                "cpu resource: deallocate with unrepresentable layout ({size}, {align})"
            );
            return;
        };
        // SAFETY: views handed out by allocate carry offset 0 from the raw base;
        // sub-views reconstruct it via chunk_base.
        unsafe { std::alloc::dealloc(view.chunk_base() as *mut u8, layout) };
    }

    fn is_completed(&self, _token: &ReuseToken) -> bool {
        true
    }
}
