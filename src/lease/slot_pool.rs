/*!
 * Slot Pool
 * Control-block-backed payload pool with generation tracking
 */

use super::block_vec::BlockVec;
use super::control::ControlBlock;
use super::handle::Handle;
use crate::core::{AllocError, AllocResult};
use log::warn;

/// Compile-time description of one pooled resource kind.
///
/// The control-block type selects the lifetime discipline; `create` and
/// `destroy` are the payload hooks run on first acquire and last release.
pub trait PoolTraits: Sized {
    type Payload: Default + Clone;
    type Control: ControlBlock;
    type Request;

    /// Component name used in error messages and logs
    const NAME: &'static str;

    /// Populate a fresh payload. A failure returns the slot to the free list
    /// and surfaces from the acquiring call.
    fn create(&self, payload: &mut Self::Payload, request: &Self::Request) -> AllocResult<()>;

    /// Tear the payload down on last release. Must not fail; backend errors
    /// are logged by the implementation.
    fn destroy(&self, payload: &mut Self::Payload);
}

struct Slot<P: PoolTraits> {
    control: P::Control,
    generation: u16,
    payload: P::Payload,
}

impl<P: PoolTraits> Default for Slot<P> {
    fn default() -> Self {
        Self {
            control: P::Control::default(),
            generation: 0,
            payload: P::Payload::default(),
        }
    }
}

/// Segmented pool of `(control block, generation, payload)` slots with a
/// LIFO free-index list. Mutation is serialized by the owning manager.
pub struct SlotPool<P: PoolTraits> {
    slots: BlockVec<Slot<P>>,
    free: Vec<u32>,
}

impl<P: PoolTraits> SlotPool<P> {
    pub fn new(block_size: usize) -> Self {
        Self {
            slots: BlockVec::new(block_size),
            free: Vec::new(),
        }
    }

    /// Provision free slots until at least `capacity` exist in total
    pub fn ensure_capacity(&mut self, capacity: usize) {
        while self.slots.len() < capacity {
            let index = self.slots.push_default();
            self.free.push(index as u32);
        }
    }

    /// Slots currently provisioned
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots holding a live payload
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.control.is_alive()).count()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Acquire a slot, run the create hook, and take the first reference.
    ///
    /// `growth_chunk` slots are provisioned when the free list is empty.
    pub fn acquire(
        &mut self,
        traits: &P,
        request: &P::Request,
        growth_chunk: usize,
    ) -> AllocResult<Handle<P>> {
        if self.free.is_empty() {
            self.ensure_capacity(self.slots.len() + growth_chunk.max(1));
        }
        let index = self.free.pop().ok_or_else(|| {
            AllocError::OutOfMemory(format!("{}: slot pool exhausted", P::NAME))
        })?;

        let slot = &mut self.slots[index as usize];
        if let Err(err) = traits.create(&mut slot.payload, request) {
            self.free.push(index);
            return Err(err);
        }
        if !slot.control.acquire() {
            // A free-listed slot can never be held; treat as corruption.
            traits.destroy(&mut slot.payload);
            self.free.push(index);
            return Err(AllocError::InvalidState(format!(
                "{}: free slot already acquired",
                P::NAME
            )));
        }
        Ok(Handle::new(index, slot.generation))
    }

    /// Take an additional reference on a live slot
    pub fn retain(&mut self, handle: Handle<P>) -> AllocResult<()> {
        let slot = self.checked_slot_mut(handle)?;
        if !slot.control.acquire() {
            return Err(AllocError::InvalidState(format!(
                "{}: slot refuses additional references",
                P::NAME
            )));
        }
        Ok(())
    }

    /// Drop one reference; on the last one the payload is destroyed, the
    /// generation bumped, and the slot returned to the free list.
    ///
    /// Returns `true` iff the slot was destroyed.
    pub fn release(&mut self, traits: &P, handle: Handle<P>) -> AllocResult<bool> {
        let index = handle.index() as usize;
        let slot = self.checked_slot_mut(handle)?;
        if !slot.control.release() {
            return Ok(false);
        }
        traits.destroy(&mut slot.payload);
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index as u32);
        Ok(true)
    }

    /// Clone the payload behind a live handle
    pub fn payload(&self, handle: Handle<P>) -> AllocResult<P::Payload> {
        let slot = self.checked_slot(handle)?;
        if !slot.control.is_alive() {
            return Err(AllocError::InvalidState(format!(
                "{}: payload of released slot",
                P::NAME
            )));
        }
        Ok(slot.payload.clone())
    }

    /// Borrow the control block behind a live handle
    pub fn control(&self, handle: Handle<P>) -> AllocResult<&P::Control> {
        Ok(&self.checked_slot(handle)?.control)
    }

    /// Force-release every live slot. Used by shutdown; never fails.
    ///
    /// Outstanding handles become stale through the generation bump.
    pub fn destroy_all(&mut self, traits: &P) -> usize {
        const MAX_DRAIN: usize = u16::MAX as usize;

        let mut destroyed = 0;
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if !slot.control.is_alive() {
                continue;
            }
            // Drain whatever references remain; leaked leases are tolerated.
            // Raw control blocks never drain and are left to their external
            // owner.
            let mut drained = false;
            for _ in 0..MAX_DRAIN {
                if slot.control.release() {
                    drained = true;
                    break;
                }
                if !slot.control.is_alive() {
                    break;
                }
            }
            if !drained {
                continue;
            }
            traits.destroy(&mut slot.payload);
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            destroyed += 1;
        }
        if destroyed > 0 {
            warn!("{}: destroyed {destroyed} outstanding slots on shutdown", P::NAME);
        }
        destroyed
    }

    fn checked_slot(&self, handle: Handle<P>) -> AllocResult<&Slot<P>> {
        if !handle.is_valid() {
            return Err(AllocError::InvalidArgument(format!(
                "{}: invalid handle",
                P::NAME
            )));
        }
        let slot = self.slots.get(handle.index() as usize).ok_or_else(|| {
            AllocError::OutOfRange(format!(
                "{}: handle index {} out of range",
                P::NAME,
                handle.index()
            ))
        })?;
        if slot.generation != handle.generation() {
            return Err(AllocError::stale_handle(P::NAME));
        }
        Ok(slot)
    }

    fn checked_slot_mut(&mut self, handle: Handle<P>) -> AllocResult<&mut Slot<P>> {
        if !handle.is_valid() {
            return Err(AllocError::InvalidArgument(format!(
                "{}: invalid handle",
                P::NAME
            )));
        }
        let index = handle.index() as usize;
        if index >= self.slots.len() {
            return Err(AllocError::OutOfRange(format!(
                "{}: handle index {index} out of range",
                P::NAME
            )));
        }
        if self.slots[index].generation != handle.generation() {
            return Err(AllocError::stale_handle(P::NAME));
        }
        Ok(&mut self.slots[index])
    }
}
