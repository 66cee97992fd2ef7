use crate::constants::{ConstantsRing, PerFrameConstants, SlotCursor};
use crate::mesh::ConstantsContext;
use wgpu::{Queue, RenderPass};

/// Device context handed to meshes while the scene pass is recorded.
///
/// Queue writes are applied before the pass executes, so every draw gets
/// its own slot of the ring. Mapping advances to a fresh slot and
/// unmapping uploads it. Once the ring is used up, further draws are
/// dropped rather than sharing a slot.
pub struct WgpuFrameContext<'a, 'p> {
    queue: &'a Queue,
    ring: &'a ConstantsRing,
    pass: &'a mut RenderPass<'p>,
    staging: PerFrameConstants,
    cursor: SlotCursor,
    current_slot: Option<u32>,
    dropped: u32,
}

impl<'a, 'p> WgpuFrameContext<'a, 'p> {
    pub fn new(queue: &'a Queue, ring: &'a ConstantsRing, pass: &'a mut RenderPass<'p>) -> Self {
        Self {
            queue,
            ring,
            pass,
            staging: PerFrameConstants::default(),
            cursor: ring.cursor(),
            current_slot: None,
            dropped: 0,
        }
    }

    pub fn pass(&mut self) -> &mut RenderPass<'p> {
        &mut *self.pass
    }

    /// Binds the slot written by the last map/unmap at `group`. Returns
    /// false when that map got no slot, in which case nothing may be drawn.
    pub fn bind_constants(&mut self, group: u32) -> bool {
        let Some(offset) = self.current_slot.and_then(|slot| self.ring.offset(slot)) else {
            return false;
        };
        self.pass.set_bind_group(group, self.ring.bind_group(), &[offset]);
        true
    }

    pub fn draws_recorded(&self) -> u32 {
        self.cursor.used()
    }

    pub fn draws_dropped(&self) -> u32 {
        self.dropped
    }
}

impl ConstantsContext for WgpuFrameContext<'_, '_> {
    fn map_constants(&mut self) -> &mut PerFrameConstants {
        self.current_slot = self.cursor.advance();
        if self.current_slot.is_none() {
            if self.dropped == 0 {
                log::warn!(
                    "constants ring exhausted at {} slots, dropping further draws",
                    self.ring.capacity()
                );
            }
            self.dropped += 1;
        }
        self.staging = PerFrameConstants::default();
        &mut self.staging
    }

    fn unmap_constants(&mut self) {
        if let Some(slot) = self.current_slot {
            self.ring.write(self.queue, slot, &self.staging);
        }
    }
}
