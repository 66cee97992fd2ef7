//! Per-draw shader constants and the uniform ring they are uploaded into.
//!
//! `PerFrameConstants` must match the `PerFrame` block in `shader.wgsl`
//! field for field.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use wgpu::{BindGroup, BindGroupLayout, Buffer, BufferUsages, Device, Queue};

/// Viewer toggles read by the fragment stage.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UiConstants {
    pub lighting_only: u32,
    pub face_normals: u32,
    pub visualize_light_count: u32,
    pub visualize_per_sample_shading: u32,
    pub light_cull_technique: u32,
    pub _pad: [u32; 3],
}

#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PerFrameConstants {
    pub camera_world_view_proj: [[f32; 4]; 4],
    pub camera_world_view: [[f32; 4]; 4],
    pub camera_view_proj: [[f32; 4]; 4],
    pub camera_proj: [[f32; 4]; 4],
    pub camera_near_far: [f32; 4],
    pub framebuffer_dimensions_x: u32,
    pub framebuffer_dimensions_y: u32,
    pub framebuffer_dimensions_z: u32,
    pub framebuffer_dimensions_w: u32,
    pub ui: UiConstants,
}

/// The parts of a constants record that do not change between draws.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameParams {
    pub near_far: Vec4,
    pub framebuffer_dimensions: [u32; 4],
    pub ui: UiConstants,
}

impl FrameParams {
    pub fn new(near: f32, far: f32, width: u32, height: u32, ui: UiConstants) -> Self {
        Self {
            near_far: Vec4::new(near, far, 0.0, 0.0),
            framebuffer_dimensions: [width, height, 0, 0],
            ui,
        }
    }
}

impl PerFrameConstants {
    /// Builds a complete record for one draw. Every field is written so
    /// nothing from an earlier draw can leak through a discard-map.
    pub fn for_draw(
        world_view_proj: Mat4,
        world_view: Mat4,
        view_proj: Mat4,
        proj: Mat4,
        frame: &FrameParams,
    ) -> Self {
        let [x, y, z, w] = frame.framebuffer_dimensions;
        Self {
            camera_world_view_proj: world_view_proj.to_cols_array_2d(),
            camera_world_view: world_view.to_cols_array_2d(),
            camera_view_proj: view_proj.to_cols_array_2d(),
            camera_proj: proj.to_cols_array_2d(),
            camera_near_far: frame.near_far.to_array(),
            framebuffer_dimensions_x: x,
            framebuffer_dimensions_y: y,
            framebuffer_dimensions_z: z,
            framebuffer_dimensions_w: w,
            ui: frame.ui,
        }
    }

    pub fn world_view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.camera_world_view_proj)
    }

    pub fn world_view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.camera_world_view)
    }
}

pub const CONSTANTS_SIZE: u64 = std::mem::size_of::<PerFrameConstants>() as u64;

/// Distance between two slots, rounded up to the device's dynamic offset
/// alignment.
pub fn slot_stride(min_offset_alignment: u32) -> u64 {
    let align = u64::from(min_offset_alignment.max(1));
    CONSTANTS_SIZE.div_ceil(align) * align
}

/// Byte offset of `slot`, or `None` when it does not fit a dynamic offset.
pub fn slot_offset(stride: u64, slot: u32) -> Option<u32> {
    stride
        .checked_mul(u64::from(slot))
        .and_then(|offset| u32::try_from(offset).ok())
}

/// Hands out the slots of one pass in order. Never reuses a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotCursor {
    capacity: u32,
    next: u32,
}

impl SlotCursor {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, next: 0 }
    }

    /// `None` once every slot has been handed out.
    pub fn advance(&mut self) -> Option<u32> {
        if self.next >= self.capacity {
            return None;
        }
        let slot = self.next;
        self.next += 1;
        Some(slot)
    }

    pub fn used(&self) -> u32 {
        self.next
    }
}

/// A uniform buffer holding one constants slot per draw, bound with a
/// dynamic offset.
pub struct ConstantsRing {
    buffer: Buffer,
    bind_group: BindGroup,
    stride: u64,
    capacity: u32,
}

impl ConstantsRing {
    pub fn new(device: &Device, layout: &BindGroupLayout, capacity: u32) -> Self {
        let capacity = capacity.max(1);
        let stride = slot_stride(device.limits().min_uniform_buffer_offset_alignment);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("per_frame_constants"),
            size: stride * u64::from(capacity),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("per_frame_constants_bg"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(CONSTANTS_SIZE),
                }),
            }],
        });

        Self {
            buffer,
            bind_group,
            stride,
            capacity,
        }
    }

    /// Re-creates the buffer when it has fewer slots than `needed`. Must be
    /// called before a pass starts referencing the bind group.
    pub fn ensure_capacity(&mut self, device: &Device, layout: &BindGroupLayout, needed: usize) {
        let needed = u32::try_from(needed).unwrap_or(u32::MAX);
        if needed <= self.capacity {
            return;
        }
        let capacity = needed.checked_next_power_of_two().unwrap_or(needed);
        log::debug!(
            "growing constants ring from {} to {} slots",
            self.capacity,
            capacity
        );
        *self = Self::new(device, layout, capacity);
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn cursor(&self) -> SlotCursor {
        SlotCursor::new(self.capacity)
    }

    /// Dynamic offset of `slot`. `None` for slots outside the ring.
    pub fn offset(&self, slot: u32) -> Option<u32> {
        if slot >= self.capacity {
            return None;
        }
        slot_offset(self.stride, slot)
    }

    pub fn write(&self, queue: &Queue, slot: u32, constants: &PerFrameConstants) {
        if let Some(offset) = self.offset(slot) {
            queue.write_buffer(&self.buffer, u64::from(offset), bytemuck::bytes_of(constants));
        }
    }

    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn layout_matches_shader_block() {
        assert_eq!(size_of::<PerFrameConstants>(), 320);
        assert_eq!(align_of::<PerFrameConstants>(), 16);
        assert_eq!(size_of::<UiConstants>(), 32);

        assert_eq!(offset_of!(PerFrameConstants, camera_world_view_proj), 0);
        assert_eq!(offset_of!(PerFrameConstants, camera_world_view), 64);
        assert_eq!(offset_of!(PerFrameConstants, camera_view_proj), 128);
        assert_eq!(offset_of!(PerFrameConstants, camera_proj), 192);
        assert_eq!(offset_of!(PerFrameConstants, camera_near_far), 256);
        assert_eq!(offset_of!(PerFrameConstants, framebuffer_dimensions_x), 272);
        assert_eq!(offset_of!(PerFrameConstants, framebuffer_dimensions_w), 284);
        assert_eq!(offset_of!(PerFrameConstants, ui), 288);
    }

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(slot_stride(256), 512);
        assert_eq!(slot_stride(64), 320);
        assert_eq!(slot_stride(0), 320);
    }

    #[test]
    fn cursor_hands_out_each_slot_once() {
        let mut cursor = SlotCursor::new(3);
        assert_eq!(cursor.advance(), Some(0));
        assert_eq!(cursor.advance(), Some(1));
        assert_eq!(cursor.advance(), Some(2));
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.used(), 3);
    }

    #[test]
    fn empty_cursor_has_no_slots() {
        let mut cursor = SlotCursor::new(0);
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.used(), 0);
    }

    #[test]
    fn slot_offsets_step_by_stride() {
        let stride = slot_stride(256);
        assert_eq!(slot_offset(stride, 0), Some(0));
        assert_eq!(slot_offset(stride, 1), Some(512));
        assert_eq!(slot_offset(stride, 7), Some(3584));
    }

    #[test]
    fn slot_offset_past_u32_is_rejected() {
        let stride = slot_stride(256);
        assert_eq!(slot_offset(stride, u32::MAX), None);
        assert_eq!(slot_offset(u64::MAX, 2), None);
    }

    #[test]
    fn for_draw_fills_every_field() {
        let ui = UiConstants {
            lighting_only: 1,
            light_cull_technique: 3,
            ..Default::default()
        };
        let frame = FrameParams::new(0.1, 100.0, 1280, 720, ui);
        let t = Mat4::from_translation(glam::Vec3::X);
        let c = PerFrameConstants::for_draw(t, t * 2.0, Mat4::IDENTITY, Mat4::IDENTITY, &frame);

        assert_eq!(c.world_view_proj(), t);
        assert_eq!(c.world_view(), t * 2.0);
        assert_eq!(c.camera_near_far, [0.1, 100.0, 0.0, 0.0]);
        assert_eq!(c.framebuffer_dimensions_x, 1280);
        assert_eq!(c.framebuffer_dimensions_y, 720);
        assert_eq!(c.ui, ui);
    }
}
