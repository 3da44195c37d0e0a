//! GPU picking readback and drag geometry.
//!
//! The geometry pass writes a per-object selection index into an `R32Uint`
//! attachment. After submitting a frame the renderer copies the 1x1 texel
//! under the cursor (index plus depth) into one of two `MAP_READ` staging
//! buffers and maps it asynchronously; the other buffer, mapped during the
//! previous frame, is decoded. Pick results therefore lag the image by one
//! frame, which is invisible at interactive rates and never stalls the GPU.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::camera::Camera;
use crate::geometry::MoveMask;

/// Decoded contents of one readback: selection index (0 = no object) and
/// normalized depth under the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickInfo {
    pub index: u32,
    pub depth: f32,
}

impl PickInfo {
    pub const NONE: Self = Self {
        index: 0,
        depth: 0.0,
    };

    pub fn hit(&self) -> bool {
        self.index != 0
    }
}

/// A world-space ray through a screen point, built from two unprojections:
/// one at the near end of the reversed depth range, one effectively at
/// infinity.
#[derive(Debug, Clone, Copy)]
pub struct ViewRay {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl ViewRay {
    pub fn through(camera: &Camera, ndc: Vec2, world_scale_m: f32) -> Self {
        let near = camera.unproject(ndc, 1.0, world_scale_m);
        let far = camera.unproject(ndc, 1e-12, world_scale_m);
        Self {
            origin: near,
            direction: (far - near).normalize(),
        }
    }

    /// Intersection with the plane through `anchor` perpendicular to the ray.
    /// Dragging against this plane keeps the object at its picked distance
    /// from the camera.
    pub fn drag_plane_hit(&self, anchor: Vec3) -> Vec3 {
        let t = (anchor - self.origin).dot(self.direction);
        self.origin + t * self.direction
    }
}

/// Projects a drag target back onto the axes the object may move along.
pub fn masked_move(anchor: Vec3, target: Vec3, mask: MoveMask) -> Vec3 {
    anchor + mask.unit_vector() * (target - anchor)
}

/// Decodes the 8-byte readback payload: little-endian u32 index followed by
/// an f32 depth.
pub fn decode_pick(bytes: &[u8]) -> PickInfo {
    let index = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let depth = f32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    PickInfo { index, depth }
}

const PICK_BYTES: u64 = 8;

struct ReadbackSlot {
    buffer: wgpu::Buffer,
    ready: Arc<AtomicBool>,
    in_flight: bool,
}

impl ReadbackSlot {
    fn new(device: &wgpu::Device, label: &str) -> Self {
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: PICK_BYTES,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
            ready: Arc::new(AtomicBool::new(false)),
            in_flight: false,
        }
    }
}

/// Double-buffered cursor readback. One slot receives this frame's copy while
/// the other finishes mapping; the renderer must call `device.poll` once per
/// frame for the map callbacks to fire.
pub struct PickReadback {
    slots: [ReadbackSlot; 2],
    write: usize,
    latest: PickInfo,
}

impl PickReadback {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            slots: [
                ReadbackSlot::new(device, "pick readback 0"),
                ReadbackSlot::new(device, "pick readback 1"),
            ],
            write: 0,
            latest: PickInfo::NONE,
        }
    }

    /// Encodes the 1x1 copies of the selection and depth attachments at the
    /// given pixel into the current write slot. Skipped while that slot is
    /// still mapping from two frames ago.
    pub fn encode_copy(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        selection: &wgpu::Texture,
        depth: &wgpu::Texture,
        pixel: (u32, u32),
    ) {
        let slot = &self.slots[self.write];
        if slot.in_flight {
            return;
        }
        for (texture, offset) in [(selection, 0u64), (depth, 4u64)] {
            encoder.copy_texture_to_buffer(
                wgpu::ImageCopyTexture {
                    texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: pixel.0,
                        y: pixel.1,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::ImageCopyBuffer {
                    buffer: &slot.buffer,
                    layout: wgpu::ImageDataLayout {
                        offset,
                        bytes_per_row: None,
                        rows_per_image: None,
                    },
                },
                wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    /// Call after the frame's command buffer is submitted: starts mapping the
    /// slot just written and swaps the roles of the two buffers.
    pub fn after_submit(&mut self) {
        let slot = &mut self.slots[self.write];
        if !slot.in_flight {
            slot.in_flight = true;
            slot.ready.store(false, Ordering::Release);
            let ready = Arc::clone(&slot.ready);
            slot.buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    if result.is_ok() {
                        ready.store(true, Ordering::Release);
                    }
                });
        }
        self.write = 1 - self.write;
    }

    /// Decodes the read-side slot if its mapping completed, otherwise keeps
    /// returning the previous result.
    pub fn poll_latest(&mut self) -> PickInfo {
        let slot = &mut self.slots[self.write];
        if slot.in_flight && slot.ready.swap(false, Ordering::Acquire) {
            {
                let view = slot.buffer.slice(..).get_mapped_range();
                self.latest = decode_pick(&view);
            }
            slot.buffer.unmap();
            slot.in_flight = false;
        }
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Axis;
    use glam::Quat;

    #[test]
    fn decode_pick_splits_index_and_depth() {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&7u32.to_le_bytes());
        bytes[4..].copy_from_slice(&0.625f32.to_le_bytes());

        let info = decode_pick(&bytes);
        assert_eq!(info.index, 7);
        assert_eq!(info.depth, 0.625);
        assert!(info.hit());
        assert!(!PickInfo::NONE.hit());
    }

    #[test]
    fn centered_view_ray_points_down_negative_z() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 2.0));

        let ray = ViewRay::through(&camera, Vec2::ZERO, 1.0);
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-3);
        assert!((ray.origin.z - 2.0).abs() < 0.01);
    }

    #[test]
    fn drag_plane_hit_preserves_camera_distance() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 3.0));
        camera
            .properties()
            .set_orientation(Quat::from_rotation_y(0.2))
            .unwrap();

        let anchor = Vec3::new(0.3, -0.1, 0.5);
        let ray = ViewRay::through(&camera, Vec2::new(0.2, 0.1), 1.0);
        let hit = ray.drag_plane_hit(anchor);

        // The hit lies on the ray, on the plane through the anchor.
        assert!((hit - anchor).dot(ray.direction).abs() < 1e-4);
        let along = (hit - ray.origin).normalize();
        assert!((along - ray.direction).length() < 1e-4);
    }

    #[test]
    fn masked_move_constrains_the_drag() {
        let anchor = Vec3::new(1.0, 2.0, 3.0);
        let target = Vec3::new(5.0, -4.0, 9.0);

        assert_eq!(masked_move(anchor, target, MoveMask::ALL), target);
        assert_eq!(masked_move(anchor, target, MoveMask::NONE), anchor);
        assert_eq!(
            masked_move(anchor, target, MoveMask::axis(Axis::Z)),
            Vec3::new(1.0, 2.0, 9.0)
        );
    }

    #[test]
    fn drag_under_cursor_tracks_the_mouse() {
        // Dragging towards a screen point moves the anchor towards the point
        // the new ray passes through.
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 2.0));

        let anchor = Vec3::ZERO;
        let ray = ViewRay::through(&camera, Vec2::new(0.5, 0.0), 1.0);
        let moved = masked_move(anchor, ray.drag_plane_hit(anchor), MoveMask::ALL);
        assert!(moved.x > 0.1);
        assert!(moved.y.abs() < 1e-4);
    }
}
