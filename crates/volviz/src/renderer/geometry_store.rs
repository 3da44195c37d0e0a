//! Render-thread side of the geometry registry: GPU buffers per live
//! instance, init/update draining and the per-kind model transforms.

use crossbeam_channel::Receiver;
use glam::{Mat4, Quat, Vec3};
use wgpu::util::DeviceExt;

use crate::geometry::{
    build_mesh_vertices, Axis, GeometryDescriptor, GeometryKind, MoveMask, PlaneDescriptor,
};
use crate::registry::{GeometryName, GeometryRegistry};
use crate::renderer::pipelines::scene::{ScenePipelines, SceneUniforms};

/// Specular exponent written to the G-buffer for every surface.
pub const SPECULAR_EXPONENT: f32 = 10.0;

/// Albedo multiplier for the object under the cursor.
pub const SELECTED_BOOST: f32 = 1.5;

/// Plane intercepts closer to zero than this (in render units) snap to the
/// origin plane.
const INTERCEPT_SNAP: f32 = 1e-6;

fn axis_unit(axis: Axis) -> Vec3 {
    match axis {
        Axis::X => Vec3::X,
        Axis::Y => Vec3::Y,
        Axis::Z => Vec3::Z,
    }
}

/// In-plane half extents for an axis-aligned plane spanning the given box.
fn plane_half_extents(axis: Axis, half: Vec3) -> (f32, f32) {
    match axis {
        Axis::X => (half.z, half.y),
        Axis::Y => (half.x, half.z),
        Axis::Z => (half.x, half.y),
    }
}

/// Model matrix for an axis-aligned plane. When a volume is active the plane
/// spans its cross-section; otherwise it gets a unit half extent. A
/// near-zero intercept snaps exactly onto the origin plane.
pub fn plane_model(
    desc: &PlaneDescriptor,
    volume_half_extent: Option<Vec3>,
    world_scale_m: f32,
) -> Mat4 {
    let mut intercept = desc.intercept_m / world_scale_m;
    if intercept.abs() < INTERCEPT_SNAP {
        intercept = 0.0;
    }
    let half = volume_half_extent.unwrap_or(Vec3::ONE);
    let (hx, hy) = plane_half_extents(desc.axis, half);

    Mat4::from_translation(axis_unit(desc.axis) * intercept)
        * Mat4::from_quat(Quat::from_rotation_arc(Vec3::Z, axis_unit(desc.axis)))
        * Mat4::from_scale(Vec3::new(hx, hy, 1.0))
}

/// Model matrix for any descriptor kind.
pub fn descriptor_model(
    desc: &GeometryDescriptor,
    volume_half_extent: Option<Vec3>,
    world_scale_m: f32,
) -> Mat4 {
    match desc {
        GeometryDescriptor::Plane(p) => plane_model(p, volume_half_extent, world_scale_m),
        GeometryDescriptor::Cube(c) => {
            Mat4::from_translation(c.position)
                * Mat4::from_scale(Vec3::splat(c.radius * c.scale_m / world_scale_m))
        }
        GeometryDescriptor::Mesh(m) => {
            Mat4::from_translation(m.position)
                * Mat4::from_scale(Vec3::splat(m.scale_m / world_scale_m))
        }
    }
}

/// Grab anchor for dragging, in render units.
pub fn descriptor_anchor(desc: &GeometryDescriptor, world_scale_m: f32) -> Vec3 {
    match desc {
        GeometryDescriptor::Plane(p) => axis_unit(p.axis) * (p.intercept_m / world_scale_m),
        GeometryDescriptor::Cube(c) => c.position,
        GeometryDescriptor::Mesh(m) => m.position,
    }
}

pub fn descriptor_move_mask(desc: &GeometryDescriptor) -> MoveMask {
    match desc {
        GeometryDescriptor::Plane(p) => {
            if p.movable {
                MoveMask::axis(p.axis)
            } else {
                MoveMask::NONE
            }
        }
        GeometryDescriptor::Cube(c) => c.move_mask,
        GeometryDescriptor::Mesh(m) => m.move_mask,
    }
}

/// Writes a drag position back into the descriptor. Planes keep only the
/// component along their axis, converted back to a metric intercept.
pub fn apply_drag_to_descriptor(
    desc: &mut GeometryDescriptor,
    position: Vec3,
    world_scale_m: f32,
) {
    match desc {
        GeometryDescriptor::Plane(p) => {
            p.intercept_m = position[p.axis.index()] * world_scale_m;
        }
        GeometryDescriptor::Cube(c) => c.position = position,
        GeometryDescriptor::Mesh(m) => m.position = position,
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn build(device: &wgpu::Device, vertices: &[Vec3], indices: &[[u32; 3]]) -> Self {
        let built = build_mesh_vertices(vertices, indices);
        let flat: Vec<u32> = indices.iter().flatten().copied().collect();
        Self {
            vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh VB"),
                contents: bytemuck::cast_slice(&built),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh IB"),
                contents: bytemuck::cast_slice(&flat),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: flat.len() as u32,
        }
    }
}

struct Instance {
    name: GeometryName,
    descriptor: GeometryDescriptor,
    updates: Receiver<GeometryDescriptor>,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    mesh: Option<GpuMesh>,
    selection_index: u32,
}

/// All live geometry instances, in selection-index order.
#[derive(Default)]
pub struct GeometryStore {
    instances: Vec<Instance>,
}

impl GeometryStore {
    /// Drains at most one queued init entry and commits it. Spreading inits
    /// over frames keeps a burst of registrations from stalling rendering.
    pub fn drain_one_init(
        &mut self,
        registry: &GeometryRegistry,
        device: &wgpu::Device,
        instance_bgl: &wgpu::BindGroupLayout,
    ) {
        let Some((name, descriptor)) = registry.pop_init() else {
            return;
        };

        let mesh = match &descriptor {
            GeometryDescriptor::Mesh(m) => Some(GpuMesh::build(device, &m.vertices, &m.indices)),
            _ => None,
        };

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Uniform Buffer"),
            size: std::mem::size_of::<SceneUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Instance Bind Group"),
            layout: instance_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let updates = registry.commit_live(name.clone(), descriptor.kind());
        let selection_index = self.instances.len() as u32 + 1;
        log::info!("initialized geometry '{name}' (slot {selection_index})");

        self.instances.push(Instance {
            name,
            descriptor,
            updates,
            uniform_buffer,
            bind_group,
            mesh,
            selection_index,
        });
    }

    /// Applies at most one pending update per instance, so a fast producer
    /// cannot monopolize the frame.
    pub fn apply_updates(&mut self, device: &wgpu::Device) {
        for instance in &mut self.instances {
            let Ok(descriptor) = instance.updates.try_recv() else {
                continue;
            };
            if let GeometryDescriptor::Mesh(m) = &descriptor {
                instance.mesh = Some(GpuMesh::build(device, &m.vertices, &m.indices));
            }
            log::debug!("updated geometry '{}'", instance.name);
            instance.descriptor = descriptor;
        }
    }

    /// Moves the dragged instance; the new position comes from the
    /// interaction layer in render units.
    pub fn apply_drag(&mut self, index: u32, position: Vec3, world_scale_m: f32) {
        if let Some(instance) = self
            .instances
            .iter_mut()
            .find(|i| i.selection_index == index)
        {
            apply_drag_to_descriptor(&mut instance.descriptor, position, world_scale_m);
        }
    }

    /// Anchor and move mask of a picked instance, for starting a drag.
    pub fn pick_target(&self, index: u32, world_scale_m: f32) -> Option<(Vec3, MoveMask)> {
        self.instances
            .iter()
            .find(|i| i.selection_index == index)
            .map(|i| {
                (
                    descriptor_anchor(&i.descriptor, world_scale_m),
                    descriptor_move_mask(&i.descriptor),
                )
            })
    }

    /// Recomputes and uploads every instance's uniforms for this frame.
    /// `volume` carries the active volume's half extent, texture transform
    /// and sample mode, if any.
    pub fn write_uniforms(
        &self,
        queue: &wgpu::Queue,
        view_proj: Mat4,
        volume: Option<(Vec3, Mat4, u32)>,
        world_scale_m: f32,
        selected: u32,
    ) {
        for instance in &self.instances {
            let half_extent = volume.map(|(h, _, _)| h);
            let model = descriptor_model(&instance.descriptor, half_extent, world_scale_m);

            let mut color = match &instance.descriptor {
                GeometryDescriptor::Plane(p) => p.color,
                GeometryDescriptor::Cube(c) => c.color,
                GeometryDescriptor::Mesh(m) => m.color,
            };
            if instance.selection_index == selected {
                color *= SELECTED_BOOST;
            }

            // Only planes slice the volume; cubes and meshes are flat.
            let (tex_transform, volume_mode) = match (&instance.descriptor, volume) {
                (GeometryDescriptor::Plane(_), Some((_, transform, mode))) => (transform, mode),
                _ => (Mat4::IDENTITY, 0),
            };

            let uniforms = SceneUniforms {
                view_proj,
                model,
                tex_transform,
                color_shininess: [color.x, color.y, color.z, SPECULAR_EXPONENT],
                selection_index: instance.selection_index,
                volume_mode,
                _pad: [0; 2],
            };
            queue.write_buffer(&instance.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        }
    }

    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        pipelines: &'a ScenePipelines,
        volume_bind_group: &'a wgpu::BindGroup,
    ) {
        rpass.set_bind_group(1, volume_bind_group, &[]);
        for instance in &self.instances {
            rpass.set_bind_group(0, &instance.bind_group, &[]);
            match instance.descriptor.kind() {
                GeometryKind::Plane => {
                    rpass.set_pipeline(&pipelines.plane);
                    rpass.draw(0..4, 0..1);
                }
                GeometryKind::Cube => {
                    rpass.set_pipeline(&pipelines.cube);
                    rpass.draw(0..36, 0..1);
                }
                GeometryKind::Mesh => {
                    let Some(mesh) = &instance.mesh else {
                        continue;
                    };
                    rpass.set_pipeline(&pipelines.mesh);
                    rpass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    rpass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CubeDescriptor;

    #[test]
    fn plane_spans_the_volume_cross_section() {
        let desc = PlaneDescriptor {
            axis: Axis::Y,
            intercept_m: 0.5,
            ..Default::default()
        };
        let half = Vec3::new(2.0, 3.0, 4.0);
        let model = plane_model(&desc, Some(half), 1.0);

        // Local quad corners land on the volume's xz cross-section at y=0.5.
        let a = model.transform_point3(Vec3::new(-1.0, -1.0, 0.0));
        let b = model.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!((a.y - 0.5).abs() < 1e-5 && (b.y - 0.5).abs() < 1e-5);
        assert!((a.x.abs() - 2.0).abs() < 1e-5);
        assert!((a.z.abs() - 4.0).abs() < 1e-5);
        assert!((b.x.abs() - 2.0).abs() < 1e-5);
        assert!((b.z.abs() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn near_zero_intercept_snaps_to_origin() {
        let desc = PlaneDescriptor {
            axis: Axis::Z,
            intercept_m: 1e-10,
            ..Default::default()
        };
        let model = plane_model(&desc, None, 1e-3);
        let center = model.transform_point3(Vec3::ZERO);
        assert_eq!(center.z, 0.0);
    }

    #[test]
    fn plane_normal_follows_its_axis() {
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let desc = PlaneDescriptor {
                axis,
                ..Default::default()
            };
            let model = plane_model(&desc, None, 1.0);
            let normal = model.transform_vector3(Vec3::Z).normalize();
            assert!((normal.dot(axis_unit(axis)).abs() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn cube_model_scales_with_world_scale() {
        let desc = GeometryDescriptor::Cube(CubeDescriptor {
            position: Vec3::new(1.0, 0.0, 0.0),
            radius: 2.0,
            scale_m: 0.5,
            ..Default::default()
        });
        let model = descriptor_model(&desc, None, 0.25);
        let corner = model.transform_point3(Vec3::ONE);
        // radius * scale_m / world_scale = 4 render units, offset by position.
        assert!((corner - Vec3::new(5.0, 4.0, 4.0)).length() < 1e-5);
    }

    #[test]
    fn plane_drag_round_trips_through_the_intercept() {
        let mut desc = GeometryDescriptor::Plane(PlaneDescriptor {
            axis: Axis::X,
            intercept_m: 0.0,
            ..Default::default()
        });
        let scale = 2e-3;

        apply_drag_to_descriptor(&mut desc, Vec3::new(3.0, 9.0, 9.0), scale);
        let GeometryDescriptor::Plane(p) = &desc else {
            unreachable!()
        };
        // Off-axis components are discarded.
        assert!((p.intercept_m - 6e-3).abs() < 1e-9);
        assert_eq!(descriptor_anchor(&desc, scale), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn immovable_plane_reports_an_empty_mask() {
        let desc = GeometryDescriptor::Plane(PlaneDescriptor {
            movable: false,
            ..Default::default()
        });
        assert_eq!(descriptor_move_mask(&desc), MoveMask::NONE);

        let desc = GeometryDescriptor::Plane(PlaneDescriptor::default());
        assert_eq!(descriptor_move_mask(&desc), MoveMask::axis(Axis::X));
    }
}
