//! Overlays drawn on top of the lit scene: the reference grid, the volume
//! bounding box and one-frame point markers.
//!
//! Line vertices are generated on the CPU whenever the volume extent or the
//! world scale changes, which is rare; the draw itself tests against the
//! scene depth without writing it, so overlays are occluded by geometry but
//! never occlude it. Point markers are debug aids and skip the depth test
//! entirely.

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayUniforms {
    pub view_proj: Mat4,  // 64 B
    pub color: [f32; 4],  // +16 -> 80
}

// Compile-time safety check: buffer size must match WGSL-reflected size.
const _: [(); 80] = [(); core::mem::size_of::<OverlayUniforms>()];

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct PointUniforms {
    view_proj: Mat4,        // 64 B
    screen_size: [f32; 2],  // +8
    radius_px: f32,         // +4
    _pad: f32,              // +4 -> 80
}

const _: [(); 80] = [(); core::mem::size_of::<PointUniforms>()];

/// One point marker: position in render units plus a color.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub color: [f32; 3],
    pub _pad1: f32,
}

impl PointVertex {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position: position.into(),
            _pad0: 0.0,
            color: color.into(),
            _pad1: 0.0,
        }
    }
}

/// Marker radius on screen.
const POINT_RADIUS_PX: f32 = 4.0;

/// Line list for a square grid in the xy plane: `2 * cells + 1` lines per
/// direction, spanning `[-half_extent, half_extent]`.
pub fn grid_lines(half_extent: f32, cells: u32) -> Vec<Vec3> {
    let n = cells as i32;
    let step = half_extent / cells.max(1) as f32;
    let mut lines = Vec::with_capacity(4 * (2 * cells as usize + 1));
    for i in -n..=n {
        let offset = i as f32 * step;
        // Parallel to x, then parallel to y.
        lines.push(Vec3::new(-half_extent, offset, 0.0));
        lines.push(Vec3::new(half_extent, offset, 0.0));
        lines.push(Vec3::new(offset, -half_extent, 0.0));
        lines.push(Vec3::new(offset, half_extent, 0.0));
    }
    lines
}

/// Line list for the 12 edges of the axis-aligned box with the given half
/// extent, centred on the origin.
pub fn box_lines(half: Vec3) -> Vec<Vec3> {
    let corner = |i: u32| {
        Vec3::new(
            if i & 1 == 0 { -half.x } else { half.x },
            if i & 2 == 0 { -half.y } else { half.y },
            if i & 4 == 0 { -half.z } else { half.z },
        )
    };
    let mut lines = Vec::with_capacity(24);
    for i in 0..8u32 {
        for bit in [1u32, 2, 4] {
            // Each edge once: from the corner with the bit clear.
            if i & bit == 0 {
                lines.push(corner(i));
                lines.push(corner(i | bit));
            }
        }
    }
    lines
}

/// One uploaded line set with its own color.
pub struct OverlayDraw {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertex_buffer: Option<wgpu::Buffer>,
    vertex_count: u32,
    pub color: Vec3,
}

impl OverlayDraw {
    fn new(device: &wgpu::Device, bgl: &wgpu::BindGroupLayout, label: &str, color: Vec3) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<OverlayUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        Self {
            uniform_buffer,
            bind_group,
            vertex_buffer: None,
            vertex_count: 0,
            color,
        }
    }

    pub fn upload_lines(&mut self, device: &wgpu::Device, lines: &[Vec3]) {
        let data: Vec<[f32; 3]> = lines.iter().map(|v| (*v).into()).collect();
        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Overlay Line VB"),
            contents: bytemuck::cast_slice(&data),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.vertex_count = lines.len() as u32;
    }
}

pub struct OverlayPipeline {
    pipeline: wgpu::RenderPipeline,
    pub grid: OverlayDraw,
    pub bbox: OverlayDraw,
    point_pipeline: wgpu::RenderPipeline,
    point_uniform_buffer: wgpu::Buffer,
    point_bind_group: wgpu::BindGroup,
    point_vertex_buffer: Option<wgpu::Buffer>,
    point_count: u32,
}

impl OverlayPipeline {
    pub fn new(
        device: &wgpu::Device,
        lit_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
    ) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Overlay BGL"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Overlay WGSL"),
            source: wgpu::ShaderSource::Wgsl(OVERLAY_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Overlay Pipeline Layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Overlay Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                    }],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: lit_fmt,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                // Occluded by geometry, never occluding it.
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::GreaterEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        // Point markers expand to screen-space quads per instance and are
        // drawn without a depth test.
        let point_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Point Marker Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_point",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<PointVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &[
                        wgpu::VertexAttribute {
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                        },
                        wgpu::VertexAttribute {
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 16,
                        },
                    ],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_point",
                targets: &[Some(wgpu::ColorTargetState {
                    format: lit_fmt,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let point_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Point Marker Uniform Buffer"),
            size: std::mem::size_of::<PointUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let point_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Point Marker Bind Group"),
            layout: &bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: point_uniform_buffer.as_entire_binding(),
            }],
        });

        let grid = OverlayDraw::new(device, &bgl, "Grid Overlay", Vec3::splat(0.4));
        let bbox = OverlayDraw::new(device, &bgl, "BBox Overlay", Vec3::new(1.0, 1.0, 1.0));

        Self {
            pipeline,
            grid,
            bbox,
            point_pipeline,
            point_uniform_buffer,
            point_bind_group,
            point_vertex_buffer: None,
            point_count: 0,
        }
    }

    /// Replaces the point marker set; pass an empty slice to clear it.
    pub fn upload_points(&mut self, device: &wgpu::Device, points: &[PointVertex]) {
        self.point_count = points.len() as u32;
        self.point_vertex_buffer = (!points.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Point Marker VB"),
                contents: bytemuck::cast_slice(points),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
    }

    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        queue: &wgpu::Queue,
        view_proj: Mat4,
        screen_size: [f32; 2],
        show_grid: bool,
        show_bbox: bool,
    ) {
        rpass.set_pipeline(&self.pipeline);
        for (draw, enabled) in [(&self.grid, show_grid), (&self.bbox, show_bbox)] {
            let Some(vb) = draw.vertex_buffer.as_ref().filter(|_| enabled) else {
                continue;
            };
            let uniforms = OverlayUniforms {
                view_proj,
                color: [draw.color.x, draw.color.y, draw.color.z, 1.0],
            };
            queue.write_buffer(&draw.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
            rpass.set_bind_group(0, &draw.bind_group, &[]);
            rpass.set_vertex_buffer(0, vb.slice(..));
            rpass.draw(0..draw.vertex_count, 0..1);
        }

        if let Some(vb) = self.point_vertex_buffer.as_ref().filter(|_| self.point_count > 0) {
            let uniforms = PointUniforms {
                view_proj,
                screen_size,
                radius_px: POINT_RADIUS_PX,
                _pad: 0.0,
            };
            queue.write_buffer(&self.point_uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
            rpass.set_pipeline(&self.point_pipeline);
            rpass.set_bind_group(0, &self.point_bind_group, &[]);
            rpass.set_vertex_buffer(0, vb.slice(..));
            rpass.draw(0..6, 0..self.point_count);
        }
    }
}

pub const OVERLAY_WGSL: &str = r#"
struct OverlayUniforms {
    view_proj: mat4x4<f32>,
    color: vec4<f32>,
};
@group(0) @binding(0) var<uniform> U: OverlayUniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return U.view_proj * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return U.color;
}

struct PointUniforms {
    view_proj: mat4x4<f32>,
    screen_size: vec2<f32>,
    radius_px: f32,
    _pad: f32,
};
// Aliases binding 0; no entry point uses both U and P.
@group(0) @binding(0) var<uniform> P: PointUniforms;

struct PointOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
};

// One screen-space quad per marker instance.
@vertex
fn vs_point(
    @builtin(vertex_index) vi: u32,
    @location(0) center: vec3<f32>,
    @location(1) color: vec3<f32>,
) -> PointOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0), vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0,  1.0), vec2<f32>(1.0, -1.0), vec2<f32>( 1.0, 1.0),
    );
    var out: PointOut;
    var clip = P.view_proj * vec4<f32>(center, 1.0);
    let offset = corners[vi] * P.radius_px / P.screen_size * 2.0 * clip.w;
    out.clip = vec4<f32>(clip.xy + offset, clip.zw);
    out.color = color;
    return out;
}

@fragment
fn fs_point(in: PointOut) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_line_count_matches_cells() {
        let lines = grid_lines(1.0, 4);
        // 9 lines per direction, 2 vertices each.
        assert_eq!(lines.len(), 9 * 2 * 2);
        // All vertices stay within the extent, in the xy plane.
        for v in &lines {
            assert!(v.x.abs() <= 1.0 + 1e-6 && v.y.abs() <= 1.0 + 1e-6);
            assert_eq!(v.z, 0.0);
        }
    }

    #[test]
    fn box_lines_cover_twelve_edges() {
        let half = Vec3::new(1.0, 2.0, 3.0);
        let lines = box_lines(half);
        assert_eq!(lines.len(), 24);

        // Every segment is axis-aligned with the full edge length.
        for pair in lines.chunks_exact(2) {
            let d = (pair[1] - pair[0]).abs();
            let lengths = [d.x, d.y, d.z];
            let nonzero: Vec<_> = lengths.iter().filter(|&&l| l > 0.0).collect();
            assert_eq!(nonzero.len(), 1);
        }
    }
}
