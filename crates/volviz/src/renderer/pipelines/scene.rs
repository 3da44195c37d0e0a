//! Geometry pass: rasterizes planes, cubes and meshes into the G-buffer.
//!
//! Planes and cubes carry no vertex buffers at all; their handful of
//! vertices is synthesized in the vertex shader from `vertex_index` and the
//! per-instance model matrix. Only meshes bind real vertex and index
//! buffers. All three variants share one shader module and one fragment
//! stage writing normal+specular, albedo and the selection index.

use glam::Mat4;

/// Per-instance uniforms, shared by all three geometry variants.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniforms {
    /// Camera transform, render units to clip space.
    pub view_proj: Mat4, // 64 B
    /// Object transform, local to render units.
    pub model: Mat4, // +64 -> 128
    /// Render units to volume texture coordinates.
    pub tex_transform: Mat4, // +64 -> 192
    /// Base color in rgb, specular exponent in w.
    pub color_shininess: [f32; 4], // +16 -> 208
    /// Pick index written to the selection target; never 0 for real objects.
    pub selection_index: u32, // +4
    /// 0 = flat color, 1 = grayscale volume, 2 = rgb volume.
    pub volume_mode: u32, // +4
    pub _pad: [u32; 2], // +8 -> 224
}

// Compile-time safety check: buffer size must match WGSL-reflected size.
const _: [(); 224] = [(); core::mem::size_of::<SceneUniforms>()];

/// Stride and attribute layout of [`crate::geometry::MeshVertex`].
const MESH_VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: 32,
    step_mode: wgpu::VertexStepMode::Vertex,
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
};

pub struct ScenePipelines {
    pub plane: wgpu::RenderPipeline,
    pub cube: wgpu::RenderPipeline,
    pub mesh: wgpu::RenderPipeline,
    pub instance_bgl: wgpu::BindGroupLayout,
    pub volume_bgl: wgpu::BindGroupLayout,
}

impl ScenePipelines {
    pub fn new(
        device: &wgpu::Device,
        normal_spec_fmt: wgpu::TextureFormat,
        albedo_fmt: wgpu::TextureFormat,
        selection_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
    ) -> Self {
        let instance_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Instance BGL"),
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

        // Float32 volume formats are not filterable without extra device
        // features, so the sampler is non-filtering.
        let volume_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volume BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene WGSL"),
            source: wgpu::ShaderSource::Wgsl(SCENE_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&instance_bgl, &volume_bgl],
            push_constant_ranges: &[],
        });

        let targets = [
            Some(wgpu::ColorTargetState {
                format: normal_spec_fmt,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: albedo_fmt,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: selection_fmt,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ];

        // Reversed depth: clear 0, pass what is nearer, i.e. greater.
        let depth_stencil = wgpu::DepthStencilState {
            format: depth_fmt,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Greater,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        };

        let make = |label: &str,
                    vs_entry: &str,
                    buffers: &[wgpu::VertexBufferLayout],
                    topology: wgpu::PrimitiveTopology,
                    cull_mode: Option<wgpu::Face>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: vs_entry,
                    buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: Some(depth_stencil.clone()),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        };

        // Planes are visible from both sides, so no culling there.
        let plane = make(
            "Plane Pipeline",
            "vs_plane",
            &[],
            wgpu::PrimitiveTopology::TriangleStrip,
            None,
        );
        let cube = make(
            "Cube Pipeline",
            "vs_cube",
            &[],
            wgpu::PrimitiveTopology::TriangleList,
            Some(wgpu::Face::Back),
        );
        let mesh = make(
            "Mesh Pipeline",
            "vs_mesh",
            &[MESH_VERTEX_LAYOUT],
            wgpu::PrimitiveTopology::TriangleList,
            Some(wgpu::Face::Back),
        );

        Self {
            plane,
            cube,
            mesh,
            instance_bgl,
            volume_bgl,
        }
    }
}

pub const SCENE_WGSL: &str = r#"
struct SceneUniforms {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
    tex_transform: mat4x4<f32>,
    color_shininess: vec4<f32>,
    selection_index: u32,
    volume_mode: u32,
    _pad: vec2<u32>,
};
@group(0) @binding(0) var<uniform> U: SceneUniforms;
@group(1) @binding(0) var volume_tex: texture_3d<f32>;
@group(1) @binding(1) var volume_samp: sampler;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

fn to_world(local: vec3<f32>, local_normal: vec3<f32>) -> VSOut {
    var out: VSOut;
    let world = U.model * vec4<f32>(local, 1.0);
    out.world_pos = world.xyz;
    out.clip = U.view_proj * world;
    out.normal = normalize((U.model * vec4<f32>(local_normal, 0.0)).xyz);
    return out;
}

// Unit quad in the local xy plane, drawn as a 4-vertex triangle strip.
@vertex
fn vs_plane(@builtin(vertex_index) vi: u32) -> VSOut {
    var corners = array<vec2<f32>, 4>(
        vec2<f32>(-1.0, -1.0), vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0,  1.0), vec2<f32>(1.0,  1.0),
    );
    return to_world(vec3<f32>(corners[vi], 0.0), vec3<f32>(0.0, 0.0, 1.0));
}

// Unit cube, 12 triangles synthesized from the vertex index.
@vertex
fn vs_cube(@builtin(vertex_index) vi: u32) -> VSOut {
    var positions = array<vec3<f32>, 8>(
        vec3<f32>(-1.0, -1.0, -1.0), vec3<f32>( 1.0, -1.0, -1.0),
        vec3<f32>( 1.0,  1.0, -1.0), vec3<f32>(-1.0,  1.0, -1.0),
        vec3<f32>(-1.0, -1.0,  1.0), vec3<f32>( 1.0, -1.0,  1.0),
        vec3<f32>( 1.0,  1.0,  1.0), vec3<f32>(-1.0,  1.0,  1.0),
    );
    // CCW when viewed from outside.
    var indices = array<u32, 36>(
        4u, 5u, 6u, 4u, 6u, 7u, // +z
        1u, 0u, 3u, 1u, 3u, 2u, // -z
        5u, 1u, 2u, 5u, 2u, 6u, // +x
        0u, 4u, 7u, 0u, 7u, 3u, // -x
        7u, 6u, 2u, 7u, 2u, 3u, // +y
        0u, 1u, 5u, 0u, 5u, 4u, // -y
    );
    var normals = array<vec3<f32>, 6>(
        vec3<f32>(0.0, 0.0, 1.0), vec3<f32>(0.0, 0.0, -1.0),
        vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(-1.0, 0.0, 0.0),
        vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(0.0, -1.0, 0.0),
    );
    return to_world(positions[indices[vi]], normals[vi / 6u]);
}

@vertex
fn vs_mesh(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
) -> VSOut {
    return to_world(position, normal);
}

struct FSOut {
    @location(0) normal_spec: vec4<f32>,
    @location(1) albedo: vec4<f32>,
    @location(2) selection: u32,
};

@fragment
fn fs_main(in: VSOut, @builtin(front_facing) front: bool) -> FSOut {
    var normal = normalize(in.normal);
    if (!front) {
        normal = -normal;
    }

    var albedo = U.color_shininess.rgb;
    if (U.volume_mode != 0u) {
        let uvw = (U.tex_transform * vec4<f32>(in.world_pos, 1.0)).xyz;
        if (any(uvw < vec3<f32>(0.0)) || any(uvw > vec3<f32>(1.0))) {
            // Outside the volume there is no data: black border.
            albedo = vec3<f32>(0.0);
        } else {
            let sample = textureSampleLevel(volume_tex, volume_samp, uvw, 0.0);
            if (U.volume_mode == 1u) {
                albedo = albedo * sample.r;
            } else {
                albedo = albedo * sample.rgb;
            }
        }
    }

    var out: FSOut;
    out.normal_spec = vec4<f32>(normal, U.color_shininess.w);
    out.albedo = vec4<f32>(albedo, 1.0);
    out.selection = U.selection_index;
    return out;
}
"#;
