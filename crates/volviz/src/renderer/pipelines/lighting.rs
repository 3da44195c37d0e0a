//! Deferred lighting: full-screen passes over the G-buffer into the HDR
//! accumulation target.
//!
//! The ambient pass runs first without blending; it also paints the
//! background wherever the depth buffer still holds the reversed-depth clear
//! value. Every directional light is then one additively blended instance of
//! the same full-screen triangle, so the whole light set is a single
//! instanced draw.

use glam::Mat4;

pub const MAX_LIGHTS: usize = 16;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightGpu {
    /// Direction towards the light, render space. w unused.
    pub direction: [f32; 4],
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniforms {
    /// Clip space back to render units, for position reconstruction.
    pub inv_view_proj: Mat4, // 64 B
    pub eye_pos: [f32; 4],     // +16 -> 80
    pub ambient: [f32; 4],     // +16 -> 96
    pub background: [f32; 4],  // +16 -> 112
    pub screen_size: [f32; 2], // +8
    pub light_count: u32,      // +4
    pub _pad0: u32,            // +4 -> 128
    pub lights: [LightGpu; MAX_LIGHTS], // +512 -> 640
}

// Compile-time safety check: buffer size must match WGSL-reflected size.
const _: [(); 640] = [(); core::mem::size_of::<LightingUniforms>()];

pub struct LightingPass {
    ambient: wgpu::RenderPipeline,
    lights: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl LightingPass {
    pub fn new(device: &wgpu::Device, lit_fmt: wgpu::TextureFormat) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lighting Uniform Buffer"),
            size: std::mem::size_of::<LightingUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // G-buffer reads go through textureLoad, so none of the textures
        // need to be filterable.
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lighting BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lighting WGSL"),
            source: wgpu::ShaderSource::Wgsl(LIGHTING_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lighting Pipeline Layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let make = |label: &str, fs_entry: &str, blend: Option<wgpu::BlendState>| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_fullscreen",
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: fs_entry,
                    targets: &[Some(wgpu::ColorTargetState {
                        format: lit_fmt,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        };

        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent::OVER,
        };

        let ambient = make("Ambient Pipeline", "fs_ambient", None);
        let lights = make("Light Pipeline", "fs_light", Some(additive));

        Self {
            ambient,
            lights,
            bgl,
            uniform_buffer,
            bind_group: None,
        }
    }

    /// Rebuilds the G-buffer bind group; call after the targets are
    /// (re)created.
    pub fn rebind(
        &mut self,
        device: &wgpu::Device,
        normal_spec: &wgpu::TextureView,
        albedo: &wgpu::TextureView,
        depth: &wgpu::TextureView,
    ) {
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lighting Bind Group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(normal_spec),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(albedo),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
            ],
        }));
    }

    pub fn update(&self, queue: &wgpu::Queue, uniforms: &LightingUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// One ambient draw plus one instanced draw covering all lights.
    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, light_count: u32) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        rpass.set_pipeline(&self.ambient);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.draw(0..3, 0..1);

        if light_count > 0 {
            rpass.set_pipeline(&self.lights);
            rpass.draw(0..3, 0..light_count);
        }
    }
}

pub const LIGHTING_WGSL: &str = r#"
struct LightGpu {
    direction: vec4<f32>,
    color: vec4<f32>,
};

struct LightingUniforms {
    inv_view_proj: mat4x4<f32>,
    eye_pos: vec4<f32>,
    ambient: vec4<f32>,
    background: vec4<f32>,
    screen_size: vec2<f32>,
    light_count: u32,
    _pad0: u32,
    lights: array<LightGpu, 16>,
};
@group(0) @binding(0) var<uniform> U: LightingUniforms;
@group(0) @binding(1) var normal_spec_tex: texture_2d<f32>;
@group(0) @binding(2) var albedo_tex: texture_2d<f32>;
@group(0) @binding(3) var depth_tex: texture_depth_2d;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) @interpolate(flat) light: u32,
};

@vertex
fn vs_fullscreen(
    @builtin(vertex_index) vi: u32,
    @builtin(instance_index) ii: u32,
) -> VSOut {
    // One oversized triangle covering the screen.
    var corners = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0), vec2<f32>(-1.0, 1.0), vec2<f32>(3.0, 1.0),
    );
    var out: VSOut;
    out.clip = vec4<f32>(corners[vi], 0.0, 1.0);
    out.light = ii;
    return out;
}

@fragment
fn fs_ambient(in: VSOut) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(in.clip.xy);
    let depth = textureLoad(depth_tex, texel, 0);
    if (depth == 0.0) {
        return vec4<f32>(U.background.rgb, 1.0);
    }
    let albedo = textureLoad(albedo_tex, texel, 0).rgb;
    return vec4<f32>(albedo * U.ambient.rgb, 1.0);
}

@fragment
fn fs_light(in: VSOut) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(in.clip.xy);
    let depth = textureLoad(depth_tex, texel, 0);
    if (depth == 0.0) {
        return vec4<f32>(0.0);
    }

    let ns = textureLoad(normal_spec_tex, texel, 0);
    let normal = normalize(ns.xyz);
    let shininess = ns.w;
    let albedo = textureLoad(albedo_tex, texel, 0).rgb;

    // Reconstruct the render-space position from the depth buffer.
    let ndc = vec2<f32>(
        in.clip.x / U.screen_size.x * 2.0 - 1.0,
        1.0 - in.clip.y / U.screen_size.y * 2.0,
    );
    let clip = vec4<f32>(ndc, depth, 1.0);
    let world_h = U.inv_view_proj * clip;
    let world = world_h.xyz / world_h.w;

    let light = U.lights[in.light];
    let l = normalize(light.direction.xyz);
    let diffuse = max(dot(normal, l), 0.0) * albedo * light.color.rgb;

    // Blinn-Phong specular.
    let v = normalize(U.eye_pos.xyz - world);
    let h = normalize(l + v);
    let spec = pow(max(dot(normal, h), 0.0), shininess) * light.color.rgb;

    return vec4<f32>(diffuse + spec, 0.0);
}
"#;
