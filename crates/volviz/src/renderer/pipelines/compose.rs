//! Final pass: samples the HDR accumulation target onto the sRGB swap chain.
//! The surface format performs the linear-to-sRGB encoding on write.
//!
//! Besides the normal scene view the pass offers two debug modes: a 2x2
//! G-buffer split (albedo, normals, depth, specular exponent) and a
//! false-color view of the selection indices.

/// What the final pass puts on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Scene,
    /// 2x2 split: albedo, normals, depth, specular exponent.
    GBuffer,
    /// False-color selection indices.
    Selection,
}

impl DisplayMode {
    fn as_u32(self) -> u32 {
        match self {
            DisplayMode::Scene => 0,
            DisplayMode::GBuffer => 1,
            DisplayMode::Selection => 2,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct ComposeUniforms {
    mode: u32,
    _pad: [u32; 3], // 16 B
}

const _: [(); 16] = [(); core::mem::size_of::<ComposeUniforms>()];

pub struct ComposePass {
    pipeline: wgpu::RenderPipeline,
    bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl ComposePass {
    pub fn new(device: &wgpu::Device, surface_fmt: wgpu::TextureFormat) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Compose Uniform Buffer"),
            size: std::mem::size_of::<ComposeUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let texture_entry = |binding, sample_type| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Compose BGL"),
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
                texture_entry(1, wgpu::TextureSampleType::Float { filterable: true }),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_entry(3, wgpu::TextureSampleType::Float { filterable: false }),
                texture_entry(4, wgpu::TextureSampleType::Float { filterable: false }),
                texture_entry(5, wgpu::TextureSampleType::Depth),
                texture_entry(6, wgpu::TextureSampleType::Uint),
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Compose Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Compose WGSL"),
            source: wgpu::ShaderSource::Wgsl(COMPOSE_WGSL.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Compose Pipeline Layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Compose Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_fmt,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            bgl,
            sampler,
            uniform_buffer,
            bind_group: None,
        }
    }

    /// Rebinds the source textures; call after the targets are (re)created.
    pub fn rebind(
        &mut self,
        device: &wgpu::Device,
        lit: &wgpu::TextureView,
        normal_spec: &wgpu::TextureView,
        albedo: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        selection: &wgpu::TextureView,
    ) {
        let texture = |binding, view| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(view),
        };
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Compose Bind Group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                texture(1, lit),
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                texture(3, normal_spec),
                texture(4, albedo),
                texture(5, depth),
                texture(6, selection),
            ],
        }));
    }

    pub fn draw<'a>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'a>,
        queue: &wgpu::Queue,
        mode: DisplayMode,
    ) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        let uniforms = ComposeUniforms {
            mode: mode.as_u32(),
            _pad: [0; 3],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

pub const COMPOSE_WGSL: &str = r#"
struct ComposeUniforms {
    mode: u32,
    _pad: vec3<u32>,
};
@group(0) @binding(0) var<uniform> U: ComposeUniforms;
@group(0) @binding(1) var lit_tex: texture_2d<f32>;
@group(0) @binding(2) var lit_samp: sampler;
@group(0) @binding(3) var normal_spec_tex: texture_2d<f32>;
@group(0) @binding(4) var albedo_tex: texture_2d<f32>;
@group(0) @binding(5) var depth_tex: texture_depth_2d;
@group(0) @binding(6) var selection_tex: texture_2d<u32>;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VSOut {
    var corners = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0), vec2<f32>(-1.0, 1.0), vec2<f32>(3.0, 1.0),
    );
    var out: VSOut;
    let p = corners[vi];
    out.clip = vec4<f32>(p, 0.0, 1.0);
    out.uv = vec2<f32>(p.x * 0.5 + 0.5, 0.5 - p.y * 0.5);
    return out;
}

// 2x2 G-buffer split: albedo | normals / depth | specular exponent.
fn debug_gbuffer(uv: vec2<f32>) -> vec3<f32> {
    let dims = vec2<f32>(textureDimensions(albedo_tex));
    let quadrant_uv = fract(uv * 2.0);
    let texel = vec2<i32>(quadrant_uv * dims);

    if (uv.x < 0.5 && uv.y < 0.5) {
        return textureLoad(albedo_tex, texel, 0).rgb;
    }
    if (uv.x >= 0.5 && uv.y < 0.5) {
        return textureLoad(normal_spec_tex, texel, 0).xyz * 0.5 + 0.5;
    }
    if (uv.x < 0.5) {
        return vec3<f32>(textureLoad(depth_tex, texel, 0));
    }
    return vec3<f32>(textureLoad(normal_spec_tex, texel, 0).w / 32.0);
}

// Small false-color palette from the low bits of the index.
fn selection_color(index: u32) -> vec3<f32> {
    if (index == 0u) {
        return vec3<f32>(0.0);
    }
    let base = vec3<f32>(
        f32(index & 1u),
        f32((index >> 1u) & 1u),
        f32((index >> 2u) & 1u),
    );
    return 0.25 + 0.75 * base;
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    if (U.mode == 1u) {
        return vec4<f32>(debug_gbuffer(in.uv), 1.0);
    }
    if (U.mode == 2u) {
        let dims = vec2<f32>(textureDimensions(selection_tex));
        let index = textureLoad(selection_tex, vec2<i32>(in.uv * dims), 0).r;
        return vec4<f32>(selection_color(index), 1.0);
    }
    return vec4<f32>(textureSample(lit_tex, lit_samp, in.uv).rgb, 1.0);
}
"#;
