//! G-buffer and intermediate render targets for the deferred pipeline.

/// Render targets written by the geometry pass and consumed by the lighting
/// and overlay passes.
///
/// - `normal_spec`: world-space normal in xyz, specular exponent in w
/// - `albedo`: surface base color
/// - `selection`: per-object pick index, 0 where nothing was drawn
/// - `depth`: reversed depth, cleared to 0 and tested with `Greater`
/// - `lit`: HDR accumulation target the lighting passes add into
pub struct Targets {
    // Textures the picking readback copies from; the rest only need views.
    pub selection_tex: wgpu::Texture,
    pub depth_tex: wgpu::Texture,
    _normal_spec_tex: wgpu::Texture,
    _albedo_tex: wgpu::Texture,
    _lit_tex: wgpu::Texture,

    pub normal_spec: wgpu::TextureView,
    pub albedo: wgpu::TextureView,
    pub selection: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    pub lit: wgpu::TextureView,

    pub normal_spec_fmt: wgpu::TextureFormat,
    pub albedo_fmt: wgpu::TextureFormat,
    pub selection_fmt: wgpu::TextureFormat,
    pub depth_fmt: wgpu::TextureFormat,
    pub lit_fmt: wgpu::TextureFormat,
}

impl Targets {
    pub fn new(device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>) -> Self {
        let width = size.width.max(1);
        let height = size.height.max(1);

        let tex_size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let normal_spec_fmt = wgpu::TextureFormat::Rgba16Float;
        let albedo_fmt = wgpu::TextureFormat::Rgba16Float;
        let selection_fmt = wgpu::TextureFormat::R32Uint;
        let depth_fmt = wgpu::TextureFormat::Depth32Float;
        let lit_fmt = wgpu::TextureFormat::Rgba16Float;

        let create_tex = |label: &str, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: tex_size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let normal_spec_tex = create_tex(
            "Normal/Specular Target",
            normal_spec_fmt,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        let albedo_tex = create_tex(
            "Albedo Target",
            albedo_fmt,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        // The cursor readback copies single texels out of these two.
        let selection_tex = create_tex(
            "Selection Index Target",
            selection_fmt,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let depth_tex = create_tex(
            "Scene Depth Target",
            depth_fmt,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let lit_tex = create_tex(
            "Lit Accumulation Target",
            lit_fmt,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );

        Self {
            normal_spec: normal_spec_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            albedo: albedo_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            selection: selection_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            lit: lit_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            selection_tex,
            depth_tex,
            _normal_spec_tex: normal_spec_tex,
            _albedo_tex: albedo_tex,
            _lit_tex: lit_tex,
            normal_spec_fmt,
            albedo_fmt,
            selection_fmt,
            depth_fmt,
            lit_fmt,
        }
    }

    /// Recreates all targets at the new window size.
    pub fn resize(&mut self, device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>) {
        *self = Self::new(device, size);
    }
}
