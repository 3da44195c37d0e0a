//! The active volume as a 3D texture.
//!
//! A 1x1x1 white placeholder keeps the bind group valid before any volume is
//! set; uploads replace the whole texture, recreating it when the extent or
//! sample type changes.

use crate::volume::{VolumeData, VolumeDescriptor, VolumeSampleType};

pub struct VolumeGpu {
    descriptor: VolumeDescriptor,
    _texture: wgpu::Texture,
    sampler: wgpu::Sampler,
    pub bind_group: wgpu::BindGroup,
}

impl VolumeGpu {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bgl: &wgpu::BindGroupLayout,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let (texture, bind_group) = Self::create(
            device,
            queue,
            bgl,
            &sampler,
            [1, 1, 1],
            wgpu::TextureFormat::R32Float,
            bytemuck::bytes_of(&1.0f32),
        );

        Self {
            // The default descriptor is empty: nothing samples the
            // placeholder.
            descriptor: VolumeDescriptor::default(),
            _texture: texture,
            sampler,
            bind_group,
        }
    }

    pub fn descriptor(&self) -> &VolumeDescriptor {
        &self.descriptor
    }

    /// Sample mode for the geometry shader: 0 = no volume, 1 = grayscale,
    /// 2 = rgb.
    pub fn mode(&self) -> u32 {
        if self.descriptor.is_empty() {
            0
        } else {
            match self.descriptor.sample_type {
                VolumeSampleType::Grayscale => 1,
                VolumeSampleType::Rgb => 2,
            }
        }
    }

    pub fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bgl: &wgpu::BindGroupLayout,
        data: VolumeData,
    ) {
        let format = match data.descriptor.sample_type {
            VolumeSampleType::Grayscale => wgpu::TextureFormat::R32Float,
            // RGB payloads were padded to four channels on hand-off.
            VolumeSampleType::Rgb => wgpu::TextureFormat::Rgba32Float,
        };
        let (texture, bind_group) = Self::create(
            device,
            queue,
            bgl,
            &self.sampler,
            data.descriptor.size,
            format,
            bytemuck::cast_slice(&data.texels),
        );
        log::info!(
            "uploaded {}x{}x{} {} volume",
            data.descriptor.size[0],
            data.descriptor.size[1],
            data.descriptor.size[2],
            match data.descriptor.sample_type {
                VolumeSampleType::Grayscale => "grayscale",
                VolumeSampleType::Rgb => "rgb",
            }
        );
        self.descriptor = data.descriptor;
        self._texture = texture;
        self.bind_group = bind_group;
    }

    fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bgl: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        size: [u32; 3],
        format: wgpu::TextureFormat,
        texels: &[u8],
    ) -> (wgpu::Texture, wgpu::BindGroup) {
        let extent = wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: size[2],
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Volume Texture"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let bytes_per_texel = texels.len() as u32 / (size[0] * size[1] * size[2]);
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size[0] * bytes_per_texel),
                rows_per_image: Some(size[1]),
            },
            extent,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volume Bind Group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        (texture, bind_group)
    }
}
