//! The main rendering orchestrator. Owns the GPU context, the G-buffer
//! targets, the geometry store and the individual render pass pipelines.
//!
//! Frame structure:
//! 1. drain one queued geometry init and one update per instance
//! 2. geometry pass into the G-buffer (normals, albedo, selection, depth)
//! 3. ambient plus per-light additive passes into the HDR target
//! 4. grid and bounding-box overlays, depth-tested against the scene
//! 5. compose onto the sRGB swap chain
//! 6. 1x1 pick readback of the texel under the cursor

pub mod context;
pub mod geometry_store;
pub mod pipelines;
pub mod targets;
pub mod volume_tex;

use std::sync::Arc;

use glam::Vec3;
use winit::window::Window;

use self::{
    context::GfxContext,
    geometry_store::GeometryStore,
    pipelines::{
        compose::{ComposePass, DisplayMode},
        lighting::{LightGpu, LightingPass, LightingUniforms, MAX_LIGHTS},
        overlay::{box_lines, grid_lines, OverlayPipeline, PointVertex},
        scene::ScenePipelines,
    },
    targets::Targets,
    volume_tex::VolumeGpu,
};
use crate::{
    camera::Camera,
    error::Result,
    light::LightTable,
    picking::{PickInfo, PickReadback},
    registry::GeometryRegistry,
    volume::PendingVolume,
};

/// Grid resolution: cells per half extent and per direction.
const GRID_CELLS: u32 = 10;

/// Everything the renderer reads from the shared application state for one
/// frame.
pub struct FrameInputs<'a> {
    pub registry: &'a GeometryRegistry,
    pub lights: &'a LightTable,
    pub pending_volume: &'a PendingVolume,
    /// Metres per render unit.
    pub world_scale_m: f32,
    pub background: Vec3,
    /// Cursor position in physical pixels, clamped to the surface.
    pub cursor_px: (u32, u32),
    /// Selection index of the object to highlight.
    pub selected: u32,
    pub show_grid: bool,
    pub show_bbox: bool,
    pub display_mode: DisplayMode,
    /// One-frame debug markers, render units.
    pub points: &'a [PointVertex],
}

pub struct Renderer {
    pub gfx: GfxContext,
    pub targets: Targets,
    pub store: GeometryStore,
    scene: ScenePipelines,
    lighting: LightingPass,
    overlay: OverlayPipeline,
    compose: ComposePass,
    volume: VolumeGpu,
    pick: PickReadback,
    /// Set when the overlay line buffers must be regenerated.
    overlay_dirty: bool,
    overlay_scale_m: f32,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let gfx = GfxContext::new(window).await?;
        let size = gfx.size;

        let targets = Targets::new(&gfx.device, size);
        let scene = ScenePipelines::new(
            &gfx.device,
            targets.normal_spec_fmt,
            targets.albedo_fmt,
            targets.selection_fmt,
            targets.depth_fmt,
        );
        let mut lighting = LightingPass::new(&gfx.device, targets.lit_fmt);
        lighting.rebind(
            &gfx.device,
            &targets.normal_spec,
            &targets.albedo,
            &targets.depth,
        );
        let overlay = OverlayPipeline::new(&gfx.device, targets.lit_fmt, targets.depth_fmt);
        let mut compose = ComposePass::new(&gfx.device, gfx.config.format);
        compose.rebind(
            &gfx.device,
            &targets.lit,
            &targets.normal_spec,
            &targets.albedo,
            &targets.depth,
            &targets.selection,
        );

        let volume = VolumeGpu::new(&gfx.device, &gfx.queue, &scene.volume_bgl);
        let pick = PickReadback::new(&gfx.device);

        Ok(Self {
            gfx,
            targets,
            store: GeometryStore::default(),
            scene,
            lighting,
            overlay,
            compose,
            volume,
            pick,
            overlay_dirty: true,
            overlay_scale_m: f32::NAN,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.targets.resize(&self.gfx.device, new_size);
            self.lighting.rebind(
                &self.gfx.device,
                &self.targets.normal_spec,
                &self.targets.albedo,
                &self.targets.depth,
            );
            self.compose.rebind(
                &self.gfx.device,
                &self.targets.lit,
                &self.targets.normal_spec,
                &self.targets.albedo,
                &self.targets.depth,
                &self.targets.selection,
            );
        }
    }

    /// Half extent of the active volume in render units, or a unit box.
    fn scene_half_extent(&self, world_scale_m: f32) -> Vec3 {
        if self.volume.descriptor().is_empty() {
            Vec3::ONE
        } else {
            self.volume.descriptor().half_extent_render(world_scale_m)
        }
    }

    fn refresh_overlays(&mut self, world_scale_m: f32) {
        if !self.overlay_dirty && self.overlay_scale_m == world_scale_m {
            return;
        }
        let half = self.scene_half_extent(world_scale_m);
        let grid_half = half.max_element() * 1.5;
        self.overlay
            .grid
            .upload_lines(&self.gfx.device, &grid_lines(grid_half, GRID_CELLS));
        self.overlay
            .bbox
            .upload_lines(&self.gfx.device, &box_lines(half));
        self.overlay_dirty = false;
        self.overlay_scale_m = world_scale_m;
    }

    fn lighting_uniforms(&self, camera: &Camera, frame: &FrameInputs) -> (LightingUniforms, u32) {
        let snapshot = frame.lights.snapshot();
        let count = snapshot.len().min(MAX_LIGHTS);
        let mut lights = [LightGpu {
            direction: [0.0; 4],
            color: [0.0; 4],
        }; MAX_LIGHTS];
        for (gpu, light) in lights.iter_mut().zip(&snapshot) {
            gpu.direction = light.position.to_array();
            gpu.color = light.color.extend(1.0).to_array();
        }

        let ambient = frame.lights.ambient_color();
        let eye = camera.properties().position_m() / frame.world_scale_m;
        let uniforms = LightingUniforms {
            inv_view_proj: camera.view_projection_matrix(frame.world_scale_m).inverse(),
            eye_pos: eye.extend(1.0).to_array(),
            ambient: ambient.extend(0.0).to_array(),
            background: frame.background.extend(1.0).to_array(),
            screen_size: [self.gfx.size.width as f32, self.gfx.size.height as f32],
            light_count: count as u32,
            _pad0: 0,
            lights,
        };
        (uniforms, count as u32)
    }

    /// Renders one frame and returns the pick result from a previous frame's
    /// readback.
    pub fn render(
        &mut self,
        swap_view: &wgpu::TextureView,
        camera: &Camera,
        frame: &FrameInputs,
    ) -> PickInfo {
        // Upload the latest pending volume, if any.
        if let Some(data) = frame.pending_volume.take() {
            self.volume
                .upload(&self.gfx.device, &self.gfx.queue, &self.scene.volume_bgl, data);
            self.overlay_dirty = true;
        }

        // At most one new geometry per frame; one update per instance.
        self.store
            .drain_one_init(frame.registry, &self.gfx.device, &self.scene.instance_bgl);
        self.store.apply_updates(&self.gfx.device);
        self.refresh_overlays(frame.world_scale_m);

        let view_proj = camera.view_projection_matrix(frame.world_scale_m);
        let volume_ctx = (!self.volume.descriptor().is_empty()).then(|| {
            (
                self.volume.descriptor().half_extent_render(frame.world_scale_m),
                self.volume.descriptor().texture_transform(frame.world_scale_m),
                self.volume.mode(),
            )
        });
        self.store.write_uniforms(
            &self.gfx.queue,
            view_proj,
            volume_ctx,
            frame.world_scale_m,
            frame.selected,
        );

        let (light_uniforms, light_count) = self.lighting_uniforms(camera, frame);
        self.lighting.update(&self.gfx.queue, &light_uniforms);

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        // Pass 1: geometry into the G-buffer. Reversed depth clears to 0.
        {
            let clear = |view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Geometry Pass"),
                color_attachments: &[
                    clear(&self.targets.normal_spec),
                    clear(&self.targets.albedo),
                    clear(&self.targets.selection),
                ],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.store.draw(&mut pass, &self.scene, &self.volume.bind_group);
        }

        // Pass 2: ambient and per-light shading into the HDR target.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Lighting Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.lit,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.lighting.draw(&mut pass, light_count);
        }

        // Pass 3: overlays, occluded by scene depth.
        self.overlay.upload_points(&self.gfx.device, frame.points);
        if frame.show_grid || frame.show_bbox || !frame.points.is_empty() {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Overlay Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.lit,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.overlay.draw(
                &mut pass,
                &self.gfx.queue,
                view_proj,
                [self.gfx.size.width as f32, self.gfx.size.height as f32],
                frame.show_grid,
                frame.show_bbox,
            );
        }

        // Pass 4: compose onto the swap chain.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Compose Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.compose
                .draw(&mut pass, &self.gfx.queue, frame.display_mode);
        }

        // Queue the cursor readback and submit.
        let pixel = (
            frame.cursor_px.0.min(self.gfx.size.width.saturating_sub(1)),
            frame.cursor_px.1.min(self.gfx.size.height.saturating_sub(1)),
        );
        self.pick.encode_copy(
            &mut encoder,
            &self.targets.selection_tex,
            &self.targets.depth_tex,
            pixel,
        );

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        self.pick.after_submit();

        // Drive the map callbacks without blocking.
        let _ = self.gfx.device.poll(wgpu::Maintain::Poll);
        self.pick.poll_latest()
    }
}
