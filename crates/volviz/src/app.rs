//! The public visualizer: window, event pumping and the thread-safe handle.
//!
//! [`Visualizer`] owns the window, the GPU renderer and the camera caches
//! and must stay on the thread that created it. Everything a worker thread
//! may touch — geometry registration, lights, volume hand-off, camera
//! properties — lives behind the cloneable [`VisualizerHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Vec2, Vec3};
use winit::{
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::EventLoopExtPumpEvents,
    window::{Window, WindowBuilder},
};

use crate::{
    camera::{Camera, CameraProperties},
    error::{Result, VizError},
    geometry::GeometryDescriptor,
    interaction::Interaction,
    light::{Light, LightName, LightTable},
    picking::PickInfo,
    registry::{GeometryName, GeometryRegistry},
    renderer::{
        pipelines::{compose::DisplayMode, overlay::PointVertex},
        FrameInputs, Renderer,
    },
    sync::ObservableCell,
    volume::{PendingVolume, VolumeData, VolumeDescriptor},
};

/// Default world scale: one render unit per millimetre.
pub const DEFAULT_SCALE_M: f32 = 1e-3;

/// Thread-safe access to the visualizer's shared state. Cheap to clone and
/// safe to move into worker threads.
#[derive(Clone)]
pub struct VisualizerHandle {
    registry: Arc<GeometryRegistry>,
    lights: Arc<LightTable>,
    volume: Arc<PendingVolume>,
    camera: Arc<CameraProperties>,
    scale_m: Arc<ObservableCell<f32>>,
    background: Arc<ObservableCell<Vec3>>,
    show_grid: Arc<AtomicBool>,
    show_bbox: Arc<AtomicBool>,
}

impl VisualizerHandle {
    fn new(camera: Arc<CameraProperties>) -> Self {
        Self {
            registry: Arc::new(GeometryRegistry::default()),
            lights: Arc::new(LightTable::default()),
            volume: Arc::new(PendingVolume::default()),
            camera,
            scale_m: Arc::new(ObservableCell::new(DEFAULT_SCALE_M)),
            background: Arc::new(ObservableCell::new(Vec3::ZERO)),
            show_grid: Arc::new(AtomicBool::new(false)),
            show_bbox: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues a geometry for initialization on the render thread.
    pub fn add_geometry(
        &self,
        name: impl Into<String>,
        descriptor: GeometryDescriptor,
    ) -> Result<()> {
        self.registry.add(name, descriptor)
    }

    /// Updates a live geometry. `Ok(false)` means the instance is not
    /// initialized yet; retry on a later frame.
    pub fn update_geometry(&self, name: &str, descriptor: GeometryDescriptor) -> Result<bool> {
        self.registry.update(name, descriptor)
    }

    pub fn add_light(&self, name: LightName, light: Light) -> Result<()> {
        self.lights.add(name, light)
    }

    /// Replaces the active volume. The payload is validated and repacked
    /// here; upload happens at the start of the next frame.
    pub fn set_volume(&self, descriptor: VolumeDescriptor, data: &[f32]) -> Result<()> {
        self.volume.replace(VolumeData::pack(descriptor, data)?);
        Ok(())
    }

    /// Replaces the active volume with color-typed voxel data.
    pub fn set_volume_colors(&self, descriptor: VolumeDescriptor, data: &[Vec3]) -> Result<()> {
        self.volume.replace(VolumeData::pack_colors(descriptor, data)?);
        Ok(())
    }

    pub fn camera(&self) -> &CameraProperties {
        &self.camera
    }

    /// Sets the world scale in metres per render unit.
    pub fn set_scale_m(&self, scale_m: f32) -> Result<()> {
        if scale_m <= 0.0 {
            return Err(VizError::ContractViolation(format!(
                "world scale must be positive, got {scale_m}"
            )));
        }
        self.scale_m.set(scale_m);
        Ok(())
    }

    pub fn scale_m(&self) -> f32 {
        self.scale_m.get()
    }

    pub fn set_background_color(&self, color: Vec3) {
        self.background.set(color);
    }

    pub fn show_grid(&self, on: bool) {
        self.show_grid.store(on, Ordering::Relaxed);
    }

    pub fn show_bounding_box(&self, on: bool) {
        self.show_bbox.store(on, Ordering::Relaxed);
    }

    /// Allows `update_geometry` calls to race the render thread's init
    /// drain; unknown names become soft failures instead of errors.
    pub fn enable_multithreading(&self) {
        self.registry.enable_multithreading();
    }
}

pub struct Visualizer {
    event_loop: EventLoop<()>,
    // Kept so the window outlives the surface even if the renderer is torn
    // down first.
    _window: Arc<Window>,
    renderer: Renderer,
    camera: Camera,
    interaction: Interaction,
    handle: VisualizerHandle,
    keep_open: bool,
    display_mode: DisplayMode,
    cursor_px: (u32, u32),
    latest_pick: PickInfo,
    /// Markers queued via [`Self::render_point`] in metres, cleared every
    /// frame.
    points: Vec<(Vec3, Vec3)>,
    /// Set by any input event; drives [`Self::render_on_user_interaction`].
    interacted: bool,
}

impl Visualizer {
    pub fn new() -> Result<Self> {
        Self::with_title_and_size("VolViz", 1280, 720)
    }

    pub fn with_title_and_size(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new()
            .map_err(|e| VizError::Setup(format!("failed to create event loop: {e}")))?;
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(winit::dpi::LogicalSize::new(width, height))
                .build(&event_loop)
                .map_err(|e| VizError::Setup(format!("failed to create window: {e}")))?,
        );

        let renderer = pollster::block_on(Renderer::new(window.clone()))?;

        let camera = Camera::new();
        let size = renderer.gfx.size;
        camera
            .properties()
            .set_aspect(size.width as f32 / size.height.max(1) as f32)?;

        let handle = VisualizerHandle::new(Arc::clone(camera.properties()));

        Ok(Self {
            event_loop,
            _window: window,
            renderer,
            camera,
            interaction: Interaction::default(),
            handle,
            keep_open: true,
            display_mode: DisplayMode::default(),
            cursor_px: (0, 0),
            latest_pick: PickInfo::NONE,
            points: Vec::new(),
            interacted: false,
        })
    }

    /// A cloneable, thread-safe handle to the shared state.
    pub fn handle(&self) -> VisualizerHandle {
        self.handle.clone()
    }

    pub fn keep_open(&self) -> bool {
        self.keep_open
    }

    /// True until the user closes the window or hits Escape.
    pub fn is_open(&self) -> bool {
        self.keep_open
    }

    pub fn show_grid(&self, on: bool) {
        self.handle.show_grid(on);
    }

    pub fn show_bounding_box(&self, on: bool) {
        self.handle.show_bounding_box(on);
    }

    /// Name of the geometry under the cursor (one frame stale, like the
    /// pick itself), or `None` over empty space.
    pub fn selected_geometry(&self) -> Option<GeometryName> {
        self.handle.registry.resolve_index(self.latest_pick.index)
    }

    /// Switches between the scene view and the debug views; also bound to
    /// the 1, 2 and 3 keys.
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    /// Queues a debug marker at the given position in metres; it is drawn
    /// on the next frame only.
    pub fn render_point(&mut self, position_m: Vec3, color: Vec3) {
        self.points.push((position_m, color));
    }

    // Convenience forwards, so single-threaded users never touch the handle.

    pub fn add_geometry(
        &self,
        name: impl Into<String>,
        descriptor: GeometryDescriptor,
    ) -> Result<()> {
        self.handle.add_geometry(name, descriptor)
    }

    pub fn update_geometry(&self, name: &str, descriptor: GeometryDescriptor) -> Result<bool> {
        self.handle.update_geometry(name, descriptor)
    }

    pub fn add_light(&self, name: LightName, light: Light) -> Result<()> {
        self.handle.add_light(name, light)
    }

    pub fn set_volume(&self, descriptor: VolumeDescriptor, data: &[f32]) -> Result<()> {
        self.handle.set_volume(descriptor, data)
    }

    pub fn set_volume_colors(&self, descriptor: VolumeDescriptor, data: &[Vec3]) -> Result<()> {
        self.handle.set_volume_colors(descriptor, data)
    }

    pub fn camera(&self) -> &CameraProperties {
        self.camera.properties()
    }

    pub fn set_scale_m(&self, scale_m: f32) -> Result<()> {
        self.handle.set_scale_m(scale_m)
    }

    pub fn set_background_color(&self, color: Vec3) {
        self.handle.set_background_color(color)
    }

    pub fn enable_multithreading(&self) {
        self.handle.enable_multithreading()
    }

    /// Pumps window events and renders a single frame. Returns without
    /// rendering once the window was closed.
    pub fn render_frame(&mut self) -> Result<()> {
        self.pump_events();
        if !self.keep_open {
            return Ok(());
        }

        let frame = match self.renderer.gfx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.renderer.resize(self.renderer.gfx.size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(VizError::GraphicsDevice("GPU out of memory".into()));
            }
            Err(e) => {
                log::warn!("skipping frame: {e:?}");
                return Ok(());
            }
        };
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let scale_m = self.handle.scale_m.get();
        // While dragging, the grab stays highlighted even if the stale pick
        // wanders off the object.
        let selected = self
            .interaction
            .grabbed_geometry()
            .unwrap_or(self.latest_pick.index);

        let points: Vec<PointVertex> = self
            .points
            .iter()
            .map(|&(pos_m, color)| PointVertex::new(pos_m / scale_m, color))
            .collect();

        let inputs = FrameInputs {
            registry: &self.handle.registry,
            lights: &self.handle.lights,
            pending_volume: &self.handle.volume,
            world_scale_m: scale_m,
            background: self.handle.background.get(),
            cursor_px: self.cursor_px,
            selected,
            show_grid: self.handle.show_grid.load(Ordering::Relaxed),
            show_bbox: self.handle.show_bbox.load(Ordering::Relaxed),
            display_mode: self.display_mode,
            points: &points,
        };
        self.latest_pick = self.renderer.render(&swap_view, &self.camera, &inputs);
        frame.present();
        self.points.clear();
        Ok(())
    }

    /// Blocks until at least one window event arrives, then renders a frame.
    /// Suits applications that only redraw in response to input.
    pub fn render_frame_waiting_for_events(&mut self) -> Result<()> {
        while self.keep_open && !self.interacted {
            self.pump_events_with_timeout(Some(Duration::from_millis(50)));
        }
        self.interacted = false;
        self.render_frame()
    }

    /// Renders only while the user interacts, capped at the given rate, and
    /// sleeps otherwise. Shared state changes from worker threads still show
    /// up because a frame is rendered at least once per second.
    pub fn render_on_user_interaction(&mut self, max_fps: f64) -> Result<()> {
        let budget = Duration::from_secs_f64(1.0 / max_fps.max(1.0));
        let mut last_frame = Instant::now();
        while self.keep_open {
            self.pump_events();
            let idle = last_frame.elapsed();
            if self.interacted || idle >= Duration::from_secs(1) {
                self.interacted = false;
                self.render_frame()?;
                last_frame = Instant::now();
                if let Some(rest) = budget.checked_sub(last_frame.elapsed()) {
                    std::thread::sleep(rest);
                }
            } else {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(())
    }

    /// Renders frames at the given rate until the window is closed. A rate
    /// of 0 renders as fast as presentation allows.
    pub fn render_at_fps(&mut self, fps: f64) -> Result<()> {
        let budget = (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
        while self.keep_open {
            let start = Instant::now();
            self.render_frame()?;
            if let Some(budget) = budget {
                if let Some(rest) = budget.checked_sub(start.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }
        Ok(())
    }

    fn pump_events(&mut self) {
        self.pump_events_with_timeout(Some(Duration::ZERO));
    }

    fn pump_events_with_timeout(&mut self, timeout: Option<Duration>) {
        let mut events = Vec::new();
        let _ = self.event_loop.pump_events(timeout, |event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            if let Event::WindowEvent { event, .. } = event {
                events.push(event);
            }
        });
        self.interacted |= !events.is_empty();
        for event in events {
            self.handle_window_event(event);
        }
    }

    fn cursor_ndc(&self) -> Vec2 {
        let size = self.renderer.gfx.size;
        Vec2::new(
            self.cursor_px.0 as f32 / size.width.max(1) as f32 * 2.0 - 1.0,
            1.0 - self.cursor_px.1 as f32 / size.height.max(1) as f32 * 2.0,
        )
    }

    fn handle_window_event(&mut self, event: WindowEvent) {
        let scale_m = self.handle.scale_m.get();
        match event {
            WindowEvent::CloseRequested => self.keep_open = false,
            WindowEvent::Resized(size) => {
                self.renderer.resize(size);
                if size.height > 0 {
                    // Setter only fails for non-positive ratios.
                    let _ = self
                        .camera
                        .properties()
                        .set_aspect(size.width as f32 / size.height as f32);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor_px = (position.x.max(0.0) as u32, position.y.max(0.0) as u32);
                let ndc = self.cursor_ndc();
                if let Some(step) = self.interaction.cursor_moved(ndc, &self.camera, scale_m) {
                    self.renderer
                        .store
                        .apply_drag(step.index, step.position, scale_m);
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                let pick = self.latest_pick;
                match self
                    .renderer
                    .store
                    .pick_target(pick.index, scale_m)
                    .filter(|_| pick.hit())
                {
                    Some((position, mask)) => {
                        // Anchor the drag at the picked surface point: the
                        // readback depth under the cursor, unprojected. The
                        // clamp guards against a reversed depth of exactly 0,
                        // which would unproject to infinity.
                        let depth = pick.depth.clamp(1e-12, 1.0);
                        let point = self.camera.unproject(self.cursor_ndc(), depth, scale_m);
                        self.interaction
                            .grab_geometry(pick.index, position, point, mask)
                    }
                    None => self.interaction.grab_camera(),
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Released,
                button: MouseButton::Left,
                ..
            } => self.interaction.release(),
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 60.0,
                };
                self.interaction.scroll(y, self.camera.properties(), scale_m);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => self.keep_open = false,
                        PhysicalKey::Code(KeyCode::KeyG) => {
                            self.handle.show_grid.fetch_xor(true, Ordering::Relaxed);
                        }
                        PhysicalKey::Code(KeyCode::KeyB) => {
                            self.handle.show_bbox.fetch_xor(true, Ordering::Relaxed);
                        }
                        PhysicalKey::Code(KeyCode::Digit1) => {
                            self.display_mode = DisplayMode::Scene
                        }
                        PhysicalKey::Code(KeyCode::Digit2) => {
                            self.display_mode = DisplayMode::GBuffer
                        }
                        PhysicalKey::Code(KeyCode::Digit3) => {
                            self.display_mode = DisplayMode::Selection
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_toggles_overlays_across_threads() {
        let camera = Camera::new();
        let handle = VisualizerHandle::new(Arc::clone(camera.properties()));

        let worker = handle.clone();
        std::thread::spawn(move || {
            worker.show_grid(true);
            worker.show_bounding_box(true);
        })
        .join()
        .unwrap();

        assert!(handle.show_grid.load(Ordering::Relaxed));
        assert!(handle.show_bbox.load(Ordering::Relaxed));

        handle.show_bounding_box(false);
        assert!(!handle.show_bbox.load(Ordering::Relaxed));
    }

    #[test]
    fn scale_must_be_positive() {
        let camera = Camera::new();
        let handle = VisualizerHandle::new(Arc::clone(camera.properties()));

        assert!(handle.set_scale_m(0.0).is_err());
        assert!(handle.set_scale_m(2e-3).is_ok());
        assert_eq!(handle.scale_m(), 2e-3);
    }
}
