use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use deferlight_render::{
    Camera, FrameOrchestrator, FrameReport, FrameSettings, GBufferAttachment, GraphicsDevice,
    PipelineResources, Projection, RenderTargetId, ShadingMode, ViewState, Viewport,
};
use deferlight_render_wgpu::WgpuDevice;
use deferlight_scene::{DemoScene, SceneConfig};
use egui::Context as EguiContext;
use glam::Vec3;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{
    DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "deferlight-desktop", about = "Deferred shading viewer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene config (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Degrees of orbit per pixel of mouse motion.
const ORBIT_SPEED: f32 = 0.25;

/// Edge length of the G-buffer thumbnails in the side panel.
const PREVIEW_SIZE: f32 = 100.0;

/// egui textures showing the attachments of the current G-buffer.
///
/// The G-buffer is recreated on resize, so the registered views go stale
/// whenever the orchestrator's target id changes.
#[derive(Default)]
struct GBufferPreviews {
    target: Option<RenderTargetId>,
    textures: Vec<(GBufferAttachment, egui::TextureId)>,
}

impl GBufferPreviews {
    /// Point the previews at `target`. Returns the textures to free when
    /// they belonged to a different target, `None` when nothing changed.
    fn retarget(&mut self, target: RenderTargetId) -> Option<Vec<egui::TextureId>> {
        if self.target == Some(target) {
            return None;
        }
        self.target = Some(target);
        Some(self.textures.drain(..).map(|(_, id)| id).collect())
    }

    fn refresh(
        &mut self,
        renderer: &mut egui_wgpu::Renderer,
        device: &WgpuDevice,
        target: RenderTargetId,
    ) {
        let Some(stale) = self.retarget(target) else {
            return;
        };
        for id in &stale {
            renderer.free_texture(id);
        }
        // egui samples through a filtering sampler.
        if !device.float_filterable() {
            return;
        }
        let Some(views) = device.attachment_views(target) else {
            return;
        };
        self.textures = GBufferAttachment::ALL
            .into_iter()
            .zip(views)
            .map(|(attachment, view)| {
                let id = renderer.register_native_texture(
                    device.device(),
                    view,
                    wgpu::FilterMode::Nearest,
                );
                (attachment, id)
            })
            .collect();
        tracing::debug!(target_id = target.0, "registered G-buffer previews");
    }
}

/// Everything the debug controls act on, independent of the GPU.
struct AppState {
    camera: Camera,
    projection: Projection,
    settings: FrameSettings,
    global_light: Vec3,
    show_spheres: bool,
    show_bunnies: bool,
    animate: bool,
    show_panel: bool,
    orbiting: bool,
    clock: f32,
    last_frame: Instant,
    frame_time: f32,
    last_report: Option<FrameReport>,
}

impl AppState {
    fn new(config: &SceneConfig) -> Self {
        Self {
            camera: Camera::default(),
            projection: Projection::default(),
            settings: FrameSettings {
                key_light: config.key_light,
                ..FrameSettings::default()
            },
            global_light: config.global_light.position,
            show_spheres: config.show_spheres,
            show_bunnies: true,
            animate: true,
            show_panel: true,
            orbiting: false,
            clock: 0.0,
            last_frame: Instant::now(),
            frame_time: 0.0,
            last_report: None,
        }
    }

    /// Returns `true` when the key asks to quit.
    fn handle_key(&mut self, key: KeyCode) -> bool {
        let digit = match key {
            KeyCode::Digit0 => Some(0),
            KeyCode::Digit1 => Some(1),
            KeyCode::Digit2 => Some(2),
            KeyCode::Digit3 => Some(3),
            KeyCode::Digit4 => Some(4),
            KeyCode::Digit5 => Some(5),
            KeyCode::Digit6 => Some(6),
            KeyCode::Digit7 => Some(7),
            KeyCode::Digit8 => Some(8),
            KeyCode::Digit9 => Some(9),
            _ => None,
        };
        if let Some(mode) = digit {
            self.settings.mode = ShadingMode(mode);
            tracing::debug!(mode, "shading mode");
            return false;
        }
        match key {
            KeyCode::F1 => self.show_panel = !self.show_panel,
            KeyCode::KeyL => self.settings.show_local_lights = !self.settings.show_local_lights,
            KeyCode::Space => self.animate = !self.animate,
            KeyCode::Escape => return true,
            _ => {}
        }
        false
    }

    fn draw_ui(
        &mut self,
        ctx: &EguiContext,
        demo: &mut DemoScene,
        previews: &[(GBufferAttachment, egui::TextureId)],
    ) {
        if !self.show_panel {
            return;
        }

        egui::SidePanel::left("controls")
            .default_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Deferred Shading");
                ui.separator();
                if let Some(report) = &self.last_report {
                    ui.label(format!("Frame: {}  ({:?})", report.frame, report.outcome));
                    ui.label(format!(
                        "Draws: {} geometry, {} volumes",
                        report.geometry_draws, report.volume_draws
                    ));
                    ui.label(format!("Lights: {}", report.lights));
                }
                ui.label(format!("Frame time: {:.2} ms", self.frame_time * 1000.0));
                ui.separator();

                ui.heading("Global light");
                ui.horizontal(|ui| {
                    ui.add(
                        egui::DragValue::new(&mut self.global_light.x)
                            .prefix("X: ")
                            .speed(0.05),
                    );
                    ui.add(
                        egui::DragValue::new(&mut self.global_light.y)
                            .prefix("Y: ")
                            .speed(0.05),
                    );
                    ui.add(
                        egui::DragValue::new(&mut self.global_light.z)
                            .prefix("Z: ")
                            .speed(0.05),
                    );
                });
                ui.checkbox(&mut self.settings.show_local_lights, "Local light volumes (L)");
                ui.add(egui::Slider::new(&mut self.settings.mode.0, 0..=9).text("Mode (0-9)"));
                ui.small("0 lit, 1 normals, 2 diffuse");
                ui.separator();

                ui.heading("Scene");
                if ui.checkbox(&mut self.show_spheres, "Spheres").changed() {
                    if let Err(e) = demo.set_spheres_visible(self.show_spheres) {
                        tracing::error!("failed to toggle spheres: {e}");
                    }
                }
                if ui.checkbox(&mut self.show_bunnies, "Bunnies").changed() {
                    if let Err(e) = demo.set_bunnies_visible(self.show_bunnies) {
                        tracing::error!("failed to toggle bunnies: {e}");
                    }
                }
                ui.checkbox(&mut self.animate, "Animate (Space)");
                ui.separator();

                ui.heading("G-buffer");
                if previews.is_empty() {
                    ui.small("previews need filterable float textures");
                }
                ui.horizontal_wrapped(|ui| {
                    for (attachment, texture) in previews {
                        ui.vertical(|ui| {
                            ui.small(attachment.sampler_name());
                            ui.image((*texture, egui::vec2(PREVIEW_SIZE, PREVIEW_SIZE)));
                        });
                    }
                });

                ui.separator();
                ui.small("F1: Toggle Panel | RMB: Orbit | Wheel: Zoom");
            });
    }
}

/// GPU-side state, created once the window exists.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    device: WgpuDevice,
    frames: FrameOrchestrator,
    demo: DemoScene,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    previews: GBufferPreviews,
}

impl Gpu {
    fn new(
        event_loop: &ActiveEventLoop,
        egui_ctx: &EguiContext,
        scene_config: &SceneConfig,
    ) -> Result<Self> {
        let attrs = Window::default_attributes()
            .with_title("Deferred Shading")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        // Four float attachments need the adapter's full limits.
        let optional = wgpu::Features::FLOAT32_FILTERABLE | wgpu::Features::POLYGON_MODE_LINE;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("deferlight_device"),
                required_features: adapter.features() & optional,
                required_limits: adapter.limits(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut gpu_device =
            WgpuDevice::new(&device, &queue, surface_format, config.width, config.height);
        let resources = PipelineResources::create(&mut gpu_device)?;
        let meshes = PipelineResources::upload_demo_meshes(&mut gpu_device)?;
        let demo = DemoScene::build(scene_config, &meshes)?;
        let frames = FrameOrchestrator::new(
            &mut gpu_device,
            Viewport::new(config.width, config.height),
            resources,
        )?;

        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );
        Ok(Self {
            window,
            surface,
            config,
            device: gpu_device,
            frames,
            demo,
            egui_winit,
            egui_renderer,
            previews: GBufferPreviews::default(),
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.config.width = size.width.max(1);
        self.config.height = size.height.max(1);
        self.surface.configure(self.device.device(), &self.config);
        self.device.resize(self.config.width, self.config.height);
        tracing::info!(
            width = self.config.width,
            height = self.config.height,
            "surface resized"
        );
    }
}

struct GpuApp {
    state: AppState,
    scene_config: SceneConfig,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    /// Set when rendering hit an unrecoverable error.
    fatal: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(scene_config: SceneConfig) -> Self {
        Self {
            state: AppState::new(&scene_config),
            scene_config,
            gpu: None,
            egui_ctx: EguiContext::default(),
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("fatal: {error:#}");
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(gpu) = &mut self.gpu else {
            return Ok(());
        };
        let state = &mut self.state;

        let now = Instant::now();
        let dt = (now - state.last_frame).as_secs_f32().min(0.1);
        state.last_frame = now;
        state.frame_time = dt;
        if state.animate {
            state.clock += dt;
        }
        gpu.demo.animate(state.clock)?;
        gpu.demo
            .graph
            .lights_mut()
            .set_global_position(state.global_light);

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(gpu.device.device(), &gpu.config);
                return Ok(());
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return Ok(());
            }
        };
        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let viewport = Viewport::new(gpu.config.width, gpu.config.height);
        let view = ViewState::from_camera(
            &state.camera,
            &state.projection,
            viewport,
            state.settings.mode,
        );
        let report = gpu.frames.render_frame(
            &mut gpu.device,
            &gpu.demo.graph,
            &view,
            viewport,
            &state.settings,
        )?;
        gpu.device.submit_frame(&target);
        if let Some(error) = gpu.device.poll_error() {
            return Err(error.into());
        }
        state.last_report = Some(report);
        gpu.previews
            .refresh(&mut gpu.egui_renderer, &gpu.device, gpu.frames.target().id());

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let demo = &mut gpu.demo;
        let previews = &gpu.previews.textures;
        let full_output = self
            .egui_ctx
            .run(raw_input, |ctx| state.draw_ui(ctx, demo, previews));
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        let device = gpu.device.device();
        let queue = gpu.device.queue();
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        gpu.egui_renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();
        Ok(())
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match Gpu::new(event_loop, &self.egui_ctx, &self.scene_config) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
        if response.consumed {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                gpu.resize(new_size);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                if self.state.handle_key(key) {
                    event_loop.exit();
                }
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state: btn_state,
                ..
            } => {
                self.state.orbiting = btn_state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                self.state.camera.zoom(0.9_f32.powf(steps));
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.orbiting {
                self.state.camera.rotate(
                    delta.0 as f32 * ORBIT_SPEED,
                    delta.1 as f32 * ORBIT_SPEED,
                );
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<SceneConfig> {
    let Some(path) = path else {
        return Ok(SceneConfig::default());
    };
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    SceneConfig::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("deferlight-desktop starting");
    let scene_config = load_config(cli.config)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(scene_config);
    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previews_follow_the_gbuffer_target() {
        let mut previews = GBufferPreviews::default();
        assert_eq!(previews.retarget(RenderTargetId(1)), Some(vec![]));
        assert_eq!(previews.retarget(RenderTargetId(1)), None);

        previews.textures = vec![
            (GBufferAttachment::Position, egui::TextureId::User(0)),
            (GBufferAttachment::Normal, egui::TextureId::User(1)),
        ];
        // A resize recreates the target; the old textures must be freed.
        let stale = previews.retarget(RenderTargetId(2)).unwrap();
        assert_eq!(
            stale,
            vec![egui::TextureId::User(0), egui::TextureId::User(1)]
        );
        assert!(previews.textures.is_empty());
    }

    #[test]
    fn digit_keys_select_the_shading_mode() {
        let mut state = AppState::new(&SceneConfig::default());
        assert!(!state.handle_key(KeyCode::Digit2));
        assert_eq!(state.settings.mode, ShadingMode(2));
        assert!(!state.handle_key(KeyCode::KeyL));
        assert!(state.settings.show_local_lights);
        assert!(state.handle_key(KeyCode::Escape));
    }
}
