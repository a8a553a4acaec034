use deferlight_scene::{DemoMeshes, MeshData, MeshHandle, SceneGraph};
use serde::{Deserialize, Serialize};

use crate::camera::{ViewState, Viewport};
use crate::command::{Command, Framebuffer, ProgramKind, RenderTargetId};
use crate::device::GraphicsDevice;
use crate::error::RenderError;
use crate::geometry::{GeometryOutput, GeometryPass};
use crate::lighting::{LightingOutput, LightingPass};
use crate::overlay::LightVolumeOverlay;
use crate::settings::FrameSettings;
use crate::target::RenderTargetSet;

/// Where a frame is in the two-pass sequence. Every frame walks
/// `Idle → GeometryBound → GeometryUnbound → LightingBound → Composited → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramePhase {
    Idle,
    GeometryBound,
    GeometryUnbound,
    LightingBound,
    Composited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameOutcome {
    Composited,
    /// The G-buffer was incomplete; only the default target was cleared.
    Degraded,
}

/// Summary of one rendered frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame: u64,
    pub outcome: FrameOutcome,
    pub geometry_draws: usize,
    pub lights: usize,
    pub volume_draws: usize,
}

/// Inputs shared by every pass of one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub frame: u64,
    pub view: ViewState,
    pub viewport: Viewport,
    pub settings: FrameSettings,
}

/// Meshes the pipeline itself draws, uploaded once at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineResources {
    pub fullscreen_quad: MeshHandle,
    pub light_volume: MeshHandle,
}

impl PipelineResources {
    pub fn create(device: &mut dyn GraphicsDevice) -> Result<Self, RenderError> {
        let quad = device.upload_mesh(&MeshData::quad())?;
        let volume = device.upload_mesh(&MeshData::uv_sphere(16))?;
        Ok(Self {
            fullscreen_quad: MeshHandle::Primitive(quad),
            light_volume: MeshHandle::Primitive(volume),
        })
    }

    /// Upload the meshes the demo scene is built from. The bunny stands in
    /// as a small sphere tagged as loaded geometry.
    pub fn upload_demo_meshes(
        device: &mut dyn GraphicsDevice,
    ) -> Result<DemoMeshes, RenderError> {
        let sphere = device.upload_mesh(&MeshData::uv_sphere(32))?;
        let floor = device.upload_mesh(&MeshData::plane(10.0, 10))?;
        let bunny = device.upload_mesh(&MeshData::uv_sphere(24).scaled(0.08))?;
        Ok(DemoMeshes {
            sphere: MeshHandle::Primitive(sphere),
            floor: MeshHandle::Procedural(floor),
            bunny: MeshHandle::Loaded(bunny),
        })
    }
}

/// Drives the geometry pass, lighting pass and light-volume overlay in
/// order, owning the G-buffer and the phase state machine.
#[derive(Debug)]
pub struct FrameOrchestrator {
    geometry: GeometryPass,
    lighting: LightingPass,
    overlay: LightVolumeOverlay,
    target: RenderTargetSet,
    viewport: Viewport,
    phase: FramePhase,
    frame: u64,
    warned_incomplete: Option<RenderTargetId>,
}

impl FrameOrchestrator {
    /// Compile the three programs and create a G-buffer sized to `viewport`.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        viewport: Viewport,
        resources: PipelineResources,
    ) -> Result<Self, RenderError> {
        let geometry = device.compile_program(ProgramKind::Geometry)?;
        let lighting = device.compile_program(ProgramKind::Lighting)?;
        let volume = device.compile_program(ProgramKind::LightVolume)?;
        let target = RenderTargetSet::create(device, viewport.width, viewport.height)?;
        tracing::info!(
            width = viewport.width,
            height = viewport.height,
            "deferred pipeline ready"
        );
        Ok(Self {
            geometry: GeometryPass::new(geometry),
            lighting: LightingPass::new(lighting, resources.fullscreen_quad),
            overlay: LightVolumeOverlay::new(volume, resources.light_volume),
            target,
            viewport,
            phase: FramePhase::Idle,
            frame: 0,
            warned_incomplete: None,
        })
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Number of frames started so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn target(&self) -> &RenderTargetSet {
        &self.target
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Render one complete frame. A device error aborts the frame and
    /// returns the pipeline to `Idle`.
    pub fn render_frame(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &SceneGraph,
        view: &ViewState,
        viewport: Viewport,
        settings: &FrameSettings,
    ) -> Result<FrameReport, RenderError> {
        let ctx = self.begin_frame(device, view, viewport, settings)?;
        let _span = tracing::debug_span!("frame", frame = ctx.frame).entered();

        if !self.target.is_complete() {
            return self.degraded_frame(device, &ctx);
        }

        match self.run_passes(device, scene, &ctx) {
            Ok(report) => Ok(report),
            Err(err) => {
                self.abort_frame(device);
                Err(err)
            }
        }
    }

    /// Start a frame: bump the counter and bring the G-buffer to the
    /// viewport size. Requires `Idle`.
    pub fn begin_frame(
        &mut self,
        device: &mut dyn GraphicsDevice,
        view: &ViewState,
        viewport: Viewport,
        settings: &FrameSettings,
    ) -> Result<FrameContext, RenderError> {
        self.expect_phase(FramePhase::Idle)?;
        self.frame += 1;
        if viewport != self.viewport {
            if self.target.resize(device, viewport.width, viewport.height)? {
                tracing::info!(
                    width = viewport.width,
                    height = viewport.height,
                    "G-buffer resized"
                );
            }
            self.viewport = viewport;
        }
        Ok(FrameContext {
            frame: self.frame,
            view: *view,
            viewport,
            settings: *settings,
        })
    }

    /// `Idle → GeometryBound → GeometryUnbound`.
    pub fn geometry_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &SceneGraph,
        ctx: &FrameContext,
    ) -> Result<GeometryOutput, RenderError> {
        self.advance(FramePhase::Idle, FramePhase::GeometryBound)?;
        let output = self.geometry.run(device, &mut self.target, scene, ctx)?;
        self.advance(FramePhase::GeometryBound, FramePhase::GeometryUnbound)?;
        check_device(device)?;
        Ok(output)
    }

    /// `GeometryUnbound → LightingBound`.
    pub fn lighting_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &SceneGraph,
        geometry: &GeometryOutput,
        ctx: &FrameContext,
    ) -> Result<LightingOutput, RenderError> {
        self.expect_phase(FramePhase::GeometryUnbound)?;
        let output = self
            .lighting
            .run(device, &mut self.target, geometry, scene, ctx)?;
        self.advance(FramePhase::GeometryUnbound, FramePhase::LightingBound)?;
        check_device(device)?;
        Ok(output)
    }

    /// `LightingBound → Composited`. Returns the number of volumes drawn.
    pub fn overlay_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &SceneGraph,
        lighting: &LightingOutput,
        ctx: &FrameContext,
    ) -> Result<usize, RenderError> {
        self.expect_phase(FramePhase::LightingBound)?;
        let drawn = self.overlay.run(device, scene, lighting, ctx);
        self.advance(FramePhase::LightingBound, FramePhase::Composited)?;
        check_device(device)?;
        Ok(drawn)
    }

    /// `Composited → Idle`.
    pub fn end_frame(&mut self) -> Result<(), RenderError> {
        self.advance(FramePhase::Composited, FramePhase::Idle)
    }

    /// Release the G-buffer.
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.target.destroy(device);
    }

    fn run_passes(
        &mut self,
        device: &mut dyn GraphicsDevice,
        scene: &SceneGraph,
        ctx: &FrameContext,
    ) -> Result<FrameReport, RenderError> {
        let geometry = self.geometry_pass(device, scene, ctx)?;
        let lighting = self.lighting_pass(device, scene, &geometry, ctx)?;
        let volume_draws = self.overlay_pass(device, scene, &lighting, ctx)?;
        self.end_frame()?;
        Ok(FrameReport {
            frame: ctx.frame,
            outcome: FrameOutcome::Composited,
            geometry_draws: geometry.draw_calls,
            lights: lighting.radii.len(),
            volume_draws,
        })
    }

    fn degraded_frame(
        &mut self,
        device: &mut dyn GraphicsDevice,
        ctx: &FrameContext,
    ) -> Result<FrameReport, RenderError> {
        if self.warned_incomplete != Some(self.target.id()) {
            tracing::warn!(
                target_id = self.target.id().0,
                status = ?self.target.status(),
                "G-buffer incomplete, skipping deferred passes"
            );
            self.warned_incomplete = Some(self.target.id());
        }
        device.execute(Command::BindTarget(Framebuffer::Default));
        device.execute(Command::Clear {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
        });
        check_device(device)?;
        Ok(FrameReport {
            frame: ctx.frame,
            outcome: FrameOutcome::Degraded,
            geometry_draws: 0,
            lights: 0,
            volume_draws: 0,
        })
    }

    /// Drop a partially rendered frame: unbind the G-buffer and return to
    /// `Idle`. [`render_frame`](Self::render_frame) does this on any error;
    /// callers stepping through the passes themselves must do it too.
    pub fn abort_frame(&mut self, device: &mut dyn GraphicsDevice) {
        tracing::debug!(phase = ?self.phase, "aborting frame");
        self.target.reset_binding(device);
        self.phase = FramePhase::Idle;
    }

    fn expect_phase(&self, expected: FramePhase) -> Result<(), RenderError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RenderError::PhaseOrder {
                expected,
                found: self.phase,
            })
        }
    }

    fn advance(&mut self, from: FramePhase, to: FramePhase) -> Result<(), RenderError> {
        self.expect_phase(from)?;
        self.phase = to;
        Ok(())
    }
}

fn check_device(device: &mut dyn GraphicsDevice) -> Result<(), RenderError> {
    match device.poll_error() {
        Some(err) => {
            tracing::error!(error = %err, "device error");
            Err(err.into())
        }
        None => Ok(()),
    }
}
