use std::collections::BTreeMap;
use std::fmt::Write as _;

use deferlight_scene::{MeshData, MeshId};

use crate::command::{
    BlendMode, Command, Framebuffer, LightField, ProgramId, ProgramKind, RenderTargetId, Uniform,
};
use crate::device::{
    GraphicsDevice, IncompleteReason, RenderTargetDesc, TargetStatus, validate_target,
};
use crate::error::DeviceError;

/// Device that records the command stream instead of drawing.
///
/// Used by the CLI and by every pipeline test: completeness is simulated
/// against configurable limits, errors can be injected, and the stream can
/// be rendered as a human-readable trace.
#[derive(Debug)]
pub struct RecordingDevice {
    commands: Vec<Command>,
    programs: Vec<ProgramKind>,
    meshes: Vec<usize>,
    targets: BTreeMap<RenderTargetId, TargetStatus>,
    next_target: u32,
    max_dimension: u32,
    max_attachments: u32,
    pending_errors: Vec<DeviceError>,
    fail_compile: Option<ProgramKind>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::with_limits(8192, 8)
    }

    pub fn with_limits(max_dimension: u32, max_attachments: u32) -> Self {
        Self {
            commands: Vec::new(),
            programs: Vec::new(),
            meshes: Vec::new(),
            targets: BTreeMap::new(),
            next_target: 1,
            max_dimension,
            max_attachments,
            pending_errors: Vec::new(),
            fail_compile: None,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn program_kinds(&self) -> &[ProgramKind] {
        &self.programs
    }

    /// Targets created and not yet released.
    pub fn live_targets(&self) -> Vec<RenderTargetId> {
        self.targets.keys().copied().collect()
    }

    /// Queue an error for the next [`poll_error`](GraphicsDevice::poll_error).
    pub fn inject_error(&mut self, error: DeviceError) {
        self.pending_errors.push(error);
    }

    /// Make compiling `kind` fail.
    pub fn fail_compile(&mut self, kind: ProgramKind) {
        self.fail_compile = Some(kind);
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, Command::DrawMesh(_)))
            .count()
    }

    /// Every recorded uniform upload with the given program input name.
    pub fn uniforms_named(&self, name: &str) -> Vec<Uniform> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetUniform(u) if u.name() == name => Some(*u),
                _ => None,
            })
            .collect()
    }

    /// Human-readable listing of the recorded stream.
    pub fn trace(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Command trace ({} commands, {} targets, {} meshes) ===",
            self.commands.len(),
            self.targets.len(),
            self.meshes.len()
        );
        for command in &self.commands {
            let _ = writeln!(out, "  {}", describe(command));
        }
        out
    }

    fn check_target(&mut self, id: RenderTargetId) {
        if !self.targets.contains_key(&id) {
            self.pending_errors.push(DeviceError::UnknownTarget(id));
        }
    }
}

impl GraphicsDevice for RecordingDevice {
    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, DeviceError> {
        if self.fail_compile == Some(kind) {
            return Err(DeviceError::Compile {
                kind,
                message: "compilation disabled on recording device".into(),
            });
        }
        self.programs.push(kind);
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshId, DeviceError> {
        if mesh.indices.iter().any(|&i| i as usize >= mesh.vertices.len()) {
            return Err(DeviceError::Upload("index out of range".into()));
        }
        self.meshes.push(mesh.triangle_count());
        Ok(MeshId(self.meshes.len() as u32 - 1))
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDesc,
    ) -> Result<RenderTargetId, DeviceError> {
        let id = RenderTargetId(self.next_target);
        self.next_target += 1;
        let status = validate_target(desc, self.max_dimension, self.max_attachments);
        self.targets.insert(id, status);
        Ok(id)
    }

    fn target_status(&self, id: RenderTargetId) -> TargetStatus {
        match self.targets.get(&id) {
            Some(status) => status.clone(),
            None => {
                TargetStatus::Incomplete(IncompleteReason::Backend(format!("unknown target {}", id.0)))
            }
        }
    }

    fn release_render_target(&mut self, id: RenderTargetId) {
        self.targets.remove(&id);
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::BindTarget(Framebuffer::Offscreen(id))
            | Command::BindAttachment { target: id, .. }
            | Command::BlitDepth { from: id, .. } => self.check_target(id),
            _ => {}
        }
        self.commands.push(command);
    }

    fn poll_error(&mut self) -> Option<DeviceError> {
        if self.pending_errors.is_empty() {
            None
        } else {
            Some(self.pending_errors.remove(0))
        }
    }
}

fn describe(command: &Command) -> String {
    match command {
        Command::UseProgram(id) => format!("use_program #{}", id.0),
        Command::BindTarget(Framebuffer::Offscreen(id)) => {
            format!("bind_target offscreen #{}", id.0)
        }
        Command::BindTarget(Framebuffer::Default) => "bind_target default".into(),
        Command::Clear { color, depth } => format!(
            "clear color=({:.2}, {:.2}, {:.2}, {:.2}) depth={depth:.2}",
            color[0], color[1], color[2], color[3]
        ),
        Command::SetUniform(u) => match u {
            Uniform::Light { field, .. } => match field {
                LightField::Position(v) | LightField::Color(v) => {
                    format!("set {} = ({:.3}, {:.3}, {:.3})", u.name(), v.x, v.y, v.z)
                }
                LightField::Constant(x)
                | LightField::Linear(x)
                | LightField::Quadratic(x)
                | LightField::Radius(x) => format!("set {} = {x:.4}", u.name()),
            },
            Uniform::Mode(x) | Uniform::LightCount(x) => format!("set {} = {x}", u.name()),
            Uniform::Shininess(x) => format!("set {} = {x:.1}", u.name()),
            Uniform::Diffuse(v)
            | Uniform::Specular(v)
            | Uniform::EyePos(v)
            | Uniform::LightPos(v)
            | Uniform::VolumeColor(v) => {
                format!("set {} = ({:.3}, {:.3}, {:.3})", u.name(), v.x, v.y, v.z)
            }
            Uniform::WorldProj(_)
            | Uniform::WorldView(_)
            | Uniform::WorldInverse(_)
            | Uniform::ModelTr(_) => format!("set {}", u.name()),
        },
        Command::BindAttachment {
            unit,
            target,
            attachment,
        } => format!(
            "bind_attachment unit={unit} {} <- #{}",
            attachment.sampler_name(),
            target.0
        ),
        Command::UnbindAttachment { unit } => format!("unbind_attachment unit={unit}"),
        Command::SetRasterState(state) => format!(
            "raster depth_test={} blend={} cull={} wireframe={}",
            state.depth_test,
            match state.blend {
                BlendMode::Replace => "replace",
                BlendMode::Additive => "additive",
            },
            state.cull_faces,
            state.wireframe
        ),
        Command::DrawMesh(mesh) => format!("draw {:?}", mesh),
        Command::BlitDepth {
            from,
            width,
            height,
        } => format!("blit_depth #{} {width}x{height}", from.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferlight_scene::MeshHandle;

    #[test]
    fn records_in_order() {
        let mut device = RecordingDevice::new();
        let program = device.compile_program(ProgramKind::Geometry).unwrap();
        let mesh = device.upload_mesh(&MeshData::cube()).unwrap();
        device.execute(Command::UseProgram(program));
        device.execute(Command::DrawMesh(MeshHandle::Primitive(mesh)));

        assert_eq!(device.commands().len(), 2);
        assert_eq!(device.draw_count(), 1);
        assert!(device.poll_error().is_none());
        let trace = device.trace();
        assert!(trace.contains("use_program #0"));
        assert!(trace.contains("draw Primitive"));
    }

    #[test]
    fn simulated_completeness() {
        let mut device = RecordingDevice::with_limits(1024, 8);
        let ok = device
            .create_render_target(&RenderTargetDesc::gbuffer(640, 480))
            .unwrap();
        let zero = device
            .create_render_target(&RenderTargetDesc::gbuffer(0, 480))
            .unwrap();
        let big = device
            .create_render_target(&RenderTargetDesc::gbuffer(2048, 480))
            .unwrap();
        assert!(device.target_status(ok).is_complete());
        assert_eq!(
            device.target_status(zero),
            TargetStatus::Incomplete(IncompleteReason::ZeroSize)
        );
        assert_eq!(
            device.target_status(big),
            TargetStatus::Incomplete(IncompleteReason::TooLarge { max: 1024 })
        );
    }

    #[test]
    fn unknown_target_raises_error() {
        let mut device = RecordingDevice::new();
        device.execute(Command::BindTarget(Framebuffer::Offscreen(RenderTargetId(99))));
        assert_eq!(
            device.poll_error(),
            Some(DeviceError::UnknownTarget(RenderTargetId(99)))
        );
        assert!(device.poll_error().is_none());
    }

    #[test]
    fn injected_errors_surface_once() {
        let mut device = RecordingDevice::new();
        device.inject_error(DeviceError::Lost("gone".into()));
        assert!(matches!(device.poll_error(), Some(DeviceError::Lost(_))));
        assert!(device.poll_error().is_none());
    }

    #[test]
    fn compile_failure() {
        let mut device = RecordingDevice::new();
        device.fail_compile(ProgramKind::Lighting);
        assert!(device.compile_program(ProgramKind::Geometry).is_ok());
        assert!(matches!(
            device.compile_program(ProgramKind::Lighting),
            Err(DeviceError::Compile { .. })
        ));
    }
}
