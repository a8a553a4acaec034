use deferlight_common::Material;
use deferlight_scene::{DrawSink, MeshHandle, SceneGraph};
use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::command::{Command, ProgramId, RasterState, RenderTargetId, Uniform};
use crate::device::{GraphicsDevice, TargetStatus};
use crate::error::RenderError;
use crate::frame::FrameContext;
use crate::target::RenderTargetSet;

/// Proof that the geometry pass filled a target during a given frame. The
/// lighting pass refuses to run without a matching one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryOutput {
    pub frame: u64,
    pub target: RenderTargetId,
    pub draw_calls: usize,
}

/// Forwards scene draws to the bound geometry program.
struct ProgramSink<'a> {
    device: &'a mut dyn GraphicsDevice,
    draws: usize,
}

impl DrawSink for ProgramSink<'_> {
    fn draw(&mut self, world: &Mat4, mesh: &MeshHandle, material: &Material) {
        self.device.execute(Command::SetUniform(Uniform::ModelTr(*world)));
        self.device.execute(Command::SetUniform(Uniform::Diffuse(material.diffuse)));
        self.device.execute(Command::SetUniform(Uniform::Specular(material.specular)));
        self.device.execute(Command::SetUniform(Uniform::Shininess(material.shininess)));
        self.device.execute(Command::DrawMesh(*mesh));
        self.draws += 1;
    }
}

/// Rasterizes the scene into the G-buffer.
#[derive(Debug, Clone, Copy)]
pub struct GeometryPass {
    program: ProgramId,
}

impl GeometryPass {
    pub fn new(program: ProgramId) -> Self {
        Self { program }
    }

    pub fn run(
        &self,
        device: &mut dyn GraphicsDevice,
        target: &mut RenderTargetSet,
        scene: &SceneGraph,
        ctx: &FrameContext,
    ) -> Result<GeometryOutput, RenderError> {
        if let TargetStatus::Incomplete(reason) = target.status() {
            return Err(RenderError::TargetIncomplete {
                target: target.id(),
                reason: reason.clone(),
            });
        }
        let _span = tracing::debug_span!("geometry_pass", frame = ctx.frame).entered();

        device.execute(Command::UseProgram(self.program));
        device.execute(Command::SetRasterState(RasterState::OPAQUE));
        target.bind(device)?;
        device.execute(Command::Clear {
            color: [0.0, 0.0, 0.0, 0.0],
            depth: 1.0,
        });
        device.execute(Command::SetUniform(Uniform::WorldProj(ctx.view.projection)));
        device.execute(Command::SetUniform(Uniform::WorldView(ctx.view.view)));

        let mut sink = ProgramSink {
            device: &mut *device,
            draws: 0,
        };
        scene.draw(&mut sink, Mat4::IDENTITY);
        let draw_calls = sink.draws;

        target.unbind(device);
        tracing::debug!(draw_calls, "geometry pass done");

        Ok(GeometryOutput {
            frame: ctx.frame,
            target: target.id(),
            draw_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Framebuffer;
    use crate::recording::RecordingDevice;
    use crate::test_support::context;
    use deferlight_common::uniform_scale;
    use deferlight_scene::{MeshId, SceneNode};

    fn single_mesh_scene() -> SceneGraph {
        let mut scene = SceneGraph::new();
        let root = scene.create_node(SceneNode::group());
        let child = scene.create_node(SceneNode::mesh(
            MeshHandle::Primitive(MeshId(0)),
            Material::default(),
        ));
        scene.add_root(root, Mat4::IDENTITY).unwrap();
        scene.add(root, child, uniform_scale(10.0)).unwrap();
        scene
    }

    #[test]
    fn single_child_draws_once_with_scaled_model() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        let pass = GeometryPass::new(ProgramId(0));

        let out = pass
            .run(&mut device, &mut target, &single_mesh_scene(), &context(1))
            .unwrap();

        assert_eq!(out.draw_calls, 1);
        assert_eq!(out.frame, 1);
        assert_eq!(device.draw_count(), 1);
        assert_eq!(
            device.uniforms_named("ModelTr"),
            vec![Uniform::ModelTr(uniform_scale(10.0))]
        );
    }

    #[test]
    fn command_order() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        GeometryPass::new(ProgramId(0))
            .run(&mut device, &mut target, &single_mesh_scene(), &context(1))
            .unwrap();

        let commands = device.commands();
        assert_eq!(commands[0], Command::UseProgram(ProgramId(0)));
        assert_eq!(commands[1], Command::SetRasterState(RasterState::OPAQUE));
        assert_eq!(
            commands[2],
            Command::BindTarget(Framebuffer::Offscreen(target.id()))
        );
        assert!(matches!(commands[3], Command::Clear { depth, .. } if depth == 1.0));
        assert_eq!(
            commands.last(),
            Some(&Command::BindTarget(Framebuffer::Default))
        );
        assert_eq!(target.binding(), crate::target::TargetBinding::Unbound);
    }

    #[test]
    fn empty_scene_draws_nothing() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        let out = GeometryPass::new(ProgramId(0))
            .run(&mut device, &mut target, &SceneGraph::new(), &context(3))
            .unwrap();
        assert_eq!(out.draw_calls, 0);
        assert_eq!(device.draw_count(), 0);
    }

    #[test]
    fn incomplete_target_rejected() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 0, 0).unwrap();
        let result = GeometryPass::new(ProgramId(0)).run(
            &mut device,
            &mut target,
            &single_mesh_scene(),
            &context(1),
        );
        assert!(matches!(result, Err(RenderError::TargetIncomplete { .. })));
        assert!(device.commands().is_empty());
    }
}
