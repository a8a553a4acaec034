use deferlight_scene::{MeshHandle, SceneGraph};
use serde::{Deserialize, Serialize};

use crate::command::{Command, Framebuffer, LightField, ProgramId, RasterState, Uniform};
use crate::device::GraphicsDevice;
use crate::error::RenderError;
use crate::frame::FrameContext;
use crate::geometry::GeometryOutput;
use crate::target::{RenderTargetSet, TargetBinding};

/// Per-light shading radii computed for this frame, in light list order,
/// global stretch applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingOutput {
    pub radii: Vec<f32>,
}

/// Shades every pixel of the default target from the G-buffer with one
/// full-screen quad, then copies the G-buffer depth across so later
/// forward draws depth-test against the scene.
#[derive(Debug, Clone, Copy)]
pub struct LightingPass {
    program: ProgramId,
    quad: MeshHandle,
}

impl LightingPass {
    pub fn new(program: ProgramId, quad: MeshHandle) -> Self {
        Self { program, quad }
    }

    pub fn run(
        &self,
        device: &mut dyn GraphicsDevice,
        target: &mut RenderTargetSet,
        geometry: &GeometryOutput,
        scene: &SceneGraph,
        ctx: &FrameContext,
    ) -> Result<LightingOutput, RenderError> {
        if geometry.frame != ctx.frame || geometry.target != target.id() {
            return Err(RenderError::StaleGeometry {
                expected: ctx.frame,
                found: geometry.frame,
                target: geometry.target,
            });
        }
        if target.binding() == TargetBinding::Write {
            return Err(RenderError::TargetBoundForWrite);
        }
        let _span = tracing::debug_span!("lighting_pass", frame = ctx.frame).entered();

        device.execute(Command::BindTarget(Framebuffer::Default));
        device.execute(Command::Clear {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
        });
        device.execute(Command::UseProgram(self.program));
        device.execute(Command::SetRasterState(RasterState::OPAQUE));

        let view = &ctx.view;
        for uniform in [
            Uniform::WorldProj(view.projection),
            Uniform::WorldView(view.view),
            Uniform::WorldInverse(view.inverse_view),
            Uniform::EyePos(view.eye),
            Uniform::LightPos(ctx.settings.key_light.position()),
            Uniform::Mode(ctx.settings.mode.0),
        ] {
            device.execute(Command::SetUniform(uniform));
        }

        target.bind_for_read(device)?;

        let lights = scene.lights();
        device.execute(Command::SetUniform(Uniform::LightCount(lights.len() as u32)));
        let mut radii = Vec::with_capacity(lights.len());
        for (i, light) in lights.iter().enumerate() {
            let radius = lights.radius(i).unwrap_or(0.0);
            let a = light.attenuation;
            for field in [
                LightField::Position(light.position),
                LightField::Color(light.color),
                LightField::Constant(a.constant),
                LightField::Linear(a.linear),
                LightField::Quadratic(a.quadratic),
                LightField::Radius(radius),
            ] {
                device.execute(Command::SetUniform(Uniform::Light {
                    index: i as u32,
                    field,
                }));
            }
            radii.push(radius);
        }

        device.execute(Command::DrawMesh(self.quad));
        target.release_read(device);

        device.execute(Command::BlitDepth {
            from: target.id(),
            width: target.width(),
            height: target.height(),
        });
        device.execute(Command::BindTarget(Framebuffer::Default));

        tracing::debug!(lights = radii.len(), "lighting pass done");
        Ok(LightingOutput { radii })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::GBufferAttachment;
    use crate::recording::RecordingDevice;
    use crate::test_support::context;
    use deferlight_scene::{Attenuation, GLOBAL_RADIUS_SCALE, Light, MeshId};
    use glam::Vec3;

    const QUAD: MeshHandle = MeshHandle::Primitive(MeshId(0));

    fn setup(frame: u64) -> (RecordingDevice, RenderTargetSet, GeometryOutput) {
        let mut device = RecordingDevice::new();
        let target = RenderTargetSet::create(&mut device, 32, 16).unwrap();
        let geometry = GeometryOutput {
            frame,
            target: target.id(),
            draw_calls: 0,
        };
        (device, target, geometry)
    }

    fn lit_scene() -> SceneGraph {
        let mut scene = SceneGraph::new();
        let lights = scene.lights_mut();
        lights
            .push_local(Light::new(Vec3::X, Vec3::new(1.0, 0.5, 0.5), Attenuation::default()))
            .unwrap();
        lights
            .set_global(Light::new(
                Vec3::ZERO,
                Vec3::new(1.0, 1.0, 0.8),
                Attenuation::default(),
            ))
            .unwrap();
        scene
    }

    #[test]
    fn zero_lights_still_shades() {
        let (mut device, mut target, geometry) = setup(1);
        let out = LightingPass::new(ProgramId(1), QUAD)
            .run(&mut device, &mut target, &geometry, &SceneGraph::new(), &context(1))
            .unwrap();

        assert!(out.radii.is_empty());
        assert_eq!(
            device.uniforms_named("lightCount"),
            vec![Uniform::LightCount(0)]
        );
        assert!(
            !device
                .commands()
                .iter()
                .any(|c| matches!(c, Command::SetUniform(Uniform::Light { .. })))
        );
        assert_eq!(device.draw_count(), 1);
    }

    #[test]
    fn uploads_every_light_with_radius() {
        let (mut device, mut target, geometry) = setup(4);
        let scene = lit_scene();
        let out = LightingPass::new(ProgramId(1), QUAD)
            .run(&mut device, &mut target, &geometry, &scene, &context(4))
            .unwrap();

        let local = scene.lights().get(0).unwrap().cutoff_radius();
        let global = scene.lights().get(1).unwrap().cutoff_radius() * GLOBAL_RADIUS_SCALE;
        assert_eq!(out.radii.len(), 2);
        assert!((out.radii[0] - local).abs() < 1e-5);
        assert!((out.radii[1] - global).abs() < 1e-4);
        assert_eq!(
            device.uniforms_named("lights[1].Radius"),
            vec![Uniform::Light {
                index: 1,
                field: LightField::Radius(out.radii[1]),
            }]
        );
        assert_eq!(device.uniforms_named("lights[0].Linear").len(), 1);
    }

    #[test]
    fn quad_drawn_once_between_bind_and_release() {
        let (mut device, mut target, geometry) = setup(2);
        LightingPass::new(ProgramId(1), QUAD)
            .run(&mut device, &mut target, &geometry, &lit_scene(), &context(2))
            .unwrap();

        let commands = device.commands();
        let last_bind = commands
            .iter()
            .rposition(|c| {
                matches!(
                    c,
                    Command::BindAttachment {
                        attachment: GBufferAttachment::Specular,
                        ..
                    }
                )
            })
            .unwrap();
        let draw = commands
            .iter()
            .position(|c| *c == Command::DrawMesh(QUAD))
            .unwrap();
        let first_unbind = commands
            .iter()
            .position(|c| matches!(c, Command::UnbindAttachment { .. }))
            .unwrap();
        let blit = commands
            .iter()
            .position(|c| matches!(c, Command::BlitDepth { .. }))
            .unwrap();
        assert!(last_bind < draw && draw < first_unbind && first_unbind < blit);
        assert_eq!(device.draw_count(), 1);
        assert_eq!(
            commands[blit],
            Command::BlitDepth {
                from: target.id(),
                width: 32,
                height: 16,
            }
        );
        assert_eq!(target.binding(), TargetBinding::Unbound);
    }

    #[test]
    fn stale_geometry_rejected() {
        let (mut device, mut target, geometry) = setup(1);
        let result = LightingPass::new(ProgramId(1), QUAD).run(
            &mut device,
            &mut target,
            &geometry,
            &SceneGraph::new(),
            &context(2),
        );
        assert!(matches!(
            result,
            Err(RenderError::StaleGeometry {
                expected: 2,
                found: 1,
                ..
            })
        ));
        assert!(device.commands().is_empty());
    }

    #[test]
    fn target_still_bound_for_write_rejected() {
        let (mut device, mut target, geometry) = setup(1);
        target.bind(&mut device).unwrap();
        let result = LightingPass::new(ProgramId(1), QUAD).run(
            &mut device,
            &mut target,
            &geometry,
            &SceneGraph::new(),
            &context(1),
        );
        assert_eq!(result, Err(RenderError::TargetBoundForWrite));
    }
}
