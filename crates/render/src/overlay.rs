use deferlight_common::uniform_scale;
use deferlight_scene::{GLOBAL_MARKER_SCALE, MeshHandle, SceneGraph};
use glam::Mat4;

use crate::command::{Command, ProgramId, RasterState, Uniform};
use crate::device::GraphicsDevice;
use crate::frame::FrameContext;
use crate::lighting::LightingOutput;

/// Wireframe debug view of light extents, drawn additively over the lit
/// image. Local lights get a sphere of their shading radius when enabled;
/// the global light always gets a small fixed marker.
#[derive(Debug, Clone, Copy)]
pub struct LightVolumeOverlay {
    program: ProgramId,
    volume: MeshHandle,
}

impl LightVolumeOverlay {
    pub fn new(program: ProgramId, volume: MeshHandle) -> Self {
        Self { program, volume }
    }

    /// Returns the number of volumes drawn.
    pub fn run(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &SceneGraph,
        lighting: &LightingOutput,
        ctx: &FrameContext,
    ) -> usize {
        let _span = tracing::debug_span!("light_volumes", frame = ctx.frame).entered();

        device.execute(Command::UseProgram(self.program));
        device.execute(Command::SetRasterState(RasterState::VOLUME));
        device.execute(Command::SetUniform(Uniform::WorldProj(ctx.view.projection)));
        device.execute(Command::SetUniform(Uniform::WorldView(ctx.view.view)));

        let lights = scene.lights();
        let mut drawn = 0;
        for (i, light) in lights.iter().enumerate() {
            let scale = if lights.is_global(i) {
                GLOBAL_MARKER_SCALE
            } else if ctx.settings.show_local_lights {
                let radius = lighting.radii.get(i).copied().unwrap_or(0.0);
                if !radius.is_finite() || radius <= 0.0 {
                    tracing::debug!(light = i, radius, "skipping light volume");
                    continue;
                }
                radius
            } else {
                continue;
            };
            let model = Mat4::from_translation(light.position) * uniform_scale(scale);
            device.execute(Command::SetUniform(Uniform::ModelTr(model)));
            device.execute(Command::SetUniform(Uniform::VolumeColor(light.color)));
            device.execute(Command::DrawMesh(self.volume));
            drawn += 1;
        }

        device.execute(Command::SetRasterState(RasterState::OPAQUE));
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingDevice;
    use crate::settings::FrameSettings;
    use crate::test_support::{context, context_with};
    use deferlight_scene::{Attenuation, Light, MeshId};
    use glam::Vec3;

    const VOLUME: MeshHandle = MeshHandle::Primitive(MeshId(5));

    fn scene(locals: usize) -> SceneGraph {
        let mut scene = SceneGraph::new();
        scene
            .lights_mut()
            .seed_local(locals, 13, Attenuation::default())
            .unwrap();
        scene
            .lights_mut()
            .set_global(Light::new(
                Vec3::new(1.0, 2.0, 3.0),
                Vec3::ONE,
                Attenuation::default(),
            ))
            .unwrap();
        scene
    }

    fn output(scene: &SceneGraph) -> LightingOutput {
        LightingOutput {
            radii: scene.lights().radii(),
        }
    }

    #[test]
    fn global_marker_only_by_default() {
        let scene = scene(4);
        let mut device = RecordingDevice::new();
        let drawn = LightVolumeOverlay::new(ProgramId(2), VOLUME).run(
            &mut device,
            &scene,
            &output(&scene),
            &context(1),
        );

        assert_eq!(drawn, 1);
        let expected =
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)) * uniform_scale(GLOBAL_MARKER_SCALE);
        assert_eq!(
            device.uniforms_named("ModelTr"),
            vec![Uniform::ModelTr(expected)]
        );
        assert_eq!(
            device.commands().last(),
            Some(&Command::SetRasterState(RasterState::OPAQUE))
        );
    }

    #[test]
    fn local_volumes_scaled_by_radius() {
        let scene = scene(4);
        let lighting = output(&scene);
        let mut device = RecordingDevice::new();
        let settings = FrameSettings {
            show_local_lights: true,
            ..FrameSettings::default()
        };
        let drawn = LightVolumeOverlay::new(ProgramId(2), VOLUME).run(
            &mut device,
            &scene,
            &lighting,
            &context_with(1, settings),
        );

        assert_eq!(drawn, 5);
        let first = scene.lights().get(0).unwrap();
        let expected = Mat4::from_translation(first.position) * uniform_scale(lighting.radii[0]);
        assert_eq!(device.uniforms_named("ModelTr")[0], Uniform::ModelTr(expected));
        assert_eq!(
            device.commands()[1],
            Command::SetRasterState(RasterState::VOLUME)
        );
    }

    #[test]
    fn degenerate_radii_skipped() {
        let scene = scene(3);
        let lighting = LightingOutput {
            radii: vec![f32::INFINITY, 0.0, f32::NAN, 1.0],
        };
        let mut device = RecordingDevice::new();
        let settings = FrameSettings {
            show_local_lights: true,
            ..FrameSettings::default()
        };
        let drawn = LightVolumeOverlay::new(ProgramId(2), VOLUME).run(
            &mut device,
            &scene,
            &lighting,
            &context_with(1, settings),
        );
        assert_eq!(drawn, 1);
        assert_eq!(device.draw_count(), 1);
    }
}
