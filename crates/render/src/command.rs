use deferlight_scene::MeshHandle;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Handle to a compiled shading program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramId(pub u32);

/// The three programs the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramKind {
    Geometry,
    Lighting,
    LightVolume,
}

/// Handle to an off-screen render target created on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RenderTargetId(pub u32);

/// Where draws land: an off-screen target or the window's default target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framebuffer {
    Offscreen(RenderTargetId),
    Default,
}

/// The four G-buffer color attachments, in attachment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GBufferAttachment {
    Position,
    Normal,
    Diffuse,
    Specular,
}

impl GBufferAttachment {
    pub const ALL: [GBufferAttachment; 4] = [
        GBufferAttachment::Position,
        GBufferAttachment::Normal,
        GBufferAttachment::Diffuse,
        GBufferAttachment::Specular,
    ];

    /// Fixed texture unit the lighting program samples this attachment from.
    pub fn unit(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Diffuse => 2,
            Self::Specular => 3,
        }
    }

    pub fn sampler_name(self) -> &'static str {
        match self {
            Self::Position => "gPosition",
            Self::Normal => "gNormal",
            Self::Diffuse => "gDiffuse",
            Self::Specular => "gSpecular",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    Replace,
    /// `src * 1 + dst * 1`.
    Additive,
}

/// Fixed-function state set before a group of draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RasterState {
    pub depth_test: bool,
    pub blend: BlendMode,
    pub cull_faces: bool,
    pub wireframe: bool,
}

impl RasterState {
    /// Solid, depth-tested, unblended.
    pub const OPAQUE: RasterState = RasterState {
        depth_test: true,
        blend: BlendMode::Replace,
        cull_faces: false,
        wireframe: false,
    };

    /// Additive wireframe without depth test, used for light volumes.
    pub const VOLUME: RasterState = RasterState {
        depth_test: false,
        blend: BlendMode::Additive,
        cull_faces: true,
        wireframe: true,
    };
}

/// One field of an entry in the `lights[]` uniform array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightField {
    Position(Vec3),
    Color(Vec3),
    Constant(f32),
    Linear(f32),
    Quadratic(f32),
    Radius(f32),
}

impl LightField {
    fn name(&self) -> &'static str {
        match self {
            Self::Position(_) => "Position",
            Self::Color(_) => "Color",
            Self::Constant(_) => "Constant",
            Self::Linear(_) => "Linear",
            Self::Quadratic(_) => "Quadratic",
            Self::Radius(_) => "Radius",
        }
    }
}

/// A typed uniform upload. Each variant maps to one named program input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Uniform {
    WorldProj(Mat4),
    WorldView(Mat4),
    WorldInverse(Mat4),
    ModelTr(Mat4),
    Diffuse(Vec3),
    Specular(Vec3),
    Shininess(f32),
    EyePos(Vec3),
    LightPos(Vec3),
    Mode(u32),
    LightCount(u32),
    Light { index: u32, field: LightField },
    VolumeColor(Vec3),
}

impl Uniform {
    /// Name of the program input this value is bound to.
    pub fn name(&self) -> String {
        match self {
            Self::WorldProj(_) => "WorldProj".into(),
            Self::WorldView(_) => "WorldView".into(),
            Self::WorldInverse(_) => "WorldInverse".into(),
            Self::ModelTr(_) => "ModelTr".into(),
            Self::Diffuse(_) => "diffuse".into(),
            Self::Specular(_) => "specular".into(),
            Self::Shininess(_) => "shininess".into(),
            Self::EyePos(_) => "eyePos".into(),
            Self::LightPos(_) => "lightPos".into(),
            Self::Mode(_) => "mode".into(),
            Self::LightCount(_) => "lightCount".into(),
            Self::Light { index, field } => format!("lights[{index}].{}", field.name()),
            Self::VolumeColor(_) => "volumeColor".into(),
        }
    }
}

/// The device command stream. Commands are enqueued in order and never
/// block the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    UseProgram(ProgramId),
    BindTarget(Framebuffer),
    Clear { color: [f32; 4], depth: f32 },
    SetUniform(Uniform),
    BindAttachment {
        unit: u32,
        target: RenderTargetId,
        attachment: GBufferAttachment,
    },
    UnbindAttachment { unit: u32 },
    SetRasterState(RasterState),
    DrawMesh(MeshHandle),
    /// Copy depth from an off-screen target into the default target.
    BlitDepth {
        from: RenderTargetId,
        width: u32,
        height: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_uniform_names() {
        let u = Uniform::Light {
            index: 3,
            field: LightField::Radius(2.0),
        };
        assert_eq!(u.name(), "lights[3].Radius");
        assert_eq!(Uniform::EyePos(Vec3::ZERO).name(), "eyePos");
    }

    #[test]
    fn attachment_units_are_fixed() {
        let units: Vec<u32> = GBufferAttachment::ALL.iter().map(|a| a.unit()).collect();
        assert_eq!(units, vec![0, 1, 2, 3]);
        assert_eq!(GBufferAttachment::Specular.sampler_name(), "gSpecular");
    }
}
