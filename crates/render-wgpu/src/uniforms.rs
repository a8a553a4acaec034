use bytemuck::{Pod, Zeroable};
use deferlight_render::{DeviceError, LightField, Uniform};
use deferlight_scene::{MAX_LIGHTS, Vertex};
use glam::{Mat4, Vec3};

/// One entry of the light array. `attenuation` packs constant, linear,
/// quadratic and radius.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct LightData {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub attenuation: [f32; 4],
}

/// Per-pass values, bound at group 0.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct GlobalsUniform {
    pub world_proj: [[f32; 4]; 4],
    pub world_view: [[f32; 4]; 4],
    pub world_inverse: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub light_pos: [f32; 4],
    /// x = mode, y = light count.
    pub params: [u32; 4],
    pub lights: [LightData; MAX_LIGHTS],
}

/// Per-draw values, bound at group 1.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct DrawUniform {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub diffuse: [f32; 4],
    /// w = shininess.
    pub specular: [f32; 4],
    pub volume_color: [f32; 4],
}

impl Default for GlobalsUniform {
    fn default() -> Self {
        let mut globals = Self::zeroed();
        globals.world_proj = Mat4::IDENTITY.to_cols_array_2d();
        globals.world_view = Mat4::IDENTITY.to_cols_array_2d();
        globals.world_inverse = Mat4::IDENTITY.to_cols_array_2d();
        globals
    }
}

impl Default for DrawUniform {
    fn default() -> Self {
        let mut draw = Self::zeroed();
        draw.model = Mat4::IDENTITY.to_cols_array_2d();
        draw.normal_matrix = Mat4::IDENTITY.to_cols_array_2d();
        draw
    }
}

/// Vertex as laid out in GPU buffers, matching the shared attribute slots.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(crate) struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl From<&Vertex> for GpuVertex {
    fn from(v: &Vertex) -> Self {
        Self {
            position: v.position,
            normal: v.normal,
            uv: v.uv,
        }
    }
}

/// Which uniform block a [`Uniform`] landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
    Globals,
    Draw,
}

fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

/// Write `uniform` into the block that holds it.
pub(crate) fn apply_uniform(
    uniform: &Uniform,
    globals: &mut GlobalsUniform,
    draw: &mut DrawUniform,
) -> Result<Block, DeviceError> {
    match *uniform {
        Uniform::WorldProj(m) => globals.world_proj = m.to_cols_array_2d(),
        Uniform::WorldView(m) => globals.world_view = m.to_cols_array_2d(),
        Uniform::WorldInverse(m) => globals.world_inverse = m.to_cols_array_2d(),
        Uniform::EyePos(v) => globals.eye = vec4(v, 1.0),
        Uniform::LightPos(v) => globals.light_pos = vec4(v, 1.0),
        Uniform::Mode(mode) => globals.params[0] = mode,
        Uniform::LightCount(count) => {
            if count as usize > MAX_LIGHTS {
                return Err(DeviceError::Backend(format!(
                    "lightCount {count} exceeds the {MAX_LIGHTS}-entry light array"
                )));
            }
            globals.params[1] = count;
        }
        Uniform::Light { index, field } => {
            let light = globals.lights.get_mut(index as usize).ok_or_else(|| {
                DeviceError::Backend(format!("light index {index} out of range"))
            })?;
            match field {
                LightField::Position(v) => light.position = vec4(v, 1.0),
                LightField::Color(v) => light.color = vec4(v, 1.0),
                LightField::Constant(x) => light.attenuation[0] = x,
                LightField::Linear(x) => light.attenuation[1] = x,
                LightField::Quadratic(x) => light.attenuation[2] = x,
                LightField::Radius(x) => light.attenuation[3] = x,
            }
        }
        Uniform::ModelTr(m) => {
            draw.model = m.to_cols_array_2d();
            draw.normal_matrix = m.inverse().transpose().to_cols_array_2d();
            return Ok(Block::Draw);
        }
        Uniform::Diffuse(v) => {
            draw.diffuse = vec4(v, 1.0);
            return Ok(Block::Draw);
        }
        Uniform::Specular(v) => {
            let shininess = draw.specular[3];
            draw.specular = vec4(v, shininess);
            return Ok(Block::Draw);
        }
        Uniform::Shininess(x) => {
            draw.specular[3] = x;
            return Ok(Block::Draw);
        }
        Uniform::VolumeColor(v) => {
            draw.volume_color = vec4(v, 1.0);
            return Ok(Block::Draw);
        }
    }
    Ok(Block::Globals)
}

/// Round `size` up to a multiple of `alignment`.
pub(crate) fn align_to(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<LightData>(), 48);
        assert_eq!(std::mem::size_of::<GlobalsUniform>(), 240 + 48 * MAX_LIGHTS);
        assert_eq!(std::mem::size_of::<DrawUniform>(), 176);
        assert_eq!(std::mem::size_of::<GpuVertex>(), 32);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_to(3312, 256), 3328);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1, 256), 256);
    }

    #[test]
    fn uniforms_route_to_their_block() {
        let mut g = GlobalsUniform::default();
        let mut d = DrawUniform::default();
        let light = Uniform::Light {
            index: 2,
            field: LightField::Radius(4.5),
        };
        assert_eq!(apply_uniform(&light, &mut g, &mut d), Ok(Block::Globals));
        assert_eq!(g.lights[2].attenuation[3], 4.5);

        let model = Mat4::from_scale(Vec3::splat(2.0));
        assert_eq!(
            apply_uniform(&Uniform::ModelTr(model), &mut g, &mut d),
            Ok(Block::Draw)
        );
        assert_eq!(d.normal_matrix[0][0], 0.5);

        apply_uniform(&Uniform::Shininess(32.0), &mut g, &mut d).unwrap();
        apply_uniform(&Uniform::Specular(Vec3::ONE), &mut g, &mut d).unwrap();
        assert_eq!(d.specular, [1.0, 1.0, 1.0, 32.0]);
    }

    #[test]
    fn light_array_bounds() {
        let mut g = GlobalsUniform::default();
        let mut d = DrawUniform::default();
        let out_of_range = Uniform::Light {
            index: MAX_LIGHTS as u32,
            field: LightField::Constant(1.0),
        };
        assert!(apply_uniform(&out_of_range, &mut g, &mut d).is_err());
        assert!(apply_uniform(&Uniform::LightCount(65), &mut g, &mut d).is_err());
        assert!(apply_uniform(&Uniform::LightCount(64), &mut g, &mut d).is_ok());
    }
}
