use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Principal axis used by [`rotate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vec3 {
        match self {
            Self::X => Vec3::X,
            Self::Y => Vec3::Y,
            Self::Z => Vec3::Z,
        }
    }
}

/// Translation matrix.
pub fn translate(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, y, z))
}

/// Rotation about a principal axis, angle in degrees.
pub fn rotate(axis: Axis, degrees: f32) -> Mat4 {
    Mat4::from_axis_angle(axis.unit(), degrees.to_radians())
}

/// Non-uniform scale matrix.
pub fn scale(x: f32, y: f32, z: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(x, y, z))
}

pub fn uniform_scale(s: f32) -> Mat4 {
    scale(s, s, s)
}

/// Phong surface parameters uploaded per draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub shininess: f32,
}

impl Material {
    pub const fn new(diffuse: Vec3, specular: Vec3, shininess: f32) -> Self {
        Self {
            diffuse,
            specular,
            shininess,
        }
    }

    /// Material that contributes nothing to the G-buffer color channels.
    pub const BLACK: Self = Self::new(Vec3::ZERO, Vec3::ZERO, 0.0);
}

impl Default for Material {
    fn default() -> Self {
        Self::new(Vec3::splat(0.5), Vec3::ZERO, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn rotate_quarter_turn_about_z() {
        let p = rotate(Axis::Z, 90.0).transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn composition_is_matrix_product() {
        let m = translate(1.0, 2.0, 3.0) * scale(2.0, 2.0, 2.0);
        let p = m.transform_point3(Vec3::ONE);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 4.0, 5.0), 1e-6));
        assert!(approx(uniform_scale(2.0), scale(2.0, 2.0, 2.0)));
    }

    #[test]
    fn default_material_is_matte_grey() {
        let m = Material::default();
        assert_eq!(m.specular, Vec3::ZERO);
        assert_eq!(Material::BLACK.diffuse, Vec3::ZERO);
    }
}
