use deferlight_common::{Axis, rotate, translate};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::settings::ShadingMode;

/// Size of the default render target in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height; 1.0 for a degenerate (minimised) viewport.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Frustum parameters. `ry` is the tangent of half the vertical field of view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub ry: f32,
    pub front: f32,
    pub back: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            ry: 0.4,
            front: 0.5,
            back: 5000.0,
        }
    }
}

/// Far plane used by shading mode 0.
const MODE_ZERO_FAR: f32 = 1000.0;

impl Projection {
    pub fn matrix(&self, aspect: f32, mode: ShadingMode) -> Mat4 {
        let far = if mode.0 == 0 { MODE_ZERO_FAR } else { self.back };
        Mat4::perspective_rh(2.0 * self.ry.atan(), aspect, self.front, far)
    }
}

/// Camera navigation models. Z is up in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Camera {
    /// Orbit the origin: `spin` about Z, `tilt` from the horizon, then
    /// pulled back along the view axis by `translation.z`.
    Orbit {
        spin: f32,
        tilt: f32,
        translation: Vec3,
    },
    FirstPerson { eye: Vec3, spin: f32, tilt: f32 },
}

impl Default for Camera {
    fn default() -> Self {
        Self::Orbit {
            spin: 0.0,
            tilt: 30.0,
            translation: Vec3::new(0.0, 0.0, 25.0),
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        match *self {
            Self::Orbit {
                spin,
                tilt,
                translation: t,
            } => {
                translate(t.x, t.y, -t.z)
                    * rotate(Axis::X, tilt - 90.0)
                    * rotate(Axis::Z, spin)
            }
            Self::FirstPerson { eye, spin, tilt } => {
                rotate(Axis::X, tilt - 90.0)
                    * rotate(Axis::Z, spin)
                    * translate(-eye.x, -eye.y, -eye.z)
            }
        }
    }

    /// Adjust spin and tilt in degrees. Tilt is clamped to ±90°.
    pub fn rotate(&mut self, d_spin: f32, d_tilt: f32) {
        match self {
            Self::Orbit { spin, tilt, .. } | Self::FirstPerson { spin, tilt, .. } => {
                *spin += d_spin;
                *tilt = (*tilt + d_tilt).clamp(-90.0, 90.0);
            }
        }
    }

    /// Scale the orbit distance; first-person cameras ignore zoom.
    pub fn zoom(&mut self, factor: f32) {
        if let Self::Orbit { translation, .. } = self {
            translation.z = (translation.z * factor).max(0.5);
        }
    }
}

/// Camera matrices computed once per frame and shared by every pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub view: Mat4,
    pub projection: Mat4,
    pub inverse_view: Mat4,
    /// World-space camera position.
    pub eye: Vec3,
}

impl ViewState {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let inverse_view = view.inverse();
        Self {
            view,
            projection,
            inverse_view,
            eye: inverse_view.w_axis.truncate(),
        }
    }

    pub fn from_camera(
        camera: &Camera,
        projection: &Projection,
        viewport: Viewport,
        mode: ShadingMode,
    ) -> Self {
        Self::new(
            camera.view_matrix(),
            projection.matrix(viewport.aspect(), mode),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_orbit_eye_is_above_the_floor() {
        let view = ViewState::from_camera(
            &Camera::default(),
            &Projection::default(),
            Viewport::new(800, 600),
            ShadingMode(1),
        );
        assert!((view.eye.length() - 25.0).abs() < 1e-3);
        assert!(view.eye.z > 0.0);
        assert!(view.view.mul_mat4(&view.inverse_view).abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn first_person_eye_round_trips() {
        let eye = Vec3::new(1.0, -4.0, 2.0);
        let camera = Camera::FirstPerson {
            eye,
            spin: 35.0,
            tilt: 10.0,
        };
        let view = ViewState::new(camera.view_matrix(), Mat4::IDENTITY);
        assert!(view.eye.abs_diff_eq(eye, 1e-4));
    }

    #[test]
    fn mode_zero_uses_near_far_plane() {
        let p = Projection::default();
        assert_ne!(p.matrix(1.5, ShadingMode(0)), p.matrix(1.5, ShadingMode(2)));
        assert_eq!(p.matrix(1.5, ShadingMode(1)), p.matrix(1.5, ShadingMode(2)));
    }

    #[test]
    fn zero_viewport_aspect() {
        assert_eq!(Viewport::new(0, 0).aspect(), 1.0);
        assert_eq!(Viewport::new(200, 100).aspect(), 2.0);
    }

    #[test]
    fn tilt_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(10.0, 500.0);
        match camera {
            Camera::Orbit { spin, tilt, .. } => {
                assert_eq!(spin, 10.0);
                assert_eq!(tilt, 90.0);
            }
            Camera::FirstPerson { .. } => unreachable!(),
        }
    }
}
