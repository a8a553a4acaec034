use glam::Vec3;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::SceneError;

/// Contribution below which a light is treated as having no effect: the
/// classic 5/256 deferred-lighting cutoff.
pub const CUTOFF_THRESHOLD: f32 = 5.0 / 256.0;

/// The global light's shading radius is stretched so it covers the scene.
pub const GLOBAL_RADIUS_SCALE: f32 = 5.0;

/// Fixed visual size of the global light's marker in the volume overlay.
pub const GLOBAL_MARKER_SCALE: f32 = 0.125;

/// Capacity of the light array uniform block.
pub const MAX_LIGHTS: usize = 64;

/// `1 / (constant + linear*d + quadratic*d^2)` falloff coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.7,
            quadratic: 1.8,
        }
    }
}

impl Attenuation {
    /// Intensity factor at distance `d`.
    pub fn intensity(&self, d: f32) -> f32 {
        1.0 / (self.constant + self.linear * d + self.quadratic * d * d)
    }

    /// Every coefficient finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [self.constant, self.linear, self.quadratic]
            .iter()
            .all(|k| k.is_finite() && *k >= 0.0)
    }
}

/// Distance at which `peak * intensity(d)` drops to [`CUTOFF_THRESHOLD`].
///
/// Returns `0.0` when the light never reaches the threshold or the
/// coefficients are invalid, and `f32::INFINITY` when it has no falloff.
pub fn cutoff_radius(peak: f32, attenuation: &Attenuation) -> f32 {
    if !attenuation.is_valid() || !peak.is_finite() {
        return 0.0;
    }
    let Attenuation {
        constant: c,
        linear: l,
        quadratic: q,
    } = *attenuation;
    let target = peak / CUTOFF_THRESHOLD;
    if target <= c {
        return 0.0;
    }
    if q == 0.0 {
        if l == 0.0 {
            return f32::INFINITY;
        }
        return (target - c) / l;
    }
    let discriminant = l * l - 4.0 * q * (c - target);
    ((-l + discriminant.sqrt()) / (2.0 * q)).max(0.0)
}

/// Point light. Its radius is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
    #[serde(default)]
    pub attenuation: Attenuation,
}

impl Light {
    pub fn new(position: Vec3, color: Vec3, attenuation: Attenuation) -> Self {
        Self {
            position,
            color,
            attenuation,
        }
    }

    /// Brightest color channel.
    pub fn peak(&self) -> f32 {
        self.color.max_element()
    }

    pub fn cutoff_radius(&self) -> f32 {
        cutoff_radius(self.peak(), &self.attenuation)
    }
}

/// Ordered light list with at most one designated global light.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightList {
    lights: Vec<Light>,
    global: Option<usize>,
}

impl LightList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Light> {
        self.lights.get(index)
    }

    pub fn global_index(&self) -> Option<usize> {
        self.global
    }

    pub fn global(&self) -> Option<&Light> {
        self.global.map(|i| &self.lights[i])
    }

    pub fn is_global(&self, index: usize) -> bool {
        self.global == Some(index)
    }

    /// Append a local light; returns its index.
    pub fn push_local(&mut self, light: Light) -> Result<usize, SceneError> {
        if self.lights.len() >= MAX_LIGHTS {
            return Err(SceneError::TooManyLights { max: MAX_LIGHTS });
        }
        self.lights.push(light);
        Ok(self.lights.len() - 1)
    }

    /// Append `light` and make it the global light, demoting any previous one.
    pub fn set_global(&mut self, light: Light) -> Result<usize, SceneError> {
        let index = self.push_local(light)?;
        self.global = Some(index);
        Ok(index)
    }

    /// Move the global light (the debug controls steer it). No-op without one.
    pub fn set_global_position(&mut self, position: Vec3) {
        if let Some(i) = self.global {
            self.lights[i].position = position;
        }
    }

    /// Shading radius of light `index`, with the global stretch applied.
    pub fn radius(&self, index: usize) -> Option<f32> {
        let light = self.lights.get(index)?;
        let r = light.cutoff_radius();
        Some(if self.is_global(index) {
            r * GLOBAL_RADIUS_SCALE
        } else {
            r
        })
    }

    /// Radii for every light, in list order.
    pub fn radii(&self) -> Vec<f32> {
        (0..self.lights.len())
            .filter_map(|i| self.radius(i))
            .collect()
    }

    /// Append `count` reproducible local lights scattered around the origin:
    /// x and z in `[-3, 3)`, y in `[-4, 2)`, each color channel in `[0.5, 1)`.
    pub fn seed_local(
        &mut self,
        count: usize,
        seed: u64,
        attenuation: Attenuation,
    ) -> Result<(), SceneError> {
        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..count {
            let position = Vec3::new(
                rng.random_range(-3.0..3.0),
                rng.random_range(-4.0..2.0),
                rng.random_range(-3.0..3.0),
            );
            let color = Vec3::new(
                rng.random_range(0.5..1.0),
                rng.random_range(0.5..1.0),
                rng.random_range(0.5..1.0),
            );
            self.push_local(Light::new(position, color, attenuation))?;
        }
        tracing::debug!(count, seed, "seeded local lights");
        Ok(())
    }
}

/// Key light placed on a sphere around the origin, forwarded to the shading
/// program as `lightPos`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyLight {
    /// Azimuth in degrees.
    pub spin: f32,
    /// Inclination from +Z in degrees.
    pub tilt: f32,
    pub distance: f32,
}

impl Default for KeyLight {
    fn default() -> Self {
        Self {
            spin: 150.0,
            tilt: -45.0,
            distance: 100.0,
        }
    }
}

impl KeyLight {
    pub fn position(&self) -> Vec3 {
        let (spin, tilt) = (self.spin.to_radians(), self.tilt.to_radians());
        Vec3::new(
            self.distance * spin.cos() * tilt.sin(),
            self.distance * spin.sin() * tilt.sin(),
            self.distance * tilt.cos(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(peak: f32, a: Attenuation) -> f32 {
        cutoff_radius(peak, &a)
    }

    #[test]
    fn reference_light_radius_hits_threshold() {
        let light = Light::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.8), Attenuation::default());
        let r = light.cutoff_radius();
        assert!(r > 0.0);
        let lhs = light.peak() * light.attenuation.intensity(r);
        assert!((lhs - 5.0 / 256.0).abs() < 1e-6, "lhs = {lhs}");

        let expected = (-0.7 + (0.49_f32 - 4.0 * 1.8 * (1.0 - 256.0 / 5.0)).sqrt()) / 3.6;
        assert!((r - expected).abs() < 1e-4);
    }

    #[test]
    fn radius_grows_with_brightness() {
        let a = Attenuation::default();
        let radii: Vec<f32> = [0.1, 0.25, 0.5, 1.0, 2.0, 10.0]
            .iter()
            .map(|&p| solve(p, a))
            .collect();
        assert!(radii.windows(2).all(|w| w[0] < w[1]), "{radii:?}");
    }

    #[test]
    fn radius_shrinks_with_stronger_falloff() {
        let base = Attenuation::default();
        let mut last = f32::INFINITY;
        for linear in [0.0, 0.35, 0.7, 1.4, 2.8] {
            let r = solve(1.0, Attenuation { linear, ..base });
            assert!(r < last);
            last = r;
        }
        let mut last = f32::INFINITY;
        for quadratic in [0.1, 0.9, 1.8, 3.6] {
            let r = solve(1.0, Attenuation { quadratic, ..base });
            assert!(r < last);
            last = r;
        }
    }

    #[test]
    fn degenerate_attenuation() {
        let linear_only = Attenuation {
            constant: 1.0,
            linear: 1.0,
            quadratic: 0.0,
        };
        assert!((solve(1.0, linear_only) - 50.2).abs() < 1e-4);

        let flat = Attenuation {
            constant: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        };
        assert!(solve(1.0, flat).is_infinite());
        assert_eq!(solve(0.0, Attenuation::default()), 0.0);
    }

    #[test]
    fn invalid_coefficients_give_no_radius() {
        let negative_linear = Attenuation {
            constant: 1.0,
            linear: -1.0,
            quadratic: 0.0,
        };
        assert!(!negative_linear.is_valid());
        assert_eq!(solve(1.0, negative_linear), 0.0);

        let nan_quadratic = Attenuation {
            quadratic: f32::NAN,
            ..Attenuation::default()
        };
        assert_eq!(solve(1.0, nan_quadratic), 0.0);
        assert!(Attenuation::default().is_valid());
    }

    #[test]
    fn global_light_radius_scaled() {
        let mut list = LightList::new();
        let local = list
            .push_local(Light::new(Vec3::ONE, Vec3::ONE, Attenuation::default()))
            .unwrap();
        let global = list
            .set_global(Light::new(Vec3::ZERO, Vec3::ONE, Attenuation::default()))
            .unwrap();
        let local_r = list.radius(local).unwrap();
        let global_r = list.radius(global).unwrap();
        assert!((global_r - local_r * GLOBAL_RADIUS_SCALE).abs() < 1e-4);
        assert_eq!(list.radii().len(), 2);
    }

    #[test]
    fn global_position_is_steerable() {
        let mut list = LightList::new();
        list.set_global_position(Vec3::ONE);
        assert!(list.global().is_none());

        list.set_global(Light::new(Vec3::ZERO, Vec3::ONE, Attenuation::default()))
            .unwrap();
        list.set_global_position(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(list.global().unwrap().position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn seeding_is_reproducible_and_bounded() {
        let mut a = LightList::new();
        let mut b = LightList::new();
        a.seed_local(32, 13, Attenuation::default()).unwrap();
        b.seed_local(32, 13, Attenuation::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        for l in a.iter() {
            assert!((-3.0..3.0).contains(&l.position.x));
            assert!((-4.0..2.0).contains(&l.position.y));
            assert!((-3.0..3.0).contains(&l.position.z));
            assert!(l.color.min_element() >= 0.5 && l.color.max_element() < 1.0);
        }
    }

    #[test]
    fn capacity_enforced() {
        let mut list = LightList::new();
        list.seed_local(MAX_LIGHTS, 1, Attenuation::default())
            .unwrap();
        assert!(matches!(
            list.push_local(Light::new(Vec3::ZERO, Vec3::ONE, Attenuation::default())),
            Err(SceneError::TooManyLights { .. })
        ));
    }

    #[test]
    fn key_light_default_position() {
        let p = KeyLight::default().position();
        assert!((p.length() - 100.0).abs() < 1e-3);
        assert!(p.z > 0.0);
    }
}
