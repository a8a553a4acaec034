use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::light::{Attenuation, KeyLight};

/// Scene-build parameters. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed for the procedurally placed local lights.
    pub light_seed: u64,
    pub local_light_count: usize,
    pub attenuation: Attenuation,
    pub global_light: GlobalLightConfig,
    pub key_light: KeyLight,
    /// Show the ring of spheres around the animated group.
    pub show_spheres: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            light_seed: 13,
            local_light_count: 32,
            attenuation: Attenuation::default(),
            global_light: GlobalLightConfig::default(),
            key_light: KeyLight::default(),
            show_spheres: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalLightConfig {
    pub position: Vec3,
    pub color: Vec3,
}

impl Default for GlobalLightConfig {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::new(1.0, 1.0, 0.8),
        }
    }
}

impl SceneConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, SceneError> {
        let config: Self = serde_yaml::from_str(text)?;
        if !config.attenuation.is_valid() {
            return Err(SceneError::InvalidAttenuation(config.attenuation));
        }
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, SceneError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = SceneConfig::from_yaml_str("{}").unwrap();
        assert_eq!(cfg, SceneConfig::default());
        assert_eq!(cfg.light_seed, 13);
        assert_eq!(cfg.local_light_count, 32);
    }

    #[test]
    fn partial_override() {
        let cfg = SceneConfig::from_yaml_str(
            "light_seed: 7\nattenuation:\n  constant: 1.0\n  linear: 0.35\n  quadratic: 0.44\n",
        )
        .unwrap();
        assert_eq!(cfg.light_seed, 7);
        assert_eq!(cfg.attenuation.linear, 0.35);
        assert_eq!(cfg.global_light.color, Vec3::new(1.0, 1.0, 0.8));
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = SceneConfig {
            show_spheres: true,
            ..SceneConfig::default()
        };
        let text = cfg.to_yaml_string().unwrap();
        assert_eq!(SceneConfig::from_yaml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn negative_attenuation_is_rejected() {
        let result = SceneConfig::from_yaml_str(
            "attenuation:\n  constant: 1.0\n  linear: -1.0\n  quadratic: 0.0\n",
        );
        assert!(matches!(result, Err(SceneError::InvalidAttenuation(a)) if a.linear == -1.0));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            SceneConfig::from_yaml_str("light_seed: [1, 2"),
            Err(SceneError::Config(_))
        ));
    }
}
