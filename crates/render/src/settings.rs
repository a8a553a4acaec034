use deferlight_scene::KeyLight;
use serde::{Deserialize, Serialize};

/// Opaque selector forwarded to the lighting program as `mode`. Mode 0 also
/// pulls the far plane in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShadingMode(pub u32);

/// Per-frame switches driven by the debug controls.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub mode: ShadingMode,
    /// Draw the volume of every local light, not just the global marker.
    pub show_local_lights: bool,
    pub key_light: KeyLight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_json() {
        let s: FrameSettings =
            serde_json::from_str(r#"{"mode": 2, "show_local_lights": true}"#).unwrap();
        assert_eq!(s.mode, ShadingMode(2));
        assert!(s.show_local_lights);
        assert_eq!(s.key_light, KeyLight::default());
    }
}
