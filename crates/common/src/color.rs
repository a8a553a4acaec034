use glam::Vec3;

/// Convert hue/saturation/value (all in `0..=1`) to linear RGB.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    if s == 0.0 {
        return Vec3::splat(v);
    }

    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i32).rem_euclid(6) {
        0 => Vec3::new(v, t, p),
        1 => Vec3::new(q, v, p),
        2 => Vec3::new(p, v, t),
        3 => Vec3::new(p, q, v),
        4 => Vec3::new(t, p, v),
        _ => Vec3::new(v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_saturation_is_grey() {
        assert_eq!(hsv_to_rgb(0.3, 0.0, 0.7), Vec3::splat(0.7));
    }

    #[test]
    fn primary_hues() {
        assert!(hsv_to_rgb(0.0, 1.0, 1.0).abs_diff_eq(Vec3::X, 1e-6));
        assert!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0).abs_diff_eq(Vec3::Y, 1e-5));
        assert!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0).abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn full_turn_wraps_to_red() {
        assert!(hsv_to_rgb(1.0, 1.0, 1.0).abs_diff_eq(Vec3::X, 1e-6));
    }
}
