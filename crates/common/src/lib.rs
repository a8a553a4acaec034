//! Shared types for the deferred renderer: transform helpers, surface
//! materials plus HSV color conversion.

mod color;
mod types;

pub use color::hsv_to_rgb;
pub use types::{Axis, Material, rotate, scale, translate, uniform_scale};
