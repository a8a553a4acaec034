//! wgpu backend for the deferred pipeline.
//!
//! [`WgpuDevice`] implements [`deferlight_render::GraphicsDevice`]: programs
//! are WGSL modules, off-screen targets are four `Rgba32Float` textures plus
//! a `Depth32Float` buffer, and the command stream is folded into render
//! passes that are submitted once per frame.
//!
//! # Invariants
//! - Uniform values are snapshotted at each draw, so later commands never
//!   change what an earlier draw sees.
//! - A depth copy only runs when source and destination sizes match.
//! - Device errors are queued and surface through `poll_error`, never panic.

mod device;
mod plan;
mod shaders;
mod uniforms;

pub use device::WgpuDevice;
