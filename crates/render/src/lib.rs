//! Deferred shading pipeline, independent of any graphics API.
//!
//! A frame is a geometry pass that fills a four-attachment float G-buffer,
//! a lighting pass that shades the default target from it with a
//! full-screen quad, a depth copy, and an optional light-volume overlay.
//! Everything reaches the GPU through the [`GraphicsDevice`] command stream;
//! [`RecordingDevice`] implements it without a GPU for tools and tests.
//!
//! # Invariants
//! - The lighting pass only runs on a G-buffer filled during the same frame.
//! - The G-buffer is never bound for writing and sampling at once.
//! - The pipeline never mutates the scene.

mod camera;
mod command;
mod device;
mod error;
mod frame;
mod geometry;
mod lighting;
mod overlay;
mod recording;
mod settings;
mod target;

pub use camera::{Camera, Projection, ViewState, Viewport};
pub use command::{
    BlendMode, Command, Framebuffer, GBufferAttachment, LightField, ProgramId, ProgramKind,
    RasterState, RenderTargetId, Uniform,
};
pub use device::{
    ColorFormat, DepthFormat, Filter, GraphicsDevice, IncompleteReason, RenderTargetDesc,
    Sampling, TargetStatus, validate_target,
};
pub use error::{DeviceError, RenderError};
pub use frame::{
    FrameContext, FrameOrchestrator, FrameOutcome, FramePhase, FrameReport, PipelineResources,
};
pub use geometry::{GeometryOutput, GeometryPass};
pub use lighting::{LightingOutput, LightingPass};
pub use overlay::LightVolumeOverlay;
pub use recording::RecordingDevice;
pub use settings::{FrameSettings, ShadingMode};
pub use target::{RenderTargetSet, TargetBinding};

#[cfg(test)]
mod test_support {
    use crate::camera::{ViewState, Viewport};
    use crate::frame::FrameContext;
    use crate::settings::FrameSettings;
    use glam::Mat4;

    pub fn context(frame: u64) -> FrameContext {
        context_with(frame, FrameSettings::default())
    }

    pub fn context_with(frame: u64, settings: FrameSettings) -> FrameContext {
        FrameContext {
            frame,
            view: ViewState::new(Mat4::IDENTITY, Mat4::IDENTITY),
            viewport: Viewport::new(32, 16),
            settings,
        }
    }
}
