use deferlight_scene::{MeshData, MeshId};
use serde::{Deserialize, Serialize};

use crate::command::{Command, ProgramId, ProgramKind, RenderTargetId};
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFormat {
    /// Four 32-bit float channels.
    Rgba32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthFormat {
    Depth32Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Nearest,
    Linear,
}

/// Attachment sampling. Lookups always clamp at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sampling {
    pub filter: Filter,
}

/// Layout of an off-screen target: color attachments plus one depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTargetDesc {
    pub width: u32,
    pub height: u32,
    pub color: [ColorFormat; 4],
    pub depth: DepthFormat,
    pub sampling: Sampling,
}

impl RenderTargetDesc {
    /// The G-buffer layout: four float attachments, float depth,
    /// linear filtering clamped at the edges.
    pub fn gbuffer(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color: [ColorFormat::Rgba32Float; 4],
            depth: DepthFormat::Depth32Float,
            sampling: Sampling {
                filter: Filter::Linear,
            },
        }
    }
}

/// Why a created target cannot be rendered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum IncompleteReason {
    #[error("zero-sized attachment")]
    ZeroSize,
    #[error("dimension exceeds the device maximum of {max}")]
    TooLarge { max: u32 },
    #[error("more color attachments than the device maximum of {max}")]
    TooManyAttachments { max: u32 },
    #[error("{0}")]
    Backend(String),
}

/// Result of a completeness query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetStatus {
    Complete,
    Incomplete(IncompleteReason),
}

impl TargetStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Reject sizes and attachment counts no device can honour. Backends run
/// this before their own checks.
pub fn validate_target(
    desc: &RenderTargetDesc,
    max_dimension: u32,
    max_attachments: u32,
) -> TargetStatus {
    if desc.width == 0 || desc.height == 0 {
        return TargetStatus::Incomplete(IncompleteReason::ZeroSize);
    }
    if desc.width > max_dimension || desc.height > max_dimension {
        return TargetStatus::Incomplete(IncompleteReason::TooLarge { max: max_dimension });
    }
    if desc.color.len() as u32 > max_attachments {
        return TargetStatus::Incomplete(IncompleteReason::TooManyAttachments {
            max: max_attachments,
        });
    }
    TargetStatus::Complete
}

/// The graphics device seen by the pipeline.
///
/// Resource creation is synchronous; drawing goes through [`execute`], which
/// only enqueues. Errors raised while executing are collected by the device
/// and surfaced through [`poll_error`].
///
/// [`execute`]: GraphicsDevice::execute
/// [`poll_error`]: GraphicsDevice::poll_error
pub trait GraphicsDevice {
    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, DeviceError>;

    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshId, DeviceError>;

    /// Create a target. An `Ok` id may still be incomplete; query
    /// [`target_status`](GraphicsDevice::target_status).
    fn create_render_target(
        &mut self,
        desc: &RenderTargetDesc,
    ) -> Result<RenderTargetId, DeviceError>;

    fn target_status(&self, id: RenderTargetId) -> TargetStatus;

    fn release_render_target(&mut self, id: RenderTargetId);

    fn execute(&mut self, command: Command);

    /// Take the first error raised since the last poll.
    fn poll_error(&mut self) -> Option<DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gbuffer_layout() {
        let desc = RenderTargetDesc::gbuffer(640, 480);
        assert_eq!(desc.color, [ColorFormat::Rgba32Float; 4]);
        assert_eq!(desc.depth, DepthFormat::Depth32Float);
        assert_eq!(desc.sampling.filter, Filter::Linear);
    }

    #[test]
    fn validation() {
        let ok = RenderTargetDesc::gbuffer(800, 600);
        assert!(validate_target(&ok, 8192, 8).is_complete());
        assert_eq!(
            validate_target(&RenderTargetDesc::gbuffer(0, 600), 8192, 8),
            TargetStatus::Incomplete(IncompleteReason::ZeroSize)
        );
        assert_eq!(
            validate_target(&RenderTargetDesc::gbuffer(9000, 600), 8192, 8),
            TargetStatus::Incomplete(IncompleteReason::TooLarge { max: 8192 })
        );
        assert_eq!(
            validate_target(&ok, 8192, 2),
            TargetStatus::Incomplete(IncompleteReason::TooManyAttachments { max: 2 })
        );
    }
}
