use crate::command::{ProgramKind, RenderTargetId};
use crate::device::IncompleteReason;
use crate::frame::FramePhase;

/// Failures reported by a graphics device. Any of these surfacing from
/// [`GraphicsDevice::poll_error`](crate::GraphicsDevice::poll_error) is fatal
/// for the frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to compile {kind:?} program: {message}")]
    Compile { kind: ProgramKind, message: String },
    #[error("mesh upload failed: {0}")]
    Upload(String),
    #[error("unknown render target {0:?}")]
    UnknownTarget(RenderTargetId),
    #[error("device lost: {0}")]
    Lost(String),
    #[error("device error: {0}")]
    Backend(String),
}

/// Errors from the deferred pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("render target {target:?} is incomplete: {reason}")]
    TargetIncomplete {
        target: RenderTargetId,
        reason: IncompleteReason,
    },
    #[error("render target is bound for writing and cannot be sampled")]
    TargetBoundForWrite,
    #[error("render target is bound for sampling and cannot be written")]
    TargetBoundForRead,
    #[error("geometry output is from frame {found} on {target:?}, expected frame {expected}")]
    StaleGeometry {
        expected: u64,
        found: u64,
        target: RenderTargetId,
    },
    #[error("frame phase is {found:?}, expected {expected:?}")]
    PhaseOrder {
        expected: FramePhase,
        found: FramePhase,
    },
}
