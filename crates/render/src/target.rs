use serde::{Deserialize, Serialize};

use crate::command::{Command, Framebuffer, GBufferAttachment, RenderTargetId};
use crate::device::{GraphicsDevice, RenderTargetDesc, TargetStatus};
use crate::error::RenderError;

/// How the G-buffer is currently bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetBinding {
    Unbound,
    /// Bound as the draw target.
    Write,
    /// Attachments bound to sampler units.
    Read,
}

/// The off-screen G-buffer: four float color attachments plus depth,
/// sized to the viewport.
#[derive(Debug)]
pub struct RenderTargetSet {
    id: RenderTargetId,
    width: u32,
    height: u32,
    status: TargetStatus,
    binding: TargetBinding,
}

impl RenderTargetSet {
    /// Create the attachments and query completeness. An incomplete target
    /// is kept and reported through [`status`](Self::status); only a failed
    /// creation call is an error.
    pub fn create(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let id = device.create_render_target(&RenderTargetDesc::gbuffer(width, height))?;
        let status = device.target_status(id);
        match &status {
            TargetStatus::Complete => {
                tracing::info!(target_id = id.0, width, height, "G-buffer created")
            }
            TargetStatus::Incomplete(reason) => {
                tracing::warn!(target_id = id.0, width, height, %reason, "G-buffer incomplete")
            }
        }
        Ok(Self {
            id,
            width,
            height,
            status,
            binding: TargetBinding::Unbound,
        })
    }

    pub fn id(&self) -> RenderTargetId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn status(&self) -> &TargetStatus {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    pub fn binding(&self) -> TargetBinding {
        self.binding
    }

    /// Direct subsequent draws into the G-buffer.
    pub fn bind(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), RenderError> {
        if self.binding == TargetBinding::Read {
            return Err(RenderError::TargetBoundForRead);
        }
        device.execute(Command::BindTarget(Framebuffer::Offscreen(self.id)));
        self.binding = TargetBinding::Write;
        Ok(())
    }

    /// Restore the default target.
    pub fn unbind(&mut self, device: &mut dyn GraphicsDevice) {
        device.execute(Command::BindTarget(Framebuffer::Default));
        if self.binding == TargetBinding::Write {
            self.binding = TargetBinding::Unbound;
        }
    }

    /// Bind the four attachments to sampler units 0 to 3.
    pub fn bind_for_read(&mut self, device: &mut dyn GraphicsDevice) -> Result<(), RenderError> {
        if self.binding == TargetBinding::Write {
            return Err(RenderError::TargetBoundForWrite);
        }
        for attachment in GBufferAttachment::ALL {
            device.execute(Command::BindAttachment {
                unit: attachment.unit(),
                target: self.id,
                attachment,
            });
        }
        self.binding = TargetBinding::Read;
        Ok(())
    }

    /// Unbind the sampler units bound by [`bind_for_read`](Self::bind_for_read).
    pub fn release_read(&mut self, device: &mut dyn GraphicsDevice) {
        if self.binding != TargetBinding::Read {
            return;
        }
        for attachment in GBufferAttachment::ALL {
            device.execute(Command::UnbindAttachment {
                unit: attachment.unit(),
            });
        }
        self.binding = TargetBinding::Unbound;
    }

    /// Recreate the attachments at a new size. Returns whether anything
    /// changed. The target must not be bound.
    pub fn resize(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<bool, RenderError> {
        if width == self.width && height == self.height {
            return Ok(false);
        }
        match self.binding {
            TargetBinding::Write => return Err(RenderError::TargetBoundForWrite),
            TargetBinding::Read => return Err(RenderError::TargetBoundForRead),
            TargetBinding::Unbound => {}
        }
        let replacement = Self::create(device, width, height)?;
        device.release_render_target(self.id);
        *self = replacement;
        Ok(true)
    }

    /// Release the device resources.
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.release_render_target(self.id);
    }

    /// Forget any binding after an aborted frame, leaving the device on the
    /// default target with no G-buffer samplers bound.
    pub(crate) fn reset_binding(&mut self, device: &mut dyn GraphicsDevice) {
        match self.binding {
            TargetBinding::Write => self.unbind(device),
            TargetBinding::Read => self.release_read(device),
            TargetBinding::Unbound => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::IncompleteReason;
    use crate::recording::RecordingDevice;

    #[test]
    fn valid_size_is_complete() {
        let mut device = RecordingDevice::new();
        let target = RenderTargetSet::create(&mut device, 800, 600).unwrap();
        assert!(target.is_complete());
        assert_eq!((target.width(), target.height()), (800, 600));
        assert_eq!(target.binding(), TargetBinding::Unbound);
    }

    #[test]
    fn zero_size_is_incomplete_not_an_error() {
        let mut device = RecordingDevice::new();
        let target = RenderTargetSet::create(&mut device, 0, 600).unwrap();
        assert_eq!(
            target.status(),
            &TargetStatus::Incomplete(IncompleteReason::ZeroSize)
        );
    }

    #[test]
    fn bind_and_unbind_emit_target_switches() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        target.bind(&mut device).unwrap();
        assert_eq!(target.binding(), TargetBinding::Write);
        target.unbind(&mut device);
        assert_eq!(
            device.commands(),
            &[
                Command::BindTarget(Framebuffer::Offscreen(target.id())),
                Command::BindTarget(Framebuffer::Default),
            ]
        );
    }

    #[test]
    fn sampling_while_bound_for_write_fails() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        target.bind(&mut device).unwrap();
        assert_eq!(
            target.bind_for_read(&mut device),
            Err(RenderError::TargetBoundForWrite)
        );
    }

    #[test]
    fn writing_while_sampled_fails() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        target.bind_for_read(&mut device).unwrap();
        assert_eq!(target.bind(&mut device), Err(RenderError::TargetBoundForRead));
        target.release_read(&mut device);
        assert!(target.bind(&mut device).is_ok());
    }

    #[test]
    fn read_binding_uses_units_zero_to_three() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        target.bind_for_read(&mut device).unwrap();
        let units: Vec<u32> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindAttachment { unit, .. } => Some(*unit),
                _ => None,
            })
            .collect();
        assert_eq!(units, vec![0, 1, 2, 3]);
    }

    #[test]
    fn resize_recreates_only_on_change() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        let first = target.id();
        assert!(!target.resize(&mut device, 64, 64).unwrap());
        assert!(target.resize(&mut device, 128, 32).unwrap());
        assert_ne!(target.id(), first);
        assert_eq!(device.live_targets(), vec![target.id()]);
        assert_eq!((target.width(), target.height()), (128, 32));
    }

    #[test]
    fn resize_while_bound_fails() {
        let mut device = RecordingDevice::new();
        let mut target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        target.bind(&mut device).unwrap();
        assert_eq!(
            target.resize(&mut device, 32, 32),
            Err(RenderError::TargetBoundForWrite)
        );
    }

    #[test]
    fn destroy_releases() {
        let mut device = RecordingDevice::new();
        let target = RenderTargetSet::create(&mut device, 64, 64).unwrap();
        target.destroy(&mut device);
        assert!(device.live_targets().is_empty());
    }
}
