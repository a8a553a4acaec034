use deferlight_render::{
    Command, DeviceError, Framebuffer, ProgramId, RasterState, RenderTargetId,
};
use deferlight_scene::MeshId;

use crate::uniforms::{Block, DrawUniform, GlobalsUniform, apply_uniform};

/// One indexed draw with the state it was issued under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DrawRecord {
    pub program: ProgramId,
    pub raster: RasterState,
    pub mesh: MeshId,
    /// Index into [`FramePlan::globals`].
    pub globals: usize,
    /// Index into [`FramePlan::draws`].
    pub draw: usize,
    /// Target whose four attachments are bound for sampling, if all are.
    pub gbuffer: Option<RenderTargetId>,
}

/// A run of draws into one framebuffer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PassPlan {
    pub framebuffer: Framebuffer,
    /// Color and depth to clear to before drawing.
    pub clear: Option<([f32; 4], f32)>,
    pub draws: Vec<DrawRecord>,
}

impl PassPlan {
    fn new(framebuffer: Framebuffer) -> Self {
        Self {
            framebuffer,
            clear: None,
            draws: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.clear.is_none() && self.draws.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Pass(PassPlan),
    /// Copy the depth attachment of `from` into the default depth buffer.
    CopyDepth {
        from: RenderTargetId,
        width: u32,
        height: u32,
    },
}

/// Everything needed to encode one frame's worth of commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FramePlan {
    pub steps: Vec<Step>,
    pub globals: Vec<GlobalsUniform>,
    pub draws: Vec<DrawUniform>,
}

impl FramePlan {
    pub fn draw_count(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                Step::Pass(pass) => pass.draws.len(),
                Step::CopyDepth { .. } => 0,
            })
            .sum()
    }
}

/// Folds the immediate-mode command stream into passes.
///
/// State set by commands persists across frames the way a bound GL context
/// would; only the recorded steps are taken by [`finish`](Recorder::finish).
#[derive(Debug)]
pub(crate) struct Recorder {
    framebuffer: Framebuffer,
    program: Option<ProgramId>,
    raster: RasterState,
    attachments: [Option<RenderTargetId>; 4],
    globals: GlobalsUniform,
    globals_dirty: bool,
    draw: DrawUniform,
    draw_dirty: bool,
    plan: FramePlan,
}

impl Default for Recorder {
    fn default() -> Self {
        Self {
            framebuffer: Framebuffer::Default,
            program: None,
            raster: RasterState::OPAQUE,
            attachments: [None; 4],
            globals: GlobalsUniform::default(),
            globals_dirty: true,
            draw: DrawUniform::default(),
            draw_dirty: true,
            plan: FramePlan::default(),
        }
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, command: Command) -> Result<(), DeviceError> {
        match command {
            Command::UseProgram(id) => self.program = Some(id),
            Command::BindTarget(framebuffer) => {
                self.framebuffer = framebuffer;
                self.open_pass();
            }
            Command::Clear { color, depth } => {
                let needs_pass = match self.plan.steps.last() {
                    Some(Step::Pass(pass)) => !pass.draws.is_empty(),
                    _ => true,
                };
                if needs_pass {
                    self.open_pass();
                }
                if let Some(Step::Pass(pass)) = self.plan.steps.last_mut() {
                    pass.clear = Some((color, depth));
                }
            }
            Command::SetUniform(uniform) => {
                match apply_uniform(&uniform, &mut self.globals, &mut self.draw)? {
                    Block::Globals => self.globals_dirty = true,
                    Block::Draw => self.draw_dirty = true,
                }
            }
            Command::BindAttachment { unit, target, .. } => {
                let slot = self.attachments.get_mut(unit as usize).ok_or_else(|| {
                    DeviceError::Backend(format!("texture unit {unit} out of range"))
                })?;
                *slot = Some(target);
            }
            Command::UnbindAttachment { unit } => {
                if let Some(slot) = self.attachments.get_mut(unit as usize) {
                    *slot = None;
                }
            }
            Command::SetRasterState(raster) => self.raster = raster,
            Command::DrawMesh(handle) => self.draw_mesh(handle.id())?,
            Command::BlitDepth {
                from,
                width,
                height,
            } => self.plan.steps.push(Step::CopyDepth {
                from,
                width,
                height,
            }),
        }
        Ok(())
    }

    /// Take the recorded frame. The next frame re-uploads both uniform
    /// blocks before its first draw.
    pub fn finish(&mut self) -> FramePlan {
        self.globals_dirty = true;
        self.draw_dirty = true;
        std::mem::take(&mut self.plan)
    }

    fn open_pass(&mut self) {
        let pass = PassPlan::new(self.framebuffer);
        match self.plan.steps.last_mut() {
            // A pass with nothing in it would only reload the attachments.
            Some(Step::Pass(last)) if last.is_empty() => *last = pass,
            _ => self.plan.steps.push(Step::Pass(pass)),
        }
    }

    fn gbuffer(&self) -> Option<RenderTargetId> {
        let first = self.attachments[0]?;
        self.attachments
            .iter()
            .all(|slot| *slot == Some(first))
            .then_some(first)
    }

    fn draw_mesh(&mut self, mesh: MeshId) -> Result<(), DeviceError> {
        let program = self
            .program
            .ok_or_else(|| DeviceError::Backend("draw issued with no program bound".into()))?;

        if self.globals_dirty || self.plan.globals.is_empty() {
            self.plan.globals.push(self.globals);
            self.globals_dirty = false;
        }
        if self.draw_dirty || self.plan.draws.is_empty() {
            self.plan.draws.push(self.draw);
            self.draw_dirty = false;
        }

        if !matches!(self.plan.steps.last(), Some(Step::Pass(_))) {
            self.open_pass();
        }
        let record = DrawRecord {
            program,
            raster: self.raster,
            mesh,
            globals: self.plan.globals.len() - 1,
            draw: self.plan.draws.len() - 1,
            gbuffer: self.gbuffer(),
        };
        if let Some(Step::Pass(pass)) = self.plan.steps.last_mut() {
            pass.draws.push(record);
        }
        Ok(())
    }
}
