use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex, PoisonError};

use deferlight_render::{
    BlendMode, Command, DeviceError, Filter, Framebuffer, GraphicsDevice, IncompleteReason,
    ProgramId, ProgramKind, RasterState, RenderTargetDesc, RenderTargetId, TargetStatus,
    validate_target,
};
use deferlight_scene::{MeshData, MeshId};
use wgpu::util::DeviceExt;

use crate::plan::{FramePlan, Recorder, Step};
use crate::shaders;
use crate::uniforms::{DrawUniform, GlobalsUniform, GpuVertex, align_to};

const GBUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Four Rgba32Float attachments per sample.
const GBUFFER_BYTES_PER_SAMPLE: u32 = 64;

type ErrorQueue = Arc<Mutex<VecDeque<DeviceError>>>;

fn push_error(queue: &ErrorQueue, error: DeviceError) {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(error);
}

fn color_attachment(
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        },
    })
}

struct Program {
    kind: ProgramKind,
    module: wgpu::ShaderModule,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
}

struct Attachments {
    color: Vec<wgpu::TextureView>,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

struct GpuTarget {
    width: u32,
    height: u32,
    status: TargetStatus,
    /// `None` when the target never became complete.
    attachments: Option<Attachments>,
}

struct DepthBuffer {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl DepthBuffer {
    fn new(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }
}

/// A dynamic-offset uniform buffer holding one slot per snapshot.
struct UniformRing {
    label: &'static str,
    element_size: u64,
    stride: u64,
    capacity: usize,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformRing {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        element_size: u64,
        alignment: u64,
    ) -> Self {
        let stride = align_to(element_size, alignment);
        let (buffer, bind_group) = Self::allocate(device, layout, label, element_size, stride, 1);
        Self {
            label,
            element_size,
            stride,
            capacity: 1,
            buffer,
            bind_group,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        element_size: u64,
        stride: u64,
        capacity: usize,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(element_size),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn upload<T: bytemuck::Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        items: &[T],
    ) {
        if items.is_empty() {
            return;
        }
        if items.len() > self.capacity {
            let capacity = items.len().next_power_of_two();
            let (buffer, bind_group) = Self::allocate(
                device,
                layout,
                self.label,
                self.element_size,
                self.stride,
                capacity,
            );
            tracing::debug!(label = self.label, capacity, "grew uniform buffer");
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }
        let mut bytes = vec![0u8; self.stride as usize * items.len()];
        for (chunk, item) in bytes.chunks_exact_mut(self.stride as usize).zip(items) {
            let src = bytemuck::bytes_of(item);
            chunk[..src.len()].copy_from_slice(src);
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    fn offset(&self, index: usize) -> u32 {
        (index as u64 * self.stride) as u32
    }
}

struct Layouts {
    globals: wgpu::BindGroupLayout,
    draw: wgpu::BindGroupLayout,
    gbuffer: wgpu::BindGroupLayout,
    base: wgpu::PipelineLayout,
    lighting: wgpu::PipelineLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device, filterable: bool) -> Self {
        let uniform_entry = |size: u64| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        };
        let globals = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals_layout"),
            entries: &[uniform_entry(std::mem::size_of::<GlobalsUniform>() as u64)],
        });
        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_layout"),
            entries: &[uniform_entry(std::mem::size_of::<DrawUniform>() as u64)],
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_kind = if filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        let gbuffer = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gbuffer_layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(sampler_kind),
                    count: None,
                },
            ],
        });

        let base = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("base_pipeline_layout"),
            bind_group_layouts: &[&globals, &draw],
            push_constant_ranges: &[],
        });
        let lighting = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lighting_pipeline_layout"),
            bind_group_layouts: &[&globals, &draw, &gbuffer],
            push_constant_ranges: &[],
        });
        Self {
            globals,
            draw,
            gbuffer,
            base,
            lighting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    raster: RasterState,
    offscreen: bool,
}

/// [`GraphicsDevice`] over a wgpu device.
///
/// Commands are folded into a frame plan as they arrive and encoded into a
/// single submission by [`submit_frame`](WgpuDevice::submit_frame).
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    limits: wgpu::Limits,
    filterable: bool,
    wireframe: bool,
    layouts: Layouts,
    programs: Vec<Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    meshes: Vec<GpuMesh>,
    targets: HashMap<RenderTargetId, GpuTarget>,
    next_target: u32,
    default_depth: DepthBuffer,
    globals: UniformRing,
    draws: UniformRing,
    recorder: Recorder,
    errors: ErrorQueue,
}

impl WgpuDevice {
    /// Wrap `device`, rendering the composited image in `surface_format`.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let features = device.features();
        let filterable = features.contains(wgpu::Features::FLOAT32_FILTERABLE);
        let wireframe = features.contains(wgpu::Features::POLYGON_MODE_LINE);
        if !filterable {
            tracing::warn!("float32 filtering unavailable, sampling the G-buffer with nearest");
        }
        if !wireframe {
            tracing::warn!("line polygon mode unavailable, light volumes are drawn filled");
        }

        let errors: ErrorQueue = Arc::default();
        let sink = errors.clone();
        device.on_uncaptured_error(Box::new(move |error: wgpu::Error| {
            tracing::error!(%error, "uncaptured wgpu error");
            push_error(&sink, DeviceError::Backend(error.to_string()));
        }));
        let sink = errors.clone();
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!(?reason, %message, "wgpu device lost");
            push_error(&sink, DeviceError::Lost(message));
        });

        let limits = device.limits();
        let alignment = u64::from(limits.min_uniform_buffer_offset_alignment);
        let layouts = Layouts::new(device, filterable);
        let globals = UniformRing::new(
            device,
            &layouts.globals,
            "globals_uniforms",
            std::mem::size_of::<GlobalsUniform>() as u64,
            alignment,
        );
        let draws = UniformRing::new(
            device,
            &layouts.draw,
            "draw_uniforms",
            std::mem::size_of::<DrawUniform>() as u64,
            alignment,
        );

        Self {
            device: device.clone(),
            queue: queue.clone(),
            surface_format,
            limits,
            filterable,
            wireframe,
            default_depth: DepthBuffer::new(device, width, height, "default_depth"),
            layouts,
            programs: Vec::new(),
            pipelines: HashMap::new(),
            meshes: Vec::new(),
            targets: HashMap::new(),
            next_target: 0,
            globals,
            draws,
            recorder: Recorder::new(),
            errors,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Whether float attachments can be sampled through a filtering sampler.
    pub fn float_filterable(&self) -> bool {
        self.filterable
    }

    /// Color attachment views of a complete target, in attachment order.
    pub fn attachment_views(&self, id: RenderTargetId) -> Option<&[wgpu::TextureView]> {
        self.targets
            .get(&id)
            .and_then(|t| t.attachments.as_ref())
            .map(|a| a.color.as_slice())
    }

    /// Match the default depth buffer to a resized surface.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.default_depth = DepthBuffer::new(&self.device, width, height, "default_depth");
    }

    /// Encode and submit everything executed since the last submission,
    /// drawing the default framebuffer into `surface`. Returns the number
    /// of draws submitted.
    pub fn submit_frame(&mut self, surface: &wgpu::TextureView) -> usize {
        let plan = self.recorder.finish();
        self.globals
            .upload(&self.device, &self.queue, &self.layouts.globals, &plan.globals);
        self.draws
            .upload(&self.device, &self.queue, &self.layouts.draw, &plan.draws);
        self.build_pipelines(&plan);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("deferred_frame"),
            });
        let mut failures = Vec::new();
        let mut submitted = 0;
        for step in &plan.steps {
            match step {
                Step::Pass(pass) => {
                    submitted += self.encode_pass(&mut encoder, surface, pass, &mut failures);
                }
                Step::CopyDepth {
                    from,
                    width,
                    height,
                } => self.encode_depth_copy(&mut encoder, *from, *width, *height),
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let skipped = plan.draw_count() - submitted;
        if skipped > 0 {
            tracing::warn!(skipped, submitted, "draws dropped from the frame");
        }
        for failure in failures {
            push_error(&self.errors, failure);
        }
        submitted
    }

    fn build_pipelines(&mut self, plan: &FramePlan) {
        for step in &plan.steps {
            let Step::Pass(pass) = step else { continue };
            let offscreen = matches!(pass.framebuffer, Framebuffer::Offscreen(_));
            for draw in &pass.draws {
                let key = PipelineKey {
                    program: draw.program,
                    raster: draw.raster,
                    offscreen,
                };
                if self.pipelines.contains_key(&key) {
                    continue;
                }
                if let Some(pipeline) = self.create_pipeline(key) {
                    self.pipelines.insert(key, pipeline);
                }
            }
        }
    }

    fn create_pipeline(&self, key: PipelineKey) -> Option<wgpu::RenderPipeline> {
        let program = self.programs.get(key.program.0 as usize)?;
        let layout = match program.kind {
            ProgramKind::Lighting => &self.layouts.lighting,
            ProgramKind::Geometry | ProgramKind::LightVolume => &self.layouts.base,
        };

        // Float attachments cannot blend.
        let blend = match (key.offscreen, key.raster.blend) {
            (true, _) => None,
            (false, BlendMode::Replace) => Some(wgpu::BlendState::REPLACE),
            (false, BlendMode::Additive) => {
                let add = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState {
                    color: add,
                    alpha: add,
                })
            }
        };
        let targets: Vec<Option<wgpu::ColorTargetState>> = if key.offscreen {
            (0..4)
                .map(|_| {
                    Some(wgpu::ColorTargetState {
                        format: GBUFFER_FORMAT,
                        blend,
                        write_mask: wgpu::ColorWrites::ALL,
                    })
                })
                .collect()
        } else {
            vec![Some(wgpu::ColorTargetState {
                format: self.surface_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })]
        };

        let polygon_mode = if key.raster.wireframe && self.wireframe {
            wgpu::PolygonMode::Line
        } else {
            wgpu::PolygonMode::Fill
        };
        let label = format!("{:?}_pipeline", program.kind);
        Some(
            self.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(&label),
                    layout: Some(layout),
                    vertex: wgpu::VertexState {
                        module: &program.module,
                        entry_point: Some("vs_main"),
                        compilation_options: Default::default(),
                        buffers: &[wgpu::VertexBufferLayout {
                            array_stride: std::mem::size_of::<GpuVertex>() as u64,
                            step_mode: wgpu::VertexStepMode::Vertex,
                            attributes: &wgpu::vertex_attr_array![
                                0 => Float32x3,
                                1 => Float32x3,
                                2 => Float32x2,
                            ],
                        }],
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &program.module,
                        entry_point: Some("fs_main"),
                        compilation_options: Default::default(),
                        targets: &targets,
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: key.raster.cull_faces.then_some(wgpu::Face::Back),
                        polygon_mode,
                        ..Default::default()
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: DEPTH_FORMAT,
                        depth_write_enabled: key.raster.depth_test,
                        depth_compare: if key.raster.depth_test {
                            wgpu::CompareFunction::Less
                        } else {
                            wgpu::CompareFunction::Always
                        },
                        stencil: Default::default(),
                        bias: Default::default(),
                    }),
                    multisample: Default::default(),
                    multiview: None,
                    cache: None,
                }),
        )
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface: &wgpu::TextureView,
        pass: &crate::plan::PassPlan,
        failures: &mut Vec<DeviceError>,
    ) -> usize {
        let (color_load, depth_load) = match pass.clear {
            Some(([r, g, b, a], depth)) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: r.into(),
                    g: g.into(),
                    b: b.into(),
                    a: a.into(),
                }),
                wgpu::LoadOp::Clear(depth),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };
        let (color, depth_view) = match pass.framebuffer {
            Framebuffer::Default => (
                vec![color_attachment(surface, color_load)],
                &self.default_depth.view,
            ),
            Framebuffer::Offscreen(id) => {
                let Some(attachments) = self.targets.get(&id).and_then(|t| t.attachments.as_ref())
                else {
                    tracing::warn!(target_id = id.0, "skipping pass into an incomplete target");
                    return 0;
                };
                let color = attachments
                    .color
                    .iter()
                    .map(|view| color_attachment(view, color_load))
                    .collect();
                (color, &attachments.depth_view)
            }
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("deferred_pass"),
            color_attachments: &color,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        let offscreen = matches!(pass.framebuffer, Framebuffer::Offscreen(_));
        let mut drawn = 0;
        for draw in &pass.draws {
            let key = PipelineKey {
                program: draw.program,
                raster: draw.raster,
                offscreen,
            };
            let (Some(pipeline), Some(program), Some(mesh)) = (
                self.pipelines.get(&key),
                self.programs.get(draw.program.0 as usize),
                self.meshes.get(draw.mesh.0 as usize),
            ) else {
                failures.push(DeviceError::Backend(format!(
                    "draw of mesh {} with program {} has no pipeline",
                    draw.mesh.0, draw.program.0
                )));
                continue;
            };

            render_pass.set_pipeline(pipeline);
            let globals_offset = self.globals.offset(draw.globals);
            let draw_offset = self.draws.offset(draw.draw);
            render_pass.set_bind_group(0, &self.globals.bind_group, &[globals_offset]);
            render_pass.set_bind_group(1, &self.draws.bind_group, &[draw_offset]);
            if program.kind == ProgramKind::Lighting {
                let gbuffer = draw
                    .gbuffer
                    .and_then(|id| self.targets.get(&id))
                    .and_then(|t| t.attachments.as_ref());
                let Some(gbuffer) = gbuffer else {
                    failures.push(DeviceError::Backend(
                        "lighting draw without a bound G-buffer".into(),
                    ));
                    continue;
                };
                render_pass.set_bind_group(2, &gbuffer.bind_group, &[]);
            }
            render_pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            render_pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            drawn += 1;
        }
        drawn
    }

    fn encode_depth_copy(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        from: RenderTargetId,
        width: u32,
        height: u32,
    ) {
        let Some(source) = self.targets.get(&from).and_then(|t| t.attachments.as_ref()) else {
            tracing::warn!(target_id = from.0, "depth copy from an incomplete target");
            return;
        };
        let dest = &self.default_depth;
        let source_size = source.depth.size();
        if (width, height) != (dest.width, dest.height)
            || (width, height) != (source_size.width, source_size.height)
        {
            tracing::warn!(
                width,
                height,
                surface_width = dest.width,
                surface_height = dest.height,
                "depth copy size mismatch, skipped"
            );
            return;
        }
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source.depth,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dest.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::DepthOnly,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_attachments(&self, desc: &RenderTargetDesc) -> Attachments {
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = |label: &str, format, usage| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let color: Vec<wgpu::TextureView> = ["g_position", "g_normal", "g_diffuse", "g_specular"]
            .into_iter()
            .map(|label| {
                texture(
                    label,
                    GBUFFER_FORMAT,
                    wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING,
                )
                .create_view(&Default::default())
            })
            .collect();
        let depth = texture(
            "g_depth",
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth_view = depth.create_view(&Default::default());

        let filter = match (desc.sampling.filter, self.filterable) {
            (Filter::Linear, true) => wgpu::FilterMode::Linear,
            _ => wgpu::FilterMode::Nearest,
        };
        let address = wgpu::AddressMode::ClampToEdge;
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("gbuffer_sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: filter,
            min_filter: filter,
            ..Default::default()
        });

        let mut entries: Vec<wgpu::BindGroupEntry> = color
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: 4,
            resource: wgpu::BindingResource::Sampler(&sampler),
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer_bind_group"),
            layout: &self.layouts.gbuffer,
            entries: &entries,
        });

        Attachments {
            color,
            depth,
            depth_view,
            bind_group,
        }
    }

    fn known_target(&self, id: RenderTargetId) -> Result<(), DeviceError> {
        if self.targets.contains_key(&id) {
            Ok(())
        } else {
            Err(DeviceError::UnknownTarget(id))
        }
    }

    fn check_command(&self, command: &Command) -> Result<(), DeviceError> {
        match *command {
            Command::BindTarget(Framebuffer::Offscreen(id)) => self.known_target(id),
            Command::BindAttachment { target, .. } => self.known_target(target),
            Command::BlitDepth { from, .. } => self.known_target(from),
            Command::UseProgram(id) if id.0 as usize >= self.programs.len() => Err(
                DeviceError::Backend(format!("program {} was never compiled", id.0)),
            ),
            Command::DrawMesh(handle) if handle.id().0 as usize >= self.meshes.len() => Err(
                DeviceError::Backend(format!("mesh {} was never uploaded", handle.id().0)),
            ),
            _ => Ok(()),
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let source = shaders::source(kind);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{kind:?}_shader")),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Compile {
                kind,
                message: error.to_string(),
            });
        }
        let id = ProgramId(self.programs.len() as u32);
        tracing::debug!(?kind, id = id.0, "compiled program");
        self.programs.push(Program { kind, module });
        Ok(id)
    }

    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<MeshId, DeviceError> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(DeviceError::Upload("mesh has no triangles".into()));
        }
        let vertices: Vec<GpuVertex> = mesh.vertices.iter().map(GpuVertex::from).collect();
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_indices"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(GpuMesh {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: mesh.indices.len() as u32,
        });
        Ok(id)
    }

    fn create_render_target(
        &mut self,
        desc: &RenderTargetDesc,
    ) -> Result<RenderTargetId, DeviceError> {
        let mut status = validate_target(
            desc,
            self.limits.max_texture_dimension_2d,
            self.limits.max_color_attachments,
        );
        if status.is_complete()
            && self.limits.max_color_attachment_bytes_per_sample < GBUFFER_BYTES_PER_SAMPLE
        {
            status = TargetStatus::Incomplete(IncompleteReason::Backend(format!(
                "{GBUFFER_BYTES_PER_SAMPLE} color bytes per sample exceed the device limit of {}",
                self.limits.max_color_attachment_bytes_per_sample
            )));
        }

        let mut attachments = None;
        if status.is_complete() {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let created = self.create_attachments(desc);
            match pollster::block_on(self.device.pop_error_scope()) {
                Some(error) => {
                    status = TargetStatus::Incomplete(IncompleteReason::Backend(error.to_string()))
                }
                None => attachments = Some(created),
            }
        }

        let id = RenderTargetId(self.next_target);
        self.next_target += 1;
        self.targets.insert(
            id,
            GpuTarget {
                width: desc.width,
                height: desc.height,
                status,
                attachments,
            },
        );
        Ok(id)
    }

    fn target_status(&self, id: RenderTargetId) -> TargetStatus {
        match self.targets.get(&id) {
            Some(target) => target.status.clone(),
            None => TargetStatus::Incomplete(IncompleteReason::Backend(format!(
                "unknown render target {}",
                id.0
            ))),
        }
    }

    fn release_render_target(&mut self, id: RenderTargetId) {
        if let Some(target) = self.targets.remove(&id) {
            tracing::debug!(
                id = id.0,
                width = target.width,
                height = target.height,
                "released render target"
            );
        }
    }

    fn execute(&mut self, command: Command) {
        let result = self
            .check_command(&command)
            .and_then(|()| self.recorder.record(command));
        if let Err(error) = result {
            push_error(&self.errors, error);
        }
    }

    fn poll_error(&mut self) -> Option<DeviceError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}
