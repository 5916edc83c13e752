use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::device::Gpu;
use crate::error::ExposureError;
use crate::geometry::{CameraInfo, Resolution};
use crate::scene::DrawList;

use super::{DeviceFrame, Frame, Rasterizer};

/// Format of the tag target. Unorm keeps byte values exact.
pub(crate) const TAG_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Tag rasterizer running a wgpu render pass.
///
/// Meshes shared between draw items are uploaded once per render. Each render
/// allocates its own color texture, which the returned [`DeviceFrame`] owns.
pub struct GpuRasterizer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,

    pipeline: Option<wgpu::RenderPipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
}

impl GpuRasterizer {
    pub fn new(gpu: &Gpu) -> Self {
        Self {
            device: gpu.device().clone(),
            queue: gpu.queue().clone(),
            lost: gpu.lost_flag(),
            pipeline: None,
            bind_group_layout: None,
        }
    }

    fn ensure_pipeline(&mut self) {
        if self.pipeline.is_some() {
            return;
        }

        let shader_src = include_str!("shaders/tag.wgsl");
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("exposure tag shader"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("exposure tag bgl"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(
                                std::mem::size_of::<CameraUniform>() as u64,
                            ),
                        },
                        count: None,
                    }],
                });

        let pipeline_layout =
            self.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("exposure tag pipeline layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("exposure tag pipeline"),
            layout: Some(&pipeline_layout),

            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[MeshVertex::layout(), DrawInstance::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TAG_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),

            multiview_mask: None,
            cache: None,
        });

        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bind_group_layout);
    }

    fn create_target(&self, resolution: Resolution, format: wgpu::TextureFormat, label: &str) -> wgpu::Texture {
        let usage = if format == TAG_FORMAT {
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        };
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        })
    }
}

impl Rasterizer for GpuRasterizer {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn render(
        &mut self,
        scene: &DrawList,
        camera: Option<&CameraInfo>,
        resolution: Resolution,
    ) -> Result<Frame, ExposureError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(ExposureError::DeviceFailure("device lost".into()));
        }
        let max_side = self.device.limits().max_texture_dimension_2d;
        if resolution.is_empty() || resolution.width > max_side || resolution.height > max_side {
            return Err(ExposureError::InvalidResolution {
                width: resolution.width,
                height: resolution.height,
            });
        }

        self.ensure_pipeline();
        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(ExposureError::DeviceFailure("tag pipeline unavailable".into()));
        };
        let Some(bgl) = self.bind_group_layout.as_ref() else {
            return Err(ExposureError::DeviceFailure("tag bind group layout unavailable".into()));
        };

        let color = self.create_target(resolution, TAG_FORMAT, "exposure tag target");
        let depth = self.create_target(resolution, DEPTH_FORMAT, "exposure tag depth");
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let batch = camera.map(|cam| SceneBatch::build(scene, cam));
        let buffers = batch
            .as_ref()
            .filter(|b| !b.draws.is_empty())
            .map(|b| b.upload(&self.device, bgl));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("exposure tag encoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("exposure tag pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let (Some(batch), Some(buffers)) = (batch.as_ref(), buffers.as_ref()) {
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, &buffers.bind_group, &[]);
                rpass.set_vertex_buffer(0, buffers.vertices.slice(..));
                rpass.set_vertex_buffer(1, buffers.instances.slice(..));
                rpass.set_index_buffer(buffers.indices.slice(..), wgpu::IndexFormat::Uint32);
                for (i, draw) in batch.draws.iter().enumerate() {
                    let i = i as u32;
                    rpass.draw_indexed(draw.indices.clone(), draw.base_vertex, i..i + 1);
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(Frame::Device(DeviceFrame {
            device: self.device.clone(),
            queue: self.queue.clone(),
            texture: color,
            resolution,
        }))
    }
}

/// Host-side geometry for one render: deduplicated meshes plus one instance
/// per draw item.
struct SceneBatch {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
    instances: Vec<DrawInstance>,
    draws: Vec<DrawRange>,
    camera: CameraUniform,
}

struct DrawRange {
    indices: std::ops::Range<u32>,
    base_vertex: i32,
}

struct SceneBuffers {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    instances: wgpu::Buffer,
    _camera: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl SceneBatch {
    fn build(scene: &DrawList, camera: &CameraInfo) -> Self {
        let mut batch = SceneBatch {
            vertices: Vec::new(),
            indices: Vec::new(),
            instances: Vec::with_capacity(scene.len()),
            draws: Vec::with_capacity(scene.len()),
            camera: CameraUniform {
                view_proj: camera.view_proj.to_cols_array_2d(),
            },
        };

        // Keyed by mesh address; the Arc keeps it alive for the whole build.
        let mut uploaded: HashMap<usize, DrawRange> = HashMap::new();
        for item in scene.items() {
            let key = Arc::as_ptr(&item.mesh) as usize;
            let range = uploaded.entry(key).or_insert_with(|| {
                let base_vertex = batch.vertices.len() as i32;
                let first = batch.indices.len() as u32;
                batch
                    .vertices
                    .extend(item.mesh.positions().iter().map(|p| MeshVertex { position: p.to_array() }));
                batch.indices.extend_from_slice(item.mesh.indices());
                DrawRange {
                    indices: first..batch.indices.len() as u32,
                    base_vertex,
                }
            });

            batch.draws.push(DrawRange {
                indices: range.indices.clone(),
                base_vertex: range.base_vertex,
            });
            batch.instances.push(DrawInstance {
                model: item.transform.to_cols_array_2d(),
                tag: item.tag.packed(),
            });
        }
        batch
    }

    fn upload(&self, device: &wgpu::Device, bgl: &wgpu::BindGroupLayout) -> SceneBuffers {
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("exposure tag vbo"),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("exposure tag ibo"),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let instances = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("exposure tag instance vbo"),
            contents: bytemuck::cast_slice(&self.instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let camera = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("exposure tag camera ubo"),
            contents: bytemuck::bytes_of(&self.camera),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("exposure tag bind group"),
            layout: bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera.as_entire_binding(),
            }],
        });
        SceneBuffers {
            vertices,
            indices,
            instances,
            _camera: camera,
            bind_group,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct MeshVertex {
    position: [f32; 3],
}

impl MeshVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![
        0 => Float32x3 // position
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DrawInstance {
    model: [[f32; 4]; 4],
    tag: u32,
}

impl DrawInstance {
    const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        1 => Float32x4, // model col 0
        2 => Float32x4, // model col 1
        3 => Float32x4, // model col 2
        4 => Float32x4, // model col 3
        5 => Uint32     // tag
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DrawInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}
