use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use crate::device::{Gpu, PhysicalDevice};
use crate::error::ExposureError;
use crate::render::{DeviceFrame, Frame, TextureReadback};

use super::{
    CpuReducer, Histogram, PendingReduction, PixelReducer, ReducedFrame, Reduction, ReductionPoll,
};

const WORKGROUP_SIZE: u32 = 8;

type MapResult = Result<(), wgpu::BufferAsyncError>;

/// Parallel reducer: a counting compute pass followed by a non-blocking
/// buffer readback.
///
/// Every call allocates its own counter and staging buffers; they belong to
/// the returned [`PendingReduction`] and are released when it is dropped.
pub struct GpuReducer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
    supports_compute: bool,

    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
}

impl GpuReducer {
    pub fn new(gpu: &Gpu) -> Self {
        Self {
            device: gpu.device().clone(),
            queue: gpu.queue().clone(),
            lost: gpu.lost_flag(),
            supports_compute: gpu.supports_compute(),
            pipeline: None,
            bind_group_layout: None,
        }
    }

    #[inline]
    pub fn supports_compute(&self) -> bool {
        self.supports_compute
    }

    fn ensure_pipeline(&mut self) {
        if self.pipeline.is_some() {
            return;
        }

        let shader_src = include_str!("shaders/count_pixels.wgsl");
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("exposure count shader"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("exposure count bgl"),
                    entries: &[
                        wgpu::BindGroupLayoutEntry {
                            binding: 0,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                                view_dimension: wgpu::TextureViewDimension::D2,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Storage { read_only: false },
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout =
            self.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("exposure count pipeline layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    immediate_size: 0,
                });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("exposure count pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("cs_main"),
                compilation_options: Default::default(),
                cache: None,
            });

        self.pipeline = Some(pipeline);
        self.bind_group_layout = Some(bind_group_layout);
    }

    fn dispatch(
        &mut self,
        frame: &DeviceFrame,
        palette_len: u32,
        want_image: bool,
    ) -> Result<GpuReadback, ExposureError> {
        self.ensure_pipeline();
        let Some(pipeline) = self.pipeline.as_ref() else {
            return Err(ExposureError::DeviceFailure("count pipeline unavailable".into()));
        };
        let Some(bgl) = self.bind_group_layout.as_ref() else {
            return Err(ExposureError::DeviceFailure("count bind group layout unavailable".into()));
        };

        // Zero-length storage bindings are invalid; keep one spare slot.
        let counts_size = (palette_len.max(1) as u64) * std::mem::size_of::<u32>() as u64;
        let counts = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("exposure count buffer"),
            size: counts_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("exposure count staging"),
            size: counts_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let view = frame
            .texture()
            .create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("exposure count bind group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: counts.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("exposure count encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("exposure count pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            let res = frame.resolution();
            cpass.dispatch_workgroups(
                res.width.div_ceil(WORKGROUP_SIZE),
                res.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        encoder.copy_buffer_to_buffer(&counts, 0, &staging, 0, counts_size);

        let image = want_image.then(|| {
            let layout = TextureReadback::new(frame.resolution());
            let buffer = layout.create_buffer(&self.device, "exposure count image staging");
            layout.encode_copy(&mut encoder, frame.texture(), &buffer);
            (layout, buffer)
        });

        self.queue.submit(std::iter::once(encoder.finish()));

        let counts_rx = map_read(&staging);
        let image = image.map(|(layout, buffer)| MappedImage {
            rx: map_read(&buffer),
            layout,
            buffer,
            ready: false,
        });

        Ok(GpuReadback {
            device: self.device.clone(),
            palette_len,
            counts: staging,
            counts_rx,
            counts_ready: false,
            image,
            finished: false,
        })
    }
}

impl PixelReducer for GpuReducer {
    fn device(&self) -> PhysicalDevice {
        PhysicalDevice::Gpu
    }

    fn reduce(
        &mut self,
        frame: &Frame,
        palette_len: u32,
        want_image: bool,
    ) -> Result<Reduction, ExposureError> {
        if !self.supports_compute {
            return Err(ExposureError::DeviceFailure("compute shaders unsupported".into()));
        }
        if self.lost.load(Ordering::Acquire) {
            return Err(ExposureError::DeviceFailure("device lost".into()));
        }

        match frame {
            Frame::Device(device_frame) => {
                let readback = self.dispatch(device_frame, palette_len, want_image)?;
                Ok(Reduction::Pending(Box::new(readback)))
            }
            // Nothing to dispatch on; count where the pixels already are.
            Frame::Host(_) => CpuReducer::new().reduce(frame, palette_len, want_image),
        }
    }
}

fn map_read(buffer: &wgpu::Buffer) -> Receiver<MapResult> {
    let (tx, rx) = mpsc::channel();
    buffer
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
    rx
}

/// Checks a map callback without blocking. `Ok(true)` once mapped.
fn mapped(rx: &Receiver<MapResult>, ready: &mut bool, what: &str) -> Result<bool, ExposureError> {
    if *ready {
        return Ok(true);
    }
    match rx.try_recv() {
        Ok(Ok(())) => {
            *ready = true;
            Ok(true)
        }
        Ok(Err(e)) => Err(ExposureError::device(what, e)),
        Err(TryRecvError::Empty) => Ok(false),
        Err(TryRecvError::Disconnected) => Err(ExposureError::DeviceFailure(format!(
            "{what}: map callback dropped"
        ))),
    }
}

struct MappedImage {
    layout: TextureReadback,
    buffer: wgpu::Buffer,
    rx: Receiver<MapResult>,
    ready: bool,
}

/// Readback of one GPU reduction.
struct GpuReadback {
    device: wgpu::Device,
    palette_len: u32,
    counts: wgpu::Buffer,
    counts_rx: Receiver<MapResult>,
    counts_ready: bool,
    image: Option<MappedImage>,
    finished: bool,
}

impl GpuReadback {
    fn step(&mut self) -> Result<Option<ReducedFrame>, ExposureError> {
        self.device
            .poll(wgpu::PollType::Poll)
            .map_err(|e| ExposureError::device("readback poll", e))?;

        let counts_done = mapped(&self.counts_rx, &mut self.counts_ready, "count readback")?;
        let image_done = match self.image.as_mut() {
            Some(img) => mapped(&img.rx, &mut img.ready, "image readback")?,
            None => true,
        };
        if !(counts_done && image_done) {
            return Ok(None);
        }

        let counts: Vec<u32> = {
            let view = self.counts.slice(..).get_mapped_range();
            view.chunks_exact(4)
                .take(self.palette_len as usize)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        };
        self.counts.unmap();

        let image = self.image.as_ref().map(|img| {
            let image = {
                let view = img.buffer.slice(..).get_mapped_range();
                img.layout.read(&view)
            };
            img.buffer.unmap();
            image
        });

        Ok(Some(ReducedFrame {
            histogram: Histogram::from_counts(counts),
            image,
        }))
    }
}

impl PendingReduction for GpuReadback {
    fn poll(&mut self) -> ReductionPoll {
        if self.finished {
            return ReductionPoll::Failed(ExposureError::DeviceFailure(
                "readback already consumed".into(),
            ));
        }
        match self.step() {
            Ok(None) => ReductionPoll::Pending,
            Ok(Some(out)) => {
                self.finished = true;
                ReductionPoll::Ready(out)
            }
            Err(err) => {
                self.finished = true;
                ReductionPoll::Failed(err)
            }
        }
    }
}
