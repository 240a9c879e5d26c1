//! [`FrameShader`] on top of `wgpu` compute.

use std::sync::mpsc;

use pollster::block_on;
use tracing::{debug, info};

use crate::error::RenderError;
use crate::gpu::{FrameShader, GpuFrame};

const WORKGROUP: u32 = 8;

struct Pipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

pub struct WgpuShader {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: Option<Pipeline>,
}

impl WgpuShader {
    /// Open the default adapter. Fails when no adapter or device is available.
    pub fn new() -> crate::Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| RenderError::GpuUnavailable("no suitable adapter".into()))?;

        let (device, queue) = block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("refract-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| RenderError::GpuUnavailable(e.to_string()))?;

        info!(adapter = %adapter.get_info().name, "GPU device ready");
        Ok(Self {
            device,
            queue,
            pipeline: None,
        })
    }

    fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }

    fn buffer_with(&self, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: contents.len() as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&buffer, 0, contents);
        buffer
    }
}

impl FrameShader for WgpuShader {
    fn compile(&mut self, source: &str) -> crate::Result<()> {
        self.pipeline = None;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("refract-frame"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("refract-frame-layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    Self::storage_entry(1, true),
                    Self::storage_entry(2, false),
                    Self::storage_entry(3, true),
                ],
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("refract-frame-pipeline-layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("refract-frame-pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: "main",
            });

        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderCompile(err.to_string()));
        }
        debug!(bytes = source.len(), "Compute pipeline created");
        self.pipeline = Some(Pipeline { layout, pipeline });
        Ok(())
    }

    fn draw(&mut self, frame: &GpuFrame<'_>) -> crate::Result<Vec<u8>> {
        let Some(pipeline) = &self.pipeline else {
            return Err(RenderError::GpuFrame("no compiled pipeline".into()));
        };
        let (width, height) = (frame.uniforms.width, frame.uniforms.height);
        let out_size = width as u64 * height as u64 * 4;
        if out_size == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }

        let palette = frame.palette.packed();
        let params = self.buffer_with(
            "refract-params",
            bytemuck::bytes_of(&frame.uniforms),
            wgpu::BufferUsages::UNIFORM,
        );
        let palette = self.buffer_with(
            "refract-palette",
            bytemuck::cast_slice(&palette),
            wgpu::BufferUsages::STORAGE,
        );
        let seeds = self.buffer_with(
            "refract-seeds",
            bytemuck::cast_slice(&frame.seeds),
            wgpu::BufferUsages::STORAGE,
        );
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("refract-output"),
            size: out_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("refract-readback"),
            size: out_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("refract-frame-bind-group"),
            layout: &pipeline.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: palette.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: seeds.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("refract-frame-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("refract-frame-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(width.div_ceil(WORKGROUP), height.div_ceil(WORKGROUP), 1);
        }
        encoder.copy_buffer_to_buffer(&output, 0, &readback, 0, out_size);
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::GpuFrame(e.to_string()))?
            .map_err(|e| RenderError::GpuFrame(e.to_string()))?;

        let pixels = slice.get_mapped_range().to_vec();
        readback.unmap();
        Ok(pixels)
    }
}
