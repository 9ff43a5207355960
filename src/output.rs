// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Velocity-to-color stage: palette lookup by speed, blended over the
//! background with speed as both color and alpha weight.

use glam::{Vec2, Vec3, Vec4};

use crate::error::EtherError;
use crate::palette::PaletteTexture;

/// Straight-alpha color for one velocity sample, components in [0, 1].
pub fn shade(velocity: Vec2, palette: &PaletteTexture, background: Vec4) -> Vec4 {
    let lenv = velocity.length().clamp(0.0, 1.0);
    let c = Vec3::from_array(palette.sample(lenv));
    let rgb = background.truncate().lerp(c, lenv);
    let a = background.w + (1.0 - background.w) * lenv;
    rgb.extend(a)
}

pub fn to_rgba8(color: Vec4) -> [u8; 4] {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

/// CPU framebuffer, row 0 at the top like an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[u8; 4]>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self { width, height, pixels: vec![[0; 4]; width as usize * height as usize] }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn to_image(&self) -> image::RgbaImage {
        let mut img = image::RgbaImage::new(self.width, self.height);
        for (i, px) in self.pixels.iter().enumerate() {
            let x = i as u32 % self.width;
            let y = i as u32 / self.width;
            img.put_pixel(x, y, image::Rgba(*px));
        }
        img
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OutputParams {
    pub background: [f32; 4],
    pub fbo_size: [f32; 2],
    pub _pad: [f32; 2],
}

const _: [(); 32] = [(); std::mem::size_of::<OutputParams>()];

/// GPU half of the output stage: a fullscreen-triangle pipeline reading
/// the velocity field and the palette texture.
pub struct OutputStage {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    palette_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    palette_texture: wgpu::Texture,
    background: [f32; 4],
    bind_groups: Vec<wgpu::BindGroup>,
}

impl OutputStage {
    pub async fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        palette: &PaletteTexture,
        background: [f32; 4],
    ) -> Result<Self, EtherError> {
        use wgpu::util::DeviceExt;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Output Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/output.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Output Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Output Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Output Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(err) = device.pop_error_scope().await {
            return Err(EtherError::ShaderCompilation {
                shader: "output.wgsl".into(),
                message: err.to_string(),
            });
        }

        let palette_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Palette"),
                size: wgpu::Extent3d { width: palette.width(), height: 1, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            palette.as_bytes(),
        );
        let palette_view = palette_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Palette Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Output Params"),
            contents: bytemuck::cast_slice(&[OutputParams {
                background,
                fbo_size: [1.0, 1.0],
                _pad: [0.0; 2],
            }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            pipeline,
            layout,
            params_buffer,
            palette_view,
            sampler,
            palette_texture,
            background,
            bind_groups: Vec::new(),
        })
    }

    /// Rebuilds one bind group per velocity buffer after the fields are
    /// reallocated.
    pub fn bind_velocity(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, velocity: [&wgpu::TextureView; 2], fbo_size: [f32; 2]) {
        queue.write_buffer(
            &self.params_buffer,
            0,
            bytemuck::cast_slice(&[OutputParams { background: self.background, fbo_size, _pad: [0.0; 2] }]),
        );
        self.bind_groups = velocity
            .iter()
            .enumerate()
            .map(|(i, view)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(if i == 0 { "Output Bind Group 0" } else { "Output Bind Group 1" }),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry { binding: 0, resource: self.params_buffer.as_entire_binding() },
                        wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(view) },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&self.palette_view),
                        },
                        wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&self.sampler) },
                    ],
                })
            })
            .collect();
    }

    /// Clears `view` to transparent and draws the shaded field over it.
    pub fn draw(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, parity: usize) {
        let Some(bind_group) = self.bind_groups.get(parity & 1) else {
            return;
        };
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Output Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);
        render_pass.draw(0..3, 0..1); // Full-screen triangle
    }

    pub fn release(&mut self) {
        self.bind_groups.clear();
        self.palette_texture.destroy();
        self.params_buffer.destroy();
    }
}
