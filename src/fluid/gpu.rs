// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use half::f16;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{FieldId, FluidBackend, PassDescriptor, PassKind, StepParams};
use crate::error::EtherError;
use crate::output::OutputStage;
use crate::palette::PaletteTexture;
use crate::settings::{EtherSettings, FieldPrecision};
use crate::viewport::GridSize;

const WORKGROUP_SIZE: u32 = 16;
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const PASS_KINDS: [PassKind; 6] = [
    PassKind::Advect,
    PassKind::ExternalForce,
    PassKind::Viscous,
    PassKind::Divergence,
    PassKind::Poisson,
    PassKind::Project,
];

struct FieldTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

type BindKey = (FieldId, FieldId, FieldId);

/// wgpu backend: one storage texture per field, one compute pipeline per
/// pass kind, a render pipeline for the output stage.
pub struct GpuFields {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    offscreen: Option<FieldTexture>,
    offscreen_size: (u32, u32),
    field_format: wgpu::TextureFormat,
    layout: wgpu::BindGroupLayout,
    pipelines: HashMap<PassKind, wgpu::ComputePipeline>,
    params_buffer: wgpu::Buffer,
    fields: Vec<FieldTexture>,
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
    grid: GridSize,
    encoder: Option<wgpu::CommandEncoder>,
    output: OutputStage,
    fault: Arc<Mutex<Option<String>>>,
    released: bool,
}

impl GpuFields {
    /// Backend drawing into `window`'s surface.
    pub fn windowed(window: Arc<Window>, settings: &EtherSettings) -> Result<Self, EtherError> {
        pollster::block_on(Self::new(Some(window), settings))
    }

    /// Backend without a surface; `present` renders into an offscreen texture.
    pub fn headless(settings: &EtherSettings) -> Result<Self, EtherError> {
        pollster::block_on(Self::new(None, settings))
    }

    async fn new(window: Option<Arc<Window>>, settings: &EtherSettings) -> Result<Self, EtherError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = match &window {
            Some(window) => Some(instance.create_surface(window.clone())?),
            None => None,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(EtherError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        if !adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(EtherError::MissingCapability("compute shaders"));
        }

        let full_storage = adapter
            .get_texture_format_features(wgpu::TextureFormat::Rgba32Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING);
        let field_format = choose_field_format(settings.precision, info.backend, full_storage);
        log::info!("Fluid fields stored as {:?}", field_format);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("LiquidEther Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let fault = Arc::new(Mutex::new(None));
        {
            let fault = fault.clone();
            device.on_uncaptured_error(Box::new(move |err| {
                log::error!("Uncaptured GPU error: {}", err);
                if let Ok(mut slot) = fault.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            }));
        }
        {
            let fault = fault.clone();
            device.set_device_lost_callback(move |reason, message| {
                if matches!(reason, wgpu::DeviceLostReason::Destroyed | wgpu::DeviceLostReason::Dropped) {
                    return;
                }
                log::error!("GPU device lost ({:?}): {}", reason, message);
                if let Ok(mut slot) = fault.lock() {
                    slot.get_or_insert_with(|| format!("device lost: {}", message));
                }
            });
        }

        // Surface
        let surface_config = match (&surface, &window) {
            (Some(surface), Some(window)) => {
                let caps = surface.get_capabilities(&adapter);
                let Some(&first_format) = caps.formats.first() else {
                    return Err(EtherError::SurfaceUnsupported);
                };
                // Palette bytes are written as-is, so skip sRGB encoding.
                let format = caps.formats.iter().copied().find(|f| !f.is_srgb()).unwrap_or(first_format);
                let alpha_mode = caps
                    .alpha_modes
                    .iter()
                    .copied()
                    .find(|m| *m == wgpu::CompositeAlphaMode::PreMultiplied)
                    .or_else(|| caps.alpha_modes.first().copied())
                    .unwrap_or(wgpu::CompositeAlphaMode::Auto);
                let size = window.inner_size();
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width: size.width.max(1),
                    height: size.height.max(1),
                    present_mode: wgpu::PresentMode::Fifo,
                    alpha_mode,
                    view_formats: vec![],
                    desired_maximum_frame_latency: 2,
                };
                surface.configure(&device, &config);
                log::debug!("Surface configured as {:?} with {:?}", format, alpha_mode);
                Some(config)
            }
            _ => None,
        };
        let target_format = surface_config.as_ref().map(|c| c.format).unwrap_or(OFFSCREEN_FORMAT);

        // Compute pipelines
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let storage_name = match field_format {
            wgpu::TextureFormat::Rgba16Float => "rgba16float",
            _ => "rgba32float",
        };
        let source = include_str!("../../shaders/fluid.wgsl").replace("FIELD_FORMAT", storage_name);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fluid Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let read_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Fluid Bind Group Layout"),
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
                read_entry(1),
                read_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: field_format,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Fluid Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines: HashMap<PassKind, wgpu::ComputePipeline> = PASS_KINDS
            .iter()
            .map(|&kind| {
                let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(kind.label()),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: kind.entry_point(),
                    compilation_options: Default::default(),
                    cache: None,
                });
                (kind, pipeline)
            })
            .collect();

        if let Some(err) = device.pop_error_scope().await {
            return Err(EtherError::ShaderCompilation {
                shader: "fluid.wgsl".into(),
                message: err.to_string(),
            });
        }

        let palette = PaletteTexture::from_stops(&settings.colors);
        let output = OutputStage::new(&device, &queue, target_format, &palette, settings.background_color).await?;

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Step Params"),
            contents: bytemuck::cast_slice(&[<StepParams as bytemuck::Zeroable>::zeroed()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            offscreen: None,
            offscreen_size: (1, 1),
            field_format,
            layout,
            pipelines,
            params_buffer,
            fields: Vec::new(),
            bind_groups: HashMap::new(),
            grid: GridSize::new(1, 1),
            encoder: None,
            output,
            fault,
            released: false,
        })
    }

    pub fn field_format(&self) -> wgpu::TextureFormat {
        self.field_format
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn check_fault(&self) -> Result<(), EtherError> {
        let message = match self.fault.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => Some("fault flag poisoned".to_string()),
        };
        match message {
            Some(message) => Err(EtherError::GpuFault { message }),
            None => Ok(()),
        }
    }

    fn create_field(&self, id: FieldId, grid: GridSize) -> FieldTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(id.label()),
            size: wgpu::Extent3d { width: grid.width, height: grid.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.field_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        FieldTexture { texture, view }
    }

    fn create_bind_group(&self, key: BindKey) -> wgpu::BindGroup {
        let (a, b, out) = key;
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Fluid Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.params_buffer.as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.fields[a.slot()].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.fields[b.slot()].view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.fields[out.slot()].view),
                },
            ],
        })
    }

    fn destroy_fields(&mut self) {
        self.bind_groups.clear();
        for field in self.fields.drain(..) {
            field.texture.destroy();
        }
    }

    fn render_offscreen(&mut self, parity: usize) {
        let Some(target) = &self.offscreen else {
            return;
        };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Offscreen Output"),
        });
        self.output.draw(&mut encoder, &target.view, parity);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Copies a velocity field back to the host, row 0 first (bottom).
    pub async fn read_velocity(&self, id: FieldId) -> Result<Vec<Vec2>, EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        let Some(field) = self.fields.get(id.slot()) else {
            return Err(EtherError::Disposed);
        };
        let texel_bytes: u32 = match self.field_format {
            wgpu::TextureFormat::Rgba16Float => 8,
            _ => 16,
        };
        let (width, height) = (self.grid.width, self.grid.height);
        let unpadded = width * texel_bytes;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Velocity Staging"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Read Velocity"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &field.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match receiver.receive().await {
            Some(Ok(())) => {}
            Some(Err(err)) => return Err(EtherError::GpuFault { message: err.to_string() }),
            None => return Err(EtherError::GpuFault { message: "readback channel closed".into() }),
        }

        let data = buffer_slice.get_mapped_range();
        let mut result = Vec::with_capacity((width * height) as usize);
        for row in data.chunks(padded as usize) {
            for texel in row[..unpadded as usize].chunks(texel_bytes as usize) {
                result.push(decode_texel_xy(texel));
            }
        }
        drop(data);
        staging_buffer.unmap();
        staging_buffer.destroy();

        Ok(result)
    }

    pub fn read_velocity_blocking(&self, id: FieldId) -> Result<Vec<Vec2>, EtherError> {
        pollster::block_on(self.read_velocity(id))
    }
}

impl FluidBackend for GpuFields {
    fn allocate(&mut self, grid: GridSize) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        self.destroy_fields();
        self.fields = FieldId::ALL.iter().map(|&id| self.create_field(id, grid)).collect();
        self.grid = grid;
        self.output.bind_velocity(
            &self.device,
            &self.queue,
            [&self.fields[0].view, &self.fields[1].view],
            grid.as_vec2().to_array(),
        );
        self.check_fault()
    }

    fn begin_step(&mut self, params: &StepParams) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        self.check_fault()?;
        self.queue.write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&[*params]));
        self.encoder = Some(self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Fluid Step"),
        }));
        Ok(())
    }

    fn run_pass(&mut self, pass: &PassDescriptor) {
        if self.released || self.fields.is_empty() {
            return;
        }
        let key = (pass.primary, pass.secondary_or_primary(), pass.output);
        if !self.bind_groups.contains_key(&key) {
            let bind_group = self.create_bind_group(key);
            self.bind_groups.insert(key, bind_group);
        }

        let (Some(encoder), Some(bind_group), Some(pipeline)) =
            (self.encoder.as_mut(), self.bind_groups.get(&key), self.pipelines.get(&pass.kind))
        else {
            return;
        };

        let wx = self.grid.width.div_ceil(WORKGROUP_SIZE);
        let wy = self.grid.height.div_ceil(WORKGROUP_SIZE);
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(pass.kind.label()),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, bind_group, &[]);
        cpass.dispatch_workgroups(wx, wy, 1);
    }

    fn end_step(&mut self) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.check_fault()
    }

    fn present(&mut self, velocity: FieldId, target: (u32, u32)) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        self.resize_output(target.0, target.1);
        let parity = velocity.slot() & 1;

        let Some(surface) = &self.surface else {
            self.render_offscreen(parity);
            return self.check_fault();
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                if let Some(config) = &self.surface_config {
                    surface.configure(&self.device, config);
                }
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::debug!("Surface timeout, skipping frame");
                return Ok(());
            }
            Err(err) => return Err(EtherError::GpuFault { message: err.to_string() }),
        };

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        self.output.draw(&mut encoder, &view, parity);
        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();

        self.check_fault()
    }

    fn resize_output(&mut self, width: u32, height: u32) {
        if self.released {
            return;
        }
        let (width, height) = (width.max(1), height.max(1));

        if let (Some(surface), Some(config)) = (&self.surface, &mut self.surface_config) {
            if config.width != width || config.height != height {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
                log::debug!("Surface resized to {}x{}", width, height);
            }
            return;
        }

        if self.offscreen.is_none() || self.offscreen_size != (width, height) {
            if let Some(old) = self.offscreen.take() {
                old.texture.destroy();
            }
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Offscreen Output"),
                size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: OFFSCREEN_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.offscreen = Some(FieldTexture { texture, view });
            self.offscreen_size = (width, height);
        }
    }

    fn has_canvas(&self) -> bool {
        !self.released && (self.surface.is_some() || self.offscreen.is_some())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.encoder = None;
        self.destroy_fields();
        if let Some(offscreen) = self.offscreen.take() {
            offscreen.texture.destroy();
        }
        self.output.release();
        self.params_buffer.destroy();
        self.surface_config = None;
        self.surface = None;
        self.released = true;
        log::info!("GPU resources released");
    }
}

/// Half precision on GL (the mobile/web class of adapters) or when 32-bit
/// float storage textures are unavailable.
pub fn choose_field_format(
    precision: FieldPrecision,
    backend: wgpu::Backend,
    full_storage: bool,
) -> wgpu::TextureFormat {
    let half = wgpu::TextureFormat::Rgba16Float;
    let full = wgpu::TextureFormat::Rgba32Float;
    match precision {
        FieldPrecision::Half => half,
        FieldPrecision::Full if full_storage => full,
        FieldPrecision::Full => {
            log::warn!("Adapter cannot store 32-bit float fields, falling back to half precision");
            half
        }
        FieldPrecision::Auto => {
            if backend == wgpu::Backend::Gl || !full_storage {
                half
            } else {
                full
            }
        }
    }
}

fn decode_texel_xy(texel: &[u8]) -> Vec2 {
    match texel.len() {
        8 => Vec2::new(
            f16::from_le_bytes([texel[0], texel[1]]).to_f32(),
            f16::from_le_bytes([texel[2], texel[3]]).to_f32(),
        ),
        16 => Vec2::new(
            f32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]),
            f32::from_le_bytes([texel[4], texel[5], texel[6], texel[7]]),
        ),
        _ => Vec2::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texels_decode_by_width() {
        let mut full = Vec::new();
        full.extend_from_slice(&0.25f32.to_le_bytes());
        full.extend_from_slice(&(-1.5f32).to_le_bytes());
        full.extend_from_slice(&[0; 8]);
        assert_eq!(decode_texel_xy(&full), Vec2::new(0.25, -1.5));

        let halves = [0x00, 0x3c, 0x00, 0xc0, 0, 0, 0, 0];
        assert_eq!(decode_texel_xy(&halves), Vec2::new(1.0, -2.0));

        let mut small = Vec::new();
        small.extend_from_slice(&f16::from_f32(0.5).to_le_bytes());
        small.extend_from_slice(&f16::from_bits(0x0001).to_le_bytes());
        small.extend_from_slice(&[0; 4]);
        assert_eq!(decode_texel_xy(&small), Vec2::new(0.5, 2f32.powi(-24)));

        assert_eq!(decode_texel_xy(&[0; 3]), Vec2::ZERO);
    }

    #[test]
    fn field_format_follows_precision_and_adapter() {
        use wgpu::{Backend, TextureFormat};
        assert_eq!(choose_field_format(FieldPrecision::Auto, Backend::Vulkan, true), TextureFormat::Rgba32Float);
        assert_eq!(choose_field_format(FieldPrecision::Auto, Backend::Gl, true), TextureFormat::Rgba16Float);
        assert_eq!(choose_field_format(FieldPrecision::Auto, Backend::Metal, false), TextureFormat::Rgba16Float);
        assert_eq!(choose_field_format(FieldPrecision::Half, Backend::Vulkan, true), TextureFormat::Rgba16Float);
        assert_eq!(choose_field_format(FieldPrecision::Full, Backend::Dx12, false), TextureFormat::Rgba16Float);
    }
}
