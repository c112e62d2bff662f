//! wgpu-backed production backend.
//!
//! Feature levels map onto wgpu limit tiers; swap chains are modeled as a
//! ring of presentable backbuffer textures (window-system integration is the
//! embedder's concern, the window handle is carried through unchanged).
//! Pixel-shader "bytecode" is WGSL source bytes: shader translation happens
//! upstream of this layer.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::{
    AdapterInfo, BackendError, BindFlags, BufferDesc, BufferId, GpuDevice, GpuFactory, PixelFormat,
    RasterizerDesc, RenderTargetViewId, ShaderId, ShaderStage, SwapChainDesc, SwapChainId,
    TextureDesc, TextureId,
};
use crate::FeatureLevel;

pub struct WgpuFactory {
    _instance: wgpu::Instance,
    adapters: Vec<wgpu::Adapter>,
}

impl WgpuFactory {
    pub fn new() -> Self {
        let instance = wgpu::Instance::default();
        let adapters = instance.enumerate_adapters(wgpu::Backends::all());
        debug!(adapter_count = adapters.len(), "enumerated wgpu adapters");
        Self {
            _instance: instance,
            adapters,
        }
    }
}

impl Default for WgpuFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn limits_for(level: FeatureLevel) -> wgpu::Limits {
    match level {
        FeatureLevel::L11_1 | FeatureLevel::L11_0 => wgpu::Limits::default(),
        FeatureLevel::L10_1 | FeatureLevel::L10_0 => wgpu::Limits::downlevel_defaults(),
        _ => wgpu::Limits::downlevel_webgl2_defaults(),
    }
}

fn wgpu_format(format: PixelFormat) -> Result<wgpu::TextureFormat, BackendError> {
    match format {
        PixelFormat::B8G8R8A8Unorm => Ok(wgpu::TextureFormat::Bgra8Unorm),
        // wgpu has no X8 variant; the alpha channel is simply never sampled.
        PixelFormat::B8G8R8X8Unorm => Ok(wgpu::TextureFormat::Bgra8Unorm),
        PixelFormat::R8G8B8A8Unorm => Ok(wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::R8Unorm => Ok(wgpu::TextureFormat::R8Unorm),
        // Alpha-only content lands in the single channel of R8.
        PixelFormat::A8Unorm => Ok(wgpu::TextureFormat::R8Unorm),
        PixelFormat::R32G32B32A32Float => Ok(wgpu::TextureFormat::Rgba32Float),
        PixelFormat::Unknown => Err(BackendError::InvalidArg("unknown pixel format")),
    }
}

impl GpuFactory for WgpuFactory {
    type Device = WgpuDevice;

    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        self.adapters
            .iter()
            .map(|adapter| AdapterInfo {
                name: adapter.get_info().name,
                // wgpu does not expose per-adapter display outputs; monitor
                // lookup falls through to the not-found sentinel.
                outputs: Vec::new(),
            })
            .collect()
    }

    fn create_device(
        &self,
        ordinal: u32,
        levels: &[FeatureLevel],
    ) -> Result<(WgpuDevice, FeatureLevel), BackendError> {
        let adapter = self.adapters.get(ordinal as usize).ok_or_else(|| {
            BackendError::InvalidCall(format!("adapter ordinal {ordinal} out of range"))
        })?;
        let supported = adapter.limits();
        let level = levels
            .iter()
            .copied()
            .find(|&level| limits_for(level).check_limits(&supported))
            .ok_or(BackendError::Unsupported(
                "no requested feature level fits adapter limits",
            ))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("glint device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits_for(level),
            },
            None,
        ))
        .map_err(|e| BackendError::InvalidCall(format!("request_device failed: {e}")))?;

        // Multisample capabilities live on the adapter; snapshot them now so
        // the device can answer quality queries without holding the adapter.
        let mut sample_flags = HashMap::new();
        for format in PixelFormat::ALL {
            if let Ok(wf) = wgpu_format(format) {
                sample_flags.insert(format, adapter.get_texture_format_features(wf).flags);
            }
        }

        debug!(ordinal, ?level, "created wgpu device");
        Ok((
            WgpuDevice {
                device,
                queue,
                level,
                next_id: 1,
                buffers: HashMap::new(),
                textures: HashMap::new(),
                render_target_views: HashMap::new(),
                swap_chains: HashMap::new(),
                shaders: HashMap::new(),
                rasterizer: RasterizerDesc::DEFAULT,
                bound_constants: HashMap::new(),
                sample_flags,
            },
            level,
        ))
    }
}

struct WgpuSwapChain {
    buffers: Vec<wgpu::Texture>,
    current: usize,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    level: FeatureLevel,
    next_id: u64,

    buffers: HashMap<u64, (wgpu::Buffer, BufferDesc)>,
    textures: HashMap<u64, (wgpu::Texture, TextureDesc)>,
    render_target_views: HashMap<u64, wgpu::TextureView>,
    swap_chains: HashMap<u64, WgpuSwapChain>,
    shaders: HashMap<u64, wgpu::ShaderModule>,

    /// wgpu bakes rasterizer state into pipelines; the draw path reads the
    /// current state from here when building one.
    rasterizer: RasterizerDesc,
    bound_constants: HashMap<(ShaderStage, u32), BufferId>,
    sample_flags: HashMap<PixelFormat, wgpu::TextureFormatFeatureFlags>,
}

impl WgpuDevice {
    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn rasterizer_state(&self) -> &RasterizerDesc {
        &self.rasterizer
    }

    pub fn bound_constant_buffer(&self, stage: ShaderStage, slot: u32) -> Option<&wgpu::Buffer> {
        let id = self.bound_constants.get(&(stage, slot))?;
        self.buffers.get(&id.0).map(|(buffer, _)| buffer)
    }

    fn texture_usages(desc: &TextureDesc) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if desc.bind.contains(BindFlags::RENDER_TARGET) {
            usages |= wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        }
        usages
    }
}

impl GpuDevice for WgpuDevice {
    fn feature_level(&self) -> FeatureLevel {
        self.level
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        init_data: Option<&[u8]>,
    ) -> Result<BufferId, BackendError> {
        if desc.size == 0 {
            return Err(BackendError::InvalidArg("zero-size buffer"));
        }
        let mut usage = wgpu::BufferUsages::COPY_DST;
        if desc.bind.contains(BindFlags::CONSTANT_BUFFER) {
            usage |= wgpu::BufferUsages::UNIFORM;
        }
        if desc.bind.contains(BindFlags::VERTEX_BUFFER) {
            usage |= wgpu::BufferUsages::VERTEX;
        }
        if desc.bind.contains(BindFlags::INDEX_BUFFER) {
            usage |= wgpu::BufferUsages::INDEX;
        }
        // Copies require 4-byte alignment; round the allocation up so odd
        // 16-bit index counts stay writable.
        let size = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size,
            usage,
            mapped_at_creation: false,
        });
        let id = self.alloc_id();
        if let Some(data) = init_data {
            write_padded(&self.queue, &buffer, 0, data);
        }
        self.buffers.insert(id, (buffer, *desc));
        Ok(BufferId(id))
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_buffer: unknown id ignored");
        }
    }

    fn write_buffer(
        &mut self,
        id: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let (buffer, desc) = self
            .buffers
            .get(&id.0)
            .ok_or_else(|| BackendError::InvalidCall(format!("unknown buffer {}", id.0)))?;
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(BackendError::InvalidArg("buffer write range overflow"))?;
        if end > desc.size {
            return Err(BackendError::InvalidCall(format!(
                "buffer write out of range: {end} > {}",
                desc.size
            )));
        }
        write_padded(&self.queue, buffer, offset, data);
        Ok(())
    }

    fn create_texture2d(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidArg("zero texture dimension"));
        }
        let format = wgpu_format(desc.format)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: None,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.array_size.max(1),
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: desc.sample_count.max(1),
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: Self::texture_usages(desc),
            view_formats: &[],
        });
        let id = self.alloc_id();
        self.textures.insert(id, (texture, *desc));
        Ok(TextureId(id))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_texture: unknown id ignored");
        }
    }

    fn create_render_target_view(
        &mut self,
        texture: TextureId,
    ) -> Result<RenderTargetViewId, BackendError> {
        let (tex, desc) = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::InvalidCall(format!("unknown texture {}", texture.0)))?;
        if !desc.bind.contains(BindFlags::RENDER_TARGET) {
            return Err(BackendError::InvalidCall(
                "texture was not created with RENDER_TARGET binding".into(),
            ));
        }
        let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.alloc_id();
        self.render_target_views.insert(id, view);
        Ok(RenderTargetViewId(id))
    }

    fn destroy_render_target_view(&mut self, id: RenderTargetViewId) {
        if self.render_target_views.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_render_target_view: unknown id ignored");
        }
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> Result<SwapChainId, BackendError> {
        if desc.buffer_count == 0 {
            return Err(BackendError::InvalidArg("zero-buffer swap chain"));
        }
        let format = wgpu_format(desc.format)?;
        // Zero extent means "match the window"; the modeled backbuffer starts
        // at 1x1 until the embedder resizes.
        let width = desc.width.max(1);
        let height = desc.height.max(1);
        let buffers = (0..desc.buffer_count)
            .map(|_| {
                self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("glint backbuffer"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                })
            })
            .collect();
        let id = self.alloc_id();
        self.swap_chains.insert(
            id,
            WgpuSwapChain {
                buffers,
                current: 0,
            },
        );
        Ok(SwapChainId(id))
    }

    fn destroy_swap_chain(&mut self, id: SwapChainId) {
        if self.swap_chains.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_swap_chain: unknown id ignored");
        }
    }

    fn present(&mut self, id: SwapChainId) -> Result<(), BackendError> {
        let chain = self
            .swap_chains
            .get_mut(&id.0)
            .ok_or_else(|| BackendError::InvalidCall(format!("unknown swap chain {}", id.0)))?;
        chain.current = (chain.current + 1) % chain.buffers.len();
        trace!(id = id.0, backbuffer = chain.current, "presented");
        Ok(())
    }

    fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<ShaderId, BackendError> {
        let source = std::str::from_utf8(bytecode)
            .map_err(|_| BackendError::InvalidArg("pixel shader bytecode is not WGSL source"))?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("glint pixel shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            warn!(%err, "pixel shader validation failed");
            return Err(BackendError::InvalidCall(format!(
                "shader module validation: {err}"
            )));
        }
        let id = self.alloc_id();
        self.shaders.insert(id, module);
        Ok(ShaderId(id))
    }

    fn destroy_shader(&mut self, id: ShaderId) {
        if self.shaders.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_shader: unknown id ignored");
        }
    }

    fn set_rasterizer_state(&mut self, desc: &RasterizerDesc) -> Result<(), BackendError> {
        self.rasterizer = *desc;
        Ok(())
    }

    fn bind_constant_buffer(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        buffer: BufferId,
    ) -> Result<(), BackendError> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(BackendError::InvalidCall(format!(
                "bind_constant_buffer: unknown buffer {}",
                buffer.0
            )));
        }
        self.bound_constants.insert((stage, slot), buffer);
        Ok(())
    }

    fn multisample_quality_levels(
        &self,
        format: PixelFormat,
        sample_count: u32,
    ) -> Result<u32, BackendError> {
        let flags = self
            .sample_flags
            .get(&format)
            .ok_or(BackendError::InvalidArg("unknown format"))?;
        if sample_count == 0 || !sample_count.is_power_of_two() {
            return Ok(0);
        }
        if sample_count == 1 {
            return Ok(1);
        }
        Ok(u32::from(flags.sample_count_supported(sample_count)))
    }
}

fn write_padded(queue: &wgpu::Queue, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
    let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
    if data.len() % align == 0 {
        queue.write_buffer(buffer, offset, data);
    } else {
        let mut padded = data.to_vec();
        padded.resize(data.len().next_multiple_of(align), 0);
        queue.write_buffer(buffer, offset, &padded);
    }
}
