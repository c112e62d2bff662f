//! GPU backend abstraction.
//!
//! The binding layer above is backend-agnostic; in production it forwards into
//! the wgpu-backed implementation. For tests we provide a deterministic
//! software backend with creation counters and failure injection.

mod soft;
mod wgpu_backend;

use bitflags::bitflags;
use thiserror::Error;

pub use soft::{SoftDevice, SoftFactory};
pub use wgpu_backend::{WgpuDevice, WgpuFactory};

use crate::FeatureLevel;

/// Driver-side failure classes, passed through to the caller unchanged.
///
/// `InvalidArg` is the one class with local recovery: device creation rejects
/// the whole feature-level list with it when the newest entry is unrecognized,
/// and the context-init path retries once without that entry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),
    #[error("invalid call: {0}")]
    InvalidCall(String),
    #[error("out of video memory")]
    OutOfMemory,
    #[error("device lost")]
    DeviceLost,
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// Opaque id of a backend-owned buffer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Opaque id of a backend-owned 2-D texture object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Opaque id of a render-target view onto a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetViewId(pub u64);

/// Opaque id of a backend-owned swap chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapChainId(pub u64);

/// Opaque id of a backend-owned shader object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u64);

/// Window-system window handle, passed through unchanged from the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Window-system monitor handle, used only for adapter lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MonitorId(pub u64);

/// One display output of an adapter.
#[derive(Clone, Debug)]
pub struct OutputInfo {
    pub monitor: MonitorId,
}

/// One enumerated display adapter.
#[derive(Clone, Debug)]
pub struct AdapterInfo {
    pub name: String,
    pub outputs: Vec<OutputInfo>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    B8G8R8A8Unorm,
    B8G8R8X8Unorm,
    R8G8B8A8Unorm,
    R8Unorm,
    A8Unorm,
    R32G32B32A32Float,
    #[default]
    Unknown,
}

impl PixelFormat {
    /// Every concrete format (excludes `Unknown`).
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::B8G8R8A8Unorm,
        PixelFormat::B8G8R8X8Unorm,
        PixelFormat::R8G8B8A8Unorm,
        PixelFormat::R8Unorm,
        PixelFormat::A8Unorm,
        PixelFormat::R32G32B32A32Float,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Usage {
    #[default]
    Default,
    Dynamic,
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        const SHADER_RESOURCE = 1 << 0;
        const RENDER_TARGET = 1 << 1;
        const CONSTANT_BUFFER = 1 << 2;
        const VERTEX_BUFFER = 1 << 3;
        const INDEX_BUFFER = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapEffect {
    FlipSequential,
    FlipDiscard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    Premultiplied,
    Ignore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Rasterizer state applied by [`GpuDevice::set_rasterizer_state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterizerDesc {
    pub scissor_enable: bool,
    pub fill_solid: bool,
    pub cull_back: bool,
}

impl RasterizerDesc {
    /// The binding layer's default clip state: scissor on, solid fill,
    /// back-face cull.
    pub const DEFAULT: RasterizerDesc = RasterizerDesc {
        scissor_enable: true,
        fill_solid: true,
        cull_back: true,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: Usage,
    pub bind: BindFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: PixelFormat,
    pub sample_count: u32,
    pub usage: Usage,
    pub bind: BindFlags,
    pub generate_mips: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub window: WindowHandle,
    pub buffer_count: u32,
    /// Zero means "match the window surface"; backends that model the
    /// backbuffer themselves clamp to 1.
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub swap_effect: SwapEffect,
    pub alpha_mode: AlphaMode,
}

/// Adapter enumeration plus device creation.
pub trait GpuFactory {
    type Device: GpuDevice;

    /// Enumerates adapters once; the result is stable for the factory's
    /// lifetime.
    fn enumerate_adapters(&self) -> Vec<AdapterInfo>;

    /// Creates a device on `ordinal` at the highest supported level from
    /// `levels` (ordered highest first).
    ///
    /// A driver that does not recognize the newest entry rejects the *whole*
    /// list with [`BackendError::InvalidArg`]; callers retry once with the
    /// list minus its top entry.
    fn create_device(
        &self,
        ordinal: u32,
        levels: &[FeatureLevel],
    ) -> Result<(Self::Device, FeatureLevel), BackendError>;
}

/// One native device plus its immediate context.
///
/// All calls are synchronous. Destruction is infallible and idempotent at this
/// level (unknown ids are ignored with a trace) because release paths must not
/// fail during bulk teardown.
pub trait GpuDevice {
    fn feature_level(&self) -> FeatureLevel;

    fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        init_data: Option<&[u8]>,
    ) -> Result<BufferId, BackendError>;
    fn destroy_buffer(&mut self, id: BufferId);
    /// Overwrites `data.len()` bytes at `offset` (the lock/copy/unlock path).
    fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8])
        -> Result<(), BackendError>;

    fn create_texture2d(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError>;
    fn destroy_texture(&mut self, id: TextureId);

    fn create_render_target_view(
        &mut self,
        texture: TextureId,
    ) -> Result<RenderTargetViewId, BackendError>;
    fn destroy_render_target_view(&mut self, id: RenderTargetViewId);

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> Result<SwapChainId, BackendError>;
    fn destroy_swap_chain(&mut self, id: SwapChainId);
    fn present(&mut self, id: SwapChainId) -> Result<(), BackendError>;

    fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<ShaderId, BackendError>;
    fn destroy_shader(&mut self, id: ShaderId);

    fn set_rasterizer_state(&mut self, desc: &RasterizerDesc) -> Result<(), BackendError>;
    fn bind_constant_buffer(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        buffer: BufferId,
    ) -> Result<(), BackendError>;

    /// Number of quality levels available for `format` at `sample_count`;
    /// zero means the count is unsupported.
    fn multisample_quality_levels(
        &self,
        format: PixelFormat,
        sample_count: u32,
    ) -> Result<u32, BackendError>;
}
