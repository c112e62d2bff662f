//! Native graphics-API abstraction for the glint binding layer.
//!
//! The rest of the stack (`glint-d3d11`, `glint-d3d9`) is backend-agnostic: it
//! talks to a device through the [`GpuFactory`]/[`GpuDevice`] traits. Two
//! implementations are provided:
//! 1. A deterministic software backend ([`SoftFactory`]/[`SoftDevice`]) used by
//!    tests; it records creation counts and supports failure injection.
//! 2. A wgpu-backed production backend ([`WgpuFactory`]/[`WgpuDevice`]).

#![deny(unsafe_code)]

pub mod backend;
mod feature_level;

pub use backend::{
    AdapterInfo, AlphaMode, BackendError, BindFlags, BufferDesc, BufferId, GpuDevice, GpuFactory,
    MonitorId, OutputInfo, PixelFormat, RasterizerDesc, RenderTargetViewId, ShaderId, ShaderStage,
    SoftDevice, SoftFactory, SwapChainDesc, SwapChainId, SwapEffect, TextureDesc, TextureId, Usage,
    WgpuDevice, WgpuFactory, WindowHandle,
};
pub use feature_level::FeatureLevel;
