//! Opaque-handle boundary surface.
//!
//! The external marshaling layer deals in raw slices with explicit counts and
//! opaque non-zero `u64` handles; it passes handles back unchanged. Nothing
//! here trusts the caller: ordinals, handles and sub-ranges are validated at
//! every entry point, and query surfaces that cannot fail return plain
//! integer sentinels instead.

use std::collections::HashMap;

use glint_gpu::{GpuFactory, MonitorId, PixelFormat, SwapEffect, Usage, WindowHandle};
use tracing::{debug, trace, warn};

use crate::context::DeviceContext;
use crate::resource::{ResourceHandle, ResourceKind, TextureParams};
use crate::{D3dError, Pipeline};

/// Content hints accepted by [`Runtime::create_texture`]. Hints, not hard
/// requirements; an unknown value leaves the format unpinned.
pub const FORMAT_HINT_NONE: i32 = -1;
pub const FORMAT_HINT_BYTE_RGBA_PRE: i32 = 0;
pub const FORMAT_HINT_INT_ARGB_PRE: i32 = 1;
pub const FORMAT_HINT_BYTE_RGB: i32 = 2;
pub const FORMAT_HINT_BYTE_GRAY: i32 = 3;
pub const FORMAT_HINT_BYTE_ALPHA: i32 = 4;
pub const FORMAT_HINT_FLOAT_XYZW: i32 = 5;

pub const USAGE_HINT_DEFAULT: i32 = 0;
pub const USAGE_HINT_DYNAMIC: i32 = 1;

fn map_format_hint(hint: i32) -> Option<PixelFormat> {
    match hint {
        FORMAT_HINT_BYTE_RGBA_PRE | FORMAT_HINT_INT_ARGB_PRE => Some(PixelFormat::B8G8R8A8Unorm),
        FORMAT_HINT_BYTE_RGB => Some(PixelFormat::B8G8R8X8Unorm),
        FORMAT_HINT_BYTE_GRAY => Some(PixelFormat::R8Unorm),
        FORMAT_HINT_BYTE_ALPHA => Some(PixelFormat::A8Unorm),
        FORMAT_HINT_FLOAT_XYZW => Some(PixelFormat::R32G32B32A32Float),
        FORMAT_HINT_NONE => None,
        other => {
            warn!(hint = other, "unknown texture format hint, leaving format unpinned");
            None
        }
    }
}

/// The layer the external marshaling code calls into.
///
/// Handles are minted from a counter starting at 1, so zero never names a
/// live object and can serve as the caller's null.
pub struct Runtime<F: GpuFactory> {
    pipeline: Pipeline<F>,
    next_handle: u64,
    /// context handle -> adapter ordinal
    contexts: HashMap<u64, u32>,
    /// adapter ordinal -> stable context handle
    context_handles: Vec<Option<u64>>,
    /// resource handle -> (owning ordinal, table handle)
    resources: HashMap<u64, (u32, ResourceHandle)>,
}

impl<F: GpuFactory> Runtime<F> {
    pub fn init(factory: F) -> Result<Self, D3dError> {
        let pipeline = Pipeline::new(factory)?;
        let count = pipeline.adapter_count() as usize;
        debug!(adapters = count, "runtime initialized");
        Ok(Self {
            pipeline,
            next_handle: 1,
            contexts: HashMap::new(),
            context_handles: vec![None; count],
            resources: HashMap::new(),
        })
    }

    /// Releases everything: context resources, then devices, then the
    /// factory.
    pub fn dispose(self) {
        debug!("disposing runtime");
        self.pipeline.release();
    }

    pub fn adapter_count(&self) -> u32 {
        self.pipeline.adapter_count()
    }

    pub fn adapter_ordinal_by_monitor(&self, monitor: u64) -> Option<u32> {
        self.pipeline.adapter_ordinal_by_monitor(MonitorId(monitor))
    }

    pub fn pipeline(&self) -> &Pipeline<F> {
        &self.pipeline
    }

    fn mint_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn ordinal_of(&self, ctx: u64) -> Result<u32, D3dError> {
        self.contexts
            .get(&ctx)
            .copied()
            .ok_or(D3dError::UnknownContext)
    }

    fn context_mut(&mut self, ctx: u64) -> Result<&mut DeviceContext<F::Device>, D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        self.pipeline.context(ordinal)
    }

    /// The context handle for `ordinal`, lazily initializing the context and
    /// re-applying the default clip and transform state. The same ordinal
    /// always yields the identical handle.
    pub fn get_context(&mut self, ordinal: u32) -> Result<u64, D3dError> {
        let ctx = self.pipeline.context(ordinal)?;
        ctx.reset_clip()?;
        ctx.reset_transform()?;
        if let Some(handle) = self.context_handles[ordinal as usize] {
            return Ok(handle);
        }
        let handle = self.mint_handle();
        self.context_handles[ordinal as usize] = Some(handle);
        self.contexts.insert(handle, ordinal);
        trace!(ordinal, handle, "minted context handle");
        Ok(handle)
    }

    pub fn create_swap_chain(
        &mut self,
        ctx: u64,
        window: u64,
        vsync: bool,
    ) -> Result<u64, D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        trace!(ordinal, window, vsync, "creating swap chain");
        let context = self.pipeline.context(ordinal)?;
        let handle = context.create_swap_chain(
            WindowHandle(window),
            2,
            0,
            0,
            SwapEffect::FlipSequential,
        )?;
        Ok(self.register(ordinal, handle))
    }

    /// `samples > 0` routes to render-target creation.
    #[allow(clippy::too_many_arguments)]
    pub fn create_texture(
        &mut self,
        ctx: u64,
        format_hint: i32,
        usage_hint: i32,
        is_rtt: bool,
        is_opaque: bool,
        width: u32,
        height: u32,
        samples: u32,
        use_mipmap: bool,
    ) -> Result<u64, D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        let format_hint = map_format_hint(format_hint);
        let usage = if usage_hint == USAGE_HINT_DYNAMIC {
            Usage::Dynamic
        } else {
            Usage::Default
        };
        let context = self.pipeline.context(ordinal)?;
        let handle = if samples > 0 {
            let (handle, format) =
                context.create_render_target(width, height, is_opaque, format_hint, samples)?;
            trace!(?format, "allocated multisampled render target");
            handle
        } else {
            context.create_texture(&TextureParams {
                width,
                height,
                is_rtt,
                is_opaque,
                use_mipmap,
                format_hint,
                usage,
                samples: 0,
            })?
        };
        Ok(self.register(ordinal, handle))
    }

    pub fn create_pixel_shader(&mut self, ctx: u64, bytecode: &[u8]) -> Result<u64, D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        let handle = self.pipeline.context(ordinal)?.create_pixel_shader(bytecode)?;
        Ok(self.register(ordinal, handle))
    }

    fn register(&mut self, ordinal: u32, handle: ResourceHandle) -> u64 {
        let outer = self.mint_handle();
        self.resources.insert(outer, (ordinal, handle));
        outer
    }

    /// Exactly-once release. Unknown or stale handles, or a resource owned
    /// by a different context, are contract errors and change nothing.
    pub fn release_resource(&mut self, ctx: u64, res: u64) -> Result<(), D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        let &(owner, inner) = self.resources.get(&res).ok_or(D3dError::UnknownHandle)?;
        if owner != ordinal {
            return Err(D3dError::WrongContext);
        }
        self.pipeline.context(ordinal)?.release_resource(inner)?;
        self.resources.remove(&res);
        Ok(())
    }

    fn resource_dimension(&self, res: u64, want_width: bool) -> i32 {
        let Some(&(ordinal, inner)) = self.resources.get(&res) else {
            return -1;
        };
        let Some(context) = self.pipeline.created_context(ordinal) else {
            return -1;
        };
        let dim = if want_width {
            context.resources().width(inner)
        } else {
            context.resources().height(inner)
        };
        dim.map_or(-1, |v| v.min(i32::MAX as u64) as i32)
    }

    /// The tracked record behind a resource handle, e.g. to pull the
    /// texture id out for material map binding.
    pub fn resource_kind(&self, res: u64) -> Option<&ResourceKind> {
        let &(ordinal, inner) = self.resources.get(&res)?;
        self.pipeline.created_context(ordinal)?.resources().get(inner)
    }

    /// −1 when the handle is unknown at this integer query surface.
    pub fn texture_width(&self, res: u64) -> i32 {
        self.resource_dimension(res, true)
    }

    pub fn texture_height(&self, res: u64) -> i32 {
        self.resource_dimension(res, false)
    }

    /// −1 when the feature-level table has no entry or the context is
    /// unknown.
    pub fn max_texture_size(&self, ctx: u64) -> i32 {
        let Ok(ordinal) = self.ordinal_of(ctx) else {
            return -1;
        };
        self.pipeline
            .created_context(ordinal)
            .and_then(|context| context.max_texture_size())
            .map_or(-1, |max| max as i32)
    }

    /// Highest supported sample count for the adapter's default render-target
    /// format; 0 when the context is unavailable.
    pub fn max_sample_support(&mut self, ordinal: u32) -> i32 {
        match self.pipeline.context(ordinal) {
            Ok(context) => context.max_sample_support(PixelFormat::B8G8R8X8Unorm) as i32,
            Err(err) => {
                warn!(ordinal, %err, "max_sample_support: context unavailable");
                0
            }
        }
    }

    pub fn set_constants_f(
        &mut self,
        ctx: u64,
        reg: u32,
        data: &[f32],
        offset: usize,
        count: usize,
    ) -> Result<(), D3dError> {
        self.context_mut(ctx)?
            .set_pixel_constants_f(reg, data, offset, count)
    }

    pub fn set_constants_i(
        &mut self,
        ctx: u64,
        reg: u32,
        data: &[i32],
        offset: usize,
        count: usize,
    ) -> Result<(), D3dError> {
        self.context_mut(ctx)?
            .set_pixel_constants_i(reg, data, offset, count)
    }

    pub fn set_world(&mut self, ctx: u64, m: &[f32; 16]) -> Result<(), D3dError> {
        self.context_mut(ctx)?.set_world(bytemuck::cast(*m))
    }

    pub fn set_projection(&mut self, ctx: u64, m: &[f32; 16]) -> Result<(), D3dError> {
        self.context_mut(ctx)?.set_projection(bytemuck::cast(*m))
    }

    pub fn present(&mut self, ctx: u64, res: u64) -> Result<(), D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        let &(owner, inner) = self.resources.get(&res).ok_or(D3dError::UnknownHandle)?;
        if owner != ordinal {
            return Err(D3dError::WrongContext);
        }
        self.pipeline.context(ordinal)?.present(inner)
    }

    /// Releases every default-pool resident on `ctx`, the first step of a
    /// device reset.
    pub fn release_default_pool_resources(&mut self, ctx: u64) -> Result<(), D3dError> {
        let ordinal = self.ordinal_of(ctx)?;
        self.pipeline
            .context(ordinal)?
            .release_default_pool_resources();
        self.resources.retain(|_, &mut (owner, inner)| {
            if owner != ordinal {
                return true;
            }
            // Kept entries still resolve; released ones were vacated.
            self.pipeline
                .created_context(ordinal)
                .is_some_and(|context| context.resources().contains(inner))
        });
        Ok(())
    }
}
