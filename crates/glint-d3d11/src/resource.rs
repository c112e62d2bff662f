//! Tracking of every GPU resource owned by one device context.
//!
//! Resources live in a slot table with free-list reuse; callers hold
//! generation-checked [`ResourceHandle`]s, so a released handle can never
//! alias a later resource in the same slot. Each native object is released
//! exactly once: when its entry is removed, or at bulk teardown.

use glint_gpu::{
    AlphaMode, BackendError, BindFlags, BufferDesc, BufferId, GpuDevice, PixelFormat,
    RenderTargetViewId, ShaderId, SwapChainDesc, SwapChainId, SwapEffect, TextureDesc, TextureId,
    Usage, WindowHandle,
};
use tracing::{debug, trace};

use crate::D3dError;

/// Generation-checked index into a [`ResourceManager`] slot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    index: u32,
    generation: u32,
}

/// One tracked native resource. The discriminant selects the release path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    SwapChain {
        swap_chain: SwapChainId,
        width: u32,
        height: u32,
    },
    Texture {
        texture: TextureId,
        render_target: Option<RenderTargetViewId>,
        format: PixelFormat,
        width: u32,
        height: u32,
        usage: Usage,
    },
    Buffer {
        buffer: BufferId,
        size: u64,
    },
    PixelShader {
        shader: ShaderId,
    },
}

impl ResourceKind {
    /// Default-pool residents must be released and recreated on device reset.
    /// Swap chains and default-usage textures qualify; shaders do not.
    pub fn is_default_pool(&self) -> bool {
        match self {
            ResourceKind::SwapChain { .. } => true,
            ResourceKind::Texture { usage, .. } => *usage == Usage::Default,
            ResourceKind::Buffer { .. } => false,
            ResourceKind::PixelShader { .. } => false,
        }
    }

    fn release_native<D: GpuDevice>(self, device: &mut D) {
        match self {
            ResourceKind::SwapChain { swap_chain, .. } => device.destroy_swap_chain(swap_chain),
            ResourceKind::Texture {
                texture,
                render_target,
                ..
            } => {
                // The view references the texture; drop it first.
                if let Some(rtv) = render_target {
                    device.destroy_render_target_view(rtv);
                }
                device.destroy_texture(texture);
            }
            ResourceKind::Buffer { buffer, .. } => device.destroy_buffer(buffer),
            ResourceKind::PixelShader { shader } => device.destroy_shader(shader),
        }
    }
}

/// Parameters for [`ResourceManager::create_texture`].
#[derive(Clone, Copy, Debug)]
pub struct TextureParams {
    pub width: u32,
    pub height: u32,
    pub is_rtt: bool,
    pub is_opaque: bool,
    pub use_mipmap: bool,
    /// Content hint; `None` falls back to the opaque/non-opaque default.
    pub format_hint: Option<PixelFormat>,
    pub usage: Usage,
    pub samples: u32,
}

/// Picks the allocated format: an explicit hint wins; otherwise opaque
/// content gets the no-alpha format and everything else premultiplied alpha.
pub fn resolve_format(format_hint: Option<PixelFormat>, is_opaque: bool) -> PixelFormat {
    match format_hint {
        Some(format) if format != PixelFormat::Unknown => format,
        _ if is_opaque => PixelFormat::B8G8R8X8Unorm,
        _ => PixelFormat::B8G8R8A8Unorm,
    }
}

enum Slot {
    Vacant { generation: u32 },
    Occupied { generation: u32, kind: ResourceKind },
}

/// Slot table of all live resources for one device context.
#[derive(Default)]
pub struct ResourceManager {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Registers an already-created resource. O(1): reuses a vacant slot if
    /// one exists, else grows the table.
    pub fn add(&mut self, kind: ResourceKind) -> ResourceHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => *generation,
                Slot::Occupied { .. } => unreachable!("free list points at occupied slot"),
            };
            *slot = Slot::Occupied { generation, kind };
            return ResourceHandle { index, generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            generation: 0,
            kind,
        });
        ResourceHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ResourceHandle) -> Option<&ResourceKind> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Occupied { generation, kind }) if *generation == handle.generation => {
                Some(kind)
            }
            _ => None,
        }
    }

    pub fn contains(&self, handle: ResourceHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Swap chains and textures report their pixel dimensions; buffers report
    /// their byte size as width and zero height.
    pub fn width(&self, handle: ResourceHandle) -> Option<u64> {
        self.get(handle).map(|kind| match kind {
            ResourceKind::SwapChain { width, .. } => u64::from(*width),
            ResourceKind::Texture { width, .. } => u64::from(*width),
            ResourceKind::Buffer { size, .. } => *size,
            ResourceKind::PixelShader { .. } => 0,
        })
    }

    pub fn height(&self, handle: ResourceHandle) -> Option<u64> {
        self.get(handle).map(|kind| match kind {
            ResourceKind::SwapChain { height, .. } => u64::from(*height),
            ResourceKind::Texture { height, .. } => u64::from(*height),
            ResourceKind::Buffer { .. } => 0,
            ResourceKind::PixelShader { .. } => 0,
        })
    }

    /// Releases one resource: generation check, single native-release
    /// dispatch, slot vacated with a generation bump. A stale or vacant
    /// handle fails with [`D3dError::UnknownHandle`] and changes nothing.
    pub fn release<D: GpuDevice>(
        &mut self,
        device: &mut D,
        handle: ResourceHandle,
    ) -> Result<(), D3dError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .ok_or(D3dError::UnknownHandle)?;
        let kind = match slot {
            Slot::Occupied { generation, kind } if *generation == handle.generation => {
                let kind = kind.clone();
                *slot = Slot::Vacant {
                    generation: handle.generation.wrapping_add(1),
                };
                kind
            }
            _ => return Err(D3dError::UnknownHandle),
        };
        self.free.push(handle.index);
        self.live -= 1;
        kind.release_native(device);
        Ok(())
    }

    /// Force-releases every tracked resource. The single teardown path for
    /// full device reset; afterwards the table is empty.
    pub fn release_all<D: GpuDevice>(&mut self, device: &mut D) {
        debug!(count = self.live, "releasing all tracked resources");
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { generation, kind } = slot {
                let generation = *generation;
                let kind = kind.clone();
                *slot = Slot::Vacant {
                    generation: generation.wrapping_add(1),
                };
                self.free.push(index as u32);
                self.live -= 1;
                kind.release_native(device);
            }
        }
    }

    /// Releases only default-pool residents, retaining the rest.
    pub fn release_default_pool<D: GpuDevice>(&mut self, device: &mut D) {
        debug!("releasing default-pool resources");
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { generation, kind } = slot {
                if !kind.is_default_pool() {
                    continue;
                }
                let generation = *generation;
                let kind = kind.clone();
                *slot = Slot::Vacant {
                    generation: generation.wrapping_add(1),
                };
                self.free.push(index as u32);
                self.live -= 1;
                kind.release_native(device);
            }
        }
    }

    pub fn create_swap_chain<D: GpuDevice>(
        &mut self,
        device: &mut D,
        window: WindowHandle,
        buffer_count: u32,
        width: u32,
        height: u32,
        swap_effect: SwapEffect,
    ) -> Result<ResourceHandle, D3dError> {
        let desc = SwapChainDesc {
            window,
            buffer_count,
            width,
            height,
            format: PixelFormat::R8G8B8A8Unorm,
            swap_effect,
            alpha_mode: AlphaMode::Premultiplied,
        };
        let swap_chain = device.create_swap_chain(&desc)?;
        let handle = self.add(ResourceKind::SwapChain {
            swap_chain,
            width,
            height,
        });
        trace!(?handle, "created swap chain");
        Ok(handle)
    }

    /// Creates a 2-D texture, with a render-target view attached when
    /// `is_rtt`. Fully succeeds (texture registered) or fully fails (nothing
    /// registered, table unmodified): a view-creation failure destroys the
    /// backing texture before returning.
    pub fn create_texture<D: GpuDevice>(
        &mut self,
        device: &mut D,
        params: &TextureParams,
    ) -> Result<ResourceHandle, D3dError> {
        let format = resolve_format(params.format_hint, params.is_opaque);
        let mut bind = BindFlags::SHADER_RESOURCE;
        if params.is_rtt {
            bind |= BindFlags::RENDER_TARGET;
        }
        let desc = TextureDesc {
            width: params.width,
            height: params.height,
            mip_levels: 1,
            array_size: 1,
            format,
            sample_count: params.samples.max(1),
            usage: params.usage,
            bind,
            generate_mips: params.use_mipmap,
        };
        let texture = device.create_texture2d(&desc)?;
        let render_target = if params.is_rtt {
            match device.create_render_target_view(texture) {
                Ok(rtv) => Some(rtv),
                Err(err) => {
                    device.destroy_texture(texture);
                    return Err(err.into());
                }
            }
        } else {
            None
        };
        let handle = self.add(ResourceKind::Texture {
            texture,
            render_target,
            format,
            width: params.width,
            height: params.height,
            usage: params.usage,
        });
        trace!(?handle, ?format, "created texture");
        Ok(handle)
    }

    /// Creates a render-target texture and reports the format actually
    /// allocated, so callers that pinned no format learn the default.
    pub fn create_render_target<D: GpuDevice>(
        &mut self,
        device: &mut D,
        width: u32,
        height: u32,
        is_opaque: bool,
        format_hint: Option<PixelFormat>,
        samples: u32,
    ) -> Result<(ResourceHandle, PixelFormat), D3dError> {
        let params = TextureParams {
            width,
            height,
            is_rtt: true,
            is_opaque,
            use_mipmap: false,
            format_hint,
            usage: Usage::Default,
            samples,
        };
        let format = resolve_format(format_hint, is_opaque);
        let handle = self.create_texture(device, &params)?;
        Ok((handle, format))
    }

    pub fn create_buffer<D: GpuDevice>(
        &mut self,
        device: &mut D,
        size: u64,
        usage: Usage,
        bind: BindFlags,
    ) -> Result<ResourceHandle, D3dError> {
        let buffer = device.create_buffer(&BufferDesc { size, usage, bind }, None)?;
        Ok(self.add(ResourceKind::Buffer { buffer, size }))
    }

    pub fn create_pixel_shader<D: GpuDevice>(
        &mut self,
        device: &mut D,
        bytecode: &[u8],
    ) -> Result<ResourceHandle, D3dError> {
        let shader = device.create_pixel_shader(bytecode)?;
        Ok(self.add(ResourceKind::PixelShader { shader }))
    }
}

#[cfg(test)]
mod tests {
    use glint_gpu::{FeatureLevel, GpuFactory, SoftDevice, SoftFactory};
    use pretty_assertions::assert_eq;

    use super::*;

    fn device() -> SoftDevice {
        let factory = SoftFactory::new(1);
        factory
            .create_device(0, &FeatureLevel::DESCENDING)
            .expect("soft device")
            .0
    }

    #[test]
    fn add_release_sequences_leave_table_empty() {
        let mut device = device();
        let mut manager = ResourceManager::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            handles.push(
                manager
                    .create_pixel_shader(&mut device, b"ps")
                    .expect("shader"),
            );
        }
        assert_eq!(manager.len(), 4);

        // Mixed order, with slot reuse in the middle.
        manager.release(&mut device, handles[1]).unwrap();
        let extra = manager
            .create_pixel_shader(&mut device, b"ps2")
            .expect("shader");
        manager.release(&mut device, handles[3]).unwrap();
        manager.release(&mut device, handles[0]).unwrap();
        manager.release(&mut device, handles[2]).unwrap();
        manager.release(&mut device, extra).unwrap();

        assert_eq!(manager.len(), 0);
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn stale_handle_is_rejected_after_slot_reuse() {
        let mut device = device();
        let mut manager = ResourceManager::new();

        let first = manager
            .create_pixel_shader(&mut device, b"a")
            .expect("shader");
        manager.release(&mut device, first).unwrap();
        let second = manager
            .create_pixel_shader(&mut device, b"b")
            .expect("shader");

        // `second` reuses the slot; the old handle must not reach it.
        assert_eq!(manager.release(&mut device, first), Err(D3dError::UnknownHandle));
        assert_eq!(manager.len(), 1);
        assert!(manager.contains(second));
        assert_eq!(device.live_shaders(), 1);
    }

    #[test]
    fn double_release_fails_and_changes_nothing() {
        let mut device = device();
        let mut manager = ResourceManager::new();

        let handle = manager
            .create_pixel_shader(&mut device, b"ps")
            .expect("shader");
        manager.release(&mut device, handle).unwrap();
        assert_eq!(
            manager.release(&mut device, handle),
            Err(D3dError::UnknownHandle)
        );
        assert_eq!(device.live_shaders(), 0);
    }

    #[test]
    fn failed_creation_leaves_table_unmodified() {
        let mut device = device();
        let mut manager = ResourceManager::new();
        device.fail_next_creation(BackendError::OutOfMemory);

        let err = manager
            .create_texture(
                &mut device,
                &TextureParams {
                    width: 16,
                    height: 16,
                    is_rtt: false,
                    is_opaque: false,
                    use_mipmap: false,
                    format_hint: None,
                    usage: Usage::Default,
                    samples: 0,
                },
            )
            .unwrap_err();
        assert_eq!(err, D3dError::Backend(BackendError::OutOfMemory));
        assert_eq!(manager.len(), 0);
        assert_eq!(device.live_textures(), 0);
    }

    #[test]
    fn render_target_view_failure_destroys_backing_texture() {
        let mut device = device();
        let mut manager = ResourceManager::new();
        // First creation (the texture) succeeds; the second (the view) fails.
        device.fail_creation_after(1, BackendError::OutOfMemory);

        let err = manager
            .create_render_target(&mut device, 32, 32, true, None, 0)
            .unwrap_err();
        assert_eq!(err, D3dError::Backend(BackendError::OutOfMemory));
        assert_eq!(manager.len(), 0);
        assert_eq!(device.live_textures(), 0);
        assert_eq!(device.live_render_target_views(), 0);
    }

    #[test]
    fn render_target_reports_defaulted_format() {
        let mut device = device();
        let mut manager = ResourceManager::new();

        let (_, opaque) = manager
            .create_render_target(&mut device, 8, 8, true, None, 0)
            .expect("render target");
        assert_eq!(opaque, PixelFormat::B8G8R8X8Unorm);

        let (_, translucent) = manager
            .create_render_target(&mut device, 8, 8, false, None, 0)
            .expect("render target");
        assert_eq!(translucent, PixelFormat::B8G8R8A8Unorm);

        let (_, pinned) = manager
            .create_render_target(&mut device, 8, 8, true, Some(PixelFormat::R8G8B8A8Unorm), 0)
            .expect("render target");
        assert_eq!(pinned, PixelFormat::R8G8B8A8Unorm);
    }

    #[test]
    fn default_pool_release_retains_shaders_and_dynamic_textures() {
        let mut device = device();
        let mut manager = ResourceManager::new();

        let swap_chain = manager
            .create_swap_chain(
                &mut device,
                WindowHandle(7),
                2,
                640,
                480,
                SwapEffect::FlipSequential,
            )
            .expect("swap chain");
        let default_tex = manager
            .create_texture(
                &mut device,
                &TextureParams {
                    width: 16,
                    height: 16,
                    is_rtt: false,
                    is_opaque: false,
                    use_mipmap: false,
                    format_hint: None,
                    usage: Usage::Default,
                    samples: 0,
                },
            )
            .expect("texture");
        let dynamic_tex = manager
            .create_texture(
                &mut device,
                &TextureParams {
                    width: 16,
                    height: 16,
                    is_rtt: false,
                    is_opaque: false,
                    use_mipmap: false,
                    format_hint: None,
                    usage: Usage::Dynamic,
                    samples: 0,
                },
            )
            .expect("texture");
        let shader = manager
            .create_pixel_shader(&mut device, b"ps")
            .expect("shader");

        manager.release_default_pool(&mut device);

        assert!(!manager.contains(swap_chain));
        assert!(!manager.contains(default_tex));
        assert!(manager.contains(dynamic_tex));
        assert!(manager.contains(shader));
        assert_eq!(manager.len(), 2);
        assert_eq!(device.live_swap_chains(), 0);
        assert_eq!(device.live_textures(), 1);
        assert_eq!(device.live_shaders(), 1);
    }

    #[test]
    fn buffer_reports_byte_size_as_width() {
        let mut device = device();
        let mut manager = ResourceManager::new();

        let buffer = manager
            .create_buffer(&mut device, 144, Usage::Default, BindFlags::VERTEX_BUFFER)
            .expect("buffer");
        assert_eq!(manager.width(buffer), Some(144));
        assert_eq!(manager.height(buffer), Some(0));

        manager.release(&mut device, buffer).unwrap();
        assert_eq!(manager.width(buffer), None);
    }
}
