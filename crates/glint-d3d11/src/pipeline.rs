//! Adapter table plus lazy per-adapter device contexts.

use glint_gpu::{AdapterInfo, GpuDevice, GpuFactory, MonitorId, WindowHandle};
use tracing::{debug, warn};

use crate::context::DeviceContext;
use crate::D3dError;

enum AdapterState<D: GpuDevice> {
    NotInitialized,
    InitFailed,
    Created(DeviceContext<D>),
}

struct AdapterSlot<D: GpuDevice> {
    info: AdapterInfo,
    state: AdapterState<D>,
    focus_window: Option<WindowHandle>,
}

/// Owns the factory and one slot per enumerated adapter.
///
/// The caller constructs one of these at startup and threads it through entry
/// points. Contexts are created lazily, once per ordinal ever: the slot state
/// moves `NotInitialized → Created` or `NotInitialized → InitFailed` and then
/// never changes again, so a failed adapter stays failed without retrying
/// device creation.
pub struct Pipeline<F: GpuFactory> {
    factory: F,
    adapters: Vec<AdapterSlot<F::Device>>,
}

impl<F: GpuFactory> Pipeline<F> {
    /// Enumerates adapters once. Zero adapters is a construction failure and
    /// no pipeline is produced.
    pub fn new(factory: F) -> Result<Self, D3dError> {
        let infos = factory.enumerate_adapters();
        if infos.is_empty() {
            warn!("adapter enumeration found no adapters");
            return Err(D3dError::NoAdapters);
        }
        debug!(count = infos.len(), "pipeline created");
        let adapters = infos
            .into_iter()
            .map(|info| AdapterSlot {
                info,
                state: AdapterState::NotInitialized,
                focus_window: None,
            })
            .collect();
        Ok(Self { factory, adapters })
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Immutable after construction.
    pub fn adapter_count(&self) -> u32 {
        self.adapters.len() as u32
    }

    pub fn adapter_info(&self, ordinal: u32) -> Option<&AdapterInfo> {
        self.adapters.get(ordinal as usize).map(|slot| &slot.info)
    }

    /// The context for `ordinal`, creating it on first access.
    ///
    /// One-shot memoized lazy init: device creation runs at most once per
    /// ordinal; a previously failed ordinal fails immediately. Subsequent
    /// calls return the cached context in O(1).
    pub fn context(&mut self, ordinal: u32) -> Result<&mut DeviceContext<F::Device>, D3dError> {
        let count = self.adapters.len() as u32;
        let slot = self
            .adapters
            .get_mut(ordinal as usize)
            .ok_or(D3dError::AdapterOutOfRange { ordinal, count })?;
        if matches!(slot.state, AdapterState::NotInitialized) {
            slot.state = match DeviceContext::init(&self.factory, ordinal) {
                Ok(ctx) => AdapterState::Created(ctx),
                Err(err) => {
                    warn!(ordinal, %err, "device context initialization failed");
                    AdapterState::InitFailed
                }
            };
        }
        match &mut slot.state {
            AdapterState::Created(ctx) => Ok(ctx),
            _ => Err(D3dError::AdapterInitFailed(ordinal)),
        }
    }

    /// The already-created context for `ordinal`, without triggering init.
    pub fn created_context(&self, ordinal: u32) -> Option<&DeviceContext<F::Device>> {
        match self.adapters.get(ordinal as usize)?.state {
            AdapterState::Created(ref ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Linear scan over adapters, then over each adapter's outputs; the
    /// first matching ordinal wins. `None` is the not-found sentinel.
    pub fn adapter_ordinal_by_monitor(&self, monitor: MonitorId) -> Option<u32> {
        self.adapters.iter().enumerate().find_map(|(ordinal, slot)| {
            slot.info
                .outputs
                .iter()
                .any(|output| output.monitor == monitor)
                .then_some(ordinal as u32)
        })
    }

    /// Window given keyboard focus when this adapter goes fullscreen.
    pub fn set_focus_window(&mut self, ordinal: u32, window: WindowHandle) -> Result<(), D3dError> {
        let count = self.adapters.len() as u32;
        let slot = self
            .adapters
            .get_mut(ordinal as usize)
            .ok_or(D3dError::AdapterOutOfRange { ordinal, count })?;
        slot.focus_window = Some(window);
        Ok(())
    }

    pub fn focus_window(&self, ordinal: u32) -> Option<WindowHandle> {
        self.adapters.get(ordinal as usize)?.focus_window
    }

    /// Releases every adapter context (each force-releases its tracked
    /// resources), then the factory.
    pub fn release(self) {
        debug!("releasing pipeline");
        for slot in self.adapters {
            if let AdapterState::Created(ctx) = slot.state {
                ctx.release();
            }
        }
    }
}
