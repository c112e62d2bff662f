//! Deterministic software backend used by tests.
//!
//! No GPU work happens here; objects are bookkeeping records. The factory and
//! device record creation counts and support failure injection so lifecycle
//! policies (lazy single-init, sticky adapter failure, buffer-rebuild reuse)
//! can be asserted exactly.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::{
    AdapterInfo, BackendError, BindFlags, BufferDesc, BufferId, GpuDevice, GpuFactory, MonitorId,
    OutputInfo, PixelFormat, RasterizerDesc, RenderTargetViewId, ShaderId, ShaderStage,
    SwapChainDesc, SwapChainId, TextureDesc, TextureId,
};
use crate::FeatureLevel;

pub struct SoftFactory {
    adapters: Vec<AdapterInfo>,
    /// Highest feature level the fake driver recognizes. A creation list whose
    /// top entry is newer than this is rejected wholesale with `InvalidArg`,
    /// matching the driver behavior the fallback retry exists for.
    max_level: FeatureLevel,
    /// Highest level the fake hardware supports; selection picks the first
    /// list entry at or below this. Recognizing a level is not supporting it.
    supported_level: FeatureLevel,
    fail_ordinals: RefCell<HashSet<u32>>,
    create_device_calls: RefCell<HashMap<u32, u32>>,
}

impl SoftFactory {
    /// A factory with `adapter_count` adapters, each with a single output
    /// whose monitor id is `0x1000 + ordinal`.
    pub fn new(adapter_count: u32) -> Self {
        let adapters = (0..adapter_count)
            .map(|i| AdapterInfo {
                name: format!("soft adapter {i}"),
                outputs: vec![OutputInfo {
                    monitor: MonitorId(0x1000 + u64::from(i)),
                }],
            })
            .collect();
        Self {
            adapters,
            max_level: FeatureLevel::L11_1,
            supported_level: FeatureLevel::L11_1,
            fail_ordinals: RefCell::new(HashSet::new()),
            create_device_calls: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_adapters(adapters: Vec<AdapterInfo>) -> Self {
        Self {
            adapters,
            max_level: FeatureLevel::L11_1,
            supported_level: FeatureLevel::L11_1,
            fail_ordinals: RefCell::new(HashSet::new()),
            create_device_calls: RefCell::new(HashMap::new()),
        }
    }

    /// Models a driver built against an older API: any creation list whose
    /// top entry exceeds `level` is rejected with `InvalidArg`.
    pub fn set_max_feature_level(&mut self, level: FeatureLevel) {
        self.max_level = level;
    }

    /// Models hardware that recognizes the full list but only supports
    /// levels at or below `level`; selection settles there without error.
    pub fn set_supported_feature_level(&mut self, level: FeatureLevel) {
        self.supported_level = level;
    }

    /// Makes every device-creation attempt on `ordinal` fail.
    pub fn fail_device_creation(&mut self, ordinal: u32) {
        self.fail_ordinals.borrow_mut().insert(ordinal);
    }

    /// How many times `create_device` has been invoked for `ordinal`.
    pub fn device_creation_calls(&self, ordinal: u32) -> u32 {
        self.create_device_calls
            .borrow()
            .get(&ordinal)
            .copied()
            .unwrap_or(0)
    }
}

impl GpuFactory for SoftFactory {
    type Device = SoftDevice;

    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        self.adapters.clone()
    }

    fn create_device(
        &self,
        ordinal: u32,
        levels: &[FeatureLevel],
    ) -> Result<(SoftDevice, FeatureLevel), BackendError> {
        *self
            .create_device_calls
            .borrow_mut()
            .entry(ordinal)
            .or_insert(0) += 1;

        if ordinal as usize >= self.adapters.len() {
            return Err(BackendError::InvalidCall(format!(
                "adapter ordinal {ordinal} out of range"
            )));
        }
        if self.fail_ordinals.borrow().contains(&ordinal) {
            return Err(BackendError::InvalidCall(format!(
                "adapter {ordinal}: device creation failed"
            )));
        }
        let Some(&top) = levels.first() else {
            return Err(BackendError::InvalidArg("empty feature level list"));
        };
        if top > self.max_level {
            return Err(BackendError::InvalidArg(
                "unrecognized feature level in creation list",
            ));
        }
        let highest = self.max_level.min(self.supported_level);
        let level = levels
            .iter()
            .copied()
            .find(|&l| l <= highest)
            .ok_or(BackendError::Unsupported("no feature level supported"))?;
        Ok((SoftDevice::new(level), level))
    }
}

#[derive(Debug)]
struct SoftBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
}

#[derive(Debug)]
pub struct SoftDevice {
    level: FeatureLevel,
    next_id: u64,

    buffers: HashMap<u64, SoftBuffer>,
    textures: HashMap<u64, TextureDesc>,
    render_target_views: HashMap<u64, TextureId>,
    swap_chains: HashMap<u64, SwapChainDesc>,
    shaders: HashMap<u64, Vec<u8>>,

    rasterizer: RasterizerDesc,
    bound_constants: HashMap<(ShaderStage, u32), BufferId>,
    max_multisample_count: u32,

    buffers_created: u32,
    buffer_writes: u32,
    textures_created: u32,
    render_target_views_created: u32,
    swap_chains_created: u32,
    shaders_created: u32,
    presents: u32,

    /// Fails the Nth creation call from now (0 = the next one), once.
    fail_creation_after: Option<(u32, BackendError)>,
}

impl SoftDevice {
    fn new(level: FeatureLevel) -> Self {
        Self {
            level,
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            render_target_views: HashMap::new(),
            swap_chains: HashMap::new(),
            shaders: HashMap::new(),
            rasterizer: RasterizerDesc::DEFAULT,
            bound_constants: HashMap::new(),
            max_multisample_count: 8,
            buffers_created: 0,
            buffer_writes: 0,
            textures_created: 0,
            render_target_views_created: 0,
            swap_chains_created: 0,
            shaders_created: 0,
            presents: 0,
            fail_creation_after: None,
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_injected_failure(&mut self) -> Option<BackendError> {
        match self.fail_creation_after.take() {
            Some((0, err)) => Some(err),
            Some((n, err)) => {
                self.fail_creation_after = Some((n - 1, err));
                None
            }
            None => None,
        }
    }

    /// Fails the next creation call with `err`, once.
    pub fn fail_next_creation(&mut self, err: BackendError) {
        self.fail_creation_after = Some((0, err));
    }

    /// Fails the creation call `n` calls from now with `err`, once.
    pub fn fail_creation_after(&mut self, n: u32, err: BackendError) {
        self.fail_creation_after = Some((n, err));
    }

    /// Highest sample count `multisample_quality_levels` reports support for.
    pub fn set_max_multisample_count(&mut self, count: u32) {
        self.max_multisample_count = count;
    }

    pub fn buffers_created(&self) -> u32 {
        self.buffers_created
    }

    pub fn buffer_writes(&self) -> u32 {
        self.buffer_writes
    }

    pub fn textures_created(&self) -> u32 {
        self.textures_created
    }

    pub fn render_target_views_created(&self) -> u32 {
        self.render_target_views_created
    }

    pub fn swap_chains_created(&self) -> u32 {
        self.swap_chains_created
    }

    pub fn shaders_created(&self) -> u32 {
        self.shaders_created
    }

    pub fn presents(&self) -> u32 {
        self.presents
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_render_target_views(&self) -> usize {
        self.render_target_views.len()
    }

    pub fn live_swap_chains(&self) -> usize {
        self.swap_chains.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn read_buffer(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(&id.0).map(|b| b.data.as_slice())
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id.0)
    }

    pub fn rasterizer_state(&self) -> &RasterizerDesc {
        &self.rasterizer
    }

    pub fn bound_constant_buffer(&self, stage: ShaderStage, slot: u32) -> Option<BufferId> {
        self.bound_constants.get(&(stage, slot)).copied()
    }
}

impl GpuDevice for SoftDevice {
    fn feature_level(&self) -> FeatureLevel {
        self.level
    }

    fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        init_data: Option<&[u8]>,
    ) -> Result<BufferId, BackendError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        if desc.size == 0 {
            return Err(BackendError::InvalidArg("zero-size buffer"));
        }
        // The native API requires constant-buffer byte widths in multiples
        // of 16.
        if desc.bind.contains(BindFlags::CONSTANT_BUFFER) && desc.size % 16 != 0 {
            return Err(BackendError::InvalidArg(
                "constant buffer size not a multiple of 16",
            ));
        }
        if let Some(data) = init_data {
            if data.len() as u64 > desc.size {
                return Err(BackendError::InvalidArg("init data exceeds buffer size"));
            }
        }
        let mut data = vec![0u8; desc.size as usize];
        if let Some(init) = init_data {
            data[..init.len()].copy_from_slice(init);
        }
        let id = self.alloc_id();
        self.buffers.insert(id, SoftBuffer { desc: *desc, data });
        self.buffers_created += 1;
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
        let buffer = self
            .buffers
            .get_mut(&id.0)
            .ok_or_else(|| BackendError::InvalidCall(format!("unknown buffer {}", id.0)))?;
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(BackendError::InvalidArg("buffer write range overflow"))?;
        if end > buffer.desc.size {
            return Err(BackendError::InvalidCall(format!(
                "buffer write out of range: {end} > {}",
                buffer.desc.size
            )));
        }
        buffer.data[offset as usize..end as usize].copy_from_slice(data);
        self.buffer_writes += 1;
        Ok(())
    }

    fn create_texture2d(&mut self, desc: &TextureDesc) -> Result<TextureId, BackendError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::InvalidArg("zero texture dimension"));
        }
        if desc.format == PixelFormat::Unknown {
            return Err(BackendError::InvalidArg("unknown texture format"));
        }
        if let Some(max) = self.level.max_texture_size() {
            if desc.width > max || desc.height > max {
                return Err(BackendError::InvalidCall(format!(
                    "texture {}x{} exceeds feature-level maximum {max}",
                    desc.width, desc.height
                )));
            }
        }
        let id = self.alloc_id();
        self.textures.insert(id, *desc);
        self.textures_created += 1;
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
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let desc = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| BackendError::InvalidCall(format!("unknown texture {}", texture.0)))?;
        if !desc.bind.contains(BindFlags::RENDER_TARGET) {
            return Err(BackendError::InvalidCall(
                "texture was not created with RENDER_TARGET binding".into(),
            ));
        }
        let id = self.alloc_id();
        self.render_target_views.insert(id, texture);
        self.render_target_views_created += 1;
        Ok(RenderTargetViewId(id))
    }

    fn destroy_render_target_view(&mut self, id: RenderTargetViewId) {
        if self.render_target_views.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_render_target_view: unknown id ignored");
        }
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> Result<SwapChainId, BackendError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        if desc.buffer_count == 0 {
            return Err(BackendError::InvalidArg("zero-buffer swap chain"));
        }
        let id = self.alloc_id();
        self.swap_chains.insert(id, *desc);
        self.swap_chains_created += 1;
        Ok(SwapChainId(id))
    }

    fn destroy_swap_chain(&mut self, id: SwapChainId) {
        if self.swap_chains.remove(&id.0).is_none() {
            trace!(id = id.0, "destroy_swap_chain: unknown id ignored");
        }
    }

    fn present(&mut self, id: SwapChainId) -> Result<(), BackendError> {
        if !self.swap_chains.contains_key(&id.0) {
            return Err(BackendError::InvalidCall(format!(
                "present: unknown swap chain {}",
                id.0
            )));
        }
        self.presents += 1;
        Ok(())
    }

    fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<ShaderId, BackendError> {
        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        if bytecode.is_empty() {
            return Err(BackendError::InvalidArg("empty shader bytecode"));
        }
        let id = self.alloc_id();
        self.shaders.insert(id, bytecode.to_vec());
        self.shaders_created += 1;
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
        if format == PixelFormat::Unknown {
            return Err(BackendError::InvalidArg("unknown format"));
        }
        if sample_count == 0 || !sample_count.is_power_of_two() {
            return Ok(0);
        }
        Ok(u32::from(sample_count <= self.max_multisample_count))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn device_creation_counts_and_injected_failure() {
        let mut factory = SoftFactory::new(2);
        factory.fail_device_creation(1);

        assert!(factory.create_device(0, &FeatureLevel::DESCENDING).is_ok());
        assert!(factory.create_device(1, &FeatureLevel::DESCENDING).is_err());
        assert!(factory.create_device(1, &FeatureLevel::DESCENDING).is_err());
        assert_eq!(factory.device_creation_calls(0), 1);
        assert_eq!(factory.device_creation_calls(1), 2);
    }

    #[test]
    fn old_driver_rejects_list_with_unrecognized_top_level() {
        let mut factory = SoftFactory::new(1);
        factory.set_max_feature_level(FeatureLevel::L11_0);

        let err = factory
            .create_device(0, &FeatureLevel::DESCENDING)
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidArg(_)));

        let (_, level) = factory
            .create_device(0, &FeatureLevel::DESCENDING[1..])
            .unwrap();
        assert_eq!(level, FeatureLevel::L11_0);
    }

    #[test]
    fn buffer_write_is_bounds_checked() {
        let factory = SoftFactory::new(1);
        let (mut device, _) = factory.create_device(0, &FeatureLevel::DESCENDING).unwrap();
        let buf = device
            .create_buffer(
                &BufferDesc {
                    size: 8,
                    usage: crate::Usage::Default,
                    bind: BindFlags::VERTEX_BUFFER,
                },
                None,
            )
            .unwrap();
        device.write_buffer(buf, 0, &[1, 2, 3, 4]).unwrap();
        assert!(device.write_buffer(buf, 6, &[0, 0, 0]).is_err());
        assert_eq!(device.read_buffer(buf).unwrap()[..4], [1, 2, 3, 4]);
    }

    #[test]
    fn constant_buffer_width_must_be_16_byte_multiple() {
        let factory = SoftFactory::new(1);
        let (mut device, _) = factory.create_device(0, &FeatureLevel::DESCENDING).unwrap();
        let err = device
            .create_buffer(
                &BufferDesc {
                    size: 20,
                    usage: crate::Usage::Dynamic,
                    bind: BindFlags::CONSTANT_BUFFER,
                },
                None,
            )
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidArg(_)));
    }
}
