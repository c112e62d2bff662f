//! Per-adapter device context: device handle, transform state, resource
//! manager, constant-buffer upload.

use glint_gpu::{
    BackendError, BindFlags, BufferDesc, BufferId, FeatureLevel, GpuDevice, GpuFactory,
    PixelFormat, RasterizerDesc, ShaderStage, SwapEffect, Usage, WindowHandle,
};
use tracing::{debug, warn};

use crate::resource::{ResourceHandle, ResourceKind, ResourceManager, TextureParams};
use crate::D3dError;

pub type Matrix = [[f32; 4]; 4];

pub const IDENTITY: Matrix = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Owns exactly one device, its negotiated feature level, the resource table,
/// and the world/projection transform state.
///
/// A context is never exposed half-initialized: [`DeviceContext::init`] only
/// constructs the value after device creation has succeeded.
pub struct DeviceContext<D: GpuDevice> {
    device: D,
    level: FeatureLevel,
    resources: ResourceManager,
    world: Matrix,
    projection: Matrix,
    vs_constants: Option<BufferId>,
    ps_constants: Option<BufferId>,
}

impl<D: GpuDevice> DeviceContext<D> {
    /// Creates the device at the highest supported feature level.
    ///
    /// A driver that does not recognize the newest level rejects the whole
    /// list with `InvalidArg`; that one case gets a single retry with the
    /// list minus its top entry. Any other failure, or failure of the retry,
    /// is fatal for this context only.
    pub fn init<F: GpuFactory<Device = D>>(factory: &F, ordinal: u32) -> Result<Self, D3dError> {
        let levels = &FeatureLevel::DESCENDING;
        let (device, level) = match factory.create_device(ordinal, levels) {
            Ok(created) => created,
            Err(BackendError::InvalidArg(_)) => {
                debug!(ordinal, "driver rejected the newest feature level, retrying without it");
                factory.create_device(ordinal, &levels[1..])?
            }
            Err(err) => return Err(err.into()),
        };
        debug!(ordinal, ?level, "device context initialized");
        Ok(Self {
            device,
            level,
            resources: ResourceManager::new(),
            world: IDENTITY,
            projection: IDENTITY,
            vs_constants: None,
            ps_constants: None,
        })
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.level
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Re-applies the default rasterizer state. Idempotent; a device
    /// rejection propagates rather than being skipped.
    pub fn reset_clip(&mut self) -> Result<(), D3dError> {
        self.device.set_rasterizer_state(&RasterizerDesc::DEFAULT)?;
        Ok(())
    }

    /// World := identity, then re-upload the combined transform.
    pub fn reset_transform(&mut self) -> Result<(), D3dError> {
        self.world = IDENTITY;
        self.update_vertex_shader_tx()
    }

    pub fn set_world(&mut self, m: Matrix) -> Result<(), D3dError> {
        self.world = m;
        self.update_vertex_shader_tx()
    }

    pub fn set_projection(&mut self, m: Matrix) -> Result<(), D3dError> {
        self.projection = m;
        self.update_vertex_shader_tx()
    }

    /// Recomputes transpose(world × projection) and uploads it into a fresh
    /// vertex-stage constant buffer. Runs on every transform change; the
    /// previous buffer is destroyed first so repeated updates hold exactly
    /// one buffer alive.
    pub fn update_vertex_shader_tx(&mut self) -> Result<(), D3dError> {
        let wvp = mat4_transpose(mat4_mul(self.world, self.projection));
        if let Some(prev) = self.vs_constants.take() {
            self.device.destroy_buffer(prev);
        }
        let buffer = self.device.create_buffer(
            &BufferDesc {
                size: 64,
                usage: Usage::Dynamic,
                bind: BindFlags::CONSTANT_BUFFER,
            },
            Some(bytemuck::bytes_of(&wvp)),
        )?;
        self.device
            .bind_constant_buffer(ShaderStage::Vertex, 0, buffer)?;
        self.vs_constants = Some(buffer);
        Ok(())
    }

    /// Uploads `count` floats of `data` starting at `offset` into the
    /// pixel-stage constant buffer bound at register `reg`. The range is
    /// validated before any device call.
    pub fn set_pixel_constants_f(
        &mut self,
        reg: u32,
        data: &[f32],
        offset: usize,
        count: usize,
    ) -> Result<(), D3dError> {
        let range = checked_range(data.len(), offset, count)?;
        self.upload_pixel_constants(reg, bytemuck::cast_slice(&data[range]))
    }

    pub fn set_pixel_constants_i(
        &mut self,
        reg: u32,
        data: &[i32],
        offset: usize,
        count: usize,
    ) -> Result<(), D3dError> {
        let range = checked_range(data.len(), offset, count)?;
        self.upload_pixel_constants(reg, bytemuck::cast_slice(&data[range]))
    }

    fn upload_pixel_constants(&mut self, reg: u32, bytes: &[u8]) -> Result<(), D3dError> {
        // Constant-buffer byte widths must be multiples of 16; the tail pads
        // with zeroes.
        let size = (bytes.len() as u64).next_multiple_of(16).max(16);
        if let Some(prev) = self.ps_constants.take() {
            self.device.destroy_buffer(prev);
        }
        let buffer = self.device.create_buffer(
            &BufferDesc {
                size,
                usage: Usage::Dynamic,
                bind: BindFlags::CONSTANT_BUFFER,
            },
            Some(bytes),
        )?;
        self.device
            .bind_constant_buffer(ShaderStage::Pixel, reg, buffer)?;
        self.ps_constants = Some(buffer);
        Ok(())
    }

    /// Fixed fallback table keyed by the negotiated feature level.
    pub fn max_texture_size(&self) -> Option<u32> {
        self.level.max_texture_size()
    }

    /// Highest sample count (1, 2, 4, …, 32) with at least one quality level
    /// for `format`. A failing query returns the best count found so far.
    pub fn max_sample_support(&self, format: PixelFormat) -> u32 {
        let mut best = 0;
        let mut count = 1;
        while count <= 32 {
            match self.device.multisample_quality_levels(format, count) {
                Ok(quality) if quality > 0 => best = count,
                Ok(_) => break,
                Err(err) => {
                    warn!(%err, ?format, count, "multisample quality query failed");
                    break;
                }
            }
            count *= 2;
        }
        best
    }

    pub fn create_swap_chain(
        &mut self,
        window: WindowHandle,
        buffer_count: u32,
        width: u32,
        height: u32,
        swap_effect: SwapEffect,
    ) -> Result<ResourceHandle, D3dError> {
        self.resources.create_swap_chain(
            &mut self.device,
            window,
            buffer_count,
            width,
            height,
            swap_effect,
        )
    }

    pub fn create_texture(&mut self, params: &TextureParams) -> Result<ResourceHandle, D3dError> {
        self.resources.create_texture(&mut self.device, params)
    }

    pub fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        is_opaque: bool,
        format_hint: Option<PixelFormat>,
        samples: u32,
    ) -> Result<(ResourceHandle, PixelFormat), D3dError> {
        self.resources.create_render_target(
            &mut self.device,
            width,
            height,
            is_opaque,
            format_hint,
            samples,
        )
    }

    pub fn create_pixel_shader(&mut self, bytecode: &[u8]) -> Result<ResourceHandle, D3dError> {
        self.resources.create_pixel_shader(&mut self.device, bytecode)
    }

    pub fn release_resource(&mut self, handle: ResourceHandle) -> Result<(), D3dError> {
        self.resources.release(&mut self.device, handle)
    }

    pub fn present(&mut self, handle: ResourceHandle) -> Result<(), D3dError> {
        let swap_chain = match self.resources.get(handle) {
            Some(ResourceKind::SwapChain { swap_chain, .. }) => *swap_chain,
            _ => return Err(D3dError::UnknownHandle),
        };
        self.device.present(swap_chain)?;
        Ok(())
    }

    /// Force-releases every tracked resource plus the context-owned constant
    /// buffers. The single teardown path for full device reset.
    pub fn release_context_resources(&mut self) {
        if let Some(buffer) = self.vs_constants.take() {
            self.device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.ps_constants.take() {
            self.device.destroy_buffer(buffer);
        }
        self.resources.release_all(&mut self.device);
    }

    /// Releases only default-pool residents, keeping system-pool resources.
    pub fn release_default_pool_resources(&mut self) {
        self.resources.release_default_pool(&mut self.device);
    }

    /// Full teardown: all resources, then the device itself.
    pub fn release(mut self) {
        self.release_context_resources();
    }
}

pub fn mat4_mul(a: Matrix, b: Matrix) -> Matrix {
    let mut out = [[0.0f32; 4]; 4];
    for (row, out_row) in out.iter_mut().enumerate() {
        for (col, cell) in out_row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[row][k] * b[k][col]).sum();
        }
    }
    out
}

pub fn mat4_transpose(m: Matrix) -> Matrix {
    let mut out = [[0.0f32; 4]; 4];
    for (row, m_row) in m.iter().enumerate() {
        for (col, &value) in m_row.iter().enumerate() {
            out[col][row] = value;
        }
    }
    out
}

fn checked_range(
    len: usize,
    offset: usize,
    count: usize,
) -> Result<std::ops::Range<usize>, D3dError> {
    match offset.checked_add(count) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(D3dError::OutOfBounds { offset, count, len }),
    }
}

#[cfg(test)]
mod tests {
    use glint_gpu::SoftFactory;
    use pretty_assertions::assert_eq;

    use super::*;

    fn context() -> DeviceContext<glint_gpu::SoftDevice> {
        DeviceContext::init(&SoftFactory::new(1), 0).expect("context")
    }

    #[test]
    fn multiply_by_identity_is_identity() {
        let m = [
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [13.0, 14.0, 15.0, 16.0],
        ];
        assert_eq!(mat4_mul(m, IDENTITY), m);
        assert_eq!(mat4_mul(IDENTITY, m), m);
        assert_eq!(mat4_transpose(mat4_transpose(m)), m);
    }

    #[test]
    fn transform_updates_hold_exactly_one_constant_buffer() {
        let mut ctx = context();
        for i in 0..5 {
            let mut world = IDENTITY;
            world[3][0] = i as f32;
            ctx.set_world(world).expect("set_world");
            assert_eq!(ctx.device().live_buffers(), 1);
        }
        assert_eq!(ctx.device().buffers_created(), 5);
    }

    #[test]
    fn uploaded_transform_is_the_transposed_product() {
        let mut ctx = context();
        let mut world = IDENTITY;
        world[3][0] = 2.0; // row-vector translation
        let mut projection = IDENTITY;
        projection[0][0] = 3.0;
        ctx.set_projection(projection).expect("set_projection");
        ctx.set_world(world).expect("set_world");

        let buffer = ctx
            .device()
            .bound_constant_buffer(ShaderStage::Vertex, 0)
            .expect("vertex constants bound");
        let bytes = ctx.device().read_buffer(buffer).expect("buffer data");
        let uploaded: &[f32] = bytemuck::cast_slice(bytes);
        let expected = mat4_transpose(mat4_mul(world, projection));
        assert_eq!(uploaded, bytemuck::cast_slice::<[f32; 4], f32>(&expected));
    }

    #[test]
    fn pixel_constants_rejects_out_of_bounds_before_device_call() {
        let mut ctx = context();
        let data = [1.0f32; 8];
        let created_before = ctx.device().buffers_created();
        let err = ctx.set_pixel_constants_f(0, &data, 6, 4).unwrap_err();
        assert_eq!(
            err,
            D3dError::OutOfBounds {
                offset: 6,
                count: 4,
                len: 8
            }
        );
        assert_eq!(ctx.device().buffers_created(), created_before);
    }

    #[test]
    fn pixel_constants_pad_to_sixteen_bytes() {
        let mut ctx = context();
        let data = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        ctx.set_pixel_constants_f(2, &data, 0, 5).expect("upload");
        let buffer = ctx
            .device()
            .bound_constant_buffer(ShaderStage::Pixel, 2)
            .expect("pixel constants bound");
        let bytes = ctx.device().read_buffer(buffer).expect("buffer data");
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[..20], bytemuck::cast_slice::<f32, u8>(&data));
        assert_eq!(&bytes[20..], &[0u8; 12]);
    }

    #[test]
    fn repeated_pixel_constant_uploads_hold_one_buffer() {
        let mut ctx = context();
        ctx.reset_transform().expect("reset"); // one vertex constant buffer
        for _ in 0..4 {
            ctx.set_pixel_constants_i(1, &[1, 2, 3, 4], 0, 4).expect("upload");
        }
        assert_eq!(ctx.device().live_buffers(), 2);
    }

    #[test]
    fn max_sample_support_returns_highest_supported_count() {
        let mut ctx = context();
        ctx.device_mut().set_max_multisample_count(8);
        assert_eq!(ctx.max_sample_support(PixelFormat::B8G8R8X8Unorm), 8);
        ctx.device_mut().set_max_multisample_count(32);
        assert_eq!(ctx.max_sample_support(PixelFormat::B8G8R8X8Unorm), 32);
    }

    #[test]
    fn release_context_resources_empties_everything() {
        let mut ctx = context();
        ctx.reset_transform().expect("reset");
        ctx.create_pixel_shader(b"ps").expect("shader");
        ctx.create_render_target(16, 16, true, None, 0)
            .expect("render target");

        ctx.release_context_resources();
        assert_eq!(ctx.resources().len(), 0);
        assert_eq!(ctx.device().live_buffers(), 0);
        assert_eq!(ctx.device().live_textures(), 0);
        assert_eq!(ctx.device().live_shaders(), 0);
        assert_eq!(ctx.device().live_render_target_views(), 0);
    }
}
