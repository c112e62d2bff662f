//! Mesh geometry buffers with a rebuild-avoiding update protocol.

use glint_gpu::{BindFlags, BufferDesc, BufferId, GpuDevice, Usage};
use tracing::trace;

use crate::D3d9Error;

/// Position (3), texcoord (2), packed normal quaternion (4).
pub const VERTEX_STRIDE_FLOATS: usize = 9;
pub const VERTEX_STRIDE_BYTES: usize = VERTEX_STRIDE_FLOATS * 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    U16,
    U32,
}

impl IndexWidth {
    fn bytes(self) -> usize {
        match self {
            IndexWidth::U16 => 2,
            IndexWidth::U32 => 4,
        }
    }
}

/// At most one vertex buffer and one index buffer, plus their current element
/// counts.
///
/// Buffers are released and recreated only when a requested element count (or
/// the index width) differs from the current one; an unchanged count reuses
/// the existing buffer and overwrites it in place. Any failing step
/// short-circuits the rest, and a partially updated mesh must not be rendered
/// until a later build succeeds.
#[derive(Default)]
pub struct Mesh {
    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    num_vertices: u32,
    num_indices: u32,
    index_width: Option<IndexWidth>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.index_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.num_vertices
    }

    pub fn index_count(&self) -> u32 {
        self.num_indices
    }

    /// Builds or updates both buffers from 16-bit-indexed geometry.
    pub fn build_buffers<D: GpuDevice>(
        &mut self,
        device: &mut D,
        vertices: &[f32],
        indices: &[u16],
    ) -> Result<(), D3d9Error> {
        self.update_vertex_buffer(device, vertices)?;
        self.update_index_buffer(
            device,
            bytemuck::cast_slice(indices),
            indices.len() as u32,
            IndexWidth::U16,
        )
    }

    /// 32-bit-index variant of [`Mesh::build_buffers`].
    pub fn build_buffers_u32<D: GpuDevice>(
        &mut self,
        device: &mut D,
        vertices: &[f32],
        indices: &[u32],
    ) -> Result<(), D3d9Error> {
        self.update_vertex_buffer(device, vertices)?;
        self.update_index_buffer(
            device,
            bytemuck::cast_slice(indices),
            indices.len() as u32,
            IndexWidth::U32,
        )
    }

    fn update_vertex_buffer<D: GpuDevice>(
        &mut self,
        device: &mut D,
        vertices: &[f32],
    ) -> Result<(), D3d9Error> {
        // Requested count derives from the byte length of the supplied data.
        let count = (vertices.len() * 4 / VERTEX_STRIDE_BYTES) as u32;
        if count != self.num_vertices {
            trace!(from = self.num_vertices, to = count, "rebuilding vertex buffer");
            if let Some(buffer) = self.vertex_buffer.take() {
                device.destroy_buffer(buffer);
            }
            self.num_vertices = 0;
            if count > 0 {
                let buffer = device.create_buffer(
                    &BufferDesc {
                        size: u64::from(count) * VERTEX_STRIDE_BYTES as u64,
                        usage: Usage::Default,
                        bind: BindFlags::VERTEX_BUFFER,
                    },
                    None,
                )?;
                self.vertex_buffer = Some(buffer);
            }
            self.num_vertices = count;
        }
        if let Some(buffer) = self.vertex_buffer {
            let bytes = count as usize * VERTEX_STRIDE_BYTES;
            device.write_buffer(buffer, 0, &bytemuck::cast_slice(vertices)[..bytes])?;
        }
        Ok(())
    }

    fn update_index_buffer<D: GpuDevice>(
        &mut self,
        device: &mut D,
        data: &[u8],
        count: u32,
        width: IndexWidth,
    ) -> Result<(), D3d9Error> {
        if count != self.num_indices || self.index_width != Some(width) {
            trace!(from = self.num_indices, to = count, ?width, "rebuilding index buffer");
            if let Some(buffer) = self.index_buffer.take() {
                device.destroy_buffer(buffer);
            }
            self.num_indices = 0;
            if count > 0 {
                let buffer = device.create_buffer(
                    &BufferDesc {
                        size: count as u64 * width.bytes() as u64,
                        usage: Usage::Default,
                        bind: BindFlags::INDEX_BUFFER,
                    },
                    None,
                )?;
                self.index_buffer = Some(buffer);
            }
            self.num_indices = count;
            self.index_width = Some(width);
        }
        if let Some(buffer) = self.index_buffer {
            let bytes = count as usize * width.bytes();
            device.write_buffer(buffer, 0, &data[..bytes])?;
        }
        Ok(())
    }

    pub fn release_vertex_buffer<D: GpuDevice>(&mut self, device: &mut D) {
        if let Some(buffer) = self.vertex_buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.num_vertices = 0;
    }

    pub fn release_index_buffer<D: GpuDevice>(&mut self, device: &mut D) {
        if let Some(buffer) = self.index_buffer.take() {
            device.destroy_buffer(buffer);
        }
        self.num_indices = 0;
        self.index_width = None;
    }

    /// Releases both buffers. The mesh is reusable afterwards.
    pub fn release<D: GpuDevice>(&mut self, device: &mut D) {
        self.release_vertex_buffer(device);
        self.release_index_buffer(device);
    }
}
