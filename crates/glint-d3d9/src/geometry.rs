//! Bounds-checked geometry entry points for the marshaling layer.
//!
//! The caller supplies raw buffers with explicit element counts; counts are
//! validated against the actual buffer lengths before anything touches the
//! native write path.

use glint_gpu::GpuDevice;

use crate::{D3d9Error, Mesh};

fn checked_prefix<T>(data: &[T], count: usize) -> Result<&[T], D3d9Error> {
    data.get(..count).ok_or(D3d9Error::OutOfBounds {
        offset: 0,
        count,
        len: data.len(),
    })
}

/// Builds `mesh` from the first `vertex_count` floats and `index_count`
/// 16-bit indices.
pub fn build_geometry_u16<D: GpuDevice>(
    device: &mut D,
    mesh: &mut Mesh,
    vertices: &[f32],
    vertex_count: usize,
    indices: &[u16],
    index_count: usize,
) -> Result<(), D3d9Error> {
    let vertices = checked_prefix(vertices, vertex_count)?;
    let indices = checked_prefix(indices, index_count)?;
    mesh.build_buffers(device, vertices, indices)
}

/// 32-bit-index variant of [`build_geometry_u16`].
pub fn build_geometry_u32<D: GpuDevice>(
    device: &mut D,
    mesh: &mut Mesh,
    vertices: &[f32],
    vertex_count: usize,
    indices: &[u32],
    index_count: usize,
) -> Result<(), D3d9Error> {
    let vertices = checked_prefix(vertices, vertex_count)?;
    let indices = checked_prefix(indices, index_count)?;
    mesh.build_buffers_u32(device, vertices, indices)
}
