//! Per-object bindings for the glint binding layer: mesh geometry buffers
//! and Phong material state.

#![deny(unsafe_code)]

mod error;
mod geometry;
mod material;
mod mesh;

pub use error::D3d9Error;
pub use geometry::{build_geometry_u16, build_geometry_u32};
pub use material::{MapKind, PhongMaterial};
pub use mesh::{IndexWidth, Mesh, VERTEX_STRIDE_BYTES, VERTEX_STRIDE_FLOATS};
