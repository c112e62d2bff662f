//! Device-context and resource-lifetime management for the glint binding
//! layer.
//!
//! The [`Pipeline`] owns one slot per enumerated adapter and lazily creates a
//! [`DeviceContext`] per ordinal on first use (once ever; failures are
//! sticky). Each context owns a [`ResourceManager`] tracking every GPU
//! resource it allocated, so a device reset can release them en masse. The
//! [`Runtime`] wraps the pipeline in the opaque-`u64`-handle surface the
//! external marshaling layer calls.

#![deny(unsafe_code)]

mod context;
mod error;
mod pipeline;
mod resource;
mod runtime;

pub use context::{mat4_mul, mat4_transpose, DeviceContext, Matrix, IDENTITY};
pub use error::D3dError;
pub use pipeline::Pipeline;
pub use resource::{
    resolve_format, ResourceHandle, ResourceKind, ResourceManager, TextureParams,
};
pub use runtime::{
    Runtime, FORMAT_HINT_BYTE_ALPHA, FORMAT_HINT_BYTE_GRAY, FORMAT_HINT_BYTE_RGB,
    FORMAT_HINT_BYTE_RGBA_PRE, FORMAT_HINT_FLOAT_XYZW, FORMAT_HINT_INT_ARGB_PRE, FORMAT_HINT_NONE,
    USAGE_HINT_DEFAULT, USAGE_HINT_DYNAMIC,
};
