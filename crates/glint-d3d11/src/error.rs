use glint_gpu::BackendError;
use thiserror::Error;

/// Failures of the device/resource subsystem.
///
/// Driver-side failures pass through as [`D3dError::Backend`] unchanged and
/// are never retried here (the one documented retry, the feature-level
/// fallback, happens below this layer). Everything else is a contract error
/// detected defensively at an entry point.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum D3dError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("no display adapters found")]
    NoAdapters,
    #[error("adapter ordinal {ordinal} out of range (adapter count {count})")]
    AdapterOutOfRange { ordinal: u32, count: u32 },
    #[error("adapter {0}: device context initialization failed")]
    AdapterInitFailed(u32),
    #[error("range {offset}+{count} exceeds capacity {len}")]
    OutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },
    #[error("unknown or stale resource handle")]
    UnknownHandle,
    #[error("unknown context handle")]
    UnknownContext,
    #[error("resource does not belong to this context")]
    WrongContext,
}

impl D3dError {
    /// Human-readable message for callers that surface plain strings across
    /// the boundary.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
