use glint_gpu::BackendError;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum D3d9Error {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("requested {count} elements at {offset} from a buffer of {len}")]
    OutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },
}
