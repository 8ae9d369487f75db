use thiserror::Error;

use super::handle::{BufferHandle, CommandBufferHandle, DescriptorSetHandle, PipelineHandle};

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

/// Handle named in an [`DeviceError::UnknownHandle`] failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AnyHandle {
    Buffer(BufferHandle),
    DescriptorSet(DescriptorSetHandle),
    CommandBuffer(CommandBufferHandle),
    Pipeline(PipelineHandle),
}

impl AnyHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::DescriptorSet(_) => "descriptor set",
            Self::CommandBuffer(_) => "command buffer",
            Self::Pipeline(_) => "pipeline",
        }
    }
}

/// Failures reported by a [`GraphicsDevice`](super::GraphicsDevice).
///
/// Resource exhaustion (`OutOfMemory`, `PoolExhausted`) is recoverable: the
/// orchestrator leaves its dirty flags untouched and retries next frame.
/// The remaining variants indicate a caller bug.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("out of device memory (requested {requested} bytes)")]
    OutOfMemory { requested: u64 },

    #[error("descriptor pool exhausted (requested {requested} sets, {available} available)")]
    PoolExhausted { requested: usize, available: usize },

    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    #[error("unknown or destroyed handle: {0:?}")]
    UnknownHandle(AnyHandle),

    #[error("unsupported by this backend: {0}")]
    Unsupported(&'static str),
}

impl DeviceError {
    /// Returns true for failures the hosting loop may retry next frame.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::PoolExhausted { .. })
    }
}
