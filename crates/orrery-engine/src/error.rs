use thiserror::Error;

use crate::device::DeviceError;

/// State-machine invariant violations. These are caller bugs: the current
/// operation is aborted and nothing is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("render-thread-only call from another thread ({operation})")]
    WrongThread { operation: &'static str },

    #[error("{what} handle is null")]
    NullHandle { what: &'static str },

    #[error("{what} destroyed twice")]
    DoubleDestroy { what: &'static str },

    #[error("no swapchain has been set")]
    MissingSwapchain,

    #[error("image index {index} out of range for {image_count} images")]
    ImageOutOfRange { index: usize, image_count: usize },
}

/// Errors surfaced to the hosting render loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("task queue closed")]
    TaskQueueClosed,
}

impl RenderError {
    /// Resource exhaustion the orchestrator retries next frame.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Device(e) if e.is_exhaustion())
    }

    /// Classifies a failed destroy or free. A handle the device no longer
    /// knows was already destroyed.
    pub fn from_release(err: DeviceError) -> Self {
        match err {
            DeviceError::UnknownHandle(handle) => InvariantViolation::DoubleDestroy {
                what: handle.kind(),
            }
            .into(),
            other => other.into(),
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AnyHandle, PipelineHandle};

    #[test]
    fn exhaustion_is_retryable() {
        let err: RenderError = DeviceError::OutOfMemory { requested: 64 }.into();
        assert!(err.is_retryable());
    }

    #[test]
    fn releasing_an_unknown_handle_is_a_double_destroy() {
        let err = RenderError::from_release(DeviceError::UnknownHandle(AnyHandle::Pipeline(
            PipelineHandle::from_raw(3),
        )));
        assert_eq!(
            err,
            RenderError::Invariant(InvariantViolation::DoubleDestroy { what: "pipeline" })
        );
        assert!(!err.is_retryable());

        let oom = RenderError::from_release(DeviceError::OutOfMemory { requested: 8 });
        assert!(oom.is_retryable());
    }

    #[test]
    fn invariant_is_not_retryable() {
        let err: RenderError = InvariantViolation::MissingSwapchain.into();
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "invariant violated: no swapchain has been set");
    }
}
