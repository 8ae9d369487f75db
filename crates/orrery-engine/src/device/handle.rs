use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

handle_type!(
    /// Opaque device buffer handle. Never zero.
    BufferHandle
);
handle_type!(
    /// Opaque descriptor set handle (a bind group under wgpu).
    DescriptorSetHandle
);
handle_type!(
    /// Opaque secondary command buffer handle.
    CommandBufferHandle
);
handle_type!(
    /// Opaque graphics pipeline handle.
    PipelineHandle
);
handle_type!(
    /// Render pass compatibility handle. Under wgpu this names a color format.
    RenderPassHandle
);

/// Monotonic handle source shared by every backend.
///
/// Handles are never reused within a process so a stale handle can never
/// alias a newer object.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub(crate) const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub(crate) fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
