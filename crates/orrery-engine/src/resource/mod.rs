//! Lifecycle components shared by every renderable.
//!
//! - [`StateTracker`]: per-category dirty flags that only escalate
//! - [`StagingChannel`]: host-visible scratch memory filled by the producer, double buffered by epoch
//! - [`PerImageResources`]: one slot of device objects per swapchain image
//! - [`DescriptorPool`]: shared descriptor set accounting

mod descriptor_pool;
mod per_image;
mod staging;
mod state;

pub use descriptor_pool::DescriptorPool;
pub use per_image::{ImageSlot, PerImageResources};
pub use staging::{DrainLock, FlushGuard, PartialWrite, StagingChannel, StagingWriter};
pub use state::{ResourceCategory, ResourceState, StateTracker};
