//! Swapchain-dependent state and frame synchronization

pub mod frame_tracker;
pub mod framebuffer;
pub mod swapchain;
pub mod sync;

pub use frame_tracker::{FrameTracker, ImageOwners};
pub use framebuffer::{FrameAttachments, Framebuffer};
pub use swapchain::{Swapchain, SwapchainImage, SwapchainSettings, SwapchainSupport};
pub use sync::{Fence, FrameSync, Semaphore};
