//! CPU-side bookkeeping of frame-in-flight slots
//!
//! Mirrors the fence protocol: a slot is retired once its fence has been
//! waited on and may only be submitted again after that. This caps the number
//! of outstanding submissions at the slot count.
//!
//! Swapchain images are not tied to slots. The presentation engine may hand
//! back an image whose last submission ran on another slot, so
//! `ImageOwners` remembers which slot last used each image and tells the
//! caller whose fence to wait on before touching that image's command
//! buffer or uniform buffer.

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Tracks which frame slots have unfinished GPU work
#[derive(Debug, Clone)]
pub struct FrameTracker {
    in_flight: Vec<bool>,
    current: usize,
    submitted_total: u64,
}

impl FrameTracker {
    /// Tracker for `slots` frames in flight
    pub fn new(slots: usize) -> Self {
        Self {
            in_flight: vec![false; slots.max(1)],
            current: 0,
            submitted_total: 0,
        }
    }

    /// Slot the next frame uses
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub fn slots(&self) -> usize {
        self.in_flight.len()
    }

    /// The current slot's fence has signaled
    pub fn retire_current(&mut self) {
        self.in_flight[self.current] = false;
    }

    /// `slot`'s fence has signaled
    pub fn retire(&mut self, slot: usize) {
        if let Some(busy) = self.in_flight.get_mut(slot) {
            *busy = false;
        }
    }

    /// Whether `slot` has a submission that has not been waited on
    pub fn is_in_flight(&self, slot: usize) -> bool {
        self.in_flight.get(slot).copied().unwrap_or(false)
    }

    /// Record a submission on the current slot
    pub fn mark_submitted(&mut self) -> VulkanResult<()> {
        if self.in_flight[self.current] {
            return Err(VulkanError::InvalidOperation {
                reason: format!("frame slot {} submitted before its fence was waited on", self.current),
            });
        }
        self.in_flight[self.current] = true;
        self.submitted_total += 1;
        Ok(())
    }

    /// Move to the next slot, wrapping around
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.in_flight.len();
    }

    /// Submissions whose fences have not been waited on
    pub fn outstanding(&self) -> usize {
        self.in_flight.iter().filter(|&&busy| busy).count()
    }

    /// Submissions recorded since creation
    pub fn submitted_total(&self) -> u64 {
        self.submitted_total
    }
}

/// Slot that last submitted work for each swapchain image
#[derive(Debug, Clone, Default)]
pub struct ImageOwners {
    owners: Vec<Option<usize>>,
}

impl ImageOwners {
    /// No image used yet
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Forget all owners; call once the old swapchain's work has drained
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    /// Hand `image` to `slot`. Returns the previous owner when it is a
    /// different slot, whose fence must be waited on before the image's
    /// per-image resources are rewritten.
    pub fn claim(&mut self, image: usize, slot: usize) -> VulkanResult<Option<usize>> {
        let count = self.owners.len();
        let owner = self
            .owners
            .get_mut(image)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("swapchain image {} out of range ({} images)", image, count),
            })?;
        let previous = owner.replace(slot);
        Ok(previous.filter(|&prev| prev != slot))
    }

    /// Slot that last used `image`
    pub fn owner(&self, image: usize) -> Option<usize> {
        self.owners.get(image).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::MAX_FRAME_DRAWS;

    #[test]
    fn test_outstanding_never_exceeds_slot_count() {
        let mut tracker = FrameTracker::new(MAX_FRAME_DRAWS);
        for frame in 0..20 {
            assert_eq!(tracker.current(), frame % MAX_FRAME_DRAWS);
            tracker.retire_current();
            tracker.mark_submitted().unwrap();
            assert!(tracker.outstanding() <= MAX_FRAME_DRAWS);
            tracker.advance();
        }
        assert_eq!(tracker.outstanding(), MAX_FRAME_DRAWS);
        assert_eq!(tracker.submitted_total(), 20);
    }

    #[test]
    fn test_resubmitting_without_wait_fails() {
        let mut tracker = FrameTracker::new(MAX_FRAME_DRAWS);
        for _ in 0..MAX_FRAME_DRAWS {
            tracker.mark_submitted().unwrap();
            tracker.advance();
        }
        assert!(tracker.mark_submitted().is_err());
        assert_eq!(tracker.outstanding(), MAX_FRAME_DRAWS);
    }

    #[test]
    fn test_skipped_frame_keeps_slot() {
        let mut tracker = FrameTracker::new(MAX_FRAME_DRAWS);
        tracker.retire_current();
        // Out-of-date acquire: nothing submitted, slot not advanced.
        assert_eq!(tracker.current(), 0);
        assert_eq!(tracker.outstanding(), 0);
    }

    /// Runs the draw protocol for `acquires` and returns, per frame, the
    /// extra slot waited on before the image was rewritten.
    fn replay(slots: usize, image_count: usize, acquires: &[usize]) -> Vec<Option<usize>> {
        let mut tracker = FrameTracker::new(slots);
        let mut owners = ImageOwners::new(image_count);
        let mut last_submit: Vec<Option<usize>> = vec![None; image_count];
        let mut waited = Vec::new();
        for &image in acquires {
            tracker.retire_current();
            let previous = owners.claim(image, tracker.current()).unwrap();
            if let Some(prev) = previous {
                tracker.retire(prev);
            }
            waited.push(previous);
            if let Some(slot) = last_submit[image] {
                assert!(!tracker.is_in_flight(slot), "image {} rewritten while slot {} in flight", image, slot);
            }
            tracker.mark_submitted().unwrap();
            last_submit[image] = Some(tracker.current());
            tracker.advance();
        }
        waited
    }

    #[test]
    fn test_out_of_order_image_waits_for_owning_slot() {
        let waited = replay(MAX_FRAME_DRAWS, 3, &[0, 1, 2, 1]);
        // Frame 3 runs on slot 0 but image 1 was last submitted on slot 1.
        assert_eq!(waited, vec![None, None, None, Some(1)]);
    }

    #[test]
    fn test_fewer_images_than_slots() {
        let waited = replay(MAX_FRAME_DRAWS, 2, &[0, 1, 0, 1, 0]);
        assert_eq!(waited, vec![None, None, Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_same_slot_needs_no_extra_wait() {
        let mut owners = ImageOwners::new(3);
        assert_eq!(owners.claim(2, 0).unwrap(), None);
        assert_eq!(owners.claim(2, 0).unwrap(), None);
        assert_eq!(owners.owner(2), Some(0));
    }

    #[test]
    fn test_reset_forgets_owners() {
        let mut owners = ImageOwners::new(3);
        owners.claim(1, 2).unwrap();
        owners.reset(4);
        assert_eq!(owners.owner(1), None);
        assert_eq!(owners.claim(3, 0).unwrap(), None);
        assert!(owners.claim(4, 0).is_err());
    }
}
