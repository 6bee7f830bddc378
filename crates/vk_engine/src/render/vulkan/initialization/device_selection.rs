//! Pure device-selection logic: queue family discovery and extension checks

use ash::vk;

/// Queue family indices for graphics and presentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// First family with graphics support
    pub graphics: Option<u32>,
    /// First family that can present to the surface
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both families were found
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Both indices, when complete
    pub fn pair(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }
}

/// Scan queue families once, taking the first graphics family and,
/// independently, the first family that can present. Stops as soon as both
/// are known.
pub fn find_queue_families<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> QueueFamilyIndices
where
    F: FnMut(u32) -> bool,
{
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in (0u32..).zip(families) {
        if indices.graphics.is_none() && family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }

        if indices.present.is_none() && family.queue_count > 0 && supports_present(index) {
            indices.present = Some(index);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Names in `required` that are missing from `available`
pub fn missing_extensions<'a>(required: &'a [String], available: &[String]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .map(String::as_str)
        .collect()
}

/// Convert a fixed-size, nul-terminated Vulkan name into a `String`
pub fn vk_name_to_string(raw: &[std::os::raw::c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_family_for_both() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families, |_| true);
        assert_eq!(indices.pair(), Some((0, 0)));
    }

    #[test]
    fn test_separate_families() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = find_queue_families(&families, |index| index == 2);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_first_match_wins_and_scan_stops() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let indices = find_queue_families(&families, |index| {
            queried.push(index);
            true
        });
        assert_eq!(indices.pair(), Some((0, 0)));
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn test_incomplete_without_present() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
        assert_eq!(indices.pair(), None);
    }

    #[test]
    fn test_missing_extensions() {
        let required = vec!["VK_KHR_surface".to_string(), "VK_EXT_debug_utils".to_string()];
        let available = vec!["VK_KHR_surface".to_string()];
        assert_eq!(missing_extensions(&required, &available), vec!["VK_EXT_debug_utils"]);
        assert!(missing_extensions(&required[..1], &available).is_empty());
    }

    #[test]
    fn test_vk_name_to_string_stops_at_nul() {
        let mut raw = [0 as std::os::raw::c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"VK_KHR_swapchain") {
            *dst = *src as std::os::raw::c_char;
        }
        assert_eq!(vk_name_to_string(&raw), "VK_KHR_swapchain");
        raw[6] = 0;
        assert_eq!(vk_name_to_string(&raw), "VK_KHR");
    }
}
