// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device probing and scoring
// - Graphics+present queue family resolution
// - Logical device + queue creation

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::{Instance, Surface};
use crate::config::Config;

/// Everything device selection needs to know about one physical device.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub texture_compression_bc: bool,
    pub max_image_dimension_2d: u32,
    /// First family with both graphics and present support.
    pub queue_family: Option<u32>,
    pub missing_extensions: Vec<String>,
    /// At least one surface format and one present mode.
    pub swapchain_adequate: bool,
}

impl DeviceCandidate {
    pub fn probe(
        instance: &Instance,
        surface: &Surface,
        physical_device: vk::PhysicalDevice,
        required_extensions: &[CString],
    ) -> Result<Self> {
        let (properties, features, queue_families, extensions) = unsafe {
            (
                instance.instance.get_physical_device_properties(physical_device),
                instance.instance.get_physical_device_features(physical_device),
                instance
                    .instance
                    .get_physical_device_queue_family_properties(physical_device),
                instance
                    .instance
                    .enumerate_device_extension_properties(physical_device)
                    .context("Failed to enumerate device extensions")?,
            )
        };

        let queue_family = find_queue_family(&queue_families, vk::QueueFlags::GRAPHICS, |index| {
            surface.supports_present(physical_device, index)
        })
        .context("Failed to query present support")?;

        let missing_extensions = missing_extensions(required_extensions, &extensions);

        // Only meaningful once the swapchain extension is known to exist
        let swapchain_adequate = missing_extensions.is_empty()
            && surface
                .swapchain_support(physical_device)
                .context("Failed to query swapchain support")?
                .is_adequate();

        Ok(Self {
            physical_device,
            name: unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: properties.device_type,
            texture_compression_bc: features.texture_compression_bc == vk::TRUE,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            queue_family,
            missing_extensions,
            swapchain_adequate,
        })
    }

    /// Why this device can't be used, if it can't.
    pub fn rejection(&self) -> Option<String> {
        if self.queue_family.is_none() {
            Some("no queue family with graphics and present support".to_string())
        } else if !self.missing_extensions.is_empty() {
            Some(format!("missing extensions: {}", self.missing_extensions.join(", ")))
        } else if !self.swapchain_adequate {
            Some("no surface formats or present modes".to_string())
        } else {
            None
        }
    }

    pub fn is_suitable(&self) -> bool {
        self.rejection().is_none()
    }

    pub fn score(&self) -> u64 {
        let mut score = 0;

        // Discrete GPUs are usually faster than integrated ones
        if self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        }

        // BC1-BC3 compressed textures
        if self.texture_compression_bc {
            score += 1000;
        }

        score + u64::from(self.max_image_dimension_2d)
    }
}

/// Highest scoring suitable candidate. Ties keep the first one.
pub fn pick_best(candidates: &[DeviceCandidate]) -> Option<&DeviceCandidate> {
    let mut best: Option<(&DeviceCandidate, u64)> = None;

    for candidate in candidates.iter().filter(|c| c.is_suitable()) {
        let score = candidate.score();
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((candidate, score));
        }
    }

    best.map(|(candidate, _)| candidate)
}

/// Index of the first non-empty family that has `flags` and can present.
///
/// Present support is asked for through `supports_present` so that the scan
/// itself doesn't need a surface.
pub fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    flags: vk::QueueFlags,
    mut supports_present: impl FnMut(u32) -> VkResult<bool>,
) -> VkResult<Option<u32>> {
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count > 0
            && family.queue_flags.contains(flags)
            && supports_present(index)?
        {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

fn missing_extensions(required: &[CString], available: &[vk::ExtensionProperties]) -> Vec<String> {
    let available: Vec<&CStr> = available
        .iter()
        .map(|extension| unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) })
        .collect();

    required
        .iter()
        .filter(|name| !available.contains(&name.as_c_str()))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Logical device wrapper with automatic cleanup
pub struct Device {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,

    // Graphics and present share one family
    pub queue_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    instance: Arc<Instance>,
}

impl Device {
    /// Pick the best GPU for `surface` and create a logical device on it.
    pub fn new(instance: Arc<Instance>, surface: &Surface, config: &Config) -> Result<Arc<Self>> {
        let extensions = config.device_extension_names()?;

        let candidate = Self::pick_physical_device(&instance, surface, &extensions)?;
        let queue_family = candidate
            .queue_family
            .context("Selected GPU has no graphics queue family")?;

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(candidate.physical_device)
        };

        log::info!("Selected GPU: {}", candidate.name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let device = Self::create_logical_device(
            &instance,
            candidate.physical_device,
            queue_family,
            &extensions,
        )?;

        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(queue_family, 0),
                device.get_device_queue(queue_family, 0),
            )
        };

        Ok(Arc::new(Self {
            device,
            physical_device: candidate.physical_device,
            name: candidate.name,
            properties,
            queue_family,
            graphics_queue,
            present_queue,
            instance,
        }))
    }

    fn pick_physical_device(
        instance: &Instance,
        surface: &Surface,
        extensions: &[CString],
    ) -> Result<DeviceCandidate> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("failed to find GPUs with Vulkan support");
        }

        let candidates = devices
            .into_iter()
            .map(|device| DeviceCandidate::probe(instance, surface, device, extensions))
            .collect::<Result<Vec<_>>>()?;

        for candidate in &candidates {
            match candidate.rejection() {
                None => log::debug!("GPU {}: score {}", candidate.name, candidate.score()),
                Some(reason) => log::debug!("GPU {}: rejected ({})", candidate.name, reason),
            }
        }

        pick_best(&candidates)
            .cloned()
            .context("failed to find a suitable GPU")
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        extensions: &[CString],
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let features = vk::PhysicalDeviceFeatures::default();

        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        // Device layers are ignored by current loaders but older ones need them
        let layer_names: Vec<*const c_char> = instance.layers.iter().map(|l| l.as_ptr()).collect();

        let mut create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        if instance.validation {
            create_info = create_info.enabled_layer_names(&layer_names);
        }

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)
        }
        .context("failed to create logical device")?;

        Ok(device)
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe { self.device.destroy_device(None) };
    }
}
