// Vulkan Instance - Entry point into the API
//
// Responsibilities:
// - Loading the Vulkan library
// - Validation layer availability check
// - Instance creation with the window system extensions
// - Debug messenger ownership (when validation is enabled)

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::debug::{self, DebugMessenger};
use super::surface;
use crate::config::Config;

pub struct Instance {
    debug_messenger: Option<DebugMessenger>,
    pub instance: ash::Instance,
    pub entry: Entry,
    pub validation: bool,
    pub layers: Vec<CString>,
}

impl Instance {
    /// Create the instance for a window living on `display_handle`.
    pub fn new(config: &Config, display_handle: RawDisplayHandle) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", config.window.title);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let validation = config.validation_enabled();
        let layers = if validation {
            config.layer_names()?
        } else {
            Vec::new()
        };

        if validation {
            let missing = missing_layers(&entry, &layers)?;
            if !missing.is_empty() {
                anyhow::bail!(
                    "validation layers requested, but not available: {}",
                    missing.join(", ")
                );
            }
        }

        log_available_extensions(&entry);

        let extensions = required_extensions(display_handle, validation)?;
        for extension in &extensions {
            log::debug!("Enabling instance extension {}", extension.to_string_lossy());
        }

        let instance = Self::create_instance(&entry, config, &extensions, &layers, validation)?;

        let mut instance = Self {
            debug_messenger: None,
            instance,
            entry,
            validation,
            layers,
        };

        if validation {
            let messenger = DebugMessenger::new(&instance.entry, instance.instance.handle())
                .context("failed to set up debug messenger")?;
            instance.debug_messenger = Some(messenger);
            log::info!("Validation layers enabled");
        }

        Ok(Arc::new(instance))
    }

    fn create_instance(
        entry: &Entry,
        config: &Config,
        extensions: &[&CStr],
        layers: &[CString],
        validation: bool,
    ) -> Result<ash::Instance> {
        let app_name = CString::new(config.window.title.as_str())?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Chained so instance creation and destruction get validated too
        let mut debug_create_info = debug::messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names);

        if validation {
            create_info = create_info
                .enabled_layer_names(&layer_names)
                .push_next(&mut debug_create_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("failed to create instance")?;

        Ok(instance)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        // Messenger first, it belongs to the instance
        drop(self.debug_messenger.take());

        unsafe { self.instance.destroy_instance(None) };
    }
}

/// Window system extensions, plus debug utils when validating.
fn required_extensions(display_handle: RawDisplayHandle, validation: bool) -> Result<Vec<&'static CStr>> {
    let mut extensions = surface::required_extensions(display_handle)?;

    if validation {
        extensions.push(ash::extensions::ext::DebugUtils::name());
    }

    Ok(extensions)
}

fn missing_layers(entry: &Entry, requested: &[CString]) -> Result<Vec<String>> {
    let available = entry
        .enumerate_instance_layer_properties()
        .context("Failed to enumerate instance layers")?;

    let available: Vec<&CStr> = available
        .iter()
        .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
        .collect();

    Ok(unavailable(requested, &available))
}

fn unavailable(requested: &[CString], available: &[&CStr]) -> Vec<String> {
    requested
        .iter()
        .filter(|name| !available.contains(&name.as_c_str()))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

fn log_available_extensions(entry: &Entry) {
    match entry.enumerate_instance_extension_properties(None) {
        Ok(extensions) => {
            log::debug!("Available instance extensions:");
            for extension in &extensions {
                let name = unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) };
                log::debug!("\t{}", name.to_string_lossy());
            }
        }
        Err(e) => log::warn!("Failed to enumerate instance extensions: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::WaylandDisplayHandle;
    use std::ptr::NonNull;

    fn wayland() -> RawDisplayHandle {
        RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::dangling()))
    }

    #[test]
    fn debug_utils_only_requested_when_validating() {
        let debug_utils = ash::extensions::ext::DebugUtils::name();

        let plain = required_extensions(wayland(), false).unwrap();
        assert!(!plain.contains(&debug_utils));

        let validating = required_extensions(wayland(), true).unwrap();
        assert_eq!(validating.last(), Some(&debug_utils));
        assert_eq!(validating.len(), plain.len() + 1);
    }

    #[test]
    fn reports_only_missing_layers() {
        let requested = vec![
            CString::new("VK_LAYER_KHRONOS_validation").unwrap(),
            CString::new("VK_LAYER_missing").unwrap(),
        ];
        let available = [c"VK_LAYER_KHRONOS_validation", c"VK_LAYER_other"];

        assert_eq!(unavailable(&requested, &available), ["VK_LAYER_missing"]);
        assert!(unavailable(&requested[..1], &available).is_empty());
    }
}
