// Debug messenger - Validation layer output
//
// vkCreateDebugUtilsMessengerEXT / vkDestroyDebugUtilsMessengerEXT are not
// core entry points. They are resolved once through vkGetInstanceProcAddr and
// kept as optional function pointers, so a missing extension turns into an
// error on create and a no-op on destroy instead of a crash.

use ash::prelude::VkResult;
use ash::{vk, Entry};
use std::borrow::Cow;
use std::ffi::{c_void, CStr};

/// Instance-level debug utils entry points, resolved once at startup.
#[derive(Clone, Copy)]
pub struct DebugUtilsFns {
    create: Option<vk::PFN_vkCreateDebugUtilsMessengerEXT>,
    destroy: Option<vk::PFN_vkDestroyDebugUtilsMessengerEXT>,
}

impl DebugUtilsFns {
    pub fn load(entry: &Entry, instance: vk::Instance) -> Self {
        unsafe {
            let create = entry
                .get_instance_proc_addr(instance, c"vkCreateDebugUtilsMessengerEXT".as_ptr())
                .map(|f| {
                    std::mem::transmute::<
                        unsafe extern "system" fn(),
                        vk::PFN_vkCreateDebugUtilsMessengerEXT,
                    >(f)
                });
            let destroy = entry
                .get_instance_proc_addr(instance, c"vkDestroyDebugUtilsMessengerEXT".as_ptr())
                .map(|f| {
                    std::mem::transmute::<
                        unsafe extern "system" fn(),
                        vk::PFN_vkDestroyDebugUtilsMessengerEXT,
                    >(f)
                });

            Self { create, destroy }
        }
    }

    pub fn is_available(&self) -> bool {
        self.create.is_some() && self.destroy.is_some()
    }

    /// # Safety
    /// `instance` must be the instance these functions were loaded from.
    pub unsafe fn create_messenger(
        &self,
        instance: vk::Instance,
        create_info: &vk::DebugUtilsMessengerCreateInfoEXT,
    ) -> VkResult<vk::DebugUtilsMessengerEXT> {
        let Some(create) = self.create else {
            return Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT);
        };

        let mut messenger = vk::DebugUtilsMessengerEXT::null();
        create(instance, create_info, std::ptr::null(), &mut messenger)
            .result_with_success(messenger)
    }

    /// # Safety
    /// `messenger` must have been created from `instance` and not yet destroyed.
    pub unsafe fn destroy_messenger(
        &self,
        instance: vk::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
    ) {
        if let Some(destroy) = self.destroy {
            destroy(instance, messenger, std::ptr::null());
        }
    }
}

/// Owned messenger, destroyed on drop. Must be dropped before its instance.
pub struct DebugMessenger {
    fns: DebugUtilsFns,
    instance: vk::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub fn new(entry: &Entry, instance: vk::Instance) -> VkResult<Self> {
        let fns = DebugUtilsFns::load(entry, instance);
        if !fns.is_available() {
            log::warn!("VK_EXT_debug_utils entry points could not be resolved");
        }

        let create_info = messenger_create_info();
        let messenger = unsafe { fns.create_messenger(instance, &create_info) }?;

        Ok(Self {
            fns,
            instance,
            messenger,
        })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe { self.fns.destroy_messenger(self.instance, self.messenger) };
    }
}

/// Messenger settings. Also chained into instance creation so that
/// vkCreateInstance / vkDestroyInstance themselves are covered.
pub fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

/// Log target for everything the validation layers report.
pub const LOG_TARGET: &str = "vulkan";

pub fn log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Debug
    }
}

// Never aborts the call that triggered the message.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        Cow::from("<no message>")
    } else {
        CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    };

    log::log!(
        target: LOG_TARGET,
        log_level(message_severity),
        "validation layer ({:?}): {}",
        message_type,
        message
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_map_to_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        assert_eq!(log_level(Severity::ERROR), log::Level::Error);
        assert_eq!(log_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(log_level(Severity::INFO), log::Level::Info);
        assert_eq!(log_level(Severity::VERBOSE), log::Level::Debug);
    }

    #[test]
    fn unresolved_functions_degrade_gracefully() {
        let fns = DebugUtilsFns {
            create: None,
            destroy: None,
        };
        assert!(!fns.is_available());

        let create_info = messenger_create_info();
        let result = unsafe { fns.create_messenger(vk::Instance::null(), &create_info) };
        assert_eq!(result, Err(vk::Result::ERROR_EXTENSION_NOT_PRESENT));

        // No-op rather than a call through a null pointer.
        unsafe { fns.destroy_messenger(vk::Instance::null(), vk::DebugUtilsMessengerEXT::null()) };
    }

    #[test]
    fn callback_never_aborts() {
        let data = vk::DebugUtilsMessengerCallbackDataEXT::builder()
            .message(c"test message")
            .build();

        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);

        let result = unsafe {
            debug_callback(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
                std::ptr::null(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, vk::FALSE);
    }

    #[test]
    fn create_info_requests_expected_messages() {
        let info = messenger_create_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(info
            .message_type
            .contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION));
        assert!(info.pfn_user_callback.is_some());
    }
}
