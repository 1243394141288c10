// Surface - Window presentation target
//
// Platform-specific connection between a winit window and Vulkan. Keeps the
// window alive for as long as the surface exists.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use std::ffi::{c_void, CStr};
use std::sync::Arc;
use winit::window::Window;

use super::swapchain::SwapchainSupport;
use super::Instance;

/// Instance extensions needed to create a surface for this display.
pub fn required_extensions(display_handle: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display_handle {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => anyhow::bail!("unsupported windowing platform: {:?}", other),
    };

    Ok(vec![khr::Surface::name(), platform])
}

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: khr::Surface,
    _instance: Arc<Instance>,
    _window: Arc<Window>,
}

impl Surface {
    pub fn new(instance: Arc<Instance>, window: Arc<Window>) -> Result<Arc<Self>> {
        log::info!("Creating window surface");

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let surface = unsafe {
            create_platform_surface(&instance.entry, &instance.instance, display_handle, window_handle)
        }
        .context("failed to create window surface")?;

        let loader = khr::Surface::new(&instance.entry, &instance.instance);

        Ok(Arc::new(Self {
            surface,
            loader,
            _instance: instance,
            _window: window,
        }))
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> VkResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.surface)
        }
    }

    /// Fresh capabilities, formats and present modes for one physical device.
    pub fn swapchain_support(&self, physical_device: vk::PhysicalDevice) -> VkResult<SwapchainSupport> {
        unsafe {
            Ok(SwapchainSupport {
                capabilities: self
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)?,
                formats: self
                    .loader
                    .get_physical_device_surface_formats(physical_device, self.surface)?,
                present_modes: self
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        log::debug!("Destroying window surface");
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

unsafe fn create_platform_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    display_handle: RawDisplayHandle,
    window_handle: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let surface = match (display_handle, window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const c_void;
            let hwnd = handle.hwnd.get() as *const c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)?
        }

        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display.display.context("Xlib display pointer is null")?;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr() as *mut vk::Display)
                .window(handle.window);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)?
        }

        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display.connection.context("XCB connection pointer is null")?;
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.as_ptr() as *mut vk::xcb_connection_t)
                .window(handle.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)?
        }

        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(handle.surface.as_ptr());
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)?
        }

        (display, window) => {
            anyhow::bail!("unsupported windowing platform: {:?} / {:?}", display, window)
        }
    };

    Ok(surface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WebDisplayHandle};
    use std::ptr::NonNull;

    #[test]
    fn wayland_needs_surface_and_wayland_extensions() {
        let mut display = 0u8;
        let handle = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(
            NonNull::from(&mut display).cast(),
        ));

        let extensions = required_extensions(handle).unwrap();
        assert_eq!(extensions, [khr::Surface::name(), khr::WaylandSurface::name()]);
    }

    #[test]
    fn web_display_is_unsupported() {
        let handle = RawDisplayHandle::Web(WebDisplayHandle::new());
        assert!(required_extensions(handle).is_err());
    }
}
