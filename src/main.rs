// =============================================================================
// HELLO TRIANGLE - Vulkan bootstrap
// =============================================================================
//
// Opens a window and walks the Vulkan setup sequence once:
//
// ┌─────────────────────────────────────────────────────────────────┐
// │  Instance (+ debug messenger when validating)                   │
// │    └── Surface (window connection)                              │
// │          └── Physical device pick + logical device              │
// │                └── Swapchain + image views                      │
// │                      └── Render pass + graphics pipeline        │
// └─────────────────────────────────────────────────────────────────┘
//
// Afterwards it only waits for window events until the window is closed.
// Nothing is drawn; teardown runs in reverse order of creation.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use backend::{Device, GraphicsPipeline, Instance, RenderPass, Surface, Swapchain};
use config::Config;
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    init_logging();
    log::info!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.validation_enabled() { "validation on" } else { "validation off" }
    );

    let event_loop = EventLoop::new()?;
    // No frames to draw, so only wake up for events
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.into_result()
}

/// Info for the application, everything from the validation layers.
const DEFAULT_LOG_FILTER: &str = "info,vulkan=trace";

/// `RUST_LOG` overrides the default filter. Output goes to stderr.
fn init_logging() {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(DEFAULT_LOG_FILTER)).init();
}

// =============================================================================
// VULKAN OBJECTS
// =============================================================================

/// Every Vulkan object the application creates.
///
/// Fields drop top to bottom, which is the reverse of creation order. The
/// objects also hold Arcs to their parents (the swapchain keeps the surface,
/// surface and device keep the instance, the surface keeps the window), so the
/// order holds even if setup fails halfway. The swapchain owns the only
/// surface handle, so the surface goes right after it and before the device.
pub struct VulkanContext {
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
}

impl VulkanContext {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let instance = Instance::new(config, display_handle)?;
        let surface = Surface::new(instance.clone(), window)?;
        let device = Device::new(instance, &surface, config)?;

        let swapchain = Swapchain::new(
            device.clone(),
            surface,
            config.window.width,
            config.window.height,
        )?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format)?;

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &render_pass,
            swapchain.extent,
            &config.shaders.vertex,
            &config.shaders.fragment,
        )?;

        let context = Self {
            pipeline,
            render_pass,
            swapchain,
            device,
        };
        context.log_summary();

        log::info!("Vulkan initialized successfully!");
        Ok(context)
    }

    fn log_summary(&self) {
        log::info!(
            "GPU {} (queue family {}), swapchain {}x{} {:?} {:?}, {} image views",
            self.device.name,
            self.device.queue_family,
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            self.swapchain.format,
            self.swapchain.present_mode,
            self.swapchain.image_views.len(),
        );
        log::debug!(
            "{:?}, graphics queue {:?}, present queue {:?}",
            self.device.properties.device_type,
            self.device.graphics_queue,
            self.device.present_queue,
        );
        log::debug!(
            "Swapchain {:?} ({:?}, {} images), render pass {:?}, pipeline {:?}, layout {:?}",
            self.swapchain.swapchain,
            self.swapchain.color_space,
            self.swapchain.images.len(),
            self.render_pass.render_pass,
            self.pipeline.pipeline,
            self.pipeline.layout,
        );
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

pub struct App {
    config: Config,
    // Declared before the window so it is always released first
    vulkan: Option<VulkanContext>,
    window: Option<Arc<Window>>,
    /// First fatal error; handed back to `main` once the event loop stops.
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            vulkan: None,
            window: None,
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            // Swapchain recreation isn't supported
            .with_resizable(false);

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("failed to create window")?,
        );
        self.window = Some(window.clone());

        self.vulkan = Some(VulkanContext::new(window, &self.config)?);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn teardown(&mut self) {
        if self.vulkan.is_none() && self.window.is_none() {
            return;
        }

        log::info!("Cleaning up Vulkan resources...");
        drop(self.vulkan.take());
        drop(self.window.take());
        log::info!("Cleanup complete");
    }

    pub fn into_result(mut self) -> Result<()> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Close requested, shutting down...");
            if let Some(ref vulkan) = self.vulkan {
                if let Err(e) = vulkan.device.wait_idle() {
                    log::warn!("Failed to wait for device idle: {}", e);
                }
            }
            event_loop.exit();
        }
    }

    /// Runs while the event loop (and its display connection) still exists.
    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.teardown();
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
    use backend::debug::{log_level, LOG_TARGET};
    use log::Log;

    fn default_logger() -> env_logger::Logger {
        env_logger::Builder::new()
            .parse_filters(DEFAULT_LOG_FILTER)
            .build()
    }

    #[test]
    fn default_filter_keeps_every_validation_message() {
        let logger = default_logger();

        for severity in [
            Severity::VERBOSE,
            Severity::INFO,
            Severity::WARNING,
            Severity::ERROR,
        ] {
            let metadata = log::Metadata::builder()
                .target(LOG_TARGET)
                .level(log_level(severity))
                .build();
            assert!(logger.enabled(&metadata), "{:?} would be dropped", severity);
        }
    }

    #[test]
    fn default_filter_keeps_application_at_info() {
        let logger = default_logger();

        let info = log::Metadata::builder()
            .target("hello_triangle")
            .level(log::Level::Info)
            .build();
        assert!(logger.enabled(&info));

        let debug = log::Metadata::builder()
            .target("hello_triangle::backend::shader")
            .level(log::Level::Debug)
            .build();
        assert!(!logger.enabled(&debug));
    }
}
