// Backend module - Vulkan setup sequence
//
// Design: Thin RAII wrappers around ash. Each object holds an Arc to what it
// was created from, so teardown runs in reverse dependency order on every
// exit path, including a failure halfway through setup.

pub mod debug;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;

pub use device::Device;
pub use instance::Instance;
pub use pipeline::{GraphicsPipeline, RenderPass};
pub use surface::Surface;
pub use swapchain::Swapchain;
