// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The compiled artifacts are read from disk
// at pipeline creation time and wrapped in modules that are released as soon
// as the pipeline exists (or setup fails).

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::Device;

/// Read a whole file as raw bytes.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();

    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    std::fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))
}

/// Bytes to SPIR-V words (checks length and magic number).
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V")
}

pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<Device>,
}

impl ShaderModule {
    pub fn new(device: Arc<Device>, code: &[u8]) -> Result<Self> {
        let words = decode_spirv(code)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("failed to create shader module")?;

        Ok(Self { module, device })
    }

    pub fn from_file<P: AsRef<Path>>(device: Arc<Device>, path: P) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("Loading shader {}", path.display());

        let code = read_file(path)?;
        Self::new(device, &code).with_context(|| format!("Shader {}", path.display()))
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.module, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hello-triangle-{}-{}", std::process::id(), name))
    }

    #[test]
    fn reads_raw_bytes() {
        let path = temp_path("bytes.bin");
        std::fs::write(&path, [0u8, 1, 2, 255]).unwrap();

        let bytes = read_file(&path).unwrap();
        assert_eq!(bytes, [0, 1, 2, 255]);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = read_file(temp_path("missing.spv")).unwrap_err();
        assert!(err.to_string().starts_with("file does not exist"));
    }

    #[test]
    fn directory_is_unreadable() {
        let err = read_file(std::env::temp_dir()).unwrap_err();
        assert!(err.to_string().starts_with("failed to read file"));
    }

    #[test]
    fn decodes_spirv_words() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 7] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        assert_eq!(decode_spirv(&bytes).unwrap(), [SPIRV_MAGIC, 0x0001_0000, 7]);
    }

    #[test]
    fn rejects_malformed_spirv() {
        // Not a whole number of words
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.push(0);
        assert!(decode_spirv(&bytes).is_err());

        // Wrong magic
        assert!(decode_spirv(&[1, 2, 3, 4]).is_err());
    }
}
