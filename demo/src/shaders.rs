use sgfx::api::{
    SgfxBackendType, SgfxDevice, SgfxResult, SgfxShaderHandle, SgfxShaderPackage, SgfxShaderStage,
};
use std::path::{Path, PathBuf};

/// Entry point of every demo shader
pub const SHADER_ENTRY_POINT: &str = "main";

/// Directory of the shaders that ship with the demo
pub fn default_shader_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders")
}

/// Loads shader packages by name from a directory and creates shaders from the payload the
/// device's backend consumes
pub struct ShaderLoader {
    shader_dir: PathBuf,
    backend_type: SgfxBackendType,
}

impl ShaderLoader {
    pub fn new(
        shader_dir: PathBuf,
        backend_type: SgfxBackendType,
    ) -> Self {
        ShaderLoader {
            shader_dir,
            backend_type,
        }
    }

    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    pub fn load_package(
        &self,
        name: &str,
    ) -> SgfxResult<SgfxShaderPackage> {
        SgfxShaderPackage::load(self.shader_dir.join(name))
    }

    pub fn create_shader(
        &self,
        device: &mut SgfxDevice,
        name: &str,
        stage: SgfxShaderStage,
    ) -> SgfxResult<SgfxShaderHandle> {
        profiling::scope!("create_shader");
        let package = self.load_package(name)?;
        let def = package.shader_def_for(self.backend_type, stage, SHADER_ENTRY_POINT)?;
        log::debug!("Creating {} shader {}", stage.name(), name);
        device.create_shader(&def)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgfx::api::{SgfxApi, SgfxApiDef};

    #[test]
    fn test_create_shipped_shader() {
        let mut api = SgfxApi::new_null(&SgfxApiDef::default()).unwrap();
        let loader = ShaderLoader::new(default_shader_dir(), SgfxBackendType::Null);

        let shader = loader
            .create_shader(api.device_mut(), "fullscreen_vs", SgfxShaderStage::Vertex)
            .unwrap();
        api.device_mut().destroy_shader(shader).unwrap();
        api.destroy().unwrap();
    }

    #[test]
    fn test_missing_shader_names_the_file() {
        let mut api = SgfxApi::new_null(&SgfxApiDef::default()).unwrap();
        let loader = ShaderLoader::new(default_shader_dir(), SgfxBackendType::Null);

        let error = loader
            .create_shader(api.device_mut(), "does_not_exist", SgfxShaderStage::Pixel)
            .unwrap_err();
        assert!(error.to_string().contains("does_not_exist"));
        api.destroy().unwrap();
    }

    #[test]
    fn test_d3d_backends_need_bytecode() {
        let loader = ShaderLoader::new(default_shader_dir(), SgfxBackendType::Dx11);
        let package = loader.load_package("fullscreen_vs").unwrap();
        assert!(package
            .shader_def_for(SgfxBackendType::Dx11, SgfxShaderStage::Vertex, SHADER_ENTRY_POINT)
            .is_err());
    }
}
