use crate::{SgfxBackendType, SgfxResult, SgfxShaderCode, SgfxShaderDef, SgfxShaderStage};
use std::path::{Path, PathBuf};

/// The per-backend payloads of one shader, loaded from files that share a name and differ by
/// extension:
///
/// * `.cso`: compiled D3D bytecode, consumed by dx11 and dx12
/// * `.glsl`: GLSL source, consumed by gl4
/// * `.hlsl`: HLSL source, kept for reference and accepted by the null backend
#[derive(Clone, Debug, Default)]
pub struct SgfxShaderPackage {
    pub name: String,
    pub dxbc: Option<Vec<u8>>,
    pub glsl: Option<String>,
    pub hlsl_source: Option<String>,
    base_path: PathBuf,
}

impl SgfxShaderPackage {
    pub const DXBC_EXTENSION: &'static str = "cso";
    pub const GLSL_EXTENSION: &'static str = "glsl";
    pub const HLSL_EXTENSION: &'static str = "hlsl";

    // Appended rather than swapped in, base names like `grass.cull` keep their dots
    fn payload_path(
        base_path: &Path,
        extension: &str,
    ) -> PathBuf {
        let mut path = base_path.as_os_str().to_owned();
        path.push(".");
        path.push(extension);
        PathBuf::from(path)
    }

    /// Loads every payload that exists for `base_path` (a path without the payload extension).
    /// Fails if none do.
    pub fn load<P: AsRef<Path>>(base_path: P) -> SgfxResult<Self> {
        let base_path = base_path.as_ref();
        let mut package = SgfxShaderPackage {
            name: base_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            base_path: base_path.to_path_buf(),
            ..Default::default()
        };

        for extension in &[
            Self::DXBC_EXTENSION,
            Self::GLSL_EXTENSION,
            Self::HLSL_EXTENSION,
        ] {
            let path = Self::payload_path(base_path, extension);
            if path.exists() {
                package.add_file(&path)?;
            }
        }

        if package.is_empty() {
            return Err(format!(
                "no shader payload (.{}, .{} or .{}) found for {}",
                Self::DXBC_EXTENSION,
                Self::GLSL_EXTENSION,
                Self::HLSL_EXTENSION,
                base_path.display()
            )
            .into());
        }

        log::debug!(
            "Loaded shader package {} (dxbc: {}, glsl: {}, hlsl: {})",
            package.name,
            package.dxbc.is_some(),
            package.glsl.is_some(),
            package.hlsl_source.is_some()
        );

        Ok(package)
    }

    /// Reads a single payload file, choosing the slot by extension
    pub fn add_file(
        &mut self,
        path: &Path,
    ) -> SgfxResult<()> {
        let extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            Self::DXBC_EXTENSION => self.dxbc = Some(std::fs::read(path)?),
            Self::GLSL_EXTENSION => self.glsl = Some(std::fs::read_to_string(path)?),
            Self::HLSL_EXTENSION => self.hlsl_source = Some(std::fs::read_to_string(path)?),
            _ => {
                return Err(format!(
                    "unrecognized shader file extension for {}",
                    path.display()
                )
                .into())
            }
        }

        log::trace!("Read shader file {}", path.display());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.dxbc.is_none() && self.glsl.is_none() && self.hlsl_source.is_none()
    }

    fn missing_payload(
        &self,
        backend: SgfxBackendType,
        extension: &str,
    ) -> String {
        format!(
            "shader {} has no payload for the {} backend (expected {})",
            self.name,
            backend.name(),
            Self::payload_path(&self.base_path, extension).display()
        )
    }

    /// Builds the shader def for the payload the backend consumes
    pub fn shader_def_for(
        &self,
        backend: SgfxBackendType,
        stage: SgfxShaderStage,
        entry_point: &str,
    ) -> SgfxResult<SgfxShaderDef> {
        let code = match backend {
            SgfxBackendType::Dx11 | SgfxBackendType::Dx12 => SgfxShaderCode::D3dBytecode(
                self.dxbc
                    .clone()
                    .ok_or_else(|| self.missing_payload(backend, Self::DXBC_EXTENSION))?,
            ),
            SgfxBackendType::Gl4 => SgfxShaderCode::Glsl(
                self.glsl
                    .clone()
                    .ok_or_else(|| self.missing_payload(backend, Self::GLSL_EXTENSION))?,
            ),
            SgfxBackendType::Null => {
                let bytes = self
                    .dxbc
                    .clone()
                    .or_else(|| self.hlsl_source.clone().map(String::into_bytes))
                    .or_else(|| self.glsl.clone().map(String::into_bytes))
                    .ok_or_else(|| self.missing_payload(backend, Self::HLSL_EXTENSION))?;
                SgfxShaderCode::Opaque(bytes)
            }
        };

        Ok(SgfxShaderDef {
            stage,
            entry_point: entry_point.to_string(),
            code,
            debug_name: Some(self.name.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "sgfx_shader_package_{}_{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_load_by_extension() {
        let dir = scratch_dir("load");
        std::fs::write(dir.join("quad_vs.hlsl"), "float4 main() : SV_Position { return 0; }")
            .unwrap();
        std::fs::write(dir.join("quad_vs.glsl"), "#version 450\nvoid main() {}").unwrap();

        let package = SgfxShaderPackage::load(dir.join("quad_vs")).unwrap();
        assert_eq!(package.name, "quad_vs");
        assert!(package.dxbc.is_none());
        assert!(package.glsl.is_some());
        assert!(package.hlsl_source.is_some());

        let gl = package
            .shader_def_for(SgfxBackendType::Gl4, SgfxShaderStage::Vertex, "main")
            .unwrap();
        assert!(matches!(gl.code, SgfxShaderCode::Glsl(_)));

        let null = package
            .shader_def_for(SgfxBackendType::Null, SgfxShaderStage::Vertex, "main")
            .unwrap();
        assert!(matches!(null.code, SgfxShaderCode::Opaque(_)));

        let error = package
            .shader_def_for(SgfxBackendType::Dx11, SgfxShaderStage::Vertex, "main")
            .unwrap_err();
        assert!(error.to_string().contains("quad_vs.cso"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dotted_base_name() {
        let dir = scratch_dir("dotted");
        std::fs::write(dir.join("grass.cull.hlsl"), "[numthreads(64, 1, 1)] void main() {}")
            .unwrap();
        // Must not be picked up in place of grass.cull.hlsl
        std::fs::write(dir.join("grass.hlsl"), "void main() {}").unwrap();

        let package = SgfxShaderPackage::load(dir.join("grass.cull")).unwrap();
        assert_eq!(package.name, "grass.cull");
        assert!(package.hlsl_source.unwrap().contains("numthreads"));

        let package = SgfxShaderPackage::load(dir.join("grass.cull")).unwrap();
        let error = package
            .shader_def_for(SgfxBackendType::Dx12, SgfxShaderStage::Compute, "main")
            .unwrap_err();
        assert!(error.to_string().contains("grass.cull.cso"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_package() {
        let dir = scratch_dir("missing");
        assert!(SgfxShaderPackage::load(dir.join("nothing")).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
