//! Typed handles for every object a device creates. A handle is only meaningful to the device that
//! created it, and stops resolving once the object is destroyed.

use sgfx_base::RawHandle;

/// Identifies the kind of object a handle refers to, used in errors and leak reports
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SgfxHandleKind {
    Buffer,
    Texture,
    Sampler,
    Shader,
    PipelineState,
    ComputePipeline,
    Swapchain,
}

impl SgfxHandleKind {
    pub const ALL: [SgfxHandleKind; 7] = [
        SgfxHandleKind::Buffer,
        SgfxHandleKind::Texture,
        SgfxHandleKind::Sampler,
        SgfxHandleKind::Shader,
        SgfxHandleKind::PipelineState,
        SgfxHandleKind::ComputePipeline,
        SgfxHandleKind::Swapchain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SgfxHandleKind::Buffer => "buffer",
            SgfxHandleKind::Texture => "texture",
            SgfxHandleKind::Sampler => "sampler",
            SgfxHandleKind::Shader => "shader",
            SgfxHandleKind::PipelineState => "pipeline state",
            SgfxHandleKind::ComputePipeline => "compute pipeline",
            SgfxHandleKind::Swapchain => "swapchain",
        }
    }
}

impl std::fmt::Display for SgfxHandleKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! define_handle {
    ($(#[$attr:meta])* $name:ident, $kind:expr) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(RawHandle);

        impl $name {
            pub const KIND: SgfxHandleKind = $kind;

            /// Never refers to a live object
            pub const INVALID: $name = $name(RawHandle::INVALID);

            pub(crate) fn from_raw(raw: RawHandle) -> Self {
                $name(raw)
            }

            pub fn raw(self) -> RawHandle {
                self.0
            }
        }
    };
}

define_handle!(
    /// Vertex, index, constant, structured, raw, indirect-argument or staging buffer
    SgfxBufferHandle,
    SgfxHandleKind::Buffer
);
define_handle!(
    /// Texture of any dimension, including swapchain back buffers
    SgfxTextureHandle,
    SgfxHandleKind::Texture
);
define_handle!(SgfxSamplerHandle, SgfxHandleKind::Sampler);
define_handle!(
    /// A single compiled shader stage
    SgfxShaderHandle,
    SgfxHandleKind::Shader
);
define_handle!(
    /// Graphics pipeline: shaders, input layout and fixed-function state
    SgfxPipelineStateHandle,
    SgfxHandleKind::PipelineState
);
define_handle!(SgfxComputePipelineHandle, SgfxHandleKind::ComputePipeline);
define_handle!(SgfxSwapchainHandle, SgfxHandleKind::Swapchain);

/// What a shader-resource or unordered-access binding points at
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SgfxResourceView {
    Buffer(SgfxBufferHandle),
    Texture(SgfxTextureHandle),
}

impl From<SgfxBufferHandle> for SgfxResourceView {
    fn from(buffer: SgfxBufferHandle) -> Self {
        SgfxResourceView::Buffer(buffer)
    }
}

impl From<SgfxTextureHandle> for SgfxResourceView {
    fn from(texture: SgfxTextureHandle) -> Self {
        SgfxResourceView::Texture(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handles() {
        assert!(SgfxBufferHandle::INVALID.raw().is_invalid());
        assert_eq!(SgfxTextureHandle::default(), SgfxTextureHandle::INVALID);
        assert_eq!(SgfxPipelineStateHandle::KIND.to_string(), "pipeline state");
    }

    #[test]
    fn test_view_conversions() {
        let buffer = SgfxBufferHandle::INVALID;
        let view: SgfxResourceView = buffer.into();
        assert_eq!(view, SgfxResourceView::Buffer(buffer));
    }
}
