#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Texel and vertex attribute formats. Named after the DXGI formats they map to, every backend
/// supports all of them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxFormat {
    Unknown,

    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    R8G8B8A8Uint,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R10G10B10A2Unorm,
    R11G11B10Float,

    R16Float,
    R16Uint,
    R16G16Float,
    R16G16B16A16Float,

    R32Float,
    R32Uint,
    R32Sint,
    R32G32Float,
    R32G32Uint,
    R32G32B32Float,
    R32G32B32Uint,
    R32G32B32A32Float,
    R32G32B32A32Uint,

    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8X24Uint,
}

impl Default for SgfxFormat {
    fn default() -> Self {
        SgfxFormat::Unknown
    }
}

impl SgfxFormat {
    /// Size of a single texel (or vertex attribute) in bytes
    pub fn block_size_in_bytes(self) -> u32 {
        match self {
            SgfxFormat::Unknown => 0,
            SgfxFormat::R8Unorm => 1,
            SgfxFormat::R8G8Unorm | SgfxFormat::R16Float | SgfxFormat::R16Uint => 2,
            SgfxFormat::D16Unorm => 2,
            SgfxFormat::R8G8B8A8Unorm
            | SgfxFormat::R8G8B8A8UnormSrgb
            | SgfxFormat::R8G8B8A8Uint
            | SgfxFormat::B8G8R8A8Unorm
            | SgfxFormat::B8G8R8A8UnormSrgb
            | SgfxFormat::R10G10B10A2Unorm
            | SgfxFormat::R11G11B10Float
            | SgfxFormat::R16G16Float
            | SgfxFormat::R32Float
            | SgfxFormat::R32Uint
            | SgfxFormat::R32Sint
            | SgfxFormat::D24UnormS8Uint
            | SgfxFormat::D32Float => 4,
            SgfxFormat::R16G16B16A16Float
            | SgfxFormat::R32G32Float
            | SgfxFormat::R32G32Uint
            | SgfxFormat::D32FloatS8X24Uint => 8,
            SgfxFormat::R32G32B32Float | SgfxFormat::R32G32B32Uint => 12,
            SgfxFormat::R32G32B32A32Float | SgfxFormat::R32G32B32A32Uint => 16,
        }
    }

    pub fn channel_count(self) -> u32 {
        match self {
            SgfxFormat::Unknown => 0,
            SgfxFormat::R8Unorm
            | SgfxFormat::R16Float
            | SgfxFormat::R16Uint
            | SgfxFormat::R32Float
            | SgfxFormat::R32Uint
            | SgfxFormat::R32Sint
            | SgfxFormat::D16Unorm
            | SgfxFormat::D32Float => 1,
            SgfxFormat::R8G8Unorm
            | SgfxFormat::R16G16Float
            | SgfxFormat::R32G32Float
            | SgfxFormat::R32G32Uint
            | SgfxFormat::D24UnormS8Uint
            | SgfxFormat::D32FloatS8X24Uint => 2,
            SgfxFormat::R11G11B10Float
            | SgfxFormat::R32G32B32Float
            | SgfxFormat::R32G32B32Uint => 3,
            SgfxFormat::R8G8B8A8Unorm
            | SgfxFormat::R8G8B8A8UnormSrgb
            | SgfxFormat::R8G8B8A8Uint
            | SgfxFormat::B8G8R8A8Unorm
            | SgfxFormat::B8G8R8A8UnormSrgb
            | SgfxFormat::R10G10B10A2Unorm
            | SgfxFormat::R16G16B16A16Float
            | SgfxFormat::R32G32B32A32Float
            | SgfxFormat::R32G32B32A32Uint => 4,
        }
    }

    pub fn has_depth(self) -> bool {
        matches!(
            self,
            SgfxFormat::D16Unorm
                | SgfxFormat::D24UnormS8Uint
                | SgfxFormat::D32Float
                | SgfxFormat::D32FloatS8X24Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(
            self,
            SgfxFormat::D24UnormS8Uint | SgfxFormat::D32FloatS8X24Uint
        )
    }

    pub fn is_depth_stencil(self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            SgfxFormat::R8G8B8A8UnormSrgb | SgfxFormat::B8G8R8A8UnormSrgb
        )
    }

    /// Integer storage read as a [0, 1] float
    pub fn is_normalized(self) -> bool {
        matches!(
            self,
            SgfxFormat::R8Unorm
                | SgfxFormat::R8G8Unorm
                | SgfxFormat::R8G8B8A8Unorm
                | SgfxFormat::R8G8B8A8UnormSrgb
                | SgfxFormat::B8G8R8A8Unorm
                | SgfxFormat::B8G8R8A8UnormSrgb
                | SgfxFormat::R10G10B10A2Unorm
                | SgfxFormat::D16Unorm
        )
    }

    /// Read by shaders as unnormalized integers
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            SgfxFormat::R8G8B8A8Uint
                | SgfxFormat::R16Uint
                | SgfxFormat::R32Uint
                | SgfxFormat::R32Sint
                | SgfxFormat::R32G32Uint
                | SgfxFormat::R32G32B32Uint
                | SgfxFormat::R32G32B32A32Uint
        )
    }

    /// The linear format sharing the same storage (used when creating non-sRGB views)
    pub fn to_linear(self) -> SgfxFormat {
        match self {
            SgfxFormat::R8G8B8A8UnormSrgb => SgfxFormat::R8G8B8A8Unorm,
            SgfxFormat::B8G8R8A8UnormSrgb => SgfxFormat::B8G8R8A8Unorm,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats() {
        assert!(SgfxFormat::D32Float.has_depth());
        assert!(!SgfxFormat::D32Float.has_stencil());
        assert!(SgfxFormat::D24UnormS8Uint.is_depth_stencil());
        assert!(!SgfxFormat::R32Float.is_depth_stencil());
    }

    #[test]
    fn test_sizes_and_classes() {
        assert_eq!(SgfxFormat::R32G32B32Float.block_size_in_bytes(), 12);
        assert_eq!(SgfxFormat::R16G16B16A16Float.block_size_in_bytes(), 8);
        assert_eq!(SgfxFormat::R11G11B10Float.channel_count(), 3);
        assert!(SgfxFormat::B8G8R8A8UnormSrgb.is_srgb());
        assert!(SgfxFormat::B8G8R8A8UnormSrgb.is_normalized());
        assert_eq!(
            SgfxFormat::B8G8R8A8UnormSrgb.to_linear(),
            SgfxFormat::B8G8R8A8Unorm
        );
        assert!(SgfxFormat::R32Uint.is_integer());
        assert!(!SgfxFormat::R32Float.is_integer());
    }
}
