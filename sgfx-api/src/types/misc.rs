use crate::SgfxResult;
#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Constant buffer slots per shader stage. The D3D11 limit minus the two slots the runtime
/// reserves.
pub const MAX_CONSTANT_BUFFER_SLOTS: u32 = 14;
/// Shader resource view slots per shader stage
pub const MAX_SHADER_RESOURCE_SLOTS: u32 = 32;
/// Sampler slots per shader stage
pub const MAX_SAMPLER_SLOTS: u32 = 16;
/// Unordered access slots, shared by the pixel stage (alongside render targets) and compute
pub const MAX_UNORDERED_ACCESS_SLOTS: u32 = 8;
pub const MAX_VERTEX_BUFFER_SLOTS: u32 = 16;
pub const MAX_RENDER_TARGETS: u32 = 8;
/// Back buffers per swapchain
pub const MAX_SWAPCHAIN_BUFFERS: u32 = 16;
/// Largest capacity of any one handle table, all slots are allocated when the device is created
pub const MAX_HANDLE_TABLE_CAPACITY: u32 = 1 << 20;

/// Controls if validation is enabled or not. The requirements/behaviors of validation is
/// API-specific. The device-independent checks sgfx does itself are always on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SgfxValidationMode {
    /// Do not enable the native debug layer
    Disabled,

    /// Enable the native debug layer if it is installed
    EnabledIfAvailable,

    /// Enable the native debug layer and fail device creation if that isn't possible
    Enabled,
}

impl Default for SgfxValidationMode {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        let validation_mode = SgfxValidationMode::EnabledIfAvailable;
        #[cfg(not(debug_assertions))]
        let validation_mode = SgfxValidationMode::Disabled;

        validation_mode
    }
}

/// The native API a device is implemented with
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxBackendType {
    /// Headless, records calls instead of issuing them
    Null,
    Gl4,
    Dx11,
    Dx12,
}

impl SgfxBackendType {
    pub fn name(self) -> &'static str {
        match self {
            SgfxBackendType::Null => "null",
            SgfxBackendType::Gl4 => "gl4",
            SgfxBackendType::Dx11 => "dx11",
            SgfxBackendType::Dx12 => "dx12",
        }
    }
}

impl std::str::FromStr for SgfxBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(SgfxBackendType::Null),
            "gl4" | "gl" | "opengl" => Ok(SgfxBackendType::Gl4),
            "dx11" | "d3d11" => Ok(SgfxBackendType::Dx11),
            "dx12" | "d3d12" => Ok(SgfxBackendType::Dx12),
            _ => Err(format!("unknown backend '{}'", s)),
        }
    }
}

/// How the CPU and GPU access a resource, same meaning as D3D11_USAGE
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxUsage {
    /// GPU read/write, updated from the CPU through copies
    Default,
    /// GPU read only, contents must be provided at creation
    Immutable,
    /// GPU read, CPU write every frame
    Dynamic,
    /// CPU readable copy destination, cannot be bound to the pipeline
    Staging,
}

impl Default for SgfxUsage {
    fn default() -> Self {
        SgfxUsage::Default
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxShaderStage {
    Vertex,
    Hull,
    Domain,
    Geometry,
    Pixel,
    Compute,
}

impl SgfxShaderStage {
    pub const ALL: [SgfxShaderStage; 6] = [
        SgfxShaderStage::Vertex,
        SgfxShaderStage::Hull,
        SgfxShaderStage::Domain,
        SgfxShaderStage::Geometry,
        SgfxShaderStage::Pixel,
        SgfxShaderStage::Compute,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SgfxShaderStage::Vertex => "vertex",
            SgfxShaderStage::Hull => "hull",
            SgfxShaderStage::Domain => "domain",
            SgfxShaderStage::Geometry => "geometry",
            SgfxShaderStage::Pixel => "pixel",
            SgfxShaderStage::Compute => "compute",
        }
    }

    pub fn is_graphics(self) -> bool {
        self != SgfxShaderStage::Compute
    }
}

bitflags::bitflags! {
    /// How a buffer or texture may be bound to the pipeline. Binding a resource in a way it was not
    /// created for fails at submit.
    #[derive(Default)]
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct SgfxBindFlags: u32 {
        const VERTEX_BUFFER = 1<<0;
        const INDEX_BUFFER = 1<<1;
        const CONSTANT_BUFFER = 1<<2;
        const SHADER_RESOURCE = 1<<3;
        const UNORDERED_ACCESS = 1<<4;
        const RENDER_TARGET = 1<<5;
        const DEPTH_STENCIL = 1<<6;
        /// Argument buffer for indirect draws and dispatches
        const INDIRECT_ARGS = 1<<7;
    }
}

bitflags::bitflags! {
    /// Layout of a buffer's contents when it is viewed by a shader
    #[derive(Default)]
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct SgfxBufferFlags: u32 {
        /// StructuredBuffer / RWStructuredBuffer, requires a structure stride
        const STRUCTURED = 1<<0;
        /// ByteAddressBuffer / RWByteAddressBuffer
        const RAW = 1<<1;
        /// Structured UAV with a hidden counter (AppendStructuredBuffer / IncrementCounter)
        const APPEND_COUNTER = 1<<2;
    }
}

bitflags::bitflags! {
    /// Flags for enabling/disabling color channels, used with `SgfxRenderTargetBlendState`
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct SgfxColorWriteMask: u8 {
        const RED = 1;
        const GREEN = 2;
        const BLUE = 4;
        const ALPHA = 8;
        const ALL = 0x0F;
    }
}

impl Default for SgfxColorWriteMask {
    fn default() -> Self {
        SgfxColorWriteMask::ALL
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxPrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

impl Default for SgfxPrimitiveTopology {
    fn default() -> Self {
        SgfxPrimitiveTopology::TriangleList
    }
}

impl SgfxPrimitiveTopology {
    /// Control points per patch when the pipeline has a hull shader. Strips cannot be tessellated.
    pub fn patch_control_points(self) -> SgfxResult<u32> {
        match self {
            SgfxPrimitiveTopology::PointList => Ok(1),
            SgfxPrimitiveTopology::LineList => Ok(2),
            SgfxPrimitiveTopology::TriangleList => Ok(3),
            _ => Err(format!("{:?} cannot be tessellated", self).into()),
        }
    }
}

/// The size of index buffer elements
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxIndexFormat {
    Uint16,
    Uint32,
}

impl SgfxIndexFormat {
    pub fn size_in_bytes(self) -> u32 {
        match self {
            SgfxIndexFormat::Uint16 => 2,
            SgfxIndexFormat::Uint32 => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxFilter {
    Point,
    Linear,
    Anisotropic,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxAddressMode {
    Wrap,
    Mirror,
    Clamp,
    Border,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxCompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxBlendFactor {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
    SrcAlphaSaturate,
    /// The value set with `set_blend_factor`
    BlendFactor,
    InvBlendFactor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxBlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxCullMode {
    None,
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxFillMode {
    Solid,
    Wireframe,
}

/// Winding order of front-facing triangles
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxFrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxStencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

/// Affects how quickly vertex attributes are consumed from buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxInputRate {
    PerVertex,
    PerInstance,
}

impl Default for SgfxInputRate {
    fn default() -> Self {
        SgfxInputRate::PerVertex
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxTextureDimensions {
    Dim1D,
    Dim2D,
    Dim3D,
    /// 2D array whose slices are grouped in sixes
    Cube,
}

impl Default for SgfxTextureDimensions {
    fn default() -> Self {
        SgfxTextureDimensions::Dim2D
    }
}

/// Determines if the contents of a render pass attachment begin with its previous contents, a
/// clear value, or undefined data
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxLoadOp {
    DontCare,
    Load,
    Clear,
}

impl Default for SgfxLoadOp {
    fn default() -> Self {
        SgfxLoadOp::Load
    }
}

/// Area of the render targets a render pass draws into, in pixels
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxViewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl SgfxViewport {
    pub fn for_extents(
        width: u32,
        height: u32,
    ) -> Self {
        SgfxViewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Information about the device, mostly limits and alignment requirements
#[derive(Clone, Debug)]
pub struct SgfxDeviceInfo {
    pub backend_type: SgfxBackendType,
    /// Adapter description (D3D) or renderer string (GL)
    pub adapter_name: String,
    /// Constant buffer sizes must be a multiple of this
    pub constant_buffer_alignment: u32,
    /// Row pitch alignment of texture uploads
    pub upload_row_pitch_alignment: u32,
    pub max_texture_dimension_2d: u32,
    pub supports_pixel_shader_uavs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_control_points() {
        assert_eq!(SgfxPrimitiveTopology::TriangleList.patch_control_points().unwrap(), 3);
        assert_eq!(SgfxPrimitiveTopology::LineList.patch_control_points().unwrap(), 2);
        assert!(SgfxPrimitiveTopology::TriangleStrip.patch_control_points().is_err());
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!("dx11".parse::<SgfxBackendType>().unwrap(), SgfxBackendType::Dx11);
        assert!("metal".parse::<SgfxBackendType>().is_err());
    }
}
