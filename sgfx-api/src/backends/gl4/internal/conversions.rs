use crate::{
    SgfxAddressMode, SgfxBlendFactor, SgfxBlendOp, SgfxBlendState, SgfxCompareOp, SgfxCullMode,
    SgfxDepthStencilState, SgfxFillMode, SgfxFilter, SgfxFormat, SgfxFrontFace,
    SgfxPrimitiveTopology, SgfxRasterizerState, SgfxResult, SgfxShaderStage, SgfxStencilOp,
    SgfxTextureDef, SgfxTextureDimensions, SgfxUsage, MAX_RENDER_TARGETS,
};
use gl::types::{GLbitfield, GLenum};

/// Storage, upload format and upload type of a texture format
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GlTextureFormat {
    pub internal_format: GLenum,
    pub format: GLenum,
    pub type_: GLenum,
}

impl GlTextureFormat {
    const fn new(
        internal_format: GLenum,
        format: GLenum,
        type_: GLenum,
    ) -> Self {
        GlTextureFormat {
            internal_format,
            format,
            type_,
        }
    }
}

/// Component count, component type, normalized and integer flags of a vertex attribute format
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GlAttributeFormat {
    pub size: i32,
    pub type_: GLenum,
    pub normalized: bool,
    pub integer: bool,
}

impl SgfxFormat {
    pub fn gl_texture_format(self) -> SgfxResult<GlTextureFormat> {
        let format = match self {
            SgfxFormat::Unknown => return Err("Unknown format has no GL equivalent".into()),
            SgfxFormat::R8Unorm => GlTextureFormat::new(gl::R8, gl::RED, gl::UNSIGNED_BYTE),
            SgfxFormat::R8G8Unorm => GlTextureFormat::new(gl::RG8, gl::RG, gl::UNSIGNED_BYTE),
            SgfxFormat::R8G8B8A8Unorm => {
                GlTextureFormat::new(gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE)
            }
            SgfxFormat::R8G8B8A8UnormSrgb => {
                GlTextureFormat::new(gl::SRGB8_ALPHA8, gl::RGBA, gl::UNSIGNED_BYTE)
            }
            SgfxFormat::R8G8B8A8Uint => {
                GlTextureFormat::new(gl::RGBA8UI, gl::RGBA_INTEGER, gl::UNSIGNED_BYTE)
            }
            SgfxFormat::B8G8R8A8Unorm => {
                GlTextureFormat::new(gl::RGBA8, gl::BGRA, gl::UNSIGNED_BYTE)
            }
            SgfxFormat::B8G8R8A8UnormSrgb => {
                GlTextureFormat::new(gl::SRGB8_ALPHA8, gl::BGRA, gl::UNSIGNED_BYTE)
            }
            SgfxFormat::R10G10B10A2Unorm => {
                GlTextureFormat::new(gl::RGB10_A2, gl::RGBA, gl::UNSIGNED_INT_2_10_10_10_REV)
            }
            SgfxFormat::R11G11B10Float => GlTextureFormat::new(
                gl::R11F_G11F_B10F,
                gl::RGB,
                gl::UNSIGNED_INT_10F_11F_11F_REV,
            ),
            SgfxFormat::R16Float => GlTextureFormat::new(gl::R16F, gl::RED, gl::HALF_FLOAT),
            SgfxFormat::R16Uint => {
                GlTextureFormat::new(gl::R16UI, gl::RED_INTEGER, gl::UNSIGNED_SHORT)
            }
            SgfxFormat::R16G16Float => GlTextureFormat::new(gl::RG16F, gl::RG, gl::HALF_FLOAT),
            SgfxFormat::R16G16B16A16Float => {
                GlTextureFormat::new(gl::RGBA16F, gl::RGBA, gl::HALF_FLOAT)
            }
            SgfxFormat::R32Float => GlTextureFormat::new(gl::R32F, gl::RED, gl::FLOAT),
            SgfxFormat::R32Uint => {
                GlTextureFormat::new(gl::R32UI, gl::RED_INTEGER, gl::UNSIGNED_INT)
            }
            SgfxFormat::R32Sint => GlTextureFormat::new(gl::R32I, gl::RED_INTEGER, gl::INT),
            SgfxFormat::R32G32Float => GlTextureFormat::new(gl::RG32F, gl::RG, gl::FLOAT),
            SgfxFormat::R32G32Uint => {
                GlTextureFormat::new(gl::RG32UI, gl::RG_INTEGER, gl::UNSIGNED_INT)
            }
            SgfxFormat::R32G32B32Float => GlTextureFormat::new(gl::RGB32F, gl::RGB, gl::FLOAT),
            SgfxFormat::R32G32B32Uint => {
                GlTextureFormat::new(gl::RGB32UI, gl::RGB_INTEGER, gl::UNSIGNED_INT)
            }
            SgfxFormat::R32G32B32A32Float => {
                GlTextureFormat::new(gl::RGBA32F, gl::RGBA, gl::FLOAT)
            }
            SgfxFormat::R32G32B32A32Uint => {
                GlTextureFormat::new(gl::RGBA32UI, gl::RGBA_INTEGER, gl::UNSIGNED_INT)
            }
            SgfxFormat::D16Unorm => GlTextureFormat::new(
                gl::DEPTH_COMPONENT16,
                gl::DEPTH_COMPONENT,
                gl::UNSIGNED_SHORT,
            ),
            SgfxFormat::D24UnormS8Uint => GlTextureFormat::new(
                gl::DEPTH24_STENCIL8,
                gl::DEPTH_STENCIL,
                gl::UNSIGNED_INT_24_8,
            ),
            SgfxFormat::D32Float => {
                GlTextureFormat::new(gl::DEPTH_COMPONENT32F, gl::DEPTH_COMPONENT, gl::FLOAT)
            }
            SgfxFormat::D32FloatS8X24Uint => GlTextureFormat::new(
                gl::DEPTH32F_STENCIL8,
                gl::DEPTH_STENCIL,
                gl::FLOAT_32_UNSIGNED_INT_24_8_REV,
            ),
        };

        Ok(format)
    }

    pub fn gl_attribute_format(self) -> SgfxResult<GlAttributeFormat> {
        let (size, type_) = match self {
            SgfxFormat::R8Unorm => (1, gl::UNSIGNED_BYTE),
            SgfxFormat::R8G8Unorm => (2, gl::UNSIGNED_BYTE),
            SgfxFormat::R8G8B8A8Unorm | SgfxFormat::R8G8B8A8Uint => (4, gl::UNSIGNED_BYTE),
            // GL swizzles BGRA attributes when the size is GL_BGRA
            SgfxFormat::B8G8R8A8Unorm => (gl::BGRA as i32, gl::UNSIGNED_BYTE),
            SgfxFormat::R10G10B10A2Unorm => (4, gl::UNSIGNED_INT_2_10_10_10_REV),
            SgfxFormat::R16Float => (1, gl::HALF_FLOAT),
            SgfxFormat::R16Uint => (1, gl::UNSIGNED_SHORT),
            SgfxFormat::R16G16Float => (2, gl::HALF_FLOAT),
            SgfxFormat::R16G16B16A16Float => (4, gl::HALF_FLOAT),
            SgfxFormat::R32Float => (1, gl::FLOAT),
            SgfxFormat::R32Uint => (1, gl::UNSIGNED_INT),
            SgfxFormat::R32Sint => (1, gl::INT),
            SgfxFormat::R32G32Float => (2, gl::FLOAT),
            SgfxFormat::R32G32Uint => (2, gl::UNSIGNED_INT),
            SgfxFormat::R32G32B32Float => (3, gl::FLOAT),
            SgfxFormat::R32G32B32Uint => (3, gl::UNSIGNED_INT),
            SgfxFormat::R32G32B32A32Float => (4, gl::FLOAT),
            SgfxFormat::R32G32B32A32Uint => (4, gl::UNSIGNED_INT),
            _ => return Err(format!("{:?} cannot be used as a vertex attribute", self).into()),
        };

        Ok(GlAttributeFormat {
            size,
            type_,
            normalized: self.is_normalized(),
            integer: self.is_integer(),
        })
    }

    pub fn gl_depth_attachment(self) -> GLenum {
        if self.has_stencil() {
            gl::DEPTH_STENCIL_ATTACHMENT
        } else {
            gl::DEPTH_ATTACHMENT
        }
    }
}

impl SgfxUsage {
    pub fn gl_buffer_storage_flags(self) -> GLbitfield {
        match self {
            SgfxUsage::Immutable => 0,
            SgfxUsage::Default => gl::DYNAMIC_STORAGE_BIT,
            SgfxUsage::Dynamic => gl::DYNAMIC_STORAGE_BIT | gl::MAP_WRITE_BIT,
            SgfxUsage::Staging => {
                gl::DYNAMIC_STORAGE_BIT | gl::MAP_READ_BIT | gl::CLIENT_STORAGE_BIT
            }
        }
    }
}

impl SgfxShaderStage {
    pub fn gl_shader_type(self) -> GLenum {
        match self {
            SgfxShaderStage::Vertex => gl::VERTEX_SHADER,
            SgfxShaderStage::Hull => gl::TESS_CONTROL_SHADER,
            SgfxShaderStage::Domain => gl::TESS_EVALUATION_SHADER,
            SgfxShaderStage::Geometry => gl::GEOMETRY_SHADER,
            SgfxShaderStage::Pixel => gl::FRAGMENT_SHADER,
            SgfxShaderStage::Compute => gl::COMPUTE_SHADER,
        }
    }

    pub fn gl_stage_bit(self) -> GLbitfield {
        match self {
            SgfxShaderStage::Vertex => gl::VERTEX_SHADER_BIT,
            SgfxShaderStage::Hull => gl::TESS_CONTROL_SHADER_BIT,
            SgfxShaderStage::Domain => gl::TESS_EVALUATION_SHADER_BIT,
            SgfxShaderStage::Geometry => gl::GEOMETRY_SHADER_BIT,
            SgfxShaderStage::Pixel => gl::FRAGMENT_SHADER_BIT,
            SgfxShaderStage::Compute => gl::COMPUTE_SHADER_BIT,
        }
    }
}

impl SgfxPrimitiveTopology {
    pub fn gl_topology(self) -> GLenum {
        match self {
            SgfxPrimitiveTopology::PointList => gl::POINTS,
            SgfxPrimitiveTopology::LineList => gl::LINES,
            SgfxPrimitiveTopology::LineStrip => gl::LINE_STRIP,
            SgfxPrimitiveTopology::TriangleList => gl::TRIANGLES,
            SgfxPrimitiveTopology::TriangleStrip => gl::TRIANGLE_STRIP,
        }
    }
}

impl SgfxCompareOp {
    pub fn gl_compare_op(self) -> GLenum {
        match self {
            SgfxCompareOp::Never => gl::NEVER,
            SgfxCompareOp::Less => gl::LESS,
            SgfxCompareOp::Equal => gl::EQUAL,
            SgfxCompareOp::LessOrEqual => gl::LEQUAL,
            SgfxCompareOp::Greater => gl::GREATER,
            SgfxCompareOp::NotEqual => gl::NOTEQUAL,
            SgfxCompareOp::GreaterOrEqual => gl::GEQUAL,
            SgfxCompareOp::Always => gl::ALWAYS,
        }
    }
}

impl SgfxBlendFactor {
    pub fn gl_blend_factor(self) -> GLenum {
        match self {
            SgfxBlendFactor::Zero => gl::ZERO,
            SgfxBlendFactor::One => gl::ONE,
            SgfxBlendFactor::SrcColor => gl::SRC_COLOR,
            SgfxBlendFactor::InvSrcColor => gl::ONE_MINUS_SRC_COLOR,
            SgfxBlendFactor::SrcAlpha => gl::SRC_ALPHA,
            SgfxBlendFactor::InvSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
            SgfxBlendFactor::DestAlpha => gl::DST_ALPHA,
            SgfxBlendFactor::InvDestAlpha => gl::ONE_MINUS_DST_ALPHA,
            SgfxBlendFactor::DestColor => gl::DST_COLOR,
            SgfxBlendFactor::InvDestColor => gl::ONE_MINUS_DST_COLOR,
            SgfxBlendFactor::SrcAlphaSaturate => gl::SRC_ALPHA_SATURATE,
            SgfxBlendFactor::BlendFactor => gl::CONSTANT_COLOR,
            SgfxBlendFactor::InvBlendFactor => gl::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

impl SgfxBlendOp {
    pub fn gl_blend_op(self) -> GLenum {
        match self {
            SgfxBlendOp::Add => gl::FUNC_ADD,
            SgfxBlendOp::Subtract => gl::FUNC_SUBTRACT,
            SgfxBlendOp::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
            SgfxBlendOp::Min => gl::MIN,
            SgfxBlendOp::Max => gl::MAX,
        }
    }
}

impl SgfxStencilOp {
    pub fn gl_stencil_op(self) -> GLenum {
        match self {
            SgfxStencilOp::Keep => gl::KEEP,
            SgfxStencilOp::Zero => gl::ZERO,
            SgfxStencilOp::Replace => gl::REPLACE,
            SgfxStencilOp::IncrementAndClamp => gl::INCR,
            SgfxStencilOp::DecrementAndClamp => gl::DECR,
            SgfxStencilOp::Invert => gl::INVERT,
            SgfxStencilOp::IncrementAndWrap => gl::INCR_WRAP,
            SgfxStencilOp::DecrementAndWrap => gl::DECR_WRAP,
        }
    }
}

impl SgfxCullMode {
    pub fn gl_cull_mode(self) -> GLenum {
        match self {
            SgfxCullMode::None => gl::NONE,
            SgfxCullMode::Back => gl::BACK,
            SgfxCullMode::Front => gl::FRONT,
        }
    }
}

impl SgfxFrontFace {
    pub fn gl_front_face(self) -> GLenum {
        match self {
            SgfxFrontFace::CounterClockwise => gl::CCW,
            SgfxFrontFace::Clockwise => gl::CW,
        }
    }
}

impl SgfxFillMode {
    pub fn gl_polygon_mode(self) -> GLenum {
        match self {
            SgfxFillMode::Solid => gl::FILL,
            SgfxFillMode::Wireframe => gl::LINE,
        }
    }
}

impl SgfxAddressMode {
    pub fn gl_wrap_mode(self) -> i32 {
        let mode = match self {
            SgfxAddressMode::Wrap => gl::REPEAT,
            SgfxAddressMode::Mirror => gl::MIRRORED_REPEAT,
            SgfxAddressMode::Clamp => gl::CLAMP_TO_EDGE,
            SgfxAddressMode::Border => gl::CLAMP_TO_BORDER,
        };
        mode as i32
    }
}

pub fn gl_min_filter(
    min_filter: SgfxFilter,
    mip_filter: SgfxFilter,
) -> i32 {
    let min_linear = min_filter != SgfxFilter::Point;
    let mip_linear = mip_filter != SgfxFilter::Point;
    let filter = match (min_linear, mip_linear) {
        (false, false) => gl::NEAREST_MIPMAP_NEAREST,
        (true, false) => gl::LINEAR_MIPMAP_NEAREST,
        (false, true) => gl::NEAREST_MIPMAP_LINEAR,
        (true, true) => gl::LINEAR_MIPMAP_LINEAR,
    };
    filter as i32
}

pub fn gl_mag_filter(mag_filter: SgfxFilter) -> i32 {
    let filter = match mag_filter {
        SgfxFilter::Point => gl::NEAREST,
        SgfxFilter::Linear | SgfxFilter::Anisotropic => gl::LINEAR,
    };
    filter as i32
}

/// Texture object target for a texture def
pub fn gl_texture_target(def: &SgfxTextureDef) -> GLenum {
    let is_array = def.array_length > 1;
    match def.dimensions {
        SgfxTextureDimensions::Dim1D if is_array => gl::TEXTURE_1D_ARRAY,
        SgfxTextureDimensions::Dim1D => gl::TEXTURE_1D,
        SgfxTextureDimensions::Dim2D if def.sample_count > 1 && is_array => {
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY
        }
        SgfxTextureDimensions::Dim2D if def.sample_count > 1 => gl::TEXTURE_2D_MULTISAMPLE,
        SgfxTextureDimensions::Dim2D if is_array => gl::TEXTURE_2D_ARRAY,
        SgfxTextureDimensions::Dim2D => gl::TEXTURE_2D,
        SgfxTextureDimensions::Dim3D => gl::TEXTURE_3D,
        SgfxTextureDimensions::Cube if def.array_length > 6 => gl::TEXTURE_CUBE_MAP_ARRAY,
        SgfxTextureDimensions::Cube => gl::TEXTURE_CUBE_MAP,
    }
}

/// True if single array slices of the texture are attached and uploaded as layers
pub fn gl_texture_is_layered(target: GLenum) -> bool {
    matches!(
        target,
        gl::TEXTURE_1D_ARRAY
            | gl::TEXTURE_2D_ARRAY
            | gl::TEXTURE_2D_MULTISAMPLE_ARRAY
            | gl::TEXTURE_CUBE_MAP
            | gl::TEXTURE_CUBE_MAP_ARRAY
    )
}

pub struct GlBlendTarget {
    pub enabled: bool,
    // src color, dst color, src alpha, dst alpha
    pub func: [GLenum; 4],
    // color, alpha
    pub equation: [GLenum; 2],
    pub write_mask: [bool; 4],
}

pub struct GlBlendState {
    pub alpha_to_coverage: bool,
    pub targets: Vec<GlBlendTarget>,
}

impl From<&SgfxBlendState> for GlBlendState {
    fn from(blend_state: &SgfxBlendState) -> Self {
        let targets = (0..MAX_RENDER_TARGETS as usize)
            .map(|index| {
                let target = blend_state.target(index);
                GlBlendTarget {
                    enabled: target.blend_enable,
                    func: [
                        target.src_color.gl_blend_factor(),
                        target.dst_color.gl_blend_factor(),
                        target.src_alpha.gl_blend_factor(),
                        target.dst_alpha.gl_blend_factor(),
                    ],
                    equation: [target.color_op.gl_blend_op(), target.alpha_op.gl_blend_op()],
                    write_mask: [
                        target.write_mask.contains(crate::SgfxColorWriteMask::RED),
                        target.write_mask.contains(crate::SgfxColorWriteMask::GREEN),
                        target.write_mask.contains(crate::SgfxColorWriteMask::BLUE),
                        target.write_mask.contains(crate::SgfxColorWriteMask::ALPHA),
                    ],
                }
            })
            .collect();

        GlBlendState {
            alpha_to_coverage: blend_state.alpha_to_coverage,
            targets,
        }
    }
}

pub struct GlStencilFace {
    pub func: GLenum,
    // stencil fail, depth fail, pass
    pub ops: [GLenum; 3],
}

pub struct GlDepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: GLenum,
    pub stencil_test: bool,
    pub stencil_read_mask: u32,
    pub stencil_write_mask: u32,
    pub front: GlStencilFace,
    pub back: GlStencilFace,
}

impl From<&SgfxDepthStencilState> for GlDepthStencilState {
    fn from(state: &SgfxDepthStencilState) -> Self {
        let face = |face: &crate::SgfxStencilFaceState| GlStencilFace {
            func: face.compare_op.gl_compare_op(),
            ops: [
                face.fail_op.gl_stencil_op(),
                face.depth_fail_op.gl_stencil_op(),
                face.pass_op.gl_stencil_op(),
            ],
        };

        GlDepthStencilState {
            depth_test: state.depth_test_enable,
            depth_write: state.depth_write_enable,
            depth_func: state.depth_compare_op.gl_compare_op(),
            stencil_test: state.stencil_test_enable,
            stencil_read_mask: state.stencil_read_mask as u32,
            stencil_write_mask: state.stencil_write_mask as u32,
            front: face(&state.front_face),
            back: face(&state.back_face),
        }
    }
}

pub struct GlRasterizerState {
    pub cull_mode: GLenum,
    pub front_face: GLenum,
    pub polygon_mode: GLenum,
    pub depth_bias: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clamp: bool,
    pub scissor_test: bool,
    pub multisample: bool,
}

impl From<&SgfxRasterizerState> for GlRasterizerState {
    fn from(rasterizer_state: &SgfxRasterizerState) -> Self {
        GlRasterizerState {
            cull_mode: rasterizer_state.cull_mode.gl_cull_mode(),
            front_face: rasterizer_state.front_face.gl_front_face(),
            polygon_mode: rasterizer_state.fill_mode.gl_polygon_mode(),
            depth_bias: rasterizer_state.depth_bias as f32,
            slope_scaled_depth_bias: rasterizer_state.slope_scaled_depth_bias,
            depth_clamp: !rasterizer_state.depth_clip_enable,
            scissor_test: rasterizer_state.scissor_enable,
            multisample: rasterizer_state.multisample_enable,
        }
    }
}
