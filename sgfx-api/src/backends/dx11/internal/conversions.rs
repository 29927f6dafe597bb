use super::d3d11;
use crate::backends::dxgi_common::d3d_filter_bits;
use crate::{
    SgfxAddressMode, SgfxBindFlags, SgfxBlendFactor, SgfxBlendOp, SgfxBlendState,
    SgfxBufferFlags, SgfxCompareOp, SgfxCullMode, SgfxDepthStencilState, SgfxFillMode,
    SgfxFrontFace, SgfxInputRate, SgfxRasterizerState, SgfxSamplerDef, SgfxStencilFaceState,
    SgfxStencilOp, SgfxUsage, MAX_RENDER_TARGETS,
};

impl Into<d3d11::D3D11_TEXTURE_ADDRESS_MODE> for SgfxAddressMode {
    fn into(self) -> d3d11::D3D11_TEXTURE_ADDRESS_MODE {
        match self {
            SgfxAddressMode::Wrap => d3d11::D3D11_TEXTURE_ADDRESS_WRAP,
            SgfxAddressMode::Mirror => d3d11::D3D11_TEXTURE_ADDRESS_MIRROR,
            SgfxAddressMode::Clamp => d3d11::D3D11_TEXTURE_ADDRESS_CLAMP,
            SgfxAddressMode::Border => d3d11::D3D11_TEXTURE_ADDRESS_BORDER,
        }
    }
}

impl Into<d3d11::D3D11_COMPARISON_FUNC> for SgfxCompareOp {
    fn into(self) -> d3d11::D3D11_COMPARISON_FUNC {
        match self {
            SgfxCompareOp::Never => d3d11::D3D11_COMPARISON_NEVER,
            SgfxCompareOp::Less => d3d11::D3D11_COMPARISON_LESS,
            SgfxCompareOp::Equal => d3d11::D3D11_COMPARISON_EQUAL,
            SgfxCompareOp::LessOrEqual => d3d11::D3D11_COMPARISON_LESS_EQUAL,
            SgfxCompareOp::Greater => d3d11::D3D11_COMPARISON_GREATER,
            SgfxCompareOp::NotEqual => d3d11::D3D11_COMPARISON_NOT_EQUAL,
            SgfxCompareOp::GreaterOrEqual => d3d11::D3D11_COMPARISON_GREATER_EQUAL,
            SgfxCompareOp::Always => d3d11::D3D11_COMPARISON_ALWAYS,
        }
    }
}

impl Into<d3d11::D3D11_BLEND> for SgfxBlendFactor {
    fn into(self) -> d3d11::D3D11_BLEND {
        match self {
            SgfxBlendFactor::Zero => d3d11::D3D11_BLEND_ZERO,
            SgfxBlendFactor::One => d3d11::D3D11_BLEND_ONE,
            SgfxBlendFactor::SrcColor => d3d11::D3D11_BLEND_SRC_COLOR,
            SgfxBlendFactor::InvSrcColor => d3d11::D3D11_BLEND_INV_SRC_COLOR,
            SgfxBlendFactor::SrcAlpha => d3d11::D3D11_BLEND_SRC_ALPHA,
            SgfxBlendFactor::InvSrcAlpha => d3d11::D3D11_BLEND_INV_SRC_ALPHA,
            SgfxBlendFactor::DestAlpha => d3d11::D3D11_BLEND_DEST_ALPHA,
            SgfxBlendFactor::InvDestAlpha => d3d11::D3D11_BLEND_INV_DEST_ALPHA,
            SgfxBlendFactor::DestColor => d3d11::D3D11_BLEND_DEST_COLOR,
            SgfxBlendFactor::InvDestColor => d3d11::D3D11_BLEND_INV_DEST_COLOR,
            SgfxBlendFactor::SrcAlphaSaturate => d3d11::D3D11_BLEND_SRC_ALPHA_SAT,
            SgfxBlendFactor::BlendFactor => d3d11::D3D11_BLEND_BLEND_FACTOR,
            SgfxBlendFactor::InvBlendFactor => d3d11::D3D11_BLEND_INV_BLEND_FACTOR,
        }
    }
}

impl Into<d3d11::D3D11_BLEND_OP> for SgfxBlendOp {
    fn into(self) -> d3d11::D3D11_BLEND_OP {
        match self {
            SgfxBlendOp::Add => d3d11::D3D11_BLEND_OP_ADD,
            SgfxBlendOp::Subtract => d3d11::D3D11_BLEND_OP_SUBTRACT,
            SgfxBlendOp::ReverseSubtract => d3d11::D3D11_BLEND_OP_REV_SUBTRACT,
            SgfxBlendOp::Min => d3d11::D3D11_BLEND_OP_MIN,
            SgfxBlendOp::Max => d3d11::D3D11_BLEND_OP_MAX,
        }
    }
}

impl Into<d3d11::D3D11_STENCIL_OP> for SgfxStencilOp {
    fn into(self) -> d3d11::D3D11_STENCIL_OP {
        match self {
            SgfxStencilOp::Keep => d3d11::D3D11_STENCIL_OP_KEEP,
            SgfxStencilOp::Zero => d3d11::D3D11_STENCIL_OP_ZERO,
            SgfxStencilOp::Replace => d3d11::D3D11_STENCIL_OP_REPLACE,
            SgfxStencilOp::IncrementAndClamp => d3d11::D3D11_STENCIL_OP_INCR_SAT,
            SgfxStencilOp::DecrementAndClamp => d3d11::D3D11_STENCIL_OP_DECR_SAT,
            SgfxStencilOp::Invert => d3d11::D3D11_STENCIL_OP_INVERT,
            SgfxStencilOp::IncrementAndWrap => d3d11::D3D11_STENCIL_OP_INCR,
            SgfxStencilOp::DecrementAndWrap => d3d11::D3D11_STENCIL_OP_DECR,
        }
    }
}

impl Into<d3d11::D3D11_FILL_MODE> for SgfxFillMode {
    fn into(self) -> d3d11::D3D11_FILL_MODE {
        match self {
            SgfxFillMode::Solid => d3d11::D3D11_FILL_SOLID,
            SgfxFillMode::Wireframe => d3d11::D3D11_FILL_WIREFRAME,
        }
    }
}

impl Into<d3d11::D3D11_CULL_MODE> for SgfxCullMode {
    fn into(self) -> d3d11::D3D11_CULL_MODE {
        match self {
            SgfxCullMode::None => d3d11::D3D11_CULL_NONE,
            SgfxCullMode::Front => d3d11::D3D11_CULL_FRONT,
            SgfxCullMode::Back => d3d11::D3D11_CULL_BACK,
        }
    }
}

impl Into<d3d11::D3D11_INPUT_CLASSIFICATION> for SgfxInputRate {
    fn into(self) -> d3d11::D3D11_INPUT_CLASSIFICATION {
        match self {
            SgfxInputRate::PerVertex => d3d11::D3D11_INPUT_PER_VERTEX_DATA,
            SgfxInputRate::PerInstance => d3d11::D3D11_INPUT_PER_INSTANCE_DATA,
        }
    }
}

impl Into<d3d11::D3D11_USAGE> for SgfxUsage {
    fn into(self) -> d3d11::D3D11_USAGE {
        match self {
            SgfxUsage::Default => d3d11::D3D11_USAGE_DEFAULT,
            SgfxUsage::Immutable => d3d11::D3D11_USAGE_IMMUTABLE,
            SgfxUsage::Dynamic => d3d11::D3D11_USAGE_DYNAMIC,
            SgfxUsage::Staging => d3d11::D3D11_USAGE_STAGING,
        }
    }
}

pub fn usage_cpu_access_flags(usage: SgfxUsage) -> u32 {
    match usage {
        SgfxUsage::Default | SgfxUsage::Immutable => 0,
        SgfxUsage::Dynamic => d3d11::D3D11_CPU_ACCESS_WRITE.0 as u32,
        SgfxUsage::Staging => {
            (d3d11::D3D11_CPU_ACCESS_READ.0 | d3d11::D3D11_CPU_ACCESS_WRITE.0) as u32
        }
    }
}

pub fn bind_flags_bind_flags(bind_flags: SgfxBindFlags) -> u32 {
    let mut flags = 0;
    let mapping = [
        (SgfxBindFlags::VERTEX_BUFFER, d3d11::D3D11_BIND_VERTEX_BUFFER),
        (SgfxBindFlags::INDEX_BUFFER, d3d11::D3D11_BIND_INDEX_BUFFER),
        (SgfxBindFlags::CONSTANT_BUFFER, d3d11::D3D11_BIND_CONSTANT_BUFFER),
        (SgfxBindFlags::SHADER_RESOURCE, d3d11::D3D11_BIND_SHADER_RESOURCE),
        (SgfxBindFlags::UNORDERED_ACCESS, d3d11::D3D11_BIND_UNORDERED_ACCESS),
        (SgfxBindFlags::RENDER_TARGET, d3d11::D3D11_BIND_RENDER_TARGET),
        (SgfxBindFlags::DEPTH_STENCIL, d3d11::D3D11_BIND_DEPTH_STENCIL),
    ];
    for (sgfx_flag, d3d_flag) in mapping {
        if bind_flags.contains(sgfx_flag) {
            flags |= d3d_flag.0 as u32;
        }
    }

    flags
}

pub fn buffer_misc_flags(
    bind_flags: SgfxBindFlags,
    flags: SgfxBufferFlags,
) -> u32 {
    let mut misc = 0;
    if flags.contains(SgfxBufferFlags::STRUCTURED) {
        misc |= d3d11::D3D11_RESOURCE_MISC_BUFFER_STRUCTURED.0 as u32;
    }
    if flags.contains(SgfxBufferFlags::RAW) {
        misc |= d3d11::D3D11_RESOURCE_MISC_BUFFER_ALLOW_RAW_VIEWS.0 as u32;
    }
    if bind_flags.contains(SgfxBindFlags::INDIRECT_ARGS) {
        misc |= d3d11::D3D11_RESOURCE_MISC_DRAWINDIRECT_ARGS.0 as u32;
    }

    misc
}

pub fn sampler_def_sampler_desc(def: &SgfxSamplerDef) -> d3d11::D3D11_SAMPLER_DESC {
    d3d11::D3D11_SAMPLER_DESC {
        Filter: d3d11::D3D11_FILTER(d3d_filter_bits(def)),
        AddressU: def.address_mode_u.into(),
        AddressV: def.address_mode_v.into(),
        AddressW: def.address_mode_w.into(),
        MipLODBias: def.mip_lod_bias,
        MaxAnisotropy: def.max_anisotropy.clamp(1, 16),
        ComparisonFunc: def.compare_op.unwrap_or(SgfxCompareOp::Never).into(),
        BorderColor: def.border_color,
        MinLOD: def.min_lod,
        MaxLOD: def.max_lod,
    }
}

pub fn blend_state_blend_desc(blend_state: &SgfxBlendState) -> d3d11::D3D11_BLEND_DESC {
    let mut blend_desc = d3d11::D3D11_BLEND_DESC::default();
    blend_desc.AlphaToCoverageEnable = blend_state.alpha_to_coverage.into();
    blend_desc.IndependentBlendEnable = blend_state.is_independent().into();

    for index in 0..MAX_RENDER_TARGETS as usize {
        let def = blend_state.target(index);
        let desc = &mut blend_desc.RenderTarget[index];
        desc.BlendEnable = def.blend_enable.into();
        desc.SrcBlend = def.src_color.into();
        desc.DestBlend = def.dst_color.into();
        desc.BlendOp = def.color_op.into();
        desc.SrcBlendAlpha = def.src_alpha.into();
        desc.DestBlendAlpha = def.dst_alpha.into();
        desc.BlendOpAlpha = def.alpha_op.into();
        desc.RenderTargetWriteMask = def.write_mask.bits();
    }

    blend_desc
}

fn stencil_face_desc(face: &SgfxStencilFaceState) -> d3d11::D3D11_DEPTH_STENCILOP_DESC {
    d3d11::D3D11_DEPTH_STENCILOP_DESC {
        StencilFailOp: face.fail_op.into(),
        StencilDepthFailOp: face.depth_fail_op.into(),
        StencilPassOp: face.pass_op.into(),
        StencilFunc: face.compare_op.into(),
    }
}

pub fn depth_stencil_state_depth_stencil_desc(
    depth_state: &SgfxDepthStencilState
) -> d3d11::D3D11_DEPTH_STENCIL_DESC {
    d3d11::D3D11_DEPTH_STENCIL_DESC {
        DepthEnable: depth_state.depth_test_enable.into(),
        DepthWriteMask: if depth_state.depth_write_enable {
            d3d11::D3D11_DEPTH_WRITE_MASK_ALL
        } else {
            d3d11::D3D11_DEPTH_WRITE_MASK_ZERO
        },
        DepthFunc: depth_state.depth_compare_op.into(),
        StencilEnable: depth_state.stencil_test_enable.into(),
        StencilReadMask: depth_state.stencil_read_mask,
        StencilWriteMask: depth_state.stencil_write_mask,
        FrontFace: stencil_face_desc(&depth_state.front_face),
        BackFace: stencil_face_desc(&depth_state.back_face),
    }
}

pub fn rasterizer_state_rasterizer_desc(
    rasterizer_state: &SgfxRasterizerState
) -> d3d11::D3D11_RASTERIZER_DESC {
    d3d11::D3D11_RASTERIZER_DESC {
        FillMode: rasterizer_state.fill_mode.into(),
        CullMode: rasterizer_state.cull_mode.into(),
        FrontCounterClockwise: (rasterizer_state.front_face == SgfxFrontFace::CounterClockwise)
            .into(),
        DepthBias: rasterizer_state.depth_bias,
        DepthBiasClamp: rasterizer_state.depth_bias_clamp,
        SlopeScaledDepthBias: rasterizer_state.slope_scaled_depth_bias,
        DepthClipEnable: rasterizer_state.depth_clip_enable.into(),
        ScissorEnable: rasterizer_state.scissor_enable.into(),
        MultisampleEnable: rasterizer_state.multisample_enable.into(),
        AntialiasedLineEnable: false.into(),
    }
}
