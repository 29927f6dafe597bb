use super::d3d12;
use crate::backends::dxgi_common::d3d_filter_bits;
use crate::{
    SgfxAddressMode, SgfxBlendFactor, SgfxBlendOp, SgfxBlendState, SgfxCompareOp, SgfxCullMode,
    SgfxDepthStencilState, SgfxFillMode, SgfxFrontFace, SgfxInputRate, SgfxPrimitiveTopology,
    SgfxRasterizerState, SgfxSamplerDef, SgfxStencilFaceState, SgfxStencilOp, MAX_RENDER_TARGETS,
};

impl Into<d3d12::D3D12_TEXTURE_ADDRESS_MODE> for SgfxAddressMode {
    fn into(self) -> d3d12::D3D12_TEXTURE_ADDRESS_MODE {
        match self {
            SgfxAddressMode::Wrap => d3d12::D3D12_TEXTURE_ADDRESS_MODE_WRAP,
            SgfxAddressMode::Mirror => d3d12::D3D12_TEXTURE_ADDRESS_MODE_MIRROR,
            SgfxAddressMode::Clamp => d3d12::D3D12_TEXTURE_ADDRESS_MODE_CLAMP,
            SgfxAddressMode::Border => d3d12::D3D12_TEXTURE_ADDRESS_MODE_BORDER,
        }
    }
}

impl Into<d3d12::D3D12_COMPARISON_FUNC> for SgfxCompareOp {
    fn into(self) -> d3d12::D3D12_COMPARISON_FUNC {
        match self {
            SgfxCompareOp::Never => d3d12::D3D12_COMPARISON_FUNC_NEVER,
            SgfxCompareOp::Less => d3d12::D3D12_COMPARISON_FUNC_LESS,
            SgfxCompareOp::Equal => d3d12::D3D12_COMPARISON_FUNC_EQUAL,
            SgfxCompareOp::LessOrEqual => d3d12::D3D12_COMPARISON_FUNC_LESS_EQUAL,
            SgfxCompareOp::Greater => d3d12::D3D12_COMPARISON_FUNC_GREATER,
            SgfxCompareOp::NotEqual => d3d12::D3D12_COMPARISON_FUNC_NOT_EQUAL,
            SgfxCompareOp::GreaterOrEqual => d3d12::D3D12_COMPARISON_FUNC_GREATER_EQUAL,
            SgfxCompareOp::Always => d3d12::D3D12_COMPARISON_FUNC_ALWAYS,
        }
    }
}

impl Into<d3d12::D3D12_BLEND> for SgfxBlendFactor {
    fn into(self) -> d3d12::D3D12_BLEND {
        match self {
            SgfxBlendFactor::Zero => d3d12::D3D12_BLEND_ZERO,
            SgfxBlendFactor::One => d3d12::D3D12_BLEND_ONE,
            SgfxBlendFactor::SrcColor => d3d12::D3D12_BLEND_SRC_COLOR,
            SgfxBlendFactor::InvSrcColor => d3d12::D3D12_BLEND_INV_SRC_COLOR,
            SgfxBlendFactor::SrcAlpha => d3d12::D3D12_BLEND_SRC_ALPHA,
            SgfxBlendFactor::InvSrcAlpha => d3d12::D3D12_BLEND_INV_SRC_ALPHA,
            SgfxBlendFactor::DestAlpha => d3d12::D3D12_BLEND_DEST_ALPHA,
            SgfxBlendFactor::InvDestAlpha => d3d12::D3D12_BLEND_INV_DEST_ALPHA,
            SgfxBlendFactor::DestColor => d3d12::D3D12_BLEND_DEST_COLOR,
            SgfxBlendFactor::InvDestColor => d3d12::D3D12_BLEND_INV_DEST_COLOR,
            SgfxBlendFactor::SrcAlphaSaturate => d3d12::D3D12_BLEND_SRC_ALPHA_SAT,
            SgfxBlendFactor::BlendFactor => d3d12::D3D12_BLEND_BLEND_FACTOR,
            SgfxBlendFactor::InvBlendFactor => d3d12::D3D12_BLEND_INV_BLEND_FACTOR,
        }
    }
}

impl Into<d3d12::D3D12_BLEND_OP> for SgfxBlendOp {
    fn into(self) -> d3d12::D3D12_BLEND_OP {
        match self {
            SgfxBlendOp::Add => d3d12::D3D12_BLEND_OP_ADD,
            SgfxBlendOp::Subtract => d3d12::D3D12_BLEND_OP_SUBTRACT,
            SgfxBlendOp::ReverseSubtract => d3d12::D3D12_BLEND_OP_REV_SUBTRACT,
            SgfxBlendOp::Min => d3d12::D3D12_BLEND_OP_MIN,
            SgfxBlendOp::Max => d3d12::D3D12_BLEND_OP_MAX,
        }
    }
}

impl Into<d3d12::D3D12_STENCIL_OP> for SgfxStencilOp {
    fn into(self) -> d3d12::D3D12_STENCIL_OP {
        match self {
            SgfxStencilOp::Keep => d3d12::D3D12_STENCIL_OP_KEEP,
            SgfxStencilOp::Zero => d3d12::D3D12_STENCIL_OP_ZERO,
            SgfxStencilOp::Replace => d3d12::D3D12_STENCIL_OP_REPLACE,
            SgfxStencilOp::IncrementAndClamp => d3d12::D3D12_STENCIL_OP_INCR_SAT,
            SgfxStencilOp::DecrementAndClamp => d3d12::D3D12_STENCIL_OP_DECR_SAT,
            SgfxStencilOp::Invert => d3d12::D3D12_STENCIL_OP_INVERT,
            SgfxStencilOp::IncrementAndWrap => d3d12::D3D12_STENCIL_OP_INCR,
            SgfxStencilOp::DecrementAndWrap => d3d12::D3D12_STENCIL_OP_DECR,
        }
    }
}

impl Into<d3d12::D3D12_FILL_MODE> for SgfxFillMode {
    fn into(self) -> d3d12::D3D12_FILL_MODE {
        match self {
            SgfxFillMode::Solid => d3d12::D3D12_FILL_MODE_SOLID,
            SgfxFillMode::Wireframe => d3d12::D3D12_FILL_MODE_WIREFRAME,
        }
    }
}

impl Into<d3d12::D3D12_CULL_MODE> for SgfxCullMode {
    fn into(self) -> d3d12::D3D12_CULL_MODE {
        match self {
            SgfxCullMode::None => d3d12::D3D12_CULL_MODE_NONE,
            SgfxCullMode::Front => d3d12::D3D12_CULL_MODE_FRONT,
            SgfxCullMode::Back => d3d12::D3D12_CULL_MODE_BACK,
        }
    }
}

impl Into<d3d12::D3D12_INPUT_CLASSIFICATION> for SgfxInputRate {
    fn into(self) -> d3d12::D3D12_INPUT_CLASSIFICATION {
        match self {
            SgfxInputRate::PerVertex => d3d12::D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            SgfxInputRate::PerInstance => d3d12::D3D12_INPUT_CLASSIFICATION_PER_INSTANCE_DATA,
        }
    }
}

pub fn primitive_topology_type(
    topology: SgfxPrimitiveTopology,
    tessellated: bool,
) -> d3d12::D3D12_PRIMITIVE_TOPOLOGY_TYPE {
    if tessellated {
        return d3d12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_PATCH;
    }

    match topology {
        SgfxPrimitiveTopology::PointList => d3d12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_POINT,
        SgfxPrimitiveTopology::LineList | SgfxPrimitiveTopology::LineStrip => {
            d3d12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_LINE
        }
        SgfxPrimitiveTopology::TriangleList | SgfxPrimitiveTopology::TriangleStrip => {
            d3d12::D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE
        }
    }
}

pub fn sampler_def_sampler_desc(def: &SgfxSamplerDef) -> d3d12::D3D12_SAMPLER_DESC {
    d3d12::D3D12_SAMPLER_DESC {
        Filter: d3d12::D3D12_FILTER(d3d_filter_bits(def)),
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

pub fn blend_state_blend_desc(blend_state: &SgfxBlendState) -> d3d12::D3D12_BLEND_DESC {
    let mut blend_desc = d3d12::D3D12_BLEND_DESC::default();
    blend_desc.AlphaToCoverageEnable = blend_state.alpha_to_coverage.into();
    blend_desc.IndependentBlendEnable = blend_state.is_independent().into();

    for index in 0..MAX_RENDER_TARGETS as usize {
        let def = blend_state.target(index);
        let desc = &mut blend_desc.RenderTarget[index];
        desc.BlendEnable = def.blend_enable.into();
        desc.LogicOpEnable = false.into();
        desc.SrcBlend = def.src_color.into();
        desc.DestBlend = def.dst_color.into();
        desc.BlendOp = def.color_op.into();
        desc.SrcBlendAlpha = def.src_alpha.into();
        desc.DestBlendAlpha = def.dst_alpha.into();
        desc.BlendOpAlpha = def.alpha_op.into();
        desc.LogicOp = d3d12::D3D12_LOGIC_OP_NOOP;
        desc.RenderTargetWriteMask = def.write_mask.bits();
    }

    blend_desc
}

fn stencil_face_desc(face: &SgfxStencilFaceState) -> d3d12::D3D12_DEPTH_STENCILOP_DESC {
    d3d12::D3D12_DEPTH_STENCILOP_DESC {
        StencilFailOp: face.fail_op.into(),
        StencilDepthFailOp: face.depth_fail_op.into(),
        StencilPassOp: face.pass_op.into(),
        StencilFunc: face.compare_op.into(),
    }
}

pub fn depth_stencil_state_depth_stencil_desc(
    depth_state: &SgfxDepthStencilState
) -> d3d12::D3D12_DEPTH_STENCIL_DESC {
    d3d12::D3D12_DEPTH_STENCIL_DESC {
        DepthEnable: depth_state.depth_test_enable.into(),
        DepthWriteMask: if depth_state.depth_write_enable {
            d3d12::D3D12_DEPTH_WRITE_MASK_ALL
        } else {
            d3d12::D3D12_DEPTH_WRITE_MASK_ZERO
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
) -> d3d12::D3D12_RASTERIZER_DESC {
    // No scissor enable in D3D12, the render pass sets a rect covering the whole target
    d3d12::D3D12_RASTERIZER_DESC {
        FillMode: rasterizer_state.fill_mode.into(),
        CullMode: rasterizer_state.cull_mode.into(),
        FrontCounterClockwise: (rasterizer_state.front_face == SgfxFrontFace::CounterClockwise)
            .into(),
        DepthBias: rasterizer_state.depth_bias,
        DepthBiasClamp: rasterizer_state.depth_bias_clamp,
        SlopeScaledDepthBias: rasterizer_state.slope_scaled_depth_bias,
        DepthClipEnable: rasterizer_state.depth_clip_enable.into(),
        MultisampleEnable: rasterizer_state.multisample_enable.into(),
        AntialiasedLineEnable: false.into(),
        ForcedSampleCount: 0,
        ConservativeRaster: d3d12::D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
    }
}
