use crate::binding::SgfxBindingKind;
use crate::{
    SgfxBindFlags, SgfxComputePipelineHandle, SgfxDispatchParams, SgfxDrawParams, SgfxFormat,
    SgfxIndexFormat, SgfxPipelineStateHandle, SgfxResourceView, SgfxShaderStage,
};

/// A native call the null backend stands in for. Recorded in order, see
/// `SgfxDeviceNull::calls()`.
#[derive(Clone, Debug, PartialEq)]
pub enum SgfxNullCall {
    CreateBuffer {
        size: u64,
        bind_flags: SgfxBindFlags,
    },
    DestroyBuffer,
    UpdateBuffer {
        byte_offset: u64,
        size: u64,
    },
    ReadBuffer {
        byte_offset: u64,
        size: u64,
    },
    CopyBuffer {
        size: u64,
    },
    CreateTexture {
        width: u32,
        height: u32,
        format: SgfxFormat,
    },
    DestroyTexture,
    UpdateTexture {
        mip: u32,
        array_slice: u32,
    },
    CreateSampler,
    DestroySampler,
    CreateShader(SgfxShaderStage),
    DestroyShader,
    CreatePipelineState,
    DestroyPipelineState,
    CreateComputePipeline,
    DestroyComputePipeline,
    CreateSwapchain {
        buffer_count: u32,
    },
    DestroySwapchain,
    ResizeSwapchain {
        width: u32,
        height: u32,
    },
    Present,
    BeginRenderPass {
        color_targets: usize,
        has_depth: bool,
    },
    EndRenderPass,
    SetPipelineState(SgfxPipelineStateHandle),
    SetComputePipeline(SgfxComputePipelineHandle),
    /// One multi-slot bind of contiguous slots
    BindRun {
        stage: Option<SgfxShaderStage>,
        kind: SgfxBindingKind,
        first_slot: u32,
        count: u32,
    },
    SetVertexBuffers {
        first_slot: u32,
        count: u32,
    },
    SetIndexBuffer(SgfxIndexFormat),
    SetStencilReference(u32),
    SetBlendFactor([f32; 4]),
    Draw(SgfxDrawParams),
    Dispatch(SgfxDispatchParams),
    UavBarrier,
    ClearUnorderedAccessUint(SgfxResourceView, [u32; 4]),
    ClearUnorderedAccessFloat(SgfxResourceView, [f32; 4]),
    Flush,
    WaitIdle,
}

impl SgfxNullCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, SgfxNullCall::Draw(_))
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, SgfxNullCall::Dispatch(_))
    }

    pub fn is_bind_run(&self) -> bool {
        matches!(self, SgfxNullCall::BindRun { .. })
    }
}
