use super::{SgfxActiveRenderPass, SgfxBackendTypes, SgfxResourceTables};
use crate::{
    SgfxBufferDef, SgfxBufferHandle, SgfxComputePipelineDef, SgfxComputeQueue, SgfxDeviceInfo,
    SgfxDrawQueue, SgfxPipelineStateDef, SgfxRenderPassDef, SgfxResourceView, SgfxResult,
    SgfxSamplerDef, SgfxShaderDef, SgfxSubresourceData, SgfxSwapchainDef, SgfxSwapchainHandle,
    SgfxTextureDef, SgfxTextureHandle,
};
use raw_window_handle::HasRawWindowHandle;

/// Native half of a device. `SgfxDevice` validates every request and owns the handle tables'
/// bookkeeping; backends create and destroy native objects and translate submitted queues.
///
/// Creation functions return the native object and the caller inserts it into
/// `resources_mut()`. Destroy functions receive the native object after it has been removed.
/// Functions taking handles may assume the handles resolve.
pub(crate) trait SgfxBackend: SgfxBackendTypes + Sized {
    fn device_info(&self) -> &SgfxDeviceInfo;
    fn resources(&self) -> &SgfxResourceTables<Self>;
    fn resources_mut(&mut self) -> &mut SgfxResourceTables<Self>;

    fn create_buffer(
        &mut self,
        def: &SgfxBufferDef,
        initial_data: Option<&[u8]>,
    ) -> SgfxResult<Self::Buffer>;
    fn destroy_buffer(
        &mut self,
        buffer: Self::Buffer,
    );
    fn update_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[u8],
    ) -> SgfxResult<()>;
    fn read_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()>;
    fn copy_buffer(
        &mut self,
        src: SgfxBufferHandle,
        src_offset: u64,
        dst: SgfxBufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> SgfxResult<()>;

    fn create_texture(
        &mut self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<Self::Texture>;
    fn destroy_texture(
        &mut self,
        texture: Self::Texture,
    );
    fn update_texture(
        &mut self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
        data: &[u8],
        row_pitch: u32,
    ) -> SgfxResult<()>;

    fn create_sampler(
        &mut self,
        def: &SgfxSamplerDef,
    ) -> SgfxResult<Self::Sampler>;
    fn destroy_sampler(
        &mut self,
        sampler: Self::Sampler,
    );

    fn create_shader(
        &mut self,
        def: &SgfxShaderDef,
    ) -> SgfxResult<Self::Shader>;
    fn destroy_shader(
        &mut self,
        shader: Self::Shader,
    );

    fn create_pipeline_state(
        &mut self,
        def: &SgfxPipelineStateDef,
    ) -> SgfxResult<Self::PipelineState>;
    fn destroy_pipeline_state(
        &mut self,
        pipeline: Self::PipelineState,
    );

    fn create_compute_pipeline(
        &mut self,
        def: &SgfxComputePipelineDef,
    ) -> SgfxResult<Self::ComputePipeline>;
    fn destroy_compute_pipeline(
        &mut self,
        pipeline: Self::ComputePipeline,
    );

    /// Returns the swapchain and the native back buffers, in presentation order
    fn create_swapchain(
        &mut self,
        window: Option<&dyn HasRawWindowHandle>,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<(Self::Swapchain, Vec<Self::Texture>)>;
    fn destroy_swapchain(
        &mut self,
        swapchain: Self::Swapchain,
    );
    /// The old back buffers have already been destroyed
    fn resize_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<Self::Texture>>;
    /// Returns the index of the back buffer to render to next
    fn present(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<usize>;

    fn begin_render_pass(
        &mut self,
        def: &SgfxRenderPassDef,
        render_pass: &SgfxActiveRenderPass,
    ) -> SgfxResult<()>;
    fn end_render_pass(&mut self) -> SgfxResult<()>;
    fn submit_draw_queue(
        &mut self,
        queue: &SgfxDrawQueue,
    ) -> SgfxResult<()>;
    fn submit_compute_queue(
        &mut self,
        queue: &SgfxComputeQueue,
    ) -> SgfxResult<()>;

    fn clear_unordered_access_uint(
        &mut self,
        view: SgfxResourceView,
        values: [u32; 4],
    ) -> SgfxResult<()>;
    fn clear_unordered_access_float(
        &mut self,
        view: SgfxResourceView,
        values: [f32; 4],
    ) -> SgfxResult<()>;

    fn flush(&mut self) -> SgfxResult<()>;
    fn wait_idle(&mut self) -> SgfxResult<()>;
}
