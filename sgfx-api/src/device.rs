use crate::backends::null::SgfxDeviceNull;
#[cfg(all(windows, feature = "sgfx-dx11"))]
use crate::backends::dx11::SgfxDeviceDx11;
#[cfg(all(windows, feature = "sgfx-dx12"))]
use crate::backends::dx12::SgfxDeviceDx12;
#[cfg(feature = "sgfx-gl4")]
use crate::backends::gl4::SgfxDeviceGl4;
use crate::internal_shared::*;
use crate::*;
use raw_window_handle::HasRawWindowHandle;

pub(crate) enum SgfxDeviceBackend {
    Null(SgfxDeviceNull),
    #[cfg(feature = "sgfx-gl4")]
    Gl4(SgfxDeviceGl4),
    #[cfg(all(windows, feature = "sgfx-dx11"))]
    Dx11(SgfxDeviceDx11),
    #[cfg(all(windows, feature = "sgfx-dx12"))]
    Dx12(SgfxDeviceDx12),
}

// Expands `$body` once per backend with `$device` bound to the concrete backend
macro_rules! dispatch {
    ($backend:expr, $device:ident => $body:expr) => {
        match $backend {
            SgfxDeviceBackend::Null($device) => $body,
            #[cfg(feature = "sgfx-gl4")]
            SgfxDeviceBackend::Gl4($device) => $body,
            #[cfg(all(windows, feature = "sgfx-dx11"))]
            SgfxDeviceBackend::Dx11($device) => $body,
            #[cfg(all(windows, feature = "sgfx-dx12"))]
            SgfxDeviceBackend::Dx12($device) => $body,
        }
    };
}

/// Work submitted to a device, reset by `take_stats`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SgfxDeviceStats {
    pub render_passes: u32,
    pub draw_queues: u32,
    /// Draws issued to the native API, empty draws are not counted
    pub draws: u32,
    pub compute_queues: u32,
    pub dispatches: u32,
    pub presents: u32,
}

/// Creates resources and submits work. Obtained from `SgfxApi::device_mut()`.
///
/// Every request is validated before it reaches the backend: handles must be live, resources
/// must have been created with the bind flags their use requires, and draw queues may only be
/// submitted inside a render pass while compute queues and UAV clears may only be submitted
/// outside one.
pub struct SgfxDevice {
    backend: SgfxDeviceBackend,
    active_render_pass: Option<SgfxActiveRenderPass>,
    stats: SgfxDeviceStats,
}

fn release_all<B: SgfxBackend>(device: &mut B) {
    for (_, entry) in device.resources_mut().pipeline_states.drain() {
        device.destroy_pipeline_state(entry.native);
    }

    for (_, entry) in device.resources_mut().compute_pipelines.drain() {
        device.destroy_compute_pipeline(entry.native);
    }

    for (_, entry) in device.resources_mut().shaders.drain() {
        device.destroy_shader(entry.native);
    }

    for (_, entry) in device.resources_mut().samplers.drain() {
        device.destroy_sampler(entry.native);
    }

    // Back buffers are released before their swapchains
    for (_, entry) in device.resources_mut().textures.drain() {
        device.destroy_texture(entry.native);
    }

    for (_, entry) in device.resources_mut().swapchains.drain() {
        device.destroy_swapchain(entry.native);
    }

    for (_, entry) in device.resources_mut().buffers.drain() {
        device.destroy_buffer(entry.native);
    }
}

fn back_buffer_def(def: &SgfxSwapchainDef) -> SgfxTextureDef {
    SgfxTextureDef {
        width: def.width,
        height: def.height,
        format: def.format,
        bind_flags: SgfxBindFlags::RENDER_TARGET,
        ..Default::default()
    }
}

fn insert_back_buffers<B: SgfxBackend>(
    device: &mut B,
    swapchain: SgfxSwapchainHandle,
    def: &SgfxSwapchainDef,
    back_buffers: Vec<B::Texture>,
) -> SgfxResult<()> {
    let mut handles = Vec::with_capacity(back_buffers.len());
    for native in back_buffers {
        handles.push(device.resources_mut().insert_texture(SgfxTextureEntry {
            def: back_buffer_def(def),
            swapchain: Some(swapchain),
            native,
        })?);
    }

    let entry = device.resources_mut().swapchain_mut(swapchain)?;
    entry.def = def.clone();
    entry.back_buffers = handles;
    entry.current_back_buffer = 0;
    Ok(())
}

fn release_back_buffers<B: SgfxBackend>(
    device: &mut B,
    swapchain: SgfxSwapchainHandle,
) -> SgfxResult<()> {
    let swapchain_entry = device.resources_mut().swapchain_mut(swapchain)?;
    let back_buffers = std::mem::take(&mut swapchain_entry.back_buffers);
    for back_buffer in back_buffers {
        let entry = device.resources_mut().remove_texture(back_buffer)?;
        device.destroy_texture(entry.native);
    }

    Ok(())
}

impl SgfxDevice {
    pub(crate) fn new(backend: SgfxDeviceBackend) -> Self {
        SgfxDevice {
            backend,
            active_render_pass: None,
            stats: Default::default(),
        }
    }

    pub fn device_info(&self) -> &SgfxDeviceInfo {
        dispatch!(&self.backend, device => device.device_info())
    }

    pub fn backend_type(&self) -> SgfxBackendType {
        self.device_info().backend_type
    }

    /// The null backend, for inspecting its call log
    pub fn null_device(&self) -> Option<&SgfxDeviceNull> {
        match &self.backend {
            SgfxDeviceBackend::Null(device) => Some(device),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    pub fn null_device_mut(&mut self) -> Option<&mut SgfxDeviceNull> {
        match &mut self.backend {
            SgfxDeviceBackend::Null(device) => Some(device),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "sgfx-gl4")]
    pub fn gl4_device(&self) -> Option<&SgfxDeviceGl4> {
        match &self.backend {
            SgfxDeviceBackend::Gl4(device) => Some(device),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(all(windows, feature = "sgfx-dx11"))]
    pub fn dx11_device(&self) -> Option<&SgfxDeviceDx11> {
        match &self.backend {
            SgfxDeviceBackend::Dx11(device) => Some(device),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(all(windows, feature = "sgfx-dx12"))]
    pub fn dx12_device(&self) -> Option<&SgfxDeviceDx12> {
        match &self.backend {
            SgfxDeviceBackend::Dx12(device) => Some(device),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    pub fn live_resources(&self) -> SgfxLiveResources {
        dispatch!(&self.backend, device => device.resources().live_resources())
    }

    pub fn stats(&self) -> SgfxDeviceStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> SgfxDeviceStats {
        std::mem::take(&mut self.stats)
    }

    pub fn is_in_render_pass(&self) -> bool {
        self.active_render_pass.is_some()
    }

    fn require_outside_render_pass(
        &self,
        operation: &str,
    ) -> SgfxResult<()> {
        if self.active_render_pass.is_some() {
            return Err(format!("{} is not allowed inside a render pass", operation).into());
        }

        Ok(())
    }

    //
    // Buffers
    //

    pub fn create_buffer(
        &mut self,
        def: &SgfxBufferDef,
        initial_data: Option<&[u8]>,
    ) -> SgfxResult<SgfxBufferHandle> {
        profiling::scope!("create_buffer");
        def.verify()?;
        def.verify_initial_data(initial_data)?;

        dispatch!(&mut self.backend, device => {
            device.resources().ensure_capacity(SgfxHandleKind::Buffer, 1)?;
            let native = device.create_buffer(def, initial_data)?;
            device.resources_mut().insert_buffer(SgfxBufferEntry {
                def: def.clone(),
                native,
            })
        })
    }

    /// Creates a buffer initialized with a slice of plain-old-data values
    pub fn create_buffer_with_data<T: bytemuck::Pod>(
        &mut self,
        def: &SgfxBufferDef,
        data: &[T],
    ) -> SgfxResult<SgfxBufferHandle> {
        self.create_buffer(def, Some(bytemuck::cast_slice(data)))
    }

    pub fn destroy_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            let entry = device.resources_mut().remove_buffer(buffer)?;
            device.destroy_buffer(entry.native);
        });

        Ok(())
    }

    pub fn buffer_def(
        &self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<&SgfxBufferDef> {
        dispatch!(&self.backend, device => Ok(&device.resources().buffer(buffer)?.def))
    }

    /// Writes bytes into a default, dynamic or staging buffer
    pub fn update_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[u8],
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            validate_buffer_update(device.resources(), buffer, byte_offset, data.len() as u64)?;
            device.update_buffer(buffer, byte_offset, data)
        })
    }

    pub fn update_buffer_data<T: bytemuck::Pod>(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[T],
    ) -> SgfxResult<()> {
        self.update_buffer(buffer, byte_offset, bytemuck::cast_slice(data))
    }

    /// Reads a staging buffer, waiting for pending GPU work that writes it
    pub fn read_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()> {
        self.require_outside_render_pass("reading a buffer")?;
        dispatch!(&mut self.backend, device => {
            validate_buffer_read(device.resources(), buffer, byte_offset, out.len() as u64)?;
            device.read_buffer(buffer, byte_offset, out)
        })
    }

    pub fn read_buffer_data<T: bytemuck::Pod>(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [T],
    ) -> SgfxResult<()> {
        self.read_buffer(buffer, byte_offset, bytemuck::cast_slice_mut(out))
    }

    pub fn copy_buffer(
        &mut self,
        src: SgfxBufferHandle,
        src_offset: u64,
        dst: SgfxBufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> SgfxResult<()> {
        self.require_outside_render_pass("copying a buffer")?;
        dispatch!(&mut self.backend, device => {
            validate_buffer_copy(device.resources(), src, src_offset, dst, dst_offset, size)?;
            device.copy_buffer(src, src_offset, dst, dst_offset, size)
        })
    }

    //
    // Textures
    //

    /// `initial_data` is empty or holds every subresource, ordered by array slice then mip
    pub fn create_texture(
        &mut self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<SgfxTextureHandle> {
        profiling::scope!("create_texture");
        def.verify()?;
        validate_texture_initial_data(def, initial_data)?;

        dispatch!(&mut self.backend, device => {
            device.resources().ensure_capacity(SgfxHandleKind::Texture, 1)?;
            let native = device.create_texture(def, initial_data)?;
            device.resources_mut().insert_texture(SgfxTextureEntry {
                def: def.clone(),
                swapchain: None,
                native,
            })
        })
    }

    pub fn destroy_texture(
        &mut self,
        texture: SgfxTextureHandle,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            if device.resources().texture(texture)?.swapchain.is_some() {
                return Err("swapchain back buffers are destroyed with their swapchain".into());
            }

            let entry = device.resources_mut().remove_texture(texture)?;
            device.destroy_texture(entry.native);
        });

        Ok(())
    }

    pub fn texture_def(
        &self,
        texture: SgfxTextureHandle,
    ) -> SgfxResult<&SgfxTextureDef> {
        dispatch!(&self.backend, device => Ok(&device.resources().texture(texture)?.def))
    }

    /// Replaces one subresource of a default or dynamic texture
    pub fn update_texture(
        &mut self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
        data: &[u8],
        row_pitch: u32,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            validate_texture_update(
                device.resources(),
                texture,
                mip,
                array_slice,
                data,
                row_pitch,
            )?;
            device.update_texture(texture, mip, array_slice, data, row_pitch)
        })
    }

    //
    // Samplers and shaders
    //

    pub fn create_sampler(
        &mut self,
        def: &SgfxSamplerDef,
    ) -> SgfxResult<SgfxSamplerHandle> {
        def.verify()?;

        dispatch!(&mut self.backend, device => {
            device.resources().ensure_capacity(SgfxHandleKind::Sampler, 1)?;
            let native = device.create_sampler(def)?;
            device.resources_mut().insert_sampler(SgfxSamplerEntry {
                def: def.clone(),
                native,
            })
        })
    }

    pub fn destroy_sampler(
        &mut self,
        sampler: SgfxSamplerHandle,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            let entry = device.resources_mut().remove_sampler(sampler)?;
            device.destroy_sampler(entry.native);
        });

        Ok(())
    }

    pub fn create_shader(
        &mut self,
        def: &SgfxShaderDef,
    ) -> SgfxResult<SgfxShaderHandle> {
        profiling::scope!("create_shader");
        def.verify()?;

        dispatch!(&mut self.backend, device => {
            device.resources().ensure_capacity(SgfxHandleKind::Shader, 1)?;
            let native = device.create_shader(def)?;
            device.resources_mut().insert_shader(SgfxShaderEntry {
                stage: def.stage,
                native,
            })
        })
    }

    /// Pipelines created from the shader stay valid
    pub fn destroy_shader(
        &mut self,
        shader: SgfxShaderHandle,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            let entry = device.resources_mut().remove_shader(shader)?;
            device.destroy_shader(entry.native);
        });

        Ok(())
    }

    //
    // Pipelines
    //

    pub fn create_pipeline_state(
        &mut self,
        def: &SgfxPipelineStateDef,
    ) -> SgfxResult<SgfxPipelineStateHandle> {
        profiling::scope!("create_pipeline_state");

        dispatch!(&mut self.backend, device => {
            validate_pipeline_state(device.resources(), def)?;
            device.resources().ensure_capacity(SgfxHandleKind::PipelineState, 1)?;
            let native = device.create_pipeline_state(def)?;
            device.resources_mut().insert_pipeline_state(SgfxPipelineStateEntry {
                def: def.clone(),
                native,
            })
        })
    }

    pub fn destroy_pipeline_state(
        &mut self,
        pipeline: SgfxPipelineStateHandle,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            let entry = device.resources_mut().remove_pipeline_state(pipeline)?;
            device.destroy_pipeline_state(entry.native);
        });

        Ok(())
    }

    pub fn pipeline_state_def(
        &self,
        pipeline: SgfxPipelineStateHandle,
    ) -> SgfxResult<&SgfxPipelineStateDef> {
        dispatch!(&self.backend, device => Ok(&device.resources().pipeline_state(pipeline)?.def))
    }

    pub fn create_compute_pipeline(
        &mut self,
        def: &SgfxComputePipelineDef,
    ) -> SgfxResult<SgfxComputePipelineHandle> {
        profiling::scope!("create_compute_pipeline");

        dispatch!(&mut self.backend, device => {
            validate_compute_pipeline(device.resources(), def)?;
            device.resources().ensure_capacity(SgfxHandleKind::ComputePipeline, 1)?;
            let native = device.create_compute_pipeline(def)?;
            device.resources_mut().insert_compute_pipeline(SgfxComputePipelineEntry {
                shader: def.compute_shader,
                native,
            })
        })
    }

    pub fn destroy_compute_pipeline(
        &mut self,
        pipeline: SgfxComputePipelineHandle,
    ) -> SgfxResult<()> {
        dispatch!(&mut self.backend, device => {
            let entry = device.resources_mut().remove_compute_pipeline(pipeline)?;
            device.destroy_compute_pipeline(entry.native);
        });

        Ok(())
    }

    //
    // Swapchains
    //

    /// `window` may be None for backends that present to a surface owned by the host (gl4 and
    /// null)
    pub fn create_swapchain(
        &mut self,
        window: Option<&dyn HasRawWindowHandle>,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<SgfxSwapchainHandle> {
        def.verify()?;

        dispatch!(&mut self.backend, device => {
            device.resources().ensure_capacity(SgfxHandleKind::Swapchain, 1)?;
            device
                .resources()
                .ensure_capacity(SgfxHandleKind::Texture, def.buffer_count as usize)?;

            let (native, back_buffers) = device.create_swapchain(window, def)?;
            let swapchain = device.resources_mut().insert_swapchain(SgfxSwapchainEntry {
                def: def.clone(),
                back_buffers: Vec::default(),
                current_back_buffer: 0,
                native,
            })?;
            insert_back_buffers(device, swapchain, def, back_buffers)?;

            log::debug!(
                "Created {}x{} swapchain with {} back buffers",
                def.width,
                def.height,
                def.buffer_count
            );
            Ok(swapchain)
        })
    }

    pub fn destroy_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<()> {
        self.require_outside_render_pass("destroying a swapchain")?;
        dispatch!(&mut self.backend, device => {
            release_back_buffers(device, swapchain)?;
            let entry = device.resources_mut().remove_swapchain(swapchain)?;
            device.destroy_swapchain(entry.native);
        });

        Ok(())
    }

    /// The back buffer to render into this frame. Changes after every `present`.
    pub fn swapchain_texture(
        &self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<SgfxTextureHandle> {
        dispatch!(&self.backend, device => {
            Ok(device.resources().swapchain(swapchain)?.current_texture())
        })
    }

    pub fn swapchain_def(
        &self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<&SgfxSwapchainDef> {
        dispatch!(&self.backend, device => Ok(&device.resources().swapchain(swapchain)?.def))
    }

    /// Recreates the back buffers. Their handles change.
    pub fn resize_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
        width: u32,
        height: u32,
    ) -> SgfxResult<()> {
        self.require_outside_render_pass("resizing a swapchain")?;
        dispatch!(&mut self.backend, device => {
            let def = SgfxSwapchainDef {
                width,
                height,
                ..device.resources().swapchain(swapchain)?.def.clone()
            };
            def.verify()?;

            release_back_buffers(device, swapchain)?;
            let back_buffers = device.resize_swapchain(swapchain, &def)?;
            insert_back_buffers(device, swapchain, &def, back_buffers)?;
            log::debug!("Resized swapchain to {}x{}", width, height);
            Ok(())
        })
    }

    pub fn present(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<()> {
        profiling::scope!("present");
        self.require_outside_render_pass("present")?;
        dispatch!(&mut self.backend, device => {
            device.resources().swapchain(swapchain)?;
            let next = device.present(swapchain)?;
            device.resources_mut().swapchain_mut(swapchain)?.current_back_buffer = next;
        });

        self.stats.presents += 1;
        Ok(())
    }

    //
    // Frame
    //

    pub fn begin_render_pass(
        &mut self,
        def: &SgfxRenderPassDef,
    ) -> SgfxResult<()> {
        if self.active_render_pass.is_some() {
            return Err("begin_render_pass called while a render pass is already active".into());
        }

        let render_pass = dispatch!(&mut self.backend, device => {
            let render_pass = validate_render_pass(device.resources(), def)?;
            device.begin_render_pass(def, &render_pass)?;
            render_pass
        });

        self.active_render_pass = Some(render_pass);
        self.stats.render_passes += 1;
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> SgfxResult<()> {
        if self.active_render_pass.is_none() {
            return Err("end_render_pass called without an active render pass".into());
        }

        dispatch!(&mut self.backend, device => device.end_render_pass())?;
        self.active_render_pass = None;
        Ok(())
    }

    /// Replays the queue into the active render pass. The queue is left intact.
    pub fn submit_draw_queue(
        &mut self,
        queue: &SgfxDrawQueue,
    ) -> SgfxResult<()> {
        profiling::scope!("submit_draw_queue");

        let render_pass = self
            .active_render_pass
            .as_ref()
            .ok_or("draw queues can only be submitted inside a render pass")?;

        if queue.has_pending_state() {
            log::warn!("State set after the last draw of a draw queue is not submitted");
        }

        dispatch!(&mut self.backend, device => {
            validate_draw_queue(device.resources(), queue, render_pass)?;
            device.submit_draw_queue(queue)?;
        });

        self.stats.draw_queues += 1;
        self.stats.draws += queue
            .commands()
            .iter()
            .filter(|command| !command.params.is_empty())
            .count() as u32;
        Ok(())
    }

    /// Replays the queue, then makes its UAV writes visible to later work
    pub fn submit_compute_queue(
        &mut self,
        queue: &SgfxComputeQueue,
    ) -> SgfxResult<()> {
        profiling::scope!("submit_compute_queue");
        self.require_outside_render_pass("submitting a compute queue")?;

        if queue.has_pending_state() {
            log::warn!("State set after the last dispatch of a compute queue is not submitted");
        }

        dispatch!(&mut self.backend, device => {
            validate_compute_queue(device.resources(), queue)?;
            device.submit_compute_queue(queue)?;
        });

        self.stats.compute_queues += 1;
        self.stats.dispatches += queue
            .commands()
            .iter()
            .filter(|command| !command.params.is_empty())
            .count() as u32;
        Ok(())
    }

    pub fn clear_unordered_access_uint<V: Into<SgfxResourceView>>(
        &mut self,
        view: V,
        values: [u32; 4],
    ) -> SgfxResult<()> {
        self.require_outside_render_pass("clearing a UAV")?;
        let view = view.into();
        dispatch!(&mut self.backend, device => {
            validate_uav_clear(device.resources(), view)?;
            device.clear_unordered_access_uint(view, values)
        })
    }

    pub fn clear_unordered_access_float<V: Into<SgfxResourceView>>(
        &mut self,
        view: V,
        values: [f32; 4],
    ) -> SgfxResult<()> {
        self.require_outside_render_pass("clearing a UAV")?;
        let view = view.into();
        dispatch!(&mut self.backend, device => {
            validate_uav_clear(device.resources(), view)?;
            device.clear_unordered_access_float(view, values)
        })
    }

    /// Hands recorded work to the GPU without waiting for it
    pub fn flush(&mut self) -> SgfxResult<()> {
        self.require_outside_render_pass("flush")?;
        dispatch!(&mut self.backend, device => device.flush())
    }

    pub fn wait_idle(&mut self) -> SgfxResult<()> {
        self.require_outside_render_pass("wait_idle")?;
        dispatch!(&mut self.backend, device => device.wait_idle())
    }

    /// Ends any open render pass, waits for the GPU and releases every object. Returns what was
    /// still alive.
    pub(crate) fn release(&mut self) -> SgfxLiveResources {
        if self.active_render_pass.is_some() {
            log::warn!("Device destroyed inside a render pass");
            if let Err(e) = self.end_render_pass() {
                log::error!("Failed to end the render pass: {}", e);
            }
            self.active_render_pass = None;
        }

        if let Err(e) = dispatch!(&mut self.backend, device => device.wait_idle()) {
            log::error!("Failed to wait for the device to idle: {}", e);
        }

        let live = self.live_resources();
        dispatch!(&mut self.backend, device => release_all(device));
        live
    }
}
