//! Headless backend. Keeps buffer and texture contents in memory and records the native calls a
//! D3D11-style device would make, so the whole API can be exercised without a GPU.

mod call_log;
pub use call_log::SgfxNullCall;

use crate::binding::{SgfxBinding, SgfxBindingKind, SgfxIndexBufferBinding, SgfxVertexBufferBinding};
use crate::internal_shared::*;
use crate::*;
use raw_window_handle::HasRawWindowHandle;

pub struct SgfxNullBuffer {
    contents: Vec<u8>,
}

pub struct SgfxNullTexture {
    // Tightly packed, ordered by array slice then mip
    subresources: Vec<Vec<u8>>,
}

pub struct SgfxNullSwapchain {
    buffer_count: u32,
    current_back_buffer: u32,
}

// Channels in memory order, as indices into the RGBA clear values
fn memory_channel_order(format: SgfxFormat) -> &'static [usize] {
    match format.channel_count() {
        1 => &[0],
        2 => &[0, 1],
        3 => &[0, 1, 2],
        _ => match format {
            SgfxFormat::B8G8R8A8Unorm | SgfxFormat::B8G8R8A8UnormSrgb => &[2, 1, 0, 3],
            _ => &[0, 1, 2, 3],
        },
    }
}

fn pack_bit_fields(
    widths: &[u32],
    values: [u32; 4],
) -> Vec<u8> {
    let mut packed = 0u32;
    let mut shift = 0;
    for (&width, &value) in widths.iter().zip(values.iter()) {
        packed |= (value & ((1u32 << width) - 1)) << shift;
        shift += width;
    }
    packed.to_le_bytes().to_vec()
}

/// One texel of `format` cleared to `values`. The low bits of each value fill one channel.
fn uav_clear_texel_uint(
    format: SgfxFormat,
    values: [u32; 4],
) -> Vec<u8> {
    match format {
        SgfxFormat::R10G10B10A2Unorm => pack_bit_fields(&[10, 10, 10, 2], values),
        SgfxFormat::R11G11B10Float => pack_bit_fields(&[11, 11, 10], values),
        _ => {
            let order = memory_channel_order(format);
            let channel_size = format.block_size_in_bytes() as usize / order.len();
            order
                .iter()
                .flat_map(|&channel| values[channel].to_le_bytes()[..channel_size].to_vec())
                .collect()
        }
    }
}

/// One texel of `format` cleared to `values`, converted the way a shader store would
fn uav_clear_texel_float(
    format: SgfxFormat,
    values: [f32; 4],
) -> Vec<u8> {
    let unorm = |value: f32, max: u32| (value.max(0.0).min(1.0) * max as f32).round() as u32;

    if format.is_integer() {
        return uav_clear_texel_uint(format, values.map(|value| value as u32));
    }

    match format {
        SgfxFormat::R10G10B10A2Unorm => pack_bit_fields(
            &[10, 10, 10, 2],
            [
                unorm(values[0], 1023),
                unorm(values[1], 1023),
                unorm(values[2], 1023),
                unorm(values[3], 3),
            ],
        ),
        SgfxFormat::R11G11B10Float => {
            // Small floats keep the top bits of the half float encoding, minus the sign
            let small_float = |value: f32, width: u32| {
                let bits = half::f16::from_f32(value.max(0.0)).to_bits() as u32;
                bits >> (15 - width)
            };
            pack_bit_fields(
                &[11, 11, 10],
                [
                    small_float(values[0], 11),
                    small_float(values[1], 11),
                    small_float(values[2], 10),
                    0,
                ],
            )
        }
        _ => {
            let order = memory_channel_order(format);
            let channel_size = format.block_size_in_bytes() as usize / order.len();
            order
                .iter()
                .flat_map(|&channel| {
                    let value = values[channel];
                    match (format.is_normalized(), channel_size) {
                        (true, 1) => vec![unorm(value, u8::MAX as u32) as u8],
                        (true, _) => {
                            (unorm(value, u16::MAX as u32) as u16).to_le_bytes().to_vec()
                        }
                        (false, 2) => half::f16::from_f32(value).to_le_bytes().to_vec(),
                        (false, _) => value.to_le_bytes().to_vec(),
                    }
                })
                .collect()
        }
    }
}

/// Packs one subresource from pitched source data
fn pack_subresource(
    def: &SgfxTextureDef,
    mip: u32,
    data: &[u8],
    row_pitch: u32,
    slice_pitch: u32,
) -> Vec<u8> {
    let (width, height, depth) = def.mip_extents(mip);
    let packed_row = (width * def.format.block_size_in_bytes()) as usize;

    let mut packed = Vec::with_capacity(packed_row * (height * depth) as usize);
    for z in 0..depth as usize {
        for y in 0..height as usize {
            let start = z * slice_pitch as usize + y * row_pitch as usize;
            packed.extend_from_slice(&data[start..start + packed_row]);
        }
    }

    packed
}

struct SgfxNullEncoder<'a> {
    calls: &'a mut Vec<SgfxNullCall>,
}

impl<'a> SgfxCommandEncoder for SgfxNullEncoder<'a> {
    fn bind_run(
        &mut self,
        stage: Option<SgfxShaderStage>,
        kind: SgfxBindingKind,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::BindRun {
            stage,
            kind,
            first_slot: run[0].slot,
            count: run.len() as u32,
        });
        Ok(())
    }

    fn set_vertex_buffers(
        &mut self,
        run: &[SgfxVertexBufferBinding],
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::SetVertexBuffers {
            first_slot: run[0].slot,
            count: run.len() as u32,
        });
        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        binding: &SgfxIndexBufferBinding,
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::SetIndexBuffer(binding.format));
        Ok(())
    }

    fn set_stencil_reference(
        &mut self,
        reference: u32,
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::SetStencilReference(reference));
        Ok(())
    }

    fn set_blend_factor(
        &mut self,
        factor: [f32; 4],
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::SetBlendFactor(factor));
        Ok(())
    }

    fn draw(
        &mut self,
        params: &SgfxDrawParams,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::Draw(*params));
        Ok(())
    }

    fn dispatch(
        &mut self,
        params: &SgfxDispatchParams,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::Dispatch(*params));
        Ok(())
    }
}

pub struct SgfxDeviceNull {
    device_info: SgfxDeviceInfo,
    resources: SgfxResourceTables<SgfxDeviceNull>,
    calls: Vec<SgfxNullCall>,
}

impl SgfxBackendTypes for SgfxDeviceNull {
    type Buffer = SgfxNullBuffer;
    type Texture = SgfxNullTexture;
    type Sampler = ();
    type Shader = ();
    type PipelineState = ();
    type ComputePipeline = ();
    type Swapchain = SgfxNullSwapchain;
}

impl SgfxDeviceNull {
    pub(crate) fn new(api_def: &SgfxApiDef) -> SgfxResult<Self> {
        log::debug!("Initializing null backend");

        Ok(SgfxDeviceNull {
            device_info: SgfxDeviceInfo {
                backend_type: SgfxBackendType::Null,
                adapter_name: "null".to_string(),
                constant_buffer_alignment: 16,
                upload_row_pitch_alignment: 1,
                max_texture_dimension_2d: 16384,
                supports_pixel_shader_uavs: true,
            },
            resources: SgfxResourceTables::new(api_def),
            calls: Vec::default(),
        })
    }

    /// Every call made since the device was created or the log was last taken
    pub fn calls(&self) -> &[SgfxNullCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<SgfxNullCall> {
        std::mem::take(&mut self.calls)
    }

    /// Current contents of a buffer
    pub fn buffer_contents(
        &self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<&[u8]> {
        Ok(&self.resources.buffer(buffer)?.native.contents)
    }

    /// Current contents of one subresource, tightly packed. Empty if never written.
    pub fn texture_contents(
        &self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
    ) -> SgfxResult<&[u8]> {
        let entry = self.resources.texture(texture)?;
        let index = (array_slice * entry.def.mip_count + mip) as usize;
        Ok(entry
            .native
            .subresources
            .get(index)
            .map(|contents| contents.as_slice())
            .unwrap_or(&[]))
    }

    fn buffer_contents_mut(
        &mut self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<&mut Vec<u8>> {
        Ok(&mut self.resources.buffer_mut(buffer)?.native.contents)
    }

    // Buffer views are typeless 32 bit, so buffers repeat `buffer_pattern` and textures repeat
    // the texel built for their format
    fn fill_unordered_access(
        &mut self,
        view: SgfxResourceView,
        buffer_pattern: [u8; 4],
        texel: impl Fn(SgfxFormat) -> Vec<u8>,
    ) -> SgfxResult<()> {
        match view {
            SgfxResourceView::Buffer(buffer) => {
                for (index, byte) in self.buffer_contents_mut(buffer)?.iter_mut().enumerate() {
                    *byte = buffer_pattern[index % 4];
                }
            }
            SgfxResourceView::Texture(texture) => {
                let entry = self.resources.texture_mut(texture)?;
                let subresource_count = entry.def.subresource_count() as usize;
                let mip_count = entry.def.mip_count;
                let def = entry.def.clone();
                let pattern = texel(def.format);
                if pattern.is_empty() {
                    return Err(format!("{:?} textures cannot be cleared", def.format).into());
                }

                entry.native.subresources = (0..subresource_count)
                    .map(|index| {
                        let size = def.mip_size_in_bytes(index as u32 % mip_count) as usize;
                        pattern.iter().copied().cycle().take(size).collect()
                    })
                    .collect();
            }
        }

        Ok(())
    }
}

impl SgfxBackend for SgfxDeviceNull {
    fn device_info(&self) -> &SgfxDeviceInfo {
        &self.device_info
    }

    fn resources(&self) -> &SgfxResourceTables<Self> {
        &self.resources
    }

    fn resources_mut(&mut self) -> &mut SgfxResourceTables<Self> {
        &mut self.resources
    }

    fn create_buffer(
        &mut self,
        def: &SgfxBufferDef,
        initial_data: Option<&[u8]>,
    ) -> SgfxResult<SgfxNullBuffer> {
        self.calls.push(SgfxNullCall::CreateBuffer {
            size: def.size,
            bind_flags: def.bind_flags,
        });

        let mut contents = vec![0; def.size as usize];
        if let Some(data) = initial_data {
            contents[..data.len()].copy_from_slice(data);
        }

        Ok(SgfxNullBuffer { contents })
    }

    fn destroy_buffer(
        &mut self,
        _buffer: SgfxNullBuffer,
    ) {
        self.calls.push(SgfxNullCall::DestroyBuffer);
    }

    fn update_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[u8],
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::UpdateBuffer {
            byte_offset,
            size: data.len() as u64,
        });

        let start = byte_offset as usize;
        self.buffer_contents_mut(buffer)?[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::ReadBuffer {
            byte_offset,
            size: out.len() as u64,
        });

        let start = byte_offset as usize;
        out.copy_from_slice(&self.buffer_contents(buffer)?[start..start + out.len()]);
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        src: SgfxBufferHandle,
        src_offset: u64,
        dst: SgfxBufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::CopyBuffer { size });

        let src_start = src_offset as usize;
        let copied = self.buffer_contents(src)?[src_start..src_start + size as usize].to_vec();
        let dst_start = dst_offset as usize;
        self.buffer_contents_mut(dst)?[dst_start..dst_start + copied.len()]
            .copy_from_slice(&copied);
        Ok(())
    }

    fn create_texture(
        &mut self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<SgfxNullTexture> {
        self.calls.push(SgfxNullCall::CreateTexture {
            width: def.width,
            height: def.height,
            format: def.format,
        });

        let subresources = initial_data
            .iter()
            .enumerate()
            .map(|(index, subresource)| {
                pack_subresource(
                    def,
                    index as u32 % def.mip_count,
                    subresource.data,
                    subresource.row_pitch,
                    subresource.slice_pitch,
                )
            })
            .collect();

        Ok(SgfxNullTexture { subresources })
    }

    fn destroy_texture(
        &mut self,
        _texture: SgfxNullTexture,
    ) {
        self.calls.push(SgfxNullCall::DestroyTexture);
    }

    fn update_texture(
        &mut self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
        data: &[u8],
        row_pitch: u32,
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::UpdateTexture { mip, array_slice });

        let entry = self.resources.texture_mut(texture)?;
        let (_, height, _) = entry.def.mip_extents(mip);
        let packed = pack_subresource(&entry.def, mip, data, row_pitch, row_pitch * height);

        let subresource_count = entry.def.subresource_count() as usize;
        let subresources = &mut entry.native.subresources;
        if subresources.len() < subresource_count {
            subresources.resize(subresource_count, Vec::default());
        }
        subresources[(array_slice * entry.def.mip_count + mip) as usize] = packed;
        Ok(())
    }

    fn create_sampler(
        &mut self,
        _def: &SgfxSamplerDef,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::CreateSampler);
        Ok(())
    }

    fn destroy_sampler(
        &mut self,
        _sampler: (),
    ) {
        self.calls.push(SgfxNullCall::DestroySampler);
    }

    fn create_shader(
        &mut self,
        def: &SgfxShaderDef,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::CreateShader(def.stage));
        Ok(())
    }

    fn destroy_shader(
        &mut self,
        _shader: (),
    ) {
        self.calls.push(SgfxNullCall::DestroyShader);
    }

    fn create_pipeline_state(
        &mut self,
        _def: &SgfxPipelineStateDef,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::CreatePipelineState);
        Ok(())
    }

    fn destroy_pipeline_state(
        &mut self,
        _pipeline: (),
    ) {
        self.calls.push(SgfxNullCall::DestroyPipelineState);
    }

    fn create_compute_pipeline(
        &mut self,
        _def: &SgfxComputePipelineDef,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::CreateComputePipeline);
        Ok(())
    }

    fn destroy_compute_pipeline(
        &mut self,
        _pipeline: (),
    ) {
        self.calls
            .push(SgfxNullCall::DestroyComputePipeline);
    }

    fn create_swapchain(
        &mut self,
        _window: Option<&dyn HasRawWindowHandle>,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<(SgfxNullSwapchain, Vec<SgfxNullTexture>)> {
        self.calls.push(SgfxNullCall::CreateSwapchain {
            buffer_count: def.buffer_count,
        });

        let back_buffers = (0..def.buffer_count)
            .map(|_| SgfxNullTexture {
                subresources: Vec::default(),
            })
            .collect();

        Ok((
            SgfxNullSwapchain {
                buffer_count: def.buffer_count,
                current_back_buffer: 0,
            },
            back_buffers,
        ))
    }

    fn destroy_swapchain(
        &mut self,
        _swapchain: SgfxNullSwapchain,
    ) {
        self.calls.push(SgfxNullCall::DestroySwapchain);
    }

    fn resize_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<SgfxNullTexture>> {
        self.calls.push(SgfxNullCall::ResizeSwapchain {
            width: def.width,
            height: def.height,
        });

        let native = &mut self.resources.swapchain_mut(swapchain)?.native;
        native.current_back_buffer = 0;
        Ok((0..native.buffer_count)
            .map(|_| SgfxNullTexture {
                subresources: Vec::default(),
            })
            .collect())
    }

    fn present(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<usize> {
        self.calls.push(SgfxNullCall::Present);

        let native = &mut self.resources.swapchain_mut(swapchain)?.native;
        native.current_back_buffer = (native.current_back_buffer + 1) % native.buffer_count;
        Ok(native.current_back_buffer as usize)
    }

    fn begin_render_pass(
        &mut self,
        def: &SgfxRenderPassDef,
        _render_pass: &SgfxActiveRenderPass,
    ) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::BeginRenderPass {
            color_targets: def.color_targets.len(),
            has_depth: def.depth_target.is_some(),
        });
        Ok(())
    }

    fn end_render_pass(&mut self) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::EndRenderPass);
        Ok(())
    }

    fn submit_draw_queue(
        &mut self,
        queue: &SgfxDrawQueue,
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::SetPipelineState(queue.pipeline()));

        let mut encoder = SgfxNullEncoder {
            calls: &mut self.calls,
        };
        replay_draw_queue(&mut encoder, queue, SgfxBindingModel::PerStage)
    }

    fn submit_compute_queue(
        &mut self,
        queue: &SgfxComputeQueue,
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::SetComputePipeline(queue.pipeline()));

        let mut encoder = SgfxNullEncoder {
            calls: &mut self.calls,
        };
        replay_compute_queue(&mut encoder, queue, SgfxBindingModel::PerStage)?;
        self.calls.push(SgfxNullCall::UavBarrier);
        Ok(())
    }

    fn clear_unordered_access_uint(
        &mut self,
        view: SgfxResourceView,
        values: [u32; 4],
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::ClearUnorderedAccessUint(view, values));
        self.fill_unordered_access(view, values[0].to_le_bytes(), |format| {
            uav_clear_texel_uint(format, values)
        })
    }

    fn clear_unordered_access_float(
        &mut self,
        view: SgfxResourceView,
        values: [f32; 4],
    ) -> SgfxResult<()> {
        self.calls
            .push(SgfxNullCall::ClearUnorderedAccessFloat(view, values));
        self.fill_unordered_access(view, values[0].to_le_bytes(), |format| {
            uav_clear_texel_float(format, values)
        })
    }

    fn flush(&mut self) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::Flush);
        Ok(())
    }

    fn wait_idle(&mut self) -> SgfxResult<()> {
        self.calls.push(SgfxNullCall::WaitIdle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn null_api() -> SgfxApi {
        SgfxApi::new_null(&Default::default()).unwrap()
    }

    fn create_shader(
        device: &mut SgfxDevice,
        stage: SgfxShaderStage,
    ) -> SgfxShaderHandle {
        device
            .create_shader(&SgfxShaderDef {
                stage,
                entry_point: "main".to_string(),
                code: SgfxShaderCode::Opaque(vec![1, 2, 3, 4]),
                debug_name: None,
            })
            .unwrap()
    }

    struct TestPass {
        color: SgfxTextureHandle,
        depth: SgfxTextureHandle,
        pipeline: SgfxPipelineStateHandle,
        shaders: Vec<SgfxShaderHandle>,
    }

    impl TestPass {
        fn new(device: &mut SgfxDevice) -> Self {
            let color = device
                .create_texture(
                    &SgfxTextureDef::for_render_target(64, 64, SgfxFormat::R8G8B8A8Unorm),
                    &[],
                )
                .unwrap();
            let depth = device
                .create_texture(
                    &SgfxTextureDef::for_depth_stencil(64, 64, SgfxFormat::D32Float),
                    &[],
                )
                .unwrap();

            let vs = create_shader(device, SgfxShaderStage::Vertex);
            let ps = create_shader(device, SgfxShaderStage::Pixel);
            let mut def = SgfxPipelineStateDef::new(vs, Some(ps));
            def.color_formats = vec![SgfxFormat::R8G8B8A8Unorm];
            def.depth_format = Some(SgfxFormat::D32Float);
            let pipeline = device.create_pipeline_state(&def).unwrap();

            TestPass {
                color,
                depth,
                pipeline,
                shaders: vec![vs, ps],
            }
        }

        fn render_pass_def(&self) -> SgfxRenderPassDef {
            SgfxRenderPassDef {
                color_targets: vec![SgfxColorTarget::cleared(self.color, [0.0; 4])],
                depth_target: Some(SgfxDepthTarget::cleared(self.depth)),
                viewport: None,
            }
        }

        fn destroy(
            self,
            device: &mut SgfxDevice,
        ) {
            device.destroy_pipeline_state(self.pipeline).unwrap();
            for shader in self.shaders {
                device.destroy_shader(shader).unwrap();
            }
            device.destroy_texture(self.color).unwrap();
            device.destroy_texture(self.depth).unwrap();
        }
    }

    #[test]
    fn test_buffer_contents() {
        let mut api = null_api();
        let device = api.device_mut();

        let upload = device
            .create_buffer_with_data(
                &SgfxBufferDef {
                    size: 16,
                    usage: SgfxUsage::Dynamic,
                    bind_flags: SgfxBindFlags::SHADER_RESOURCE,
                    flags: SgfxBufferFlags::RAW,
                    structure_stride: 0,
                },
                &[1u32, 2, 3, 4],
            )
            .unwrap();
        device.update_buffer_data(upload, 4, &[20u32]).unwrap();

        let staging = device
            .create_buffer(&SgfxBufferDef::for_staging_buffer(16), None)
            .unwrap();
        device.copy_buffer(upload, 0, staging, 0, 16).unwrap();

        let mut values = [0u32; 4];
        device.read_buffer_data(staging, 0, &mut values).unwrap();
        assert_eq!(values, [1, 20, 3, 4]);

        // Only staging buffers can be read
        assert!(device.read_buffer(upload, 0, &mut [0; 4]).is_err());
        // Out of range
        assert!(device.update_buffer(upload, 12, &[0; 8]).is_err());

        device.destroy_buffer(upload).unwrap();
        device.destroy_buffer(staging).unwrap();
        assert!(matches!(
            device.destroy_buffer(upload),
            Err(SgfxError::InvalidHandle(SgfxHandleKind::Buffer))
        ));

        api.destroy().unwrap();
    }

    #[test]
    fn test_immutable_buffer_requires_data() {
        let mut api = null_api();
        let device = api.device_mut();

        assert!(device
            .create_buffer(&SgfxBufferDef::for_vertex_buffer(64), None)
            .is_err());
        let vertex_buffer = device
            .create_buffer(&SgfxBufferDef::for_vertex_buffer(64), Some(&[0; 64]))
            .unwrap();
        assert!(device.update_buffer(vertex_buffer, 0, &[0; 4]).is_err());
        device.destroy_buffer(vertex_buffer).unwrap();
    }

    #[test]
    fn test_texture_update() {
        let mut api = null_api();
        let device = api.device_mut();

        let def = SgfxTextureDef {
            width: 2,
            height: 2,
            format: SgfxFormat::R8Unorm,
            bind_flags: SgfxBindFlags::SHADER_RESOURCE,
            ..Default::default()
        };
        let texture = device.create_texture(&def, &[]).unwrap();

        // Pitched source rows are packed
        device
            .update_texture(texture, 0, 0, &[1, 2, 0, 0, 3, 4], 4)
            .unwrap();
        assert_eq!(
            device
                .null_device()
                .unwrap()
                .texture_contents(texture, 0, 0)
                .unwrap(),
            &[1, 2, 3, 4]
        );

        assert!(device.update_texture(texture, 1, 0, &[0; 4], 1).is_err());
        assert!(device.update_texture(texture, 0, 0, &[0; 3], 2).is_err());
        device.destroy_texture(texture).unwrap();
    }

    #[test]
    fn test_pipeline_stage_validation() {
        let mut api = null_api();
        let device = api.device_mut();

        let vs = create_shader(device, SgfxShaderStage::Vertex);
        let cs = create_shader(device, SgfxShaderStage::Compute);

        assert!(device
            .create_pipeline_state(&SgfxPipelineStateDef::new(vs, Some(vs)))
            .is_err());
        assert!(device
            .create_compute_pipeline(&SgfxComputePipelineDef {
                compute_shader: vs,
                debug_name: None,
            })
            .is_err());

        let compute = device
            .create_compute_pipeline(&SgfxComputePipelineDef {
                compute_shader: cs,
                debug_name: None,
            })
            .unwrap();

        // Pipelines stay valid after their shaders are destroyed
        device.destroy_shader(cs).unwrap();
        device.destroy_shader(vs).unwrap();
        device.destroy_compute_pipeline(compute).unwrap();
    }

    #[test]
    fn test_render_pass_nesting() {
        let mut api = null_api();
        let device = api.device_mut();
        let pass = TestPass::new(device);

        let mut draw_queue = SgfxDrawQueue::new(pass.pipeline);
        draw_queue.draw(3, 0).unwrap();

        let cs = create_shader(device, SgfxShaderStage::Compute);
        let compute = device
            .create_compute_pipeline(&SgfxComputePipelineDef {
                compute_shader: cs,
                debug_name: None,
            })
            .unwrap();
        let mut compute_queue = SgfxComputeQueue::new(compute);
        compute_queue.dispatch(1, 1, 1);

        assert!(device.submit_draw_queue(&draw_queue).is_err());
        assert!(device.end_render_pass().is_err());

        device.begin_render_pass(&pass.render_pass_def()).unwrap();
        assert!(device.begin_render_pass(&pass.render_pass_def()).is_err());
        assert!(device.submit_compute_queue(&compute_queue).is_err());
        device.submit_draw_queue(&draw_queue).unwrap();
        device.end_render_pass().unwrap();

        device.submit_compute_queue(&compute_queue).unwrap();

        let stats = device.take_stats();
        assert_eq!(stats.render_passes, 1);
        assert_eq!(stats.draws, 1);
        assert_eq!(stats.dispatches, 1);

        let calls = device.null_device().unwrap().calls();
        assert_eq!(calls.last(), Some(&SgfxNullCall::UavBarrier));

        device.destroy_compute_pipeline(compute).unwrap();
        device.destroy_shader(cs).unwrap();
        pass.destroy(device);
        api.destroy().unwrap();
    }

    #[test]
    fn test_submit_batches_bindings() {
        let mut api = null_api();
        let device = api.device_mut();
        let pass = TestPass::new(device);

        let srv_def = SgfxTextureDef {
            width: 4,
            height: 4,
            format: SgfxFormat::R8G8B8A8Unorm,
            bind_flags: SgfxBindFlags::SHADER_RESOURCE,
            ..Default::default()
        };
        let textures: Vec<_> = (0..3)
            .map(|_| device.create_texture(&srv_def, &[]).unwrap())
            .collect();
        let sampler = device
            .create_sampler(&SgfxSamplerDef::linear_clamp())
            .unwrap();

        let mut queue = SgfxDrawQueue::new(pass.pipeline);
        for (slot, texture) in textures.iter().enumerate() {
            queue
                .set_shader_resource(SgfxShaderStage::Pixel, slot as u32, *texture)
                .unwrap();
        }
        queue
            .set_sampler(SgfxShaderStage::Pixel, 0, sampler)
            .unwrap();
        queue.draw(3, 0).unwrap();
        queue.set_stencil_reference(1);
        queue.draw(0, 0).unwrap();

        device.begin_render_pass(&pass.render_pass_def()).unwrap();
        device.null_device_mut().unwrap().take_calls();
        device.submit_draw_queue(&queue).unwrap();
        device.end_render_pass().unwrap();

        let calls = device.null_device_mut().unwrap().take_calls();
        assert_eq!(
            calls,
            vec![
                SgfxNullCall::SetPipelineState(pass.pipeline),
                SgfxNullCall::BindRun {
                    stage: Some(SgfxShaderStage::Pixel),
                    kind: SgfxBindingKind::ShaderResource,
                    first_slot: 0,
                    count: 3,
                },
                SgfxNullCall::BindRun {
                    stage: Some(SgfxShaderStage::Pixel),
                    kind: SgfxBindingKind::Sampler,
                    first_slot: 0,
                    count: 1,
                },
                SgfxNullCall::Draw(SgfxDrawParams::Draw {
                    vertex_count: 3,
                    first_vertex: 0,
                }),
                // The empty draw's state is applied, the draw itself is skipped
                SgfxNullCall::SetStencilReference(1),
                SgfxNullCall::EndRenderPass,
            ]
        );

        for texture in textures {
            device.destroy_texture(texture).unwrap();
        }
        device.destroy_sampler(sampler).unwrap();
        pass.destroy(device);
    }

    #[test]
    fn test_queue_validation() {
        let mut api = null_api();
        let device = api.device_mut();
        let pass = TestPass::new(device);

        let constant_buffer = device
            .create_buffer(&SgfxBufferDef::for_constant_buffer(64), None)
            .unwrap();

        // A constant buffer cannot be read as a shader resource
        let mut queue = SgfxDrawQueue::new(pass.pipeline);
        queue
            .set_shader_resource(SgfxShaderStage::Vertex, 0, constant_buffer)
            .unwrap();
        queue.draw(3, 0).unwrap();

        // Nor used as a vertex buffer
        let mut vertex_queue = SgfxDrawQueue::new(pass.pipeline);
        vertex_queue
            .set_vertex_buffer(0, Some(constant_buffer), 0, 16)
            .unwrap();
        vertex_queue.draw(3, 0).unwrap();

        // Sampling the render target being written
        let mut hazard_queue = SgfxDrawQueue::new(pass.pipeline);
        hazard_queue
            .set_shader_resource(SgfxShaderStage::Pixel, 0, pass.color)
            .unwrap();
        hazard_queue.draw(3, 0).unwrap();

        device.begin_render_pass(&pass.render_pass_def()).unwrap();
        assert!(device.submit_draw_queue(&queue).is_err());
        assert!(device.submit_draw_queue(&vertex_queue).is_err());
        assert!(device.submit_draw_queue(&hazard_queue).is_err());
        device.end_render_pass().unwrap();

        // Destroyed resources are rejected at submit
        let mut stale_queue = SgfxDrawQueue::new(pass.pipeline);
        stale_queue
            .set_constant_buffer(SgfxShaderStage::Vertex, 0, constant_buffer)
            .unwrap();
        stale_queue.draw(3, 0).unwrap();
        device.destroy_buffer(constant_buffer).unwrap();

        device.begin_render_pass(&pass.render_pass_def()).unwrap();
        assert!(matches!(
            device.submit_draw_queue(&stale_queue),
            Err(SgfxError::InvalidHandle(SgfxHandleKind::Buffer))
        ));
        device.end_render_pass().unwrap();

        pass.destroy(device);
    }

    #[test]
    fn test_oversized_handle_tables_are_rejected() {
        let api_def = SgfxApiDef {
            max_textures: u32::MAX - 16,
            max_swapchains: 1,
            ..Default::default()
        };
        assert!(SgfxApi::new_null(&api_def).is_err());

        let api_def = SgfxApiDef {
            max_buffers: MAX_HANDLE_TABLE_CAPACITY * 2,
            ..Default::default()
        };
        assert!(SgfxApi::new_null(&api_def).is_err());
    }

    #[test]
    fn test_pixel_uav_slots_follow_color_targets() {
        let mut api = null_api();
        let device = api.device_mut();
        let pass = TestPass::new(device);

        let uav = device
            .create_buffer(
                &SgfxBufferDef::for_structured_buffer(16, 4, SgfxBindFlags::UNORDERED_ACCESS),
                None,
            )
            .unwrap();

        // Slot 0 is the pass's only color target
        let mut overlapping = SgfxDrawQueue::new(pass.pipeline);
        overlapping.set_unordered_access(0, uav, None).unwrap();
        overlapping.draw(3, 0).unwrap();

        let mut after_targets = SgfxDrawQueue::new(pass.pipeline);
        after_targets.set_unordered_access(1, uav, None).unwrap();
        after_targets.draw(3, 0).unwrap();

        device.begin_render_pass(&pass.render_pass_def()).unwrap();
        let error = device.submit_draw_queue(&overlapping).unwrap_err();
        assert!(error.to_string().contains("pixel UAV slot 0"));
        device.submit_draw_queue(&after_targets).unwrap();
        device.end_render_pass().unwrap();

        device.destroy_buffer(uav).unwrap();
        pass.destroy(device);
    }

    #[test]
    fn test_pipeline_must_match_render_pass() {
        let mut api = null_api();
        let device = api.device_mut();
        let pass = TestPass::new(device);

        let other_target = device
            .create_texture(
                &SgfxTextureDef::for_render_target(64, 64, SgfxFormat::R16G16B16A16Float),
                &[],
            )
            .unwrap();

        let mut queue = SgfxDrawQueue::new(pass.pipeline);
        queue.draw(3, 0).unwrap();

        device
            .begin_render_pass(&SgfxRenderPassDef {
                color_targets: vec![SgfxColorTarget::loaded(other_target)],
                depth_target: Some(SgfxDepthTarget::loaded(pass.depth)),
                viewport: None,
            })
            .unwrap();
        assert!(device.submit_draw_queue(&queue).is_err());
        device.end_render_pass().unwrap();

        // Attachments of different sizes
        let small_target = device
            .create_texture(
                &SgfxTextureDef::for_render_target(32, 32, SgfxFormat::R8G8B8A8Unorm),
                &[],
            )
            .unwrap();
        assert!(device
            .begin_render_pass(&SgfxRenderPassDef {
                color_targets: vec![SgfxColorTarget::loaded(small_target)],
                depth_target: Some(SgfxDepthTarget::loaded(pass.depth)),
                viewport: None,
            })
            .is_err());
        assert!(!device.is_in_render_pass());

        device.destroy_texture(other_target).unwrap();
        device.destroy_texture(small_target).unwrap();
        pass.destroy(device);
    }

    #[test]
    fn test_swapchain_back_buffers() {
        let mut api = null_api();
        let device = api.device_mut();

        let swapchain = device
            .create_swapchain(
                None,
                &SgfxSwapchainDef {
                    width: 320,
                    height: 240,
                    buffer_count: 3,
                    ..Default::default()
                },
            )
            .unwrap();

        let first = device.swapchain_texture(swapchain).unwrap();
        assert_eq!(device.texture_def(first).unwrap().width, 320);
        assert!(device.destroy_texture(first).is_err());

        device.present(swapchain).unwrap();
        let second = device.swapchain_texture(swapchain).unwrap();
        assert_ne!(first, second);

        // Back buffers are not reported as live textures
        assert_eq!(device.live_resources().textures, 0);
        assert_eq!(device.live_resources().swapchains, 1);

        device.resize_swapchain(swapchain, 640, 480).unwrap();
        assert!(device.texture_def(second).is_err());
        let resized = device.swapchain_texture(swapchain).unwrap();
        assert_eq!(device.texture_def(resized).unwrap().width, 640);

        device.destroy_swapchain(swapchain).unwrap();
        assert_eq!(device.live_resources().total(), 0);
        api.destroy().unwrap();
    }

    #[test]
    fn test_clear_unordered_access() {
        let mut api = null_api();
        let device = api.device_mut();

        let counter = device
            .create_buffer(
                &SgfxBufferDef::for_raw_buffer(
                    16,
                    SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::SHADER_RESOURCE,
                ),
                None,
            )
            .unwrap();
        device
            .clear_unordered_access_uint(counter, [7, 0, 0, 0])
            .unwrap();
        assert_eq!(
            device
                .null_device()
                .unwrap()
                .buffer_contents(counter)
                .unwrap(),
            &[7, 0, 0, 0, 7, 0, 0, 0, 7, 0, 0, 0, 7, 0, 0, 0]
        );

        let constant_buffer = device
            .create_buffer(&SgfxBufferDef::for_constant_buffer(16), None)
            .unwrap();
        assert!(device
            .clear_unordered_access_uint(constant_buffer, [0; 4])
            .is_err());

        device.destroy_buffer(counter).unwrap();
        device.destroy_buffer(constant_buffer).unwrap();
    }

    fn cleared_texels(
        device: &mut SgfxDevice,
        format: SgfxFormat,
        clear: impl FnOnce(&mut SgfxDevice, SgfxTextureHandle) -> SgfxResult<()>,
    ) -> Vec<u8> {
        let texture = device
            .create_texture(
                &SgfxTextureDef {
                    width: 2,
                    height: 1,
                    format,
                    bind_flags: SgfxBindFlags::UNORDERED_ACCESS,
                    ..Default::default()
                },
                &[],
            )
            .unwrap();
        clear(device, texture).unwrap();
        let contents = device
            .null_device()
            .unwrap()
            .texture_contents(texture, 0, 0)
            .unwrap()
            .to_vec();
        device.destroy_texture(texture).unwrap();
        contents
    }

    #[test]
    fn test_clear_unordered_access_packs_texels() {
        let mut api = null_api();
        let device = api.device_mut();

        // Every channel takes its own value, truncated to the channel width
        let uint = cleared_texels(device, SgfxFormat::R8G8B8A8Uint, |device, texture| {
            device.clear_unordered_access_uint(texture, [1, 2, 3, 300])
        });
        assert_eq!(uint, vec![1, 2, 3, 44, 1, 2, 3, 44]);

        let wide = cleared_texels(device, SgfxFormat::R32G32Uint, |device, texture| {
            device.clear_unordered_access_uint(texture, [5, 6, 7, 8])
        });
        assert_eq!(&wide[..8], &[5, 0, 0, 0, 6, 0, 0, 0]);

        // Normalized channels are scaled, BGRA stores blue first
        let bgra = cleared_texels(device, SgfxFormat::B8G8R8A8Unorm, |device, texture| {
            device.clear_unordered_access_float(texture, [1.0, 0.0, 0.5, 1.0])
        });
        assert_eq!(&bgra[..4], &[128, 0, 255, 255]);

        let half_float =
            cleared_texels(device, SgfxFormat::R16G16B16A16Float, |device, texture| {
                device.clear_unordered_access_float(texture, [1.0, 0.5, 0.0, -2.0])
            });
        assert_eq!(
            &half_float[..8],
            &[0x00, 0x3c, 0x00, 0x38, 0x00, 0x00, 0x00, 0xc0]
        );

        let packed = cleared_texels(device, SgfxFormat::R10G10B10A2Unorm, |device, texture| {
            device.clear_unordered_access_float(texture, [1.0, 0.0, 1.0, 1.0])
        });
        assert_eq!(&packed[..4], &0xfff0_03ffu32.to_le_bytes());
    }

    #[test]
    fn test_handle_table_full() {
        let mut api = SgfxApi::new_null(&SgfxApiDef {
            max_samplers: 2,
            ..Default::default()
        })
        .unwrap();
        let device = api.device_mut();

        let a = device.create_sampler(&SgfxSamplerDef::point_clamp()).unwrap();
        let b = device.create_sampler(&SgfxSamplerDef::point_clamp()).unwrap();
        assert!(matches!(
            device.create_sampler(&SgfxSamplerDef::point_clamp()),
            Err(SgfxError::HandleTableFull(SgfxHandleKind::Sampler))
        ));

        device.destroy_sampler(a).unwrap();
        let c = device.create_sampler(&SgfxSamplerDef::point_clamp()).unwrap();
        // The slot is reused but the stale handle does not resolve to the new sampler
        assert_ne!(a, c);
        assert!(device.destroy_sampler(a).is_err());

        device.destroy_sampler(b).unwrap();
        device.destroy_sampler(c).unwrap();
    }

    #[test]
    fn test_leaks_reported_on_destroy() {
        let mut api = null_api();
        let device = api.device_mut();
        device
            .create_buffer(&SgfxBufferDef::for_staging_buffer(64), None)
            .unwrap();
        device
            .create_sampler(&SgfxSamplerDef::point_clamp())
            .unwrap();

        let error = api.destroy().unwrap_err();
        assert!(error.to_string().contains("2 object(s)"));

        // Already destroyed
        assert!(api.destroy().is_ok());
        assert_eq!(api.device().live_resources().total(), 0);
    }
}
