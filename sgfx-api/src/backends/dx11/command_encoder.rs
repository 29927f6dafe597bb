use super::{SgfxDeviceDx11, SgfxDx11PipelineState};
use crate::binding::{
    SgfxBinding, SgfxBindingKind, SgfxBindingResource, SgfxIndexBufferBinding,
    SgfxVertexBufferBinding,
};
use crate::internal_shared::{SgfxCommandEncoder, SgfxResourceTables};
use crate::*;
use sgfx_base::DynamicArray;
use windows::Win32::Graphics::Direct3D11 as d3d11;

// Calls the context function of the given stage, e.g. VSSetSamplers or CSSetSamplers
macro_rules! per_stage {
    ($context:expr, $stage:expr, [$vs:ident, $hs:ident, $ds:ident, $gs:ident, $ps:ident, $cs:ident], $($args:expr),*) => {
        match $stage {
            SgfxShaderStage::Vertex => $context.$vs($($args),*),
            SgfxShaderStage::Hull => $context.$hs($($args),*),
            SgfxShaderStage::Domain => $context.$ds($($args),*),
            SgfxShaderStage::Geometry => $context.$gs($($args),*),
            SgfxShaderStage::Pixel => $context.$ps($($args),*),
            SgfxShaderStage::Compute => $context.$cs($($args),*),
        }
    };
}

/// Issues replayed queue commands on the immediate context. Every stage has its own slots, so
/// runs arrive per stage and map onto the `XXSetYYY(first, count, ..)` functions directly.
pub(super) struct Dx11CommandEncoder<'a> {
    context: &'a d3d11::ID3D11DeviceContext,
    resources: &'a SgfxResourceTables<SgfxDeviceDx11>,
    // None for compute queues
    pipeline: Option<&'a SgfxDx11PipelineState>,
}

impl<'a> Dx11CommandEncoder<'a> {
    pub fn new(
        context: &'a d3d11::ID3D11DeviceContext,
        resources: &'a SgfxResourceTables<SgfxDeviceDx11>,
        pipeline: Option<&'a SgfxDx11PipelineState>,
    ) -> Self {
        Dx11CommandEncoder {
            context,
            resources,
            pipeline,
        }
    }

    fn buffer(
        &self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<&d3d11::ID3D11Buffer> {
        Ok(&self.resources.buffer(buffer)?.native.buffer)
    }

    fn shader_resource_view(
        &self,
        resource: SgfxBindingResource,
    ) -> SgfxResult<Option<d3d11::ID3D11ShaderResourceView>> {
        let view = match resource {
            SgfxBindingResource::Buffer(buffer) => &self.resources.buffer(buffer)?.native.srv,
            SgfxBindingResource::Texture(texture) => &self.resources.texture(texture)?.native.srv,
            _ => return Ok(None),
        };

        view.clone()
            .map(Some)
            .ok_or_else(|| "resource has no shader resource view".into())
    }

    fn unordered_access_view(
        &self,
        resource: SgfxBindingResource,
    ) -> SgfxResult<Option<d3d11::ID3D11UnorderedAccessView>> {
        let view = match resource {
            SgfxBindingResource::Buffer(buffer) => &self.resources.buffer(buffer)?.native.uav,
            SgfxBindingResource::Texture(texture) => &self.resources.texture(texture)?.native.uav,
            _ => return Ok(None),
        };

        view.clone()
            .map(Some)
            .ok_or_else(|| "resource has no unordered access view".into())
    }

    fn bind_unordered_access(
        &self,
        stage: SgfxShaderStage,
        first: u32,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        let mut views = DynamicArray::<Option<d3d11::ID3D11UnorderedAccessView>, 8>::new();
        // u32::MAX keeps the current append counter
        let mut initial_counts = DynamicArray::<u32, 8>::new();
        for binding in run {
            views.push(self.unordered_access_view(binding.resource)?);
            initial_counts.push(binding.uav_initial_count.unwrap_or(u32::MAX));
        }

        unsafe {
            match stage {
                SgfxShaderStage::Compute => self.context.CSSetUnorderedAccessViews(
                    first,
                    views.len() as u32,
                    Some(views.as_ptr()),
                    Some(initial_counts.as_ptr()),
                ),
                // Pixel shader UAVs share the output merger slots with the render targets
                SgfxShaderStage::Pixel => self.context.OMSetRenderTargetsAndUnorderedAccessViews(
                    d3d11::D3D11_KEEP_RENDER_TARGETS_AND_DEPTH_STENCIL,
                    None,
                    None,
                    first,
                    views.len() as u32,
                    Some(views.as_ptr()),
                    Some(initial_counts.as_ptr()),
                ),
                _ => {
                    return Err(format!(
                        "unordered access views cannot be bound to the {} stage",
                        stage.name()
                    )
                    .into())
                }
            }
        }

        Ok(())
    }
}

impl<'a> SgfxCommandEncoder for Dx11CommandEncoder<'a> {
    fn bind_run(
        &mut self,
        stage: Option<SgfxShaderStage>,
        kind: SgfxBindingKind,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        let stage = stage.ok_or("D3D11 bindings are made per stage")?;
        let first = run[0].slot;
        let context = self.context;

        match kind {
            SgfxBindingKind::ConstantBuffer => {
                let mut buffers = DynamicArray::<Option<d3d11::ID3D11Buffer>, 16>::new();
                for binding in run {
                    buffers.push(match binding.resource {
                        SgfxBindingResource::Buffer(buffer) => Some(self.buffer(buffer)?.clone()),
                        _ => None,
                    });
                }

                unsafe {
                    per_stage!(
                        context,
                        stage,
                        [
                            VSSetConstantBuffers,
                            HSSetConstantBuffers,
                            DSSetConstantBuffers,
                            GSSetConstantBuffers,
                            PSSetConstantBuffers,
                            CSSetConstantBuffers
                        ],
                        first,
                        Some(buffers.as_slice())
                    );
                }
            }
            SgfxBindingKind::ShaderResource => {
                let mut views = DynamicArray::<Option<d3d11::ID3D11ShaderResourceView>, 32>::new();
                for binding in run {
                    views.push(self.shader_resource_view(binding.resource)?);
                }

                unsafe {
                    per_stage!(
                        context,
                        stage,
                        [
                            VSSetShaderResources,
                            HSSetShaderResources,
                            DSSetShaderResources,
                            GSSetShaderResources,
                            PSSetShaderResources,
                            CSSetShaderResources
                        ],
                        first,
                        Some(views.as_slice())
                    );
                }
            }
            SgfxBindingKind::Sampler => {
                let mut samplers = DynamicArray::<Option<d3d11::ID3D11SamplerState>, 16>::new();
                for binding in run {
                    samplers.push(match binding.resource {
                        SgfxBindingResource::Sampler(sampler) => {
                            Some(self.resources.sampler(sampler)?.native.sampler.clone())
                        }
                        _ => None,
                    });
                }

                unsafe {
                    per_stage!(
                        context,
                        stage,
                        [
                            VSSetSamplers,
                            HSSetSamplers,
                            DSSetSamplers,
                            GSSetSamplers,
                            PSSetSamplers,
                            CSSetSamplers
                        ],
                        first,
                        Some(samplers.as_slice())
                    );
                }
            }
            SgfxBindingKind::UnorderedAccess => self.bind_unordered_access(stage, first, run)?,
        }

        Ok(())
    }

    fn set_vertex_buffers(
        &mut self,
        run: &[SgfxVertexBufferBinding],
    ) -> SgfxResult<()> {
        let mut buffers = DynamicArray::<Option<d3d11::ID3D11Buffer>, 16>::new();
        let mut strides = DynamicArray::<u32, 16>::new();
        let mut offsets = DynamicArray::<u32, 16>::new();
        for binding in run {
            buffers.push(match binding.buffer {
                Some(buffer) => Some(self.buffer(buffer)?.clone()),
                None => None,
            });
            strides.push(binding.stride);
            offsets.push(binding.byte_offset);
        }

        unsafe {
            self.context.IASetVertexBuffers(
                run[0].slot,
                buffers.len() as u32,
                Some(buffers.as_ptr()),
                Some(strides.as_ptr()),
                Some(offsets.as_ptr()),
            );
        }

        Ok(())
    }

    fn set_index_buffer(
        &mut self,
        binding: &SgfxIndexBufferBinding,
    ) -> SgfxResult<()> {
        let buffer = self.buffer(binding.buffer)?;
        unsafe {
            self.context
                .IASetIndexBuffer(buffer, binding.format.dxgi_format(), binding.byte_offset);
        }

        Ok(())
    }

    fn set_stencil_reference(
        &mut self,
        reference: u32,
    ) -> SgfxResult<()> {
        // The reference is set together with the state object
        if let Some(pipeline) = self.pipeline {
            unsafe {
                self.context
                    .OMSetDepthStencilState(&pipeline.depth_stencil_state, reference);
            }
        }

        Ok(())
    }

    fn set_blend_factor(
        &mut self,
        factor: [f32; 4],
    ) -> SgfxResult<()> {
        if let Some(pipeline) = self.pipeline {
            unsafe {
                self.context.OMSetBlendState(
                    &pipeline.blend_state,
                    Some(factor.as_ptr()),
                    u32::MAX,
                );
            }
        }

        Ok(())
    }

    fn draw(
        &mut self,
        params: &SgfxDrawParams,
    ) -> SgfxResult<()> {
        let context = self.context;
        unsafe {
            match *params {
                SgfxDrawParams::Draw {
                    vertex_count,
                    first_vertex,
                } => context.Draw(vertex_count, first_vertex),
                SgfxDrawParams::DrawInstanced {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => context.DrawInstanced(
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                ),
                SgfxDrawParams::DrawIndexed {
                    index_count,
                    first_index,
                    base_vertex,
                } => context.DrawIndexed(index_count, first_index, base_vertex),
                SgfxDrawParams::DrawIndexedInstanced {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                } => context.DrawIndexedInstanced(
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                ),
                SgfxDrawParams::DrawIndirect {
                    buffer,
                    byte_offset,
                } => context.DrawInstancedIndirect(self.buffer(buffer)?, byte_offset),
                SgfxDrawParams::DrawIndexedIndirect {
                    buffer,
                    byte_offset,
                } => context.DrawIndexedInstancedIndirect(self.buffer(buffer)?, byte_offset),
            }
        }

        Ok(())
    }

    fn dispatch(
        &mut self,
        params: &SgfxDispatchParams,
    ) -> SgfxResult<()> {
        unsafe {
            match *params {
                SgfxDispatchParams::Dispatch {
                    group_count_x,
                    group_count_y,
                    group_count_z,
                } => self
                    .context
                    .Dispatch(group_count_x, group_count_y, group_count_z),
                SgfxDispatchParams::DispatchIndirect {
                    buffer,
                    byte_offset,
                } => self
                    .context
                    .DispatchIndirect(self.buffer(buffer)?, byte_offset),
            }
        }

        Ok(())
    }
}
