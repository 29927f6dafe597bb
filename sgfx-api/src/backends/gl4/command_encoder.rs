use super::internal::conversions::GlDepthStencilState;
use super::internal::gl_context::*;
use super::SgfxDeviceGl4;
use crate::binding::{
    SgfxBinding, SgfxBindingKind, SgfxBindingResource, SgfxIndexBufferBinding,
    SgfxVertexBufferBinding,
};
use crate::internal_shared::{SgfxCommandEncoder, SgfxResourceTables};
use crate::*;
use gl::types::{GLenum, GLintptr, GLsizei};
use sgfx_base::DynamicArray;

struct GlIndexBuffer {
    index_type: GLenum,
    index_size: u64,
    byte_offset: u64,
}

/// Issues replayed queue commands against the current GL context. All stages share one set of
/// binding points per kind, so runs arrive already merged across stages.
pub(super) struct GlCommandEncoder<'a> {
    gl: &'a GlContext,
    resources: &'a SgfxResourceTables<SgfxDeviceGl4>,
    topology: GLenum,
    depth_stencil: Option<&'a GlDepthStencilState>,
    index_buffer: Option<GlIndexBuffer>,
}

impl<'a> GlCommandEncoder<'a> {
    pub fn new(
        gl: &'a GlContext,
        resources: &'a SgfxResourceTables<SgfxDeviceGl4>,
        topology: GLenum,
        depth_stencil: Option<&'a GlDepthStencilState>,
    ) -> Self {
        GlCommandEncoder {
            gl,
            resources,
            topology,
            depth_stencil,
            index_buffer: None,
        }
    }

    fn buffer_id(
        &self,
        buffer: SgfxBufferHandle,
    ) -> SgfxResult<BufferId> {
        Ok(self.resources.buffer(buffer)?.native.id)
    }

    fn texture_id(
        &self,
        texture: SgfxTextureHandle,
    ) -> SgfxResult<TextureId> {
        Ok(self.resources.texture(texture)?.native.id)
    }

    fn index_buffer(&self) -> SgfxResult<&GlIndexBuffer> {
        self.index_buffer
            .as_ref()
            .ok_or_else(|| "indexed draw without an index buffer".into())
    }

    fn bind_shader_resources(
        &self,
        first: u32,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        // Textures go to texture units, structured and raw buffers to storage buffer bindings
        let mut textures = DynamicArray::<u32, 32>::new();
        let mut buffers = DynamicArray::<u32, 32>::new();
        for binding in run {
            match binding.resource {
                SgfxBindingResource::Texture(texture) => {
                    textures.push(self.texture_id(texture)?.0);
                    buffers.push(NONE_BUFFER.0);
                }
                SgfxBindingResource::Buffer(buffer) => {
                    textures.push(NONE_TEXTURE.0);
                    buffers.push(self.buffer_id(buffer)?.0);
                }
                _ => {
                    textures.push(NONE_TEXTURE.0);
                    buffers.push(NONE_BUFFER.0);
                }
            }
        }

        let any_texture = textures.iter().any(|&id| id != NONE_TEXTURE.0);
        let any_buffer = buffers.iter().any(|&id| id != NONE_BUFFER.0);
        if any_texture || !any_buffer {
            self.gl.gl_bind_textures(first, &textures)?;
        }
        if any_buffer || !any_texture {
            self.gl
                .gl_bind_buffers_base(gl::SHADER_STORAGE_BUFFER, first, &buffers)?;
        }

        Ok(())
    }

    fn bind_unordered_access(
        &self,
        first: u32,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        let mut images = DynamicArray::<u32, 8>::new();
        let mut buffers = DynamicArray::<u32, 8>::new();
        for binding in run {
            match binding.resource {
                SgfxBindingResource::Texture(texture) => {
                    images.push(self.texture_id(texture)?.0);
                    buffers.push(NONE_BUFFER.0);
                }
                SgfxBindingResource::Buffer(buffer) => {
                    let native = &self.resources.buffer(buffer)?.native;
                    images.push(NONE_TEXTURE.0);
                    buffers.push(native.id.0);

                    if let Some(counter) = native.counter {
                        self.gl
                            .gl_bind_buffer_base(gl::ATOMIC_COUNTER_BUFFER, binding.slot, counter)?;
                        if let Some(initial_count) = binding.uav_initial_count {
                            self.gl.gl_named_buffer_sub_data(
                                counter,
                                0,
                                &initial_count.to_ne_bytes(),
                            )?;
                        }
                    }
                }
                _ => {
                    images.push(NONE_TEXTURE.0);
                    buffers.push(NONE_BUFFER.0);
                }
            }
        }

        self.gl.gl_bind_image_textures(first, &images)?;
        self.gl.gl_bind_buffers_base(
            gl::SHADER_STORAGE_BUFFER,
            MAX_SHADER_RESOURCE_SLOTS + first,
            &buffers,
        )
    }
}

impl<'a> SgfxCommandEncoder for GlCommandEncoder<'a> {
    fn bind_run(
        &mut self,
        _stage: Option<SgfxShaderStage>,
        kind: SgfxBindingKind,
        run: &[SgfxBinding],
    ) -> SgfxResult<()> {
        let first = run[0].slot;
        match kind {
            SgfxBindingKind::ConstantBuffer => {
                let mut buffers = DynamicArray::<u32, 16>::new();
                for binding in run {
                    buffers.push(match binding.resource {
                        SgfxBindingResource::Buffer(buffer) => self.buffer_id(buffer)?.0,
                        _ => NONE_BUFFER.0,
                    });
                }
                self.gl
                    .gl_bind_buffers_base(gl::UNIFORM_BUFFER, first, &buffers)
            }
            SgfxBindingKind::ShaderResource => self.bind_shader_resources(first, run),
            SgfxBindingKind::Sampler => {
                let mut samplers = DynamicArray::<u32, 16>::new();
                for binding in run {
                    samplers.push(match binding.resource {
                        SgfxBindingResource::Sampler(sampler) => {
                            self.resources.sampler(sampler)?.native.id.0
                        }
                        _ => NONE_SAMPLER.0,
                    });
                }
                self.gl.gl_bind_samplers(first, &samplers)
            }
            SgfxBindingKind::UnorderedAccess => self.bind_unordered_access(first, run),
        }
    }

    fn set_vertex_buffers(
        &mut self,
        run: &[SgfxVertexBufferBinding],
    ) -> SgfxResult<()> {
        let mut buffers = DynamicArray::<u32, 16>::new();
        let mut offsets = DynamicArray::<GLintptr, 16>::new();
        let mut strides = DynamicArray::<GLsizei, 16>::new();
        for binding in run {
            let id = match binding.buffer {
                Some(buffer) => self.buffer_id(buffer)?,
                None => NONE_BUFFER,
            };
            buffers.push(id.0);
            offsets.push(binding.byte_offset as GLintptr);
            strides.push(binding.stride as GLsizei);
        }

        self.gl
            .gl_bind_vertex_buffers(run[0].slot, &buffers, &offsets, &strides)
    }

    fn set_index_buffer(
        &mut self,
        binding: &SgfxIndexBufferBinding,
    ) -> SgfxResult<()> {
        // The element buffer binding is recorded in the bound vertex array
        let id = self.buffer_id(binding.buffer)?;
        self.gl.gl_bind_buffer(gl::ELEMENT_ARRAY_BUFFER, id)?;
        self.index_buffer = Some(GlIndexBuffer {
            index_type: match binding.format {
                SgfxIndexFormat::Uint16 => gl::UNSIGNED_SHORT,
                SgfxIndexFormat::Uint32 => gl::UNSIGNED_INT,
            },
            index_size: binding.format.size_in_bytes() as u64,
            byte_offset: binding.byte_offset as u64,
        });
        Ok(())
    }

    fn set_stencil_reference(
        &mut self,
        reference: u32,
    ) -> SgfxResult<()> {
        if let Some(state) = self.depth_stencil {
            for (face, face_state) in [(gl::FRONT, &state.front), (gl::BACK, &state.back)] {
                self.gl.gl_stencil_face(
                    face,
                    face_state.func,
                    reference,
                    state.stencil_read_mask,
                    face_state.ops,
                )?;
            }
        }

        Ok(())
    }

    fn set_blend_factor(
        &mut self,
        factor: [f32; 4],
    ) -> SgfxResult<()> {
        self.gl.gl_blend_color(factor)
    }

    fn draw(
        &mut self,
        params: &SgfxDrawParams,
    ) -> SgfxResult<()> {
        match *params {
            SgfxDrawParams::Draw {
                vertex_count,
                first_vertex,
            } => self
                .gl
                .gl_draw_arrays_instanced(self.topology, first_vertex, vertex_count, 1, 0),
            SgfxDrawParams::DrawInstanced {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => self.gl.gl_draw_arrays_instanced(
                self.topology,
                first_vertex,
                vertex_count,
                instance_count,
                first_instance,
            ),
            SgfxDrawParams::DrawIndexed {
                index_count,
                first_index,
                base_vertex,
            } => {
                let index_buffer = self.index_buffer()?;
                self.gl.gl_draw_elements_instanced(
                    self.topology,
                    index_count,
                    index_buffer.index_type,
                    index_buffer.byte_offset + first_index as u64 * index_buffer.index_size,
                    1,
                    base_vertex,
                    0,
                )
            }
            SgfxDrawParams::DrawIndexedInstanced {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            } => {
                let index_buffer = self.index_buffer()?;
                self.gl.gl_draw_elements_instanced(
                    self.topology,
                    index_count,
                    index_buffer.index_type,
                    index_buffer.byte_offset + first_index as u64 * index_buffer.index_size,
                    instance_count,
                    base_vertex,
                    first_instance,
                )
            }
            SgfxDrawParams::DrawIndirect {
                buffer,
                byte_offset,
            } => {
                self.gl
                    .gl_bind_buffer(gl::DRAW_INDIRECT_BUFFER, self.buffer_id(buffer)?)?;
                self.gl
                    .gl_draw_arrays_indirect(self.topology, byte_offset as u64)
            }
            SgfxDrawParams::DrawIndexedIndirect {
                buffer,
                byte_offset,
            } => {
                let index_buffer = self.index_buffer()?;
                if index_buffer.byte_offset != 0 {
                    // The first index read from the arguments is relative to the start of the
                    // element buffer
                    log::warn!("Index buffer offset is ignored by indexed indirect draws on GL");
                }

                let index_type = index_buffer.index_type;
                self.gl
                    .gl_bind_buffer(gl::DRAW_INDIRECT_BUFFER, self.buffer_id(buffer)?)?;
                self.gl
                    .gl_draw_elements_indirect(self.topology, index_type, byte_offset as u64)
            }
        }
    }

    fn dispatch(
        &mut self,
        params: &SgfxDispatchParams,
    ) -> SgfxResult<()> {
        match *params {
            SgfxDispatchParams::Dispatch {
                group_count_x,
                group_count_y,
                group_count_z,
            } => self
                .gl
                .gl_dispatch_compute(group_count_x, group_count_y, group_count_z),
            SgfxDispatchParams::DispatchIndirect {
                buffer,
                byte_offset,
            } => {
                self.gl
                    .gl_bind_buffer(gl::DISPATCH_INDIRECT_BUFFER, self.buffer_id(buffer)?)?;
                self.gl.gl_dispatch_compute_indirect(byte_offset as u64)
            }
        }
    }
}
