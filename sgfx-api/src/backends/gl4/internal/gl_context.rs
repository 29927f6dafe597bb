use crate::{SgfxError, SgfxResult};
use gl::types::*;
use std::ffi::{c_void, CStr, CString};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);
pub const NONE_BUFFER: BufferId = BufferId(gl::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);
pub const NONE_TEXTURE: TextureId = TextureId(gl::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SamplerId(pub u32);
pub const NONE_SAMPLER: SamplerId = SamplerId(gl::NONE);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramPipelineId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);
pub const DEFAULT_FRAMEBUFFER: FramebufferId = FramebufferId(0);

extern "system" fn debug_message_callback(
    _source: GLenum,
    _gltype: GLenum,
    id: GLuint,
    severity: GLenum,
    _length: GLsizei,
    message: *const GLchar,
    _user_param: *mut c_void,
) {
    if message.is_null() {
        return;
    }

    let message = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    match severity {
        gl::DEBUG_SEVERITY_HIGH => log::error!("GL debug message {}: {}", id, message),
        gl::DEBUG_SEVERITY_MEDIUM => log::warn!("GL debug message {}: {}", id, message),
        gl::DEBUG_SEVERITY_LOW => log::debug!("GL debug message {}: {}", id, message),
        _ => log::trace!("GL debug message {}: {}", id, message),
    }
}

/// Checked wrappers over the GL functions loaded for the context that is current on the device's
/// thread. The host owns the context itself and provides the swap callback.
pub struct GlContext {
    swap_buffers_fn: Box<dyn FnMut()>,
}

impl GlContext {
    pub fn new(
        load_fn: &dyn Fn(&str) -> *const c_void,
        swap_buffers_fn: Box<dyn FnMut()>,
    ) -> Self {
        gl::load_with(|symbol| load_fn(symbol));
        GlContext { swap_buffers_fn }
    }

    pub fn swap_buffers(&mut self) {
        (self.swap_buffers_fn)();
    }

    pub fn check_for_error(&self) -> SgfxResult<()> {
        unsafe {
            let result = gl::GetError();
            if result != gl::NO_ERROR {
                Err(SgfxError::GlError(result))
            } else {
                Ok(())
            }
        }
    }

    pub fn gl_get_integerv(
        &self,
        pname: GLenum,
    ) -> i32 {
        unsafe {
            let mut value = 0;
            gl::GetIntegerv(pname, &mut value);
            value
        }
    }

    pub fn gl_get_string(
        &self,
        pname: GLenum,
    ) -> String {
        unsafe {
            let str = gl::GetString(pname);
            if str.is_null() {
                return "".to_string();
            }

            CStr::from_ptr(str as _).to_string_lossy().into_owned()
        }
    }

    pub fn enable_debug_output(&self) -> SgfxResult<()> {
        unsafe {
            gl::Enable(gl::DEBUG_OUTPUT);
            gl::Enable(gl::DEBUG_OUTPUT_SYNCHRONOUS);
            gl::DebugMessageCallback(Some(debug_message_callback), std::ptr::null());
            self.check_for_error()
        }
    }

    pub fn gl_clip_control(
        &self,
        origin: GLenum,
        depth: GLenum,
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClipControl(origin, depth);
            self.check_for_error()
        }
    }

    pub fn gl_enable(
        &self,
        cap: GLenum,
    ) -> SgfxResult<()> {
        unsafe {
            gl::Enable(cap);
            self.check_for_error()
        }
    }

    pub fn gl_disable(
        &self,
        cap: GLenum,
    ) -> SgfxResult<()> {
        unsafe {
            gl::Disable(cap);
            self.check_for_error()
        }
    }

    pub fn gl_set_enabled(
        &self,
        cap: GLenum,
        enabled: bool,
    ) -> SgfxResult<()> {
        if enabled {
            self.gl_enable(cap)
        } else {
            self.gl_disable(cap)
        }
    }

    pub fn gl_pixel_storei(
        &self,
        pname: GLenum,
        param: i32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::PixelStorei(pname, param);
            self.check_for_error()
        }
    }

    pub fn gl_flush(&self) -> SgfxResult<()> {
        unsafe {
            gl::Flush();
            self.check_for_error()
        }
    }

    pub fn gl_finish(&self) -> SgfxResult<()> {
        unsafe {
            gl::Finish();
            self.check_for_error()
        }
    }

    //
    // Buffers
    //
    pub fn gl_create_buffer(&self) -> SgfxResult<BufferId> {
        unsafe {
            let mut buffer = 0;
            gl::CreateBuffers(1, &mut buffer);
            self.check_for_error()?;
            Ok(BufferId(buffer))
        }
    }

    pub fn gl_destroy_buffer(
        &self,
        buffer_id: BufferId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteBuffers(1, &buffer_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_named_buffer_storage(
        &self,
        buffer_id: BufferId,
        size: u64,
        data: Option<&[u8]>,
        flags: GLbitfield,
    ) -> SgfxResult<()> {
        let data_ptr = data
            .map(|data| data.as_ptr() as *const c_void)
            .unwrap_or(std::ptr::null());
        unsafe {
            gl::NamedBufferStorage(buffer_id.0, size as GLsizeiptr, data_ptr, flags);
            self.check_for_error()
        }
    }

    pub fn gl_named_buffer_sub_data(
        &self,
        buffer_id: BufferId,
        offset: u64,
        data: &[u8],
    ) -> SgfxResult<()> {
        unsafe {
            gl::NamedBufferSubData(
                buffer_id.0,
                offset as GLintptr,
                data.len() as GLsizeiptr,
                data.as_ptr() as *const c_void,
            );
            self.check_for_error()
        }
    }

    pub fn gl_get_named_buffer_sub_data(
        &self,
        buffer_id: BufferId,
        offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()> {
        unsafe {
            gl::GetNamedBufferSubData(
                buffer_id.0,
                offset as GLintptr,
                out.len() as GLsizeiptr,
                out.as_mut_ptr() as *mut c_void,
            );
            self.check_for_error()
        }
    }

    pub fn gl_copy_named_buffer_sub_data(
        &self,
        src: BufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> SgfxResult<()> {
        unsafe {
            gl::CopyNamedBufferSubData(
                src.0,
                dst.0,
                src_offset as GLintptr,
                dst_offset as GLintptr,
                size as GLsizeiptr,
            );
            self.check_for_error()
        }
    }

    pub fn gl_clear_named_buffer_data(
        &self,
        buffer_id: BufferId,
        internal_format: GLenum,
        format: GLenum,
        type_: GLenum,
        value: *const c_void,
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClearNamedBufferData(buffer_id.0, internal_format, format, type_, value);
            self.check_for_error()
        }
    }

    pub fn gl_bind_buffer(
        &self,
        target: GLenum,
        buffer_id: BufferId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindBuffer(target, buffer_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_bind_buffer_base(
        &self,
        target: GLenum,
        index: u32,
        buffer_id: BufferId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindBufferBase(target, index, buffer_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_bind_buffers_base(
        &self,
        target: GLenum,
        first: u32,
        buffers: &[u32],
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindBuffersBase(target, first, buffers.len() as GLsizei, buffers.as_ptr());
            self.check_for_error()
        }
    }

    pub fn gl_bind_vertex_buffers(
        &self,
        first: u32,
        buffers: &[u32],
        offsets: &[GLintptr],
        strides: &[GLsizei],
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindVertexBuffers(
                first,
                buffers.len() as GLsizei,
                buffers.as_ptr(),
                offsets.as_ptr(),
                strides.as_ptr(),
            );
            self.check_for_error()
        }
    }

    //
    // Textures and samplers
    //
    pub fn gl_create_texture(
        &self,
        target: GLenum,
    ) -> SgfxResult<TextureId> {
        unsafe {
            let mut texture = 0;
            gl::CreateTextures(target, 1, &mut texture);
            self.check_for_error()?;
            Ok(TextureId(texture))
        }
    }

    pub fn gl_destroy_texture(
        &self,
        texture_id: TextureId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteTextures(1, &texture_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_texture_storage_1d(
        &self,
        texture_id: TextureId,
        levels: u32,
        internal_format: GLenum,
        width: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureStorage1D(
                texture_id.0,
                levels as GLsizei,
                internal_format,
                width as GLsizei,
            );
            self.check_for_error()
        }
    }

    pub fn gl_texture_storage_2d(
        &self,
        texture_id: TextureId,
        levels: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureStorage2D(
                texture_id.0,
                levels as GLsizei,
                internal_format,
                width as GLsizei,
                height as GLsizei,
            );
            self.check_for_error()
        }
    }

    pub fn gl_texture_storage_3d(
        &self,
        texture_id: TextureId,
        levels: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureStorage3D(
                texture_id.0,
                levels as GLsizei,
                internal_format,
                width as GLsizei,
                height as GLsizei,
                depth as GLsizei,
            );
            self.check_for_error()
        }
    }

    pub fn gl_texture_storage_2d_multisample(
        &self,
        texture_id: TextureId,
        samples: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureStorage2DMultisample(
                texture_id.0,
                samples as GLsizei,
                internal_format,
                width as GLsizei,
                height as GLsizei,
                gl::TRUE,
            );
            self.check_for_error()
        }
    }

    pub fn gl_texture_storage_3d_multisample(
        &self,
        texture_id: TextureId,
        samples: u32,
        internal_format: GLenum,
        width: u32,
        height: u32,
        depth: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureStorage3DMultisample(
                texture_id.0,
                samples as GLsizei,
                internal_format,
                width as GLsizei,
                height as GLsizei,
                depth as GLsizei,
                gl::TRUE,
            );
            self.check_for_error()
        }
    }

    pub fn gl_texture_sub_image_1d(
        &self,
        texture_id: TextureId,
        level: u32,
        width: u32,
        format: GLenum,
        type_: GLenum,
        data: &[u8],
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureSubImage1D(
                texture_id.0,
                level as GLint,
                0,
                width as GLsizei,
                format,
                type_,
                data.as_ptr() as *const c_void,
            );
            self.check_for_error()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn gl_texture_sub_image_2d(
        &self,
        texture_id: TextureId,
        level: u32,
        y_offset: u32,
        width: u32,
        height: u32,
        format: GLenum,
        type_: GLenum,
        data: &[u8],
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureSubImage2D(
                texture_id.0,
                level as GLint,
                0,
                y_offset as GLint,
                width as GLsizei,
                height as GLsizei,
                format,
                type_,
                data.as_ptr() as *const c_void,
            );
            self.check_for_error()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn gl_texture_sub_image_3d(
        &self,
        texture_id: TextureId,
        level: u32,
        z_offset: u32,
        width: u32,
        height: u32,
        depth: u32,
        format: GLenum,
        type_: GLenum,
        data: &[u8],
    ) -> SgfxResult<()> {
        unsafe {
            gl::TextureSubImage3D(
                texture_id.0,
                level as GLint,
                0,
                0,
                z_offset as GLint,
                width as GLsizei,
                height as GLsizei,
                depth as GLsizei,
                format,
                type_,
                data.as_ptr() as *const c_void,
            );
            self.check_for_error()
        }
    }

    pub fn gl_clear_tex_image(
        &self,
        texture_id: TextureId,
        level: u32,
        format: GLenum,
        type_: GLenum,
        value: *const c_void,
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClearTexImage(texture_id.0, level as GLint, format, type_, value);
            self.check_for_error()
        }
    }

    pub fn gl_bind_textures(
        &self,
        first: u32,
        textures: &[u32],
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindTextures(first, textures.len() as GLsizei, textures.as_ptr());
            self.check_for_error()
        }
    }

    pub fn gl_bind_image_textures(
        &self,
        first: u32,
        textures: &[u32],
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindImageTextures(first, textures.len() as GLsizei, textures.as_ptr());
            self.check_for_error()
        }
    }

    pub fn gl_create_sampler(&self) -> SgfxResult<SamplerId> {
        unsafe {
            let mut sampler = 0;
            gl::CreateSamplers(1, &mut sampler);
            self.check_for_error()?;
            Ok(SamplerId(sampler))
        }
    }

    pub fn gl_destroy_sampler(
        &self,
        sampler_id: SamplerId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteSamplers(1, &sampler_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_sampler_parameteri(
        &self,
        sampler_id: SamplerId,
        pname: GLenum,
        param: i32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::SamplerParameteri(sampler_id.0, pname, param);
            self.check_for_error()
        }
    }

    pub fn gl_sampler_parameterf(
        &self,
        sampler_id: SamplerId,
        pname: GLenum,
        param: f32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::SamplerParameterf(sampler_id.0, pname, param);
            self.check_for_error()
        }
    }

    pub fn gl_sampler_parameterfv(
        &self,
        sampler_id: SamplerId,
        pname: GLenum,
        params: &[f32; 4],
    ) -> SgfxResult<()> {
        unsafe {
            gl::SamplerParameterfv(sampler_id.0, pname, params.as_ptr());
            self.check_for_error()
        }
    }

    pub fn gl_bind_samplers(
        &self,
        first: u32,
        samplers: &[u32],
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindSamplers(first, samplers.len() as GLsizei, samplers.as_ptr());
            self.check_for_error()
        }
    }

    //
    // Programs
    //
    fn gl_get_program_info_log(
        &self,
        program_id: ProgramId,
    ) -> SgfxResult<String> {
        unsafe {
            let mut len = 0;
            gl::GetProgramiv(program_id.0, gl::INFO_LOG_LENGTH, &mut len);
            self.check_for_error()?;
            if len <= 1 {
                return Ok("info log not available".to_string());
            }

            let mut log = vec![0_u8; len as usize];
            gl::GetProgramInfoLog(
                program_id.0,
                len,
                std::ptr::null_mut(),
                log.as_mut_ptr() as *mut GLchar,
            );
            self.check_for_error()?;
            log.truncate(len as usize - 1);
            Ok(String::from_utf8_lossy(&log).into_owned())
        }
    }

    /// Compiles and links a single-stage separable program
    pub fn create_shader_program(
        &self,
        shader_type: GLenum,
        src: &CString,
    ) -> SgfxResult<ProgramId> {
        let program_id = unsafe {
            let program = gl::CreateShaderProgramv(shader_type, 1, &src.as_ptr());
            self.check_for_error()?;
            ProgramId(program)
        };

        let mut link_status = 0;
        unsafe {
            gl::GetProgramiv(program_id.0, gl::LINK_STATUS, &mut link_status);
        }
        self.check_for_error()?;

        if link_status == 0 {
            let log = self.gl_get_program_info_log(program_id)?;
            self.gl_destroy_program(program_id)?;
            return Err(format!("Error compiling shader: {}", log).into());
        }

        Ok(program_id)
    }

    pub fn gl_destroy_program(
        &self,
        program_id: ProgramId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteProgram(program_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_use_program(
        &self,
        program_id: Option<ProgramId>,
    ) -> SgfxResult<()> {
        unsafe {
            gl::UseProgram(program_id.map(|program| program.0).unwrap_or(0));
            self.check_for_error()
        }
    }

    pub fn gl_create_program_pipeline(&self) -> SgfxResult<ProgramPipelineId> {
        unsafe {
            let mut pipeline = 0;
            gl::CreateProgramPipelines(1, &mut pipeline);
            self.check_for_error()?;
            Ok(ProgramPipelineId(pipeline))
        }
    }

    pub fn gl_destroy_program_pipeline(
        &self,
        pipeline_id: ProgramPipelineId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteProgramPipelines(1, &pipeline_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_use_program_stages(
        &self,
        pipeline_id: ProgramPipelineId,
        stages: GLbitfield,
        program_id: ProgramId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::UseProgramStages(pipeline_id.0, stages, program_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_bind_program_pipeline(
        &self,
        pipeline_id: ProgramPipelineId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindProgramPipeline(pipeline_id.0);
            self.check_for_error()
        }
    }

    //
    // Vertex arrays
    //
    pub fn gl_create_vertex_array(&self) -> SgfxResult<VertexArrayId> {
        unsafe {
            let mut vertex_array = 0;
            gl::CreateVertexArrays(1, &mut vertex_array);
            self.check_for_error()?;
            Ok(VertexArrayId(vertex_array))
        }
    }

    pub fn gl_destroy_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteVertexArrays(1, &vertex_array_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_bind_vertex_array(
        &self,
        vertex_array_id: VertexArrayId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindVertexArray(vertex_array_id.0);
            self.check_for_error()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn gl_vertex_array_attrib(
        &self,
        vertex_array_id: VertexArrayId,
        location: u32,
        binding: u32,
        size: i32,
        type_: GLenum,
        normalized: bool,
        integer: bool,
        relative_offset: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::EnableVertexArrayAttrib(vertex_array_id.0, location);
            if integer {
                gl::VertexArrayAttribIFormat(
                    vertex_array_id.0,
                    location,
                    size,
                    type_,
                    relative_offset,
                );
            } else {
                gl::VertexArrayAttribFormat(
                    vertex_array_id.0,
                    location,
                    size,
                    type_,
                    if normalized { gl::TRUE } else { gl::FALSE },
                    relative_offset,
                );
            }
            gl::VertexArrayAttribBinding(vertex_array_id.0, location, binding);
            self.check_for_error()
        }
    }

    pub fn gl_vertex_array_binding_divisor(
        &self,
        vertex_array_id: VertexArrayId,
        binding: u32,
        divisor: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::VertexArrayBindingDivisor(vertex_array_id.0, binding, divisor);
            self.check_for_error()
        }
    }

    //
    // Framebuffers
    //
    pub fn gl_create_framebuffer(&self) -> SgfxResult<FramebufferId> {
        unsafe {
            let mut framebuffer = 0;
            gl::CreateFramebuffers(1, &mut framebuffer);
            self.check_for_error()?;
            Ok(FramebufferId(framebuffer))
        }
    }

    pub fn gl_destroy_framebuffer(
        &self,
        framebuffer_id: FramebufferId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DeleteFramebuffers(1, &framebuffer_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_named_framebuffer_texture(
        &self,
        framebuffer_id: FramebufferId,
        attachment: GLenum,
        texture_id: TextureId,
        level: u32,
        layer: Option<u32>,
    ) -> SgfxResult<()> {
        unsafe {
            match layer {
                Some(layer) => gl::NamedFramebufferTextureLayer(
                    framebuffer_id.0,
                    attachment,
                    texture_id.0,
                    level as GLint,
                    layer as GLint,
                ),
                None => gl::NamedFramebufferTexture(
                    framebuffer_id.0,
                    attachment,
                    texture_id.0,
                    level as GLint,
                ),
            }
            self.check_for_error()
        }
    }

    pub fn gl_named_framebuffer_draw_buffers(
        &self,
        framebuffer_id: FramebufferId,
        buffers: &[GLenum],
    ) -> SgfxResult<()> {
        unsafe {
            gl::NamedFramebufferDrawBuffers(
                framebuffer_id.0,
                buffers.len() as GLsizei,
                buffers.as_ptr(),
            );
            self.check_for_error()
        }
    }

    pub fn gl_check_named_framebuffer_status(
        &self,
        framebuffer_id: FramebufferId,
    ) -> SgfxResult<GLenum> {
        unsafe {
            let status = gl::CheckNamedFramebufferStatus(framebuffer_id.0, gl::FRAMEBUFFER);
            self.check_for_error()?;
            Ok(status)
        }
    }

    pub fn gl_bind_framebuffer(
        &self,
        framebuffer_id: FramebufferId,
    ) -> SgfxResult<()> {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, framebuffer_id.0);
            self.check_for_error()
        }
    }

    pub fn gl_clear_named_framebuffer_fv(
        &self,
        framebuffer_id: FramebufferId,
        buffer: GLenum,
        draw_buffer: i32,
        value: &[f32],
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClearNamedFramebufferfv(framebuffer_id.0, buffer, draw_buffer, value.as_ptr());
            self.check_for_error()
        }
    }

    pub fn gl_clear_named_framebuffer_uiv(
        &self,
        framebuffer_id: FramebufferId,
        draw_buffer: i32,
        value: &[u32; 4],
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClearNamedFramebufferuiv(
                framebuffer_id.0,
                gl::COLOR,
                draw_buffer,
                value.as_ptr(),
            );
            self.check_for_error()
        }
    }

    pub fn gl_clear_named_framebuffer_iv(
        &self,
        framebuffer_id: FramebufferId,
        buffer: GLenum,
        value: i32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClearNamedFramebufferiv(framebuffer_id.0, buffer, 0, &value);
            self.check_for_error()
        }
    }

    pub fn gl_clear_named_framebuffer_fi(
        &self,
        framebuffer_id: FramebufferId,
        depth: f32,
        stencil: i32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::ClearNamedFramebufferfi(framebuffer_id.0, gl::DEPTH_STENCIL, 0, depth, stencil);
            self.check_for_error()
        }
    }

    /// Copies `src` into the window surface, flipping rows since the surface's origin is at the
    /// bottom
    pub fn gl_blit_to_default_framebuffer(
        &self,
        src: FramebufferId,
        width: u32,
        height: u32,
    ) -> SgfxResult<()> {
        let (width, height) = (width as GLint, height as GLint);
        unsafe {
            gl::BlitNamedFramebuffer(
                src.0,
                DEFAULT_FRAMEBUFFER.0,
                0,
                0,
                width,
                height,
                0,
                height,
                width,
                0,
                gl::COLOR_BUFFER_BIT,
                gl::NEAREST,
            );
            self.check_for_error()
        }
    }

    //
    // Fixed function state
    //
    pub fn gl_viewport(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        min_depth: f32,
        max_depth: f32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::Viewport(x, y, width, height);
            gl::Scissor(x, y, width, height);
            gl::DepthRangef(min_depth, max_depth);
            self.check_for_error()
        }
    }

    pub fn gl_color_mask(
        &self,
        index: u32,
        mask: [bool; 4],
    ) -> SgfxResult<()> {
        let to_gl = |enabled: bool| if enabled { gl::TRUE } else { gl::FALSE };
        unsafe {
            gl::ColorMaski(
                index,
                to_gl(mask[0]),
                to_gl(mask[1]),
                to_gl(mask[2]),
                to_gl(mask[3]),
            );
            self.check_for_error()
        }
    }

    pub fn gl_blend_target(
        &self,
        index: u32,
        enabled: bool,
        func: [GLenum; 4],
        equation: [GLenum; 2],
    ) -> SgfxResult<()> {
        unsafe {
            if enabled {
                gl::Enablei(gl::BLEND, index);
                gl::BlendFuncSeparatei(index, func[0], func[1], func[2], func[3]);
                gl::BlendEquationSeparatei(index, equation[0], equation[1]);
            } else {
                gl::Disablei(gl::BLEND, index);
            }
            self.check_for_error()
        }
    }

    pub fn gl_blend_color(
        &self,
        color: [f32; 4],
    ) -> SgfxResult<()> {
        unsafe {
            gl::BlendColor(color[0], color[1], color[2], color[3]);
            self.check_for_error()
        }
    }

    pub fn gl_depth_func(
        &self,
        func: GLenum,
        write_enable: bool,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DepthFunc(func);
            gl::DepthMask(if write_enable { gl::TRUE } else { gl::FALSE });
            self.check_for_error()
        }
    }

    pub fn gl_stencil_face(
        &self,
        face: GLenum,
        func: GLenum,
        reference: u32,
        read_mask: u32,
        ops: [GLenum; 3],
    ) -> SgfxResult<()> {
        unsafe {
            gl::StencilFuncSeparate(face, func, reference as GLint, read_mask);
            gl::StencilOpSeparate(face, ops[0], ops[1], ops[2]);
            self.check_for_error()
        }
    }

    pub fn gl_stencil_mask(
        &self,
        mask: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::StencilMaskSeparate(gl::FRONT_AND_BACK, mask);
            self.check_for_error()
        }
    }

    pub fn gl_cull_face(
        &self,
        cull_mode: GLenum,
        front_face: GLenum,
    ) -> SgfxResult<()> {
        if cull_mode == gl::NONE {
            return self.gl_disable(gl::CULL_FACE);
        }

        unsafe {
            gl::Enable(gl::CULL_FACE);
            gl::CullFace(cull_mode);
            gl::FrontFace(front_face);
            self.check_for_error()
        }
    }

    pub fn gl_polygon_mode(
        &self,
        mode: GLenum,
    ) -> SgfxResult<()> {
        unsafe {
            gl::PolygonMode(gl::FRONT_AND_BACK, mode);
            self.check_for_error()
        }
    }

    pub fn gl_polygon_offset(
        &self,
        factor: f32,
        units: f32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::PolygonOffset(factor, units);
            self.check_for_error()
        }
    }

    pub fn gl_patch_vertices(
        &self,
        count: i32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::PatchParameteri(gl::PATCH_VERTICES, count);
            self.check_for_error()
        }
    }

    //
    // Draws and dispatches
    //
    pub fn gl_draw_arrays_instanced(
        &self,
        mode: GLenum,
        first: u32,
        count: u32,
        instance_count: u32,
        base_instance: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DrawArraysInstancedBaseInstance(
                mode,
                first as GLint,
                count as GLsizei,
                instance_count as GLsizei,
                base_instance,
            );
            self.check_for_error()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn gl_draw_elements_instanced(
        &self,
        mode: GLenum,
        count: u32,
        index_type: GLenum,
        byte_offset: u64,
        instance_count: u32,
        base_vertex: i32,
        base_instance: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DrawElementsInstancedBaseVertexBaseInstance(
                mode,
                count as GLsizei,
                index_type,
                byte_offset as usize as *const c_void,
                instance_count as GLsizei,
                base_vertex,
                base_instance,
            );
            self.check_for_error()
        }
    }

    pub fn gl_draw_arrays_indirect(
        &self,
        mode: GLenum,
        byte_offset: u64,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DrawArraysIndirect(mode, byte_offset as usize as *const c_void);
            self.check_for_error()
        }
    }

    pub fn gl_draw_elements_indirect(
        &self,
        mode: GLenum,
        index_type: GLenum,
        byte_offset: u64,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DrawElementsIndirect(mode, index_type, byte_offset as usize as *const c_void);
            self.check_for_error()
        }
    }

    pub fn gl_dispatch_compute(
        &self,
        x: u32,
        y: u32,
        z: u32,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DispatchCompute(x, y, z);
            self.check_for_error()
        }
    }

    pub fn gl_dispatch_compute_indirect(
        &self,
        byte_offset: u64,
    ) -> SgfxResult<()> {
        unsafe {
            gl::DispatchComputeIndirect(byte_offset as GLintptr);
            self.check_for_error()
        }
    }

    pub fn gl_memory_barrier(
        &self,
        barriers: GLbitfield,
    ) -> SgfxResult<()> {
        unsafe {
            gl::MemoryBarrier(barriers);
            self.check_for_error()
        }
    }
}
