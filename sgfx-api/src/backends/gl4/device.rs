use super::command_encoder::GlCommandEncoder;
use super::internal::conversions::*;
use super::internal::gl_context::*;
use crate::internal_shared::*;
use crate::*;
use fnv::FnvHashMap;
use raw_window_handle::HasRawWindowHandle;
use std::ffi::{c_void, CString};

const TEXTURE_MAX_ANISOTROPY: gl::types::GLenum = 0x84FE;

/// GL specific configuration. The host creates the window and the GL 4.5 core context; the
/// device only needs a function loader for that context and a way to swap its buffers.
pub struct SgfxApiDefGl4 {
    /// Resolves GL function names, e.g. `|name| window.get_proc_address(name)`
    pub load_fn: Box<dyn Fn(&str) -> *const c_void>,
    /// Presents the default framebuffer
    pub swap_buffers_fn: Box<dyn FnMut()>,
}

pub struct SgfxGl4Buffer {
    pub(super) id: BufferId,
    // Atomic counter standing in for the hidden append counter
    pub(super) counter: Option<BufferId>,
}

pub struct SgfxGl4Texture {
    pub(super) id: TextureId,
    target: gl::types::GLenum,
    gl_format: GlTextureFormat,
}

pub struct SgfxGl4Sampler {
    pub(super) id: SamplerId,
}

pub struct SgfxGl4Shader {
    program: ProgramId,
}

pub struct SgfxGl4PipelineState {
    program_pipeline: ProgramPipelineId,
    programs: Vec<ProgramId>,
    vertex_array: VertexArrayId,
    topology: gl::types::GLenum,
    patch_control_points: Option<i32>,
    blend: GlBlendState,
    depth_stencil: GlDepthStencilState,
    rasterizer: GlRasterizerState,
}

pub struct SgfxGl4ComputePipeline {
    program_pipeline: ProgramPipelineId,
    program: ProgramId,
}

pub struct SgfxGl4Swapchain {
    buffer_count: u32,
    current_back_buffer: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct GlAttachment {
    texture: TextureId,
    mip: u32,
    layer: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct GlFramebufferKey {
    colors: Vec<GlAttachment>,
    depth: Option<(GlAttachment, gl::types::GLenum)>,
}

impl GlFramebufferKey {
    fn references(
        &self,
        texture: TextureId,
    ) -> bool {
        self.colors
            .iter()
            .chain(self.depth.iter().map(|(attachment, _)| attachment))
            .any(|attachment| attachment.texture == texture)
    }
}

pub struct SgfxDeviceGl4 {
    gl: GlContext,
    device_info: SgfxDeviceInfo,
    resources: SgfxResourceTables<SgfxDeviceGl4>,
    framebuffers: FnvHashMap<GlFramebufferKey, FramebufferId>,
    // Shader programs are shared by the shader and every pipeline built from it
    program_refs: FnvHashMap<ProgramId, u32>,
}

impl SgfxBackendTypes for SgfxDeviceGl4 {
    type Buffer = SgfxGl4Buffer;
    type Texture = SgfxGl4Texture;
    type Sampler = SgfxGl4Sampler;
    type Shader = SgfxGl4Shader;
    type PipelineState = SgfxGl4PipelineState;
    type ComputePipeline = SgfxGl4ComputePipeline;
    type Swapchain = SgfxGl4Swapchain;
}

impl SgfxDeviceGl4 {
    pub(crate) fn new(
        api_def: &SgfxApiDef,
        gl_api_def: SgfxApiDefGl4,
    ) -> SgfxResult<Self> {
        let gl = GlContext::new(&*gl_api_def.load_fn, gl_api_def.swap_buffers_fn);

        let version = (
            gl.gl_get_integerv(gl::MAJOR_VERSION),
            gl.gl_get_integerv(gl::MINOR_VERSION),
        );
        let renderer = gl.gl_get_string(gl::RENDERER);
        log::debug!(
            "GL version {}.{} ({}), renderer {}, vendor {}",
            version.0,
            version.1,
            gl.gl_get_string(gl::VERSION),
            renderer,
            gl.gl_get_string(gl::VENDOR)
        );

        if version < (4, 5) {
            return Err(format!(
                "GL 4.5 is required, the current context is {}.{}",
                version.0, version.1
            )
            .into());
        }

        match api_def.validation_mode {
            SgfxValidationMode::Disabled => {}
            SgfxValidationMode::EnabledIfAvailable => {
                if let Err(e) = gl.enable_debug_output() {
                    log::warn!("Could not enable GL debug output: {}", e);
                }
            }
            SgfxValidationMode::Enabled => gl.enable_debug_output()?,
        }

        let storage_bindings = gl.gl_get_integerv(gl::MAX_SHADER_STORAGE_BUFFER_BINDINGS) as u32;
        if storage_bindings < MAX_SHADER_RESOURCE_SLOTS + MAX_UNORDERED_ACCESS_SLOTS {
            log::warn!(
                "Only {} shader storage bindings, UAV buffers in high slots will fail",
                storage_bindings
            );
        }

        // Match D3D conventions: top-left window origin and a 0..1 depth range
        gl.gl_clip_control(gl::UPPER_LEFT, gl::ZERO_TO_ONE)?;
        gl.gl_enable(gl::TEXTURE_CUBE_MAP_SEAMLESS)?;
        gl.gl_pixel_storei(gl::UNPACK_ALIGNMENT, 1)?;
        gl.gl_pixel_storei(gl::PACK_ALIGNMENT, 1)?;

        let device_info = SgfxDeviceInfo {
            backend_type: SgfxBackendType::Gl4,
            adapter_name: renderer,
            constant_buffer_alignment: 16,
            upload_row_pitch_alignment: 1,
            max_texture_dimension_2d: gl.gl_get_integerv(gl::MAX_TEXTURE_SIZE) as u32,
            supports_pixel_shader_uavs: true,
        };

        Ok(SgfxDeviceGl4 {
            gl,
            device_info,
            resources: SgfxResourceTables::new(api_def),
            framebuffers: Default::default(),
            program_refs: Default::default(),
        })
    }

    fn retain_program(
        &mut self,
        program: ProgramId,
    ) {
        *self.program_refs.entry(program).or_insert(0) += 1;
    }

    fn release_program(
        &mut self,
        program: ProgramId,
    ) {
        let remaining = match self.program_refs.get_mut(&program) {
            Some(count) => {
                *count -= 1;
                *count
            }
            None => 0,
        };

        if remaining == 0 {
            self.program_refs.remove(&program);
            if let Err(e) = self.gl.gl_destroy_program(program) {
                log::error!("Failed to delete GL program: {}", e);
            }
        }
    }

    fn create_texture_storage(
        &self,
        def: &SgfxTextureDef,
    ) -> SgfxResult<SgfxGl4Texture> {
        let target = gl_texture_target(def);
        let gl_format = def.format.gl_texture_format()?;
        let id = self.gl.gl_create_texture(target)?;
        let internal_format = gl_format.internal_format;

        let result = match target {
            gl::TEXTURE_1D => {
                self.gl
                    .gl_texture_storage_1d(id, def.mip_count, internal_format, def.width)
            }
            gl::TEXTURE_1D_ARRAY => self.gl.gl_texture_storage_2d(
                id,
                def.mip_count,
                internal_format,
                def.width,
                def.array_length,
            ),
            gl::TEXTURE_2D | gl::TEXTURE_CUBE_MAP => self.gl.gl_texture_storage_2d(
                id,
                def.mip_count,
                internal_format,
                def.width,
                def.height,
            ),
            gl::TEXTURE_2D_MULTISAMPLE => self.gl.gl_texture_storage_2d_multisample(
                id,
                def.sample_count,
                internal_format,
                def.width,
                def.height,
            ),
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY => self.gl.gl_texture_storage_3d_multisample(
                id,
                def.sample_count,
                internal_format,
                def.width,
                def.height,
                def.array_length,
            ),
            gl::TEXTURE_3D => self.gl.gl_texture_storage_3d(
                id,
                def.mip_count,
                internal_format,
                def.width,
                def.height,
                def.depth,
            ),
            _ => self.gl.gl_texture_storage_3d(
                id,
                def.mip_count,
                internal_format,
                def.width,
                def.height,
                def.array_length,
            ),
        };

        if let Err(e) = result {
            self.gl.gl_destroy_texture(id)?;
            return Err(e);
        }

        Ok(SgfxGl4Texture {
            id,
            target,
            gl_format,
        })
    }

    fn upload_subresource(
        &self,
        texture: &SgfxGl4Texture,
        def: &SgfxTextureDef,
        mip: u32,
        array_slice: u32,
        subresource: &SgfxSubresourceData,
    ) -> SgfxResult<()> {
        let (width, height, depth) = def.mip_extents(mip);
        let block_size = def.format.block_size_in_bytes();
        self.gl
            .gl_pixel_storei(gl::UNPACK_ROW_LENGTH, (subresource.row_pitch / block_size) as i32)?;
        let image_height = if subresource.row_pitch > 0 {
            subresource.slice_pitch / subresource.row_pitch
        } else {
            0
        };
        self.gl
            .gl_pixel_storei(gl::UNPACK_IMAGE_HEIGHT, image_height as i32)?;

        let format = texture.gl_format;
        match texture.target {
            gl::TEXTURE_1D => self.gl.gl_texture_sub_image_1d(
                texture.id,
                mip,
                width,
                format.format,
                format.type_,
                subresource.data,
            ),
            gl::TEXTURE_1D_ARRAY => self.gl.gl_texture_sub_image_2d(
                texture.id,
                mip,
                array_slice,
                width,
                1,
                format.format,
                format.type_,
                subresource.data,
            ),
            gl::TEXTURE_2D => self.gl.gl_texture_sub_image_2d(
                texture.id,
                mip,
                0,
                width,
                height,
                format.format,
                format.type_,
                subresource.data,
            ),
            gl::TEXTURE_3D => self.gl.gl_texture_sub_image_3d(
                texture.id,
                mip,
                0,
                width,
                height,
                depth,
                format.format,
                format.type_,
                subresource.data,
            ),
            gl::TEXTURE_2D_MULTISAMPLE | gl::TEXTURE_2D_MULTISAMPLE_ARRAY => {
                Err("multisampled textures cannot be uploaded to".into())
            }
            // Arrays, cube faces and cube arrays take the slice as the z offset
            _ => self.gl.gl_texture_sub_image_3d(
                texture.id,
                mip,
                array_slice,
                width,
                height,
                1,
                format.format,
                format.type_,
                subresource.data,
            ),
        }
    }

    fn attachment(
        &self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
    ) -> SgfxResult<GlAttachment> {
        let native = &self.resources.texture(texture)?.native;
        Ok(GlAttachment {
            texture: native.id,
            mip,
            layer: if gl_texture_is_layered(native.target) {
                Some(array_slice)
            } else {
                None
            },
        })
    }

    fn framebuffer(
        &mut self,
        key: GlFramebufferKey,
    ) -> SgfxResult<FramebufferId> {
        if let Some(&framebuffer) = self.framebuffers.get(&key) {
            return Ok(framebuffer);
        }

        let framebuffer = self.gl.gl_create_framebuffer()?;
        let mut draw_buffers = Vec::with_capacity(key.colors.len());
        for (index, attachment) in key.colors.iter().enumerate() {
            let attachment_point = gl::COLOR_ATTACHMENT0 + index as u32;
            self.gl.gl_named_framebuffer_texture(
                framebuffer,
                attachment_point,
                attachment.texture,
                attachment.mip,
                attachment.layer,
            )?;
            draw_buffers.push(attachment_point);
        }

        if let Some((attachment, attachment_point)) = key.depth {
            self.gl.gl_named_framebuffer_texture(
                framebuffer,
                attachment_point,
                attachment.texture,
                attachment.mip,
                attachment.layer,
            )?;
        }

        if draw_buffers.is_empty() {
            draw_buffers.push(gl::NONE);
        }
        self.gl
            .gl_named_framebuffer_draw_buffers(framebuffer, &draw_buffers)?;

        let status = self.gl.gl_check_named_framebuffer_status(framebuffer)?;
        if status != gl::FRAMEBUFFER_COMPLETE {
            self.gl.gl_destroy_framebuffer(framebuffer)?;
            return Err(format!("framebuffer is incomplete (status 0x{:04X})", status).into());
        }

        log::trace!(
            "Created framebuffer {:?} with {} color attachments",
            framebuffer,
            key.colors.len()
        );
        self.framebuffers.insert(key, framebuffer);
        Ok(framebuffer)
    }

    fn apply_pipeline_state(
        &self,
        pipeline: &SgfxGl4PipelineState,
    ) -> SgfxResult<()> {
        let gl = &self.gl;
        gl.gl_use_program(None)?;
        gl.gl_bind_program_pipeline(pipeline.program_pipeline)?;
        gl.gl_bind_vertex_array(pipeline.vertex_array)?;
        if let Some(count) = pipeline.patch_control_points {
            gl.gl_patch_vertices(count)?;
        }

        let blend = &pipeline.blend;
        gl.gl_set_enabled(gl::SAMPLE_ALPHA_TO_COVERAGE, blend.alpha_to_coverage)?;
        for (index, target) in blend.targets.iter().enumerate() {
            gl.gl_blend_target(index as u32, target.enabled, target.func, target.equation)?;
            gl.gl_color_mask(index as u32, target.write_mask)?;
        }
        gl.gl_blend_color([1.0; 4])?;

        let depth_stencil = &pipeline.depth_stencil;
        gl.gl_set_enabled(gl::DEPTH_TEST, depth_stencil.depth_test)?;
        gl.gl_depth_func(depth_stencil.depth_func, depth_stencil.depth_write)?;
        gl.gl_set_enabled(gl::STENCIL_TEST, depth_stencil.stencil_test)?;
        for (face, face_state) in [
            (gl::FRONT, &depth_stencil.front),
            (gl::BACK, &depth_stencil.back),
        ] {
            gl.gl_stencil_face(
                face,
                face_state.func,
                0,
                depth_stencil.stencil_read_mask,
                face_state.ops,
            )?;
        }
        gl.gl_stencil_mask(depth_stencil.stencil_write_mask)?;

        let rasterizer = &pipeline.rasterizer;
        gl.gl_cull_face(rasterizer.cull_mode, rasterizer.front_face)?;
        gl.gl_polygon_mode(rasterizer.polygon_mode)?;
        let has_depth_bias =
            rasterizer.depth_bias != 0.0 || rasterizer.slope_scaled_depth_bias != 0.0;
        gl.gl_set_enabled(gl::POLYGON_OFFSET_FILL, has_depth_bias)?;
        if has_depth_bias {
            gl.gl_polygon_offset(rasterizer.slope_scaled_depth_bias, rasterizer.depth_bias)?;
        }
        gl.gl_set_enabled(gl::DEPTH_CLAMP, rasterizer.depth_clamp)?;
        gl.gl_set_enabled(gl::SCISSOR_TEST, rasterizer.scissor_test)?;
        gl.gl_set_enabled(gl::MULTISAMPLE, rasterizer.multisample)
    }

    fn back_buffers(
        &self,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<SgfxGl4Texture>> {
        let texture_def = SgfxTextureDef::for_render_target(def.width, def.height, def.format);
        (0..def.buffer_count)
            .map(|_| self.create_texture_storage(&texture_def))
            .collect()
    }
}

impl SgfxBackend for SgfxDeviceGl4 {
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
    ) -> SgfxResult<SgfxGl4Buffer> {
        profiling::scope!("create_buffer");
        let id = self.gl.gl_create_buffer()?;
        self.gl.gl_named_buffer_storage(
            id,
            def.size,
            initial_data,
            def.usage.gl_buffer_storage_flags(),
        )?;

        let counter = if def.flags.contains(SgfxBufferFlags::APPEND_COUNTER) {
            let counter = self.gl.gl_create_buffer()?;
            self.gl.gl_named_buffer_storage(
                counter,
                4,
                Some(&[0; 4]),
                gl::DYNAMIC_STORAGE_BIT,
            )?;
            Some(counter)
        } else {
            None
        };

        Ok(SgfxGl4Buffer { id, counter })
    }

    fn destroy_buffer(
        &mut self,
        buffer: SgfxGl4Buffer,
    ) {
        for id in std::iter::once(buffer.id).chain(buffer.counter) {
            if let Err(e) = self.gl.gl_destroy_buffer(id) {
                log::error!("Failed to delete GL buffer: {}", e);
            }
        }
    }

    fn update_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        data: &[u8],
    ) -> SgfxResult<()> {
        let id = self.resources.buffer(buffer)?.native.id;
        self.gl.gl_named_buffer_sub_data(id, byte_offset, data)
    }

    fn read_buffer(
        &mut self,
        buffer: SgfxBufferHandle,
        byte_offset: u64,
        out: &mut [u8],
    ) -> SgfxResult<()> {
        let id = self.resources.buffer(buffer)?.native.id;
        self.gl.gl_get_named_buffer_sub_data(id, byte_offset, out)
    }

    fn copy_buffer(
        &mut self,
        src: SgfxBufferHandle,
        src_offset: u64,
        dst: SgfxBufferHandle,
        dst_offset: u64,
        size: u64,
    ) -> SgfxResult<()> {
        let src = self.resources.buffer(src)?.native.id;
        let dst = self.resources.buffer(dst)?.native.id;
        self.gl
            .gl_copy_named_buffer_sub_data(src, src_offset, dst, dst_offset, size)
    }

    fn create_texture(
        &mut self,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<SgfxGl4Texture> {
        profiling::scope!("create_texture");
        let texture = self.create_texture_storage(def)?;

        // Subresources are ordered by array slice, then mip
        for (index, subresource) in initial_data.iter().enumerate() {
            let index = index as u32;
            let result = self.upload_subresource(
                &texture,
                def,
                index % def.mip_count,
                index / def.mip_count,
                subresource,
            );

            if let Err(e) = result {
                self.gl.gl_destroy_texture(texture.id)?;
                return Err(e);
            }
        }

        Ok(texture)
    }

    fn destroy_texture(
        &mut self,
        texture: SgfxGl4Texture,
    ) {
        let stale: Vec<_> = self
            .framebuffers
            .keys()
            .filter(|key| key.references(texture.id))
            .cloned()
            .collect();
        for key in stale {
            if let Some(framebuffer) = self.framebuffers.remove(&key) {
                if let Err(e) = self.gl.gl_destroy_framebuffer(framebuffer) {
                    log::error!("Failed to delete GL framebuffer: {}", e);
                }
            }
        }

        if let Err(e) = self.gl.gl_destroy_texture(texture.id) {
            log::error!("Failed to delete GL texture: {}", e);
        }
    }

    fn update_texture(
        &mut self,
        texture: SgfxTextureHandle,
        mip: u32,
        array_slice: u32,
        data: &[u8],
        row_pitch: u32,
    ) -> SgfxResult<()> {
        let entry = self.resources.texture(texture)?;
        let (_, height, _) = entry.def.mip_extents(mip);
        self.upload_subresource(
            &entry.native,
            &entry.def,
            mip,
            array_slice,
            &SgfxSubresourceData {
                data,
                row_pitch,
                slice_pitch: row_pitch * height,
            },
        )
    }

    fn create_sampler(
        &mut self,
        def: &SgfxSamplerDef,
    ) -> SgfxResult<SgfxGl4Sampler> {
        let gl = &self.gl;
        let id = gl.gl_create_sampler()?;
        gl.gl_sampler_parameteri(
            id,
            gl::TEXTURE_MIN_FILTER,
            gl_min_filter(def.min_filter, def.mip_filter),
        )?;
        gl.gl_sampler_parameteri(id, gl::TEXTURE_MAG_FILTER, gl_mag_filter(def.mag_filter))?;
        gl.gl_sampler_parameteri(id, gl::TEXTURE_WRAP_S, def.address_mode_u.gl_wrap_mode())?;
        gl.gl_sampler_parameteri(id, gl::TEXTURE_WRAP_T, def.address_mode_v.gl_wrap_mode())?;
        gl.gl_sampler_parameteri(id, gl::TEXTURE_WRAP_R, def.address_mode_w.gl_wrap_mode())?;
        gl.gl_sampler_parameterf(id, gl::TEXTURE_LOD_BIAS, def.mip_lod_bias)?;
        gl.gl_sampler_parameterf(id, gl::TEXTURE_MIN_LOD, def.min_lod)?;
        gl.gl_sampler_parameterf(id, gl::TEXTURE_MAX_LOD, def.max_lod)?;
        gl.gl_sampler_parameterfv(id, gl::TEXTURE_BORDER_COLOR, &def.border_color)?;

        if def.is_anisotropic() {
            gl.gl_sampler_parameterf(id, TEXTURE_MAX_ANISOTROPY, def.max_anisotropy as f32)?;
        }

        if let Some(compare_op) = def.compare_op {
            gl.gl_sampler_parameteri(
                id,
                gl::TEXTURE_COMPARE_MODE,
                gl::COMPARE_REF_TO_TEXTURE as i32,
            )?;
            gl.gl_sampler_parameteri(
                id,
                gl::TEXTURE_COMPARE_FUNC,
                compare_op.gl_compare_op() as i32,
            )?;
        }

        Ok(SgfxGl4Sampler { id })
    }

    fn destroy_sampler(
        &mut self,
        sampler: SgfxGl4Sampler,
    ) {
        if let Err(e) = self.gl.gl_destroy_sampler(sampler.id) {
            log::error!("Failed to delete GL sampler: {}", e);
        }
    }

    /// GLSL entry points are always `main`
    fn create_shader(
        &mut self,
        def: &SgfxShaderDef,
    ) -> SgfxResult<SgfxGl4Shader> {
        profiling::scope!("create_shader");
        let source = match &def.code {
            SgfxShaderCode::Glsl(source) => source,
            _ => return Err("the gl4 backend requires GLSL source".into()),
        };

        let source = CString::new(source.as_str())
            .map_err(|_| "GLSL source contains a nul byte")?;
        let program = self
            .gl
            .create_shader_program(def.stage.gl_shader_type(), &source)
            .map_err(|e| {
                SgfxError::from(format!(
                    "{} ({} shader {})",
                    e,
                    def.stage.name(),
                    def.debug_name.as_deref().unwrap_or("unnamed")
                ))
            })?;

        self.retain_program(program);
        Ok(SgfxGl4Shader { program })
    }

    fn destroy_shader(
        &mut self,
        shader: SgfxGl4Shader,
    ) {
        self.release_program(shader.program);
    }

    fn create_pipeline_state(
        &mut self,
        def: &SgfxPipelineStateDef,
    ) -> SgfxResult<SgfxGl4PipelineState> {
        profiling::scope!("create_pipeline_state");
        let mut programs = Vec::default();
        for (stage, shader) in def.shader_stages() {
            programs.push((stage, self.resources.shader(shader)?.native.program));
        }

        let patch_control_points = if def.hull_shader.is_some() {
            Some(def.primitive_topology.patch_control_points()? as i32)
        } else {
            None
        };

        let mut attribute_formats = Vec::with_capacity(def.input_layout.len());
        for element in &def.input_layout {
            attribute_formats.push(element.format.gl_attribute_format()?);
        }

        let program_pipeline = self.gl.gl_create_program_pipeline()?;
        for &(stage, program) in &programs {
            self.gl
                .gl_use_program_stages(program_pipeline, stage.gl_stage_bit(), program)?;
        }

        // Attribute locations are the element indices in the layout
        let vertex_array = self.gl.gl_create_vertex_array()?;
        for (location, (element, format)) in def
            .input_layout
            .iter()
            .zip(attribute_formats)
            .enumerate()
        {
            self.gl.gl_vertex_array_attrib(
                vertex_array,
                location as u32,
                element.slot,
                format.size,
                format.type_,
                format.normalized,
                format.integer,
                element.byte_offset,
            )?;

            let divisor = match element.rate {
                SgfxInputRate::PerVertex => 0,
                SgfxInputRate::PerInstance => 1,
            };
            self.gl
                .gl_vertex_array_binding_divisor(vertex_array, element.slot, divisor)?;
        }

        let programs: Vec<_> = programs.into_iter().map(|(_, program)| program).collect();
        for &program in &programs {
            self.retain_program(program);
        }

        Ok(SgfxGl4PipelineState {
            program_pipeline,
            programs,
            vertex_array,
            topology: if patch_control_points.is_some() {
                gl::PATCHES
            } else {
                def.primitive_topology.gl_topology()
            },
            patch_control_points,
            blend: (&def.blend_state).into(),
            depth_stencil: (&def.depth_stencil_state).into(),
            rasterizer: (&def.rasterizer_state).into(),
        })
    }

    fn destroy_pipeline_state(
        &mut self,
        pipeline: SgfxGl4PipelineState,
    ) {
        if let Err(e) = self.gl.gl_destroy_vertex_array(pipeline.vertex_array) {
            log::error!("Failed to delete GL vertex array: {}", e);
        }
        if let Err(e) = self
            .gl
            .gl_destroy_program_pipeline(pipeline.program_pipeline)
        {
            log::error!("Failed to delete GL program pipeline: {}", e);
        }

        for program in pipeline.programs {
            self.release_program(program);
        }
    }

    fn create_compute_pipeline(
        &mut self,
        def: &SgfxComputePipelineDef,
    ) -> SgfxResult<SgfxGl4ComputePipeline> {
        let program = self.resources.shader(def.compute_shader)?.native.program;
        let program_pipeline = self.gl.gl_create_program_pipeline()?;
        self.gl
            .gl_use_program_stages(program_pipeline, gl::COMPUTE_SHADER_BIT, program)?;
        self.retain_program(program);

        Ok(SgfxGl4ComputePipeline {
            program_pipeline,
            program,
        })
    }

    fn destroy_compute_pipeline(
        &mut self,
        pipeline: SgfxGl4ComputePipeline,
    ) {
        if let Err(e) = self
            .gl
            .gl_destroy_program_pipeline(pipeline.program_pipeline)
        {
            log::error!("Failed to delete GL program pipeline: {}", e);
        }
        self.release_program(pipeline.program);
    }

    /// Back buffers are offscreen textures. `present` copies the current one into the context's
    /// default framebuffer and swaps.
    fn create_swapchain(
        &mut self,
        _window: Option<&dyn HasRawWindowHandle>,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<(SgfxGl4Swapchain, Vec<SgfxGl4Texture>)> {
        if def.enable_vsync {
            log::trace!("Swap interval is controlled by the host on gl4");
        }

        Ok((
            SgfxGl4Swapchain {
                buffer_count: def.buffer_count,
                current_back_buffer: 0,
            },
            self.back_buffers(def)?,
        ))
    }

    fn destroy_swapchain(
        &mut self,
        _swapchain: SgfxGl4Swapchain,
    ) {
    }

    fn resize_swapchain(
        &mut self,
        swapchain: SgfxSwapchainHandle,
        def: &SgfxSwapchainDef,
    ) -> SgfxResult<Vec<SgfxGl4Texture>> {
        let back_buffers = self.back_buffers(def)?;
        self.resources.swapchain_mut(swapchain)?.native.current_back_buffer = 0;
        Ok(back_buffers)
    }

    fn present(
        &mut self,
        swapchain: SgfxSwapchainHandle,
    ) -> SgfxResult<usize> {
        let entry = self.resources.swapchain(swapchain)?;
        let (width, height) = (entry.def.width, entry.def.height);
        let back_buffer = self.attachment(entry.current_texture(), 0, 0)?;

        let source = self.framebuffer(GlFramebufferKey {
            colors: vec![back_buffer],
            depth: None,
        })?;
        self.gl.gl_disable(gl::SCISSOR_TEST)?;
        self.gl
            .gl_blit_to_default_framebuffer(source, width, height)?;
        self.gl.swap_buffers();

        let native = &mut self.resources.swapchain_mut(swapchain)?.native;
        native.current_back_buffer = (native.current_back_buffer + 1) % native.buffer_count;
        Ok(native.current_back_buffer as usize)
    }

    fn begin_render_pass(
        &mut self,
        def: &SgfxRenderPassDef,
        render_pass: &SgfxActiveRenderPass,
    ) -> SgfxResult<()> {
        profiling::scope!("begin_render_pass");
        let mut key = GlFramebufferKey {
            colors: Vec::with_capacity(def.color_targets.len()),
            depth: None,
        };
        for target in &def.color_targets {
            key.colors.push(self.attachment(
                target.texture,
                target.mip_slice,
                target.array_slice,
            )?);
        }
        if let Some(target) = &def.depth_target {
            let format = self.resources.texture(target.texture)?.def.format;
            key.depth = Some((
                self.attachment(target.texture, 0, 0)?,
                format.gl_depth_attachment(),
            ));
        }

        let framebuffer = self.framebuffer(key)?;
        self.gl.gl_bind_framebuffer(framebuffer)?;

        let viewport = def.viewport.unwrap_or_else(|| {
            SgfxViewport::for_extents(render_pass.width, render_pass.height)
        });
        self.gl.gl_viewport(
            viewport.x as i32,
            viewport.y as i32,
            viewport.width as i32,
            viewport.height as i32,
            viewport.min_depth,
            viewport.max_depth,
        )?;

        // Clears respect the write masks and the scissor test left by the last pipeline
        self.gl.gl_disable(gl::SCISSOR_TEST)?;
        for (index, (target, format)) in def
            .color_targets
            .iter()
            .zip(render_pass.color_formats.iter())
            .enumerate()
        {
            if target.load_op != SgfxLoadOp::Clear {
                continue;
            }

            self.gl.gl_color_mask(index as u32, [true; 4])?;
            if format.is_integer() {
                let value = target.clear_value.map(|channel| channel as u32);
                self.gl
                    .gl_clear_named_framebuffer_uiv(framebuffer, index as i32, &value)?;
            } else {
                self.gl.gl_clear_named_framebuffer_fv(
                    framebuffer,
                    gl::COLOR,
                    index as i32,
                    &target.clear_value,
                )?;
            }
        }

        if let (Some(target), Some(format)) = (&def.depth_target, render_pass.depth_format) {
            let clear_depth = target.depth_load_op == SgfxLoadOp::Clear;
            let clear_stencil = target.stencil_load_op == SgfxLoadOp::Clear && format.has_stencil();
            if clear_depth {
                self.gl.gl_depth_func(gl::ALWAYS, true)?;
            }
            if clear_stencil {
                self.gl.gl_stencil_mask(0xFF)?;
            }

            match (clear_depth, clear_stencil) {
                (true, true) => self.gl.gl_clear_named_framebuffer_fi(
                    framebuffer,
                    target.clear_depth,
                    target.clear_stencil as i32,
                )?,
                (true, false) => self.gl.gl_clear_named_framebuffer_fv(
                    framebuffer,
                    gl::DEPTH,
                    0,
                    &[target.clear_depth],
                )?,
                (false, true) => self.gl.gl_clear_named_framebuffer_iv(
                    framebuffer,
                    gl::STENCIL,
                    target.clear_stencil as i32,
                )?,
                (false, false) => {}
            }
        }

        Ok(())
    }

    fn end_render_pass(&mut self) -> SgfxResult<()> {
        // Pixel shader UAV writes and attachment writes become visible to later passes
        self.gl.gl_memory_barrier(gl::ALL_BARRIER_BITS)?;
        self.gl.gl_bind_framebuffer(DEFAULT_FRAMEBUFFER)
    }

    fn submit_draw_queue(
        &mut self,
        queue: &SgfxDrawQueue,
    ) -> SgfxResult<()> {
        let pipeline = &self.resources.pipeline_state(queue.pipeline())?.native;
        self.apply_pipeline_state(pipeline)?;

        let mut encoder = GlCommandEncoder::new(
            &self.gl,
            &self.resources,
            pipeline.topology,
            Some(&pipeline.depth_stencil),
        );
        replay_draw_queue(&mut encoder, queue, SgfxBindingModel::SharedAcrossStages)
    }

    fn submit_compute_queue(
        &mut self,
        queue: &SgfxComputeQueue,
    ) -> SgfxResult<()> {
        let pipeline = &self.resources.compute_pipeline(queue.pipeline())?.native;
        self.gl.gl_use_program(None)?;
        self.gl.gl_bind_program_pipeline(pipeline.program_pipeline)?;

        let mut encoder = GlCommandEncoder::new(&self.gl, &self.resources, gl::NONE, None);
        replay_compute_queue(&mut encoder, queue, SgfxBindingModel::SharedAcrossStages)?;
        self.gl.gl_memory_barrier(gl::ALL_BARRIER_BITS)
    }

    fn clear_unordered_access_uint(
        &mut self,
        view: SgfxResourceView,
        values: [u32; 4],
    ) -> SgfxResult<()> {
        match view {
            SgfxResourceView::Buffer(buffer) => {
                let id = self.resources.buffer(buffer)?.native.id;
                self.gl.gl_clear_named_buffer_data(
                    id,
                    gl::R32UI,
                    gl::RED_INTEGER,
                    gl::UNSIGNED_INT,
                    values.as_ptr() as *const c_void,
                )
            }
            SgfxResourceView::Texture(texture) => {
                let id = self.resources.texture(texture)?.native.id;
                self.gl.gl_clear_tex_image(
                    id,
                    0,
                    gl::RGBA_INTEGER,
                    gl::UNSIGNED_INT,
                    values.as_ptr() as *const c_void,
                )
            }
        }
    }

    fn clear_unordered_access_float(
        &mut self,
        view: SgfxResourceView,
        values: [f32; 4],
    ) -> SgfxResult<()> {
        match view {
            SgfxResourceView::Buffer(buffer) => {
                let id = self.resources.buffer(buffer)?.native.id;
                self.gl.gl_clear_named_buffer_data(
                    id,
                    gl::R32F,
                    gl::RED,
                    gl::FLOAT,
                    values.as_ptr() as *const c_void,
                )
            }
            SgfxResourceView::Texture(texture) => {
                let id = self.resources.texture(texture)?.native.id;
                self.gl.gl_clear_tex_image(
                    id,
                    0,
                    gl::RGBA,
                    gl::FLOAT,
                    values.as_ptr() as *const c_void,
                )
            }
        }
    }

    fn flush(&mut self) -> SgfxResult<()> {
        self.gl.gl_flush()
    }

    fn wait_idle(&mut self) -> SgfxResult<()> {
        self.gl.gl_finish()
    }
}

impl Drop for SgfxDeviceGl4 {
    fn drop(&mut self) {
        for (_, framebuffer) in self.framebuffers.drain() {
            if let Err(e) = self.gl.gl_destroy_framebuffer(framebuffer) {
                log::error!("Failed to delete GL framebuffer: {}", e);
            }
        }
    }
}
