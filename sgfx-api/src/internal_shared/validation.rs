//! Device-independent checks run before a request reaches a backend. Backends can assume the
//! handles they receive resolve and that the request is consistent with the resources' defs.

use super::resource_tables::{SgfxBackendTypes, SgfxResourceTables};
use crate::binding::{
    check_buffer_binding, check_texture_binding, SgfxBinding, SgfxBindingKind,
    SgfxBindingResource,
};
use crate::{
    SgfxBindFlags, SgfxBufferDef, SgfxBufferHandle, SgfxComputePipelineDef, SgfxComputeQueue,
    SgfxDispatchParams, SgfxDrawParams, SgfxDrawQueue, SgfxFormat, SgfxPipelineStateDef,
    SgfxRenderPassDef, SgfxResourceView, SgfxResult, SgfxShaderStage, SgfxSubresourceData,
    SgfxTextureDef, SgfxTextureHandle, SgfxUsage,
};
use fnv::FnvHashSet;
use sgfx_base::DynamicArray;

/// Attachment layout of the render pass currently open on a device
#[derive(Clone, Debug)]
pub struct SgfxActiveRenderPass {
    pub color_formats: DynamicArray<SgfxFormat, 8>,
    pub depth_format: Option<SgfxFormat>,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    /// Textures written by the pass. Reading them in the same pass is a hazard, except for a
    /// depth target bound read-only.
    pub written_attachments: FnvHashSet<SgfxTextureHandle>,
}

fn check_range(
    what: &str,
    offset: u64,
    size: u64,
    limit: u64,
) -> SgfxResult<()> {
    match offset.checked_add(size) {
        Some(end) if end <= limit => Ok(()),
        _ => Err(format!(
            "{} range {}..{} exceeds the resource size {}",
            what,
            offset,
            offset.saturating_add(size),
            limit
        )
        .into()),
    }
}

pub(crate) fn validate_buffer_update<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    buffer: SgfxBufferHandle,
    byte_offset: u64,
    size: u64,
) -> SgfxResult<()> {
    let def = &tables.buffer(buffer)?.def;
    if def.usage == SgfxUsage::Immutable {
        return Err("immutable buffers cannot be updated".into());
    }

    check_range("buffer update", byte_offset, size, def.size)
}

pub(crate) fn validate_buffer_read<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    buffer: SgfxBufferHandle,
    byte_offset: u64,
    size: u64,
) -> SgfxResult<()> {
    let def = &tables.buffer(buffer)?.def;
    if def.usage != SgfxUsage::Staging {
        return Err("only staging buffers can be read back, copy into one first".into());
    }

    check_range("buffer read", byte_offset, size, def.size)
}

pub(crate) fn validate_buffer_copy<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    src: SgfxBufferHandle,
    src_offset: u64,
    dst: SgfxBufferHandle,
    dst_offset: u64,
    size: u64,
) -> SgfxResult<()> {
    let src_def = &tables.buffer(src)?.def;
    let dst_def = &tables.buffer(dst)?.def;

    if dst_def.usage == SgfxUsage::Immutable {
        return Err("cannot copy into an immutable buffer".into());
    }

    check_range("copy source", src_offset, size, src_def.size)?;
    check_range("copy destination", dst_offset, size, dst_def.size)?;

    if src == dst && src_offset < dst_offset + size && dst_offset < src_offset + size {
        return Err("copy source and destination ranges overlap".into());
    }

    Ok(())
}

/// Minimum number of bytes a subresource upload with the given pitches must contain
fn required_upload_size(
    def: &SgfxTextureDef,
    mip: u32,
    row_pitch: u32,
    slice_pitch: u32,
) -> SgfxResult<u64> {
    let (width, height, depth) = def.mip_extents(mip);
    let packed_row = width as u64 * def.format.block_size_in_bytes() as u64;
    if (row_pitch as u64) < packed_row {
        return Err(format!(
            "row pitch {} is smaller than a row of mip {} ({} bytes)",
            row_pitch, mip, packed_row
        )
        .into());
    }

    let slice_size = row_pitch as u64 * (height as u64 - 1) + packed_row;
    if depth > 1 && (slice_pitch as u64) < slice_size {
        return Err(format!(
            "slice pitch {} is smaller than a slice of mip {} ({} bytes)",
            slice_pitch, mip, slice_size
        )
        .into());
    }

    Ok(slice_pitch as u64 * (depth as u64 - 1) + slice_size)
}

pub(crate) fn validate_texture_initial_data(
    def: &SgfxTextureDef,
    initial_data: &[SgfxSubresourceData],
) -> SgfxResult<()> {
    if initial_data.is_empty() {
        if def.usage == SgfxUsage::Immutable {
            return Err("immutable textures require initial data".into());
        }

        return Ok(());
    }

    if initial_data.len() != def.subresource_count() as usize {
        return Err(format!(
            "texture has {} subresources but {} were provided",
            def.subresource_count(),
            initial_data.len()
        )
        .into());
    }

    // Subresources are ordered by array slice, then mip
    for (index, subresource) in initial_data.iter().enumerate() {
        let mip = index as u32 % def.mip_count;
        let required =
            required_upload_size(def, mip, subresource.row_pitch, subresource.slice_pitch)?;
        if (subresource.data.len() as u64) < required {
            return Err(format!(
                "subresource {} has {} bytes, {} are required",
                index,
                subresource.data.len(),
                required
            )
            .into());
        }
    }

    Ok(())
}

pub(crate) fn validate_texture_update<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    texture: SgfxTextureHandle,
    mip: u32,
    array_slice: u32,
    data: &[u8],
    row_pitch: u32,
) -> SgfxResult<()> {
    let entry = tables.texture(texture)?;
    let def = &entry.def;

    if def.usage == SgfxUsage::Immutable {
        return Err("immutable textures cannot be updated".into());
    }

    if entry.swapchain.is_some() {
        return Err("swapchain back buffers cannot be updated".into());
    }

    if mip >= def.mip_count || array_slice >= def.array_length {
        return Err(format!(
            "subresource mip {} slice {} is out of range ({} mips, {} slices)",
            mip, array_slice, def.mip_count, def.array_length
        )
        .into());
    }

    let (_, height, _) = def.mip_extents(mip);
    let required = required_upload_size(def, mip, row_pitch, row_pitch * height)?;
    if (data.len() as u64) < required {
        return Err(format!(
            "texture update has {} bytes, {} are required",
            data.len(),
            required
        )
        .into());
    }

    Ok(())
}

pub(crate) fn validate_pipeline_state<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    def: &SgfxPipelineStateDef,
) -> SgfxResult<()> {
    def.verify()?;

    for (expected_stage, shader) in def.shader_stages() {
        let stage = tables.shader(shader)?.stage;
        if stage != expected_stage {
            return Err(format!(
                "a {} shader was given as the {} shader of pipeline {}",
                stage.name(),
                expected_stage.name(),
                def.debug_name.as_deref().unwrap_or("<unnamed>")
            )
            .into());
        }
    }

    Ok(())
}

pub(crate) fn validate_compute_pipeline<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    def: &SgfxComputePipelineDef,
) -> SgfxResult<()> {
    let stage = tables.shader(def.compute_shader)?.stage;
    if stage != SgfxShaderStage::Compute {
        return Err(format!(
            "a {} shader was given as the shader of compute pipeline {}",
            stage.name(),
            def.debug_name.as_deref().unwrap_or("<unnamed>")
        )
        .into());
    }

    Ok(())
}

pub(crate) fn validate_render_pass<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    def: &SgfxRenderPassDef,
) -> SgfxResult<SgfxActiveRenderPass> {
    def.verify()?;

    let mut extents: Option<(u32, u32, u32)> = None;
    let mut check_attachment = |texture_def: &SgfxTextureDef,
                                mip: u32,
                                array_slice: u32|
     -> SgfxResult<()> {
        if mip >= texture_def.mip_count || array_slice >= texture_def.array_length {
            return Err("render pass attachment subresource is out of range".into());
        }

        let (width, height, _) = texture_def.mip_extents(mip);
        let attachment_extents = (width, height, texture_def.sample_count);
        match extents {
            None => extents = Some(attachment_extents),
            Some(first) if first != attachment_extents => {
                return Err(format!(
                    "render pass attachments differ in size or sample count: {:?} vs {:?}",
                    first, attachment_extents
                )
                .into());
            }
            _ => {}
        }

        Ok(())
    };

    let mut color_formats = DynamicArray::new();
    let mut written_attachments = FnvHashSet::default();
    for target in &def.color_targets {
        let texture_def = &tables.texture(target.texture)?.def;
        if !texture_def.bind_flags.contains(SgfxBindFlags::RENDER_TARGET) {
            return Err("render pass color target was not created with RENDER_TARGET".into());
        }

        check_attachment(texture_def, target.mip_slice, target.array_slice)?;
        color_formats.push(texture_def.format);
        written_attachments.insert(target.texture);
    }

    let mut depth_format = None;
    if let Some(target) = &def.depth_target {
        let texture_def = &tables.texture(target.texture)?.def;
        if !texture_def.bind_flags.contains(SgfxBindFlags::DEPTH_STENCIL) {
            return Err("render pass depth target was not created with DEPTH_STENCIL".into());
        }

        check_attachment(texture_def, 0, 0)?;
        depth_format = Some(texture_def.format);
        if !target.read_only {
            written_attachments.insert(target.texture);
        }
    }

    let (width, height, sample_count) = extents.unwrap_or((0, 0, 1));
    Ok(SgfxActiveRenderPass {
        color_formats,
        depth_format,
        width,
        height,
        sample_count,
        written_attachments,
    })
}

pub(crate) fn validate_binding<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    binding: &SgfxBinding,
) -> SgfxResult<()> {
    match binding.resource {
        SgfxBindingResource::Unbound => Ok(()),
        SgfxBindingResource::Buffer(buffer) => {
            check_buffer_binding(
                binding.kind,
                &tables.buffer(buffer)?.def,
                binding.uav_initial_count,
            )
        }
        SgfxBindingResource::Texture(texture) => {
            check_texture_binding(
                binding.kind,
                &tables.texture(texture)?.def,
                binding.uav_initial_count,
            )
        }
        SgfxBindingResource::Sampler(sampler) => {
            tables.sampler(sampler)?;
            if binding.kind != SgfxBindingKind::Sampler {
                return Err(format!(
                    "a sampler cannot be bound to a {} slot",
                    binding.kind.name()
                )
                .into());
            }

            Ok(())
        }
    }
}

fn check_buffer_flags(
    def: &SgfxBufferDef,
    required: SgfxBindFlags,
    usage: &str,
) -> SgfxResult<()> {
    if !def.bind_flags.contains(required) {
        return Err(format!(
            "buffer used as {} was not created with {:?} (has {:?})",
            usage, required, def.bind_flags
        )
        .into());
    }

    Ok(())
}

fn check_indirect_buffer<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    buffer: SgfxBufferHandle,
    byte_offset: u32,
    argument_size: u64,
) -> SgfxResult<()> {
    let def = &tables.buffer(buffer)?.def;
    check_buffer_flags(def, SgfxBindFlags::INDIRECT_ARGS, "indirect arguments")?;
    check_range("indirect arguments", byte_offset as u64, argument_size, def.size)
}

pub(crate) fn validate_draw_queue<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    queue: &SgfxDrawQueue,
    render_pass: &SgfxActiveRenderPass,
) -> SgfxResult<()> {
    let pipeline_def = &tables.pipeline_state(queue.pipeline())?.def;

    if pipeline_def.color_formats.as_slice() != render_pass.color_formats.as_slice()
        || pipeline_def.depth_format.is_some()
            && pipeline_def.depth_format != render_pass.depth_format
        || pipeline_def.sample_count != render_pass.sample_count
    {
        return Err(format!(
            "pipeline {} targets {:?}/{:?} but the render pass has {:?}/{:?}",
            pipeline_def.debug_name.as_deref().unwrap_or("<unnamed>"),
            pipeline_def.color_formats,
            pipeline_def.depth_format,
            render_pass.color_formats,
            render_pass.depth_format
        )
        .into());
    }

    for binding in queue.all_bindings() {
        validate_binding(tables, binding)?;

        // Pixel UAVs share output slots with the render targets
        if binding.kind == SgfxBindingKind::UnorderedAccess
            && binding.stage == SgfxShaderStage::Pixel
            && (binding.slot as usize) < render_pass.color_formats.len()
        {
            return Err(format!(
                "pixel UAV slot {} overlaps one of the {} color targets",
                binding.slot,
                render_pass.color_formats.len()
            )
            .into());
        }

        if let SgfxBindingResource::Texture(texture) = binding.resource {
            if render_pass.written_attachments.contains(&texture) {
                return Err(format!(
                    "texture bound to {} slot {} is written by the current render pass",
                    binding.kind.name(),
                    binding.slot
                )
                .into());
            }
        }
    }

    for vertex_buffer in queue.all_vertex_buffers() {
        if let Some(buffer) = vertex_buffer.buffer {
            check_buffer_flags(
                &tables.buffer(buffer)?.def,
                SgfxBindFlags::VERTEX_BUFFER,
                "a vertex buffer",
            )?;
        }
    }

    for command in queue.commands() {
        if let Some(index_buffer) = command.index_buffer {
            check_buffer_flags(
                &tables.buffer(index_buffer.buffer)?.def,
                SgfxBindFlags::INDEX_BUFFER,
                "an index buffer",
            )?;
        }

        match command.params {
            SgfxDrawParams::DrawIndirect {
                buffer,
                byte_offset,
            } => check_indirect_buffer(tables, buffer, byte_offset, 16)?,
            SgfxDrawParams::DrawIndexedIndirect {
                buffer,
                byte_offset,
            } => check_indirect_buffer(tables, buffer, byte_offset, 20)?,
            _ => {}
        }
    }

    Ok(())
}

pub(crate) fn validate_compute_queue<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    queue: &SgfxComputeQueue,
) -> SgfxResult<()> {
    tables.compute_pipeline(queue.pipeline())?;

    for binding in queue.all_bindings() {
        validate_binding(tables, binding)?;
    }

    for command in queue.commands() {
        if let SgfxDispatchParams::DispatchIndirect {
            buffer,
            byte_offset,
        } = command.params
        {
            check_indirect_buffer(tables, buffer, byte_offset, 12)?;
        }
    }

    Ok(())
}

pub(crate) fn validate_uav_clear<B: SgfxBackendTypes>(
    tables: &SgfxResourceTables<B>,
    view: SgfxResourceView,
) -> SgfxResult<()> {
    let bind_flags = match view {
        SgfxResourceView::Buffer(buffer) => tables.buffer(buffer)?.def.bind_flags,
        SgfxResourceView::Texture(texture) => tables.texture(texture)?.def.bind_flags,
    };

    if !bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
        return Err("cleared resource was not created with UNORDERED_ACCESS".into());
    }

    Ok(())
}
