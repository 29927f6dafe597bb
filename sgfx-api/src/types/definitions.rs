use super::*;
use crate::{
    SgfxBufferHandle, SgfxResult, SgfxShaderHandle, SgfxTextureHandle,
};

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// General configuration that all backends respect
#[derive(Clone, Debug)]
pub struct SgfxApiDef {
    pub validation_mode: SgfxValidationMode,

    // Capacities of the device's handle tables. Creation fails with HandleTableFull past these.
    pub max_buffers: u32,
    pub max_textures: u32,
    pub max_samplers: u32,
    pub max_shaders: u32,
    pub max_pipeline_states: u32,
    pub max_compute_pipelines: u32,
    pub max_swapchains: u32,
}

impl Default for SgfxApiDef {
    fn default() -> Self {
        SgfxApiDef {
            validation_mode: Default::default(),
            max_buffers: 4096,
            max_textures: 4096,
            max_samplers: 256,
            max_shaders: 1024,
            max_pipeline_states: 512,
            max_compute_pipelines: 256,
            max_swapchains: 8,
        }
    }
}

impl SgfxApiDef {
    pub fn verify(&self) -> SgfxResult<()> {
        let capacities = [
            self.max_buffers,
            self.max_textures,
            self.max_samplers,
            self.max_shaders,
            self.max_pipeline_states,
            self.max_compute_pipelines,
            self.max_swapchains,
        ];

        if capacities
            .iter()
            .any(|&capacity| capacity == 0 || capacity > MAX_HANDLE_TABLE_CAPACITY)
        {
            return Err(format!(
                "handle table capacities must be between 1 and {}",
                MAX_HANDLE_TABLE_CAPACITY
            )
            .into());
        }

        let texture_capacity = self
            .max_swapchains
            .checked_mul(MAX_SWAPCHAIN_BUFFERS)
            .and_then(|back_buffers| self.max_textures.checked_add(back_buffers));
        match texture_capacity {
            Some(capacity) if capacity <= MAX_HANDLE_TABLE_CAPACITY => Ok(()),
            _ => Err(format!(
                "{} textures plus the back buffers of {} swapchains exceed {} handles",
                self.max_textures, self.max_swapchains, MAX_HANDLE_TABLE_CAPACITY
            )
            .into()),
        }
    }

    /// Size of the texture table, which also holds every swapchain's back buffers
    pub fn texture_table_capacity(&self) -> u32 {
        self.max_textures
            .saturating_add(self.max_swapchains.saturating_mul(MAX_SWAPCHAIN_BUFFERS))
    }
}

/// Used to create a buffer
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxBufferDef {
    pub size: u64,
    pub usage: SgfxUsage,
    pub bind_flags: SgfxBindFlags,
    pub flags: SgfxBufferFlags,
    /// Element size of structured buffers, 0 otherwise
    pub structure_stride: u32,
}

impl Default for SgfxBufferDef {
    fn default() -> Self {
        SgfxBufferDef {
            size: 0,
            usage: SgfxUsage::Default,
            bind_flags: SgfxBindFlags::empty(),
            flags: SgfxBufferFlags::empty(),
            structure_stride: 0,
        }
    }
}

impl SgfxBufferDef {
    pub fn verify(&self) -> SgfxResult<()> {
        if self.size == 0 {
            return Err("buffer size must be non-zero".into());
        }

        if self.size > u32::MAX as u64 {
            return Err(format!("buffer size {} exceeds the 4GB limit", self.size).into());
        }

        if self
            .bind_flags
            .intersects(SgfxBindFlags::RENDER_TARGET | SgfxBindFlags::DEPTH_STENCIL)
        {
            return Err("buffers cannot be bound as render targets or depth stencil".into());
        }

        if self.usage == SgfxUsage::Staging && !self.bind_flags.is_empty() {
            return Err("staging buffers cannot have bind flags".into());
        }

        if self.usage == SgfxUsage::Dynamic
            && self.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS)
        {
            return Err("dynamic buffers cannot be bound for unordered access".into());
        }

        if self.bind_flags.contains(SgfxBindFlags::CONSTANT_BUFFER) {
            if self.bind_flags != SgfxBindFlags::CONSTANT_BUFFER {
                return Err("constant buffers cannot have other bind flags".into());
            }

            if self.size % 16 != 0 {
                return Err(format!(
                    "constant buffer size {} is not a multiple of 16",
                    self.size
                )
                .into());
            }
        }

        if self.flags.contains(SgfxBufferFlags::STRUCTURED) {
            if self.flags.contains(SgfxBufferFlags::RAW) {
                return Err("a buffer cannot be both structured and raw".into());
            }

            if self.structure_stride == 0 {
                return Err("structured buffers require a structure stride".into());
            }

            if self.size % self.structure_stride as u64 != 0 {
                return Err(format!(
                    "structured buffer size {} is not a multiple of its stride {}",
                    self.size, self.structure_stride
                )
                .into());
            }
        }

        if self.flags.contains(SgfxBufferFlags::RAW) && self.size % 4 != 0 {
            return Err("raw buffer size must be a multiple of 4".into());
        }

        if self.flags.contains(SgfxBufferFlags::APPEND_COUNTER)
            && (!self.flags.contains(SgfxBufferFlags::STRUCTURED)
                || !self.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS))
        {
            return Err("append counters require a structured unordered access buffer".into());
        }

        Ok(())
    }

    /// Checks the initial contents passed alongside the def at creation
    pub fn verify_initial_data(
        &self,
        initial_data: Option<&[u8]>,
    ) -> SgfxResult<()> {
        match initial_data {
            None if self.usage == SgfxUsage::Immutable => {
                Err("immutable buffers require initial data".into())
            }
            Some(data) if data.len() as u64 > self.size => Err(format!(
                "initial data ({} bytes) is larger than the buffer ({} bytes)",
                data.len(),
                self.size
            )
            .into()),
            _ => Ok(()),
        }
    }

    /// Number of structures in a structured buffer, 32-bit words in a raw buffer
    pub fn element_count(&self) -> u64 {
        if self.flags.contains(SgfxBufferFlags::STRUCTURED) && self.structure_stride > 0 {
            self.size / self.structure_stride as u64
        } else {
            self.size / 4
        }
    }

    pub fn for_vertex_buffer(size: u64) -> SgfxBufferDef {
        SgfxBufferDef {
            size,
            usage: SgfxUsage::Immutable,
            bind_flags: SgfxBindFlags::VERTEX_BUFFER,
            ..Default::default()
        }
    }

    pub fn for_index_buffer(size: u64) -> SgfxBufferDef {
        SgfxBufferDef {
            size,
            usage: SgfxUsage::Immutable,
            bind_flags: SgfxBindFlags::INDEX_BUFFER,
            ..Default::default()
        }
    }

    /// Rounds size up to the 16 byte multiple constant buffers require
    pub fn for_constant_buffer(size: u64) -> SgfxBufferDef {
        SgfxBufferDef {
            size: sgfx_base::memory::round_size_up_to_alignment_u64(size, 16),
            usage: SgfxUsage::Dynamic,
            bind_flags: SgfxBindFlags::CONSTANT_BUFFER,
            ..Default::default()
        }
    }

    pub fn for_structured_buffer(
        structure_stride: u32,
        element_count: u64,
        bind_flags: SgfxBindFlags,
    ) -> SgfxBufferDef {
        SgfxBufferDef {
            size: structure_stride as u64 * element_count,
            usage: SgfxUsage::Default,
            bind_flags,
            flags: SgfxBufferFlags::STRUCTURED,
            structure_stride,
        }
    }

    pub fn for_raw_buffer(
        size: u64,
        bind_flags: SgfxBindFlags,
    ) -> SgfxBufferDef {
        SgfxBufferDef {
            size,
            usage: SgfxUsage::Default,
            bind_flags,
            flags: SgfxBufferFlags::RAW,
            structure_stride: 0,
        }
    }

    pub fn for_staging_buffer(size: u64) -> SgfxBufferDef {
        SgfxBufferDef {
            size,
            usage: SgfxUsage::Staging,
            ..Default::default()
        }
    }
}

/// Used to create a texture
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxTextureDef {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub array_length: u32,
    pub mip_count: u32,
    pub sample_count: u32,
    pub format: SgfxFormat,
    pub dimensions: SgfxTextureDimensions,
    pub usage: SgfxUsage,
    pub bind_flags: SgfxBindFlags,
}

impl Default for SgfxTextureDef {
    fn default() -> Self {
        SgfxTextureDef {
            width: 1,
            height: 1,
            depth: 1,
            array_length: 1,
            mip_count: 1,
            sample_count: 1,
            format: SgfxFormat::Unknown,
            dimensions: SgfxTextureDimensions::Dim2D,
            usage: SgfxUsage::Default,
            bind_flags: SgfxBindFlags::SHADER_RESOURCE,
        }
    }
}

impl SgfxTextureDef {
    pub fn verify(&self) -> SgfxResult<()> {
        if self.width == 0
            || self.height == 0
            || self.depth == 0
            || self.array_length == 0
            || self.mip_count == 0
        {
            return Err("texture extents, array length and mip count must be non-zero".into());
        }

        if self.format == SgfxFormat::Unknown {
            return Err("texture format must be specified".into());
        }

        if !matches!(self.sample_count, 1 | 2 | 4 | 8 | 16) {
            return Err(format!("unsupported sample count {}", self.sample_count).into());
        }

        if self.sample_count > 1 && self.mip_count > 1 {
            return Err("multisampled textures cannot have mips".into());
        }

        if self.mip_count > self.max_mip_count() {
            return Err(format!(
                "mip count {} exceeds the {} mips a {}x{}x{} texture can have",
                self.mip_count,
                self.max_mip_count(),
                self.width,
                self.height,
                self.depth
            )
            .into());
        }

        match self.dimensions {
            SgfxTextureDimensions::Dim1D => {
                if self.height != 1 || self.depth != 1 {
                    return Err("1D textures must have height and depth of 1".into());
                }
            }
            SgfxTextureDimensions::Dim2D => {
                if self.depth != 1 {
                    return Err("2D textures must have depth of 1".into());
                }
            }
            SgfxTextureDimensions::Dim3D => {
                if self.array_length != 1 {
                    return Err("3D textures cannot be arrays".into());
                }
            }
            SgfxTextureDimensions::Cube => {
                if self.array_length % 6 != 0 {
                    return Err(format!(
                        "cube texture array length {} is not a multiple of 6",
                        self.array_length
                    )
                    .into());
                }

                if self.width != self.height || self.depth != 1 {
                    return Err("cube textures must be square with depth of 1".into());
                }
            }
        }

        if self.bind_flags.intersects(
            SgfxBindFlags::VERTEX_BUFFER
                | SgfxBindFlags::INDEX_BUFFER
                | SgfxBindFlags::CONSTANT_BUFFER
                | SgfxBindFlags::INDIRECT_ARGS,
        ) {
            return Err("textures can only be bound as resources, UAVs or attachments".into());
        }

        if self.usage == SgfxUsage::Staging && !self.bind_flags.is_empty() {
            return Err("staging textures cannot have bind flags".into());
        }

        if self.format.is_depth_stencil() {
            if self
                .bind_flags
                .intersects(SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::RENDER_TARGET)
            {
                return Err(format!(
                    "depth format {:?} cannot be bound as a render target or for unordered access",
                    self.format
                )
                .into());
            }
        } else if self.bind_flags.contains(SgfxBindFlags::DEPTH_STENCIL) {
            return Err(format!(
                "format {:?} cannot be bound as depth stencil",
                self.format
            )
            .into());
        }

        if self.sample_count > 1 && self.bind_flags.contains(SgfxBindFlags::UNORDERED_ACCESS) {
            return Err("multisampled textures cannot be bound for unordered access".into());
        }

        Ok(())
    }

    /// Number of mips in a full chain down to 1x1x1
    pub fn max_mip_count(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth);
        32 - largest.leading_zeros()
    }

    /// Extents of the given mip level, never smaller than 1
    pub fn mip_extents(
        &self,
        mip: u32,
    ) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        )
    }

    pub fn subresource_count(&self) -> u32 {
        self.mip_count * self.array_length
    }

    /// Tightly packed size in bytes of one array slice of a mip level
    pub fn mip_size_in_bytes(
        &self,
        mip: u32,
    ) -> u64 {
        let (width, height, depth) = self.mip_extents(mip);
        width as u64 * height as u64 * depth as u64 * self.format.block_size_in_bytes() as u64
    }

    pub fn for_texture_2d(
        width: u32,
        height: u32,
        format: SgfxFormat,
    ) -> SgfxTextureDef {
        SgfxTextureDef {
            width,
            height,
            format,
            usage: SgfxUsage::Immutable,
            bind_flags: SgfxBindFlags::SHADER_RESOURCE,
            ..Default::default()
        }
    }

    /// Color target that can also be sampled by later passes
    pub fn for_render_target(
        width: u32,
        height: u32,
        format: SgfxFormat,
    ) -> SgfxTextureDef {
        SgfxTextureDef {
            width,
            height,
            format,
            bind_flags: SgfxBindFlags::RENDER_TARGET | SgfxBindFlags::SHADER_RESOURCE,
            ..Default::default()
        }
    }

    pub fn for_depth_stencil(
        width: u32,
        height: u32,
        format: SgfxFormat,
    ) -> SgfxTextureDef {
        SgfxTextureDef {
            width,
            height,
            format,
            bind_flags: SgfxBindFlags::DEPTH_STENCIL,
            ..Default::default()
        }
    }
}

/// Initial contents of one subresource (mip level of an array slice)
#[derive(Copy, Clone, Debug)]
pub struct SgfxSubresourceData<'a> {
    pub data: &'a [u8],
    /// Bytes between rows
    pub row_pitch: u32,
    /// Bytes between depth slices of 3D textures
    pub slice_pitch: u32,
}

impl<'a> SgfxSubresourceData<'a> {
    /// Tightly packed data for the given texture's mip level
    pub fn packed(
        def: &SgfxTextureDef,
        mip: u32,
        data: &'a [u8],
    ) -> Self {
        let (width, height, _) = def.mip_extents(mip);
        let row_pitch = width * def.format.block_size_in_bytes();
        SgfxSubresourceData {
            data,
            row_pitch,
            slice_pitch: row_pitch * height,
        }
    }
}

/// Used to create a sampler
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxSamplerDef {
    pub min_filter: SgfxFilter,
    pub mag_filter: SgfxFilter,
    pub mip_filter: SgfxFilter,
    pub address_mode_u: SgfxAddressMode,
    pub address_mode_v: SgfxAddressMode,
    pub address_mode_w: SgfxAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: u32,
    /// Makes this a comparison sampler (SampleCmp)
    pub compare_op: Option<SgfxCompareOp>,
    pub border_color: [f32; 4],
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SgfxSamplerDef {
    fn default() -> Self {
        SgfxSamplerDef {
            min_filter: SgfxFilter::Linear,
            mag_filter: SgfxFilter::Linear,
            mip_filter: SgfxFilter::Linear,
            address_mode_u: SgfxAddressMode::Wrap,
            address_mode_v: SgfxAddressMode::Wrap,
            address_mode_w: SgfxAddressMode::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            compare_op: None,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl SgfxSamplerDef {
    pub fn verify(&self) -> SgfxResult<()> {
        if self.max_anisotropy == 0 || self.max_anisotropy > 16 {
            return Err(format!(
                "max anisotropy {} must be between 1 and 16",
                self.max_anisotropy
            )
            .into());
        }

        if self.min_lod > self.max_lod {
            return Err("sampler min lod is larger than max lod".into());
        }

        Ok(())
    }

    pub fn is_anisotropic(&self) -> bool {
        self.min_filter == SgfxFilter::Anisotropic
            || self.mag_filter == SgfxFilter::Anisotropic
            || self.mip_filter == SgfxFilter::Anisotropic
    }

    pub fn point_clamp() -> SgfxSamplerDef {
        SgfxSamplerDef {
            min_filter: SgfxFilter::Point,
            mag_filter: SgfxFilter::Point,
            mip_filter: SgfxFilter::Point,
            address_mode_u: SgfxAddressMode::Clamp,
            address_mode_v: SgfxAddressMode::Clamp,
            address_mode_w: SgfxAddressMode::Clamp,
            ..Default::default()
        }
    }

    pub fn linear_clamp() -> SgfxSamplerDef {
        SgfxSamplerDef {
            address_mode_u: SgfxAddressMode::Clamp,
            address_mode_v: SgfxAddressMode::Clamp,
            address_mode_w: SgfxAddressMode::Clamp,
            ..Default::default()
        }
    }
}

/// Compiled or source shader payload, which variant is accepted depends on the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SgfxShaderCode {
    /// DXBC or DXIL bytecode as produced by fxc/dxc (dx11, dx12)
    D3dBytecode(#[cfg_attr(feature = "serde-support", serde(with = "serde_bytes"))] Vec<u8>),
    /// GLSL source (gl4)
    Glsl(String),
    /// Arbitrary bytes, only accepted by the null backend
    Opaque(#[cfg_attr(feature = "serde-support", serde(with = "serde_bytes"))] Vec<u8>),
}

impl SgfxShaderCode {
    pub fn is_empty(&self) -> bool {
        match self {
            SgfxShaderCode::D3dBytecode(bytes) => bytes.is_empty(),
            SgfxShaderCode::Glsl(source) => source.trim().is_empty(),
            SgfxShaderCode::Opaque(bytes) => bytes.is_empty(),
        }
    }
}

/// Used to create a shader
#[derive(Clone, Debug)]
pub struct SgfxShaderDef {
    pub stage: SgfxShaderStage,
    pub entry_point: String,
    pub code: SgfxShaderCode,
    pub debug_name: Option<String>,
}

impl SgfxShaderDef {
    pub fn verify(&self) -> SgfxResult<()> {
        if self.code.is_empty() {
            return Err(format!(
                "{} shader {} has no code",
                self.stage.name(),
                self.debug_name.as_deref().unwrap_or(&self.entry_point)
            )
            .into());
        }

        if self.entry_point.is_empty() {
            return Err("shader entry point must be specified".into());
        }

        Ok(())
    }
}

/// One vertex attribute of a pipeline's input layout
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxInputElement {
    /// HLSL semantic name, e.g. "POSITION" (D3D). GL matches attributes by location, which is the
    /// element's index in the layout.
    pub semantic: String,
    pub semantic_index: u32,
    pub format: SgfxFormat,
    /// Vertex buffer slot the attribute is read from
    pub slot: u32,
    pub byte_offset: u32,
    pub rate: SgfxInputRate,
}

impl SgfxInputElement {
    pub fn per_vertex(
        semantic: &str,
        format: SgfxFormat,
        slot: u32,
        byte_offset: u32,
    ) -> Self {
        SgfxInputElement {
            semantic: semantic.to_string(),
            semantic_index: 0,
            format,
            slot,
            byte_offset,
            rate: SgfxInputRate::PerVertex,
        }
    }

    pub fn per_instance(
        semantic: &str,
        semantic_index: u32,
        format: SgfxFormat,
        slot: u32,
        byte_offset: u32,
    ) -> Self {
        SgfxInputElement {
            semantic: semantic.to_string(),
            semantic_index,
            format,
            slot,
            byte_offset,
            rate: SgfxInputRate::PerInstance,
        }
    }
}

/// Blending of a single render target
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxRenderTargetBlendState {
    pub blend_enable: bool,
    pub src_color: SgfxBlendFactor,
    pub dst_color: SgfxBlendFactor,
    pub color_op: SgfxBlendOp,
    pub src_alpha: SgfxBlendFactor,
    pub dst_alpha: SgfxBlendFactor,
    pub alpha_op: SgfxBlendOp,
    pub write_mask: SgfxColorWriteMask,
}

impl Default for SgfxRenderTargetBlendState {
    fn default() -> Self {
        SgfxRenderTargetBlendState {
            blend_enable: false,
            src_color: SgfxBlendFactor::One,
            dst_color: SgfxBlendFactor::Zero,
            color_op: SgfxBlendOp::Add,
            src_alpha: SgfxBlendFactor::One,
            dst_alpha: SgfxBlendFactor::Zero,
            alpha_op: SgfxBlendOp::Add,
            write_mask: SgfxColorWriteMask::ALL,
        }
    }
}

impl SgfxRenderTargetBlendState {
    /// Standard premultiplied-free alpha blending
    pub fn alpha_blended() -> Self {
        SgfxRenderTargetBlendState {
            blend_enable: true,
            src_color: SgfxBlendFactor::SrcAlpha,
            dst_color: SgfxBlendFactor::InvSrcAlpha,
            src_alpha: SgfxBlendFactor::One,
            dst_alpha: SgfxBlendFactor::InvSrcAlpha,
            ..Default::default()
        }
    }

    pub fn additive() -> Self {
        SgfxRenderTargetBlendState {
            blend_enable: true,
            src_color: SgfxBlendFactor::SrcAlpha,
            dst_color: SgfxBlendFactor::One,
            src_alpha: SgfxBlendFactor::One,
            dst_alpha: SgfxBlendFactor::One,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxBlendState {
    pub alpha_to_coverage: bool,
    /// One entry per render target. A single entry applies to every target.
    pub render_targets: Vec<SgfxRenderTargetBlendState>,
}

impl SgfxBlendState {
    pub fn opaque() -> Self {
        Self::for_all_targets(Default::default())
    }

    pub fn for_all_targets(blend: SgfxRenderTargetBlendState) -> Self {
        SgfxBlendState {
            alpha_to_coverage: false,
            render_targets: vec![blend],
        }
    }

    /// Blend state that applies to the given render target index
    pub fn target(
        &self,
        index: usize,
    ) -> SgfxRenderTargetBlendState {
        match self.render_targets.len() {
            0 => Default::default(),
            1 => self.render_targets[0],
            _ => self
                .render_targets
                .get(index)
                .copied()
                .unwrap_or_default(),
        }
    }

    pub fn is_independent(&self) -> bool {
        self.render_targets.len() > 1
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxStencilFaceState {
    pub fail_op: SgfxStencilOp,
    pub depth_fail_op: SgfxStencilOp,
    pub pass_op: SgfxStencilOp,
    pub compare_op: SgfxCompareOp,
}

impl Default for SgfxStencilFaceState {
    fn default() -> Self {
        SgfxStencilFaceState {
            fail_op: SgfxStencilOp::Keep,
            depth_fail_op: SgfxStencilOp::Keep,
            pass_op: SgfxStencilOp::Keep,
            compare_op: SgfxCompareOp::Always,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxDepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: SgfxCompareOp,
    pub stencil_test_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: SgfxStencilFaceState,
    pub back_face: SgfxStencilFaceState,
}

impl Default for SgfxDepthStencilState {
    fn default() -> Self {
        SgfxDepthStencilState {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: SgfxCompareOp::Less,
            stencil_test_enable: false,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            front_face: Default::default(),
            back_face: Default::default(),
        }
    }
}

impl SgfxDepthStencilState {
    pub fn disabled() -> Self {
        SgfxDepthStencilState {
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: SgfxCompareOp::Always,
            ..Default::default()
        }
    }

    /// Depth tested against the buffer but not written, used by transparent passes
    pub fn read_only() -> Self {
        SgfxDepthStencilState {
            depth_write_enable: false,
            ..Default::default()
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxRasterizerState {
    pub cull_mode: SgfxCullMode,
    pub fill_mode: SgfxFillMode,
    pub front_face: SgfxFrontFace,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub scissor_enable: bool,
    pub multisample_enable: bool,
}

impl Default for SgfxRasterizerState {
    fn default() -> Self {
        SgfxRasterizerState {
            cull_mode: SgfxCullMode::Back,
            fill_mode: SgfxFillMode::Solid,
            front_face: SgfxFrontFace::Clockwise,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            scissor_enable: false,
            multisample_enable: false,
        }
    }
}

impl SgfxRasterizerState {
    pub fn no_cull() -> Self {
        SgfxRasterizerState {
            cull_mode: SgfxCullMode::None,
            ..Default::default()
        }
    }
}

/// Used to create a graphics pipeline
#[derive(Clone, Debug)]
pub struct SgfxPipelineStateDef {
    pub vertex_shader: SgfxShaderHandle,
    pub hull_shader: Option<SgfxShaderHandle>,
    pub domain_shader: Option<SgfxShaderHandle>,
    pub geometry_shader: Option<SgfxShaderHandle>,
    /// None for depth-only or UAV-only passes
    pub pixel_shader: Option<SgfxShaderHandle>,
    pub input_layout: Vec<SgfxInputElement>,
    pub primitive_topology: SgfxPrimitiveTopology,
    pub blend_state: SgfxBlendState,
    pub depth_stencil_state: SgfxDepthStencilState,
    pub rasterizer_state: SgfxRasterizerState,
    pub color_formats: Vec<SgfxFormat>,
    pub depth_format: Option<SgfxFormat>,
    pub sample_count: u32,
    pub debug_name: Option<String>,
}

impl SgfxPipelineStateDef {
    pub fn new(
        vertex_shader: SgfxShaderHandle,
        pixel_shader: Option<SgfxShaderHandle>,
    ) -> Self {
        SgfxPipelineStateDef {
            vertex_shader,
            hull_shader: None,
            domain_shader: None,
            geometry_shader: None,
            pixel_shader,
            input_layout: Vec::default(),
            primitive_topology: SgfxPrimitiveTopology::TriangleList,
            blend_state: SgfxBlendState::opaque(),
            depth_stencil_state: Default::default(),
            rasterizer_state: Default::default(),
            color_formats: Vec::default(),
            depth_format: None,
            sample_count: 1,
            debug_name: None,
        }
    }

    /// Shader handles paired with the stage each must have
    pub fn shader_stages(&self) -> impl Iterator<Item = (SgfxShaderStage, SgfxShaderHandle)> + '_ {
        std::iter::once((SgfxShaderStage::Vertex, self.vertex_shader))
            .chain(self.hull_shader.map(|x| (SgfxShaderStage::Hull, x)))
            .chain(self.domain_shader.map(|x| (SgfxShaderStage::Domain, x)))
            .chain(self.geometry_shader.map(|x| (SgfxShaderStage::Geometry, x)))
            .chain(self.pixel_shader.map(|x| (SgfxShaderStage::Pixel, x)))
    }

    pub fn verify(&self) -> SgfxResult<()> {
        if self.color_formats.len() > MAX_RENDER_TARGETS as usize {
            return Err(format!(
                "pipeline has {} color formats, the limit is {}",
                self.color_formats.len(),
                MAX_RENDER_TARGETS
            )
            .into());
        }

        if let Some(format) = self
            .color_formats
            .iter()
            .find(|format| format.is_depth_stencil() || **format == SgfxFormat::Unknown)
        {
            return Err(format!("{:?} is not a color format", format).into());
        }

        if let Some(depth_format) = self.depth_format {
            if !depth_format.has_depth() {
                return Err(format!("{:?} is not a depth format", depth_format).into());
            }
        }

        if self.hull_shader.is_some() != self.domain_shader.is_some() {
            return Err("hull and domain shaders must be used together".into());
        }

        if self.blend_state.render_targets.len() > 1
            && self.blend_state.render_targets.len() != self.color_formats.len()
        {
            return Err("independent blend states must match the number of color formats".into());
        }

        for element in &self.input_layout {
            if element.slot >= MAX_VERTEX_BUFFER_SLOTS {
                return Err(format!(
                    "input element {} reads vertex buffer slot {}, the limit is {}",
                    element.semantic, element.slot, MAX_VERTEX_BUFFER_SLOTS
                )
                .into());
            }

            if element.format.block_size_in_bytes() == 0 || element.format.is_depth_stencil() {
                return Err(format!(
                    "input element {} has unusable format {:?}",
                    element.semantic, element.format
                )
                .into());
            }
        }

        Ok(())
    }
}

/// Used to create a compute pipeline
#[derive(Clone, Debug)]
pub struct SgfxComputePipelineDef {
    pub compute_shader: SgfxShaderHandle,
    pub debug_name: Option<String>,
}

/// Used to create a swapchain
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct SgfxSwapchainDef {
    pub width: u32,
    pub height: u32,
    pub format: SgfxFormat,
    pub buffer_count: u32,
    pub enable_vsync: bool,
}

impl Default for SgfxSwapchainDef {
    fn default() -> Self {
        SgfxSwapchainDef {
            width: 0,
            height: 0,
            format: SgfxFormat::B8G8R8A8Unorm,
            buffer_count: 2,
            enable_vsync: true,
        }
    }
}

impl SgfxSwapchainDef {
    pub fn verify(&self) -> SgfxResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err("swapchain extents must be non-zero".into());
        }

        if !(2..=MAX_SWAPCHAIN_BUFFERS).contains(&self.buffer_count) {
            return Err(format!(
                "swapchain buffer count {} must be between 2 and {}",
                self.buffer_count, MAX_SWAPCHAIN_BUFFERS
            )
            .into());
        }

        if self.format.is_depth_stencil() || self.format == SgfxFormat::Unknown {
            return Err(format!("{:?} cannot be used for a swapchain", self.format).into());
        }

        Ok(())
    }
}

/// A color attachment of a render pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SgfxColorTarget {
    pub texture: SgfxTextureHandle,
    pub mip_slice: u32,
    pub array_slice: u32,
    pub load_op: SgfxLoadOp,
    pub clear_value: [f32; 4],
}

impl SgfxColorTarget {
    pub fn cleared(
        texture: SgfxTextureHandle,
        clear_value: [f32; 4],
    ) -> Self {
        SgfxColorTarget {
            texture,
            mip_slice: 0,
            array_slice: 0,
            load_op: SgfxLoadOp::Clear,
            clear_value,
        }
    }

    pub fn loaded(texture: SgfxTextureHandle) -> Self {
        SgfxColorTarget {
            texture,
            mip_slice: 0,
            array_slice: 0,
            load_op: SgfxLoadOp::Load,
            clear_value: [0.0; 4],
        }
    }
}

/// The depth/stencil attachment of a render pass
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SgfxDepthTarget {
    pub texture: SgfxTextureHandle,
    pub depth_load_op: SgfxLoadOp,
    pub stencil_load_op: SgfxLoadOp,
    pub clear_depth: f32,
    pub clear_stencil: u8,
    /// Bound read-only so the same texture can be sampled in the pass
    pub read_only: bool,
}

impl SgfxDepthTarget {
    pub fn cleared(texture: SgfxTextureHandle) -> Self {
        SgfxDepthTarget {
            texture,
            depth_load_op: SgfxLoadOp::Clear,
            stencil_load_op: SgfxLoadOp::Clear,
            clear_depth: 1.0,
            clear_stencil: 0,
            read_only: false,
        }
    }

    pub fn loaded(texture: SgfxTextureHandle) -> Self {
        SgfxDepthTarget {
            texture,
            depth_load_op: SgfxLoadOp::Load,
            stencil_load_op: SgfxLoadOp::Load,
            clear_depth: 1.0,
            clear_stencil: 0,
            read_only: false,
        }
    }
}

/// Begins a render pass, all draw queues are submitted between begin and end
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SgfxRenderPassDef {
    pub color_targets: Vec<SgfxColorTarget>,
    pub depth_target: Option<SgfxDepthTarget>,
    /// Defaults to the full extents of the first attachment
    pub viewport: Option<SgfxViewport>,
}

impl SgfxRenderPassDef {
    pub fn verify(&self) -> SgfxResult<()> {
        if self.color_targets.is_empty() && self.depth_target.is_none() {
            return Err("render pass has no attachments".into());
        }

        if self.color_targets.len() > MAX_RENDER_TARGETS as usize {
            return Err(format!(
                "render pass has {} color targets, the limit is {}",
                self.color_targets.len(),
                MAX_RENDER_TARGETS
            )
            .into());
        }

        Ok(())
    }

    pub fn attachments(&self) -> impl Iterator<Item = SgfxTextureHandle> + '_ {
        self.color_targets
            .iter()
            .map(|target| target.texture)
            .chain(self.depth_target.iter().map(|target| target.texture))
    }
}

/// Region of a buffer, used by copies and indirect arguments
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SgfxBufferRange {
    pub buffer: SgfxBufferHandle,
    pub byte_offset: u64,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_def_verify() {
        assert!(SgfxApiDef::default().verify().is_ok());

        let no_shaders = SgfxApiDef {
            max_shaders: 0,
            ..Default::default()
        };
        assert!(no_shaders.verify().is_err());

        let huge_buffers = SgfxApiDef {
            max_buffers: MAX_HANDLE_TABLE_CAPACITY + 1,
            ..Default::default()
        };
        assert!(huge_buffers.verify().is_err());

        // Back buffers share the texture table
        let texture_overflow = SgfxApiDef {
            max_textures: u32::MAX - 16,
            max_swapchains: 1,
            ..Default::default()
        };
        assert!(texture_overflow.verify().is_err());

        let back_buffers_overflow = SgfxApiDef {
            max_textures: MAX_HANDLE_TABLE_CAPACITY - 8,
            max_swapchains: 1,
            ..Default::default()
        };
        assert!(back_buffers_overflow.verify().is_err());

        let at_limit = SgfxApiDef {
            max_textures: MAX_HANDLE_TABLE_CAPACITY - MAX_SWAPCHAIN_BUFFERS,
            max_swapchains: 1,
            ..Default::default()
        };
        assert!(at_limit.verify().is_ok());
        assert_eq!(at_limit.texture_table_capacity(), MAX_HANDLE_TABLE_CAPACITY);
    }

    #[test]
    fn test_buffer_def_verify() {
        assert!(SgfxBufferDef::for_constant_buffer(100).verify().is_ok());
        assert_eq!(SgfxBufferDef::for_constant_buffer(100).size, 112);
        assert!(SgfxBufferDef::default().verify().is_err());

        let mut staging = SgfxBufferDef::for_staging_buffer(64);
        assert!(staging.verify().is_ok());
        staging.bind_flags = SgfxBindFlags::SHADER_RESOURCE;
        assert!(staging.verify().is_err());

        let mut structured =
            SgfxBufferDef::for_structured_buffer(16, 10, SgfxBindFlags::UNORDERED_ACCESS);
        assert!(structured.verify().is_ok());
        assert_eq!(structured.element_count(), 10);
        structured.structure_stride = 0;
        assert!(structured.verify().is_err());

        let mut constant = SgfxBufferDef::for_constant_buffer(16);
        constant.bind_flags |= SgfxBindFlags::SHADER_RESOURCE;
        assert!(constant.verify().is_err());
    }

    #[test]
    fn test_append_counter_requirements() {
        let mut def = SgfxBufferDef::for_structured_buffer(
            8,
            4,
            SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::SHADER_RESOURCE,
        );
        def.flags |= SgfxBufferFlags::APPEND_COUNTER;
        assert!(def.verify().is_ok());

        def.bind_flags = SgfxBindFlags::SHADER_RESOURCE;
        assert!(def.verify().is_err());

        let mut raw = SgfxBufferDef::for_raw_buffer(16, SgfxBindFlags::UNORDERED_ACCESS);
        raw.flags |= SgfxBufferFlags::APPEND_COUNTER;
        assert!(raw.verify().is_err());
    }

    #[test]
    fn test_immutable_needs_data() {
        let def = SgfxBufferDef::for_vertex_buffer(12);
        assert!(def.verify_initial_data(None).is_err());
        assert!(def.verify_initial_data(Some(&[0; 12])).is_ok());
        assert!(def.verify_initial_data(Some(&[0; 13])).is_err());
    }

    #[test]
    fn test_texture_def_verify() {
        let color = SgfxTextureDef::for_render_target(64, 32, SgfxFormat::R8G8B8A8Unorm);
        assert!(color.verify().is_ok());
        assert_eq!(color.max_mip_count(), 7);

        let mut depth = SgfxTextureDef::for_depth_stencil(64, 64, SgfxFormat::D32Float);
        assert!(depth.verify().is_ok());
        depth.bind_flags |= SgfxBindFlags::UNORDERED_ACCESS;
        assert!(depth.verify().is_err());

        let mut not_depth = SgfxTextureDef::for_depth_stencil(64, 64, SgfxFormat::R32Float);
        assert!(not_depth.verify().is_err());
        not_depth.bind_flags = SgfxBindFlags::SHADER_RESOURCE;
        assert!(not_depth.verify().is_ok());

        let cube = SgfxTextureDef {
            width: 16,
            height: 16,
            array_length: 5,
            format: SgfxFormat::R8G8B8A8Unorm,
            dimensions: SgfxTextureDimensions::Cube,
            ..Default::default()
        };
        assert!(cube.verify().is_err());
        assert!(SgfxTextureDef {
            array_length: 12,
            ..cube.clone()
        }
        .verify()
        .is_ok());

        let too_many_mips = SgfxTextureDef {
            mip_count: 8,
            ..color
        };
        assert!(too_many_mips.verify().is_err());
    }

    #[test]
    fn test_mip_extents() {
        let def = SgfxTextureDef {
            width: 16,
            height: 4,
            mip_count: 5,
            format: SgfxFormat::R32Float,
            ..Default::default()
        };
        assert_eq!(def.mip_extents(0), (16, 4, 1));
        assert_eq!(def.mip_extents(3), (2, 1, 1));
        assert_eq!(def.mip_size_in_bytes(1), 8 * 2 * 4);
        assert_eq!(def.subresource_count(), 5);
    }

    #[test]
    fn test_pipeline_def_verify() {
        let mut def = SgfxPipelineStateDef::new(SgfxShaderHandle::INVALID, None);
        def.color_formats = vec![SgfxFormat::R8G8B8A8Unorm];
        def.depth_format = Some(SgfxFormat::D32Float);
        assert!(def.verify().is_ok());

        def.color_formats.push(SgfxFormat::D32Float);
        assert!(def.verify().is_err());
        def.color_formats.pop();

        def.input_layout
            .push(SgfxInputElement::per_vertex("POSITION", SgfxFormat::R32G32B32Float, 16, 0));
        assert!(def.verify().is_err());
    }

    #[test]
    fn test_blend_state_targets() {
        let blend = SgfxBlendState::for_all_targets(SgfxRenderTargetBlendState::additive());
        assert!(blend.target(5).blend_enable);
        assert!(!blend.is_independent());
        assert!(!SgfxBlendState::default().target(0).blend_enable);
    }
}
