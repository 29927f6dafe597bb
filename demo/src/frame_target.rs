use sgfx::api::{
    SgfxColorTarget, SgfxDepthTarget, SgfxDevice, SgfxFormat, SgfxPipelineStateDef,
    SgfxRenderPassDef, SgfxResult, SgfxTextureDef, SgfxTextureHandle,
};

pub const COLOR_FORMAT: SgfxFormat = SgfxFormat::R8G8B8A8Unorm;
pub const DEPTH_FORMAT: SgfxFormat = SgfxFormat::D32Float;

/// Offscreen color and depth textures the scenes render into, in place of a window's swapchain
pub struct FrameTarget {
    pub color: SgfxTextureHandle,
    pub depth: SgfxTextureHandle,
    pub width: u32,
    pub height: u32,
}

impl FrameTarget {
    pub fn new(
        device: &mut SgfxDevice,
        width: u32,
        height: u32,
    ) -> SgfxResult<Self> {
        let color = device.create_texture(
            &SgfxTextureDef::for_render_target(width, height, COLOR_FORMAT),
            &[],
        )?;
        let depth = device.create_texture(
            &SgfxTextureDef::for_depth_stencil(width, height, DEPTH_FORMAT),
            &[],
        )?;

        Ok(FrameTarget {
            color,
            depth,
            width,
            height,
        })
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Clears color and depth
    pub fn cleared_pass(
        &self,
        clear_color: [f32; 4],
    ) -> SgfxRenderPassDef {
        SgfxRenderPassDef {
            color_targets: vec![SgfxColorTarget::cleared(self.color, clear_color)],
            depth_target: Some(SgfxDepthTarget::cleared(self.depth)),
            viewport: None,
        }
    }

    /// Keeps color and depth, with depth bound read-only when `depth_read_only` is set
    pub fn loaded_pass(
        &self,
        depth_read_only: bool,
    ) -> SgfxRenderPassDef {
        SgfxRenderPassDef {
            color_targets: vec![SgfxColorTarget::loaded(self.color)],
            depth_target: Some(SgfxDepthTarget {
                read_only: depth_read_only,
                ..SgfxDepthTarget::loaded(self.depth)
            }),
            viewport: None,
        }
    }

    /// Keeps color, no depth. Used by fullscreen passes.
    pub fn color_only_pass(&self) -> SgfxRenderPassDef {
        SgfxRenderPassDef {
            color_targets: vec![SgfxColorTarget::loaded(self.color)],
            depth_target: None,
            viewport: None,
        }
    }

    /// Pipeline that renders into color and depth
    pub fn pipeline_def(
        &self,
        mut def: SgfxPipelineStateDef,
    ) -> SgfxPipelineStateDef {
        def.color_formats = vec![COLOR_FORMAT];
        def.depth_format = Some(DEPTH_FORMAT);
        def
    }

    /// Pipeline for `color_only_pass`
    pub fn color_only_pipeline_def(
        &self,
        mut def: SgfxPipelineStateDef,
    ) -> SgfxPipelineStateDef {
        def.color_formats = vec![COLOR_FORMAT];
        def.depth_format = None;
        def
    }

    pub fn destroy(
        &self,
        device: &mut SgfxDevice,
    ) -> SgfxResult<()> {
        device.destroy_texture(self.color)?;
        device.destroy_texture(self.depth)
    }
}
