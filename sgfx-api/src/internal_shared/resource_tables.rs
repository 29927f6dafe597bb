use crate::{
    SgfxApiDef, SgfxBufferDef, SgfxBufferHandle, SgfxComputePipelineHandle, SgfxError,
    SgfxHandleKind, SgfxPipelineStateDef, SgfxPipelineStateHandle, SgfxResult, SgfxSamplerDef,
    SgfxSamplerHandle, SgfxShaderHandle, SgfxShaderStage, SgfxSwapchainDef, SgfxSwapchainHandle,
    SgfxTextureDef, SgfxTextureHandle,
};
use sgfx_base::HandleTable;

/// Native object types of a backend
pub(crate) trait SgfxBackendTypes {
    type Buffer;
    type Texture;
    type Sampler;
    type Shader;
    type PipelineState;
    type ComputePipeline;
    type Swapchain;
}

pub(crate) struct SgfxBufferEntry<T> {
    pub def: SgfxBufferDef,
    pub native: T,
}

pub(crate) struct SgfxTextureEntry<T> {
    pub def: SgfxTextureDef,
    /// Set for back buffers, which are created and destroyed by their swapchain
    pub swapchain: Option<SgfxSwapchainHandle>,
    pub native: T,
}

pub(crate) struct SgfxSamplerEntry<T> {
    pub def: SgfxSamplerDef,
    pub native: T,
}

pub(crate) struct SgfxShaderEntry<T> {
    pub stage: SgfxShaderStage,
    pub native: T,
}

pub(crate) struct SgfxPipelineStateEntry<T> {
    pub def: SgfxPipelineStateDef,
    pub native: T,
}

pub(crate) struct SgfxComputePipelineEntry<T> {
    pub shader: SgfxShaderHandle,
    pub native: T,
}

pub(crate) struct SgfxSwapchainEntry<T> {
    pub def: SgfxSwapchainDef,
    pub back_buffers: Vec<SgfxTextureHandle>,
    pub current_back_buffer: usize,
    pub native: T,
}

impl<T> SgfxSwapchainEntry<T> {
    pub fn current_texture(&self) -> SgfxTextureHandle {
        self.back_buffers
            .get(self.current_back_buffer)
            .copied()
            .unwrap_or(SgfxTextureHandle::INVALID)
    }
}

/// Count of live objects per kind, excluding swapchain back buffers
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SgfxLiveResources {
    pub buffers: usize,
    pub textures: usize,
    pub samplers: usize,
    pub shaders: usize,
    pub pipeline_states: usize,
    pub compute_pipelines: usize,
    pub swapchains: usize,
}

impl SgfxLiveResources {
    pub fn count(
        &self,
        kind: SgfxHandleKind,
    ) -> usize {
        match kind {
            SgfxHandleKind::Buffer => self.buffers,
            SgfxHandleKind::Texture => self.textures,
            SgfxHandleKind::Sampler => self.samplers,
            SgfxHandleKind::Shader => self.shaders,
            SgfxHandleKind::PipelineState => self.pipeline_states,
            SgfxHandleKind::ComputePipeline => self.compute_pipelines,
            SgfxHandleKind::Swapchain => self.swapchains,
        }
    }

    pub fn total(&self) -> usize {
        SgfxHandleKind::ALL.iter().map(|&kind| self.count(kind)).sum()
    }
}

/// Every object a device owns, addressed by the typed handles given to the user. All backends
/// store their native objects here so that handle resolution and validation are shared.
pub(crate) struct SgfxResourceTables<B: SgfxBackendTypes> {
    pub buffers: HandleTable<SgfxBufferEntry<B::Buffer>>,
    pub textures: HandleTable<SgfxTextureEntry<B::Texture>>,
    pub samplers: HandleTable<SgfxSamplerEntry<B::Sampler>>,
    pub shaders: HandleTable<SgfxShaderEntry<B::Shader>>,
    pub pipeline_states: HandleTable<SgfxPipelineStateEntry<B::PipelineState>>,
    pub compute_pipelines: HandleTable<SgfxComputePipelineEntry<B::ComputePipeline>>,
    pub swapchains: HandleTable<SgfxSwapchainEntry<B::Swapchain>>,
}

macro_rules! table_accessors {
    ($table:ident, $get:ident, $get_mut:ident, $insert:ident, $remove:ident, $handle:ident, $entry:ident, $native:ident) => {
        pub fn $get(
            &self,
            handle: $handle,
        ) -> SgfxResult<&$entry<B::$native>> {
            self.$table
                .get(handle.raw())
                .ok_or(SgfxError::InvalidHandle($handle::KIND))
        }

        #[allow(dead_code)]
        pub fn $get_mut(
            &mut self,
            handle: $handle,
        ) -> SgfxResult<&mut $entry<B::$native>> {
            self.$table
                .get_mut(handle.raw())
                .ok_or(SgfxError::InvalidHandle($handle::KIND))
        }

        pub fn $insert(
            &mut self,
            entry: $entry<B::$native>,
        ) -> SgfxResult<$handle> {
            self.$table
                .insert(entry)
                .map($handle::from_raw)
                .ok_or(SgfxError::HandleTableFull($handle::KIND))
        }

        pub fn $remove(
            &mut self,
            handle: $handle,
        ) -> SgfxResult<$entry<B::$native>> {
            self.$table
                .remove(handle.raw())
                .ok_or(SgfxError::InvalidHandle($handle::KIND))
        }
    };
}

impl<B: SgfxBackendTypes> SgfxResourceTables<B> {
    pub fn new(api_def: &SgfxApiDef) -> Self {
        SgfxResourceTables {
            buffers: HandleTable::new(api_def.max_buffers),
            // Back buffers live in the texture table too
            textures: HandleTable::new(api_def.texture_table_capacity()),
            samplers: HandleTable::new(api_def.max_samplers),
            shaders: HandleTable::new(api_def.max_shaders),
            pipeline_states: HandleTable::new(api_def.max_pipeline_states),
            compute_pipelines: HandleTable::new(api_def.max_compute_pipelines),
            swapchains: HandleTable::new(api_def.max_swapchains),
        }
    }

    table_accessors!(
        buffers,
        buffer,
        buffer_mut,
        insert_buffer,
        remove_buffer,
        SgfxBufferHandle,
        SgfxBufferEntry,
        Buffer
    );
    table_accessors!(
        textures,
        texture,
        texture_mut,
        insert_texture,
        remove_texture,
        SgfxTextureHandle,
        SgfxTextureEntry,
        Texture
    );
    table_accessors!(
        samplers,
        sampler,
        sampler_mut,
        insert_sampler,
        remove_sampler,
        SgfxSamplerHandle,
        SgfxSamplerEntry,
        Sampler
    );
    table_accessors!(
        shaders,
        shader,
        shader_mut,
        insert_shader,
        remove_shader,
        SgfxShaderHandle,
        SgfxShaderEntry,
        Shader
    );
    table_accessors!(
        pipeline_states,
        pipeline_state,
        pipeline_state_mut,
        insert_pipeline_state,
        remove_pipeline_state,
        SgfxPipelineStateHandle,
        SgfxPipelineStateEntry,
        PipelineState
    );
    table_accessors!(
        compute_pipelines,
        compute_pipeline,
        compute_pipeline_mut,
        insert_compute_pipeline,
        remove_compute_pipeline,
        SgfxComputePipelineHandle,
        SgfxComputePipelineEntry,
        ComputePipeline
    );
    table_accessors!(
        swapchains,
        swapchain,
        swapchain_mut,
        insert_swapchain,
        remove_swapchain,
        SgfxSwapchainHandle,
        SgfxSwapchainEntry,
        Swapchain
    );

    /// Fails before any native object is created if the table for `kind` has no free slot
    pub fn ensure_capacity(
        &self,
        kind: SgfxHandleKind,
        required: usize,
    ) -> SgfxResult<()> {
        let (len, capacity) = match kind {
            SgfxHandleKind::Buffer => (self.buffers.len(), self.buffers.capacity()),
            SgfxHandleKind::Texture => (self.textures.len(), self.textures.capacity()),
            SgfxHandleKind::Sampler => (self.samplers.len(), self.samplers.capacity()),
            SgfxHandleKind::Shader => (self.shaders.len(), self.shaders.capacity()),
            SgfxHandleKind::PipelineState => {
                (self.pipeline_states.len(), self.pipeline_states.capacity())
            }
            SgfxHandleKind::ComputePipeline => {
                (self.compute_pipelines.len(), self.compute_pipelines.capacity())
            }
            SgfxHandleKind::Swapchain => (self.swapchains.len(), self.swapchains.capacity()),
        };

        if len + required > capacity as usize {
            return Err(SgfxError::HandleTableFull(kind));
        }

        Ok(())
    }

    pub fn live_resources(&self) -> SgfxLiveResources {
        let back_buffers = self
            .textures
            .iter()
            .filter(|(_, texture)| texture.swapchain.is_some())
            .count();

        SgfxLiveResources {
            buffers: self.buffers.len(),
            textures: self.textures.len() - back_buffers,
            samplers: self.samplers.len(),
            shaders: self.shaders.len(),
            pipeline_states: self.pipeline_states.len(),
            compute_pipelines: self.compute_pipelines.len(),
            swapchains: self.swapchains.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestBackend;

    impl SgfxBackendTypes for TestBackend {
        type Buffer = u32;
        type Texture = ();
        type Sampler = ();
        type Shader = ();
        type PipelineState = ();
        type ComputePipeline = ();
        type Swapchain = ();
    }

    #[test]
    fn test_typed_errors() {
        let api_def = SgfxApiDef {
            max_buffers: 1,
            ..Default::default()
        };
        let mut tables = SgfxResourceTables::<TestBackend>::new(&api_def);

        let buffer = tables
            .insert_buffer(SgfxBufferEntry {
                def: SgfxBufferDef::for_staging_buffer(4),
                native: 7,
            })
            .unwrap();
        assert_eq!(tables.buffer(buffer).unwrap().native, 7);

        assert!(matches!(
            tables.ensure_capacity(SgfxHandleKind::Buffer, 1),
            Err(SgfxError::HandleTableFull(SgfxHandleKind::Buffer))
        ));
        assert!(matches!(
            tables.insert_buffer(SgfxBufferEntry {
                def: SgfxBufferDef::for_staging_buffer(4),
                native: 8,
            }),
            Err(SgfxError::HandleTableFull(SgfxHandleKind::Buffer))
        ));

        tables.remove_buffer(buffer).unwrap();
        assert!(matches!(
            tables.buffer(buffer),
            Err(SgfxError::InvalidHandle(SgfxHandleKind::Buffer))
        ));
        assert!(matches!(
            tables.texture(SgfxTextureHandle::INVALID),
            Err(SgfxError::InvalidHandle(SgfxHandleKind::Texture))
        ));
        assert_eq!(tables.live_resources().total(), 0);
    }
}
