use crate::camera::FlyCamera;
use crate::geometry::{MeshBuffers, MeshData};
use crate::shaders::ShaderLoader;
use sgfx::api::*;

/// Per-view values, bound to constant buffer slot 0 by every scene. Layout matches `ViewConstants`
/// in the shaders' common.hlsli.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewConstants {
    pub view_projection: [f32; 16],
    /// w is the scene time in seconds
    pub camera_position: [f32; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
    /// Direction light travels in, w unused
    pub light_direction: [f32; 4],
}

impl ViewConstants {
    pub fn new(
        camera: &FlyCamera,
        aspect_ratio: f32,
        time_seconds: f32,
        light_direction: glam::Vec3,
    ) -> Self {
        ViewConstants {
            view_projection: camera.view_projection_matrix(aspect_ratio).to_cols_array(),
            camera_position: camera.position.extend(time_seconds).into(),
            camera_right: camera.right_dir.extend(0.0).into(),
            camera_up: camera.up_dir.extend(0.0).into(),
            light_direction: light_direction.normalize().extend(0.0).into(),
        }
    }
}

/// Per-draw values for mesh_vs/mesh_ps, bound to constant buffer slot 1
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectConstants {
    pub world: [f32; 16],
    pub color: [f32; 4],
}

impl ObjectConstants {
    pub fn new(
        world: glam::Mat4,
        color: [f32; 4],
    ) -> Self {
        ObjectConstants {
            world: world.to_cols_array(),
            color,
        }
    }
}

/// Number of groups needed to cover `count` items with groups of `group_size`
pub fn group_count(
    count: u32,
    group_size: u32,
) -> u32 {
    (count + group_size - 1) / group_size
}

/// Owns everything a scene creates so it can all be destroyed together
#[derive(Default)]
pub struct SceneResources {
    buffers: Vec<SgfxBufferHandle>,
    textures: Vec<SgfxTextureHandle>,
    samplers: Vec<SgfxSamplerHandle>,
    shaders: Vec<SgfxShaderHandle>,
    pipeline_states: Vec<SgfxPipelineStateHandle>,
    compute_pipelines: Vec<SgfxComputePipelineHandle>,
}

impl SceneResources {
    pub fn create_buffer(
        &mut self,
        device: &mut SgfxDevice,
        def: &SgfxBufferDef,
        initial_data: Option<&[u8]>,
    ) -> SgfxResult<SgfxBufferHandle> {
        let buffer = device.create_buffer(def, initial_data)?;
        self.buffers.push(buffer);
        Ok(buffer)
    }

    pub fn create_buffer_with_data<T: bytemuck::Pod>(
        &mut self,
        device: &mut SgfxDevice,
        def: &SgfxBufferDef,
        data: &[T],
    ) -> SgfxResult<SgfxBufferHandle> {
        self.create_buffer(device, def, Some(bytemuck::cast_slice(data)))
    }

    /// Dynamic constant buffer sized for `T`
    pub fn create_constant_buffer<T: bytemuck::Pod>(
        &mut self,
        device: &mut SgfxDevice,
    ) -> SgfxResult<SgfxBufferHandle> {
        self.create_buffer(
            device,
            &SgfxBufferDef::for_constant_buffer(std::mem::size_of::<T>() as u64),
            None,
        )
    }

    /// Constant buffer that never changes after creation
    pub fn create_immutable_constant_buffer<T: bytemuck::Pod>(
        &mut self,
        device: &mut SgfxDevice,
        constants: &T,
    ) -> SgfxResult<SgfxBufferHandle> {
        self.create_buffer_with_data(
            device,
            &SgfxBufferDef {
                usage: SgfxUsage::Immutable,
                ..SgfxBufferDef::for_constant_buffer(std::mem::size_of::<T>() as u64)
            },
            std::slice::from_ref(constants),
        )
    }

    pub fn create_mesh(
        &mut self,
        device: &mut SgfxDevice,
        mesh: &MeshData,
    ) -> SgfxResult<MeshBuffers> {
        let buffers = mesh.create_buffers(device)?;
        self.buffers.push(buffers.vertex_buffer);
        self.buffers.push(buffers.index_buffer);
        Ok(buffers)
    }

    pub fn create_texture(
        &mut self,
        device: &mut SgfxDevice,
        def: &SgfxTextureDef,
        initial_data: &[SgfxSubresourceData],
    ) -> SgfxResult<SgfxTextureHandle> {
        let texture = device.create_texture(def, initial_data)?;
        self.textures.push(texture);
        Ok(texture)
    }

    pub fn create_sampler(
        &mut self,
        device: &mut SgfxDevice,
        def: &SgfxSamplerDef,
    ) -> SgfxResult<SgfxSamplerHandle> {
        let sampler = device.create_sampler(def)?;
        self.samplers.push(sampler);
        Ok(sampler)
    }

    pub fn create_shader(
        &mut self,
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        name: &str,
        stage: SgfxShaderStage,
    ) -> SgfxResult<SgfxShaderHandle> {
        let shader = shaders.create_shader(device, name, stage)?;
        self.shaders.push(shader);
        Ok(shader)
    }

    pub fn create_pipeline_state(
        &mut self,
        device: &mut SgfxDevice,
        def: &SgfxPipelineStateDef,
    ) -> SgfxResult<SgfxPipelineStateHandle> {
        let pipeline = device.create_pipeline_state(def)?;
        self.pipeline_states.push(pipeline);
        Ok(pipeline)
    }

    /// Loads the compute shader `name` and creates a pipeline from it
    pub fn create_compute_pipeline(
        &mut self,
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        name: &str,
    ) -> SgfxResult<SgfxComputePipelineHandle> {
        let compute_shader = self.create_shader(device, shaders, name, SgfxShaderStage::Compute)?;
        let pipeline = device.create_compute_pipeline(&SgfxComputePipelineDef {
            compute_shader,
            debug_name: Some(name.to_string()),
        })?;
        self.compute_pipelines.push(pipeline);
        Ok(pipeline)
    }

    /// Destroys everything, pipelines first
    pub fn destroy(
        &mut self,
        device: &mut SgfxDevice,
    ) -> SgfxResult<()> {
        for pipeline in self.pipeline_states.drain(..) {
            device.destroy_pipeline_state(pipeline)?;
        }

        for pipeline in self.compute_pipelines.drain(..) {
            device.destroy_compute_pipeline(pipeline)?;
        }

        for shader in self.shaders.drain(..) {
            device.destroy_shader(shader)?;
        }

        for sampler in self.samplers.drain(..) {
            device.destroy_sampler(sampler)?;
        }

        for texture in self.textures.drain(..) {
            device.destroy_texture(texture)?;
        }

        for buffer in self.buffers.drain(..) {
            device.destroy_buffer(buffer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count() {
        assert_eq!(group_count(0, 64), 0);
        assert_eq!(group_count(1, 64), 1);
        assert_eq!(group_count(64, 64), 1);
        assert_eq!(group_count(65, 64), 2);
    }

    #[test]
    fn test_view_constants_layout() {
        // Constant buffers are sized in multiples of 16 bytes
        assert_eq!(std::mem::size_of::<ViewConstants>() % 16, 0);

        let camera = FlyCamera::new(glam::Vec3::new(1.0, 2.0, 3.0), 0.0, 0.0);
        let constants = ViewConstants::new(&camera, 1.0, 5.0, glam::Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(constants.camera_position, [1.0, 2.0, 3.0, 5.0]);
        assert_eq!(constants.light_direction, [0.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut api = SgfxApi::new_null(&SgfxApiDef::default()).unwrap();
        let device = api.device_mut();

        let mut resources = SceneResources::default();
        resources
            .create_mesh(device, &crate::geometry::cube(1.0))
            .unwrap();
        resources
            .create_constant_buffer::<ViewConstants>(device)
            .unwrap();
        resources
            .create_sampler(device, &SgfxSamplerDef::default())
            .unwrap();
        assert_eq!(device.live_resources().total(), 4);

        resources.destroy(device).unwrap();
        assert_eq!(device.live_resources().total(), 0);
        api.destroy().unwrap();
    }
}
