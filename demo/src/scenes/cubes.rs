use super::{DemoScene, SceneFrame, SceneResources, ViewConstants};
use crate::frame_target::FrameTarget;
use crate::geometry::{self, MeshVertex};
use crate::shaders::ShaderLoader;
use glam::{Mat4, Quat, Vec3};
use sgfx::api::*;

const GRID_SIZE: u32 = 16;
const INSTANCE_COUNT: u32 = GRID_SIZE * GRID_SIZE;
const CUBE_SPACING: f32 = 3.0;
const CHECKER_SIZE: u32 = 64;
const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.15, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct CubeInstance {
    world: [f32; 16],
    color: [f32; 4],
}

impl CubeInstance {
    const STRIDE: u32 = std::mem::size_of::<CubeInstance>() as u32;

    /// Per-instance attributes read from vertex buffer slot 1. The world matrix is passed as four
    /// columns.
    fn input_layout() -> Vec<SgfxInputElement> {
        let mut layout = MeshVertex::input_layout();
        for column in 0..4 {
            layout.push(SgfxInputElement::per_instance(
                "WORLD",
                column,
                SgfxFormat::R32G32B32A32Float,
                1,
                column * 16,
            ));
        }
        layout.push(SgfxInputElement::per_instance(
            "COLOR",
            0,
            SgfxFormat::R32G32B32A32Float,
            1,
            64,
        ));
        layout
    }
}

/// RGBA8 checkerboard with 8 pixel squares
fn checker_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let value = if ((x / 8) + (y / 8)) % 2 == 0 { 255 } else { 96 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

/// A grid of spinning cubes drawn with a single instanced draw
pub struct CubesScene {
    resources: SceneResources,
    view_constants: SgfxBufferHandle,
    instance_buffer: SgfxBufferHandle,
    instances: Vec<CubeInstance>,
    draw_queue: SgfxDrawQueue,
}

impl CubesScene {
    pub fn new(
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        target: &FrameTarget,
    ) -> SgfxResult<Self> {
        let mut resources = SceneResources::default();

        let mesh = resources.create_mesh(device, &geometry::cube(0.5))?;
        let view_constants = resources.create_constant_buffer::<ViewConstants>(device)?;

        let instances = vec![CubeInstance::default(); INSTANCE_COUNT as usize];
        let instance_buffer = resources.create_buffer(
            device,
            &SgfxBufferDef {
                size: (CubeInstance::STRIDE * INSTANCE_COUNT) as u64,
                usage: SgfxUsage::Dynamic,
                bind_flags: SgfxBindFlags::VERTEX_BUFFER,
                ..Default::default()
            },
            None,
        )?;

        let texture_def =
            SgfxTextureDef::for_texture_2d(CHECKER_SIZE, CHECKER_SIZE, SgfxFormat::R8G8B8A8Unorm);
        let pixels = checker_pixels(CHECKER_SIZE);
        let texture = resources.create_texture(
            device,
            &texture_def,
            &[SgfxSubresourceData::packed(&texture_def, 0, &pixels)],
        )?;
        let sampler = resources.create_sampler(device, &SgfxSamplerDef::default())?;

        let vertex_shader =
            resources.create_shader(device, shaders, "cubes_vs", SgfxShaderStage::Vertex)?;
        let pixel_shader =
            resources.create_shader(device, shaders, "cubes_ps", SgfxShaderStage::Pixel)?;

        let mut pipeline_def = target.pipeline_def(SgfxPipelineStateDef::new(
            vertex_shader,
            Some(pixel_shader),
        ));
        pipeline_def.input_layout = CubeInstance::input_layout();
        pipeline_def.debug_name = Some("cubes".to_string());
        let pipeline = resources.create_pipeline_state(device, &pipeline_def)?;

        // Nothing about the draw changes between frames, so it is recorded once
        let mut draw_queue = SgfxDrawQueue::new(pipeline);
        draw_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        draw_queue.set_shader_resource(SgfxShaderStage::Pixel, 0, texture)?;
        draw_queue.set_sampler(SgfxShaderStage::Pixel, 0, sampler)?;
        mesh.bind(&mut draw_queue)?;
        draw_queue.set_vertex_buffer(1, Some(instance_buffer), 0, CubeInstance::STRIDE)?;
        draw_queue.draw_indexed_instanced(mesh.index_count, INSTANCE_COUNT, 0, 0, 0)?;

        Ok(CubesScene {
            resources,
            view_constants,
            instance_buffer,
            instances,
            draw_queue,
        })
    }

    fn update_instances(
        &mut self,
        time: f32,
    ) {
        let half_extent = (GRID_SIZE - 1) as f32 * CUBE_SPACING * 0.5;
        for (index, instance) in self.instances.iter_mut().enumerate() {
            let x = (index as u32 % GRID_SIZE) as f32;
            let z = (index as u32 / GRID_SIZE) as f32;

            let phase = (x + z) * 0.3;
            let position = Vec3::new(
                x * CUBE_SPACING - half_extent,
                (time * 2.0 + phase).sin(),
                z * CUBE_SPACING - half_extent,
            );
            let rotation =
                Quat::from_rotation_y(time + phase) * Quat::from_rotation_x(time * 0.5 + phase);

            instance.world = Mat4::from_rotation_translation(rotation, position).to_cols_array();
            instance.color = [
                x / (GRID_SIZE - 1) as f32,
                0.5 + 0.5 * phase.sin(),
                z / (GRID_SIZE - 1) as f32,
                1.0,
            ];
        }
    }
}

impl DemoScene for CubesScene {
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("CubesScene::update");
        let time = frame.time.total_seconds();
        self.update_instances(time);
        device.update_buffer_data(self.instance_buffer, 0, &self.instances)?;

        let view_constants = ViewConstants::new(
            frame.camera,
            target.aspect_ratio(),
            time,
            Vec3::new(0.3, -1.0, 0.5),
        );
        device.update_buffer_data(self.view_constants, 0, &[view_constants])
    }

    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("CubesScene::render");
        device.begin_render_pass(&target.cleared_pass(CLEAR_COLOR))?;
        device.submit_draw_queue(&self.draw_queue)?;
        device.end_render_pass()
    }

    fn destroy(
        &mut self,
        device: &mut SgfxDevice,
    ) -> SgfxResult<()> {
        self.resources.destroy(device)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Scene;
    use super::*;

    #[test]
    fn test_checker_pixels() {
        let pixels = checker_pixels(16);
        assert_eq!(pixels.len(), 16 * 16 * 4);
        assert_eq!(&pixels[0..4], &[255, 255, 255, 255]);
        // Pixel (8, 0) is in the next square
        assert_eq!(&pixels[32..36], &[96, 96, 96, 255]);
    }

    #[test]
    fn test_single_instanced_draw() {
        let mut harness = SceneHarness::new();
        let camera = Scene::Cubes.initial_camera();
        let mut scene =
            CubesScene::new(harness.api.device_mut(), &harness.shaders, &harness.target)
                .unwrap();
        let instance_buffer = scene.instance_buffer;

        let (stats, calls) = harness.run_frame(&mut scene, &camera);
        assert_eq!(stats.render_passes, 1);
        assert_eq!(stats.draws, 1);

        let draws: Vec<_> = calls.iter().filter(|call| call.is_draw()).collect();
        assert_eq!(
            draws,
            vec![&SgfxNullCall::Draw(SgfxDrawParams::DrawIndexedInstanced {
                index_count: 36,
                instance_count: INSTANCE_COUNT,
                first_index: 0,
                base_vertex: 0,
                first_instance: 0,
            })]
        );

        // Mesh and instance buffers are contiguous slots, bound in one call
        assert!(calls.contains(&SgfxNullCall::SetVertexBuffers {
            first_slot: 0,
            count: 2
        }));

        let contents = harness
            .device()
            .null_device()
            .unwrap()
            .buffer_contents(instance_buffer)
            .unwrap()
            .to_vec();
        assert_eq!(contents.len(), (INSTANCE_COUNT * CubeInstance::STRIDE) as usize);
        let first: CubeInstance =
            bytemuck::pod_read_unaligned(&contents[..CubeInstance::STRIDE as usize]);
        assert_eq!(first.world[15], 1.0);
        assert_eq!(first.color[3], 1.0);

        harness.finish(Box::new(scene));
    }
}
