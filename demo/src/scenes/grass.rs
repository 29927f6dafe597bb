use super::{group_count, DemoScene, ObjectConstants, SceneFrame, SceneResources, ViewConstants};
use crate::camera::frustum_planes;
use crate::frame_target::FrameTarget;
use crate::geometry::{self, MeshVertex};
use crate::shaders::ShaderLoader;
use glam::{Mat4, Vec3};
use rand::{Rng, SeedableRng};
use sgfx::api::*;

const FIELD_SIZE: u32 = 256;
const INSTANCE_COUNT: u32 = FIELD_SIZE * FIELD_SIZE;
const BLADE_SPACING: f32 = 0.5;
const THREADS_PER_GROUP: u32 = 64;
const MAX_DRAW_DISTANCE: f32 = 80.0;
const BLADE_SEGMENTS: u32 = 4;
const CLEAR_COLOR: [f32; 4] = [0.45, 0.6, 0.85, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct GrassInstance {
    position: [f32; 3],
    height: f32,
    color: [f32; 3],
    /// Rotation about Y in radians
    facing: f32,
}

impl GrassInstance {
    const STRIDE: u32 = std::mem::size_of::<GrassInstance>() as u32;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct GrassCullConstants {
    frustum_planes: [[f32; 4]; 6],
    camera_position: [f32; 4],
    max_distance: f32,
    instance_count: u32,
    _padding: [u32; 2],
}

/// Index count, instance count, first index, base vertex, first instance
type DrawIndexedArguments = [u32; 5];

/// Blades on a jittered grid centered on the origin
fn grass_field(field_size: u32) -> Vec<GrassInstance> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x9a55);
    let half_extent = field_size as f32 * BLADE_SPACING * 0.5;

    let mut instances = Vec::with_capacity((field_size * field_size) as usize);
    for z in 0..field_size {
        for x in 0..field_size {
            let jitter_x: f32 = rng.gen_range(-0.5..0.5);
            let jitter_z: f32 = rng.gen_range(-0.5..0.5);
            let green: f32 = rng.gen_range(0.45..0.8);
            instances.push(GrassInstance {
                position: [
                    (x as f32 + 0.5 + jitter_x) * BLADE_SPACING - half_extent,
                    0.0,
                    (z as f32 + 0.5 + jitter_z) * BLADE_SPACING - half_extent,
                ],
                height: rng.gen_range(0.6..1.4),
                color: [green * 0.35, green, green * 0.2],
                facing: rng.gen_range(0.0..std::f32::consts::PI),
            });
        }
    }

    instances
}

/// A field of grass blades culled on the GPU. The cull shader appends visible blades to a buffer
/// and counts them into the instance count of an indirect draw.
pub struct GrassScene {
    resources: SceneResources,
    view_constants: SgfxBufferHandle,
    cull_constants: SgfxBufferHandle,
    draw_arguments: SgfxBufferHandle,
    cull_queue: SgfxComputeQueue,
    ground_queue: SgfxDrawQueue,
    grass_queue: SgfxDrawQueue,
}

impl GrassScene {
    pub fn new(
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        target: &FrameTarget,
    ) -> SgfxResult<Self> {
        let mut resources = SceneResources::default();

        let view_constants = resources.create_constant_buffer::<ViewConstants>(device)?;
        let cull_constants = resources.create_constant_buffer::<GrassCullConstants>(device)?;

        let instances = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef {
                usage: SgfxUsage::Immutable,
                ..SgfxBufferDef::for_structured_buffer(
                    GrassInstance::STRIDE,
                    INSTANCE_COUNT as u64,
                    SgfxBindFlags::SHADER_RESOURCE,
                )
            },
            &grass_field(FIELD_SIZE),
        )?;

        let visible_instances = resources.create_buffer(
            device,
            &SgfxBufferDef {
                flags: SgfxBufferFlags::STRUCTURED | SgfxBufferFlags::APPEND_COUNTER,
                ..SgfxBufferDef::for_structured_buffer(
                    GrassInstance::STRIDE,
                    INSTANCE_COUNT as u64,
                    SgfxBindFlags::SHADER_RESOURCE | SgfxBindFlags::UNORDERED_ACCESS,
                )
            },
            None,
        )?;

        let blade = geometry::grass_blade(BLADE_SEGMENTS);
        let initial_arguments: DrawIndexedArguments = [blade.index_count(), 0, 0, 0, 0];
        let draw_arguments = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef::for_raw_buffer(
                std::mem::size_of::<DrawIndexedArguments>() as u64,
                SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::INDIRECT_ARGS,
            ),
            &initial_arguments,
        )?;

        let blade = resources.create_mesh(device, &blade)?;
        let ground = resources.create_mesh(
            device,
            &geometry::plane(FIELD_SIZE as f32 * BLADE_SPACING, 8),
        )?;

        //
        // Culling
        //
        let cull_pipeline = resources.create_compute_pipeline(device, shaders, "grass_cull_cs")?;
        let mut cull_queue = SgfxComputeQueue::new(cull_pipeline);
        cull_queue.set_constant_buffer(0, cull_constants)?;
        cull_queue.set_shader_resource(0, instances)?;
        // The append counter restarts at zero every time the queue is submitted
        cull_queue.set_unordered_access(0, visible_instances, Some(0))?;
        cull_queue.set_unordered_access(1, draw_arguments, None)?;
        cull_queue.dispatch(group_count(INSTANCE_COUNT, THREADS_PER_GROUP), 1, 1);

        //
        // Ground
        //
        let mesh_vs = resources.create_shader(device, shaders, "mesh_vs", SgfxShaderStage::Vertex)?;
        let mesh_ps = resources.create_shader(device, shaders, "mesh_ps", SgfxShaderStage::Pixel)?;
        let mut ground_pipeline_def =
            target.pipeline_def(SgfxPipelineStateDef::new(mesh_vs, Some(mesh_ps)));
        ground_pipeline_def.input_layout = MeshVertex::input_layout();
        ground_pipeline_def.debug_name = Some("grass ground".to_string());
        let ground_pipeline = resources.create_pipeline_state(device, &ground_pipeline_def)?;

        let ground_object = resources.create_immutable_constant_buffer(
            device,
            &ObjectConstants::new(Mat4::identity(), [0.25, 0.18, 0.1, 1.0]),
        )?;

        let mut ground_queue = SgfxDrawQueue::new(ground_pipeline);
        ground_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        ground_queue.set_constant_buffer(SgfxShaderStage::Vertex, 1, ground_object)?;
        ground_queue.set_constant_buffer(SgfxShaderStage::Pixel, 0, view_constants)?;
        ground_queue.set_constant_buffer(SgfxShaderStage::Pixel, 1, ground_object)?;
        ground.bind(&mut ground_queue)?;
        ground_queue.draw_indexed(ground.index_count, 0, 0)?;

        //
        // Grass
        //
        let grass_vs =
            resources.create_shader(device, shaders, "grass_vs", SgfxShaderStage::Vertex)?;
        let grass_ps =
            resources.create_shader(device, shaders, "grass_ps", SgfxShaderStage::Pixel)?;
        let mut grass_pipeline_def =
            target.pipeline_def(SgfxPipelineStateDef::new(grass_vs, Some(grass_ps)));
        grass_pipeline_def.input_layout = MeshVertex::input_layout();
        grass_pipeline_def.rasterizer_state = SgfxRasterizerState::no_cull();
        grass_pipeline_def.debug_name = Some("grass".to_string());
        let grass_pipeline = resources.create_pipeline_state(device, &grass_pipeline_def)?;

        let mut grass_queue = SgfxDrawQueue::new(grass_pipeline);
        grass_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        grass_queue.set_shader_resource(SgfxShaderStage::Vertex, 0, visible_instances)?;
        grass_queue.set_constant_buffer(SgfxShaderStage::Pixel, 0, view_constants)?;
        blade.bind(&mut grass_queue)?;
        grass_queue.draw_indexed_indirect(draw_arguments, 0)?;

        Ok(GrassScene {
            resources,
            view_constants,
            cull_constants,
            draw_arguments,
            cull_queue,
            ground_queue,
            grass_queue,
        })
    }
}

impl DemoScene for GrassScene {
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("GrassScene::update");
        let time = frame.time.total_seconds();
        let view_constants = ViewConstants::new(
            frame.camera,
            target.aspect_ratio(),
            time,
            Vec3::new(-0.4, -1.0, 0.3),
        );
        device.update_buffer_data(self.view_constants, 0, &[view_constants])?;

        let planes = frustum_planes(frame.camera.view_projection_matrix(target.aspect_ratio()));
        let mut cull_constants = GrassCullConstants {
            camera_position: frame.camera.position.extend(1.0).into(),
            max_distance: MAX_DRAW_DISTANCE,
            instance_count: INSTANCE_COUNT,
            ..Default::default()
        };
        for (dst, plane) in cull_constants.frustum_planes.iter_mut().zip(planes.iter()) {
            *dst = (*plane).into();
        }
        device.update_buffer_data(self.cull_constants, 0, &[cull_constants])?;

        // Reset the instance count, the cull shader increments it for every visible blade
        device.update_buffer_data(self.draw_arguments, 4, &[0u32])?;
        device.submit_compute_queue(&self.cull_queue)
    }

    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("GrassScene::render");
        device.begin_render_pass(&target.cleared_pass(CLEAR_COLOR))?;
        device.submit_draw_queue(&self.ground_queue)?;
        device.submit_draw_queue(&self.grass_queue)?;
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
    fn test_grass_field() {
        let field = grass_field(8);
        assert_eq!(field.len(), 64);
        assert_eq!(field, grass_field(8));

        let half_extent = 8.0 * BLADE_SPACING * 0.5;
        for blade in &field {
            assert!(blade.position[0].abs() <= half_extent);
            assert!(blade.position[2].abs() <= half_extent);
            assert_eq!(blade.position[1], 0.0);
        }
    }

    #[test]
    fn test_cull_then_indirect_draw() {
        let mut harness = SceneHarness::new();
        let camera = Scene::Grass.initial_camera();
        let mut scene =
            GrassScene::new(harness.api.device_mut(), &harness.shaders, &harness.target)
                .unwrap();
        let draw_arguments = scene.draw_arguments;

        let (stats, calls) = harness.run_frame(&mut scene, &camera);
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.draw_queues, 2);
        assert_eq!(stats.draws, 2);

        // Both UAVs of the cull shader are bound in one call
        assert!(calls.contains(&SgfxNullCall::BindRun {
            stage: Some(SgfxShaderStage::Compute),
            kind: SgfxBindingKind::UnorderedAccess,
            first_slot: 0,
            count: 2,
        }));
        assert!(calls.contains(&SgfxNullCall::Draw(
            SgfxDrawParams::DrawIndexedIndirect {
                buffer: draw_arguments,
                byte_offset: 0,
            }
        )));

        // The null device does not run shaders, so the arguments hold what the CPU wrote
        let contents = harness
            .api
            .device()
            .null_device()
            .unwrap()
            .buffer_contents(draw_arguments)
            .unwrap()
            .to_vec();
        let arguments: DrawIndexedArguments = bytemuck::pod_read_unaligned(&contents);
        assert_eq!(
            arguments,
            [geometry::grass_blade(BLADE_SEGMENTS).index_count(), 0, 0, 0, 0]
        );

        harness.finish(Box::new(scene));
    }
}
