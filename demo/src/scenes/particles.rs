use super::{group_count, DemoScene, SceneFrame, SceneResources, ViewConstants};
use crate::frame_target::FrameTarget;
use crate::geometry::{self, MeshVertex};
use crate::shaders::ShaderLoader;
use glam::Vec3;
use rand::{Rng, SeedableRng};
use sgfx::api::*;

const PARTICLE_COUNT: u32 = 16384;
const THREADS_PER_GROUP: u32 = 256;
const MAX_LIFETIME: f32 = 4.0;
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.02, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Particle {
    position: [f32; 3],
    age: f32,
    velocity: [f32; 3],
    lifetime: f32,
}

impl Particle {
    const STRIDE: u32 = std::mem::size_of::<Particle>() as u32;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct ParticleConstants {
    emitter_position: [f32; 4],
    gravity: [f32; 4],
    delta_time: f32,
    total_time: f32,
    particle_count: u32,
    _padding: u32,
}

/// Deterministic starting state, spread over a full lifetime so the fountain is already running
/// on the first frame
fn initial_particles(count: u32) -> Vec<Particle> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    (0..count)
        .map(|_| {
            let direction = Vec3::new(
                rng.gen_range(-0.3f32..0.3),
                1.0,
                rng.gen_range(-0.3f32..0.3),
            )
            .normalize();
            let lifetime = rng.gen_range(1.0..MAX_LIFETIME);
            Particle {
                position: [0.0; 3],
                age: rng.gen_range(0.0..lifetime),
                velocity: (direction * rng.gen_range(8.0f32..14.0)).into(),
                lifetime,
            }
        })
        .collect()
}

/// A particle fountain integrated by a compute shader and drawn as instanced billboards
pub struct ParticlesScene {
    resources: SceneResources,
    view_constants: SgfxBufferHandle,
    particle_constants: SgfxBufferHandle,
    particles: SgfxBufferHandle,
    compute_queue: SgfxComputeQueue,
    draw_queue: SgfxDrawQueue,
}

impl ParticlesScene {
    pub fn new(
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        target: &FrameTarget,
    ) -> SgfxResult<Self> {
        let mut resources = SceneResources::default();

        let view_constants = resources.create_constant_buffer::<ViewConstants>(device)?;
        let particle_constants = resources.create_constant_buffer::<ParticleConstants>(device)?;
        let particles = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef::for_structured_buffer(
                Particle::STRIDE,
                PARTICLE_COUNT as u64,
                SgfxBindFlags::SHADER_RESOURCE | SgfxBindFlags::UNORDERED_ACCESS,
            ),
            &initial_particles(PARTICLE_COUNT),
        )?;
        let quad = resources.create_mesh(device, &geometry::quad())?;

        let update_pipeline =
            resources.create_compute_pipeline(device, shaders, "particles_update_cs")?;
        let mut compute_queue = SgfxComputeQueue::new(update_pipeline);
        compute_queue.set_constant_buffer(0, particle_constants)?;
        compute_queue.set_unordered_access(0, particles, None)?;
        compute_queue.dispatch(group_count(PARTICLE_COUNT, THREADS_PER_GROUP), 1, 1);

        let vertex_shader =
            resources.create_shader(device, shaders, "particles_vs", SgfxShaderStage::Vertex)?;
        let pixel_shader =
            resources.create_shader(device, shaders, "particles_ps", SgfxShaderStage::Pixel)?;
        let mut pipeline_def = target.pipeline_def(SgfxPipelineStateDef::new(
            vertex_shader,
            Some(pixel_shader),
        ));
        pipeline_def.input_layout = MeshVertex::input_layout();
        pipeline_def.blend_state =
            SgfxBlendState::for_all_targets(SgfxRenderTargetBlendState::additive());
        pipeline_def.depth_stencil_state = SgfxDepthStencilState::read_only();
        pipeline_def.rasterizer_state = SgfxRasterizerState::no_cull();
        pipeline_def.debug_name = Some("particles".to_string());
        let draw_pipeline = resources.create_pipeline_state(device, &pipeline_def)?;

        let mut draw_queue = SgfxDrawQueue::new(draw_pipeline);
        draw_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        draw_queue.set_shader_resource(SgfxShaderStage::Vertex, 0, particles)?;
        quad.bind(&mut draw_queue)?;
        draw_queue.draw_indexed_instanced(quad.index_count, PARTICLE_COUNT, 0, 0, 0)?;

        Ok(ParticlesScene {
            resources,
            view_constants,
            particle_constants,
            particles,
            compute_queue,
            draw_queue,
        })
    }
}

impl DemoScene for ParticlesScene {
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("ParticlesScene::update");
        let time = frame.time.total_seconds();

        let constants = ParticleConstants {
            emitter_position: [0.0, 0.0, 0.0, 1.0],
            gravity: [0.0, -9.8, 0.0, 0.0],
            delta_time: frame.time.previous_update_dt(),
            total_time: time,
            particle_count: PARTICLE_COUNT,
            _padding: 0,
        };
        device.update_buffer_data(self.particle_constants, 0, &[constants])?;
        device.submit_compute_queue(&self.compute_queue)?;

        let view_constants =
            ViewConstants::new(frame.camera, target.aspect_ratio(), time, -Vec3::Y);
        device.update_buffer_data(self.view_constants, 0, &[view_constants])
    }

    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("ParticlesScene::render");
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
    fn test_initial_particles_are_deterministic() {
        let a = initial_particles(64);
        let b = initial_particles(64);
        assert_eq!(a, b);

        for particle in &a {
            assert!(particle.age < particle.lifetime);
            assert!(particle.lifetime <= MAX_LIFETIME);
            // Fountain sprays upward
            assert!(particle.velocity[1] > 0.0);
        }
    }

    #[test]
    fn test_dispatch_then_draw() {
        let mut harness = SceneHarness::new();
        let camera = Scene::Particles.initial_camera();
        let mut scene =
            ParticlesScene::new(harness.api.device_mut(), &harness.shaders, &harness.target)
                .unwrap();
        let particles = scene.particles;

        let initial_contents = harness
            .device()
            .null_device()
            .unwrap()
            .buffer_contents(particles)
            .unwrap()
            .len();
        assert_eq!(initial_contents, (PARTICLE_COUNT * Particle::STRIDE) as usize);

        let (stats, calls) = harness.run_frame(&mut scene, &camera);
        assert_eq!(stats.compute_queues, 1);
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.draws, 1);

        let dispatch_index = calls
            .iter()
            .position(|call| {
                *call
                    == SgfxNullCall::Dispatch(SgfxDispatchParams::Dispatch {
                        group_count_x: PARTICLE_COUNT / THREADS_PER_GROUP,
                        group_count_y: 1,
                        group_count_z: 1,
                    })
            })
            .unwrap();
        let draw_index = calls.iter().position(|call| call.is_draw()).unwrap();
        assert!(dispatch_index < draw_index);

        // The particle buffer is written as a UAV by compute and read as an SRV by the vertex
        // shader
        assert!(calls.contains(&SgfxNullCall::BindRun {
            stage: Some(SgfxShaderStage::Compute),
            kind: SgfxBindingKind::UnorderedAccess,
            first_slot: 0,
            count: 1,
        }));
        assert!(calls.contains(&SgfxNullCall::BindRun {
            stage: Some(SgfxShaderStage::Vertex),
            kind: SgfxBindingKind::ShaderResource,
            first_slot: 0,
            count: 1,
        }));

        harness.finish(Box::new(scene));
    }
}
