use super::{DemoScene, SceneFrame, SceneResources, ViewConstants};
use crate::frame_target::{FrameTarget, DEPTH_FORMAT};
use crate::geometry::{self, MeshVertex};
use crate::shaders::ShaderLoader;
use glam::{Mat4, Vec3};
use sgfx::api::*;

const SPHERE_GRID_SIZE: u32 = 7;
const SPHERE_COUNT: u32 = SPHERE_GRID_SIZE * SPHERE_GRID_SIZE;
const SPHERE_SPACING: f32 = 2.5;
const LIGHT_COUNT: u32 = 32;
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Base color and metalness
const ALBEDO_FORMAT: SgfxFormat = SgfxFormat::R8G8B8A8Unorm;
/// World space normal and roughness
const NORMAL_FORMAT: SgfxFormat = SgfxFormat::R16G16B16A16Float;
/// World space position, w is 1 where geometry was drawn
const POSITION_FORMAT: SgfxFormat = SgfxFormat::R32G32B32A32Float;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct SurfaceInstance {
    world: [f32; 16],
    /// rgb is the base color, a the metalness
    albedo: [f32; 4],
    /// x is the roughness
    material: [f32; 4],
}

impl SurfaceInstance {
    const STRIDE: u32 = std::mem::size_of::<SurfaceInstance>() as u32;

    fn new(
        world: Mat4,
        base_color: Vec3,
        metalness: f32,
        roughness: f32,
    ) -> Self {
        SurfaceInstance {
            world: world.to_cols_array(),
            albedo: base_color.extend(metalness).into(),
            material: [roughness, 0.0, 0.0, 0.0],
        }
    }

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
            "ALBEDO",
            0,
            SgfxFormat::R32G32B32A32Float,
            1,
            64,
        ));
        layout.push(SgfxInputElement::per_instance(
            "MATERIAL",
            0,
            SgfxFormat::R32G32B32A32Float,
            1,
            80,
        ));
        layout
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct PointLight {
    position: [f32; 3],
    radius: f32,
    color: [f32; 3],
    intensity: f32,
}

impl PointLight {
    const STRIDE: u32 = std::mem::size_of::<PointLight>() as u32;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct LightingConstants {
    ambient: [f32; 4],
    light_count: u32,
    _padding: [u32; 3],
}

/// Spheres on a grid with metalness increasing along x and roughness along z, then the ground
fn surface_instances() -> Vec<SurfaceInstance> {
    let half_extent = (SPHERE_GRID_SIZE - 1) as f32 * SPHERE_SPACING * 0.5;
    let max_index = (SPHERE_GRID_SIZE - 1) as f32;

    let mut instances = Vec::with_capacity(SPHERE_COUNT as usize + 1);
    for z in 0..SPHERE_GRID_SIZE {
        for x in 0..SPHERE_GRID_SIZE {
            let position = Vec3::new(
                x as f32 * SPHERE_SPACING - half_extent,
                1.0,
                z as f32 * SPHERE_SPACING - half_extent,
            );
            instances.push(SurfaceInstance::new(
                Mat4::from_translation(position),
                Vec3::new(0.9, 0.2, 0.15),
                x as f32 / max_index,
                (z as f32 / max_index).max(0.05),
            ));
        }
    }

    instances.push(SurfaceInstance::new(
        Mat4::identity(),
        Vec3::new(0.5, 0.5, 0.5),
        0.0,
        0.8,
    ));
    instances
}

/// Lights circling above the sphere grid at different radii, heights and speeds
fn point_lights(time: f32) -> Vec<PointLight> {
    (0..LIGHT_COUNT)
        .map(|index| {
            let t = index as f32 / LIGHT_COUNT as f32;
            let radius = 3.0 + 7.0 * t;
            let angle = t * std::f32::consts::TAU * 3.0 + time * (0.3 + t);
            let hue = t * std::f32::consts::TAU;
            PointLight {
                position: [
                    angle.cos() * radius,
                    2.0 + (time + index as f32).sin(),
                    angle.sin() * radius,
                ],
                radius: 6.0,
                color: [
                    0.5 + 0.5 * hue.cos(),
                    0.5 + 0.5 * (hue + 2.094).cos(),
                    0.5 + 0.5 * (hue + 4.189).cos(),
                ],
                intensity: 4.0,
            }
        })
        .collect()
}

/// Physically based deferred shading. Surfaces are written to a G-buffer of three render targets,
/// then a fullscreen pass evaluates a Cook-Torrance BRDF for every light.
pub struct DeferredScene {
    resources: SceneResources,
    view_constants: SgfxBufferHandle,
    light_buffer: SgfxBufferHandle,
    gbuffer: [SgfxTextureHandle; 3],
    gbuffer_queue: SgfxDrawQueue,
    lighting_queue: SgfxDrawQueue,
}

impl DeferredScene {
    pub fn new(
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        target: &FrameTarget,
    ) -> SgfxResult<Self> {
        let mut resources = SceneResources::default();

        let view_constants = resources.create_constant_buffer::<ViewConstants>(device)?;
        let sphere = resources.create_mesh(device, &geometry::sphere(0.9, 24, 32))?;
        let ground = resources.create_mesh(device, &geometry::plane(30.0, 8))?;
        let instance_buffer = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef::for_vertex_buffer(
                ((SPHERE_COUNT + 1) * SurfaceInstance::STRIDE) as u64,
            ),
            &surface_instances(),
        )?;

        let mut gbuffer = [SgfxTextureHandle::default(); 3];
        for (texture, format) in gbuffer
            .iter_mut()
            .zip([ALBEDO_FORMAT, NORMAL_FORMAT, POSITION_FORMAT].iter())
        {
            *texture = resources.create_texture(
                device,
                &SgfxTextureDef::for_render_target(target.width, target.height, *format),
                &[],
            )?;
        }

        let light_buffer = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef {
                usage: SgfxUsage::Dynamic,
                ..SgfxBufferDef::for_structured_buffer(
                    PointLight::STRIDE,
                    LIGHT_COUNT as u64,
                    SgfxBindFlags::SHADER_RESOURCE,
                )
            },
            &point_lights(0.0),
        )?;
        let lighting_constants = resources.create_immutable_constant_buffer(
            device,
            &LightingConstants {
                ambient: [0.03, 0.03, 0.035, 0.0],
                light_count: LIGHT_COUNT,
                _padding: [0; 3],
            },
        )?;

        //
        // G-buffer
        //
        let gbuffer_vs =
            resources.create_shader(device, shaders, "gbuffer_vs", SgfxShaderStage::Vertex)?;
        let gbuffer_ps =
            resources.create_shader(device, shaders, "gbuffer_ps", SgfxShaderStage::Pixel)?;
        let mut gbuffer_pipeline_def = SgfxPipelineStateDef::new(gbuffer_vs, Some(gbuffer_ps));
        gbuffer_pipeline_def.input_layout = SurfaceInstance::input_layout();
        gbuffer_pipeline_def.color_formats = vec![ALBEDO_FORMAT, NORMAL_FORMAT, POSITION_FORMAT];
        gbuffer_pipeline_def.depth_format = Some(DEPTH_FORMAT);
        gbuffer_pipeline_def.debug_name = Some("gbuffer".to_string());
        let gbuffer_pipeline = resources.create_pipeline_state(device, &gbuffer_pipeline_def)?;

        let mut gbuffer_queue = SgfxDrawQueue::new(gbuffer_pipeline);
        gbuffer_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        gbuffer_queue.set_vertex_buffer(1, Some(instance_buffer), 0, SurfaceInstance::STRIDE)?;
        sphere.bind(&mut gbuffer_queue)?;
        gbuffer_queue.draw_indexed_instanced(sphere.index_count, SPHERE_COUNT, 0, 0, 0)?;
        // The ground is the instance after the spheres
        ground.bind(&mut gbuffer_queue)?;
        gbuffer_queue.draw_indexed_instanced(ground.index_count, 1, 0, 0, SPHERE_COUNT)?;

        //
        // Lighting
        //
        let fullscreen_vs =
            resources.create_shader(device, shaders, "fullscreen_vs", SgfxShaderStage::Vertex)?;
        let lighting_ps = resources.create_shader(
            device,
            shaders,
            "deferred_lighting_ps",
            SgfxShaderStage::Pixel,
        )?;
        let mut lighting_pipeline_def = target.color_only_pipeline_def(SgfxPipelineStateDef::new(
            fullscreen_vs,
            Some(lighting_ps),
        ));
        lighting_pipeline_def.depth_stencil_state = SgfxDepthStencilState::disabled();
        lighting_pipeline_def.rasterizer_state = SgfxRasterizerState::no_cull();
        lighting_pipeline_def.debug_name = Some("deferred lighting".to_string());
        let lighting_pipeline = resources.create_pipeline_state(device, &lighting_pipeline_def)?;

        let mut lighting_queue = SgfxDrawQueue::new(lighting_pipeline);
        lighting_queue.set_constant_buffer(SgfxShaderStage::Pixel, 0, view_constants)?;
        lighting_queue.set_constant_buffer(SgfxShaderStage::Pixel, 1, lighting_constants)?;
        for (slot, texture) in gbuffer.iter().enumerate() {
            lighting_queue.set_shader_resource(SgfxShaderStage::Pixel, slot as u32, *texture)?;
        }
        lighting_queue.set_shader_resource(SgfxShaderStage::Pixel, 3, light_buffer)?;
        lighting_queue.draw(3, 0)?;

        Ok(DeferredScene {
            resources,
            view_constants,
            light_buffer,
            gbuffer,
            gbuffer_queue,
            lighting_queue,
        })
    }

    fn gbuffer_pass(
        &self,
        target: &FrameTarget,
    ) -> SgfxRenderPassDef {
        SgfxRenderPassDef {
            color_targets: self
                .gbuffer
                .iter()
                .map(|texture| SgfxColorTarget::cleared(*texture, [0.0; 4]))
                .collect(),
            depth_target: Some(SgfxDepthTarget::cleared(target.depth)),
            viewport: None,
        }
    }
}

impl DemoScene for DeferredScene {
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("DeferredScene::update");
        let time = frame.time.total_seconds();
        let view_constants =
            ViewConstants::new(frame.camera, target.aspect_ratio(), time, -Vec3::Y);
        device.update_buffer_data(self.view_constants, 0, &[view_constants])?;
        device.update_buffer_data(self.light_buffer, 0, &point_lights(time))
    }

    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("DeferredScene::render");
        device.begin_render_pass(&self.gbuffer_pass(target))?;
        device.submit_draw_queue(&self.gbuffer_queue)?;
        device.end_render_pass()?;

        device.begin_render_pass(&SgfxRenderPassDef {
            color_targets: vec![SgfxColorTarget::cleared(target.color, CLEAR_COLOR)],
            depth_target: None,
            viewport: None,
        })?;
        device.submit_draw_queue(&self.lighting_queue)?;
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
    fn test_surface_instances() {
        let instances = surface_instances();
        assert_eq!(instances.len(), SPHERE_COUNT as usize + 1);

        // Metalness spans the grid's x axis
        assert_eq!(instances[0].albedo[3], 0.0);
        assert_eq!(instances[SPHERE_GRID_SIZE as usize - 1].albedo[3], 1.0);
        // Roughness is never zero, the specular lobe would collapse
        assert!(instances.iter().all(|instance| instance.material[0] > 0.0));
    }

    #[test]
    fn test_point_lights_move() {
        let start = point_lights(0.0);
        assert_eq!(start.len(), LIGHT_COUNT as usize);
        assert_eq!(start, point_lights(0.0));
        assert_ne!(start, point_lights(1.0));
    }

    #[test]
    fn test_gbuffer_then_lighting() {
        let mut harness = SceneHarness::new();
        let camera = Scene::Deferred.initial_camera();
        let mut scene =
            DeferredScene::new(harness.api.device_mut(), &harness.shaders, &harness.target)
                .unwrap();

        let (stats, calls) = harness.run_frame(&mut scene, &camera);
        assert_eq!(stats.render_passes, 2);
        assert_eq!(stats.draws, 3);

        assert!(calls.contains(&SgfxNullCall::BeginRenderPass {
            color_targets: 3,
            has_depth: true,
        }));
        assert!(calls.contains(&SgfxNullCall::Draw(
            SgfxDrawParams::DrawIndexedInstanced {
                index_count: geometry::plane(30.0, 8).index_count(),
                instance_count: 1,
                first_index: 0,
                base_vertex: 0,
                first_instance: SPHERE_COUNT,
            }
        )));

        // Three G-buffer targets and the lights are read through one contiguous range
        assert!(calls.contains(&SgfxNullCall::BindRun {
            stage: Some(SgfxShaderStage::Pixel),
            kind: SgfxBindingKind::ShaderResource,
            first_slot: 0,
            count: 4,
        }));

        harness.finish(Box::new(scene));
    }
}
