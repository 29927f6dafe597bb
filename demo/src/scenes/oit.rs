use super::{DemoScene, ObjectConstants, SceneFrame, SceneResources, ViewConstants};
use crate::frame_target::FrameTarget;
use crate::geometry::{self, MeshVertex};
use crate::shaders::ShaderLoader;
use glam::{Mat4, Vec3};
use sgfx::api::*;

const SPHERE_COUNT: usize = 8;
/// Average transparent layers per pixel the fragment buffer has room for
const FRAGMENTS_PER_PIXEL: u32 = 4;
/// Marks the end of a pixel's fragment list
const END_OF_LIST: u32 = 0xffff_ffff;
const CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.2, 1.0];

// Pixel shader UAVs share slots with the render targets, so with one color target the first
// usable UAV slot is 1
const HEAD_POINTER_UAV_SLOT: u32 = 1;
const FRAGMENT_UAV_SLOT: u32 = 2;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct Fragment {
    /// RGBA8 packed
    color: u32,
    depth: f32,
    next: u32,
}

impl Fragment {
    const STRIDE: u32 = std::mem::size_of::<Fragment>() as u32;
}

/// Where sphere `index` is at `time`, circling the origin at two heights
fn sphere_transform(
    index: usize,
    time: f32,
) -> Mat4 {
    let angle = time * 0.5 + index as f32 * std::f32::consts::TAU / SPHERE_COUNT as f32;
    let radius = if index % 2 == 0 { 2.5 } else { 1.5 };
    let height = 1.0 + (index % 2) as f32;
    Mat4::from_translation(Vec3::new(
        angle.cos() * radius,
        height,
        angle.sin() * radius,
    ))
}

fn sphere_color(index: usize) -> [f32; 4] {
    let hue = index as f32 / SPHERE_COUNT as f32 * std::f32::consts::TAU;
    [
        0.5 + 0.5 * hue.cos(),
        0.5 + 0.5 * (hue + 2.094).cos(),
        0.5 + 0.5 * (hue + 4.189).cos(),
        0.4,
    ]
}

/// Order-independent transparency with per-pixel linked lists. Transparent spheres are drawn in
/// any order into a fragment buffer, then a fullscreen pass sorts each pixel's fragments by depth
/// and blends them over the opaque scene.
pub struct OitScene {
    resources: SceneResources,
    view_constants: SgfxBufferHandle,
    sphere_constants: Vec<SgfxBufferHandle>,
    head_pointers: SgfxTextureHandle,
    opaque_queue: SgfxDrawQueue,
    build_queue: SgfxDrawQueue,
    resolve_queue: SgfxDrawQueue,
}

impl OitScene {
    pub fn new(
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        target: &FrameTarget,
    ) -> SgfxResult<Self> {
        let mut resources = SceneResources::default();

        let view_constants = resources.create_constant_buffer::<ViewConstants>(device)?;
        let ground = resources.create_mesh(device, &geometry::plane(20.0, 4))?;
        let cube = resources.create_mesh(device, &geometry::cube(0.75))?;
        let sphere = resources.create_mesh(device, &geometry::sphere(0.8, 16, 24))?;

        let head_pointers = resources.create_texture(
            device,
            &SgfxTextureDef {
                width: target.width,
                height: target.height,
                format: SgfxFormat::R32Uint,
                bind_flags: SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::SHADER_RESOURCE,
                ..Default::default()
            },
            &[],
        )?;
        let fragments = resources.create_buffer(
            device,
            &SgfxBufferDef {
                flags: SgfxBufferFlags::STRUCTURED | SgfxBufferFlags::APPEND_COUNTER,
                ..SgfxBufferDef::for_structured_buffer(
                    Fragment::STRIDE,
                    (target.width * target.height * FRAGMENTS_PER_PIXEL) as u64,
                    SgfxBindFlags::UNORDERED_ACCESS | SgfxBindFlags::SHADER_RESOURCE,
                )
            },
            None,
        )?;

        let mesh_vs = resources.create_shader(device, shaders, "mesh_vs", SgfxShaderStage::Vertex)?;
        let mesh_ps = resources.create_shader(device, shaders, "mesh_ps", SgfxShaderStage::Pixel)?;

        //
        // Opaque
        //
        let mut opaque_pipeline_def =
            target.pipeline_def(SgfxPipelineStateDef::new(mesh_vs, Some(mesh_ps)));
        opaque_pipeline_def.input_layout = MeshVertex::input_layout();
        opaque_pipeline_def.debug_name = Some("oit opaque".to_string());
        let opaque_pipeline = resources.create_pipeline_state(device, &opaque_pipeline_def)?;

        let ground_object = resources.create_immutable_constant_buffer(
            device,
            &ObjectConstants::new(Mat4::identity(), [0.6, 0.6, 0.55, 1.0]),
        )?;
        let cube_object = resources.create_immutable_constant_buffer(
            device,
            &ObjectConstants::new(
                Mat4::from_translation(Vec3::new(0.0, 0.75, 0.0)),
                [0.8, 0.3, 0.2, 1.0],
            ),
        )?;

        let mut opaque_queue = SgfxDrawQueue::new(opaque_pipeline);
        opaque_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        opaque_queue.set_constant_buffer(SgfxShaderStage::Pixel, 0, view_constants)?;
        opaque_queue.set_constant_buffer(SgfxShaderStage::Vertex, 1, ground_object)?;
        opaque_queue.set_constant_buffer(SgfxShaderStage::Pixel, 1, ground_object)?;
        ground.bind(&mut opaque_queue)?;
        opaque_queue.draw_indexed(ground.index_count, 0, 0)?;
        opaque_queue.set_constant_buffer(SgfxShaderStage::Vertex, 1, cube_object)?;
        opaque_queue.set_constant_buffer(SgfxShaderStage::Pixel, 1, cube_object)?;
        cube.bind(&mut opaque_queue)?;
        opaque_queue.draw_indexed(cube.index_count, 0, 0)?;

        //
        // Fragment list build
        //
        let build_ps =
            resources.create_shader(device, shaders, "oit_build_ps", SgfxShaderStage::Pixel)?;
        let mut build_pipeline_def =
            target.pipeline_def(SgfxPipelineStateDef::new(mesh_vs, Some(build_ps)));
        build_pipeline_def.input_layout = MeshVertex::input_layout();
        // Fragments go to the UAVs, not the color target
        build_pipeline_def.blend_state =
            SgfxBlendState::for_all_targets(SgfxRenderTargetBlendState {
            write_mask: SgfxColorWriteMask::empty(),
            ..Default::default()
        });
        build_pipeline_def.depth_stencil_state = SgfxDepthStencilState::read_only();
        build_pipeline_def.rasterizer_state = SgfxRasterizerState::no_cull();
        build_pipeline_def.debug_name = Some("oit build".to_string());
        let build_pipeline = resources.create_pipeline_state(device, &build_pipeline_def)?;

        let mut sphere_constants = Vec::with_capacity(SPHERE_COUNT);
        let mut build_queue = SgfxDrawQueue::with_capacity(build_pipeline, SPHERE_COUNT);
        build_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        build_queue.set_unordered_access(HEAD_POINTER_UAV_SLOT, head_pointers, None)?;
        build_queue.set_unordered_access(FRAGMENT_UAV_SLOT, fragments, Some(0))?;
        sphere.bind(&mut build_queue)?;
        for _ in 0..SPHERE_COUNT {
            let constants = resources.create_constant_buffer::<ObjectConstants>(device)?;
            build_queue.set_constant_buffer(SgfxShaderStage::Vertex, 1, constants)?;
            build_queue.set_constant_buffer(SgfxShaderStage::Pixel, 1, constants)?;
            build_queue.draw_indexed(sphere.index_count, 0, 0)?;
            sphere_constants.push(constants);
        }

        //
        // Resolve
        //
        let fullscreen_vs =
            resources.create_shader(device, shaders, "fullscreen_vs", SgfxShaderStage::Vertex)?;
        let resolve_ps =
            resources.create_shader(device, shaders, "oit_resolve_ps", SgfxShaderStage::Pixel)?;
        let mut resolve_pipeline_def = target.color_only_pipeline_def(SgfxPipelineStateDef::new(
            fullscreen_vs,
            Some(resolve_ps),
        ));
        // The resolve shader outputs premultiplied color
        resolve_pipeline_def.blend_state =
            SgfxBlendState::for_all_targets(SgfxRenderTargetBlendState {
            blend_enable: true,
            src_color: SgfxBlendFactor::One,
            dst_color: SgfxBlendFactor::InvSrcAlpha,
            src_alpha: SgfxBlendFactor::One,
            dst_alpha: SgfxBlendFactor::InvSrcAlpha,
            ..Default::default()
        });
        resolve_pipeline_def.depth_stencil_state = SgfxDepthStencilState::disabled();
        resolve_pipeline_def.rasterizer_state = SgfxRasterizerState::no_cull();
        resolve_pipeline_def.debug_name = Some("oit resolve".to_string());
        let resolve_pipeline = resources.create_pipeline_state(device, &resolve_pipeline_def)?;

        let mut resolve_queue = SgfxDrawQueue::new(resolve_pipeline);
        resolve_queue.set_shader_resource(SgfxShaderStage::Pixel, 0, head_pointers)?;
        resolve_queue.set_shader_resource(SgfxShaderStage::Pixel, 1, fragments)?;
        resolve_queue.draw(3, 0)?;

        Ok(OitScene {
            resources,
            view_constants,
            sphere_constants,
            head_pointers,
            opaque_queue,
            build_queue,
            resolve_queue,
        })
    }
}

impl DemoScene for OitScene {
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("OitScene::update");
        let time = frame.time.total_seconds();
        let view_constants = ViewConstants::new(
            frame.camera,
            target.aspect_ratio(),
            time,
            Vec3::new(0.2, -1.0, 0.4),
        );
        device.update_buffer_data(self.view_constants, 0, &[view_constants])?;

        for (index, &buffer) in self.sphere_constants.iter().enumerate() {
            let constants =
                ObjectConstants::new(sphere_transform(index, time), sphere_color(index));
            device.update_buffer_data(buffer, 0, &[constants])?;
        }

        Ok(())
    }

    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("OitScene::render");
        device.begin_render_pass(&target.cleared_pass(CLEAR_COLOR))?;
        device.submit_draw_queue(&self.opaque_queue)?;
        device.end_render_pass()?;

        device.clear_unordered_access_uint(self.head_pointers, [END_OF_LIST; 4])?;

        // Depth is tested against the opaque scene but not written
        device.begin_render_pass(&target.loaded_pass(true))?;
        device.submit_draw_queue(&self.build_queue)?;
        device.end_render_pass()?;

        device.begin_render_pass(&target.color_only_pass())?;
        device.submit_draw_queue(&self.resolve_queue)?;
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
    fn test_spheres_are_translucent_and_distinct() {
        for index in 0..SPHERE_COUNT {
            assert!(sphere_color(index)[3] < 1.0);
        }

        let a = sphere_transform(0, 0.0).w_axis;
        let b = sphere_transform(1, 0.0).w_axis;
        assert!((a - b).length() > 1.0);
    }

    #[test]
    fn test_three_passes() {
        let mut harness = SceneHarness::new();
        let camera = Scene::Oit.initial_camera();
        let mut scene =
            OitScene::new(harness.api.device_mut(), &harness.shaders, &harness.target).unwrap();
        let head_pointers = scene.head_pointers;

        let (stats, calls) = harness.run_frame(&mut scene, &camera);
        assert_eq!(stats.render_passes, 3);
        assert_eq!(stats.draws, 2 + SPHERE_COUNT as u32 + 1);

        // Head pointers are reset between the opaque and build passes
        let clear_index = calls
            .iter()
            .position(|call| {
                *call
                    == SgfxNullCall::ClearUnorderedAccessUint(
                        SgfxResourceView::Texture(head_pointers),
                        [END_OF_LIST; 4],
                    )
            })
            .unwrap();
        let pass_starts: Vec<_> = calls
            .iter()
            .enumerate()
            .filter(|(_, call)| matches!(call, SgfxNullCall::BeginRenderPass { .. }))
            .map(|(index, _)| index)
            .collect();
        assert_eq!(pass_starts.len(), 3);
        assert!(pass_starts[0] < clear_index && clear_index < pass_starts[1]);

        // Both pixel UAVs bind in one call after the color target's slot
        assert!(calls.contains(&SgfxNullCall::BindRun {
            stage: Some(SgfxShaderStage::Pixel),
            kind: SgfxBindingKind::UnorderedAccess,
            first_slot: HEAD_POINTER_UAV_SLOT,
            count: 2,
        }));

        // After the first opaque draw, each draw rebinds only its own object constants
        let object_constant_binds = calls
            .iter()
            .filter(|call| {
                **call
                    == SgfxNullCall::BindRun {
                        stage: Some(SgfxShaderStage::Pixel),
                        kind: SgfxBindingKind::ConstantBuffer,
                        first_slot: 1,
                        count: 1,
                    }
            })
            .count();
        // The cube and every sphere. The ground's constants bind together with the view's.
        assert_eq!(object_constant_binds, 1 + SPHERE_COUNT);

        // Resolve reads both lists in one call
        assert!(calls.contains(&SgfxNullCall::BindRun {
            stage: Some(SgfxShaderStage::Pixel),
            kind: SgfxBindingKind::ShaderResource,
            first_slot: 0,
            count: 2,
        }));

        harness.finish(Box::new(scene));
    }
}
