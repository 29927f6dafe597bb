use super::{group_count, DemoScene, ObjectConstants, SceneFrame, SceneResources, ViewConstants};
use crate::frame_target::FrameTarget;
use crate::geometry::{self, MeshVertex};
use crate::shaders::ShaderLoader;
use glam::{Mat4, Vec3};
use sgfx::api::*;

/// Control points per axis. The deformation is a cubic Bernstein volume.
const LATTICE_DIM: u32 = 4;
const CONTROL_POINT_COUNT: u32 = LATTICE_DIM * LATTICE_DIM * LATTICE_DIM;
const LATTICE_HALF_EXTENT: f32 = 1.0;
const THREADS_PER_GROUP: u32 = 64;
/// Position and normal, 3 floats each
const DEFORMED_VERTEX_SIZE: u32 = 24;
const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct FfdConstants {
    lattice_min: [f32; 4],
    lattice_size: [f32; 4],
    vertex_count: u32,
    _padding: [u32; 3],
}

/// Undeformed position of control point (i, j, k)
fn rest_position(
    i: u32,
    j: u32,
    k: u32,
) -> Vec3 {
    let step = 2.0 * LATTICE_HALF_EXTENT / (LATTICE_DIM - 1) as f32;
    Vec3::new(i as f32, j as f32, k as f32) * step - Vec3::splat(LATTICE_HALF_EXTENT)
}

/// Control points at `time`, x varying fastest. The lattice starts undeformed and then twists
/// about Y while the top layers sway, so t = 0 leaves the mesh unchanged.
pub fn lattice_control_points(time: f32) -> Vec<[f32; 4]> {
    let strength = (time * 1.5).sin();
    let mut points = Vec::with_capacity(CONTROL_POINT_COUNT as usize);
    for k in 0..LATTICE_DIM {
        for j in 0..LATTICE_DIM {
            for i in 0..LATTICE_DIM {
                let rest = rest_position(i, j, k);
                let height = (rest.y + LATTICE_HALF_EXTENT) / (2.0 * LATTICE_HALF_EXTENT);

                let twist = strength * 0.6 * height;
                let (sin, cos) = twist.sin_cos();
                let mut point = Vec3::new(
                    rest.x * cos - rest.z * sin,
                    rest.y,
                    rest.x * sin + rest.z * cos,
                );
                point.x += strength * 0.3 * height * height;
                point.y += strength * 0.15 * (rest.x * std::f32::consts::PI).sin() * height;

                points.push(point.extend(1.0).into());
            }
        }
    }

    points
}

/// Free-form deformation of a sphere. The CPU animates a lattice of control points, a compute
/// shader evaluates the Bernstein volume for every vertex and the vertex shader reads the result.
pub struct FfdScene {
    resources: SceneResources,
    view_constants: SgfxBufferHandle,
    control_point_buffer: SgfxBufferHandle,
    control_points: Vec<[f32; 4]>,
    deform_queue: SgfxComputeQueue,
    mesh_queue: SgfxDrawQueue,
    lattice_queue: SgfxDrawQueue,
}

impl FfdScene {
    pub fn new(
        device: &mut SgfxDevice,
        shaders: &ShaderLoader,
        target: &FrameTarget,
    ) -> SgfxResult<Self> {
        let mut resources = SceneResources::default();

        let view_constants = resources.create_constant_buffer::<ViewConstants>(device)?;

        let sphere = geometry::sphere(LATTICE_HALF_EXTENT * 0.95, 32, 48);
        let vertex_count = sphere.vertices.len() as u32;
        let source_vertices = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef {
                usage: SgfxUsage::Immutable,
                ..SgfxBufferDef::for_structured_buffer(
                    MeshVertex::STRIDE,
                    vertex_count as u64,
                    SgfxBindFlags::SHADER_RESOURCE,
                )
            },
            &sphere.vertices,
        )?;

        // Only the index buffer is used, vertices are fetched from the deformed buffer
        let mut indices = sphere.indices.clone();
        if indices.len() % 2 != 0 {
            indices.push(0);
        }
        let index_buffer = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef::for_index_buffer((indices.len() * 2) as u64),
            &indices,
        )?;

        let deformed_vertices = resources.create_buffer(
            device,
            &SgfxBufferDef::for_raw_buffer(
                (vertex_count * DEFORMED_VERTEX_SIZE) as u64,
                SgfxBindFlags::SHADER_RESOURCE | SgfxBindFlags::UNORDERED_ACCESS,
            ),
            None,
        )?;

        let control_points = lattice_control_points(0.0);
        let control_point_buffer = resources.create_buffer_with_data(
            device,
            &SgfxBufferDef {
                usage: SgfxUsage::Dynamic,
                ..SgfxBufferDef::for_structured_buffer(
                    16,
                    CONTROL_POINT_COUNT as u64,
                    SgfxBindFlags::SHADER_RESOURCE,
                )
            },
            &control_points,
        )?;

        let ffd_constants = resources.create_immutable_constant_buffer(
            device,
            &FfdConstants {
                lattice_min: Vec3::splat(-LATTICE_HALF_EXTENT).extend(0.0).into(),
                lattice_size: Vec3::splat(2.0 * LATTICE_HALF_EXTENT).extend(0.0).into(),
                vertex_count,
                _padding: [0; 3],
            },
        )?;

        let deform_pipeline = resources.create_compute_pipeline(device, shaders, "ffd_deform_cs")?;
        let mut deform_queue = SgfxComputeQueue::new(deform_pipeline);
        deform_queue.set_constant_buffer(0, ffd_constants)?;
        deform_queue.set_shader_resource(0, source_vertices)?;
        deform_queue.set_shader_resource(1, control_point_buffer)?;
        deform_queue.set_unordered_access(0, deformed_vertices, None)?;
        deform_queue.dispatch(group_count(vertex_count, THREADS_PER_GROUP), 1, 1);

        //
        // Deformed mesh
        //
        let ffd_vs = resources.create_shader(device, shaders, "ffd_vs", SgfxShaderStage::Vertex)?;
        let mesh_ps = resources.create_shader(device, shaders, "mesh_ps", SgfxShaderStage::Pixel)?;
        let mut mesh_pipeline_def =
            target.pipeline_def(SgfxPipelineStateDef::new(ffd_vs, Some(mesh_ps)));
        mesh_pipeline_def.debug_name = Some("ffd mesh".to_string());
        let mesh_pipeline = resources.create_pipeline_state(device, &mesh_pipeline_def)?;

        let object_constants = resources.create_immutable_constant_buffer(
            device,
            &ObjectConstants::new(Mat4::identity(), [0.9, 0.55, 0.2, 1.0]),
        )?;

        let mut mesh_queue = SgfxDrawQueue::new(mesh_pipeline);
        mesh_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        mesh_queue.set_constant_buffer(SgfxShaderStage::Vertex, 1, object_constants)?;
        mesh_queue.set_shader_resource(SgfxShaderStage::Vertex, 0, deformed_vertices)?;
        mesh_queue.set_constant_buffer(SgfxShaderStage::Pixel, 0, view_constants)?;
        mesh_queue.set_constant_buffer(SgfxShaderStage::Pixel, 1, object_constants)?;
        mesh_queue.set_index_buffer(index_buffer, 0, SgfxIndexFormat::Uint16)?;
        mesh_queue.draw_indexed(sphere.index_count(), 0, 0)?;

        //
        // Control points
        //
        let lattice_vs =
            resources.create_shader(device, shaders, "lattice_vs", SgfxShaderStage::Vertex)?;
        let color_ps =
            resources.create_shader(device, shaders, "color_ps", SgfxShaderStage::Pixel)?;
        let mut lattice_pipeline_def =
            target.pipeline_def(SgfxPipelineStateDef::new(lattice_vs, Some(color_ps)));
        lattice_pipeline_def.primitive_topology = SgfxPrimitiveTopology::PointList;
        lattice_pipeline_def.debug_name = Some("ffd lattice".to_string());
        let lattice_pipeline = resources.create_pipeline_state(device, &lattice_pipeline_def)?;

        let mut lattice_queue = SgfxDrawQueue::new(lattice_pipeline);
        lattice_queue.set_constant_buffer(SgfxShaderStage::Vertex, 0, view_constants)?;
        lattice_queue.set_shader_resource(SgfxShaderStage::Vertex, 0, control_point_buffer)?;
        lattice_queue.draw(CONTROL_POINT_COUNT, 0)?;

        Ok(FfdScene {
            resources,
            view_constants,
            control_point_buffer,
            control_points,
            deform_queue,
            mesh_queue,
            lattice_queue,
        })
    }
}

impl DemoScene for FfdScene {
    fn update(
        &mut self,
        device: &mut SgfxDevice,
        frame: &SceneFrame,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("FfdScene::update");
        let time = frame.time.total_seconds();
        let view_constants = ViewConstants::new(
            frame.camera,
            target.aspect_ratio(),
            time,
            Vec3::new(0.5, -1.0, 0.8),
        );
        device.update_buffer_data(self.view_constants, 0, &[view_constants])?;

        self.control_points = lattice_control_points(time);
        device.update_buffer_data(self.control_point_buffer, 0, &self.control_points)?;
        device.submit_compute_queue(&self.deform_queue)
    }

    fn render(
        &mut self,
        device: &mut SgfxDevice,
        target: &FrameTarget,
    ) -> SgfxResult<()> {
        profiling::scope!("FfdScene::render");
        device.begin_render_pass(&target.cleared_pass(CLEAR_COLOR))?;
        device.submit_draw_queue(&self.mesh_queue)?;
        device.submit_draw_queue(&self.lattice_queue)?;
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
    fn test_lattice_starts_undeformed() {
        let points = lattice_control_points(0.0);
        assert_eq!(points.len(), CONTROL_POINT_COUNT as usize);

        for k in 0..LATTICE_DIM {
            for j in 0..LATTICE_DIM {
                for i in 0..LATTICE_DIM {
                    let index = (i + j * LATTICE_DIM + k * LATTICE_DIM * LATTICE_DIM) as usize;
                    let rest = rest_position(i, j, k);
                    let point = Vec3::new(points[index][0], points[index][1], points[index][2]);
                    assert!((point - rest).length() < 1e-6);
                }
            }
        }

        // Corners span the lattice bounds
        assert_eq!(points[0], [-1.0, -1.0, -1.0, 1.0]);
        assert_eq!(points[CONTROL_POINT_COUNT as usize - 1], [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_lattice_deforms_over_time() {
        let rest = lattice_control_points(0.0);
        let moved = lattice_control_points(1.0);
        // The bottom layer stays pinned, the top layer moves
        assert_eq!(rest[0], moved[0]);
        let last = CONTROL_POINT_COUNT as usize - 1;
        assert_ne!(rest[last], moved[last]);
    }

    #[test]
    fn test_deform_then_draw_without_vertex_buffers() {
        let mut harness = SceneHarness::new();
        let camera = Scene::Ffd.initial_camera();
        let mut scene =
            FfdScene::new(harness.api.device_mut(), &harness.shaders, &harness.target).unwrap();

        let (stats, calls) = harness.run_frame(&mut scene, &camera);
        assert_eq!(stats.dispatches, 1);
        assert_eq!(stats.draws, 2);
        assert!(calls.contains(&SgfxNullCall::Draw(SgfxDrawParams::Draw {
            vertex_count: CONTROL_POINT_COUNT,
            first_vertex: 0,
        })));
        assert!(!calls
            .iter()
            .any(|call| matches!(call, SgfxNullCall::SetVertexBuffers { .. })));

        // The lattice buffer holds the points animated on the CPU this frame
        let contents = harness
            .api
            .device()
            .null_device()
            .unwrap()
            .buffer_contents(scene.control_point_buffer)
            .unwrap()
            .to_vec();
        assert_eq!(contents, bytemuck::cast_slice::<_, u8>(&scene.control_points[..]));

        harness.finish(Box::new(scene));
    }
}
