//! Procedurally generated meshes. Triangles wind clockwise when seen from the side their normal
//! points to, the front face the demo pipelines use.

use sgfx::api::{
    SgfxBufferDef, SgfxBufferHandle, SgfxDevice, SgfxDrawQueue, SgfxFormat, SgfxIndexFormat,
    SgfxInputElement, SgfxResult,
};
use std::f32::consts::PI;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub const STRIDE: u32 = std::mem::size_of::<MeshVertex>() as u32;

    pub fn new(
        position: glam::Vec3,
        normal: glam::Vec3,
        uv: glam::Vec2,
    ) -> Self {
        MeshVertex {
            position: position.into(),
            normal: normal.into(),
            uv: uv.into(),
        }
    }

    /// Vertex attributes read from vertex buffer slot 0
    pub fn input_layout() -> Vec<SgfxInputElement> {
        vec![
            SgfxInputElement::per_vertex("POSITION", SgfxFormat::R32G32B32Float, 0, 0),
            SgfxInputElement::per_vertex("NORMAL", SgfxFormat::R32G32B32Float, 0, 12),
            SgfxInputElement::per_vertex("TEXCOORD", SgfxFormat::R32G32Float, 0, 24),
        ]
    }
}

#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    fn push_vertex(
        &mut self,
        position: glam::Vec3,
        normal: glam::Vec3,
        uv: glam::Vec2,
    ) -> u16 {
        self.vertices.push(MeshVertex::new(position, normal, uv));
        (self.vertices.len() - 1) as u16
    }

    /// Two triangles for the quad a-b-c-d, given clockwise from the front
    fn push_quad(
        &mut self,
        a: u16,
        b: u16,
        c: u16,
        d: u16,
    ) {
        self.indices.extend_from_slice(&[a, b, c, a, c, d]);
    }

    /// Uploads to immutable vertex and index buffers
    pub fn create_buffers(
        &self,
        device: &mut SgfxDevice,
    ) -> SgfxResult<MeshBuffers> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let vertex_buffer = device.create_buffer(
            &SgfxBufferDef::for_vertex_buffer(vertex_bytes.len() as u64),
            Some(vertex_bytes),
        )?;

        // Index data is padded to 4 bytes
        let mut index_bytes: Vec<u8> = bytemuck::cast_slice(&self.indices).to_vec();
        let padded_size =
            sgfx::base::memory::round_size_up_to_alignment_u64(index_bytes.len() as u64, 4);
        index_bytes.resize(padded_size as usize, 0);
        let index_buffer = device.create_buffer(
            &SgfxBufferDef::for_index_buffer(index_bytes.len() as u64),
            Some(&index_bytes),
        )?;

        Ok(MeshBuffers {
            vertex_buffer,
            index_buffer,
            index_count: self.index_count(),
            vertex_count: self.vertices.len() as u32,
        })
    }
}

/// GPU copy of a `MeshData`
#[derive(Copy, Clone, Debug)]
pub struct MeshBuffers {
    pub vertex_buffer: SgfxBufferHandle,
    pub index_buffer: SgfxBufferHandle,
    pub index_count: u32,
    pub vertex_count: u32,
}

impl MeshBuffers {
    /// Sets vertex buffer slot 0 and the index buffer
    pub fn bind(
        &self,
        queue: &mut SgfxDrawQueue,
    ) -> SgfxResult<()> {
        queue.set_vertex_buffer(0, Some(self.vertex_buffer), 0, MeshVertex::STRIDE)?;
        queue.set_index_buffer(self.index_buffer, 0, SgfxIndexFormat::Uint16)
    }
}

/// Axis aligned cube centered on the origin with a separate set of vertices per face
pub fn cube(half_extent: f32) -> MeshData {
    let mut mesh = MeshData::default();

    // Outward normal, then the face's right and up directions as seen from outside
    let faces = [
        (glam::Vec3::X, glam::Vec3::Z, glam::Vec3::Y),
        (-glam::Vec3::X, -glam::Vec3::Z, glam::Vec3::Y),
        (glam::Vec3::Y, glam::Vec3::X, glam::Vec3::Z),
        (-glam::Vec3::Y, glam::Vec3::X, -glam::Vec3::Z),
        (glam::Vec3::Z, -glam::Vec3::X, glam::Vec3::Y),
        (-glam::Vec3::Z, glam::Vec3::X, glam::Vec3::Y),
    ];

    for &(normal, right, up) in &faces {
        let center = normal * half_extent;
        let right = right * half_extent;
        let up = up * half_extent;

        let top_left = mesh.push_vertex(center - right + up, normal, glam::Vec2::new(0.0, 0.0));
        let top_right = mesh.push_vertex(center + right + up, normal, glam::Vec2::new(1.0, 0.0));
        let bottom_right =
            mesh.push_vertex(center + right - up, normal, glam::Vec2::new(1.0, 1.0));
        let bottom_left =
            mesh.push_vertex(center - right - up, normal, glam::Vec2::new(0.0, 1.0));
        mesh.push_quad(top_left, top_right, bottom_right, bottom_left);
    }

    mesh
}

/// Unit quad in the XY plane facing -Z, the camera-facing billboard for particles. Corners are at
/// +/-0.5 so the vertex shader can offset along the camera's right and up vectors.
pub fn quad() -> MeshData {
    let mut mesh = MeshData::default();
    let normal = -glam::Vec3::Z;
    let top_left = mesh.push_vertex(
        glam::Vec3::new(-0.5, 0.5, 0.0),
        normal,
        glam::Vec2::new(0.0, 0.0),
    );
    let top_right = mesh.push_vertex(
        glam::Vec3::new(0.5, 0.5, 0.0),
        normal,
        glam::Vec2::new(1.0, 0.0),
    );
    let bottom_right =
        mesh.push_vertex(glam::Vec3::new(0.5, -0.5, 0.0), normal, glam::Vec2::new(1.0, 1.0));
    let bottom_left =
        mesh.push_vertex(glam::Vec3::new(-0.5, -0.5, 0.0), normal, glam::Vec2::new(0.0, 1.0));
    mesh.push_quad(top_left, top_right, bottom_right, bottom_left);
    mesh
}

/// A tapering grass blade of unit height standing on the origin, facing -Z. The vertex shader
/// bends it using the uv.y (0 at the root, 1 at the tip).
pub fn grass_blade(segments: u32) -> MeshData {
    let mut mesh = MeshData::default();
    let segments = segments.max(1);
    let normal = -glam::Vec3::Z;
    const ROOT_HALF_WIDTH: f32 = 0.05;

    let mut previous: Option<(u16, u16)> = None;
    for i in 0..segments {
        let t = i as f32 / segments as f32;
        let half_width = ROOT_HALF_WIDTH * (1.0 - t);
        let left = mesh.push_vertex(
            glam::Vec3::new(-half_width, t, 0.0),
            normal,
            glam::Vec2::new(0.0, t),
        );
        let right = mesh.push_vertex(
            glam::Vec3::new(half_width, t, 0.0),
            normal,
            glam::Vec2::new(1.0, t),
        );

        if let Some((below_left, below_right)) = previous {
            mesh.push_quad(left, right, below_right, below_left);
        }
        previous = Some((left, right));
    }

    let tip = mesh.push_vertex(glam::Vec3::new(0.0, 1.0, 0.0), normal, glam::Vec2::new(0.5, 1.0));
    if let Some((below_left, below_right)) = previous {
        mesh.indices.extend_from_slice(&[below_left, tip, below_right]);
    }

    mesh
}

/// Square in the XZ plane facing +Y, split into `subdivisions` quads per side
pub fn plane(
    size: f32,
    subdivisions: u32,
) -> MeshData {
    let mut mesh = MeshData::default();
    let subdivisions = subdivisions.max(1);
    let row_length = subdivisions + 1;

    for z in 0..row_length {
        for x in 0..row_length {
            let u = x as f32 / subdivisions as f32;
            let v = z as f32 / subdivisions as f32;
            mesh.push_vertex(
                glam::Vec3::new((u - 0.5) * size, 0.0, (0.5 - v) * size),
                glam::Vec3::Y,
                glam::Vec2::new(u, v),
            );
        }
    }

    // Row z is further along +Z than row z + 1
    for z in 0..subdivisions {
        for x in 0..subdivisions {
            let top_left = (z * row_length + x) as u16;
            let top_right = top_left + 1;
            let bottom_left = top_left + row_length as u16;
            let bottom_right = bottom_left + 1;
            mesh.push_quad(top_left, top_right, bottom_right, bottom_left);
        }
    }

    mesh
}

/// UV sphere centered on the origin
pub fn sphere(
    radius: f32,
    rings: u32,
    sectors: u32,
) -> MeshData {
    let mut mesh = MeshData::default();
    let rings = rings.max(2);
    let sectors = sectors.max(3);

    // Ring 0 is the north pole. Sector angle increases toward +X from +Z.
    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let polar = v * PI;
        for sector in 0..=sectors {
            let u = sector as f32 / sectors as f32;
            let azimuth = u * 2.0 * PI;
            let normal = glam::Vec3::new(
                polar.sin() * azimuth.sin(),
                polar.cos(),
                polar.sin() * azimuth.cos(),
            );
            mesh.push_vertex(normal * radius, normal, glam::Vec2::new(u, v));
        }
    }

    let row_length = sectors + 1;
    for ring in 0..rings {
        for sector in 0..sectors {
            let top_left = (ring * row_length + sector) as u16;
            let top_right = top_left + 1;
            let bottom_left = top_left + row_length as u16;
            let bottom_right = bottom_left + 1;

            // The pole rows collapse to a point, skip their degenerate triangles
            if ring != 0 {
                mesh.indices.extend_from_slice(&[top_left, bottom_right, top_right]);
            }
            if ring != rings - 1 {
                mesh.indices.extend_from_slice(&[top_left, bottom_left, bottom_right]);
            }
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(
        mesh: &MeshData,
        index: u16,
    ) -> glam::Vec3 {
        glam::Vec3::from(mesh.vertices[index as usize].position)
    }

    // Clockwise from the front in a left-handed system means the cross product of the edges points
    // along the normal
    fn assert_front_faces_match_normals(mesh: &MeshData) {
        assert_eq!(mesh.indices.len() % 3, 0);
        for triangle in mesh.indices.chunks(3) {
            let a = position(mesh, triangle[0]);
            let b = position(mesh, triangle[1]);
            let c = position(mesh, triangle[2]);
            let face_normal = (b - a).cross(c - a);
            assert!(face_normal.length() > 0.0, "degenerate triangle {:?}", triangle);

            let vertex_normal = glam::Vec3::from(mesh.vertices[triangle[0] as usize].normal);
            assert!(
                face_normal.dot(vertex_normal) > 0.0,
                "triangle {:?} winds against its normal",
                triangle
            );
        }
    }

    fn assert_indices_in_range(mesh: &MeshData) {
        assert!(mesh
            .indices
            .iter()
            .all(|&index| (index as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_cube() {
        let mesh = cube(0.5);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert_indices_in_range(&mesh);
        assert_front_faces_match_normals(&mesh);
        assert!(mesh
            .vertices
            .iter()
            .all(|vertex| vertex.position.iter().all(|x| x.abs() == 0.5)));
    }

    #[test]
    fn test_quad_faces_camera() {
        let mesh = quad();
        assert_eq!(mesh.index_count(), 6);
        assert_front_faces_match_normals(&mesh);
    }

    #[test]
    fn test_grass_blade() {
        let mesh = grass_blade(4);
        assert_eq!(mesh.vertices.len(), 9);
        assert_eq!(mesh.index_count(), 3 * 6 + 3);
        assert_indices_in_range(&mesh);
        assert_front_faces_match_normals(&mesh);
    }

    #[test]
    fn test_plane() {
        let mesh = plane(10.0, 4);
        assert_eq!(mesh.vertices.len(), 25);
        assert_eq!(mesh.index_count(), 4 * 4 * 6);
        assert_indices_in_range(&mesh);
        assert_front_faces_match_normals(&mesh);
    }

    #[test]
    fn test_sphere() {
        let mesh = sphere(2.0, 8, 12);
        assert_eq!(mesh.vertices.len(), 9 * 13);
        // Two triangles per quad except on the pole rows
        assert_eq!(mesh.index_count(), (8 * 12 * 2 - 2 * 12) * 3);
        assert_indices_in_range(&mesh);
        assert_front_faces_match_normals(&mesh);
        for vertex in &mesh.vertices {
            let length = glam::Vec3::from(vertex.position).length();
            assert!((length - 2.0).abs() < 1e-4);
        }
    }
}
