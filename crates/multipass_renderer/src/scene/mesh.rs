//! Mesh assets
//!
//! A mesh asset is a list of GPU-resident submeshes plus the local bounds the scene
//! uses for culling. Submeshes that carry skin data keep their bind-pose vertices on
//! the CPU so the renderer can skin them every frame.
//!
//! # Vertex Layout
//! [`MeshVertex`] is uploaded as tightly packed `f32`s: position (3), normal (3),
//! texture coordinate (2), tangent (3). Stride is [`MeshVertex::STRIDE`] bytes.

use log::debug;

use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::geometry::AABB;
use crate::gpu::{GpuResult, GraphicsDevice, PrimitiveMode, VertexArrayHandle};

/// Bones that can influence one skinned vertex
pub const MAX_BONE_INFLUENCES: usize = 4;

/// 3D vertex data structure for rendering
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeshVertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
    /// Tangent vector for normal mapping
    pub tangent: [f32; 3],
}

impl MeshVertex {
    /// Floats per vertex
    pub const FLOATS: usize = 11;

    /// Bytes per vertex
    pub const STRIDE: usize = Self::FLOATS * std::mem::size_of::<f32>();

    /// Create a new vertex without a tangent
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            tangent: [0.0, 0.0, 0.0],
        }
    }

    /// Packed float representation
    pub fn to_array(&self) -> [f32; Self::FLOATS] {
        let [px, py, pz] = self.position;
        let [nx, ny, nz] = self.normal;
        let [u, v] = self.tex_coord;
        let [tx, ty, tz] = self.tangent;
        [px, py, pz, nx, ny, nz, u, v, tx, ty, tz]
    }
}

/// Pack vertices into the byte layout the device expects
pub fn vertex_bytes(vertices: &[MeshVertex]) -> Vec<u8> {
    let packed: Vec<[f32; MeshVertex::FLOATS]> = vertices.iter().map(MeshVertex::to_array).collect();
    bytemuck::cast_slice(&packed).to_vec()
}

/// Bind-pose data for CPU skinning
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinData {
    /// Vertices in bind pose
    pub bind_vertices: Vec<MeshVertex>,
    /// Index list shared by every skinned copy
    pub indices: Vec<u32>,
    /// Bone indices per vertex
    pub bone_indices: Vec<[u32; MAX_BONE_INFLUENCES]>,
    /// Bone weights per vertex (should sum to one)
    pub bone_weights: Vec<[f32; MAX_BONE_INFLUENCES]>,
}

impl SkinData {
    /// Apply a pose of bone matrices to the bind vertices
    ///
    /// Bones missing from `pose` are treated as identity.
    pub fn skin(&self, pose: &[Mat4]) -> Vec<MeshVertex> {
        let identity = Mat4::identity();
        self.bind_vertices
            .iter()
            .enumerate()
            .map(|(i, vertex)| {
                let bones = self.bone_indices.get(i).copied().unwrap_or_default();
                let weights = self.bone_weights.get(i).copied().unwrap_or([1.0, 0.0, 0.0, 0.0]);

                let position = Point3::from(Vec3::from(vertex.position));
                let normal = Vec3::from(vertex.normal);
                let tangent = Vec3::from(vertex.tangent);
                let mut skinned_position = Vec3::zeros();
                let mut skinned_normal = Vec3::zeros();
                let mut skinned_tangent = Vec3::zeros();
                for (bone, weight) in bones.iter().zip(weights) {
                    if weight == 0.0 {
                        continue;
                    }
                    let matrix = pose.get(*bone as usize).unwrap_or(&identity);
                    skinned_position += matrix.transform_point(&position).coords * weight;
                    skinned_normal += matrix.transform_vector(&normal) * weight;
                    skinned_tangent += matrix.transform_vector(&tangent) * weight;
                }

                let normal = skinned_normal.try_normalize(1.0e-8).unwrap_or(normal);
                MeshVertex {
                    position: skinned_position.into(),
                    normal: normal.into(),
                    tex_coord: vertex.tex_coord,
                    tangent: skinned_tangent.into(),
                }
            })
            .collect()
    }
}

/// CPU-side description of one submesh before upload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubmeshData {
    /// Vertices
    pub vertices: Vec<MeshVertex>,
    /// Index list
    pub indices: Vec<u32>,
    /// Primitive assembly
    pub primitive: PrimitiveMode,
    /// Index into the owning model's material list
    pub material_slot: usize,
    /// Bone weights, for skinned submeshes
    pub skin: Option<SkinData>,
}

/// GPU-resident part of a mesh drawn with one material
#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    /// Bind-pose geometry
    pub vertex_array: VertexArrayHandle,
    /// Primitive assembly
    pub primitive: PrimitiveMode,
    /// Index into the owning model's material list
    pub material_slot: usize,
    /// CPU skinning source
    pub skin: Option<SkinData>,
}

impl Submesh {
    /// Check if the submesh needs skinning before it is drawn
    pub fn is_skinned(&self) -> bool {
        self.skin.is_some()
    }
}

/// Uploaded mesh
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAsset {
    /// Asset name for logs
    pub name: String,
    /// Parts drawn with separate materials
    pub submeshes: Vec<Submesh>,
    /// Model-space bounds of every vertex
    pub local_bounds: AABB,
}

impl MeshAsset {
    /// Upload submesh data and compute bounds
    pub fn upload(
        device: &mut dyn GraphicsDevice,
        name: impl Into<String>,
        parts: Vec<SubmeshData>,
    ) -> GpuResult<Self> {
        let name = name.into();
        let positions: Vec<Vec3> = parts
            .iter()
            .flat_map(|part| part.vertices.iter().map(|v| Vec3::from(v.position)))
            .collect();
        let local_bounds = AABB::from_points(&positions);

        let mut submeshes = Vec::with_capacity(parts.len());
        for part in parts {
            let vertex_array = device.create_vertex_array()?;
            device.set_vertex_data(vertex_array, &vertex_bytes(&part.vertices), MeshVertex::STRIDE, &part.indices)?;
            submeshes.push(Submesh {
                vertex_array,
                primitive: part.primitive,
                material_slot: part.material_slot,
                skin: part.skin,
            });
        }
        debug!("Uploaded mesh '{}' with {} submeshes", name, submeshes.len());

        Ok(Self {
            name,
            submeshes,
            local_bounds,
        })
    }

    /// Release the vertex arrays
    pub fn release(&self, device: &mut dyn GraphicsDevice) {
        for submesh in &self.submeshes {
            device.delete_vertex_array(submesh.vertex_array);
        }
    }
}

/// Box with outward normals, centered at the origin
pub fn box_data(half_extents: Vec3) -> SubmeshData {
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u_axis, v_axis) in faces {
        let (n, u, v) = (Vec3::from(normal), Vec3::from(u_axis), Vec3::from(v_axis));
        let base = vertices.len() as u32;
        for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (n + u * du + v * dv).component_mul(&half_extents);
            vertices.push(MeshVertex {
                position: position.into(),
                normal,
                tex_coord: [(du + 1.0) * 0.5, (dv + 1.0) * 0.5],
                tangent: u_axis,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    SubmeshData {
        vertices,
        indices,
        ..Default::default()
    }
}

/// Horizontal quad facing +Y
pub fn plane_data(half_size: f32) -> SubmeshData {
    let corners = [(-1.0, 1.0), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];
    let vertices = corners
        .iter()
        .map(|&(x, z)| MeshVertex {
            position: [x * half_size, 0.0, z * half_size],
            normal: [0.0, 1.0, 0.0],
            tex_coord: [(x + 1.0) * 0.5, (z + 1.0) * 0.5],
            tangent: [1.0, 0.0, 0.0],
        })
        .collect();

    SubmeshData {
        vertices,
        indices: vec![0, 1, 2, 0, 2, 3],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_data_bounds_and_counts() {
        let data = box_data(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(data.vertices.len(), 24);
        assert_eq!(data.indices.len(), 36);

        let mut device = HeadlessDevice::new();
        let mesh = MeshAsset::upload(&mut device, "box", vec![data]).unwrap();
        assert_relative_eq!(mesh.local_bounds.max, Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(mesh.local_bounds.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(device.vertex_array_count(), 1);

        mesh.release(&mut device);
        assert_eq!(device.vertex_array_count(), 0);
    }

    #[test]
    fn test_vertex_bytes_layout() {
        let vertex = MeshVertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.5, 0.5]);
        let bytes = vertex_bytes(&[vertex, vertex]);
        assert_eq!(bytes.len(), 2 * MeshVertex::STRIDE);
        assert_eq!(&bytes[4..8], &2.0f32.to_ne_bytes());
    }

    #[test]
    fn test_skinning_blends_bone_transforms() {
        let skin = SkinData {
            bind_vertices: vec![MeshVertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0])],
            indices: vec![0],
            bone_indices: vec![[0, 1, 0, 0]],
            bone_weights: vec![[0.5, 0.5, 0.0, 0.0]],
        };
        let pose = [
            Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0)),
            Mat4::new_translation(&Vec3::new(0.0, 0.0, 4.0)),
        ];
        let skinned = skin.skin(&pose);
        assert_relative_eq!(Vec3::from(skinned[0].position), Vec3::new(1.0, 1.0, 2.0));
        assert_relative_eq!(Vec3::from(skinned[0].normal), Vec3::new(0.0, 1.0, 0.0));
    }
}
