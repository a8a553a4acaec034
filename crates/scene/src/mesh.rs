use serde::{Deserialize, Serialize};

/// Id of a mesh uploaded to a graphics device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeshId(pub u32);

/// A drawable mesh, tagged with the geometry source it came from.
///
/// All variants refer to geometry already resident on the device, so drawing
/// any of them is the same opaque call for the bound program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshHandle {
    /// Built-in shape (cube, sphere, quad, plane).
    Primitive(MeshId),
    /// Generated at scene-build time (terrain and the like).
    Procedural(MeshId),
    /// Imported from a mesh file.
    Loaded(MeshId),
}

impl MeshHandle {
    pub fn id(self) -> MeshId {
        match self {
            Self::Primitive(id) | Self::Procedural(id) | Self::Loaded(id) => id,
        }
    }
}

/// Vertex layout shared by every program: position, normal and texture
/// coordinate at attribute slots 0, 1 and 2.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// CPU-side indexed triangle list, counter-clockwise front faces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Unit cube centred on the origin (edge length 1).
    pub fn cube() -> Self {
        let p = 0.5_f32;
        // (normal, tangent u, tangent v) per face; corners are n*p -/+ u*p -/+ v*p.
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut mesh = Self::default();
        for (n, u, v) in faces {
            let base = mesh.vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = [
                    (n[0] + su * u[0] + sv * v[0]) * p,
                    (n[1] + su * u[1] + sv * v[1]) * p,
                    (n[2] + su * u[2] + sv * v[2]) * p,
                ];
                let uv = [(su + 1.0) * 0.5, (sv + 1.0) * 0.5];
                mesh.vertices.push(Vertex::new(position, n, uv));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        mesh
    }

    /// Unit sphere around the Z axis with `segments` slices and half as many stacks.
    pub fn uv_sphere(segments: u32) -> Self {
        let segments = segments.max(3);
        let stacks = (segments / 2).max(2);
        let mut mesh = Self::default();

        for i in 0..=stacks {
            let theta = std::f32::consts::PI * i as f32 / stacks as f32;
            for j in 0..=segments {
                let phi = std::f32::consts::TAU * j as f32 / segments as f32;
                let n = [theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()];
                let uv = [j as f32 / segments as f32, i as f32 / stacks as f32];
                mesh.vertices.push(Vertex::new(n, n, uv));
            }
        }

        let row = segments + 1;
        for i in 0..stacks {
            for j in 0..segments {
                let a = i * row + j;
                let b = a + row;
                let c = b + 1;
                let d = a + 1;
                mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        mesh
    }

    /// The -1..+1 square in the XY plane facing +Z. Doubles as the
    /// full-screen quad of the lighting pass.
    pub fn quad() -> Self {
        let n = [0.0, 0.0, 1.0];
        Self {
            vertices: vec![
                Vertex::new([-1.0, -1.0, 0.0], n, [0.0, 0.0]),
                Vertex::new([1.0, -1.0, 0.0], n, [1.0, 0.0]),
                Vertex::new([1.0, 1.0, 0.0], n, [1.0, 1.0]),
                Vertex::new([-1.0, 1.0, 0.0], n, [0.0, 1.0]),
            ],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// Subdivided square of side `2 * half_size` in the XY plane facing +Z.
    pub fn plane(half_size: f32, divisions: u32) -> Self {
        let divisions = divisions.max(1);
        let n = [0.0, 0.0, 1.0];
        let mut mesh = Self::default();

        for i in 0..=divisions {
            for j in 0..=divisions {
                let s = j as f32 / divisions as f32;
                let t = i as f32 / divisions as f32;
                let position = [
                    (s * 2.0 - 1.0) * half_size,
                    (t * 2.0 - 1.0) * half_size,
                    0.0,
                ];
                mesh.vertices.push(Vertex::new(position, n, [s, t]));
            }
        }

        let row = divisions + 1;
        for i in 0..divisions {
            for j in 0..divisions {
                let a = i * row + j;
                let b = a + 1;
                let c = b + row;
                let d = a + row;
                mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
            }
        }
        mesh
    }

    /// Uniformly scale every position.
    pub fn scaled(mut self, factor: f32) -> Self {
        for v in &mut self.vertices {
            for c in &mut v.position {
                *c *= factor;
            }
        }
        self
    }
}
