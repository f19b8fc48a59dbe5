//! Triangle mesh with parallel attribute arrays, plus the immediate-mode
//! assembly builder and the per-mesh processing passes (normal synthesis,
//! tangent synthesis, transform baking).

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::aabox::Aabox;
use crate::ids::MaterialId;

/// A triangle: three vertex indices into the owning mesh.
pub type Face = [u32; 3];

/// A named mesh.
///
/// `vertices` is the authoritative attribute array; `normals`, `tangents`,
/// `texcoords` and `colors` are optional-by-emptiness and, when present,
/// must have the same length as `vertices`. The local-space bounding box is
/// maintained incrementally by [`Mesh::add_vertex`].
#[derive(Debug, Default, Clone)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub colors: Vec<Vec4>,
    pub faces: Vec<Face>,
    pub aabox: Aabox,
    pub material: Option<MaterialId>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn num_verts(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Append a vertex position, expanding the local bounding box.
    pub fn add_vertex(&mut self, v: Vec3) {
        self.vertices.push(v);
        self.aabox.expand(v);
    }

    pub fn add_normal(&mut self, n: Vec3) {
        self.normals.push(n);
    }

    pub fn add_tangent(&mut self, t: Vec3) {
        self.tangents.push(t);
    }

    pub fn add_texcoord(&mut self, uv: Vec2) {
        self.texcoords.push(uv);
    }

    pub fn add_color(&mut self, c: Vec4) {
        self.colors.push(c);
    }

    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.faces.push([a, b, c]);
    }

    /// A quad becomes the two triangles `a,b,c` and `a,c,d`.
    pub fn add_quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.faces.push([a, b, c]);
        self.faces.push([a, c, d]);
    }

    /// Reset the mesh to its freshly-initialized state, keeping the name.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.normals.clear();
        self.tangents.clear();
        self.texcoords.clear();
        self.colors.clear();
        self.faces.clear();
        self.aabox = Aabox::EMPTY;
        self.material = None;
    }

    /// Check the structural invariants: every present attribute array has
    /// the same length as `vertices`, and every face index is in range.
    pub fn attributes_consistent(&self) -> bool {
        let nv = self.vertices.len();
        if !self.normals.is_empty() && self.normals.len() != nv {
            return false;
        }
        if !self.tangents.is_empty() && self.tangents.len() != nv {
            return false;
        }
        if !self.texcoords.is_empty() && self.texcoords.len() != nv {
            return false;
        }
        if !self.colors.is_empty() && self.colors.len() != nv {
            return false;
        }
        self.faces
            .iter()
            .all(|f| f.iter().all(|&i| (i as usize) < nv))
    }

    /// Synthesize smooth per-vertex normals: accumulate each face normal
    /// into its three vertex slots, then normalize. Hard edges are not
    /// preserved.
    pub fn calc_normals(&mut self) {
        self.normals.clear();
        self.normals.resize(self.vertices.len(), Vec3::ZERO);

        for f in &self.faces {
            let v0 = self.vertices[f[0] as usize];
            let v1 = self.vertices[f[1] as usize];
            let v2 = self.vertices[f[2] as usize];
            let fnorm = (v1 - v0).cross(v2 - v0).normalize_or_zero();
            for &i in f {
                self.normals[i as usize] += fnorm;
            }
        }
        for n in &mut self.normals {
            *n = n.normalize_or_zero();
        }
    }

    /// Synthesize per-vertex tangents from the texcoord differentials,
    /// orthonormalized against the vertex normals. Requires texcoords;
    /// synthesizes normals first when they are absent. The bitangent sign
    /// is not stored; consumers reconstruct handedness.
    pub fn calc_tangents(&mut self) {
        if self.texcoords.len() != self.vertices.len() {
            return;
        }
        if self.normals.len() != self.vertices.len() {
            self.calc_normals();
        }

        let mut acc = vec![Vec3::ZERO; self.vertices.len()];
        for f in &self.faces {
            let v0 = self.vertices[f[0] as usize];
            let v1 = self.vertices[f[1] as usize];
            let v2 = self.vertices[f[2] as usize];
            let t0 = self.texcoords[f[0] as usize];
            let t1 = self.texcoords[f[1] as usize];
            let t2 = self.texcoords[f[2] as usize];

            let e1 = v1 - v0;
            let e2 = v2 - v0;
            let d1 = t1 - t0;
            let d2 = t2 - t0;

            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < 1e-8 {
                continue;
            }
            let udir = (e1 * d2.y - e2 * d1.y) / det;
            for &i in f {
                acc[i as usize] += udir;
            }
        }

        self.tangents.clear();
        self.tangents.reserve(self.vertices.len());
        for (i, t) in acc.into_iter().enumerate() {
            let n = self.normals[i];
            self.tangents.push((t - n * n.dot(t)).normalize_or_zero());
        }
    }

    /// Transform positions by `m` and normals/tangents by the
    /// inverse-transpose of `m`, then recompute the local bounding box.
    pub fn transform(&mut self, m: &Mat4) {
        let dir_mat = if m.determinant().abs() > f32::EPSILON {
            Mat3::from_mat4(m.inverse().transpose())
        } else {
            Mat3::from_mat4(*m)
        };

        self.aabox = Aabox::EMPTY;
        for v in &mut self.vertices {
            *v = m.transform_point3(*v);
            self.aabox.expand(*v);
        }
        for n in &mut self.normals {
            *n = (dir_mat * *n).normalize_or_zero();
        }
        for t in &mut self.tangents {
            *t = (dir_mat * *t).normalize_or_zero();
        }
    }
}

/// Primitive mode for [`MeshBuilder`]. The discriminant is the number of
/// vertices per emitted primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Triangles = 3,
    Quads = 4,
}

impl Primitive {
    fn verts(self) -> u32 {
        self as u32
    }
}

/// Immediate-mode mesh assembly.
///
/// The builder remembers the current normal/tangent/texcoord/color and
/// emits a triangle (or quad) automatically every 3rd (or 4th) call to
/// [`MeshBuilder::vertex`].
///
/// ```ignore
/// let mut b = MeshBuilder::begin("quad", Primitive::Quads);
/// b.normal(Vec3::Z);
/// b.vertex(Vec3::new(0.0, 0.0, 0.0));
/// b.vertex(Vec3::new(1.0, 0.0, 0.0));
/// b.vertex(Vec3::new(1.0, 1.0, 0.0));
/// b.vertex(Vec3::new(0.0, 1.0, 0.0));
/// let mesh = b.end();
/// ```
#[derive(Debug)]
pub struct MeshBuilder {
    mesh: Mesh,
    prim: Primitive,
    normal: Option<Vec3>,
    tangent: Option<Vec3>,
    texcoord: Option<Vec2>,
    color: Option<Vec4>,
    pending: u32,
}

impl MeshBuilder {
    pub fn begin(name: impl Into<String>, prim: Primitive) -> Self {
        Self {
            mesh: Mesh::new(name),
            prim,
            normal: None,
            tangent: None,
            texcoord: None,
            color: None,
            pending: 0,
        }
    }

    pub fn normal(&mut self, n: Vec3) {
        self.normal = Some(n);
    }

    pub fn tangent(&mut self, t: Vec3) {
        self.tangent = Some(t);
    }

    pub fn texcoord(&mut self, uv: Vec2) {
        self.texcoord = Some(uv);
    }

    pub fn color(&mut self, c: Vec4) {
        self.color = Some(c);
    }

    /// Append a vertex carrying the current attribute state. Completes a
    /// primitive when enough vertices have streamed in.
    pub fn vertex(&mut self, p: Vec3) {
        let idx = self.mesh.num_verts() as u32;
        self.mesh.add_vertex(p);
        if let Some(n) = self.normal {
            self.mesh.add_normal(n);
        }
        if let Some(t) = self.tangent {
            self.mesh.add_tangent(t);
        }
        if let Some(uv) = self.texcoord {
            self.mesh.add_texcoord(uv);
        }
        if let Some(c) = self.color {
            self.mesh.add_color(c);
        }

        self.pending += 1;
        if self.pending == self.prim.verts() {
            match self.prim {
                Primitive::Triangles => self.mesh.add_triangle(idx - 2, idx - 1, idx),
                Primitive::Quads => self.mesh.add_quad(idx - 3, idx - 2, idx - 1, idx),
            }
            self.pending = 0;
        }
    }

    /// Finish assembly. An incomplete trailing primitive is dropped along
    /// with its vertices' face; the vertices themselves remain.
    pub fn end(self) -> Mesh {
        self.mesh
    }
}
