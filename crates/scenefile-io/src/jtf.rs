//! JTF: a trivial little-endian binary triangle dump.
//!
//! ```text
//! offset  content
//! 0       magic "JTF!"
//! 4       u32 vertex format (only 0)
//! 8       u32 face count
//! 12      face count x 3 vertices of { pos vec3, normal vec3, uv vec2 }
//! ```

use std::io::{Read, Seek, Write};

use glam::{Vec2, Vec3};
use scenefile_core::{Mesh, Node, SceneFile};

use crate::error::{Error, Result};
use crate::leio::{read_f32, read_u32, write_f32, write_u32};

const MAGIC: &[u8; 4] = b"JTF!";

fn read_vec3<R: Read>(r: &mut R) -> Result<Vec3> {
    Ok(Vec3::new(read_f32(r)?, read_f32(r)?, read_f32(r)?))
}

fn read_vec2<R: Read>(r: &mut R) -> Result<Vec2> {
    Ok(Vec2::new(read_f32(r)?, read_f32(r)?))
}

pub(crate) fn load<R: Read + Seek>(scene: &mut SceneFile, r: &mut R) -> Result<()> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::Format("not a JTF file".into()));
    }
    let fmt = read_u32(r)?;
    if fmt != 0 {
        return Err(Error::Unsupported(format!("JTF vertex format {fmt}")));
    }
    let nfaces = read_u32(r)?;

    let mut mesh = Mesh::new(scene.name());
    for _ in 0..nfaces {
        let base = mesh.num_verts() as u32;
        for _ in 0..3 {
            let pos = read_vec3(r)?;
            let norm = read_vec3(r)?;
            let uv = read_vec2(r)?;
            mesh.add_vertex(pos);
            mesh.add_normal(norm);
            mesh.add_texcoord(uv);
        }
        mesh.add_triangle(base, base + 1, base + 2);
    }

    let mid = scene.add_mesh(mesh);
    let nid = scene.add_node(Node::new(scene.name().to_string()));
    scene.node_add_mesh(nid, mid);
    Ok(())
}

pub(crate) fn save<W: Write>(scene: &SceneFile, w: &mut W) -> Result<()> {
    let total: u32 = scene.meshes().iter().map(|m| m.num_faces() as u32).sum();

    w.write_all(MAGIC)?;
    write_u32(w, 0)?;
    write_u32(w, total)?;

    for mesh in scene.meshes() {
        for face in &mesh.faces {
            for &vi in face {
                let vi = vi as usize;
                let pos = mesh.vertices[vi];
                let norm = mesh.normals.get(vi).copied().unwrap_or(Vec3::Y);
                let uv = mesh.texcoords.get(vi).copied().unwrap_or(Vec2::ZERO);
                for v in [pos.x, pos.y, pos.z, norm.x, norm.y, norm.z, uv.x, uv.y] {
                    write_f32(w, v)?;
                }
            }
        }
    }
    Ok(())
}
