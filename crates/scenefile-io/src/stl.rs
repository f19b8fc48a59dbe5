//! Binary STL.
//!
//! 80-byte header (ignored), LE u32 face count, then 50 bytes per
//! triangle: face normal, three positions, and a 16-bit attribute word.
//! STL stores Z-up right-handed data; vectors are read and written with
//! the y/z components swapped and the winding reversed to match the
//! library's convention.

use std::io::{Read, Seek, SeekFrom, Write};

use glam::Vec3;
use scenefile_core::{Mesh, Node, SceneFile};

use crate::error::{Error, Result};
use crate::leio::{read_f32, read_u32, write_f32, write_u16, write_u32};

const HEADER_SIZE: u64 = 80;
const RECORD_SIZE: u64 = 50;

fn read_vector<R: Read>(r: &mut R) -> Result<Vec3> {
    let x = read_f32(r)?;
    let z = read_f32(r)?;
    let y = read_f32(r)?;
    Ok(Vec3::new(x, y, z))
}

fn write_vector<W: Write>(w: &mut W, v: Vec3) -> Result<()> {
    write_f32(w, v.x)?;
    write_f32(w, v.z)?;
    write_f32(w, v.y)?;
    Ok(())
}

pub(crate) fn load<R: Read + Seek>(scene: &mut SceneFile, r: &mut R) -> Result<()> {
    let start = r.stream_position()?;
    let end = r.seek(SeekFrom::End(0))?;
    let file_size = end - start;

    r.seek(SeekFrom::Start(start + HEADER_SIZE))?;
    let nfaces = read_u32(r)? as u64;
    if nfaces * RECORD_SIZE + HEADER_SIZE + 4 != file_size {
        return Err(Error::Format("STL face count does not match file size".into()));
    }

    let mut mesh = Mesh::new(scene.name());
    let mut vidx = 0u32;
    for _ in 0..nfaces {
        let norm = read_vector(r)?;
        for _ in 0..3 {
            mesh.add_normal(norm);
            let pos = read_vector(r)?;
            mesh.add_vertex(pos);
        }
        mesh.add_triangle(vidx, vidx + 2, vidx + 1);
        vidx += 3;
        r.seek(SeekFrom::Current(2))?; // attribute byte count
    }

    let mid = scene.add_mesh(mesh);
    let nid = scene.add_node(Node::new(scene.name().to_string()));
    scene.node_add_mesh(nid, mid);
    Ok(())
}

pub(crate) fn save<W: Write>(scene: &SceneFile, w: &mut W) -> Result<()> {
    let instances = scene.instances();
    let total: u32 = instances
        .iter()
        .map(|&(_, mid)| scene.mesh(mid).num_faces() as u32)
        .sum();

    let mut header = [0u8; HEADER_SIZE as usize];
    let tag = b"binary STL scene export";
    header[..tag.len()].copy_from_slice(tag);
    w.write_all(&header)?;
    write_u32(w, total)?;

    for (matrix, mid) in instances {
        let mesh = scene.mesh(mid);
        for face in &mesh.faces {
            let p: Vec<Vec3> = face
                .iter()
                .map(|&i| matrix.transform_point3(mesh.vertices[i as usize]))
                .collect();
            // Vertices go out with the winding reversed, mirroring the
            // loader; the axis swap flips handedness once more, so the
            // normal of the in-memory winding is the one the file needs.
            let norm = (p[1] - p[0]).cross(p[2] - p[0]).normalize_or_zero();
            write_vector(w, norm)?;
            write_vector(w, p[0])?;
            write_vector(w, p[2])?;
            write_vector(w, p[1])?;
            write_u16(w, 0)?;
        }
    }
    Ok(())
}
