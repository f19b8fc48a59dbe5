//! 3D Studio .3DS: a little-endian tagged-chunk binary tree.
//!
//! Every chunk is a 6-byte header (`u16` id, `u32` length including the
//! header) followed by primitives and/or sub-chunks packed back to back.
//! The reader walks the tree with bounded seeks: a chunk records its end
//! position on entry, sub-chunk iteration stops when fewer than 6 bytes
//! remain, and skipping seeks to the recorded end. The writer assembles
//! chunk bodies in memory so every length is known before it is emitted.

use std::io::{Read, Seek, SeekFrom, Write};

use glam::{Mat4, Vec2, Vec3, Vec4};
use log::{debug, warn};
use scenefile_core::{Material, Mesh, MtlAttr, Node, SceneFile, TextureMap};

use crate::error::{Error, Result};
use crate::leio::{read_f32, read_u16, read_u32, write_u16, write_u32};

const CID_VERSION: u16 = 0x0002;
const CID_RGBF: u16 = 0x0010;
const CID_RGB: u16 = 0x0011;
const CID_RGB_GAMMA: u16 = 0x0012;
const CID_RGBF_GAMMA: u16 = 0x0013;
const CID_PERCENT_INT: u16 = 0x0030;
const CID_PERCENT_FLT: u16 = 0x0031;
const CID_MAIN: u16 = 0x4d4d;
const CID_3DEDITOR: u16 = 0x3d3d;
const CID_MESHVER: u16 = 0x3d3e;
const CID_OBJECT: u16 = 0x4000;
const CID_TRIMESH: u16 = 0x4100;
const CID_VERTLIST: u16 = 0x4110;
const CID_FACEDESC: u16 = 0x4120;
const CID_FACEMTL: u16 = 0x4130;
const CID_UVLIST: u16 = 0x4140;
const CID_MESHMATRIX: u16 = 0x4160;
const CID_MATERIAL: u16 = 0xafff;
const CID_MTL_NAME: u16 = 0xa000;
const CID_MTL_AMBIENT: u16 = 0xa010;
const CID_MTL_DIFFUSE: u16 = 0xa020;
const CID_MTL_SPECULAR: u16 = 0xa030;
const CID_MTL_SHININESS: u16 = 0xa040;
const CID_MTL_SHINSTR: u16 = 0xa041;
const CID_MTL_SELFILLUM: u16 = 0xa084;
const CID_MTL_TEXMAP1: u16 = 0xa200;
const CID_MTL_SPECMAP: u16 = 0xa204;
const CID_MTL_ALPHAMAP: u16 = 0xa210;
const CID_MTL_REFLMAP: u16 = 0xa220;
const CID_MTL_BUMPMAP: u16 = 0xa230;
const CID_MTL_SHINMAP: u16 = 0xa33c;
const CID_MAP_FILENAME: u16 = 0xa300;
const CID_MAP_VSCALE: u16 = 0xa354;
const CID_MAP_USCALE: u16 = 0xa356;
const CID_MAP_UOFFS: u16 = 0xa358;
const CID_MAP_VOFFS: u16 = 0xa35a;
const CID_MAP_UVROT: u16 = 0xa35c;

const CHDR_SIZE: u64 = 6;

/// The largest vertex/face count a 3DS trimesh can carry.
const MAX_LIST: usize = 65535;

#[derive(Debug, Clone, Copy)]
struct Chunk {
    id: u16,
    len: u32,
    endpos: u64,
}

/// Read the next sub-chunk header, or `None` when fewer than 6 bytes of
/// the parent remain.
fn read_chunk<R: Read + Seek>(r: &mut R, parent: Option<&Chunk>) -> Result<Option<Chunk>> {
    let fpos = r.stream_position()?;
    if let Some(p) = parent {
        if fpos + CHDR_SIZE > p.endpos {
            return Ok(None);
        }
    }
    let id = read_u16(r)?;
    let len = read_u32(r)?;
    if (len as u64) < CHDR_SIZE {
        return Err(Error::Format(format!("3DS chunk {id:#06x} with invalid size {len}")));
    }
    Ok(Some(Chunk {
        id,
        len,
        endpos: fpos + len as u64,
    }))
}

fn skip_chunk<R: Seek>(r: &mut R, ck: &Chunk) -> Result<()> {
    r.seek(SeekFrom::Start(ck.endpos))?;
    Ok(())
}

/// Read the fixed-size payload of a string chunk, stopping at the NUL.
fn read_str_chunk<R: Read>(r: &mut R, ck: &Chunk) -> Result<String> {
    let datalen = ck.len as usize - CHDR_SIZE as usize;
    let mut buf = vec![0u8; datalen];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Read a NUL-terminated string byte by byte, bounded by the parent chunk.
fn read_str_nul<R: Read + Seek>(r: &mut R, par: &Chunk) -> Result<String> {
    let mut out = Vec::new();
    let mut fpos = r.stream_position()?;
    let mut byte = [0u8; 1];
    while fpos < par.endpos {
        r.read_exact(&mut byte)?;
        fpos += 1;
        if byte[0] == 0 {
            break;
        }
        out.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn read_color<R: Read + Seek>(r: &mut R, par: &Chunk) -> Result<Vec3> {
    let ck = read_chunk(r, Some(par))?
        .ok_or_else(|| Error::Format("3DS color chunk without payload".into()))?;
    match ck.id {
        CID_RGB | CID_RGB_GAMMA => {
            let mut rgb = [0u8; 3];
            r.read_exact(&mut rgb)?;
            Ok(Vec3::new(
                rgb[0] as f32 / 255.0,
                rgb[1] as f32 / 255.0,
                rgb[2] as f32 / 255.0,
            ))
        }
        CID_RGBF | CID_RGBF_GAMMA => Ok(Vec3::new(read_f32(r)?, read_f32(r)?, read_f32(r)?)),
        _ => {
            skip_chunk(r, &ck)?;
            Err(Error::Format("unrecognized 3DS color sub-chunk".into()))
        }
    }
}

fn read_percent<R: Read + Seek>(r: &mut R, par: &Chunk) -> Result<f32> {
    let ck = read_chunk(r, Some(par))?
        .ok_or_else(|| Error::Format("3DS percentage chunk without payload".into()))?;
    match ck.id {
        CID_PERCENT_INT => Ok(read_u16(r)? as f32 / 100.0),
        CID_PERCENT_FLT => Ok(read_f32(r)? / 100.0),
        _ => {
            skip_chunk(r, &ck)?;
            Err(Error::Format("unrecognized 3DS percentage sub-chunk".into()))
        }
    }
}

fn read_map<R: Read + Seek>(r: &mut R, par: &Chunk) -> Result<TextureMap> {
    let mut map = TextureMap::default();
    while let Some(ck) = read_chunk(r, Some(par))? {
        match ck.id {
            CID_MAP_FILENAME => map.name = Some(read_str_chunk(r, &ck)?.to_lowercase()),
            CID_MAP_UOFFS => map.offset.x = read_f32(r)?,
            CID_MAP_VOFFS => map.offset.y = read_f32(r)?,
            CID_MAP_USCALE => map.scale.x = read_f32(r)?,
            CID_MAP_VSCALE => map.scale.y = read_f32(r)?,
            CID_MAP_UVROT => map.rot = read_f32(r)?,
            _ => {}
        }
        skip_chunk(r, &ck)?;
    }
    Ok(map)
}

pub(crate) fn load<R: Read + Seek>(scene: &mut SceneFile, r: &mut R) -> Result<()> {
    let root = read_chunk(r, None)?
        .ok_or_else(|| Error::Format("empty 3DS file".into()))?;
    if root.id != CID_MAIN {
        return Err(Error::Format("not a 3DS file".into()));
    }

    while let Some(ck) = read_chunk(r, Some(&root))? {
        match ck.id {
            // Descend into the editor chunk without skipping it.
            CID_3DEDITOR => {}
            CID_MATERIAL => {
                read_material(scene, r, &ck)?;
                skip_chunk(r, &ck)?;
            }
            CID_OBJECT => {
                read_object(scene, r, &ck)?;
                skip_chunk(r, &ck)?;
            }
            _ => skip_chunk(r, &ck)?,
        }
    }
    Ok(())
}

fn read_material<R: Read + Seek>(scene: &mut SceneFile, r: &mut R, par: &Chunk) -> Result<()> {
    let mut mtl = Material::new("");
    let mut shin = 0.0f32;
    let mut shinstr = 1.0f32;
    let mut selfillum = 0.0f32;

    while let Some(ck) = read_chunk(r, Some(par))? {
        match ck.id {
            CID_MTL_NAME => mtl.name = read_str_chunk(r, &ck)?,
            CID_MTL_AMBIENT => {
                // Recognized but the material model has no ambient slot.
                let _ = read_color(r, &ck)?;
            }
            CID_MTL_DIFFUSE => {
                let c = read_color(r, &ck)?;
                let attr = mtl.attr_mut(MtlAttr::Color);
                attr.value = Vec4::new(c.x, c.y, c.z, attr.value.w);
            }
            CID_MTL_SPECULAR => {
                let c = read_color(r, &ck)?;
                let attr = mtl.attr_mut(MtlAttr::Specular);
                attr.value = Vec4::new(c.x, c.y, c.z, attr.value.w);
            }
            CID_MTL_SHININESS => shin = read_percent(r, &ck)?,
            CID_MTL_SHINSTR => shinstr = read_percent(r, &ck)?,
            CID_MTL_SELFILLUM => selfillum = read_percent(r, &ck)?,
            CID_MTL_TEXMAP1 => mtl.attr_mut(MtlAttr::Color).map = read_map(r, &ck)?,
            CID_MTL_SPECMAP => mtl.attr_mut(MtlAttr::Specular).map = read_map(r, &ck)?,
            CID_MTL_SHINMAP => mtl.attr_mut(MtlAttr::Shininess).map = read_map(r, &ck)?,
            CID_MTL_ALPHAMAP => mtl.attr_mut(MtlAttr::Alpha).map = read_map(r, &ck)?,
            CID_MTL_BUMPMAP => mtl.attr_mut(MtlAttr::Bump).map = read_map(r, &ck)?,
            CID_MTL_REFLMAP => mtl.attr_mut(MtlAttr::Reflect).map = read_map(r, &ck)?,
            _ => {}
        }
        skip_chunk(r, &ck)?;
    }

    mtl.attr_mut(MtlAttr::Shininess).value.x = shin * shinstr * 128.0;
    let color = mtl.attr(MtlAttr::Color).value;
    mtl.attr_mut(MtlAttr::Emissive).value =
        Vec4::new(color.x * selfillum, color.y * selfillum, color.z * selfillum, 0.0);

    scene.add_material(mtl);
    Ok(())
}

fn read_object<R: Read + Seek>(scene: &mut SceneFile, r: &mut R, par: &Chunk) -> Result<()> {
    let name = read_str_nul(r, par)?;
    let mut mesh = Mesh::new(&name);
    let mut node = Node::new(&name);

    while let Some(ck) = read_chunk(r, Some(par))? {
        match ck.id {
            CID_TRIMESH => read_trimesh(scene, &mut mesh, &mut node, r, &ck)?,
            _ => {}
        }
        skip_chunk(r, &ck)?;
    }

    if mesh.num_verts() == 0 {
        // Cameras, lights and other non-geometry objects.
        debug!("3ds: skipping object \"{name}\" without geometry");
        return Ok(());
    }

    // The stored matrix is the node's local transform; bring the mesh
    // vertices back into node-local space.
    if node.matrix != Mat4::IDENTITY && node.matrix.determinant().abs() > f32::EPSILON {
        mesh.transform(&node.matrix.inverse());
    }

    let mid = scene.add_mesh(mesh);
    let nid = scene.add_node(node);
    scene.node_add_mesh(nid, mid);
    Ok(())
}

fn read_trimesh<R: Read + Seek>(
    scene: &SceneFile,
    mesh: &mut Mesh,
    node: &mut Node,
    r: &mut R,
    par: &Chunk,
) -> Result<()> {
    while let Some(ck) = read_chunk(r, Some(par))? {
        match ck.id {
            CID_VERTLIST => {
                let nverts = read_u16(r)? as u64;
                if (ck.len as u64) < CHDR_SIZE + 2 + nverts * 12 {
                    return Err(Error::Format("3DS vertex list truncated".into()));
                }
                for _ in 0..nverts {
                    let x = read_f32(r)?;
                    let y = read_f32(r)?;
                    let z = read_f32(r)?;
                    // Z-up to Y-up.
                    mesh.add_vertex(Vec3::new(x, z, -y));
                }
            }
            CID_UVLIST => {
                let nuv = read_u16(r)? as u64;
                if (ck.len as u64) < CHDR_SIZE + 2 + nuv * 8 {
                    return Err(Error::Format("3DS texture coordinate list truncated".into()));
                }
                for _ in 0..nuv {
                    let u = read_f32(r)?;
                    let v = read_f32(r)?;
                    mesh.add_texcoord(Vec2::new(u, v));
                }
            }
            CID_FACEDESC => {
                let nfaces = read_u16(r)? as u64;
                if (ck.len as u64) < CHDR_SIZE + 2 + nfaces * 8 {
                    return Err(Error::Format("3DS face list truncated".into()));
                }
                for _ in 0..nfaces {
                    let a = read_u16(r)?;
                    let b = read_u16(r)?;
                    let c = read_u16(r)?;
                    let _flags = read_u16(r)?;
                    mesh.add_triangle(a as u32, b as u32, c as u32);
                }
                // Optional FACEMTL sub-chunks follow the face records.
                while let Some(sub) = read_chunk(r, Some(&ck))? {
                    if sub.id == CID_FACEMTL {
                        let mtlname = read_str_nul(r, &sub)?;
                        let count = read_u16(r)? as u64;
                        let fpos = r.stream_position()?;
                        if fpos + count * 2 > sub.endpos {
                            warn!("3ds: malformed face material list, skipping");
                        } else {
                            // The per-face list is consumed; the whole mesh
                            // adopts the first named material.
                            for _ in 0..count {
                                read_u16(r)?;
                            }
                            if mesh.material.is_none() {
                                mesh.material = scene.find_material(&mtlname);
                            }
                        }
                    }
                    skip_chunk(r, &sub)?;
                }
            }
            CID_MESHMATRIX => {
                if (ck.len as u64) < CHDR_SIZE + 48 {
                    return Err(Error::Format("3DS mesh matrix truncated".into()));
                }
                // Twelve floats: a 4x3 column-major affine.
                let mut cols = [Vec4::new(0.0, 0.0, 0.0, 0.0); 4];
                for (i, col) in cols.iter_mut().enumerate() {
                    let x = read_f32(r)?;
                    let y = read_f32(r)?;
                    let z = read_f32(r)?;
                    *col = Vec4::new(x, y, z, if i < 3 { 0.0 } else { 1.0 });
                }
                node.matrix = Mat4::from_cols(cols[0], cols[1], cols[2], cols[3]);
            }
            _ => {}
        }
        skip_chunk(r, &ck)?;
    }

    // 3DS has no vertex normals; synthesize them here.
    mesh.calc_normals();
    Ok(())
}

// ----------------------------------------------------------------------
// Save
// ----------------------------------------------------------------------

fn push_chunk(buf: &mut Vec<u8>, id: u16, content: &[u8]) {
    buf.extend_from_slice(&id.to_le_bytes());
    buf.extend_from_slice(&((content.len() as u32 + CHDR_SIZE as u32).to_le_bytes()));
    buf.extend_from_slice(content);
}

fn cstr(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

fn rgbf_chunk(c: Vec4) -> Vec<u8> {
    let mut out = Vec::new();
    let mut body = Vec::new();
    for v in [c.x, c.y, c.z] {
        body.extend_from_slice(&v.to_le_bytes());
    }
    push_chunk(&mut out, CID_RGBF, &body);
    out
}

fn percent_chunk(v: f32) -> Vec<u8> {
    let mut out = Vec::new();
    push_chunk(&mut out, CID_PERCENT_FLT, &(v * 100.0).to_le_bytes());
    out
}

fn build_map(map: &TextureMap) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(name) = &map.name {
        push_chunk(&mut out, CID_MAP_FILENAME, &cstr(name));
    }
    if map.offset.x != 0.0 {
        push_chunk(&mut out, CID_MAP_UOFFS, &map.offset.x.to_le_bytes());
    }
    if map.offset.y != 0.0 {
        push_chunk(&mut out, CID_MAP_VOFFS, &map.offset.y.to_le_bytes());
    }
    if map.scale.x != 1.0 {
        push_chunk(&mut out, CID_MAP_USCALE, &map.scale.x.to_le_bytes());
    }
    if map.scale.y != 1.0 {
        push_chunk(&mut out, CID_MAP_VSCALE, &map.scale.y.to_le_bytes());
    }
    if map.rot != 0.0 {
        push_chunk(&mut out, CID_MAP_UVROT, &map.rot.to_le_bytes());
    }
    out
}

fn build_material(mtl: &Material) -> Vec<u8> {
    let mut out = Vec::new();
    push_chunk(&mut out, CID_MTL_NAME, &cstr(&mtl.name));
    push_chunk(&mut out, CID_MTL_DIFFUSE, &rgbf_chunk(mtl.attr(MtlAttr::Color).value));
    push_chunk(
        &mut out,
        CID_MTL_SPECULAR,
        &rgbf_chunk(mtl.attr(MtlAttr::Specular).value),
    );
    // Stored shininess is shin * shinstr * 128.
    let shin = (mtl.attr(MtlAttr::Shininess).value.x / 128.0).clamp(0.0, 1.0);
    push_chunk(&mut out, CID_MTL_SHININESS, &percent_chunk(shin));
    push_chunk(&mut out, CID_MTL_SHINSTR, &percent_chunk(1.0));

    for (slot, cid) in [
        (MtlAttr::Color, CID_MTL_TEXMAP1),
        (MtlAttr::Specular, CID_MTL_SPECMAP),
        (MtlAttr::Shininess, CID_MTL_SHINMAP),
        (MtlAttr::Alpha, CID_MTL_ALPHAMAP),
        (MtlAttr::Bump, CID_MTL_BUMPMAP),
        (MtlAttr::Reflect, CID_MTL_REFLMAP),
    ] {
        let map = &mtl.attr(slot).map;
        if map.name.is_some() {
            push_chunk(&mut out, cid, &build_map(map));
        }
    }
    out
}

fn build_object(scene: &SceneFile, mesh: &Mesh, matrix: &Mat4) -> Vec<u8> {
    let mut out = cstr(&mesh.name);
    let mut tm = Vec::new();

    // Vertices go out in world space, Y-up back to Z-up.
    let mut vl = (mesh.num_verts() as u16).to_le_bytes().to_vec();
    for &v in &mesh.vertices {
        let w = matrix.transform_point3(v);
        for f in [w.x, -w.z, w.y] {
            vl.extend_from_slice(&f.to_le_bytes());
        }
    }
    push_chunk(&mut tm, CID_VERTLIST, &vl);

    if !mesh.texcoords.is_empty() {
        let mut uv = (mesh.texcoords.len() as u16).to_le_bytes().to_vec();
        for t in &mesh.texcoords {
            uv.extend_from_slice(&t.x.to_le_bytes());
            uv.extend_from_slice(&t.y.to_le_bytes());
        }
        push_chunk(&mut tm, CID_UVLIST, &uv);
    }

    let mut fd = (mesh.num_faces() as u16).to_le_bytes().to_vec();
    for f in &mesh.faces {
        for &i in f {
            fd.extend_from_slice(&(i as u16).to_le_bytes());
        }
        fd.extend_from_slice(&0u16.to_le_bytes()); // edge flags
    }
    if let Some(mid) = mesh.material {
        let mut fm = cstr(&scene.material(mid).name);
        fm.extend_from_slice(&(mesh.num_faces() as u16).to_le_bytes());
        for i in 0..mesh.num_faces() as u16 {
            fm.extend_from_slice(&i.to_le_bytes());
        }
        push_chunk(&mut fd, CID_FACEMTL, &fm);
    }
    push_chunk(&mut tm, CID_FACEDESC, &fd);

    let mut mm = Vec::new();
    for row in [0, 2, 1, 3] {
        for col in 0..3 {
            mm.extend_from_slice(&matrix.col(col)[row].to_le_bytes());
        }
    }
    push_chunk(&mut tm, CID_MESHMATRIX, &mm);

    push_chunk(&mut out, CID_TRIMESH, &tm);
    out
}

pub(crate) fn save<W: Write>(scene: &SceneFile, w: &mut W) -> Result<()> {
    let mut editor = Vec::new();
    push_chunk(&mut editor, CID_MESHVER, &3u32.to_le_bytes());

    for mtl in scene.materials() {
        push_chunk(&mut editor, CID_MATERIAL, &build_material(mtl));
    }

    for (matrix, mid) in scene.instances() {
        let mesh = scene.mesh(mid);
        if mesh.num_verts() > MAX_LIST || mesh.num_faces() > MAX_LIST {
            warn!(
                "3ds: skipping mesh \"{}\": more than {} vertices or faces",
                mesh.name, MAX_LIST
            );
            continue;
        }
        push_chunk(&mut editor, CID_OBJECT, &build_object(scene, mesh, &matrix));
    }

    let mut main = Vec::new();
    push_chunk(&mut main, CID_VERSION, &3u32.to_le_bytes());
    push_chunk(&mut main, CID_3DEDITOR, &editor);

    write_u16(w, CID_MAIN)?;
    write_u32(w, main.len() as u32 + CHDR_SIZE as u32)?;
    w.write_all(&main)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_bad_magic() {
        let mut scene = SceneFile::new();
        let bytes = b"JTF!\x00\x00\x00\x00".to_vec();
        assert!(load(&mut scene, &mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_undersized_chunk() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CID_MAIN.to_le_bytes());
        bytes.extend_from_slice(&3u32.to_le_bytes()); // smaller than its own header
        let mut scene = SceneFile::new();
        assert!(load(&mut scene, &mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        // MAIN containing only an unknown chunk parses as an empty scene.
        let mut unknown = Vec::new();
        push_chunk(&mut unknown, 0x1234, &[0xaa; 10]);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&CID_MAIN.to_le_bytes());
        bytes.extend_from_slice(&((unknown.len() + 6) as u32).to_le_bytes());
        bytes.extend_from_slice(&unknown);

        let mut scene = SceneFile::new();
        load(&mut scene, &mut Cursor::new(bytes)).unwrap();
        assert_eq!(scene.num_meshes(), 0);
    }

    fn test_scene() -> SceneFile {
        let mut scene = SceneFile::new();
        let mut mtl = Material::new("red");
        mtl.set_value(MtlAttr::Color, Vec4::new(1.0, 0.0, 0.25, 1.0));
        mtl.set_scalar(MtlAttr::Shininess, 64.0);
        mtl.attr_mut(MtlAttr::Color).map.name = Some("red.png".into());
        let mid = scene.add_material(mtl);

        let mut mesh = Mesh::new("tri");
        mesh.add_vertex(Vec3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Vec3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Vec3::new(0.0, 1.0, 0.0));
        mesh.add_texcoord(Vec2::new(0.0, 0.0));
        mesh.add_texcoord(Vec2::new(1.0, 0.0));
        mesh.add_texcoord(Vec2::new(0.0, 1.0));
        mesh.add_triangle(0, 1, 2);
        mesh.material = Some(mid);
        let mesh_id = scene.add_mesh(mesh);

        let nid = scene.add_node(Node::new("tri"));
        scene.node_add_mesh(nid, mesh_id);
        scene.update_xform();
        scene
    }

    #[test]
    fn roundtrip_geometry_and_material() {
        let scene = test_scene();
        let mut bytes = Vec::new();
        save(&scene, &mut bytes).unwrap();

        let mut reloaded = SceneFile::new();
        load(&mut reloaded, &mut Cursor::new(bytes)).unwrap();
        reloaded.update_xform();

        assert_eq!(reloaded.num_materials(), 1);
        assert_eq!(reloaded.num_meshes(), 1);
        assert_eq!(reloaded.num_nodes(), 1);

        let mtl = &reloaded.materials()[0];
        assert_eq!(mtl.name, "red");
        let c = mtl.attr(MtlAttr::Color).value;
        assert!((c.x - 1.0).abs() < 1e-6 && (c.z - 0.25).abs() < 1e-6);
        assert!((mtl.attr(MtlAttr::Shininess).value.x - 64.0).abs() < 1e-3);
        assert_eq!(mtl.attr(MtlAttr::Color).map.name.as_deref(), Some("red.png"));

        let mesh = &reloaded.meshes()[0];
        assert_eq!(mesh.name, "tri");
        assert_eq!(mesh.num_verts(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        // The stored mesh matrix folds the axis convention in, so compare
        // world-space positions: node matrix times local vertex.
        let node = &reloaded.nodes()[0];
        let world = |i: usize| node.global_matrix.transform_point3(mesh.vertices[i]);
        assert!(world(1).abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
        assert!(world(2).abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-6));
        assert_eq!(mesh.texcoords[1], Vec2::new(1.0, 0.0));
        // The face material list linked the mesh back to its material.
        assert_eq!(mesh.material, Some(scenefile_core::MaterialId(0)));
        // Normals were synthesized by the reader.
        assert_eq!(mesh.normals.len(), 3);
    }

    #[test]
    fn oversized_meshes_are_skipped_on_save() {
        let mut scene = SceneFile::new();
        let mut mesh = Mesh::new("big");
        mesh.add_vertex(Vec3::ZERO);
        mesh.add_vertex(Vec3::X);
        mesh.add_vertex(Vec3::Y);
        for _ in 0..70000 {
            mesh.add_triangle(0, 1, 2);
        }
        scene.add_mesh(mesh);

        let mut bytes = Vec::new();
        save(&scene, &mut bytes).unwrap();

        let mut reloaded = SceneFile::new();
        load(&mut reloaded, &mut Cursor::new(bytes)).unwrap();
        assert_eq!(reloaded.num_meshes(), 0);
    }
}
