//! Wavefront OBJ, with its sidecar MTL material library.
//!
//! Loading recovers shared indexed geometry from OBJ's face-vertex
//! tuples: every distinct `(position, texcoord, normal)` triple becomes
//! one vertex of the current mesh, tracked in an ordered map that lives
//! for the whole file. Saving emits one `o` block per mesh and, when a
//! target path is known, a `.mtl` sidecar next to it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use glam::{Vec2, Vec3, Vec4};
use log::{debug, warn};
use scenefile_core::{Material, Mesh, MtlAttr, MtlAttrib, SceneFile, TexFilter, TexWrap};

use crate::error::{Error, Result};

/// A face-vertex tuple; -1 marks an absent texcoord/normal reference.
type FaceVert = (i32, i32, i32);

pub(crate) fn load<R: Read + Seek>(scene: &mut SceneFile, r: &mut R) -> Result<()> {
    let reader = BufReader::new(r);
    let file_name = scene.name().to_string();

    let mut varr: Vec<Vec3> = Vec::new();
    let mut narr: Vec<Vec3> = Vec::new();
    let mut tarr: Vec<Vec2> = Vec::new();
    // Face-vertex dedup map, deliberately scoped to the whole file.
    let mut dedup: BTreeMap<FaceVert, u32> = BTreeMap::new();

    let mut mesh = Mesh::new("");
    let mut mesh_name = file_name.clone();
    let mut line_num = 0usize;

    for line in reader.lines() {
        let line = line?;
        line_num += 1;
        let line = clean_line(&line);
        if line.is_empty() {
            continue;
        }

        let (cmd, args) = split_directive(line);
        match cmd {
            "v" => {
                let v = parse_floats::<3>(args).ok_or_else(|| {
                    Error::Format(format!(
                        "{file_name}:{line_num}: invalid vertex definition: \"{line}\""
                    ))
                })?;
                varr.push(Vec3::from_array(v));
            }
            "vt" => {
                let t = parse_floats::<2>(args).ok_or_else(|| {
                    Error::Format(format!(
                        "{file_name}:{line_num}: invalid texcoord definition: \"{line}\""
                    ))
                })?;
                // OBJ texture space has its origin at the bottom.
                tarr.push(Vec2::new(t[0], 1.0 - t[1]));
            }
            "vn" => {
                let n = parse_floats::<3>(args).ok_or_else(|| {
                    Error::Format(format!(
                        "{file_name}:{line_num}: invalid normal definition: \"{line}\""
                    ))
                })?;
                narr.push(Vec3::from_array(n));
            }
            "f" => {
                if varr.is_empty() {
                    return Err(Error::Format(format!(
                        "{file_name}:{line_num}: encountered face before any vertices"
                    )));
                }
                let mut vidx = [0u32; 4];
                let mut count = 0usize;
                for tok in args.split_whitespace().take(4) {
                    let fv = parse_face_vert(tok, varr.len(), tarr.len(), narr.len())
                        .ok_or_else(|| {
                            Error::Format(format!(
                                "{file_name}:{line_num}: invalid face definition: \"{line}\""
                            ))
                        })?;
                    vidx[count] = *dedup.entry(fv).or_insert_with(|| {
                        let newidx = mesh.num_verts() as u32;
                        mesh.add_vertex(varr[fv.0 as usize]);
                        if fv.1 >= 0 {
                            mesh.add_texcoord(tarr[fv.1 as usize]);
                        }
                        if fv.2 >= 0 {
                            mesh.add_normal(narr[fv.2 as usize]);
                        }
                        newidx
                    });
                    count += 1;
                }
                match count {
                    3 => mesh.add_triangle(vidx[0], vidx[1], vidx[2]),
                    4 => mesh.add_quad(vidx[0], vidx[1], vidx[2], vidx[3]),
                    _ => {
                        return Err(Error::Format(format!(
                            "{file_name}:{line_num}: invalid face definition: \"{line}\""
                        )))
                    }
                }
            }
            "o" | "g" => {
                mesh.name = mesh_name;
                mesh_done(scene, &mut mesh);
                mesh_name = args.to_string();
            }
            "mtllib" => {
                let path = scene.find_asset(args);
                match File::open(&path) {
                    Ok(f) => load_mtl(scene, BufReader::new(f))?,
                    Err(e) => warn!(
                        "failed to open material library {}, ignoring: {}",
                        path.display(),
                        e
                    ),
                }
            }
            "usemtl" => {
                if let Some(id) = scene.find_material(args) {
                    mesh.material = Some(id);
                }
            }
            _ => {} // unknown directives are silently ignored
        }
    }

    mesh.name = mesh_name;
    mesh_done(scene, &mut mesh);
    Ok(())
}

/// Finalize the current mesh: keep it only when it has faces and its
/// attribute arrays agree; otherwise drop it and keep parsing.
fn mesh_done(scene: &mut SceneFile, mesh: &mut Mesh) {
    let done = std::mem::replace(mesh, Mesh::new(""));
    if done.faces.is_empty() {
        return;
    }
    if !done.attributes_consistent() {
        warn!("ignoring mesh \"{}\" with inconsistent attributes", done.name);
        return;
    }
    scene.add_mesh(done);
}

/// Strip leading/trailing whitespace and `#` comments.
fn clean_line(s: &str) -> &str {
    let s = match s.find('#') {
        Some(pos) => &s[..pos],
        None => s,
    };
    s.trim()
}

fn split_directive(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim()),
        None => (line, ""),
    }
}

fn parse_floats<const N: usize>(args: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut it = args.split_whitespace();
    for slot in &mut out {
        *slot = it.next()?.parse().ok()?;
    }
    Some(out)
}

/// Resolve a 1-based (or negative, relative) OBJ index against an array of
/// `arrsz` entries.
fn parse_idx(s: &str, arrsz: usize) -> Option<i32> {
    let val: i64 = s.parse().ok()?;
    let idx = if val < 0 {
        arrsz as i64 + val
    } else {
        val - 1
    };
    (0..arrsz as i64).contains(&idx).then_some(idx as i32)
}

/// Face-vertex forms: `v`, `v/t`, `v//n`, `v/t/n`.
fn parse_face_vert(tok: &str, nv: usize, nt: usize, nn: usize) -> Option<FaceVert> {
    let mut it = tok.split('/');
    let v = parse_idx(it.next()?, nv)?;
    let t = match it.next() {
        None | Some("") => -1,
        Some(s) => parse_idx(s, nt)?,
    };
    let n = match it.next() {
        None => -1,
        Some("") => return None,
        Some(s) => parse_idx(s, nn)?,
    };
    if it.next().is_some() {
        return None;
    }
    Some((v, t, n))
}

// ----------------------------------------------------------------------
// MTL
// ----------------------------------------------------------------------

fn load_mtl<R: BufRead>(scene: &mut SceneFile, reader: R) -> Result<()> {
    let mut mtl: Option<Material> = None;

    for line in reader.lines() {
        let line = line?;
        let line = clean_line(&line);
        if line.is_empty() {
            continue;
        }
        let (cmd, args) = split_directive(line);

        if cmd == "newmtl" {
            if let Some(done) = mtl.take() {
                finish_mtl(scene, done);
            }
            mtl = Some(Material::new(args));
            continue;
        }
        let Some(mtl) = mtl.as_mut() else { continue };

        match cmd {
            "Kd" => parse_value(mtl.attr_mut(MtlAttr::Color), args),
            "Ks" => parse_value(mtl.attr_mut(MtlAttr::Specular), args),
            "Ke" => parse_value(mtl.attr_mut(MtlAttr::Emissive), args),
            "Ns" => parse_value(mtl.attr_mut(MtlAttr::Shininess), args),
            "Ni" => parse_value(mtl.attr_mut(MtlAttr::Ior), args),
            "Pr" => parse_value(mtl.attr_mut(MtlAttr::Roughness), args),
            "Pm" => parse_value(mtl.attr_mut(MtlAttr::Metallic), args),
            "d" => {
                if parse_value(mtl.attr_mut(MtlAttr::Alpha), args) {
                    let alpha = mtl.attr(MtlAttr::Alpha).value.x;
                    mtl.attr_mut(MtlAttr::Transmit).value.x = 1.0 - alpha;
                }
                true
            }
            "map_Kd" => parse_map(mtl.attr_mut(MtlAttr::Color), args),
            "map_Ks" => parse_map(mtl.attr_mut(MtlAttr::Specular), args),
            "map_d" => parse_map(mtl.attr_mut(MtlAttr::Alpha), args),
            "map_Ke" => parse_map(mtl.attr_mut(MtlAttr::Emissive), args),
            "map_Ns" => parse_map(mtl.attr_mut(MtlAttr::Shininess), args),
            "map_Pr" => parse_map(mtl.attr_mut(MtlAttr::Roughness), args),
            "map_Pm" => parse_map(mtl.attr_mut(MtlAttr::Metallic), args),
            "bump" | "map_bump" => parse_map(mtl.attr_mut(MtlAttr::Bump), args),
            "refl" => parse_map(mtl.attr_mut(MtlAttr::Reflect), args),
            _ => {
                debug!("ignoring unknown mtl directive: {cmd}");
                true
            }
        };
    }

    if let Some(done) = mtl.take() {
        finish_mtl(scene, done);
    }
    Ok(())
}

fn finish_mtl(scene: &mut SceneFile, mut mtl: Material) {
    // An exponent below 1 clears the specular color.
    if mtl.attr(MtlAttr::Shininess).value.x < 1.0 {
        let spec = mtl.attr_mut(MtlAttr::Specular);
        spec.value = Vec4::new(0.0, 0.0, 0.0, spec.value.w);
    }
    scene.add_material(mtl);
}

/// Parse a 3-float (or 1-float, replicated) attribute value.
fn parse_value(attr: &mut MtlAttrib, args: &str) -> bool {
    let vals: Vec<f32> = args
        .split_whitespace()
        .map_while(|t| t.parse().ok())
        .take(3)
        .collect();
    match vals.len() {
        3 => {
            attr.value.x = vals[0];
            attr.value.y = vals[1];
            attr.value.z = vals[2];
            true
        }
        1 => {
            attr.value.x = vals[0];
            attr.value.y = vals[0];
            attr.value.z = vals[0];
            true
        }
        _ => {
            warn!("ignoring invalid or unsupported mtl value: \"{args}\"");
            false
        }
    }
}

fn cube_face_index(name: &str) -> Option<usize> {
    match name {
        "cube_top" => Some(0),
        "cube_bottom" => Some(1),
        "cube_front" => Some(2),
        "cube_back" => Some(3),
        "cube_left" => Some(4),
        "cube_right" => Some(5),
        _ => None,
    }
}

/// Parse a texture map directive: standard options followed by the
/// filename. Options mutate the attribute's map in place so that repeated
/// `refl -type cube_*` directives accumulate cubemap faces.
fn parse_map(attr: &mut MtlAttrib, args: &str) -> bool {
    let toks: Vec<&str> = args.split_whitespace().collect();
    let mut cube_face: Option<usize> = None;
    let mut filename: Option<&str> = None;
    let mut bump_scale: Option<f32> = None;

    let mut i = 0;
    while i < toks.len() {
        match toks[i] {
            "-blendu" | "-blendv" => {
                let horiz = toks[i] == "-blendu";
                i += 1;
                let filt = if toks.get(i).copied() == Some("off") {
                    TexFilter::Nearest
                } else {
                    TexFilter::Linear
                };
                if horiz {
                    attr.map.ufilt = filt;
                } else {
                    attr.map.vfilt = filt;
                }
            }
            "-clamp" => {
                i += 1;
                let wrap = if toks.get(i).copied() == Some("on") {
                    TexWrap::Clamp
                } else {
                    TexWrap::Repeat
                };
                attr.map.uwrap = wrap;
                attr.map.vwrap = wrap;
            }
            "-o" | "-s" => {
                let is_offset = toks[i] == "-o";
                let mut vals = [if is_offset { 0.0 } else { 1.0 }; 3];
                let mut got = 0;
                while got < 3 {
                    match toks.get(i + 1).and_then(|t| t.parse::<f32>().ok()) {
                        Some(v) => {
                            vals[got] = v;
                            got += 1;
                            i += 1;
                        }
                        None => break,
                    }
                }
                if got == 0 {
                    debug!("mtl map option {} without values", toks[i]);
                } else if is_offset {
                    attr.map.offset = Vec3::from_array(vals);
                } else {
                    attr.map.scale = Vec3::from_array(vals);
                }
            }
            "-bm" => {
                i += 1;
                bump_scale = toks.get(i).and_then(|t| t.parse().ok());
            }
            "-type" => {
                i += 1;
                cube_face = toks.get(i).copied().and_then(cube_face_index);
            }
            t if t.starts_with('-') => {
                debug!("ignoring unknown mtl map option: {t}");
            }
            t => filename = Some(t),
        }
        i += 1;
    }

    if let Some(scale) = bump_scale {
        attr.value.x = scale;
    }
    let Some(name) = filename else { return false };
    match cube_face {
        Some(face) => attr.map.cube[face] = Some(name.to_string()),
        None => attr.map.name = Some(name.to_string()),
    }
    true
}

// ----------------------------------------------------------------------
// Save
// ----------------------------------------------------------------------

pub(crate) fn save<W: Write>(scene: &SceneFile, w: &mut W, path: Option<&Path>) -> Result<()> {
    writeln!(w, "# exported with scenefile")?;

    if scene.num_materials() > 0 {
        match path {
            Some(path) => {
                let mtl_path = path.with_extension("mtl");
                match File::create(&mtl_path) {
                    Ok(f) => {
                        let mut mw = BufWriter::new(f);
                        write_mtl(scene, &mut mw)?;
                        mw.flush()?;
                        if let Some(base) = mtl_path.file_name().and_then(|n| n.to_str()) {
                            writeln!(w, "mtllib {base}")?;
                        }
                    }
                    Err(e) => warn!(
                        "failed to create material library {}: {}",
                        mtl_path.display(),
                        e
                    ),
                }
            }
            None => warn!("no output path available, not writing a material library"),
        }
    }

    let mut voffs = 1u32;
    let mut toffs = 1u32;
    let mut noffs = 1u32;
    for mesh in scene.meshes() {
        writeln!(w, "o {}", mesh.name)?;
        if mesh.material.is_some() {
            writeln!(w, "usemtl {}", scene.mesh_material(mesh).name)?;
        }
        for v in &mesh.vertices {
            writeln!(w, "v {} {} {}", v.x, v.y, v.z)?;
        }
        for n in &mesh.normals {
            writeln!(w, "vn {} {} {}", n.x, n.y, n.z)?;
        }
        for t in &mesh.texcoords {
            writeln!(w, "vt {} {}", t.x, 1.0 - t.y)?;
        }

        let has_t = !mesh.texcoords.is_empty();
        let has_n = !mesh.normals.is_empty();
        for face in &mesh.faces {
            write!(w, "f")?;
            for &i in face {
                match (has_t, has_n) {
                    (true, true) => write!(w, " {}/{}/{}", i + voffs, i + toffs, i + noffs)?,
                    (true, false) => write!(w, " {}/{}", i + voffs, i + toffs)?,
                    (false, true) => write!(w, " {}//{}", i + voffs, i + noffs)?,
                    (false, false) => write!(w, " {}", i + voffs)?,
                }
            }
            writeln!(w)?;
        }

        let nv = mesh.num_verts() as u32;
        voffs += nv;
        if has_t {
            toffs += nv;
        }
        if has_n {
            noffs += nv;
        }
    }
    Ok(())
}

fn map_directive(slot: MtlAttr) -> Option<&'static str> {
    match slot {
        MtlAttr::Color => Some("map_Kd"),
        MtlAttr::Specular => Some("map_Ks"),
        MtlAttr::Alpha => Some("map_d"),
        MtlAttr::Emissive => Some("map_Ke"),
        MtlAttr::Shininess => Some("map_Ns"),
        MtlAttr::Roughness => Some("map_Pr"),
        MtlAttr::Metallic => Some("map_Pm"),
        MtlAttr::Bump => Some("bump"),
        MtlAttr::Reflect => Some("refl"),
        _ => None,
    }
}

const CUBE_FACE_NAMES: [&str; 6] = [
    "cube_top",
    "cube_bottom",
    "cube_front",
    "cube_back",
    "cube_left",
    "cube_right",
];

fn write_map<W: Write>(w: &mut W, directive: &str, attr: &MtlAttrib, name: &str, cube: Option<usize>) -> Result<()> {
    write!(w, "{directive}")?;
    if attr.map.ufilt == TexFilter::Nearest {
        write!(w, " -blendu off")?;
    }
    if attr.map.vfilt == TexFilter::Nearest {
        write!(w, " -blendv off")?;
    }
    if attr.map.uwrap == TexWrap::Clamp {
        write!(w, " -clamp on")?;
    }
    let o = attr.map.offset;
    if o != Vec3::ZERO {
        write!(w, " -o {} {} {}", o.x, o.y, o.z)?;
    }
    let s = attr.map.scale;
    if s != Vec3::ONE {
        write!(w, " -s {} {} {}", s.x, s.y, s.z)?;
    }
    if directive == "bump" && attr.value.x != 0.0 {
        write!(w, " -bm {}", attr.value.x)?;
    }
    if let Some(face) = cube {
        write!(w, " -type {}", CUBE_FACE_NAMES[face])?;
    }
    writeln!(w, " {name}")?;
    Ok(())
}

fn write_mtl<W: Write>(scene: &SceneFile, w: &mut W) -> Result<()> {
    writeln!(w, "# exported with scenefile")?;
    for mtl in scene.materials() {
        writeln!(w, "\nnewmtl {}", mtl.name)?;

        let kd = mtl.attr(MtlAttr::Color).value;
        writeln!(w, "Kd {} {} {}", kd.x, kd.y, kd.z)?;
        let ks = mtl.attr(MtlAttr::Specular).value;
        writeln!(w, "Ks {} {} {}", ks.x, ks.y, ks.z)?;
        writeln!(w, "Ns {}", mtl.attr(MtlAttr::Shininess).value.x)?;

        let ke = mtl.attr(MtlAttr::Emissive).value;
        if ke.x > 0.0 || ke.y > 0.0 || ke.z > 0.0 {
            writeln!(w, "Ke {} {} {}", ke.x, ke.y, ke.z)?;
        }
        let tf = mtl.attr(MtlAttr::Transmit).value.x;
        if tf > 0.0 {
            writeln!(w, "Tf {tf} {tf} {tf}")?;
        }
        writeln!(w, "Ni {}", mtl.attr(MtlAttr::Ior).value.x)?;
        writeln!(w, "d {}", mtl.attr(MtlAttr::Alpha).value.x)?;
        let pr = mtl.attr(MtlAttr::Roughness).value.x;
        if pr > 0.0 {
            writeln!(w, "Pr {pr}")?;
        }
        let pm = mtl.attr(MtlAttr::Metallic).value.x;
        if pm > 0.0 {
            writeln!(w, "Pm {pm}")?;
        }

        for slot in MtlAttr::ALL {
            let Some(directive) = map_directive(slot) else { continue };
            let attr = mtl.attr(slot);
            if let Some(name) = &attr.map.name {
                write_map(w, directive, attr, name, None)?;
            }
            for (face, name) in attr.map.cube.iter().enumerate() {
                if let Some(name) = name {
                    write_map(w, directive, attr, name, Some(face))?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load_str(text: &str) -> SceneFile {
        let mut scene = SceneFile::new();
        scene.set_name("test.obj");
        load(&mut scene, &mut Cursor::new(text.as_bytes().to_vec())).unwrap();
        scene.update_xform();
        scene.calc_bounds();
        scene
    }

    #[test]
    fn clean_line_strips_comments_and_space() {
        assert_eq!(clean_line("  v 1 2 3  # hello"), "v 1 2 3");
        assert_eq!(clean_line("# only comment"), "");
        assert_eq!(clean_line("   "), "");
    }

    #[test]
    fn face_vert_forms() {
        assert_eq!(parse_face_vert("3", 5, 0, 0), Some((2, -1, -1)));
        assert_eq!(parse_face_vert("3/2", 5, 5, 0), Some((2, 1, -1)));
        assert_eq!(parse_face_vert("3//4", 5, 0, 5), Some((2, -1, 3)));
        assert_eq!(parse_face_vert("3/2/4", 5, 5, 5), Some((2, 1, 3)));
        // Negative indices are relative to the current array size.
        assert_eq!(parse_face_vert("-1", 5, 0, 0), Some((4, -1, -1)));
        // Out of range or malformed.
        assert_eq!(parse_face_vert("9", 5, 0, 0), None);
        assert_eq!(parse_face_vert("0", 5, 0, 0), None);
        assert_eq!(parse_face_vert("x", 5, 0, 0), None);
    }

    #[test]
    fn loads_single_triangle() {
        let scene = load_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n");
        assert_eq!(scene.num_meshes(), 1);
        let mesh = &scene.meshes()[0];
        assert_eq!(mesh.name, "test.obj");
        assert_eq!(mesh.num_verts(), 3);
        assert!(mesh.normals.is_empty());
        assert!(mesh.texcoords.is_empty());
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        let bb = scene.bounds().unwrap();
        assert_eq!(bb.min, Vec3::ZERO);
        assert_eq!(bb.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn quad_becomes_two_triangles() {
        let scene = load_str("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        let mesh = &scene.meshes()[0];
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn face_vertex_dedup_reuses_indices() {
        let scene = load_str(concat!(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n",
            "vt 0 0\n",
            "vn 0 0 1\n",
            "f 1/1/1 2/1/1 3/1/1 1/1/1\n"
        ));
        let mesh = &scene.meshes()[0];
        // The fourth tuple repeats the first; only three unique vertices.
        assert_eq!(mesh.num_verts(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 0]]);
    }

    #[test]
    fn texcoords_are_flipped_vertically() {
        let scene = load_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nvt 0 0.25\nf 1/1 2/1 3/1\n");
        let mesh = &scene.meshes()[0];
        assert_eq!(mesh.texcoords[0], Vec2::new(0.0, 0.75));
    }

    #[test]
    fn objects_split_meshes() {
        let scene = load_str(concat!(
            "o first\n",
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
            "o second\n",
            "v 0 0 1\nv 1 0 1\nv 0 1 1\nf 4 5 6\n"
        ));
        assert_eq!(scene.num_meshes(), 2);
        assert_eq!(scene.meshes()[0].name, "first");
        assert_eq!(scene.meshes()[1].name, "second");
        assert_eq!(scene.meshes()[1].faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn face_before_vertices_is_fatal() {
        let mut scene = SceneFile::new();
        let res = load(&mut scene, &mut Cursor::new(b"f 1 2 3\n".to_vec()));
        assert!(res.is_err());
    }

    #[test]
    fn negative_indices_resolve() {
        let scene = load_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n");
        assert_eq!(scene.meshes()[0].faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn mtl_values_and_derivations() {
        let mut scene = SceneFile::new();
        let text = concat!(
            "newmtl shiny\n",
            "Kd 0.1 0.2 0.3\n",
            "Ks 1 1 1\n",
            "Ns 32\n",
            "d 0.25\n",
            "Ni 1.45\n",
            "newmtl dull\n",
            "Ks 1 1 1\n",
            "Ns 0.5\n"
        );
        load_mtl(&mut scene, Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(scene.num_materials(), 2);

        let shiny = scene.material(scene.find_material("shiny").unwrap());
        assert_eq!(shiny.attr(MtlAttr::Color).value.x, 0.1);
        assert_eq!(shiny.attr(MtlAttr::Shininess).value.x, 32.0);
        assert_eq!(shiny.attr(MtlAttr::Alpha).value.x, 0.25);
        assert_eq!(shiny.attr(MtlAttr::Transmit).value.x, 0.75);
        assert_eq!(shiny.attr(MtlAttr::Ior).value.x, 1.45);

        // Sub-unity shininess zeroes the specular color.
        let dull = scene.material(scene.find_material("dull").unwrap());
        assert_eq!(dull.attr(MtlAttr::Specular).value.x, 0.0);
    }

    #[test]
    fn mtl_map_options() {
        let mut scene = SceneFile::new();
        let text = concat!(
            "newmtl m\n",
            "map_Kd -blendu off -clamp on -o 0.5 0.5 -s 2 2 base.png\n",
            "bump -bm 0.8 bumps.png\n",
            "refl -type cube_top top.png\n",
            "refl -type cube_left left.png\n"
        );
        load_mtl(&mut scene, Cursor::new(text.as_bytes())).unwrap();
        let m = scene.material(scene.find_material("m").unwrap());

        let color = m.attr(MtlAttr::Color);
        assert_eq!(color.map.name.as_deref(), Some("base.png"));
        assert_eq!(color.map.ufilt, TexFilter::Nearest);
        assert_eq!(color.map.vfilt, TexFilter::Linear);
        assert_eq!(color.map.uwrap, TexWrap::Clamp);
        assert_eq!(color.map.offset, Vec3::new(0.5, 0.5, 0.0));
        assert_eq!(color.map.scale, Vec3::new(2.0, 2.0, 1.0));

        let bump = m.attr(MtlAttr::Bump);
        assert_eq!(bump.map.name.as_deref(), Some("bumps.png"));
        assert_eq!(bump.value.x, 0.8);

        let refl = m.attr(MtlAttr::Reflect);
        assert_eq!(refl.map.cube[0].as_deref(), Some("top.png"));
        assert_eq!(refl.map.cube[4].as_deref(), Some("left.png"));
        assert!(refl.map.name.is_none());
    }

    #[test]
    fn inconsistent_attribute_mesh_is_dropped() {
        // First face-vertex carries a normal, second does not.
        let scene = load_str(concat!(
            "v 0 0 0\nv 1 0 0\nv 0 1 0\n",
            "vn 0 0 1\n",
            "f 1//1 2 3\n"
        ));
        assert_eq!(scene.num_meshes(), 0);
    }

    #[test]
    fn save_offsets_indices_across_meshes() {
        let mut scene = SceneFile::new();
        for name in ["a", "b"] {
            let mut m = Mesh::new(name);
            m.add_vertex(Vec3::ZERO);
            m.add_vertex(Vec3::X);
            m.add_vertex(Vec3::Y);
            m.add_triangle(0, 1, 2);
            scene.add_mesh(m);
        }
        let mut out = Vec::new();
        save(&scene, &mut out, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("o a\n"));
        assert!(text.contains("f 1 2 3\n"));
        assert!(text.contains("f 4 5 6\n"));
    }

    #[test]
    fn roundtrip_triangles_only() {
        let scene = load_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nv 0 0 2\nf 1 2 3\nf 1 3 4\n");
        let mut out = Vec::new();
        save(&scene, &mut out, None).unwrap();

        let mut reloaded = SceneFile::new();
        load(&mut reloaded, &mut Cursor::new(out)).unwrap();
        let a = &scene.meshes()[0];
        let b = &reloaded.meshes()[0];
        assert_eq!(a.num_verts(), b.num_verts());
        assert_eq!(a.faces, b.faces);
        assert_eq!(a.vertices, b.vertices);
    }
}
