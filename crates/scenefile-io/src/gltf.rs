//! glTF 2.0, both plain JSON `.gltf` and the `.glb` binary container.
//!
//! The document skeleton is deserialized into typed structs; extension
//! objects (`KHR_materials_*`, `KHR_texture_transform`) stay dynamic and
//! are walked with the dotted-path helper. Geometry decoding follows the
//! buffer → bufferView → accessor indirection with index validation at
//! every hop.
//!
//! Saving emits an embedded `.gltf`: one JSON document whose single
//! buffer carries all accessor data as a base64 data URI.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use scenefile_core::{
    MaterialId, Material, Mesh, MeshId, MtlAttr, Node, SceneFile, TexFilter, TexWrap, TextureMap,
};

use crate::b64;
use crate::error::{Error, Result};
use crate::json_path;
use crate::leio::read_u32;

// Component type codes.
const COMP_UBYTE: u32 = 5121;
const COMP_USHORT: u32 = 5123;
const COMP_UINT: u32 = 5125;
const COMP_FLOAT: u32 = 5126;

const MODE_TRIANGLES: u32 = 4;

// Sampler codes mapping to NEAREST; everything else is linear.
const FILT_NEAREST: u32 = 9728;
const FILT_NEAREST_MIPMAP_NEAREST: u32 = 9984;
const FILT_NEAREST_MIPMAP_LINEAR: u32 = 9986;
const WRAP_CLAMP_TO_EDGE: u32 = 33071;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const GLB_CHUNK_JSON: u32 = 0x4E4F534A; // "JSON"
const GLB_CHUNK_BIN: u32 = 0x004E4942; // "BIN\0"

// ============================================================================
// Document schema (reading)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GltfDoc {
    asset: Option<GAsset>,
    #[serde(default)]
    images: Vec<GImage>,
    #[serde(default)]
    samplers: Vec<GSampler>,
    #[serde(default)]
    textures: Vec<GTexture>,
    #[serde(default)]
    materials: Vec<GMaterial>,
    #[serde(default)]
    buffers: Vec<GBuffer>,
    #[serde(default)]
    buffer_views: Vec<GBufferView>,
    #[serde(default)]
    accessors: Vec<GAccessor>,
    #[serde(default)]
    meshes: Vec<GMesh>,
    #[serde(default)]
    nodes: Vec<GNode>,
}

#[derive(Debug, Deserialize)]
struct GAsset {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GImage {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GSampler {
    mag_filter: Option<u32>,
    min_filter: Option<u32>,
    wrap_s: Option<u32>,
    wrap_t: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GTexture {
    source: Option<usize>,
    sampler: Option<usize>,
}

/// A `textureInfo` object: `{ "index": n, "extensions": {...} }`.
#[derive(Debug, Clone, Deserialize)]
struct GTextureRef {
    index: usize,
    extensions: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GPbr {
    base_color_factor: Option<[f32; 4]>,
    base_color_texture: Option<GTextureRef>,
    metallic_factor: Option<f32>,
    roughness_factor: Option<f32>,
    metallic_roughness_texture: Option<GTextureRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GMaterial {
    name: Option<String>,
    pbr_metallic_roughness: Option<GPbr>,
    emissive_factor: Option<[f32; 3]>,
    emissive_texture: Option<GTextureRef>,
    normal_texture: Option<GTextureRef>,
    extensions: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GBuffer {
    byte_length: usize,
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GBufferView {
    buffer: usize,
    byte_length: usize,
    #[serde(default)]
    byte_offset: usize,
    #[serde(default)]
    byte_stride: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GAccessor {
    buffer_view: Option<usize>,
    #[serde(default)]
    byte_offset: usize,
    component_type: u32,
    count: usize,
    #[serde(rename = "type")]
    accessor_type: String,
}

#[derive(Debug, Deserialize)]
struct GPrimitive {
    #[serde(default)]
    attributes: HashMap<String, usize>,
    indices: Option<usize>,
    mode: Option<u32>,
    material: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GMesh {
    name: Option<String>,
    primitives: Vec<GPrimitive>,
}

#[derive(Debug, Deserialize)]
struct GNode {
    name: Option<String>,
    mesh: Option<usize>,
    #[serde(default)]
    children: Vec<usize>,
    matrix: Option<[f32; 16]>,
    translation: Option<[f32; 3]>,
    rotation: Option<[f32; 4]>,
    scale: Option<[f32; 3]>,
}

// ============================================================================
// Loading
// ============================================================================

struct LoadedBuffers {
    /// Per-buffer bytes; `None` entries are backed by the GLB binary blob.
    data: Vec<Option<Vec<u8>>>,
    glb: Option<Vec<u8>>,
}

impl LoadedBuffers {
    fn get(&self, idx: usize) -> Option<&[u8]> {
        match self.data.get(idx)? {
            Some(owned) => Some(owned),
            None => self.glb.as_deref(),
        }
    }
}

pub(crate) fn load<R: Read + Seek>(scene: &mut SceneFile, r: &mut R) -> Result<()> {
    let start = r.stream_position()?;
    let mut head = [0u8; 4];
    r.read_exact(&mut head)?;

    let (json, glb_bin) = if &head == GLB_MAGIC {
        read_glb(r)?
    } else {
        // Plain JSON document: sniff, then slurp it whole.
        r.seek(SeekFrom::Start(start))?;
        let mut text = Vec::new();
        r.read_to_end(&mut text)?;
        match text.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => {}
            _ => return Err(Error::Format("not a glTF document".into())),
        }
        (text, None)
    };

    let doc: GltfDoc = serde_json::from_slice(&json)?;
    if doc.asset.as_ref().and_then(|a| a.version.as_ref()).is_none() {
        return Err(Error::Format("glTF document without asset version".into()));
    }

    let buffers = load_buffers(scene, &doc, glb_bin)?;

    let mtl_base = scene.num_materials();
    for jmtl in &doc.materials {
        read_material(scene, &doc, jmtl);
    }

    let stash = read_meshes(scene, &doc, &buffers, mtl_base)?;
    read_nodes(scene, &doc, &stash)
}

/// Parse a GLB container: the first chunk must be JSON; `BIN\0` chunks are
/// concatenated into the implicit buffer. The version word is accepted
/// without checking.
fn read_glb<R: Read + Seek>(r: &mut R) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    let _version = read_u32(r)?;
    let total_len = read_u32(r)? as u64;

    let mut json: Option<Vec<u8>> = None;
    let mut bin: Vec<u8> = Vec::new();
    let mut pos = 12u64;
    let mut first = true;

    while pos + 8 <= total_len {
        let chunk_len = read_u32(r)? as u64;
        let chunk_type = read_u32(r)?;
        pos += 8;
        if pos + chunk_len > total_len {
            return Err(Error::Format("GLB chunk extends past the declared length".into()));
        }
        let mut content = vec![0u8; chunk_len as usize];
        r.read_exact(&mut content)?;
        pos += chunk_len;

        if first && chunk_type != GLB_CHUNK_JSON {
            return Err(Error::Format("first GLB chunk is not JSON".into()));
        }
        first = false;

        match chunk_type {
            GLB_CHUNK_JSON => json = Some(content),
            GLB_CHUNK_BIN => bin.extend_from_slice(&content),
            _ => {}
        }
    }

    let json = json.ok_or_else(|| Error::Format("GLB without a JSON chunk".into()))?;
    Ok((json, (!bin.is_empty()).then_some(bin)))
}

fn load_buffers(
    scene: &mut SceneFile,
    doc: &GltfDoc,
    glb: Option<Vec<u8>>,
) -> Result<LoadedBuffers> {
    let mut data = Vec::with_capacity(doc.buffers.len());
    for (i, jbuf) in doc.buffers.iter().enumerate() {
        match &jbuf.uri {
            Some(uri) if uri.starts_with("data:") => {
                let text = uri
                    .split("base64,")
                    .nth(1)
                    .ok_or_else(|| Error::Format("embedded buffer data is not base64".into()))?;
                let mut bytes = b64::decode(text);
                if bytes.len() < jbuf.byte_length {
                    return Err(Error::Format(format!(
                        "embedded buffer {i} shorter than its byteLength"
                    )));
                }
                bytes.truncate(jbuf.byte_length);
                data.push(Some(bytes));
            }
            Some(uri) => {
                let path = scene.find_asset(uri);
                let bytes = fs::read(&path).map_err(|e| {
                    warn!("failed to read external buffer {}: {}", path.display(), e);
                    e
                })?;
                if bytes.len() < jbuf.byte_length {
                    return Err(Error::Format(format!(
                        "external buffer {} shorter than its byteLength",
                        path.display()
                    )));
                }
                data.push(Some(bytes));
            }
            None => {
                if glb.is_none() {
                    return Err(Error::Format(format!(
                        "buffer {i} has no uri and there is no binary chunk"
                    )));
                }
                data.push(None);
            }
        }
    }
    Ok(LoadedBuffers { data, glb })
}

// ----------------------------------------------------------------------
// Accessors
// ----------------------------------------------------------------------

fn comp_size(component_type: u32) -> Option<usize> {
    match component_type {
        5120 | COMP_UBYTE => Some(1),
        5122 | COMP_USHORT => Some(2),
        COMP_UINT | COMP_FLOAT => Some(4),
        _ => None,
    }
}

fn elem_width(accessor_type: &str) -> Option<usize> {
    match accessor_type {
        "SCALAR" => Some(1),
        "VEC2" => Some(2),
        "VEC3" => Some(3),
        "VEC4" | "MAT2" => Some(4),
        "MAT3" => Some(9),
        "MAT4" => Some(16),
        _ => None,
    }
}

/// A validated, bounds-checked window over one accessor's elements.
struct AccView<'a> {
    data: &'a [u8],
    stride: usize,
    nelem: usize,
    comp: u32,
    count: usize,
}

fn accessor_view<'a>(
    doc: &GltfDoc,
    buffers: &'a LoadedBuffers,
    idx: usize,
) -> Result<AccView<'a>> {
    let acc = doc
        .accessors
        .get(idx)
        .ok_or_else(|| Error::Format(format!("invalid accessor index: {idx}")))?;
    let bv_idx = acc
        .buffer_view
        .ok_or_else(|| Error::Format("accessor without a bufferView".into()))?;
    let bv = doc
        .buffer_views
        .get(bv_idx)
        .ok_or_else(|| Error::Format(format!("invalid bufferView index: {bv_idx}")))?;
    let buf = buffers
        .get(bv.buffer)
        .ok_or_else(|| Error::Format(format!("invalid buffer index: {}", bv.buffer)))?;

    let nelem = elem_width(&acc.accessor_type)
        .ok_or_else(|| Error::Format(format!("invalid accessor type: {}", acc.accessor_type)))?;
    let csize = comp_size(acc.component_type).ok_or_else(|| {
        Error::Unsupported(format!("accessor component type {}", acc.component_type))
    })?;
    let elem_size = nelem * csize;
    let stride = if bv.byte_stride != 0 { bv.byte_stride } else { elem_size };

    let offset = bv.byte_offset + acc.byte_offset;
    let need = match acc.count {
        0 => 0,
        n => (n - 1) * stride + elem_size,
    };
    if offset + need > buf.len() {
        return Err(Error::Format("accessor extends past the end of its buffer".into()));
    }

    Ok(AccView {
        data: &buf[offset..],
        stride,
        nelem,
        comp: acc.component_type,
        count: acc.count,
    })
}

/// Decode element `i` into up to four normalized float components;
/// missing components default to `(0, 0, 0, 1)`.
fn read_elem(view: &AccView, i: usize) -> Result<[f32; 4]> {
    let mut out = [0.0, 0.0, 0.0, 1.0];
    let base = i * view.stride;
    let n = view.nelem.min(4);
    match view.comp {
        COMP_FLOAT => {
            for (j, slot) in out.iter_mut().take(n).enumerate() {
                let o = base + j * 4;
                let b = &view.data[o..o + 4];
                *slot = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            }
        }
        COMP_UBYTE => {
            for (j, slot) in out.iter_mut().take(n).enumerate() {
                *slot = view.data[base + j] as f32 / 255.0;
            }
        }
        COMP_USHORT => {
            for (j, slot) in out.iter_mut().take(n).enumerate() {
                let o = base + j * 2;
                *slot = u16::from_le_bytes([view.data[o], view.data[o + 1]]) as f32 / 65535.0;
            }
        }
        other => {
            return Err(Error::Unsupported(format!(
                "attribute component type {other}"
            )))
        }
    }
    Ok(out)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Attr {
    Position,
    Normal,
    Tangent,
    Texcoord0,
    Color0,
}

fn read_attr(mesh: &mut Mesh, view: &AccView, attr: Attr) -> Result<()> {
    for i in 0..view.count {
        let v = read_elem(view, i)?;
        match attr {
            Attr::Position => mesh.add_vertex(Vec3::new(v[0], v[1], v[2])),
            Attr::Normal => mesh.add_normal(Vec3::new(v[0], v[1], v[2])),
            Attr::Tangent => mesh.add_tangent(Vec3::new(v[0], v[1], v[2])),
            Attr::Texcoord0 => mesh.add_texcoord(Vec2::new(v[0], v[1])),
            Attr::Color0 => mesh.add_color(Vec4::from_array(v)),
        }
    }
    Ok(())
}

fn read_indices(mesh: &mut Mesh, view: &AccView) -> Result<()> {
    if view.nelem != 1 || (view.comp != COMP_USHORT && view.comp != COMP_UINT) {
        return Err(Error::Format(
            "indices refer to an accessor of invalid type".into(),
        ));
    }
    let mut tri = [0u32; 3];
    let mut filled = 0;
    for i in 0..view.count {
        let base = i * view.stride;
        let d = &view.data[base..];
        tri[filled] = match view.comp {
            COMP_USHORT => u16::from_le_bytes([d[0], d[1]]) as u32,
            _ => u32::from_le_bytes([d[0], d[1], d[2], d[3]]),
        };
        filled += 1;
        if filled == 3 {
            mesh.add_triangle(tri[0], tri[1], tri[2]);
            filled = 0;
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Materials
// ----------------------------------------------------------------------

fn fetch_map(doc: &GltfDoc, texref: &GTextureRef) -> Option<TextureMap> {
    let Some(tex) = doc.textures.get(texref.index) else {
        warn!("material refers to invalid texture: {}", texref.index);
        return None;
    };
    let img = tex.source.and_then(|i| doc.images.get(i))?;
    let mut map = TextureMap {
        name: Some(img.uri.clone()?),
        ..TextureMap::default()
    };

    if let Some(sam) = tex.sampler.and_then(|i| doc.samplers.get(i)) {
        let minf = sam.min_filter.unwrap_or(0);
        let nearest = matches!(
            minf,
            FILT_NEAREST | FILT_NEAREST_MIPMAP_NEAREST | FILT_NEAREST_MIPMAP_LINEAR
        ) || sam.mag_filter == Some(FILT_NEAREST);
        if nearest {
            map.ufilt = TexFilter::Nearest;
            map.vfilt = TexFilter::Nearest;
        }
        if sam.wrap_s == Some(WRAP_CLAMP_TO_EDGE) {
            map.uwrap = TexWrap::Clamp;
        }
        if sam.wrap_t == Some(WRAP_CLAMP_TO_EDGE) {
            map.vwrap = TexWrap::Clamp;
        }
    }

    if let Some(ext) = &texref.extensions {
        if let Some(offs) = json_path::lookup(ext, "KHR_texture_transform.offset")
            .and_then(Value::as_array)
        {
            if let (Some(x), Some(y)) = (
                offs.first().and_then(Value::as_f64),
                offs.get(1).and_then(Value::as_f64),
            ) {
                map.offset = Vec3::new(x as f32, y as f32, 0.0);
            }
        }
        if let Some(scale) = json_path::lookup(ext, "KHR_texture_transform.scale")
            .and_then(Value::as_array)
        {
            if let (Some(x), Some(y)) = (
                scale.first().and_then(Value::as_f64),
                scale.get(1).and_then(Value::as_f64),
            ) {
                map.scale = Vec3::new(x as f32, y as f32, 1.0);
            }
        }
    }

    Some(map)
}

fn set_map(mtl: &mut Material, slot: MtlAttr, doc: &GltfDoc, texref: &Option<GTextureRef>) {
    if let Some(texref) = texref {
        if let Some(map) = fetch_map(doc, texref) {
            mtl.attr_mut(slot).map = map;
        }
    }
}

fn read_material(scene: &mut SceneFile, doc: &GltfDoc, jmtl: &GMaterial) {
    let name = jmtl.name.clone().unwrap_or_else(|| "unnamed material".into());
    let mut mtl = Material::new(name);

    if let Some(pbr) = &jmtl.pbr_metallic_roughness {
        if let Some(c) = pbr.base_color_factor {
            mtl.set_value(MtlAttr::Color, Vec4::from_array(c));
        }
        if let Some(rough) = pbr.roughness_factor {
            mtl.set_scalar(MtlAttr::Roughness, rough);
            mtl.set_scalar(MtlAttr::Shininess, (1.0 - rough) * 100.0 + 1.0);
        }
        if let Some(metal) = pbr.metallic_factor {
            mtl.set_scalar(MtlAttr::Metallic, metal);
        }
        set_map(&mut mtl, MtlAttr::Color, doc, &pbr.base_color_texture);
        set_map(&mut mtl, MtlAttr::Roughness, doc, &pbr.metallic_roughness_texture);
    }

    if let Some(e) = jmtl.emissive_factor {
        let w = mtl.attr(MtlAttr::Emissive).value.w;
        mtl.set_value(MtlAttr::Emissive, Vec4::new(e[0], e[1], e[2], w));
    }
    set_map(&mut mtl, MtlAttr::Emissive, doc, &jmtl.emissive_texture);
    set_map(&mut mtl, MtlAttr::Bump, doc, &jmtl.normal_texture);

    if let Some(ext) = &jmtl.extensions {
        if let Some(spec) = json_path::lookup(ext, "KHR_materials_specular.specularColorFactor")
            .and_then(json_path::as_vec4)
        {
            let w = mtl.attr(MtlAttr::Specular).value.w;
            mtl.set_value(MtlAttr::Specular, Vec4::new(spec.x, spec.y, spec.z, w));
        }
        let ior = json_path::lookup_f32(ext, "KHR_materials_ior.ior", -1.0);
        if ior >= 0.0 {
            mtl.set_scalar(MtlAttr::Ior, ior);
        }
        let transmit =
            json_path::lookup_f32(ext, "KHR_materials_transmission.transmissionFactor", -1.0);
        if transmit >= 0.0 {
            mtl.set_scalar(MtlAttr::Transmit, transmit);
        }
        if let Some(texval) = json_path::lookup(ext, "KHR_materials_transmission.transmissionTexture")
        {
            let texref = serde_json::from_value::<GTextureRef>(texval.clone()).ok();
            set_map(&mut mtl, MtlAttr::Transmit, doc, &texref);
        }
    }

    scene.add_material(mtl);
}

// ----------------------------------------------------------------------
// Meshes and nodes
// ----------------------------------------------------------------------

const OPTIONAL_ATTRS: [(&str, Attr); 4] = [
    ("NORMAL", Attr::Normal),
    ("TANGENT", Attr::Tangent),
    ("TEXCOORD_0", Attr::Texcoord0),
    ("COLOR_0", Attr::Color0),
];

/// Decode every triangle primitive into a scene mesh. Returns
/// `(glTF mesh index, scene mesh id)` pairs for node wiring; a glTF mesh
/// with several primitives produces several entries with the same index.
fn read_meshes(
    scene: &mut SceneFile,
    doc: &GltfDoc,
    buffers: &LoadedBuffers,
    mtl_base: usize,
) -> Result<Vec<(usize, MeshId)>> {
    let mut stash = Vec::new();

    for (gidx, jmesh) in doc.meshes.iter().enumerate() {
        let mesh_name = jmesh.name.clone().unwrap_or_else(|| "unnamed mesh".into());
        for jprim in &jmesh.primitives {
            let mode = jprim.mode.unwrap_or(MODE_TRIANGLES);
            if mode != MODE_TRIANGLES {
                warn!("skipping unsupported primitive mode: {mode}");
                continue;
            }
            let Some(&pos_idx) = jprim.attributes.get("POSITION") else {
                warn!("skipping primitive without a POSITION attribute");
                continue;
            };

            let mut mesh = Mesh::new(&mesh_name);
            read_attr(&mut mesh, &accessor_view(doc, buffers, pos_idx)?, Attr::Position)?;
            for (key, attr) in OPTIONAL_ATTRS {
                if let Some(&idx) = jprim.attributes.get(key) {
                    read_attr(&mut mesh, &accessor_view(doc, buffers, idx)?, attr)?;
                }
            }

            if let Some(idx) = jprim.indices {
                read_indices(&mut mesh, &accessor_view(doc, buffers, idx)?)?;
            } else {
                // Non-indexed triangles: consecutive vertex triples.
                if mesh.num_verts() % 3 != 0 {
                    return Err(Error::Format(
                        "non-indexed primitive vertex count is not divisible by 3".into(),
                    ));
                }
                for base in (0..mesh.num_verts() as u32).step_by(3) {
                    mesh.add_triangle(base, base + 1, base + 2);
                }
            }

            if let Some(mi) = jprim.material {
                if mi < doc.materials.len() {
                    mesh.material = Some(MaterialId(mtl_base + mi));
                } else {
                    warn!("primitive refers to invalid material: {mi}");
                }
            }

            let mid = scene.add_mesh(mesh);
            stash.push((gidx, mid));
        }
    }
    Ok(stash)
}

fn node_matrix(jnode: &GNode) -> Mat4 {
    if let Some(m) = jnode.matrix {
        return Mat4::from_cols_array(&m);
    }
    let t = jnode.translation.unwrap_or([0.0; 3]);
    let r = jnode.rotation.unwrap_or([0.0, 0.0, 0.0, 1.0]);
    let s = jnode.scale.unwrap_or([1.0; 3]);
    Mat4::from_scale_rotation_translation(
        Vec3::from_array(s),
        Quat::from_xyzw(r[0], r[1], r[2], r[3]),
        Vec3::from_array(t),
    )
}

fn read_nodes(scene: &mut SceneFile, doc: &GltfDoc, stash: &[(usize, MeshId)]) -> Result<()> {
    let mut ids = Vec::with_capacity(doc.nodes.len());
    for jnode in &doc.nodes {
        let mut node = Node::new(jnode.name.clone().unwrap_or_else(|| "unnamed node".into()));
        node.matrix = node_matrix(jnode);
        let nid = scene.add_node(node);

        if let Some(mi) = jnode.mesh {
            // Attach every scene mesh produced from this glTF mesh index.
            for &(gidx, mid) in stash {
                if gidx == mi {
                    scene.node_add_mesh(nid, mid);
                }
            }
        }
        ids.push(nid);
    }

    // Children are wired up only after every node exists.
    for (i, jnode) in doc.nodes.iter().enumerate() {
        for &child in &jnode.children {
            if child >= ids.len() {
                warn!("invalid child node reference: {child}");
                continue;
            }
            scene.node_add_child(ids[i], ids[child]);
        }
    }
    Ok(())
}

// ============================================================================
// Saving
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RootOut {
    asset: AssetOut,
    scene: usize,
    scenes: Vec<SceneOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<NodeOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    materials: Vec<MaterialOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    meshes: Vec<MeshOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    accessors: Vec<AccessorOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buffer_views: Vec<BufferViewOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buffers: Vec<BufferOut>,
}

#[derive(Serialize)]
struct AssetOut {
    version: &'static str,
    generator: &'static str,
}

#[derive(Serialize)]
struct SceneOut {
    nodes: Vec<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mesh: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matrix: Option<[f32; 16]>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MaterialOut {
    name: String,
    pbr_metallic_roughness: PbrOut,
    #[serde(skip_serializing_if = "Option::is_none")]
    emissive_factor: Option<[f32; 3]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PbrOut {
    base_color_factor: [f32; 4],
    metallic_factor: f32,
    roughness_factor: f32,
}

#[derive(Serialize)]
struct MeshOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    primitives: Vec<PrimitiveOut>,
}

#[derive(Serialize)]
struct PrimitiveOut {
    attributes: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    indices: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    material: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessorOut {
    buffer_view: usize,
    component_type: u32,
    count: usize,
    #[serde(rename = "type")]
    accessor_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    min: Vec<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    max: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BufferViewOut {
    buffer: usize,
    byte_offset: usize,
    byte_length: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BufferOut {
    byte_length: usize,
    uri: String,
}

/// Accumulates accessor data into the single output buffer.
#[derive(Default)]
struct BinWriter {
    blob: Vec<u8>,
    views: Vec<BufferViewOut>,
    accessors: Vec<AccessorOut>,
}

impl BinWriter {
    fn push_accessor(
        &mut self,
        bytes: Vec<u8>,
        component_type: u32,
        count: usize,
        accessor_type: &'static str,
        min: Vec<f32>,
        max: Vec<f32>,
    ) -> usize {
        while self.blob.len() % 4 != 0 {
            self.blob.push(0);
        }
        let byte_offset = self.blob.len();
        let byte_length = bytes.len();
        self.blob.extend_from_slice(&bytes);

        let view = self.views.len();
        self.views.push(BufferViewOut {
            buffer: 0,
            byte_offset,
            byte_length,
        });
        self.accessors.push(AccessorOut {
            buffer_view: view,
            component_type,
            count,
            accessor_type,
            min,
            max,
        });
        self.accessors.len() - 1
    }

    fn push_floats(
        &mut self,
        comps: &[f32],
        count: usize,
        accessor_type: &'static str,
        min: Vec<f32>,
        max: Vec<f32>,
    ) -> usize {
        let bytes = comps.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push_accessor(bytes, COMP_FLOAT, count, accessor_type, min, max)
    }
}

fn push_primitive(bin: &mut BinWriter, mesh: &Mesh) -> PrimitiveOut {
    let mut attributes = BTreeMap::new();

    let pos: Vec<f32> = mesh.vertices.iter().flat_map(|v| v.to_array()).collect();
    let (min, max) = if mesh.aabox.is_valid() {
        (
            mesh.aabox.min.to_array().to_vec(),
            mesh.aabox.max.to_array().to_vec(),
        )
    } else {
        (Vec::new(), Vec::new())
    };
    attributes.insert(
        "POSITION",
        bin.push_floats(&pos, mesh.num_verts(), "VEC3", min, max),
    );

    if !mesh.normals.is_empty() {
        let data: Vec<f32> = mesh.normals.iter().flat_map(|v| v.to_array()).collect();
        attributes.insert(
            "NORMAL",
            bin.push_floats(&data, mesh.normals.len(), "VEC3", Vec::new(), Vec::new()),
        );
    }
    if !mesh.texcoords.is_empty() {
        let data: Vec<f32> = mesh.texcoords.iter().flat_map(|v| v.to_array()).collect();
        attributes.insert(
            "TEXCOORD_0",
            bin.push_floats(&data, mesh.texcoords.len(), "VEC2", Vec::new(), Vec::new()),
        );
    }
    if !mesh.colors.is_empty() {
        let data: Vec<f32> = mesh.colors.iter().flat_map(|v| v.to_array()).collect();
        attributes.insert(
            "COLOR_0",
            bin.push_floats(&data, mesh.colors.len(), "VEC4", Vec::new(), Vec::new()),
        );
    }

    let indices = if mesh.faces.is_empty() {
        None
    } else {
        let bytes: Vec<u8> = mesh
            .faces
            .iter()
            .flatten()
            .flat_map(|i| i.to_le_bytes())
            .collect();
        Some(bin.push_accessor(
            bytes,
            COMP_UINT,
            mesh.num_faces() * 3,
            "SCALAR",
            Vec::new(),
            Vec::new(),
        ))
    };

    PrimitiveOut {
        attributes,
        indices,
        material: mesh.material.map(|m| m.0),
    }
}

fn material_out(mtl: &Material) -> MaterialOut {
    let color = mtl.attr(MtlAttr::Color).value;
    let emissive = mtl.attr(MtlAttr::Emissive).value;
    let ior = mtl.attr(MtlAttr::Ior).value.x;
    let transmit = mtl.attr(MtlAttr::Transmit).value.x;

    let mut extensions = serde_json::Map::new();
    if ior != 1.5 {
        extensions.insert("KHR_materials_ior".into(), serde_json::json!({ "ior": ior }));
    }
    if transmit > 0.0 {
        extensions.insert(
            "KHR_materials_transmission".into(),
            serde_json::json!({ "transmissionFactor": transmit }),
        );
    }

    MaterialOut {
        name: mtl.name.clone(),
        pbr_metallic_roughness: PbrOut {
            base_color_factor: color.to_array(),
            metallic_factor: mtl.attr(MtlAttr::Metallic).value.x,
            roughness_factor: mtl.attr(MtlAttr::Roughness).value.x,
        },
        emissive_factor: (emissive.x > 0.0 || emissive.y > 0.0 || emissive.z > 0.0)
            .then(|| [emissive.x, emissive.y, emissive.z]),
        extensions: (!extensions.is_empty()).then(|| Value::Object(extensions)),
    }
}

pub(crate) fn save<W: Write>(scene: &SceneFile, w: &mut W) -> Result<()> {
    let mut bin = BinWriter::default();
    let mut meshes_out = Vec::new();
    let mut nodes_out = Vec::new();
    let mut scene_roots: Vec<usize> = scene.topnodes().iter().map(|id| id.0).collect();

    let mut referenced = vec![false; scene.num_meshes()];
    for node in scene.nodes() {
        let mesh = if node.meshes().is_empty() {
            None
        } else {
            let primitives = node
                .meshes()
                .iter()
                .map(|&mid| {
                    referenced[mid.0] = true;
                    push_primitive(&mut bin, scene.mesh(mid))
                })
                .collect();
            let idx = meshes_out.len();
            meshes_out.push(MeshOut {
                name: Some(scene.mesh(node.meshes()[0]).name.clone()),
                primitives,
            });
            Some(idx)
        };

        nodes_out.push(NodeOut {
            name: (!node.name.is_empty()).then(|| node.name.clone()),
            mesh,
            children: node.children().iter().map(|id| id.0).collect(),
            matrix: (node.matrix != Mat4::IDENTITY).then(|| node.matrix.to_cols_array()),
        });
    }

    // Meshes no node references get a synthesized root node each.
    for i in 0..scene.num_meshes() {
        if referenced[i] {
            continue;
        }
        let mesh = &scene.meshes()[i];
        let prim = push_primitive(&mut bin, mesh);
        let mesh_idx = meshes_out.len();
        meshes_out.push(MeshOut {
            name: Some(mesh.name.clone()),
            primitives: vec![prim],
        });
        let node_idx = nodes_out.len();
        nodes_out.push(NodeOut {
            name: Some(mesh.name.clone()),
            mesh: Some(mesh_idx),
            children: Vec::new(),
            matrix: None,
        });
        scene_roots.push(node_idx);
    }

    let buffers = if bin.blob.is_empty() {
        Vec::new()
    } else {
        vec![BufferOut {
            byte_length: bin.blob.len(),
            uri: format!(
                "data:application/octet-stream;base64,{}",
                b64::encode(&bin.blob)
            ),
        }]
    };

    let root = RootOut {
        asset: AssetOut {
            version: "2.0",
            generator: "scenefile",
        },
        scene: 0,
        scenes: vec![SceneOut { nodes: scene_roots }],
        nodes: nodes_out,
        materials: scene.materials().iter().map(material_out).collect(),
        meshes: meshes_out,
        accessors: bin.accessors,
        buffer_views: bin.views,
        buffers,
    };

    serde_json::to_writer_pretty(&mut *w, &root)?;
    writeln!(w)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load_json(text: &str) -> Result<SceneFile> {
        let mut scene = SceneFile::new();
        load(&mut scene, &mut Cursor::new(text.as_bytes().to_vec()))?;
        Ok(scene)
    }

    fn tri_gltf_json() -> String {
        // One triangle: positions (0,0,0) (1,0,0) (0,1,0), u16 indices.
        let mut buf = Vec::new();
        for v in [
            [0.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
        ] {
            for c in v {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        let indices_offset = buf.len();
        for i in [0u16, 1, 2] {
            buf.extend_from_slice(&i.to_le_bytes());
        }
        format!(
            r#"{{
            "asset": {{ "version": "2.0" }},
            "buffers": [ {{ "byteLength": {}, "uri": "data:application/octet-stream;base64,{}" }} ],
            "bufferViews": [
                {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
                {{ "buffer": 0, "byteOffset": {}, "byteLength": 6 }}
            ],
            "accessors": [
                {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }},
                {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
            ],
            "meshes": [ {{ "name": "tri", "primitives": [
                {{ "attributes": {{ "POSITION": 0 }}, "indices": 1 }}
            ] }} ],
            "nodes": [ {{ "name": "root", "mesh": 0 }} ]
        }}"#,
            buf.len(),
            b64::encode(&buf),
            indices_offset,
        )
    }

    #[test]
    fn rejects_non_json() {
        assert!(load_json("v 0 0 0").is_err());
    }

    #[test]
    fn requires_asset_version() {
        assert!(load_json(r#"{ "meshes": [] }"#).is_err());
    }

    #[test]
    fn loads_embedded_triangle() {
        let scene = load_json(&tri_gltf_json()).unwrap();
        assert_eq!(scene.num_meshes(), 1);
        assert_eq!(scene.num_nodes(), 1);
        let mesh = &scene.meshes()[0];
        assert_eq!(mesh.name, "tri");
        assert_eq!(mesh.num_verts(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.vertices[1], Vec3::new(1.0, 0.0, 0.0));
        let node = &scene.nodes()[0];
        assert_eq!(node.meshes().len(), 1);
    }

    #[test]
    fn trs_node_composes_translation() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "nodes": [
                { "name": "parent", "translation": [1, 2, 3],
                  "rotation": [0, 0, 0, 1], "scale": [1, 1, 1],
                  "children": [1] },
                { "name": "child" }
            ]
        }"#;
        let mut scene = load_json(json).unwrap();
        scene.update_xform();

        let parent = &scene.nodes()[0];
        assert!(parent
            .matrix
            .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), 1e-6));
        assert_eq!(parent.matrix.col(3), Vec4::new(1.0, 2.0, 3.0, 1.0));
        // Identity child follows the parent.
        let child = &scene.nodes()[1];
        assert!(child.global_matrix.abs_diff_eq(parent.global_matrix, 1e-5));
        assert_eq!(child.parent(), Some(scene.topnodes()[0]));
        assert_eq!(scene.num_topnodes(), 1);
    }

    #[test]
    fn matrix_node_is_verbatim_column_major() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "nodes": [ { "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 5,6,7,1] } ]
        }"#;
        let scene = load_json(json).unwrap();
        assert_eq!(scene.nodes()[0].matrix.col(3), Vec4::new(5.0, 6.0, 7.0, 1.0));
    }

    #[test]
    fn materials_map_to_attribute_slots() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "images": [ { "uri": "albedo.png" } ],
            "samplers": [ { "magFilter": 9728, "wrapS": 33071 } ],
            "textures": [ { "source": 0, "sampler": 0 } ],
            "materials": [ {
                "name": "pbr",
                "pbrMetallicRoughness": {
                    "baseColorFactor": [0.5, 0.25, 0.125, 1.0],
                    "roughnessFactor": 0.5,
                    "metallicFactor": 0.75,
                    "baseColorTexture": { "index": 0, "extensions": {
                        "KHR_texture_transform": { "offset": [0.1, 0.2], "scale": [2.0, 3.0] }
                    } }
                },
                "emissiveFactor": [0.0, 1.0, 0.0],
                "extensions": {
                    "KHR_materials_ior": { "ior": 1.33 },
                    "KHR_materials_transmission": { "transmissionFactor": 0.4 },
                    "KHR_materials_specular": { "specularColorFactor": [1.0, 0.9, 0.8] }
                }
            } ]
        }"#;
        let scene = load_json(json).unwrap();
        assert_eq!(scene.num_materials(), 1);
        let mtl = &scene.materials()[0];

        assert_eq!(mtl.attr(MtlAttr::Color).value, Vec4::new(0.5, 0.25, 0.125, 1.0));
        assert_eq!(mtl.attr(MtlAttr::Roughness).value.x, 0.5);
        assert_eq!(mtl.attr(MtlAttr::Shininess).value.x, 51.0);
        assert_eq!(mtl.attr(MtlAttr::Metallic).value.x, 0.75);
        assert_eq!(mtl.attr(MtlAttr::Emissive).value.y, 1.0);
        assert!((mtl.attr(MtlAttr::Ior).value.x - 1.33).abs() < 1e-6);
        assert!((mtl.attr(MtlAttr::Transmit).value.x - 0.4).abs() < 1e-6);
        assert_eq!(mtl.attr(MtlAttr::Specular).value.x, 1.0);

        let map = &mtl.attr(MtlAttr::Color).map;
        assert_eq!(map.name.as_deref(), Some("albedo.png"));
        assert_eq!(map.ufilt, TexFilter::Nearest);
        assert_eq!(map.uwrap, TexWrap::Clamp);
        assert_eq!(map.vwrap, TexWrap::Repeat);
        assert!(map.offset.abs_diff_eq(Vec3::new(0.1, 0.2, 0.0), 1e-6));
        assert!(map.scale.abs_diff_eq(Vec3::new(2.0, 3.0, 1.0), 1e-6));
    }

    #[test]
    fn normalized_attribute_components_scale() {
        // Colors as normalized ubyte VEC4.
        let mut buf = Vec::new();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        let color_offset = buf.len();
        buf.extend_from_slice(&[255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255]);

        let json = format!(
            r#"{{
            "asset": {{ "version": "2.0" }},
            "buffers": [ {{ "byteLength": {}, "uri": "data:application/octet-stream;base64,{}" }} ],
            "bufferViews": [
                {{ "buffer": 0, "byteLength": 36 }},
                {{ "buffer": 0, "byteOffset": {}, "byteLength": 12 }}
            ],
            "accessors": [
                {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }},
                {{ "bufferView": 1, "componentType": 5121, "count": 3, "type": "VEC4" }}
            ],
            "meshes": [ {{ "primitives": [
                {{ "attributes": {{ "POSITION": 0, "COLOR_0": 1 }} }}
            ] }} ]
        }}"#,
            buf.len(),
            b64::encode(&buf),
            color_offset,
        );
        let scene = load_json(&json).unwrap();
        let mesh = &scene.meshes()[0];
        // Non-indexed: one sequential triangle.
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.colors[0], Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(mesh.colors[2], Vec4::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn bad_index_accessor_type_is_fatal() {
        // Indices pointing at a float accessor.
        let mut buf = Vec::new();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                buf.extend_from_slice(&c.to_le_bytes());
            }
        }
        let json = format!(
            r#"{{
            "asset": {{ "version": "2.0" }},
            "buffers": [ {{ "byteLength": {}, "uri": "data:application/octet-stream;base64,{}" }} ],
            "bufferViews": [ {{ "buffer": 0, "byteLength": 36 }} ],
            "accessors": [ {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3" }} ],
            "meshes": [ {{ "primitives": [
                {{ "attributes": {{ "POSITION": 0 }}, "indices": 0 }}
            ] }} ]
        }}"#,
            buf.len(),
            b64::encode(&buf),
        );
        assert!(load_json(&json).is_err());
    }

    #[test]
    fn glb_container_roundtrips_json_and_bin() {
        let json_text = tri_gltf_json();
        // Rewrite the embedded buffer as a GLB binary chunk: strip the
        // data URI and leave the buffer without one.
        let doc: Value = serde_json::from_str(&json_text).unwrap();
        let uri = doc["buffers"][0]["uri"].as_str().unwrap();
        let bin = b64::decode(uri.split("base64,").nth(1).unwrap());
        let mut doc = doc;
        doc["buffers"][0] = serde_json::json!({ "byteLength": bin.len() });
        let json_bytes = serde_json::to_vec(&doc).unwrap();

        let mut glb = Vec::new();
        glb.extend_from_slice(GLB_MAGIC);
        glb.extend_from_slice(&2u32.to_le_bytes());
        let total = 12 + 8 + json_bytes.len() + 8 + bin.len();
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
        glb.extend_from_slice(&GLB_CHUNK_JSON.to_le_bytes());
        glb.extend_from_slice(&json_bytes);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(&GLB_CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(&bin);

        let mut scene = SceneFile::new();
        load(&mut scene, &mut Cursor::new(glb)).unwrap();
        assert_eq!(scene.num_meshes(), 1);
        assert_eq!(scene.meshes()[0].vertices[1], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn glb_first_chunk_must_be_json() {
        let mut glb = Vec::new();
        glb.extend_from_slice(GLB_MAGIC);
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(12u32 + 8 + 4).to_le_bytes());
        glb.extend_from_slice(&4u32.to_le_bytes());
        glb.extend_from_slice(&GLB_CHUNK_BIN.to_le_bytes());
        glb.extend_from_slice(&[0u8; 4]);

        let mut scene = SceneFile::new();
        assert!(load(&mut scene, &mut Cursor::new(glb)).is_err());
    }

    #[test]
    fn save_load_roundtrip() {
        let mut scene = SceneFile::new();
        let mut mtl = Material::new("m");
        mtl.set_scalar(MtlAttr::Transmit, 0.5);
        let mtl_id = scene.add_material(mtl);

        let mut mesh = Mesh::new("tri");
        mesh.add_vertex(Vec3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Vec3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Vec3::new(0.0, 1.0, 0.0));
        mesh.add_normal(Vec3::Z);
        mesh.add_normal(Vec3::Z);
        mesh.add_normal(Vec3::Z);
        mesh.add_texcoord(Vec2::new(0.0, 0.0));
        mesh.add_texcoord(Vec2::new(1.0, 0.0));
        mesh.add_texcoord(Vec2::new(0.0, 1.0));
        mesh.add_triangle(0, 1, 2);
        mesh.material = Some(mtl_id);
        let mid = scene.add_mesh(mesh);

        let nid = scene.add_node(Node::new("root"));
        scene.node_add_mesh(nid, mid);
        scene.node_mut(nid).matrix = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        scene.update_xform();

        let mut out = Vec::new();
        save(&scene, &mut out).unwrap();

        let mut reloaded = SceneFile::new();
        load(&mut reloaded, &mut Cursor::new(out)).unwrap();
        reloaded.update_xform();

        assert_eq!(reloaded.num_meshes(), 1);
        assert_eq!(reloaded.num_nodes(), 1);
        assert_eq!(reloaded.num_materials(), 1);

        let mesh = &reloaded.meshes()[0];
        assert_eq!(mesh.vertices, scene.meshes()[0].vertices);
        assert_eq!(mesh.normals, scene.meshes()[0].normals);
        assert_eq!(mesh.texcoords, scene.meshes()[0].texcoords);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.material, Some(MaterialId(0)));

        let node = &reloaded.nodes()[0];
        assert!(node
            .matrix
            .abs_diff_eq(Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)), 1e-6));
        assert!((reloaded.materials()[0].attr(MtlAttr::Transmit).value.x - 0.5).abs() < 1e-6);
    }
}
