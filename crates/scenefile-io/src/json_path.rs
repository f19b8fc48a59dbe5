//! Dotted-path lookup over `serde_json::Value`.
//!
//! The glTF document skeleton is deserialized into typed structs, but
//! extension blobs (`KHR_*`) stay dynamic; this helper walks them with
//! paths like `KHR_materials_ior.ior` or `offset[1]`.

use glam::Vec4;
use serde_json::Value;

/// Walk `path` through objects (`a.b`) and arrays (`a[0]`), returning the
/// value it lands on.
pub(crate) fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = value;
    for seg in path.split('.') {
        let (name, rest) = match seg.find('[') {
            Some(pos) => (&seg[..pos], &seg[pos..]),
            None => (seg, ""),
        };
        if !name.is_empty() {
            cur = cur.as_object()?.get(name)?;
        }
        let mut rest = rest;
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            let idx: usize = stripped[..close].parse().ok()?;
            cur = cur.as_array()?.get(idx)?;
            rest = &stripped[close + 1..];
        }
    }
    Some(cur)
}

pub(crate) fn lookup_f32(value: &Value, path: &str, default: f32) -> f32 {
    lookup(value, path)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

/// Interpret a JSON array of 3 or 4 numbers as a vector; a missing fourth
/// component reads as 0.
pub(crate) fn as_vec4(value: &Value) -> Option<Vec4> {
    let arr = value.as_array()?;
    if arr.len() < 3 || arr.len() > 4 {
        return None;
    }
    let mut v = [0.0f32; 4];
    for (i, item) in arr.iter().enumerate() {
        v[i] = item.as_f64()? as f32;
    }
    Some(Vec4::from_array(v))
}
