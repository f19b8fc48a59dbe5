//! Materials: enumerated attribute slots, each with a value and a texture
//! map.

use glam::{Vec3, Vec4};

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexFilter {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate wrap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexWrap {
    #[default]
    Repeat,
    Clamp,
}

/// Number of cubemap faces; the order is top, bottom, front, back, left,
/// right.
pub const CUBE_FACES: usize = 6;

/// A texture reference. `name` set means a 2D map; any `cube` entry set
/// means a cubemap face. Materials carry only texture *names*; decoding
/// pixels is the consumer's job.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureMap {
    pub name: Option<String>,
    pub cube: [Option<String>; CUBE_FACES],
    pub ufilt: TexFilter,
    pub vfilt: TexFilter,
    pub uwrap: TexWrap,
    pub vwrap: TexWrap,
    pub offset: Vec3,
    pub scale: Vec3,
    pub rot: f32,
}

impl Default for TextureMap {
    fn default() -> Self {
        Self {
            name: None,
            cube: Default::default(),
            ufilt: TexFilter::Linear,
            vfilt: TexFilter::Linear,
            uwrap: TexWrap::Repeat,
            vwrap: TexWrap::Repeat,
            offset: Vec3::ZERO,
            scale: Vec3::ONE,
            rot: 0.0,
        }
    }
}

impl TextureMap {
    /// True when either a 2D name or any cubemap face is set.
    pub fn is_set(&self) -> bool {
        self.name.is_some() || self.cube.iter().any(|c| c.is_some())
    }
}

/// Material attribute slots. Scalar slots use only `value.x`; RGB slots
/// use `value.xyz`; COLOR uses all four components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MtlAttr {
    Color,
    Specular,
    Shininess,
    Roughness,
    Metallic,
    Emissive,
    Reflect,
    Transmit,
    Ior,
    Alpha,
    Bump,
}

impl MtlAttr {
    pub const COUNT: usize = 11;

    pub const ALL: [MtlAttr; Self::COUNT] = [
        MtlAttr::Color,
        MtlAttr::Specular,
        MtlAttr::Shininess,
        MtlAttr::Roughness,
        MtlAttr::Metallic,
        MtlAttr::Emissive,
        MtlAttr::Reflect,
        MtlAttr::Transmit,
        MtlAttr::Ior,
        MtlAttr::Alpha,
        MtlAttr::Bump,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// One material attribute: a value plus an optional texture map.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MtlAttrib {
    pub value: Vec4,
    pub map: TextureMap,
}

/// A named material holding the full fixed-size attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    attrs: [MtlAttrib; MtlAttr::COUNT],
}

impl Material {
    /// Create a material with the documented defaults: 0.7 grey color,
    /// shininess 1, IOR 1.5, alpha 1, everything else 0.
    pub fn new(name: impl Into<String>) -> Self {
        let mut attrs: [MtlAttrib; MtlAttr::COUNT] = Default::default();
        attrs[MtlAttr::Color.index()].value = Vec4::new(0.7, 0.7, 0.7, 1.0);
        attrs[MtlAttr::Shininess.index()].value.x = 1.0;
        attrs[MtlAttr::Ior.index()].value.x = 1.5;
        attrs[MtlAttr::Alpha.index()].value.x = 1.0;
        Self {
            name: name.into(),
            attrs,
        }
    }

    pub fn attr(&self, slot: MtlAttr) -> &MtlAttrib {
        &self.attrs[slot.index()]
    }

    pub fn attr_mut(&mut self, slot: MtlAttr) -> &mut MtlAttrib {
        &mut self.attrs[slot.index()]
    }

    pub fn set_value(&mut self, slot: MtlAttr, value: Vec4) {
        self.attrs[slot.index()].value = value;
    }

    /// Set only the scalar component of a slot.
    pub fn set_scalar(&mut self, slot: MtlAttr, value: f32) {
        self.attrs[slot.index()].value.x = value;
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let m = Material::new("m");
        assert_eq!(m.attr(MtlAttr::Color).value, Vec4::new(0.7, 0.7, 0.7, 1.0));
        assert_eq!(m.attr(MtlAttr::Shininess).value.x, 1.0);
        assert_eq!(m.attr(MtlAttr::Ior).value.x, 1.5);
        assert_eq!(m.attr(MtlAttr::Alpha).value.x, 1.0);
        assert_eq!(m.attr(MtlAttr::Roughness).value.x, 0.0);
        assert!(!m.attr(MtlAttr::Color).map.is_set());
    }

    #[test]
    fn texture_map_defaults() {
        let t = TextureMap::default();
        assert_eq!(t.ufilt, TexFilter::Linear);
        assert_eq!(t.uwrap, TexWrap::Repeat);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.offset, Vec3::ZERO);
        assert!(!t.is_set());
    }

    #[test]
    fn cube_face_marks_map_set() {
        let mut t = TextureMap::default();
        t.cube[2] = Some("front.png".into());
        assert!(t.is_set());
    }
}
