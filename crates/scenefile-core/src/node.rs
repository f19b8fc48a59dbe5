//! Transform nodes.

use glam::Mat4;

use crate::ids::{MeshId, NodeId};

/// A named transform in the node tree.
///
/// `matrix` is the local transform (column-major, as everywhere in glam);
/// `global_matrix` is derived by
/// [`SceneFile::update_xform`](crate::SceneFile::update_xform) as
/// `parent.global_matrix * matrix`, or `matrix` at a root. Topology
/// (parent, children, attached meshes) is only mutated through the owning
/// scene, which keeps both sides of the parent/child link in step.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub matrix: Mat4,
    pub global_matrix: Mat4,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) meshes: Vec<MeshId>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matrix: Mat4::IDENTITY,
            global_matrix: Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
            meshes: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn meshes(&self) -> &[MeshId] {
        &self.meshes
    }
}
