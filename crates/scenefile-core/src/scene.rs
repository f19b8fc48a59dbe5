//! The scene container owning all meshes, materials and nodes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::Mat4;
use log::warn;

use crate::aabox::Aabox;
use crate::ids::{MaterialId, MeshId, NodeId};
use crate::material::Material;
use crate::mesh::Mesh;
use crate::node::Node;

/// Post-load processing selection.
///
/// The default synthesizes normals for meshes that came in without any;
/// [`PostProcess::none`] skips everything. Transform propagation and bounds
/// recomputation always run after a load regardless of these switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcess {
    pub gen_normals: bool,
    pub gen_tangents: bool,
    pub apply_xform: bool,
}

impl Default for PostProcess {
    fn default() -> Self {
        Self {
            gen_normals: true,
            gen_tangents: false,
            apply_xform: false,
        }
    }
}

impl PostProcess {
    /// Skip all processing steps.
    pub fn none() -> Self {
        Self {
            gen_normals: false,
            gen_tangents: false,
            apply_xform: false,
        }
    }
}

/// The root container. Owns every mesh, material and node; entities are
/// created detached and handed over with
/// [`add_mesh`](SceneFile::add_mesh) /
/// [`add_material`](SceneFile::add_material) /
/// [`add_node`](SceneFile::add_node).
#[derive(Debug, Default)]
pub struct SceneFile {
    name: String,
    dir: Option<PathBuf>,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    nodes: Vec<Node>,
    topnodes: Vec<NodeId>,
    aabox: Aabox,
    assets: BTreeMap<String, PathBuf>,
    default_material: Material,
}

impl SceneFile {
    pub fn new() -> Self {
        Self {
            aabox: Aabox::EMPTY,
            default_material: Material::default(),
            ..Self::default()
        }
    }

    /// Create a scene remembering its source path; the parent directory
    /// seeds asset-path resolution.
    pub fn with_source(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut scene = Self::new();
        scene.name = path.to_string_lossy().into_owned();
        scene.dir = path.parent().filter(|p| !p.as_os_str().is_empty()).map(PathBuf::from);
        scene
    }

    /// Drop every owned entity and derived state; the source name and
    /// directory are kept.
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.materials.clear();
        self.nodes.clear();
        self.topnodes.clear();
        self.assets.clear();
        self.aabox = Aabox::EMPTY;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    pub fn num_materials(&self) -> usize {
        self.materials.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_topnodes(&self) -> usize {
        self.topnodes.len()
    }

    pub fn mesh(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.0]
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> &mut Mesh {
        &mut self.meshes[id.0]
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn material(&self, id: MaterialId) -> &Material {
        &self.materials[id.0]
    }

    pub fn material_mut(&mut self, id: MaterialId) -> &mut Material {
        &mut self.materials[id.0]
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn topnodes(&self) -> &[NodeId] {
        &self.topnodes
    }

    pub fn find_mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes.iter().position(|m| m.name == name).map(MeshId)
    }

    pub fn find_material(&self, name: &str) -> Option<MaterialId> {
        self.materials
            .iter()
            .position(|m| m.name == name)
            .map(MaterialId)
    }

    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// The material referenced by `mesh`, or the scene's default material
    /// when none is set.
    pub fn mesh_material(&self, mesh: &Mesh) -> &Material {
        match mesh.material {
            Some(id) => &self.materials[id.0],
            None => &self.default_material,
        }
    }

    pub fn default_material(&self) -> &Material {
        &self.default_material
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.meshes.len());
        self.meshes.push(mesh);
        id
    }

    pub fn add_material(&mut self, mtl: Material) -> MaterialId {
        let id = MaterialId(self.materials.len());
        self.materials.push(mtl);
        id
    }

    /// Register a node. Nodes enter the scene parentless and are listed as
    /// roots until [`node_add_child`](SceneFile::node_add_child) re-parents
    /// them.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.topnodes.push(id);
        id
    }

    /// Attach `child` under `parent`, detaching it from any previous parent
    /// (or the root list) first. A self-parent or a link that would close a
    /// cycle is refused with a log.
    pub fn node_add_child(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            warn!("node_add_child: refusing to parent {:?} to itself", child);
            return;
        }
        // Walking up from the parent must never reach the child.
        let mut cur = Some(parent);
        while let Some(id) = cur {
            if id == child {
                warn!(
                    "node_add_child: refusing cycle between {:?} and {:?}",
                    parent, child
                );
                return;
            }
            cur = self.nodes[id.0].parent;
        }

        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Detach `child` from `parent`; it becomes a root again.
    pub fn node_remove_child(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes[child.0].parent != Some(parent) {
            return;
        }
        self.detach(child);
        self.topnodes.push(child);
    }

    fn detach(&mut self, child: NodeId) {
        match self.nodes[child.0].parent.take() {
            Some(old) => self.nodes[old.0].children.retain(|&c| c != child),
            None => self.topnodes.retain(|&n| n != child),
        }
    }

    pub fn node_add_mesh(&mut self, node: NodeId, mesh: MeshId) {
        self.nodes[node.0].meshes.push(mesh);
    }

    pub fn node_remove_mesh(&mut self, node: NodeId, mesh: MeshId) {
        self.nodes[node.0].meshes.retain(|&m| m != mesh);
    }

    // ------------------------------------------------------------------
    // Transforms and bounds
    // ------------------------------------------------------------------

    /// Recompute every node's global matrix top-down from the roots.
    pub fn update_xform(&mut self) {
        let mut stack: Vec<(NodeId, Mat4)> = self
            .topnodes
            .iter()
            .map(|&id| (id, Mat4::IDENTITY))
            .collect();
        while let Some((id, parent_global)) = stack.pop() {
            let node = &mut self.nodes[id.0];
            node.global_matrix = parent_global * node.matrix;
            let global = node.global_matrix;
            for &c in &node.children {
                stack.push((c, global));
            }
        }
    }

    /// All (global transform, mesh) instances in document order: one entry
    /// per node mesh reference, plus one identity entry for every mesh no
    /// node references, so node-less formats still have geometry to walk.
    pub fn instances(&self) -> Vec<(Mat4, MeshId)> {
        let mut out = Vec::new();
        let mut referenced = vec![false; self.meshes.len()];
        for node in &self.nodes {
            for &m in &node.meshes {
                referenced[m.0] = true;
                out.push((node.global_matrix, m));
            }
        }
        for (i, seen) in referenced.into_iter().enumerate() {
            if !seen {
                out.push((Mat4::IDENTITY, MeshId(i)));
            }
        }
        out
    }

    /// Recompute the scene-wide world-space box by transforming every
    /// instance's vertices by its global matrix. A mesh referenced by
    /// several nodes contributes once per reference.
    pub fn calc_bounds(&mut self) {
        let mut bb = Aabox::EMPTY;
        for (matrix, mid) in self.instances() {
            for &v in &self.meshes[mid.0].vertices {
                bb.expand(matrix.transform_point3(v));
            }
        }
        self.aabox = bb;
    }

    /// The world-space bounds, or `None` while no geometry has been added
    /// (the box is still inverted).
    pub fn bounds(&self) -> Option<Aabox> {
        self.aabox.is_valid().then_some(self.aabox)
    }

    /// Bake every node's global transform into its meshes (positions by the
    /// matrix, normals/tangents by its inverse-transpose) and reset all
    /// node matrices to identity. A mesh referenced by more than one node
    /// is cloned per extra reference first, so each instance folds exactly
    /// one transform in.
    pub fn apply_xform(&mut self) {
        self.update_xform();

        let mut seen = vec![false; self.meshes.len()];
        for ni in 0..self.nodes.len() {
            for si in 0..self.nodes[ni].meshes.len() {
                let mid = self.nodes[ni].meshes[si];
                if seen[mid.0] {
                    let clone = self.meshes[mid.0].clone();
                    let new_id = MeshId(self.meshes.len());
                    self.meshes.push(clone);
                    seen.push(false);
                    self.nodes[ni].meshes[si] = new_id;
                } else {
                    seen[mid.0] = true;
                }
            }
        }

        for ni in 0..self.nodes.len() {
            let global = self.nodes[ni].global_matrix;
            let mesh_ids = self.nodes[ni].meshes.clone();
            for mid in mesh_ids {
                self.meshes[mid.0].transform(&global);
            }
            self.nodes[ni].matrix = Mat4::IDENTITY;
            self.nodes[ni].global_matrix = Mat4::IDENTITY;
        }

        self.calc_bounds();
    }

    /// Run the selected post-load processing, then propagate transforms and
    /// recompute bounds.
    pub fn postprocess(&mut self, opts: PostProcess) {
        for mesh in &mut self.meshes {
            if opts.gen_tangents {
                if mesh.normals.is_empty() {
                    mesh.calc_normals();
                }
                mesh.calc_tangents();
            } else if opts.gen_normals && mesh.normals.is_empty() {
                mesh.calc_normals();
            }
        }
        self.update_xform();
        if opts.apply_xform {
            self.apply_xform();
        }
        self.calc_bounds();
    }

    // ------------------------------------------------------------------
    // Asset paths
    // ------------------------------------------------------------------

    /// Resolve a logical asset name (texture, material library, external
    /// buffer). The first lookup tries `<source dir>/<name>` then `<name>`
    /// and caches the winner; later lookups hit the cache.
    pub fn find_asset(&mut self, name: &str) -> PathBuf {
        if let Some(found) = self.assets.get(name) {
            return found.clone();
        }
        let resolved = match &self.dir {
            Some(dir) => {
                let joined = dir.join(name);
                if joined.exists() {
                    joined
                } else {
                    PathBuf::from(name)
                }
            }
            None => PathBuf::from(name),
        };
        self.assets.insert(name.to_string(), resolved.clone());
        resolved
    }
}
