//! Core scene model for the scenefile workspace.
//!
//! This crate holds the in-memory representation shared by every format
//! codec: meshes with parallel attribute arrays, materials with texture
//! maps, a transform-node hierarchy with derived global matrices, and the
//! [`SceneFile`] container that owns all of them.
//!
//! Entities are created detached, populated, and then handed to a
//! [`SceneFile`] which owns them from that point on. Cross references
//! (mesh→material, node→mesh, node→child) are arena indices
//! ([`MeshId`], [`MaterialId`], [`NodeId`]), so they can never dangle.
//!
//! ```ignore
//! use scenefile_core::{Mesh, Node, SceneFile};
//! use scenefile_core::glam::Vec3;
//!
//! let mut scene = SceneFile::new();
//! let mut mesh = Mesh::new("tri");
//! mesh.add_vertex(Vec3::ZERO);
//! mesh.add_vertex(Vec3::X);
//! mesh.add_vertex(Vec3::Y);
//! mesh.add_triangle(0, 1, 2);
//! let mid = scene.add_mesh(mesh);
//! let nid = scene.add_node(Node::new("root"));
//! scene.node_add_mesh(nid, mid);
//! scene.update_xform();
//! scene.calc_bounds();
//! ```

pub mod aabox;
pub mod ids;
pub mod material;
pub mod mesh;
pub mod node;
pub mod scene;

pub use aabox::Aabox;
pub use ids::{MaterialId, MeshId, NodeId};
pub use material::{Material, MtlAttr, MtlAttrib, TexFilter, TexWrap, TextureMap};
pub use mesh::{Face, Mesh, MeshBuilder, Primitive};
pub use node::Node;
pub use scene::{PostProcess, SceneFile};

// Re-export the math crate so codecs and consumers use the same version.
pub use glam;
