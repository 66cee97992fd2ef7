//! The seams between a scene container and the resources it drives.

use crate::constants::PerFrameConstants;
use glam::Mat4;
use std::path::Path;

/// A resource owned by a scene.
pub trait SceneMesh {
    fn is_loaded(&self) -> bool;

    /// Records which parts of the mesh fall inside the clip volume of
    /// `world_view_proj`. The result is kept on the mesh and consulted by
    /// the next draw.
    fn compute_in_frustum_flags(&mut self, world_view_proj: &Mat4);
}

/// A scene mesh that can issue its own draw calls against context `C`.
pub trait DrawMesh<C: ?Sized>: SceneMesh {
    fn render(&self, ctx: &mut C, pass_index: u32);
}

/// Creates meshes from files. Implementations carry whatever device handles
/// they need.
pub trait MeshLoader {
    type Mesh;
    type Error;

    fn load(&self, path: &Path) -> Result<Self::Mesh, Self::Error>;
}

/// Write access to the shared per-draw constants.
///
/// `map_constants` discards the previous contents. The record must be
/// unmapped before the draw that reads it is issued.
pub trait ConstantsContext {
    fn map_constants(&mut self) -> &mut PerFrameConstants;
    fn unmap_constants(&mut self);
}
