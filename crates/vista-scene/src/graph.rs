use crate::error::SceneError;
use glam::Mat4;
use std::fmt;
use std::path::Path;
use vista_3d::{ConstantsContext, DrawMesh, FrameParams, MeshLoader, PerFrameConstants, SceneMesh};

/// Position of an entity in its scene graph.
///
/// Entities are only ever appended and the graph is only cleared as a
/// whole, so an id stays valid until the next `start_scene` or `destroy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(usize);

impl MeshId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct SceneEntry<M> {
    mesh: M,
    placement: Mat4,
}

/// An ordered set of meshes sharing one world basis.
pub struct SceneGraph<M> {
    world_matrix: Mat4,
    scene_scaling: f32,
    entries: Vec<SceneEntry<M>>,
}

impl<M> Default for SceneGraph<M> {
    fn default() -> Self {
        Self {
            world_matrix: Mat4::IDENTITY,
            scene_scaling: 1.0,
            entries: Vec::new(),
        }
    }
}

impl<M> SceneGraph<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every entity and sets the basis applied to subsequent `add`s.
    ///
    /// `scene_scaling` is recorded only. Fold any scale into
    /// `world_matrix`.
    pub fn start_scene(&mut self, world_matrix: Mat4, scene_scaling: f32) {
        log::debug!(
            "starting scene: dropping {} entities, scaling {}",
            self.entries.len(),
            scene_scaling
        );
        self.entries.clear();
        self.world_matrix = world_matrix;
        self.scene_scaling = scene_scaling;
    }

    /// Equivalent to [`add_at`](Self::add_at) with the identity position.
    pub fn add<L>(&mut self, loader: &L, path: impl AsRef<Path>) -> Result<MeshId, L::Error>
    where
        L: MeshLoader<Mesh = M>,
    {
        self.add_at(loader, path, Mat4::IDENTITY)
    }

    /// Loads a mesh and appends it, placed at `position` within the scene's
    /// world basis. A load error is returned as is and leaves the graph
    /// untouched.
    pub fn add_at<L>(
        &mut self,
        loader: &L,
        path: impl AsRef<Path>,
        position: Mat4,
    ) -> Result<MeshId, L::Error>
    where
        L: MeshLoader<Mesh = M>,
    {
        let path = path.as_ref();
        let mesh = loader.load(path)?;
        self.entries.push(SceneEntry {
            mesh,
            placement: position * self.world_matrix,
        });
        let id = MeshId(self.entries.len() - 1);
        log::debug!("added {} from {}", id, path.display());
        Ok(id)
    }

    /// Applies `translation` ahead of the entity's current placement.
    pub fn translate_mesh(&mut self, id: MeshId, translation: Mat4) -> Result<(), SceneError> {
        let entry = self.entry_mut("translate_mesh", id)?;
        entry.placement *= translation;
        log::trace!("translated {}", id);
        Ok(())
    }

    pub fn set_mesh_position(&mut self, id: MeshId, new_position: Mat4) -> Result<(), SceneError> {
        let entry = self.entry_mut("set_mesh_position", id)?;
        entry.placement = new_position;
        log::trace!("repositioned {}", id);
        Ok(())
    }

    /// Drops every entity. The graph can be refilled afterwards.
    pub fn destroy(&mut self) {
        log::debug!("destroying scene with {} entities", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mesh_count(&self) -> usize {
        self.entries.len()
    }

    pub fn placement_count(&self) -> usize {
        self.entries.len()
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }

    pub fn scene_scaling(&self) -> f32 {
        self.scene_scaling
    }

    pub fn placement(&self, id: MeshId) -> Option<Mat4> {
        self.entries.get(id.0).map(|e| e.placement)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&M> {
        self.entries.get(id.0).map(|e| &e.mesh)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &M, Mat4)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (MeshId(i), &e.mesh, e.placement))
    }

    fn entry_mut(
        &mut self,
        operation: &'static str,
        id: MeshId,
    ) -> Result<&mut SceneEntry<M>, SceneError> {
        let len = self.entries.len();
        self.entries.get_mut(id.0).ok_or_else(|| {
            log::warn!("{operation}: {id} out of range ({len} entries)");
            SceneError::InvalidArgument { operation, id, len }
        })
    }
}

impl<M: SceneMesh> SceneGraph<M> {
    /// False for an empty graph or while any mesh is still loading.
    pub fn is_loaded(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.mesh.is_loaded())
    }

    /// Hands each mesh its `world * view * projection` transform so it can
    /// record what is visible. Call before `render` each frame.
    pub fn compute_in_frustum_flags(&mut self, camera_view_proj: &Mat4) {
        for entry in &mut self.entries {
            let world_view_proj = *camera_view_proj * entry.placement;
            entry.mesh.compute_in_frustum_flags(&world_view_proj);
        }
    }

    /// Draws every entity in order. Before each draw the shared constants
    /// record is mapped, fully rewritten for that entity and unmapped.
    ///
    /// No culling happens here; meshes act on their own frustum flags.
    pub fn render<C>(
        &self,
        ctx: &mut C,
        camera_view: &Mat4,
        camera_proj: &Mat4,
        frame: &FrameParams,
    ) where
        C: ConstantsContext + ?Sized,
        M: DrawMesh<C>,
    {
        let view_proj = *camera_proj * *camera_view;
        for entry in &self.entries {
            let constants = ctx.map_constants();
            *constants = PerFrameConstants::for_draw(
                view_proj * entry.placement,
                *camera_view * entry.placement,
                view_proj,
                *camera_proj,
                frame,
            );
            ctx.unmap_constants();
            entry.mesh.render(ctx, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::cell::Cell;

    struct Flagged {
        loaded: bool,
        loaded_checks: Cell<usize>,
        last_wvp: Option<Mat4>,
    }

    impl SceneMesh for Flagged {
        fn is_loaded(&self) -> bool {
            self.loaded_checks.set(self.loaded_checks.get() + 1);
            self.loaded
        }

        fn compute_in_frustum_flags(&mut self, world_view_proj: &Mat4) {
            self.last_wvp = Some(*world_view_proj);
        }
    }

    /// Loads meshes whose loaded state is taken from the file name.
    struct NameLoader {
        calls: Cell<usize>,
    }

    impl MeshLoader for NameLoader {
        type Mesh = Flagged;
        type Error = String;

        fn load(&self, path: &Path) -> Result<Flagged, String> {
            self.calls.set(self.calls.get() + 1);
            match path.to_str() {
                Some("missing.mesh") => Err("no such file".to_string()),
                Some(name) => Ok(Flagged {
                    loaded: !name.starts_with("pending"),
                    loaded_checks: Cell::new(0),
                    last_wvp: None,
                }),
                None => Err("bad path".to_string()),
            }
        }
    }

    fn loader() -> NameLoader {
        NameLoader {
            calls: Cell::new(0),
        }
    }

    #[test]
    fn empty_graph_is_not_loaded() {
        let graph = SceneGraph::<Flagged>::new();
        assert!(!graph.is_loaded());
    }

    #[test]
    fn one_pending_mesh_makes_graph_not_loaded() {
        let l = loader();
        let mut graph = SceneGraph::new();
        graph.start_scene(Mat4::IDENTITY, 1.0);
        graph.add(&l, "a.mesh").unwrap();
        assert!(graph.is_loaded());
        graph.add(&l, "pending.mesh").unwrap();
        assert!(!graph.is_loaded());
    }

    #[test]
    fn is_loaded_stops_at_first_pending_mesh() {
        let l = loader();
        let mut graph = SceneGraph::new();
        let first = graph.add(&l, "a.mesh").unwrap();
        let pending = graph.add(&l, "pending.mesh").unwrap();
        let after = graph.add(&l, "c.mesh").unwrap();

        assert!(!graph.is_loaded());

        let checks = |id| graph.mesh(id).unwrap().loaded_checks.get();
        assert_eq!(checks(first), 1);
        assert_eq!(checks(pending), 1);
        assert_eq!(checks(after), 0);
    }

    #[test]
    fn add_returns_sequential_ids() {
        let l = loader();
        let mut graph = SceneGraph::new();
        assert_eq!(graph.add(&l, "a.mesh"), Ok(MeshId::new(0)));
        assert_eq!(graph.add(&l, "b.mesh"), Ok(MeshId::new(1)));
        assert_eq!(graph.mesh_count(), graph.placement_count());
    }

    #[test]
    fn failed_load_is_passed_through_and_leaves_graph_unchanged() {
        let l = loader();
        let mut graph = SceneGraph::new();
        graph.add(&l, "a.mesh").unwrap();
        let err = graph.add(&l, "missing.mesh").unwrap_err();
        assert_eq!(err, "no such file");
        assert_eq!(graph.len(), 1);
        assert_eq!(l.calls.get(), 2);
    }

    #[test]
    fn placement_composes_world_basis() {
        let l = loader();
        let mut graph = SceneGraph::new();
        let world = Mat4::from_scale(Vec3::splat(2.0));
        let position = Mat4::from_translation(Vec3::X);
        graph.start_scene(world, 2.0);
        let id = graph.add_at(&l, "a.mesh", position).unwrap();

        let placement = graph.placement(id).unwrap();
        assert!(placement.abs_diff_eq(position * world, 1e-6));
        // The world basis applies first, then the local offset.
        assert!(placement.transform_point3(Vec3::ONE).abs_diff_eq(Vec3::new(3.0, 2.0, 2.0), 1e-6));
    }

    #[test]
    fn frustum_flags_receive_view_proj_times_placement() {
        let l = loader();
        let mut graph = SceneGraph::new();
        let t = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let id = graph.add_at(&l, "a.mesh", t).unwrap();
        let vp = Mat4::perspective_rh(1.0, 1.0, 0.1, 10.0);

        graph.compute_in_frustum_flags(&vp);

        let got = graph.mesh(id).unwrap().last_wvp.unwrap();
        assert!(got.abs_diff_eq(vp * t, 1e-6));
    }

    #[test]
    fn error_message_names_the_operation() {
        let mut graph = SceneGraph::<Flagged>::new();
        let err = graph
            .set_mesh_position(MeshId::new(3), Mat4::IDENTITY)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "in set_mesh_position: mesh #3 is not in the scene graph (0 entries)"
        );
    }
}
