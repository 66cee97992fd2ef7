use glam::Mat4;
use std::fmt::Display;
use std::path::PathBuf;
use vista_3d::MeshLoader;
use std::path::Path;
use vista_scene::{MeshId, SceneGraph};

#[derive(Clone, Debug)]
pub struct MeshSetup {
    pub path: PathBuf,
    pub position: Mat4,
}

/// What to put in the scene graph at startup.
#[derive(Clone, Debug)]
pub struct SceneSetup {
    pub world: Mat4,
    pub scaling: f32,
    pub meshes: Vec<MeshSetup>,
}

impl Default for SceneSetup {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            scaling: 1.0,
            meshes: Vec::new(),
        }
    }
}

/// Restarts `scene` with the setup's basis and adds every listed mesh.
/// Meshes that fail to load are logged and skipped. Returns how many
/// were skipped.
pub fn populate_scene<L>(scene: &mut SceneGraph<L::Mesh>, loader: &L, setup: &SceneSetup) -> usize
where
    L: MeshLoader,
    L::Error: Display,
{
    scene.start_scene(setup.world, setup.scaling);
    let mut failed = 0;
    for mesh in &setup.meshes {
        match scene.add_at(loader, &mesh.path, mesh.position) {
            Ok(id) => log::info!("{} -> {}", mesh.path.display(), id),
            Err(err) => {
                log::error!("failed to load {}: {err:#}", mesh.path.display());
                failed += 1;
            }
        }
    }
    failed
}

/// Adds one mesh to a running scene. On success the mesh is appended to
/// `setup`, so a later repopulate keeps it, and its placement to
/// `placements`. On failure nothing changes.
pub fn import_mesh<L>(
    scene: &mut SceneGraph<L::Mesh>,
    loader: &L,
    setup: &mut SceneSetup,
    placements: &mut Vec<Mat4>,
    path: &Path,
    position: Mat4,
) -> Result<MeshId, L::Error>
where
    L: MeshLoader,
{
    let id = scene.add_at(loader, path, position)?;
    if let Some(placement) = scene.placement(id) {
        placements.push(placement);
    }
    setup.meshes.push(MeshSetup {
        path: path.to_path_buf(),
        position,
    });
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use vista_3d::SceneMesh;

    struct Stub;

    impl SceneMesh for Stub {
        fn is_loaded(&self) -> bool {
            true
        }

        fn compute_in_frustum_flags(&mut self, _: &Mat4) {}
    }

    struct StubLoader;

    impl MeshLoader for StubLoader {
        type Mesh = Stub;
        type Error = String;

        fn load(&self, path: &Path) -> Result<Stub, String> {
            if path.extension().is_some_and(|e| e == "glb") {
                Ok(Stub)
            } else {
                Err(format!("unsupported file {}", path.display()))
            }
        }
    }

    #[test]
    fn skips_failed_meshes_and_keeps_the_rest() {
        let setup = SceneSetup {
            world: Mat4::from_translation(Vec3::Y),
            scaling: 2.0,
            meshes: vec![
                MeshSetup {
                    path: "a.glb".into(),
                    position: Mat4::IDENTITY,
                },
                MeshSetup {
                    path: "notes.txt".into(),
                    position: Mat4::IDENTITY,
                },
                MeshSetup {
                    path: "b.glb".into(),
                    position: Mat4::from_translation(Vec3::X),
                },
            ],
        };
        let mut scene = SceneGraph::new();
        scene.start_scene(Mat4::IDENTITY, 1.0);

        let failed = populate_scene(&mut scene, &StubLoader, &setup);

        assert_eq!(failed, 1);
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.scene_scaling(), 2.0);
        assert!(scene.is_loaded());
    }

    #[test]
    fn repopulating_replaces_previous_contents() {
        let mut setup = SceneSetup::default();
        setup.meshes.push(MeshSetup {
            path: "a.glb".into(),
            position: Mat4::IDENTITY,
        });
        let mut scene = SceneGraph::new();
        populate_scene(&mut scene, &StubLoader, &setup);
        populate_scene(&mut scene, &StubLoader, &setup);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn imported_mesh_is_placed_and_remembered() {
        let mut setup = SceneSetup {
            world: Mat4::from_translation(Vec3::Y),
            ..SceneSetup::default()
        };
        let mut scene = SceneGraph::new();
        populate_scene(&mut scene, &StubLoader, &setup);
        let mut placements = Vec::new();
        let position = Mat4::from_translation(Vec3::X);

        let id = import_mesh(
            &mut scene,
            &StubLoader,
            &mut setup,
            &mut placements,
            Path::new("crate.glb"),
            position,
        )
        .unwrap();

        assert_eq!(scene.len(), 1);
        assert_eq!(placements, vec![position * Mat4::from_translation(Vec3::Y)]);
        assert_eq!(scene.placement(id), Some(placements[0]));
        assert_eq!(setup.meshes.len(), 1);
        assert_eq!(setup.meshes[0].path, Path::new("crate.glb"));

        populate_scene(&mut scene, &StubLoader, &setup);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn failed_import_changes_nothing() {
        let mut setup = SceneSetup::default();
        let mut scene = SceneGraph::new();
        let mut placements = Vec::new();

        let err = import_mesh(
            &mut scene,
            &StubLoader,
            &mut setup,
            &mut placements,
            Path::new("notes.txt"),
            Mat4::IDENTITY,
        )
        .unwrap_err();

        assert_eq!(err, "unsupported file notes.txt");
        assert!(scene.is_empty());
        assert!(placements.is_empty());
        assert!(setup.meshes.is_empty());
    }
}
