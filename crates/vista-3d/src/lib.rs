pub mod bounds;
pub mod constants;
pub mod context;
pub mod depth;
pub mod mesh;
pub mod model;
pub mod pipeline;
pub mod render;

pub use bounds::Aabb;
pub use constants::{ConstantsRing, FrameParams, PerFrameConstants, SlotCursor, UiConstants};
pub use context::WgpuFrameContext;
pub use depth::create_depth;
pub use mesh::{ConstantsContext, DrawMesh, MeshLoader, SceneMesh};
pub use model::{GpuMesh, Material, Model, Vertex, create_material};
pub use pipeline::{Layouts, create_bind_group_layouts, create_pipeline};
pub use render::{Renderer3D, ScenePass};
