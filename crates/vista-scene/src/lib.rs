mod error;
mod graph;

pub use error::SceneError;
pub use graph::{MeshId, SceneGraph};
