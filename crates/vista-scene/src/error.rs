use crate::graph::MeshId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("in {operation}: mesh {id} is not in the scene graph ({len} entries)")]
    InvalidArgument {
        operation: &'static str,
        id: MeshId,
        len: usize,
    },
}
