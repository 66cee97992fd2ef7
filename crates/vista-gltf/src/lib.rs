mod import;
mod loader;

pub use import::{ImportedMaterial, ImportedModel, ImportedPrimitive, import_gltf};
pub use loader::{GltfLoader, load_gltf_model};
