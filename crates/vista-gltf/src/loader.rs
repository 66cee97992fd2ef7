use crate::import::import_gltf;
use anyhow::Result;
use std::path::Path;
use vista_3d::{GpuMesh, MeshLoader, Model, create_material};
use wgpu::{BindGroupLayout, Device, Queue};

/// Loads `.gltf`/`.glb` files straight onto the GPU.
pub struct GltfLoader<'a> {
    device: &'a Device,
    queue: &'a Queue,
    material_bgl: &'a BindGroupLayout,
}

impl<'a> GltfLoader<'a> {
    pub fn new(device: &'a Device, queue: &'a Queue, material_bgl: &'a BindGroupLayout) -> Self {
        Self {
            device,
            queue,
            material_bgl,
        }
    }
}

impl MeshLoader for GltfLoader<'_> {
    type Mesh = Model;
    type Error = anyhow::Error;

    fn load(&self, path: &Path) -> Result<Model> {
        load_gltf_model(self.device, self.queue, self.material_bgl, path)
    }
}

pub fn load_gltf_model(
    device: &Device,
    queue: &Queue,
    material_bgl: &BindGroupLayout,
    path: &Path,
) -> Result<Model> {
    let imported = import_gltf(path)?;

    let materials = imported
        .materials
        .iter()
        .map(|m| {
            create_material(
                device,
                queue,
                material_bgl,
                &m.rgba,
                m.width,
                m.height,
                m.base_color,
            )
        })
        .collect();

    let meshes: Vec<GpuMesh> = imported
        .primitives
        .iter()
        .map(|p| {
            GpuMesh::new(
                device,
                &p.name,
                &p.vertices,
                &p.indices,
                p.material_id,
                p.bounds,
            )
        })
        .collect();

    log::info!(
        "loaded {} ({} primitives, {} materials)",
        path.display(),
        meshes.len(),
        imported.materials.len()
    );

    Ok(Model::new(meshes, materials))
}
