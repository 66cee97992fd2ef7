//! CPU side of glTF loading: flattens the node hierarchy into
//! world-space primitives and decodes base-colour images to RGBA8.

use anyhow::{Context, Result};
use glam::{Mat3, Mat4, Vec3, Vec4};
use gltf::image::Format;
use gltf::mesh::Mode;
use std::path::Path;
use vista_3d::{Aabb, Vertex};

pub struct ImportedPrimitive {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material_id: usize,
    pub bounds: Aabb,
}

pub struct ImportedMaterial {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub base_color: Vec4,
}

impl ImportedMaterial {
    fn white(base_color: Vec4) -> Self {
        Self {
            rgba: vec![255; 4],
            width: 1,
            height: 1,
            base_color,
        }
    }
}

/// Triangle primitives of the default scene. `materials` always ends with a
/// plain white material that primitives without one fall back to.
pub struct ImportedModel {
    pub primitives: Vec<ImportedPrimitive>,
    pub materials: Vec<ImportedMaterial>,
}

pub fn import_gltf(path: &Path) -> Result<ImportedModel> {
    let (doc, buffers, images) =
        gltf::import(path).with_context(|| format!("failed to import {}", path.display()))?;

    let mut materials: Vec<ImportedMaterial> = doc
        .materials()
        .map(|m| {
            let pbr = m.pbr_metallic_roughness();
            let factor = Vec4::from_array(pbr.base_color_factor());
            pbr.base_color_texture()
                .and_then(|info| images.get(info.texture().source().index()))
                .and_then(|img| to_rgba8(img).map(|rgba| (rgba, img.width, img.height)))
                .map(|(rgba, width, height)| ImportedMaterial {
                    rgba,
                    width,
                    height,
                    base_color: factor,
                })
                .unwrap_or_else(|| ImportedMaterial::white(factor))
        })
        .collect();
    let fallback = materials.len();
    materials.push(ImportedMaterial::white(Vec4::ONE));

    let scene = doc
        .default_scene()
        .or_else(|| doc.scenes().next())
        .with_context(|| format!("{} has no scene", path.display()))?;

    let mut primitives = Vec::new();
    let mut stack: Vec<(gltf::Node, Mat4)> = scene.nodes().map(|n| (n, Mat4::IDENTITY)).collect();
    while let Some((node, parent)) = stack.pop() {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            for prim in mesh.primitives() {
                if prim.mode() != Mode::Triangles {
                    log::debug!("skipping non-triangle primitive in {:?}", mesh.name());
                    continue;
                }
                let reader = prim.reader(|b| buffers.get(b.index()).map(|d| d.0.as_slice()));
                let Some(positions) = reader.read_positions() else {
                    continue;
                };
                let positions: Vec<[f32; 3]> = positions.collect();
                let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(|n| n.collect());
                let uvs: Option<Vec<[f32; 2]>> =
                    reader.read_tex_coords(0).map(|t| t.into_f32().collect());
                let indices: Vec<u32> = match reader.read_indices() {
                    Some(i) => i.into_u32().collect(),
                    None => (0..positions.len() as u32).collect(),
                };

                let name = format!(
                    "{}#{}",
                    mesh.name().unwrap_or("mesh"),
                    prim.index()
                );
                let material_id = prim.material().index().unwrap_or(fallback);
                primitives.push(build_primitive(
                    name,
                    &world,
                    &positions,
                    normals.as_deref(),
                    uvs.as_deref(),
                    indices,
                    material_id,
                ));
            }
        }
        stack.extend(node.children().map(|c| (c, world)));
    }

    if primitives.is_empty() {
        log::warn!("{} contains no triangle primitives", path.display());
    }

    Ok(ImportedModel {
        primitives,
        materials,
    })
}

fn build_primitive(
    name: String,
    world: &Mat4,
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    uvs: Option<&[[f32; 2]]>,
    indices: Vec<u32>,
    material_id: usize,
) -> ImportedPrimitive {
    let normal_matrix = Mat3::from_mat4(*world).inverse().transpose();
    let world_positions: Vec<Vec3> = positions
        .iter()
        .map(|p| world.transform_point3(Vec3::from_array(*p)))
        .collect();
    let world_normals: Vec<Vec3> = match normals {
        Some(n) => n
            .iter()
            .map(|n| (normal_matrix * Vec3::from_array(*n)).normalize_or_zero())
            .collect(),
        None => smooth_normals(&world_positions, &indices),
    };

    let vertices = world_positions
        .iter()
        .zip(&world_normals)
        .enumerate()
        .map(|(i, (p, n))| Vertex {
            position: p.to_array(),
            normal: n.to_array(),
            uv: uvs.and_then(|u| u.get(i).copied()).unwrap_or([0.0, 0.0]),
        })
        .collect();

    let bounds = Aabb::from_points(world_positions.iter().copied())
        .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));

    ImportedPrimitive {
        name,
        vertices,
        indices,
        material_id,
        bounds,
    }
}

/// Area-weighted vertex normals for primitives that ship without any.
fn smooth_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut acc = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a.max(b).max(c) >= positions.len() {
            continue;
        }
        let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }
    acc.into_iter().map(|n| n.normalize_or(Vec3::Y)).collect()
}

fn to_rgba8(img: &gltf::image::Data) -> Option<Vec<u8>> {
    let px = &img.pixels;
    let rgba = match img.format {
        Format::R8G8B8A8 => px.clone(),
        Format::R8G8B8 => px
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        Format::R8G8 => px
            .chunks_exact(2)
            .flat_map(|c| [c[0], c[1], 0, 255])
            .collect(),
        Format::R8 => px.iter().flat_map(|&l| [l, l, l, 255]).collect(),
        other => {
            log::warn!("unsupported base colour format {other:?}, using white");
            return None;
        }
    };
    Some(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// One triangle at z = 0 in a node translated to z = 2, with no normals
    /// and no material.
    const TRIANGLE: &str = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [{ "nodes": [0] }],
  "nodes": [{ "mesh": 0, "translation": [0.0, 0.0, 2.0] }],
  "meshes": [{ "name": "tri", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
  "buffers": [{ "byteLength": 44, "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAABAAIAAAA=" }],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
  ]
}"#;

    fn write_fixture(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("vista-gltf-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn imports_triangle_in_world_space() {
        let path = write_fixture("triangle.gltf", TRIANGLE);
        let model = import_gltf(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(model.primitives.len(), 1);
        let prim = &model.primitives[0];
        assert_eq!(prim.name, "tri#0");
        assert_eq!(prim.indices, vec![0, 1, 2]);
        assert_eq!(prim.vertices[1].position, [1.0, 0.0, 2.0]);
        assert_eq!(prim.bounds.min, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(prim.bounds.max, Vec3::new(1.0, 1.0, 2.0));

        // Counter-clockwise in the XY plane faces +Z.
        assert!(Vec3::from_array(prim.vertices[0].normal).abs_diff_eq(Vec3::Z, 1e-6));

        // No materials in the file, so only the fallback exists.
        assert_eq!(model.materials.len(), 1);
        assert_eq!(prim.material_id, 0);
        assert_eq!(model.materials[0].rgba, vec![255, 255, 255, 255]);
    }

    #[test]
    fn missing_file_error_names_the_path() {
        let path = Path::new("definitely/not/here.glb");
        let err = import_gltf(path).err().unwrap();
        assert!(format!("{err:#}").contains("definitely/not/here.glb"));
    }

    #[test]
    fn rgb_images_are_expanded_to_rgba() {
        let img = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: Format::R8G8B8,
            width: 2,
            height: 1,
        };
        assert_eq!(
            to_rgba8(&img).unwrap(),
            vec![10, 20, 30, 255, 40, 50, 60, 255]
        );
    }

    #[test]
    fn degenerate_triangles_fall_back_to_up() {
        let p = [Vec3::ZERO, Vec3::ZERO, Vec3::ZERO];
        assert_eq!(smooth_normals(&p, &[0, 1, 2]), vec![Vec3::Y; 3]);
    }
}
