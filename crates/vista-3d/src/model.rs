use crate::bounds::Aabb;
use crate::context::WgpuFrameContext;
use crate::mesh::{DrawMesh, SceneMesh};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use wgpu::util::DeviceExt;
use wgpu::*;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [VertexAttribute; 3] =
        vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> VertexBufferLayout<'static> {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

pub struct GpuMesh {
    pub vbuf: Buffer,
    pub ibuf: Buffer,
    pub index_count: u32,
    pub material_id: usize,
    pub bounds: Aabb,
}

impl GpuMesh {
    pub fn new(
        device: &Device,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
        material_id: usize,
        bounds: Aabb,
    ) -> Self {
        let vbuf = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some(&format!("{label}_vertices")),
            contents: bytemuck::cast_slice(vertices),
            usage: BufferUsages::VERTEX,
        });
        let ibuf = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some(&format!("{label}_indices")),
            contents: bytemuck::cast_slice(indices),
            usage: BufferUsages::INDEX,
        });
        Self {
            vbuf,
            ibuf,
            index_count: indices.len() as u32,
            material_id,
            bounds,
        }
    }
}

pub struct Material {
    pub bind_group: BindGroup,
    pub base_color: Vec4,
    _texture: Texture,
    _factor_buf: Buffer,
}

/// Uploads an RGBA8 base-colour image and builds the material bind group.
pub fn create_material(
    device: &Device,
    queue: &Queue,
    material_bgl: &BindGroupLayout,
    rgba: &[u8],
    width: u32,
    height: u32,
    base_color: Vec4,
) -> Material {
    let size = Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&TextureDescriptor {
        label: Some("base_color"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        rgba,
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&TextureViewDescriptor::default());
    let sampler = device.create_sampler(&SamplerDescriptor {
        label: Some("base_color_sampler"),
        address_mode_u: AddressMode::Repeat,
        address_mode_v: AddressMode::Repeat,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        ..Default::default()
    });
    let factor_buf = device.create_buffer_init(&util::BufferInitDescriptor {
        label: Some("base_color_factor"),
        contents: bytemuck::cast_slice(&base_color.to_array()),
        usage: BufferUsages::UNIFORM,
    });
    let bind_group = device.create_bind_group(&BindGroupDescriptor {
        label: Some("material_bg"),
        layout: material_bgl,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::TextureView(&view),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::Sampler(&sampler),
            },
            BindGroupEntry {
                binding: 2,
                resource: factor_buf.as_entire_binding(),
            },
        ],
    });

    Material {
        bind_group,
        base_color,
        _texture: texture,
        _factor_buf: factor_buf,
    }
}

/// A loaded mesh file: its primitives, their materials and the frustum
/// flags from the last culling pass.
pub struct Model {
    pub meshes: Vec<GpuMesh>,
    pub materials: Vec<Material>,
    in_frustum: Vec<bool>,
}

impl Model {
    pub fn new(meshes: Vec<GpuMesh>, materials: Vec<Material>) -> Self {
        let in_frustum = vec![true; meshes.len()];
        Self {
            meshes,
            materials,
            in_frustum,
        }
    }

    pub fn visible_count(&self) -> usize {
        self.in_frustum.iter().filter(|v| **v).count()
    }
}

impl SceneMesh for Model {
    fn is_loaded(&self) -> bool {
        !self.meshes.is_empty()
    }

    fn compute_in_frustum_flags(&mut self, world_view_proj: &Mat4) {
        for (flag, mesh) in self.in_frustum.iter_mut().zip(&self.meshes) {
            *flag = mesh.bounds.intersects_clip(world_view_proj);
        }
    }
}

impl<'a, 'p> DrawMesh<WgpuFrameContext<'a, 'p>> for Model {
    fn render(&self, ctx: &mut WgpuFrameContext<'a, 'p>, _pass_index: u32) {
        if !ctx.bind_constants(0) {
            return;
        }
        let pass = ctx.pass();
        for (mesh, _) in self.meshes.iter().zip(&self.in_frustum).filter(|(_, v)| **v) {
            let Some(mat) = self
                .materials
                .get(mesh.material_id)
                .or_else(|| self.materials.last())
            else {
                continue;
            };
            pass.set_bind_group(1, &mat.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vbuf.slice(..));
            pass.set_index_buffer(mesh.ibuf.slice(..), IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}
