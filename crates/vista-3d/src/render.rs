use crate::constants::ConstantsRing;
use crate::context::WgpuFrameContext;
use crate::depth::create_depth;
use crate::pipeline::{Layouts, create_pipeline};
use wgpu::*;

const INITIAL_CONSTANT_SLOTS: u32 = 64;

/// A set of draws recorded into the scene pass.
///
/// `draw_count` must match the number of constants maps `record` makes;
/// the ring is sized from it before the pass opens.
pub trait ScenePass {
    fn draw_count(&self) -> usize;
    fn record(&self, ctx: &mut WgpuFrameContext<'_, '_>);
}

pub struct Renderer3D {
    pub render_pipeline: RenderPipeline,
    pub depth_view: TextureView,
    pub depth_tex: Texture,
    pub constants: ConstantsRing,
    constants_bgl: BindGroupLayout,
}

impl Renderer3D {
    pub fn new(
        device: &Device,
        surface_format: TextureFormat,
        width: u32,
        height: u32,
        layouts: &Layouts,
    ) -> Self {
        let (depth_view, depth_tex) = create_depth(device, width, height);
        let render_pipeline = create_pipeline(device, surface_format, layouts);
        let constants = ConstantsRing::new(device, &layouts.constants_bgl, INITIAL_CONSTANT_SLOTS);

        Self {
            render_pipeline,
            depth_view,
            depth_tex,
            constants,
            constants_bgl: layouts.constants_bgl.clone(),
        }
    }

    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        let (dv, dt) = create_depth(device, width, height);
        self.depth_view = dv;
        self.depth_tex = dt;
    }

    /// Opens the scene pass, sized for `scene.draw_count()` draws, and
    /// lets `scene` record into it.
    pub fn render<S>(
        &mut self,
        device: &Device,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        target_view: &TextureView,
        scene: &S,
    ) where
        S: ScenePass + ?Sized,
    {
        self.constants
            .ensure_capacity(device, &self.constants_bgl, scene.draw_count());

        let mut r_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: target_view,
                depth_slice: None,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(Color {
                        r: 0.02,
                        g: 0.02,
                        b: 0.03,
                        a: 1.0,
                    }),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(1.0),
                    store: StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        r_pass.set_pipeline(&self.render_pipeline);

        let mut ctx = WgpuFrameContext::new(queue, &self.constants, &mut r_pass);
        scene.record(&mut ctx);
        if ctx.draws_dropped() > 0 {
            log::warn!(
                "scene pass dropped {} of {} draws",
                ctx.draws_dropped(),
                scene.draw_count()
            );
        }
        log::trace!("scene pass recorded {} draws", ctx.draws_recorded());
    }
}
