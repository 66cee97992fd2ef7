mod setup;

pub use setup::{MeshSetup, SceneSetup, import_mesh, populate_scene};

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use glam::{Mat4, Vec3};
use winit::{
    dpi::PhysicalSize,
    event::{DeviceEvent, WindowEvent},
    event_loop::EventLoopProxy,
    window::Window,
};

use wgpu::{
    Adapter, CommandEncoderDescriptor, Device, ExperimentalFeatures, Features, Instance, Limits,
    MemoryHints, PowerPreference, Queue, RequestAdapterOptions, Surface, SurfaceConfiguration,
    SurfaceError, Texture, TextureFormat, TextureView, TextureViewDescriptor,
};

pub type RcWindow = std::sync::Arc<Window>;

use vista_3d::{
    FrameParams, Layouts, Model, Renderer3D, ScenePass, UiConstants, WgpuFrameContext,
    create_bind_group_layouts,
};
use vista_camera::{CameraController, FlyCamera};
use vista_gltf::GltfLoader;
use vista_scene::{MeshId, SceneError, SceneGraph};

/// Offscreen colour target the scene is drawn into.
pub struct Viewport {
    pub color: Texture,
    pub color_view: TextureView,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl Viewport {
    pub fn new(device: &Device, format: TextureFormat, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("viewport_color"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let color_view = color.create_view(&TextureViewDescriptor::default());

        Self {
            color,
            color_view,
            width,
            height,
            format,
        }
    }

    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        *self = Viewport::new(device, self.format, width, height);
    }
}

/// Startup parameters for [`create_graphics`].
pub struct RuntimeSetup {
    pub scene: SceneSetup,
    pub camera: FlyCamera,
    pub camera_speed: f32,
}

pub async fn create_graphics(
    window: RcWindow,
    proxy: EventLoopProxy<Graphics>,
    setup: RuntimeSetup,
) -> anyhow::Result<()> {
    let instance = Instance::default();
    let surface = instance
        .create_surface(std::sync::Arc::clone(&window))
        .context("could not create a surface for the window")?;

    let adapter = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .context("could not get an adapter (GPU)")?;
    let info = adapter.get_info();
    log::info!("using adapter {} ({:?})", info.name, info.backend);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: Features::empty(),
            required_limits: Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
            memory_hints: MemoryHints::Performance,
            trace: Default::default(),
            experimental_features: ExperimentalFeatures::disabled(),
        })
        .await
        .context("failed to get device")?;

    let size = window.inner_size();
    let surface_config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .context("surface is not supported by the adapter")?;
    surface.configure(&device, &surface_config);

    let layouts: Layouts = create_bind_group_layouts(&device);

    let viewport = Viewport::new(
        &device,
        surface_config.format,
        surface_config.width,
        surface_config.height,
    );
    let renderer = Renderer3D::new(
        &device,
        surface_config.format,
        viewport.width,
        viewport.height,
        &layouts,
    );

    let mut scene = SceneGraph::new();
    let failed = populate_scene(
        &mut scene,
        &GltfLoader::new(&device, &queue, &layouts.material_bgl),
        &setup.scene,
    );
    log::info!(
        "scene ready: {} meshes, {} failed to load",
        scene.len(),
        failed
    );

    let gfx = Graphics {
        window,
        viewport,
        instance,
        surface,
        surface_config,
        adapter,
        device,
        queue,
        layouts,
        renderer,
        initial_placements: placements_of(&scene),
        scene,
        scene_setup: setup.scene,
        camera: setup.camera,
        controller: CameraController::new(setup.camera_speed),
        ui_constants: UiConstants::default(),
        last_frame_time: Instant::now(),
    };

    let _ = proxy.send_event(gfx);
    Ok(())
}

fn placements_of(scene: &SceneGraph<Model>) -> Vec<Mat4> {
    scene.iter().map(|(_, _, placement)| placement).collect()
}

/// One frame's draw of the scene graph. The ring is sized from the same
/// graph that records into it.
struct SceneDraw<'s> {
    scene: &'s SceneGraph<Model>,
    view: Mat4,
    proj: Mat4,
    frame: FrameParams,
}

impl ScenePass for SceneDraw<'_> {
    fn draw_count(&self) -> usize {
        self.scene.len()
    }

    fn record(&self, ctx: &mut WgpuFrameContext<'_, '_>) {
        self.scene.render(ctx, &self.view, &self.proj, &self.frame);
    }
}

#[allow(dead_code)]
pub struct Graphics {
    pub(crate) window: RcWindow,
    pub viewport: Viewport,
    instance: Instance,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    adapter: Adapter,
    device: Device,
    queue: Queue,
    layouts: Layouts,
    renderer: Renderer3D,
    scene: SceneGraph<Model>,
    scene_setup: SceneSetup,
    initial_placements: Vec<Mat4>,
    camera: FlyCamera,
    controller: CameraController,
    ui_constants: UiConstants,
    last_frame_time: Instant,
}

impl Graphics {
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn viewport_view(&self) -> &TextureView {
        &self.viewport.color_view
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface_config.width = new_size.width.max(1);
        self.surface_config.height = new_size.height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.viewport.resize(
            &self.device,
            self.surface_config.width,
            self.surface_config.height,
        );
        self.renderer
            .resize(&self.device, self.viewport.width, self.viewport.height);
    }

    /// Renders and presents one frame. Returns false when no surface
    /// texture could be acquired; `overlay` is not called then.
    pub fn draw<F>(&mut self, overlay: F) -> bool
    where
        F: FnOnce(&mut Self, &TextureView, &mut wgpu::CommandEncoder),
    {
        let now = Instant::now();
        let dt = (now - self.last_frame_time).as_secs_f32().min(0.1);
        self.last_frame_time = now;
        self.controller.update(&mut self.camera, dt);

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                log::warn!("surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return false;
            }
            Err(err) => {
                log::error!("failed to acquire next swap chain texture: {err}");
                return false;
            }
        };
        let swap_view = frame.texture.create_view(&TextureViewDescriptor::default());

        let (width, height) = (self.viewport.width, self.viewport.height);
        let view = self.camera.view();
        let proj = self.camera.projection(width, height);
        let (near, far) = self.camera.near_far();
        let params = FrameParams::new(near, far, width, height, self.ui_constants);

        self.scene.compute_in_frustum_flags(&(proj * view));

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        let pass = SceneDraw {
            scene: &self.scene,
            view,
            proj,
            frame: params,
        };
        self.renderer.render(
            &self.device,
            &self.queue,
            &mut encoder,
            &self.viewport.color_view,
            &pass,
        );
        overlay(self, &swap_view, &mut encoder);
        self.queue.submit(Some(encoder.finish()));
        frame.present();
        true
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        self.controller.handle_window_event(event);
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        self.controller.handle_device_event(event, &mut self.camera);
    }

    pub fn release_camera_keys(&mut self) {
        self.controller.release_all();
    }

    pub fn scene(&self) -> &SceneGraph<Model> {
        &self.scene
    }

    pub fn translate_mesh(&mut self, id: MeshId, offset: Vec3) -> Result<(), SceneError> {
        self.scene
            .translate_mesh(id, Mat4::from_translation(offset))
            .inspect_err(|err| log::error!("{err}"))
    }

    pub fn set_mesh_position(&mut self, id: MeshId, position: Mat4) -> Result<(), SceneError> {
        self.scene
            .set_mesh_position(id, position)
            .inspect_err(|err| log::error!("{err}"))
    }

    /// The placement `id` had when the scene was loaded.
    pub fn initial_position(&self, id: MeshId) -> Option<Mat4> {
        self.initial_placements.get(id.index()).copied()
    }

    /// Throws away the current scene and loads the startup setup again.
    pub fn reload_scene(&mut self) {
        let loader = GltfLoader::new(&self.device, &self.queue, &self.layouts.material_bgl);
        let failed = populate_scene(&mut self.scene, &loader, &self.scene_setup);
        self.initial_placements = placements_of(&self.scene);
        log::info!(
            "scene reloaded: {} meshes, {} failed to load",
            self.scene.len(),
            failed
        );
    }

    /// Loads `path` into the running scene at `position`. The mesh is
    /// kept by [`reload_scene`](Self::reload_scene).
    pub fn add_mesh(&mut self, path: &Path, position: Mat4) -> anyhow::Result<MeshId> {
        let loader = GltfLoader::new(&self.device, &self.queue, &self.layouts.material_bgl);
        let id = import_mesh(
            &mut self.scene,
            &loader,
            &mut self.scene_setup,
            &mut self.initial_placements,
            path,
            position,
        )
        .inspect_err(|err| log::error!("failed to load {}: {err:#}", path.display()))?;
        log::info!("{} -> {}", path.display(), id);
        Ok(id)
    }

    pub fn ui_constants_mut(&mut self) -> &mut UiConstants {
        &mut self.ui_constants
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn surface_config(&self) -> &SurfaceConfiguration {
        &self.surface_config
    }

    pub fn camera(&self) -> &FlyCamera {
        &self.camera
    }
}
