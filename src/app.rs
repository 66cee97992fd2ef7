use crate::config::WindowSection;
use egui::Sense;
use egui::load::SizedTexture;
use glam::{Mat4, Vec3};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use vista_runtime::{Graphics, RcWindow, RuntimeSetup, create_graphics};
use vista_scene::MeshId;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, ElementState, StartCause, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

enum State {
    Ready(ReadyState),
    Init(Option<(EventLoopProxy<Graphics>, RuntimeSetup)>),
}

struct ReadyState {
    gfx: Graphics,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    viewport_tex_id: egui::TextureId,
    pending_textures: PendingTextures,
}

/// egui texture changes not yet applied to the renderer. egui reports each
/// change once, so a frame that never reaches the GPU keeps its share for
/// the next one.
#[derive(Default)]
struct PendingTextures(egui::TexturesDelta);

impl PendingTextures {
    fn push(&mut self, delta: egui::TexturesDelta) {
        self.0.append(delta);
    }

    fn take(&mut self) -> egui::TexturesDelta {
        std::mem::take(&mut self.0)
    }
}

/// Scene changes requested from the UI, applied once the egui pass is done.
#[derive(Debug, Clone, PartialEq)]
enum SceneEdit {
    Translate(MeshId, Vec3),
    Reset(MeshId),
    Reload,
    AddMesh(PathBuf),
}

/// What the panels show about one entity.
struct EntityRow {
    id: MeshId,
    translation: Vec3,
    visible: usize,
    primitives: usize,
}

pub struct ViewerUi {
    pub show_debug_panel: bool,
    pub camera_active: bool,
    pub cursor_grab_request: Option<bool>,
    pub quit_requested: bool,
    selected: Option<MeshId>,
    nudge_step: f32,
    lighting_only: bool,
    face_normals: bool,
    show_add_mesh: bool,
    add_mesh_path: String,
    load_error: Option<String>,
    edits: Vec<SceneEdit>,
}

impl ViewerUi {
    pub fn new() -> Self {
        Self {
            show_debug_panel: true,
            camera_active: false,
            cursor_grab_request: None,
            quit_requested: false,
            selected: None,
            nudge_step: 0.25,
            lighting_only: false,
            face_normals: false,
            show_add_mesh: false,
            add_mesh_path: String::new(),
            load_error: None,
            edits: Vec::new(),
        }
    }
}

pub struct App {
    state: State,
    title: String,
    frame_time: Duration,
    render_target: Instant,
    ui: ViewerUi,
}

impl App {
    pub fn new(event_loop: &EventLoop<Graphics>, window: &WindowSection, setup: RuntimeSetup) -> Self {
        Self {
            state: State::Init(Some((event_loop.create_proxy(), setup))),
            title: window.title.clone(),
            frame_time: Duration::from_nanos(1_000_000_000 / window.fps.max(1)),
            render_target: Instant::now(),
            ui: ViewerUi::new(),
        }
    }

    fn init_egui_for_graphics(
        gfx: &Graphics,
    ) -> (
        egui::Context,
        egui_winit::State,
        egui_wgpu::Renderer,
        egui::TextureId,
    ) {
        let egui_ctx = egui::Context::default();
        let viewport_id = egui_ctx.viewport_id();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            viewport_id,
            gfx.window(),
            None,
            None,
            None,
        );

        let mut egui_renderer = egui_wgpu::Renderer::new(
            gfx.device(),
            gfx.surface_config().format,
            egui_wgpu::RendererOptions::default(),
        );

        let viewport_tex_id = egui_renderer.register_native_texture(
            gfx.device(),
            gfx.viewport_view(),
            wgpu::FilterMode::Linear,
        );

        (egui_ctx, egui_state, egui_renderer, viewport_tex_id)
    }

    fn draw(&mut self) {
        if let State::Ready(ready) = &mut self.state {
            Self::draw_viewer(ready, &mut self.ui);
            Self::apply_edits(&mut ready.gfx, &mut self.ui);
        }
    }

    fn resized(&mut self, size: PhysicalSize<u32>) {
        if let State::Ready(ready) = &mut self.state {
            ready.gfx.resize(size);
            ready.egui_renderer.free_texture(&ready.viewport_tex_id);
            ready.viewport_tex_id = ready.egui_renderer.register_native_texture(
                ready.gfx.device(),
                ready.gfx.viewport_view(),
                wgpu::FilterMode::Linear,
            );
        }
    }

    fn apply_edits(gfx: &mut Graphics, ui: &mut ViewerUi) {
        let edits = std::mem::take(&mut ui.edits);
        for edit in edits {
            match edit {
                SceneEdit::Translate(id, offset) => {
                    gfx.translate_mesh(id, offset).ok();
                }
                SceneEdit::Reset(id) => {
                    if let Some(position) = gfx.initial_position(id) {
                        gfx.set_mesh_position(id, position).ok();
                    }
                }
                SceneEdit::Reload => {
                    gfx.reload_scene();
                    ui.selected = None;
                }
                SceneEdit::AddMesh(path) => match gfx.add_mesh(&path, Mat4::IDENTITY) {
                    Ok(id) => {
                        ui.selected = Some(id);
                        ui.show_add_mesh = false;
                        ui.add_mesh_path.clear();
                    }
                    Err(err) => {
                        ui.load_error = Some(format!("Could not load {}:\n{err:#}", path.display()));
                    }
                },
            }
        }

        let flags = gfx.ui_constants_mut();
        flags.lighting_only = ui.lighting_only as u32;
        flags.face_normals = ui.face_normals as u32;
    }

    fn entity_rows(gfx: &Graphics) -> Vec<EntityRow> {
        gfx.scene()
            .iter()
            .map(|(id, model, placement)| EntityRow {
                id,
                translation: placement.w_axis.truncate(),
                visible: model.visible_count(),
                primitives: model.meshes.len(),
            })
            .collect()
    }

    fn draw_viewer(ready: &mut ReadyState, ui_state: &mut ViewerUi) {
        let raw_input = ready.egui_state.take_egui_input(ready.gfx.window());
        let viewport_tex_id = ready.viewport_tex_id;
        let camera = ready.gfx.camera().clone();
        let rows = Self::entity_rows(&ready.gfx);
        let scene_loaded = ready.gfx.scene().is_loaded();
        let scene_scaling = ready.gfx.scene().scene_scaling();
        let surface_cfg = ready.gfx.surface_config();
        let viewport_w = surface_cfg.width as f32;
        let viewport_h = surface_cfg.height as f32;
        let egui_ctx = ready.egui_ctx.clone();

        let full_output = egui_ctx.run(raw_input, |ctx| {
            egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
                egui::MenuBar::new().ui(ui, |ui| {
                    ui.menu_button("File", |ui| {
                        if ui.button("Add Mesh…").clicked() {
                            ui_state.show_add_mesh = true;
                            ui.close();
                        }

                        if ui.button("Reload Scene").clicked() {
                            ui_state.edits.push(SceneEdit::Reload);
                            ui.close();
                        }

                        ui.separator();

                        if ui.button("Quit").clicked() {
                            ui_state.quit_requested = true;
                            ui.close();
                        }
                    });

                    ui.menu_button("View", |ui| {
                        ui.checkbox(&mut ui_state.show_debug_panel, "Show viewport debug panel");
                        ui.checkbox(&mut ui_state.lighting_only, "Lighting only");
                        ui.checkbox(&mut ui_state.face_normals, "Face normals");
                    });

                    ui.menu_button("Help", |ui| {
                        ui.label("Vista Viewer");
                    });
                });
            });

            let mut add_mesh_open = ui_state.show_add_mesh;
            egui::Window::new("Add Mesh")
                .open(&mut add_mesh_open)
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label("glTF file (.gltf or .glb):");
                    let response = ui.text_edit_singleline(&mut ui_state.add_mesh_path);
                    let submitted =
                        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    let path = ui_state.add_mesh_path.trim();
                    if (ui.button("Add").clicked() || submitted) && !path.is_empty() {
                        ui_state.edits.push(SceneEdit::AddMesh(PathBuf::from(path)));
                    }
                });
            ui_state.show_add_mesh &= add_mesh_open;

            let mut dismiss_error = false;
            if let Some(message) = &ui_state.load_error {
                egui::Window::new("Error")
                    .collapsible(false)
                    .resizable(false)
                    .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                    .show(ctx, |ui| {
                        ui.label(message.as_str());
                        if ui.button("OK").clicked() {
                            dismiss_error = true;
                        }
                    });
            }
            if dismiss_error {
                ui_state.load_error = None;
            }

            egui::SidePanel::left("scene_panel")
                .resizable(true)
                .default_width(220.0)
                .show(ctx, |ui| {
                    ui.heading("Scene");
                    ui.separator();
                    ui.label(if scene_loaded {
                        "All meshes loaded"
                    } else {
                        "Scene not loaded"
                    });
                    ui.label(format!("Scaling: {scene_scaling}"));
                    ui.separator();

                    if rows.is_empty() {
                        ui.label("No meshes.");
                    }
                    for row in &rows {
                        let selected = ui_state.selected == Some(row.id);
                        let label = format!("Mesh {}  ({}/{} visible)", row.id, row.visible, row.primitives);
                        if ui.selectable_label(selected, label).clicked() {
                            ui_state.selected = Some(row.id);
                        }
                    }
                });

            egui::SidePanel::right("inspector_panel")
                .resizable(true)
                .default_width(260.0)
                .show(ctx, |ui| {
                    ui.heading("Inspector");
                    ui.separator();

                    let Some(row) = ui_state
                        .selected
                        .and_then(|id| rows.iter().find(|r| r.id == id))
                    else {
                        ui.label("Select a mesh.");
                        return;
                    };

                    ui.label(format!("Mesh {}", row.id));
                    ui.monospace(format!(
                        "x {:.3}  y {:.3}  z {:.3}",
                        row.translation.x, row.translation.y, row.translation.z
                    ));
                    ui.separator();

                    ui.horizontal(|ui| {
                        ui.label("Step:");
                        ui.add(
                            egui::DragValue::new(&mut ui_state.nudge_step)
                                .speed(0.05)
                                .range(0.01..=10.0),
                        );
                    });

                    let step = ui_state.nudge_step;
                    let id = row.id;
                    for (axis, dir) in [("X", Vec3::X), ("Y", Vec3::Y), ("Z", Vec3::Z)] {
                        ui.horizontal(|ui| {
                            ui.label(axis);
                            if ui.button("-").clicked() {
                                ui_state.edits.push(SceneEdit::Translate(id, -dir * step));
                            }
                            if ui.button("+").clicked() {
                                ui_state.edits.push(SceneEdit::Translate(id, dir * step));
                            }
                        });
                    }

                    if ui.button("Reset").clicked() {
                        ui_state.edits.push(SceneEdit::Reset(id));
                    }
                });

            egui::TopBottomPanel::bottom("debug_panel")
                .resizable(true)
                .default_height(120.0)
                .show_animated(ctx, ui_state.show_debug_panel, |ui| {
                    ui.heading("Viewport Debug");
                    ui.separator();

                    ui.horizontal(|ui| {
                        ui.label("Camera eye:");
                        ui.monospace(format!("{:?}", camera.eye));
                    });

                    ui.horizontal(|ui| {
                        ui.label("Yaw / Pitch:");
                        ui.monospace(format!("{:.3} / {:.3}", camera.yaw, camera.pitch));
                    });

                    ui.horizontal(|ui| {
                        ui.label("Near / Far:");
                        ui.monospace(format!("{} / {}", camera.near, camera.far));
                    });

                    ui.separator();
                    ui.label(
                        "Double-click viewport to capture camera.\n\
                         Esc to release.",
                    );
                });

            egui::CentralPanel::default().show(ctx, |ui| {
                let available = ui.available_size();

                if available.x > 0.0 && available.y > 0.0 && viewport_w > 0.0 && viewport_h > 0.0 {
                    let tex_aspect = viewport_w / viewport_h;
                    let panel_aspect = available.x / available.y;
                    let (w, h) = if panel_aspect > tex_aspect {
                        (available.y * tex_aspect, available.y)
                    } else {
                        (available.x, available.x / tex_aspect)
                    };

                    let sized = SizedTexture::new(viewport_tex_id, egui::vec2(w, h));
                    let image = egui::Image::from_texture(sized).sense(Sense::click_and_drag());
                    let response = ui.add(image);

                    if response.double_clicked() && !ui_state.camera_active {
                        ui_state.camera_active = true;
                        ui_state.cursor_grab_request = Some(true);
                    }

                    if ui_state.camera_active {
                        let painter = ui.painter();
                        painter.rect_stroke(
                            response.rect.shrink(1.0),
                            0.0,
                            egui::Stroke::new(2.0, egui::Color32::YELLOW),
                            egui::StrokeKind::Inside,
                        );
                        painter.text(
                            response.rect.right_top() + egui::vec2(-10.0, 10.0),
                            egui::Align2::RIGHT_TOP,
                            "Camera Control (Esc to exit)",
                            egui::FontId::proportional(14.0),
                            egui::Color32::YELLOW,
                        );
                    }
                } else {
                    ui.label("Viewport area is too small.");
                }
            });
        });

        let egui::FullOutput {
            platform_output,
            textures_delta,
            shapes,
            pixels_per_point,
            ..
        } = full_output;

        ready
            .egui_state
            .handle_platform_output(ready.gfx.window(), platform_output);

        let paint_jobs = ready.egui_ctx.tessellate(shapes, pixels_per_point);
        ready.pending_textures.push(textures_delta);

        if let Some(grab) = ui_state.cursor_grab_request.take() {
            let window = ready.gfx.window();
            window.set_cursor_visible(!grab);
            let mode = if grab {
                winit::window::CursorGrabMode::Confined
            } else {
                winit::window::CursorGrabMode::None
            };
            if let Err(err) = window.set_cursor_grab(mode) {
                log::warn!("cursor grab failed: {err}");
            }
        }

        ready.gfx.draw(|gfx_inner, swap_view, encoder| {
            let textures_delta = ready.pending_textures.take();
            for (id, image_delta) in &textures_delta.set {
                ready.egui_renderer.update_texture(
                    gfx_inner.device(),
                    gfx_inner.queue(),
                    *id,
                    image_delta,
                );
            }
            let screen_descriptor = egui_wgpu::ScreenDescriptor {
                size_in_pixels: [
                    gfx_inner.surface_config().width,
                    gfx_inner.surface_config().height,
                ],
                pixels_per_point,
            };

            ready.egui_renderer.update_buffers(
                gfx_inner.device(),
                gfx_inner.queue(),
                encoder,
                &paint_jobs,
                &screen_descriptor,
            );

            let rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui_overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: swap_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let mut rpass = rpass.forget_lifetime();
            ready
                .egui_renderer
                .render(&mut rpass, &paint_jobs, &screen_descriptor);
            drop(rpass);

            for id in &textures_delta.free {
                ready.egui_renderer.free_texture(id);
            }
        });
    }

    fn release_camera(&mut self) {
        if let State::Ready(ready) = &mut self.state {
            self.ui.camera_active = false;
            self.ui.cursor_grab_request = Some(false);
            ready.gfx.release_camera_keys();
            ready.gfx.request_redraw();
        }
    }
}

impl ApplicationHandler<Graphics> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let State::Init(pending) = &mut self.state else {
            return;
        };
        let Some((proxy, setup)) = pending.take() else {
            return;
        };

        let win_attr = Window::default_attributes().with_title(self.title.clone());
        let window: RcWindow = match event_loop.create_window(win_attr) {
            Ok(window) => std::sync::Arc::new(window),
            Err(err) => {
                log::error!("could not create window: {err}");
                event_loop.exit();
                return;
            }
        };
        if let Err(err) = pollster::block_on(create_graphics(window, proxy, setup)) {
            log::error!("graphics setup failed: {err:#}");
            event_loop.exit();
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, graphics: Graphics) {
        let (egui_ctx, egui_state, egui_renderer, viewport_tex_id) =
            App::init_egui_for_graphics(&graphics);

        graphics.request_redraw();
        self.state = State::Ready(ReadyState {
            gfx: graphics,
            egui_ctx,
            egui_state,
            egui_renderer,
            viewport_tex_id,
            pending_textures: PendingTextures::default(),
        });
    }

    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        if self.render_target <= Instant::now() {
            self.render_target += self.frame_time;
            if let State::Ready(ready) = &mut self.state {
                ready.gfx.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::Resized(size) => self.resized(size),
            WindowEvent::RedrawRequested => {
                self.draw();
                if self.ui.quit_requested {
                    event_loop.exit();
                    return;
                }
                let now = Instant::now();
                if self.render_target <= now {
                    self.render_target = now + self.frame_time;
                    if let State::Ready(ready) = &mut self.state {
                        ready.gfx.request_redraw();
                    }
                }
            }
            WindowEvent::CloseRequested => event_loop.exit(),
            other => {
                let State::Ready(ready) = &mut self.state else {
                    return;
                };
                let response = ready.egui_state.on_window_event(ready.gfx.window(), &other);
                if response.repaint {
                    ready.gfx.request_redraw();
                }

                let escape_pressed = matches!(
                    &other,
                    WindowEvent::KeyboardInput { event: key_event, .. }
                        if key_event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                            && key_event.state == ElementState::Pressed
                            && !key_event.repeat
                );
                if escape_pressed && self.ui.camera_active {
                    self.release_camera();
                    return;
                }

                if self.ui.camera_active && !response.consumed {
                    ready.gfx.handle_window_event(&other);
                }
            }
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let State::Ready(ready) = &mut self.state {
            if self.ui.camera_active {
                ready.gfx.handle_device_event(&event);
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.render_target));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(id: u64) -> egui::TexturesDelta {
        let image = egui::ColorImage::example();
        let mut delta = egui::TexturesDelta::default();
        delta.set.push((
            egui::TextureId::Managed(id),
            egui::epaint::ImageDelta::full(image, egui::TextureOptions::LINEAR),
        ));
        delta
    }

    #[test]
    fn texture_updates_wait_for_a_presented_frame() {
        let mut pending = PendingTextures::default();
        pending.push(set(0));
        // The next frame's delta arrives while the first is still pending.
        let mut second = set(1);
        second.free.push(egui::TextureId::Managed(7));
        pending.push(second);

        let delta = pending.take();
        let ids: Vec<_> = delta.set.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![egui::TextureId::Managed(0), egui::TextureId::Managed(1)]);
        assert_eq!(delta.free, vec![egui::TextureId::Managed(7)]);
        assert!(pending.take().is_empty());
    }
}
