use glam::{Mat4, Vec3};
use winit::event::{DeviceEvent, ElementState, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

const MOUSE_SENSITIVITY: f32 = 0.0025;
const BOOST: f32 = 5.0;

pub fn forward_from_yaw_pitch(yaw: f32, pitch: f32) -> Vec3 {
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    Vec3::new(cy * cp, sp, -sy * cp)
}

/// A free-flying perspective camera.
#[derive(Clone, Debug)]
pub struct FlyCamera {
    pub eye: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl FlyCamera {
    pub fn new(eye: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            eye,
            yaw,
            pitch,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }

    pub fn with_lens(mut self, fov_y: f32, near: f32, far: f32) -> Self {
        self.fov_y = fov_y;
        self.near = near;
        self.far = far;
        self
    }

    pub fn forward(&self) -> Vec3 {
        forward_from_yaw_pitch(self.yaw, self.pitch)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.eye + self.forward(), Vec3::Y)
    }

    /// Perspective projection with wgpu's `0..1` depth range.
    pub fn projection(&self, width: u32, height: u32) -> Mat4 {
        let aspect = (width.max(1) as f32) / (height.max(1) as f32);
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }

    pub fn near_far(&self) -> (f32, f32) {
        (self.near, self.far)
    }
}

#[derive(Default)]
struct Held {
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
    boost: bool,
}

/// WASD + J/K movement, Shift to speed up, mouse to look around.
pub struct CameraController {
    held: Held,
    base_speed: f32,
}

impl CameraController {
    pub fn new(base_speed: f32) -> Self {
        Self {
            held: Held::default(),
            base_speed,
        }
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        let WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state,
                    repeat: false,
                    ..
                },
            ..
        } = event
        else {
            return;
        };
        self.set_key(*code, *state == ElementState::Pressed);
    }

    pub fn set_key(&mut self, code: KeyCode, pressed: bool) {
        let slot = match code {
            KeyCode::KeyW => &mut self.held.forward,
            KeyCode::KeyS => &mut self.held.back,
            KeyCode::KeyA => &mut self.held.left,
            KeyCode::KeyD => &mut self.held.right,
            KeyCode::KeyJ => &mut self.held.up,
            KeyCode::KeyK => &mut self.held.down,
            KeyCode::ShiftLeft => &mut self.held.boost,
            _ => return,
        };
        *slot = pressed;
    }

    /// Releases every key, e.g. when the viewport loses capture.
    pub fn release_all(&mut self) {
        self.held = Held::default();
    }

    pub fn handle_device_event(&mut self, event: &DeviceEvent, cam: &mut FlyCamera) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.look(cam, *dx as f32, *dy as f32);
        }
    }

    pub fn look(&self, cam: &mut FlyCamera, dx: f32, dy: f32) {
        let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
        cam.yaw -= dx * MOUSE_SENSITIVITY;
        cam.pitch = (cam.pitch - dy * MOUSE_SENSITIVITY).clamp(-max_pitch, max_pitch);
    }

    pub fn update(&self, cam: &mut FlyCamera, dt: f32) {
        let forward = cam.forward();
        let flat_forward = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        let right = flat_forward.cross(Vec3::Y).normalize_or_zero();

        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        let h = &self.held;
        let movement = flat_forward * axis(h.forward, h.back)
            + right * axis(h.right, h.left)
            + Vec3::Y * axis(h.up, h.down);

        if movement.length_squared() > 0.0 {
            let speed = if h.boost {
                self.base_speed * BOOST
            } else {
                self.base_speed
            };
            cam.eye += movement.normalize() * speed * dt;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_yaw_looks_down_positive_x() {
        let cam = FlyCamera::new(Vec3::ZERO, 0.0, 0.0);
        assert!(cam.forward().abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn view_moves_eye_to_origin() {
        let cam = FlyCamera::new(Vec3::new(1.0, 2.0, 3.0), 0.3, -0.2);
        let eye_in_view = cam.view().transform_point3(cam.eye);
        assert!(eye_in_view.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn projection_maps_near_plane_to_zero_depth() {
        let cam = FlyCamera::new(Vec3::ZERO, 0.0, 0.0).with_lens(1.0, 0.5, 50.0);
        let clip = cam.projection(800, 600) * glam::Vec4::new(0.0, 0.0, -0.5, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-6);
        assert_eq!(cam.near_far(), (0.5, 50.0));
    }

    #[test]
    fn held_forward_moves_along_flat_forward() {
        let mut cam = FlyCamera::new(Vec3::ZERO, 0.0, 0.5);
        let mut ctl = CameraController::new(2.0);
        ctl.set_key(KeyCode::KeyW, true);
        ctl.update(&mut cam, 0.5);
        assert!(cam.eye.abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));

        ctl.set_key(KeyCode::ShiftLeft, true);
        ctl.update(&mut cam, 0.1);
        assert!(cam.eye.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));

        ctl.release_all();
        ctl.update(&mut cam, 1.0);
        assert!(cam.eye.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut cam = FlyCamera::new(Vec3::ZERO, 0.0, 0.0);
        let ctl = CameraController::new(1.0);
        ctl.look(&mut cam, 0.0, -1.0e6);
        assert!(cam.pitch < std::f32::consts::FRAC_PI_2);
    }
}
