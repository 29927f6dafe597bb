use crate::input::{InputState, KeyboardKey};
use crate::time::TimeState;
use glam::{Mat4, Vec3, Vec4};

//
// Left-handed, +Y up. Yaw 0 looks along +Z, positive yaw turns toward +X.
//
#[derive(Clone, Debug)]
pub struct FlyCamera {
    pub position: Vec3,
    pub look_dir: Vec3,
    pub right_dir: Vec3,
    pub up_dir: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub lock_view: bool,

    pub fov_y: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        let mut camera = FlyCamera {
            position: Vec3::ZERO,
            look_dir: Vec3::Z,
            right_dir: Vec3::X,
            up_dir: Vec3::Y,
            pitch: 0.0,
            yaw: 0.0,
            lock_view: false,
            fov_y: std::f32::consts::FRAC_PI_4,
            near_plane: 0.1,
            far_plane: 500.0,
        };
        camera.refresh_directions();
        camera
    }
}

impl FlyCamera {
    pub fn new(
        position: Vec3,
        yaw: f32,
        pitch: f32,
    ) -> Self {
        let mut camera = FlyCamera {
            position,
            yaw,
            pitch,
            ..Default::default()
        };
        camera.refresh_directions();
        camera
    }

    fn refresh_directions(&mut self) {
        let look_dir = Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        )
        .normalize();

        self.look_dir = look_dir;
        self.right_dir = Vec3::Y.cross(look_dir).normalize();
        self.up_dir = look_dir.cross(self.right_dir);
    }

    pub fn update(
        &mut self,
        input_state: &InputState,
        time_state: &TimeState,
    ) {
        // Allow locking camera position/rotation
        if input_state.is_key_just_down(KeyboardKey::F) {
            self.lock_view = !self.lock_view;
        }

        const NORMAL_MOVE_SPEED: f32 = 10.0;
        const FAST_MOVE_SPEED: f32 = 30.0;
        const LOOK_SPEED: f32 = 0.1;
        const TWO_PI: f32 = 2.0 * std::f32::consts::PI;

        let dt = time_state.previous_update_dt();

        if !self.lock_view {
            let yaw_dt = input_state.mouse_motion().x * LOOK_SPEED;
            let pitch_dt = input_state.mouse_motion().y * LOOK_SPEED * -1.0;

            self.yaw += yaw_dt * dt;
            while self.yaw > std::f32::consts::PI {
                self.yaw -= TWO_PI;
            }

            while self.yaw < -std::f32::consts::PI {
                self.yaw += TWO_PI;
            }

            self.pitch += pitch_dt * dt;
            self.pitch = self.pitch.clamp(
                -std::f32::consts::FRAC_PI_2 + 0.01,
                std::f32::consts::FRAC_PI_2 - 0.01,
            );
        }

        // Refresh even when locked so that a pitch/yaw set directly takes effect
        self.refresh_directions();

        if !self.lock_view {
            let move_speed = if input_state.is_key_down(KeyboardKey::LShift)
                || input_state.is_key_down(KeyboardKey::RShift)
            {
                FAST_MOVE_SPEED
            } else {
                NORMAL_MOVE_SPEED
            };

            // x = forward, y = right, z = up
            let mut velocity = Vec3::ZERO;
            if input_state.is_key_down(KeyboardKey::W) {
                velocity.x += move_speed;
            }

            if input_state.is_key_down(KeyboardKey::S) {
                velocity.x -= move_speed;
            }

            if input_state.is_key_down(KeyboardKey::A) {
                velocity.y -= move_speed;
            }

            if input_state.is_key_down(KeyboardKey::D) {
                velocity.y += move_speed;
            }

            if input_state.is_key_down(KeyboardKey::E) {
                velocity.z += move_speed;
            }

            if input_state.is_key_down(KeyboardKey::Q) {
                velocity.z -= move_speed;
            }

            self.position += velocity.x * self.look_dir * dt;
            self.position += velocity.y * self.right_dir * dt;
            self.position += velocity.z * Vec3::Y * dt;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_lh(self.position, self.position + self.look_dir, Vec3::Y)
    }

    /// Depth maps to [0, 1] as D3D clip space expects
    pub fn projection_matrix(
        &self,
        aspect_ratio: f32,
    ) -> Mat4 {
        Mat4::perspective_lh(self.fov_y, aspect_ratio, self.near_plane, self.far_plane)
    }

    pub fn view_projection_matrix(
        &self,
        aspect_ratio: f32,
    ) -> Mat4 {
        self.projection_matrix(aspect_ratio) * self.view_matrix()
    }
}

/// Planes of the view frustum as (normal, distance) with normals pointing inward, in the order
/// left, right, bottom, top, near, far. A point p is inside when `dot(plane.xyz, p) + plane.w >= 0`
/// for every plane.
pub fn frustum_planes(view_projection: Mat4) -> [Vec4; 6] {
    let rows = view_projection.transpose();
    let (r0, r1, r2, r3) = (rows.x_axis, rows.y_axis, rows.z_axis, rows.w_axis);

    let mut planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2];
    for plane in &mut planes {
        let length = plane.truncate().length();
        if length > 0.0 {
            *plane /= length;
        }
    }

    planes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ButtonState;

    fn is_inside(
        planes: &[Vec4; 6],
        point: Vec3,
    ) -> bool {
        planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    #[test]
    fn test_default_orientation() {
        let camera = FlyCamera::default();
        assert!((camera.look_dir - Vec3::Z).length() < 1e-5);
        assert!((camera.right_dir - Vec3::X).length() < 1e-5);
        assert!((camera.up_dir - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_move_forward() {
        let mut camera = FlyCamera::new(Vec3::ZERO, std::f32::consts::FRAC_PI_2, 0.0);
        let mut input_state = InputState::new();
        let mut time_state = TimeState::with_fixed_step(std::time::Duration::from_millis(100));
        time_state.update();

        input_state.handle_keyboard_event(KeyboardKey::W, ButtonState::Pressed);
        camera.update(&input_state, &time_state);

        // Yaw of 90 degrees looks along +X, one second at 10 units per second moves 1 unit
        assert!((camera.position - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_lock_view() {
        let mut camera = FlyCamera::default();
        let mut input_state = InputState::new();
        let mut time_state = TimeState::with_fixed_step(std::time::Duration::from_millis(100));
        time_state.update();

        input_state.handle_keyboard_event(KeyboardKey::F, ButtonState::Pressed);
        input_state.handle_keyboard_event(KeyboardKey::W, ButtonState::Pressed);
        input_state.handle_mouse_motion(glam::Vec2::new(50.0, 0.0));
        camera.update(&input_state, &time_state);

        assert!(camera.lock_view);
        assert_eq!(camera.position, Vec3::ZERO);
        assert_eq!(camera.yaw, 0.0);
    }

    #[test]
    fn test_projection_depth_range() {
        let camera = FlyCamera::default();
        let view_projection = camera.view_projection_matrix(16.0 / 9.0);

        let near = view_projection * Vec4::new(0.0, 0.0, camera.near_plane, 1.0);
        let far = view_projection * Vec4::new(0.0, 0.0, camera.far_plane, 1.0);
        assert!((near.z / near.w).abs() < 1e-4);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_frustum_planes() {
        let camera = FlyCamera::new(Vec3::new(0.0, 1.0, -10.0), 0.0, 0.0);
        let planes = frustum_planes(camera.view_projection_matrix(1.0));

        assert!(is_inside(&planes, Vec3::new(0.0, 1.0, 0.0)));
        assert!(is_inside(&planes, Vec3::new(2.0, 0.0, 5.0)));
        // Behind the camera
        assert!(!is_inside(&planes, Vec3::new(0.0, 1.0, -20.0)));
        // Far off to the side
        assert!(!is_inside(&planes, Vec3::new(100.0, 1.0, 0.0)));
        // Beyond the far plane
        assert!(!is_inside(&planes, Vec3::new(0.0, 1.0, 600.0)));
    }
}
