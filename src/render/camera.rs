use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy)]
pub struct PerspectiveCamera {
    pub fov_y_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl PerspectiveCamera {
    pub fn new(fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y_deg,
            aspect,
            near,
            far,
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
        }
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

/// Orbit around `camera.target` with exponential damping.
///
/// Input accumulates into a pending delta; every [`OrbitControls::update`]
/// applies `damping` of it and keeps the rest for later frames.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub enabled: bool,
    pub damping: f32,
    pub rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pending_yaw: f32,
    pending_pitch: f32,
    pending_zoom: f32,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enabled: true,
            damping: 0.05,
            rotate_speed: 0.005,
            min_distance: 0.05,
            max_distance: 500.0,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            pending_zoom: 0.0,
        }
    }
}

impl OrbitControls {
    pub fn with_damping(damping: f32) -> Self {
        Self {
            damping,
            ..Self::default()
        }
    }

    /// Pointer drag in pixels. Ignored while disabled.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        if !self.enabled {
            return;
        }
        self.pending_yaw -= dx * self.rotate_speed;
        self.pending_pitch -= dy * self.rotate_speed;
    }

    /// Positive moves toward the target.
    pub fn dolly(&mut self, amount: f32) {
        if !self.enabled {
            return;
        }
        self.pending_zoom += amount;
    }

    pub fn is_settled(&self) -> bool {
        self.pending_yaw.abs() < 1e-5 && self.pending_pitch.abs() < 1e-5 && self.pending_zoom.abs() < 1e-5
    }

    /// Returns true when the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        if self.is_settled() {
            return false;
        }
        let step_yaw = self.pending_yaw * self.damping;
        let step_pitch = self.pending_pitch * self.damping;
        let step_zoom = self.pending_zoom * self.damping;
        self.pending_yaw -= step_yaw;
        self.pending_pitch -= step_pitch;
        self.pending_zoom -= step_zoom;

        let offset = camera.position - camera.target;
        let distance = offset.length().max(1e-6);
        let (mut yaw, mut pitch) = offset_to_yaw_pitch(offset);
        yaw += step_yaw;
        pitch = (pitch + step_pitch).clamp(-MAX_PITCH, MAX_PITCH);
        let distance = (distance - step_zoom).clamp(self.min_distance, self.max_distance);

        camera.position = camera.target + yaw_pitch_to_offset(yaw, pitch) * distance;
        true
    }
}

const MAX_PITCH: f32 = std::f32::consts::FRAC_PI_2 - 1e-3;

fn offset_to_yaw_pitch(offset: Vec3) -> (f32, f32) {
    let dir = offset.normalize_or_zero();
    let yaw = dir.z.atan2(dir.x);
    let pitch = dir.y.clamp(-1.0, 1.0).asin();
    (yaw, pitch)
}

fn yaw_pitch_to_offset(yaw: f32, pitch: f32) -> Vec3 {
    let cos_pitch = pitch.cos();
    Vec3::new(yaw.cos() * cos_pitch, pitch.sin(), yaw.sin() * cos_pitch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor_camera() -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 1000.0);
        camera.position = Vec3::splat(5.0);
        camera
    }

    #[test]
    fn aspect_tracks_viewport() {
        let mut camera = editor_camera();
        camera.set_aspect(1920, 1080);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        camera.set_aspect(0, 0);
        assert!(camera.aspect.is_finite());
    }

    #[test]
    fn orbit_preserves_distance_and_settles() {
        let mut camera = editor_camera();
        let distance = camera.position.length();
        let mut controls = OrbitControls::default();
        controls.rotate(100.0, 20.0);
        let mut frames = 0;
        while controls.update(&mut camera) {
            frames += 1;
            assert!(frames < 1000);
        }
        assert!(frames > 1);
        assert!((camera.position.length() - distance).abs() < 1e-3);
        assert!(camera.position.is_finite());
    }

    #[test]
    fn disabled_controls_ignore_input() {
        let mut camera = editor_camera();
        let before = camera.position;
        let mut controls = OrbitControls {
            enabled: false,
            ..OrbitControls::default()
        };
        controls.rotate(50.0, 50.0);
        controls.dolly(2.0);
        assert!(!controls.update(&mut camera));
        assert_eq!(camera.position, before);
    }
}
