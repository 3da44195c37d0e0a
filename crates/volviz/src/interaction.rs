//! Mouse interaction: arcball camera rotation, scroll zoom and object
//! dragging.
//!
//! The state machine is deliberately free of windowing types; the
//! application layer translates window events into NDC cursor positions and
//! pick results before calling in. On button press the cursor either grabs a
//! movable object (pick hit) or the camera (no hit); cursor motion then
//! rotates the view or drags the object until release.

use glam::{Quat, Vec2, Vec3};

use crate::camera::CameraProperties;
use crate::geometry::MoveMask;
use crate::picking::{masked_move, ViewRay};

/// Maps an NDC point onto the unit arcball sphere. Points outside the sphere
/// are pulled to its silhouette.
pub fn arcball_point(ndc: Vec2) -> Vec3 {
    let d = ndc.length_squared();
    if d > 1.0 {
        (ndc / d.sqrt()).extend(0.0)
    } else {
        ndc.extend((1.0 - d).sqrt())
    }
}

/// Rotation taking the arcball point under `from` to the one under `to`.
pub fn arcball_rotation(from: Vec2, to: Vec2) -> Quat {
    let a = arcball_point(from);
    let b = arcball_point(to);
    let axis = a.cross(b);
    if axis.length_squared() < 1e-12 {
        return Quat::IDENTITY;
    }
    let angle = 2.0 * a.dot(b).clamp(-1.0, 1.0).acos();
    Quat::from_axis_angle(axis.normalize(), angle)
}

/// What a cursor grab is currently attached to.
enum Grab {
    None,
    Camera,
    Geometry {
        index: u32,
        /// Object position in render units, updated as the drag progresses.
        position: Vec3,
        /// The surface point the cursor picked, in render units. The drag
        /// delta is measured against this point, so an object grabbed off
        /// its center follows the cursor instead of snapping onto the ray.
        point: Vec3,
        mask: MoveMask,
    },
}

/// A drag step the application must apply to the grabbed object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragStep {
    pub index: u32,
    pub position: Vec3,
}

pub struct Interaction {
    cursor_ndc: Vec2,
    grab: Grab,
}

impl Default for Interaction {
    fn default() -> Self {
        Self {
            cursor_ndc: Vec2::ZERO,
            grab: Grab::None,
        }
    }
}

impl Interaction {
    pub fn cursor_ndc(&self) -> Vec2 {
        self.cursor_ndc
    }

    /// Left button pressed on a geometry: `position` is the object's stored
    /// position, `point` the picked surface point under the cursor, both in
    /// render units. A hit on an immovable object grabs the camera instead.
    pub fn grab_geometry(&mut self, index: u32, position: Vec3, point: Vec3, mask: MoveMask) {
        if mask == MoveMask::NONE {
            self.grab = Grab::Camera;
        } else {
            self.grab = Grab::Geometry {
                index,
                position,
                point,
                mask,
            };
        }
    }

    pub fn grab_camera(&mut self) {
        self.grab = Grab::Camera;
    }

    pub fn release(&mut self) {
        self.grab = Grab::None;
    }

    pub fn dragging(&self) -> bool {
        matches!(self.grab, Grab::Geometry { .. })
    }

    /// Selection index of the grabbed object, if a drag is active.
    pub fn grabbed_geometry(&self) -> Option<u32> {
        match self.grab {
            Grab::Geometry { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Cursor moved to a new NDC position. Rotates the camera or returns the
    /// drag step to apply, depending on the active grab.
    pub fn cursor_moved(
        &mut self,
        ndc: Vec2,
        camera: &crate::camera::Camera,
        world_scale_m: f32,
    ) -> Option<DragStep> {
        let last = std::mem::replace(&mut self.cursor_ndc, ndc);
        match &mut self.grab {
            Grab::None => None,
            Grab::Camera => {
                let rotation = arcball_rotation(last, ndc);
                let props = camera.properties();
                // Orientation writes are pre-normalized, so this cannot fail.
                let _ = props.set_orientation(rotation * props.orientation());
                None
            }
            Grab::Geometry {
                index,
                position,
                point,
                mask,
            } => {
                // Project the picked point onto the new cursor ray and move
                // both the point and the object by the masked delta.
                let ray = ViewRay::through(camera, ndc, world_scale_m);
                let target = ray.drag_plane_hit(*point);
                let delta = masked_move(*point, target, *mask) - *point;
                *point += delta;
                *position += delta;
                Some(DragStep {
                    index: *index,
                    position: *position,
                })
            }
        }
    }

    /// Scroll wheel zoom: moves the camera along its z axis, scaled so one
    /// notch covers a sensible fraction of the scene at any world scale.
    pub fn scroll(&self, scroll_y: f32, props: &CameraProperties, world_scale_m: f32) {
        let mut position = props.position_m();
        position.z -= 2.0 * scroll_y * world_scale_m;
        props.set_position_m(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::geometry::Axis;

    #[test]
    fn arcball_point_stays_on_or_inside_the_sphere() {
        let center = arcball_point(Vec2::ZERO);
        assert!((center - Vec3::Z).length() < 1e-6);

        let rim = arcball_point(Vec2::new(3.0, 4.0));
        assert!((rim.length() - 1.0).abs() < 1e-6);
        assert_eq!(rim.z, 0.0);
    }

    #[test]
    fn arcball_rotation_of_identical_points_is_identity() {
        let q = arcball_rotation(Vec2::new(0.3, -0.2), Vec2::new(0.3, -0.2));
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn arcball_rotation_turns_about_the_expected_axis() {
        // Moving the cursor right rotates about the screen's y axis.
        let q = arcball_rotation(Vec2::ZERO, Vec2::new(0.5, 0.0));
        let (axis, angle) = q.to_axis_angle();
        assert!((axis - Vec3::Y).length() < 1e-5 || (axis + Vec3::Y).length() < 1e-5);
        assert!(angle > 0.1);
    }

    #[test]
    fn camera_grab_rotates_the_camera() {
        let camera = Camera::new();
        let mut interaction = Interaction::default();

        interaction.grab_camera();
        let step = interaction.cursor_moved(Vec2::new(0.4, 0.0), &camera, 1.0);
        assert_eq!(step, None);
        assert_ne!(camera.properties().orientation(), Quat::IDENTITY);
    }

    #[test]
    fn geometry_grab_emits_masked_drag_steps() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 2.0));
        let mut interaction = Interaction::default();

        interaction.grab_geometry(3, Vec3::ZERO, Vec3::ZERO, MoveMask::axis(Axis::X));
        let step = interaction
            .cursor_moved(Vec2::new(0.5, 0.5), &camera, 1.0)
            .unwrap();
        assert_eq!(step.index, 3);
        assert!(step.position.x > 0.0);
        // Off-mask axes never move.
        assert_eq!(step.position.y, 0.0);
        assert_eq!(step.position.z, 0.0);

        interaction.release();
        assert!(interaction
            .cursor_moved(Vec2::new(0.6, 0.5), &camera, 1.0)
            .is_none());
    }

    #[test]
    fn off_center_grab_does_not_teleport_the_object() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 2.0));
        let mut interaction = Interaction::default();

        // Cursor rests well off the object's center before the grab.
        assert!(interaction
            .cursor_moved(Vec2::new(0.5, 0.0), &camera, 1.0)
            .is_none());

        // The picked surface point lies on the cursor ray, away from the
        // stored position at the origin.
        let ray = crate::picking::ViewRay::through(&camera, Vec2::new(0.5, 0.0), 1.0);
        let picked = ray.origin + 1.5 * ray.direction;
        interaction.grab_geometry(1, Vec3::ZERO, picked, MoveMask::ALL);

        // A tiny cursor move must produce a comparably tiny position delta,
        // not a jump onto the ray.
        let step = interaction
            .cursor_moved(Vec2::new(0.51, 0.0), &camera, 1.0)
            .unwrap();
        assert!(step.position.length() < 0.1);
        assert!(step.position.x > 0.0);

        // Repeating the same cursor position adds nothing further.
        let settled = interaction
            .cursor_moved(Vec2::new(0.51, 0.0), &camera, 1.0)
            .unwrap();
        assert!((settled.position - step.position).length() < 1e-5);
    }

    #[test]
    fn immovable_hit_falls_back_to_camera_grab() {
        let mut interaction = Interaction::default();
        interaction.grab_geometry(1, Vec3::ZERO, Vec3::ZERO, MoveMask::NONE);
        assert!(!interaction.dragging());
    }

    #[test]
    fn scroll_moves_the_camera_along_z() {
        let camera = Camera::new();
        let props = camera.properties();
        props.set_position_m(Vec3::new(0.0, 0.0, 1.0));

        Interaction::default().scroll(1.0, props, 0.5);
        assert!((props.position_m().z - 0.0).abs() < 1e-6);

        Interaction::default().scroll(-2.0, props, 0.5);
        assert!((props.position_m().z - 2.0).abs() < 1e-6);
    }
}
