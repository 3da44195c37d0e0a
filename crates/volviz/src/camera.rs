//! Camera state and matrix caches.
//!
//! Properties (orientation, position, field of view, aspect ratio) live in
//! [`CameraProperties`], which is `Sync` and may be mutated from any thread.
//! Each write marks the dependent matrix caches dirty through shared
//! [`DirtyFlag`]s. The matrices themselves live in [`Camera`], which is
//! owned by the render thread; reads recompute lazily and pay no lock on the
//! clean path.
//!
//! The projection uses a reversed, infinite-far-plane convention: the far
//! plane maps to depth 0 and the near plane to depth 1. This maximizes
//! floating-point depth precision for distant geometry and requires the
//! renderer to depth-test with `Greater` and clear depth to 0.

use std::cell::Cell;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::error::{Result, VizError};
use crate::sync::{Cached, DirtyFlag, ObservableCell};

/// Near plane distance in render-space units. Effectively zero; with the
/// reversed-infinite projection it only bounds the depth-1 end of the range.
pub const NEAR_PLANE: f32 = 1e-3;

/// Scale changes smaller than this do not invalidate the view matrix.
const SCALE_EPSILON_M: f32 = 1e-12;

/// Thread-safe camera properties. Writers may be any thread; every write
/// invalidates the caches of the render-thread [`Camera`] that shares the
/// dirty flags.
pub struct CameraProperties {
    orientation: ObservableCell<Quat>,
    position_m: ObservableCell<Vec3>,
    fov_y: ObservableCell<f32>,
    aspect: ObservableCell<f32>,
}

impl CameraProperties {
    fn new(
        proj_dirty: &Arc<DirtyFlag>,
        view_dirty: &Arc<DirtyFlag>,
        view_proj_dirty: &Arc<DirtyFlag>,
    ) -> Self {
        let mut orientation = ObservableCell::new(Quat::IDENTITY);
        let mut position_m = ObservableCell::new(Vec3::ZERO);
        // 110 degree vertical field of view, 4:3, matching the original
        // defaults.
        let mut fov_y = ObservableCell::new(110f32.to_radians());
        let mut aspect = ObservableCell::new(4.0 / 3.0);

        fn invalidate<T>(flag: &Arc<DirtyFlag>, product: &Arc<DirtyFlag>) -> impl Fn(&T) + Send + Sync {
            let flag = Arc::clone(flag);
            let product = Arc::clone(product);
            move |_| {
                flag.mark();
                product.mark();
            }
        }

        orientation.on_write(invalidate(view_dirty, view_proj_dirty));
        position_m.on_write(invalidate(view_dirty, view_proj_dirty));
        fov_y.on_write(invalidate(proj_dirty, view_proj_dirty));
        aspect.on_write(invalidate(proj_dirty, view_proj_dirty));

        Self {
            orientation,
            position_m,
            fov_y,
            aspect,
        }
    }

    /// Sets the orientation; the quaternion is normalized before storing.
    pub fn set_orientation(&self, orientation: Quat) -> Result<()> {
        if orientation.length_squared() < f32::EPSILON {
            return Err(VizError::ContractViolation(
                "camera orientation must be a non-zero quaternion".into(),
            ));
        }
        self.orientation.set(orientation.normalize());
        Ok(())
    }

    pub fn orientation(&self) -> Quat {
        self.orientation.get()
    }

    /// Sets the camera position in metres.
    pub fn set_position_m(&self, position_m: Vec3) {
        self.position_m.set(position_m);
    }

    pub fn position_m(&self) -> Vec3 {
        self.position_m.get()
    }

    /// Sets the vertical field of view in radians; must be positive.
    pub fn set_fov_y(&self, fov_y: f32) -> Result<()> {
        if fov_y <= 0.0 || fov_y >= std::f32::consts::PI {
            return Err(VizError::ContractViolation(format!(
                "vertical field of view must be in (0, pi), got {fov_y}"
            )));
        }
        self.fov_y.set(fov_y);
        Ok(())
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y.get()
    }

    /// Sets the aspect ratio (width / height); must be positive.
    pub fn set_aspect(&self, aspect: f32) -> Result<()> {
        if aspect <= 0.0 {
            return Err(VizError::ContractViolation(format!(
                "aspect ratio must be positive, got {aspect}"
            )));
        }
        self.aspect.set(aspect);
        Ok(())
    }

    pub fn aspect(&self) -> f32 {
        self.aspect.get()
    }
}

/// Render-thread camera view: shared properties plus lazily cached matrices.
/// `!Sync` by construction; only the thread that owns the GPU context may
/// read the matrices.
pub struct Camera {
    props: Arc<CameraProperties>,
    proj_cache: Cached<Mat4>,
    view_cache: Cached<Mat4>,
    view_proj_cache: Cached<Mat4>,
    /// World scale the cached view matrix was computed with.
    last_scale_m: Cell<f32>,
}

impl Camera {
    pub fn new() -> Self {
        let proj_dirty = DirtyFlag::new();
        let view_dirty = DirtyFlag::new();
        // The product cache has its own flag, marked by every projection or
        // view invalidation path.
        let view_proj_dirty = DirtyFlag::new();

        let props = Arc::new(CameraProperties::new(
            &proj_dirty,
            &view_dirty,
            &view_proj_dirty,
        ));

        Self {
            props,
            proj_cache: Cached::new(proj_dirty),
            view_cache: Cached::new(view_dirty),
            view_proj_cache: Cached::new(view_proj_dirty),
            last_scale_m: Cell::new(f32::NAN),
        }
    }

    /// The shared, thread-safe property set.
    pub fn properties(&self) -> &Arc<CameraProperties> {
        &self.props
    }

    /// Cached perspective projection with reversed infinite depth: depth 1
    /// at [`NEAR_PLANE`], depth 0 at infinity.
    pub fn projection_matrix(&self) -> Mat4 {
        let props = &self.props;
        self.proj_cache.get(|| {
            Mat4::perspective_infinite_reverse_rh(props.fov_y(), props.aspect(), NEAR_PLANE)
        })
    }

    /// Cached inverse camera transform. The camera position is stored in
    /// metres and divided by `world_scale_m` (metres per render unit) before
    /// use; a scale change beyond an epsilon forces recomputation.
    pub fn view_matrix(&self, world_scale_m: f32) -> Mat4 {
        // The NaN sentinel marks "no scale seen yet" and compares unequal to
        // everything, so it must be checked explicitly.
        let last = self.last_scale_m.get();
        if last.is_nan() || (world_scale_m - last).abs() > SCALE_EPSILON_M {
            self.view_cache.invalidate();
            self.view_proj_cache.invalidate();
            self.last_scale_m.set(world_scale_m);
        }
        let props = &self.props;
        self.view_cache.get(|| {
            let position = props.position_m() / world_scale_m;
            (Mat4::from_translation(position) * Mat4::from_quat(props.orientation())).inverse()
        })
    }

    /// Cached `projection * view` product.
    pub fn view_projection_matrix(&self, world_scale_m: f32) -> Mat4 {
        let proj = self.projection_matrix();
        let view = self.view_matrix(world_scale_m);
        self.view_proj_cache.get(|| proj * view)
    }

    /// Inverse-transforms a screen point (NDC, each axis in [-1, 1]) at the
    /// given normalized depth into a world-space position.
    pub fn unproject(&self, screen: Vec2, depth: f32, world_scale_m: f32) -> Vec3 {
        let inv = self.view_projection_matrix(world_scale_m).inverse();
        let clip = Vec4::new(screen.x, screen.y, depth, 1.0);
        let world = inv * clip;
        world.xyz() / world.w
    }

    /// Forward transform of a world position into NDC x/y plus depth.
    pub fn project(&self, world: Vec3, world_scale_m: f32) -> Vec3 {
        let clip = self.view_projection_matrix(world_scale_m) * world.extend(1.0);
        clip.xyz() / clip.w
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_projection(fov_y: f32, aspect: f32) -> Mat4 {
        Mat4::perspective_infinite_reverse_rh(fov_y, aspect, NEAR_PLANE)
    }

    #[test]
    fn projection_cache_tracks_property_writes() {
        let camera = Camera::new();
        let initial = camera.projection_matrix();
        assert_eq!(initial, fresh_projection(110f32.to_radians(), 4.0 / 3.0));

        camera.properties().set_fov_y(1.0).unwrap();
        assert_eq!(camera.projection_matrix(), fresh_projection(1.0, 4.0 / 3.0));

        camera.properties().set_aspect(2.0).unwrap();
        assert_eq!(camera.projection_matrix(), fresh_projection(1.0, 2.0));
    }

    #[test]
    fn view_cache_invalidated_by_scale_change() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 2.0));

        let v1 = camera.view_matrix(1.0);
        let v2 = camera.view_matrix(2.0);
        // Halving the scale doubles the render-space camera distance.
        assert!((v1.w_axis.z - (-2.0)).abs() < 1e-6);
        assert!((v2.w_axis.z - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn reversed_depth_convention() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.0, 0.0, 1.0));

        // A point at the near plane projects to depth ~1, a distant point to
        // depth ~0.
        let near = camera.project(Vec3::new(0.0, 0.0, 1.0 - NEAR_PLANE), 1.0);
        let far = camera.project(Vec3::new(0.0, 0.0, -1000.0), 1.0);
        assert!((near.z - 1.0).abs() < 1e-3);
        assert!(far.z < 1e-2);
    }

    #[test]
    fn unproject_inverts_project() {
        let camera = Camera::new();
        camera.properties().set_position_m(Vec3::new(0.1, -0.2, 3.0));
        camera
            .properties()
            .set_orientation(Quat::from_rotation_y(0.3))
            .unwrap();

        let world = Vec3::new(0.25, -0.5, 0.75);
        let ndc = camera.project(world, 1.0);
        let back = camera.unproject(ndc.truncate(), ndc.z, 1.0);
        assert!((back - world).length() < 1e-3);
    }

    #[test]
    fn orientation_is_normalized_on_set() {
        let camera = Camera::new();
        camera
            .properties()
            .set_orientation(Quat::from_xyzw(0.0, 0.0, 0.0, 4.0))
            .unwrap();
        let q = camera.properties().orientation();
        assert!((q.length() - 1.0).abs() < 1e-6);

        assert!(camera
            .properties()
            .set_orientation(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0))
            .is_err());
    }
}
