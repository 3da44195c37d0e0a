//! Error taxonomy for the visualizer.
//!
//! Setup errors are fatal and surface at construction time. Usage errors are
//! caller bugs (unknown geometry name in single-threaded mode, descriptor
//! kind mismatch). The "geometry not initialized yet" race under
//! multithreading is *not* an error: [`crate::Visualizer::update_geometry`]
//! reports it as `Ok(false)` so the caller can retry next frame.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VizError {
    /// Fatal setup failure: no adapter, device request failed, surface
    /// misconfigured. There is no recovery path.
    #[error("setup failed: {0}")]
    Setup(String),

    /// `update_geometry` was called for a name that was never added
    /// (single-threaded mode only).
    #[error("unknown geometry '{0}'")]
    UnknownGeometry(String),

    /// A geometry update carried a descriptor of a different kind than the
    /// one the instance was registered with.
    #[error("geometry '{name}' is a {expected}, got a {got} descriptor")]
    GeometryTypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    /// Malformed geometry data, e.g. a mesh index outside the vertex range.
    #[error("invalid geometry data: {0}")]
    InvalidGeometryData(String),

    /// A precondition was violated (non-positive scale, light position with
    /// a non-zero w component, volume payload size mismatch, ...).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// The GPU driver reported an error. Logged and surfaced instead of
    /// silently ignored.
    #[error("graphics device error: {0}")]
    GraphicsDevice(String),
}

pub type Result<T> = std::result::Result<T, VizError>;
