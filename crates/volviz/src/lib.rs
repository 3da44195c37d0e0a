//! Interactive visualization of volumetric data with slicing planes, marker
//! cubes and triangle meshes, rendered through a deferred shading pipeline
//! on wgpu.
//!
//! The render thread owns the window and GPU state via [`Visualizer`];
//! worker threads register and update geometry through a cloneable
//! [`VisualizerHandle`]. Geometry is addressed by name, picked with the
//! mouse and, where its move mask allows, dragged in the scene.

pub mod app;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod light;
pub mod picking;
pub mod registry;
pub mod renderer;
pub mod sync;
pub mod volume;

pub use app::{Visualizer, VisualizerHandle, DEFAULT_SCALE_M};
pub use error::{Result, VizError};
pub use geometry::{
    Axis, CubeDescriptor, GeometryDescriptor, MeshDescriptor, MoveMask, PlaneDescriptor,
};
pub use light::{Light, LightName};
pub use renderer::pipelines::compose::DisplayMode;
pub use volume::{VolumeDescriptor, VolumeSampleType};
