pub mod compose;
pub mod lighting;
pub mod overlay;
pub mod scene;
