//! Domain layer types and invariants.

pub mod surface;
pub mod types;

pub use surface::ViewerSurface;
pub use types::{MathRenderer, RenderState};
