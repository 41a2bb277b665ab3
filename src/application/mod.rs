//! Application services layer: rendering and deferred typesetting.

pub mod error;
pub mod render;
pub mod typeset;
