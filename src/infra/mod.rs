//! Infrastructure adapters: host document, asset loading, file watching and
//! telemetry.

pub mod document;
pub mod error;
pub mod loader;
pub mod telemetry;
pub mod watch;
