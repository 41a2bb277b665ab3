/// Output sink the render pipeline writes into.
///
/// The host owns the surface; the pipeline only replaces its content. All
/// methods take `&self` so a surface can be shared between a viewer and the
/// typesetting worker.
pub trait ViewerSurface: Send + Sync {
    /// Replace the entire content of the surface.
    fn replace_content(&self, html: String);

    /// Current content of the surface.
    fn content(&self) -> String;

    /// Replace the content only if it still equals `expected`. Returns whether
    /// the replacement happened.
    fn replace_if_unchanged(&self, expected: &str, html: String) -> bool;
}
