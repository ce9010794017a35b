use crate::NodeId;
use crate::types::{BBox, Transform};

/// The rendering surface a stage drives.
///
/// The stage never produces pixels; it asks the surface to draw a node, applies validated
/// transforms, and reads back measurements. Surfaces report size changes they detect on their
/// own through [`crate::Stage::notify_size_changed`].
pub trait Surface {
    /// Draws (or re-draws) a node's own content.
    fn draw(&mut self, node: NodeId) {
        let _ = node;
    }

    /// Measures a drawn node in its local space.
    fn measure(&mut self, node: NodeId) -> BBox;

    fn apply_transform(&mut self, node: NodeId, transform: Transform);

    /// Applies a node's current opacity.
    fn apply_opacity(&mut self, node: NodeId, opacity: f64) {
        let _ = (node, opacity);
    }

    /// Releases anything held for a disposed node.
    fn release(&mut self, node: NodeId) {
        let _ = node;
    }
}

/// A surface that measures everything as empty and ignores output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSurface;

impl Surface for NullSurface {
    fn measure(&mut self, _node: NodeId) -> BBox {
        BBox::default()
    }

    fn apply_transform(&mut self, _node: NodeId, _transform: Transform) {}
}
