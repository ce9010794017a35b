use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use serde_json::Value;

use crate::data_component::DataComponent;
use crate::registry::Phase;
use crate::tween::Tween;
use crate::types::{BBox, Coord, Layout, Lifecycle, Transform, Visibility};
use crate::NodeId;

/// Dirty flags of a node, one per [`Phase`].
///
/// Flags are only ever flipped by the stage together with the node's registry membership, so
/// a set flag always means "queued for that phase".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationState {
    flags: [bool; Phase::COUNT],
}

impl ValidationState {
    pub fn is_invalid(&self, phase: Phase) -> bool {
        self.flags[phase.slot()]
    }

    pub fn is_clean(&self) -> bool {
        !self.flags.iter().any(|f| *f)
    }

    pub(crate) fn set(&mut self, phase: Phase, invalid: bool) -> bool {
        let prev = self.flags[phase.slot()];
        self.flags[phase.slot()] = invalid;
        prev != invalid
    }
}

/// Concrete node kinds.
#[derive(Debug)]
pub enum NodeKind {
    Leaf,
    Container(ContainerState),
    Data(Box<DataComponent>),
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeKind::Leaf)
    }

    pub fn container(&self) -> Option<&ContainerState> {
        match self {
            NodeKind::Leaf => None,
            NodeKind::Container(c) => Some(c),
            NodeKind::Data(d) => Some(d.container()),
        }
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut ContainerState> {
        match self {
            NodeKind::Leaf => None,
            NodeKind::Container(c) => Some(c),
            NodeKind::Data(d) => Some(d.container_mut()),
        }
    }

    pub fn data(&self) -> Option<&DataComponent> {
        match self {
            NodeKind::Data(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn data_mut(&mut self) -> Option<&mut DataComponent> {
        match self {
            NodeKind::Data(d) => Some(d),
            _ => None,
        }
    }
}

/// Container-only state: children and their arrangement.
#[derive(Clone, Debug, Default)]
pub struct ContainerState {
    pub(crate) children: Vec<NodeId>,
    pub(crate) layout: Layout,
    /// Size of the laid out content (used to resolve children's percentages).
    pub(crate) content_size: (f64, f64),
}

impl ContainerState {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn content_size(&self) -> (f64, f64) {
        self.content_size
    }
}

/// Anything with a validation state and a set of phases it takes part in.
pub trait Validatable {
    fn validation(&self) -> &ValidationState;

    /// Phases this node can be queued for.
    fn supports(&self, phase: Phase) -> bool;

    fn is_invalid(&self, phase: Phase) -> bool {
        self.validation().is_invalid(phase)
    }
}

/// Relative placement inputs and the last validated absolute transform.
pub trait Positionable {
    fn x(&self) -> Coord;
    fn y(&self) -> Coord;
    fn set_x(&mut self, x: Coord) -> bool;
    fn set_y(&mut self, y: Coord) -> bool;
    fn transform(&self) -> Transform;
}

/// A displayable unit in the stage hierarchy.
#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) user_id: Option<String>,
    pub(crate) kind: NodeKind,
    pub(crate) validation: ValidationState,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) ready: bool,
    pub(crate) visibility: Visibility,
    pub(crate) opacity: f64,
    pub(crate) opacity_tween: Option<Tween>,
    pub(crate) disabled: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) mask: Option<NodeId>,
    pub(crate) x: Coord,
    pub(crate) y: Coord,
    pub(crate) dx: f64,
    pub(crate) dy: f64,
    pub(crate) scale: f64,
    pub(crate) rotation: f64,
    pub(crate) transform: Option<Transform>,
    pub(crate) bbox: BBox,
    pub(crate) defaults: Vec<(String, Value)>,
    pub(crate) properties: Vec<(String, Value)>,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            user_id: None,
            kind,
            validation: ValidationState::default(),
            lifecycle: Lifecycle::New,
            ready: false,
            visibility: Visibility::Visible,
            opacity: 1.0,
            opacity_tween: None,
            disabled: false,
            parent: None,
            mask: None,
            x: Coord::default(),
            y: Coord::default(),
            dx: 0.0,
            dy: 0.0,
            scale: 1.0,
            rotation: 0.0,
            transform: None,
            bbox: BBox::default(),
            defaults: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The user-assigned identifier, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_inited(&self) -> bool {
        self.lifecycle == Lifecycle::Inited
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn mask(&self) -> Option<NodeId> {
        self.mask
    }

    pub fn children(&self) -> &[NodeId] {
        self.kind.container().map(ContainerState::children).unwrap_or(&[])
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Display property applied during validation (deferred defaults included).
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub(crate) fn set_property(&mut self, name: &str, value: Value) -> bool {
        match self.properties.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) if *v == value => false,
            Some((_, v)) => {
                *v = value;
                true
            }
            None => {
                self.properties.push((name.into(), value));
                true
            }
        }
    }

    /// Applies deferred defaults for properties the caller has not set explicitly.
    pub(crate) fn apply_defaults(&mut self) -> usize {
        let defaults = core::mem::take(&mut self.defaults);
        let mut applied = 0;
        for (name, value) in defaults {
            if self.property(&name).is_none() {
                self.properties.push((name, value));
                applied += 1;
            }
        }
        applied
    }

    pub(crate) fn local_offset(&self, parent_size: (f64, f64)) -> (f64, f64) {
        (
            self.x.resolve(parent_size.0) + self.dx,
            self.y.resolve(parent_size.1) + self.dy,
        )
    }
}

impl Validatable for Node {
    fn validation(&self) -> &ValidationState {
        &self.validation
    }

    fn supports(&self, phase: Phase) -> bool {
        match phase {
            Phase::Content | Phase::Position => true,
            Phase::Layout => self.kind.is_container(),
            Phase::Data | Phase::RawData | Phase::DataItems | Phase::DataRange => {
                self.kind.data().is_some()
            }
        }
    }
}

impl Positionable for Node {
    fn x(&self) -> Coord {
        self.x
    }

    fn y(&self) -> Coord {
        self.y
    }

    fn set_x(&mut self, x: Coord) -> bool {
        if self.x == x {
            return false;
        }
        self.x = x;
        true
    }

    fn set_y(&mut self, y: Coord) -> bool {
        if self.y == y {
            return false;
        }
        self.y = y;
        true
    }

    fn transform(&self) -> Transform {
        self.transform.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use serde_json::json;

    fn leaf() -> Node {
        let mut arena = Arena::new();
        let id = arena.insert_with(|_| ());
        Node::new(id, NodeKind::Leaf)
    }

    #[test]
    fn leaf_supports_only_visual_phases() {
        let n = leaf();
        assert!(n.supports(Phase::Content));
        assert!(n.supports(Phase::Position));
        assert!(!n.supports(Phase::Layout));
        assert!(!n.supports(Phase::Data));
    }

    #[test]
    fn defaults_do_not_override_explicit_properties() {
        let mut n = leaf();
        n.set_property("fill", json!("red"));
        n.defaults.push(("fill".into(), json!("black")));
        n.defaults.push(("stroke".into(), json!("blue")));
        assert_eq!(n.apply_defaults(), 1);
        assert_eq!(n.property("fill"), Some(&json!("red")));
        assert_eq!(n.property("stroke"), Some(&json!("blue")));
        assert!(n.defaults.is_empty());
    }

    #[test]
    fn coordinate_setters_report_changes() {
        let mut n = leaf();
        assert!(!n.set_x(Coord::Absolute(0.0)));
        assert!(n.set_x(Coord::Percent(0.5)));
        assert_eq!(n.local_offset((200.0, 100.0)), (100.0, 0.0));
    }
}
