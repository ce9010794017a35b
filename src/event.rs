use alloc::string::String;
use alloc::sync::Arc;

use crate::{NodeId, Stage};

/// Notifications dispatched by a [`Stage`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    BeforeValidated,
    /// First successful content validation.
    Inited,
    /// The node and all of its descendants are inited.
    Ready,
    PositionChanged,
    Transformed,
    SizeChanged,
    Shown,
    Hidden,
    DataValidated,
    RawDataValidated,
    DataItemsValidated,
    /// Items were added to or removed from a data set.
    ItemsChanged {
        data_set: String,
        inserted: usize,
        removed: usize,
    },
    DataRangeChanged,
    StartEndChanged,
    /// An animated zoom reached its target.
    ZoomEnded,
    LoaderStarted,
    LoaderDone,
    LoaderError(String),
    Disposed,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub target: NodeId,
    pub kind: EventKind,
}

impl Event {
    pub fn new(target: NodeId, kind: EventKind) -> Self {
        Self { target, kind }
    }
}

/// A stage-wide event listener.
///
/// Listeners run after the validation step that produced the event has returned, so they may
/// freely mutate the stage (zoom, set data, invalidate). Anything they invalidate is picked up
/// by a later phase or the next frame.
pub type Listener = Arc<dyn Fn(&mut Stage, &Event) + Send + Sync>;
