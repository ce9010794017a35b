//! A headless invalidation scheduler and data-window engine for chart components.
//!
//! This crate is the update core underneath a charting engine. Nodes (leaves, containers and
//! data components) mark themselves dirty for one of seven phases; a [`Stage`] coalesces the
//! marks into a single frame request and, when the host fires that frame, drains the phases
//! in a fixed order:
//!
//! data → raw data → data items → data range → layout → content → position
//!
//! Data components parse raw records in time-boxed chunks, so a large data set spreads over
//! several frames instead of blocking the host. Their fractional zoom window maps onto an
//! item index range that drives which items are enabled.
//!
//! It is rendering-agnostic. The host is expected to provide:
//! - a frame-request callback and a call to [`Stage::run_frame`] per display frame
//! - a [`Surface`] that draws, measures and places nodes
//! - raw records (`serde_json` objects), directly or through [`LoaderEvent`]s
#![forbid(unsafe_code)]

extern crate alloc;

#[macro_use]
mod macros;

mod arena;
mod data_component;
mod data_item;
mod error;
mod event;
mod loader;
mod node;
mod options;
mod registry;
mod scheduler;
mod stage;
mod state;
mod store;
mod surface;
mod tween;
mod types;
mod zoom;


pub use arena::NodeId;
pub use data_component::{DataBound, DataComponent, RawRecord};
pub use data_item::DataItem;
pub use error::{Error, Result};
pub use event::{Event, EventKind, Listener};
pub use loader::{LoadAction, LoaderEvent, LoaderOptions};
pub use node::{
    ContainerState, Node, NodeKind, Positionable, Validatable, ValidationState,
};
pub use options::{DataOptions, FieldAdapter, FieldBindings};
pub use registry::{InvalidationRegistry, Phase};
pub use scheduler::{Clock, FrameReport, FrameRequestCallback, Scheduler, SchedulerOptions};
pub use stage::{DisposeReport, Stage};
pub use state::WindowState;
pub use store::{Indexed, OrderedDataStore, StoreChange};
pub use surface::{NullSurface, Surface};
pub use tween::{Easing, Tween};
pub use types::{
    BBox, Coord, IndexRange, Layout, Lifecycle, Priority, Transform, Visibility, ZoomRange,
};
pub use zoom::{
    ZoomLimits, ZoomResolution, end_index_for, index_range_for, resolve_zoom, start_index_for,
    window_for_indexes, working_range,
};
