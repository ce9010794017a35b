use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::arena::Arena;
use crate::data_component::{DataBound, DataComponent, ParseOutcome, RawRecord, ZoomAnimation};
use crate::data_item::DataItem;
use crate::error::{Error, Result};
use crate::event::{Event, EventKind, Listener};
use crate::loader::{LoadAction, LoaderEvent};
use crate::node::{ContainerState, Node, NodeKind, Positionable, Validatable};
use crate::options::DataOptions;
use crate::registry::{InvalidationRegistry, Phase};
use crate::scheduler::{FrameReport, Scheduler, SchedulerOptions};
use crate::state::WindowState;
use crate::surface::{NullSurface, Surface};
use crate::tween::{Easing, Tween};
use crate::types::{Coord, Layout, Lifecycle, Visibility, ZoomRange};
use crate::zoom::{resolve_zoom, window_for_indexes};
use crate::NodeId;

/// What a [`Stage::dispose`] call released.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DisposeReport {
    pub nodes: usize,
    pub data_items: usize,
    /// Registry entries dropped across all phases.
    pub registry_entries: usize,
}

/// The session that owns the node hierarchy, its scheduler and the host collaborators.
///
/// Nodes live in an arena and are addressed by [`NodeId`]. Mutations mark nodes invalid for a
/// [`Phase`]; the host runs [`Self::run_frame`] whenever the scheduler requests a frame, and
/// the registry is drained in phase order.
pub struct Stage {
    nodes: Arena<Node>,
    scheduler: Scheduler,
    surface: Box<dyn Surface>,
    listeners: Vec<Listener>,
    pending_events: VecDeque<Event>,
    outbox: Vec<Event>,
    record_events: bool,
    in_frame: bool,
    flushing: bool,
    user_ids: HashMap<String, NodeId>,
    animating: BTreeSet<NodeId>,
    now_ms: u64,
}

impl Stage {
    pub fn new(options: SchedulerOptions) -> Self {
        Self::with_surface(options, NullSurface)
    }

    pub fn with_surface(options: SchedulerOptions, surface: impl Surface + 'static) -> Self {
        Self {
            nodes: Arena::new(),
            scheduler: Scheduler::new(options),
            surface: Box::new(surface),
            listeners: Vec::new(),
            pending_events: VecDeque::new(),
            outbox: Vec::new(),
            record_events: true,
            in_frame: false,
            flushing: false,
            user_ids: HashMap::new(),
            animating: BTreeSet::new(),
            now_ms: 0,
        }
    }

    pub fn set_surface(&mut self, surface: impl Surface + 'static) {
        self.surface = Box::new(surface);
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn registry(&self) -> &InvalidationRegistry {
        self.scheduler.registry()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 0
    }

    /// Timestamp passed to the most recent [`Self::run_frame`].
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    // ---------------------------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------------------------

    pub fn on(&mut self, listener: impl Fn(&mut Stage, &Event) + Send + Sync + 'static) {
        self.listeners.push(Arc::new(listener));
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Enables/disables recording of dispatched events for [`Self::take_events`].
    pub fn set_record_events(&mut self, record: bool) {
        self.record_events = record;
        if !record {
            self.outbox.clear();
        }
    }

    /// Drains the recorded events (in dispatch order).
    pub fn take_events(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.outbox)
    }

    fn dispatch(&mut self, target: NodeId, kind: EventKind) {
        self.pending_events.push_back(Event::new(target, kind));
        if !self.in_frame {
            self.flush_events();
        }
    }

    /// Reports structural item changes of every data set as [`EventKind::ItemsChanged`].
    fn notify_item_changes(&mut self, id: NodeId) {
        let Ok(dc) = self.data_mut(id) else {
            return;
        };
        for (data_set, inserted, removed) in dc.take_item_changes() {
            self.dispatch(
                id,
                EventKind::ItemsChanged {
                    data_set,
                    inserted,
                    removed,
                },
            );
        }
    }

    fn flush_events(&mut self) {
        if self.flushing {
            return;
        }
        self.flushing = true;
        while let Some(event) = self.pending_events.pop_front() {
            let listeners = self.listeners.clone();
            for listener in &listeners {
                listener(self, &event);
            }
            if self.record_events {
                self.outbox.push(event);
            }
        }
        self.flushing = false;
    }

    // ---------------------------------------------------------------------------------------
    // Invalidation
    // ---------------------------------------------------------------------------------------

    /// Queues a node for a phase and requests a frame.
    ///
    /// Returns `true` if the node was not already queued. Phases the node does not take part
    /// in are ignored, as are visual phases of disabled nodes.
    pub fn mark_invalid(&mut self, id: NodeId, phase: Phase) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if !node.supports(phase) {
            cwarn!(?id, ?phase, "mark_invalid: phase not supported by node kind");
            return false;
        }
        if node.disabled && !phase.is_data_phase() {
            return false;
        }
        let newly = node.validation.set(phase, true);
        self.scheduler.registry_mut().insert(id, phase);
        // Inside a frame, leftover work is re-requested once the drain finishes.
        if !self.in_frame {
            self.scheduler.request_frame();
        }
        newly
    }

    /// Removes a node from a phase. Returns `true` if it was queued.
    pub fn unmark(&mut self, id: NodeId, phase: Phase) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        let was = node.validation.set(phase, false);
        self.scheduler.registry_mut().remove(id, phase);
        was
    }

    pub fn is_invalid(&self, id: NodeId, phase: Phase) -> bool {
        self.nodes.get(id).is_some_and(|n| n.is_invalid(phase))
    }

    // ---------------------------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------------------------

    pub fn create_leaf(&mut self) -> NodeId {
        self.insert_node(|_| NodeKind::Leaf)
    }

    pub fn create_container(&mut self, layout: Layout) -> NodeId {
        self.insert_node(|_| NodeKind::Container(ContainerState::new(layout)))
    }

    pub fn create_data_component(&mut self, options: DataOptions) -> NodeId {
        self.insert_node(|id| NodeKind::Data(Box::new(DataComponent::new(id, options))))
    }

    fn insert_node(&mut self, kind: impl FnOnce(NodeId) -> NodeKind) -> NodeId {
        let id = self.nodes.insert_with(|id| Node::new(id, kind(id)));
        ctrace!(?id, "insert_node");
        if self.nodes.get(id).is_some_and(|n| n.kind.is_container()) {
            self.mark_invalid(id, Phase::Layout);
        }
        self.mark_invalid(id, Phase::Content);
        self.mark_invalid(id, Phase::Position);
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(Error::UnknownNode(id))
    }

    pub fn data(&self, id: NodeId) -> Result<&DataComponent> {
        let node = self.nodes.get(id).ok_or(Error::UnknownNode(id))?;
        node.kind.data().ok_or(Error::NotADataComponent(id))
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut DataComponent> {
        let node = self.nodes.get_mut(id).ok_or(Error::UnknownNode(id))?;
        node.kind.data_mut().ok_or(Error::NotADataComponent(id))
    }

    /// Assigns a user identifier. Identifiers must be unique among live nodes.
    pub fn set_user_id(&mut self, id: NodeId, user_id: impl Into<String>) -> Result<()> {
        let user_id = user_id.into();
        if let Some(&existing) = self.user_ids.get(&user_id) {
            if existing == id {
                return Ok(());
            }
            return Err(Error::DuplicateId {
                id: user_id,
                existing,
            });
        }
        let node = self.node_mut(id)?;
        let previous = node.user_id.replace(user_id.clone());
        if let Some(previous) = previous {
            self.user_ids.remove(&previous);
        }
        self.user_ids.insert(user_id, id);
        Ok(())
    }

    pub fn find(&self, user_id: &str) -> Option<NodeId> {
        self.user_ids.get(user_id).copied()
    }

    fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut cur = self.nodes.get(id).and_then(Node::parent);
        while let Some(p) = cur {
            depth += 1;
            cur = self.nodes.get(p).and_then(Node::parent);
        }
        depth
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.nodes.contains(child) {
            return Err(Error::UnknownNode(child));
        }
        let parent_node = self.nodes.get(parent).ok_or(Error::UnknownNode(parent))?;
        if !parent_node.kind.is_container() {
            return Err(Error::NotAContainer(parent));
        }
        let mut cur = Some(parent);
        while let Some(p) = cur {
            if p == child {
                return Err(Error::CyclicParent { parent, child });
            }
            cur = self.nodes.get(p).and_then(Node::parent);
        }

        if let Some(old) = self.nodes.get(child).and_then(Node::parent) {
            self.detach(old, child);
        }
        if let Some(container) = self
            .nodes
            .get_mut(parent)
            .and_then(|n| n.kind.container_mut())
        {
            container.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
        }
        self.mark_invalid(parent, Phase::Layout);
        self.mark_invalid(child, Phase::Position);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let node = self.nodes.get(child).ok_or(Error::UnknownNode(child))?;
        if node.parent != Some(parent) {
            return Ok(());
        }
        self.detach(parent, child);
        Ok(())
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(container) = self
            .nodes
            .get_mut(parent)
            .and_then(|n| n.kind.container_mut())
        {
            container.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
        self.mark_invalid(parent, Phase::Layout);
        self.mark_invalid(child, Phase::Position);
    }

    pub fn set_mask(&mut self, id: NodeId, mask: Option<NodeId>) -> Result<()> {
        if let Some(m) = mask {
            if !self.nodes.contains(m) {
                return Err(Error::UnknownNode(m));
            }
        }
        let node = self.node_mut(id)?;
        if node.mask == mask {
            return Ok(());
        }
        node.mask = mask;
        self.mark_invalid(id, Phase::Content);
        Ok(())
    }

    pub fn set_x(&mut self, id: NodeId, x: Coord) -> Result<bool> {
        let changed = self.node_mut(id)?.set_x(x);
        if changed {
            self.mark_invalid(id, Phase::Position);
        }
        Ok(changed)
    }

    pub fn set_y(&mut self, id: NodeId, y: Coord) -> Result<bool> {
        let changed = self.node_mut(id)?.set_y(y);
        if changed {
            self.mark_invalid(id, Phase::Position);
        }
        Ok(changed)
    }

    /// Sets the pixel nudge applied on top of `x`/`y`.
    pub fn set_offset(&mut self, id: NodeId, dx: f64, dy: f64) -> Result<bool> {
        let node = self.node_mut(id)?;
        if node.dx == dx && node.dy == dy {
            return Ok(false);
        }
        node.dx = dx;
        node.dy = dy;
        self.mark_invalid(id, Phase::Position);
        Ok(true)
    }

    pub fn set_scale(&mut self, id: NodeId, scale: f64) -> Result<bool> {
        let node = self.node_mut(id)?;
        if node.scale == scale {
            return Ok(false);
        }
        node.scale = scale;
        self.mark_invalid(id, Phase::Position);
        Ok(true)
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: f64) -> Result<bool> {
        let node = self.node_mut(id)?;
        if node.rotation == rotation {
            return Ok(false);
        }
        node.rotation = rotation;
        self.mark_invalid(id, Phase::Position);
        Ok(true)
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: Value) -> Result<bool> {
        let changed = self.node_mut(id)?.set_property(name, value);
        if changed {
            self.mark_invalid(id, Phase::Content);
        }
        Ok(changed)
    }

    /// Registers a default applied on the node's first validation unless set explicitly.
    pub fn set_default(&mut self, id: NodeId, name: &str, value: Value) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.lifecycle != Lifecycle::New {
            if node.property(name).is_none() {
                node.set_property(name, value);
                self.mark_invalid(id, Phase::Content);
            }
            return Ok(());
        }
        node.defaults.push((name.into(), value));
        Ok(())
    }

    /// Disabling removes the node from the visual phases and from its parent's layout.
    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) -> Result<bool> {
        let node = self.node_mut(id)?;
        if node.disabled == disabled {
            return Ok(false);
        }
        node.disabled = disabled;
        let parent = node.parent;
        let is_container = node.kind.is_container();
        if disabled {
            for phase in [Phase::Layout, Phase::Content, Phase::Position] {
                self.unmark(id, phase);
            }
        } else {
            if is_container {
                self.mark_invalid(id, Phase::Layout);
            }
            self.mark_invalid(id, Phase::Content);
            self.mark_invalid(id, Phase::Position);
        }
        if let Some(parent) = parent {
            self.mark_invalid(parent, Phase::Layout);
        }
        Ok(true)
    }

    /// Reports that the surface detected a size change of a drawn node.
    pub fn notify_size_changed(&mut self, id: NodeId) -> Result<()> {
        let parent = self.node_mut(id)?.parent;
        self.mark_invalid(id, Phase::Content);
        self.mark_invalid(id, Phase::Position);
        if let Some(parent) = parent {
            self.mark_invalid(parent, Phase::Layout);
        }
        Ok(())
    }

    pub fn show(&mut self, id: NodeId, duration_ms: u64) -> Result<()> {
        self.fade(id, true, duration_ms)
    }

    pub fn hide(&mut self, id: NodeId, duration_ms: u64) -> Result<()> {
        self.fade(id, false, duration_ms)
    }

    fn fade(&mut self, id: NodeId, show: bool, duration_ms: u64) -> Result<()> {
        let now_ms = self.now_ms;
        let node = self.node_mut(id)?;
        let target = if show { 1.0 } else { 0.0 };
        if duration_ms == 0 {
            node.opacity_tween = None;
            node.opacity = target;
            node.visibility = if show {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
            self.animating.remove(&id);
            self.surface.apply_opacity(id, target);
            let kind = if show { EventKind::Shown } else { EventKind::Hidden };
            self.dispatch(id, kind);
            return Ok(());
        }
        node.visibility = if show {
            Visibility::Showing
        } else {
            Visibility::Hiding
        };
        match node.opacity_tween.as_mut() {
            Some(tween) => tween.retarget(now_ms, target, duration_ms),
            None => {
                node.opacity_tween = Some(Tween::new(
                    node.opacity,
                    target,
                    now_ms,
                    duration_ms,
                    Easing::Linear,
                ));
            }
        }
        self.animating.insert(id);
        self.scheduler.request_frame();
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Data
    // ---------------------------------------------------------------------------------------

    /// Mutates a component's raw data while its data users temporarily drop their shared
    /// reference, then re-shares the result.
    fn with_raw_mut(&mut self, id: NodeId, f: impl FnOnce(&mut Vec<RawRecord>)) -> Result<()> {
        let users = self.data(id)?.data_users.clone();
        for user in &users {
            if let Ok(dc) = self.data_mut(*user) {
                dc.take_raw_arc();
            }
        }
        let dc = self.data_mut(id)?;
        f(dc.raw_mut());
        let shared = Arc::clone(dc.raw_arc());
        for user in &users {
            if let Ok(dc) = self.data_mut(*user) {
                dc.set_raw_arc(Arc::clone(&shared));
            }
        }
        Ok(())
    }

    /// Replaces the raw data and schedules a full parse.
    pub fn set_data(&mut self, id: NodeId, raw: Vec<RawRecord>) -> Result<()> {
        if let Some(source) = self.data(id)?.data_source {
            self.remove_data_user(source, id)?;
        }
        let is_empty = raw.is_empty();
        let records = raw.len();
        self.with_raw_mut(id, move |r| *r = raw)?;
        cdebug!(?id, records, "set_data");

        let users = self.data(id)?.data_users.clone();
        for component in core::iter::once(id).chain(users) {
            let disposed = self.data_mut(component)?.reset_parse();
            ctrace!(?component, disposed, "set_data: disposed items");
            self.notify_item_changes(component);
            if is_empty {
                self.unmark(component, Phase::Data);
                self.mark_invalid(component, Phase::DataItems);
                self.dispatch(component, EventKind::DataValidated);
            } else {
                self.mark_invalid(component, Phase::Data);
            }
        }
        Ok(())
    }

    /// Appends records, parsing only the new ones, and optionally evicts the oldest.
    pub fn add_data(
        &mut self,
        id: NodeId,
        records: Vec<RawRecord>,
        remove_count: usize,
    ) -> Result<()> {
        let old_len = self.data(id)?.raw_data().len();
        let added = records.len();
        self.with_raw_mut(id, move |r| {
            r.extend(records);
            let remove = remove_count.min(r.len());
            r.drain(..remove);
        })?;
        cdebug!(?id, added, remove_count, "add_data");

        let users = self.data(id)?.data_users.clone();
        for component in core::iter::once(id).chain(users) {
            let pending = self.is_invalid(component, Phase::Data);
            let dc = self.data_mut(component)?;
            if !pending {
                dc.set_parse_cursor(old_len);
            }
            dc.evict_front(remove_count.min(old_len + added));
            self.notify_item_changes(component);
            if added > 0 || remove_count > 0 {
                self.mark_invalid(component, Phase::Data);
            }
            if remove_count > 0 {
                self.mark_invalid(component, Phase::DataItems);
            }
        }
        Ok(())
    }

    /// Evicts the `count` oldest records and their items.
    pub fn remove_data(&mut self, id: NodeId, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.with_raw_mut(id, |r| {
            let remove = count.min(r.len());
            r.drain(..remove);
        })?;
        let users = self.data(id)?.data_users.clone();
        for component in core::iter::once(id).chain(users) {
            let disposed = self.data_mut(component)?.evict_front(count);
            ctrace!(?component, disposed, "remove_data");
            self.notify_item_changes(component);
        }
        self.invalidate_data_items(id)
    }

    /// Replaces raw values in place. Items keep their identity; only bound values change.
    ///
    /// A different record count cannot be patched and falls back to [`Self::set_data`].
    pub fn update_data(&mut self, id: NodeId, raw: Vec<RawRecord>) -> Result<()> {
        if raw.len() != self.data(id)?.raw_data().len() {
            return self.set_data(id, raw);
        }
        self.with_raw_mut(id, move |r| *r = raw)?;
        let users = self.data(id)?.data_users.clone();
        for component in core::iter::once(id).chain(users) {
            self.mark_invalid(component, Phase::RawData);
        }
        Ok(())
    }

    /// Re-parses the current raw data. Data users are not affected.
    pub fn invalidate_data(&mut self, id: NodeId) -> Result<()> {
        // Stale items are disposed when the parse restarts at the first record.
        self.data_mut(id)?.restart_parse();
        self.mark_invalid(id, Phase::Data);
        Ok(())
    }

    /// Re-validates items (working values, extremes, range) here and in all data users.
    pub fn invalidate_data_items(&mut self, id: NodeId) -> Result<()> {
        let users = self.data(id)?.data_users.clone();
        self.mark_invalid(id, Phase::DataItems);
        for user in users {
            self.mark_invalid(user, Phase::DataItems);
        }
        Ok(())
    }

    pub fn invalidate_data_range(&mut self, id: NodeId) -> Result<()> {
        self.data(id)?;
        self.mark_invalid(id, Phase::DataRange);
        Ok(())
    }

    /// Makes `user` consume `source`'s raw data.
    pub fn add_data_user(&mut self, source: NodeId, user: NodeId) -> Result<()> {
        if source == user {
            return Err(Error::CyclicParent {
                parent: source,
                child: user,
            });
        }
        let shared = Arc::clone(self.data(source)?.raw_arc());
        if let Some(previous) = self.data(user)?.data_source {
            self.remove_data_user(previous, user)?;
        }
        let dc = self.data_mut(user)?;
        dc.data_source = Some(source);
        dc.set_raw_arc(shared);
        dc.reset_parse();
        self.notify_item_changes(user);
        let users = &mut self.data_mut(source)?.data_users;
        if !users.contains(&user) {
            users.push(user);
        }
        self.mark_invalid(user, Phase::Data);
        Ok(())
    }

    /// Detaches a data user. It keeps its current raw data and items.
    pub fn remove_data_user(&mut self, source: NodeId, user: NodeId) -> Result<()> {
        self.data_mut(source)?.data_users.retain(|u| *u != user);
        if let Ok(dc) = self.data_mut(user) {
            if dc.data_source == Some(source) {
                dc.data_source = None;
            }
        }
        Ok(())
    }

    /// Replaces the data component's options. Binding changes trigger a re-parse.
    pub fn update_data_options(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut DataOptions),
    ) -> Result<()> {
        let dc = self.data_mut(id)?;
        let mut next = dc.options().clone();
        f(&mut next);
        let rebind = next.bindings != dc.options().bindings
            || next.omit_empty_items != dc.options().omit_empty_items;
        dc.set_options(next);
        if rebind {
            self.invalidate_data(id)?;
        }
        self.mark_invalid(id, Phase::DataRange);
        Ok(())
    }

    /// Inserts or replaces a named data set (e.g. an aggregated view of the main items).
    pub fn set_data_set(&mut self, id: NodeId, name: &str, items: Vec<DataItem>) -> Result<()> {
        let dc = self.data_mut(id)?;
        let disposed = dc.insert_data_set(name, items);
        let current = dc.current_data_set() == name;
        ctrace!(?id, name, disposed, "set_data_set");
        self.notify_item_changes(id);
        if current {
            self.mark_invalid(id, Phase::DataItems);
        }
        Ok(())
    }

    /// Switches which data set drives items and range validation.
    pub fn set_current_data_set(&mut self, id: NodeId, name: &str) -> Result<bool> {
        let changed = self.data_mut(id)?.select_data_set(name);
        if changed {
            self.mark_invalid(id, Phase::DataItems);
        }
        Ok(changed)
    }

    pub fn handle_loader_event(&mut self, id: NodeId, event: LoaderEvent) -> Result<()> {
        match event {
            LoaderEvent::Started => {
                self.data(id)?;
                self.dispatch(id, EventKind::LoaderStarted);
            }
            LoaderEvent::LoadStarted | LoaderEvent::LoadEnded | LoaderEvent::ParseEnded => {
                ctrace!(?id, "loader progress");
            }
            LoaderEvent::Done(records) => {
                let action = self.data(id)?.options().loader.apply_to(records);
                match action {
                    LoadAction::Replace(records) => self.set_data(id, records)?,
                    LoadAction::Append {
                        records,
                        remove_count,
                    } => self.add_data(id, records, remove_count)?,
                    LoadAction::Patch(records) => self.update_data(id, records)?,
                }
                self.dispatch(id, EventKind::LoaderDone);
            }
            LoaderEvent::Error(message) => {
                cwarn!(?id, %message, "loader error");
                self.dispatch(id, EventKind::LoaderError(message));
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Zoom
    // ---------------------------------------------------------------------------------------

    /// Zooms the window. Returns the resolved target (or the current window, unchanged, when
    /// the request is not finite).
    pub fn zoom(&mut self, id: NodeId, range: ZoomRange, instantly: bool) -> Result<ZoomRange> {
        let now_ms = self.now_ms;
        let dc = self.data_mut(id)?;
        let current = ZoomRange::new(dc.start(), dc.end());
        let Some(res) = resolve_zoom(range, &dc.options().zoom_limits()) else {
            cwarn!(?id, ?range, "zoom: rejected non-finite window");
            return Ok(current);
        };
        let target = ZoomRange::new(res.start, res.end).with_priority(res.anchor);
        let duration = dc.options().interpolation_duration_ms;

        if instantly || duration == 0 {
            dc.zoom_animation = None;
            self.animating.remove(&id);
            self.apply_window(id, res.start, res.end)?;
            return Ok(target);
        }

        let easing = dc.options().interpolation_easing;
        let (start, end) = (dc.start(), dc.end());
        match dc.zoom_animation.as_mut() {
            Some(anim) if anim.targets() == (res.start, res.end) => return Ok(target),
            Some(anim) => {
                anim.start.retarget(now_ms, res.start, duration);
                anim.end.retarget(now_ms, res.end, duration);
            }
            None => {
                dc.zoom_animation = Some(ZoomAnimation {
                    start: Tween::new(start, res.start, now_ms, duration, easing),
                    end: Tween::new(end, res.end, now_ms, duration, easing),
                });
            }
        }
        self.animating.insert(id);
        self.scheduler.request_frame();
        Ok(target)
    }

    /// Zooms to an item index range of the current data set.
    pub fn zoom_to_indexes(
        &mut self,
        id: NodeId,
        start_index: usize,
        end_index: usize,
        instantly: bool,
    ) -> Result<ZoomRange> {
        let count = self.data(id)?.item_count();
        let (start, end) = window_for_indexes(start_index, end_index, count);
        self.zoom(id, ZoomRange::new(start, end), instantly)
    }

    /// Assigns the window start directly (no zoom constraints).
    pub fn set_start(&mut self, id: NodeId, start: f64) -> Result<bool> {
        let changed = self.data_mut(id)?.set_start(start);
        if changed {
            self.mark_invalid(id, Phase::DataRange);
            self.dispatch(id, EventKind::StartEndChanged);
        }
        Ok(changed)
    }

    /// Assigns the window end directly (no zoom constraints).
    pub fn set_end(&mut self, id: NodeId, end: f64) -> Result<bool> {
        let changed = self.data_mut(id)?.set_end(end);
        if changed {
            self.mark_invalid(id, Phase::DataRange);
            self.dispatch(id, EventKind::StartEndChanged);
        }
        Ok(changed)
    }

    pub fn restore_window_state(&mut self, id: NodeId, state: WindowState) -> Result<()> {
        self.apply_window(id, state.start, state.end)
    }

    fn apply_window(&mut self, id: NodeId, start: f64, end: f64) -> Result<()> {
        self.set_start(id, start)?;
        self.set_end(id, end)?;
        Ok(())
    }

    // ---------------------------------------------------------------------------------------
    // Disposal
    // ---------------------------------------------------------------------------------------

    /// Disposes a node and its subtree, removing every trace from the registry.
    pub fn dispose(&mut self, id: NodeId) -> Result<DisposeReport> {
        let parent = self.nodes.get(id).ok_or(Error::UnknownNode(id))?.parent;
        if let Some(parent) = parent {
            self.detach(parent, id);
        }
        let mut report = DisposeReport::default();
        self.dispose_subtree(id, &mut report);
        cdebug!(
            ?id,
            nodes = report.nodes,
            data_items = report.data_items,
            "dispose"
        );
        Ok(report)
    }

    fn dispose_subtree(&mut self, id: NodeId, report: &mut DisposeReport) {
        let children = match self.nodes.get(id) {
            Some(node) => node.children().to_vec(),
            None => return,
        };
        for child in children {
            self.dispose_subtree(child, report);
        }

        report.registry_entries += self.scheduler.registry_mut().remove_all(id);
        self.animating.remove(&id);
        let Some(mut node) = self.nodes.remove(id) else {
            return;
        };
        if let Some(user_id) = node.user_id.take() {
            self.user_ids.remove(&user_id);
        }
        if let NodeKind::Data(dc) = &mut node.kind {
            report.data_items += dc.dispose_items();
            if let Some(source) = dc.data_source {
                if let Ok(src) = self.data_mut(source) {
                    src.data_users.retain(|u| *u != id);
                }
            }
            for user in dc.data_users.clone() {
                if let Ok(u) = self.data_mut(user) {
                    u.data_source = None;
                }
            }
        }
        self.surface.release(id);
        report.nodes += 1;
        self.dispatch(id, EventKind::Disposed);
    }

    // ---------------------------------------------------------------------------------------
    // Frame
    // ---------------------------------------------------------------------------------------

    /// Runs one frame: steps animations, then drains every phase in order.
    pub fn run_frame(&mut self, now_ms: u64) -> FrameReport {
        let frame = self.scheduler.begin_frame();
        self.now_ms = now_ms;
        let mut report = FrameReport::new(frame);

        self.in_frame = true;
        report.animated = self.step_animations(now_ms);
        self.flush_events();

        if !self.scheduler.registry().is_empty() {
            for phase in Phase::ALL {
                self.drain_phase(phase, &mut report);
                self.flush_events();
            }
        }
        self.in_frame = false;
        self.flush_events();

        if !self.scheduler.registry().is_empty() || !self.animating.is_empty() {
            self.scheduler.request_frame();
        }
        report.pending = self.scheduler.is_frame_pending();
        if !report.is_idle() {
            ctrace!(
                frame,
                validated = report.total_validated(),
                yielded = report.yielded,
                pending = report.pending,
                "run_frame"
            );
        }
        report
    }

    fn drain_phase(&mut self, phase: Phase, report: &mut FrameReport) {
        let mut snapshot = self.scheduler.registry().snapshot(phase);
        if phase == Phase::Position {
            snapshot.sort_by_cached_key(|id| self.depth(*id));
        }
        for id in snapshot {
            if !self.is_invalid(id, phase) {
                continue;
            }
            match phase {
                Phase::Data => self.validate_data(id, report),
                Phase::RawData => self.validate_raw_data(id),
                Phase::DataItems => self.validate_data_items(id),
                Phase::DataRange => self.validate_data_range(id),
                Phase::Layout => self.validate_layout(id),
                Phase::Content => {
                    self.validate_content(id, report);
                    self.relayout_parent(id, report);
                }
                Phase::Position => self.validate_position(id, report),
            }
            report.record(phase);
        }
    }

    fn validate_data(&mut self, id: NodeId, report: &mut FrameReport) {
        let clock = self.scheduler.options().clock.clone();
        let Ok(dc) = self.data_mut(id) else {
            return;
        };
        let raw = Arc::clone(dc.raw_arc());
        let outcome = dc.parse_chunk(&raw, &|| clock.now());
        self.notify_item_changes(id);
        match outcome {
            ParseOutcome::Yielded { cursor } => {
                ctrace!(?id, cursor, "validate_data: continuing next frame");
                report.yielded = true;
                self.scheduler.request_frame();
            }
            ParseOutcome::Complete { parsed, dropped } => {
                cdebug!(?id, parsed, dropped, "validate_data: complete");
                self.unmark(id, Phase::Data);
                self.mark_invalid(id, Phase::DataItems);
                self.dispatch(id, EventKind::DataValidated);
            }
        }
    }

    fn validate_raw_data(&mut self, id: NodeId) {
        self.unmark(id, Phase::RawData);
        let Ok(dc) = self.data_mut(id) else {
            return;
        };
        let raw = Arc::clone(dc.raw_arc());
        let changed = dc.patch_items(&raw);
        ctrace!(?id, changed, "validate_raw_data");
        if changed > 0 {
            self.mark_invalid(id, Phase::DataItems);
        }
        self.mark_invalid(id, Phase::Content);
        self.dispatch(id, EventKind::RawDataValidated);
    }

    fn validate_data_items(&mut self, id: NodeId) {
        self.unmark(id, Phase::DataItems);
        let Ok(dc) = self.data_mut(id) else {
            return;
        };
        dc.revalidate_items();
        self.mark_invalid(id, Phase::DataRange);
        self.dispatch(id, EventKind::DataItemsValidated);
    }

    fn validate_data_range(&mut self, id: NodeId) {
        self.unmark(id, Phase::DataRange);
        let Ok(dc) = self.data_mut(id) else {
            return;
        };
        if dc.revalidate_range() {
            ctrace!(
                ?id,
                start_index = dc.start_index(),
                end_index = dc.end_index(),
                "validate_data_range: range changed"
            );
            self.dispatch(id, EventKind::DataRangeChanged);
            self.mark_invalid(id, Phase::Content);
        }
    }

    fn validate_layout(&mut self, id: NodeId) {
        self.unmark(id, Phase::Layout);
        let Some(container) = self.nodes.get(id).and_then(|n| n.kind.container()) else {
            return;
        };
        let layout = container.layout;
        let children = container.children.clone();

        let mut cursor = 0.0f64;
        let mut width = 0.0f64;
        let mut height = 0.0f64;
        for child in children {
            let Some(node) = self.nodes.get_mut(child) else {
                continue;
            };
            if node.disabled {
                continue;
            }
            let bbox = node.bbox;
            let moved = match layout {
                Layout::Absolute => {
                    width = width.max(bbox.x + bbox.width);
                    height = height.max(bbox.y + bbox.height);
                    false
                }
                Layout::Horizontal => {
                    let moved = node.set_x(Coord::Absolute(cursor));
                    cursor += bbox.width;
                    width = cursor;
                    height = height.max(bbox.height);
                    moved
                }
                Layout::Vertical => {
                    let moved = node.set_y(Coord::Absolute(cursor));
                    cursor += bbox.height;
                    height = cursor;
                    width = width.max(bbox.width);
                    moved
                }
            };
            if moved {
                self.mark_invalid(child, Phase::Position);
            }
        }
        if let Some(container) = self.nodes.get_mut(id).and_then(|n| n.kind.container_mut()) {
            container.content_size = (width, height);
        }
    }

    fn validate_content(&mut self, id: NodeId, report: &mut FrameReport) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.disabled {
            return;
        }
        node.validation.set(Phase::Content, false);
        self.scheduler.registry_mut().remove(id, Phase::Content);
        self.dispatch(id, EventKind::BeforeValidated);

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.lifecycle == Lifecycle::New {
            let applied = node.apply_defaults();
            ctrace!(?id, applied, "validate_content: applied defaults");
            node.lifecycle = Lifecycle::Initializing;
        }
        let children = node.children().to_vec();

        // Containers draw their invalid children before themselves, then arrange them with
        // the fresh measurements.
        for child in children {
            if self.is_invalid(child, Phase::Content) {
                self.validate_content(child, report);
                report.record(Phase::Content);
            }
        }
        if self.is_invalid(id, Phase::Layout) {
            self.validate_layout(id);
            report.record(Phase::Layout);
        }

        self.surface.draw(id);
        let bbox = self.surface.measure(id);

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let resized = node.bbox != bbox;
        node.bbox = bbox;
        let parent = node.parent;
        let first = node.lifecycle == Lifecycle::Initializing;
        if first {
            node.lifecycle = Lifecycle::Inited;
        }

        if resized {
            self.dispatch(id, EventKind::SizeChanged);
            self.mark_invalid(id, Phase::Position);
            if let Some(parent) = parent {
                self.mark_invalid(parent, Phase::Layout);
            }
        }
        if first {
            self.dispatch(id, EventKind::Inited);
        }
        self.update_ready(id);
    }

    /// Re-arranges the parent of a node whose size changed after the layout phase drained.
    fn relayout_parent(&mut self, id: NodeId, report: &mut FrameReport) {
        let Some(parent) = self.nodes.get(id).and_then(Node::parent) else {
            return;
        };
        if self.is_invalid(parent, Phase::Layout) {
            self.validate_layout(parent);
            report.record(Phase::Layout);
        }
    }

    /// Marks a node ready once it and all of its enabled children are; propagates upwards.
    fn update_ready(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.ready || !node.is_inited() {
            return;
        }
        let all_ready = node.children().iter().all(|c| {
            self.nodes
                .get(*c)
                .is_none_or(|child| child.ready || child.disabled)
        });
        if !all_ready {
            return;
        }
        let parent = node.parent;
        if let Some(node) = self.nodes.get_mut(id) {
            node.ready = true;
        }
        self.dispatch(id, EventKind::Ready);
        if let Some(parent) = parent {
            self.update_ready(parent);
        }
    }

    /// Recomputes the absolute transform and carries a change down the subtree in the same
    /// pass.
    fn validate_position(&mut self, id: NodeId, report: &mut FrameReport) {
        self.unmark(id, Phase::Position);
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.disabled {
            return;
        }
        let (parent_transform, parent_size) = match node.parent.and_then(|p| self.nodes.get(p)) {
            Some(parent) => {
                let size = match parent.kind.container().map(ContainerState::content_size) {
                    Some((w, h)) if w > 0.0 || h > 0.0 => {
                        (w.max(parent.bbox.width), h.max(parent.bbox.height))
                    }
                    _ => (parent.bbox.width, parent.bbox.height),
                };
                (parent.transform(), size)
            }
            None => (Default::default(), (0.0, 0.0)),
        };
        let (dx, dy) = node.local_offset(parent_size);
        let transform = parent_transform.then(dx, dy, node.scale, node.rotation);
        if node.transform == Some(transform) {
            return;
        }
        let children = node.children().to_vec();
        if let Some(node) = self.nodes.get_mut(id) {
            node.transform = Some(transform);
        }
        self.surface.apply_transform(id, transform);
        self.dispatch(id, EventKind::PositionChanged);
        self.dispatch(id, EventKind::Transformed);
        for child in children {
            self.validate_position(child, report);
            report.record(Phase::Position);
        }
    }

    fn step_animations(&mut self, now_ms: u64) -> usize {
        let ids: Vec<NodeId> = self.animating.iter().copied().collect();
        let mut stepped = 0;
        for id in ids {
            let Some(node) = self.nodes.get_mut(id) else {
                self.animating.remove(&id);
                continue;
            };
            let mut running = false;

            if let Some(tween) = node.opacity_tween {
                stepped += 1;
                node.opacity = tween.sample(now_ms);
                let opacity = node.opacity;
                if tween.is_done(now_ms) {
                    node.opacity_tween = None;
                    let shown = node.visibility == Visibility::Showing;
                    node.visibility = if shown {
                        Visibility::Visible
                    } else {
                        Visibility::Hidden
                    };
                    self.surface.apply_opacity(id, opacity);
                    let kind = if shown { EventKind::Shown } else { EventKind::Hidden };
                    self.dispatch(id, kind);
                } else {
                    running = true;
                    self.surface.apply_opacity(id, opacity);
                }
            }

            let zoom = self
                .nodes
                .get(id)
                .and_then(|n| n.kind.data())
                .and_then(|dc| dc.zoom_animation);
            if let Some(anim) = zoom {
                stepped += 1;
                let applied =
                    self.apply_window(id, anim.start.sample(now_ms), anim.end.sample(now_ms));
                if let Err(err) = applied {
                    cwarn!(?id, %err, "step_animations: dropping zoom animation");
                    self.animating.remove(&id);
                    continue;
                }
                if anim.start.is_done(now_ms) && anim.end.is_done(now_ms) {
                    if let Ok(dc) = self.data_mut(id) {
                        dc.zoom_animation = None;
                    }
                    self.dispatch(id, EventKind::ZoomEnded);
                } else {
                    running = true;
                }
            }

            if !running {
                self.animating.remove(&id);
            }
        }
        stepped
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new(SchedulerOptions::default())
    }
}

impl core::fmt::Debug for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Stage")
            .field("nodes", &self.nodes.len())
            .field("scheduler", &self.scheduler)
            .field("animating", &self.animating)
            .field("now_ms", &self.now_ms)
            .finish_non_exhaustive()
    }
}
