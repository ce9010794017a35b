use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::time::Duration;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::data_item::DataItem;
use crate::node::ContainerState;
use crate::options::{DataOptions, FieldAdapter, FieldBindings};
use crate::state::WindowState;
use crate::store::{OrderedDataStore, StoreChange};
use crate::tween::Tween;
use crate::types::{IndexRange, Layout};
use crate::zoom::{index_range_for, working_range};
use crate::NodeId;

/// One raw input record.
pub type RawRecord = Map<String, Value>;

/// Records parsed between two budget checks.
pub(crate) const CHUNK_RECORDS: usize = 100;
/// A parse only yields when more than this many records are left.
pub(crate) const MIN_REMAINING_TO_YIELD: usize = 10;

pub(crate) const MAIN_DATA_SET: &str = "main";

/// Read access shared by everything that owns data items.
pub trait DataBound {
    fn raw_data(&self) -> &[RawRecord];

    /// Items of the current data set.
    fn data_items(&self) -> &OrderedDataStore<DataItem>;

    /// Fractional window `(start, end)`.
    fn window(&self) -> (f64, f64);

    /// Visible item range derived from the window.
    fn index_range(&self) -> IndexRange;

    /// Visible range widened for boundary continuity.
    fn working_range(&self) -> IndexRange;

    fn item_count(&self) -> usize {
        self.data_items().len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParseOutcome {
    Complete { parsed: usize, dropped: usize },
    Yielded { cursor: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ZoomAnimation {
    pub(crate) start: Tween,
    pub(crate) end: Tween,
}

impl ZoomAnimation {
    pub(crate) fn targets(&self) -> (f64, f64) {
        (self.start.to, self.end.to)
    }
}

/// A container that owns data items, the ingestion state and the zoom window over them.
#[derive(Debug)]
pub struct DataComponent {
    owner: NodeId,
    options: DataOptions,
    container: ContainerState,

    raw: Arc<Vec<RawRecord>>,
    data_sets: Vec<(String, OrderedDataStore<DataItem>)>,
    current_set: usize,

    parse_cursor: usize,
    parse_in_progress: bool,
    records_parsed: u64,

    start: f64,
    end: f64,
    index_range: IndexRange,
    validated_range: Option<IndexRange>,
    working: IndexRange,
    items_revalidated: bool,
    extremes: BTreeMap<String, (f64, f64)>,
    pub(crate) zoom_animation: Option<ZoomAnimation>,

    pub(crate) data_source: Option<NodeId>,
    pub(crate) data_users: Vec<NodeId>,
}

impl DataComponent {
    pub(crate) fn new(owner: NodeId, options: DataOptions) -> Self {
        Self {
            owner,
            options,
            container: ContainerState::new(Layout::Absolute),
            raw: Arc::new(Vec::new()),
            data_sets: vec![(MAIN_DATA_SET.into(), OrderedDataStore::new())],
            current_set: 0,
            parse_cursor: 0,
            parse_in_progress: false,
            records_parsed: 0,
            start: 0.0,
            end: 1.0,
            index_range: IndexRange::default(),
            validated_range: None,
            working: IndexRange::default(),
            items_revalidated: false,
            extremes: BTreeMap::new(),
            zoom_animation: None,
            data_source: None,
            data_users: Vec::new(),
        }
    }

    pub fn options(&self) -> &DataOptions {
        &self.options
    }

    pub(crate) fn set_options(&mut self, options: DataOptions) {
        self.options = options;
    }

    pub(crate) fn container(&self) -> &ContainerState {
        &self.container
    }

    pub(crate) fn container_mut(&mut self) -> &mut ContainerState {
        &mut self.container
    }

    pub(crate) fn raw_arc(&self) -> &Arc<Vec<RawRecord>> {
        &self.raw
    }

    pub(crate) fn set_raw_arc(&mut self, raw: Arc<Vec<RawRecord>>) {
        self.raw = raw;
    }

    pub(crate) fn take_raw_arc(&mut self) -> Arc<Vec<RawRecord>> {
        core::mem::take(&mut self.raw)
    }

    pub(crate) fn raw_mut(&mut self) -> &mut Vec<RawRecord> {
        Arc::make_mut(&mut self.raw)
    }

    /// Index of the next raw record to parse.
    pub fn parse_cursor(&self) -> usize {
        self.parse_cursor
    }

    pub(crate) fn set_parse_cursor(&mut self, cursor: usize) {
        self.parse_cursor = cursor;
    }

    /// A multi-frame parse has started and not finished yet.
    pub fn is_parsing(&self) -> bool {
        self.parse_in_progress
    }

    /// Total records converted into items over the component's life.
    pub fn records_parsed(&self) -> u64 {
        self.records_parsed
    }

    pub fn data_source(&self) -> Option<NodeId> {
        self.data_source
    }

    pub fn data_users(&self) -> &[NodeId] {
        &self.data_users
    }

    pub fn main_items(&self) -> &OrderedDataStore<DataItem> {
        &self.data_sets[0].1
    }

    pub(crate) fn main_items_mut(&mut self) -> &mut OrderedDataStore<DataItem> {
        &mut self.data_sets[0].1
    }

    pub(crate) fn current_items_mut(&mut self) -> &mut OrderedDataStore<DataItem> {
        &mut self.data_sets[self.current_set].1
    }

    pub fn data_set(&self, name: &str) -> Option<&OrderedDataStore<DataItem>> {
        self.data_sets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, store)| store)
    }

    pub fn current_data_set(&self) -> &str {
        &self.data_sets[self.current_set].0
    }

    pub fn data_set_names(&self) -> impl Iterator<Item = &str> {
        self.data_sets.iter().map(|(n, _)| n.as_str())
    }

    /// Inserts or replaces a named data set. Returns disposed item count of a replaced set.
    pub(crate) fn insert_data_set(&mut self, name: &str, items: Vec<DataItem>) -> usize {
        let pos = match self.data_sets.iter().position(|(n, _)| n == name) {
            Some(pos) => pos,
            None => {
                self.data_sets.push((name.into(), OrderedDataStore::new()));
                self.data_sets.len() - 1
            }
        };
        let owner = self.owner;
        let store = &mut self.data_sets[pos].1;
        let disposed = store.clear().into_iter().map(DataItem::dispose).sum();
        for mut item in items {
            item.set_component(Some(owner));
            store.push(item);
        }
        disposed
    }

    /// Drains every data set's change journal into `(set, inserted, removed)` totals.
    pub(crate) fn take_item_changes(&mut self) -> Vec<(String, usize, usize)> {
        self.data_sets
            .iter_mut()
            .filter_map(|(name, store)| {
                let (inserted, removed) = store
                    .take_changes()
                    .into_iter()
                    .map(StoreChange::counts)
                    .fold((0, 0), |(i, r), (di, dr)| (i + di, r + dr));
                (inserted + removed > 0).then(|| (name.clone(), inserted, removed))
            })
            .collect()
    }

    /// Switches the current data set. Returns `false` if no such set exists or it is current.
    pub(crate) fn select_data_set(&mut self, name: &str) -> bool {
        let Some(pos) = self.data_sets.iter().position(|(n, _)| n == name) else {
            return false;
        };
        if pos == self.current_set {
            return false;
        }
        self.current_set = pos;
        self.validated_range = None;
        true
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn start_index(&self) -> usize {
        self.index_range.start_index
    }

    pub fn end_index(&self) -> usize {
        self.index_range.end_index
    }

    pub(crate) fn set_start(&mut self, start: f64) -> bool {
        if self.start == start {
            return false;
        }
        self.start = start;
        true
    }

    pub(crate) fn set_end(&mut self, end: f64) -> bool {
        if self.end == end {
            return false;
        }
        self.end = end;
        true
    }

    pub fn is_zoom_animating(&self) -> bool {
        self.zoom_animation.is_some()
    }

    /// Min/max of a numeric field over the current data set (from the last items validation).
    pub fn extremes(&self, field: &str) -> Option<(f64, f64)> {
        self.extremes.get(field).copied()
    }

    pub fn window_state(&self) -> WindowState {
        WindowState {
            start: self.start,
            end: self.end,
            start_index: self.index_range.start_index,
            end_index: self.index_range.end_index,
            working_start_index: self.working.start_index,
            working_end_index: self.working.end_index,
            item_count: self.item_count(),
        }
    }

    /// Disposes every item of every data set. Returns how many items were disposed.
    pub(crate) fn dispose_items(&mut self) -> usize {
        let mut disposed = 0;
        for (_, store) in &mut self.data_sets {
            disposed += store.clear().into_iter().map(DataItem::dispose).sum::<usize>();
        }
        self.validated_range = None;
        disposed
    }

    /// Prepares a fresh parse of the whole raw array.
    pub(crate) fn reset_parse(&mut self) -> usize {
        self.restart_parse();
        self.dispose_items()
    }

    /// Restarts parsing at the first record; existing items stay until the parse begins.
    pub(crate) fn restart_parse(&mut self) {
        self.parse_cursor = 0;
        self.parse_in_progress = false;
    }

    /// Evicts the `count` oldest raw records' items and shifts the cursor.
    ///
    /// The raw records themselves are removed by the caller.
    pub(crate) fn evict_front(&mut self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let store = self.main_items_mut();
        let cut = store.iter().take_while(|item| item.raw_index() < count).count();
        let disposed = store
            .remove_range(0..cut)
            .into_iter()
            .map(DataItem::dispose)
            .sum();
        for item in store.iter_mut() {
            let raw_index = item.raw_index() - count;
            item.set_raw_index(raw_index);
        }
        self.parse_cursor = self.parse_cursor.saturating_sub(count);
        disposed
    }

    /// Parses raw records from the cursor until done or out of budget.
    ///
    /// `raw` is this component's raw data, or its data source's for a data user.
    pub(crate) fn parse_chunk(
        &mut self,
        raw: &[RawRecord],
        now: &dyn Fn() -> Duration,
    ) -> ParseOutcome {
        if !self.parse_in_progress {
            self.parse_in_progress = true;
            if self.parse_cursor == 0 && !self.main_items().is_empty() {
                let disposed = self.dispose_items();
                cdebug!(disposed, "parse: disposed stale items before full parse");
            }
        }

        let started = now();
        let total = raw.len();
        let mut cursor = self.parse_cursor.min(total);
        let mut processed = 0usize;
        let mut parsed = 0usize;
        let mut dropped = 0usize;

        while cursor < total {
            if self.parse_record(cursor, &raw[cursor]) {
                parsed += 1;
            } else {
                dropped += 1;
            }
            cursor += 1;
            processed += 1;

            if processed % CHUNK_RECORDS == 0
                && total - cursor > MIN_REMAINING_TO_YIELD
                && now().saturating_sub(started) > self.options.chunk_budget
            {
                self.parse_cursor = cursor;
                ctrace!(cursor, total, "parse: budget exhausted, yielding");
                return ParseOutcome::Yielded { cursor };
            }
        }

        self.parse_cursor = 0;
        self.parse_in_progress = false;
        ParseOutcome::Complete { parsed, dropped }
    }

    fn parse_record(&mut self, raw_index: usize, record: &RawRecord) -> bool {
        let owner = self.owner;
        let bindings = &self.options.bindings;
        let adapter = self.options.field_adapter.as_ref();
        let omit_empty = self.options.omit_empty_items;

        let store = &mut self.data_sets[0].1;
        let mut item = store.create();
        item.set_component(Some(owner));
        item.set_raw_index(raw_index);
        let matched = bind_record(&mut item, record, bindings, adapter, omit_empty);
        if !matched && omit_empty {
            return false;
        }
        store.push(item);
        self.records_parsed = self.records_parsed.saturating_add(1);
        true
    }

    /// Re-applies bindings to existing items from (patched) raw records.
    ///
    /// Returns how many items changed.
    pub(crate) fn patch_items(&mut self, raw: &[RawRecord]) -> usize {
        let bindings = &self.options.bindings;
        let adapter = self.options.field_adapter.as_ref();
        let omit_empty = self.options.omit_empty_items;
        let mut changed = 0;
        for item in self.data_sets[0].1.iter_mut() {
            let Some(record) = raw.get(item.raw_index()) else {
                continue;
            };
            let before = item.clone();
            bind_record(item, record, bindings, adapter, omit_empty);
            if *item != before {
                changed += 1;
            }
        }
        changed
    }

    /// Recomputes working values and extremes of the current data set.
    pub(crate) fn revalidate_items(&mut self) {
        let mut extremes: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        for item in self.current_items_mut().iter_mut() {
            item.reset_working_values();
            for (field, value) in item.values() {
                let Some(v) = value.as_f64() else {
                    continue;
                };
                extremes
                    .entry(field.clone())
                    .and_modify(|(lo, hi)| {
                        *lo = lo.min(v);
                        *hi = hi.max(v);
                    })
                    .or_insert((v, v));
            }
        }
        self.extremes = extremes;
        self.items_revalidated = true;
    }

    /// Recomputes the index window. Returns `true` if the visible index range changed since
    /// the last validation.
    pub(crate) fn revalidate_range(&mut self) -> bool {
        let count = self.item_count();
        let range = index_range_for(self.start, self.end, count);
        self.index_range = range;
        let changed = self.validated_range != Some(range);
        let refresh_items = changed || self.items_revalidated;
        self.items_revalidated = false;

        if changed {
            self.validated_range = Some(range);
            self.working = working_range(range, self.options.working_overscan, count);
        }
        if refresh_items {
            for item in self.current_items_mut().iter_mut() {
                let outside = !range.contains(item.index());
                item.set_disabled(outside);
            }
        }
        changed
    }
}

impl DataBound for DataComponent {
    fn raw_data(&self) -> &[RawRecord] {
        &self.raw
    }

    fn data_items(&self) -> &OrderedDataStore<DataItem> {
        &self.data_sets[self.current_set].1
    }

    fn window(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    fn index_range(&self) -> IndexRange {
        self.index_range
    }

    fn working_range(&self) -> IndexRange {
        self.working
    }
}

/// Applies field, property and children bindings of one record to an item.
///
/// Returns `true` if at least one data field (or the children field) was present.
fn bind_record(
    item: &mut DataItem,
    record: &RawRecord,
    bindings: &FieldBindings,
    adapter: Option<&FieldAdapter>,
    omit_empty: bool,
) -> bool {
    let mut matched = false;
    let children_field = bindings.children_field.as_deref();

    for (field, key) in &bindings.data_fields {
        if Some(field.as_str()) == children_field {
            continue;
        }
        let Some(value) = record.get(key) else {
            continue;
        };
        let value = match adapter {
            Some(f) => f(field, value.clone()),
            None => value.clone(),
        };
        item.set_value(field, value);
        matched = true;
    }

    for (property, key) in &bindings.property_fields {
        if let Some(value) = record.get(key) {
            item.set_property(property, value.clone());
        }
    }

    if let Some(field) = children_field {
        let key = bindings
            .data_fields
            .get(field)
            .map(String::as_str)
            .unwrap_or(field);
        if let Some(Value::Array(children)) = record.get(key) {
            matched = true;
            let component = item.component();
            let template = item.children().and_then(OrderedDataStore::template).cloned();
            let mut store: OrderedDataStore<DataItem> = children
                .iter()
                .enumerate()
                .filter_map(|(i, child)| {
                    let Value::Object(child_record) = child else {
                        return None;
                    };
                    let mut child_item = template.clone().unwrap_or_default();
                    child_item.set_component(component);
                    child_item.set_raw_index(i);
                    let child_matched =
                        bind_record(&mut child_item, child_record, bindings, adapter, omit_empty);
                    (child_matched || !omit_empty).then_some(child_item)
                })
                .collect();
            store.set_template(template);
            item.set_children(Some(store));
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use serde_json::json;

    fn owner() -> NodeId {
        let mut arena = Arena::new();
        arena.insert_with(|_| ())
    }

    fn record(v: Value) -> RawRecord {
        match v {
            Value::Object(m) => m,
            _ => panic!("record must be an object"),
        }
    }

    fn no_time() -> Duration {
        Duration::ZERO
    }

    #[test]
    fn parse_applies_field_and_property_bindings() {
        let options = DataOptions::new()
            .with_data_field("value", "v")
            .with_property_field("fill", "color");
        let mut dc = DataComponent::new(owner(), options);
        let raw = vec![
            record(json!({"v": 1, "color": "red"})),
            record(json!({"v": 2})),
        ];
        let outcome = dc.parse_chunk(&raw, &no_time);
        assert_eq!(outcome, ParseOutcome::Complete { parsed: 2, dropped: 0 });
        let items = dc.main_items();
        assert_eq!(items[0].value_f64("value"), Some(1.0));
        assert_eq!(items[0].property("fill"), Some(&json!("red")));
        assert_eq!(items[1].property("fill"), None);
        assert_eq!(items[1].component(), Some(dc.owner));
    }

    #[test]
    fn field_adapter_intercepts_values() {
        let options = DataOptions::new()
            .with_data_field("value", "v")
            .with_field_adapter(Some(|field: &str, v: Value| {
                if field == "value" {
                    json!(v.as_f64().unwrap_or(0.0) * 10.0)
                } else {
                    v
                }
            }));
        let mut dc = DataComponent::new(owner(), options);
        dc.parse_chunk(&[record(json!({"v": 2}))], &no_time);
        assert_eq!(dc.main_items()[0].value_f64("value"), Some(20.0));
    }

    #[test]
    fn empty_records_are_dropped_when_omitting() {
        let options = DataOptions::new()
            .with_data_field("value", "v")
            .with_omit_empty_items(true);
        let mut dc = DataComponent::new(owner(), options);
        let raw = vec![
            record(json!({"v": 1})),
            record(json!({"other": 1})),
            record(json!({"v": 3})),
        ];
        let outcome = dc.parse_chunk(&raw, &no_time);
        assert_eq!(outcome, ParseOutcome::Complete { parsed: 2, dropped: 1 });
        assert_eq!(dc.main_items().len(), 2);
        assert_eq!(dc.main_items()[1].raw_index(), 2);
        assert_eq!(dc.main_items()[1].index(), 1);
    }

    #[test]
    fn missing_fields_are_kept_unset_without_omission() {
        let options = DataOptions::new().with_data_field("value", "v");
        let mut dc = DataComponent::new(owner(), options);
        dc.parse_chunk(&[record(json!({"x": 1}))], &no_time);
        assert_eq!(dc.main_items().len(), 1);
        assert!(!dc.main_items()[0].has_values());
    }

    #[test]
    fn children_field_builds_nested_store() {
        let options = DataOptions::new()
            .with_data_field("name", "name")
            .with_children_field("children");
        let mut dc = DataComponent::new(owner(), options);
        let raw = vec![record(json!({
            "name": "root",
            "children": [{"name": "a"}, {"name": "b", "children": [{"name": "b1"}]}]
        }))];
        dc.parse_chunk(&raw, &no_time);
        let root = &dc.main_items()[0];
        let children = root.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].value("name"), Some(&json!("b")));
        assert_eq!(children[1].children().unwrap()[0].value("name"), Some(&json!("b1")));
    }

    #[test]
    fn parse_yields_when_budget_is_exceeded() {
        let options = DataOptions::new()
            .with_data_field("value", "v")
            .with_chunk_budget(Duration::from_millis(1));
        let mut dc = DataComponent::new(owner(), options);
        let raw: Vec<RawRecord> = (0..250).map(|i| record(json!({ "v": i }))).collect();

        let tick = core::cell::Cell::new(0u64);
        let clock = || {
            tick.set(tick.get() + 5);
            Duration::from_millis(tick.get())
        };
        assert_eq!(dc.parse_chunk(&raw, &clock), ParseOutcome::Yielded { cursor: 100 });
        assert!(dc.is_parsing());
        assert_eq!(dc.parse_chunk(&raw, &clock), ParseOutcome::Yielded { cursor: 200 });
        assert_eq!(
            dc.parse_chunk(&raw, &clock),
            ParseOutcome::Complete { parsed: 50, dropped: 0 }
        );
        assert_eq!(dc.main_items().len(), 250);
        assert_eq!(dc.parse_cursor(), 0);
        assert!(!dc.is_parsing());
    }

    #[test]
    fn parse_does_not_yield_with_few_records_left() {
        let options = DataOptions::new()
            .with_data_field("value", "v")
            .with_chunk_budget(Duration::ZERO);
        let mut dc = DataComponent::new(owner(), options);
        let raw: Vec<RawRecord> = (0..105).map(|i| record(json!({ "v": i }))).collect();
        let tick = core::cell::Cell::new(0u64);
        let clock = || {
            tick.set(tick.get() + 1);
            Duration::from_millis(tick.get())
        };
        assert!(matches!(
            dc.parse_chunk(&raw, &clock),
            ParseOutcome::Complete { parsed: 105, .. }
        ));
    }

    #[test]
    fn evict_front_shifts_raw_indexes_and_cursor() {
        let options = DataOptions::new().with_data_field("value", "v");
        let mut dc = DataComponent::new(owner(), options);
        let raw: Vec<RawRecord> = (0..4).map(|i| record(json!({ "v": i }))).collect();
        dc.parse_chunk(&raw, &no_time);
        dc.set_parse_cursor(4);
        assert_eq!(dc.evict_front(1), 1);
        assert_eq!(dc.parse_cursor(), 3);
        let items = dc.main_items();
        assert_eq!(items.len(), 3);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.index(), i);
            assert_eq!(item.raw_index(), i);
        }
        assert_eq!(items[0].value_f64("value"), Some(1.0));
    }

    #[test]
    fn range_validation_disables_items_outside_the_window() {
        let options = DataOptions::new().with_data_field("value", "v");
        let mut dc = DataComponent::new(owner(), options);
        let raw: Vec<RawRecord> = (0..10).map(|i| record(json!({ "v": i }))).collect();
        dc.parse_chunk(&raw, &no_time);
        dc.revalidate_items();
        dc.set_start(0.2);
        dc.set_end(0.5);
        assert!(dc.revalidate_range());
        assert_eq!(dc.index_range(), IndexRange::new(2, 5));
        assert_eq!(dc.working_range(), IndexRange::new(1, 6));
        let disabled: Vec<bool> = dc.main_items().iter().map(DataItem::is_disabled).collect();
        assert_eq!(
            disabled,
            [true, true, false, false, false, true, true, true, true, true]
        );
        assert!(!dc.revalidate_range());
        assert_eq!(dc.extremes("value"), Some((0.0, 9.0)));
    }
}
