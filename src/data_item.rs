use alloc::string::String;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::NodeId;
use crate::store::{Indexed, OrderedDataStore};

/// The smallest data-bound unit: one per parsed raw record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataItem {
    index: usize,
    raw_index: usize,
    component: Option<NodeId>,
    values: BTreeMap<String, Value>,
    working: BTreeMap<String, f64>,
    properties: BTreeMap<String, Value>,
    disabled: bool,
    children: Option<OrderedDataStore<DataItem>>,
}

impl DataItem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position in the owning store.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Index of the raw record this item was parsed from.
    pub fn raw_index(&self) -> usize {
        self.raw_index
    }

    pub(crate) fn set_raw_index(&mut self, raw_index: usize) {
        self.raw_index = raw_index;
    }

    /// The owning component (lookup only; the item never keeps it alive).
    pub fn component(&self) -> Option<NodeId> {
        self.component
    }

    pub(crate) fn set_component(&mut self, component: Option<NodeId>) {
        self.component = component;
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn value_f64(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(Value::as_f64)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Sets a field value. Returns `true` if the stored value changed.
    pub fn set_value(&mut self, field: &str, value: Value) -> bool {
        if self.values.get(field) == Some(&value) {
            return false;
        }
        self.values.insert(field.into(), value);
        true
    }

    pub fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Working (computed) numeric value for a field.
    pub fn working_value(&self, field: &str) -> Option<f64> {
        self.working.get(field).copied()
    }

    pub fn set_working_value(&mut self, field: &str, value: f64) -> bool {
        if self.working.get(field) == Some(&value) {
            return false;
        }
        self.working.insert(field.into(), value);
        true
    }

    pub(crate) fn reset_working_values(&mut self) {
        self.working.clear();
        for (field, value) in &self.values {
            if let Some(v) = value.as_f64() {
                self.working.insert(field.clone(), v);
            }
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn set_property(&mut self, name: &str, value: Value) -> bool {
        if self.properties.get(name) == Some(&value) {
            return false;
        }
        self.properties.insert(name.into(), value);
        true
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Excludes the item from the current window without removing it.
    pub fn set_disabled(&mut self, disabled: bool) -> bool {
        if self.disabled == disabled {
            return false;
        }
        self.disabled = disabled;
        true
    }

    pub fn children(&self) -> Option<&OrderedDataStore<DataItem>> {
        self.children.as_ref()
    }

    pub(crate) fn set_children(&mut self, children: Option<OrderedDataStore<DataItem>>) {
        self.children = children;
    }

    /// Counts this item plus all nested children (used for disposal bookkeeping).
    pub(crate) fn dispose(self) -> usize {
        1 + self
            .children
            .map(|store| {
                let mut store = store;
                store.clear().into_iter().map(DataItem::dispose).sum()
            })
            .unwrap_or(0)
    }
}

impl Indexed for DataItem {
    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn setters_report_changes() {
        let mut item = DataItem::new();
        assert!(item.set_value("value", json!(1)));
        assert!(!item.set_value("value", json!(1)));
        assert!(item.set_value("value", json!(2)));
        assert_eq!(item.value_f64("value"), Some(2.0));

        assert!(item.set_disabled(true));
        assert!(!item.set_disabled(true));
    }

    #[test]
    fn working_values_mirror_numeric_fields() {
        let mut item = DataItem::new();
        item.set_value("value", json!(3.5));
        item.set_value("category", json!("a"));
        item.reset_working_values();
        assert_eq!(item.working_value("value"), Some(3.5));
        assert_eq!(item.working_value("category"), None);
    }

    #[test]
    fn dispose_counts_nested_children() {
        let mut nested = DataItem::new();
        nested.set_children(Some([DataItem::new()].into_iter().collect()));
        let mut item = DataItem::new();
        item.set_children(Some([DataItem::new(), nested].into_iter().collect()));
        assert_eq!(item.children().map(OrderedDataStore::len), Some(2));
        assert_eq!(item.dispose(), 4);
    }
}
