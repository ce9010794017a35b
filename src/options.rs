use alloc::string::String;
use alloc::sync::Arc;
use core::time::Duration;
use std::collections::BTreeMap;

use serde_json::Value;

use crate::loader::LoaderOptions;
use crate::tween::Easing;
use crate::zoom::ZoomLimits;

/// A hook that may transform a field value before it is assigned to a data item.
///
/// Arguments are the logical field name and the raw value; the returned value is stored.
pub type FieldAdapter = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// Mapping from logical names to raw-record keys.
///
/// Bindings are only presence-checked: a record missing a bound key leaves the field unset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldBindings {
    /// Logical field name → raw key (`dataFields`).
    pub data_fields: BTreeMap<String, String>,
    /// Display property name → raw key (`propertyFields`); bypasses the data fields.
    pub property_fields: BTreeMap<String, String>,
    /// Logical field whose raw value is an array of nested records.
    pub children_field: Option<String>,
}

impl FieldBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_field(mut self, field: impl Into<String>, raw_key: impl Into<String>) -> Self {
        self.data_fields.insert(field.into(), raw_key.into());
        self
    }

    pub fn with_property_field(
        mut self,
        property: impl Into<String>,
        raw_key: impl Into<String>,
    ) -> Self {
        self.property_fields.insert(property.into(), raw_key.into());
        self
    }

    pub fn with_children_field(mut self, field: impl Into<String>) -> Self {
        self.children_field = Some(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.data_fields.is_empty() && self.property_fields.is_empty()
    }
}

/// Configuration for a data component.
///
/// Heavy fields are stored in `Arc`s so the options stay cheap to clone.
pub struct DataOptions {
    pub bindings: FieldBindings,
    pub field_adapter: Option<FieldAdapter>,

    /// Wall-clock budget per parse chunk before the parser yields to the next frame.
    pub chunk_budget: Duration,

    /// Drop records that match none of the bound fields.
    pub omit_empty_items: bool,

    pub max_zoom_factor: f64,
    /// Minimum number of items a zoomed window may show.
    pub min_zoom_count: f64,
    /// Optional cap on the number of items a window may show.
    pub max_zoom_count: Option<f64>,
    /// Allowed overshoot of the window past `0..=1`.
    pub max_zoom_declination: f64,

    /// Items kept on each side of the visible range in the working range.
    pub working_overscan: usize,

    /// Duration of animated zooms. `0` applies zooms instantly.
    pub interpolation_duration_ms: u64,
    pub interpolation_easing: Easing,

    pub loader: LoaderOptions,
}

impl DataOptions {
    pub fn new() -> Self {
        Self {
            bindings: FieldBindings::default(),
            field_adapter: None,
            chunk_budget: Duration::from_millis(50),
            omit_empty_items: false,
            max_zoom_factor: 1000.0,
            min_zoom_count: 1.0,
            max_zoom_count: None,
            max_zoom_declination: 1.0,
            working_overscan: 1,
            interpolation_duration_ms: 0,
            interpolation_easing: Easing::default(),
            loader: LoaderOptions::default(),
        }
    }

    pub fn with_bindings(mut self, bindings: FieldBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_data_field(mut self, field: impl Into<String>, raw_key: impl Into<String>) -> Self {
        self.bindings.data_fields.insert(field.into(), raw_key.into());
        self
    }

    pub fn with_property_field(
        mut self,
        property: impl Into<String>,
        raw_key: impl Into<String>,
    ) -> Self {
        self.bindings
            .property_fields
            .insert(property.into(), raw_key.into());
        self
    }

    pub fn with_children_field(mut self, field: impl Into<String>) -> Self {
        self.bindings.children_field = Some(field.into());
        self
    }

    pub fn with_field_adapter(
        mut self,
        field_adapter: Option<impl Fn(&str, Value) -> Value + Send + Sync + 'static>,
    ) -> Self {
        self.field_adapter = field_adapter.map(|f| Arc::new(f) as _);
        self
    }

    pub fn with_chunk_budget(mut self, chunk_budget: Duration) -> Self {
        self.chunk_budget = chunk_budget;
        self
    }

    pub fn with_omit_empty_items(mut self, omit_empty_items: bool) -> Self {
        self.omit_empty_items = omit_empty_items;
        self
    }

    pub fn with_max_zoom_factor(mut self, max_zoom_factor: f64) -> Self {
        self.max_zoom_factor = max_zoom_factor;
        self
    }

    pub fn with_min_zoom_count(mut self, min_zoom_count: f64) -> Self {
        self.min_zoom_count = min_zoom_count;
        self
    }

    pub fn with_max_zoom_count(mut self, max_zoom_count: Option<f64>) -> Self {
        self.max_zoom_count = max_zoom_count;
        self
    }

    pub fn with_max_zoom_declination(mut self, declination: f64) -> Self {
        self.max_zoom_declination = declination;
        self
    }

    pub fn with_working_overscan(mut self, overscan: usize) -> Self {
        self.working_overscan = overscan;
        self
    }

    pub fn with_interpolation(mut self, duration_ms: u64, easing: Easing) -> Self {
        self.interpolation_duration_ms = duration_ms;
        self.interpolation_easing = easing;
        self
    }

    pub fn with_loader(mut self, loader: LoaderOptions) -> Self {
        self.loader = loader;
        self
    }

    pub fn zoom_limits(&self) -> ZoomLimits {
        ZoomLimits {
            max_zoom_factor: self.max_zoom_factor,
            min_zoom_count: self.min_zoom_count,
            max_zoom_count: self.max_zoom_count,
            declination: self.max_zoom_declination,
        }
    }
}

impl Default for DataOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DataOptions {
    fn clone(&self) -> Self {
        Self {
            bindings: self.bindings.clone(),
            field_adapter: self.field_adapter.clone(),
            chunk_budget: self.chunk_budget,
            omit_empty_items: self.omit_empty_items,
            max_zoom_factor: self.max_zoom_factor,
            min_zoom_count: self.min_zoom_count,
            max_zoom_count: self.max_zoom_count,
            max_zoom_declination: self.max_zoom_declination,
            working_overscan: self.working_overscan,
            interpolation_duration_ms: self.interpolation_duration_ms,
            interpolation_easing: self.interpolation_easing,
            loader: self.loader,
        }
    }
}

impl core::fmt::Debug for DataOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataOptions")
            .field("bindings", &self.bindings)
            .field("chunk_budget", &self.chunk_budget)
            .field("omit_empty_items", &self.omit_empty_items)
            .field("max_zoom_factor", &self.max_zoom_factor)
            .field("min_zoom_count", &self.min_zoom_count)
            .field("max_zoom_count", &self.max_zoom_count)
            .field("max_zoom_declination", &self.max_zoom_declination)
            .field("working_overscan", &self.working_overscan)
            .field("interpolation_duration_ms", &self.interpolation_duration_ms)
            .field("interpolation_easing", &self.interpolation_easing)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}
