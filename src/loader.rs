use alloc::string::String;
use alloc::vec::Vec;

use crate::data_component::RawRecord;

/// How a component incorporates a finished load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoaderOptions {
    /// Append loaded records instead of replacing the data.
    pub incremental: bool,
    /// With `incremental`, evict as many old records as were appended.
    pub keep_count: bool,
    /// Patch values of existing items in place instead of reprocessing.
    pub update_current_data: bool,
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn with_keep_count(mut self, keep_count: bool) -> Self {
        self.keep_count = keep_count;
        self
    }

    pub fn with_update_current_data(mut self, update_current_data: bool) -> Self {
        self.update_current_data = update_current_data;
        self
    }

    /// Decides what to do with the records of a finished load.
    pub fn apply_to(&self, records: Vec<RawRecord>) -> LoadAction {
        if self.update_current_data {
            LoadAction::Patch(records)
        } else if self.incremental {
            let remove_count = if self.keep_count { records.len() } else { 0 };
            LoadAction::Append {
                records,
                remove_count,
            }
        } else {
            LoadAction::Replace(records)
        }
    }
}

/// Lifecycle notifications from an external raw-data loader.
#[derive(Clone, Debug, PartialEq)]
pub enum LoaderEvent {
    Started,
    LoadStarted,
    LoadEnded,
    ParseEnded,
    Done(Vec<RawRecord>),
    Error(String),
}

/// The ingestion call a finished load maps to.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadAction {
    Replace(Vec<RawRecord>),
    Append {
        records: Vec<RawRecord>,
        remove_count: usize,
    },
    Patch(Vec<RawRecord>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn records(n: usize) -> Vec<RawRecord> {
        (0..n)
            .map(|i| {
                let mut m = Map::new();
                m.insert("v".into(), json!(i));
                m
            })
            .collect()
    }

    #[test]
    fn default_replaces() {
        let action = LoaderOptions::new().apply_to(records(2));
        assert!(matches!(action, LoadAction::Replace(r) if r.len() == 2));
    }

    #[test]
    fn incremental_with_keep_count_evicts_as_many_as_appended() {
        let action = LoaderOptions::new()
            .with_incremental(true)
            .with_keep_count(true)
            .apply_to(records(3));
        assert_eq!(
            action,
            LoadAction::Append {
                records: records(3),
                remove_count: 3
            }
        );
    }

    #[test]
    fn update_current_data_wins() {
        let action = LoaderOptions::new()
            .with_incremental(true)
            .with_update_current_data(true)
            .apply_to(records(1));
        assert!(matches!(action, LoadAction::Patch(_)));
    }
}
