/// A lightweight, serializable snapshot of a data component's window.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`, so hosts can
/// persist a zoom and restore it with [`crate::Stage::restore_window_state`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowState {
    pub start: f64,
    pub end: f64,
    pub start_index: usize,
    pub end_index: usize, // exclusive
    pub working_start_index: usize,
    pub working_end_index: usize,
    pub item_count: usize,
}
