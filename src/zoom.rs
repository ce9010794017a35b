//! Fractional window resolution and window ↔ index mapping.
//!
//! Everything here is pure so the data component and tests share one implementation.

use crate::types::{IndexRange, Priority, ZoomRange};

const EPSILON: f64 = 1e-9;

/// Zoom constraints of a data component.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZoomLimits {
    pub max_zoom_factor: f64,
    pub min_zoom_count: f64,
    pub max_zoom_count: Option<f64>,
    pub declination: f64,
}

impl ZoomLimits {
    /// Smallest allowed window width (`min_zoom_count / max_zoom_factor`).
    pub fn min_width(&self) -> f64 {
        if !(self.max_zoom_factor.is_finite() && self.max_zoom_factor > 0.0) {
            return 0.0;
        }
        (self.min_zoom_count / self.max_zoom_factor).max(0.0)
    }

    /// Largest allowed window width, when a visible-item cap is configured.
    pub fn max_width(&self) -> Option<f64> {
        let count = self.max_zoom_count?;
        if !(self.max_zoom_factor.is_finite() && self.max_zoom_factor > 0.0) {
            return None;
        }
        Some((count / self.max_zoom_factor).max(self.min_width()))
    }

    pub fn lower(&self) -> f64 {
        -self.declination.max(0.0)
    }

    pub fn upper(&self) -> f64 {
        1.0 + self.declination.max(0.0)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self {
            max_zoom_factor: 1000.0,
            min_zoom_count: 1.0,
            max_zoom_count: None,
            declination: 1.0,
        }
    }
}

/// Outcome of [`resolve_zoom`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomResolution {
    pub start: f64,
    pub end: f64,
    /// The edge that was kept while the other one was adjusted.
    pub anchor: Priority,
    /// The clamp order could not satisfy every bound (or both edges had to move at once).
    /// The window is still usable but depends on the fixed clamp order.
    pub conflict: bool,
}

impl ZoomResolution {
    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Resolves a requested window against the zoom limits.
///
/// Steps, in order: degenerate-window expansion, anchor (priority) resolution, zoom-factor
/// bounds, declination clamp, and one re-check of the bounds. Returns `None` for non-finite
/// input.
pub fn resolve_zoom(range: ZoomRange, limits: &ZoomLimits) -> Option<ZoomResolution> {
    let (mut start, mut end) = (range.start, range.end);
    if !start.is_finite() || !end.is_finite() {
        return None;
    }
    if start > end {
        core::mem::swap(&mut start, &mut end);
    }

    let lower = limits.lower();
    let upper = limits.upper();
    let min_width = limits.min_width();
    let max_width = limits.max_width();

    if end - start < EPSILON {
        let half = min_width / 2.0;
        start -= half;
        end += half;
    }

    let mut anchor = range.priority.unwrap_or(Priority::Start);
    match anchor {
        Priority::Start if end >= upper - EPSILON => anchor = Priority::End,
        Priority::End if start <= lower + EPSILON => anchor = Priority::Start,
        _ => {}
    }

    apply_width_bounds(&mut start, &mut end, anchor, min_width, max_width);

    let clamped_start = start < lower;
    let clamped_end = end > upper;
    if clamped_start {
        start = lower;
    }
    if clamped_end {
        end = upper;
    }

    let mut conflict = false;
    if violates_bounds(start, end, min_width, max_width) {
        let recheck_anchor = match (clamped_start, clamped_end) {
            (true, false) => Priority::Start,
            (false, true) => Priority::End,
            _ => {
                conflict = true;
                anchor
            }
        };
        apply_width_bounds(&mut start, &mut end, recheck_anchor, min_width, max_width);
    }

    if start < lower - EPSILON
        || end > upper + EPSILON
        || violates_bounds(start, end, min_width, max_width)
    {
        conflict = true;
    }
    if conflict {
        cwarn!(
            start,
            end,
            min_width,
            ?max_width,
            lower,
            upper,
            "zoom: clamp order decided the window"
        );
    }

    Some(ZoomResolution {
        start,
        end,
        anchor,
        conflict,
    })
}

fn violates_bounds(start: f64, end: f64, min_width: f64, max_width: Option<f64>) -> bool {
    let width = end - start;
    width < min_width - EPSILON || max_width.is_some_and(|max| width > max + EPSILON)
}

fn apply_width_bounds(
    start: &mut f64,
    end: &mut f64,
    anchor: Priority,
    min_width: f64,
    max_width: Option<f64>,
) {
    let width = *end - *start;
    let target = if width < min_width - EPSILON {
        min_width
    } else if let Some(max) = max_width.filter(|max| width > max + EPSILON) {
        max
    } else {
        return;
    };
    match anchor {
        Priority::Start => *end = *start + target,
        Priority::End => *start = *end - target,
    }
}

/// `clamp(round(count * start), 0, count)`.
pub fn start_index_for(start: f64, count: usize) -> usize {
    let n = count as f64;
    let v = (n * start).round();
    if v.is_nan() {
        return 0;
    }
    v.clamp(0.0, n) as usize
}

/// `clamp(ceil(count * end), 0, count)`.
///
/// A product within relative rounding noise of an integer counts as that integer, so
/// `end = 0.7` over 10 items (`7.000000000000001`) ends at index 7 rather than 8.
pub fn end_index_for(end: f64, count: usize) -> usize {
    let n = count as f64;
    let exact = n * end;
    if exact.is_nan() {
        return count;
    }
    let nearest = exact.round();
    let v = if (exact - nearest).abs() <= EPSILON * nearest.abs().max(1.0) {
        nearest
    } else {
        exact.ceil()
    };
    v.clamp(0.0, n) as usize
}

pub fn index_range_for(start: f64, end: f64, count: usize) -> IndexRange {
    IndexRange::new(start_index_for(start, count), end_index_for(end, count))
}

/// Converts an index range back into a fractional window.
pub fn window_for_indexes(start_index: usize, end_index: usize, count: usize) -> (f64, f64) {
    if count == 0 {
        return (0.0, 1.0);
    }
    let n = count as f64;
    (start_index as f64 / n, end_index as f64 / n)
}

/// Widens a visible range by `overscan` items on each side, clamped to `count`.
pub fn working_range(visible: IndexRange, overscan: usize, count: usize) -> IndexRange {
    let start = visible.start_index.saturating_sub(overscan).min(count);
    let end = visible.end_index.saturating_add(overscan).min(count);
    IndexRange::new(start, end.max(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_zoom_factor: f64, min_zoom_count: f64) -> ZoomLimits {
        ZoomLimits {
            max_zoom_factor,
            min_zoom_count,
            max_zoom_count: None,
            declination: 0.0,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn degenerate_window_expands_by_half_the_min_step() {
        let r = resolve_zoom(ZoomRange::new(0.5, 0.5), &limits(10.0, 1.0)).unwrap();
        assert!(approx(r.start, 0.45), "{r:?}");
        assert!(approx(r.end, 0.55), "{r:?}");
        assert!(!r.conflict);
    }

    #[test]
    fn non_finite_input_is_rejected() {
        assert!(resolve_zoom(ZoomRange::new(f64::NAN, 0.5), &limits(10.0, 1.0)).is_none());
        assert!(resolve_zoom(ZoomRange::new(0.0, f64::INFINITY), &limits(10.0, 1.0)).is_none());
    }

    #[test]
    fn too_narrow_window_is_pulled_toward_the_anchor() {
        let l = limits(10.0, 1.0);
        let r = resolve_zoom(ZoomRange::new(0.2, 0.25), &l).unwrap();
        assert!(approx(r.start, 0.2) && approx(r.end, 0.3), "{r:?}");

        let r = resolve_zoom(ZoomRange::new(0.2, 0.25).with_priority(Priority::End), &l).unwrap();
        assert!(approx(r.start, 0.15) && approx(r.end, 0.25), "{r:?}");
    }

    #[test]
    fn pinned_end_flips_the_anchor() {
        let l = limits(10.0, 1.0);
        let r = resolve_zoom(ZoomRange::new(0.97, 1.0).with_priority(Priority::Start), &l).unwrap();
        assert_eq!(r.anchor, Priority::End);
        assert!(approx(r.start, 0.9) && approx(r.end, 1.0), "{r:?}");
    }

    #[test]
    fn max_zoom_count_caps_the_width() {
        let mut l = limits(100.0, 1.0);
        l.max_zoom_count = Some(20.0);
        let r = resolve_zoom(ZoomRange::new(0.1, 0.9), &l).unwrap();
        assert!(approx(r.width(), 0.2), "{r:?}");
        assert!(approx(r.start, 0.1));
    }

    #[test]
    fn declination_clamp_rechecks_the_bound() {
        let l = limits(10.0, 1.0);
        let r = resolve_zoom(ZoomRange::new(-0.3, -0.25).with_priority(Priority::End), &l).unwrap();
        assert!(approx(r.start, 0.0) && approx(r.end, 0.1), "{r:?}");
        assert!(!r.conflict);
    }

    #[test]
    fn impossible_bounds_are_flagged() {
        // min width 2.0 cannot fit inside [0, 1].
        let l = limits(1.0, 2.0);
        let r = resolve_zoom(ZoomRange::new(0.0, 1.0), &l).unwrap();
        assert!(r.conflict);
    }

    #[test]
    fn index_mapping_rounds_start_and_ceils_end() {
        assert_eq!(index_range_for(0.0, 1.0, 3), IndexRange::new(0, 3));
        assert_eq!(index_range_for(0.45, 0.55, 10), IndexRange::new(5, 6));
        assert_eq!(index_range_for(0.0, 0.3, 10), IndexRange::new(0, 3));
        assert_eq!(index_range_for(-0.5, 1.5, 4), IndexRange::new(0, 4));
        assert_eq!(index_range_for(0.2, 0.8, 0), IndexRange::new(0, 0));
    }

    #[test]
    fn end_index_ignores_rounding_noise_only() {
        assert_eq!(end_index_for(0.7, 10), 7);
        assert_eq!(end_index_for(0.7001, 10), 8);
        assert_eq!(end_index_for(f64::INFINITY, 10), 10);
        assert_eq!(end_index_for(f64::NEG_INFINITY, 10), 0);
    }

    #[test]
    fn working_range_overscans_and_clamps() {
        let w = working_range(IndexRange::new(0, 3), 1, 3);
        assert_eq!(w, IndexRange::new(0, 3));
        let w = working_range(IndexRange::new(4, 6), 2, 10);
        assert_eq!(w, IndexRange::new(2, 8));
    }

    #[test]
    fn window_for_indexes_inverts_the_mapping() {
        let (s, e) = window_for_indexes(2, 5, 10);
        assert_eq!(index_range_for(s, e, 10), IndexRange::new(2, 5));
    }
}
