use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chartframe::{
    DataBound, DataOptions, Easing, EventKind, Phase, SchedulerOptions, Stage, ZoomRange,
};
use serde_json::json;

fn main() {
    // Simulate a host that owns the display loop: the scheduler flips a flag, the "vsync" below
    // answers it by running a frame.
    let wants_frame = Arc::new(AtomicBool::new(false));
    let opts = SchedulerOptions::new().with_on_frame_request(Some({
        let wants_frame = Arc::clone(&wants_frame);
        move || wants_frame.store(true, Ordering::Relaxed)
    }));
    let mut stage = Stage::new(opts);

    let series = stage.create_data_component(
        DataOptions::new()
            .with_data_field("value", "v")
            .with_property_field("fill", "color")
            .with_chunk_budget(Duration::from_millis(2))
            .with_interpolation(200, Easing::EaseInOutCubic),
    );

    stage.on(|stage, event| {
        if event.kind == EventKind::DataValidated {
            // Once the data is in, zoom to the last tenth.
            let _ = stage.zoom(event.target, ZoomRange::new(0.9, 1.0), false);
        }
    });

    let raw = (0..200_000)
        .map(|i| {
            let record = json!({ "v": (i as f64 * 0.01).sin(), "color": "#36c" });
            match record {
                serde_json::Value::Object(m) => m,
                _ => unreachable!(),
            }
        })
        .collect();
    stage.set_data(series, raw).unwrap();

    let mut now_ms = 0;
    let mut frames = 0;
    while wants_frame.swap(false, Ordering::Relaxed) || stage.scheduler().is_frame_pending() {
        let report = stage.run_frame(now_ms);
        frames += 1;
        if report.yielded {
            let data = stage.data(series).unwrap();
            println!(
                "frame {}: parsed {} records so far",
                report.frame,
                data.main_items().len()
            );
        }
        if report.validated(Phase::DataRange) > 0 {
            let data = stage.data(series).unwrap();
            println!(
                "frame {}: window=({:.3}, {:.3}) items=[{}, {})",
                report.frame,
                data.start(),
                data.end(),
                data.start_index(),
                data.end_index()
            );
        }
        now_ms += 16;
    }

    let data = stage.data(series).unwrap();
    println!(
        "settled after {frames} frames: {} items, {} visible, extremes={:?}",
        data.item_count(),
        data.index_range().len(),
        data.extremes("value")
    );
}
