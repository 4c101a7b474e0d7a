use pondview_model::Trace;
use pondview_render::SCALE;
use pondview_render::frame::{AGENT_COLORS, FrameLayers, flow_offset_px};
use serde_json::json;

/// Single agent pacing +2 units in x per turn on a calm 30x10 field.
fn pacing_trace() -> Trace {
    let turns: Vec<serde_json::Value> = (0..11)
        .map(|t| json!([[[1.0 + 2.0 * t as f64, 5.0, 9, 0]]]))
        .collect();
    let raw = json!([[0.5, 3], [[[30, 10, [[15, 8, 1]], [0], 0, 0], turns]]]);
    Trace::from_value(&raw).expect("fixture")
}

/// Two stages with different sizes; the second one flows.
fn two_stage_trace() -> Trace {
    let calm: Vec<serde_json::Value> = (0..3)
        .map(|t| json!([[[2.0 + t as f64, 2.0, 9, 0], [8.0, 8.0 - t as f64, 9, 0]]]))
        .collect();
    let flowing: Vec<serde_json::Value> = (0..5)
        .map(|t| json!([[[3.0, 3.0 + t as f64, 9, 0], [12.0, 12.0, 9, 0]]]))
        .collect();
    let raw = json!([
        [0.5, 3],
        [
            [[10, 10, [[5, 5, 1]], [0, 1], 0, 10], calm],
            [[16, 16, [[4, 4, 1], [12, 12, 1]], [1, 0], 0.5, 20], flowing]
        ]
    ]);
    Trace::from_value(&raw).expect("fixture")
}

#[test]
fn composite_is_fully_opaque() {
    let trace = pacing_trace();
    let stage = &trace.stages[0];
    let mut layers = FrameLayers::new(stage);
    layers.paint_turn(stage, trace.agent_radius, 4);
    for show_info in [false, true] {
        let frame = layers.composite(show_info);
        assert!(
            frame.pixels().iter().all(|px| px.a == 255),
            "composite must be opaque (show_info = {show_info})"
        );
    }
}

#[test]
fn water_scrolls_with_the_flow() {
    let trace = two_stage_trace();
    let stage = trace.stage(1).expect("flowing stage");
    let mut layers = FrameLayers::new(stage);

    layers.paint_turn(stage, trace.agent_radius, 0);
    let still = layers.water.pixel(0, 10);
    layers.paint_turn(stage, trace.agent_radius, 1);
    let moved = layers.water.pixel(0, 10);
    assert_eq!(flow_offset_px(1, stage.flow_speed), 5);
    assert_ne!(still, moved, "a 5 px offset must shift the band boundary");

    // A calm stage never moves its water.
    let stage = trace.stage(0).expect("calm stage");
    let mut layers = FrameLayers::new(stage);
    layers.paint_turn(stage, trace.agent_radius, 0);
    let before = layers.water.clone();
    layers.paint_turn(stage, trace.agent_radius, 2);
    assert_eq!(layers.water, before);
}

#[test]
fn trail_density_decays_with_age() {
    let trace = pacing_trace();
    let stage = &trace.stages[0];
    let mut layers = FrameLayers::new(stage);
    layers.paint_turn(stage, trace.agent_radius, 10);

    // Midpoint of the newest back-segment vs midpoint of the oldest one.
    let fresh = layers.agents.pixel(200, 50).expect("in range");
    let stale = layers.agents.pixel(60, 50).expect("in range");
    assert!(fresh.a > stale.a, "fresh {} !> stale {}", fresh.a, stale.a);
    assert_eq!(stale.a, 38, "oldest segment gets exactly one faint pass");
}

#[test]
fn both_agents_draw_in_roster_order() {
    let trace = two_stage_trace();
    let stage = trace.stage(0).expect("calm stage");
    let mut layers = FrameLayers::new(stage);
    layers.paint_turn(stage, trace.agent_radius, 0);
    let frame = layers.composite(false);
    assert_eq!(frame.pixel(20, 20), Some(AGENT_COLORS[0]));
    assert_eq!(frame.pixel(80, 80), Some(AGENT_COLORS[1]));
}

#[test]
fn stage_switch_resizes_the_stack() {
    let trace = two_stage_trace();
    let first = FrameLayers::new(trace.stage(0).expect("stage 0"));
    assert_eq!((first.width(), first.height()), (100, 100));
    let second = FrameLayers::new(trace.stage(1).expect("stage 1"));
    assert_eq!((second.width(), second.height()), (160, 160));

    let frame = second.composite(true);
    assert_eq!(
        frame.pixels().len(),
        160 * 160,
        "composite covers the full resized field"
    );
    assert_eq!(frame.to_rgba8().len(), 160 * 160 * 4);
}

#[test]
fn scale_is_ten_pixels_per_unit() {
    // Pinned: every screen coordinate in the viewer depends on it.
    assert_eq!(SCALE, 10.0);
    let trace = pacing_trace();
    let layers = FrameLayers::new(&trace.stages[0]);
    assert_eq!(layers.width(), (trace.stages[0].field_width * SCALE) as u32);
}
