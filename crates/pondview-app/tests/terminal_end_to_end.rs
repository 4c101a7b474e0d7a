use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use anyhow::Result;
use pondview_app::{TerminalUi, TraceSource, ViewerOptions, ViewerState};
use pondview_model::Trace;
use serde::Deserialize;
use serde_json::json;
use tempfile::tempdir;

static ENV_GUARD: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvCleanup {
    keys: Vec<String>,
}

impl EnvCleanup {
    fn new() -> Self {
        Self { keys: Vec::new() }
    }

    fn set(&mut self, key: &str, value: &str) {
        unsafe {
            std::env::set_var(key, value);
        }
        self.keys.push(key.to_string());
    }
}

impl Drop for EnvCleanup {
    fn drop(&mut self) {
        for key in &self.keys {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct FrameStatsDto {
    stage: usize,
    turn: usize,
    turn_count: usize,
    playing: bool,
    show_info: bool,
    progress: Vec<f64>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct ReportSummaryDto {
    frame_count: usize,
    turns_advanced: usize,
    final_stage: usize,
    final_turn: usize,
    stopped_at_final_turn: bool,
    max_progress: f64,
}

#[derive(Debug, Deserialize)]
struct HeadlessReportDto {
    initial: FrameStatsDto,
    frames: Vec<FrameStatsDto>,
    summary: ReportSummaryDto,
}

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pondview_app=info")
        .with_test_writer()
        .try_init();
}

/// Six turns, two agents, three lotuses, one lap. The first agent touches
/// every lotus by the final turn; the second stops at two.
fn crossing_trace() -> Trace {
    let raw = json!([
        [0.5, 1],
        [[
            [30, 10, [[6, 5, 1], [15, 5, 1], [24, 5, 1]], [0, 1], 0.125, 512],
            [
                [[[1, 5, 9, 0], [1, 7, 9, 0]]],
                [[[6, 5, 8, 1], [4, 7, 9, 0]]],
                [[[11, 5, 8, 1], [8, 7, 9, 1]]],
                [[[15, 5, 7, 2], [12, 7, 9, 1]]],
                [[[20, 5, 7, 2], [16, 6, 8, 2]]],
                [[[24, 5, 6, 3], [20, 6, 8, 2]]]
            ]
        ]]
    ]);
    Trace::from_value(&raw).expect("fixture trace should convert")
}

fn fixture_viewer() -> ViewerState {
    ViewerState::new(
        crossing_trace(),
        TraceSource::File(PathBuf::from("fixture.json")),
        ViewerOptions::default(),
    )
}

/// Runs one headless session with the given frame budget env value and
/// returns the parsed report. The caller must hold the env guard.
fn run_headless_with(frames_env: Option<&str>, report_path: &Path) -> Result<HeadlessReportDto> {
    let mut env = EnvCleanup::new();
    env.set("PONDVIEW_HEADLESS", "1");
    match frames_env {
        Some(frames) => env.set("PONDVIEW_HEADLESS_FRAMES", frames),
        None => unsafe {
            std::env::remove_var("PONDVIEW_HEADLESS_FRAMES");
        },
    }
    let report_env = report_path.to_string_lossy().into_owned();
    env.set("PONDVIEW_HEADLESS_REPORT", &report_env);

    TerminalUi::default().run(fixture_viewer())?;

    let contents = std::fs::read_to_string(report_path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[test]
fn headless_run_reaches_the_final_turn_and_stops() -> Result<()> {
    let _env_guard = ENV_GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env guard");
    init_test_tracing();

    let report_dir = tempdir()?;
    let report_path = report_dir.path().join("pondview_report.json");
    let report = run_headless_with(Some("12"), &report_path)?;

    assert_eq!(
        report.summary.frame_count, 12,
        "headless run should honour the requested frame budget"
    );
    assert_eq!(report.initial.turn, 0);
    assert!(
        report.initial.playing,
        "headless runs start with playback engaged"
    );

    assert_eq!(
        report.summary.final_turn, 5,
        "playback should land on the final turn"
    );
    assert!(
        report.summary.stopped_at_final_turn,
        "playback must stop once the final turn is on screen"
    );
    assert_eq!(
        report.summary.turns_advanced, 5,
        "five advances cover a six-turn stage"
    );

    let last = report.frames.last().expect("at least one frame");
    assert!(!last.playing, "the final frame should be stopped");
    assert_eq!(last.turn, 5);

    let held: Vec<usize> = report.frames.iter().skip(4).map(|frame| frame.turn).collect();
    assert!(
        held.iter().all(|&turn| turn == 5),
        "the turn should hold once playback stops: {held:?}"
    );

    // progress is the unclamped lotus ratio per agent
    assert!(
        (report.frames[0].progress[0] - 100.0 / 3.0).abs() < 1e-9,
        "one of three lotuses touched after the first advance"
    );
    assert_eq!(last.progress[0], 100.0);
    assert_eq!(last.progress[1], 200.0 / 3.0);
    assert_eq!(report.summary.max_progress, 100.0);

    Ok(())
}

#[test]
fn frame_budget_env_is_defaulted_capped_and_validated() -> Result<()> {
    let _env_guard = ENV_GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env guard");
    init_test_tracing();

    let report_dir = tempdir()?;

    let unset = run_headless_with(None, &report_dir.path().join("unset.json"))?;
    assert_eq!(unset.summary.frame_count, 16, "absent budget uses the default");

    let explicit = run_headless_with(Some("3"), &report_dir.path().join("explicit.json"))?;
    assert_eq!(explicit.summary.frame_count, 3);

    let garbage = run_headless_with(Some("a few"), &report_dir.path().join("garbage.json"))?;
    assert_eq!(
        garbage.summary.frame_count, 16,
        "unparseable budgets fall back to the default"
    );

    let zero = run_headless_with(Some("0"), &report_dir.path().join("zero.json"))?;
    assert_eq!(zero.summary.frame_count, 16, "zero is not a usable budget");

    let huge = run_headless_with(Some("99999"), &report_dir.path().join("huge.json"))?;
    assert_eq!(
        huge.summary.frame_count, 600,
        "oversized budgets clamp to the cap"
    );

    Ok(())
}

#[test]
fn frame_export_writes_a_png() -> Result<()> {
    let _env_guard = ENV_GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env guard");

    let workdir = tempdir()?;
    let original = std::env::current_dir()?;
    std::env::set_current_dir(workdir.path())?;
    let result = fixture_viewer().save_frame_png();
    std::env::set_current_dir(original)?;

    let path = result?;
    assert_eq!(path, PathBuf::from("frames").join("stage0_turn0.png"));

    let bytes = std::fs::read(workdir.path().join(&path))?;
    assert!(bytes.len() > 8, "png file should have content");
    assert_eq!(
        &bytes[..8],
        &[0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a],
        "png signature"
    );

    Ok(())
}
