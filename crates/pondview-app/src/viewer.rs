//! Viewing position, playback, and the frame layers for the current stage.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use pondview_model::{NavEffect, Navigation, ProgressBoard, Stage, Trace, Turn};
use pondview_render::{Canvas, frame::FrameLayers};
use tracing::info;

use crate::loader::TraceSource;
use crate::playback::{DEFAULT_INTERVAL, Playback};

/// Startup knobs carried over from the command line.
#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub interval: Duration,
    pub start_stage: i64,
    pub show_info: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            start_stage: 0,
            show_info: false,
        }
    }
}

/// Everything the frontend displays: the trace, where we are in it, the
/// per-stage frame layers, and the playback timer.
///
/// Navigation goes through this type rather than [`Navigation`] directly
/// so that every position change repaints the frame and resyncs the
/// progress board, and so a stage change rebuilds the layers at the new
/// field size.
#[derive(Debug)]
pub struct ViewerState {
    trace: Trace,
    source: TraceSource,
    nav: Navigation,
    board: ProgressBoard,
    layers: FrameLayers,
    playback: Playback,
    show_info: bool,
    alert: Option<String>,
}

impl ViewerState {
    #[must_use]
    pub fn new(trace: Trace, source: TraceSource, options: ViewerOptions) -> Self {
        let mut nav = Navigation::default();
        nav.seek_stage(options.start_stage, trace.stage_count());

        let stage = &trace.stages[nav.stage_no];
        let mut layers = FrameLayers::new(stage);
        layers.paint_turn(stage, trace.agent_radius, nav.turn_no);
        let mut board = ProgressBoard::default();
        board.reset(stage.agent_count());
        board.sync(&stage.turns[nav.turn_no]);

        Self {
            trace,
            source,
            nav,
            board,
            layers,
            playback: Playback::new(options.interval),
            show_info: options.show_info,
            alert: None,
        }
    }

    #[must_use]
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    #[must_use]
    pub fn source(&self) -> &TraceSource {
        &self.source
    }

    #[must_use]
    pub fn current_stage(&self) -> &Stage {
        &self.trace.stages[self.nav.stage_no]
    }

    #[must_use]
    pub fn current_turn(&self) -> &Turn {
        &self.current_stage().turns[self.nav.turn_no]
    }

    #[must_use]
    pub fn stage_no(&self) -> usize {
        self.nav.stage_no
    }

    #[must_use]
    pub fn turn_no(&self) -> usize {
        self.nav.turn_no
    }

    #[must_use]
    pub fn board(&self) -> &ProgressBoard {
        &self.board
    }

    #[must_use]
    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    #[must_use]
    pub fn show_info(&self) -> bool {
        self.show_info
    }

    pub fn toggle_info(&mut self) -> bool {
        self.show_info = !self.show_info;
        self.show_info
    }

    #[must_use]
    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn set_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    pub fn clear_alert(&mut self) {
        self.alert = None;
    }

    /// Jumps to a stage by absolute index. Allowed during playback; the
    /// timer keeps running and the new stage starts from turn 0.
    pub fn seek_stage(&mut self, requested: i64) -> NavEffect {
        let effect = self.nav.seek_stage(requested, self.trace.stage_count());
        if effect == NavEffect::StageChanged {
            self.enter_stage();
        }
        effect
    }

    pub fn step_stage(&mut self, delta: i64) -> NavEffect {
        self.seek_stage(self.nav.stage_no as i64 + delta)
    }

    /// Jumps to a turn by absolute index. Rejected while playback runs;
    /// the timer owns the turn position until it is paused.
    pub fn seek_turn(&mut self, requested: i64) -> NavEffect {
        if self.playback.is_playing() {
            return NavEffect::Unchanged;
        }
        self.seek_turn_unlocked(requested)
    }

    pub fn step_turn(&mut self, delta: i64) -> NavEffect {
        self.seek_turn(self.nav.turn_no as i64 + delta)
    }

    fn seek_turn_unlocked(&mut self, requested: i64) -> NavEffect {
        let effect = self
            .nav
            .seek_turn(requested, self.current_stage().turn_count());
        if effect == NavEffect::TurnChanged {
            self.paint_current();
        }
        effect
    }

    /// Starts or stops playback. Starting on the final turn is declined;
    /// there is nothing left to play.
    pub fn toggle_playback(&mut self, now: Instant) -> bool {
        if self.playback.is_playing() {
            self.playback.stop();
            return false;
        }
        if self.nav.turn_no >= self.current_stage().last_turn() {
            return false;
        }
        self.playback.start(now);
        true
    }

    /// Drives the playback timer; call once per UI loop pass.
    pub fn tick(&mut self, now: Instant) {
        if self.playback.due(now) {
            self.playback_tick();
        }
    }

    /// One playback advance: a single turn forward, stopping the timer
    /// once the final turn is on screen.
    pub fn playback_tick(&mut self) -> NavEffect {
        if !self.playback.is_playing() {
            return NavEffect::Unchanged;
        }
        let effect = self.seek_turn_unlocked(self.nav.turn_no as i64 + 1);
        if self.nav.turn_no >= self.current_stage().last_turn() {
            self.playback.stop();
        }
        effect
    }

    pub fn speed_up(&mut self) -> Duration {
        self.playback.speed_up()
    }

    pub fn slow_down(&mut self) -> Duration {
        self.playback.slow_down()
    }

    /// Re-fetches the trace from its source. On success the viewer rewinds
    /// to stage 0, turn 0 with playback stopped; on failure the current
    /// trace stays on screen untouched.
    pub fn reload(&mut self) -> Result<()> {
        let trace = self.source.load()?;
        self.trace = trace;
        self.nav = Navigation::default();
        self.playback.stop();
        self.enter_stage();
        info!(
            source = %self.source.describe(),
            stages = self.trace.stage_count(),
            "trace reloaded"
        );
        Ok(())
    }

    /// Flattens the layer stack for the current position.
    #[must_use]
    pub fn composite(&self) -> Canvas {
        self.layers.composite(self.show_info)
    }

    /// Writes the current composite frame under `frames/` and returns the
    /// relative path.
    pub fn save_frame_png(&self) -> Result<PathBuf> {
        let dir = PathBuf::from("frames");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!(
            "stage{}_turn{}.png",
            self.nav.stage_no, self.nav.turn_no
        ));
        self.composite()
            .save_png(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    fn enter_stage(&mut self) {
        let stage = &self.trace.stages[self.nav.stage_no];
        self.layers = FrameLayers::new(stage);
        self.board.reset(stage.agent_count());
        self.paint_current();
    }

    fn paint_current(&mut self) {
        let stage = &self.trace.stages[self.nav.stage_no];
        self.layers
            .paint_turn(stage, self.trace.agent_radius, self.nav.turn_no);
        self.board.sync(&stage.turns[self.nav.turn_no]);
    }
}
