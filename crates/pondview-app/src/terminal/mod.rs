//! Interactive ratatui frontend plus the headless capture mode used by
//! integration tests.

use std::collections::VecDeque;
use std::env;
use std::fs;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use pondview_model::{NavEffect, Stage, parse_index, rank_label};
use pondview_render::Rgba;
use pondview_render::frame::AGENT_COLORS;
use ratatui::backend::{CrosstermBackend, TestBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};
use serde::Serialize;
use supports_color::{ColorLevel, Stream, on_cached};
use tracing::{error, info, warn};

use crate::viewer::ViewerState;

const HEADLESS_ENV: &str = "PONDVIEW_HEADLESS";
const HEADLESS_FRAMES_ENV: &str = "PONDVIEW_HEADLESS_FRAMES";
const HEADLESS_REPORT_ENV: &str = "PONDVIEW_HEADLESS_REPORT";

const DEFAULT_HEADLESS_FRAMES: usize = 16;
const MAX_HEADLESS_FRAMES: usize = 600;
const EVENT_LOG_CAPACITY: usize = 8;
const IDLE_POLL: Duration = Duration::from_millis(33);

/// The terminal frontend. [`TerminalUi::run`] blocks until the session
/// ends, or renders a fixed number of frames against a test backend when
/// `PONDVIEW_HEADLESS` is set.
#[derive(Debug, Default)]
pub struct TerminalUi;

impl TerminalUi {
    pub fn run(&self, viewer: ViewerState) -> Result<()> {
        if headless_requested() {
            let report = self.run_headless(viewer)?;
            info!(
                frames = report.summary.frame_count,
                final_stage = report.summary.final_stage,
                final_turn = report.summary.final_turn,
                stopped = report.summary.stopped_at_final_turn,
                "headless run completed"
            );
            return Ok(());
        }
        self.run_interactive(viewer)
    }

    fn run_interactive(&self, viewer: ViewerState) -> Result<()> {
        enable_raw_mode().context("failed to enable raw mode (is stdout a terminal?)")?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err).context("failed to enter the alternate screen");
        }
        let backend = CrosstermBackend::new(stdout);
        let mut terminal =
            Terminal::new(backend).context("failed to build the terminal backend")?;
        terminal.hide_cursor().ok();

        let result = run_event_loop(&mut terminal, TerminalApp::new(viewer));

        if let Err(err) = restore_terminal(&mut terminal) {
            error!(error = %err, "failed to restore the terminal");
        }
        result
    }

    /// Drives playback directly, one advance per frame, with no timers or
    /// input. Playback starts engaged and the run keeps drawing after it
    /// stops, so the report shows both the advance and the hold.
    fn run_headless(&self, viewer: ViewerState) -> Result<HeadlessReport> {
        let backend = TestBackend::new(80, 36);
        let mut terminal = Terminal::new(backend).context("failed to build the test backend")?;
        let mut app = TerminalApp::new(viewer);
        let budget = headless_frame_budget();

        app.viewer.toggle_playback(Instant::now());
        let initial = FrameStats::from_viewer(&app.viewer);
        let mut frames = Vec::with_capacity(budget);
        for _ in 0..budget {
            app.viewer.playback_tick();
            terminal.draw(|frame| app.draw(frame))?;
            frames.push(FrameStats::from_viewer(&app.viewer));
        }

        let summary = ReportSummary::from_frames(&initial, &frames);
        let report = HeadlessReport {
            initial,
            frames,
            summary,
        };
        if let Some(path) = report_file_path_from_env() {
            report.write_json(&path)?;
        }
        Ok(report)
    }
}

fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: TerminalApp,
) -> Result<()> {
    loop {
        app.viewer.tick(Instant::now());
        terminal.draw(|frame| app.draw(frame))?;

        let timeout = app.poll_timeout(Instant::now());
        let event_ready = event::poll(timeout).unwrap_or(false);
        if event_ready
            && let Event::Key(key) = event::read()?
            && app.handle_key(key)?
        {
            break;
        }
    }
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

fn headless_requested() -> bool {
    env::var_os(HEADLESS_ENV).is_some_and(|value| !value.is_empty() && value != "0")
}

fn headless_frame_budget() -> usize {
    env::var(HEADLESS_FRAMES_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|&frames| frames > 0)
        .map(|frames| frames.min(MAX_HEADLESS_FRAMES))
        .unwrap_or(DEFAULT_HEADLESS_FRAMES)
}

fn report_file_path_from_env() -> Option<PathBuf> {
    let raw = env::var_os(HEADLESS_REPORT_ENV)?;
    if raw.is_empty() {
        return None;
    }
    Some(PathBuf::from(raw))
}

/// Per-frame sample captured during a headless run.
#[derive(Debug, Clone, Serialize)]
pub struct FrameStats {
    pub stage: usize,
    pub turn: usize,
    pub turn_count: usize,
    pub playing: bool,
    pub show_info: bool,
    pub progress: Vec<f64>,
}

impl FrameStats {
    fn from_viewer(viewer: &ViewerState) -> Self {
        Self {
            stage: viewer.stage_no(),
            turn: viewer.turn_no(),
            turn_count: viewer.current_stage().turn_count(),
            playing: viewer.is_playing(),
            show_info: viewer.show_info(),
            progress: viewer
                .board()
                .entries()
                .iter()
                .map(|entry| entry.result)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub frame_count: usize,
    pub turns_advanced: usize,
    pub final_stage: usize,
    pub final_turn: usize,
    pub stopped_at_final_turn: bool,
    pub max_progress: f64,
}

impl ReportSummary {
    fn from_frames(initial: &FrameStats, frames: &[FrameStats]) -> Self {
        let last = frames.last().unwrap_or(initial);
        let mut turns_advanced = 0;
        let mut previous = initial;
        for frame in frames {
            if frame.stage == previous.stage && frame.turn > previous.turn {
                turns_advanced += frame.turn - previous.turn;
            }
            previous = frame;
        }
        let max_progress = std::iter::once(initial)
            .chain(frames)
            .flat_map(|frame| frame.progress.iter().copied())
            .fold(0.0_f64, f64::max);
        Self {
            frame_count: frames.len(),
            turns_advanced,
            final_stage: last.stage,
            final_turn: last.turn,
            stopped_at_final_turn: !last.playing && last.turn + 1 == last.turn_count,
            max_progress,
        }
    }
}

/// Everything a headless session measured, written as pretty JSON when
/// `PONDVIEW_HEADLESS_REPORT` names a file.
#[derive(Debug, Clone, Serialize)]
pub struct HeadlessReport {
    pub initial: FrameStats,
    pub frames: Vec<FrameStats>,
    pub summary: ReportSummary,
}

impl HeadlessReport {
    fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create report directory {}", parent.display())
            })?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .context("failed to serialise the headless report")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptTarget {
    Stage,
    Turn,
}

#[derive(Debug)]
struct Prompt {
    target: PromptTarget,
    buffer: String,
}

struct TerminalApp {
    viewer: ViewerState,
    palette: Palette,
    prompt: Option<Prompt>,
    help_visible: bool,
    events: VecDeque<String>,
}

impl TerminalApp {
    fn new(viewer: ViewerState) -> Self {
        Self {
            viewer,
            palette: Palette::detect(),
            prompt: None,
            help_visible: false,
            events: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    fn push_event(&mut self, message: impl Into<String>) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(message.into());
    }

    fn poll_timeout(&self, now: Instant) -> Duration {
        match self.viewer.playback().time_until_due(now) {
            Some(until_tick) => IDLE_POLL.min(until_tick),
            None => IDLE_POLL,
        }
    }

    /// Returns `Ok(true)` when the session should end.
    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        self.viewer.clear_alert();

        if self.prompt.is_some() {
            self.handle_prompt_key(key.code);
            return Ok(false);
        }

        match (key.code, key.modifiers) {
            (KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc, _) => return Ok(true),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => return Ok(true),
            (KeyCode::Char(' '), _) => {
                let was_playing = self.viewer.is_playing();
                let playing = self.viewer.toggle_playback(Instant::now());
                if playing {
                    let millis = self.viewer.playback().interval().as_millis();
                    self.push_event(format!("Playing at {millis} ms per turn"));
                } else if was_playing {
                    self.push_event("Paused");
                } else {
                    self.push_event("Already on the final turn");
                }
            }
            (KeyCode::Left, _) => {
                self.viewer.step_turn(-1);
            }
            (KeyCode::Right, _) => {
                self.viewer.step_turn(1);
            }
            (KeyCode::PageUp, _) => {
                self.viewer.step_turn(-10);
            }
            (KeyCode::PageDown, _) => {
                self.viewer.step_turn(10);
            }
            (KeyCode::Home, _) => {
                self.viewer.seek_turn(0);
            }
            (KeyCode::End, _) => {
                self.viewer.seek_turn(i64::MAX);
            }
            (KeyCode::Char('['), _) => {
                let effect = self.viewer.step_stage(-1);
                self.note_stage_change(effect);
            }
            (KeyCode::Char(']'), _) => {
                let effect = self.viewer.step_stage(1);
                self.note_stage_change(effect);
            }
            (KeyCode::Char('s'), _) => {
                self.prompt = Some(Prompt {
                    target: PromptTarget::Stage,
                    buffer: String::new(),
                });
            }
            (KeyCode::Char('t'), _) => {
                if self.viewer.is_playing() {
                    self.push_event("Pause playback to jump turns");
                } else {
                    self.prompt = Some(Prompt {
                        target: PromptTarget::Turn,
                        buffer: String::new(),
                    });
                }
            }
            (KeyCode::Char('+') | KeyCode::Char('='), _) => {
                let interval = self.viewer.speed_up();
                self.push_event(format!("Interval {} ms", interval.as_millis()));
            }
            (KeyCode::Char('-') | KeyCode::Char('_'), _) => {
                let interval = self.viewer.slow_down();
                self.push_event(format!("Interval {} ms", interval.as_millis()));
            }
            (KeyCode::Char('i'), _) => {
                let shown = self.viewer.toggle_info();
                self.push_event(if shown {
                    "Info overlay on"
                } else {
                    "Info overlay off"
                });
            }
            (KeyCode::Char('r'), _) => match self.viewer.reload() {
                Ok(()) => {
                    self.push_event(format!("Reloaded {}", self.viewer.source().describe()));
                }
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "trace reload failed");
                    self.viewer.set_alert(format!("reload failed: {err:#}"));
                }
            },
            (KeyCode::Char('S'), _) => match self.viewer.save_frame_png() {
                Ok(path) => self.push_event(format!("Saved {}", path.display())),
                Err(err) => self.viewer.set_alert(format!("save failed: {err:#}")),
            },
            (KeyCode::Char('?') | KeyCode::Char('h'), _) => {
                self.help_visible = !self.help_visible;
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_prompt_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take() {
                    self.apply_prompt(prompt.target, prompt.buffer.trim());
                }
            }
            KeyCode::Esc => self.prompt = None,
            KeyCode::Backspace => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.buffer.pop();
                }
            }
            KeyCode::Char(ch) => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.buffer.push(ch);
                }
            }
            _ => {}
        }
    }

    fn apply_prompt(&mut self, target: PromptTarget, text: &str) {
        let requested = parse_index(text);
        match target {
            PromptTarget::Stage => {
                let effect = self.viewer.seek_stage(requested);
                self.note_stage_change(effect);
            }
            PromptTarget::Turn => {
                self.viewer.seek_turn(requested);
            }
        }
    }

    fn note_stage_change(&mut self, effect: NavEffect) {
        if effect == NavEffect::StageChanged {
            self.push_event(format!("Stage {}", self.viewer.stage_no()));
        }
    }

    fn draw(&self, frame: &mut Frame<'_>) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ])
            .split(frame.area());
        self.draw_header(frame, outer[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
            .split(outer[1]);
        self.draw_field(frame, body[0]);
        self.draw_sidebar(frame, body[1]);

        self.draw_scrub(frame, outer[2]);
        if self.help_visible {
            self.draw_help(frame);
        }
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let stage = self.viewer.current_stage();
        let last_stage = self.viewer.trace().stage_count().saturating_sub(1);
        let mut spans = vec![Span::raw(format!(
            " stage {}/{}  turn {:>4}/{}  score {:>6}  flow {:.4} ",
            self.viewer.stage_no(),
            last_stage,
            self.viewer.turn_no(),
            stage.last_turn(),
            stage.score,
            stage.flow_speed,
        ))];
        let millis = self.viewer.playback().interval().as_millis();
        if self.viewer.is_playing() {
            spans.push(Span::styled(
                format!(" playing {millis} ms "),
                self.palette.playing_badge(),
            ));
        } else {
            spans.push(Span::styled(
                format!(" paused {millis} ms "),
                self.palette.dim(),
            ));
        }
        if self.viewer.show_info() {
            spans.push(Span::styled(" info ", self.palette.accent()));
        }
        if let Some(alert) = self.viewer.alert() {
            spans.push(Span::styled(format!("  {alert}"), self.palette.alert()));
        }
        let block = Block::default()
            .title(self.palette.title("pondview"))
            .borders(Borders::ALL);
        frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
    }

    /// Downsamples the composite frame into one coloured cell per terminal
    /// cell, then stamps agent and lotus glyphs on top.
    fn draw_field(&self, frame: &mut Frame<'_>, area: Rect) {
        let stage = self.viewer.current_stage();
        let title = format!("Pond {}x{}", stage.field_width, stage.field_height);
        let block = Block::default()
            .title(self.palette.title(&title))
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.width < 2 || inner.height < 2 {
            return;
        }

        let composite = self.viewer.composite();
        let cols = usize::from(inner.width);
        let rows = usize::from(inner.height);
        let mut grid: Vec<Vec<(char, Style)>> = Vec::with_capacity(rows);
        for row in 0..rows {
            let y0 = row as u32 * composite.height() / rows as u32;
            let y1 = ((row as u32 + 1) * composite.height() / rows as u32).max(y0 + 1);
            let mut cells = Vec::with_capacity(cols);
            for col in 0..cols {
                let x0 = col as u32 * composite.width() / cols as u32;
                let x1 = ((col as u32 + 1) * composite.width() / cols as u32).max(x0 + 1);
                cells.push(self.palette.field_cell(composite.region_mean(x0, y0, x1, y1)));
            }
            grid.push(cells);
        }

        if self.viewer.show_info() {
            for (index, lotus) in stage.lotuses.iter().enumerate() {
                let (col, row) = Self::cell_position(stage, cols, rows, lotus.x, lotus.y);
                let style = self.palette.lotus_label();
                for (offset, glyph) in index.to_string().chars().enumerate() {
                    Self::stamp_char(&mut grid, col + offset, row, glyph, style);
                }
            }
        }
        for (index, agent) in self.viewer.current_turn().agents.iter().enumerate() {
            let (col, row) = Self::cell_position(stage, cols, rows, agent.x, agent.y);
            let glyph = char::from(b'1' + index as u8);
            Self::stamp_char(&mut grid, col, row, glyph, self.palette.agent_cell(index));
        }

        let lines: Vec<Line> = grid
            .into_iter()
            .map(|cells| {
                Line::from(
                    cells
                        .into_iter()
                        .map(|(glyph, style)| Span::styled(glyph.to_string(), style))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn cell_position(stage: &Stage, cols: usize, rows: usize, x: f32, y: f32) -> (usize, usize) {
        let fx = (x / stage.field_width).clamp(0.0, 0.999);
        let fy = (y / stage.field_height).clamp(0.0, 0.999);
        ((fx * cols as f32) as usize, (fy * rows as f32) as usize)
    }

    fn stamp_char(
        grid: &mut [Vec<(char, Style)>],
        col: usize,
        row: usize,
        glyph: char,
        style: Style,
    ) {
        if let Some(cells) = grid.get_mut(row)
            && let Some(cell) = cells.get_mut(col)
        {
            cell.0 = glyph;
            cell.1 = cell.1.patch(style);
        }
    }

    fn draw_sidebar(&self, frame: &mut Frame<'_>, area: Rect) {
        let standings_rows = self.viewer.current_stage().agent_count() as u16 + 2;
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(standings_rows),
                Constraint::Length(9),
                Constraint::Min(3),
            ])
            .split(area);
        self.draw_standings(frame, rows[0]);
        self.draw_stage_facts(frame, rows[1]);
        self.draw_events(frame, rows[2]);
    }

    fn draw_standings(&self, frame: &mut Frame<'_>, area: Rect) {
        let stage = self.viewer.current_stage();
        let turn = self.viewer.current_turn();
        let items: Vec<ListItem> = self
            .viewer
            .board()
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let rank = stage
                    .rank
                    .get(index)
                    .copied()
                    .and_then(rank_label)
                    .unwrap_or("-");
                let accel = turn.agents.get(index).map_or(0, |agent| agent.accel_count);
                ListItem::new(Line::from(vec![
                    Span::styled(" ■ ", Style::default().fg(self.palette.agent_color(index))),
                    Span::raw(format!("A{} {:>3} ", index + 1, rank)),
                    Span::styled(format!("{:>7.2}%", entry.result), self.palette.accent()),
                    Span::raw(format!(
                        "  lotus {:>3}  accel {:>2}",
                        entry.lotus_count, accel
                    )),
                ]))
            })
            .collect();
        let block = Block::default()
            .title(self.palette.title("Standings"))
            .borders(Borders::ALL);
        frame.render_widget(List::new(items).block(block), area);
    }

    fn draw_stage_facts(&self, frame: &mut Frame<'_>, area: Rect) {
        let stage = self.viewer.current_stage();
        let trace = self.viewer.trace();
        let lines = vec![
            Line::raw(format!(" field   {} x {}", stage.field_width, stage.field_height)),
            Line::raw(format!(" flow    {:>5}", stage.flow_speed)),
            Line::raw(format!(" score   {:>5}", stage.score)),
            Line::raw(format!(" lotuses {:>5}", stage.lotuses.len())),
            Line::raw(format!(" turns   {:>5}", stage.turn_count())),
            Line::raw(format!(" laps    {:>5}", trace.laps_required)),
            Line::raw(format!(" radius  {:>5}", trace.agent_radius)),
        ];
        let block = Block::default()
            .title(self.palette.title("Stage"))
            .borders(Borders::ALL);
        frame.render_widget(Paragraph::new(Text::from(lines)).block(block), area);
    }

    fn draw_events(&self, frame: &mut Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self
            .events
            .iter()
            .rev()
            .map(|event| ListItem::new(Line::raw(format!(" {event}"))))
            .collect();
        let block = Block::default()
            .title(self.palette.title("Events"))
            .borders(Borders::ALL);
        frame.render_widget(List::new(items).block(block), area);
    }

    fn draw_scrub(&self, frame: &mut Frame<'_>, area: Rect) {
        if let Some(prompt) = &self.prompt {
            let label = match prompt.target {
                PromptTarget::Stage => "stage",
                PromptTarget::Turn => "turn",
            };
            let block = Block::default()
                .title(self.palette.title("Go to"))
                .borders(Borders::ALL);
            let line = Line::from(vec![
                Span::raw(format!(" {label} number: ")),
                Span::styled(format!("{}_", prompt.buffer), self.palette.accent()),
            ]);
            frame.render_widget(Paragraph::new(line).block(block), area);
            return;
        }

        let stage = self.viewer.current_stage();
        let turn = self.viewer.turn_no();
        let last = stage.last_turn();
        let ratio = if last == 0 { 1.0 } else { turn as f64 / last as f64 };
        let playing = self.viewer.is_playing();
        let title = if playing {
            "Turn (playing, scrub locked)"
        } else {
            "Turn"
        };
        let gauge = Gauge::default()
            .block(
                Block::default()
                    .title(self.palette.title(title))
                    .borders(Borders::ALL),
            )
            .gauge_style(self.palette.gauge(playing))
            .ratio(ratio)
            .label(format!("{turn} / {last}"));
        frame.render_widget(gauge, area);
    }

    fn draw_help(&self, frame: &mut Frame<'_>) {
        let area = frame.area();
        let width = area.width.min(46);
        let height = area.height.min(17);
        let rect = Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + (area.height - height) / 2,
            width,
            height,
        };
        let rows = vec![
            Line::raw(" space      Play / pause"),
            Line::raw(" left/right Step one turn"),
            Line::raw(" pgup/pgdn  Jump ten turns"),
            Line::raw(" home/end   First / final turn"),
            Line::raw(" [ ]        Previous / next stage"),
            Line::raw(" s          Go to a stage by number"),
            Line::raw(" t          Go to a turn by number"),
            Line::raw(" i          Toggle the info overlay"),
            Line::raw(" + -        Faster / slower playback"),
            Line::raw(" r          Reload the trace source"),
            Line::raw(" S          Save the frame as a PNG"),
            Line::raw(" ? h        Toggle this help"),
            Line::raw(" q esc      Quit"),
        ];
        let block = Block::default()
            .title(self.palette.title("Keys"))
            .borders(Borders::ALL);
        frame.render_widget(Clear, rect);
        frame.render_widget(Paragraph::new(Text::from(rows)).block(block), rect);
    }
}

/// Colour capabilities of the attached terminal, probed once at startup.
#[derive(Debug, Clone, Copy)]
struct Palette {
    level: Option<ColorLevel>,
}

impl Palette {
    fn detect() -> Self {
        Self {
            level: on_cached(Stream::Stdout),
        }
    }

    fn has_color(&self) -> bool {
        self.level.is_some()
    }

    fn rich_color(&self) -> bool {
        self.level
            .is_some_and(|level| level.has_16m || level.has_256)
    }

    fn title(&self, text: &str) -> Span<'static> {
        if self.has_color() {
            Span::styled(
                text.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )
        } else {
            Span::raw(text.to_string())
        }
    }

    fn accent(&self) -> Style {
        if self.has_color() {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        }
    }

    fn dim(&self) -> Style {
        if self.has_color() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().add_modifier(Modifier::DIM)
        }
    }

    fn alert(&self) -> Style {
        if self.has_color() {
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED)
        }
    }

    fn playing_badge(&self) -> Style {
        if self.has_color() {
            Style::default().fg(Color::Black).bg(Color::Green)
        } else {
            Style::default().add_modifier(Modifier::REVERSED)
        }
    }

    fn gauge(&self, locked: bool) -> Style {
        if !self.has_color() {
            return Style::default();
        }
        if locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Cyan)
        }
    }

    fn agent_color(&self, index: usize) -> Color {
        if self.rich_color() {
            let color = AGENT_COLORS[index % AGENT_COLORS.len()];
            return Color::Rgb(color.r, color.g, color.b);
        }
        const FALLBACK: [Color; 4] = [Color::Blue, Color::Red, Color::LightRed, Color::Yellow];
        FALLBACK[index % FALLBACK.len()]
    }

    fn agent_cell(&self, index: usize) -> Style {
        if self.rich_color() {
            let color = AGENT_COLORS[index % AGENT_COLORS.len()];
            Style::default()
                .fg(Color::White)
                .bg(Color::Rgb(color.r, color.g, color.b))
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(self.agent_color(index))
                .add_modifier(Modifier::BOLD | Modifier::REVERSED)
        }
    }

    fn lotus_label(&self) -> Style {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    }

    fn field_cell(&self, mean: Rgba) -> (char, Style) {
        if self.rich_color() {
            return (' ', Style::default().bg(Color::Rgb(mean.r, mean.g, mean.b)));
        }
        let luminance = (u16::from(mean.r) + u16::from(mean.g) + u16::from(mean.b)) / 3;
        let glyph = match luminance {
            0..=63 => ' ',
            64..=127 => '.',
            128..=191 => '+',
            _ => '#',
        };
        (glyph, Style::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TraceSource;
    use crate::viewer::ViewerOptions;
    use pondview_model::Trace;
    use serde_json::json;

    fn fixture_viewer() -> ViewerState {
        let raw = json!([
            [0.5, 1],
            [
                [
                    [30, 10, [[6, 5, 1], [15, 5, 1], [24, 5, 1]], [0, 1], 0.125, 512],
                    [
                        [[[1, 5, 9, 0], [1, 7, 9, 0]]],
                        [[[6, 5, 8, 1], [4, 7, 9, 0]]],
                        [[[11, 5, 8, 1], [8, 7, 9, 1]]],
                        [[[15, 5, 7, 2], [12, 7, 9, 1]]],
                        [[[20, 5, 7, 2], [16, 6, 8, 2]]],
                        [[[24, 5, 6, 3], [20, 6, 8, 2]]]
                    ]
                ],
                [
                    [16, 16, [[8, 8, 2]], [1, 0], 0, 100],
                    [[[[2, 2, 5, 0], [2, 14, 5, 0]]], [[[8, 8, 4, 1], [6, 12, 5, 0]]]]
                ]
            ]
        ]);
        let trace = Trace::from_value(&raw).expect("fixture trace should convert");
        ViewerState::new(
            trace,
            TraceSource::File(PathBuf::from("fixture.json")),
            ViewerOptions::default(),
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn quit_keys_end_the_session() {
        let mut app = TerminalApp::new(fixture_viewer());
        assert!(app.handle_key(key(KeyCode::Char('q'))).expect("handle"));
        let mut app = TerminalApp::new(fixture_viewer());
        assert!(app.handle_key(key(KeyCode::Esc)).expect("handle"));
        let mut app = TerminalApp::new(fixture_viewer());
        assert!(
            app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
                .expect("handle")
        );
    }

    #[test]
    fn arrows_step_and_clamp() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Right)).expect("handle");
        app.handle_key(key(KeyCode::Right)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 2);
        for _ in 0..5 {
            app.handle_key(key(KeyCode::Left)).expect("handle");
        }
        assert_eq!(app.viewer.turn_no(), 0, "stepping clamps at the first turn");
        app.handle_key(key(KeyCode::End)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 5);
        app.handle_key(key(KeyCode::Home)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 0);
    }

    #[test]
    fn page_keys_jump_ten_turns() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::PageDown)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 5, "a ten-turn jump clamps to the end");
        app.handle_key(key(KeyCode::PageUp)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 0);
    }

    #[test]
    fn turn_prompt_jumps_to_the_request() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char('t'))).expect("handle");
        assert!(app.prompt.is_some());
        app.handle_key(key(KeyCode::Char('4'))).expect("handle");
        app.handle_key(key(KeyCode::Enter)).expect("handle");
        assert!(app.prompt.is_none());
        assert_eq!(app.viewer.turn_no(), 4);
    }

    #[test]
    fn prompt_gibberish_lands_on_turn_zero() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.viewer.seek_turn(3);
        app.handle_key(key(KeyCode::Char('t'))).expect("handle");
        for ch in "pond".chars() {
            app.handle_key(key(KeyCode::Char(ch))).expect("handle");
        }
        app.handle_key(key(KeyCode::Enter)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 0, "unparseable input reads as zero");
    }

    #[test]
    fn prompt_escape_cancels() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.viewer.seek_turn(2);
        app.handle_key(key(KeyCode::Char('t'))).expect("handle");
        app.handle_key(key(KeyCode::Char('5'))).expect("handle");
        app.handle_key(key(KeyCode::Esc)).expect("handle");
        assert!(app.prompt.is_none());
        assert_eq!(app.viewer.turn_no(), 2);
    }

    #[test]
    fn backspace_edits_the_prompt() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char('t'))).expect("handle");
        app.handle_key(key(KeyCode::Char('4'))).expect("handle");
        app.handle_key(key(KeyCode::Char('9'))).expect("handle");
        app.handle_key(key(KeyCode::Backspace)).expect("handle");
        app.handle_key(key(KeyCode::Enter)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 4);
    }

    #[test]
    fn stage_prompt_switches_stage() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.viewer.seek_turn(3);
        app.handle_key(key(KeyCode::Char('s'))).expect("handle");
        app.handle_key(key(KeyCode::Char('1'))).expect("handle");
        app.handle_key(key(KeyCode::Enter)).expect("handle");
        assert_eq!(app.viewer.stage_no(), 1);
        assert_eq!(app.viewer.turn_no(), 0);
    }

    #[test]
    fn bracket_keys_step_stages() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char(']'))).expect("handle");
        assert_eq!(app.viewer.stage_no(), 1);
        app.handle_key(key(KeyCode::Char(']'))).expect("handle");
        assert_eq!(app.viewer.stage_no(), 1, "stage steps clamp at the end");
        app.handle_key(key(KeyCode::Char('['))).expect("handle");
        assert_eq!(app.viewer.stage_no(), 0);
    }

    #[test]
    fn space_locks_manual_scrubbing() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char(' '))).expect("handle");
        assert!(app.viewer.is_playing());
        app.handle_key(key(KeyCode::Right)).expect("handle");
        assert_eq!(app.viewer.turn_no(), 0, "arrows are inert during playback");
        app.handle_key(key(KeyCode::Char('t'))).expect("handle");
        assert!(
            app.prompt.is_none(),
            "the turn prompt refuses to open while playing"
        );
        app.handle_key(key(KeyCode::Char(' '))).expect("handle");
        assert!(!app.viewer.is_playing());
    }

    #[test]
    fn help_and_info_toggles() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char('?'))).expect("handle");
        assert!(app.help_visible);
        app.handle_key(key(KeyCode::Char('h'))).expect("handle");
        assert!(!app.help_visible);
        app.handle_key(key(KeyCode::Char('i'))).expect("handle");
        assert!(app.viewer.show_info());
    }

    #[test]
    fn speed_keys_report_through_the_event_log() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char('-'))).expect("handle");
        assert_eq!(
            app.events.back().map(String::as_str),
            Some("Interval 60 ms")
        );
        app.handle_key(key(KeyCode::Char('+'))).expect("handle");
        assert_eq!(
            app.events.back().map(String::as_str),
            Some("Interval 50 ms")
        );
    }

    #[test]
    fn event_log_caps_its_length() {
        let mut app = TerminalApp::new(fixture_viewer());
        for index in 0..20 {
            app.push_event(format!("event {index}"));
        }
        assert_eq!(app.events.len(), EVENT_LOG_CAPACITY);
        assert_eq!(app.events.front().map(String::as_str), Some("event 12"));
    }

    #[test]
    fn failed_reload_raises_an_alert_and_keys_clear_it() {
        let mut app = TerminalApp::new(fixture_viewer());
        app.handle_key(key(KeyCode::Char('r'))).expect("handle");
        assert!(app.viewer.alert().is_some(), "fixture.json does not exist");
        app.handle_key(key(KeyCode::Right)).expect("handle");
        assert_eq!(app.viewer.alert(), None, "any later key clears the banner");
    }

    #[test]
    fn draw_fits_terminals_large_and_tiny() {
        let backend = TestBackend::new(80, 36);
        let mut terminal = Terminal::new(backend).expect("terminal");
        let mut app = TerminalApp::new(fixture_viewer());
        app.help_visible = true;
        app.viewer.toggle_info();
        terminal.draw(|frame| app.draw(frame)).expect("draw");

        let backend = TestBackend::new(24, 8);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal.draw(|frame| app.draw(frame)).expect("tiny draw");
    }

    #[test]
    fn summary_flags_a_stopped_final_turn() {
        let frame = |turn: usize, playing: bool| FrameStats {
            stage: 0,
            turn,
            turn_count: 6,
            playing,
            show_info: false,
            progress: vec![turn as f64 * 20.0],
        };
        let initial = frame(0, true);
        let frames: Vec<FrameStats> = (1..=5)
            .map(|turn| frame(turn, turn < 5))
            .chain(std::iter::repeat_with(|| frame(5, false)).take(3))
            .collect();
        let summary = ReportSummary::from_frames(&initial, &frames);
        assert_eq!(summary.frame_count, 8);
        assert_eq!(summary.turns_advanced, 5);
        assert_eq!(summary.final_turn, 5);
        assert!(summary.stopped_at_final_turn);
        assert_eq!(summary.max_progress, 100.0);
    }

    #[test]
    fn summary_of_an_idle_run_reports_the_initial_position() {
        let initial = FrameStats {
            stage: 2,
            turn: 7,
            turn_count: 8,
            playing: false,
            show_info: true,
            progress: vec![12.5],
        };
        let summary = ReportSummary::from_frames(&initial, &[]);
        assert_eq!(summary.frame_count, 0);
        assert_eq!(summary.final_stage, 2);
        assert_eq!(summary.final_turn, 7);
        assert!(summary.stopped_at_final_turn);
        assert_eq!(summary.max_progress, 12.5);
    }
}
