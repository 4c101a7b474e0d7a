//! Replay trace model shared across the pondview workspace.
//!
//! A trace arrives as one JSON document of positional nested arrays, the
//! wire format the contest simulator emits:
//!
//! ```text
//! top   = [ [agentRadius, lapsRequired], [stage, ...] ]
//! stage = [ [fieldW, fieldH, [lotus, ...], rank, flowSpeed, score], [turn, ...] ]
//! lotus = [ x, y, radius ]
//! turn  = [ [agent, ...] ]
//! agent = [ x, y, accelCount, lotusCount ]
//! ```
//!
//! Conversion is strict and fail-fast: either the whole document maps into a
//! [`Trace`] or a [`TraceError`] names the offending node. Nothing partial is
//! ever produced, so downstream rendering code can trust every invariant.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Upper bound on competing agents per stage, fixed by the simulator and by
/// the size of the display palette.
pub const MAX_AGENTS: usize = 4;

/// Errors raised while mapping raw JSON into a [`Trace`].
#[derive(Debug, Error)]
pub enum TraceError {
    /// The payload was not parseable JSON at all.
    #[error("trace is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A node that must be an array held something else.
    #[error("{node}: expected an array, found {found}")]
    ExpectedArray { node: String, found: &'static str },
    /// A node that must be a number held something else.
    #[error("{node}: expected a number, found {found}")]
    ExpectedNumber { node: String, found: &'static str },
    /// An array node was shorter than the schema requires.
    #[error("{node}: expected {expected} elements, found {found}")]
    TooShort {
        node: String,
        expected: usize,
        found: usize,
    },
    /// The stage list was empty; a replay needs at least one stage.
    #[error("trace contains no stages")]
    EmptyTrace,
    /// A stage carried no turns, so there is nothing to display.
    #[error("stage {stage} has no turns")]
    EmptyStage { stage: usize },
    /// A turn's agent roster disagreed with the stage's rank list.
    #[error("stage {stage}, turn {turn}: {found} agents on the field, stage declares {expected}")]
    AgentCountMismatch {
        stage: usize,
        turn: usize,
        expected: usize,
        found: usize,
    },
    /// More agents than the palette (and the simulator) supports.
    #[error("stage {stage} declares {found} agents, at most {max} are supported", max = MAX_AGENTS)]
    TooManyAgents { stage: usize, found: usize },
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_array<'v>(value: &'v Value, node: impl Into<String>) -> Result<&'v [Value], TraceError> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| TraceError::ExpectedArray {
        node: node.into(),
        found: json_kind(value),
    })
}

fn as_number(value: &Value, node: impl Into<String>) -> Result<f64, TraceError> {
    value.as_f64().ok_or_else(|| TraceError::ExpectedNumber {
        node: node.into(),
        found: json_kind(value),
    })
}

fn ensure_len(items: &[Value], expected: usize, node: impl Into<String>) -> Result<(), TraceError> {
    if items.len() < expected {
        return Err(TraceError::TooShort {
            node: node.into(),
            expected,
            found: items.len(),
        });
    }
    Ok(())
}

/// A fully parsed replay: the simulator's global parameters plus every stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    /// Body radius of every agent, in grid units.
    pub agent_radius: f32,
    /// Circuits of the lotus course an agent must complete to finish.
    pub laps_required: u32,
    pub stages: Vec<Stage>,
}

impl Trace {
    /// Parses a raw JSON document into a trace.
    pub fn from_json_str(raw: &str) -> Result<Self, TraceError> {
        let root: Value = serde_json::from_str(raw)?;
        Self::from_value(&root)
    }

    /// Maps an already-parsed JSON value into a trace.
    pub fn from_value(root: &Value) -> Result<Self, TraceError> {
        let top = as_array(root, "trace root")?;
        ensure_len(top, 2, "trace root")?;

        let header = as_array(&top[0], "trace header")?;
        ensure_len(header, 2, "trace header")?;
        let agent_radius = as_number(&header[0], "agent radius")? as f32;
        let laps_required = as_number(&header[1], "required laps")? as u32;

        let stage_values = as_array(&top[1], "stage list")?;
        if stage_values.is_empty() {
            return Err(TraceError::EmptyTrace);
        }
        let mut stages = Vec::with_capacity(stage_values.len());
        for (stage_no, stage_value) in stage_values.iter().enumerate() {
            stages.push(Stage::from_value(stage_value, stage_no, laps_required)?);
        }

        Ok(Self {
            agent_radius,
            laps_required,
            stages,
        })
    }

    #[must_use]
    pub fn stage(&self, stage_no: usize) -> Option<&Stage> {
        self.stages.get(stage_no)
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// One simulated course: static geometry plus the per-turn timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    /// Field extent along x, in grid units.
    pub field_width: f32,
    /// Field extent along y, in grid units.
    pub field_height: f32,
    pub lotuses: Vec<Lotus>,
    /// Final placement per agent; the length is the stage's agent count.
    pub rank: Vec<i64>,
    /// Vertical water drift per turn, in grid units.
    pub flow_speed: f32,
    /// Stage score as reported by the simulator, passed through for display.
    pub score: i64,
    pub turns: Vec<Turn>,
}

impl Stage {
    fn from_value(value: &Value, stage_no: usize, laps_required: u32) -> Result<Self, TraceError> {
        let pair = as_array(value, format!("stage {stage_no}"))?;
        ensure_len(pair, 2, format!("stage {stage_no}"))?;

        let header = as_array(&pair[0], format!("stage {stage_no} header"))?;
        ensure_len(header, 6, format!("stage {stage_no} header"))?;
        let field_width = as_number(&header[0], format!("stage {stage_no} field width"))? as f32;
        let field_height = as_number(&header[1], format!("stage {stage_no} field height"))? as f32;

        let lotus_values = as_array(&header[2], format!("stage {stage_no} lotus list"))?;
        let mut lotuses = Vec::with_capacity(lotus_values.len());
        for (lotus_no, lotus_value) in lotus_values.iter().enumerate() {
            lotuses.push(Lotus::from_value(lotus_value, stage_no, lotus_no)?);
        }

        let rank_values = as_array(&header[3], format!("stage {stage_no} rank list"))?;
        let mut rank = Vec::with_capacity(rank_values.len());
        for (agent_no, rank_value) in rank_values.iter().enumerate() {
            rank.push(as_number(rank_value, format!("stage {stage_no} rank {agent_no}"))? as i64);
        }
        if rank.len() > MAX_AGENTS {
            return Err(TraceError::TooManyAgents {
                stage: stage_no,
                found: rank.len(),
            });
        }

        let flow_speed = as_number(&header[4], format!("stage {stage_no} flow speed"))? as f32;
        let score = as_number(&header[5], format!("stage {stage_no} score"))? as i64;

        let turn_values = as_array(&pair[1], format!("stage {stage_no} turn list"))?;
        if turn_values.is_empty() {
            return Err(TraceError::EmptyStage { stage: stage_no });
        }
        let mut turns = Vec::with_capacity(turn_values.len());
        for (turn_no, turn_value) in turn_values.iter().enumerate() {
            let turn = Turn::from_value(
                turn_value,
                stage_no,
                turn_no,
                lotuses.len(),
                laps_required,
            )?;
            if turn.agents.len() != rank.len() {
                return Err(TraceError::AgentCountMismatch {
                    stage: stage_no,
                    turn: turn_no,
                    expected: rank.len(),
                    found: turn.agents.len(),
                });
            }
            turns.push(turn);
        }

        Ok(Self {
            field_width,
            field_height,
            lotuses,
            rank,
            flow_speed,
            score,
            turns,
        })
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.rank.len()
    }

    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn turn(&self, turn_no: usize) -> Option<&Turn> {
        self.turns.get(turn_no)
    }

    /// Index of the final turn. Stages are never empty, so this is total.
    #[must_use]
    pub fn last_turn(&self) -> usize {
        self.turns.len() - 1
    }
}

/// A circular waypoint on the course. Its position in the stage's sequence
/// is its display label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Lotus {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Lotus {
    fn from_value(value: &Value, stage_no: usize, lotus_no: usize) -> Result<Self, TraceError> {
        let node = format!("stage {stage_no} lotus {lotus_no}");
        let fields = as_array(value, node.clone())?;
        ensure_len(fields, 3, node.clone())?;
        Ok(Self {
            x: as_number(&fields[0], format!("{node} x"))? as f32,
            y: as_number(&fields[1], format!("{node} y"))? as f32,
            radius: as_number(&fields[2], format!("{node} radius"))? as f32,
        })
    }
}

/// One simulation tick: a snapshot of every agent. Turn 0 is the initial
/// placement before anyone has moved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub agents: Vec<AgentState>,
}

impl Turn {
    fn from_value(
        value: &Value,
        stage_no: usize,
        turn_no: usize,
        lotus_total: usize,
        laps_required: u32,
    ) -> Result<Self, TraceError> {
        let node = format!("stage {stage_no} turn {turn_no}");
        let wrapper = as_array(value, node.clone())?;
        ensure_len(wrapper, 1, node.clone())?;
        let agent_values = as_array(&wrapper[0], format!("{node} agent list"))?;
        let mut agents = Vec::with_capacity(agent_values.len());
        for (agent_no, agent_value) in agent_values.iter().enumerate() {
            agents.push(AgentState::from_value(
                agent_value,
                &node,
                agent_no,
                lotus_total,
                laps_required,
            )?);
        }
        Ok(Self { agents })
    }
}

/// Snapshot of one agent within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentState {
    pub x: f32,
    pub y: f32,
    /// Speed-boost actions the agent still has available.
    pub accel_count: u32,
    /// Lotuses touched so far, cumulative across laps.
    pub lotus_count: u32,
    /// Course completion as a percentage. Derived once at conversion from
    /// `lotus_count * 100 / (lotus_total * laps_required)` and deliberately
    /// not clamped: counts past the final lap push it beyond 100.
    pub progress: f64,
}

impl AgentState {
    fn from_value(
        value: &Value,
        turn_node: &str,
        agent_no: usize,
        lotus_total: usize,
        laps_required: u32,
    ) -> Result<Self, TraceError> {
        let node = format!("{turn_node} agent {agent_no}");
        let fields = as_array(value, node.clone())?;
        ensure_len(fields, 4, node.clone())?;
        let x = as_number(&fields[0], format!("{node} x"))? as f32;
        let y = as_number(&fields[1], format!("{node} y"))? as f32;
        let accel_count = as_number(&fields[2], format!("{node} accel count"))? as u32;
        let lotus_count = as_number(&fields[3], format!("{node} lotus count"))? as u32;
        let progress =
            f64::from(lotus_count) * 100.0 / (lotus_total as f64 * f64::from(laps_required));
        Ok(Self {
            x,
            y,
            accel_count,
            lotus_count,
            progress,
        })
    }
}

/// Clamps a requested index into `[0, len - 1]`.
///
/// Every navigation path, keyboard, prompt, playback timer, goes through
/// this one rule. A `len` of zero maps to zero so callers indexing into
/// known-nonempty sequences stay in range regardless.
#[must_use]
pub fn clamp_index(requested: i64, len: usize) -> usize {
    let last = len.saturating_sub(1) as i64;
    requested.clamp(0, last) as usize
}

/// Parses free-form prompt text as an index request. Anything that is not a
/// number counts as a request for 0, which the clamp then keeps in range.
#[must_use]
pub fn parse_index(text: &str) -> i64 {
    text.trim().parse().unwrap_or(0)
}

/// Ordinal label for a final placement, `0` through `3`. Placements outside
/// the supported range have no label.
#[must_use]
pub fn rank_label(rank: i64) -> Option<&'static str> {
    match rank {
        0 => Some("1st"),
        1 => Some("2nd"),
        2 => Some("3rd"),
        3 => Some("4th"),
        _ => None,
    }
}

/// What a navigation mutation actually changed, so the caller can schedule
/// the matching render passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavEffect {
    /// The request clamped back to the current position.
    Unchanged,
    /// Same stage, different turn.
    TurnChanged,
    /// Different stage; the turn index was reset to 0.
    StageChanged,
}

/// Current viewing position inside a trace. Both indices are always valid
/// for the trace they were clamped against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub stage_no: usize,
    pub turn_no: usize,
}

impl Navigation {
    /// Requests a stage change. Selecting the current stage is a no-op;
    /// moving to a different one rewinds the turn index to 0.
    pub fn seek_stage(&mut self, requested: i64, stage_count: usize) -> NavEffect {
        let stage_no = clamp_index(requested, stage_count);
        if stage_no == self.stage_no {
            return NavEffect::Unchanged;
        }
        self.stage_no = stage_no;
        self.turn_no = 0;
        NavEffect::StageChanged
    }

    /// Requests an absolute turn within the current stage.
    pub fn seek_turn(&mut self, requested: i64, turn_count: usize) -> NavEffect {
        let turn_no = clamp_index(requested, turn_count);
        if turn_no == self.turn_no {
            return NavEffect::Unchanged;
        }
        self.turn_no = turn_no;
        NavEffect::TurnChanged
    }

    /// Moves the turn index by a signed delta, clamped at both ends.
    pub fn step_turn(&mut self, delta: i64, turn_count: usize) -> NavEffect {
        self.seek_turn(self.turn_no as i64 + delta, turn_count)
    }

    /// Moves the stage index by a signed delta, clamped at both ends.
    pub fn step_stage(&mut self, delta: i64, stage_count: usize) -> NavEffect {
        self.seek_stage(self.stage_no as i64 + delta, stage_count)
    }
}

/// Per-agent standing shown in the sidebar, refreshed from whichever turn
/// is on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProgressEntry {
    /// Completion percentage copied from the displayed turn, unclamped.
    pub result: f64,
    pub lotus_count: u32,
}

/// The sidebar's progress table. Rebuilt empty on every stage change and
/// synced from the current turn on every turn change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressBoard {
    entries: Vec<ProgressEntry>,
}

impl ProgressBoard {
    /// Discards all standings and starts over with one zeroed entry per
    /// competing agent.
    pub fn reset(&mut self, agent_count: usize) {
        self.entries.clear();
        self.entries.resize_with(agent_count, ProgressEntry::default);
    }

    /// Copies each agent's current completion into the board. Extra agents
    /// beyond the board's size are ignored; conversion guarantees the
    /// counts agree.
    pub fn sync(&mut self, turn: &Turn) {
        for (entry, agent) in self.entries.iter_mut().zip(&turn.agents) {
            entry.result = agent.progress;
            entry.lotus_count = agent.lotus_count;
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ProgressEntry] {
        &self.entries
    }
}
