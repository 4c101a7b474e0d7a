//! Layered frame composition for one stage of a replay.
//!
//! A frame is six stacked canvases, bottom to top: flowing water, the
//! reference grid, stage geometry (lotus pads), the info overlay (course
//! path and lotus numbers), agents with their trails, and agent resource
//! labels. The overlay and label layers only join the composite while the
//! info toggle is on. Static layers are painted once per stage, the rest
//! once per displayed turn.

use pondview_model::Stage;

use crate::{Canvas, Rgba, SCALE};

/// Display colors for up to four agents, in roster order: blue, saddle
/// brown, chocolate, dark goldenrod.
pub const AGENT_COLORS: [Rgba; 4] = [
    Rgba::opaque(0x00, 0x00, 0xff),
    Rgba::opaque(0x8b, 0x45, 0x13),
    Rgba::opaque(0xd2, 0x69, 0x1e),
    Rgba::opaque(0xb8, 0x86, 0x0b),
];

/// Side length of the repeating background tiles, device pixels.
const TILE_SIZE: u32 = 100;

const GRID_LINE: Rgba = Rgba::opaque(0xaa, 0xaa, 0xaa);
const GRID_BORDER: Rgba = Rgba::opaque(0x55, 0x55, 0x55);
const WATER_DEEP: Rgba = Rgba::opaque(21, 72, 99);
const WATER_SHALLOW: Rgba = Rgba::opaque(27, 86, 115);
const LOTUS_FILL: Rgba = Rgba::new(64, 255, 0, 128);
const PATH_STROKE: Rgba = Rgba::new(255, 0, 0, 102);
const BADGE_FILL: Rgba = Rgba::new(0, 0, 0, 153);
const TRAIL_STROKE: Rgba = Rgba::new(255, 255, 255, 38);
const BADGE_RADIUS: f32 = 9.0;
const DIGIT_SCALE: u32 = 2;
const TRAIL_STROKES: usize = 10;

/// Builds the 100x100 reference grid tile: light lines every ten pixels
/// with a darker border along the tile's leading edges. Generated once and
/// tiled behind every stage.
#[must_use]
pub fn grid_texture() -> Canvas {
    let mut tile = Canvas::new(TILE_SIZE, TILE_SIZE);
    for line in 0..10 {
        let pos = (line * 10) as i32;
        for t in 0..TILE_SIZE as i32 {
            tile.set_pixel(pos, t, GRID_LINE);
            tile.set_pixel(t, pos, GRID_LINE);
        }
    }
    for t in 0..TILE_SIZE as i32 {
        tile.set_pixel(0, t, GRID_BORDER);
        tile.set_pixel(t, 0, GRID_BORDER);
    }
    tile
}

/// Builds the 100x100 water tile: opaque horizontal bands that make the
/// vertical flow scroll visible.
#[must_use]
pub fn water_texture() -> Canvas {
    let mut tile = Canvas::filled(TILE_SIZE, TILE_SIZE, WATER_DEEP);
    for y in 0..TILE_SIZE as i32 {
        if (y / 10) % 2 == 1 {
            for x in 0..TILE_SIZE as i32 {
                tile.set_pixel(x, y, WATER_SHALLOW);
            }
        }
    }
    tile
}

/// Vertical water offset for a turn, truncated to whole device pixels the
/// way the display has always rounded it.
#[must_use]
pub fn flow_offset_px(turn_no: usize, flow_speed: f32) -> i32 {
    (turn_no as f32 * flow_speed * SCALE) as i32
}

/// The per-stage canvas stack. Created (and sized) from a stage, then
/// repainted turn by turn.
#[derive(Debug, Clone)]
pub struct FrameLayers {
    width: u32,
    height: u32,
    water_tile: Canvas,
    grid_tile: Canvas,
    pub water: Canvas,
    pub grid: Canvas,
    pub stage: Canvas,
    pub overlay: Canvas,
    pub agents: Canvas,
    pub labels: Canvas,
}

impl FrameLayers {
    /// Allocates all layers at the stage's pixel size and paints everything
    /// that does not change between turns.
    #[must_use]
    pub fn new(stage: &Stage) -> Self {
        let width = (stage.field_width * SCALE).round() as u32;
        let height = (stage.field_height * SCALE).round() as u32;
        let mut layers = Self {
            width,
            height,
            water_tile: water_texture(),
            grid_tile: grid_texture(),
            water: Canvas::new(width, height),
            grid: Canvas::new(width, height),
            stage: Canvas::new(width, height),
            overlay: Canvas::new(width, height),
            agents: Canvas::new(width, height),
            labels: Canvas::new(width, height),
        };
        layers.water.blit_tiled(&layers.water_tile, 0);
        layers.grid.blit_tiled(&layers.grid_tile, 0);
        layers.paint_stage(stage);
        layers
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Repaints the static stage geometry: lotus pads on the stage layer,
    /// course path and numbered badges on the info overlay.
    pub fn paint_stage(&mut self, stage: &Stage) {
        self.stage.clear(Rgba::TRANSPARENT);
        for lotus in &stage.lotuses {
            let cx = lotus.x * SCALE;
            let cy = lotus.y * SCALE;
            let radius = lotus.radius * SCALE;
            self.stage.fill_circle(cx, cy, radius, LOTUS_FILL);
            self.stage.stroke_circle(cx, cy, radius, Rgba::BLACK);
        }

        self.overlay.clear(Rgba::TRANSPARENT);
        let path: Vec<(f32, f32)> = stage
            .lotuses
            .iter()
            .map(|lotus| (lotus.x * SCALE, lotus.y * SCALE))
            .collect();
        self.overlay.stroke_polygon(&path, 1.0, PATH_STROKE);
        for (index, lotus) in stage.lotuses.iter().enumerate() {
            // Badge sits on the pad's upper-left diagonal, just outside it.
            let diagonal = lotus.radius * SCALE / std::f32::consts::SQRT_2;
            let cx = lotus.x * SCALE - diagonal;
            let cy = lotus.y * SCALE - diagonal - 4.0;
            self.overlay.fill_circle(cx, cy, BADGE_RADIUS, BADGE_FILL);
            self.overlay.draw_digits(
                cx.round() as i32,
                cy.round() as i32,
                &index.to_string(),
                DIGIT_SCALE,
                Rgba::WHITE,
            );
        }
    }

    /// Repaints everything tied to the displayed turn: the scrolled water,
    /// agent trails and bodies, and the resource labels. Out-of-range turn
    /// numbers paint nothing.
    pub fn paint_turn(&mut self, stage: &Stage, agent_radius: f32, turn_no: usize) {
        let Some(turn) = stage.turn(turn_no) else {
            return;
        };

        self.water
            .blit_tiled(&self.water_tile, flow_offset_px(turn_no, stage.flow_speed));

        self.agents.clear(Rgba::TRANSPARENT);
        let trail_width = agent_radius * 2.0 * SCALE;
        for (index, agent) in turn.agents.iter().enumerate() {
            let head = (agent.x * SCALE, agent.y * SCALE);
            // Each successive stroke walks one turn further back, so recent
            // segments collect more faint passes than old ones.
            for stroke in 0..TRAIL_STROKES {
                let depth = stroke.min(turn_no);
                if depth == 0 {
                    continue;
                }
                let mut points = Vec::with_capacity(depth + 1);
                points.push(head);
                for back in 0..depth {
                    let past = &stage.turns[turn_no - back].agents[index];
                    points.push((past.x * SCALE, past.y * SCALE));
                }
                self.agents.stroke_polyline(&points, trail_width, TRAIL_STROKE);
            }
        }
        for (index, agent) in turn.agents.iter().enumerate() {
            let cx = agent.x * SCALE;
            let cy = agent.y * SCALE;
            let color = AGENT_COLORS[index % AGENT_COLORS.len()];
            self.agents.fill_circle(cx, cy, agent_radius * SCALE, color);
            self.agents.stroke_circle(cx, cy, agent_radius * SCALE, Rgba::BLACK);
        }

        self.labels.clear(Rgba::TRANSPARENT);
        for agent in &turn.agents {
            self.labels.draw_digits(
                (agent.x * SCALE).round() as i32,
                (agent.y * SCALE).round() as i32,
                &agent.accel_count.to_string(),
                DIGIT_SCALE,
                Rgba::WHITE,
            );
        }
    }

    /// Flattens the stack into one opaque frame. The info overlay and the
    /// resource labels are only included when `show_info` is set.
    #[must_use]
    pub fn composite(&self, show_info: bool) -> Canvas {
        let mut out = self.water.clone();
        out.draw_canvas_over(&self.grid);
        out.draw_canvas_over(&self.stage);
        if show_info {
            out.draw_canvas_over(&self.overlay);
        }
        out.draw_canvas_over(&self.agents);
        if show_info {
            out.draw_canvas_over(&self.labels);
        }
        out
    }
}
