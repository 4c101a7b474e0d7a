//! Software rasterizer backing the pondview display.
//!
//! Frames are composed on CPU-side RGBA canvases at a fixed scale of
//! [`SCALE`] device pixels per grid unit, then either sampled into terminal
//! cells or written out as PNG. The primitives here mirror 2D-canvas
//! semantics where it matters for the picture: src-over blending, and
//! strokes that blend each covered pixel exactly once no matter how many
//! segments of the same stroke cross it. The faint agent trails rely on
//! that property to build up their fade stroke by stroke.

use std::path::Path;

pub mod frame;

/// Device pixels per grid unit. Every coordinate in a trace is multiplied
/// by this before it touches a canvas.
pub const SCALE: f32 = 10.0;

/// An 8-bit RGBA color, non-premultiplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const WHITE: Self = Self::opaque(255, 255, 255);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Source-over composite of `self` on top of `below`.
    #[must_use]
    pub fn over(self, below: Self) -> Self {
        if self.a == 255 {
            return self;
        }
        if self.a == 0 {
            return below;
        }
        let sa = f32::from(self.a) / 255.0;
        let da = f32::from(below.a) / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            return Self::TRANSPARENT;
        }
        let channel = |s: u8, d: u8| -> u8 {
            let s = f32::from(s);
            let d = f32::from(d);
            ((s * sa + d * da * (1.0 - sa)) / out_a + 0.5) as u8
        };
        Self {
            r: channel(self.r, below.r),
            g: channel(self.g, below.g),
            b: channel(self.b, below.b),
            a: (out_a * 255.0 + 0.5) as u8,
        }
    }
}

/// A fixed-size RGBA pixel buffer with the drawing operations the viewer
/// needs. Coordinates are in device pixels; pixel centers sit at +0.5.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Canvas {
    /// Creates a fully transparent canvas.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Rgba::TRANSPARENT)
    }

    /// Creates a canvas pre-filled with one color.
    #[must_use]
    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Pixel at integer coordinates, if inside the canvas.
    #[must_use]
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    /// Resets every pixel to `color`.
    pub fn clear(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }

    /// Overwrites a pixel, ignoring writes outside the canvas.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgba) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        self.pixels[y as usize * self.width as usize + x as usize] = color;
    }

    /// Blends a pixel src-over, ignoring writes outside the canvas.
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Rgba) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.pixels[idx] = color.over(self.pixels[idx]);
    }

    /// Blends an axis-aligned rectangle.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgba) {
        for yy in y..y + h as i32 {
            for xx in x..x + w as i32 {
                self.blend_pixel(xx, yy, color);
            }
        }
    }

    /// Blends a filled disc centered at `(cx, cy)`.
    pub fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        let x_min = (cx - radius).floor() as i32;
        let x_max = (cx + radius).ceil() as i32;
        let y_min = (cy - radius).floor() as i32;
        let y_max = (cy + radius).ceil() as i32;
        let r2 = radius * radius;
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.blend_pixel(x, y, color);
                }
            }
        }
    }

    /// Blends a one-pixel circle outline centered at `(cx, cy)`.
    pub fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        let reach = radius + 1.0;
        let x_min = (cx - reach).floor() as i32;
        let x_max = (cx + reach).ceil() as i32;
        let y_min = (cy - reach).floor() as i32;
        let y_max = (cy + reach).ceil() as i32;
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if (dist - radius).abs() <= 0.5 {
                    self.blend_pixel(x, y, color);
                }
            }
        }
    }

    /// Strokes an open polyline with round caps and joins. The whole stroke
    /// blends each covered pixel once, so overlapping segments within one
    /// call do not darken each other.
    pub fn stroke_polyline(&mut self, points: &[(f32, f32)], width: f32, color: Rgba) {
        self.stroke_path(points, width, color, false);
    }

    /// Strokes a closed polygon outline, same single-blend rule as
    /// [`Canvas::stroke_polyline`].
    pub fn stroke_polygon(&mut self, points: &[(f32, f32)], width: f32, color: Rgba) {
        self.stroke_path(points, width, color, true);
    }

    fn stroke_path(&mut self, points: &[(f32, f32)], width: f32, color: Rgba, closed: bool) {
        if points.len() < 2 {
            return;
        }
        let radius = (width * 0.5).max(0.5);
        let mut mask = vec![false; self.pixels.len()];
        for pair in points.windows(2) {
            self.stamp_segment(&mut mask, pair[0], pair[1], radius);
        }
        if closed && points.len() > 2 {
            self.stamp_segment(&mut mask, points[points.len() - 1], points[0], radius);
        }
        let width_px = self.width as usize;
        for (idx, covered) in mask.iter().enumerate() {
            if *covered {
                let x = (idx % width_px) as i32;
                let y = (idx / width_px) as i32;
                self.blend_pixel(x, y, color);
            }
        }
    }

    fn stamp_segment(&self, mask: &mut [bool], a: (f32, f32), b: (f32, f32), radius: f32) {
        let dx = b.0 - a.0;
        let dy = b.1 - a.1;
        let len = (dx * dx + dy * dy).sqrt();
        // Half-pixel spacing keeps the stamped capsule hole-free.
        let steps = (len / 0.5).ceil() as u32;
        if steps == 0 {
            self.stamp_disc(mask, a.0, a.1, radius);
            return;
        }
        for s in 0..=steps {
            let t = s as f32 / steps as f32;
            self.stamp_disc(mask, a.0 + dx * t, a.1 + dy * t, radius);
        }
    }

    fn stamp_disc(&self, mask: &mut [bool], cx: f32, cy: f32, radius: f32) {
        let x_min = ((cx - radius).floor() as i32).max(0);
        let x_max = ((cx + radius).ceil() as i32).min(self.width as i32 - 1);
        let y_min = ((cy - radius).floor() as i32).max(0);
        let y_max = ((cy + radius).ceil() as i32).min(self.height as i32 - 1);
        let r2 = radius * radius;
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    mask[y as usize * self.width as usize + x as usize] = true;
                }
            }
        }
    }

    /// Overwrites the whole canvas by repeating `tile`, shifted down by
    /// `offset_y` device pixels with vertical wraparound.
    pub fn blit_tiled(&mut self, tile: &Canvas, offset_y: i32) {
        if tile.width == 0 || tile.height == 0 {
            return;
        }
        let tw = tile.width as i32;
        let th = tile.height as i32;
        for y in 0..self.height as i32 {
            let src_y = (y - offset_y).rem_euclid(th);
            for x in 0..self.width as i32 {
                let src_x = x.rem_euclid(tw);
                let color = tile.pixels[src_y as usize * tile.width as usize + src_x as usize];
                self.set_pixel(x, y, color);
            }
        }
    }

    /// Composites `src` over this canvas. Both must have identical
    /// dimensions.
    pub fn draw_canvas_over(&mut self, src: &Canvas) {
        debug_assert_eq!((self.width, self.height), (src.width, src.height));
        for (dst, over) in self.pixels.iter_mut().zip(&src.pixels) {
            *dst = over.over(*dst);
        }
    }

    /// Mean color of the half-open pixel region `[x0, x1) x [y0, y1)`,
    /// clipped to the canvas. Empty regions come back transparent.
    #[must_use]
    pub fn region_mean(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> Rgba {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return Rgba::TRANSPARENT;
        }
        let (mut r, mut g, mut b, mut a) = (0u32, 0u32, 0u32, 0u32);
        for y in y0..y1 {
            for x in x0..x1 {
                let px = self.pixels[y as usize * self.width as usize + x as usize];
                r += u32::from(px.r);
                g += u32::from(px.g);
                b += u32::from(px.b);
                a += u32::from(px.a);
            }
        }
        let count = (x1 - x0) * (y1 - y0);
        Rgba::new(
            (r / count) as u8,
            (g / count) as u8,
            (b / count) as u8,
            (a / count) as u8,
        )
    }

    /// Draws a run of digits centered on `(cx, cy)` using the built-in 3x5
    /// face, each dot scaled to `scale` pixels. Non-digit characters occupy
    /// their slot but draw nothing.
    pub fn draw_digits(&mut self, cx: i32, cy: i32, text: &str, scale: u32, color: Rgba) {
        let count = text.chars().count() as u32;
        if count == 0 || scale == 0 {
            return;
        }
        let glyph_w = 3 * scale;
        let advance = glyph_w + scale;
        let block_w = count * glyph_w + (count - 1) * scale;
        let block_h = 5 * scale;
        let mut pen_x = cx - block_w as i32 / 2;
        let pen_y = cy - block_h as i32 / 2;
        for ch in text.chars() {
            if let Some(digit) = ch.to_digit(10) {
                let rows = DIGIT_FACE[digit as usize];
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..3u32 {
                        if bits & (0b100 >> col) != 0 {
                            self.fill_rect(
                                pen_x + (col * scale) as i32,
                                pen_y + (row as u32 * scale) as i32,
                                scale,
                                scale,
                                color,
                            );
                        }
                    }
                }
            }
            pen_x += advance as i32;
        }
    }

    /// Flattens the buffer into tightly packed RGBA8 bytes, row-major.
    #[must_use]
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for px in &self.pixels {
            out.extend_from_slice(&[px.r, px.g, px.b, px.a]);
        }
        out
    }

    /// Writes the canvas as a PNG file.
    pub fn save_png(&self, path: &Path) -> image::ImageResult<()> {
        image::save_buffer_with_format(
            path,
            &self.to_rgba8(),
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )
    }
}

/// 3x5 dot-matrix rows for '0'..'9', most significant bit leftmost.
const DIGIT_FACE: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b001, 0b001, 0b001],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];
