//! The off-screen canvas for the Fire's 128x64 monochrome OLED.
//!
//! A [`Screen`] is a plain 1-bit framebuffer with drawing primitives on top;
//! it knows nothing about MIDI. Render it to the device with
//! [`oled_sysex`]/[`crate::Fire::render_screen`], or to a BMP file with
//! [`Screen::write_bmp`] for headless verification.

mod font;
pub use font::*;

mod device;
pub use device::*;

mod bmp;
pub use bmp::*;

/// Width of the OLED in pixels
pub const SCREEN_WIDTH: i32 = 128;
/// Height of the OLED in pixels
pub const SCREEN_HEIGHT: i32 = 64;

const ROW_STRIDE: usize = SCREEN_WIDTH as usize / 8;
const BUFFER_SIZE: usize = ROW_STRIDE * SCREEN_HEIGHT as usize;

/// An in-memory mirror of the Fire's OLED: a 128x64 grid of binary pixels.
///
/// Coordinates are `i32` and out-of-range coordinates are silently clipped,
/// so shapes can safely poke over the edges of the display:
///
/// ```
/// # use fiery::Screen;
/// let mut screen = Screen::new();
/// screen.fill_circle(0, 0, 20, true); // only the visible quarter is drawn
/// screen.set_pixel(-1, 70, true); // no-op
/// ```
///
/// All primitives are deterministic and idempotent - pixels are binary, not
/// additive, so drawing the same shape twice changes nothing.
///
/// A `Screen` is owned by whoever creates it and is not internally
/// synchronized; share it across threads only with external locking.
#[derive(Clone, PartialEq, Eq)]
pub struct Screen {
    // Row-major, most significant bit is the leftmost pixel of each byte
    bits: [u8; BUFFER_SIZE],
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    /// Create an all-unlit screen
    pub fn new() -> Self {
        Self {
            bits: [0; BUFFER_SIZE],
        }
    }

    /// Reset every pixel to unlit
    pub fn clear(&mut self) {
        self.bits = [0; BUFFER_SIZE];
    }

    /// Set a single pixel. Out-of-range coordinates are a no-op.
    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        if !(0..SCREEN_WIDTH).contains(&x) || !(0..SCREEN_HEIGHT).contains(&y) {
            return;
        }

        let index = y as usize * ROW_STRIDE + x as usize / 8;
        let mask = 0x80 >> (x as usize % 8);
        if on {
            self.bits[index] |= mask;
        } else {
            self.bits[index] &= !mask;
        }
    }

    /// Whether the pixel at the given coordinates is lit. Out-of-range
    /// coordinates read as unlit.
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        if !(0..SCREEN_WIDTH).contains(&x) || !(0..SCREEN_HEIGHT).contains(&y) {
            return false;
        }

        let index = y as usize * ROW_STRIDE + x as usize / 8;
        self.bits[index] & (0x80 >> (x as usize % 8)) != 0
    }

    /// Draw `length` pixels to the right, starting at (x, y)
    pub fn draw_horizontal_line(&mut self, x: i32, y: i32, length: i32, on: bool) {
        for i in 0..length.max(0) {
            self.set_pixel(x + i, y, on);
        }
    }

    /// Draw `length` pixels downwards, starting at (x, y)
    pub fn draw_vertical_line(&mut self, x: i32, y: i32, length: i32, on: bool) {
        for i in 0..length.max(0) {
            self.set_pixel(x, y + i, on);
        }
    }

    /// Draw the four-edge outline of a rectangle. Zero or negative
    /// width/height is a no-op.
    pub fn draw_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, on: bool) {
        if width <= 0 || height <= 0 {
            return;
        }

        self.draw_horizontal_line(x, y, width, on);
        self.draw_horizontal_line(x, y + height - 1, width, on);
        self.draw_vertical_line(x, y, height, on);
        self.draw_vertical_line(x + width - 1, y, height, on);
    }

    /// Draw a fully filled rectangle. Zero or negative width/height is a
    /// no-op.
    pub fn fill_rectangle(&mut self, x: i32, y: i32, width: i32, height: i32, on: bool) {
        if width <= 0 || height <= 0 {
            return;
        }

        for i in 0..height {
            self.draw_horizontal_line(x, y + i, width, on);
        }
    }

    /// Draw a circle outline using the midpoint circle algorithm.
    ///
    /// Each octant's points are mirrored eight ways, skipping the mirrors
    /// that coincide on the axis and diagonal boundaries so every pixel is
    /// written exactly once.
    pub fn draw_circle(&mut self, x0: i32, y0: i32, radius: i32, on: bool) {
        if radius < 0 {
            return;
        }
        if radius == 0 {
            self.set_pixel(x0, y0, on);
            return;
        }

        let mut x = radius;
        let mut y = 0;
        let mut decision = 1 - x;

        while x >= y {
            self.mirror_quadrants(x0, y0, x, y, on);
            if x != y {
                self.mirror_quadrants(x0, y0, y, x, on);
            }

            y += 1;
            if decision <= 0 {
                decision += 2 * y + 1;
            } else {
                x -= 1;
                decision += 2 * (y - x) + 1;
            }
        }
    }

    fn mirror_quadrants(&mut self, x0: i32, y0: i32, dx: i32, dy: i32, on: bool) {
        self.set_pixel(x0 + dx, y0 + dy, on);
        if dx != 0 {
            self.set_pixel(x0 - dx, y0 + dy, on);
        }
        if dy != 0 {
            self.set_pixel(x0 + dx, y0 - dy, on);
        }
        if dx != 0 && dy != 0 {
            self.set_pixel(x0 - dx, y0 - dy, on);
        }
    }

    /// Draw a filled circle by sweeping one horizontal span per scanline
    /// between the symmetric x bounds. Gap-free for every radius >= 1.
    pub fn fill_circle(&mut self, x0: i32, y0: i32, radius: i32, on: bool) {
        if radius < 0 {
            return;
        }

        let r_squared = radius * radius;
        for dy in -radius..=radius {
            // largest dx with dx^2 + dy^2 <= r^2
            let mut dx = 0;
            while (dx + 1) * (dx + 1) + dy * dy <= r_squared {
                dx += 1;
            }
            self.draw_horizontal_line(x0 - dx, y0 + dy, 2 * dx + 1, on);
        }
    }

    /// Draw text with the built-in 5x7 font. See
    /// [`Screen::draw_text_with_font`].
    pub fn draw_text(&mut self, text: &str, x: i32, y: i32, on: bool) {
        self.draw_text_with_font(text, x, y, &FONT_5X7, on);
    }

    /// Blit a fixed-width glyph per character, starting with the top-left
    /// glyph corner at (x, y) and advancing the cursor by glyph width plus
    /// one column of spacing.
    ///
    /// Characters the font doesn't cover render as a blank glyph (the cursor
    /// still advances); they are never an error. Only the glyph's lit pixels
    /// are written, the background is left untouched.
    pub fn draw_text_with_font(&mut self, text: &str, x: i32, y: i32, font: &Font, on: bool) {
        let mut cursor = x;
        for c in text.chars() {
            if let Some(glyph) = font.glyph(c) {
                for (column, column_bits) in glyph.iter().enumerate() {
                    for row in 0..font.height() {
                        if column_bits & (1 << row) != 0 {
                            self.set_pixel(cursor + column as i32, y + row, on);
                        }
                    }
                }
            }
            cursor += font.advance();
        }
    }

    /// Number of currently lit pixels
    pub fn lit_pixels(&self) -> usize {
        self.bits.iter().map(|byte| byte.count_ones() as usize).sum()
    }
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Screen {{ {}x{}, {} lit }}",
            SCREEN_WIDTH,
            SCREEN_HEIGHT,
            self.lit_pixels()
        )
    }
}

#[cfg(feature = "embedded-graphics")]
impl embedded_graphics::geometry::OriginDimensions for Screen {
    fn size(&self) -> embedded_graphics::geometry::Size {
        embedded_graphics::geometry::Size::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32)
    }
}

#[cfg(feature = "embedded-graphics")]
impl embedded_graphics::draw_target::DrawTarget for Screen {
    type Color = embedded_graphics::pixelcolor::BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for embedded_graphics::Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_set_pixel_is_a_no_op() {
        let mut screen = Screen::new();
        for &(x, y) in &[(-1, 0), (128, 0), (0, -1), (0, 64), (i32::MIN, i32::MAX)] {
            screen.set_pixel(x, y, true);
        }
        assert_eq!(screen, Screen::new());
        assert!(!screen.pixel(-1, 0));
    }

    #[test]
    fn corners_are_in_bounds() {
        let mut screen = Screen::new();
        for &(x, y) in &[(0, 0), (127, 0), (0, 63), (127, 63)] {
            screen.set_pixel(x, y, true);
            assert!(screen.pixel(x, y));
        }
        assert_eq!(screen.lit_pixels(), 4);
    }

    #[test]
    fn drawing_twice_is_idempotent() {
        let mut once = Screen::new();
        once.fill_circle(40, 30, 11, true);
        once.draw_rectangle(2, 2, 30, 20, true);

        let mut twice = once.clone();
        twice.fill_circle(40, 30, 11, true);
        twice.draw_rectangle(2, 2, 30, 20, true);

        assert_eq!(once, twice);
    }

    #[test]
    fn lines_clip_at_the_edges() {
        let mut screen = Screen::new();
        screen.draw_horizontal_line(120, 10, 50, true);
        assert_eq!(screen.lit_pixels(), 8);

        screen.clear();
        screen.draw_vertical_line(5, -10, 20, true);
        assert_eq!(screen.lit_pixels(), 10);
        assert!(screen.pixel(5, 0));
        assert!(screen.pixel(5, 9));
    }

    #[test]
    fn degenerate_rectangles_are_no_ops() {
        let mut screen = Screen::new();
        screen.draw_rectangle(10, 10, 0, 5, true);
        screen.draw_rectangle(10, 10, 5, -1, true);
        screen.fill_rectangle(10, 10, -3, 4, true);
        screen.fill_rectangle(10, 10, 4, 0, true);
        assert_eq!(screen, Screen::new());
    }

    #[test]
    fn rectangle_outline_and_fill() {
        let mut screen = Screen::new();
        screen.draw_rectangle(10, 10, 6, 4, true);
        assert!(screen.pixel(10, 10));
        assert!(screen.pixel(15, 13));
        assert!(!screen.pixel(12, 12)); // interior stays unlit
        // 2 * 6 + 2 * 4 - 4 corners counted once
        assert_eq!(screen.lit_pixels(), 16);

        screen.fill_rectangle(10, 10, 6, 4, true);
        assert!(screen.pixel(12, 12));
        assert_eq!(screen.lit_pixels(), 24);
    }

    #[test]
    fn filled_circle_matches_point_inclusion_reference() {
        for radius in 1..=20 {
            let mut screen = Screen::new();
            screen.fill_circle(64, 32, radius, true);

            for y in 0..SCREEN_HEIGHT {
                for x in 0..SCREEN_WIDTH {
                    let (dx, dy) = (x - 64, y - 32);
                    let inside = dx * dx + dy * dy <= radius * radius;
                    assert_eq!(
                        screen.pixel(x, y),
                        inside,
                        "r={} mismatch at ({}, {})",
                        radius,
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn circle_outline_stays_near_the_true_radius() {
        let radius = 9;
        let mut outline = Screen::new();
        outline.draw_circle(30, 30, radius, true);

        for y in 0..SCREEN_HEIGHT {
            for x in 0..SCREEN_WIDTH {
                if !outline.pixel(x, y) {
                    continue;
                }
                let (dx, dy) = (x - 30, y - 30);
                let distance_squared = dx * dx + dy * dy;
                assert!(
                    ((radius - 1) * (radius - 1)..=(radius + 1) * (radius + 1))
                        .contains(&distance_squared),
                    "({}, {}) strays from the r={} ring",
                    x,
                    y,
                    radius
                );
                // 8-way symmetry
                assert!(outline.pixel(30 - dx, y));
                assert!(outline.pixel(x, 30 - dy));
                assert!(outline.pixel(30 + dy, 30 + dx));
            }
        }

        // and the cardinal extremes are present
        assert!(outline.pixel(30 + radius, 30));
        assert!(outline.pixel(30 - radius, 30));
        assert!(outline.pixel(30, 30 + radius));
        assert!(outline.pixel(30, 30 - radius));
    }

    #[test]
    fn zero_radius_circle_is_a_single_pixel() {
        let mut screen = Screen::new();
        screen.draw_circle(10, 10, 0, true);
        assert!(screen.pixel(10, 10));
        assert_eq!(screen.lit_pixels(), 1);
    }

    #[test]
    fn text_renders_and_advances() {
        let mut screen = Screen::new();
        screen.draw_text("A", 0, 0, true);
        assert!(screen.lit_pixels() > 0);

        // The second glyph starts one advance further right
        let mut pair = Screen::new();
        pair.draw_text("AA", 0, 0, true);
        let mut shifted = Screen::new();
        shifted.draw_text("A", 0, 0, true);
        shifted.draw_text("A", FONT_5X7.advance(), 0, true);
        assert_eq!(pair, shifted);
    }

    #[test]
    fn unsupported_characters_render_blank() {
        let mut screen = Screen::new();
        screen.draw_text("\u{1F525}", 0, 0, true);
        assert_eq!(screen.lit_pixels(), 0);

        // but they still advance the cursor
        let mut mixed = Screen::new();
        mixed.draw_text("\u{1F525}A", 0, 0, true);
        let mut reference = Screen::new();
        reference.draw_text("A", FONT_5X7.advance(), 0, true);
        assert_eq!(mixed, reference);
    }

    #[test]
    fn unlit_drawing_erases() {
        let mut screen = Screen::new();
        screen.fill_rectangle(0, 0, 20, 20, true);
        screen.fill_rectangle(5, 5, 5, 5, false);
        assert!(!screen.pixel(7, 7));
        assert!(screen.pixel(4, 4));
        assert_eq!(screen.lit_pixels(), 400 - 25);
    }
}
