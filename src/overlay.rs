//! Overlay geometry and software rendering into a `0x00RRGGBB` buffer.

use std::convert::Infallible;

use embedded_graphics::mono_font::{MonoTextStyle, ascii::FONT_10X20};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};

use crate::video::Frame;

const LABEL_WIDTH: u32 = 300;
const LABEL_HEIGHT: u32 = 50;
const BOTTOM_OFFSET: u32 = 10;
const BUTTON_WIDTH: u32 = 100;
const BUTTON_HEIGHT: u32 = 40;
const BUTTON_RIGHT: u32 = 110;
const BUTTON_BOTTOM: u32 = 70;
// Label background: black at 60% opacity.
const SHADE_KEEP_PERCENT: u32 = 40;
const BUTTON_COLOR: Rgb888 = Rgb888::RED;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= f64::from(self.x)
            && y >= f64::from(self.y)
            && x < f64::from(self.x) + f64::from(self.width)
            && y < f64::from(self.y) + f64::from(self.height)
    }

    fn center(&self) -> (i32, i32) {
        (
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

/// Overlay positions for a window size.
///
/// Both labels are centred horizontally at the bottom, battery above the
/// stopwatch; the exit button sits in the bottom-right corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    /// Pixel multiplier for geometry and glyphs.
    pub scale: u32,
    pub timer_label: Rect,
    pub battery_label: Rect,
    pub exit_button: Rect,
}

impl Layout {
    pub fn for_window(width: u32, height: u32) -> Self {
        let scale = if width >= 1600 && height >= 900 { 2 } else { 1 };
        let (w, h) = (width as i32, height as i32);
        let label_w = LABEL_WIDTH * scale;
        let label_h = LABEL_HEIGHT * scale;
        let label_x = (w - label_w as i32) / 2;
        let timer_y = h - (label_h + BOTTOM_OFFSET * scale) as i32;
        let battery_y = timer_y - label_h as i32;

        Self {
            scale,
            timer_label: Rect::new(label_x, timer_y, label_w, label_h),
            battery_label: Rect::new(label_x, battery_y, label_w, label_h),
            exit_button: Rect::new(
                w - (BUTTON_RIGHT * scale) as i32,
                h - (BUTTON_BOTTOM * scale) as i32,
                BUTTON_WIDTH * scale,
                BUTTON_HEIGHT * scale,
            ),
        }
    }
}

fn to_word(color: Rgb888) -> u32 {
    (u32::from(color.r()) << 16) | (u32::from(color.g()) << 8) | u32::from(color.b())
}

/// Window-sized pixel buffer that embedded-graphics can draw on.
pub struct Canvas<'a> {
    pixels: &'a mut [u32],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    /// `pixels` must hold at least `width * height` words.
    pub fn new(pixels: &'a mut [u32], width: u32, height: u32) -> Self {
        debug_assert!(pixels.len() >= width as usize * height as usize);
        Self {
            pixels,
            width,
            height,
        }
    }

    fn put(&mut self, x: i32, y: i32, word: u32) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        self.pixels[y as usize * self.width as usize + x as usize] = word;
    }

    /// Clipped row/column ranges covered by `rect`.
    fn span(&self, rect: Rect) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let clip = |start: i32, len: u32, max: u32| {
            let lo = start.clamp(0, max as i32) as usize;
            let hi = (i64::from(start) + i64::from(len)).clamp(0, i64::from(max)) as usize;
            lo..hi
        };
        (
            clip(rect.x, rect.width, self.width),
            clip(rect.y, rect.height, self.height),
        )
    }

    /// Stretches `frame` over the whole canvas (nearest neighbour).
    pub fn blit_stretched(&mut self, frame: &Frame) {
        let (fw, fh) = (frame.width() as u64, frame.height() as u64);
        if fw == 0 || fh == 0 {
            self.pixels.fill(0);
            return;
        }
        let (w, h) = (self.width as u64, self.height as u64);
        let src = frame.pixels();
        for y in 0..h {
            let sy = y * fh / h;
            let row = &mut self.pixels[(y * w) as usize..((y + 1) * w) as usize];
            for (x, pixel) in row.iter_mut().enumerate() {
                let sx = x as u64 * fw / w;
                *pixel = src[(sy * fw + sx) as usize];
            }
        }
    }

    pub fn fill(&mut self, rect: Rect, color: Rgb888) {
        let word = to_word(color);
        let (xs, ys) = self.span(rect);
        for y in ys {
            let row = y * self.width as usize;
            self.pixels[row + xs.start..row + xs.end].fill(word);
        }
    }

    /// Darkens `rect` as if covered by translucent black.
    pub fn shade(&mut self, rect: Rect) {
        let (xs, ys) = self.span(rect);
        for y in ys {
            let row = y * self.width as usize;
            for pixel in &mut self.pixels[row + xs.start..row + xs.end] {
                let channel = |shift: u32| ((*pixel >> shift) & 0xff) * SHADE_KEEP_PERCENT / 100;
                *pixel = (channel(16) << 16) | (channel(8) << 8) | channel(0);
            }
        }
    }

    /// Draws `text` centred in `rect`, glyphs magnified by `scale`.
    pub fn text_centered(&mut self, rect: Rect, text: &str, scale: u32) {
        let scale = scale.max(1);
        let (cx, cy) = rect.center();
        let style = MonoTextStyle::new(&FONT_10X20, Rgb888::WHITE);
        let layout = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Middle)
            .build();
        if scale == 1 {
            let _ = Text::with_text_style(text, Point::new(cx, cy), style, layout).draw(self);
            return;
        }
        let mut target = Magnified {
            canvas: self,
            scale,
        };
        let origin = Point::new(cx / scale as i32, cy / scale as i32);
        let _ = Text::with_text_style(text, origin, style, layout).draw(&mut target);
    }
}

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.put(point.x, point.y, to_word(color));
        }
        Ok(())
    }
}

/// Draws every pixel as a `scale` x `scale` block.
struct Magnified<'c, 'a> {
    canvas: &'c mut Canvas<'a>,
    scale: u32,
}

impl OriginDimensions for Magnified<'_, '_> {
    fn size(&self) -> Size {
        Size::new(self.canvas.width / self.scale, self.canvas.height / self.scale)
    }
}

impl DrawTarget for Magnified<'_, '_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let s = self.scale as i32;
        for Pixel(point, color) in pixels {
            let rect = Rect::new(point.x * s, point.y * s, self.scale, self.scale);
            self.canvas.fill(rect, color);
        }
        Ok(())
    }
}

/// Paints one full window: video frame, the two labels and the exit button.
pub fn render(
    canvas: &mut Canvas<'_>,
    frame: &Frame,
    layout: &Layout,
    timer_text: &str,
    battery_text: &str,
) {
    canvas.blit_stretched(frame);
    for (rect, text) in [
        (layout.battery_label, battery_text),
        (layout.timer_label, timer_text),
    ] {
        canvas.shade(rect);
        canvas.text_centered(rect, text, layout.scale);
    }
    canvas.fill(layout.exit_button, BUTTON_COLOR);
    canvas.text_centered(layout.exit_button, "Exit", layout.scale);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_tracks_window_size() {
        let layout = Layout::for_window(800, 600);
        assert_eq!(layout.scale, 1);
        assert_eq!(layout.timer_label, Rect::new(250, 540, 300, 50));
        assert_eq!(layout.battery_label, Rect::new(250, 490, 300, 50));
        assert_eq!(layout.exit_button, Rect::new(690, 530, 100, 40));

        let big = Layout::for_window(1920, 1080);
        assert_eq!(big.scale, 2);
        assert_eq!(big.timer_label, Rect::new(660, 960, 600, 100));
        assert_eq!(big.exit_button, Rect::new(1700, 940, 200, 80));
    }

    #[test]
    fn layout_is_a_pure_function_of_size() {
        assert_eq!(Layout::for_window(1024, 768), Layout::for_window(1024, 768));
    }

    #[test]
    fn rect_hit_testing() {
        let rect = Rect::new(10, 20, 100, 40);
        assert!(rect.contains(10.0, 20.0));
        assert!(rect.contains(109.9, 59.9));
        assert!(!rect.contains(110.0, 30.0));
        assert!(!rect.contains(9.5, 30.0));
    }

    #[test]
    fn stretches_frame_to_fill() {
        let frame = Frame::from_rgb24(2, 1, &[255, 0, 0, 0, 0, 255]);
        let mut buf = vec![0u32; 4 * 2];
        Canvas::new(&mut buf, 4, 2).blit_stretched(&frame);
        assert_eq!(
            buf,
            vec![
                0xff0000, 0xff0000, 0x0000ff, 0x0000ff, 0xff0000, 0xff0000, 0x0000ff, 0x0000ff
            ]
        );
    }

    #[test]
    fn render_paints_overlays() {
        let (w, h) = (800u32, 600u32);
        let frame = Frame::from_rgb24(1, 1, &[255, 255, 255]);
        let layout = Layout::for_window(w, h);
        let mut buf = vec![0u32; (w * h) as usize];
        let mut canvas = Canvas::new(&mut buf, w, h);
        render(
            &mut canvas,
            &frame,
            &layout,
            "Time: 00:00:01",
            "Battery: 80% - Discharging",
        );

        let at = |x: u32, y: u32| buf[(y * w + x) as usize];
        // Untouched video.
        assert_eq!(at(5, 5), 0xffffff);
        // Shaded label corner.
        assert_eq!(at(251, 541), 0x666666);
        // Button corner.
        assert_eq!(at(692, 532), 0xff0000);
        // Some glyph pixels were drawn white inside the timer label.
        let white = (541..589)
            .flat_map(|y| (251..549).map(move |x| (x, y)))
            .filter(|&(x, y)| at(x, y) == 0xffffff)
            .count();
        assert!(white > 0);
    }

    #[test]
    fn magnified_glyphs_cover_four_times_the_pixels() {
        let white_after = |scale: u32| {
            let mut buf = vec![0u32; 200 * 100];
            let mut canvas = Canvas::new(&mut buf, 200, 100);
            canvas.text_centered(Rect::new(0, 0, 200, 100), "Exit", scale);
            buf.iter().filter(|&&p| p == 0xffffff).count()
        };
        let plain = white_after(1);
        assert!(plain > 0);
        assert_eq!(white_after(2), plain * 4);
    }

    #[test]
    fn drawing_outside_is_clipped() {
        let mut buf = vec![0u32; 16];
        let mut canvas = Canvas::new(&mut buf, 4, 4);
        canvas.fill(Rect::new(-10, -10, 12, 12), Rgb888::GREEN);
        canvas.shade(Rect::new(3, 3, 100, 100));
        canvas.text_centered(Rect::new(-200, -200, 10, 10), "clip", 2);
        assert_eq!(buf[0], 0x00ff00);
        assert_eq!(buf[5], 0x00ff00);
        assert_eq!(buf[2], 0);
    }
}
