/// Monitoring overlay: mode border, status line, clock, perf line and
/// labelled detection boxes drawn over a copy of the captured frame.
use image::RgbaImage;

use crate::control::state::LoopMode;
use crate::control::stats::FrameStats;
use crate::perception::types::{BBox, Category, Detection, DismissVariant, Frame};

const BORDER: i32 = 4;
const TEXT_SCALE: u32 = 2;

fn mode_style(mode: LoopMode) -> ([u8; 4], &'static str) {
    match mode {
        LoopMode::ActingEnabled => ([0, 220, 0, 255], "AUTO GRAB"),
        LoopMode::ActingPaused => ([255, 165, 0, 255], "PAUSED"),
        LoopMode::Monitoring => ([0, 220, 255, 255], "MONITORING"),
        LoopMode::Stopped => ([150, 150, 150, 255], "STOPPED"),
    }
}

fn category_colour(category: Category) -> [u8; 4] {
    match category {
        Category::PrimaryAction => [255, 60, 60, 230],
        Category::SecondaryTarget => [255, 215, 0, 230],
        Category::Dismiss(DismissVariant::Back) => [60, 140, 255, 230],
        Category::Dismiss(DismissVariant::Close) => [200, 80, 255, 230],
        Category::Ignored => [200, 200, 200, 200],
    }
}

pub fn perf_line(stats: &FrameStats) -> String {
    format!(
        "FPS {:.1} | CAPTURE {}MS | INFERENCE {}MS",
        stats.fps(),
        stats.capture.as_millis(),
        stats.inference.as_millis()
    )
}

pub fn render_overlay(
    frame: &Frame,
    detections: &[Detection],
    mode: LoopMode,
    stats: &FrameStats,
    clock: &str,
) -> RgbaImage {
    let mut canvas = Canvas(frame.image().clone());
    let (w, h) = (canvas.width(), canvas.height());
    let (border_colour, status) = mode_style(mode);

    for d in detections {
        let colour = category_colour(d.category);
        canvas.outline(&d.bbox, colour, 2);
        let label = format!("{} {:.2}", d.class_name, d.confidence);
        let label_h = (5 * TEXT_SCALE + 4 * TEXT_SCALE) as i32;
        canvas.label(d.bbox.x1, (d.bbox.y1 - label_h).max(0), &label, colour);
    }

    let line_h = (5 * TEXT_SCALE + 4 * TEXT_SCALE + 2) as i32;
    canvas.label(BORDER + 4, BORDER + 4, &format!("{status}  {clock}"), border_colour);
    canvas.label(BORDER + 4, BORDER + 4 + line_h, &perf_line(stats), [255, 255, 255, 255]);

    canvas.outline(&BBox::new(0, 0, w - 1, h - 1), border_colour, BORDER);
    canvas.0
}

struct Canvas(RgbaImage);

impl Canvas {
    fn width(&self) -> i32 {
        self.0.width() as i32
    }

    fn height(&self) -> i32 {
        self.0.height() as i32
    }

    fn blend(&mut self, x: i32, y: i32, col: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return;
        }
        let p = self.0.get_pixel_mut(x as u32, y as u32);
        let a = f32::from(col[3]) / 255.0;
        for c in 0..3 {
            p[c] = (f32::from(p[c]) * (1.0 - a) + f32::from(col[c]) * a).round() as u8;
        }
        p[3] = 255;
    }

    fn darken(&mut self, x: i32, y: i32) {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return;
        }
        let p = self.0.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            p[c] = (f32::from(p[c]) * 0.2) as u8;
        }
        p[3] = 255;
    }

    fn outline(&mut self, b: &BBox, col: [u8; 4], thickness: i32) {
        for t in 0..thickness {
            for x in b.x1..=b.x2 {
                self.blend(x, b.y1 + t, col);
                self.blend(x, b.y2 - t, col);
            }
            // corners already drawn by the horizontal pass
            for y in (b.y1 + thickness)..=(b.y2 - thickness) {
                self.blend(b.x1 + t, y, col);
                self.blend(b.x2 - t, y, col);
            }
        }
    }

    /// Text on a darkened plate. Lower-case letters are drawn upper-case.
    fn label(&mut self, x: i32, y: i32, text: &str, col: [u8; 4]) {
        let s = TEXT_SCALE as i32;
        let step = 5 * s + s;
        let pad = 2 * s;
        let chars: Vec<char> = text.to_uppercase().chars().collect();
        let plate_w = chars.len() as i32 * step + pad * 2;
        let plate_h = 5 * s + pad * 2;

        for dy in 0..plate_h {
            for dx in 0..plate_w {
                self.darken(x + dx, y + dy);
            }
        }
        for (i, &c) in chars.iter().enumerate() {
            let gx = x + pad + i as i32 * step;
            if gx + 5 * s > self.width() {
                break;
            }
            self.glyph(c, gx, y + pad, col);
        }
    }

    fn glyph(&mut self, c: char, px: i32, py: i32, col: [u8; 4]) {
        let Some(rows) = glyph_rows(c) else {
            return;
        };
        let s = TEXT_SCALE as i32;
        for (row, bits) in rows.iter().enumerate() {
            for bit in 0..5 {
                if (bits >> (4 - bit)) & 1 == 0 {
                    continue;
                }
                for sy in 0..s {
                    for sx in 0..s {
                        self.blend(px + bit * s + sx, py + row as i32 * s + sy, col);
                    }
                }
            }
        }
    }
}

fn glyph_rows(c: char) -> Option<[u8; 5]> {
    Some(match c {
        '0'..='9' => MINI_FONT[(c as u8 - b'0') as usize],
        'A'..='Z' => MINI_FONT[10 + (c as u8 - b'A') as usize],
        ':' => [0b00000, 0b00100, 0b00000, 0b00100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00100],
        '|' => [0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        '-' => [0b00000, 0b00000, 0b01110, 0b00000, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        _ => return None,
    })
}

/// 5×5 bitmap font, digits then A-Z.
const MINI_FONT: [[u8; 5]; 36] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111],
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110],
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110],
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100],
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110],
    [0b01110, 0b10001, 0b11111, 0b10001, 0b10001],
    [0b11110, 0b10001, 0b11110, 0b10001, 0b11110],
    [0b01110, 0b10000, 0b10000, 0b10000, 0b01110],
    [0b11100, 0b10010, 0b10001, 0b10010, 0b11100],
    [0b11111, 0b10000, 0b11110, 0b10000, 0b11111],
    [0b11111, 0b10000, 0b11110, 0b10000, 0b10000],
    [0b01110, 0b10000, 0b10011, 0b10001, 0b01110],
    [0b10001, 0b10001, 0b11111, 0b10001, 0b10001],
    [0b01110, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b00111, 0b00010, 0b00010, 0b10010, 0b01100],
    [0b10001, 0b10010, 0b11100, 0b10010, 0b10001],
    [0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
    [0b10001, 0b11011, 0b10101, 0b10001, 0b10001],
    [0b10001, 0b11001, 0b10101, 0b10011, 0b10001],
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b11110, 0b10001, 0b11110, 0b10000, 0b10000],
    [0b01110, 0b10001, 0b10101, 0b10010, 0b01101],
    [0b11110, 0b10001, 0b11110, 0b10010, 0b10001],
    [0b01111, 0b10000, 0b01110, 0b00001, 0b11110],
    [0b11111, 0b00100, 0b00100, 0b00100, 0b00100],
    [0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
    [0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
    [0b10001, 0b10001, 0b10101, 0b11011, 0b10001],
    [0b10001, 0b01010, 0b00100, 0b01010, 0b10001],
    [0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
    [0b11111, 0b00010, 0b00100, 0b01000, 0b11111],
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use image::Rgba;

    fn frame() -> Frame {
        Frame::new(RgbaImage::from_pixel(400, 300, Rgba([10, 10, 10, 255])))
    }

    #[test]
    fn border_follows_mode() {
        let stats = FrameStats::new();
        let acting = render_overlay(&frame(), &[], LoopMode::ActingEnabled, &stats, "12:00:00");
        assert_eq!(acting.get_pixel(0, 150).0, [0, 220, 0, 255]);
        let paused = render_overlay(&frame(), &[], LoopMode::ActingPaused, &stats, "12:00:00");
        assert_eq!(paused.get_pixel(399, 299).0, [255, 165, 0, 255]);
        let watching = render_overlay(&frame(), &[], LoopMode::Monitoring, &stats, "12:00:00");
        assert_eq!(watching.get_pixel(200, 3).0, [0, 220, 255, 255]);
    }

    #[test]
    fn boxes_drawn_in_category_colour() {
        let d = Detection::new(Category::PrimaryAction, 0.91, BBox::new(100, 100, 200, 180))
            .with_class_name("open_button");
        let src = frame();
        let out = render_overlay(&src, &[d], LoopMode::Monitoring, &FrameStats::new(), "00:00:00");
        assert_eq!((out.width(), out.height()), (400, 300));
        let edge = out.get_pixel(150, 180).0;
        assert!(edge[0] > 200 && edge[1] < 80, "edge pixel {edge:?}");
        // interior untouched
        assert_eq!(out.get_pixel(150, 150).0, [10, 10, 10, 255]);
        // the source frame is not modified
        assert_eq!(src.image().get_pixel(150, 180).0, [10, 10, 10, 255]);
    }

    #[test]
    fn status_text_is_drawn() {
        let out = render_overlay(&frame(), &[], LoopMode::ActingEnabled, &FrameStats::new(), "09:15:42");
        let lit = (8..40)
            .flat_map(|x| (8..30).map(move |y| (x, y)))
            .filter(|&(x, y)| out.get_pixel(x, y).0[1] > 100)
            .count();
        assert!(lit > 0);
    }

    #[test]
    fn perf_line_format() {
        let mut stats = FrameStats::new();
        stats.capture = Duration::from_millis(4);
        stats.inference = Duration::from_millis(18);
        assert_eq!(perf_line(&stats), "FPS 0.0 | CAPTURE 4MS | INFERENCE 18MS");
    }

    #[test]
    fn every_perf_character_has_a_glyph() {
        for c in "FPS 0.0 | CAPTURE 4MS | INFERENCE 18MS".chars().filter(|c| *c != ' ') {
            assert!(glyph_rows(c).is_some(), "missing glyph {c:?}");
        }
    }
}
