use crate::shared::frame::VideoFrame;

/// Label text color (bright green reads against most footage).
const TEXT_COLOR: [u8; 3] = [64, 255, 64];

/// Backing bar color behind the glyphs.
const BAR_COLOR: [u8; 3] = [16, 16, 16];

const GLYPH_W: usize = 5;
const GLYPH_H: usize = 7;
const GLYPH_SPACING: usize = 1;
const BAR_PADDING: usize = 2;

/// Draw a name tag above a face box.
///
/// Glyphs are a fixed 5x7 bitmap face scaled by `scale`; the tag is clamped
/// into the frame, so a face at the top edge gets its label drawn inside the
/// box rather than off-screen. Characters outside `[a-z0-9_]` render as
/// underscores, matching the capture name alphabet.
pub fn draw_label(frame: &mut VideoFrame, box_x: i32, box_y: i32, text: &str, scale: usize) {
    if text.is_empty() || scale == 0 {
        return;
    }
    let fw = frame.width() as usize;
    let fh = frame.height() as usize;

    let text_w = text.len() * (GLYPH_W + GLYPH_SPACING) * scale;
    let text_h = GLYPH_H * scale;
    let bar_w = text_w + 2 * BAR_PADDING * scale;
    let bar_h = text_h + 2 * BAR_PADDING * scale;

    // Above the box, clamped into the frame
    let bar_x = box_x.max(0) as usize;
    let bar_y = (box_y - bar_h as i32).max(0) as usize;
    let bar_x = bar_x.min(fw.saturating_sub(1));
    let bar_y = bar_y.min(fh.saturating_sub(1));

    fill_rect(frame, bar_x, bar_y, bar_w, bar_h, BAR_COLOR);

    let mut pen_x = bar_x + BAR_PADDING * scale;
    let pen_y = bar_y + BAR_PADDING * scale;
    for c in text.chars() {
        draw_glyph(frame, pen_x, pen_y, c, scale);
        pen_x += (GLYPH_W + GLYPH_SPACING) * scale;
    }
}

fn fill_rect(frame: &mut VideoFrame, x: usize, y: usize, w: usize, h: usize, color: [u8; 3]) {
    let fw = frame.width() as usize;
    let fh = frame.height() as usize;
    let channels = frame.channels() as usize;
    let data = frame.data_mut();

    for yy in y..(y + h).min(fh) {
        for xx in x..(x + w).min(fw) {
            let i = (yy * fw + xx) * channels;
            data[i..i + 3].copy_from_slice(&color);
        }
    }
}

fn draw_glyph(frame: &mut VideoFrame, x: usize, y: usize, c: char, scale: usize) {
    let rows = glyph(c);
    let fw = frame.width() as usize;
    let fh = frame.height() as usize;
    let channels = frame.channels() as usize;
    let data = frame.data_mut();

    for (gy, row) in rows.iter().enumerate() {
        for gx in 0..GLYPH_W {
            if row & (1 << (GLYPH_W - 1 - gx)) == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let px = x + gx * scale + sx;
                    let py = y + gy * scale + sy;
                    if px < fw && py < fh {
                        let i = (py * fw + px) * channels;
                        data[i..i + 3].copy_from_slice(&TEXT_COLOR);
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap rows for the capture name alphabet. Lowercase letters render
/// with the uppercase face.
fn glyph(c: char) -> [u8; GLYPH_H] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        _ => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F], // underscore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn black_frame(w: u32, h: u32) -> VideoFrame {
        VideoFrame::new(vec![0u8; (w * h * 3) as usize], w, h, 3, 0, 0)
    }

    fn count_color(frame: &VideoFrame, color: [u8; 3]) -> usize {
        frame
            .data()
            .chunks_exact(3)
            .filter(|px| px == &color)
            .count()
    }

    #[test]
    fn test_label_draws_text_and_bar() {
        let mut frame = black_frame(200, 100);
        draw_label(&mut frame, 20, 60, "alice", 2);
        assert!(count_color(&frame, TEXT_COLOR) > 0);
        assert!(count_color(&frame, BAR_COLOR) > 0);
    }

    #[test]
    fn test_label_sits_above_box() {
        let mut frame = black_frame(200, 100);
        draw_label(&mut frame, 20, 60, "a", 1);
        // Everything below the box top edge stays black
        let fw = 200usize;
        for y in 60..100 {
            for x in 0..fw {
                let i = (y * fw + x) * 3;
                assert_eq!(frame.data()[i], 0, "pixel below box top modified at y={y}");
            }
        }
    }

    #[test]
    fn test_label_at_top_edge_is_clamped() {
        let mut frame = black_frame(64, 64);
        // Box at the very top: the tag cannot fit above, must not panic
        draw_label(&mut frame, 0, 0, "bob", 2);
        assert!(count_color(&frame, TEXT_COLOR) > 0);
    }

    #[test]
    fn test_label_wider_than_frame_is_clipped() {
        let mut frame = black_frame(32, 32);
        draw_label(&mut frame, 0, 20, "very_long_name_here", 2);
        // No panic; some pixels drawn
        assert!(count_color(&frame, BAR_COLOR) > 0);
    }

    #[test]
    fn test_empty_text_draws_nothing() {
        let mut frame = black_frame(64, 64);
        draw_label(&mut frame, 10, 30, "", 2);
        assert_eq!(count_color(&frame, TEXT_COLOR), 0);
        assert_eq!(count_color(&frame, BAR_COLOR), 0);
    }

    #[test]
    fn test_distinct_glyphs_differ() {
        assert_ne!(glyph('a'), glyph('b'));
        assert_ne!(glyph('0'), glyph('o'));
        // Unknown characters fall back to underscore
        assert_eq!(glyph('!'), glyph('_'));
    }
}
