//! Incidents-per-service bar chart
//!
//! Rendered straight into an RGB buffer and encoded as PNG: a title, axis
//! labels, horizontal gridlines with their values and one bar per service
//! in query order, named underneath. Text uses the 8x8 bitmap glyphs from
//! `font8x8`, so no font files are needed at runtime.

use std::io::Cursor;

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{ImageFormat, Rgb, RgbImage};

use super::ServiceIncidentCount;
use crate::error::Result;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 500;

pub const TITLE: &str = "Incidents per Service";
pub const X_LABEL: &str = "Service";
pub const Y_LABEL: &str = "Number of Incidents";

const MARGIN_LEFT: u32 = 100;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_TOP: u32 = 50;
const MARGIN_BOTTOM: u32 = 70;
const GRID_LINES: u32 = 5;
/// Fraction of each slot covered by its bar
const BAR_FILL: f64 = 0.8;
const GLYPH: u32 = 8;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([220, 220, 220]);
const BAR: Rgb<u8> = Rgb([31, 119, 180]);
const TEXT: Rgb<u8> = Rgb([40, 40, 40]);

/// Render the chart as PNG bytes
pub fn render_png(data: &[ServiceIncidentCount]) -> Result<Vec<u8>> {
    let image = draw(data);

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn draw(data: &[ServiceIncidentCount]) -> RgbImage {
    let mut img = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);

    let left = MARGIN_LEFT;
    let right = CHART_WIDTH - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = CHART_HEIGHT - MARGIN_BOTTOM;
    let plot_height = f64::from(bottom - top);

    let max = data.iter().map(|d| d.count).max().unwrap_or(0).max(1) as f64;

    for i in 0..=GRID_LINES {
        let y = bottom - (bottom - top) * i / GRID_LINES;
        if i > 0 {
            fill_rect(&mut img, left, y, right, y + 1, GRID);
        }
        let label = tick_label(max * f64::from(i) / f64::from(GRID_LINES));
        let x = (left - 8).saturating_sub(text_width(&label, 1));
        draw_text(&mut img, x, y.saturating_sub(GLYPH / 2), &label, 1, TEXT);
    }

    if !data.is_empty() {
        let slot = f64::from(right - left) / data.len() as f64;
        let bar_width = (slot * BAR_FILL).max(1.0);
        for (i, entry) in data.iter().enumerate() {
            let slot_start = f64::from(left) + slot * i as f64;
            let x0 = slot_start + (slot - bar_width) / 2.0;
            let height = plot_height * (entry.count.max(0) as f64 / max);
            let y0 = f64::from(bottom) - height;
            fill_rect(
                &mut img,
                x0.round() as u32,
                y0.round() as u32,
                (x0 + bar_width).round() as u32,
                bottom,
                BAR,
            );

            let name = fit_text(&entry.service, slot as u32);
            let centre = (slot_start + slot / 2.0).round() as u32;
            let x = centre.saturating_sub(text_width(&name, 1) / 2);
            draw_text(&mut img, x, bottom + 8, &name, 1, TEXT);
        }
    }

    // Axes after bars so bars never cover them
    fill_rect(&mut img, left - 2, top, left, bottom + 2, AXIS);
    fill_rect(&mut img, left - 2, bottom, right, bottom + 2, AXIS);

    let x = (CHART_WIDTH - text_width(TITLE, 2)) / 2;
    draw_text(&mut img, x, 14, TITLE, 2, TEXT);

    let x = left + (right - left - text_width(X_LABEL, 2)) / 2;
    draw_text(&mut img, x, CHART_HEIGHT - 28, X_LABEL, 2, TEXT);

    let y = top + (bottom - top + text_width(Y_LABEL, 2)) / 2;
    draw_text_vertical(&mut img, 10, y, Y_LABEL, 2, TEXT);

    img
}

/// Gridline value, without a fraction when it is whole
fn tick_label(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH * scale
}

/// Shorten `text` to fit `width` pixels at scale 1, marking the cut with '.'
fn fit_text(text: &str, width: u32) -> String {
    let max_chars = (width / GLYPH) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    match max_chars {
        0 => String::new(),
        n => text.chars().take(n - 1).chain(std::iter::once('.')).collect(),
    }
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Draw `text` left to right with its top-left corner at `(x, y)`
fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    for (i, c) in text.chars().enumerate() {
        let origin = x + i as u32 * GLYPH * scale;
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1 << col) != 0 {
                    let px = origin + col * scale;
                    let py = y + row as u32 * scale;
                    fill_rect(img, px, py, px + scale, py + scale, color);
                }
            }
        }
    }
}

/// Draw `text` bottom to top, starting at `(x, y)` and rising from there
fn draw_text_vertical(
    img: &mut RgbImage,
    x: u32,
    y: u32,
    text: &str,
    scale: u32,
    color: Rgb<u8>,
) {
    for (i, c) in text.chars().enumerate() {
        let base = y.saturating_sub(i as u32 * GLYPH * scale);
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH {
                if bits & (1 << col) != 0 {
                    // Rotated a quarter turn counter-clockwise
                    let px = x + row as u32 * scale;
                    let py = base.saturating_sub((col + 1) * scale);
                    fill_rect(img, px, py, px + scale, py + scale, color);
                }
            }
        }
    }
}

/// Fill `[x0, x1) x [y0, y1)`, clipped to the image
fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let x1 = x1.min(img.width());
    let y1 = y1.min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn counts(values: &[(&str, i64)]) -> Vec<ServiceIncidentCount> {
        values
            .iter()
            .map(|(s, c)| ServiceIncidentCount {
                service: s.to_string(),
                count: *c,
            })
            .collect()
    }

    #[test]
    fn test_png_dimensions() {
        let png = render_png(&counts(&[("API", 3), ("Billing", 1)])).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!(decoded.width(), CHART_WIDTH);
        assert_eq!(decoded.height(), CHART_HEIGHT);
    }

    #[test]
    fn test_tallest_bar_reaches_top() {
        let img = draw(&counts(&[("API", 4), ("Billing", 2)]));
        let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;

        // Centre of the first slot, just below the plot top
        let x = MARGIN_LEFT + plot_width / 4;
        assert_eq!(*img.get_pixel(x, MARGIN_TOP + 1), BAR);

        // Second bar is half as tall
        let x = MARGIN_LEFT + plot_width * 3 / 4;
        let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
        assert_ne!(*img.get_pixel(x, MARGIN_TOP + plot_height / 4), BAR);
        assert_eq!(*img.get_pixel(x, CHART_HEIGHT - MARGIN_BOTTOM - 1), BAR);
    }

    #[test]
    fn test_empty_chart_has_axes_only() {
        let img = draw(&[]);
        assert_eq!(*img.get_pixel(MARGIN_LEFT - 1, MARGIN_TOP + 10), AXIS);
        assert_eq!(*img.get_pixel(CHART_WIDTH / 2, MARGIN_TOP + 10), BACKGROUND);
        assert!(!img.pixels().any(|p| *p == BAR));
    }

    fn has_text(img: &RgbImage, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        (y0..y1).any(|y| (x0..x1).any(|x| *img.get_pixel(x, y) == TEXT))
    }

    #[test]
    fn test_title_and_axis_labels_drawn() {
        let img = draw(&counts(&[("API", 3)]));

        // Title band, x label band and y label column
        assert!(has_text(&img, 0, 0, CHART_WIDTH, MARGIN_TOP));
        assert!(has_text(&img, MARGIN_LEFT, CHART_HEIGHT - 30, CHART_WIDTH, CHART_HEIGHT));
        assert!(has_text(&img, 0, MARGIN_TOP, 30, CHART_HEIGHT - MARGIN_BOTTOM));
    }

    #[test]
    fn test_service_names_change_the_image() {
        let a = draw(&counts(&[("API", 3), ("Billing", 1)]));
        let b = draw(&counts(&[("Search", 3), ("Mail", 1)]));
        assert_ne!(a.as_raw(), b.as_raw());

        // Names sit between the x axis and the x label
        let names_top = CHART_HEIGHT - MARGIN_BOTTOM + 2;
        assert!(has_text(&a, MARGIN_LEFT, names_top, CHART_WIDTH, names_top + 20));
    }

    #[test]
    fn test_fit_text_and_ticks() {
        assert_eq!(fit_text("API", 100), "API");
        assert_eq!(fit_text("Billing", 32), "Bil.");
        assert_eq!(fit_text("Billing", 4), "");
        assert_eq!(tick_label(4.0), "4");
        assert_eq!(tick_label(0.6), "0.6");
    }
}
