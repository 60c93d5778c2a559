//! PNG Pie Chart
//!
//! [`PieChartRenderer`] draws each option's share of the vote as a pie slice,
//! starting at twelve o'clock and running clockwise in option order. Every
//! slice with votes carries its percentage. A legend on the right lists each
//! option's colour, label and share in the same order as the results text.
//!
//! Text uses the bitmap fonts built into `embedded-graphics`, so rendering
//! needs no font files on the host.

use std::convert::Infallible;
use std::f64::consts::TAU;
use std::io::Cursor;

use embedded_graphics::mono_font::{iso_8859_1, MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder};
use image::{ImageFormat, Rgb, RgbImage};

use crate::platform::{ChartError, ChartRenderer};

/// Default chart width in pixels
pub const DEFAULT_CHART_WIDTH: u32 = 640;

/// Default chart height in pixels
pub const DEFAULT_CHART_HEIGHT: u32 = 480;

/// Smallest accepted dimension
const MIN_DIMENSION: u32 = 64;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

const TEXT_COLOR: Rgb888 = Rgb888::BLACK;

/// Legend text font
const LEGEND_FONT: MonoFont<'static> = iso_8859_1::FONT_7X13;

/// Slice percentage font
const SLICE_FONT: MonoFont<'static> = iso_8859_1::FONT_6X10;

/// Gap between legend swatch and text
const LEGEND_GAP: u32 = 6;

/// One colour per ballot position
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([31, 119, 180]),
    Rgb([255, 127, 14]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([227, 119, 194]),
    Rgb([127, 127, 127]),
    Rgb([188, 189, 34]),
    Rgb([23, 190, 207]),
];

/// Colour used for the slice at `index`
#[must_use]
pub fn slice_color(index: usize) -> [u8; 3] {
    PALETTE[index % PALETTE.len()].0
}

/// Share of `value` in `total`, formatted with one decimal
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_share(value: u64, total: u64) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", value as f64 * 100.0 / total as f64)
}

/// Legend lines, one per option: `<label> <share>`
#[must_use]
pub fn legend_lines(labels: &[String], values: &[u64]) -> Vec<String> {
    let total: u64 = values.iter().sum();
    labels
        .iter()
        .zip(values)
        .map(|(label, value)| format!("{label} {}", format_share(*value, total)))
        .collect()
}

/// Shorten `text` to at most `max_chars` characters, marking the cut
fn fit(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(2);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("..");
    out
}

/// `RgbImage` as an `embedded-graphics` draw target
struct Canvas<'a>(&'a mut RgbImage);

impl OriginDimensions for Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if x < width && y < height {
                self.0.put_pixel(x, y, Rgb([color.r(), color.g(), color.b()]));
            }
        }
        Ok(())
    }
}

impl Canvas<'_> {
    fn text(&mut self, text: &str, at: Point, font: &MonoFont<'static>, layout: TextStyle) {
        let style = MonoTextStyle::new(font, TEXT_COLOR);
        match Text::with_text_style(text, at, style, layout).draw(self) {
            Ok(_) => {}
            Err(never) => match never {},
        }
    }
}

/// Pie chart renderer producing PNG bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieChartRenderer {
    width: u32,
    height: u32,
}

impl Default for PieChartRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_CHART_WIDTH, DEFAULT_CHART_HEIGHT)
    }
}

impl PieChartRenderer {
    /// Create a renderer; dimensions below 64 pixels are raised to 64
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(MIN_DIMENSION),
            height: height.max(MIN_DIMENSION),
        }
    }

    /// Output dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    fn draw(&self, labels: &[String], values: &[u64], total: u64) -> RgbImage {
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);

        let legend_width = self.width * 2 / 5;
        let pie_width = self.width - legend_width;
        let cx = f64::from(pie_width) / 2.0;
        let cy = f64::from(self.height) / 2.0;
        let radius = f64::from(pie_width.min(self.height)) * 0.45;

        // Upper boundary of each slice as a fraction of the full turn
        let mut running = 0u64;
        let bounds: Vec<f64> = values
            .iter()
            .map(|v| {
                running += v;
                running as f64 / total as f64
            })
            .collect();

        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let dx = f64::from(x) + 0.5 - cx;
            let dy = f64::from(y) + 0.5 - cy;
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let angle = dx.atan2(-dy).rem_euclid(TAU);
            let turn = angle / TAU;
            let index = bounds
                .iter()
                .position(|b| turn < *b)
                .unwrap_or(values.len() - 1);
            *pixel = PALETTE[index % PALETTE.len()];
        }

        let row = (self.height / (values.len() as u32 + 1)).clamp(4, 32);
        let swatch = (row * 2 / 3).max(2);
        let left = pie_width + 8;
        for index in 0..values.len() {
            let top = row / 2 + index as u32 * row;
            for y in top..(top + swatch).min(self.height) {
                for x in left..(left + swatch).min(self.width) {
                    img.put_pixel(x, y, PALETTE[index % PALETTE.len()]);
                }
            }
        }

        let mut canvas = Canvas(&mut img);

        // Percentages inside the slices, at the middle of each arc
        let centered = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Middle)
            .build();
        let mut start = 0.0;
        for (value, end) in values.iter().zip(&bounds) {
            if *value > 0 {
                let mid = (start + end) / 2.0 * TAU;
                let at = Point::new(
                    (cx + radius * 0.6 * mid.sin()).round() as i32,
                    (cy - radius * 0.6 * mid.cos()).round() as i32,
                );
                canvas.text(&format_share(*value, total), at, &SLICE_FONT, centered);
            }
            start = *end;
        }

        // Legend text beside each swatch
        let leading = TextStyleBuilder::new()
            .alignment(Alignment::Left)
            .baseline(Baseline::Middle)
            .build();
        let text_left = left + swatch + LEGEND_GAP;
        let char_width = LEGEND_FONT.character_size.width + LEGEND_FONT.character_spacing;
        let max_chars = (self.width.saturating_sub(text_left) / char_width) as usize;
        for (index, line) in legend_lines(labels, values).iter().enumerate() {
            let middle = row / 2 + index as u32 * row + swatch / 2;
            let at = Point::new(text_left as i32, middle as i32);
            canvas.text(&fit(line, max_chars), at, &LEGEND_FONT, leading);
        }

        img
    }
}

impl ChartRenderer for PieChartRenderer {
    fn render(&self, labels: &[String], values: &[u64]) -> Result<Vec<u8>, ChartError> {
        if labels.len() != values.len() {
            return Err(ChartError::LengthMismatch {
                labels: labels.len(),
                values: values.len(),
            });
        }
        let total: u64 = values.iter().sum();
        if total == 0 {
            return Err(ChartError::NoVotes);
        }

        let img = self.draw(labels, values, total);
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| ChartError::Encode(e.to_string()))?;

        tracing::debug!(
            slices = values.len(),
            total,
            bytes = bytes.get_ref().len(),
            "Rendered pie chart"
        );
        Ok(bytes.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("opt {i}")).collect()
    }

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .unwrap()
            .to_rgb8()
    }

    #[test]
    fn test_png_has_requested_dimensions() {
        let renderer = PieChartRenderer::new(320, 200);
        let bytes = renderer.render(&labels(3), &[2, 0, 5]).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let img = decode(&bytes);
        assert_eq!(img.dimensions(), (320, 200));
    }

    fn has_text(img: &RgbImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> bool {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .any(|(x, y)| img.get_pixel(x, y).0 == [0, 0, 0])
    }

    #[test]
    fn test_single_winner_fills_pie() {
        let renderer = PieChartRenderer::new(400, 300);
        let img = decode(&renderer.render(&labels(2), &[0, 4]).unwrap());

        // Centre of the pie area
        assert_eq!(img.get_pixel(120, 150).0, slice_color(1));
        // Top-left corner is background
        assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_slices_start_at_top_clockwise() {
        let renderer = PieChartRenderer::new(400, 300);
        let img = decode(&renderer.render(&labels(2), &[1, 1]).unwrap());

        // Right half belongs to the first slice, left half to the second
        assert_eq!(img.get_pixel(160, 150).0, slice_color(0));
        assert_eq!(img.get_pixel(80, 150).0, slice_color(1));
    }

    #[test]
    fn test_legend_lines() {
        let labels = vec!["Apple".to_string(), "Banana".to_string(), "Cherry".to_string()];
        assert_eq!(
            legend_lines(&labels, &[2, 0, 5]),
            vec!["Apple 28.6%", "Banana 0.0%", "Cherry 71.4%"]
        );
    }

    #[test]
    fn test_fit_truncates_long_labels() {
        assert_eq!(fit("Apple 50.0%", 20), "Apple 50.0%");
        assert_eq!(fit("Dragon fruit 50.0%", 8), "Dragon..");
    }

    #[test]
    fn test_labels_and_percentages_are_drawn() {
        let renderer = PieChartRenderer::new(400, 300);
        let img = decode(&renderer.render(&labels(2), &[3, 1]).unwrap());

        // Legend text right of the swatches (pie area is 240 wide)
        assert!(has_text(&img, 270..400, 0..60));
        // "75.0%" inside the first slice, below right of centre
        assert!(has_text(&img, 140..200, 180..215));
        // "25.0%" inside the second slice, above left of centre
        assert!(has_text(&img, 45..105, 90..120));
        // Nothing drawn in the empty corner
        assert!(!has_text(&img, 0..10, 0..10));
    }

    #[test]
    fn test_label_text_changes_output() {
        let renderer = PieChartRenderer::new(400, 300);
        let a = renderer
            .render(&["Apple".to_string(), "Pear".to_string()], &[1, 1])
            .unwrap();
        let b = renderer
            .render(&["Mango".to_string(), "Kiwi".to_string()], &[1, 1])
            .unwrap();
        assert_ne!(decode(&a), decode(&b));
    }

    #[test]
    fn test_rejects_zero_total() {
        let renderer = PieChartRenderer::default();
        assert_eq!(renderer.render(&labels(2), &[0, 0]), Err(ChartError::NoVotes));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let renderer = PieChartRenderer::default();
        assert_eq!(
            renderer.render(&labels(2), &[1, 2, 3]),
            Err(ChartError::LengthMismatch {
                labels: 2,
                values: 3
            })
        );
    }

    #[test]
    fn test_minimum_dimensions() {
        assert_eq!(PieChartRenderer::new(1, 1000).dimensions(), (64, 1000));
    }
}
