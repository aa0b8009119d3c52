// src/renderer.rs

use crate::date::Locale;
use crate::error::{Error, Result};
use crate::model::*;
use image::{Rgb, RgbImage};
use palette::{Clamp, FromColor, Lch, Srgb};
use std::path::Path;

const BACKGROUND: Rgb<u8> = Rgb([8, 8, 12]);
const AXIS: Rgb<u8> = Rgb([90, 90, 100]);

/// One user's share of every bin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub user: String,
    pub counts: Vec<usize>,
}

/// A stacked histogram over one cyclic dimension. Layers are stacked
/// bottom-up in the order of `AnalysisResult::users`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    pub labels: Vec<String>,
    pub layers: Vec<Layer>,
}

impl Histogram {
    pub fn weekdays(analysis: &AnalysisResult, locale: Locale) -> Self {
        let labels = locale.day_abbr().iter().map(|d| d.to_string()).collect();
        Self::build(analysis, labels, 0, |agg| agg.weekdays.as_slice())
    }

    pub fn months(analysis: &AnalysisResult, locale: Locale) -> Self {
        let labels = locale.month_abbr().iter().map(|m| m.to_string()).collect();
        Self::build(analysis, labels, 1, |agg| agg.months.as_slice())
    }

    pub fn hours(analysis: &AnalysisResult) -> Self {
        let labels = (0..24).map(|h| format!("{h:02}:00")).collect();
        Self::build(analysis, labels, 0, |agg| agg.hours.as_slice())
    }

    /// `first` is the value that lands in bin 0.
    fn build(
        analysis: &AnalysisResult,
        labels: Vec<String>,
        first: u8,
        values: impl Fn(&UserAggregate) -> &[u8],
    ) -> Self {
        let bins = labels.len();
        let layers = analysis
            .users
            .iter()
            .map(|(user, agg)| {
                let mut counts = vec![0; bins];
                for &v in values(agg) {
                    if let Some(slot) = v.checked_sub(first).and_then(|i| counts.get_mut(i as usize)) {
                        *slot += 1;
                    }
                }
                Layer { user: user.clone(), counts }
            })
            .collect();
        Self { labels, layers }
    }

    /// Height of each full stack
    pub fn totals(&self) -> Vec<usize> {
        (0..self.labels.len())
            .map(|bin| self.layers.iter().map(|l| l.counts[bin]).sum())
            .collect()
    }
}

/// `"{user} [{n} messages]"`, in display order
pub fn legend_labels(analysis: &AnalysisResult) -> Vec<String> {
    analysis
        .users
        .iter()
        .map(|(name, agg)| format!("{} [{} messages]", name, agg.message_count()))
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Rect {
    /// Shrinks the rectangle by `frac` of its size on every side.
    fn inset(self, frac: f32) -> Rect {
        let dx = (self.width as f32 * frac) as u32;
        let dy = (self.height as f32 * frac) as u32;
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width.saturating_sub(2 * dx),
            height: self.height.saturating_sub(2 * dy),
        }
    }
}

/// Renders the 2x2 chart: weekdays top-left, legend top-right, months
/// bottom-left, hours bottom-right.
pub fn render_chart(analysis: &AnalysisResult, locale: Locale, width: u32, height: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    let colors = user_palette(analysis);

    let (half_w, half_h) = (width / 2, height / 2);
    let quadrant = |col: u32, row: u32| Rect { x: col * half_w, y: row * half_h, width: half_w, height: half_h };

    draw_histogram(&mut image, quadrant(0, 0).inset(0.08), &Histogram::weekdays(analysis, locale), &colors);
    draw_legend(&mut image, quadrant(1, 0).inset(0.08), analysis, &colors);
    draw_histogram(&mut image, quadrant(0, 1).inset(0.08), &Histogram::months(analysis, locale), &colors);
    draw_histogram(&mut image, quadrant(1, 1).inset(0.08), &Histogram::hours(analysis), &colors);

    image
}

pub fn save_chart(image: &RgbImage, path: &Path) -> Result<()> {
    image.save(path).map_err(|source| Error::Image { path: path.to_path_buf(), source })
}

fn fill(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(image.width());
    let y_end = (y + h).min(image.height());
    for py in y..y_end {
        for px in x..x_end {
            image.put_pixel(px, py, color);
        }
    }
}

fn draw_histogram(image: &mut RgbImage, area: Rect, histogram: &Histogram, colors: &[Rgb<u8>]) {
    let bins = histogram.labels.len() as u32;
    if bins == 0 || area.width < bins || area.height < 2 {
        return;
    }

    // Baseline and y axis
    fill(image, area.x, area.y + area.height - 1, area.width, 1, AXIS);
    fill(image, area.x, area.y, 1, area.height, AXIS);

    let max_stack = histogram.totals().into_iter().max().unwrap_or(0);
    if max_stack == 0 {
        return;
    }

    let bin_width = area.width / bins;
    let gap = (bin_width / 8).max(1);
    let plot_height = (area.height - 1) as f32;

    for bin in 0..bins as usize {
        let x = area.x + bin as u32 * bin_width + gap;
        let mut stacked = 0usize;
        for (layer, color) in histogram.layers.iter().zip(colors) {
            let count = layer.counts[bin];
            if count == 0 {
                continue;
            }
            let bottom = (stacked as f32 / max_stack as f32 * plot_height) as u32;
            stacked += count;
            let top = (stacked as f32 / max_stack as f32 * plot_height) as u32;
            let y = area.y + area.height - 1 - top;
            fill(image, x, y, bin_width.saturating_sub(2 * gap), top - bottom, *color);
        }
    }
}

fn draw_legend(image: &mut RgbImage, area: Rect, analysis: &AnalysisResult, colors: &[Rgb<u8>]) {
    let users = analysis.users.len() as u32;
    if users == 0 || area.height < users {
        return;
    }
    let most = analysis.users.iter().map(|(_, agg)| agg.message_count()).max().unwrap_or(1).max(1);
    let row_height = (area.height / users).min(area.height / 8).max(1);

    // Largest user on top, same as the top of the stacks.
    for (row, ((_, agg), color)) in analysis.users.iter().zip(colors).rev().enumerate() {
        let y = area.y + row as u32 * row_height;
        let width = (agg.message_count() as f32 / most as f32 * area.width as f32) as u32;
        fill(image, area.x, y, width.max(1), row_height.saturating_sub(2).max(1), *color);
    }
}

/// Hue step between consecutive legend entries, the golden angle
const HUE_STEP: f32 = 137.507_77;
const FIRST_HUE: f32 = 250.0;

/// One colour per user, in legend order. Consecutive entries sit a golden
/// angle apart in LCh, so adding a user never changes the earlier colours.
fn user_palette(analysis: &AnalysisResult) -> Vec<Rgb<u8>> {
    (0..analysis.users.len()).map(legend_color).collect()
}

fn legend_color(position: usize) -> Rgb<u8> {
    let hue = (FIRST_HUE + position as f32 * HUE_STEP) % 360.0;
    let srgb: Srgb<u8> = Srgb::<f32>::from_color(Lch::new(70.0f32, 80.0f32, hue))
        .clamp()
        .into_format();
    Rgb(srgb.into_components().into())
}

/// Prints the legend and the per-bin totals of each histogram.
pub fn print_summary(analysis: &AnalysisResult, locale: Locale) {
    println!("Users:");
    for label in legend_labels(analysis).iter().rev() {
        println!("  {label}");
    }
    for (title, histogram) in [
        ("Weekdays", Histogram::weekdays(analysis, locale)),
        ("Months", Histogram::months(analysis, locale)),
        ("Hours", Histogram::hours(analysis)),
    ] {
        let cells: Vec<String> = histogram
            .labels
            .iter()
            .zip(histogram.totals())
            .map(|(label, total)| format!("{label} {total}"))
            .collect();
        println!("{title}: {}", cells.join(" | "));
    }
}
