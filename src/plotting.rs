use std::ops::Range;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::config::OutputConfig;
use crate::dynamics::TrajectorySample;
use crate::orbit::YEAR;
use crate::output::{OutputArtifacts, ensure_parent};
use crate::table::{Extent, ResultTable};

const TRAJECTORY_CANVAS: (u32, u32) = (620, 620);
const COLORBAR_WIDTH: u32 = 110;
const COLORBAR_STEPS: usize = 200;
const CRITICAL_LABEL: &str = "a_crit";

/// Piecewise-linear colour map through evenly spaced anchors.
#[derive(Debug, Clone, Copy)]
pub struct Colormap {
    anchors: &'static [(u8, u8, u8)],
}

pub const CIVIDIS: Colormap = Colormap {
    anchors: &[
        (0, 34, 77),
        (68, 76, 107),
        (124, 123, 120),
        (187, 174, 113),
        (254, 232, 56),
    ],
};

/// ColorBrewer yellow-green.
pub const YLGN: Colormap = Colormap {
    anchors: &[
        (255, 255, 229),
        (247, 252, 185),
        (217, 240, 163),
        (173, 221, 142),
        (120, 198, 121),
        (65, 171, 93),
        (35, 132, 67),
        (0, 104, 55),
        (0, 69, 41),
    ],
};

impl Colormap {
    /// Colour at `t` in `[0, 1]`; values outside are clamped.
    pub fn sample(&self, t: f64) -> RGBColor {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let last = self.anchors.len() - 1;
        let position = t * last as f64;
        let lower = (position.floor() as usize).min(last.saturating_sub(1));
        let upper = (lower + 1).min(last);
        let frac = position - lower as f64;

        let (r0, g0, b0) = self.anchors[lower];
        let (r1, g1, b1) = self.anchors[upper];
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
        RGBColor(mix(r0, r1), mix(g0, g1), mix(b0, b1))
    }
}

/// One colour-coded map over the (a, e) grid.
#[derive(Debug, Clone)]
pub struct Heatmap {
    pub stem: &'static str,
    pub title: &'static str,
    pub label: &'static str,
    /// `n_e` rows of `n_a` values.
    pub values: Vec<Vec<f64>>,
    pub scale: (f64, f64),
    pub colormap: Colormap,
    pub mark_critical: bool,
}

impl Heatmap {
    fn normalize(&self, value: f64) -> f64 {
        let (lo, hi) = self.scale;
        if !value.is_finite() || hi <= lo {
            return 0.0;
        }
        ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
    }
}

/// The four sweep maps: maximum eccentricity, lifetime in years, initial
/// eccentricity and initial semi-major axis.
pub fn build_heatmaps(table: &ResultTable) -> Vec<Heatmap> {
    let lifetime = table.grid(|r| r.lifetime / YEAR);
    let lifetime_max = lifetime
        .iter()
        .flatten()
        .copied()
        .fold(0.0_f64, f64::max);
    let extent = table.extent();

    vec![
        Heatmap {
            stem: "maxeccmap",
            title: "Maximum eccentricity",
            label: "max e",
            values: table.grid(|r| r.max_eccentricity),
            scale: (0.0, 1.0),
            colormap: CIVIDIS,
            mark_critical: true,
        },
        Heatmap {
            stem: "Lifetime",
            title: "Lifetime",
            label: "lifetime (yr)",
            values: lifetime,
            scale: (0.0, if lifetime_max > 0.0 { lifetime_max } else { 1.0 }),
            colormap: YLGN,
            mark_critical: true,
        },
        Heatmap {
            stem: "initialeccmap",
            title: "Initial eccentricity",
            label: "e0",
            values: table.grid(|r| r.initial_eccentricity),
            scale: (0.0, 1.0),
            colormap: CIVIDIS,
            mark_critical: false,
        },
        Heatmap {
            stem: "initialsmaxismap",
            title: "Initial semi-major axis",
            label: "a0 (AU)",
            values: table.grid(|r| r.initial_semi_major_axis),
            scale: padded_range(extent.a_min, extent.a_max),
            colormap: CIVIDIS,
            mark_critical: false,
        },
    ]
}

/// Renders every heatmap to PNG and/or SVG. Returns the files written.
pub fn render_heatmaps(
    table: &ResultTable,
    artifacts: &OutputArtifacts,
    output: &OutputConfig,
) -> Result<Vec<PathBuf>> {
    if table.is_empty() {
        return Err(anyhow!("No results available for plotting"));
    }

    let extent = table.extent();
    let size = (output.width_px, output.height_px);
    let x_range = output.smaxis_range[0]..output.smaxis_range[1];
    let critical = output.critical_marker();
    let mut written = Vec::new();

    for map in build_heatmaps(table) {
        if artifacts.export_png {
            let path = artifacts.plot_path(map.stem, "png");
            ensure_parent(&path)?;
            let root = BitMapBackend::new(&path, size).into_drawing_area();
            draw_heatmap(root, &map, extent, x_range.clone(), critical)
                .with_context(|| format!("Failed to render {}", path.display()))?;
            written.push(path);
        }
        if artifacts.export_svg {
            let path = artifacts.plot_path(map.stem, "svg");
            ensure_parent(&path)?;
            let root = SVGBackend::new(&path, size).into_drawing_area();
            draw_heatmap(root, &map, extent, x_range.clone(), critical)
                .with_context(|| format!("Failed to render {}", path.display()))?;
            written.push(path);
        }
    }

    Ok(written)
}

/// Charts the planet-centric path of one inspected particle.
pub fn render_trajectory(
    samples: &[TrajectorySample],
    index: usize,
    artifacts: &OutputArtifacts,
) -> Result<Vec<PathBuf>> {
    if samples.is_empty() {
        return Err(anyhow!("No samples available for plotting"));
    }

    let stem = OutputArtifacts::trajectory_stem(index);
    let title = format!("Test particle {index} around the planet");
    let mut written = Vec::new();

    if artifacts.export_png {
        let path = artifacts.plot_path(&stem, "png");
        ensure_parent(&path)?;
        let root = BitMapBackend::new(&path, TRAJECTORY_CANVAS).into_drawing_area();
        draw_trajectory(root, samples, &title)?;
        written.push(path);
    }
    if artifacts.export_svg {
        let path = artifacts.plot_path(&stem, "svg");
        ensure_parent(&path)?;
        let root = SVGBackend::new(&path, TRAJECTORY_CANVAS).into_drawing_area();
        draw_trajectory(root, samples, &title)?;
        written.push(path);
    }

    Ok(written)
}

/// Cell boundaries for `count` equal cells spanning `[min, max]`.
pub fn cell_edges(min: f64, max: f64, count: usize) -> Vec<f64> {
    let (lo, hi) = padded_range(min, max);
    let count = count.max(1);
    let width = (hi - lo) / count as f64;
    (0..=count)
        .map(|i| if i == count { hi } else { lo + width * i as f64 })
        .collect()
}

/// Widens a degenerate range so it can be drawn.
fn padded_range(min: f64, max: f64) -> (f64, f64) {
    if max > min {
        (min, max)
    } else {
        let pad = if min.abs() > 0.0 { min.abs() * 0.05 } else { 0.05 };
        (min - pad, max + pad)
    }
}

fn draw_heatmap<DB: DrawingBackend>(
    drawing_area: DrawingArea<DB, Shift>,
    map: &Heatmap,
    extent: Extent,
    x_range: Range<f64>,
    critical: Option<f64>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let root = drawing_area;
    root.fill(&WHITE)?;

    let (title_area, body) = root.split_vertically(36);
    let title_style = ("sans-serif", 24)
        .into_text_style(&title_area)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let title_dims = title_area.dim_in_pixel();
    title_area.draw_text(
        map.title,
        &title_style,
        (title_dims.0 as i32 / 2, title_dims.1 as i32 / 2),
    )?;

    let body_width = body.dim_in_pixel().0;
    let (heat_area, bar_area) =
        body.split_horizontally(body_width.saturating_sub(COLORBAR_WIDTH) as i32);

    let n_e = map.values.len();
    let n_a = map.values.first().map_or(0, Vec::len);
    let a_edges = cell_edges(extent.a_min, extent.a_max, n_a);
    let e_edges = cell_edges(extent.e_min, extent.e_max, n_e);
    let y_range = e_edges[0]..e_edges[e_edges.len() - 1];

    let mut chart = ChartBuilder::on(&heat_area)
        .margin_left(12)
        .margin_right(12)
        .margin_top(6)
        .margin_bottom(12)
        .set_label_area_size(LabelAreaPosition::Left, 62)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_range.clone(), y_range.clone())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("initial semi-major axis (AU)")
        .y_desc("initial eccentricity")
        .x_labels(7)
        .x_label_formatter(&|v| format_decimal_tick(*v))
        .y_label_formatter(&|v| format_decimal_tick(*v))
        .label_style(("sans-serif", 15))
        .axis_desc_style(("sans-serif", 17))
        .draw()?;

    let clamp_x = |x: f64| x.clamp(x_range.start, x_range.end);
    let a_edges = &a_edges;
    chart.draw_series(map.values.iter().enumerate().flat_map(|(row, values)| {
        let (y0, y1) = (e_edges[row], e_edges[row + 1]);
        values.iter().enumerate().map(move |(col, &value)| {
            let color = map.colormap.sample(map.normalize(value));
            Rectangle::new(
                [(clamp_x(a_edges[col]), y0), (clamp_x(a_edges[col + 1]), y1)],
                color.filled(),
            )
        })
    }))?;

    if let Some(a_crit) = critical.filter(|_| map.mark_critical) {
        if x_range.contains(&a_crit) {
            let dash = (y_range.end - y_range.start) / 40.0;
            let red = ShapeStyle::from(&RED).stroke_width(2);
            chart.draw_series((0..40).step_by(2).map(|i| {
                let y = y_range.start + dash * i as f64;
                PathElement::new(vec![(a_crit, y), (a_crit, y + dash)], red)
            }))?;
            chart.draw_series(std::iter::once(Text::new(
                CRITICAL_LABEL,
                (a_crit, y_range.end),
                ("sans-serif", 15).into_font().color(&RED),
            )))?;
        }
    }

    draw_colorbar(&bar_area, map)?;

    root.present()
        .map_err(|e| anyhow!("Failed to render heatmap: {:?}", e))?;
    Ok(())
}

fn draw_colorbar<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, map: &Heatmap) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (lo, hi) = padded_range(map.scale.0, map.scale.1);
    let mut bar = ChartBuilder::on(area)
        .margin_top(6)
        .margin_bottom(62)
        .margin_left(8)
        .margin_right(8)
        .x_label_area_size(0)
        .y_label_area_size(62)
        .build_cartesian_2d(0.0..1.0, lo..hi)?;

    bar.configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(0)
        .y_labels(6)
        .y_desc(map.label)
        .y_label_formatter(&|v| format_decimal_tick(*v))
        .label_style(("sans-serif", 13))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let step = (hi - lo) / COLORBAR_STEPS as f64;
    bar.draw_series((0..COLORBAR_STEPS).map(|i| {
        let y0 = lo + step * i as f64;
        let t = (i as f64 + 0.5) / COLORBAR_STEPS as f64;
        Rectangle::new([(0.0, y0), (1.0, y0 + step)], map.colormap.sample(t).filled())
    }))?;
    Ok(())
}

fn draw_trajectory<DB: DrawingBackend>(
    drawing_area: DrawingArea<DB, Shift>,
    samples: &[TrajectorySample],
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let root = drawing_area;
    root.fill(&WHITE)?;

    let (title_area, chart_area) = root.split_vertically(36);
    let title_style = ("sans-serif", 24)
        .into_text_style(&title_area)
        .pos(Pos::new(HPos::Center, VPos::Center));
    let title_dims = title_area.dim_in_pixel();
    title_area.draw_text(
        title,
        &title_style,
        (title_dims.0 as i32 / 2, title_dims.1 as i32 / 2),
    )?;

    // Keep the planet at the origin in view.
    let (x_min, x_max) = min_max(samples.iter().map(|s| s.x).chain(std::iter::once(0.0)));
    let (y_min, y_max) = min_max(samples.iter().map(|s| s.y).chain(std::iter::once(0.0)));
    let x_pad = (x_max - x_min) * 0.08;
    let y_pad = (y_max - y_min) * 0.08;
    let (x_lower, x_upper) = (x_min - x_pad, x_max + x_pad);
    let (y_lower, y_upper) = (y_min - y_pad, y_max + y_pad);

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(45)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 50)
        .build_cartesian_2d(x_lower..x_upper, y_lower..y_upper)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("x (AU)")
        .y_desc("y (AU)")
        .x_label_formatter(&|v| format_decimal_tick(*v))
        .y_label_formatter(&|v| format_decimal_tick(*v))
        .label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()?;

    chart.draw_series(LineSeries::new(samples.iter().map(|s| (s.x, s.y)), &BLACK))?;

    chart.draw_series(PointSeries::of_element(
        vec![(0.0, 0.0)],
        6,
        ShapeStyle::from(&RED).filled(),
        &|coord, size, style| {
            EmptyElement::at(coord)
                + Circle::new((0, 0), size, style)
                + Text::new("planet", (10, -10), ("sans-serif", 16).into_font())
        },
    ))?;

    chart.draw_series(PointSeries::of_element(
        vec![(samples[0].x, samples[0].y)],
        4,
        ShapeStyle::from(&BLUE).filled(),
        &|coord, size, style| {
            EmptyElement::at(coord)
                + Circle::new((0, 0), size, style)
                + Text::new("start", (10, -10), ("sans-serif", 16).into_font())
        },
    ))?;

    chart_area
        .present()
        .map_err(|e| anyhow!("Failed to render trajectory chart: {:?}", e))?;
    Ok(())
}

fn min_max<I>(values: I) -> (f64, f64)
where
    I: Iterator<Item = f64>,
{
    let mut iter = values.peekable();
    if iter.peek().is_none() {
        return (0.0, 1.0);
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for val in iter {
        min = min.min(val);
        max = max.max(val);
    }

    if (max - min).abs() < f64::EPSILON {
        let epsilon = if min.abs() < 1.0 { 1.0 } else { min.abs() * 0.05 };
        (min - epsilon, max + epsilon)
    } else {
        (min, max)
    }
}

fn format_decimal_tick(value: f64) -> String {
    if value == 0.0 {
        return "0".into();
    }
    if value.abs() >= 1e4 || value.abs() < 1e-3 {
        format!("{:.1e}", value)
    } else {
        format!("{:.6}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::{SimulationResult, TerminationReason};

    fn table() -> ResultTable {
        let mut rows = Vec::new();
        for e in [0.0, 0.3, 0.6] {
            for a in [0.01, 0.02] {
                rows.push(SimulationResult {
                    max_semi_major_axis: a,
                    max_eccentricity: e + 0.1,
                    max_inclination: 5e-5,
                    lifetime: if e < 0.5 { 10.0 * YEAR } else { 2.0 * YEAR },
                    initial_semi_major_axis: a,
                    initial_eccentricity: e,
                    initial_mean_anomaly: 0.0,
                    reason: TerminationReason::Survived,
                });
            }
        }
        ResultTable::new(rows, 2, 3).unwrap()
    }

    #[test]
    fn colormaps_hit_their_anchors() {
        assert_eq!(CIVIDIS.sample(0.0), RGBColor(0, 34, 77));
        assert_eq!(CIVIDIS.sample(0.5), RGBColor(124, 123, 120));
        assert_eq!(CIVIDIS.sample(1.0), RGBColor(254, 232, 56));
        assert_eq!(YLGN.sample(0.0), RGBColor(255, 255, 229));
        assert_eq!(YLGN.sample(1.0), RGBColor(0, 69, 41));
    }

    #[test]
    fn colormap_clamps_out_of_range_input() {
        assert_eq!(CIVIDIS.sample(-3.0), CIVIDIS.sample(0.0));
        assert_eq!(CIVIDIS.sample(7.0), CIVIDIS.sample(1.0));
        assert_eq!(CIVIDIS.sample(f64::NAN), CIVIDIS.sample(0.0));
    }

    #[test]
    fn four_maps_in_fixed_order() {
        let maps = build_heatmaps(&table());
        let stems: Vec<_> = maps.iter().map(|m| m.stem).collect();
        assert_eq!(
            stems,
            vec!["maxeccmap", "Lifetime", "initialeccmap", "initialsmaxismap"]
        );

        let critical: Vec<_> = maps.iter().map(|m| m.mark_critical).collect();
        assert_eq!(critical, vec![true, true, false, false]);

        assert_eq!(maps[0].scale, (0.0, 1.0));
        assert_eq!(maps[3].scale, (0.01, 0.02));
        for map in &maps {
            assert_eq!(map.values.len(), 3);
            assert!(map.values.iter().all(|row| row.len() == 2));
        }
    }

    #[test]
    fn lifetime_map_is_in_years() {
        let maps = build_heatmaps(&table());
        let lifetime = &maps[1];
        assert!((lifetime.scale.1 - 10.0).abs() < 1e-12);
        assert!((lifetime.values[2][0] - 2.0).abs() < 1e-12);
        assert!((lifetime.normalize(5.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn cell_edges_span_extent() {
        let edges = cell_edges(0.01, 0.03, 4);
        assert_eq!(edges.len(), 5);
        assert_eq!(edges[0], 0.01);
        assert_eq!(edges[4], 0.03);
        assert!((edges[1] - 0.015).abs() < 1e-15);

        let single = cell_edges(0.5, 0.5, 1);
        assert_eq!(single.len(), 2);
        assert!(single[0] < 0.5 && single[1] > 0.5);
    }

    #[test]
    fn decimal_ticks_are_compact() {
        assert_eq!(format_decimal_tick(0.0), "0");
        assert_eq!(format_decimal_tick(0.025), "0.025");
        assert_eq!(format_decimal_tick(0.9), "0.9");
        assert_eq!(format_decimal_tick(5e-5), "5.0e-5");
    }
}
