//! Scatter plots of point sets, optionally colored by cluster label and
//! overlaid with centroid markers.
//!
//! The backend is chosen from the output extension: `.svg` renders through
//! [`SVGBackend`], anything else through [`BitMapBackend`] as a PNG.

use std::fmt::Display;
use std::ops::Range;
use std::path::Path;

use log::info;
use ndarray::{Array1, Array2, Axis};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::error::PlotError;
use crate::points::PointSet;

/// Opacity of labelled points.
pub const POINT_ALPHA: f64 = 0.5;
/// Area of a centroid marker, in the same units as `s=` in matplotlib.
pub const CENTROID_MARKER_AREA: u32 = 50;

#[derive(Clone, Debug)]
pub struct PlotOptions {
    pub title: String,
    pub size: (u32, u32),
    pub point_size: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        PlotOptions {
            title: String::new(),
            size: (800, 600),
            point_size: 3,
        }
    }
}

/// Centroids to overlay and the labels used to color the points.
struct Clusters<'a> {
    labels: &'a Array1<usize>,
    centroids: &'a Array2<f32>,
}

/// Plots the raw points.
pub fn scatter(points: &PointSet, path: &Path, opts: &PlotOptions) -> Result<(), PlotError> {
    render(points, None, path, opts)
}

/// Plots the points colored by label, with each centroid drawn as a diamond.
pub fn cluster_scatter(
    points: &PointSet,
    labels: &Array1<usize>,
    centroids: &Array2<f32>,
    path: &Path,
    opts: &PlotOptions,
) -> Result<(), PlotError> {
    if labels.len() != points.len() {
        return Err(PlotError::LabelCount {
            points: points.len(),
            labels: labels.len(),
        });
    }
    if centroids.ncols() != 2 {
        return Err(PlotError::CentroidColumns(centroids.ncols()));
    }
    render(points, Some(Clusters { labels, centroids }), path, opts)
}

fn render(
    points: &PointSet,
    clusters: Option<Clusters<'_>>,
    path: &Path,
    opts: &PlotOptions,
) -> Result<(), PlotError> {
    if points.is_empty() {
        return Err(PlotError::Empty);
    }
    let is_svg = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("svg"));
    if is_svg {
        draw(
            SVGBackend::new(path, opts.size).into_drawing_area(),
            points,
            clusters.as_ref(),
            opts,
        )?;
    } else {
        draw(
            BitMapBackend::new(path, opts.size).into_drawing_area(),
            points,
            clusters.as_ref(),
            opts,
        )?;
    }
    info!("wrote {}", path.display());
    Ok(())
}

fn drawing<E: Display>(e: E) -> PlotError {
    PlotError::Drawing(e.to_string())
}

fn draw<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    points: &PointSet,
    clusters: Option<&Clusters<'_>>,
    opts: &PlotOptions,
) -> Result<(), PlotError> {
    root.fill(&WHITE).map_err(drawing)?;

    let (x_range, y_range) = chart_ranges(points, clusters.map(|c| c.centroids));
    let mut chart = ChartBuilder::on(&root)
        .caption(&opts.title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(x_range, y_range)
        .map_err(drawing)?;
    chart
        .configure_mesh()
        .x_desc("x")
        .y_desc("y")
        .draw()
        .map_err(drawing)?;

    let coords = points.xs().into_iter().zip(points.ys()).map(|(&x, &y)| (x, y));
    match clusters {
        None => {
            chart
                .draw_series(coords.map(|c| Circle::new(c, opts.point_size, BLUE.filled())))
                .map_err(drawing)?;
        }
        Some(clusters) => {
            chart
                .draw_series(coords.zip(clusters.labels.iter()).map(|(c, &label)| {
                    let color = Palette99::pick(label).mix(POINT_ALPHA);
                    Circle::new(c, opts.point_size, color.filled())
                }))
                .map_err(drawing)?;

            let half = diamond_half_diagonal(CENTROID_MARKER_AREA);
            chart
                .draw_series(clusters.centroids.axis_iter(Axis(0)).map(|row| {
                    EmptyElement::at((row[0], row[1]))
                        + Polygon::new(diamond(half), BLACK.filled())
                }))
                .map_err(drawing)?;
        }
    }

    root.present().map_err(drawing)?;
    Ok(())
}

/// Half-diagonal of a diamond (a square turned 45°) with the given area.
fn diamond_half_diagonal(area: u32) -> i32 {
    ((area as f64 / 2.0).sqrt().round() as i32).max(1)
}

/// Vertices of a diamond centered on the origin, in backend pixels.
fn diamond(half: i32) -> Vec<(i32, i32)> {
    vec![(0, -half), (half, 0), (0, half), (-half, 0)]
}

fn chart_ranges(
    points: &PointSet,
    centroids: Option<&Array2<f32>>,
) -> (Range<f32>, Range<f32>) {
    let ((mut x_lo, mut x_hi), (mut y_lo, mut y_hi)) = points
        .bounds()
        .unwrap_or(((0.0, 0.0), (0.0, 0.0)));
    if let Some(centroids) = centroids {
        for row in centroids.axis_iter(Axis(0)) {
            x_lo = x_lo.min(row[0]);
            x_hi = x_hi.max(row[0]);
            y_lo = y_lo.min(row[1]);
            y_hi = y_hi.max(row[1]);
        }
    }
    (padded(x_lo, x_hi), padded(y_lo, y_hi))
}

/// Widens `lo..hi` by 5% on each side; a degenerate span becomes `lo-1..hi+1`.
fn padded(lo: f32, hi: f32) -> Range<f32> {
    let span = hi - lo;
    if span <= f32::EPSILON {
        return (lo - 1.0)..(hi + 1.0);
    }
    let pad = span * 0.05;
    (lo - pad)..(hi + pad)
}
