//! Decile distribution charts
//!
//! One bar per decile, drawn on a bitmap backend. The chart carries no text;
//! the behavior and video are encoded in the file name.

use crate::error::{Result, TaggerError};
use crate::statistics::DecileDistribution;
use plotters::prelude::*;
use std::fmt::Display;
use std::path::Path;

const CHART_SIZE: (u32, u32) = (640, 480);
const BAR_GAP: f64 = 0.1;

fn plot_error(e: impl Display) -> TaggerError {
    TaggerError::Plot(e.to_string())
}

/// Render a decile distribution as a PNG bar chart
pub fn render_distribution(path: &Path, distribution: &DecileDistribution) -> Result<()> {
    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let peak = distribution.deciles.iter().copied().max().unwrap_or(0).max(1) as f64;
    let bars = distribution.deciles.len() as f64;
    let mut chart = ChartBuilder::on(&root)
        .margin(24)
        .build_cartesian_2d(0f64..bars, 0f64..peak * 1.1)
        .map_err(plot_error)?;

    chart
        .draw_series(distribution.deciles.iter().enumerate().map(|(i, count)| {
            let x = i as f64;
            Rectangle::new(
                [(x + BAR_GAP, 0.0), (x + 1.0 - BAR_GAP, *count as f64)],
                BLUE.filled(),
            )
        }))
        .map_err(plot_error)?;

    // axes
    chart
        .draw_series([
            PathElement::new(vec![(0.0, 0.0), (bars, 0.0)], BLACK),
            PathElement::new(vec![(0.0, 0.0), (0.0, peak * 1.1)], BLACK),
        ])
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;
    Ok(())
}
