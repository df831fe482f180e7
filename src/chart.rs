use anyhow::{anyhow, Context, Result};
use chrono::Duration;
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

use crate::models::HistoryRow;

const CHART_SIZE: (u32, u32) = (1200, 600);

fn drawing_error<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("chart drawing failed: {}", e)
}

/// Render the balance history as an SVG line chart with point markers and a
/// zero line. Returns `false` without touching `path` when there is nothing
/// to plot.
pub fn render_trend(rows: &[HistoryRow], path: &Path, title: &str) -> Result<bool> {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        info!("📉 History is empty, skipping chart");
        return Ok(false);
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let (x_min, x_max) = if first.date == last.date {
        (first.date - Duration::days(3), last.date + Duration::days(3))
    } else {
        (first.date, last.date)
    };

    let low = rows.iter().map(|r| r.balance).min().unwrap_or(0).min(0) as f64;
    let high = rows.iter().map(|r| r.balance).max().unwrap_or(0).max(0) as f64;
    let pad = ((high - low) * 0.1).max(1.0);

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(drawing_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(110)
        .build_cartesian_2d(x_min..x_max, (low - pad)..(high + pad))
        .map_err(drawing_error)?;

    chart
        .configure_mesh()
        .x_labels(10)
        .x_label_formatter(&|d| d.format("%Y-%m-%d").to_string())
        .y_label_formatter(&|v| format!("{:.0}", v))
        .x_desc("Date")
        .y_desc("Balance (JPY)")
        .light_line_style(WHITE.mix(0.3))
        .draw()
        .map_err(drawing_error)?;

    chart
        .draw_series(LineSeries::new(vec![(x_min, 0.0), (x_max, 0.0)], BLACK.stroke_width(1)))
        .map_err(drawing_error)?;

    chart
        .draw_series(LineSeries::new(
            rows.iter().map(|r| (r.date, r.balance as f64)),
            BLUE.stroke_width(2),
        ))
        .map_err(drawing_error)?;

    chart
        .draw_series(rows.iter().map(|r| Circle::new((r.date, r.balance as f64), 4, BLUE.filled())))
        .map_err(drawing_error)?;

    root.present().map_err(drawing_error)?;
    info!("📈 Chart saved to {}", path.display());
    Ok(true)
}
