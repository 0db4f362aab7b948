use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use plotters::prelude::*;
use snapshot_core::PriceSeries;

/// The rendered chart file. Process-local: written and removed within a
/// single run.
#[derive(Debug, Clone)]
pub struct ChartArtifact {
    pub local_path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("no drawable observations for {0}")]
    NoData(String),

    #[error("chart render failed: {0}")]
    Render(String),

    #[error("chart io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Boundary of the rendering stage: series in, image file out.
pub trait TrendChartRenderer: Send + Sync {
    fn render(&self, series: &PriceSeries, out_dir: &Path) -> Result<ChartArtifact, ChartError>;
}

/// Bitmap line chart of the valid closes.
pub struct PlottersTrendRenderer;

impl TrendChartRenderer for PlottersTrendRenderer {
    fn render(&self, series: &PriceSeries, out_dir: &Path) -> Result<ChartArtifact, ChartError> {
        let closes: Vec<(NaiveDate, f64)> = series
            .points()
            .iter()
            .filter_map(|p| p.valid_close().map(|c| (p.date, c)))
            .collect();
        if closes.len() < 2 {
            return Err(ChartError::NoData(series.symbol().to_string()));
        }

        let path = out_dir.join(format!("{}_trend.png", series.symbol().to_lowercase()));

        let first = closes[0].0;
        let last = closes[closes.len() - 1].0;
        let low = closes.iter().map(|(_, c)| *c).fold(f64::INFINITY, f64::min);
        let high = closes
            .iter()
            .map(|(_, c)| *c)
            .fold(f64::NEG_INFINITY, f64::max);
        let pad = ((high - low) * 0.05).max(0.5);

        {
            let root = BitMapBackend::new(&path, (1200, 600)).into_drawing_area();
            root.fill(&WHITE)
                .map_err(|e| ChartError::Render(e.to_string()))?;

            let mut chart = ChartBuilder::on(&root)
                .caption(
                    format!("{} - Daily Close", series.symbol()),
                    ("sans-serif", 32),
                )
                .margin(16)
                .x_label_area_size(40)
                .y_label_area_size(60)
                .build_cartesian_2d(first..last, (low - pad)..(high + pad))
                .map_err(|e| ChartError::Render(e.to_string()))?;

            chart
                .configure_mesh()
                .x_labels(8)
                .x_label_formatter(&|d| d.format("%m-%d").to_string())
                .draw()
                .map_err(|e| ChartError::Render(e.to_string()))?;

            chart
                .draw_series(LineSeries::new(
                    closes.iter().copied(),
                    RGBColor(255, 153, 0).stroke_width(2),
                ))
                .map_err(|e| ChartError::Render(e.to_string()))?;

            root.present()
                .map_err(|e| ChartError::Render(e.to_string()))?;
        }

        let size_bytes = std::fs::metadata(&path)?.len();
        Ok(ChartArtifact {
            local_path: path,
            size_bytes,
        })
    }
}
