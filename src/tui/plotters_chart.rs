//! Plotters-powered time-series line chart widget for Ratatui.
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

/// A lightweight, render-only chart description.
///
/// All series and bounds are computed outside the render call, so `render()`
/// only draws.
pub struct SeriesChart<'a> {
    /// Contiguous runs of `(year fraction, value)`; gaps separate runs.
    pub segments: &'a [Vec<(f64, f64)>],
    /// X bounds (fractional years).
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    pub color: RGBColor,
    /// Show tick labels via Plotters; off for the small overview panels.
    pub show_labels: bool,
    pub fmt_x: fn(f64) -> String,
    pub fmt_y: fn(f64) -> String,
}

impl<'a> Widget for SeriesChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // When the available area is too small, Plotters may fail to build a chart.
        // In that case, we render a small hint rather than panicking.
        if area.width < 12 || area.height < 4 {
            buf.set_string(
                area.x,
                area.y,
                "Too small",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let x0 = self.x_bounds[0];
        let x1 = self.x_bounds[1];
        let y0 = self.y_bounds[0];
        let y1 = self.y_bounds[1];

        if !(x0.is_finite() && x1.is_finite() && y0.is_finite() && y1.is_finite()) || x1 <= x0 || y1 <= y0 {
            return;
        }

        let widget = widget_fn(move |root| {
            let label_area = if self.show_labels { 3 } else { 0 };
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                .set_label_area_size(LabelAreaPosition::Left, label_area * 2)
                .set_label_area_size(LabelAreaPosition::Bottom, label_area)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            let fmt_x = |v: &f64| (self.fmt_x)(*v);
            let fmt_y = |v: &f64| (self.fmt_y)(*v);

            // Mesh lines are noise at terminal resolution; keep axes only.
            let mut mesh = chart.configure_mesh();
            mesh.disable_x_mesh()
                .disable_y_mesh()
                .axis_style(&WHITE)
                .bold_line_style(&WHITE);
            if self.show_labels {
                mesh.x_labels(5)
                    .y_labels(5)
                    .x_label_formatter(&fmt_x)
                    .y_label_formatter(&fmt_y)
                    .label_style(("sans-serif", 10).into_font().color(&WHITE));
            } else {
                mesh.x_labels(0).y_labels(0);
            }
            mesh.draw()?;

            for seg in self.segments {
                if seg.len() == 1 {
                    chart.draw_series(seg.iter().map(|&(x, y)| Pixel::new((x, y), self.color)))?;
                } else {
                    chart.draw_series(LineSeries::new(seg.iter().copied(), &self.color))?;
                }
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}
