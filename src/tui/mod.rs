//! Ratatui-based terminal dashboard.
//!
//! Layout: an indicator selector on the left, the selected indicator's chart
//! on the right, and a 2×2 overview of the headline indicators underneath.
//! All data comes from the store; `r` reloads it.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use plotters::style::RGBColor;
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
};

use crate::app::pipeline::{StoredData, load_stored};
use crate::error::AppError;
use crate::present::select_series;
use crate::report::fmt_value;

mod plotters_chart;

use plotters_chart::SeriesChart;

const OVERVIEW_PANELS: usize = 4;

const PALETTE: [RGBColor; 4] = [
    RGBColor(0, 255, 255),
    RGBColor(0, 255, 0),
    RGBColor(255, 200, 0),
    RGBColor(255, 100, 255),
];

/// Start the dashboard over `stored`.
///
/// `overview` lists preferred labels for the overview grid (typically the
/// catalog's indicator names); labels missing from the store are skipped.
pub fn run(db_path: PathBuf, stored: StoredData, overview: Vec<String>) -> Result<(), AppError> {
    let _guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)
        .map_err(|e| AppError::new(4, format!("Failed to initialize terminal: {e}")))?;

    let mut app = App::new(db_path, stored, overview);
    app.event_loop(&mut terminal)
}

/// Ensures the terminal is restored (raw mode, alternate screen) on exit.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(4, format!("Failed to enable raw mode: {e}")))?;
        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(AppError::new(4, format!("Failed to enter alternate screen: {e}")));
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

struct App {
    db_path: PathBuf,
    stored: StoredData,
    names: Vec<String>,
    preferred_overview: Vec<String>,
    selected: usize,
    status: String,
}

impl App {
    fn new(db_path: PathBuf, stored: StoredData, preferred_overview: Vec<String>) -> Self {
        let names = stored.table.labels().to_vec();
        // Start on GDP when present.
        let selected = names.iter().position(|n| n == "GDP").unwrap_or(0);
        Self {
            db_path,
            stored,
            names,
            preferred_overview,
            selected,
            status: "Loaded from store.".to_string(),
        }
    }

    fn selected_name(&self) -> Option<&str> {
        self.names.get(self.selected).map(String::as_str)
    }

    fn event_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<(), AppError> {
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal
                    .draw(|f| self.draw(f))
                    .map_err(|e| AppError::new(4, format!("Terminal draw error: {e}")))?;
                needs_redraw = false;
            }

            if !event::poll(Duration::from_millis(100))
                .map_err(|e| AppError::new(4, format!("Event poll error: {e}")))? {
                continue;
            }

            match event::read().map_err(|e| AppError::new(4, format!("Event read error: {e}")))? {
                Event::Key(key) => {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    if self.handle_key(key.code) {
                        break;
                    }
                    needs_redraw = true;
                }
                Event::Resize(_, _) => {
                    needs_redraw = true;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns `true` when the dashboard should exit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.names.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Home => self.selected = 0,
            KeyCode::End => self.selected = self.names.len().saturating_sub(1),
            KeyCode::Char('r') => self.reload(),
            _ => {}
        }
        false
    }

    fn reload(&mut self) {
        match load_stored(&self.db_path) {
            Ok(stored) => {
                let keep = self.selected_name().map(str::to_string);
                self.names = stored.table.labels().to_vec();
                self.selected = keep
                    .and_then(|k| self.names.iter().position(|n| *n == k))
                    .unwrap_or(0);
                self.status = format!("Reloaded {} rows.", stored.rows.len());
                self.stored = stored;
            }
            Err(err) => {
                self.status = format!("Reload failed: {err}");
            }
        }
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        let size = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
            .split(size);

        self.draw_header(frame, chunks[0]);
        self.draw_body(frame, chunks[1]);
        self.draw_footer(frame, chunks[2]);
    }

    fn draw_header(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let dates = self.stored.table.dates();
        let range = match (dates.first(), dates.last()) {
            (Some(a), Some(b)) => format!("{a} → {b}"),
            _ => "-".to_string(),
        };

        let lines = vec![
            Line::from(vec![
                Span::styled("econ", Style::default().fg(Color::Cyan)),
                Span::raw(" | Economic Indicators Dashboard"),
            ]),
            Line::from(Span::styled(
                format!(
                    "db: {} | dates: {range} | indicators: {} | rows: {}",
                    self.db_path.display(),
                    self.names.len(),
                    self.stored.rows.len(),
                ),
                Style::default().fg(Color::Gray),
            )),
        ];

        let p = Paragraph::new(Text::from(lines)).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }

    fn draw_body(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(28), Constraint::Min(0)])
            .split(rows[0]);

        self.draw_selector(frame, top[0]);
        self.draw_focus(frame, top[1]);
        self.draw_overview(frame, rows[1]);
    }

    fn draw_selector(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let items: Vec<ListItem> = self.names.iter().map(|n| ListItem::new(n.as_str())).collect();
        let list = List::new(items)
            .block(Block::default().title("Indicator").borders(Borders::ALL))
            .highlight_style(Style::default().fg(Color::Black).bg(Color::White))
            .highlight_symbol("» ");

        let mut state = ListState::default();
        if !self.names.is_empty() {
            state.select(Some(self.selected));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_focus(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let Some(name) = self.selected_name() else {
            render_message(frame, area, "Indicator", "No data stored.");
            return;
        };
        let series = select_series(&self.stored.rows, name);
        let latest = series.iter().rev().find_map(|(_, v)| *v);
        let title = format!("{name} Over Time (latest {})", fmt_value(latest));
        draw_series_panel(frame, area, &title, &series, PALETTE[0], true);
    }

    fn draw_overview(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let labels = overview_labels(self.stored.table.labels(), &self.preferred_overview);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        for (i, row) in rows.iter().enumerate() {
            let cells = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(*row);
            for (j, cell) in cells.iter().enumerate() {
                let idx = i * 2 + j;
                match labels.get(idx).and_then(|l| self.stored.table.column(l).map(|c| (l, c))) {
                    Some((label, series)) => {
                        draw_series_panel(frame, *cell, label, &series, PALETTE[idx % PALETTE.len()], false);
                    }
                    None => render_message(frame, *cell, "", ""),
                }
            }
        }
    }

    fn draw_footer(&self, frame: &mut ratatui::Frame<'_>, area: Rect) {
        let help = "↑/↓ select  r reload  q quit";
        let line = Line::from(vec![
            Span::styled(help, Style::default().fg(Color::Gray)),
            Span::raw(" | "),
            Span::styled(&self.status, Style::default().fg(Color::Yellow)),
        ]);
        let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(p, area);
    }
}

fn render_message(frame: &mut ratatui::Frame<'_>, area: Rect, title: &str, msg: &str) {
    let block = Block::default().title(title.to_string()).borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    let p = Paragraph::new(msg.to_string()).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(p, inner);
}

fn draw_series_panel(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    series: &[(NaiveDate, Option<f64>)],
    color: RGBColor,
    show_labels: bool,
) {
    let Some(data) = chart_data(series) else {
        render_message(frame, area, title, "No values.");
        return;
    };

    let block = Block::default().title(title.to_string()).borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Clear, inner);

    let widget = SeriesChart {
        segments: &data.segments,
        x_bounds: data.x_bounds,
        y_bounds: data.y_bounds,
        color,
        show_labels,
        fmt_x: fmt_axis_year,
        fmt_y: fmt_axis_value,
    };
    frame.render_widget(widget, inner);
}

/// Pick up to four overview labels: preferred ones present in the store
/// first, then the remaining stored labels in order.
fn overview_labels(stored: &[String], preferred: &[String]) -> Vec<String> {
    let mut out: Vec<String> = preferred
        .iter()
        .filter(|p| stored.contains(p))
        .take(OVERVIEW_PANELS)
        .cloned()
        .collect();
    for label in stored {
        if out.len() >= OVERVIEW_PANELS {
            break;
        }
        if !out.contains(label) {
            out.push(label.clone());
        }
    }
    out
}

/// Chart-ready series: contiguous runs plus padded bounds.
#[derive(Debug, Clone, PartialEq)]
struct ChartData {
    segments: Vec<Vec<(f64, f64)>>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

/// Convert a date-sorted series into chart coordinates.
///
/// Returns `None` when the series has no values at all.
fn chart_data(series: &[(NaiveDate, Option<f64>)]) -> Option<ChartData> {
    let mut segments: Vec<Vec<(f64, f64)>> = Vec::new();
    let mut open = false;
    for &(date, value) in series {
        match value {
            Some(y) if y.is_finite() => {
                if !open {
                    segments.push(Vec::new());
                    open = true;
                }
                if let Some(seg) = segments.last_mut() {
                    seg.push((year_fraction(date), y));
                }
            }
            _ => open = false,
        }
    }

    let points = || segments.iter().flatten();
    let x_min = points().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let x_max = points().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let y_min = points().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let y_max = points().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
    if !(x_min.is_finite() && y_min.is_finite()) {
        return None;
    }

    let (x_min, x_max) = if x_max > x_min { (x_min, x_max) } else { (x_min - 0.5, x_min + 0.5) };
    let span = y_max - y_min;
    let pad = if span > 0.0 { span * 0.05 } else { y_min.abs().max(1.0) * 0.05 };

    Some(ChartData {
        segments,
        x_bounds: [x_min, x_max],
        y_bounds: [y_min - pad, y_max + pad],
    })
}

/// Date as a fractional year, e.g. 2021-07-02 ≈ 2021.5.
fn year_fraction(date: NaiveDate) -> f64 {
    let days_in_year = if date.leap_year() { 366.0 } else { 365.0 };
    date.year() as f64 + date.ordinal0() as f64 / days_in_year
}

fn fmt_axis_year(v: f64) -> String {
    format!("{v:.0}")
}

fn fmt_axis_value(v: f64) -> String {
    if v.abs() >= 1000.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}
