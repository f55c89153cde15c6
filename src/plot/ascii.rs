//! ASCII plotting of a stored series for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - series line: `-`, broken wherever the series has missing values
//! - isolated observations (no neighbour on either side): `o`

use chrono::NaiveDate;

/// Render `series` (date-sorted) on a `width` × `height` character grid.
pub fn render_series_plot(
    name: &str,
    series: &[(NaiveDate, Option<f64>)],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (Some(&(first, _)), Some(&(last, _))) = (series.first(), series.last()) else {
        return format!("Plot: {name} | no data\n");
    };

    // x is days since the first date; missing values split the line.
    let mut segments: Vec<Vec<(f64, f64)>> = vec![Vec::new()];
    for &(date, value) in series {
        match value {
            Some(y) => {
                let x = (date - first).num_days() as f64;
                if let Some(seg) = segments.last_mut() {
                    seg.push((x, y));
                }
            }
            None => {
                if segments.last().is_some_and(|s| !s.is_empty()) {
                    segments.push(Vec::new());
                }
            }
        }
    }

    let Some((y_min, y_max)) = y_range(&segments) else {
        return format!("Plot: {name} | {first} .. {last} | no values\n");
    };
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);
    let t_min = 0.0;
    let t_max = ((last - first).num_days() as f64).max(1.0);

    let mut grid = vec![vec![' '; width]; height];
    for seg in &segments {
        match seg.as_slice() {
            [] => {}
            [(t, y)] => {
                let x = map_x(*t, t_min, t_max, width);
                let yy = map_y(*y, y_min, y_max, height);
                grid[yy][x] = 'o';
            }
            _ => draw_curve(&mut grid, seg, t_min, t_max, y_min, y_max),
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {name} | {first} .. {last} | y=[{y_min:.2}, {y_max:.2}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn y_range(segments: &[Vec<(f64, f64)>]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in segments.iter().flatten() {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    if min_y.is_finite() && max_y.is_finite() {
        Some((min_y, max_y))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(t: f64, t_min: f64, t_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((t - t_min) / (t_max - t_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], t_min: f64, t_max: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(t, y) in curve {
        let x = map_x(t, t_min, t_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let series = vec![
            (d(2021, 1, 31), Some(100.0)),
            (d(2021, 2, 28), Some(100.0)),
            (d(2021, 3, 31), Some(110.0)),
        ];
        let txt = render_series_plot("GDP", &series, 10, 5);
        let expected = concat!(
            "Plot: GDP | 2021-01-31 .. 2021-03-31 | y=[99.50, 110.50]\n",
            "         -\n",
            "        - \n",
            "      --  \n",
            "     -    \n",
            "-----     \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn gaps_break_the_line() {
        let series = vec![
            (d(2021, 1, 31), Some(1.0)),
            (d(2021, 2, 28), None),
            (d(2021, 3, 31), Some(2.0)),
        ];
        let txt = render_series_plot("X", &series, 10, 5);
        let body: String = txt.lines().skip(1).collect();
        assert_eq!(body.matches('o').count(), 2);
        assert!(!body.contains('-'));
    }

    #[test]
    fn empty_and_all_null_series() {
        assert_eq!(render_series_plot("X", &[], 10, 5), "Plot: X | no data\n");
        let txt = render_series_plot("X", &[(d(2021, 1, 31), None)], 10, 5);
        assert!(txt.ends_with("no values\n"));
    }
}
