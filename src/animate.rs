use ndarray::{s, ArrayView2, ArrayView3};
use std::ops::Range;

use crate::types::RenderError;

/// Marker drawn at every point of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Marker {
    #[default]
    None,
    Circle,
    Point,
    Square,
}

/// Drawing operations needed to animate trajectories.
///
/// Handles are owned by the surface; lines and labels share one handle type.
/// Depth is set separately from x/y because 2-D line APIs cannot carry a
/// third axis.
pub trait Surface {
    type Handle: Copy;

    fn create_line(&mut self, xs: &[f64], ys: &[f64], zs: Option<&[f64]>) -> Self::Handle;
    fn create_label(&mut self, text: &str) -> Self::Handle;
    fn set_data(&mut self, handle: Self::Handle, xs: &[f64], ys: &[f64]);
    fn set_depth(&mut self, handle: Self::Handle, zs: &[f64]);
    fn set_marker(&mut self, handle: Self::Handle, marker: Marker);
    fn set_text(&mut self, handle: Self::Handle, text: &str);
}

/// Number of spatial dimensions of a `[lines, dims, samples]` bundle
fn dimensions(trajectories: &ArrayView3<'_, f64>) -> Result<usize, RenderError> {
    match trajectories.dim().1 {
        d @ (2 | 3) => Ok(d),
        d => Err(RenderError::UnsupportedDimension(d)),
    }
}

/// Creates one line per trajectory, each showing only its first sample.
///
/// `trajectories` has shape `[lines, dims, samples]` with 2 or 3 dims.
/// Handles are returned in trajectory order.
pub fn create_lines<S: Surface>(
    surface: &mut S,
    trajectories: ArrayView3<'_, f64>,
) -> Result<Vec<S::Handle>, RenderError> {
    let dims = dimensions(&trajectories)?;
    let first = trajectories.dim().2.min(1);

    Ok(trajectories
        .outer_iter()
        .map(|trajectory| {
            let xs = trajectory.slice(s![0, ..first]).to_vec();
            let ys = trajectory.slice(s![1, ..first]).to_vec();
            let zs = (dims == 3).then(|| trajectory.slice(s![2, ..first]).to_vec());
            surface.create_line(&xs, &ys, zs.as_deref())
        })
        .collect())
}

/// Samples shown at `frame`: `[0, frame)`, or the trailing `window` samples.
///
/// A window longer than `frame` is reported instead of wrapped or clamped.
pub fn sample_range(
    frame: usize,
    samples: usize,
    window: Option<usize>,
) -> Result<Range<usize>, RenderError> {
    if frame > samples {
        return Err(RenderError::FrameOutOfRange { frame, samples });
    }
    match window {
        None => Ok(0..frame),
        Some(window) if window > frame => Err(RenderError::WindowExceedsFrame { frame, window }),
        Some(window) => Ok(frame - window..frame),
    }
}

/// Updates every line to show its trajectory up to `frame`.
///
/// Lines and trajectories are paired in order; extra handles are left alone.
/// The circle marker is set again on every call. Nothing is drawn if the
/// arguments are invalid.
pub fn advance_lines<'h, S: Surface>(
    surface: &mut S,
    frame: usize,
    trajectories: ArrayView3<'_, f64>,
    handles: &'h [S::Handle],
    window: Option<usize>,
) -> Result<&'h [S::Handle], RenderError> {
    let dims = dimensions(&trajectories)?;
    let range = sample_range(frame, trajectories.dim().2, window)?;

    update_lines(surface, dims, &trajectories, handles, range);
    Ok(handles)
}

/// Like [`advance_lines`], with the last handle treated as a text label.
///
/// The label is set to `template` formatted with `counter_values[frame]`,
/// using printf-style conversions (`%d`, `%i`, `%f`, `%.2f`, `%s`, `%%`).
/// `handles` must hold one line per trajectory plus the label.
pub fn advance_lines_with_counter<'h, S: Surface>(
    surface: &mut S,
    frame: usize,
    trajectories: ArrayView3<'_, f64>,
    handles: &'h [S::Handle],
    template: &str,
    counter_values: &[f64],
    window: Option<usize>,
) -> Result<&'h [S::Handle], RenderError> {
    let dims = dimensions(&trajectories)?;
    let range = sample_range(frame, trajectories.dim().2, window)?;

    let num_lines = trajectories.dim().0;
    if handles.len() != num_lines + 1 {
        return Err(RenderError::HandleCount {
            expected: num_lines + 1,
            found: handles.len(),
        });
    }
    let value = counter_values
        .get(frame)
        .copied()
        .ok_or(RenderError::CounterOutOfRange {
            frame,
            len: counter_values.len(),
        })?;
    let text = format_counter(template, value)?;

    let (label, lines) = match handles.split_last() {
        Some(split) => split,
        None => return Ok(handles),
    };
    update_lines(surface, dims, &trajectories, lines, range);
    surface.set_text(*label, &text);

    Ok(handles)
}

fn update_lines<S: Surface>(
    surface: &mut S,
    dims: usize,
    trajectories: &ArrayView3<'_, f64>,
    handles: &[S::Handle],
    range: Range<usize>,
) {
    for (&handle, trajectory) in handles.iter().zip(trajectories.outer_iter()) {
        let shown: ArrayView2<'_, f64> = trajectory.slice(s![.., range.clone()]);
        surface.set_data(handle, &shown.row(0).to_vec(), &shown.row(1).to_vec());
        if dims == 3 {
            surface.set_depth(handle, &shown.row(2).to_vec());
        }
        surface.set_marker(handle, Marker::Circle);
    }
}

/// Formats `value` into a printf-style template with exactly one conversion
pub fn format_counter(template: &str, value: f64) -> Result<String, RenderError> {
    let invalid = || RenderError::Template(template.to_string());

    let mut out = String::with_capacity(template.len() + 8);
    let mut conversions = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut width = String::new();
        while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
            width.push(d);
        }
        let mut precision = None;
        if chars.next_if_eq(&'.').is_some() {
            let mut digits = String::new();
            while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                digits.push(d);
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }
        let width = if width.is_empty() {
            0
        } else {
            width.parse::<usize>().map_err(|_| invalid())?
        };

        let formatted = match chars.next().ok_or_else(invalid)? {
            'd' | 'i' => format!("{:width$}", value.trunc() as i64, width = width),
            'f' => format!(
                "{:width$.prec$}",
                value,
                width = width,
                prec = precision.unwrap_or(6)
            ),
            's' => format!("{:>width$}", shortest_repr(value), width = width),
            _ => return Err(invalid()),
        };
        out.push_str(&formatted);
        conversions += 1;
    }

    if conversions != 1 {
        return Err(invalid());
    }
    Ok(out)
}

/// Shortest round-trip text of `value`, in exponent form below 1e-4 or from 1e16 on.
///
/// Matches how `%s` prints floats in the legacy templates: `40.0`, `0.125`,
/// `1e+20`, `1.5e-05`.
fn shortest_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    // `{:e}` gives the shortest round-trip digits, e.g. "1.5e-5"
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if value == 0.0 || (-4..16).contains(&exponent) {
        let plain = value.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}
