use ndarray::Array3;
use neuroimport::{advance_lines_with_counter, create_lines, Canvas, Surface};
use std::error::Error;
use std::f64::consts::PI;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // Three spirals in 3-D, 200 samples each
    let num_samples = 200;
    let sample_rate = 100.0;
    let trajectories = Array3::from_shape_fn((3, 3, num_samples), |(line, dim, t)| {
        let phase = 2.0 * PI * t as f64 / 50.0 + line as f64;
        let radius = 1.0 + line as f64;
        match dim {
            0 => radius * phase.cos(),
            1 => radius * phase.sin(),
            _ => t as f64 / num_samples as f64,
        }
    });
    let times: Vec<f64> = (0..num_samples).map(|t| t as f64 / sample_rate).collect();

    let mut canvas = Canvas::new();
    let mut handles = create_lines(&mut canvas, trajectories.view())?;
    handles.push(canvas.create_label(""));

    // Show a trailing window of 25 samples once enough samples are available
    for frame in 1..num_samples {
        let window = (frame >= 25).then_some(25);
        advance_lines_with_counter(
            &mut canvas,
            frame,
            trajectories.view(),
            &handles,
            "t = %.2f s",
            &times,
            window,
        )?;

        if frame % 50 == 0 {
            let line = canvas.line(handles[0]).ok_or("missing line")?;
            println!(
                "{}: {} points, last at ({:.2}, {:.2})",
                canvas.label(handles[3]).unwrap_or(""),
                line.len(),
                line.xs.last().copied().unwrap_or(0.0),
                line.ys.last().copied().unwrap_or(0.0)
            );
        }
    }

    Ok(())
}
