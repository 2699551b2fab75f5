use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use crate::render::ChartView;
use crate::telemetry::error::ViewerError;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub background: RGBColor,
    pub line: RGBColor,
    pub marker: RGBColor,
    pub text: bool,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            background: RGBColor(10, 10, 15),
            line: CYAN,
            marker: RGBColor(255, 165, 0),
            text: true,
        }
    }
}
/// Draws a chart view into an in-memory PNG at the view's own size.
pub fn render_chart_png(view: &ChartView, style: &PlotStyle) -> Result<Vec<u8>, ViewerError> {
    if view.is_empty() {
        return Err(ViewerError::Plot(format!(
            "{} chart has nothing to draw",
            view.metric.key()
        )));
    }
    let width = view.width.round().max(1.0) as u32;
    let height = view.height.round().max(1.0) as u32;
    let mut buffer = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&style.background)?;
        let (x_range, y_range) = bounds(view);
        let mut builder = ChartBuilder::on(&root);
        builder.margin(8);
        // Text needs system fonts; headless exports can switch it off.
        if style.text {
            builder
                .caption(view.title(), ("sans-serif", 16).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 45)
                .set_label_area_size(LabelAreaPosition::Bottom, 30);
        }
        let mut chart = builder.build_cartesian_2d(x_range, y_range)?;
        if style.text {
            chart
                .configure_mesh()
                .x_desc("time (s)")
                .y_desc(view.metric.unit())
                .axis_desc_style(("sans-serif", 12).into_font().color(&WHITE))
                .label_style(("sans-serif", 11).into_font().color(&WHITE))
                .light_line_style(&WHITE.mix(0.1))
                .draw()?;
        }
        let line = style.line;
        chart.draw_series(LineSeries::new(
            view.points.iter().map(|p| (p[0], p[1])),
            &line,
        ))?;
        let marker = style.marker;
        chart.draw_series(
            view.markers
                .iter()
                .map(|m| Circle::new((m.x, m.y), 4, marker.filled())),
        )?;
        if style.text {
            chart.draw_series(view.markers.iter().map(|m| {
                EmptyElement::at((m.x, m.y))
                    + Text::new(
                        m.label.clone(),
                        (6, -14),
                        ("sans-serif", 11).into_font().color(&marker),
                    )
            }))?;
        }
        root.present()?;
    }
    encode_png(&buffer, width, height)
}
fn bounds(view: &ChartView) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let xs = view
        .points
        .iter()
        .map(|p| p[0])
        .chain(view.markers.iter().map(|m| m.x));
    let ys = view
        .points
        .iter()
        .map(|p| p[1])
        .chain(view.markers.iter().map(|m| m.y));
    let (x_min, x_max) = min_max(xs);
    let (y_min, y_max) = min_max(ys);
    // A single point or a flat line still needs a non-zero axis.
    let x_range = if (x_max - x_min).abs() < f64::EPSILON {
        (x_min - 1.0)..(x_max + 1.0)
    } else {
        x_min..x_max
    };
    let pad = ((y_max - y_min) * 0.1).max(0.5);
    (x_range, (y_min - pad)..(y_max + pad))
}
fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)))
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ViewerError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| ViewerError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
