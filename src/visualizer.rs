// src/visualizer.rs
use eframe::egui;
use egui::{Color32, RichText, Vec2};
use egui_plot::{Line, Plot, PlotPoint, PlotPoints, Points, Text};
use crate::render::ChartView;

const LINE_COLOR: Color32 = Color32::from_rgb(0, 255, 255);
const MARKER_COLOR: Color32 = Color32::from_rgb(255, 165, 0);
const MUTED: Color32 = Color32::from_rgb(140, 140, 140);

/// One metric tile: small caption, large value.
pub fn draw_indicator(ui: &mut egui::Ui, caption: &str, unit: &str, value: &str) {
    ui.group(|ui| {
        ui.set_min_size(Vec2::new(120.0, 48.0));
        ui.vertical(|ui| {
            ui.label(RichText::new(caption).small().color(MUTED));
            ui.horizontal(|ui| {
                ui.label(RichText::new(value).size(22.0).strong());
                if !unit.is_empty() {
                    ui.label(RichText::new(unit).small().color(MUTED));
                }
            });
        });
    });
}

/// Draws a chart view; an empty view gets a placeholder box instead of axes.
pub fn draw_chart(ui: &mut egui::Ui, view: &ChartView) {
    ui.label(RichText::new(view.title()).strong());
    if view.is_empty() {
        let (rect, _) = ui.allocate_exact_size(
            Vec2::new(view.width, view.height),
            egui::Sense::hover(),
        );
        ui.painter().rect_stroke(
            rect,
            egui::Rounding::same(4.0),
            egui::Stroke::new(1.0, Color32::from_rgb(60, 60, 60)),
        );
        ui.painter().text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            "no data yet",
            egui::FontId::proportional(14.0),
            MUTED,
        );
        return;
    }
    Plot::new(("chart", view.metric.key()))
        .width(view.width)
        .height(view.height)
        .allow_scroll(false)
        .x_axis_label("time (s)")
        .y_axis_label(view.metric.unit())
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(PlotPoints::new(view.points.clone()))
                    .name(view.metric.label())
                    .color(LINE_COLOR),
            );
            if !view.markers.is_empty() {
                let spots: Vec<[f64; 2]> = view.markers.iter().map(|m| [m.x, m.y]).collect();
                plot_ui.points(
                    Points::new(PlotPoints::new(spots))
                        .radius(4.0)
                        .color(MARKER_COLOR)
                        .name("events"),
                );
                for marker in &view.markers {
                    plot_ui.text(
                        Text::new(
                            PlotPoint::new(marker.x, marker.y),
                            RichText::new(&marker.label).color(MARKER_COLOR),
                        )
                        .anchor(egui::Align2::LEFT_BOTTOM),
                    );
                }
            }
        });
}
