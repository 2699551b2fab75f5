// src/render.rs
use std::collections::VecDeque;
use chrono::{DateTime, Local, Utc};
use crate::config::TimeDisplay;
use crate::telemetry::{EventMarker, Metric, MetricSeries, Projection, Sample, SampleWindow};

/// Shown wherever a reading is missing. Never rendered as `0`.
pub const PLACEHOLDER: &str = "–";
/// Room left for the chart column's vertical scrollbar.
const SCROLLBAR_GUTTER: f32 = 16.0;
const MIN_CHART_WIDTH: f32 = 160.0;

pub fn format_reading(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.precision$}"),
        _ => PLACEHOLDER.to_owned(),
    }
}

pub fn format_presence(presence: Option<bool>) -> &'static str {
    match presence {
        Some(true) => "Yes",
        Some(false) => "No",
        None => PLACEHOLDER,
    }
}

pub fn format_clock(ts: DateTime<Utc>, display: TimeDisplay) -> String {
    match display {
        TimeDisplay::Utc => ts.format("%H:%M:%S").to_string(),
        TimeDisplay::Local => ts.with_timezone(&Local).format("%H:%M:%S").to_string(),
    }
}

// 指标面板：每个数值一个格式化字符串
#[derive(Clone, Debug, PartialEq)]
pub struct Indicators {
    readings: Vec<(Metric, String)>,
    presence: &'static str,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            readings: Metric::ALL
                .iter()
                .map(|m| (*m, PLACEHOLDER.to_owned()))
                .collect(),
            presence: PLACEHOLDER,
        }
    }
}

impl Indicators {
    pub fn from_sample(sample: &Sample) -> Self {
        Self {
            readings: Metric::ALL
                .iter()
                .map(|m| (*m, format_reading(m.value(sample), m.precision())))
                .collect(),
            presence: format_presence(sample.presence),
        }
    }

    #[cfg(test)]
    pub fn reading(&self, metric: Metric) -> &str {
        self.readings
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, text)| text.as_str())
            .unwrap_or(PLACEHOLDER)
    }

    pub fn readings(&self) -> impl Iterator<Item = (Metric, &str)> {
        self.readings.iter().map(|(m, text)| (*m, text.as_str()))
    }

    pub fn presence(&self) -> &str {
        self.presence
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChartLayout {
    pub max_width: f32,
    pub height: f32,
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            max_width: 900.0,
            height: 180.0,
        }
    }
}

impl ChartLayout {
    /// `viewport_width` is the chart column as measured by the shell. The
    /// configured maximum always wins, even below the minimum width.
    pub fn width_for(&self, viewport_width: f32) -> f32 {
        (viewport_width - SCROLLBAR_GUTTER)
            .max(MIN_CHART_WIDTH)
            .min(self.max_width)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartMarker {
    pub timestamp: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub label: String,
}

/// Renderable description of one chart. X values are seconds since `origin`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartView {
    pub metric: Metric,
    pub width: f32,
    pub height: f32,
    pub origin: Option<DateTime<Utc>>,
    pub points: Vec<[f64; 2]>,
    pub markers: Vec<ChartMarker>,
}

impl ChartView {
    pub fn build(series: &MetricSeries, events: &[EventMarker], width: f32, height: f32) -> Self {
        let origin = series
            .points
            .first()
            .map(|(ts, _)| *ts)
            .into_iter()
            .chain(events.first().map(|e| e.timestamp))
            .min();
        let offset = |ts: DateTime<Utc>| {
            origin
                .map(|o| (ts - o).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0)
        };
        let points = series
            .points
            .iter()
            .map(|(ts, v)| [offset(*ts), *v])
            .collect();
        // Markers sit at the latest reading so they stay inside the plotted range.
        let marker_y = series.last_value().unwrap_or(0.0);
        let markers = events
            .iter()
            .map(|e| ChartMarker {
                timestamp: e.timestamp,
                x: offset(e.timestamp),
                y: marker_y,
                label: e.label.clone(),
            })
            .collect();
        Self {
            metric: series.metric,
            width,
            height,
            origin,
            points,
            markers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.markers.is_empty()
    }

    pub fn title(&self) -> String {
        format!("{} ({})", self.metric.label(), self.metric.unit())
    }
}

/// Turns accepted samples into indicator text, chart views and the event log.
pub struct RenderCoordinator {
    indicators: Indicators,
    charts: Vec<ChartView>,
    event_log: VecDeque<String>,
    layout: ChartLayout,
    viewport_width: f32,
    time_display: TimeDisplay,
}

impl RenderCoordinator {
    pub fn new(layout: ChartLayout, time_display: TimeDisplay) -> Self {
        Self {
            indicators: Indicators::default(),
            charts: Vec::new(),
            event_log: VecDeque::new(),
            layout,
            viewport_width: layout.max_width + SCROLLBAR_GUTTER,
            time_display,
        }
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.viewport_width = width;
    }

    pub fn on_sample(&mut self, sample: &Sample, window: &SampleWindow) {
        self.update_indicators(sample);
        self.redraw_charts(window);
        self.log_event(sample);
    }

    pub fn update_indicators(&mut self, sample: &Sample) {
        self.indicators = Indicators::from_sample(sample);
    }

    /// Rebuilds every chart from scratch; the previous views are dropped.
    pub fn redraw_charts(&mut self, window: &SampleWindow) {
        let projection = Projection::new(window);
        let events = projection.events();
        let width = self.layout.width_for(self.viewport_width);
        self.charts = Metric::CHARTED
            .iter()
            .map(|metric| {
                let series = projection.series_for(*metric);
                let markers: &[EventMarker] = if *metric == Metric::RespirationRate {
                    &events
                } else {
                    &[]
                };
                ChartView::build(&series, markers, width, self.layout.height)
            })
            .collect();
    }

    pub fn log_event(&mut self, sample: &Sample) {
        if let Some(label) = &sample.event {
            let entry = format!(
                "{} — {}",
                format_clock(sample.timestamp, self.time_display),
                label
            );
            self.event_log.push_front(entry);
        }
    }

    pub fn reset(&mut self) {
        self.indicators = Indicators::default();
        self.charts.clear();
        self.event_log.clear();
    }

    pub fn indicators(&self) -> &Indicators {
        &self.indicators
    }

    pub fn charts(&self) -> &[ChartView] {
        &self.charts
    }

    pub fn chart(&self, metric: Metric) -> Option<&ChartView> {
        self.charts.iter().find(|c| c.metric == metric)
    }

    /// Most recent entry first.
    pub fn event_log(&self) -> impl Iterator<Item = &str> {
        self.event_log.iter().map(String::as_str)
    }

    pub fn event_count(&self) -> usize {
        self.event_log.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, sec).unwrap()
    }

    #[test]
    fn readings_use_per_metric_precision() {
        let mut sample = Sample::at(at(0));
        sample.respiration_rate = Some(24.4);
        sample.heart_rate = Some(119.6);
        sample.skin_temp_c = Some(35.44);
        sample.h2s_level = Some(0.10049);
        sample.noise_db = Some(38.2);
        let indicators = Indicators::from_sample(&sample);
        assert_eq!(indicators.reading(Metric::RespirationRate), "24");
        assert_eq!(indicators.reading(Metric::HeartRate), "120");
        assert_eq!(indicators.reading(Metric::SkinTemp), "35.4");
        assert_eq!(indicators.reading(Metric::H2sLevel), "0.100");
        assert_eq!(indicators.reading(Metric::NoiseDb), "38");
        assert_eq!(indicators.reading(Metric::AmbientTemp), PLACEHOLDER);
    }

    #[test]
    fn missing_and_zero_are_distinguishable() {
        let mut sample = Sample::at(at(0));
        sample.heart_rate = Some(0.0);
        let indicators = Indicators::from_sample(&sample);
        assert_eq!(indicators.reading(Metric::HeartRate), "0");
        assert_eq!(indicators.reading(Metric::RespirationRate), PLACEHOLDER);
        assert_eq!(format_reading(Some(f64::NAN), 1), PLACEHOLDER);
    }

    #[test]
    fn presence_has_three_states() {
        assert_eq!(format_presence(Some(true)), "Yes");
        assert_eq!(format_presence(Some(false)), "No");
        assert_eq!(format_presence(None), PLACEHOLDER);
        assert_ne!(format_presence(None), format_presence(Some(false)));
    }

    #[test]
    fn chart_width_follows_viewport_up_to_the_cap() {
        let layout = ChartLayout::default();
        assert_eq!(layout.width_for(500.0), 484.0);
        assert_eq!(layout.width_for(2000.0), 900.0);
        assert_eq!(layout.width_for(10.0), MIN_CHART_WIDTH);
    }

    #[test]
    fn configured_cap_wins_over_minimum_width() {
        let layout = ChartLayout {
            max_width: 120.0,
            height: 80.0,
        };
        assert_eq!(layout.width_for(2000.0), 120.0);
        assert_eq!(layout.width_for(10.0), 120.0);
    }

    #[test]
    fn redraw_replaces_views_and_marks_events_on_respiration() {
        let mut window = SampleWindow::with_capacity(16);
        let mut render = RenderCoordinator::new(ChartLayout::default(), TimeDisplay::Utc);
        let mut first = Sample::at(at(0));
        first.respiration_rate = Some(22.0);
        window.append(first);
        let mut alert = Sample::at(at(4));
        alert.event = Some("cough".into());
        window.append(alert);
        render.redraw_charts(&window);
        assert_eq!(render.charts().len(), 4);
        let rr = render.chart(Metric::RespirationRate).unwrap();
        assert_eq!(rr.points, vec![[0.0, 22.0]]);
        assert_eq!(rr.markers.len(), 1);
        assert_eq!(rr.markers[0].x, 4.0);
        assert_eq!(rr.markers[0].y, 22.0);
        assert_eq!(rr.markers[0].label, "cough");
        assert!(render.chart(Metric::HeartRate).unwrap().is_empty());
        render.redraw_charts(&window);
        assert_eq!(render.charts().len(), 4);
    }

    #[test]
    fn event_log_is_newest_first() {
        let mut render = RenderCoordinator::new(ChartLayout::default(), TimeDisplay::Utc);
        let mut a = Sample::at(at(1));
        a.event = Some("first".into());
        let mut b = Sample::at(at(2));
        b.event = Some("second".into());
        render.log_event(&a);
        render.log_event(&Sample::at(at(3)));
        render.log_event(&b);
        let log: Vec<&str> = render.event_log().collect();
        assert_eq!(log, vec!["00:00:02 — second", "00:00:01 — first"]);
    }
}
