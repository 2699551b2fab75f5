use chrono::{DateTime, Utc};
use crate::telemetry::{Metric, SampleWindow};
/// Time-ordered values of a single metric.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSeries {
    pub metric: Metric,
    pub points: Vec<(DateTime<Utc>, f64)>,
}
impl MetricSeries {
    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|(_, v)| *v)
    }
}
#[derive(Clone, Debug, PartialEq)]
pub struct EventMarker {
    pub timestamp: DateTime<Utc>,
    pub label: String,
}
/// Read-only derivations over the current window. Nothing is cached: every
/// call walks the window again.
pub struct Projection<'a> {
    window: &'a SampleWindow,
}
impl<'a> Projection<'a> {
    pub fn new(window: &'a SampleWindow) -> Self {
        Self { window }
    }
    pub fn series_for(&self, metric: Metric) -> MetricSeries {
        let points = self
            .window
            .all()
            .filter_map(|s| metric.value(s).map(|v| (s.timestamp, v)))
            .collect();
        MetricSeries { metric, points }
    }
    pub fn events(&self) -> Vec<EventMarker> {
        self.window
            .all()
            .filter_map(|s| {
                s.event.as_ref().map(|label| EventMarker {
                    timestamp: s.timestamp,
                    label: label.clone(),
                })
            })
            .collect()
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Sample;
    use chrono::TimeZone;
    fn at(sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, sec).unwrap()
    }
    #[test]
    fn empty_window_projects_to_empty_views() {
        let window = SampleWindow::with_capacity(4);
        let projection = Projection::new(&window);
        for metric in Metric::ALL {
            assert!(projection.series_for(metric).points.is_empty());
        }
        assert!(projection.events().is_empty());
    }
    #[test]
    fn absent_values_are_skipped_not_zeroed() {
        let mut window = SampleWindow::with_capacity(8);
        let mut first = Sample::at(at(1));
        first.heart_rate = Some(70.0);
        let second = Sample::at(at(2));
        let mut third = Sample::at(at(3));
        third.heart_rate = Some(0.0);
        window.append(first);
        window.append(second);
        window.append(third);
        let series = Projection::new(&window).series_for(Metric::HeartRate);
        assert_eq!(series.points, vec![(at(1), 70.0), (at(3), 0.0)]);
        assert!(series.points.iter().all(|(ts, _)| *ts != at(2)));
    }
    #[test]
    fn series_keep_arrival_order() {
        let mut window = SampleWindow::with_capacity(8);
        for (sec, rr) in [(1, 20.0), (2, 22.0), (3, 21.0)] {
            let mut sample = Sample::at(at(sec));
            sample.respiration_rate = Some(rr);
            window.append(sample);
        }
        let series = Projection::new(&window).series_for(Metric::RespirationRate);
        let stamps: Vec<_> = series.points.iter().map(|(ts, _)| *ts).collect();
        assert_eq!(stamps, vec![at(1), at(2), at(3)]);
        assert_eq!(series.last_value(), Some(21.0));
    }
    #[test]
    fn events_carry_their_own_timestamps() {
        let mut window = SampleWindow::with_capacity(8);
        window.append(Sample::at(at(1)));
        let mut alert = Sample::at(at(5));
        alert.event = Some("apnea".into());
        window.append(alert);
        let events = Projection::new(&window).events();
        assert_eq!(
            events,
            vec![EventMarker {
                timestamp: at(5),
                label: "apnea".into()
            }]
        );
    }
    #[test]
    fn projection_sees_appends_between_calls() {
        let mut window = SampleWindow::with_capacity(8);
        let mut sample = Sample::at(at(1));
        sample.h2s_level = Some(0.1);
        window.append(sample.clone());
        assert_eq!(Projection::new(&window).series_for(Metric::H2sLevel).points.len(), 1);
        sample.timestamp = at(2);
        window.append(sample);
        assert_eq!(Projection::new(&window).series_for(Metric::H2sLevel).points.len(), 2);
    }
}
