// src/session.rs
use std::time::{Duration, Instant};
use log::{debug, info, warn};
use crate::config::{ReconnectPolicy, ViewerConfig};
use crate::render::RenderCoordinator;
use crate::stream::{Connector, RepaintHook, StreamClient};
use crate::telemetry::{decode_frame, Decoded, SampleWindow, ViewerError};
use crate::types::{LinkId, LinkState, StreamEvent, StreamEventKind};

/// Single owner of everything one viewing session needs: the link, the
/// window and the rendered output. All mutation happens through `handle`.
pub struct Session<C: Connector> {
    client: StreamClient<C>,
    window: SampleWindow,
    render: RenderCoordinator,
    credential: String,
    device_id: Option<String>,
    state: LinkState,
    reconnect: ReconnectPolicy,
    reconnect_at: Option<Instant>,
    accepted: u64,
    rejected: u64,
}

impl<C: Connector> Session<C> {
    pub fn new(connector: C, config: &ViewerConfig) -> Self {
        Self {
            client: StreamClient::new(connector),
            window: SampleWindow::with_capacity(config.max_points),
            render: RenderCoordinator::new(config.chart_layout(), config.time_display),
            credential: config.token.clone(),
            device_id: None,
            state: LinkState::Disconnected,
            reconnect: config.reconnect,
            reconnect_at: None,
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn set_repaint_hook(&mut self, hook: RepaintHook) {
        self.client.set_repaint_hook(hook);
    }

    /// Starts a fresh session for `device_id`, replacing any current link.
    pub fn connect(&mut self, device_id: &str) -> Result<LinkId, ViewerError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(ViewerError::EmptyDeviceId);
        }
        self.reconnect_at = None;
        let link = match self.client.connect(device_id, &self.credential) {
            Ok(link) => link,
            Err(err) => {
                self.state = LinkState::Disconnected;
                return Err(err);
            }
        };
        self.window = SampleWindow::with_capacity(self.window.capacity());
        self.render.reset();
        self.device_id = Some(device_id.to_owned());
        self.state = LinkState::Connecting;
        self.accepted = 0;
        self.rejected = 0;
        Ok(link)
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
        self.reconnect_at = None;
        self.state = LinkState::Disconnected;
    }

    /// Drains every pending stream event, oldest first. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.client.try_next() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    pub fn handle(&mut self, event: StreamEvent) {
        if self.client.current() != Some(event.link) {
            debug!("ignoring event from stale link {}", event.link.0);
            return;
        }
        match event.kind {
            StreamEventKind::Opened => {
                self.state = LinkState::Open;
            }
            StreamEventKind::Frame(payload) => {
                self.ingest(&payload);
            }
            StreamEventKind::Closed { code, reason } => {
                info!("link {} closed: code {code:?} {reason}", event.link.0);
                self.client.release(event.link);
                self.state = LinkState::Disconnected;
                self.schedule_reconnect(Instant::now());
            }
        }
    }

    /// Applies the reconnect policy once its delay has elapsed.
    pub fn tick(&mut self, now: Instant) {
        let Some(at) = self.reconnect_at else {
            return;
        };
        if now < at {
            return;
        }
        self.reconnect_at = None;
        let Some(device_id) = self.device_id.clone() else {
            return;
        };
        info!("reconnecting to '{device_id}'");
        match self.client.connect(&device_id, &self.credential) {
            Ok(_) => self.state = LinkState::Connecting,
            Err(err) => warn!("reconnect to '{device_id}' failed: {err}"),
        }
    }

    fn schedule_reconnect(&mut self, now: Instant) {
        if let ReconnectPolicy::After { secs } = self.reconnect {
            if self.device_id.is_some() {
                self.reconnect_at = Some(now + Duration::from_secs(secs));
            }
        }
    }

    fn ingest(&mut self, payload: &str) {
        match decode_frame(payload) {
            Decoded::Sample(sample) => {
                self.accepted += 1;
                self.window.append(sample);
                if let Some(latest) = self.window.latest() {
                    self.render.on_sample(latest, &self.window);
                }
            }
            Decoded::Rejected(rejection) => {
                self.rejected += 1;
                debug!("dropping frame: {rejection:?}");
            }
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn render(&self) -> &RenderCoordinator {
        &self.render
    }

    pub fn set_viewport_width(&mut self, width: f32) {
        self.render.set_viewport_width(width);
    }

    pub fn reconnect_pending(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Accepted and rejected frame counts for the current session.
    pub fn frame_counts(&self) -> (u64, u64) {
        (self.accepted, self.rejected)
    }

    /// Rebuilds the charts from the current window, e.g. after a resize.
    pub fn redraw(&mut self) {
        self.render.redraw_charts(&self.window);
    }

    #[cfg(test)]
    pub fn connector(&self) -> &C {
        self.client.connector()
    }

    pub fn connector_mut(&mut self) -> &mut C {
        self.client.connector_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PLACEHOLDER;
    use crate::stream::{EventSink, Link, LinkRequest};
    use crate::telemetry::{Metric, Projection};
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Script {
        log: Vec<String>,
        live: usize,
    }

    #[derive(Default)]
    struct ScriptedConnector {
        script: Rc<RefCell<Script>>,
        sinks: Vec<EventSink>,
    }

    struct ScriptedLink {
        id: LinkId,
        script: Rc<RefCell<Script>>,
    }

    impl Connector for ScriptedConnector {
        fn open(
            &mut self,
            request: &LinkRequest,
            sink: EventSink,
        ) -> Result<Box<dyn Link>, ViewerError> {
            let id = sink.link();
            {
                let mut script = self.script.borrow_mut();
                script.log.push(format!("open {} {}", id.0, request.device_id));
                script.live += 1;
            }
            self.sinks.push(sink);
            Ok(Box::new(ScriptedLink {
                id,
                script: self.script.clone(),
            }))
        }
    }

    impl Link for ScriptedLink {
        fn id(&self) -> LinkId {
            self.id
        }

        fn close(&mut self, code: u16) {
            let mut script = self.script.borrow_mut();
            script.log.push(format!("close {} {code}", self.id.0));
            script.live -= 1;
        }
    }

    fn session() -> Session<ScriptedConnector> {
        Session::new(ScriptedConnector::default(), &ViewerConfig::default())
    }

    fn sink(session: &Session<ScriptedConnector>) -> EventSink {
        session.connector().sinks.last().cloned().unwrap()
    }

    fn open(session: &mut Session<ScriptedConnector>, device: &str) -> EventSink {
        session.connect(device).unwrap();
        let sink = sink(session);
        sink.emit(StreamEventKind::Opened);
        session.pump();
        sink
    }

    fn feed(session: &mut Session<ScriptedConnector>, sink: &EventSink, payload: &str) {
        sink.emit(StreamEventKind::Frame(payload.to_owned()));
        session.pump();
    }

    #[test]
    fn demo_scenario_updates_indicators_charts_and_log() {
        let mut session = session();
        let sink = open(&mut session, "demo-1");
        assert_eq!(session.state(), LinkState::Open);

        feed(&mut session, &sink, r#"{"ts":"2024-01-01T00:00:00Z","heart_rate":72}"#);
        let render = session.render();
        assert_eq!(render.indicators().reading(Metric::HeartRate), "72");
        assert_eq!(render.indicators().reading(Metric::RespirationRate), PLACEHOLDER);
        assert_eq!(render.chart(Metric::HeartRate).unwrap().points.len(), 1);

        feed(&mut session, &sink, r#"{"ts":"2024-01-01T00:00:05Z","event":"apnea"}"#);
        let render = session.render();
        let log: Vec<&str> = render.event_log().collect();
        assert_eq!(log, vec!["00:00:05 — apnea"]);
        let rr = render.chart(Metric::RespirationRate).unwrap();
        assert_eq!(rr.markers.len(), 1);
        assert_eq!(
            rr.markers[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap()
        );
        assert_eq!(rr.markers[0].label, "apnea");
        assert_eq!(session.frame_counts(), (2, 0));
    }

    #[test]
    fn connecting_twice_leaves_exactly_one_live_link() {
        let mut session = session();
        session.connect("demo-1").unwrap();
        session.connect("demo-1").unwrap();
        let script = session.connector().script.borrow();
        assert_eq!(
            script.log,
            vec!["open 1 demo-1", "close 1 1000", "open 2 demo-1"]
        );
        assert_eq!(script.live, 1);
    }

    #[test]
    fn empty_device_id_is_rejected_without_side_effects() {
        let mut session = session();
        let sink = open(&mut session, "demo-1");
        feed(&mut session, &sink, r#"{"ts":"2024-01-01T00:00:00Z","heart_rate":72}"#);
        assert!(matches!(
            session.connect("   "),
            Err(ViewerError::EmptyDeviceId)
        ));
        assert_eq!(session.state(), LinkState::Open);
        assert_eq!(session.window().len(), 1);
        assert_eq!(session.device_id(), Some("demo-1"));
        assert_eq!(session.connector().script.borrow().log.len(), 1);
    }

    #[test]
    fn undecodable_frames_change_nothing() {
        let mut session = session();
        let sink = open(&mut session, "demo-1");
        feed(&mut session, &sink, r#"{"ts":"2024-01-01T00:00:00Z","event":"cry"}"#);
        for junk in ["ping", "{", r#"{"heart_rate":80}"#, r#"{"ts":"soon"}"#] {
            feed(&mut session, &sink, junk);
        }
        assert_eq!(session.window().len(), 1);
        assert_eq!(session.render().event_count(), 1);
        assert_eq!(session.state(), LinkState::Open);
        assert_eq!(session.connector().script.borrow().live, 1);
        assert_eq!(session.frame_counts(), (1, 4));
    }

    #[test]
    fn series_follow_arrival_order() {
        let mut session = session();
        let sink = open(&mut session, "demo-1");
        for (sec, rr) in [(1, 20), (2, 21), (3, 19)] {
            feed(
                &mut session,
                &sink,
                &format!(r#"{{"ts":"2024-01-01T00:00:0{sec}Z","respiration_rate":{rr}}}"#),
            );
        }
        let series = Projection::new(session.window()).series_for(Metric::RespirationRate);
        let seconds: Vec<u32> = series
            .points
            .iter()
            .map(|(ts, _)| chrono::Timelike::second(ts))
            .collect();
        assert_eq!(seconds, vec![1, 2, 3]);
    }

    #[test]
    fn window_stays_bounded_under_a_long_stream() {
        let config = ViewerConfig {
            max_points: 3,
            ..ViewerConfig::default()
        };
        let mut session = Session::new(ScriptedConnector::default(), &config);
        let sink = open(&mut session, "demo-1");
        for sec in 0..10 {
            feed(
                &mut session,
                &sink,
                &format!(r#"{{"ts":"2024-01-01T00:00:0{sec}Z","heart_rate":{sec}}}"#),
            );
        }
        let kept: Vec<Option<f64>> = session.window().all().map(|s| s.heart_rate).collect();
        assert_eq!(kept, vec![Some(7.0), Some(8.0), Some(9.0)]);
        assert_eq!(session.render().chart(Metric::HeartRate).unwrap().points.len(), 3);
    }

    #[test]
    fn events_from_a_replaced_link_are_ignored() {
        let mut session = session();
        let old = open(&mut session, "demo-1");
        let new = open(&mut session, "demo-2");
        feed(&mut session, &old, r#"{"ts":"2024-01-01T00:00:00Z","heart_rate":60}"#);
        old.emit(StreamEventKind::Closed {
            code: Some(1000),
            reason: String::new(),
        });
        session.pump();
        assert_eq!(session.window().len(), 0);
        assert_eq!(session.state(), LinkState::Open);
        feed(&mut session, &new, r#"{"ts":"2024-01-01T00:00:01Z","heart_rate":61}"#);
        assert_eq!(session.window().len(), 1);
        assert_eq!(session.device_id(), Some("demo-2"));
    }

    #[test]
    fn reconnecting_starts_with_an_empty_window() {
        let mut session = session();
        let sink = open(&mut session, "demo-1");
        feed(&mut session, &sink, r#"{"ts":"2024-01-01T00:00:00Z","event":"cry"}"#);
        session.connect("demo-1").unwrap();
        assert!(session.window().is_empty());
        assert_eq!(session.render().event_count(), 0);
        assert_eq!(session.state(), LinkState::Connecting);
    }

    #[test]
    fn remote_close_without_policy_stays_disconnected() {
        let mut session = session();
        let sink = open(&mut session, "demo-1");
        sink.emit(StreamEventKind::Closed {
            code: Some(1011),
            reason: "server restart".into(),
        });
        session.pump();
        assert_eq!(session.state(), LinkState::Disconnected);
        assert_eq!(session.reconnect_pending(), None);
        session.tick(Instant::now() + Duration::from_secs(3600));
        assert_eq!(session.connector().script.borrow().log.len(), 1);
    }

    #[test]
    fn reconnect_policy_reopens_the_same_device_and_keeps_data() {
        let config = ViewerConfig {
            reconnect: ReconnectPolicy::After { secs: 0 },
            ..ViewerConfig::default()
        };
        let mut session = Session::new(ScriptedConnector::default(), &config);
        let sink = open(&mut session, "demo-1");
        feed(&mut session, &sink, r#"{"ts":"2024-01-01T00:00:00Z","heart_rate":72}"#);
        sink.emit(StreamEventKind::Closed {
            code: None,
            reason: "reset".into(),
        });
        session.pump();
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(session.reconnect_pending().is_some());
        session.tick(Instant::now());
        assert_eq!(session.state(), LinkState::Connecting);
        assert_eq!(session.window().len(), 1);
        assert_eq!(
            session.connector().script.borrow().log,
            vec!["open 1 demo-1", "open 2 demo-1"]
        );
    }

    #[test]
    fn manual_disconnect_cancels_pending_reconnect() {
        let config = ViewerConfig {
            reconnect: ReconnectPolicy::After { secs: 5 },
            ..ViewerConfig::default()
        };
        let mut session = Session::new(ScriptedConnector::default(), &config);
        let sink = open(&mut session, "demo-1");
        sink.emit(StreamEventKind::Closed {
            code: None,
            reason: String::new(),
        });
        session.pump();
        session.disconnect();
        session.tick(Instant::now() + Duration::from_secs(60));
        assert_eq!(session.reconnect_pending(), None);
        assert_eq!(session.connector().script.borrow().log.len(), 1);
    }
}
