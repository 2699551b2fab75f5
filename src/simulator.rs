// src/simulator.rs
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;
use chrono::{DateTime, Utc};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::stream::{Connector, EventSink, Link, LinkCommand, LinkRequest, WorkerLink};
use crate::telemetry::{ViewerError, WireFrame};
use crate::types::StreamEventKind;

/// Ticks between synthetic events.
const EVENT_EVERY: u64 = 30;
const SIM_EVENT_LABEL: &str = "poop";

/// Synthetic device producing the same JSON frames the backend relays.
pub struct SimDevice {
    device_id: String,
    tick: u64,
    rng: StdRng,
}

impl SimDevice {
    pub fn new(device_id: impl Into<String>, seed: u64) -> Self {
        Self {
            device_id: device_id.into(),
            tick: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Frames for one tick: always a reading, plus an event-only frame every 30 ticks.
    pub fn next_frames(&mut self, now: DateTime<Utc>) -> Vec<WireFrame> {
        let t = self.tick as f64;
        let ts = Some(now.to_rfc3339());
        let mut frames = vec![WireFrame {
            device_id: Some(self.device_id.clone()),
            ts: ts.clone(),
            respiration_rate: Some(24.0 + 2.0 * (t / 10.0).sin()),
            heart_rate: Some(120.0 + 5.0 * (t / 7.0).sin()),
            skin_temp_c: Some(35.4 + 0.2 * (t / 19.0).sin()),
            ambient_temp_c: Some(22.5),
            h2s_level: Some((0.1 + 0.02 * self.jitter()).max(0.0)),
            noise_db: Some((38.0 + 3.0 * self.jitter()).max(30.0)),
            presence: Some(true),
            event: None,
        }];
        if self.tick != 0 && self.tick % EVENT_EVERY == 0 {
            frames.push(WireFrame {
                device_id: Some(self.device_id.clone()),
                ts,
                event: Some(SIM_EVENT_LABEL.to_owned()),
                ..WireFrame::default()
            });
        }
        self.tick += 1;
        frames
    }

    fn jitter(&mut self) -> f64 {
        // Sum of uniforms: a cheap bell curve with unit-ish spread.
        (0..3).map(|_| self.rng.gen_range(-1.0..1.0)).sum::<f64>()
    }
}

pub struct SimConnector {
    period: Duration,
    seed: u64,
}

impl SimConnector {
    pub fn new(period: Duration) -> Self {
        Self { period, seed: 0x5EED }
    }
}

impl Connector for SimConnector {
    fn open(
        &mut self,
        request: &LinkRequest,
        sink: EventSink,
    ) -> Result<Box<dyn Link>, ViewerError> {
        let period = self.period;
        let mut device = SimDevice::new(request.device_id.clone(), self.seed);
        self.seed = self.seed.wrapping_add(1);
        let id = sink.link();
        let link = WorkerLink::spawn(id, format!("sim-link-{}", id.0), move |commands| {
            info!("simulated link {} open", id.0);
            sink.emit(StreamEventKind::Opened);
            let code = loop {
                match commands.recv_timeout(period) {
                    Ok(LinkCommand::Close(code)) => break Some(code),
                    Err(RecvTimeoutError::Disconnected) => break None,
                    Err(RecvTimeoutError::Timeout) => {
                        for frame in device.next_frames(Utc::now()) {
                            match serde_json::to_string(&frame) {
                                Ok(text) => {
                                    sink.emit(StreamEventKind::Frame(text));
                                }
                                Err(err) => debug!("could not encode simulated frame: {err}"),
                            }
                        }
                    }
                }
            };
            sink.emit(StreamEventKind::Closed {
                code,
                reason: "simulation stopped".to_owned(),
            });
        })?;
        Ok(Box::new(link))
    }
}
