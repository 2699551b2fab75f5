use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use crate::render::ChartLayout;
use crate::telemetry::DEFAULT_MAX_POINTS;
use crate::types::ConnectionMode;

/// What the session does after the current link closes on its own.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Stay disconnected until the user connects again.
    #[default]
    Manual,
    /// Reopen the same device after a fixed delay.
    After { secs: u64 },
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeDisplay {
    #[default]
    Utc,
    Local,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub base_url: String,
    pub token: String,
    pub device_id: String,
    pub mode: ConnectionMode,
    pub max_points: usize,
    pub keepalive_secs: u64,
    pub connect_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
    pub chart_max_width: f32,
    pub chart_height: f32,
    pub time_display: TimeDisplay,
    pub sim_period_ms: u64,
    pub export_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://127.0.0.1:8000".to_owned(),
            token: "dev-secret-change-me".to_owned(),
            device_id: "demo-1".to_owned(),
            mode: ConnectionMode::Live,
            max_points: DEFAULT_MAX_POINTS,
            keepalive_secs: 20,
            connect_timeout_secs: 10,
            reconnect: ReconnectPolicy::Manual,
            chart_max_width: 900.0,
            chart_height: 180.0,
            time_display: TimeDisplay::Utc,
            sim_period_ms: 1000,
            export_dir: PathBuf::from("."),
        }
    }
}

impl ViewerConfig {
    /// Reads the optional JSON file, then applies `TELEMETRY_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_json(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("TELEMETRY_BASE_URL") {
            self.base_url = url;
        }
        if let Some(token) = lookup("TELEMETRY_TOKEN") {
            self.token = token;
        }
        if let Some(device) = lookup("TELEMETRY_DEVICE") {
            self.device_id = device;
        }
        if let Some(mode) = lookup("TELEMETRY_MODE") {
            self.mode = match mode.trim().to_ascii_lowercase().as_str() {
                "live" => ConnectionMode::Live,
                "simulation" | "sim" => ConnectionMode::Simulation,
                other => bail!("unknown TELEMETRY_MODE '{other}' (expected live or simulation)"),
            };
        }
        Ok(())
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    /// Bound on the TCP connect and on the upgrade handshake of a live link.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn sim_period(&self) -> Duration {
        Duration::from_millis(self.sim_period_ms.max(10))
    }

    pub fn chart_layout(&self) -> ChartLayout {
        ChartLayout {
            max_width: self.chart_max_width,
            height: self.chart_height,
        }
    }
}
