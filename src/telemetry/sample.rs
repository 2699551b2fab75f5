use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
/// Numeric measurement carried by a telemetry sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    RespirationRate,
    HeartRate,
    SkinTemp,
    AmbientTemp,
    H2sLevel,
    NoiseDb,
}
impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::RespirationRate,
        Metric::HeartRate,
        Metric::SkinTemp,
        Metric::AmbientTemp,
        Metric::H2sLevel,
        Metric::NoiseDb,
    ];
    /// Metrics that get a time-series chart, in display order.
    pub const CHARTED: [Metric; 4] = [
        Metric::RespirationRate,
        Metric::HeartRate,
        Metric::SkinTemp,
        Metric::H2sLevel,
    ];
    pub fn key(self) -> &'static str {
        match self {
            Metric::RespirationRate => "respiration_rate",
            Metric::HeartRate => "heart_rate",
            Metric::SkinTemp => "skin_temp_c",
            Metric::AmbientTemp => "ambient_temp_c",
            Metric::H2sLevel => "h2s_level",
            Metric::NoiseDb => "noise_db",
        }
    }
    pub fn label(self) -> &'static str {
        match self {
            Metric::RespirationRate => "Respiration",
            Metric::HeartRate => "Heart rate",
            Metric::SkinTemp => "Skin temperature",
            Metric::AmbientTemp => "Ambient temperature",
            Metric::H2sLevel => "H₂S",
            Metric::NoiseDb => "Noise",
        }
    }
    pub fn unit(self) -> &'static str {
        match self {
            Metric::RespirationRate => "breaths/min",
            Metric::HeartRate => "bpm",
            Metric::SkinTemp | Metric::AmbientTemp => "°C",
            Metric::H2sLevel => "arb.",
            Metric::NoiseDb => "dB",
        }
    }
    /// Decimal places used by the indicator for this metric.
    pub fn precision(self) -> usize {
        match self {
            Metric::RespirationRate | Metric::HeartRate | Metric::NoiseDb => 0,
            Metric::SkinTemp | Metric::AmbientTemp => 1,
            Metric::H2sLevel => 3,
        }
    }
    pub fn value(self, sample: &Sample) -> Option<f64> {
        match self {
            Metric::RespirationRate => sample.respiration_rate,
            Metric::HeartRate => sample.heart_rate,
            Metric::SkinTemp => sample.skin_temp_c,
            Metric::AmbientTemp => sample.ambient_temp_c,
            Metric::H2sLevel => sample.h2s_level,
            Metric::NoiseDb => sample.noise_db,
        }
    }
}
/// One decoded telemetry point. Absent measurements stay `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub respiration_rate: Option<f64>,
    pub heart_rate: Option<f64>,
    pub skin_temp_c: Option<f64>,
    pub ambient_temp_c: Option<f64>,
    pub h2s_level: Option<f64>,
    pub noise_db: Option<f64>,
    pub presence: Option<bool>,
    pub event: Option<String>,
}
#[cfg(test)]
impl Sample {
    /// Sample with a timestamp and nothing else.
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            respiration_rate: None,
            heart_rate: None,
            skin_temp_c: None,
            ambient_temp_c: None,
            h2s_level: None,
            noise_db: None,
            presence: None,
            event: None,
        }
    }
}
/// Inbound record as it appears on the wire.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiration_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_temp_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_temp_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h2s_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_db: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}
/// Why an inbound frame was not turned into a sample.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    Malformed(String),
    MissingTimestamp,
    BadTimestamp(String),
}
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Sample(Sample),
    Rejected(Rejection),
}
pub fn decode_frame(payload: &str) -> Decoded {
    let frame: WireFrame = match serde_json::from_str(payload) {
        Ok(frame) => frame,
        Err(err) => return Decoded::Rejected(Rejection::Malformed(err.to_string())),
    };
    match frame.into_sample() {
        Ok(sample) => Decoded::Sample(sample),
        Err(rejection) => Decoded::Rejected(rejection),
    }
}
impl WireFrame {
    pub fn into_sample(self) -> Result<Sample, Rejection> {
        let raw_ts = self
            .ts
            .as_deref()
            .map(str::trim)
            .filter(|ts| !ts.is_empty())
            .ok_or(Rejection::MissingTimestamp)?;
        let timestamp =
            parse_timestamp(raw_ts).ok_or_else(|| Rejection::BadTimestamp(raw_ts.to_owned()))?;
        Ok(Sample {
            timestamp,
            respiration_rate: self.respiration_rate,
            heart_rate: self.heart_rate,
            skin_temp_c: self.skin_temp_c,
            ambient_temp_c: self.ambient_temp_c,
            h2s_level: self.h2s_level,
            noise_db: self.noise_db,
            presence: self.presence,
            event: self.event.filter(|label| !label.is_empty()),
        })
    }
}
/// Accepts RFC 3339, the space-separated form Python's `str(datetime)` emits,
/// and naive ISO timestamps (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
