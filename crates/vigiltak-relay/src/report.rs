//! Assessment to CoT report translation.
//!
//! A report's stale time is anchored to the sensor fix, not to when the
//! assessment finished: a slow model run must not extend how long the
//! observation is considered current.

use chrono::{DateTime, Duration, Utc};
use vigiltak_cot::{CotEvent, Point, COT_VERSION};
use vigiltak_vision::Assessment;

/// Where and when an observation was made.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub lat: f64,
    pub lon: f64,
    pub hae: f64,
    pub ce: f64,
    pub le: f64,
    pub time: DateTime<Utc>,
}

/// Who is filing reports.
#[derive(Debug, Clone)]
pub struct ReportIdentity {
    pub callsign: String,
    pub team: String,
}

impl ReportIdentity {
    pub fn new(callsign: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            team: team.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The model reply omitted a required classification field. Absent
    /// is not the same as false; the report is refused instead.
    #[error("assessment is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Builds the outbound CoT report for one assessed fix.
///
/// Marker type is chosen by the hostility rule: hostiles present means
/// `a-s-G` (suspect ground), otherwise `a-s-A`.
pub fn build_report(
    identity: &ReportIdentity,
    assessment: &Assessment,
    fix: &PositionFix,
    now: DateTime<Utc>,
    stale_secs: u64,
) -> Result<CotEvent, ReportError> {
    let people_count = assessment
        .people_count
        .ok_or(ReportError::MissingField("peopleCount"))?;
    let hostiles = assessment
        .hostiles
        .ok_or(ReportError::MissingField("hostiles"))?;
    let weapons_detected = assessment
        .weapons_detected
        .ok_or(ReportError::MissingField("weaponsDetected"))?;
    let hazards = assessment
        .hazards
        .ok_or(ReportError::MissingField("hazards"))?;
    let rubble = assessment
        .rubble
        .ok_or(ReportError::MissingField("rubble"))?;

    let event_type = if hostiles { "a-s-G" } else { "a-s-A" };
    let uid = report_uid(&identity.callsign, now);
    let timestamp = now.format("%d %H%M %b%y").to_string().to_uppercase();

    let mut event = CotEvent {
        version: COT_VERSION.to_string(),
        uid,
        event_type: event_type.to_string(),
        how: "m-g".to_string(),
        time: now,
        start: now,
        stale: fix.time + Duration::seconds(stale_secs as i64),
        point: Point::new(fix.lat, fix.lon, fix.hae).with_accuracy(fix.ce, fix.le),
        detail: Default::default(),
    };
    event
        .detail
        .insert("peopleCount".to_string(), people_count.to_string());
    event
        .detail
        .insert("hostiles".to_string(), hostiles.to_string());
    event.detail.insert(
        "weaponsDetected".to_string(),
        weapons_detected.to_string(),
    );
    event
        .detail
        .insert("hazards".to_string(), hazards.to_string());
    event.detail.insert("rubble".to_string(), rubble.to_string());
    event
        .detail
        .insert("callsign".to_string(), identity.callsign.clone());
    event
        .detail
        .insert("team".to_string(), identity.team.clone());
    event.detail.insert("timestamp".to_string(), timestamp);
    Ok(event)
}

/// Report uid: callsign plus a nanosecond-resolution time suffix.
fn report_uid(callsign: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", callsign, now.format("%Y%m%d%H%M%S%f"))
}
