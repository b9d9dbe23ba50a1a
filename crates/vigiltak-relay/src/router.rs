//! Inbound event routing.
//!
//! Every received buffer goes through the same four steps: decode,
//! sentinel check, store, sweep. Sentinel uids get a canned reply and
//! are never stored; everything else that decodes and validates lands
//! in the track store. The sweep runs on every ingestion regardless of
//! outcome, so retention never depends on traffic being well-formed.

use crate::tracker::TrackStore;
use chrono::{DateTime, Duration, Utc};
use vigiltak_core::{SentinelConfig, SurveyConfig};
use vigiltak_cot::event::datetime_to_millis;
use vigiltak_cot::{decode, validate_event, CotEvent, DecodeError, Point, ValidationError};

/// What one ingested buffer amounted to.
#[derive(Debug)]
pub enum Outcome {
    /// Sentinel probe; send this reply, nothing was stored.
    Reply(Box<CotEvent>),
    /// Event stored. `fresh` is false for an update of a known uid.
    Stored { uid: String, fresh: bool },
    /// Buffer did not decode as CoT in any framing.
    Unreadable(DecodeError),
    /// Decoded but failed semantic validation; dropped.
    Invalid(ValidationError),
}

/// Result of one call to [`Router::ingest`].
#[derive(Debug)]
pub struct Ingestion {
    pub outcome: Outcome,
    /// Uids expired by this ingestion's sweep.
    pub expired: Vec<String>,
}

pub struct Router {
    tracks: TrackStore,
    sentinel_uids: Vec<String>,
    reply_uid: String,
    reply_stale: Duration,
    survey_point: Point,
}

impl Router {
    pub fn new(sentinel: &SentinelConfig, survey: &SurveyConfig) -> Self {
        Self {
            tracks: TrackStore::new(),
            sentinel_uids: sentinel.uids.clone(),
            reply_uid: sentinel.reply_uid.clone(),
            reply_stale: Duration::seconds(sentinel.reply_stale_secs as i64),
            survey_point: Point::new(survey.lat, survey.lon, survey.hae)
                .with_accuracy(survey.ce, survey.le),
        }
    }

    /// Runs one buffer through the routing steps.
    pub fn ingest(&mut self, raw: &[u8], now: DateTime<Utc>) -> Ingestion {
        let now_millis = datetime_to_millis(now);
        let outcome = match decode(raw) {
            Err(e) => Outcome::Unreadable(e),
            Ok(event) => {
                if self.sentinel_uids.iter().any(|uid| *uid == event.uid) {
                    Outcome::Reply(Box::new(self.build_reply(now)))
                } else {
                    match validate_event(&event) {
                        Err(e) => Outcome::Invalid(e),
                        Ok(()) => {
                            let uid = event.uid.clone();
                            let fresh = self.tracks.upsert(event, now_millis);
                            Outcome::Stored { uid, fresh }
                        }
                    }
                }
            }
        };
        let expired = self.tracks.sweep(now_millis);
        Ingestion { outcome, expired }
    }

    /// The canned site report answered to sentinel probes.
    fn build_reply(&self, now: DateTime<Utc>) -> CotEvent {
        CotEvent {
            version: vigiltak_cot::COT_VERSION.to_string(),
            uid: self.reply_uid.clone(),
            event_type: "a-s-G".to_string(),
            how: "m-g".to_string(),
            time: now,
            start: now,
            stale: now + self.reply_stale,
            point: self.survey_point,
            detail: Default::default(),
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.tracks
    }
}
