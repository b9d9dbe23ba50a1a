//! Track retention.
//!
//! One record per reporting uid, replaced wholesale on every update and
//! dropped once its stale time passes. The store is owned by the router
//! task alone, so there is no locking here; anything else that wants
//! track state gets it through the router.

use std::collections::HashMap;
use vigiltak_cot::CotEvent;

/// Latest event from one uid plus its retention deadline.
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub event: CotEvent,
    /// Epoch milliseconds after which the track is dead.
    pub expires_at: u64,
    /// Epoch milliseconds of the last update, for diagnostics.
    pub updated_at: u64,
}

#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<String, TrackRecord>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the track for the event's uid. Returns true
    /// when the uid was not present before.
    pub fn upsert(&mut self, event: CotEvent, now_millis: u64) -> bool {
        let record = TrackRecord {
            expires_at: event.stale_millis(),
            updated_at: now_millis,
            event,
        };
        self.tracks
            .insert(record.event.uid.clone(), record)
            .is_none()
    }

    /// Removes every track whose deadline is strictly in the past and
    /// returns their uids. A track expiring exactly now survives until
    /// the next sweep.
    pub fn sweep(&mut self, now_millis: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .tracks
            .iter()
            .filter(|(_, record)| record.expires_at < now_millis)
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in &expired {
            self.tracks.remove(uid);
        }
        expired
    }

    pub fn get(&self, uid: &str) -> Option<&TrackRecord> {
        self.tracks.get(uid)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Uids currently held, in no particular order.
    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vigiltak_cot::Point;

    fn event(uid: &str, stale_after_ms: i64) -> CotEvent {
        CotEvent::new(
            uid,
            "a-f-G",
            "m-g",
            Point::new(1.0, 2.0, 0.0),
            Duration::milliseconds(stale_after_ms),
        )
    }

    #[test]
    fn upsert_reports_fresh_and_update() {
        let mut store = TrackStore::new();
        let e = event("A", 10_000);
        let now = e.time_millis();
        assert!(store.upsert(e.clone(), now));
        assert!(!store.upsert(e, now));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn upsert_replaces_previous_event() {
        let mut store = TrackStore::new();
        let first = event("A", 10_000);
        let now = first.time_millis();
        store.upsert(first, now);

        let mut second = event("A", 20_000);
        second.point.lat = 5.0;
        store.upsert(second, now);

        let record = store.get("A").unwrap();
        assert_eq!(record.event.point.lat, 5.0);
    }

    #[test]
    fn sweep_drops_only_strictly_expired() {
        let mut store = TrackStore::new();
        let e = event("A", 10_000);
        let deadline = e.stale_millis();
        store.upsert(e, deadline - 10_000);

        // Exactly at the deadline the track survives.
        assert!(store.sweep(deadline).is_empty());
        assert_eq!(store.len(), 1);

        // One millisecond later it is gone.
        let expired = store.sweep(deadline + 1);
        assert_eq!(expired, vec!["A".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_leaves_live_tracks_alone() {
        let mut store = TrackStore::new();
        let live = event("LIVE", 60_000);
        let dead = event("DEAD", 1_000);
        let now = live.time_millis();
        store.upsert(live, now);
        store.upsert(dead, now);

        let expired = store.sweep(now + 30_000);
        assert_eq!(expired, vec!["DEAD".to_string()]);
        assert!(store.get("LIVE").is_some());
        assert_eq!(store.uids().count(), 1);
    }

    #[test]
    fn update_extends_retention() {
        let mut store = TrackStore::new();
        let short = event("A", 1_000);
        let now = short.time_millis();
        let short_deadline = short.stale_millis();
        store.upsert(short, now);

        let long = event("A", 120_000);
        store.upsert(long, now);

        assert!(store.sweep(short_deadline + 1).is_empty());
        assert_eq!(store.len(), 1);
    }
}
