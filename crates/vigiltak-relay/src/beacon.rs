//! Periodic self-test probe.
//!
//! The beacon enqueues a probe event on every tick, starting
//! immediately. Probes carry a sentinel uid, so any peer running this
//! agent answers with its canned site report instead of storing them.

use chrono::Duration as ChronoDuration;
use metrics::counter;
use std::time::Duration;
use tracing::{debug, info};
use vigiltak_core::{ProbeConfig, SurveyConfig};
use vigiltak_cot::{CotEvent, Point};

/// CoT type for computer-vision self-test probes.
pub const PROBE_TYPE: &str = "b-x-cv";

/// Builds one probe event at the survey point.
pub fn build_probe(uid: &str, survey: &SurveyConfig, stale_secs: u64) -> CotEvent {
    let point = Point::new(survey.lat, survey.lon, survey.hae).with_accuracy(survey.ce, survey.le);
    CotEvent::new(
        uid,
        PROBE_TYPE,
        "m-g",
        point,
        ChronoDuration::seconds(stale_secs as i64),
    )
}

/// Emits probes until the outbound queue closes.
pub async fn run_beacon(
    probe: ProbeConfig,
    survey: SurveyConfig,
    uid: String,
    outbound: flume::Sender<CotEvent>,
) {
    info!(
        uid = %uid,
        interval_secs = probe.interval_secs,
        "beacon started"
    );
    let mut tick = tokio::time::interval(Duration::from_secs(probe.interval_secs));
    loop {
        tick.tick().await;
        let event = build_probe(&uid, &survey, probe.stale_secs);
        if outbound.send_async(event).await.is_err() {
            break;
        }
        counter!("vigiltak_probes_sent_total").increment(1);
    }
    debug!("outbound queue closed, beacon stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_carries_sentinel_identity_and_survey_point() {
        let survey = SurveyConfig::default();
        let event = build_probe("AutoCV1", &survey, 20);
        assert_eq!(event.uid, "AutoCV1");
        assert_eq!(event.event_type, "b-x-cv");
        assert_eq!(event.how, "m-g");
        assert_eq!(event.point.lat, -27.456604);
        assert_eq!(event.point.lon, 153.037484);
        assert_eq!(event.point.hae, 0.0);
        assert_eq!(event.point.ce, 10.0);
        assert_eq!(event.point.le, 10.0);
        assert_eq!(event.stale - event.start, ChronoDuration::seconds(20));
        assert!(event.detail.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn beacon_sends_immediately_and_then_periodically() {
        let (tx, rx) = flume::bounded(8);
        let probe = ProbeConfig {
            enabled: true,
            interval_secs: 5,
            stale_secs: 20,
        };
        let handle = tokio::spawn(run_beacon(
            probe,
            SurveyConfig::default(),
            "AutoCV1".to_string(),
            tx,
        ));

        // First probe fires without waiting for an interval.
        let first = rx.recv_async().await.unwrap();
        assert_eq!(first.uid, "AutoCV1");

        tokio::time::advance(Duration::from_secs(5)).await;
        let second = rx.recv_async().await.unwrap();
        assert_eq!(second.event_type, "b-x-cv");

        drop(rx);
        tokio::time::advance(Duration::from_secs(5)).await;
        handle.await.unwrap();
    }

    #[test]
    fn probe_round_trips_through_the_codec() {
        let event = build_probe("AutoCV1", &SurveyConfig::default(), 20);
        let bytes = vigiltak_cot::encode(&event, vigiltak_cot::WireFormat::MeshBinary).unwrap();
        let decoded = vigiltak_cot::decode(&bytes).unwrap();
        assert_eq!(decoded.uid, "AutoCV1");
        assert_eq!(decoded.event_type, "b-x-cv");
    }
}
