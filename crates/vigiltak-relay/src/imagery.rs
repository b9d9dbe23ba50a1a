//! Imagery directory worker.
//!
//! Watches a directory for images, runs each new file through the
//! vision client and enqueues the translated report. Files that fail
//! for reasons a rescan cannot fix (unsupported type, malformed model
//! reply) are remembered and skipped; read and HTTP failures are
//! retried on the next scan.

use crate::patrol::PatrolPath;
use crate::report::{build_report, PositionFix, ReportIdentity};
use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use vigiltak_core::ImageryConfig;
use vigiltak_cot::CotEvent;
use vigiltak_vision::{MediaFile, VisionClient, VisionError};

/// Imagery fixes use fixed accuracy values: the patrol path is
/// simulated, so the error estimates are deliberately enormous.
pub const IMAGERY_HAE: f64 = 26.0;
pub const IMAGERY_CE: f64 = 999.99;
pub const IMAGERY_LE: f64 = 999_999.99;

pub struct ImageryWorker {
    config: ImageryConfig,
    client: VisionClient,
    identity: ReportIdentity,
    path: PatrolPath,
    outbound: flume::Sender<CotEvent>,
    seen: HashSet<PathBuf>,
}

impl ImageryWorker {
    pub fn new(
        config: ImageryConfig,
        client: VisionClient,
        identity: ReportIdentity,
        outbound: flume::Sender<CotEvent>,
    ) -> Self {
        let path = PatrolPath::new(config.patrol_lat, config.patrol_lon);
        Self {
            config,
            client,
            identity,
            path,
            outbound,
            seen: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        info!(
            dir = %self.config.watch_dir.display(),
            oneshot = self.config.oneshot,
            "imagery worker started"
        );
        loop {
            self.scan_once().await;
            if self.config.oneshot {
                info!("oneshot imagery pass finished");
                break;
            }
            if self.outbound.is_disconnected() {
                debug!("outbound queue closed, imagery worker stopping");
                break;
            }
            tokio::time::sleep(Duration::from_secs(self.config.rescan_interval_secs)).await;
        }
    }

    /// One pass over the directory. Failures are per file; the scan
    /// always finishes.
    pub async fn scan_once(&mut self) {
        let candidates = list_candidates(&self.config.watch_dir, &self.seen);
        if candidates.is_empty() {
            return;
        }
        debug!(count = candidates.len(), "new imagery files");

        for file in candidates {
            if self.outbound.is_disconnected() {
                return;
            }
            self.process_file(&file).await;
        }
    }

    async fn process_file(&mut self, file: &Path) {
        let media = match MediaFile::load(file) {
            Ok(media) => media,
            Err(e @ VisionError::UnsupportedMedia { .. }) => {
                debug!(path = %file.display(), "{e}, skipping");
                self.seen.insert(file.to_path_buf());
                return;
            }
            Err(e) => {
                // Likely still being written; retry on the next scan.
                warn!(path = %file.display(), error = %e, "imagery read failed");
                counter!("vigiltak_assessment_failures_total").increment(1);
                return;
            }
        };

        let assessment = match self.client.assess(&media).await {
            Ok(assessment) => assessment,
            Err(e @ VisionError::Http(_)) => {
                warn!(path = %file.display(), error = %e, "vision endpoint unreachable");
                counter!("vigiltak_assessment_failures_total").increment(1);
                return;
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "assessment failed");
                counter!("vigiltak_assessment_failures_total").increment(1);
                self.seen.insert(file.to_path_buf());
                return;
            }
        };

        let (lat, lon) = self.path.advance();
        let fix = PositionFix {
            lat,
            lon,
            hae: IMAGERY_HAE,
            ce: IMAGERY_CE,
            le: IMAGERY_LE,
            time: capture_time(file),
        };

        let event = match build_report(
            &self.identity,
            &assessment,
            &fix,
            Utc::now(),
            self.config.stale_secs,
        ) {
            Ok(event) => event,
            Err(e) => {
                warn!(path = %file.display(), error = %e, "report refused");
                counter!("vigiltak_assessment_failures_total").increment(1);
                self.seen.insert(file.to_path_buf());
                return;
            }
        };

        info!(
            path = %file.display(),
            uid = %event.uid,
            event_type = %event.event_type,
            lat,
            lon,
            "imagery report queued"
        );
        self.seen.insert(file.to_path_buf());
        if self.outbound.send_async(event).await.is_ok() {
            counter!("vigiltak_assessments_total").increment(1);
        }
    }
}

/// Regular files in the directory, sorted by name, minus already
/// handled ones. A missing or unreadable directory yields nothing.
fn list_candidates(dir: &Path, seen: &HashSet<PathBuf>) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "imagery directory unreadable");
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| !seen.contains(path))
        .collect();
    files.sort();
    files
}

/// When the image was taken, approximated by its modification time.
fn capture_time(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_sorted_and_skip_seen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();
        std::fs::write(dir.path().join("c.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut seen = HashSet::new();
        let all = list_candidates(dir.path(), &seen);
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        // Extension filtering happens later; the listing only drops
        // directories.
        assert_eq!(names, vec!["a.png", "b.jpg", "c.txt"]);

        seen.insert(dir.path().join("a.png"));
        let rest = list_candidates(dir.path(), &seen);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn missing_directory_yields_no_candidates() {
        let seen = HashSet::new();
        assert!(list_candidates(Path::new("/nonexistent/imagery"), &seen).is_empty());
    }

    #[test]
    fn capture_time_tracks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("shot.png");
        std::fs::write(&file, b"x").unwrap();
        let taken = capture_time(&file);
        let age = Utc::now() - taken;
        assert!(age < chrono::Duration::seconds(60));
    }
}
