//! Agent assembly.
//!
//! Wires the configured links, the router, the dispatcher and the
//! optional beacon and imagery tasks together around two bounded
//! queues: inbound raw frames and outbound events. Everything the
//! agent does flows through those two channels.

use crate::beacon::run_beacon;
use crate::dispatch::{select_wire_format, Dispatcher, LinkTarget};
use crate::imagery::ImageryWorker;
use crate::report::ReportIdentity;
use crate::router::{Ingestion, Outcome, Router};
use chrono::Utc;
use metrics::{counter, gauge};
use std::time::Duration;
use tracing::{debug, info, warn};
use vigiltak_core::{AgentConfig, VigilError};
use vigiltak_cot::CotEvent;
use vigiltak_net::{InboundFrame, LinkOptions, TransportError};
use vigiltak_vision::{VisionClient, VisionError};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] VigilError),

    #[error("link setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("vision client setup failed: {0}")]
    Vision(#[from] VisionError),

    #[error("metrics exporter failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Brings up every link and task, then runs until the inbound
    /// side drains, which for live links means until shutdown.
    pub async fn run(self) -> Result<(), AgentError> {
        let config = self.config;
        let urls = config.link_urls()?;

        if config.metrics.enabled {
            crate::metrics::install(&config.metrics)?;
        }

        let (inbound_tx, inbound_rx) = flume::bounded::<InboundFrame>(config.queue_capacity);
        let (outbound_tx, outbound_rx) = flume::bounded::<CotEvent>(config.queue_capacity);

        let options = LinkOptions {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            ca_cert: config.tls.ca_cert.clone(),
            client_cert: config.tls.client_cert.clone(),
            client_key: config.tls.client_key.clone(),
            ..LinkOptions::default()
        };

        let mut links = Vec::with_capacity(urls.len());
        for url in &urls {
            let transport = vigiltak_net::connect(url, &options, inbound_tx.clone()).await?;
            let format = select_wire_format(url, config.tak_proto);
            info!(link = %url, format = %format, "link up");
            links.push(LinkTarget { transport, format });
        }

        let router = Router::new(&config.sentinel, &config.survey);
        let router_task = tokio::spawn(run_router(router, inbound_rx, outbound_tx.clone()));

        let dispatcher = Dispatcher::new(links);
        let dispatch_task = tokio::spawn(dispatcher.run(outbound_rx));

        if config.probe.enabled {
            let uid = config
                .sentinel
                .uids
                .first()
                .cloned()
                .unwrap_or_else(|| "AutoCV1".to_string());
            tokio::spawn(run_beacon(
                config.probe.clone(),
                config.survey,
                uid,
                outbound_tx.clone(),
            ));
        }

        if config.imagery.enabled {
            let client = VisionClient::new(config.vision.clone())?;
            let identity = ReportIdentity::new(config.callsign.clone(), config.team.clone());
            let worker = ImageryWorker::new(
                config.imagery.clone(),
                client,
                identity,
                outbound_tx.clone(),
            );
            tokio::spawn(worker.run());
        }
        drop(outbound_tx);
        drop(inbound_tx);

        info!(
            callsign = %config.callsign,
            links = urls.len(),
            "agent running"
        );
        let _ = router_task.await;
        let _ = dispatch_task.await;
        Ok(())
    }
}

/// Feeds every inbound frame through the router and forwards its
/// replies until the inbound channel closes.
pub async fn run_router(
    mut router: Router,
    inbound: flume::Receiver<InboundFrame>,
    outbound: flume::Sender<CotEvent>,
) {
    while let Ok(frame) = inbound.recv_async().await {
        let Ingestion { outcome, expired } = router.ingest(&frame.payload, Utc::now());
        match outcome {
            Outcome::Reply(reply) => {
                counter!("vigiltak_sentinel_replies_total").increment(1);
                info!(link = %frame.link, uid = %reply.uid, "sentinel probe answered");
                if outbound.send_async(*reply).await.is_err() {
                    break;
                }
            }
            Outcome::Stored { uid, fresh } => {
                counter!("vigiltak_events_received_total").increment(1);
                debug!(link = %frame.link, uid = %uid, fresh, "track stored");
            }
            Outcome::Unreadable(e) => {
                counter!("vigiltak_decode_failures_total").increment(1);
                warn!(link = %frame.link, error = %e, "undecodable frame dropped");
            }
            Outcome::Invalid(e) => {
                counter!("vigiltak_invalid_events_total").increment(1);
                warn!(link = %frame.link, error = %e, "invalid event dropped");
            }
        }
        if !expired.is_empty() {
            debug!(uids = ?expired, "tracks expired");
        }
        gauge!("vigiltak_tracks").set(router.track_count() as f64);
    }
    debug!("inbound channel closed, router stopping");
}
