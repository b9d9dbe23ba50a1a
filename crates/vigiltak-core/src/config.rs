//! Agent configuration.
//!
//! Loaded from a YAML file with environment overrides layered on top:
//! `VIGILTAK__PROBE__INTERVAL_SECS=10` overrides `probe.interval_secs`.
//! Every field has a default so a minimal config only needs `links`.

use crate::error::VigilError;
use crate::url::LinkUrl;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Callsign reported on generated events.
    #[serde(default = "default_callsign")]
    pub callsign: String,

    /// Team name reported on generated events.
    #[serde(default = "default_team")]
    pub team: String,

    /// Destination links, e.g. `udp://239.2.3.1:6969` or `tls://host:8089`.
    #[serde(default)]
    pub links: Vec<String>,

    /// Wire format override for every link: 0 XML, 1 stream, 2 mesh.
    /// Unset picks per link from the destination address.
    #[serde(default)]
    pub tak_proto: Option<u8>,

    /// Capacity of the inbound and outbound queues.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub sentinel: SentinelConfig,

    #[serde(default)]
    pub survey: SurveyConfig,

    #[serde(default)]
    pub imagery: ImageryConfig,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            callsign: default_callsign(),
            team: default_team(),
            links: Vec::new(),
            tak_proto: None,
            queue_capacity: default_queue_capacity(),
            send_timeout_secs: default_send_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            probe: ProbeConfig::default(),
            sentinel: SentinelConfig::default(),
            survey: SurveyConfig::default(),
            imagery: ImageryConfig::default(),
            vision: VisionConfig::default(),
            metrics: MetricsConfig::default(),
            tls: TlsConfig::default(),
        }
    }
}

/// Certificate material for `tls://` links.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Trust anchor for the server. Unset falls back to the system
    /// webpki roots.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate chain, PEM. Requires `client_key`.
    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    /// Client private key, PEM. Requires `client_cert`.
    #[serde(default)]
    pub client_key: Option<PathBuf>,
}

/// Periodic presence probe sent to every link.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_probe_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_probe_stale_secs")]
    pub stale_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_probe_interval_secs(),
            stale_secs: default_probe_stale_secs(),
        }
    }
}

/// Sentinel uids that trigger a canned reply instead of track storage.
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    #[serde(default = "default_sentinel_uids")]
    pub uids: Vec<String>,

    #[serde(default = "default_reply_uid")]
    pub reply_uid: String,

    #[serde(default = "default_probe_stale_secs")]
    pub reply_stale_secs: u64,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            uids: default_sentinel_uids(),
            reply_uid: default_reply_uid(),
            reply_stale_secs: default_probe_stale_secs(),
        }
    }
}

/// Fixed site position used for probes and sentinel replies.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SurveyConfig {
    #[serde(default = "default_survey_lat")]
    pub lat: f64,
    #[serde(default = "default_survey_lon")]
    pub lon: f64,
    #[serde(default)]
    pub hae: f64,
    #[serde(default = "default_survey_accuracy")]
    pub ce: f64,
    #[serde(default = "default_survey_accuracy")]
    pub le: f64,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            lat: default_survey_lat(),
            lon: default_survey_lon(),
            hae: 0.0,
            ce: default_survey_accuracy(),
            le: default_survey_accuracy(),
        }
    }
}

/// Watched imagery directory feeding the vision assessor.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,

    /// Process the directory once and stop instead of rescanning.
    #[serde(default)]
    pub oneshot: bool,

    /// Lifetime of an imagery event, anchored at the fix capture time.
    #[serde(default = "default_imagery_stale_secs")]
    pub stale_secs: u64,

    /// Where the simulated patrol track starts.
    #[serde(default = "default_patrol_lat")]
    pub patrol_lat: f64,

    #[serde(default = "default_patrol_lon")]
    pub patrol_lon: f64,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            watch_dir: default_watch_dir(),
            rescan_interval_secs: default_rescan_interval_secs(),
            oneshot: false,
            stale_secs: default_imagery_stale_secs(),
            patrol_lat: default_patrol_lat(),
            patrol_lon: default_patrol_lon(),
        }
    }
}

/// Vision-model endpoint, OpenAI chat-completions compatible.
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_vision_model")]
    pub model: String,

    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            api_key: None,
            model: default_vision_model(),
            timeout_secs: default_vision_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_bind")]
    pub bind_address: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_metrics_bind(),
        }
    }
}

impl AgentConfig {
    /// Loads configuration from an optional file plus `VIGILTAK__`
    /// environment overrides, then validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, VigilError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let raw = builder
            .add_source(
                Environment::with_prefix("VIGILTAK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg: AgentConfig = raw.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations the agent cannot start with. Link URL
    /// problems are fatal here rather than at first send.
    pub fn validate(&self) -> Result<(), VigilError> {
        if self.callsign.is_empty() {
            return Err(VigilError::invalid_config("callsign must not be empty"));
        }
        if self.links.is_empty() {
            return Err(VigilError::invalid_config(
                "at least one link is required",
            ));
        }
        for link in &self.links {
            LinkUrl::parse(link)?;
        }
        if let Some(proto) = self.tak_proto {
            if proto > 2 {
                return Err(VigilError::invalid_config(format!(
                    "tak_proto must be 0 (xml), 1 (stream) or 2 (mesh), got {proto}"
                )));
            }
        }
        if self.queue_capacity == 0 {
            return Err(VigilError::invalid_config("queue_capacity must be > 0"));
        }
        if self.probe.enabled && self.probe.interval_secs == 0 {
            return Err(VigilError::invalid_config(
                "probe.interval_secs must be > 0",
            ));
        }
        if self.imagery.enabled {
            if !self.imagery.oneshot && self.imagery.rescan_interval_secs == 0 {
                return Err(VigilError::invalid_config(
                    "imagery.rescan_interval_secs must be > 0",
                ));
            }
            if self.vision.endpoint.is_empty() {
                return Err(VigilError::invalid_config(
                    "vision.endpoint is required when imagery is enabled",
                ));
            }
        }
        if self.tls.client_cert.is_some() != self.tls.client_key.is_some() {
            return Err(VigilError::invalid_config(
                "tls.client_cert and tls.client_key must be set together",
            ));
        }
        Ok(())
    }

    /// Parsed form of every configured link.
    pub fn link_urls(&self) -> Result<Vec<LinkUrl>, VigilError> {
        self.links.iter().map(|l| LinkUrl::parse(l)).collect()
    }
}

fn default_callsign() -> String {
    "VIKING1".to_string()
}

fn default_team() -> String {
    "Alpha".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_send_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_probe_interval_secs() -> u64 {
    5
}

fn default_probe_stale_secs() -> u64 {
    20
}

fn default_sentinel_uids() -> Vec<String> {
    vec!["AutoCV1".to_string(), "team4test".to_string()]
}

fn default_reply_uid() -> String {
    "6thMan".to_string()
}

fn default_survey_lat() -> f64 {
    -27.456604
}

fn default_survey_lon() -> f64 {
    153.037484
}

fn default_survey_accuracy() -> f64 {
    10.0
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("./imagery")
}

fn default_rescan_interval_secs() -> u64 {
    30
}

fn default_imagery_stale_secs() -> u64 {
    5
}

fn default_patrol_lat() -> f64 {
    -27.4698
}

fn default_patrol_lon() -> f64 {
    153.0251
}

fn default_vision_endpoint() -> String {
    "http://127.0.0.1:11434/v1/chat/completions".to_string()
}

fn default_vision_model() -> String {
    "gemma3:27b".to_string()
}

fn default_vision_timeout_secs() -> u64 {
    120
}

fn default_metrics_bind() -> SocketAddr {
    "127.0.0.1:9090".parse().unwrap()
}
