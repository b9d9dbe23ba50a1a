//! Shared foundation for the VigilTAK workspace: agent configuration
//! with environment overrides, destination URL parsing and the common
//! error type.

pub mod config;
pub mod error;
pub mod url;

pub use config::{
    AgentConfig, ImageryConfig, MetricsConfig, ProbeConfig, SentinelConfig, SurveyConfig,
    TlsConfig, VisionConfig,
};
pub use error::{Result, VigilError};
pub use url::{LinkScheme, LinkUrl};
