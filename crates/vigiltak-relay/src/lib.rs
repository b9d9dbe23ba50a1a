//! Agent orchestration: track keeping, routing, dispatch and the
//! optional beacon and imagery tasks.
//!
//! The data flow is two bounded queues. Link read tasks push raw
//! frames inbound; the router decodes, answers self-test probes and
//! maintains the track store; producers (router replies, beacon,
//! imagery reports) push events outbound; the dispatcher encodes per
//! link and sends.

pub mod agent;
pub mod beacon;
pub mod dispatch;
pub mod imagery;
pub mod metrics;
pub mod patrol;
pub mod report;
pub mod router;
pub mod tracker;

pub use agent::{run_router, Agent, AgentError};
pub use beacon::{build_probe, PROBE_TYPE};
pub use dispatch::{select_wire_format, Dispatcher, LinkTarget};
pub use imagery::{ImageryWorker, IMAGERY_CE, IMAGERY_HAE, IMAGERY_LE};
pub use patrol::PatrolPath;
pub use report::{build_report, PositionFix, ReportError, ReportIdentity};
pub use router::{Ingestion, Outcome, Router};
pub use tracker::{TrackRecord, TrackStore};
