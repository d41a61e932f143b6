// ztbctl-core: Site model, rendering, and provisioning workflow for ztbctl
//
// Validates declarative site records, renders API documents from
// templates, and drives each site through creation, VLANs, and HA.

pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod reference;
pub mod render;
pub mod retry;
pub mod runner;
pub mod template;
pub mod vrrp;

// ── Primary re-exports ──────────────────────────────────────────────

pub use config::{OrchestratorConfig, PollPolicy, RetryPolicy};
pub use error::{CoreError, ResourceError};
pub use model::{
    DhcpMode, DhcpRange, DhcpService, Gateways, LoadOutcome, RawRow, RowError, SiteRecord,
    TemplateRef, VlanRecord, WanUplink,
};
pub use orchestrator::{
    ConnectorHook, Orchestrator, Phase, RecordedDocument, Session, StaticKey,
};
pub use reference::{CaptureOptions, ReferenceSite, SiteDirectory};
pub use render::render;
pub use runner::{RunSummary, Runner, SiteSummary};
pub use template::{InterfaceLayout, InterfaceRole, ResolvedTemplate, TemplateResolver};
pub use vrrp::{VIRTUAL_ROUTER_ID, VrrpConfiguration, VrrpError};
