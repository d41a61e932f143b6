// ── Domain model ──
//
// Typed, validated representations of the declarative input. Nothing in
// here performs I/O.

pub mod load;
pub mod site;
pub mod vlan;

pub use load::{LoadOutcome, RawRow, RowError, deployable, load};
pub use site::{DhcpMode, Gateways, SiteRecord, TemplateRef, WanUplink};
pub use vlan::{DhcpRange, DhcpService, VlanRecord};
