//! VPN tunnel lifecycle.
//!
//! [`connection::VpnConnection`] wraps one tunnel (service + interface),
//! [`routing::ScriptApplier`] installs policy routes once it comes up, and
//! [`orchestrator::VpnOrchestrator`] drives both to a verified state.

pub mod connection;
pub mod orchestrator;
pub mod routing;

pub use connection::{ConnectionOptions, ConnectionReport, Tunnel, VpnConnection};
pub use orchestrator::{EnsureOutcome, VpnOrchestrator};
pub use routing::{RoutingPlan, RulesApplier, ScriptApplier};
