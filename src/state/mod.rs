//! Value types shared by the VPN modules and the job driver.

mod connection;
mod service;

pub use connection::{InterfaceState, TunnelParams, TunnelState, VpnSession};
pub use service::{InitSystem, ServiceRunState};
