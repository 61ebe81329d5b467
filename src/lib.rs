//! Tunnelgate keeps a torrent client and a feed fetcher behind a verified
//! VPN tunnel.
//!
//! Each run decides whether anything needs the tunnel, brings it up through
//! the init system, verifies it end to end, installs policy routing, and
//! only then lets downstream work proceed.

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod platform;
pub mod state;
pub mod vpn;
