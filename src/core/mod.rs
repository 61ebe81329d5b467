//! Job logic that sits on top of the tunnel.

pub mod client;
pub mod job;
pub mod retry;
pub mod torrents;
