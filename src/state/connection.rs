//! VPN session state types.

use std::net::Ipv4Addr;

use serde::Serialize;

/// Presence of a network interface.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceState {
    #[default]
    Down,
    Up,
}

impl InterfaceState {
    #[must_use]
    pub const fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }
}

/// Addresses of a point-to-point tunnel.
///
/// Only meaningful while the tunnel interface is up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TunnelParams {
    /// Address assigned to our end of the tunnel.
    pub local_addr: Ipv4Addr,
    /// Advertised remote end of the tunnel.
    pub peer_addr: Ipv4Addr,
}

impl TunnelParams {
    /// Address to probe for reachability.
    ///
    /// Some providers route through `x.y.z.1` rather than the advertised
    /// peer, so `gateway_one` swaps the last octet for 1.
    #[must_use]
    pub fn ping_target(&self, gateway_one: bool) -> Ipv4Addr {
        if gateway_one {
            let [a, b, c, _] = self.peer_addr.octets();
            Ipv4Addr::new(a, b, c, 1)
        } else {
            self.peer_addr
        }
    }
}

/// Orchestrator state machine.
///
/// Starts at `Unknown`; every `ensure` call ends in `Connected` or `Failed`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelState {
    /// Nothing has been checked yet.
    #[default]
    Unknown,
    /// The VPN service is not running.
    ServiceDown,
    /// Service runs but the tunnel interface is missing.
    ServiceUpIfaceDown,
    /// Service running, interface up and the peer answered.
    Connected,
    /// The attempt budget ran out or a fatal error occurred.
    Failed,
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::ServiceDown => "service down",
            Self::ServiceUpIfaceDown => "service up, interface down",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Live data of one VPN tunnel for the current job run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VpnSession {
    /// Provider name, used to derive the service name.
    pub provider: String,
    /// Tunnel interface (e.g. `tun0`).
    pub interface: String,
    /// Filled by `update_info` once the interface is up.
    pub tunnel: Option<TunnelParams>,
    /// Derived from `tunnel`.
    pub ping_target: Option<Ipv4Addr>,
    /// Result of the most recent ping, `false` until one succeeds.
    pub last_ping_ok: bool,
}

impl VpnSession {
    #[must_use]
    pub fn new(provider: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            interface: interface.into(),
            ..Self::default()
        }
    }

    /// Forget everything learned from the OS. Called whenever the service stops.
    pub fn invalidate(&mut self) {
        self.tunnel = None;
        self.ping_target = None;
        self.last_ping_ok = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TunnelParams {
        TunnelParams {
            local_addr: Ipv4Addr::new(10, 8, 0, 51),
            peer_addr: Ipv4Addr::new(10, 8, 0, 50),
        }
    }

    #[test]
    fn test_ping_target_gateway_one() {
        assert_eq!(params().ping_target(true), Ipv4Addr::new(10, 8, 0, 1));
    }

    #[test]
    fn test_ping_target_peer_verbatim() {
        assert_eq!(params().ping_target(false), Ipv4Addr::new(10, 8, 0, 50));
    }

    #[test]
    fn test_session_invalidate() {
        let mut session = VpnSession::new("acme", "tun0");
        session.tunnel = Some(params());
        session.ping_target = Some(Ipv4Addr::new(10, 8, 0, 1));
        session.last_ping_ok = true;

        session.invalidate();
        assert_eq!(session, VpnSession::new("acme", "tun0"));
    }

    #[test]
    fn test_tunnel_state_default() {
        assert_eq!(TunnelState::default(), TunnelState::Unknown);
        assert_eq!(TunnelState::ServiceUpIfaceDown.to_string(), "service up, interface down");
    }
}
