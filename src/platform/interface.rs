//! Network interface inspection via `ip`.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use log::{debug, warn};

use crate::platform::exec::CommandRunner;
use crate::state::{InterfaceState, TunnelParams};

/// One IPv4 address entry of an interface, as printed by `ip -o -4 addr`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Entry {
    pub local: Ipv4Addr,
    pub prefix: Option<u8>,
    pub peer: Option<Ipv4Addr>,
}

impl Ipv4Entry {
    #[must_use]
    pub fn tunnel_params(&self) -> Option<TunnelParams> {
        Some(TunnelParams {
            local_addr: self.local,
            peer_addr: self.peer?,
        })
    }

    /// Network containing the local address.
    #[must_use]
    pub fn network(&self) -> Option<Ipv4Net> {
        Ipv4Net::new(self.local, self.prefix?).ok().map(|n| n.trunc())
    }
}

/// Split `10.8.0.5/32` into address and prefix length.
fn parse_addr_with_prefix(token: &str) -> Option<(Ipv4Addr, Option<u8>)> {
    match token.split_once('/') {
        Some((addr, prefix)) => Some((addr.parse().ok()?, Some(prefix.parse().ok()?))),
        None => Some((token.parse().ok()?, None)),
    }
}

/// Interface names from `ip -o link show` output.
#[must_use]
pub fn parse_link_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(':').nth(1))
        .map(|name| name.trim().split('@').next().unwrap_or("").to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// IPv4 entries from `ip -o -4 addr show dev <if>` output, in OS order.
#[must_use]
pub fn parse_ipv4_entries(output: &str) -> Vec<Ipv4Entry> {
    let mut entries = Vec::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(pos) = tokens.iter().position(|t| *t == "inet") else {
            continue;
        };
        let Some((local, mut prefix)) = tokens.get(pos + 1).and_then(|t| parse_addr_with_prefix(t))
        else {
            continue;
        };

        let mut peer = None;
        if tokens.get(pos + 2) == Some(&"peer") {
            if let Some((addr, peer_prefix)) =
                tokens.get(pos + 3).and_then(|t| parse_addr_with_prefix(t))
            {
                peer = Some(addr);
                prefix = prefix.or(peer_prefix);
            }
        }

        entries.push(Ipv4Entry {
            local,
            prefix,
            peer,
        });
    }

    entries
}

/// Queries interface presence and addresses from the OS.
pub struct InterfaceInspector<R> {
    runner: R,
}

impl<R: CommandRunner> InterfaceInspector<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// `Up` iff the interface appears in the OS interface list.
    pub fn status(&self, interface: &str) -> InterfaceState {
        let output = match self.runner.run("ip", &["-o", "link", "show"]) {
            Ok(out) if out.success() => out,
            Ok(out) => {
                warn!("IFACE: ip link failed: {}", out.diagnostic());
                return InterfaceState::Down;
            }
            Err(e) => {
                warn!("IFACE: {e}");
                return InterfaceState::Down;
            }
        };

        if parse_link_names(&output.stdout).iter().any(|n| n == interface) {
            InterfaceState::Up
        } else {
            InterfaceState::Down
        }
    }

    /// First IPv4 entry of `interface`, if any.
    ///
    /// Interfaces carrying several IPv4 addresses are not supported: only the
    /// first entry reported by the OS is considered.
    fn first_entry(&self, interface: &str) -> Option<Ipv4Entry> {
        let output = match self.runner.run("ip", &["-o", "-4", "addr", "show", "dev", interface]) {
            Ok(out) if out.success() => out,
            Ok(out) => {
                debug!("IFACE: no addresses for {interface}: {}", out.diagnostic());
                return None;
            }
            Err(e) => {
                warn!("IFACE: {e}");
                return None;
            }
        };

        let entries = parse_ipv4_entries(&output.stdout);
        if entries.len() > 1 {
            warn!(
                "IFACE: {interface} has {} IPv4 addresses, using the first",
                entries.len()
            );
        }
        entries.into_iter().next()
    }

    /// Local and peer address of a point-to-point interface.
    pub fn tunnel_params(&self, interface: &str) -> Option<TunnelParams> {
        self.first_entry(interface)?.tunnel_params()
    }

    /// Network prefix of the interface's first IPv4 address.
    pub fn network_params(&self, interface: &str) -> Option<Ipv4Net> {
        self.first_entry(interface)?.network()
    }
}
