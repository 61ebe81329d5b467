//! Routing table inspection via `route -n`.

use std::net::Ipv4Addr;

use log::warn;

use crate::platform::exec::CommandRunner;

/// The default route: which interface and gateway reach the internet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultRoute {
    pub interface: String,
    pub gateway: Ipv4Addr,
}

/// Extract the default route from `route -n` output.
///
/// Columns are `Destination Gateway Genmask Flags Metric Ref Use Iface`; the
/// default route has destination `0.0.0.0`. The first one listed wins.
#[must_use]
pub fn parse_default_route(output: &str) -> Option<DefaultRoute> {
    output.lines().find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 8 || cols[0] != "0.0.0.0" {
            return None;
        }
        Some(DefaultRoute {
            gateway: cols[1].parse().ok()?,
            interface: cols[7].to_string(),
        })
    })
}

/// Queries the OS routing table.
pub struct RouteInspector<R> {
    runner: R,
}

impl<R: CommandRunner> RouteInspector<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn default_route(&self) -> Option<DefaultRoute> {
        match self.runner.run("route", &["-n"]) {
            Ok(out) if out.success() => parse_default_route(&out.stdout),
            Ok(out) => {
                warn!("ROUTE: route -n failed: {}", out.diagnostic());
                None
            }
            Err(e) => {
                warn!("ROUTE: {e}");
                None
            }
        }
    }
}
