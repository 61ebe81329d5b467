//! Bring a tunnel to a verified usable state, or leave it cleanly down.
//!
//! Retries are attempt-scoped. Any failure (start, ping, missing tunnel
//! parameters) uses up one whole attempt, and except for a missing interface
//! it stops the service so the next attempt starts from a fresh connection.
//! A half-up tunnel is never reported as usable.

use std::net::Ipv4Addr;

use log::{error, info, warn};

use crate::error::Result;
use crate::state::TunnelState;
use crate::vpn::connection::Tunnel;
use crate::vpn::routing::RulesApplier;

/// Result of [`VpnOrchestrator::ensure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Service running, interface up and the peer answered.
    Connected,
    /// Attempt budget exhausted; the service has been stopped.
    Failed,
}

/// Drives a [`Tunnel`] and a [`RulesApplier`] through the connect sequence.
pub struct VpnOrchestrator<T, A> {
    tunnel: T,
    applier: A,
    state: TunnelState,
}

impl<T: Tunnel, A: RulesApplier> VpnOrchestrator<T, A> {
    pub const fn new(tunnel: T, applier: A) -> Self {
        Self {
            tunnel,
            applier,
            state: TunnelState::Unknown,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TunnelState {
        self.state
    }

    #[must_use]
    pub const fn tunnel(&self) -> &T {
        &self.tunnel
    }

    fn transition(&mut self, next: TunnelState) {
        if self.state != next {
            info!("VPN: {} -> {next}", self.state);
            self.state = next;
        }
    }

    /// Stop the service after a failed attempt.
    fn abandon(&mut self, next: TunnelState) {
        self.tunnel.stop();
        self.transition(next);
    }

    /// Make the tunnel usable within `max_attempts` attempts.
    ///
    /// Routing rules are applied at most once per call, on the first start
    /// that brings the service up, and only if the service was not already
    /// running when the call began.
    ///
    /// # Errors
    ///
    /// Fatal errors (a start command that cannot be run, routing rules
    /// failing, configuration defects) end the call immediately. The service
    /// is stopped before they propagate.
    pub fn ensure(&mut self, max_attempts: u32) -> Result<EnsureOutcome> {
        let mut routes_pending = true;

        for attempt in 1..=max_attempts {
            info!("VPN: attempt {attempt}/{max_attempts}");

            if self.tunnel.service_status().is_running() {
                if attempt == 1 {
                    routes_pending = false;
                }
            } else {
                self.transition(TunnelState::ServiceDown);
                match self.tunnel.start() {
                    Ok(state) if state.is_running() => {}
                    Ok(_) => {
                        warn!("VPN: service did not start");
                        self.abandon(TunnelState::Failed);
                        continue;
                    }
                    Err(e) => {
                        error!("VPN: cannot start service: {e}");
                        self.abandon(TunnelState::Failed);
                        return Err(e);
                    }
                }

                if routes_pending {
                    routes_pending = false;
                    if let Err(e) = self.applier.apply(self.tunnel.session()) {
                        error!("VPN: routing rules failed: {e}");
                        self.abandon(TunnelState::Failed);
                        return Err(e);
                    }
                }
            }

            if !self.tunnel.interface_status().is_up() {
                warn!(
                    "VPN: interface {} is down",
                    self.tunnel.session().interface
                );
                self.transition(TunnelState::ServiceUpIfaceDown);
                continue;
            }

            match self.tunnel.update_info() {
                Ok(target) => info!("VPN: pinging {target}"),
                Err(e) if e.is_fatal() => {
                    self.abandon(TunnelState::Failed);
                    return Err(e);
                }
                Err(e) => {
                    warn!("VPN: {e}");
                    self.abandon(TunnelState::ServiceDown);
                    continue;
                }
            }

            if !self.tunnel.ping_peer() {
                warn!("VPN: peer did not answer, restarting the tunnel");
                self.abandon(TunnelState::ServiceDown);
                continue;
            }

            self.transition(TunnelState::Connected);
            return Ok(EnsureOutcome::Connected);
        }

        warn!("VPN: giving up after {max_attempts} attempt(s)");
        self.abandon(TunnelState::Failed);
        Ok(EnsureOutcome::Failed)
    }

    /// Local tunnel address while connected.
    #[must_use]
    pub fn current_addr(&self) -> Option<Ipv4Addr> {
        if self.state != TunnelState::Connected {
            return None;
        }
        self.tunnel.session().tunnel.map(|t| t.local_addr)
    }

    /// Stop the VPN service and forget the session.
    pub fn teardown(&mut self) {
        self.abandon(TunnelState::ServiceDown);
    }
}
