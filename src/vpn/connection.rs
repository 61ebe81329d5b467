//! One VPN tunnel: its service plus its network interface.

use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::constants;
use crate::core::retry::{poll_until, Backoff, RetryPolicy, Sleeper};
use crate::error::{Error, Result};
use crate::platform::exec::CommandRunner;
use crate::platform::interface::InterfaceInspector;
use crate::platform::ping_once;
use crate::platform::service::{ServiceController, ServiceHandle};
use crate::state::{InterfaceState, ServiceRunState, TunnelParams, VpnSession};

/// Operations the orchestrator needs from a tunnel.
pub trait Tunnel {
    /// Session data gathered so far.
    fn session(&self) -> &VpnSession;

    /// Fresh status query of the VPN service.
    fn service_status(&self) -> ServiceRunState;

    /// Fresh presence check of the tunnel interface.
    fn interface_status(&self) -> InterfaceState;

    /// Start the service and give the interface time to appear.
    ///
    /// # Errors
    ///
    /// Fatal errors only, such as a start command that cannot be run.
    fn start(&mut self) -> Result<ServiceRunState>;

    /// Stop the service and forget the session data. Always `Stopped`.
    fn stop(&mut self) -> ServiceRunState;

    /// Read tunnel parameters and derive the ping target.
    ///
    /// # Errors
    ///
    /// [`Error::TransientNetwork`] when the interface carries no usable
    /// local/peer pair.
    fn update_info(&mut self) -> Result<Ipv4Addr>;

    /// Ping the target found by [`Tunnel::update_info`] once.
    fn ping_peer(&mut self) -> bool;
}

/// Timing and probing knobs for a [`VpnConnection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub start_attempts: u32,
    pub start_wait: Duration,
    pub ping_gateway_one: bool,
    pub ping_timeout_secs: u64,
}

impl ConnectionOptions {
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            start_attempts: config.vpn.start_attempts,
            start_wait: config.start_wait(),
            ping_gateway_one: config.vpn.ping_gateway_one,
            ping_timeout_secs: config.vpn.ping_timeout_secs,
        }
    }
}

/// Snapshot for `tunnelgate status`.
#[derive(Clone, Debug, Serialize)]
pub struct ConnectionReport {
    pub provider: String,
    pub service: String,
    pub service_state: ServiceRunState,
    pub interface: String,
    pub interface_state: InterfaceState,
    pub tunnel: Option<TunnelParams>,
    pub ping_target: Option<Ipv4Addr>,
    pub ping_ok: Option<bool>,
}

/// [`Tunnel`] backed by an init-system service and an OS interface.
pub struct VpnConnection<R, S> {
    session: VpnSession,
    service: ServiceController<R, S>,
    options: ConnectionOptions,
}

impl<R: CommandRunner, S: Sleeper> VpnConnection<R, S> {
    pub fn new(
        session: VpnSession,
        handle: ServiceHandle,
        options: ConnectionOptions,
        runner: R,
        sleeper: S,
    ) -> Self {
        Self {
            session,
            service: ServiceController::new(handle, runner, sleeper),
            options,
        }
    }

    /// Build the tunnel described by `config`.
    pub fn from_config(config: &Config, runner: R, sleeper: S) -> Self {
        Self::new(
            VpnSession::new(&config.vpn.provider, &config.vpn.interface),
            config.vpn_service(),
            ConnectionOptions::from_config(config),
            runner,
            sleeper,
        )
    }

    #[must_use]
    pub const fn service(&self) -> &ServiceController<R, S> {
        &self.service
    }

    fn inspector(&self) -> InterfaceInspector<&R> {
        InterfaceInspector::new(self.service.runner())
    }

    /// All three conditions of a usable tunnel, checked together: service
    /// running, interface up, last ping answered.
    pub fn is_connected(&self) -> bool {
        self.session.last_ping_ok
            && self.service_status().is_running()
            && self.interface_status().is_up()
    }

    /// Probe everything once without changing any state on the host.
    pub fn report(&mut self) -> ConnectionReport {
        let service_state = self.service_status();
        let interface_state = self.interface_status();
        let mut ping_ok = None;
        if interface_state.is_up() && self.update_info().is_ok() {
            ping_ok = Some(self.ping_peer());
        }
        ConnectionReport {
            provider: self.session.provider.clone(),
            service: self.service.handle().name.clone(),
            service_state,
            interface: self.session.interface.clone(),
            interface_state,
            tunnel: self.session.tunnel,
            ping_target: self.session.ping_target,
            ping_ok,
        }
    }
}

impl<R: CommandRunner, S: Sleeper> Tunnel for VpnConnection<R, S> {
    fn session(&self) -> &VpnSession {
        &self.session
    }

    fn service_status(&self) -> ServiceRunState {
        self.service.status()
    }

    fn interface_status(&self) -> InterfaceState {
        self.inspector().status(&self.session.interface)
    }

    fn start(&mut self) -> Result<ServiceRunState> {
        self.session.invalidate();
        let state = self
            .service
            .start(self.options.start_attempts, self.options.start_wait)?;
        if !state.is_running() {
            return Ok(state);
        }

        let policy = RetryPolicy {
            attempts: self.options.start_attempts,
            wait: self.options.start_wait,
            backoff: Backoff::Exponential {
                cap: constants::INTERFACE_WAIT_CAP,
            },
        };
        let interface = &self.session.interface;
        let inspector = self.inspector();
        if poll_until(policy, self.service.sleeper(), |_| {
            inspector.status(interface).is_up()
        }) {
            info!("VPN: interface {interface} is up");
        } else {
            warn!("VPN: interface {interface} did not appear");
        }
        Ok(state)
    }

    fn stop(&mut self) -> ServiceRunState {
        self.session.invalidate();
        self.service.stop()
    }

    fn update_info(&mut self) -> Result<Ipv4Addr> {
        let Some(params) = self.inspector().tunnel_params(&self.session.interface) else {
            self.session.invalidate();
            return Err(Error::TransientNetwork(format!(
                "no local/peer address on {}",
                self.session.interface
            )));
        };
        let target = params.ping_target(self.options.ping_gateway_one);
        debug!(
            "VPN: local {} peer {} ping target {target}",
            params.local_addr, params.peer_addr
        );
        self.session.tunnel = Some(params);
        self.session.ping_target = Some(target);
        Ok(target)
    }

    fn ping_peer(&mut self) -> bool {
        let Some(target) = self.session.ping_target else {
            self.session.last_ping_ok = false;
            return false;
        };
        let ok = ping_once(self.service.runner(), target, self.options.ping_timeout_secs);
        self.session.last_ping_ok = ok;
        ok
    }
}
