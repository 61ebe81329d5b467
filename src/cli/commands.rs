//! CLI command handlers.
//!
//! Each handler wires the real process runner and sleeper into the library
//! types and turns outcomes into exit status.

use std::path::Path;

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use log::info;

use crate::cli::args::Commands;
use crate::config::{self, Config};
use crate::constants;
use crate::core::job::{JobDriver, JobOutcome};
use crate::core::retry::ThreadSleeper;
use crate::platform::exec::SystemRunner;
use crate::platform::service::{ServiceAction, ServiceController};
use crate::state::VpnSession;
use crate::vpn::{ConnectionReport, EnsureOutcome, ScriptApplier, VpnConnection, VpnOrchestrator};

type Orchestrator<'a> = VpnOrchestrator<
    VpnConnection<SystemRunner, ThreadSleeper>,
    ScriptApplier<'a, SystemRunner>,
>;

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config::resolve_config_path(explicit);
    Config::load(&path).wrap_err_with(|| format!("Failed to load {}", path.display()))
}

fn orchestrator(config: &Config) -> Orchestrator<'_> {
    VpnOrchestrator::new(
        VpnConnection::from_config(config, SystemRunner, ThreadSleeper),
        ScriptApplier::new(config, SystemRunner),
    )
}

/// Dispatch a parsed command. `None` runs the job.
///
/// # Errors
///
/// Configuration problems, fatal job errors, or a tunnel that could not be
/// established.
pub fn dispatch(command: Option<Commands>, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    match command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config),
        Commands::Up { attempts } => up(&config, attempts),
        Commands::Down => {
            down(&config);
            Ok(())
        }
        Commands::Status { json } => status(&config, json),
        Commands::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let mut driver = JobDriver::new(config, orchestrator(config), SystemRunner, ThreadSleeper);
    match driver.run_now()? {
        JobOutcome::Ran {
            vpn_addr,
            client,
            feed,
        } => {
            println!("{} ({vpn_addr})", constants::MSG_VPN_READY);
            if let Some(action) = client {
                println!("Torrent client: {action:?}");
            }
            if feed == Some(false) {
                println!("Feed fetcher failed, see log");
            }
            Ok(())
        }
        JobOutcome::Idle => {
            println!("{}", constants::MSG_IDLE);
            Ok(())
        }
        JobOutcome::VpnUnavailable => bail!(constants::MSG_VPN_FAILED),
    }
}

fn up(config: &Config, attempts: Option<u32>) -> Result<()> {
    let attempts = attempts.unwrap_or(config.vpn.max_attempts);
    let mut orch = orchestrator(config);
    match orch.ensure(attempts)? {
        EnsureOutcome::Connected => {
            let addr = orch
                .current_addr()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string());
            println!("{} ({addr})", constants::MSG_VPN_READY);
            Ok(())
        }
        EnsureOutcome::Failed => bail!(
            "{} after {attempts} attempt(s)",
            constants::MSG_VPN_FAILED
        ),
    }
}

fn down(config: &Config) {
    let client = ServiceController::new(config.client_service(), SystemRunner, ThreadSleeper);
    client.stop();
    orchestrator(config).teardown();
    info!("VPN: down");
    println!("Torrent client and VPN stopped");
}

fn status(config: &Config, json: bool) -> Result<()> {
    let mut connection = VpnConnection::from_config(config, SystemRunner, ThreadSleeper);
    let report = connection.report();
    if json {
        let text = serde_json::to_string_pretty(&report).wrap_err("Failed to encode status")?;
        println!("{text}");
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

fn check_config(config: &Config) {
    println!("Configuration OK");
    println!("  Init system:  {}", config.init_system);
    for (label, handle) in [("VPN", config.vpn_service()), ("Client", config.client_service())] {
        for action in [ServiceAction::Start, ServiceAction::Stop, ServiceAction::Status] {
            println!("  {label:<12}  {}", handle.command_line(action));
        }
    }
    let session = VpnSession::new(&config.vpn.provider, &config.vpn.interface);
    match ScriptApplier::new(config, SystemRunner).plan(&session) {
        Ok(plan) => println!("  Routing:      {}", plan.command_line()),
        Err(e) => println!("  Routing:      {} ({e})", config.routing.script.display()),
    }
}

fn format_report(report: &ConnectionReport) -> String {
    let iface = if report.interface_state.is_up() { "up" } else { "down" };
    let mut out = format!(
        "Provider:   {}\nService:    {} ({})\nInterface:  {} ({iface})\n",
        report.provider, report.service, report.service_state, report.interface
    );
    if let Some(tunnel) = report.tunnel {
        out.push_str(&format!(
            "Local:      {}\nPeer:       {}\n",
            tunnel.local_addr, tunnel.peer_addr
        ));
    }
    if let Some(target) = report.ping_target {
        let ping = match report.ping_ok {
            Some(true) => "ok",
            Some(false) => "no reply",
            None => "not tried",
        };
        out.push_str(&format!("Ping:       {target} ({ping})\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::state::{InterfaceState, ServiceRunState, TunnelParams};

    fn report() -> ConnectionReport {
        ConnectionReport {
            provider: "acme".into(),
            service: "openvpn.acme".into(),
            service_state: ServiceRunState::Running,
            interface: "tun0".into(),
            interface_state: InterfaceState::Up,
            tunnel: Some(TunnelParams {
                local_addr: Ipv4Addr::new(10, 8, 0, 51),
                peer_addr: Ipv4Addr::new(10, 8, 0, 50),
            }),
            ping_target: Some(Ipv4Addr::new(10, 8, 0, 1)),
            ping_ok: Some(true),
        }
    }

    #[test]
    fn test_format_connected_report() {
        let text = format_report(&report());
        assert!(text.contains("openvpn.acme (running)"));
        assert!(text.contains("tun0 (up)"));
        assert!(text.contains("Local:      10.8.0.51"));
        assert!(text.contains("10.8.0.1 (ok)"));
    }

    #[test]
    fn test_format_down_report() {
        let mut report = report();
        report.service_state = ServiceRunState::Stopped;
        report.interface_state = InterfaceState::Down;
        report.tunnel = None;
        report.ping_target = None;
        report.ping_ok = None;

        let text = format_report(&report);
        assert!(text.contains("(stopped)"));
        assert!(text.contains("tun0 (down)"));
        assert!(!text.contains("Ping"));
    }

    #[test]
    fn test_missing_config_is_error() {
        let err = load_config(Some(Path::new("/nonexistent/tunnelgate.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tunnelgate.toml"));
    }
}
