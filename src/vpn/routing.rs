//! Installation of policy routes and firewall marks once the tunnel is up.
//!
//! The actual `ip rule`/`iptables` work is done by an external script; this
//! module gathers its arguments and runs it.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use ipnet::Ipv4Net;
use log::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::platform::exec::{display_command, CommandRunner};
use crate::platform::interface::InterfaceInspector;
use crate::platform::route::RouteInspector;
use crate::state::{InitSystem, VpnSession};

/// Applies routing rules for a freshly started tunnel.
pub trait RulesApplier {
    /// # Errors
    ///
    /// Any error is fatal to the current `ensure` call.
    fn apply(&self, session: &VpnSession) -> Result<()>;
}

/// Everything the routing script is told.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingPlan {
    pub script: PathBuf,
    pub init_system: InitSystem,
    pub lan_interface: String,
    pub lan_gateway: Ipv4Addr,
    pub lan_network: Ipv4Net,
    pub provider: String,
    pub vpn_interface: String,
    pub fwmark: u32,
    pub table: u32,
    pub user: String,
}

impl RoutingPlan {
    /// Positional flags passed to the script.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        vec![
            "-i".into(),
            self.init_system.to_string(),
            "-l".into(),
            self.lan_interface.clone(),
            "-g".into(),
            self.lan_gateway.to_string(),
            "-n".into(),
            self.lan_network.to_string(),
            "-p".into(),
            self.provider.clone(),
            "-v".into(),
            self.vpn_interface.clone(),
            "-m".into(),
            self.fwmark.to_string(),
            "-t".into(),
            self.table.to_string(),
            "-u".into(),
            self.user.clone(),
        ]
    }

    #[must_use]
    pub fn command_line(&self) -> String {
        let args = self.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        display_command(&self.script.display().to_string(), &args)
    }
}

/// [`RulesApplier`] running the configured routing script.
pub struct ScriptApplier<'a, R> {
    config: &'a Config,
    runner: R,
}

impl<'a, R: CommandRunner> ScriptApplier<'a, R> {
    pub const fn new(config: &'a Config, runner: R) -> Self {
        Self { config, runner }
    }

    /// Resolve LAN details from config, falling back to the default route.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the LAN interface, gateway or network
    /// cannot be determined.
    pub fn plan(&self, session: &VpnSession) -> Result<RoutingPlan> {
        let lan = &self.config.lan;
        let default_route = if lan.interface.is_none() || lan.gateway.is_none() {
            RouteInspector::new(&self.runner).default_route()
        } else {
            None
        };

        let lan_interface = lan
            .interface
            .clone()
            .or_else(|| default_route.as_ref().map(|r| r.interface.clone()))
            .ok_or_else(|| {
                Error::Configuration("no LAN interface configured and no default route".into())
            })?;
        let lan_gateway = lan
            .gateway
            .or_else(|| default_route.as_ref().map(|r| r.gateway))
            .ok_or_else(|| {
                Error::Configuration("no LAN gateway configured and no default route".into())
            })?;
        let lan_network = InterfaceInspector::new(&self.runner)
            .network_params(&lan_interface)
            .ok_or_else(|| {
                Error::Configuration(format!("no IPv4 network on LAN interface {lan_interface}"))
            })?;

        let routing = &self.config.routing;
        Ok(RoutingPlan {
            script: routing.script.clone(),
            init_system: self.config.init_system,
            lan_interface,
            lan_gateway,
            lan_network,
            provider: session.provider.clone(),
            vpn_interface: session.interface.clone(),
            fwmark: routing.fwmark,
            table: routing.table,
            user: routing.user.clone(),
        })
    }
}

impl<R: CommandRunner> RulesApplier for ScriptApplier<'_, R> {
    fn apply(&self, session: &VpnSession) -> Result<()> {
        let plan = self.plan(session)?;
        info!("ROUTES: {}", plan.command_line());

        let program = plan.script.display().to_string();
        let args = plan.args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run(&program, &args)?.into_result(&program)?;
        info!("ROUTES: rules installed for {}", session.interface);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::platform::exec::scripted::ScriptedRunner;
    use crate::platform::exec::CommandOutput;

    const ROUTES: &str = "\
Kernel IP routing table
Destination     Gateway         Genmask         Flags Metric Ref    Use Iface
0.0.0.0         192.168.1.1     0.0.0.0         UG    100    0        0 eth0
";
    const LAN_ADDR: &str = "2: eth0    inet 192.168.1.10/24 brd 192.168.1.255 scope global eth0\n";
    const SCRIPT: &str = "/usr/local/sbin/vpn-routes.sh -i openrc -l eth0 -g 192.168.1.1 \
-n 192.168.1.0/24 -p acme -v tun25 -m 3 -t 200 -u transmission";

    fn session() -> VpnSession {
        VpnSession::new("acme", "tun25")
    }

    fn lan_runner() -> ScriptedRunner {
        let runner = ScriptedRunner::new();
        runner.script("route -n", vec![CommandOutput::ok(ROUTES)]);
        runner.script("ip -o -4 addr show dev eth0", vec![CommandOutput::ok(LAN_ADDR)]);
        runner
    }

    #[test]
    fn test_plan_from_default_route() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let runner = lan_runner();
        let plan = ScriptApplier::new(&config, &runner).plan(&session()).unwrap();
        assert_eq!(plan.command_line(), SCRIPT);
    }

    #[test]
    fn test_plan_uses_overrides() {
        let text = format!("{SAMPLE}\n[lan]\ninterface = \"eth1\"\ngateway = \"10.0.0.1\"\n");
        let config = Config::from_toml_str(&text).unwrap();
        let runner = ScriptedRunner::new();
        runner.script(
            "ip -o -4 addr show dev eth1",
            vec![CommandOutput::ok("3: eth1    inet 10.0.0.7/16 scope global eth1\n")],
        );
        let plan = ScriptApplier::new(&config, &runner).plan(&session()).unwrap();
        assert_eq!(plan.lan_interface, "eth1");
        assert_eq!(plan.lan_network.to_string(), "10.0.0.0/16");
        assert_eq!(runner.count("route -n"), 0);
    }

    #[test]
    fn test_plan_without_lan_is_configuration_error() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let runner = ScriptedRunner::new();
        let err = ScriptApplier::new(&config, &runner).plan(&session()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_apply_runs_script() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let runner = lan_runner();
        runner.script(SCRIPT, vec![CommandOutput::ok("")]);
        ScriptApplier::new(&config, &runner).apply(&session()).unwrap();
        assert_eq!(runner.count(SCRIPT), 1);
    }

    #[test]
    fn test_apply_nonzero_exit_is_external_tool_error() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        let runner = lan_runner();
        runner.script(SCRIPT, vec![CommandOutput::failed(2, "RTNETLINK answers: File exists")]);
        let err = ScriptApplier::new(&config, &runner).apply(&session()).unwrap_err();
        assert!(matches!(err, Error::ExternalTool { code: Some(2), .. }));
        assert!(err.is_fatal());
    }
}
