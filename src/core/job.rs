//! The periodic job: decide whether the tunnel is needed, bring it up, then
//! gate the torrent client and the feed fetcher behind it.

use std::net::Ipv4Addr;

use chrono::{Local, Timelike};
use log::{info, warn};

use crate::config::{Config, FeedConfig};
use crate::constants;
use crate::core::client::{self, ClientAction};
use crate::core::retry::Sleeper;
use crate::core::torrents;
use crate::error::{Error, Result};
use crate::platform::exec::CommandRunner;
use crate::platform::service::ServiceController;
use crate::vpn::{EnsureOutcome, RulesApplier, Tunnel, VpnOrchestrator};

/// How a job run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// The tunnel is up and downstream work was handled.
    Ran {
        vpn_addr: Ipv4Addr,
        /// `None` when the client had nothing to do.
        client: Option<ClientAction>,
        /// `None` when the feed fetcher was not due, else whether it succeeded.
        feed: Option<bool>,
    },
    /// Work was pending but the tunnel could not be established. The client
    /// has been stopped.
    VpnUnavailable,
    /// Nothing needs the tunnel.
    Idle,
}

/// Whether the feed fetcher is due at `hour:minute` local time.
#[must_use]
pub fn feed_window_open(feed: &FeedConfig, hour: u32, minute: u32) -> bool {
    feed.every_hours > 0 && hour % feed.every_hours == 0 && minute < feed.window_minutes
}

/// Runs one pass of the job.
pub struct JobDriver<'a, T, A, R, S> {
    config: &'a Config,
    orchestrator: VpnOrchestrator<T, A>,
    client: ServiceController<R, S>,
    runner: R,
}

impl<'a, T, A, R, S> JobDriver<'a, T, A, R, S>
where
    T: Tunnel,
    A: RulesApplier,
    R: CommandRunner + Clone,
    S: Sleeper,
{
    pub fn new(config: &'a Config, orchestrator: VpnOrchestrator<T, A>, runner: R, sleeper: S) -> Self {
        Self {
            config,
            orchestrator,
            client: ServiceController::new(config.client_service(), runner.clone(), sleeper),
            runner,
        }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &VpnOrchestrator<T, A> {
        &self.orchestrator
    }

    /// Run using the current local time.
    ///
    /// # Errors
    ///
    /// See [`JobDriver::run`].
    pub fn run_now(&mut self) -> Result<JobOutcome> {
        let now = Local::now();
        info!("JOB: local time {:02}:{:02}", now.hour(), now.minute());
        self.run(now.hour(), now.minute())
    }

    /// Run as if the local time were `hour:minute`.
    ///
    /// # Errors
    ///
    /// Unreadable torrent directories, fatal errors from the orchestrator and
    /// failures editing the client settings.
    pub fn run(&mut self, hour: u32, minute: u32) -> Result<JobOutcome> {
        let feed_needed =
            !self.config.feed.command.is_empty() && feed_window_open(&self.config.feed, hour, minute);
        let scan = torrents::scan(&self.config.torrent.watch_dir, &self.config.torrent.active_dir)?;
        let client_needed = scan.client_needed();
        info!("JOB: feed needed: {feed_needed}, client needed: {client_needed}");

        if !feed_needed && !client_needed {
            info!("JOB: {}", constants::MSG_IDLE);
            if self.config.stop_when_idle {
                self.client.stop();
                self.orchestrator.teardown();
            }
            return Ok(JobOutcome::Idle);
        }

        let outcome = match self.orchestrator.ensure(self.config.vpn.max_attempts) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.client.stop();
                return Err(e);
            }
        };
        if outcome == EnsureOutcome::Failed {
            warn!("JOB: {}", constants::MSG_VPN_FAILED);
            self.client.stop();
            return Ok(JobOutcome::VpnUnavailable);
        }

        let vpn_addr = self.orchestrator.current_addr().ok_or_else(|| {
            Error::TransientNetwork("connected tunnel has no local address".into())
        })?;
        info!("JOB: {} ({vpn_addr})", constants::MSG_VPN_READY);

        let client = if client_needed {
            let action = client::reconcile(
                &self.client,
                self.config.torrent.settings_file.as_deref(),
                vpn_addr,
                self.config.vpn.start_attempts,
                self.config.start_wait(),
            )?;
            info!("JOB: client {action:?}");
            Some(action)
        } else {
            None
        };

        let feed = feed_needed.then(|| self.run_feed());

        Ok(JobOutcome::Ran {
            vpn_addr,
            client,
            feed,
        })
    }

    fn run_feed(&self) -> bool {
        let Some((program, args)) = self.config.feed.command.split_first() else {
            return false;
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        info!("JOB: running feed fetcher {program}");
        match self.runner.run(program, &args) {
            Ok(out) if out.success() => true,
            Ok(out) => {
                warn!("JOB: feed fetcher exited {:?}: {}", out.code, out.diagnostic());
                false
            }
            Err(e) => {
                warn!("JOB: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::core::retry::recording::RecordingSleeper;
    use crate::core::torrents::tests::temp_dir;
    use crate::platform::exec::scripted::ScriptedRunner;
    use crate::platform::exec::CommandOutput;
    use crate::state::{TunnelState, VpnSession};
    use crate::vpn::connection::tests as conn;

    const CLIENT_STATUS: &str = "/etc/init.d/transmission-daemon status";
    const CLIENT_START: &str = "/etc/init.d/transmission-daemon start";
    const CLIENT_STOP: &str = "/etc/init.d/transmission-daemon stop";

    struct NoRoutes;

    impl RulesApplier for NoRoutes {
        fn apply(&self, _session: &VpnSession) -> Result<()> {
            Ok(())
        }
    }

    fn config(name: &str) -> (Config, PathBuf, PathBuf) {
        let watch = temp_dir(&format!("job-{name}-watch"));
        let active = temp_dir(&format!("job-{name}-active"));
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.torrent.watch_dir = watch.clone();
        config.torrent.active_dir = active.clone();
        config.vpn.max_attempts = 1;
        (config, watch, active)
    }

    fn script_connected_vpn(runner: &ScriptedRunner) {
        runner.script(conn::STATUS, vec![conn::running()]);
        runner.script(conn::LINKS, vec![conn::links(true)]);
        runner.script(conn::ADDR, vec![conn::tun_addr()]);
        runner.script(conn::PING, vec![CommandOutput::ok("")]);
    }

    #[test]
    fn test_feed_window() {
        let feed = FeedConfig::default();
        assert!(feed_window_open(&feed, 0, 0));
        assert!(feed_window_open(&feed, 14, 4));
        assert!(!feed_window_open(&feed, 14, 5));
        assert!(!feed_window_open(&feed, 13, 0));

        let hourly = FeedConfig {
            every_hours: 1,
            window_minutes: 10,
            ..FeedConfig::default()
        };
        assert!(feed_window_open(&hourly, 13, 9));
    }

    #[test]
    fn test_idle_stops_everything() {
        let (config, watch, active) = config("idle");
        let runner = ScriptedRunner::new();
        let sleeper = RecordingSleeper::default();
        let orch = VpnOrchestrator::new(conn::connection(&runner, &sleeper, 1), NoRoutes);
        let mut driver = JobDriver::new(&config, orch, &runner, &sleeper);

        assert_eq!(driver.run(13, 30).unwrap(), JobOutcome::Idle);
        assert_eq!(runner.count(CLIENT_STOP), 1);
        assert_eq!(runner.count(conn::STOP), 1);
        assert_eq!(runner.count(conn::PING), 0);
        assert_eq!(driver.orchestrator().state(), TunnelState::ServiceDown);

        let _ = fs::remove_dir_all(&watch);
        let _ = fs::remove_dir_all(&active);
    }

    #[test]
    fn test_pending_torrent_starts_client_behind_vpn() {
        let (config, watch, active) = config("pending");
        fs::write(watch.join("linux.iso.torrent"), "").unwrap();
        let runner = ScriptedRunner::new();
        script_connected_vpn(&runner);
        runner.script(
            CLIENT_STATUS,
            vec![
                CommandOutput::failed(3, " * status: stopped"),
                CommandOutput::ok(" * status: started"),
            ],
        );
        runner.script(CLIENT_START, vec![CommandOutput::ok(" * Starting transmission-daemon ... [ ok ]")]);
        let sleeper = RecordingSleeper::default();
        let orch = VpnOrchestrator::new(conn::connection(&runner, &sleeper, 1), NoRoutes);
        let mut driver = JobDriver::new(&config, orch, &runner, &sleeper);

        let outcome = driver.run(13, 30).unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Ran {
                vpn_addr: Ipv4Addr::new(10, 8, 0, 51),
                client: Some(ClientAction::Started),
                feed: None,
            }
        );
        assert_eq!(runner.count("flexget execute"), 0);

        let _ = fs::remove_dir_all(&watch);
        let _ = fs::remove_dir_all(&active);
    }

    #[test]
    fn test_feed_window_runs_fetcher_only() {
        let (config, watch, active) = config("feed");
        let runner = ScriptedRunner::new();
        script_connected_vpn(&runner);
        runner.script("flexget execute", vec![CommandOutput::ok("")]);
        let sleeper = RecordingSleeper::default();
        let orch = VpnOrchestrator::new(conn::connection(&runner, &sleeper, 1), NoRoutes);
        let mut driver = JobDriver::new(&config, orch, &runner, &sleeper);

        let outcome = driver.run(2, 3).unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Ran {
                vpn_addr: Ipv4Addr::new(10, 8, 0, 51),
                client: None,
                feed: Some(true),
            }
        );
        assert_eq!(runner.count(CLIENT_START), 0);

        let _ = fs::remove_dir_all(&watch);
        let _ = fs::remove_dir_all(&active);
    }

    #[test]
    fn test_vpn_failure_stops_client() {
        let (config, watch, active) = config("vpn-down");
        fs::write(active.join("abc.torrent"), "").unwrap();
        let runner = ScriptedRunner::new();
        runner.script(conn::STATUS, vec![conn::running()]);
        runner.script(conn::LINKS, vec![conn::links(true)]);
        runner.script(conn::ADDR, vec![conn::tun_addr()]);
        runner.script(conn::PING, vec![CommandOutput::failed(1, "")]);
        let sleeper = RecordingSleeper::default();
        let orch = VpnOrchestrator::new(conn::connection(&runner, &sleeper, 1), NoRoutes);
        let mut driver = JobDriver::new(&config, orch, &runner, &sleeper);

        assert_eq!(driver.run(13, 30).unwrap(), JobOutcome::VpnUnavailable);
        assert_eq!(runner.count(CLIENT_STOP), 1);
        assert_eq!(runner.count(CLIENT_START), 0);

        let _ = fs::remove_dir_all(&watch);
        let _ = fs::remove_dir_all(&active);
    }
}
