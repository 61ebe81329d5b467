//! Control of OS-managed daemons through the init system.
//!
//! Status output is matched against a small rule set per init system, so
//! supporting another init system means adding a rule set rather than
//! editing the parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::core::retry::{poll_until, RetryPolicy, Sleeper};
use crate::error::Result;
use crate::platform::exec::{display_command, CommandOutput, CommandRunner};
use crate::state::{InitSystem, ServiceRunState};

/// Actions understood by every supported init system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Status,
}

impl ServiceAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Status => "status",
        }
    }
}

/// Substring rules for one init system.
struct StatusRules {
    running: &'static [&'static str],
    stopped: &'static [&'static str],
    /// Marker printed on a successful action, if the init system prints one.
    ok_marker: Option<&'static str>,
}

const OPENRC_RULES: StatusRules = StatusRules {
    running: &["started"],
    stopped: &["stopped"],
    ok_marker: Some("[ ok ]"),
};

const SYSTEMD_RULES: StatusRules = StatusRules {
    running: &["active (running)"],
    stopped: &["inactive (dead)"],
    ok_marker: None,
};

fn rules_for(kind: InitSystem) -> &'static StatusRules {
    match kind {
        InitSystem::OpenRc => &OPENRC_RULES,
        InitSystem::Systemd => &SYSTEMD_RULES,
    }
}

/// Map status command output to a run state.
///
/// Fail-closed: a non-zero exit, unrecognised text, or text matching both
/// sides all yield `Stopped`.
#[must_use]
pub fn parse_status(kind: InitSystem, output: &CommandOutput) -> ServiceRunState {
    if !output.success() {
        return ServiceRunState::Stopped;
    }
    let rules = rules_for(kind);
    let text = format!("{}\n{}", output.stdout, output.stderr).to_lowercase();
    let running = rules.running.iter().any(|m| text.contains(m));
    let stopped = rules.stopped.iter().any(|m| text.contains(m));

    match (running, stopped) {
        (true, false) => ServiceRunState::Running,
        (false, true) => ServiceRunState::Stopped,
        _ => {
            warn!(
                "SERVICE: ambiguous {kind} status output, assuming stopped: {}",
                output.stdout.trim()
            );
            ServiceRunState::Stopped
        }
    }
}

/// Whether a start command acknowledged the request.
#[must_use]
pub fn start_acknowledged(kind: InitSystem, output: &CommandOutput) -> bool {
    if output.success() {
        return true;
    }
    rules_for(kind).ok_marker.is_some_and(|marker| {
        output.stdout.to_lowercase().contains(marker) || output.stderr.to_lowercase().contains(marker)
    })
}

/// One OS-managed daemon. Immutable after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceHandle {
    pub name: String,
    pub init_system: InitSystem,
    /// Directory holding `OpenRC` init scripts.
    pub init_script_dir: PathBuf,
}

impl ServiceHandle {
    #[must_use]
    pub fn new(name: impl Into<String>, init_system: InitSystem, init_script_dir: &Path) -> Self {
        Self {
            name: name.into(),
            init_system,
            init_script_dir: init_script_dir.to_path_buf(),
        }
    }

    /// Program and arguments for `action`.
    #[must_use]
    pub fn command(&self, action: ServiceAction) -> (String, Vec<String>) {
        match self.init_system {
            InitSystem::OpenRc => (
                self.init_script_dir.join(&self.name).display().to_string(),
                vec![action.as_str().to_string()],
            ),
            InitSystem::Systemd => (
                "systemctl".to_string(),
                vec![action.as_str().to_string(), self.name.clone()],
            ),
        }
    }

    /// Printable command line for `action`.
    #[must_use]
    pub fn command_line(&self, action: ServiceAction) -> String {
        let (program, args) = self.command(action);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        display_command(&program, &args)
    }
}

/// Starts, stops and queries one service.
pub struct ServiceController<R, S> {
    handle: ServiceHandle,
    runner: R,
    sleeper: S,
}

impl<R: CommandRunner, S: Sleeper> ServiceController<R, S> {
    pub fn new(handle: ServiceHandle, runner: R, sleeper: S) -> Self {
        Self {
            handle,
            runner,
            sleeper,
        }
    }

    #[must_use]
    pub const fn handle(&self) -> &ServiceHandle {
        &self.handle
    }

    pub(crate) const fn runner(&self) -> &R {
        &self.runner
    }

    pub(crate) const fn sleeper(&self) -> &S {
        &self.sleeper
    }

    fn invoke(&self, action: ServiceAction) -> Result<CommandOutput> {
        let (program, args) = self.handle.command(action);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.runner.run(&program, &args)?;
        debug!(
            "SERVICE: {} {} exited {:?}",
            self.handle.name,
            action.as_str(),
            output.code
        );
        Ok(output)
    }

    /// Query the current run state. Anything unclear, including a status
    /// command that cannot be run, counts as stopped.
    pub fn status(&self) -> ServiceRunState {
        match self.invoke(ServiceAction::Status) {
            Ok(out) => parse_status(self.handle.init_system, &out),
            Err(e) => {
                warn!("SERVICE: {e}");
                ServiceRunState::Stopped
            }
        }
    }

    /// Issue the start command once, then poll status until it reports
    /// running or `attempts` polls have been made.
    ///
    /// A start command that neither exits zero nor prints the init system's
    /// ok marker returns `Stopped` straight away without polling.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`](crate::error::Error::Spawn) when the start command
    /// cannot be run at all, which points at a wrong service name or init
    /// script directory.
    pub fn start(&self, attempts: u32, wait: Duration) -> Result<ServiceRunState> {
        info!("SERVICE: starting {}", self.handle.name);
        let output = self.invoke(ServiceAction::Start)?;
        if !start_acknowledged(self.handle.init_system, &output) {
            warn!(
                "SERVICE: {} refused to start: {}",
                self.handle.name,
                output.diagnostic()
            );
            return Ok(ServiceRunState::Stopped);
        }

        let policy = RetryPolicy::fixed(attempts, wait);
        if poll_until(policy, &self.sleeper, |_| self.status().is_running()) {
            info!("SERVICE: {} is running", self.handle.name);
            Ok(ServiceRunState::Running)
        } else {
            warn!(
                "SERVICE: {} not running after {attempts} checks",
                self.handle.name
            );
            Ok(ServiceRunState::Stopped)
        }
    }

    /// Issue the stop command. Best effort: always reports `Stopped`.
    pub fn stop(&self) -> ServiceRunState {
        info!("SERVICE: stopping {}", self.handle.name);
        match self.invoke(ServiceAction::Stop) {
            Ok(output) if !output.success() => warn!(
                "SERVICE: stop of {} returned {:?}: {}",
                self.handle.name,
                output.code,
                output.diagnostic()
            ),
            Ok(_) => {}
            Err(e) => warn!("SERVICE: {e}"),
        }
        ServiceRunState::Stopped
    }
}
