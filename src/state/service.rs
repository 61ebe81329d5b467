//! Init system and service run-state types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Supported init systems.
///
/// Closed set: anything else is rejected when the config is loaded.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InitSystem {
    /// `OpenRC`, services driven through `/etc/init.d/<name>`.
    OpenRc,
    /// systemd, services driven through `systemctl`.
    Systemd,
}

impl InitSystem {
    /// Name used in config files and passed to the routing script.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenRc => "openrc",
            Self::Systemd => "systemd",
        }
    }
}

impl std::fmt::Display for InitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitSystem {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openrc" => Ok(Self::OpenRc),
            "systemd" => Ok(Self::Systemd),
            other => Err(Error::Configuration(format!(
                "unsupported init system: {other:?} (expected \"openrc\" or \"systemd\")"
            ))),
        }
    }
}

impl TryFrom<String> for InitSystem {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InitSystem> for String {
    fn from(value: InitSystem) -> Self {
        value.as_str().to_string()
    }
}

/// Whether a service is running, as reported by one status query.
///
/// Never cached: the service can change state at any time.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRunState {
    #[default]
    Stopped,
    Running,
}

impl ServiceRunState {
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ServiceRunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}
