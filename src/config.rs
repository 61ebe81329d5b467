//! Job configuration.
//!
//! Loaded once from TOML at startup and passed by reference from then on.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::constants;
use crate::error::{Error, Result};
use crate::platform::service::ServiceHandle;
use crate::state::InitSystem;

/// Root of `config.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub init_system: InitSystem,
    #[serde(default = "default_init_script_dir")]
    pub init_script_dir: PathBuf,
    /// Stop the client and the VPN when nothing needs the tunnel.
    #[serde(default = "default_true")]
    pub stop_when_idle: bool,
    pub vpn: VpnConfig,
    #[serde(default)]
    pub lan: LanConfig,
    pub routing: RoutingConfig,
    pub torrent: TorrentConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// `[vpn]`
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VpnConfig {
    pub provider: String,
    pub interface: String,
    /// Service name override. Derived from the provider when absent.
    pub service: Option<String>,
    /// Ping `x.y.z.1` instead of the advertised peer.
    #[serde(default)]
    pub ping_gateway_one: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_start_attempts")]
    pub start_attempts: u32,
    #[serde(default = "default_start_wait_secs")]
    pub start_wait_secs: u64,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

/// `[lan]`, discovered from the default route when left empty.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanConfig {
    pub interface: Option<String>,
    pub gateway: Option<Ipv4Addr>,
}

/// `[routing]`
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Script installing policy routes and firewall marks.
    pub script: PathBuf,
    pub fwmark: u32,
    pub table: u32,
    /// User whose traffic is marked for the tunnel.
    pub user: String,
}

/// `[torrent]`
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TorrentConfig {
    /// Service name of the torrent client.
    pub service: String,
    /// Directory the client watches for new `.torrent` files.
    pub watch_dir: PathBuf,
    /// Directory holding the client's active torrents.
    pub active_dir: PathBuf,
    /// Client `settings.json`; when set, the bind address is kept in sync
    /// with the tunnel address.
    pub settings_file: Option<PathBuf>,
}

/// `[feed]`
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedConfig {
    /// Argv of the feed fetcher. Empty disables it.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_every_hours")]
    pub every_hours: u32,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            every_hours: default_every_hours(),
            window_minutes: default_window_minutes(),
        }
    }
}

fn default_init_script_dir() -> PathBuf {
    PathBuf::from(constants::DEFAULT_INIT_SCRIPT_DIR)
}
const fn default_true() -> bool {
    true
}
const fn default_max_attempts() -> u32 {
    constants::DEFAULT_MAX_ATTEMPTS
}
const fn default_start_attempts() -> u32 {
    constants::SERVICE_MAX_TRY_COUNT
}
const fn default_start_wait_secs() -> u64 {
    constants::SERVICE_TRY_WAIT_SECS
}
const fn default_ping_timeout_secs() -> u64 {
    constants::PING_TIMEOUT_SECS
}
const fn default_every_hours() -> u32 {
    constants::DEFAULT_FEED_EVERY_HOURS
}
const fn default_window_minutes() -> u32 {
    constants::DEFAULT_FEED_WINDOW_MINUTES
}

impl Config {
    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] on syntax errors, unknown keys, an
    /// unsupported init system or failed validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the file at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("CONFIG: loading {}", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Reject values that would make the job meaningless.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        let non_empty = [
            ("vpn.provider", self.vpn.provider.as_str()),
            ("vpn.interface", self.vpn.interface.as_str()),
            ("routing.user", self.routing.user.as_str()),
            ("torrent.service", self.torrent.service.as_str()),
        ];
        for (key, value) in non_empty {
            if value.trim().is_empty() {
                return Err(Error::Configuration(format!("{key} must not be empty")));
            }
        }
        if self.vpn.service.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(Error::Configuration("vpn.service must not be empty".into()));
        }
        if self.vpn.max_attempts == 0 {
            return Err(Error::Configuration("vpn.max_attempts must be at least 1".into()));
        }
        if self.vpn.start_attempts == 0 {
            return Err(Error::Configuration("vpn.start_attempts must be at least 1".into()));
        }
        if self.feed.every_hours == 0 {
            return Err(Error::Configuration("feed.every_hours must be at least 1".into()));
        }
        Ok(())
    }

    /// Name of the VPN service, derived from the provider unless overridden.
    #[must_use]
    pub fn vpn_service_name(&self) -> String {
        if let Some(name) = &self.vpn.service {
            return name.clone();
        }
        let prefix = match self.init_system {
            InitSystem::OpenRc => constants::OPENRC_VPN_SERVICE_PREFIX,
            InitSystem::Systemd => constants::SYSTEMD_VPN_SERVICE_TEMPLATE,
        };
        format!("{prefix}{}", self.vpn.provider)
    }

    #[must_use]
    pub fn vpn_service(&self) -> ServiceHandle {
        ServiceHandle::new(self.vpn_service_name(), self.init_system, &self.init_script_dir)
    }

    #[must_use]
    pub fn client_service(&self) -> ServiceHandle {
        ServiceHandle::new(
            self.torrent.service.clone(),
            self.init_system,
            &self.init_script_dir,
        )
    }

    #[must_use]
    pub const fn start_wait(&self) -> Duration {
        Duration::from_secs(self.vpn.start_wait_secs)
    }
}

/// Pick the config file: explicit path, then the system file, then the
/// user config directory.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let system = PathBuf::from(constants::SYSTEM_CONFIG_PATH);
    if system.is_file() {
        return system;
    }
    dirs::config_dir().map_or(system, |dir| {
        dir.join(constants::APP_NAME).join(constants::CONFIG_FILE_NAME)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
init_system = "openrc"

[vpn]
provider = "acme"
interface = "tun25"
ping_gateway_one = true

[routing]
script = "/usr/local/sbin/vpn-routes.sh"
fwmark = 3
table = 200
user = "transmission"

[torrent]
service = "transmission-daemon"
watch_dir = "/var/lib/transmission/watch"
active_dir = "/var/lib/transmission/torrents"

[feed]
command = ["flexget", "execute"]
"#;

    #[test]
    fn test_parse_sample_with_defaults() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.init_system, InitSystem::OpenRc);
        assert_eq!(config.init_script_dir, PathBuf::from("/etc/init.d"));
        assert!(config.stop_when_idle);
        assert_eq!(config.vpn.max_attempts, 2);
        assert_eq!(config.vpn.start_attempts, 5);
        assert_eq!(config.start_wait(), Duration::from_secs(2));
        assert_eq!(config.feed.every_hours, 2);
        assert_eq!(config.feed.window_minutes, 5);
        assert!(config.lan.interface.is_none());
        assert!(config.torrent.settings_file.is_none());
    }

    #[test]
    fn test_vpn_service_name() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.vpn_service_name(), "openvpn.acme");
        assert_eq!(config.vpn_service().init_system, InitSystem::OpenRc);

        let systemd = SAMPLE.replace("\"openrc\"", "\"systemd\"");
        let config = Config::from_toml_str(&systemd).unwrap();
        assert_eq!(config.vpn_service_name(), "openvpn-client@acme");

        let custom = SAMPLE.replace("ping_gateway_one = true", "service = \"vpn-acme\"");
        let config = Config::from_toml_str(&custom).unwrap();
        assert_eq!(config.vpn_service_name(), "vpn-acme");
        assert!(!config.vpn.ping_gateway_one);
    }

    #[test]
    fn test_unsupported_init_system() {
        let text = SAMPLE.replace("\"openrc\"", "\"upstart\"");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("upstart"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let text = format!("{SAMPLE}\n[bogus]\nkey = 1\n");
        assert!(matches!(
            Config::from_toml_str(&text),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_zero_attempts() {
        let text = SAMPLE.replace("ping_gateway_one = true", "max_attempts = 0");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("vpn.max_attempts"));
    }

    #[test]
    fn test_validate_empty_interface() {
        let text = SAMPLE.replace("interface = \"tun25\"", "interface = \" \"");
        let err = Config::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("vpn.interface"));
    }

    #[test]
    fn test_lan_override() {
        let text = format!("{SAMPLE}\n[lan]\ninterface = \"eth1\"\ngateway = \"10.0.0.1\"\n");
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.lan.interface.as_deref(), Some("eth1"));
        assert_eq!(config.lan.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/tunnelgate.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_resolve_explicit_path() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(resolve_config_path(Some(path)), PathBuf::from("/tmp/custom.toml"));
    }
}
