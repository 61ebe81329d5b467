//! Application-wide constants and default configuration values.
//!
//! Defaults here are what the config file falls back to when a key is
//! omitted; everything is overridable per host.

use std::time::Duration;

// === Application Metadata ===

/// Application name (from Cargo.toml).
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
/// Current application version (from Cargo.toml).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// === Path Configuration ===

/// System-wide config file, preferred when present.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/tunnelgate/config.toml";
/// Name of the config file inside the user config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Directory holding `OpenRC` init scripts.
pub const DEFAULT_INIT_SCRIPT_DIR: &str = "/etc/init.d";
/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TUNNELGATE_CONFIG";
/// Default `env_logger` filter.
pub const DEFAULT_LOG_FILTER: &str = "tunnelgate=info";

// === VPN Defaults ===

/// Full connect attempts per `ensure` call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
/// Status polls after issuing a service start.
pub const SERVICE_MAX_TRY_COUNT: u32 = 5;
/// Seconds between those polls.
pub const SERVICE_TRY_WAIT_SECS: u64 = 2;
/// Timeout for the single reachability ping.
pub const PING_TIMEOUT_SECS: u64 = 2;
/// Longest single wait while the tunnel interface comes up; waits double
/// from the start wait until they reach it.
pub const INTERFACE_WAIT_CAP: Duration = Duration::from_secs(8);
/// `OpenRC` service name prefix for `OpenVPN` instances.
pub const OPENRC_VPN_SERVICE_PREFIX: &str = "openvpn.";
/// systemd template unit for `OpenVPN` clients.
pub const SYSTEMD_VPN_SERVICE_TEMPLATE: &str = "openvpn-client@";

// === Job Defaults ===

/// The feed fetcher runs in hours divisible by this.
pub const DEFAULT_FEED_EVERY_HOURS: u32 = 2;
/// ...during the first this-many minutes of such an hour.
pub const DEFAULT_FEED_WINDOW_MINUTES: u32 = 5;
/// Marker files the torrent client leaves behind after picking up a torrent.
pub const EXT_ADDED: &str = "added";
/// Torrent metadata files.
pub const EXT_TORRENT: &str = "torrent";
/// Key holding the IPv4 bind address in the torrent client's settings.
pub const CLIENT_BIND_ADDRESS_KEY: &str = "bind-address-ipv4";
/// Wait after stopping the client before touching its settings file.
pub const CLIENT_STOP_GRACE: Duration = Duration::from_secs(1);

// === Messages ===

pub const MSG_VPN_READY: &str = "VPN is good to go";
pub const MSG_VPN_FAILED: &str = "VPN could not be established";
pub const MSG_IDLE: &str = "Nothing needs the VPN";
pub const MSG_NOT_ROOT: &str =
    "not running as root; service control and routing changes will likely fail";
