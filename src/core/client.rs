//! Downstream torrent client handling.
//!
//! The client must only ever talk through the tunnel, so its IPv4 bind
//! address is pinned to the tunnel's local address. The client rewrites its
//! settings on exit, so it is stopped before the file is edited.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde_json::Value;

use crate::constants;
use crate::core::retry::Sleeper;
use crate::error::{Error, Result};
use crate::platform::exec::CommandRunner;
use crate::platform::service::ServiceController;

/// What [`reconcile`] did to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientAction {
    /// Running with the right bind address; left alone.
    AlreadyRunning,
    /// Was stopped and has been started.
    Started,
    /// Bind address changed; stopped, reconfigured and started.
    Restarted,
    /// The start command did not bring it up.
    StartFailed,
}

fn read_settings(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| Error::Parse {
        what: path.display().to_string(),
        detail: e.to_string(),
    })
}

/// The bind address currently in the client's settings, if set and valid.
///
/// # Errors
///
/// I/O errors reading the file, or [`Error::Parse`] for invalid JSON.
pub fn read_bind_address(path: &Path) -> Result<Option<Ipv4Addr>> {
    let settings = read_settings(path)?;
    Ok(settings
        .get(constants::CLIENT_BIND_ADDRESS_KEY)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok()))
}

/// Set the bind address, keeping every other setting untouched.
///
/// # Errors
///
/// I/O errors, or [`Error::Parse`] if the file is not a JSON object.
pub fn write_bind_address(path: &Path, addr: Ipv4Addr) -> Result<()> {
    let mut settings = read_settings(path)?;
    let Some(object) = settings.as_object_mut() else {
        return Err(Error::Parse {
            what: path.display().to_string(),
            detail: "settings are not a JSON object".into(),
        });
    };
    object.insert(
        constants::CLIENT_BIND_ADDRESS_KEY.to_string(),
        Value::String(addr.to_string()),
    );

    let text = serde_json::to_string_pretty(&settings).map_err(|e| Error::Parse {
        what: path.display().to_string(),
        detail: e.to_string(),
    })?;
    fs::write(path, format!("{text}\n"))?;
    Ok(())
}

fn start<R: CommandRunner, S: Sleeper>(
    client: &ServiceController<R, S>,
    attempts: u32,
    wait: Duration,
    success: ClientAction,
) -> Result<ClientAction> {
    if client.start(attempts, wait)?.is_running() {
        Ok(success)
    } else {
        warn!("CLIENT: {} did not start", client.handle().name);
        Ok(ClientAction::StartFailed)
    }
}

/// Make sure the client runs bound to `addr`.
///
/// # Errors
///
/// Errors reading or writing the settings file, or a start command that
/// cannot be run. The client is left stopped if the rewrite fails.
pub fn reconcile<R: CommandRunner, S: Sleeper>(
    client: &ServiceController<R, S>,
    settings: Option<&Path>,
    addr: Ipv4Addr,
    attempts: u32,
    wait: Duration,
) -> Result<ClientAction> {
    if let Some(path) = settings {
        let current = read_bind_address(path)?;
        if current != Some(addr) {
            info!(
                "CLIENT: bind address {} -> {addr}",
                current.map_or_else(|| "unset".to_string(), |a| a.to_string())
            );
            client.stop();
            client.sleeper().sleep(constants::CLIENT_STOP_GRACE);
            write_bind_address(path, addr)?;
            return start(client, attempts, wait, ClientAction::Restarted);
        }
    }

    if client.status().is_running() {
        return Ok(ClientAction::AlreadyRunning);
    }
    start(client, attempts, wait, ClientAction::Started)
}
