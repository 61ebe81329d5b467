//! Thin wrappers over the OS tools tunnelgate drives.
//!
//! Everything here shells out through [`exec::CommandRunner`]:
//! - init system: `/etc/init.d/<svc>` (`OpenRC`) or `systemctl` (systemd)
//! - interfaces: `ip -o link`, `ip -o -4 addr`
//! - routes: `route -n`
//! - reachability: `ping`

pub mod exec;
pub mod interface;
pub mod route;
pub mod service;

use std::net::Ipv4Addr;

use log::debug;

use exec::CommandRunner;

/// Send a single ICMP echo to `target`, waiting at most `timeout_secs`.
pub fn ping_once<R: CommandRunner + ?Sized>(runner: &R, target: Ipv4Addr, timeout_secs: u64) -> bool {
    let timeout = timeout_secs.max(1).to_string();
    let target = target.to_string();
    match runner.run("ping", &["-c", "1", "-W", &timeout, &target]) {
        Ok(out) => {
            debug!("PING: {target} -> {:?}", out.code);
            out.success()
        }
        Err(e) => {
            debug!("PING: {e}");
            false
        }
    }
}

/// Whether the current process runs with root privileges.
#[cfg(unix)]
#[must_use]
#[allow(unsafe_code)]
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe {
        libc::geteuid() == 0
    }
}

#[cfg(not(unix))]
#[must_use]
pub fn is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec::scripted::ScriptedRunner;
    use exec::CommandOutput;

    #[test]
    fn test_ping_once() {
        let runner = ScriptedRunner::new();
        runner.script("ping -c 1 -W 2 10.8.0.1", vec![CommandOutput::ok("1 received")]);
        assert!(ping_once(&runner, Ipv4Addr::new(10, 8, 0, 1), 2));
        assert!(!ping_once(&runner, Ipv4Addr::new(10, 8, 0, 50), 2));
    }

    #[test]
    fn test_ping_zero_timeout_clamped() {
        let runner = ScriptedRunner::new();
        ping_once(&runner, Ipv4Addr::new(10, 8, 0, 1), 0);
        assert_eq!(runner.calls(), vec!["ping -c 1 -W 1 10.8.0.1"]);
    }
}
