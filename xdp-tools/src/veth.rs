//! Veth pairs for tests that need a real interface.
//!
//! Commands run through `sudo sh -c`, so the caller needs passwordless sudo
//! or root.

use std::io::{Error, ErrorKind, Result};
use std::process::{Command, Stdio};

pub fn execute_sudo_command(command: &str) -> Result<()> {
    let output = Command::new("sudo")
        .arg("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        return Err(Error::other(format!(
            "Command failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    log::info!("Command succeeded: {}", command);
    log::debug!("Output: {}", String::from_utf8_lossy(&output.stdout));
    Ok(())
}

/// A veth pair `{prefix}0` + `{prefix}1`, deleted on drop.
#[derive(Debug)]
pub struct VethPair {
    prefix: String,
}

impl VethPair {
    /// Creates the pair and brings both ends up. Fails if it already exists.
    pub fn create(prefix: &str) -> Result<Self> {
        if exists(prefix) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("veth pair {prefix}0 already exists"),
            ));
        }
        log::info!("creating new veth pair {0}0 + {0}1", prefix);
        execute_sudo_command(&format!("ip link add {0}0 type veth peer {0}1", prefix))?;
        let pair = VethPair {
            prefix: prefix.to_string(),
        };
        for dev in [pair.dev(0), pair.dev(1)] {
            log::info!("setting interface {dev} up");
            execute_sudo_command(&format!("ip link set {dev} up"))?;
        }
        Ok(pair)
    }

    /// Name of end `0` or `1`.
    pub fn dev(&self, end: u8) -> String {
        format!("{}{}", self.prefix, end)
    }
}

impl Drop for VethPair {
    fn drop(&mut self) {
        log::info!("tearing down veth pair {}0", self.prefix);
        if let Err(e) = execute_sudo_command(&format!("ip link del {}0", self.prefix)) {
            log::error!("failed to delete veth pair {}0: {e}", self.prefix);
        }
    }
}

/// Whether `{prefix}0` exists.
pub fn exists(prefix: &str) -> bool {
    Command::new("ip")
        .arg("link")
        .arg("show")
        .arg(format!("{prefix}0"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}
