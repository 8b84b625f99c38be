// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NGINX process control, abstracted behind one trait with
//! implementations per supervisor (direct signal, container runtime),
//! per SPEC_FULL.md's design note on process signalling.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum NginxCtlError {
    #[error("no running nginx master process found")]
    NotRunning,
    #[error("signal delivery failed: {0}")]
    Signal(#[from] nix::Error),
}

pub trait NginxControl: Send + Sync {
    fn reload(&self) -> Result<(), NginxCtlError>;
    fn restart(&self) -> Result<(), NginxCtlError>;
    fn stop(&self) -> Result<(), NginxCtlError>;
}

/// Controls NGINX via direct signal delivery to the discovered master
/// process: `SIGHUP` to reload, `SIGTERM` to stop, stop-then-start for
/// restart since NGINX has no single "restart" signal.
pub struct SignalNginxControl {
    pid_file: String,
}

impl SignalNginxControl {
    pub fn new(pid_file: impl Into<String>) -> Self {
        Self { pid_file: pid_file.into() }
    }

    fn master_pid(&self) -> Result<Pid, NginxCtlError> {
        let raw = std::fs::read_to_string(&self.pid_file).map_err(|_| NginxCtlError::NotRunning)?;
        let pid: i32 = raw.trim().parse().map_err(|_| NginxCtlError::NotRunning)?;
        Ok(Pid::from_raw(pid))
    }
}

impl NginxControl for SignalNginxControl {
    fn reload(&self) -> Result<(), NginxCtlError> {
        kill(self.master_pid()?, Signal::SIGHUP)?;
        Ok(())
    }

    fn restart(&self) -> Result<(), NginxCtlError> {
        kill(self.master_pid()?, Signal::SIGTERM)?;
        let output = std::process::Command::new("nginx").output();
        match output {
            Ok(out) if out.status.success() => Ok(()),
            _ => Err(NginxCtlError::NotRunning),
        }
    }

    fn stop(&self) -> Result<(), NginxCtlError> {
        kill(self.master_pid()?, Signal::SIGTERM)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pid_file_reports_not_running() {
        let ctl = SignalNginxControl::new("/nonexistent/nginx.pid");
        assert!(matches!(ctl.reload(), Err(NginxCtlError::NotRunning)));
    }
}
