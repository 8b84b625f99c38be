// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interactive shell execution backing the Management service's `Execute`
//! bidirectional RPC: spawns a PTY-attached shell and bridges its I/O to
//! the gRPC frame stream.

use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{execvp, Pid};
use tokio::io::unix::AsyncFd;

/// How long a graceful stop is allowed before the child is force-killed.
const GRACEFUL_STOP: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("forkpty failed: {0}")]
    Forkpty(#[from] nix::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid command argument")]
    InvalidArg,
}

struct PtyFd(OwnedFd);

impl AsRawFd for PtyFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

/// A spawned interactive shell, readable/writable as an async byte stream.
pub struct ShellSession {
    master: AsyncFd<PtyFd>,
    child_pid: Pid,
}

impl ShellSession {
    /// Spawns `/bin/sh -i` attached to a fresh PTY.
    #[allow(unsafe_code)]
    pub fn spawn() -> Result<Self, ExecError> {
        let winsize = Winsize { ws_row: 24, ws_col: 80, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty leaves the child partially initialized until it
        // execs below; no Rust heap state is touched in between.
        let fork_result = unsafe { forkpty(&winsize, None) }?;

        match fork_result {
            ForkptyResult::Child => {
                std::env::set_var("TERM", "xterm-256color");
                let shell = std::ffi::CString::new("/bin/sh").map_err(|_| ExecError::InvalidArg)?;
                let arg0 = std::ffi::CString::new("sh").map_err(|_| ExecError::InvalidArg)?;
                let flag = std::ffi::CString::new("-i").map_err(|_| ExecError::InvalidArg)?;
                let _ = execvp(&shell, &[arg0, flag]);
                std::process::exit(127);
            }
            ForkptyResult::Parent { child, master } => {
                set_nonblocking(&master)?;
                let master = AsyncFd::new(PtyFd(master))?;
                Ok(Self { master, child_pid: child })
            }
        }
    }

    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;
            match guard.try_io(|inner| nix::unistd::read(inner, buf).map_err(io_err)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let mut guard = self.master.writable().await?;
            match guard.try_io(|inner| nix::unistd::write(inner, &data[offset..]).map_err(io_err)) {
                Ok(Ok(n)) => offset += n,
                Ok(Err(err)) => return Err(err),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Sends `SIGHUP`, waits up to [`GRACEFUL_STOP`] for the child to
    /// exit, then `SIGKILL`.
    pub async fn stop(&self) {
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let child = self.child_pid;
        let exited = tokio::task::spawn_blocking(move || matches!(waitpid(child, None), Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..))));
        if tokio::time::timeout(GRACEFUL_STOP, exited).await.is_err() {
            let _ = kill(self.child_pid, Signal::SIGKILL);
        }
    }
}

#[allow(unsafe_code)]
fn set_nonblocking(fd: &impl AsFd) -> io::Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
    Ok(())
}

fn io_err(err: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(err as i32)
}
