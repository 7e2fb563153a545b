use super::{Service, Teardown};
use crate::types::ServerHandle;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl Service {
    /**
     * Collects every child that has exited. Several exits can be folded into
     * a single SIGCHLD, so this keeps going until nothing is left to reap.
     */
    pub fn on_child_exited(&mut self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(status) => self.child_reaped(status),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    error!("waitpid failed: {}", e);
                    break;
                }
            }
        }
    }

    fn child_reaped(&mut self, status: WaitStatus) {
        let pid = match status {
            WaitStatus::Exited(pid, 0) => {
                info!("Process {} exited", pid);
                pid
            }
            WaitStatus::Exited(pid, code) => {
                warn!("Process {} exited with status {}", pid, code);
                pid
            }
            WaitStatus::Signaled(pid, signal, _) => {
                warn!("Process {} killed by signal {}", pid, signal);
                pid
            }
            _ => return,
        };

        let handle = self
            .servers
            .iter()
            .find(|(_, record)| record.pid == pid)
            .map(|(handle, _)| *handle);
        match handle {
            Some(handle) => self.remove_server(handle),
            None => debug!("Reaped untracked child {}", pid),
        }
    }

    /// Forgets a server and tears down its root.
    pub fn remove_server(&mut self, handle: ServerHandle) {
        let Some(record) = self.servers.remove(&handle) else {
            return;
        };
        match record.root.close() {
            Teardown::Removed => debug!("Server {} removed", handle),
            Teardown::Abandoned { path, reason } => error!(
                "Unable to clean up {} for server {}, leaving it behind: {:#}",
                path.display(),
                handle,
                reason
            ),
        }
    }

    /// Kills a server that ignored SIGTERM. The record goes away once the
    /// process is reaped.
    pub fn on_kill_timeout(&mut self, handle: ServerHandle) {
        let Some(record) = self.servers.get(&handle) else {
            return;
        };
        warn!(
            "Server {} (pid {}) did not exit in time, killing it",
            handle, record.pid
        );
        match kill(record.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => error!("Failed to kill server {}: {}", handle, e),
        }
    }

    pub fn run_expired_timers(&mut self, now: Instant) {
        for handle in self.kill_timers.pop_expired(now) {
            self.on_kill_timeout(handle);
        }
    }

    /**
     * Shuts every server down before the daemon exits: SIGTERM, reap for up
     * to the exit timeout, then SIGKILL and wait for whatever is left. Each
     * root is torn down as its server goes away.
     */
    pub fn on_terminate_requested(&mut self) {
        self.kill_timers.clear();
        if self.servers.is_empty() {
            return;
        }
        info!("Stopping {} servers", self.servers.len());

        for record in self.servers.values() {
            if let Err(e) = kill(record.pid, Signal::SIGTERM) {
                debug!("Failed to signal {}: {}", record.pid, e);
            }
        }

        let deadline = Instant::now() + self.config.server_exit_timeout;
        loop {
            self.on_child_exited();
            if self.servers.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }

        let stragglers: Vec<(ServerHandle, Pid)> = self
            .servers
            .iter()
            .map(|(handle, record)| (*handle, record.pid))
            .collect();
        for (handle, pid) in stragglers {
            warn!("Server {} (pid {}) ignored SIGTERM, killing it", handle, pid);
            let _ = kill(pid, Signal::SIGKILL);
            if let Err(e) = waitpid(pid, None) {
                debug!("waitpid {} failed: {}", pid, e);
            }
            self.remove_server(handle);
        }
    }
}
