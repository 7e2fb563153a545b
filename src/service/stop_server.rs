use super::Service;
use crate::types::StopServerRequest;
use anyhow::{Context, Result};
use log::{debug, info};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use std::time::Instant;

impl Service {
    /// Asks a server to exit and arms a forced kill for when it doesn't.
    /// Stopping a server that is already gone succeeds.
    pub fn stop_server(&mut self, request: &StopServerRequest) -> Result<()> {
        let handle = request.handle;
        let Some(record) = self.servers.get(&handle) else {
            debug!("Server {} is not running, nothing to stop", handle);
            return Ok(());
        };

        info!("Stopping server {} (pid {})", handle, record.pid);
        match kill(record.pid, Signal::SIGTERM) {
            // Already exited but not reaped yet
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                return Err(e).context("Unable to send signal to child process");
            }
        }

        self.kill_timers.schedule(
            Instant::now() + self.config.server_exit_timeout,
            handle,
        );
        Ok(())
    }
}
