use super::{Jail, KillTimers, ServerRecord};
use crate::config::Config;
use crate::types::ServerHandle;
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::time::Instant;

/// All daemon state. Owned by the event loop and only ever touched from it.
pub struct Service {
    pub(super) config: Config,
    pub(super) servers: HashMap<ServerHandle, ServerRecord>,
    pub(super) next_server_handle: u32,
    pub(super) jail: Box<dyn Jail>,
    pub(super) kill_timers: KillTimers,
}

impl Service {
    pub fn new(config: Config, jail: Box<dyn Jail>) -> Service {
        Service {
            config,
            servers: HashMap::new(),
            next_server_handle: 1,
            jail,
            kill_timers: KillTimers::new(),
        }
    }

    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.kill_timers.next_deadline()
    }

    /// The handle the next started server will get. Handles are never
    /// reused, so once the counter runs out no more servers can start.
    pub(super) fn next_handle(&self) -> Result<ServerHandle> {
        if self.next_server_handle == u32::MAX {
            return Err(anyhow!("No server handles left"));
        }
        Ok(ServerHandle(self.next_server_handle))
    }

    pub(super) fn allocate_handle(&mut self) -> Result<ServerHandle> {
        let handle = self.next_handle()?;
        self.next_server_handle += 1;
        Ok(handle)
    }
}
