use crate::config::Config;
use crate::rpc::RpcServer;
use crate::service::{ProcessJail, Service};
use crate::util::{add_supplementary_group, mkdir_recursively};
use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, trace};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use nix::unistd::geteuid;
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

/// How long poll may sleep given the next kill deadline, rounded up so a
/// timer never wakes the loop just before it is due.
pub fn poll_timeout(deadline: Option<Instant>, now: Instant) -> PollTimeout {
    let Some(deadline) = deadline else {
        return PollTimeout::NONE;
    };
    let remaining = deadline.saturating_duration_since(now);
    let mut millis = remaining.as_millis();
    if remaining > Duration::from_millis(millis as u64) {
        millis += 1;
    }
    PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
}

pub fn daemon(config: &Config) -> Result<()> {
    if !geteuid().is_root() {
        return Err(anyhow!("The daemon must be started as root"));
    }

    let mut config = config.clone();
    mkdir_recursively(&config.runtime_dir).context(format!(
        "Failed to create runtime directory {}",
        config.runtime_dir.display()
    ))?;
    // Mount points show up canonicalized in /proc/self/mounts
    config.runtime_dir = config.runtime_dir.canonicalize().context(format!(
        "Failed to resolve runtime directory {}",
        config.runtime_dir.display()
    ))?;

    if let Some(gid) = config.access_gid {
        add_supplementary_group(gid)
            .context("Failed to set up supplementary groups")?;
    }

    let mut mask = SigSet::empty();
    mask.add(Signal::SIGCHLD);
    mask.add(Signal::SIGTERM);
    mask.add(Signal::SIGINT);
    mask.thread_block().context("Failed to block signals")?;
    let mut signal_fd =
        SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC | SfdFlags::SFD_NONBLOCK)
            .context("Failed to create signalfd")?;

    let server = RpcServer::bind(&config.socket_path)?;
    info!("Listening on {}", server.path().display());

    let mut service = Service::new(config, Box::new(ProcessJail));
    loop {
        let timeout = poll_timeout(service.next_timer_deadline(), Instant::now());
        let mut fds = [
            PollFd::new(signal_fd.as_fd(), PollFlags::POLLIN),
            PollFd::new(server.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, timeout) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).context("poll failed"),
        }
        let readable = |fd: &PollFd| {
            fd.revents().is_some_and(|revents| revents.contains(PollFlags::POLLIN))
        };
        let signals_ready = readable(&fds[0]);
        let requests_ready = readable(&fds[1]);

        service.run_expired_timers(Instant::now());

        if signals_ready {
            let mut terminate = false;
            while let Some(info) =
                signal_fd.read_signal().context("Failed to read signalfd")?
            {
                match Signal::try_from(info.ssi_signo as i32) {
                    Ok(Signal::SIGCHLD) => service.on_child_exited(),
                    Ok(signal @ (Signal::SIGTERM | Signal::SIGINT)) => {
                        info!("Received {}, shutting down", signal);
                        terminate = true;
                    }
                    Ok(signal) => debug!("Ignoring {}", signal),
                    Err(e) => error!("Unknown signal {}: {}", info.ssi_signo, e),
                }
            }
            if terminate {
                break;
            }
        }

        if requests_ready {
            trace!("Handling pending requests");
            server.accept_pending(&mut service);
        }
    }

    // Stop taking requests before waiting on servers
    drop(server);
    service.on_terminate_requested();
    info!("Exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout() {
        let now = Instant::now();
        assert_eq!(poll_timeout(None, now), PollTimeout::NONE);
        assert_eq!(poll_timeout(Some(now), now), PollTimeout::ZERO);
        assert_eq!(
            poll_timeout(Some(now - Duration::from_secs(1)), now),
            PollTimeout::ZERO
        );
        assert_eq!(
            poll_timeout(Some(now + Duration::from_micros(1500)), now),
            PollTimeout::from(2u16)
        );
        assert_eq!(
            poll_timeout(Some(now + Duration::from_secs(3600)), now),
            PollTimeout::from(u16::MAX)
        );
    }
}
