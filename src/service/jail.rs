use crate::util::{
    CLONE_NEWPID, Clone3Args, SIGCHLD, SeccompProgram, clone3,
    drop_bounding_set, drop_privileges, set_no_new_privs,
};
use anyhow::{Context, Result, anyhow};
use log::debug;
use nix::sys::signal::{SigHandler, SigSet, SigmaskHow, Signal, sigprocmask};
use nix::sys::wait::waitpid;
use nix::unistd::{Gid, Pid, Uid, chdir, chroot};
use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Everything needed to start one server inside its jail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JailSpec {
    /// Becomes `/` for the server.
    pub root: PathBuf,
    /// Host path of the server binary. It is opened before entering the jail
    /// so it does not need to exist inside the root.
    pub program: PathBuf,
    pub args: Vec<String>,
    pub uid: Uid,
    pub gid: Gid,
    pub supplementary_gids: Vec<Gid>,
    pub seccomp_bpf: Option<PathBuf>,
}

pub trait Jail {
    /// Starts the server and returns its pid. The process must be a child of
    /// the caller so that it shows up in `waitpid`.
    fn spawn(&self, spec: &JailSpec) -> Result<Pid>;
}

/**
 * Runs servers as init of a fresh pid namespace, chrooted into their root,
 * with an empty capability bounding set, no_new_privs and a seccomp filter.
 *
 * Failures between clone and exec are reported back over a close-on-exec
 * pipe: the parent sees EOF once exec succeeds, or an error message if the
 * child gave up.
 */
pub struct ProcessJail;

impl Jail for ProcessJail {
    fn spawn(&self, spec: &JailSpec) -> Result<Pid> {
        let program = File::open(&spec.program).context(format!(
            "failed to open {}",
            spec.program.display()
        ))?;
        let seccomp = match &spec.seccomp_bpf {
            Some(policy) => Some(SeccompProgram::load(policy)?),
            None => None,
        };

        let mut argv = vec![CString::new(spec.program.as_os_str().as_bytes())?];
        for arg in &spec.args {
            argv.push(CString::new(arg.as_str())?);
        }
        let mut argv_ptrs: Vec<*const libc::c_char> =
            argv.iter().map(|arg| arg.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());
        let root = CString::new(spec.root.as_os_str().as_bytes())?;

        let (read_end, write_end) = status_pipe()?;

        let clone_args = Clone3Args {
            flags: CLONE_NEWPID,
            exit_signal: SIGCHLD,
            ..Default::default()
        };
        let pid = clone3(&clone_args).context("clone3 failed")?;

        if pid.as_raw() == 0 {
            drop(read_end);
            let Err(e) =
                enter_jail(spec, &root, seccomp.as_ref(), &program, &argv_ptrs);
            let mut status = File::from(write_end);
            let _ = status.write_all(format!("{:#}", e).as_bytes());
            unsafe { libc::_exit(127) };
        }

        drop(write_end);
        let mut message = String::new();
        File::from(read_end)
            .read_to_string(&mut message)
            .context("failed to read jail status")?;
        if !message.is_empty() {
            // The child has already given up, collect it before reporting
            let _ = waitpid(pid, None);
            return Err(anyhow!("server failed to enter jail: {}", message));
        }

        debug!("Spawned {} with pid {}", spec.program.display(), pid);
        Ok(pid)
    }
}

fn status_pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(nix::errno::Errno::last()).context("pipe2 failed");
    }
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/* Runs in the child between clone and exec. Only returns on failure, and
 * only allocates on failure. */
fn enter_jail(
    spec: &JailSpec,
    root: &CString,
    seccomp: Option<&SeccompProgram>,
    program: &File,
    argv: &[*const libc::c_char],
) -> Result<Infallible> {
    // The daemon blocks these to read them from a signalfd
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
        .context("failed to reset signal mask")?;
    for signal in [Signal::SIGCHLD, Signal::SIGTERM, Signal::SIGINT] {
        unsafe { nix::sys::signal::signal(signal, SigHandler::SigDfl) }
            .with_context(|| format!("failed to reset handler for {}", signal))?;
    }

    chroot(root.as_c_str()).with_context(|| {
        format!("failed to chroot to {}", spec.root.display())
    })?;
    chdir(Path::new("/")).context("failed to chdir to new root")?;

    drop_bounding_set()?;
    drop_privileges(spec.uid, spec.gid, &spec.supplementary_gids)?;
    set_no_new_privs()?;
    if let Some(seccomp) = seccomp {
        seccomp.install()?;
    }

    let envp: [*const libc::c_char; 1] = [std::ptr::null()];
    unsafe { libc::fexecve(program.as_raw_fd(), argv.as_ptr(), envp.as_ptr()) };
    Err(nix::errno::Errno::last()).context(format!(
        "failed to exec {}",
        spec.program.display()
    ))
}

/// Starts the program with `std::process::Command` and no isolation at all.
/// Used where the daemon's bookkeeping is under test rather than the jail.
#[cfg(test)]
pub struct CommandJail {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub spawned: std::rc::Rc<std::cell::RefCell<Vec<JailSpec>>>,
}

#[cfg(test)]
impl CommandJail {
    pub fn new(program: &str, args: &[&str]) -> Self {
        CommandJail {
            program: PathBuf::from(program),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            spawned: Default::default(),
        }
    }
}

#[cfg(test)]
impl Jail for CommandJail {
    fn spawn(&self, spec: &JailSpec) -> Result<Pid> {
        log::trace!("Spawning {} for {}", self.program.display(), spec.root.display());
        let child = std::process::Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .context(format!("failed to spawn {}", self.program.display()))?;
        self.spawned.borrow_mut().push(spec.clone());
        Ok(Pid::from_raw(child.id() as i32))
    }
}
