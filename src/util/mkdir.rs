use anyhow::{Result, anyhow};
use nix::errno::Errno;
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path};

const DIR_MODE: libc::mode_t = 0o755;

/* Opens `name` relative to `dir` (or `/` when `dir` is None) without following
 * symlinks. */
fn open_dir_nofollow(
    dir: Option<&OwnedFd>,
    name: &CString,
) -> Result<OwnedFd> {
    let dirfd = dir.map(|fd| fd.as_raw_fd()).unwrap_or(libc::AT_FDCWD);
    let flags = libc::O_RDONLY
        | libc::O_DIRECTORY
        | libc::O_NOFOLLOW
        | libc::O_CLOEXEC;
    let fd = unsafe { libc::openat(dirfd, name.as_ptr(), flags) };
    if fd < 0 {
        return Err(anyhow!(
            "Failed to open {}: {}",
            name.to_string_lossy(),
            Errno::last()
        ));
    }
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/**
 * `mkdir -p` with mode 0755 that refuses to walk through symlinks. Every
 * component is created or opened relative to the descriptor of its parent, so
 * a symlink planted anywhere along the path makes this fail instead of
 * creating directories somewhere else.
 */
pub fn mkdir_recursively(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(anyhow!(
            "Relative paths are not supported: {}",
            path.display()
        ));
    }

    let mut fd = open_dir_nofollow(None, &CString::new("/")?)?;
    for component in path.components() {
        let name = match component {
            Component::RootDir | Component::CurDir => continue,
            Component::Normal(name) => CString::new(name.as_bytes())?,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(anyhow!(
                    "Refusing to create {}: path is not normalized",
                    path.display()
                ));
            }
        };

        let result =
            unsafe { libc::mkdirat(fd.as_raw_fd(), name.as_ptr(), DIR_MODE) };
        if result != 0 {
            let errno = Errno::last();
            if errno != Errno::EEXIST {
                return Err(anyhow!(
                    "Failed to mkdirat {} in {}: {}",
                    name.to_string_lossy(),
                    path.display(),
                    errno
                ));
            }
        }

        // Either we just made it or it was already there; in both cases it
        // has to be a real directory for the open to succeed.
        fd = open_dir_nofollow(Some(&fd), &name).map_err(|e| {
            anyhow!("{} is not a directory: {}", path.display(), e)
        })?;
    }

    Ok(())
}
