use crate::util::{get_mounts, rmdir_recursive, unmount};
use anyhow::{Context, Result};
use log::{trace, warn};
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const FSROOT: &str = "fsroot";

/// What happened to a server root when it was closed.
#[derive(Debug)]
pub enum Teardown {
    Removed,
    /// Something was still mounted, or could not be enumerated, so the
    /// directory was left on disk.
    Abandoned { path: PathBuf, reason: anyhow::Error },
}

/**
 * The private root directory of one server. Call `close` to unmount
 * everything under it and delete it. Dropping it without closing leaves the
 * directory behind, since it may still have live mounts.
 */
#[derive(Debug)]
pub struct ServerRoot {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ServerRoot {
    pub fn create(runtime_dir: &Path) -> Result<ServerRoot> {
        let dir = tempfile::Builder::new()
            .prefix("server-")
            .tempdir_in(runtime_dir)
            .context("Unable to create working dir for server")?;
        std::fs::set_permissions(
            dir.path(),
            std::fs::Permissions::from_mode(0o755),
        )
        .context("Failed to change permissions for server's working dir")?;

        let path = dir.path().to_path_buf();
        trace!("Created server root {}", path.display());
        Ok(ServerRoot {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fsroot(&self) -> PathBuf {
        self.path.join(FSROOT)
    }

    pub fn close(mut self) -> Teardown {
        let Some(dir) = self.dir.take() else {
            return Teardown::Removed;
        };
        let path = dir.keep();
        match unmount_all(&path).and_then(|_| rmdir_recursive(&path)) {
            Ok(()) => {
                trace!("Removed server root {}", path.display());
                Teardown::Removed
            }
            Err(reason) => Teardown::Abandoned { path, reason },
        }
    }
}

impl Drop for ServerRoot {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            warn!("Server root {} dropped without teardown", path.display());
        }
    }
}

/* Everything mounted on or below `path`, nested mounts first. */
fn unmount_all(path: &Path) -> Result<()> {
    let mounts = get_mounts(path).context("Failed to read mount table")?;
    for mount in mounts {
        trace!("Unmounting {}", mount.display());
        unmount(&mount)?;
    }
    Ok(())
}

/// One running server.
#[derive(Debug)]
pub struct ServerRecord {
    pub pid: Pid,
    pub root: ServerRoot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::bind_mount;
    use nix::unistd::geteuid;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn test_create_and_close() {
        let runtime_dir = tempfile::tempdir().unwrap();
        let root = ServerRoot::create(runtime_dir.path()).unwrap();
        let path = root.path().to_path_buf();
        assert!(path.starts_with(runtime_dir.path()));
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("server-")
        );
        assert_eq!(std::fs::metadata(&path).unwrap().mode() & 0o777, 0o755);
        assert_eq!(root.fsroot(), path.join("fsroot"));

        std::fs::create_dir_all(root.fsroot().join("MyFiles/Downloads"))
            .unwrap();
        assert!(matches!(root.close(), Teardown::Removed));
        assert!(!path.exists());
    }

    #[test]
    fn test_create_in_missing_runtime_dir() {
        let err = ServerRoot::create(Path::new("/nonexistent/seneschal"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Unable to create working dir for server");
    }

    #[test]
    fn test_drop_leaks() {
        let runtime_dir = tempfile::tempdir().unwrap();
        let root = ServerRoot::create(runtime_dir.path()).unwrap();
        let path = root.path().to_path_buf();
        drop(root);
        assert!(path.is_dir());
    }

    #[test]
    fn test_close_unmounts_nested_mounts() {
        if !geteuid().is_root() {
            return;
        }
        let runtime_dir = tempfile::tempdir().unwrap();
        let runtime_path = runtime_dir.path().canonicalize().unwrap();
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir(source.path().join("inner")).unwrap();
        std::fs::write(source.path().join("inner/keep"), "keep").unwrap();

        let root = ServerRoot::create(&runtime_path).unwrap();
        let outer = root.fsroot().join("MyFiles");
        std::fs::create_dir_all(&outer).unwrap();
        bind_mount(source.path(), &outer).unwrap();
        bind_mount(&source.path().join("inner"), &outer.join("inner")).unwrap();

        let path = root.path().to_path_buf();
        assert!(matches!(root.close(), Teardown::Removed));
        assert!(!path.exists());
        assert!(get_mounts(&path).unwrap().is_empty());
        // The shared files themselves are untouched
        assert!(source.path().join("inner/keep").exists());
    }
}
