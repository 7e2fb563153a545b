use anyhow::{Context, Result, anyhow};
use log::trace;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/**
 * Removes `path` and everything beneath it, but refuses to cross onto another
 * device. Anything still mounted under `path` therefore makes this fail rather
 * than wiping out whatever the mount exposes. Symlinks are removed, never
 * followed.
 */
pub fn rmdir_recursive(path: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path)
        .context(format!("failed to stat {}", path.display()))?;
    remove_on_device(path, metadata.dev())
}

fn remove_on_device(path: &Path, root_device: u64) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path)
        .context(format!("failed to stat {}", path.display()))?;

    if metadata.dev() != root_device {
        return Err(anyhow!(
            "Cannot remove {}: directory is on a different device",
            path.display()
        ));
    }

    if !metadata.is_dir() {
        trace!("Removing file {}", path.display());
        return std::fs::remove_file(path)
            .context(format!("failed to remove {}", path.display()));
    }

    for entry in std::fs::read_dir(path)
        .context(format!("failed to read directory {}", path.display()))?
    {
        let entry = entry?;
        remove_on_device(&entry.path(), root_device)?;
    }

    trace!("Removing directory {}", path.display());
    std::fs::remove_dir(path)
        .context(format!("failed to remove directory {}", path.display()))
}
