use super::{Service, validate_relative_path};
use crate::types::UnsharePathRequest;
use crate::util::{deepest_first, read_mounts, rmdir_recursive, unmount};
use anyhow::{Context, Result, anyhow};
use log::{info, trace};
use std::path::{Path, PathBuf};

/**
 * Picks out the mount points that unsharing `dst` has to remove: `dst`
 * itself plus anything mounted below it. Fails if `dst` is not a mount point,
 * or if it only exists because some ancestor inside `fsroot` was shared.
 */
pub fn classify_mounts<'a>(
    dst: &Path,
    fsroot: &Path,
    mount_points: impl IntoIterator<Item = &'a Path>,
) -> Result<Vec<PathBuf>> {
    let mut is_mount = false;
    let mut has_parent_mount = false;
    let mut matched = Vec::new();

    for mount_point in mount_points {
        if mount_point == dst {
            is_mount = true;
            matched.push(mount_point.to_path_buf());
        } else if mount_point.starts_with(dst) {
            matched.push(mount_point.to_path_buf());
        } else if dst.starts_with(mount_point)
            && mount_point.starts_with(fsroot)
            && mount_point != fsroot
        {
            has_parent_mount = true;
        }
    }

    if !is_mount {
        return Err(anyhow!("Path is not a mount point"));
    }
    if has_parent_mount {
        return Err(anyhow!("Path has a parent mount point"));
    }
    Ok(matched)
}

impl Service {
    pub fn unshare_path(&mut self, request: &UnsharePathRequest) -> Result<()> {
        let record = self
            .servers
            .get(&request.handle)
            .ok_or_else(|| anyhow!("Requested server does not exist"))?;

        let path = validate_relative_path(&request.path)?;
        let fsroot = record.root.fsroot();
        let dst = fsroot.join(&path);
        if std::fs::symlink_metadata(&dst).is_err() {
            return Err(anyhow!("Unshare path does not exist"));
        }

        let entries =
            read_mounts().context("Failed to open /proc/self/mounts")?;
        let mounts = classify_mounts(
            &dst,
            &fsroot,
            entries.iter().map(|entry| entry.mount_point.as_path()),
        )?;

        for mount in deepest_first(mounts) {
            trace!("Unmounting {}", mount.display());
            unmount(&mount).context("Failed to unmount")?;
        }

        // Safe now that nothing is mounted at or below dst
        rmdir_recursive(&dst).context("Delete path failed")?;

        info!("Unshared {} from server {}", path.display(), request.handle);
        Ok(())
    }
}
