use super::{Service, plan_mount, validate_relative_path};
use crate::types::SharePathRequest;
use crate::util::{bind_mount, mkdir_recursively};
use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

impl Service {
    /**
     * Bind mounts a host path into a server's fsroot and returns where it
     * ended up, relative to fsroot. Directories created along the way are
     * left in place if a later step fails.
     */
    pub fn share_path(&mut self, request: &SharePathRequest) -> Result<String> {
        let record = self
            .servers
            .get(&request.handle)
            .ok_or_else(|| anyhow!("Requested server does not exist"))?;

        let path = validate_relative_path(&request.path)?;
        let plan = plan_mount(
            &self.config.storage_roots,
            &request.storage_location,
            &request.owner_id,
            &request.drivefs_mount_name,
            &path,
        )?;

        if !request.writable {
            // Remounting an existing bind read-only needs privileges the
            // daemon doesn't keep, so read-only requests get a writable mount.
            warn!(
                "Read-only sharing is not supported, sharing {} writable",
                plan.source.display()
            );
        }

        let dst = record.root.fsroot().join(&plan.destination);
        prepare_destination(&plan.source, &dst)?;
        bind_mount(&plan.source, &dst).context("Unable to create bind mount")?;

        info!(
            "Shared {} with server {} at {}",
            plan.source.display(),
            request.handle,
            plan.destination.display()
        );
        Ok(plan.destination.to_string_lossy().into_owned())
    }
}

/* Ensures something of the right kind exists at `dst` to mount over. */
fn prepare_destination(src: &Path, dst: &Path) -> Result<()> {
    // Walking the parents without following symlinks also guarantees that
    // nothing the VM planted in an earlier share redirects this one.
    if let Some(parent) = dst.parent() {
        mkdir_recursively(parent)
            .context("Failed to create parent directory for destination")?;
    }

    match std::fs::symlink_metadata(dst) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            return Err(anyhow!("Destination path is a symlink"));
        }
        Ok(_) => return Ok(()),
        Err(_) => {}
    }

    let metadata =
        std::fs::metadata(src).context("Unable to stat source path")?;
    if metadata.is_dir() {
        std::fs::DirBuilder::new()
            .mode(0o755)
            .create(dst)
            .context("Unable to create destination directory")?;
    } else {
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .custom_flags(libc::O_NOFOLLOW)
            .open(dst)
            .context("Unable to create destination file")?;
    }
    Ok(())
}
