use anyhow::{Context, Result};
use log::debug;
use nix::unistd::{Gid, getgroups, setgroups};

/// Adds `gid` to the calling process's supplementary groups, keeping the ones
/// it already has.
pub fn add_supplementary_group(gid: Gid) -> Result<()> {
    let mut groups = getgroups().context("Failed to get supplementary groups")?;
    if groups.contains(&gid) {
        debug!("Already a member of group {}", gid);
        return Ok(());
    }
    groups.push(gid);
    setgroups(&groups)
        .context(format!("Failed to add {} to supplementary groups", gid))
}
