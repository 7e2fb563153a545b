use anyhow::{Context, Result};
use nix::unistd::{Gid, Uid, setgid, setgroups, setuid};

/// Switches to `uid`/`gid` with exactly `supplementary_gids` as the group
/// list. Groups go first, they can't be changed once root is gone.
pub fn drop_privileges(
    uid: Uid,
    gid: Gid,
    supplementary_gids: &[Gid],
) -> Result<()> {
    setgroups(supplementary_gids)
        .context("failed to set supplementary groups")?;
    setgid(gid).with_context(|| format!("failed to setgid {}", gid))?;
    setuid(uid).with_context(|| format!("failed to setuid {}", uid))?;
    Ok(())
}

/// Empties the capability bounding set so nothing exec'd later can regain
/// privileges. Must run while we still hold CAP_SETPCAP.
pub fn drop_bounding_set() -> Result<()> {
    for cap in 0..64 {
        let result = unsafe {
            libc::prctl(
                libc::PR_CAPBSET_DROP,
                cap as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
                0 as libc::c_ulong,
            )
        };
        if result != 0 {
            let errno = nix::errno::Errno::last();
            // EINVAL marks the end of the capabilities this kernel knows
            if errno == nix::errno::Errno::EINVAL {
                break;
            }
            return Err(errno)
                .with_context(|| {
                    format!("failed to drop capability {}", cap)
                });
        }
    }
    Ok(())
}

pub fn set_no_new_privs() -> Result<()> {
    let result = unsafe {
        libc::prctl(
            libc::PR_SET_NO_NEW_PRIVS,
            1 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        )
    };
    if result != 0 {
        return Err(nix::errno::Errno::last())
            .context("failed to set no_new_privs");
    }
    Ok(())
}
