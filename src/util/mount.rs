use anyhow::{Context, Result};
use nix::mount::MsFlags;
use std::ffi::CStr;
use std::ffi::CString;
use std::path::Path;

pub fn mount<S1, S2, S3, S4>(
    source: Option<S1>,
    target: S2,
    fstype: Option<S3>,
    flags: MsFlags,
    data: Option<S4>,
) -> Result<()>
where
    S1: AsRef<std::ffi::OsStr>,
    S2: AsRef<std::ffi::OsStr>,
    S3: AsRef<std::ffi::OsStr>,
    S4: AsRef<std::ffi::OsStr>,
{
    let source_cstr = match &source {
        Some(source) => {
            CString::new(source.as_ref().to_string_lossy().as_bytes())?
        }
        None => CString::new("")?,
    };
    let target_cstr =
        CString::new(target.as_ref().to_string_lossy().as_bytes())?;
    let fstype_cstr = match &fstype {
        Some(fstype) => {
            CString::new(fstype.as_ref().to_string_lossy().as_bytes())?
        }
        None => CString::new("")?,
    };
    let data_cstr = match &data {
        Some(data) => CString::new(data.as_ref().to_string_lossy().as_bytes())?,
        None => CString::new("")?,
    };

    let source = source.map(|_| source_cstr.as_c_str());
    let target = target_cstr.as_c_str();
    let fstype = fstype.map(|_| fstype_cstr.as_c_str());
    let data = data.map(|_| data_cstr.as_c_str());

    nix::mount::mount::<CStr, CStr, CStr, CStr>(
        source, target, fstype, flags, data,
    )
    .context(format!(
        "failed to mount {} {} [type={}, flags={}, data={}]",
        source_cstr.to_string_lossy(),
        target_cstr.to_string_lossy(),
        fstype_cstr.to_string_lossy(),
        flags.bits(),
        data_cstr.to_string_lossy(),
    ))
}

/// Recursive bind mount of `source` over `target`.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    let none: Option<&str> = None;
    mount(
        Some(source),
        target,
        Some("none"),
        MsFlags::MS_BIND | MsFlags::MS_REC,
        none,
    )
}

/// A bind mount can't be made read-only in the same call that creates it, so
/// this has to follow `bind_mount`.
pub fn remount_read_only(source: &Path, target: &Path) -> Result<()> {
    let none: Option<&str> = None;
    mount(
        Some(source),
        target,
        Some("none"),
        MsFlags::MS_BIND
            | MsFlags::MS_REC
            | MsFlags::MS_REMOUNT
            | MsFlags::MS_RDONLY
            | MsFlags::MS_NOSUID
            | MsFlags::MS_NODEV
            | MsFlags::MS_NOEXEC,
        none,
    )
}

/// Plain umount(2), no MNT_DETACH: a busy mount has to be reported, not hidden.
pub fn unmount(target: &Path) -> Result<()> {
    nix::mount::umount(target)
        .context(format!("failed to unmount {}", target.display()))
}
