use anyhow::{Context, Result, anyhow};
use log::trace;
use std::path::{Path, PathBuf};

pub const PROC_SELF_MOUNTS: &str = "/proc/self/mounts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub mount_point: PathBuf,
}

/// Reads the current mount table. Always goes back to the kernel, the result
/// is only good for as long as nobody mounts or unmounts anything.
pub fn read_mounts() -> Result<Vec<MountEntry>> {
    let contents = std::fs::read_to_string(PROC_SELF_MOUNTS)
        .context(format!("failed to read {}", PROC_SELF_MOUNTS))?;
    parse_mounts(&contents)
}

/// Parses the fstab-like format of /proc/self/mounts, preserving kernel order.
pub fn parse_mounts(contents: &str) -> Result<Vec<MountEntry>> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return Err(anyhow!("Invalid mount data: {}", line));
            }
            Ok(MountEntry {
                source: unescape_mount_field(fields[0]),
                mount_point: PathBuf::from(unescape_mount_field(fields[1])),
            })
        })
        .collect()
}

/* The kernel escapes space, tab, newline and backslash as \ooo octal. */
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Mount points that are `base` itself or live underneath it, deepest first.
pub fn get_mounts(base: &Path) -> Result<Vec<PathBuf>> {
    let mounts = read_mounts()?
        .into_iter()
        .filter(|entry| entry.mount_point.starts_with(base))
        .map(|entry| {
            trace!("{} mounted on {}", entry.source, entry.mount_point.display());
            entry.mount_point
        })
        .collect();
    Ok(deepest_first(mounts))
}

/// Orders mount points so that nested mounts come before the mounts they sit
/// on. Mounts at equal depth keep their reverse mount table order, so a path
/// that was mounted over several times is peeled off top-down.
pub fn deepest_first(mut mounts: Vec<PathBuf>) -> Vec<PathBuf> {
    mounts.reverse();
    mounts.sort_by_key(|mount| std::cmp::Reverse(mount.components().count()));
    mounts
}
