use anyhow::{Result, anyhow};
use std::path::{Component, Path, PathBuf};

pub const INVALID_PATH: &str = "Path must be relative and cannot reference parent components nor end with \".\"";

/**
 * Checks a path fragment supplied by a VM before it gets anywhere near a mount
 * call. Absolute paths, `..` anywhere, and a final `.` are rejected. The empty
 * path is allowed and refers to the storage location itself.
 *
 * Returns the fragment with redundant separators and interior `.` components
 * dropped, which is what later gets joined onto host and fsroot prefixes.
 */
pub fn validate_relative_path(path: &str) -> Result<PathBuf> {
    if path.starts_with('/') || path.contains('\0') {
        return Err(anyhow!(INVALID_PATH));
    }

    let segments: Vec<&str> =
        path.split('/').filter(|segment| !segment.is_empty()).collect();
    if segments.iter().any(|segment| *segment == "..")
        || segments.last().is_some_and(|segment| *segment == ".")
    {
        return Err(anyhow!(INVALID_PATH));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {}
            Component::RootDir
            | Component::ParentDir
            | Component::Prefix(_) => return Err(anyhow!(INVALID_PATH)),
        }
    }
    Ok(normalized)
}

/// True when `name` can be used as exactly one path component.
pub fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\0')
}
