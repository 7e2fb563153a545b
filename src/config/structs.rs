use super::impls::deserialize_level_filter;
use anyhow::{Result, anyhow};
use nix::unistd::{Gid, Uid};
use serde::Deserialize;
use std::time::Duration;
use std::{collections::HashMap, path::PathBuf};

pub const DEFAULT_SOCKET_PATH: &str = "/run/seneschal.sock";
pub const DEFAULT_RUNTIME_DIR: &str = "/run/seneschal";
pub const DEFAULT_SERVER_PATH: &str = "/usr/bin/9s";
pub const DEFAULT_SECCOMP_BPF: &str = "/usr/share/policy/9s-seccomp.bpf";
pub const DEFAULT_SERVER_UID: u32 = 1000;
pub const DEFAULT_SERVER_GID: u32 = 1000;
/* Lets the server read and write files owned by other containers. */
pub const DEFAULT_SUPPLEMENTARY_GIDS: [u32; 1] = [665357];
/* chronos-access, needed to reach into the user's home directories. */
pub const DEFAULT_ACCESS_GID: i64 = 1001;
pub const DEFAULT_SERVER_EXIT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_BIND_MOUNTS: [&str; 3] = ["/proc:ro", "/dev/null", "/dev/log"];

pub const DEFAULT_HOME_DIR: &str = "/home/user";
pub const DEFAULT_DRIVEFS_DIR: &str = "/media/fuse";
pub const DEFAULT_REMOVABLE_DIR: &str = "/media/removable";
pub const DEFAULT_PLAY_FILES_DIR: &str = "/run/arc/sdcard/write/emulated/0";

/// A host path made visible inside every server's jail at the same location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindMount {
    pub path: PathBuf,
    pub options: BindMountOptions,
    pub argument: String,
}

impl std::fmt::Display for BindMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argument)
    }
}

impl std::str::FromStr for BindMount {
    type Err = anyhow::Error;

    /** Parses `path` or `path:ro|rw`. Paths must be absolute. */
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, options) = match s.rsplit_once(':') {
            Some((path, options)) => (path, options.parse()?),
            None => (s, BindMountOptions::ReadWrite),
        };
        let path = PathBuf::from(path);
        if !path.is_absolute() {
            return Err(anyhow!(
                "Bind mount path must be absolute: '{}'",
                path.display()
            ));
        }
        Ok(BindMount {
            path,
            options,
            argument: s.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindMountOptions {
    ReadWrite,
    ReadOnly,
}

impl std::str::FromStr for BindMountOptions {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "rw" => Ok(BindMountOptions::ReadWrite),
            "ro" => Ok(BindMountOptions::ReadOnly),
            _ => Err(anyhow!(
                "Unknown bind mount option: '{}'. Valid options are: rw, ro",
                s
            )),
        }
    }
}

/// Host directories that storage locations resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    pub home_dir: PathBuf,
    pub drivefs_dir: PathBuf,
    pub removable_dir: PathBuf,
    pub play_files_dir: PathBuf,
}

impl Default for StorageRoots {
    fn default() -> Self {
        StorageRoots {
            home_dir: PathBuf::from(DEFAULT_HOME_DIR),
            drivefs_dir: PathBuf::from(DEFAULT_DRIVEFS_DIR),
            removable_dir: PathBuf::from(DEFAULT_REMOVABLE_DIR),
            play_files_dir: PathBuf::from(DEFAULT_PLAY_FILES_DIR),
        }
    }
}

#[derive(Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub socket_path: Option<String>,
    pub runtime_dir: Option<String>,
    pub server_path: Option<String>,
    pub seccomp_bpf: Option<String>,
    pub server_uid: Option<u32>,
    pub server_gid: Option<u32>,
    pub supplementary_gids: Option<Vec<u32>>,
    pub access_gid: Option<i64>,
    pub server_exit_timeout_ms: Option<u64>,
    #[serde(rename = "bind", default)]
    pub bind_mounts: Option<Vec<String>>,
    pub home_dir: Option<String>,
    pub drivefs_dir: Option<String>,
    pub removable_dir: Option<String>,
    pub play_files_dir: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: log::LevelFilter,
    pub socket_path: PathBuf,
    pub runtime_dir: PathBuf,
    pub server_path: PathBuf,
    /// None runs servers without a seccomp filter.
    pub seccomp_bpf: Option<PathBuf>,
    pub server_uid: Uid,
    pub server_gid: Gid,
    pub supplementary_gids: Vec<Gid>,
    /// Group the daemon itself joins at startup, if any.
    pub access_gid: Option<Gid>,
    pub server_exit_timeout: Duration,
    pub bind_mounts: Vec<BindMount>,
    pub storage_roots: StorageRoots,
    pub sources: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: log::LevelFilter::Info,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            runtime_dir: PathBuf::from(DEFAULT_RUNTIME_DIR),
            server_path: PathBuf::from(DEFAULT_SERVER_PATH),
            seccomp_bpf: Some(PathBuf::from(DEFAULT_SECCOMP_BPF)),
            server_uid: Uid::from_raw(DEFAULT_SERVER_UID),
            server_gid: Gid::from_raw(DEFAULT_SERVER_GID),
            supplementary_gids: DEFAULT_SUPPLEMENTARY_GIDS
                .iter()
                .map(|gid| Gid::from_raw(*gid))
                .collect(),
            access_gid: Some(Gid::from_raw(DEFAULT_ACCESS_GID as u32)),
            server_exit_timeout: Duration::from_millis(
                DEFAULT_SERVER_EXIT_TIMEOUT_MS,
            ),
            bind_mounts: DEFAULT_BIND_MOUNTS
                .iter()
                .filter_map(|bind| bind.parse().ok())
                .collect(),
            storage_roots: StorageRoots::default(),
            sources: HashMap::new(),
        }
    }
}
