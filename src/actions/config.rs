#![allow(clippy::option_map_unit_fn)]
use crate::config::{BindMountOptions, Config};
use crate::outln;
use anyhow::Result;
use log::debug;
use std::collections::HashMap;

const ALL_KEYS: [&str; 15] = [
    "log_level",
    "socket_path",
    "runtime_dir",
    "server_path",
    "seccomp_bpf",
    "server_uid",
    "server_gid",
    "supplementary_gids",
    "access_gid",
    "server_exit_timeout_ms",
    "bind",
    "home_dir",
    "drivefs_dir",
    "removable_dir",
    "play_files_dir",
];

pub fn config(config: &Config, keys: Option<Vec<String>>) -> Result<()> {
    let keys = keys.unwrap_or_else(|| ALL_KEYS.map(String::from).to_vec());
    let multi_line = keys.len() > 1;

    for key in keys {
        let key = key.replace('-', "_");
        let value = config_value(config, &key)?;
        print_config_line(&key, &value, multi_line, &config.sources);
    }

    Ok(())
}

pub fn config_value(config: &Config, key: &str) -> Result<String> {
    let join = |values: Vec<String>| values.join(",");
    Ok(match key {
        "log_level" => config.log_level.as_str().to_lowercase(),
        "socket_path" => config.socket_path.display().to_string(),
        "runtime_dir" => config.runtime_dir.display().to_string(),
        "server_path" => config.server_path.display().to_string(),
        "seccomp_bpf" => config
            .seccomp_bpf
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default(),
        "server_uid" => config.server_uid.to_string(),
        "server_gid" => config.server_gid.to_string(),
        "supplementary_gids" => join(
            config
                .supplementary_gids
                .iter()
                .map(|gid| gid.to_string())
                .collect(),
        ),
        "access_gid" => config
            .access_gid
            .map(|gid| gid.to_string())
            .unwrap_or("-1".to_string()),
        "server_exit_timeout_ms" => {
            config.server_exit_timeout.as_millis().to_string()
        }
        "bind" => join(
            config
                .bind_mounts
                .iter()
                .map(|bind| match bind.options {
                    BindMountOptions::ReadOnly => {
                        format!("{}:ro", bind.path.display())
                    }
                    BindMountOptions::ReadWrite => {
                        bind.path.display().to_string()
                    }
                })
                .collect(),
        ),
        "home_dir" => config.storage_roots.home_dir.display().to_string(),
        "drivefs_dir" => config.storage_roots.drivefs_dir.display().to_string(),
        "removable_dir" => {
            config.storage_roots.removable_dir.display().to_string()
        }
        "play_files_dir" => {
            config.storage_roots.play_files_dir.display().to_string()
        }
        _ => {
            return Err(anyhow::anyhow!("Unknown key: {}", key));
        }
    })
}

fn print_config_line(
    key: &str,
    value: &str,
    multi_line: bool,
    sources: &HashMap<String, String>,
) {
    sources.get(key).map(|s| {
        debug!("{}={} set from {}", key, value, s);
    });

    if multi_line {
        outln!("{}={}", key, value);
    } else {
        outln!("{}", value);
    }
}
