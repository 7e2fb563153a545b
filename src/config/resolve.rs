use super::cli::Args;
use super::impls::optional_path;
use super::{
    BindMount, Config, DEFAULT_ACCESS_GID, DEFAULT_BIND_MOUNTS,
    DEFAULT_RUNTIME_DIR, DEFAULT_SECCOMP_BPF, DEFAULT_SERVER_EXIT_TIMEOUT_MS,
    DEFAULT_SERVER_GID, DEFAULT_SERVER_PATH, DEFAULT_SERVER_UID,
    DEFAULT_SOCKET_PATH, DEFAULT_SUPPLEMENTARY_GIDS, PartialConfig,
    StorageRoots,
};
use anyhow::{Context, Result, anyhow};
use log::trace;
use nix::unistd::{Gid, Uid};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const SYSTEM_CONFIG_FILES: [&str; 2] =
    ["/etc/seneschal.toml", "/etc/seneschal/config.toml"];

pub fn resolve_config(cli: Args) -> Result<Config> {
    resolve_config_with_env(cli, &|name| std::env::var(name).ok())
}

/**
 * Builds the final configuration. Precedence, lowest to highest: built-in
 * defaults, config files, `SENESCHAL_*` environment variables, command line.
 * `sources` records where each key's value came from.
 */
pub fn resolve_config_with_env(
    cli: Args,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Config> {
    let (mut partial_config, mut sources) =
        load_partial(cli.no_config, cli.config.as_deref())?;

    apply_env(&mut partial_config, &mut sources, env)?;

    // Override with CLI args if provided (highest precedence)
    if let Some(log_level) = cli.log_level {
        partial_config.log_level = Some(log_level);
        sources.insert("log_level".into(), "cli".into());
    }
    if let Some(socket) = cli.socket {
        partial_config.socket_path = Some(socket);
        sources.insert("socket_path".into(), "cli".into());
    }
    if let Some(runtime_dir) = cli.runtime_dir {
        partial_config.runtime_dir = Some(runtime_dir);
        sources.insert("runtime_dir".into(), "cli".into());
    }

    // If nothing else, fill in with some default values
    for key in [
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
    ] {
        sources.entry(key.into()).or_insert_with(|| "default".into());
    }

    let access_gid = partial_config.access_gid.unwrap_or(DEFAULT_ACCESS_GID);
    let access_gid = if access_gid < 0 {
        None
    } else {
        Some(Gid::from_raw(u32::try_from(access_gid).context(format!(
            "Invalid access_gid: {}",
            access_gid
        ))?))
    };

    let bind_mounts = partial_config.bind_mounts.unwrap_or_else(|| {
        DEFAULT_BIND_MOUNTS.iter().map(|s| s.to_string()).collect()
    });
    let bind_mounts = parse_bind_mounts(&bind_mounts)?;

    let defaults = StorageRoots::default();
    let storage_roots = StorageRoots {
        home_dir: partial_config
            .home_dir
            .map(PathBuf::from)
            .unwrap_or(defaults.home_dir),
        drivefs_dir: partial_config
            .drivefs_dir
            .map(PathBuf::from)
            .unwrap_or(defaults.drivefs_dir),
        removable_dir: partial_config
            .removable_dir
            .map(PathBuf::from)
            .unwrap_or(defaults.removable_dir),
        play_files_dir: partial_config
            .play_files_dir
            .map(PathBuf::from)
            .unwrap_or(defaults.play_files_dir),
    };

    let config = Config {
        log_level: partial_config.log_level.unwrap_or(log::LevelFilter::Info),
        socket_path: PathBuf::from(
            partial_config
                .socket_path
                .unwrap_or(DEFAULT_SOCKET_PATH.to_string()),
        ),
        runtime_dir: PathBuf::from(
            partial_config
                .runtime_dir
                .unwrap_or(DEFAULT_RUNTIME_DIR.to_string()),
        ),
        server_path: PathBuf::from(
            partial_config
                .server_path
                .unwrap_or(DEFAULT_SERVER_PATH.to_string()),
        ),
        seccomp_bpf: optional_path(
            partial_config
                .seccomp_bpf
                .unwrap_or(DEFAULT_SECCOMP_BPF.to_string()),
        ),
        server_uid: Uid::from_raw(
            partial_config.server_uid.unwrap_or(DEFAULT_SERVER_UID),
        ),
        server_gid: Gid::from_raw(
            partial_config.server_gid.unwrap_or(DEFAULT_SERVER_GID),
        ),
        supplementary_gids: partial_config
            .supplementary_gids
            .unwrap_or(DEFAULT_SUPPLEMENTARY_GIDS.to_vec())
            .into_iter()
            .map(Gid::from_raw)
            .collect(),
        access_gid,
        server_exit_timeout: Duration::from_millis(
            partial_config
                .server_exit_timeout_ms
                .unwrap_or(DEFAULT_SERVER_EXIT_TIMEOUT_MS),
        ),
        bind_mounts,
        storage_roots,
        sources,
    };

    validate_config(&config)?;

    trace!("Socket path: {}", config.socket_path.display());
    trace!("Runtime dir: {}", config.runtime_dir.display());

    Ok(config)
}

fn apply_env(
    partial_config: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<()> {
    let mut set = |key: &str| {
        sources.insert(key.into(), "environment".into());
    };

    if let Some(log_level) = env("SENESCHAL_LOG_LEVEL") {
        let log_level = log::LevelFilter::from_str(&log_level)
            .map_err(|_| anyhow!("Invalid log level: {}", log_level))?;
        partial_config.log_level = Some(log_level);
        set("log_level");
    }

    let strings: [(&str, &str, &mut Option<String>); 8] = [
        (
            "SENESCHAL_SOCKET_PATH",
            "socket_path",
            &mut partial_config.socket_path,
        ),
        (
            "SENESCHAL_RUNTIME_DIR",
            "runtime_dir",
            &mut partial_config.runtime_dir,
        ),
        (
            "SENESCHAL_SERVER_PATH",
            "server_path",
            &mut partial_config.server_path,
        ),
        ("SENESCHAL_HOME_DIR", "home_dir", &mut partial_config.home_dir),
        (
            "SENESCHAL_DRIVEFS_DIR",
            "drivefs_dir",
            &mut partial_config.drivefs_dir,
        ),
        (
            "SENESCHAL_REMOVABLE_DIR",
            "removable_dir",
            &mut partial_config.removable_dir,
        ),
        (
            "SENESCHAL_PLAY_FILES_DIR",
            "play_files_dir",
            &mut partial_config.play_files_dir,
        ),
        (
            "SENESCHAL_SECCOMP_BPF",
            "seccomp_bpf",
            &mut partial_config.seccomp_bpf,
        ),
    ];
    for (var, key, field) in strings {
        let Some(value) = env(var) else {
            continue;
        };
        // An empty seccomp path is meaningful: it disables the filter
        if value.is_empty() && key != "seccomp_bpf" {
            continue;
        }
        *field = Some(value);
        set(key);
    }

    if let Some(uid) = env("SENESCHAL_SERVER_UID") {
        partial_config.server_uid = Some(parse_number(&uid, "server_uid")?);
        set("server_uid");
    }
    if let Some(gid) = env("SENESCHAL_SERVER_GID") {
        partial_config.server_gid = Some(parse_number(&gid, "server_gid")?);
        set("server_gid");
    }
    if let Some(gid) = env("SENESCHAL_ACCESS_GID") {
        partial_config.access_gid = Some(parse_number(&gid, "access_gid")?);
        set("access_gid");
    }
    if let Some(timeout) = env("SENESCHAL_SERVER_EXIT_TIMEOUT_MS") {
        partial_config.server_exit_timeout_ms =
            Some(parse_number(&timeout, "server_exit_timeout_ms")?);
        set("server_exit_timeout_ms");
    }
    if let Some(gids) = env("SENESCHAL_SUPPLEMENTARY_GIDS") {
        partial_config.supplementary_gids = Some(
            split_list(&gids)
                .iter()
                .map(|gid| parse_number(gid, "supplementary_gids"))
                .collect::<Result<Vec<u32>>>()?,
        );
        set("supplementary_gids");
    }

    // Unlike everything else, the jail bind list from the environment
    // replaces rather than extends, so that it can drop /dev/log.
    if let Some(binds) = env("SENESCHAL_BIND") {
        partial_config.bind_mounts = Some(split_list(&binds));
        set("bind");
    }

    Ok(())
}

fn parse_number<T: FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/* Deduplicates, preserving order. */
fn parse_bind_mounts(bind_mounts: &[String]) -> Result<Vec<BindMount>> {
    let mut seen: HashSet<&str> = HashSet::new();
    bind_mounts
        .iter()
        .filter(|mount| seen.insert(mount.as_str()))
        .map(|mount| {
            BindMount::from_str(mount)
                .context(format!("Invalid bind mount '{}'", mount))
        })
        .collect()
}

pub fn load_partial(
    no_config: bool,
    explicit_config: Option<&std::path::Path>,
) -> Result<(PartialConfig, HashMap<String, String>)> {
    let config_paths = match explicit_config {
        Some(path) => vec![path.to_path_buf()],
        None if no_config => vec![],
        None => find_config_files(),
    };
    let mut sources = HashMap::new();
    if config_paths.is_empty() {
        trace!("No config files found, using default config");
        return Ok((PartialConfig::default(), sources));
    }

    let mut merged_config = PartialConfig::default();
    for path in config_paths.iter() {
        let config_str = std::fs::read_to_string(path).context(format!(
            "Failed to read config file {}",
            path.display()
        ))?;

        let config: PartialConfig = toml::from_str(&config_str).context(
            format!("Failed to parse config file {}", path.display()),
        )?;

        merge_configs(
            &mut merged_config,
            &mut sources,
            config,
            path.to_str()
                .context("Failed to convert config path to str")?,
        );
        trace!("Loaded config file: {}", path.display());
    }

    Ok((merged_config, sources))
}

/** Returns the system config files that exist, lowest precedence first */
fn find_config_files() -> Vec<PathBuf> {
    SYSTEM_CONFIG_FILES
        .iter()
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .collect()
}

fn merge_configs(
    base: &mut PartialConfig,
    sources: &mut HashMap<String, String>,
    override_config: PartialConfig,
    source: &str,
) {
    macro_rules! merge {
        ($($field:ident => $key:literal),* $(,)?) => {
            $(
                if let Some(value) = override_config.$field {
                    base.$field = Some(value);
                    sources.insert($key.into(), source.into());
                }
            )*
        };
    }

    merge!(
        log_level => "log_level",
        socket_path => "socket_path",
        runtime_dir => "runtime_dir",
        server_path => "server_path",
        seccomp_bpf => "seccomp_bpf",
        server_uid => "server_uid",
        server_gid => "server_gid",
        supplementary_gids => "supplementary_gids",
        access_gid => "access_gid",
        server_exit_timeout_ms => "server_exit_timeout_ms",
        bind_mounts => "bind",
        home_dir => "home_dir",
        drivefs_dir => "drivefs_dir",
        removable_dir => "removable_dir",
        play_files_dir => "play_files_dir",
    );
}

fn validate_config(config: &Config) -> Result<()> {
    for (key, path) in [
        ("socket_path", &config.socket_path),
        ("runtime_dir", &config.runtime_dir),
        ("server_path", &config.server_path),
    ] {
        if !path.is_absolute() {
            return Err(anyhow!(
                "{} must be an absolute path: {}",
                key,
                path.display()
            ));
        }
    }
    if config.server_uid.is_root() {
        return Err(anyhow!("Refusing to run servers as root"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindMountOptions;
    use clap::Parser;
    use log::LevelFilter;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["seneschal", "--no-config"];
        argv.extend_from_slice(extra);
        argv.push("daemon");
        Args::parse_from(argv)
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = resolve_config_with_env(args(&[]), &no_env).unwrap();
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(config.runtime_dir, PathBuf::from(DEFAULT_RUNTIME_DIR));
        assert_eq!(
            config.seccomp_bpf,
            Some(PathBuf::from(DEFAULT_SECCOMP_BPF))
        );
        assert_eq!(config.access_gid, Some(Gid::from_raw(1001)));
        assert_eq!(config.bind_mounts.len(), 3);
        assert_eq!(config.bind_mounts[0].options, BindMountOptions::ReadOnly);
        assert_eq!(config.sources.get("bind"), Some(&"default".to_string()));
    }

    #[test]
    fn test_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "socket_path = \"/tmp/file.sock\"\nruntime_dir = \"/tmp/file\"\n\
             log_level = \"debug\"\nbind = [\"/proc:ro\"]\n",
        )
        .unwrap();
        let file_arg = format!("--config={}", file.display());
        let cli = Args::parse_from([
            "seneschal",
            file_arg.as_str(),
            "--socket",
            "/tmp/cli.sock",
            "daemon",
        ]);
        let env = |name: &str| match name {
            "SENESCHAL_RUNTIME_DIR" => Some("/tmp/env".to_string()),
            "SENESCHAL_SECCOMP_BPF" => Some(String::new()),
            "SENESCHAL_ACCESS_GID" => Some("-1".to_string()),
            _ => None,
        };
        let config = resolve_config_with_env(cli, &env).unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/cli.sock"));
        assert_eq!(config.runtime_dir, PathBuf::from("/tmp/env"));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert_eq!(config.seccomp_bpf, None);
        assert_eq!(config.access_gid, None);
        assert_eq!(config.bind_mounts.len(), 1);

        assert_eq!(config.sources.get("socket_path"), Some(&"cli".to_string()));
        assert_eq!(
            config.sources.get("runtime_dir"),
            Some(&"environment".to_string())
        );
        assert_eq!(
            config.sources.get("log_level"),
            Some(&file.display().to_string())
        );
    }

    #[test]
    fn test_invalid_values() {
        let env = |name: &str| match name {
            "SENESCHAL_SERVER_UID" => Some("abc".to_string()),
            _ => None,
        };
        assert!(resolve_config_with_env(args(&[]), &env).is_err());

        let env = |name: &str| match name {
            "SENESCHAL_SERVER_UID" => Some("0".to_string()),
            _ => None,
        };
        assert!(resolve_config_with_env(args(&[]), &env).is_err());

        let env = |name: &str| match name {
            "SENESCHAL_BIND" => Some("proc".to_string()),
            _ => None,
        };
        assert!(resolve_config_with_env(args(&[]), &env).is_err());

        assert!(
            resolve_config_with_env(args(&["--socket", "relative"]), &no_env)
                .is_err()
        );
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "storage_dir = \"/tmp\"\n").unwrap();
        assert!(load_partial(false, Some(&file)).is_err());
    }

    #[test]
    fn test_merge_configs() {
        let mut base = PartialConfig {
            socket_path: Some("/tmp/a.sock".to_string()),
            ..PartialConfig::default()
        };
        let mut sources = HashMap::new();
        let override_config = PartialConfig {
            log_level: Some(LevelFilter::Debug),
            server_uid: Some(2000),
            bind_mounts: Some(vec!["/dev/null".to_string()]),
            ..PartialConfig::default()
        };

        merge_configs(&mut base, &mut sources, override_config, "test-config");

        assert_eq!(base.socket_path, Some("/tmp/a.sock".to_string()));
        assert_eq!(base.log_level, Some(LevelFilter::Debug));
        assert_eq!(base.server_uid, Some(2000));
        assert_eq!(base.bind_mounts, Some(vec!["/dev/null".to_string()]));
        assert_eq!(sources.get("log_level"), Some(&"test-config".to_string()));
        assert_eq!(sources.get("bind"), Some(&"test-config".to_string()));
        assert_eq!(sources.get("socket_path"), None);
    }

    #[test]
    fn test_parse_bind_mounts_dedups() {
        let binds = parse_bind_mounts(&[
            "/proc:ro".to_string(),
            "/dev/null".to_string(),
            "/proc:ro".to_string(),
        ])
        .unwrap();
        assert_eq!(binds.len(), 2);
    }
}
