mod fixtures;

use anyhow::Result;
use fixtures::*;
use rstest::*;

#[rstest]
fn test_cli(mut seneschal: SeneschalManager) -> Result<()> {
    assert!(seneschal.pass(&["--version"]));
    assert!(seneschal.last_stdout.contains("seneschal"));
    assert!(seneschal.xfail(&["--bad-option"]));
    assert!(seneschal.xfail(&[]));
    assert!(seneschal.xfail(&["stop-server", "not-a-handle"]));
    assert!(seneschal.xfail(&[
        "share-path",
        "1",
        "--storage-location=floppy",
        "photos"
    ]));

    assert!(seneschal.pass(&["config", "socket_path"]));
    assert_eq!(
        seneschal.last_stdout.trim(),
        seneschal.socket_path().display().to_string()
    );
    assert!(seneschal.pass(&["config", "runtime-dir"]));
    assert_eq!(
        seneschal.last_stdout.trim(),
        seneschal.runtime_dir().display().to_string()
    );
    assert!(seneschal.xfail(&["config", "no_such_key"]));
    assert!(seneschal.last_stderr.contains("Unknown key: no_such_key"));

    // default values check
    seneschal.no_default_options = true;
    assert!(seneschal.pass(&["--no-config", "config"]));
    assert!(seneschal.last_stdout.contains("socket_path=/run/seneschal.sock"));
    assert!(seneschal.last_stdout.contains("runtime_dir=/run/seneschal"));
    assert!(
        seneschal
            .last_stdout
            .contains("bind=/proc:ro,/dev/null,/dev/log")
    );
    assert!(seneschal.last_stdout.contains("server_exit_timeout_ms=2000"));
    assert!(seneschal.pass(&["--no-config", "config", "log_level"]));
    assert_eq!(seneschal.last_stdout, "info\n");

    assert!(seneschal.pass(&["--no-config", "--log-level=debug", "config"]));
    assert!(seneschal.last_stdout.contains("log_level=debug"));
    assert!(seneschal.xfail(&["--no-config", "--log-level=loud", "config"]));

    Ok(())
}

#[rstest]
fn test_cli_with_env(mut seneschal: SeneschalManager) -> Result<()> {
    seneschal.set_env("SENESCHAL_SERVER_EXIT_TIMEOUT_MS", "500");
    seneschal.set_env("SENESCHAL_BIND", "/proc:ro,/dev/urandom");
    seneschal.set_env("SENESCHAL_SECCOMP_BPF", "");
    assert!(seneschal.pass(&["config"]));
    assert!(seneschal.last_stdout.contains("server_exit_timeout_ms=500"));
    assert!(seneschal.last_stdout.contains("bind=/proc:ro,/dev/urandom"));
    assert!(seneschal.last_stdout.contains("seccomp_bpf=\n"));

    seneschal.set_env("SENESCHAL_LOG_LEVEL", "foobar");
    assert!(seneschal.xfail(&["config"]));
    assert!(seneschal.last_stderr.contains("Invalid log level: foobar"));

    Ok(())
}

#[rstest]
fn test_cli_env_validation(mut seneschal: SeneschalManager) -> Result<()> {
    seneschal.set_env("SENESCHAL_SERVER_UID", "0");
    assert!(seneschal.xfail(&["config"]));
    assert!(seneschal.last_stderr.contains("Refusing to run servers as root"));
    Ok(())
}

#[rstest]
fn test_cli_with_config(mut seneschal: SeneschalManager) -> Result<()> {
    let config_path = seneschal.path("seneschal.toml");
    std::fs::write(
        &config_path,
        r#"
        log_level = "warn"
        runtime_dir = "/tmp/seneschal-config-test"
        server_exit_timeout_ms = 750
        bind = ["/proc:ro"]
        "#,
    )?;
    let config_arg = format!("--config={}", config_path.display());

    seneschal.no_default_options = true;
    assert!(seneschal.pass(&[&config_arg, "config"]));
    assert!(seneschal.last_stdout.contains("log_level=warn"));
    assert!(
        seneschal
            .last_stdout
            .contains("runtime_dir=/tmp/seneschal-config-test")
    );
    assert!(seneschal.last_stdout.contains("server_exit_timeout_ms=750"));
    assert!(seneschal.last_stdout.contains("bind=/proc:ro\n"));

    // the command line wins over the file
    assert!(seneschal.pass(&[
        &config_arg,
        "--runtime-dir=/tmp/seneschal-cli",
        "config",
        "runtime_dir"
    ]));
    assert_eq!(seneschal.last_stdout, "/tmp/seneschal-cli\n");

    assert!(seneschal.xfail(&[&config_arg, "--no-config", "config"]));

    std::fs::write(&config_path, "unknown_option = true\n")?;
    assert!(seneschal.xfail(&[&config_arg, "config"]));
    assert!(seneschal.last_stderr.contains("Failed to parse config file"));

    let missing = format!("--config={}", seneschal.path("missing.toml").display());
    assert!(seneschal.xfail(&[&missing, "config"]));
    assert!(seneschal.last_stderr.contains("Failed to read config file"));

    Ok(())
}

#[rstest]
fn test_cli_without_daemon(mut seneschal: SeneschalManager) -> Result<()> {
    assert!(seneschal.xfail(&["stop-server", "1"]));
    assert!(seneschal.last_stderr.contains("is the daemon running?"));
    assert!(seneschal.xfail(&[
        "start-server",
        "--vsock-port=9000",
        "--accept-cid=3"
    ]));
    assert!(seneschal.xfail(&["unshare-path", "1", "MyFiles/Downloads"]));
    Ok(())
}
