use anyhow::{Result, anyhow};
use log::warn;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use rand::Rng;
use rstest::*;
use std::path::PathBuf;
use std::process::{Child, Command, Output};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub fn rid() -> String {
    let mut rng = rand::rng();
    let rid: String = (0..10)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect();
    rid
}

#[allow(dead_code)]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/**
 * Runs the seneschal binary against a private socket and runtime directory,
 * so tests never touch a system daemon.
 */
pub struct SeneschalManager {
    pub name: String,
    pub last_stdout: String,
    pub last_stderr: String,
    pub seneschal_bin: PathBuf,
    /* When set, --no-config/--socket/--runtime-dir are not added */
    pub no_default_options: bool,
    pub envs: Vec<(String, String)>,
    pub dir: TempDir,
    daemon: Option<Child>,
}

impl SeneschalManager {
    pub fn new() -> Self {
        let name = format!("seneschal-test-{}", rid());
        #[allow(clippy::unwrap_used)]
        let dir = tempfile::Builder::new().prefix(&name).tempdir().unwrap();

        Self {
            name,
            last_stdout: String::new(),
            last_stderr: String::new(),
            seneschal_bin: PathBuf::from(env!("CARGO_BIN_EXE_seneschal")),
            no_default_options: false,
            envs: Vec::new(),
            dir,
            daemon: None,
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join("seneschal.sock")
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.dir.path().join("run")
    }

    #[allow(dead_code)]
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.envs.push((key.to_string(), value.to_string()));
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.seneschal_bin);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if !self.no_default_options {
            cmd.arg("--no-config");
            cmd.arg(format!("--socket={}", self.socket_path().display()));
            cmd.arg(format!("--runtime-dir={}", self.runtime_dir().display()));
        }
        cmd.args(args);
        println!(
            "Running command: {} {}",
            cmd.get_program().to_string_lossy(),
            cmd.get_args()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        cmd
    }

    pub fn run(&mut self, args: &[&str]) -> Result<Output> {
        let output = self.command(args).output()?;
        self.last_stdout = String::from_utf8_lossy(&output.stdout).to_string();
        self.last_stderr = String::from_utf8_lossy(&output.stderr).to_string();

        match output.status.code() {
            Some(0) => Ok(output),
            Some(code) => Err(anyhow!(
                "Command returned non-zero exit code: {}\nstdout: {}\nstderr: {}",
                code,
                self.last_stdout,
                self.last_stderr
            )),
            None => Err(anyhow!(
                "Command did not return a valid exit code\nstdout: {}\nstderr: {}",
                self.last_stdout,
                self.last_stderr
            )),
        }
    }

    #[allow(dead_code)]
    pub fn pass(&mut self, args: &[&str]) -> bool {
        if self.run(args).is_ok() {
            return true;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    #[allow(dead_code)]
    pub fn xfail(&mut self, args: &[&str]) -> bool {
        if self.run(args).is_err() {
            return true;
        }
        println!("last_stderr: {}", self.last_stderr);
        println!("last_stdout: {}", self.last_stdout);
        false
    }

    /// Starts `seneschal daemon` in the background and waits for its socket.
    #[allow(dead_code)]
    pub fn start_daemon(&mut self) -> Result<()> {
        let child = self.command(&["-v", "daemon"]).spawn()?;
        self.daemon = Some(child);

        let deadline = Instant::now() + Duration::from_secs(5);
        while !self.socket_path().exists() {
            if Instant::now() > deadline {
                return Err(anyhow!("Daemon did not create its socket"));
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        Ok(())
    }

    /// Sends SIGTERM to the daemon and returns its exit code.
    #[allow(dead_code)]
    pub fn stop_daemon(&mut self) -> Result<Option<i32>> {
        let Some(mut child) = self.daemon.take() else {
            return Err(anyhow!("Daemon is not running"));
        };
        let pid = Pid::from_raw(i32::try_from(child.id())?);
        kill(pid, Signal::SIGTERM)?;
        Ok(child.wait()?.code())
    }

    #[allow(dead_code)]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Drop for SeneschalManager {
    fn drop(&mut self) {
        if let Some(mut child) = self.daemon.take() {
            if let Err(e) = child.kill() {
                warn!("Failed to kill daemon for {}: {}", self.name, e);
            }
            let _ = child.wait();
        }
    }
}

#[fixture]
pub fn seneschal() -> SeneschalManager {
    SeneschalManager::new()
}
