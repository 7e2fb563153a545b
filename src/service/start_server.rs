use super::{FSROOT, JailSpec, ServerRecord, ServerRoot, Service, Teardown};
use crate::config::{BindMount, BindMountOptions};
use crate::types::{ListenAddress, ServerHandle, StartServerRequest};
use crate::util::{bind_mount, mkdir_recursively, remount_read_only};
use anyhow::{Context, Result, anyhow};
use log::{error, info, trace};
use nix::unistd::Pid;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

/* cids 0-2 are reserved for the hypervisor, local and host. */
const MIN_GUEST_CID: u32 = 3;

/// Command line for the server, which serves `/fsroot` from inside its jail.
pub fn server_args(listen_address: Option<&ListenAddress>) -> Result<Vec<String>> {
    match listen_address {
        Some(ListenAddress::Vsock { port, accept_cid }) => {
            if *accept_cid < MIN_GUEST_CID {
                return Err(anyhow!("Invalid accept_cid {}", accept_cid));
            }
            Ok(vec![
                "-r".to_string(),
                format!("/{}", FSROOT),
                "--accept_cid".to_string(),
                accept_cid.to_string(),
                format!("vsock:{}", port),
            ])
        }
        Some(address) => Err(anyhow!(
            "Listening on {} addresses is not implemented",
            address.kind()
        )),
        None => Err(anyhow!("No listen address given")),
    }
}

impl Service {
    pub fn start_server(
        &mut self,
        request: &StartServerRequest,
    ) -> Result<ServerHandle> {
        let args = server_args(request.listen_address.as_ref())
            .context("Unable to create listening address")?;
        self.next_handle()?;

        let root = ServerRoot::create(&self.config.runtime_dir)?;
        let pid = match self.launch(&root, args) {
            Ok(pid) => pid,
            Err(e) => {
                if let Teardown::Abandoned { path, reason } = root.close() {
                    error!(
                        "Leaving partially built root {} behind: {:#}",
                        path.display(),
                        reason
                    );
                }
                return Err(e);
            }
        };

        let handle = self.allocate_handle()?;
        info!(
            "Started server {} with pid {} in {}",
            handle,
            pid,
            root.path().display()
        );
        self.servers.insert(handle, ServerRecord { pid, root });
        Ok(handle)
    }

    fn launch(&self, root: &ServerRoot, args: Vec<String>) -> Result<Pid> {
        std::fs::DirBuilder::new()
            .mode(0o755)
            .create(root.fsroot())
            .context("Unable to create server root dir")?;

        for bind in &self.config.bind_mounts {
            setup_jail_mount(root.path(), bind)
                .context("Unable to set up server jail")?;
        }

        let spec = JailSpec {
            root: root.path().to_path_buf(),
            program: self.config.server_path.clone(),
            args,
            uid: self.config.server_uid,
            gid: self.config.server_gid,
            supplementary_gids: self.config.supplementary_gids.clone(),
            seccomp_bpf: self.config.seccomp_bpf.clone(),
        };
        self.jail.spawn(&spec).context("Unable to spawn server")
    }
}

/* Makes `bind.path` visible at the same location under `root`. */
fn setup_jail_mount(root: &Path, bind: &BindMount) -> Result<()> {
    let relative = bind.path.strip_prefix("/").unwrap_or(&bind.path);
    let target = root.join(relative);
    let metadata = std::fs::metadata(&bind.path)
        .context(format!("failed to stat {}", bind.path.display()))?;

    if metadata.is_dir() {
        mkdir_recursively(&target)?;
    } else {
        if let Some(parent) = target.parent() {
            mkdir_recursively(parent)?;
        }
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .custom_flags(libc::O_NOFOLLOW)
            .open(&target)
            .context(format!("failed to create {}", target.display()))?;
    }

    trace!("Binding {} into {}", bind, root.display());
    bind_mount(&bind.path, &target)?;
    if bind.options == BindMountOptions::ReadOnly {
        remount_read_only(&bind.path, &target)?;
    }
    Ok(())
}
