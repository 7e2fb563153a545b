use crate::config::Config;
use crate::rpc::call;
use crate::types::{
    Request, ServerHandle, SharePathRequest, SharePathResponse,
    StorageLocation,
};
use crate::util::print_json_output;
use anyhow::{Result, anyhow};

pub fn share_path(
    config: &Config,
    handle: ServerHandle,
    storage_location: StorageLocation,
    owner_id: String,
    drivefs_mount_name: String,
    path: String,
    read_only: bool,
) -> Result<()> {
    let request = Request::SharePath(SharePathRequest {
        handle,
        storage_location,
        owner_id,
        drivefs_mount_name,
        path,
        writable: !read_only,
    });
    let response: SharePathResponse = call(&config.socket_path, &request)?;
    print_json_output(&response)?;
    if !response.success {
        return Err(anyhow!("{}", response.failure_reason));
    }
    Ok(())
}
