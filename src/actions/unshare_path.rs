use crate::config::Config;
use crate::rpc::call;
use crate::types::{
    Request, ServerHandle, UnsharePathRequest, UnsharePathResponse,
};
use crate::util::print_json_output;
use anyhow::{Result, anyhow};

pub fn unshare_path(
    config: &Config,
    handle: ServerHandle,
    path: String,
) -> Result<()> {
    let request = Request::UnsharePath(UnsharePathRequest { handle, path });
    let response: UnsharePathResponse = call(&config.socket_path, &request)?;
    print_json_output(&response)?;
    if !response.success {
        return Err(anyhow!("{}", response.failure_reason));
    }
    Ok(())
}
