use crate::config::Config;
use crate::rpc::call;
use crate::types::{Request, ServerHandle, StopServerRequest, StopServerResponse};
use crate::util::print_json_output;
use anyhow::{Result, anyhow};

pub fn stop_server(config: &Config, handle: ServerHandle) -> Result<()> {
    let request = Request::StopServer(StopServerRequest { handle });
    let response: StopServerResponse = call(&config.socket_path, &request)?;
    print_json_output(&response)?;
    if !response.success {
        return Err(anyhow!("{}", response.failure_reason));
    }
    Ok(())
}
