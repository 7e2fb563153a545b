use crate::config::Config;
use crate::rpc::call;
use crate::types::{
    ListenAddress, Request, StartServerRequest, StartServerResponse,
};
use crate::util::print_json_output;
use anyhow::{Result, anyhow};

pub fn start_server(
    config: &Config,
    vsock_port: u32,
    accept_cid: u32,
) -> Result<()> {
    let request = Request::StartServer(StartServerRequest {
        listen_address: Some(ListenAddress::Vsock {
            port: vsock_port,
            accept_cid,
        }),
    });
    let response: StartServerResponse = call(&config.socket_path, &request)?;
    print_json_output(&response)?;
    if !response.success {
        return Err(anyhow!("{}", response.failure_reason));
    }
    Ok(())
}
