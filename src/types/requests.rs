use super::{ListenAddress, ServerHandle, StorageLocation};
use serde::{Deserialize, Serialize};

/// One RPC call as it travels over the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    StartServer(StartServerRequest),
    StopServer(StopServerRequest),
    SharePath(SharePathRequest),
    UnsharePath(UnsharePathRequest),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartServerRequest {
    #[serde(default)]
    pub listen_address: Option<ListenAddress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopServerRequest {
    #[serde(default)]
    pub handle: ServerHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePathRequest {
    #[serde(default)]
    pub handle: ServerHandle,
    pub storage_location: StorageLocation,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub drivefs_mount_name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

fn default_writable() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnsharePathRequest {
    #[serde(default)]
    pub handle: ServerHandle,
    #[serde(default)]
    pub path: String,
}
