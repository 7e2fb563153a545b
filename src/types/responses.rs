use super::ServerHandle;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartServerResponse {
    pub success: bool,
    pub handle: ServerHandle,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopServerResponse {
    pub success: bool,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharePathResponse {
    pub success: bool,
    pub path: String,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsharePathResponse {
    pub success: bool,
    pub failure_reason: String,
}

/// Sent back when the request itself could not be decoded, so there is no
/// way to tell which response type the caller expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureResponse {
    pub success: bool,
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    StartServer(StartServerResponse),
    StopServer(StopServerResponse),
    SharePath(SharePathResponse),
    UnsharePath(UnsharePathResponse),
    Failure(FailureResponse),
}

/* The outermost context of an error is what callers get to see; the full
 * chain only goes to the log. */
fn failure_reason(e: &anyhow::Error) -> String {
    e.to_string()
}

impl From<Result<ServerHandle>> for StartServerResponse {
    fn from(result: Result<ServerHandle>) -> Self {
        match result {
            Ok(handle) => StartServerResponse {
                success: true,
                handle,
                ..Default::default()
            },
            Err(e) => StartServerResponse {
                failure_reason: failure_reason(&e),
                ..Default::default()
            },
        }
    }
}

impl From<Result<()>> for StopServerResponse {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => StopServerResponse {
                success: true,
                ..Default::default()
            },
            Err(e) => StopServerResponse {
                failure_reason: failure_reason(&e),
                ..Default::default()
            },
        }
    }
}

impl From<Result<String>> for SharePathResponse {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(path) => SharePathResponse {
                success: true,
                path,
                ..Default::default()
            },
            Err(e) => SharePathResponse {
                failure_reason: failure_reason(&e),
                ..Default::default()
            },
        }
    }
}

impl From<Result<()>> for UnsharePathResponse {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => UnsharePathResponse {
                success: true,
                ..Default::default()
            },
            Err(e) => UnsharePathResponse {
                failure_reason: failure_reason(&e),
                ..Default::default()
            },
        }
    }
}
