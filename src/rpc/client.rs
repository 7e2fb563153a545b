use crate::types::Request;
use anyhow::{Context, Result};
use log::trace;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Sends one request to a running daemon and decodes its response.
pub fn call<R: DeserializeOwned>(socket_path: &Path, request: &Request) -> Result<R> {
    let mut stream = UnixStream::connect(socket_path).context(format!(
        "Failed to connect to {}, is the daemon running?",
        socket_path.display()
    ))?;

    let mut line =
        serde_json::to_string(request).context("Failed to serialize request")?;
    trace!("Sending {}", line);
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .context("Failed to send request")?;
    stream
        .shutdown(Shutdown::Write)
        .context("Failed to send request")?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .context("Failed to read response")?;
    trace!("Received {}", response.trim());
    serde_json::from_str(response.trim()).context("Failed to parse response")
}
