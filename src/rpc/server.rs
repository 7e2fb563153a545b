use crate::service::Service;
use crate::types::{
    FailureResponse, Request, Response, SharePathResponse, StartServerResponse,
    StopServerResponse, UnsharePathResponse,
};
use anyhow::{Context, Result};
use log::{debug, error, info, trace};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/* Total time a client gets to deliver its request line. */
const CLIENT_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Decodes one request, runs it and encodes the response.
pub fn dispatch(service: &mut Service, line: &str) -> Result<String> {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            error!("Unable to parse request: {}", e);
            return serialize(&Response::Failure(FailureResponse {
                success: false,
                failure_reason: "Unable to parse request".to_string(),
            }));
        }
    };

    let response = match request {
        Request::StartServer(request) => {
            info!("Received StartServer request");
            Response::StartServer(StartServerResponse::from(logged(
                "StartServer",
                service.start_server(&request),
            )))
        }
        Request::StopServer(request) => {
            info!("Received StopServer request for {}", request.handle);
            Response::StopServer(StopServerResponse::from(logged(
                "StopServer",
                service.stop_server(&request),
            )))
        }
        Request::SharePath(request) => {
            info!(
                "Received SharePath request for {}: {} '{}'",
                request.handle, request.storage_location, request.path
            );
            Response::SharePath(SharePathResponse::from(logged(
                "SharePath",
                service.share_path(&request),
            )))
        }
        Request::UnsharePath(request) => {
            info!(
                "Received UnsharePath request for {}: '{}'",
                request.handle, request.path
            );
            Response::UnsharePath(UnsharePathResponse::from(logged(
                "UnsharePath",
                service.unshare_path(&request),
            )))
        }
    };
    serialize(&response)
}

fn logged<T>(method: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        error!("{} failed: {:#}", method, e);
    }
    result
}

fn serialize(response: &Response) -> Result<String> {
    serde_json::to_string(response).context("Failed to serialize response")
}

/**
 * The control socket. Each connection carries exactly one request line and
 * gets one response line back. The listener is non-blocking so the event
 * loop can poll it next to the signalfd.
 */
pub struct RpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl RpcServer {
    pub fn bind(path: &Path) -> Result<RpcServer> {
        if let Ok(metadata) = std::fs::symlink_metadata(path) {
            if !metadata.file_type().is_socket() {
                return Err(anyhow::anyhow!(
                    "{} exists and is not a socket",
                    path.display()
                ));
            }
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path).context(format!(
                "Failed to remove stale socket {}",
                path.display()
            ))?;
        }

        let listener = UnixListener::bind(path)
            .context(format!("Failed to bind {}", path.display()))?;
        listener
            .set_nonblocking(true)
            .context("Failed to make listener non-blocking")?;
        Ok(RpcServer {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serves every connection currently waiting, then returns.
    pub fn accept_pending(&self, service: &mut Service) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = handle_connection(stream, service) {
                        error!("Failed to handle request: {:#}", e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    break;
                }
            }
        }
    }
}

impl AsFd for RpcServer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

fn handle_connection(stream: UnixStream, service: &mut Service) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(CLIENT_TIMEOUT))?;

    let line = read_request(&stream, Instant::now() + CLIENT_TIMEOUT)?;
    if line.trim().is_empty() {
        trace!("Client closed the connection without a request");
        return Ok(());
    }

    let mut response = dispatch(service, line.trim())?;
    response.push('\n');
    (&stream)
        .write_all(response.as_bytes())
        .context("Failed to write response")
}

/**
 * Reads up to the first newline or EOF. The deadline bounds the whole
 * request, not each read, and the line may not grow beyond MAX_REQUEST_BYTES.
 */
fn read_request(stream: &UnixStream, deadline: Instant) -> Result<String> {
    let mut reader = stream;
    let mut request = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(anyhow::anyhow!("Timed out reading request"));
        }
        stream.set_read_timeout(Some(remaining))?;

        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.kind() == ErrorKind::TimedOut =>
            {
                return Err(anyhow::anyhow!("Timed out reading request"));
            }
            Err(e) => return Err(e).context("Failed to read request"),
        };
        if n == 0 {
            break;
        }
        if let Some(end) = chunk[..n].iter().position(|&b| b == b'\n') {
            request.extend_from_slice(&chunk[..end]);
            break;
        }
        request.extend_from_slice(&chunk[..n]);
        if request.len() > MAX_REQUEST_BYTES {
            return Err(anyhow::anyhow!(
                "Request exceeds {} bytes",
                MAX_REQUEST_BYTES
            ));
        }
    }
    if request.len() > MAX_REQUEST_BYTES {
        return Err(anyhow::anyhow!(
            "Request exceeds {} bytes",
            MAX_REQUEST_BYTES
        ));
    }
    String::from_utf8(request).context("Request is not valid UTF-8")
}
