use serde::{Deserialize, Serialize};

/// Where a newly started server should accept connections.
///
/// Only `Vsock` is implemented; the other variants are accepted on the wire
/// so that the daemon can reject them with a meaningful reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenAddress {
    Vsock {
        port: u32,
        #[serde(default)]
        accept_cid: u32,
    },
    UnixAddr {
        path: String,
    },
    Net {
        address: String,
        port: u16,
    },
    Fd {
        fd: i32,
    },
}

impl ListenAddress {
    pub fn kind(&self) -> &'static str {
        match self {
            ListenAddress::Vsock { .. } => "vsock",
            ListenAddress::UnixAddr { .. } => "unix_addr",
            ListenAddress::Net { .. } => "net",
            ListenAddress::Fd { .. } => "fd",
        }
    }
}
