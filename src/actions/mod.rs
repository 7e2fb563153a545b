mod config;
mod daemon;
mod share_path;
mod start_server;
mod stop_server;
mod unshare_path;

pub use config::*;
pub use daemon::*;
pub use share_path::*;
pub use start_server::*;
pub use stop_server::*;
pub use unshare_path::*;
