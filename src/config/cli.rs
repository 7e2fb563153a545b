use crate::types::{ServerHandle, StorageLocation};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /**********************/
    /* Flags and settings */
    /**********************/
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Load configuration from this file instead of the system config files.
    #[arg(long, global = true, conflicts_with = "no_config")]
    pub config: Option<PathBuf>,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    /// Path of the control socket. Defaults to `/run/seneschal.sock`
    #[arg(long, global = true)]
    pub socket: Option<String>,

    /// Directory server roots are created in. Defaults to `/run/seneschal`
    #[arg(long, global = true)]
    pub runtime_dir: Option<String>,

    /***************/
    /* Subcommands */
    /***************/
    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand, Clone, Debug)]
#[command(subcommand_help_heading = "Actions")]
pub enum Action {
    /// Run the daemon in the foreground
    Daemon,

    /// Get current configuration options
    Config {
        /// The keys to get from the configuration
        #[arg(value_name = "KEYS", num_args = 0..)]
        keys: Option<Vec<String>>,
    },

    /// Start a server listening on vsock for a single VM
    StartServer {
        /// vsock port the server listens on
        #[arg(long)]
        vsock_port: u32,

        /// Context id of the VM allowed to connect
        #[arg(long)]
        accept_cid: u32,
    },

    /// Stop a running server
    StopServer {
        #[arg(value_name = "HANDLE")]
        handle: ServerHandle,
    },

    /// Make a host path visible to a server
    SharePath {
        #[arg(value_name = "HANDLE")]
        handle: ServerHandle,

        /// downloads, my-files, drivefs-my-drive, drivefs-team-drives,
        /// drivefs-computers, removable or play-files
        #[arg(long, value_parser = parse_storage_location)]
        storage_location: StorageLocation,

        /// Cryptohome id of the user owning the files
        #[arg(long, default_value = "")]
        owner_id: String,

        /// Name of the DriveFS mount, e.g. drivefs-abcdef
        #[arg(long, default_value = "")]
        drivefs_mount_name: String,

        /// Ask for a read-only share
        #[arg(long, action = clap::ArgAction::SetTrue)]
        read_only: bool,

        /// Path relative to the storage location
        #[arg(value_name = "PATH", default_value = "")]
        path: String,
    },

    /// Remove a previously shared path from a server
    UnsharePath {
        #[arg(value_name = "HANDLE")]
        handle: ServerHandle,

        /// Path as returned by share-path
        #[arg(value_name = "PATH")]
        path: String,
    },
}

fn parse_storage_location(s: &str) -> Result<StorageLocation, String> {
    s.parse::<StorageLocation>()
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}
