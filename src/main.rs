#![allow(
    clippy::collapsible_else_if,
    clippy::collapsible_if,
    clippy::module_inception,
    clippy::needless_range_loop,
    clippy::result_map_unit_fn,
    clippy::useless_format
)]
#![deny(
    clippy::get_unwrap,
    clippy::panic,
    clippy::print_stdout,
    clippy::unwrap_used,
    clippy::use_debug,
    clippy::used_underscore_binding,
    clippy::used_underscore_items
)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod actions;
mod config;
mod logger;
mod rpc;
mod service;
mod types;
mod util;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use config::{cli, resolve_config};
use log::Log;

pub fn main() -> Result<()> {
    let logger = logger::SeneschalLogger::new(log::LevelFilter::Trace)
        .init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
    let cli: cli::Args = cli::Args::parse();

    if let Some(log_level) = cli.log_level {
        logger.set_level(log_level);
    } else {
        logger.set_level(log::LevelFilter::Info);
    };

    let config = resolve_config(cli.clone()).context("Resolving config");

    // Now that we've loaded the config, we can set the log level and print
    // out any deferred messages emitted while we were loading it.
    if let Ok(config) = &config {
        logger.set_level(config.log_level);
    }
    logger.print_deferred();
    let config = config?;

    let result = match cli.action {
        cli::Action::Daemon => actions::daemon(&config),
        cli::Action::Config { keys } => actions::config(&config, keys),
        cli::Action::StartServer {
            vsock_port,
            accept_cid,
        } => actions::start_server(&config, vsock_port, accept_cid),
        cli::Action::StopServer { handle } => {
            actions::stop_server(&config, handle)
        }
        cli::Action::SharePath {
            handle,
            storage_location,
            owner_id,
            drivefs_mount_name,
            read_only,
            path,
        } => actions::share_path(
            &config,
            handle,
            storage_location,
            owner_id,
            drivefs_mount_name,
            path,
            read_only,
        ),
        cli::Action::UnsharePath { handle, path } => {
            actions::unshare_path(&config, handle, path)
        }
    };

    logger.flush();
    result
}
