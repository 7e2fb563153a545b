mod jail;
mod mount_planner;
mod path_validator;
mod reaper;
mod server_record;
mod service_struct;
mod share_path;
mod start_server;
mod stop_server;
mod timers;
mod unshare_path;

pub use jail::*;
pub use mount_planner::*;
pub use path_validator::*;
pub use server_record::*;
pub use service_struct::*;
pub use timers::*;

/* waitpid(-1) in one test can reap children another test is waiting on. */
#[cfg(test)]
pub(crate) static CHILD_TEST_MUTEX: std::sync::Mutex<()> =
    std::sync::Mutex::new(());
