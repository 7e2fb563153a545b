mod clone3;
mod drop_privileges;
mod mkdir;
mod mount;
mod mounts;
mod output;
mod rmdir_recursive;
mod seccomp;
mod supplementary_groups;

pub use clone3::*;
pub use drop_privileges::*;
pub use mkdir::*;
pub use mount::*;
pub use mounts::*;
pub use output::*;
pub use rmdir_recursive::*;
pub use seccomp::*;
pub use supplementary_groups::*;
