mod handle;
mod listen_address;
mod requests;
mod responses;
mod storage_location;

pub use handle::*;
pub use listen_address::*;
pub use requests::*;
pub use responses::*;
pub use storage_location::*;
