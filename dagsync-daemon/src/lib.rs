//! Auto-sync daemon: periodic pulls plus a control socket.

mod autosync;
mod error;
pub mod protocol;
mod runtime;

pub use autosync::AutoSync;
pub use error::DaemonError;
pub use protocol::{
    call, request_pull, request_status, request_stop, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, serve, start_blocking};
