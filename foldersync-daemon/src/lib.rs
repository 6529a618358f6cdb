//! Long-running mirror service: interval scheduler, control socket, log
//! sink and rotation around a single [`foldersync_sync::Synchronizer`].

mod error;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, CycleStatus, CycleSummary, RuntimeStats};
