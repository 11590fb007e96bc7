//! Renderer process supervision and IPC control channel.

mod ipc;
mod process;
mod protocol;

pub use ipc::IpcClient;
pub use process::{ProcessError, ProcessSupervisor};
pub use protocol::{IpcCommand, PropertyValue};
