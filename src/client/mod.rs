//! Client side of the driver protocol.
//!
//! Architecture:
//! - `channel`: exact-count byte transport over the driver's pipes
//! - `envelope`: request framing and response decoding for one call
//! - `handle`: connection state, call entry point, close
//! - `procedures`: typed wrappers for every catalog procedure
//! - `process`: spawning, handshake and reaping of driver processes
//! - `shared`: mutex-serialized handle for concurrent callers

pub mod channel;
pub mod envelope;
pub mod handle;
pub mod procedures;
pub mod process;
pub mod shared;

#[cfg(test)]
mod tests;

pub use channel::ChannelEndpoint;
pub use envelope::{ProcedureRequest, ProcedureResponse};
pub use handle::{DriverHandle, HandleState};
pub use process::{spawn_driver, DriverManager, DriverProcess};
pub use shared::SharedDriver;
