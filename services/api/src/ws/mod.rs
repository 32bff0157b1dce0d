//! Media-stream bridging
//!
//! - `link`: adapts the two WebSocket flavours into one text-frame interface.
//! - `upstream`: opens the realtime AI connection.
//! - `session`: the per-call bridge and its state machine.
//! - `supervisor`: accepts calls and runs one bridge per connection.

pub mod link;
pub mod session;
pub mod supervisor;
pub mod upstream;

pub use supervisor::{BridgeSupervisor, media_stream_handler};
