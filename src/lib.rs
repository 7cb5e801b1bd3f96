//! Unity debug protocol client
//!
//! Drives a debuggee process over its standard input/output streams using
//! Content-Length framed JSON messages. Requests are correlated to
//! responses by sequence number and block their caller for one round trip;
//! out-of-band events (thread lifecycle, breakpoint hits) are delivered on
//! a channel the host drains.

pub mod common;
pub mod protocol;

pub use common::{Error, Result};
pub use protocol::types::DebugEvent;
pub use protocol::{ClientOptions, DebugClient};
