//! Wire protocol implementation
//!
//! This module implements the client side of the debug protocol spoken
//! over the debuggee's standard streams.

pub mod client;
pub mod codec;
pub mod transport;
pub mod types;

pub use client::{ClientOptions, DebugClient};
pub use types::*;
