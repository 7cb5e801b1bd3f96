//! Protocol message types
//!
//! These types are the wire contract with the debuggee process. Field names
//! and nesting are fixed; changing them breaks the protocol. Unknown fields
//! on incoming messages are tolerated, never rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Base Protocol Messages ===

/// Outgoing request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl RequestMessage {
    pub fn new(seq: i64, command: &str, arguments: Option<Value>) -> Self {
        Self {
            seq,
            message_type: "request".to_string(),
            command: command.to_string(),
            arguments,
        }
    }
}

/// Incoming response message, correlated to a request via `request_seq`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Incoming event message, uncorrelated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

// === Request Arguments ===

/// Initialize request arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeArguments {
    #[serde(rename = "adapterID")]
    pub adapter_id: String,
    #[serde(rename = "linesStartAt1")]
    pub lines_start_at1: bool,
    #[serde(rename = "pathFormat")]
    pub path_format: String,
}

impl Default for InitializeArguments {
    fn default() -> Self {
        Self {
            adapter_id: "unity".to_string(),
            lines_start_at1: true,
            path_format: "path".to_string(),
        }
    }
}

/// Launch request arguments
///
/// The debuggee attaches to a running target by name rather than spawning
/// one, so `request` is always "attach".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchArguments {
    pub name: String,
    #[serde(rename = "type")]
    pub launch_type: String,
    pub request: String,
}

impl LaunchArguments {
    pub fn attach(name: &str) -> Self {
        Self {
            name: name.to_string(),
            launch_type: "unity".to_string(),
            request: "attach".to_string(),
        }
    }
}

/// SetBreakpoints request arguments
///
/// Carries the complete set of active lines for one source file; the
/// debuggee replaces its set for that file, so this is never a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetBreakpointsArguments {
    pub source: Source,
    pub lines: Vec<u32>,
}

/// Source file reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

// === Event Bodies ===

/// Thread lifecycle event body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadEventBody {
    pub reason: String,
    #[serde(rename = "threadId")]
    pub thread_id: i64,
}

/// Stopped event body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoppedEventBody {
    pub reason: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub line: u32,
}

/// Output event body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEventBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub output: String,
}

// === Parsed Events ===

/// Parsed incoming event
#[derive(Debug, Clone)]
pub enum Event {
    Initialized,
    Thread(ThreadEventBody),
    Stopped(StoppedEventBody),
    Output(OutputEventBody),
    Unknown { event: String, body: Option<Value> },
}

impl Event {
    /// Parse an event from an EventMessage
    ///
    /// A recognized name with an undecodable body falls through to
    /// `Unknown` rather than failing the stream.
    pub fn from_message(msg: &EventMessage) -> Self {
        match msg.event.as_str() {
            "initialized" => Event::Initialized,
            "thread" => {
                if let Some(body) = &msg.body {
                    if let Ok(thread) = serde_json::from_value(body.clone()) {
                        return Event::Thread(thread);
                    }
                }
                Event::Unknown {
                    event: msg.event.clone(),
                    body: msg.body.clone(),
                }
            }
            "stopped" => {
                if let Some(body) = &msg.body {
                    if let Ok(stopped) = serde_json::from_value(body.clone()) {
                        return Event::Stopped(stopped);
                    }
                }
                Event::Unknown {
                    event: msg.event.clone(),
                    body: msg.body.clone(),
                }
            }
            "output" => {
                if let Some(body) = &msg.body {
                    if let Ok(output) = serde_json::from_value(body.clone()) {
                        return Event::Output(output);
                    }
                }
                Event::Unknown {
                    event: msg.event.clone(),
                    body: msg.body.clone(),
                }
            }
            _ => Event::Unknown {
                event: msg.event.clone(),
                body: msg.body.clone(),
            },
        }
    }
}

/// Event delivered to the host over the client's event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    ThreadStarted { thread_id: i64 },
    ThreadExited { thread_id: i64 },
    BreakpointHit { path: String, line: u32 },
    /// The debuggee emitted an event name outside the recognized set.
    /// Delivered out of band so it is never misattributed to a pending call.
    Unrecognized { event: String },
}
