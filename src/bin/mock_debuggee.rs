//! Mock debuggee binary for integration testing
//!
//! Implements the adapter side of the wire protocol over stdio so the
//! client can be tested without a real Unity process. Failure modes are
//! scripted through the launch target name:
//!
//! - `missing`: launch fails with "no target"
//! - `stall`: launch never gets a response
//! - `desync`: launch response carries an unmatched request_seq
//! - `garble`: launch is answered with a corrupt frame header
//! - `noisy`: launch succeeds and emits an unrecognized event
//! - `churn`: launch succeeds and emits thread started/exited events
//! - `quit`: exits without responding
//!
//! Any other name attaches normally and reports one started thread.
//! `setBreakpoints` re-emits a breakpoint stop for every line in the
//! received set, which lets tests observe exactly what the client sent.

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Read, Write};

fn main() {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = stdout.lock();

    let mut state = MockState::default();

    loop {
        // Read Content-Length header
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).unwrap_or(0) == 0 {
            break; // EOF
        }

        if !header_line.starts_with("Content-Length:") {
            continue;
        }

        let content_length: usize = header_line
            .trim_start_matches("Content-Length:")
            .trim()
            .parse()
            .unwrap_or(0);

        // Read empty line
        let mut empty_line = String::new();
        reader.read_line(&mut empty_line).ok();

        // Read JSON body
        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).is_err() {
            break;
        }

        let message: Value = match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => continue,
        };

        for reply in state.process_message(&message) {
            match reply {
                Reply::Message(value) => send_message(&mut writer, &value),
                Reply::Raw(bytes) => {
                    writer.write_all(bytes).ok();
                    writer.flush().ok();
                }
                Reply::Exit => return,
            }
        }
    }
}

fn send_message<W: Write>(writer: &mut W, message: &Value) {
    let body = serde_json::to_string(message).unwrap();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).ok();
    writer.write_all(body.as_bytes()).ok();
    writer.flush().ok();
}

enum Reply {
    Message(Value),
    Raw(&'static [u8]),
    Exit,
}

#[derive(Default)]
struct MockState {
    seq: i64,
}

impl MockState {
    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn response(&mut self, request_seq: i64, command: &str, success: bool, message: Option<&str>) -> Value {
        json!({
            "seq": self.next_seq(),
            "type": "response",
            "request_seq": request_seq,
            "success": success,
            "command": command,
            "message": message,
            "body": null
        })
    }

    fn event(&mut self, name: &str, body: Value) -> Value {
        json!({
            "seq": self.next_seq(),
            "type": "event",
            "event": name,
            "body": body
        })
    }

    fn thread_event(&mut self, thread_id: i64, reason: &str) -> Value {
        self.event("thread", json!({ "threadId": thread_id, "reason": reason }))
    }

    fn process_message(&mut self, message: &Value) -> Vec<Reply> {
        let Some("request") = message.get("type").and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let Some(command) = message.get("command").and_then(|v| v.as_str()) else {
            return Vec::new();
        };
        let Some(request_seq) = message.get("seq").and_then(|v| v.as_i64()) else {
            return Vec::new();
        };
        let arguments = message.get("arguments").cloned().unwrap_or(json!({}));

        match command {
            "initialize" => {
                let response = self.response(request_seq, command, true, None);
                let initialized = self.event("initialized", json!(null));
                vec![Reply::Message(response), Reply::Message(initialized)]
            }
            "launch" => self.launch(request_seq, &arguments),
            "setBreakpoints" => self.set_breakpoints(request_seq, &arguments),
            _ => {
                let reason = format!("Unknown command: {}", command);
                vec![Reply::Message(self.response(
                    request_seq,
                    command,
                    false,
                    Some(&reason),
                ))]
            }
        }
    }

    fn launch(&mut self, request_seq: i64, arguments: &Value) -> Vec<Reply> {
        let name = arguments.get("name").and_then(|v| v.as_str()).unwrap_or("");

        match name {
            "missing" => {
                vec![Reply::Message(self.response(
                    request_seq,
                    "launch",
                    false,
                    Some("no target"),
                ))]
            }
            "stall" => Vec::new(),
            "desync" => {
                vec![Reply::Message(self.response(9999, "launch", true, None))]
            }
            "garble" => {
                vec![Reply::Raw(b"Content-Length: banana\r\n\r\n{}")]
            }
            "noisy" => {
                let response = self.response(request_seq, "launch", true, None);
                let telemetry = self.event("customTelemetry", json!({ "payload": 1 }));
                vec![Reply::Message(response), Reply::Message(telemetry)]
            }
            "churn" => {
                let response = self.response(request_seq, "launch", true, None);
                let first = self.thread_event(1, "started");
                let second = self.thread_event(2, "started");
                let gone = self.thread_event(2, "exited");
                vec![
                    Reply::Message(response),
                    Reply::Message(first),
                    Reply::Message(second),
                    Reply::Message(gone),
                ]
            }
            "quit" => vec![Reply::Exit],
            _ => {
                let response = self.response(request_seq, "launch", true, None);
                let started = self.thread_event(1, "started");
                vec![Reply::Message(response), Reply::Message(started)]
            }
        }
    }

    fn set_breakpoints(&mut self, request_seq: i64, arguments: &Value) -> Vec<Reply> {
        let path = arguments
            .get("source")
            .and_then(|s| s.get("path"))
            .and_then(|p| p.as_str())
            .unwrap_or("unknown")
            .to_string();
        let lines: Vec<u32> = arguments
            .get("lines")
            .and_then(|l| l.as_array())
            .map(|l| {
                l.iter()
                    .filter_map(|v| v.as_u64())
                    .map(|v| v as u32)
                    .collect()
            })
            .unwrap_or_default();

        let mut replies = vec![Reply::Message(self.response(
            request_seq,
            "setBreakpoints",
            true,
            None,
        ))];

        // Echo one breakpoint stop per received line so tests can see the
        // full set the client sent.
        for line in lines {
            let stopped = self.event(
                "stopped",
                json!({
                    "reason": "breakpoint",
                    "source": { "path": path },
                    "line": line
                }),
            );
            replies.push(Reply::Message(stopped));
        }

        replies
    }
}
