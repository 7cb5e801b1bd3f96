//! Protocol client for driving a debuggee
//!
//! Correlates request/response traffic by sequence number and routes
//! out-of-band events to the host. Each public call blocks its caller for
//! one full round trip; frame classification runs on a single background
//! dispatch task, so response completions and event deliveries are strictly
//! ordered by arrival.
//!
//! Every pending call owns its own completion channel carrying
//! `Result<body>`, so a failure is only ever delivered to the call that
//! caused it. Session-fatal conditions (framing corruption, an unmatched
//! `request_seq`, debuggee exit) resolve every pending call and close the
//! table, making later calls fail fast instead of blocking forever.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};

use crate::common::{Error, Result};

use super::codec;
use super::transport::Transport;
use super::types::*;

/// Options controlling client behavior
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Bound on the wait for any single response
    pub request_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

type CallResult = Result<Option<Value>>;

/// Outstanding calls keyed by request sequence number.
///
/// `open` flips to false when the session dies; inserts are refused after
/// that so late callers fail fast instead of parking on a dead stream.
struct PendingCalls {
    calls: HashMap<i64, oneshot::Sender<CallResult>>,
    open: bool,
}

impl PendingCalls {
    fn new() -> Self {
        Self {
            calls: HashMap::new(),
            open: true,
        }
    }
}

/// Client for one debuggee session
///
/// All request methods take `&self` and may be called from any thread;
/// writes are serialized by the transport and each call correlates through
/// its own completion channel.
pub struct DebugClient {
    runtime: Runtime,
    transport: Transport,
    /// Sequence counter, scoped to this client instance
    seq: AtomicI64,
    pending: Arc<Mutex<PendingCalls>>,
    /// Full set of active breakpoint lines per source file
    breakpoints: Mutex<HashMap<PathBuf, BTreeSet<u32>>>,
    /// Receiver for host-facing events (given out once)
    events_rx: Option<mpsc::UnboundedReceiver<DebugEvent>>,
    request_timeout: Duration,
}

impl std::fmt::Debug for DebugClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugClient")
            .field("transport", &self.transport)
            .field("seq", &self.seq)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl DebugClient {
    /// Start the debuggee at `path` and perform the initialize handshake.
    ///
    /// Blocks until the initialize response arrives. Does not wait for the
    /// `initialized` event; the debuggee emits it on its own schedule.
    pub fn initialize(path: impl AsRef<Path>) -> Result<Self> {
        Self::initialize_with(path, ClientOptions::default())
    }

    /// Like [`initialize`](Self::initialize), with explicit options.
    pub fn initialize_with(path: impl AsRef<Path>, options: ClientOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("unity-debug")
            .enable_all()
            .build()?;

        let (transport, payloads) = runtime.block_on(Transport::start(path.as_ref()))?;

        let pending = Arc::new(Mutex::new(PendingCalls::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        runtime.spawn(dispatch_loop(payloads, Arc::clone(&pending), events_tx));

        let client = Self {
            runtime,
            transport,
            seq: AtomicI64::new(1),
            pending,
            breakpoints: Mutex::new(HashMap::new()),
            events_rx: Some(events_rx),
            request_timeout: options.request_timeout,
        };

        let args = serde_json::to_value(InitializeArguments::default())?;
        client.request("initialize", Some(args))?;

        Ok(client)
    }

    /// Attach to a running target by name.
    pub fn attach(&self, target_name: &str) -> Result<()> {
        let args = serde_json::to_value(LaunchArguments::attach(target_name))?;
        self.request("launch", Some(args))?;
        Ok(())
    }

    /// Add a breakpoint and push the file's full line set to the debuggee.
    ///
    /// Adding a line that is already set is a no-op: no request goes out.
    /// Otherwise the complete accumulated set for `path` is re-sent, never
    /// a delta.
    pub fn add_breakpoint(&self, path: impl AsRef<Path>, line: u32) -> Result<()> {
        let path = path.as_ref();

        let lines: Vec<u32> = {
            let mut breakpoints = self.breakpoints.lock().unwrap();
            let lines = breakpoints.entry(path.to_path_buf()).or_default();
            if !lines.insert(line) {
                return Ok(());
            }
            lines.iter().copied().collect()
        };

        let args = serde_json::to_value(SetBreakpointsArguments {
            source: Source {
                path: Some(path.to_string_lossy().into_owned()),
            },
            lines,
        })?;
        self.request("setBreakpoints", Some(args))?;
        Ok(())
    }

    /// The active breakpoint lines currently registered for `path`, in order.
    pub fn breakpoint_lines(&self, path: impl AsRef<Path>) -> Vec<u32> {
        self.breakpoints
            .lock()
            .unwrap()
            .get(path.as_ref())
            .map(|lines| lines.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<DebugEvent>> {
        self.events_rx.take()
    }

    /// Send a request and block until its response arrives.
    ///
    /// Registers a completion channel under a fresh `seq` before the frame
    /// goes out, so the response can never race past its waiter. The wait
    /// is bounded by the configured timeout; expiry removes the pending
    /// entry and yields `Timeout`.
    fn request(&self, command: &str, arguments: Option<Value>) -> CallResult {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().unwrap();
            if !pending.open {
                return Err(Error::Disconnected);
            }
            pending.calls.insert(seq, tx);
        }

        let request = RequestMessage::new(seq, command, arguments);
        let json = serde_json::to_string(&request)?;
        tracing::debug!(command, seq, ">>> {}", json);
        let frame = codec::encode_frame(&json);

        let outcome = self.runtime.block_on(async {
            self.transport.send(&frame).await?;

            match tokio::time::timeout(self.request_timeout, rx).await {
                Ok(Ok(result)) => result,
                // Dispatch dropped the sender without completing it; the
                // session is gone.
                Ok(Err(_)) => Err(Error::Disconnected),
                Err(_) => Err(Error::Timeout(self.request_timeout.as_secs())),
            }
        });

        if let Err(e) = &outcome {
            // Send failures and timeouts leave our entry in the table;
            // completed calls were already removed by dispatch.
            self.pending.lock().unwrap().calls.remove(&seq);
            tracing::debug!(command, seq, error = %e, "request failed");
        }

        outcome
    }
}

/// Classify every payload in arrival order until the transport goes away.
async fn dispatch_loop(
    mut payloads: mpsc::UnboundedReceiver<Result<String>>,
    pending: Arc<Mutex<PendingCalls>>,
    events: mpsc::UnboundedSender<DebugEvent>,
) {
    while let Some(item) = payloads.recv().await {
        let payload = match item {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "transport failed; terminating session");
                match e {
                    Error::Framing(msg) => fail_all(&pending, || Error::Framing(msg.clone())),
                    _ => fail_all(&pending, || Error::Disconnected),
                }
                return;
            }
        };

        if let Err(e) = classify(&payload, &pending, &events) {
            tracing::error!(error = %e, "protocol failure; terminating session");
            let msg = match &e {
                Error::Protocol(msg) => msg.clone(),
                other => other.to_string(),
            };
            fail_all(&pending, || Error::Protocol(msg.clone()));
            return;
        }
    }

    // Debuggee exited; whatever is still pending will never complete.
    fail_all(&pending, || Error::Disconnected);
}

/// Resolve every outstanding call with an error and close the table.
fn fail_all(pending: &Mutex<PendingCalls>, mut error: impl FnMut() -> Error) {
    let mut pending = pending.lock().unwrap();
    pending.open = false;
    for (_, tx) in pending.calls.drain() {
        let _ = tx.send(Err(error()));
    }
}

/// Route one payload: a response completes its pending call, an event goes
/// out on the event channel.
fn classify(
    payload: &str,
    pending: &Mutex<PendingCalls>,
    events: &mpsc::UnboundedSender<DebugEvent>,
) -> Result<()> {
    tracing::debug!("<<< {}", payload);

    let msg: Value = serde_json::from_str(payload)
        .map_err(|e| Error::protocol(format!("invalid JSON payload: {}", e)))?;

    let msg_type = msg
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    match msg_type {
        "event" => {
            let event_msg: EventMessage = serde_json::from_value(msg)
                .map_err(|e| Error::protocol(format!("undecodable event: {}", e)))?;
            dispatch_event(&event_msg, events);
            Ok(())
        }
        "response" => {
            let response: ResponseMessage = serde_json::from_value(msg)
                .map_err(|e| Error::protocol(format!("undecodable response: {}", e)))?;
            complete_call(response, pending)
        }
        _ => {
            tracing::warn!("ignoring message of unknown type: {}", msg_type);
            Ok(())
        }
    }
}

fn dispatch_event(msg: &EventMessage, events: &mpsc::UnboundedSender<DebugEvent>) {
    match Event::from_message(msg) {
        Event::Initialized => {
            tracing::debug!("debuggee reports initialized");
        }
        Event::Output(body) => {
            tracing::debug!(category = ?body.category, "debuggee output: {}", body.output.trim_end());
        }
        Event::Thread(body) => match body.reason.as_str() {
            "started" => {
                let _ = events.send(DebugEvent::ThreadStarted {
                    thread_id: body.thread_id,
                });
            }
            "exited" => {
                let _ = events.send(DebugEvent::ThreadExited {
                    thread_id: body.thread_id,
                });
            }
            other => {
                tracing::warn!(reason = other, thread_id = body.thread_id, "thread event with unknown reason");
            }
        },
        Event::Stopped(body) => {
            if body.reason == "breakpoint" {
                let _ = events.send(DebugEvent::BreakpointHit {
                    path: body.source.path.unwrap_or_default(),
                    line: body.line,
                });
            } else {
                tracing::warn!(reason = %body.reason, "stop with unhandled reason");
            }
        }
        Event::Unknown { event, .. } => {
            tracing::warn!(event = %event, "debuggee emitted unrecognized event");
            let _ = events.send(DebugEvent::Unrecognized { event });
        }
    }
}

/// Complete the pending call matching a response.
///
/// A `request_seq` with no pending entry means the stream is desynchronized
/// (or the caller already timed out and gave up); either way correlation
/// can no longer be trusted, so it is session-fatal.
fn complete_call(response: ResponseMessage, pending: &Mutex<PendingCalls>) -> Result<()> {
    let sender = pending
        .lock()
        .unwrap()
        .calls
        .remove(&response.request_seq);

    let Some(sender) = sender else {
        return Err(Error::protocol(format!(
            "response for unknown request_seq {}",
            response.request_seq
        )));
    };

    let result = if response.success {
        Ok(response.body)
    } else {
        Err(Error::BadRequest(
            response
                .message
                .unwrap_or_else(|| "unknown error".to_string()),
        ))
    };

    // The waiter may have timed out and dropped its receiver already.
    let _ = sender.send(result);
    Ok(())
}
