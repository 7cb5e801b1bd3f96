//! Wire protocol codec
//!
//! Messages travel in both directions as HTTP-style headers followed by a
//! JSON body:
//! ```text
//! Content-Length: <byte-length>\r\n
//! \r\n
//! <JSON body>
//! ```
//!
//! The debuggee writes to its stdout in arbitrary chunk sizes, so the
//! decoder accumulates input and extracts complete payloads as they become
//! available: one read may complete several frames or none at all.

use crate::common::{Error, Result};

/// Sanity ceiling on a single message body (10 MB). A larger declared
/// length means the stream is desynchronized.
const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Ceiling on the header block itself. If no header terminator shows up
/// within this many bytes the peer is not speaking the protocol.
const MAX_HEADER_LENGTH: usize = 4 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Incremental decoder for Content-Length framed messages.
///
/// Feed it raw chunks as they arrive; it buffers partial frames internally
/// and emits each payload exactly once, in arrival order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and extract all frames completed by it.
    ///
    /// A payload is only emitted once its full declared length is buffered;
    /// trailing partial data is kept for the next call. Malformed headers
    /// are fatal: the stream cannot be re-synchronized afterward.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        loop {
            let Some(header_end) = find(&self.buf, HEADER_TERMINATOR) else {
                if self.buf.len() > MAX_HEADER_LENGTH {
                    return Err(Error::framing(format!(
                        "no header terminator within {} bytes",
                        MAX_HEADER_LENGTH
                    )));
                }
                break;
            };

            let content_length = parse_content_length(&self.buf[..header_end])?;
            if content_length > MAX_CONTENT_LENGTH {
                return Err(Error::framing(format!(
                    "Content-Length too large: {} bytes",
                    content_length
                )));
            }

            let body_start = header_end + HEADER_TERMINATOR.len();
            if self.buf.len() < body_start + content_length {
                break;
            }

            let body = self.buf[body_start..body_start + content_length].to_vec();
            self.buf.drain(..body_start + content_length);

            let payload = String::from_utf8(body)
                .map_err(|e| Error::framing(format!("payload is not valid UTF-8: {}", e)))?;
            payloads.push(payload);
        }

        Ok(payloads)
    }
}

/// Parse the Content-Length value out of a header block.
///
/// Other headers (like Content-Type) are ignored.
fn parse_content_length(header: &[u8]) -> Result<usize> {
    let header = std::str::from_utf8(header)
        .map_err(|e| Error::framing(format!("header is not valid UTF-8: {}", e)))?;

    for line in header.split("\r\n") {
        if let Some(value) = line.trim().strip_prefix("Content-Length:") {
            let value = value.trim();
            return value.parse().map_err(|_| {
                Error::framing(format!("invalid Content-Length: {}", value))
            });
        }
    }

    Err(Error::framing("missing Content-Length header"))
}

/// Frame a JSON payload for the wire.
///
/// The length is the payload's byte length, not its character count.
pub fn encode_frame(json: &str) -> String {
    format!("Content-Length: {}\r\n\r\n{}", json.len(), json)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
