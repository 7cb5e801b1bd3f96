//! Debuggee process transport
//!
//! Owns the child process's standard streams. A background read loop pulls
//! chunks from the child's stdout, runs them through the frame decoder, and
//! forwards each complete payload to the protocol client. When the child
//! exits the payload channel closes, which is how the client observes the
//! disconnect.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};

use crate::common::{Error, Result};

use super::codec::FrameDecoder;

/// Transport over a debuggee's standard input/output streams
#[derive(Debug)]
pub struct Transport {
    child: Child,
    writer: Mutex<BufWriter<ChildStdin>>,
}

impl Transport {
    /// Spawn the debuggee and start the background read loop.
    ///
    /// Fails with `NotFound` before anything is spawned if `path` is not an
    /// existing file. The returned receiver yields one item per complete
    /// frame; a framing or read error is forwarded as the final item.
    pub async fn start(
        path: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Result<String>>)> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let mut cmd = Command::new(path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()); // Let debuggee errors go to stderr
        if let Some(dir) = path.parent() {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::protocol("failed to capture debuggee stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::protocol("failed to capture debuggee stdout"))?;

        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(stdout, payload_tx));

        tracing::info!(debuggee = %path.display(), "debuggee started");

        Ok((
            Self {
                child,
                writer: Mutex::new(BufWriter::new(stdin)),
            },
            payload_rx,
        ))
    }

    /// Write a framed message to the debuggee's stdin and flush immediately.
    ///
    /// The writer mutex serializes concurrent senders so partial frames can
    /// never interleave on the wire.
    pub async fn send(&self, text: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(text.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        // Best effort; the debuggee usually exits on its own when stdin
        // closes.
        let _ = self.child.start_kill();
    }
}

/// Drain the child's stdout until it exits or the stream corrupts.
async fn read_loop(mut stdout: ChildStdout, tx: mpsc::UnboundedSender<Result<String>>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];

    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => match decoder.feed(&buf[..n]) {
                Ok(payloads) => {
                    for payload in payloads {
                        if tx.send(Ok(payload)).is_err() {
                            return; // client went away
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            },
            Err(e) => {
                let _ = tx.send(Err(Error::Io(e)));
                return;
            }
        }
    }

    tracing::info!("debuggee closed its output stream");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec;

    #[tokio::test]
    async fn test_start_missing_path() {
        let err = Transport::start(Path::new("/no/such/debuggee"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frame_roundtrip_through_cat() {
        // cat echoes our frames straight back
        let (transport, mut payloads) = Transport::start(Path::new("/bin/cat")).await.unwrap();

        transport
            .send(&codec::encode_frame("{\"seq\":1}"))
            .await
            .unwrap();

        let payload = payloads.recv().await.unwrap().unwrap();
        assert_eq!(payload, "{\"seq\":1}");
    }
}
