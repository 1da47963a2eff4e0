use crate::dispatch::Dispatcher;
use crate::protocol::OutputLine;
use anyhow::Context;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Producer side of the output channel. Every component that writes a line
/// holds a clone; a single writer task owns the receiver.
#[derive(Clone, Debug)]
pub struct OutputSink {
    tx: UnboundedSender<OutputLine>,
}

impl OutputSink {
    pub fn channel() -> (Self, UnboundedReceiver<OutputLine>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, line: impl Into<OutputLine>) {
        if self.tx.send(line.into()).is_err() {
            debug!("output channel closed; dropping line");
        }
    }
}

pub async fn write_line<W>(writer: &mut W, line: &OutputLine) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(line).context("serialize output line")?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .context("write output line")?;
    writer.flush().await.context("flush output")
}

/// Takes one buffered input line, without its line ending. Lines that are
/// not valid UTF-8 are dropped.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let mut bytes = std::mem::take(buf);
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
    match String::from_utf8(bytes) {
        Ok(line) => Some(line),
        Err(err) => {
            debug!(error = %err, "dropping input line that is not utf-8");
            None
        }
    }
}

/// Reads input lines in order and hands each to the dispatcher while writing
/// output lines as they are produced. Must run inside a `LocalSet`.
///
/// At end of input, work already in flight gets up to `shutdown_grace` to
/// finish before the remaining output is flushed.
pub async fn serve<R, W>(
    dispatcher: Rc<Dispatcher>,
    mut output: UnboundedReceiver<OutputLine>,
    mut reader: R,
    mut writer: W,
    shutdown_grace: Duration,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Bytes of a partially read line survive a cancelled `read_until`.
    let mut buf = Vec::new();
    let mut received = 0usize;

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => {
                let read = read.context("read input line")?;
                let at_eof = read == 0;
                if at_eof && buf.is_empty() {
                    break;
                }
                if let Some(line) = take_line(&mut buf).filter(|line| !line.trim().is_empty()) {
                    received += 1;
                    dispatcher.handle_line(&line);
                }
                if at_eof {
                    break;
                }
            }
            Some(line) = output.recv() => write_line(&mut writer, &line).await?,
        }
    }

    info!(lines = received, in_flight = dispatcher.in_flight(), "input closed");

    let deadline = tokio::time::sleep(shutdown_grace);
    tokio::pin!(deadline);
    while dispatcher.in_flight() > 0 {
        tokio::select! {
            Some(line) = output.recv() => write_line(&mut writer, &line).await?,
            _ = dispatcher.wait_idle() => {}
            _ = &mut deadline => {
                warn!(in_flight = dispatcher.in_flight(), "shutdown grace elapsed; dropping pending work");
                break;
            }
        }
    }

    while let Ok(line) = output.try_recv() {
        write_line(&mut writer, &line).await?;
    }
    writer.flush().await.context("flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRegistry;
    use crate::protocol::OutboundMessage;
    use serde_json::Value;

    fn parse_output(bytes: &[u8]) -> Vec<Value> {
        std::str::from_utf8(bytes)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[tokio::test]
    async fn write_line_appends_newline() {
        let mut out = Vec::new();
        let line = OutputLine::from(OutboundMessage::Effect {
            name: "setSearchText".to_string(),
            text: "x".to_string(),
        });

        write_line(&mut out, &line).await.expect("write");

        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "{\"type\":\"effect\",\"name\":\"setSearchText\",\"text\":\"x\"}\n"
        );
    }

    #[tokio::test]
    async fn serve_processes_lines_in_order_and_drops_garbage() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (sink, rx) = OutputSink::channel();
                let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);
                let input = concat!(
                    "{\"type\":\"command\",\"name\":\"setSearchText\",\"text\":\"a\"}\n",
                    "not json\n",
                    "\n",
                    "{\"type\":\"command\",\"name\":\"setSearchText\",\"text\":\"b\"}\n",
                );
                let mut out = Vec::new();

                serve(dispatcher, rx, input.as_bytes(), &mut out, DEFAULT_SHUTDOWN_GRACE)
                    .await
                    .expect("serve");

                let lines = parse_output(&out);
                let texts: Vec<_> = lines.iter().map(|v| v["text"].clone()).collect();
                assert_eq!(texts, vec![Value::from("a"), Value::from("b")]);
            })
            .await;
    }

    #[tokio::test]
    async fn serve_skips_non_utf8_lines_and_keeps_reading() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (sink, rx) = OutputSink::channel();
                let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);
                let mut input = Vec::new();
                input.extend_from_slice(b"{\"type\":\"command\",\"name\":\"setSearchText\",\"text\":\"a\"}\n");
                input.extend_from_slice(b"\xff\xfe garbage\n");
                input.extend_from_slice(b"{\"type\":\"command\",\"name\":\"setSearchText\",\"text\":\"b\"}\r\n");
                input.extend_from_slice(b"{\"type\":\"command\",\"name\":\"setSearchText\",\"text\":\"c\"}");
                let mut out = Vec::new();

                serve(dispatcher, rx, input.as_slice(), &mut out, DEFAULT_SHUTDOWN_GRACE)
                    .await
                    .expect("serve survives bad bytes");

                let lines = parse_output(&out);
                let texts: Vec<_> = lines.iter().map(|v| v["text"].clone()).collect();
                assert_eq!(texts, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
            })
            .await;
    }

    #[test]
    fn take_line_strips_line_endings_and_clears_the_buffer() {
        let mut buf = b"abc\r\n".to_vec();
        assert_eq!(take_line(&mut buf).as_deref(), Some("abc"));
        assert!(buf.is_empty());

        let mut buf = vec![0xff, b'\n'];
        assert_eq!(take_line(&mut buf), None);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn serve_exits_cleanly_on_empty_input() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (sink, rx) = OutputSink::channel();
                let dispatcher = Dispatcher::new(PluginRegistry::new(), sink);
                let mut out = Vec::new();

                serve(dispatcher, rx, &b""[..], &mut out, DEFAULT_SHUTDOWN_GRACE)
                    .await
                    .expect("serve");

                assert!(out.is_empty());
            })
            .await;
    }
}
