//! Message framing for the ECA server connection.
//!
//! The server speaks the same `Content-Length: N\r\n\r\n{json}` framing as
//! `vscode-jsonrpc`. [`MessageReader`] and [`MessageWriter`] move whole JSON
//! bodies across the child's stdio; [`Incoming::classify`] sorts a decoded
//! body into response, server request, or notification.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Largest body accepted from the server. Rewrite chunks are small; anything
/// bigger than this is a protocol fault, not a payload.
const MAX_MESSAGE_BYTES: usize = 8 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// A decoded message, sorted by JSON-RPC role.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests (carries `result` or `error`).
    Response { id: u64, body: Value },
    /// The server asking us something; must be answered.
    Request { id: Value, method: String },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl Incoming {
    /// Classify a raw JSON-RPC body. Returns `None` for shapes that are none
    /// of the three roles (or responses to non-numeric ids, which we never send).
    #[must_use]
    pub fn classify(body: Value) -> Option<Self> {
        let method = body.get("method").and_then(Value::as_str).map(String::from);
        let is_reply = body.get("result").is_some() || body.get("error").is_some();

        match (body.get("id").cloned(), method) {
            (Some(id), None) if is_reply => Some(Self::Response {
                id: id.as_u64()?,
                body,
            }),
            (Some(id), Some(method)) => Some(Self::Request { id, method }),
            (None, Some(method)) => Some(Self::Notification {
                method,
                params: body.get("params").cloned(),
            }),
            _ => None,
        }
    }
}

/// Reads framed JSON bodies from the server's stdout.
pub struct MessageReader<R> {
    inner: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next message body.
    ///
    /// `Ok(None)` means the stream ended cleanly between messages. EOF inside a
    /// header block or body is an error.
    pub async fn next_message(&mut self) -> Result<Option<Value>> {
        let Some(len) = self.read_header_block().await? else {
            return Ok(None);
        };
        if len > MAX_MESSAGE_BYTES {
            bail!("message of {len} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit");
        }

        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .await
            .context("reading message body")?;
        serde_json::from_slice(&body)
            .map(Some)
            .context("decoding message body")
    }

    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut first = true;

        loop {
            self.line.clear();
            let read = self
                .inner
                .read_line(&mut self.line)
                .await
                .context("reading header")?;
            if read == 0 {
                if first {
                    return Ok(None);
                }
                bail!("stream ended inside a header block");
            }
            first = false;

            let header = self.line.trim();
            if header.is_empty() {
                return content_length
                    .map(Some)
                    .context("header block without Content-Length");
            }
            if let Some(len) = parse_content_length(header)? {
                content_length = Some(len);
            }
        }
    }
}

/// `Some(len)` for a `Content-Length` header (any case), `None` for other headers.
fn parse_content_length(header: &str) -> Result<Option<usize>> {
    let Some((name, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    let len = value
        .trim()
        .parse()
        .with_context(|| format!("bad Content-Length `{}`", value.trim()))?;
    Ok(Some(len))
}

/// Writes framed JSON bodies to the server's stdin.
pub struct MessageWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    pub async fn send(&mut self, message: &Value) -> Result<()> {
        let body = serde_json::to_vec(message).context("encoding message")?;
        let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());

        self.inner
            .write_all(header.as_bytes())
            .await
            .context("writing header")?;
        self.inner
            .write_all(&body)
            .await
            .context("writing body")?;
        self.inner.flush().await.context("flushing message")
    }
}
