//! Base-protocol framing for the client connection.
//!
//! Every message on stdin/stdout is `Content-Length: N\r\n\r\n{json}`.
//! [`FrameReader`] pulls client messages off the input stream and
//! [`FrameWriter`] frames server messages onto the output stream.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// Reads framed JSON-RPC messages sent by the client.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next message.
    ///
    /// `Ok(None)` means the client closed the stream between messages.
    /// A stream that ends inside a header block or body is an error, and so
    /// is a body that is not JSON.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(body) = self.read_body().await? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&body).context("parsing JSON-RPC message")?;
        Ok(Some(value))
    }

    /// Read the next message body without interpreting it.
    ///
    /// Errors here are framing errors; after one the stream position is
    /// unknown. A body that turns out not to be JSON leaves the reader at
    /// the start of the next frame.
    pub async fn read_body(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(content_length) = self.read_header_block().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            bail!("Content-Length {content_length} exceeds maximum {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        Ok(Some(body))
    }

    async fn read_header_block(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("reading header line")?;

            if n == 0 {
                if started {
                    bail!("unexpected EOF while reading headers");
                }
                return Ok(None);
            }
            started = true;

            let header = self.line.trim();
            if header.is_empty() {
                break;
            }
            if let Some(len) = parse_content_length(header)? {
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .context("missing Content-Length header")
    }
}

/// Extract the length from a `Content-Length` header; other headers yield `None`.
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
        .with_context(|| format!("invalid Content-Length value: {}", value.trim()))?;
    Ok(Some(len))
}

/// Writes framed JSON-RPC messages to the client.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `msg` and write it with its `Content-Length` header.
    pub async fn write_frame<T: Serialize + ?Sized>(&mut self, msg: &T) -> Result<()> {
        let body = serde_json::to_vec(msg).context("serializing JSON-RPC message")?;
        let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;

        Ok(())
    }
}
