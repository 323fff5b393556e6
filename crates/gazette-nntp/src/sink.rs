//! Destinations for the lines of a multi-line reply.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::NntpError;
use crate::response::trim_crlf;

/// Receives each unstuffed block line, terminator included, in wire order.
#[async_trait::async_trait]
pub trait BodySink: Send {
    async fn append(&mut self, line: &[u8]) -> Result<(), NntpError>;
}

/// Collects lines in memory without their terminators. Used whenever the
/// caller asks for the lines back instead of passing a sink.
#[derive(Debug, Default)]
pub struct LineBuffer {
    lines: Vec<Vec<u8>>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_lines(self) -> Vec<Vec<u8>> {
        self.lines
    }

    /// Lines decoded lossily as UTF-8.
    pub fn into_strings(self) -> Vec<String> {
        self.lines
            .into_iter()
            .map(|line| String::from_utf8_lossy(&line).into_owned())
            .collect()
    }
}

#[async_trait::async_trait]
impl BodySink for LineBuffer {
    async fn append(&mut self, line: &[u8]) -> Result<(), NntpError> {
        self.lines.push(trim_crlf(line).to_vec());
        Ok(())
    }
}

/// Streams lines unchanged into any async writer, such as a `tokio::fs::File`.
pub struct WriterSink<W> {
    writer: W,
    written: u64,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Bytes handed to the writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush and give the writer back.
    pub async fn finish(mut self) -> Result<W, NntpError> {
        self.writer.flush().await?;
        Ok(self.writer)
    }
}

#[async_trait::async_trait]
impl<W> BodySink for WriterSink<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn append(&mut self, line: &[u8]) -> Result<(), NntpError> {
        self.writer.write_all(line).await?;
        self.written += line.len() as u64;
        Ok(())
    }
}
