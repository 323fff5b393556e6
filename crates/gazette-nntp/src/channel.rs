//! CRLF line framing over a duplex byte stream.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf,
};

use crate::error::NntpError;
use crate::response::trim_crlf;

/// Longest line accepted from the server, terminator included. RFC 3977
/// allows 512 octets; servers are known to exceed that.
pub const MAX_LINE: usize = 2048;

pub trait NntpIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> NntpIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub struct LineChannel {
    reader: BufReader<Box<dyn NntpIo>>,
    timeout: Option<Duration>,
}

impl LineChannel {
    pub fn new(io: Box<dyn NntpIo>, timeout: Option<Duration>) -> Self {
        Self {
            reader: BufReader::new(io),
            timeout,
        }
    }

    /// A channel with no peer: every read, write and flush fails with
    /// `NotConnected`. Stands in while the real stream is being upgraded.
    pub(crate) fn detached(timeout: Option<Duration>) -> Self {
        Self::new(Box::new(Detached), timeout)
    }

    /// Send one line followed by CRLF and flush it to the peer.
    pub async fn write_line(&mut self, line: &[u8]) -> Result<(), NntpError> {
        let mut buf = Vec::with_capacity(line.len() + 2);
        buf.extend_from_slice(line);
        buf.extend_from_slice(b"\r\n");
        self.write_raw(&buf).await?;
        self.flush().await
    }

    /// Queue bytes without adding a terminator or flushing.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), NntpError> {
        let timeout = self.timeout;
        with_timeout(timeout, self.reader.get_mut().write_all(data)).await
    }

    pub async fn flush(&mut self) -> Result<(), NntpError> {
        let timeout = self.timeout;
        with_timeout(timeout, self.reader.get_mut().flush()).await
    }

    /// Read one line, optionally stripping a single CRLF, CR or LF.
    ///
    /// Fails with [`NntpError::Data`] when no terminator shows up within
    /// [`MAX_LINE`] bytes, and with [`NntpError::Eof`] when the stream ends
    /// before any byte arrives.
    pub async fn read_line(&mut self, strip_terminator: bool) -> Result<Vec<u8>, NntpError> {
        let timeout = self.timeout;
        let mut buf = Vec::new();
        let mut limited = (&mut self.reader).take(MAX_LINE as u64 + 1);
        let read = with_timeout(timeout, limited.read_until(b'\n', &mut buf)).await?;

        if buf.len() > MAX_LINE {
            return Err(NntpError::Data("line too long".into()));
        }
        if read == 0 {
            return Err(NntpError::Eof);
        }
        tracing::trace!(line = %String::from_utf8_lossy(trim_crlf(&buf)), "<<");

        if strip_terminator {
            let len = trim_crlf(&buf).len();
            buf.truncate(len);
        }
        Ok(buf)
    }

    /// Give back the underlying stream, e.g. to layer TLS on top of it.
    ///
    /// Fails with [`NntpError::Protocol`] if unread bytes are still buffered.
    pub fn into_inner(self) -> Result<Box<dyn NntpIo>, NntpError> {
        if !self.reader.buffer().is_empty() {
            return Err(NntpError::Protocol(
                "unexpected data received before TLS negotiation".into(),
            ));
        }
        Ok(self.reader.into_inner())
    }

    pub async fn shutdown(&mut self) -> Result<(), NntpError> {
        let timeout = self.timeout;
        with_timeout(timeout, self.reader.get_mut().shutdown()).await
    }
}

struct Detached;

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is not attached")
}

impl AsyncRead for Detached {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(not_connected()))
    }
}

impl AsyncWrite for Detached {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(not_connected()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(not_connected()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub(crate) async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> Result<T, NntpError>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| NntpError::Timeout)?
            .map_err(NntpError::from),
        None => fut.await.map_err(NntpError::from),
    }
}
