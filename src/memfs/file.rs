//! Open handles on a [`MemFs`](super::MemFs).

use std::io::{self, Cursor, SeekFrom};
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use super::fs::Shared;
use crate::tier::Metadata;

/// Read handle over a snapshot of a file's content.
///
/// Each handle owns its own read offset.
#[derive(Debug)]
pub struct MemFile {
    meta: Metadata,
    cursor: Cursor<Bytes>,
}

impl MemFile {
    pub(crate) fn new(meta: Metadata, content: Bytes) -> Self {
        Self {
            meta,
            cursor: Cursor::new(content),
        }
    }

    /// Metadata captured when the handle was opened
    pub fn metadata(&self) -> &Metadata {
        &self.meta
    }

    /// Current read offset
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }
}

impl AsyncRead for MemFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.cursor).poll_read(cx, buf)
    }
}

impl AsyncSeek for MemFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.cursor).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.cursor).poll_complete(cx)
    }
}

impl AsyncWrite for MemFile {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "memfs handle opened read-only",
        )))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Write handle. Bytes are buffered and replace the file's content when the
/// handle is shut down; dropping it without `shutdown()` discards them.
pub struct MemWriter {
    shared: Arc<Shared>,
    path: String,
    buf: Vec<u8>,
    closed: bool,
}

impl MemWriter {
    pub(crate) fn new(shared: Arc<Shared>, path: String, initial: Vec<u8>) -> Self {
        Self {
            shared,
            path,
            buf: initial,
            closed: false,
        }
    }
}

impl std::fmt::Debug for MemWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemWriter")
            .field("path", &self.path)
            .field("buffered", &self.buf.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl AsyncWrite for MemWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memfs write handle already closed",
            )));
        }
        self.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        self.closed = true;
        let content = Bytes::from(mem::take(&mut self.buf));
        match self.shared.publish(&self.path, content) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(io::Error::other(e))),
        }
    }
}

impl AsyncRead for MemWriter {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "memfs handle opened write-only",
        )))
    }
}

impl AsyncSeek for MemWriter {
    fn start_seek(self: Pin<&mut Self>, _position: SeekFrom) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "memfs write handles are append-only",
        ))
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.buf.len() as u64))
    }
}
