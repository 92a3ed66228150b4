use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// A buffered duplex byte stream.
///
/// Writes accumulate in `wbuf` until [`flush`][Self::flush]; reads fill
/// `rbuf` from the socket and are handed out as refcounted [`Bytes`]
/// slices, so payload fragments are sliced rather than copied.
pub(crate) struct BufStream<S> {
    pub(crate) stream: S,

    // writes with `write_*` are buffered here and sent on `flush`
    pub(crate) wbuf: Vec<u8>,

    rbuf: BytesMut,
}

impl<S> BufStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            wbuf: Vec::with_capacity(1024),
            rbuf: BytesMut::with_capacity(8192),
        }
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        if !self.wbuf.is_empty() {
            self.stream.write_all(&self.wbuf).await?;
            self.wbuf.clear();
        }

        self.stream.flush().await?;

        Ok(())
    }

    /// Reads exactly `n` bytes, suspending on the socket as needed.
    pub(crate) async fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        while self.rbuf.len() < n {
            self.rbuf.reserve(n - self.rbuf.len());

            let read = self.stream.read_buf(&mut self.rbuf).await?;

            if read == 0 {
                return Err(Error::Closed);
            }
        }

        Ok(self.rbuf.split_to(n).freeze())
    }

    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
