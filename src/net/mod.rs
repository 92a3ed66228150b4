use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::options::ConnectOptions;

#[cfg(feature = "tls")]
pub(crate) mod tls;

/// Any transport the driver can speak over: TCP, Unix domain sockets, or
/// an in-memory pair in tests.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<S> Socket for S where S: AsyncRead + AsyncWrite + Unpin + Send {}

/// The connection transport, before or after the TLS upgrade.
pub(crate) enum MaybeTlsStream {
    Raw(Box<dyn Socket>),

    #[cfg(feature = "tls")]
    Tls(Box<tokio_rustls::client::TlsStream<Box<dyn Socket>>>),

    // transient state while the TLS handshake owns the raw stream
    #[cfg(feature = "tls")]
    Upgrading,
}

impl MaybeTlsStream {
    pub(crate) fn is_tls(&self) -> bool {
        #[cfg(feature = "tls")]
        if matches!(self, MaybeTlsStream::Tls(_)) {
            return true;
        }

        false
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_read(cx, buf),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Upgrading => {
                Poll::Ready(Err(io::ErrorKind::ConnectionAborted.into()))
            }
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_write(cx, buf),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Upgrading => {
                Poll::Ready(Err(io::ErrorKind::ConnectionAborted.into()))
            }
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_flush(cx),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Upgrading => {
                Poll::Ready(Err(io::ErrorKind::ConnectionAborted.into()))
            }
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_shutdown(cx),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Upgrading => {
                Poll::Ready(Err(io::ErrorKind::ConnectionAborted.into()))
            }
        }
    }
}

/// Establishes the raw transport described by the options, honoring the
/// connect timeout.
pub(crate) async fn connect_socket(options: &ConnectOptions) -> Result<Box<dyn Socket>> {
    let connect = async {
        #[cfg(unix)]
        if let Some(path) = &options.socket {
            let stream = tokio::net::UnixStream::connect(path).await?;

            return Ok::<Box<dyn Socket>, Error>(Box::new(stream));
        }

        let stream = TcpStream::connect((&*options.host, options.port)).await?;
        stream.set_nodelay(true)?;

        Ok(Box::new(stream) as Box<dyn Socket>)
    };

    match options.connect_timeout {
        Some(timeout) if timeout > Duration::ZERO => {
            tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| Error::ConnectTimedOut)?
        }

        _ => connect.await,
    }
}
