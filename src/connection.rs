use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_std::future;
use async_std::io::{self, BufReader, Read, Write};
use async_std::net::TcpStream;
#[cfg(unix)]
use async_std::os::unix::net::UnixStream;
use async_std::prelude::*;

use crate::errors::Result;
use crate::protocol::{Codec, Request, Response};

/// Where a server listens. Strings containing `/` are Unix socket paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Tcp(String),
    Unix(PathBuf),
}

impl Address {
    pub fn parse(addr: &str) -> Address {
        if addr.contains('/') {
            Address::Unix(PathBuf::from(addr))
        } else {
            Address::Tcp(addr.to_owned())
        }
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Address {
        Address::parse(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(addr) => f.write_str(addr),
            Address::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl Write for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_close(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_close(cx),
        }
    }
}

/// One open stream to a server. Used by a single request at a time.
#[derive(Debug)]
pub struct Connection {
    address: Address,
    stream: BufReader<Stream>,
}

impl Connection {
    pub async fn connect(address: &Address, timeout: Duration) -> Result<Connection> {
        debug!("Dialing {}", address);
        let stream = match address {
            Address::Tcp(addr) => {
                let stream = future::timeout(timeout, TcpStream::connect(addr.as_str())).await??;
                stream.set_nodelay(true)?;
                Stream::Tcp(stream)
            }
            #[cfg(unix)]
            Address::Unix(path) => {
                Stream::Unix(future::timeout(timeout, UnixStream::connect(path)).await??)
            }
            #[cfg(not(unix))]
            Address::Unix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "unix sockets are not available on this platform",
                )
                .into())
            }
        };
        Ok(Connection {
            address: address.clone(),
            stream: BufReader::new(stream),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Writes an encoded request and decodes exactly one response.
    pub(crate) async fn exchange(
        &mut self,
        codec: &dyn Codec,
        request: &Request<'_>,
        payload: &[u8],
    ) -> Result<Response> {
        let stream = self.stream.get_mut();
        stream.write_all(payload).await?;
        stream.flush().await?;
        codec.decode(request, &mut self.stream).await
    }
}
