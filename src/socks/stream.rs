use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::socks::{
    handshake, Connector, Dial, ProxyUrl, Resolve, Result, SocksClientOptions, SocksError,
    SystemResolver, TargetAddr,
};

/// A stream relayed to its target through a SOCKS proxy.
#[pin_project]
#[derive(Debug)]
pub struct SocksStream<S> {
    #[pin]
    inner: S,
    bound_addr: Option<TargetAddr>,
    proxy_addr: Option<SocketAddr>,
}

impl<S> SocksStream<S> {
    /// The address the proxy bound for us. Only SOCKS5 reports one.
    pub fn bound_addr(&self) -> Option<&TargetAddr> {
        self.bound_addr.as_ref()
    }

    /// The proxy endpoint that won the connect race, when this crate dialed it.
    pub fn proxy_addr(&self) -> Option<SocketAddr> {
        self.proxy_addr
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> SocksStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Runs the handshake over a stream already connected to the proxy.
    pub async fn handshake_with_socket<R>(
        mut socket: S,
        options: &SocksClientOptions,
        resolver: &R,
    ) -> Result<Self>
    where
        R: Resolve + ?Sized,
    {
        let bound_addr = handshake(&mut socket, options, resolver).await?;
        Ok(Self {
            inner: socket,
            bound_addr,
            proxy_addr: None,
        })
    }

    /// Resolves the proxy, races its endpoints with `connector` and runs the
    /// handshake over the winner.
    pub async fn connect_with<D, R>(
        proxy: &ProxyUrl,
        target_host: &str,
        target_port: u16,
        connector: &Connector<D>,
        resolver: &R,
    ) -> Result<Self>
    where
        D: Dial<Stream = S>,
        R: Resolve + ?Sized,
    {
        let endpoints = resolver.resolve(&proxy.host, proxy.port).await?;
        if endpoints.is_empty() {
            return Err(SocksError::NoCandidates);
        }
        let connected = connector.connect(&endpoints).await?;
        debug!(proxy = %connected.endpoint, "connected to proxy");

        let options = proxy.options(target_host, target_port);
        let mut stream =
            Self::handshake_with_socket(connected.stream, &options, resolver).await?;
        stream.proxy_addr = Some(connected.endpoint);
        Ok(stream)
    }
}

impl SocksStream<TcpStream> {
    /// Connects to `target_host:target_port` through `proxy` over TCP.
    pub async fn connect(proxy: &ProxyUrl, target_host: &str, target_port: u16) -> Result<Self> {
        Self::connect_with(
            proxy,
            target_host,
            target_port,
            &Connector::tcp(),
            &SystemResolver,
        )
        .await
    }
}

impl<S> AsyncRead for SocksStream<S>
where
    S: AsyncRead,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for SocksStream<S>
where
    S: AsyncWrite,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
