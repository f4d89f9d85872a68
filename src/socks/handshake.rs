use std::net::{IpAddr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::socks::{
    Resolve, Result, SocksClientOptions, SocksError, TargetAddr, SOCKS4_VERSION, SOCKS5_VERSION,
};

/// Runs a SOCKS handshake over an already connected stream.
///
/// On success the stream is ready to carry traffic for the target. SOCKS5
/// additionally reports the address the proxy bound for the connection;
/// SOCKS4 returns `None`. `resolver` is only used when the target host has
/// to be resolved locally.
pub async fn handshake<S, R>(
    stream: &mut S,
    options: &SocksClientOptions,
    resolver: &R,
) -> Result<Option<TargetAddr>>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Resolve + ?Sized,
{
    let mut session = HandshakeSession::new(stream, options, resolver);
    let result = match options.version {
        SOCKS5_VERSION => session.socks5().await.map(Some),
        SOCKS4_VERSION => session.socks4().await.map(|_| None),
        version => Err(SocksError::UnsupportedVersion(version)),
    };
    match &result {
        Ok(bound) => debug!(
            version = options.version,
            target = %options.target_host,
            port = options.target_port,
            ?bound,
            "handshake done"
        ),
        Err(e) => debug!(version = options.version, error = %e, "handshake failed"),
    }
    result
}

/// One handshake in progress: the stream, what to ask for, and scratch space.
pub(crate) struct HandshakeSession<'a, S, R: ?Sized> {
    stream: &'a mut S,
    pub(crate) options: &'a SocksClientOptions,
    resolver: &'a R,
    /// Outgoing frame, sent whole by `send`.
    pub(crate) buf: Vec<u8>,
    /// Incoming bytes for variable-length replies.
    pub(crate) reply: Vec<u8>,
}

impl<'a, S, R> HandshakeSession<'a, S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Resolve + ?Sized,
{
    pub(crate) fn new(stream: &'a mut S, options: &'a SocksClientOptions, resolver: &'a R) -> Self {
        Self {
            stream,
            options,
            resolver,
            buf: Vec::with_capacity(262),
            reply: Vec::with_capacity(262),
        }
    }

    pub(crate) async fn send(&mut self) -> Result<()> {
        trace!(len = self.buf.len(), "send");
        self.stream.write_all(&self.buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub(crate) async fn recv<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0; N];
        self.stream.read_exact(&mut out).await?;
        trace!(len = N, "recv");
        Ok(out)
    }

    /// Appends exactly `len` bytes to `self.reply`.
    pub(crate) async fn recv_reply(&mut self, len: usize) -> Result<()> {
        let start = self.reply.len();
        self.reply.resize(start + len, 0);
        self.stream.read_exact(&mut self.reply[start..]).await?;
        trace!(len, "recv");
        Ok(())
    }

    /// Parses the target host as an address literal, or resolves it.
    pub(crate) async fn resolve_target(&self, want_v4: bool) -> Result<SocketAddr> {
        let options = self.options;
        let port = options.target_port;

        if let Ok(ip) = options.target_host.parse::<IpAddr>() {
            if want_v4 && !ip.is_ipv4() {
                return Err(SocksError::InvalidTargetAddress);
            }
            return Ok(SocketAddr::new(ip, port));
        }

        let endpoints = self.resolver.resolve(&options.target_host, port).await?;
        trace!(host = %options.target_host, count = endpoints.len(), "target resolved");
        endpoints
            .into_iter()
            .find(|endpoint| !want_v4 || endpoint.is_ipv4())
            .ok_or(SocksError::InvalidTargetAddress)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::io;

    use async_trait::async_trait;
    use test_log::test;
    use tokio_test::io::Builder;

    /// Resolves from a fixed table and never touches the network.
    #[derive(Default)]
    pub(crate) struct StaticResolver(pub HashMap<String, Vec<IpAddr>>);

    impl StaticResolver {
        pub(crate) fn with(host: &str, ips: &[&str]) -> Self {
            let mut table = HashMap::new();
            table.insert(
                host.to_string(),
                ips.iter().map(|ip| ip.parse().unwrap()).collect(),
            );
            StaticResolver(table)
        }
    }

    #[async_trait]
    impl Resolve for StaticResolver {
        async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
            self.0
                .get(host)
                .map(|ips| ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect())
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, host.to_string()))
        }
    }

    #[test(tokio::test)]
    async fn unsupported_version_sends_nothing() {
        let mut stream = Builder::new().build();
        let mut options = SocksClientOptions::socks5("example.com", 80);
        options.version = 6;

        let err = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::UnsupportedVersion(6)));
    }

    #[test(tokio::test)]
    async fn resolution_error_passes_through() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .build();
        let options = SocksClientOptions::socks5("unknown.invalid", 80);

        let err = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap_err();
        match err {
            SocksError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test(tokio::test)]
    async fn io_error_aborts() {
        let mut stream = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let options = SocksClientOptions::socks5("93.184.216.34", 80);

        let err = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap_err();
        match err {
            SocksError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected error: {}", other),
        }
    }
}
