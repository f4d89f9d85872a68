use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::trace;

#[async_trait]
/// Turns a host name and port into an ordered list of endpoints.
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Resolves through the operating system's resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let endpoints: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
        trace!(host, port, count = endpoints.len(), "resolved");
        Ok(endpoints)
    }
}
