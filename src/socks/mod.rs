mod codec;
mod connector;
mod error;
mod handshake;
mod method;
mod options;
mod resolver;
mod socks4;
mod socks5;
mod stream;

pub use self::connector::{
    CancelHandle, Connected, Connector, ConnectorConfig, Dial, TcpDial,
    DEFAULT_HAPPY_EYEBALLS_DELAY,
};
pub use self::error::{Result, SocksError};
pub use self::handshake::handshake;
pub use self::method::Method;
pub use self::options::{ProxyUrl, SocksClientOptions, DEFAULT_PROXY_PORT};
pub use self::resolver::{Resolve, SystemResolver};
pub use self::stream::SocksStream;

use std::fmt;
use std::net::SocketAddr;

pub const SOCKS4_VERSION: u8 = 0x4;
pub const SOCKS5_VERSION: u8 = 0x5;

pub(crate) const CMD_CONNECT: u8 = 0x01;

pub(crate) const ATYP_IPV4: u8 = 0x01;
pub(crate) const ATYP_DOMAIN: u8 = 0x03;
pub(crate) const ATYP_IPV6: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => addr.fmt(f),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}
