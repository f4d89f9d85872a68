//! SOCKS4/SOCKS5 proxy client for tokio.
//!
//! [`socks::Connector`] races TCP connects across every resolved proxy
//! address (happy eyeballs), and [`socks::handshake`] drives the SOCKS
//! CONNECT exchange over the winning stream. [`socks::SocksStream::connect`]
//! does both.

pub mod socks;
