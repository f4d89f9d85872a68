use std::convert::{TryFrom, TryInto};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::socks::handshake::HandshakeSession;
use crate::socks::{Resolve, Result, SocksError, SOCKS5_VERSION};

/// Username/password sub-negotiation version (RFC 1929).
pub const USER_PASS_VERSION: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    NoAuthentication = 0x00,
    UsernamePassword = 0x02,
}

impl TryFrom<u8> for Method {
    type Error = SocksError;
    fn try_from(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(Method::NoAuthentication),
            0x02 => Ok(Method::UsernamePassword),
            code => Err(SocksError::UnsupportedAuthMethod(code)),
        }
    }
}

impl<'a, S, R> HandshakeSession<'a, S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Resolve + ?Sized,
{
    /// Offers the methods we support and returns the one the proxy picked.
    pub(crate) async fn negotiate_method(&mut self) -> Result<Method> {
        // +----+----------+----------+
        // |VER | NMETHODS | METHODS  |
        // +----+----------+----------+
        // | 1  |    1     | 1 to 255 |
        // +----+----------+----------+
        self.buf.clear();
        self.buf.push(SOCKS5_VERSION);
        if self.options.username.is_empty() {
            self.buf.extend_from_slice(&[1, Method::NoAuthentication as u8]);
        } else {
            self.buf.extend_from_slice(&[
                2,
                Method::NoAuthentication as u8,
                Method::UsernamePassword as u8,
            ]);
        }
        self.send().await?;

        // +----+--------+
        // |VER | METHOD |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        let reply: [u8; 2] = self.recv().await?;
        if reply[0] != SOCKS5_VERSION {
            return Err(SocksError::UnsupportedVersion(reply[0]));
        }
        let method = Method::try_from(reply[1])?;
        trace!(?method, "method selected");
        Ok(method)
    }

    /// Runs the username/password sub-negotiation.
    pub(crate) async fn authenticate(&mut self) -> Result<()> {
        let options = self.options;
        let username = options.username.as_bytes();
        let password = options.password.as_bytes();
        if username.is_empty() {
            return Err(SocksError::AuthUsernameRequired);
        }
        let ulen: u8 = username
            .len()
            .try_into()
            .map_err(|_| SocksError::UsernameTooLong)?;
        let plen: u8 = password
            .len()
            .try_into()
            .map_err(|_| SocksError::PasswordTooLong)?;

        // +----+------+----------+------+----------+
        // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
        // +----+------+----------+------+----------+
        // | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
        // +----+------+----------+------+----------+
        self.buf.clear();
        self.buf.push(USER_PASS_VERSION);
        self.buf.push(ulen);
        self.buf.extend_from_slice(username);
        self.buf.push(plen);
        self.buf.extend_from_slice(password);
        self.send().await?;

        // +----+--------+
        // |VER | STATUS |
        // +----+--------+
        // | 1  |   1    |
        // +----+--------+
        let reply: [u8; 2] = self.recv().await?;
        if reply[0] != USER_PASS_VERSION {
            return Err(SocksError::UnsupportedAuthVersion(reply[0]));
        }
        if reply[1] != 0 {
            return Err(SocksError::AuthenticationFailed(reply[1]));
        }
        Ok(())
    }
}
