use std::convert::{TryFrom, TryInto};
use std::io::Cursor;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::socks::codec::{get_array, get_u16, get_u8, put_u16};
use crate::socks::handshake::HandshakeSession;
use crate::socks::method::Method;
use crate::socks::{
    Resolve, Result, SocksError, TargetAddr, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6, CMD_CONNECT,
    SOCKS5_VERSION,
};

/// Shortest possible reply: an IPv4 bound address.
const REPLY_HEAD_LEN: usize = 10;

pub(crate) struct Request {
    command: u8,
    target_addr: TargetAddr,
}

impl Request {
    pub fn connect(target_addr: TargetAddr) -> Self {
        Self {
            command: CMD_CONNECT,
            target_addr,
        }
    }
}

impl TryFrom<&Request> for Vec<u8> {
    type Error = SocksError;
    fn try_from(request: &Request) -> Result<Self> {
        use TargetAddr::*;
        let mut buf = Vec::with_capacity(262);

        // +----+-----+-------+------+----------+----------+
        // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        buf.push(SOCKS5_VERSION);
        buf.push(request.command);
        buf.push(0x00);

        match &request.target_addr {
            Ip(SocketAddr::V4(socket)) => {
                buf.push(ATYP_IPV4);
                buf.extend_from_slice(&socket.ip().octets());
                put_u16(&mut buf, socket.port())?;
            }
            Domain(domain, port) => {
                buf.push(ATYP_DOMAIN);
                buf.push(
                    domain
                        .len()
                        .try_into()
                        .map_err(|_| SocksError::DomainTooLong)?,
                );
                buf.extend_from_slice(domain.as_bytes());
                put_u16(&mut buf, *port)?;
            }
            Ip(SocketAddr::V6(socket)) => {
                buf.push(ATYP_IPV6);
                buf.extend_from_slice(&socket.ip().octets());
                put_u16(&mut buf, socket.port())?;
            }
        }

        Ok(buf)
    }
}

impl<'a, S, R> HandshakeSession<'a, S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Resolve + ?Sized,
{
    /// Negotiates a method, authenticates if asked to and issues CONNECT.
    ///
    /// Returns the address the proxy bound for the relayed connection.
    pub(crate) async fn socks5(&mut self) -> Result<TargetAddr> {
        if self.negotiate_method().await? == Method::UsernamePassword {
            self.authenticate().await?;
        }

        let options = self.options;
        let target_addr = if options.proxy_hostname {
            TargetAddr::Domain(options.target_host.clone(), options.target_port)
        } else {
            TargetAddr::Ip(self.resolve_target(false).await?)
        };
        trace!(?target_addr, "connect");

        self.buf = Vec::try_from(&Request::connect(target_addr))?;
        self.send().await?;

        self.recv_connect_reply().await
    }

    // +----+-----+-------+------+----------+----------+
    // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    async fn recv_connect_reply(&mut self) -> Result<TargetAddr> {
        self.reply.clear();
        self.recv_reply(REPLY_HEAD_LEN).await?;

        let version = self.reply[0];
        let code = self.reply[1];
        let atyp = self.reply[3];

        if version != SOCKS5_VERSION {
            return Err(SocksError::UnsupportedVersion(version));
        }

        // A nonzero REP takes precedence over a malformed bound address.
        let malformed = || match code {
            0x00 => SocksError::GeneralFailure,
            code => SocksError::from_socks5_reply(code),
        };
        let total = match atyp {
            ATYP_IPV4 => 4 + 4 + 2,
            ATYP_IPV6 => 4 + 16 + 2,
            // The length byte already arrived with the head.
            ATYP_DOMAIN => match self.reply[4] as usize {
                len if len >= 3 => 4 + 1 + len + 2,
                len => {
                    debug!(code, len, "domain bound address too short");
                    return Err(malformed());
                }
            },
            _ => {
                debug!(code, atyp, "unknown bound address type");
                return Err(malformed());
            }
        };
        if total > REPLY_HEAD_LEN {
            self.recv_reply(total - REPLY_HEAD_LEN).await?;
        }

        let bound = parse_bound_addr(atyp, &self.reply[4..])?;

        if code != 0x00 {
            debug!(code, ?bound, "connect rejected by proxy");
            return Err(SocksError::from_socks5_reply(code));
        }
        Ok(bound)
    }
}

fn parse_bound_addr(atyp: u8, tail: &[u8]) -> Result<TargetAddr> {
    let mut cur = Cursor::new(tail);
    let addr = match atyp {
        ATYP_IPV4 => {
            let ip = get_array::<4>(&mut cur)?;
            TargetAddr::Ip(SocketAddr::from((ip, get_u16(&mut cur)?)))
        }
        ATYP_IPV6 => {
            let ip = get_array::<16>(&mut cur)?;
            TargetAddr::Ip(SocketAddr::from((ip, get_u16(&mut cur)?)))
        }
        ATYP_DOMAIN => {
            let len = get_u8(&mut cur)? as usize;
            let start = cur.position() as usize;
            let domain = String::from_utf8_lossy(&tail[start..start + len]).to_string();
            cur.set_position((start + len) as u64);
            TargetAddr::Domain(domain, get_u16(&mut cur)?)
        }
        _ => return Err(SocksError::GeneralFailure),
    };
    Ok(addr)
}
