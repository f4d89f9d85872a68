use std::net::{IpAddr, Ipv4Addr};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::socks::codec::put_u16;
use crate::socks::handshake::HandshakeSession;
use crate::socks::{Resolve, Result, SocksError, CMD_CONNECT, SOCKS4_VERSION};

const REQUEST_GRANTED: u8 = 0x5a;

/// DSTIP of a SOCKS4a request: `0.0.0.x` with x nonzero.
const SOCKS4A_MARKER: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 1);

impl<'a, S, R> HandshakeSession<'a, S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: Resolve + ?Sized,
{
    /// Issues a SOCKS4 CONNECT.
    ///
    /// With `proxy_hostname` set and a target that is not an IPv4 literal,
    /// the host name goes to the proxy as a SOCKS4a request. Otherwise the
    /// target is resolved here and sent as an IPv4 address.
    pub(crate) async fn socks4(&mut self) -> Result<()> {
        let options = self.options;
        if options.username.as_bytes().contains(&0) {
            return Err(SocksError::UserIdContainsNul);
        }

        let remote_host = options.proxy_hostname
            && options.target_host.parse::<Ipv4Addr>().is_err();
        let ip = if remote_host {
            let host = options.target_host.as_bytes();
            if host.contains(&0) {
                return Err(SocksError::DomainContainsNul);
            }
            if host.is_empty() {
                return Err(SocksError::InvalidTargetAddress);
            }
            if host.len() > u8::MAX as usize {
                return Err(SocksError::DomainTooLong);
            }
            trace!(host = %options.target_host, "target left to the proxy");
            SOCKS4A_MARKER
        } else {
            match self.resolve_target(true).await?.ip() {
                IpAddr::V4(ip) => ip,
                IpAddr::V6(_) => return Err(SocksError::InvalidTargetAddress),
            }
        };

        // +----+----+----+----+----+----+----+----+----+----+....+----+....+----+
        // | VN | CD | DSTPORT |      DSTIP        | USERID       |NULL| HOST |NULL|
        // +----+----+----+----+----+----+----+----+----+----+....+----+....+----+
        //    1    1      2              4           variable       1   4a only  1
        self.buf.clear();
        self.buf.push(SOCKS4_VERSION);
        self.buf.push(CMD_CONNECT);
        put_u16(&mut self.buf, options.target_port)?;
        self.buf.extend_from_slice(&ip.octets());
        self.buf.extend_from_slice(options.username.as_bytes());
        self.buf.push(0x00);
        if remote_host {
            self.buf.extend_from_slice(options.target_host.as_bytes());
            self.buf.push(0x00);
        }
        self.send().await?;

        // +----+----+----+----+----+----+----+----+
        // | VN | CD | DSTPORT |      DSTIP        |
        // +----+----+----+----+----+----+----+----+
        //    1    1      2              4
        let reply: [u8; 8] = self.recv().await?;
        match reply[1] {
            REQUEST_GRANTED => Ok(()),
            status => {
                debug!(status, "connect rejected by proxy");
                Err(SocksError::from_socks4_status(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;
    use tokio_test::io::Builder;

    use crate::socks::handshake::tests::StaticResolver;
    use crate::socks::{handshake, ProxyUrl, SocksClientOptions, SocksError};

    const GRANTED: [u8; 8] = [0x00, 0x5a, 0, 0, 0, 0, 0, 0];

    #[test(tokio::test)]
    async fn connect_literal_ipv4() {
        let mut stream = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 0x5d, 0xb8, 0xd8, 0x22, 0x00])
            .read(&GRANTED)
            .build();
        let options = SocksClientOptions::socks4("93.184.216.34", 80);

        let bound = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap();
        assert_eq!(bound, None);
    }

    #[test(tokio::test)]
    async fn connect_with_user_id_and_resolved_host() {
        let resolver = StaticResolver::with("example.com", &["2001:db8::1", "192.0.2.10"]);
        let mut stream = Builder::new()
            .write(&[
                0x04, 0x01, 0x1f, 0x90, 192, 0, 2, 10, b'j', b'o', b'e', 0x00,
            ])
            .read(&GRANTED)
            .build();
        let options = SocksClientOptions::socks4("example.com", 8080).with_credentials("joe", "");

        handshake(&mut stream, &options, &resolver).await.unwrap();
    }

    #[test(tokio::test)]
    async fn socks4a_sends_host_to_proxy() {
        let mut stream = Builder::new()
            .write(&[
                0x04, 0x01, 0x00, 0x50, 0, 0, 0, 1, 0x00, b'i', b'n', b't', b'e', b'r', b'n',
                b'a', b'l', b'.', b'e', b'x', b'a', b'm', b'p', b'l', b'e', 0x00,
            ])
            .read(&GRANTED)
            .build();
        let proxy: ProxyUrl = "socks4a://proxy:1080".parse().unwrap();
        let options = proxy.options("internal.example", 80);

        // Nothing is resolvable locally.
        let bound = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap();
        assert_eq!(bound, None);
    }

    #[test(tokio::test)]
    async fn socks4a_with_user_id() {
        let mut stream = Builder::new()
            .write(&[
                0x04, 0x01, 0x01, 0xbb, 0, 0, 0, 1, b'j', b'o', b'e', 0x00, b'a', b'.', b'b',
                0x00,
            ])
            .read(&GRANTED)
            .build();
        let options = SocksClientOptions::socks4("a.b", 443)
            .with_credentials("joe", "")
            .with_proxy_hostname(true);

        handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap();
    }

    #[test(tokio::test)]
    async fn socks4a_keeps_ipv4_literal() {
        let mut stream = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 10, 0, 0, 7, 0x00])
            .read(&GRANTED)
            .build();
        let options = SocksClientOptions::socks4("10.0.0.7", 80).with_proxy_hostname(true);

        handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap();
    }

    #[test(tokio::test)]
    async fn socks4a_bad_host_rejected_before_sending() {
        let mut stream = Builder::new().build();

        let options = SocksClientOptions::socks4("a".repeat(256), 80).with_proxy_hostname(true);
        let err = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::DomainTooLong));

        let options = SocksClientOptions::socks4("bad\0host", 80).with_proxy_hostname(true);
        let err = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::DomainContainsNul));
    }

    #[test(tokio::test)]
    async fn no_ipv4_for_target() {
        let resolver = StaticResolver::with("v6only.test", &["2001:db8::1"]);
        let mut stream = Builder::new().build();

        let options = SocksClientOptions::socks4("v6only.test", 80);
        let err = handshake(&mut stream, &options, &resolver).await.unwrap_err();
        assert!(matches!(err, SocksError::InvalidTargetAddress));

        let options = SocksClientOptions::socks4("::1", 80);
        let err = handshake(&mut stream, &options, &resolver).await.unwrap_err();
        assert!(matches!(err, SocksError::InvalidTargetAddress));
    }

    #[test(tokio::test)]
    async fn status_codes_map_to_errors() {
        let cases: [(u8, fn(&SocksError) -> bool); 4] = [
            (0x5b, |e| matches!(e, SocksError::RequestRejectedOrFailed)),
            (0x5c, |e| matches!(e, SocksError::CannotConnectToTarget)),
            (0x5d, |e| matches!(e, SocksError::RequestRejectedUserIdMismatch)),
            (0x01, |e| matches!(e, SocksError::UnknownError(0x01))),
        ];

        for (status, check) in cases.iter() {
            let mut reply = GRANTED;
            reply[1] = *status;
            let mut stream = Builder::new()
                .write(&[0x04, 0x01, 0x00, 0x50, 10, 0, 0, 1, 0x00])
                .read(&reply)
                .build();
            let options = SocksClientOptions::socks4("10.0.0.1", 80);

            let err = handshake(&mut stream, &options, &StaticResolver::default())
                .await
                .unwrap_err();
            assert!(check(&err), "status {:#04x} gave {}", status, err);
        }
    }

    #[test(tokio::test)]
    async fn user_id_with_nul_rejected() {
        let mut stream = Builder::new().build();
        let options = SocksClientOptions::socks4("10.0.0.1", 80).with_credentials("a\0b", "");

        let err = handshake(&mut stream, &options, &StaticResolver::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::UserIdContainsNul));
    }
}
