use std::fmt;
use std::str::FromStr;

use crate::socks::{Result, SocksError, SOCKS4_VERSION, SOCKS5_VERSION};

pub const DEFAULT_PROXY_PORT: u16 = 1080;

/// What the handshake asks the proxy to connect to, and how.
#[derive(Clone, PartialEq, Eq)]
pub struct SocksClientOptions {
    /// 4 or 5. Anything else fails the handshake.
    pub version: u8,
    pub target_host: String,
    pub target_port: u16,
    /// Empty means no credentials. SOCKS4 sends it as the user id.
    pub username: String,
    pub password: String,
    /// Let the proxy resolve `target_host` instead of resolving it locally.
    pub proxy_hostname: bool,
}

impl SocksClientOptions {
    pub fn socks4<H: Into<String>>(target_host: H, target_port: u16) -> Self {
        Self::new(SOCKS4_VERSION, target_host.into(), target_port)
    }

    pub fn socks5<H: Into<String>>(target_host: H, target_port: u16) -> Self {
        Self::new(SOCKS5_VERSION, target_host.into(), target_port)
    }

    fn new(version: u8, target_host: String, target_port: u16) -> Self {
        Self {
            version,
            target_host,
            target_port,
            username: String::new(),
            password: String::new(),
            proxy_hostname: false,
        }
    }

    pub fn with_credentials<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_proxy_hostname(mut self, proxy_hostname: bool) -> Self {
        self.proxy_hostname = proxy_hostname;
        self
    }
}

// Keeps the password out of logs.
impl fmt::Debug for SocksClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocksClientOptions")
            .field("version", &self.version)
            .field("target_host", &self.target_host)
            .field("target_port", &self.target_port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("proxy_hostname", &self.proxy_hostname)
            .finish()
    }
}

/// A proxy address of the form `scheme://[user[:password]@]host[:port]`.
///
/// Accepted schemes are `socks4`, `socks4a`, `socks5` and `socks5h`; the
/// `a`/`h` variants let the proxy resolve target names. IPv6 hosts are
/// written in brackets. The port defaults to 1080.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyUrl {
    pub version: u8,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub proxy_hostname: bool,
}

impl ProxyUrl {
    /// Handshake options for reaching `target_host:target_port` through this proxy.
    pub fn options<H: Into<String>>(
        &self,
        target_host: H,
        target_port: u16,
    ) -> SocksClientOptions {
        SocksClientOptions {
            version: self.version,
            target_host: target_host.into(),
            target_port,
            username: self.username.clone(),
            password: self.password.clone(),
            proxy_hostname: self.proxy_hostname,
        }
    }
}

impl fmt::Debug for ProxyUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyUrl")
            .field("version", &self.version)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("proxy_hostname", &self.proxy_hostname)
            .finish()
    }
}

impl FromStr for ProxyUrl {
    type Err = SocksError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| SocksError::InvalidProxyUrl(format!("{}: {}", reason, s));

        let (scheme, rest) = s.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let (version, proxy_hostname) = match scheme.to_ascii_lowercase().as_str() {
            "socks4" => (SOCKS4_VERSION, false),
            "socks4a" => (SOCKS4_VERSION, true),
            "socks5" => (SOCKS5_VERSION, false),
            "socks5h" => (SOCKS5_VERSION, true),
            _ => return Err(invalid("unsupported scheme")),
        };

        // Anything after the authority is ignored.
        let authority = rest
            .split(|c: char| c == '/' || c == '?' || c == '#')
            .next()
            .unwrap_or("");

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            Some(userinfo) => {
                let (user, pass) = userinfo.split_once(':').unwrap_or((userinfo, ""));
                (
                    percent_decode(user).ok_or_else(|| invalid("bad percent escape"))?,
                    percent_decode(pass).ok_or_else(|| invalid("bad percent escape"))?,
                )
            }
            None => (String::new(), String::new()),
        };

        let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated ipv6 host"))?;
            let port = match tail {
                "" => None,
                tail => Some(
                    tail.strip_prefix(':')
                        .ok_or_else(|| invalid("garbage after ipv6 host"))?,
                ),
            };
            (host, port)
        } else {
            match hostport.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (hostport, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let port = match port {
            Some(port) => port.parse().map_err(|_| invalid("bad port"))?,
            None => DEFAULT_PROXY_PORT,
        };

        Ok(ProxyUrl {
            version,
            host: host.to_string(),
            port,
            username,
            password,
            proxy_hostname,
        })
    }
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
