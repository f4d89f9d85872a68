use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocksError>;

#[derive(Error, Debug)]
pub enum SocksError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported socks version: {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported authentication method: {0:#04x}")]
    UnsupportedAuthMethod(u8),
    #[error("unsupported authentication version: {0}")]
    UnsupportedAuthVersion(u8),
    #[error("proxy requires username/password authentication but no username was given")]
    AuthUsernameRequired,
    #[error("authentication failed with status {0}")]
    AuthenticationFailed(u8),

    // SOCKS5 reply related error
    #[error("general socks server failure")]
    GeneralFailure,
    #[error("connection not allowed by ruleset")]
    RulesetDenied,
    #[error("network unreachable")]
    NetworkUnreachable,
    #[error("connection refused")]
    ConnectionRefused,
    #[error("ttl expired")]
    TtlExpired,
    #[error("command not supported")]
    CommandNotSupported,
    #[error("address type not supported")]
    AddressTypeNotSupported,
    #[error("unassigned reply code: {0}")]
    Unassigned(u8),

    // SOCKS4 reply related error
    #[error("request rejected or failed")]
    RequestRejectedOrFailed,
    #[error("proxy cannot connect to target (no identd)")]
    CannotConnectToTarget,
    #[error("request rejected, user id mismatch")]
    RequestRejectedUserIdMismatch,
    #[error("unknown socks4 status: {0:#04x}")]
    UnknownError(u8),

    // Connector
    #[error("no candidate endpoints")]
    NoCandidates,
    #[error("all candidate endpoints were rejected")]
    AllRejected,
    #[error("connect attempt canceled")]
    Canceled,

    #[error("domain address is longer than 255 bytes")]
    DomainTooLong,
    #[error("username is longer than 255 bytes")]
    UsernameTooLong,
    #[error("password is longer than 255 bytes")]
    PasswordTooLong,
    #[error("socks4 user id contains a nul byte")]
    UserIdContainsNul,
    #[error("socks4a target host contains a nul byte")]
    DomainContainsNul,

    #[error("invalid target address")]
    InvalidTargetAddress,

    #[error("invalid proxy url: {0}")]
    InvalidProxyUrl(String),
}

impl SocksError {
    /// Maps a nonzero SOCKS5 reply code to its error.
    pub(crate) fn from_socks5_reply(code: u8) -> Self {
        match code {
            0x01 => SocksError::GeneralFailure,
            0x02 => SocksError::RulesetDenied,
            0x03 => SocksError::NetworkUnreachable,
            0x04 => SocksError::ConnectionRefused,
            0x05 => SocksError::TtlExpired,
            0x07 => SocksError::CommandNotSupported,
            0x08 => SocksError::AddressTypeNotSupported,
            code => SocksError::Unassigned(code),
        }
    }

    /// Maps a non-granted SOCKS4 status byte to its error.
    pub(crate) fn from_socks4_status(status: u8) -> Self {
        match status {
            0x5b => SocksError::RequestRejectedOrFailed,
            0x5c => SocksError::CannotConnectToTarget,
            0x5d => SocksError::RequestRejectedUserIdMismatch,
            status => SocksError::UnknownError(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socks5_reply_table() {
        assert!(matches!(
            SocksError::from_socks5_reply(0x01),
            SocksError::GeneralFailure
        ));
        assert!(matches!(
            SocksError::from_socks5_reply(0x02),
            SocksError::RulesetDenied
        ));
        assert!(matches!(
            SocksError::from_socks5_reply(0x04),
            SocksError::ConnectionRefused
        ));
        assert!(matches!(
            SocksError::from_socks5_reply(0x05),
            SocksError::TtlExpired
        ));
        // 0x06 has no dedicated kind.
        assert!(matches!(
            SocksError::from_socks5_reply(0x06),
            SocksError::Unassigned(0x06)
        ));
        assert!(matches!(
            SocksError::from_socks5_reply(0x08),
            SocksError::AddressTypeNotSupported
        ));
        assert!(matches!(
            SocksError::from_socks5_reply(0x42),
            SocksError::Unassigned(0x42)
        ));
    }

    #[test]
    fn socks4_status_table() {
        assert!(matches!(
            SocksError::from_socks4_status(0x5b),
            SocksError::RequestRejectedOrFailed
        ));
        assert!(matches!(
            SocksError::from_socks4_status(0x5c),
            SocksError::CannotConnectToTarget
        ));
        assert!(matches!(
            SocksError::from_socks4_status(0x5d),
            SocksError::RequestRejectedUserIdMismatch
        ));
        assert!(matches!(
            SocksError::from_socks4_status(0x00),
            SocksError::UnknownError(0x00)
        ));
    }
}
