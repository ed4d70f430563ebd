use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, TransportError};

/// Where a listener binds or a stream connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    /// Parse `unix:<path>`, `tcp:<host:port>`, or a bare filesystem path.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(input.to_string()));
        }

        if let Some(path) = input.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(input.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        if let Some(addr) = input.strip_prefix("tcp:") {
            // host:port, port must be numeric
            let valid = addr
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(TransportError::InvalidEndpoint(input.to_string()));
            }
            return Ok(Self::Tcp(addr.to_string()));
        }

        Ok(Self::Unix(PathBuf::from(input)))
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Unix(_) => "unix-domain-socket",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_unix_path() {
        let ep = Endpoint::parse("unix:/tmp/fw.sock").unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/tmp/fw.sock")));
        assert_eq!(ep.to_string(), "unix:/tmp/fw.sock");
    }

    #[test]
    fn bare_path_is_unix() {
        let ep = Endpoint::parse("/run/fw/echo.sock").unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/run/fw/echo.sock")));
    }

    #[test]
    fn parses_tcp_address() {
        let ep: Endpoint = "tcp:127.0.0.1:9001".parse().unwrap();
        assert_eq!(ep, Endpoint::Tcp("127.0.0.1:9001".to_string()));
        assert_eq!(ep.transport_name(), "tcp");
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in ["", "unix:", "tcp:", "tcp:localhost", "tcp::80", "tcp:host:port"] {
            assert!(
                matches!(Endpoint::parse(bad), Err(TransportError::InvalidEndpoint(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
