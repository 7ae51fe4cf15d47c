//! Structured error types for the resolver.

use crate::dns::wire::ResponseCode;
use std::fmt;
use std::io;

/// Main error type for application-level operations
#[derive(Debug)]
pub enum ResolvError {
    /// IO error (socket creation, config file)
    Io(io::Error),
    /// Configuration error
    Config(String),
    /// DNS encoding, transport or response error
    Dns(DnsError),
}

impl fmt::Display for ResolvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvError::Io(e) => write!(f, "IO error: {}", e),
            ResolvError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ResolvError::Dns(e) => write!(f, "DNS error: {}", e),
        }
    }
}

impl std::error::Error for ResolvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolvError::Io(e) => Some(e),
            ResolvError::Dns(e) => Some(e),
            ResolvError::Config(_) => None,
        }
    }
}

impl From<io::Error> for ResolvError {
    fn from(err: io::Error) -> Self {
        ResolvError::Io(err)
    }
}

impl From<DnsError> for ResolvError {
    fn from(err: DnsError) -> Self {
        ResolvError::Dns(err)
    }
}

/// Resolver error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    /// Name does not fit the encoded-name cap
    EncodingOverflow,
    /// Name contains an empty label (e.g. `a..b`)
    InvalidName,
    /// No datagram association with a server
    TransportUnavailable,
    /// Synchronous query exceeded its wait budget
    Timeout,
    /// Table entry used up its attempt budget
    RetriesExhausted,
    /// Server answered with a non-zero response code
    ServerError(ResponseCode),
    /// Datagram failed a bounds or consistency check
    MalformedResponse(&'static str),
}

impl fmt::Display for DnsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsError::EncodingOverflow => write!(f, "name exceeds maximum encoded length"),
            DnsError::InvalidName => write!(f, "name contains an empty label"),
            DnsError::TransportUnavailable => {
                write!(f, "no DNS server association (resolver not initialized)")
            }
            DnsError::Timeout => write!(f, "DNS query timeout"),
            DnsError::RetriesExhausted => write!(f, "DNS retries exhausted"),
            DnsError::ServerError(rcode) => write!(f, "DNS server returned {:?}", rcode),
            DnsError::MalformedResponse(msg) => write!(f, "malformed DNS response: {}", msg),
        }
    }
}

impl std::error::Error for DnsError {}

/// Convenience type alias for Results using ResolvError
pub type Result<T> = std::result::Result<T, ResolvError>;
