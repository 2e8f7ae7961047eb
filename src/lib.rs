//! Root crate: configuration loading and the public [`AgentError`] surface
//! collapsing every internal layer's error type into the taxonomy of
//! `spec.md` §7.

pub mod config;

pub use codec;
pub use ice;
pub use stun;
pub use turn;

/// `spec.md` §7's error taxonomy, surfaced to the application regardless of
/// which internal layer raised the underlying error.
#[derive(Debug)]
pub enum Kind {
    Generic,
    HostNotFound,
    Connect,
    Stream,
    ProxyConnect,
    ProxyNeg,
    ProxyAuth,
    Tls,
    Auth,
    Rejected,
    Protocol,
    Capacity,
    Mismatch,
    Timeout,
    Disconnected,
}

#[derive(Debug)]
pub struct AgentError {
    pub kind: Kind,
}

impl AgentError {
    fn new(kind: Kind) -> Self {
        Self { kind }
    }
}

impl std::error::Error for AgentError {}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.kind)
    }
}

impl From<ice::Error> for AgentError {
    fn from(value: ice::Error) -> Self {
        match value {
            ice::Error::Io(_) => Self::new(Kind::Stream),
            ice::Error::Stun(e) => Self::from(e),
            ice::Error::Turn(e) => Self::from(e),
            ice::Error::Codec(_) => Self::new(Kind::Protocol),
            ice::Error::Protocol => Self::new(Kind::Protocol),
            ice::Error::Disconnected => Self::new(Kind::Disconnected),
        }
    }
}

impl From<stun::Error> for AgentError {
    fn from(value: stun::Error) -> Self {
        let kind = match value {
            stun::Error::Timeout => Kind::Timeout,
            stun::Error::Cancelled => Kind::Generic,
            stun::Error::Rejected(..) => Kind::Rejected,
            stun::Error::Conflict => Kind::Rejected,
            stun::Error::Protocol => Kind::Protocol,
            stun::Error::Codec(_) => Kind::Protocol,
        };

        Self::new(kind)
    }
}

impl From<turn::Error> for AgentError {
    fn from(value: turn::Error) -> Self {
        let kind = match value {
            turn::Error::Mismatch => Kind::Mismatch,
            turn::Error::Capacity => Kind::Capacity,
            turn::Error::Auth => Kind::Auth,
            turn::Error::Protocol => Kind::Protocol,
            turn::Error::Stun(e) => return Self::from(e),
            turn::Error::Codec(_) | turn::Error::Generic => Kind::Generic,
        };

        Self::new(kind)
    }
}
