//! STUN transaction pool (C2) and one-shot Binding checks (C3).
//!
//! Built on top of `ice-agent-codec`'s wire format; owns no socket itself.
//! Callers supply a `send` closure that hands encoded bytes to whatever
//! transport (UDP socket, TCP stream) actually owns the wire.

pub mod binding;
pub mod transaction;

pub use transaction::{Mode, Timers, TransactionPool};

#[derive(Debug)]
pub enum Error {
    Codec(codec::Error),
    /// Rc retransmissions exhausted (UDP) or Ti expired (TCP).
    Timeout,
    /// The transaction was cancelled by its owner before completion.
    Cancelled,
    /// An error-response other than 487 Role Conflict.
    Rejected(u16, String),
    /// 487 Role Conflict.
    Conflict,
    /// Decoded response was missing a required attribute or malformed.
    Protocol,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<codec::Error> for Error {
    fn from(value: codec::Error) -> Self {
        Self::Codec(value)
    }
}
