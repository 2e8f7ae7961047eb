//! TURN allocation lifecycle (C4) and client-side relay wrapper (C5).

pub mod allocation;
pub mod client;

pub use allocation::{Allocation, Credentials};
pub use client::Client;

#[derive(Debug)]
pub enum Error {
    Stun(stun::Error),
    Codec(codec::Error),
    /// 437 Allocation-Mismatch.
    Mismatch,
    /// 508 Insufficient-Capacity.
    Capacity,
    /// 401 after credentials were supplied (i.e. a second 401).
    Auth,
    /// Malformed response, missing required attribute, or LIFETIME < 120.
    Protocol,
    /// Any other error response.
    Generic,
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

impl From<stun::Error> for Error {
    fn from(value: stun::Error) -> Self {
        match &value {
            stun::Error::Rejected(code, _) => {
                use codec::message::attributes::ErrorType;
                if *code == ErrorType::AllocationMismatch as u16 {
                    return Self::Mismatch;
                }
                if *code == ErrorType::InsufficientCapacity as u16 {
                    return Self::Capacity;
                }
                if *code == ErrorType::Unauthorized as u16 {
                    return Self::Auth;
                }
                Self::Generic
            }
            stun::Error::Protocol => Self::Protocol,
            _ => Self::Stun(value),
        }
    }
}
