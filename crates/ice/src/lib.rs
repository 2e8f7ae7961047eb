//! Candidate gathering (C7), the check-list state machine, and the public
//! ICE Agent (C8), built on [`stun`] and [`turn`].

pub mod agent;
pub mod candidate;
pub mod component;
pub mod local_transport;
pub mod port_reserver;

pub use agent::{Agent, Role};

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Stun(stun::Error),
    Turn(turn::Error),
    Codec(codec::Error),
    Protocol,
    Disconnected,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<stun::Error> for Error {
    fn from(value: stun::Error) -> Self {
        Self::Stun(value)
    }
}

impl From<turn::Error> for Error {
    fn from(value: turn::Error) -> Self {
        Self::Turn(value)
    }
}

impl From<codec::Error> for Error {
    fn from(value: codec::Error) -> Self {
        Self::Codec(value)
    }
}
