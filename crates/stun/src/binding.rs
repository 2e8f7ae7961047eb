use std::net::SocketAddr;

use bytes::BytesMut;
use codec::{
    Attributes,
    message::{
        Message, MessageEncoder,
        attributes::{
            ErrorCode, ErrorType, IceControlled, IceControlling, MappedAddress, Priority,
            UseCandidate, UserName, XorMappedAddress,
        },
        methods::{BINDING_REQUEST, Method, MethodType},
    },
};

use crate::{
    Error,
    transaction::{Mode, Timers, TransactionId, TransactionPool},
};

/// The role a Binding check is sent under, carried via ICE-CONTROLLING or
/// ICE-CONTROLLED with the session tiebreaker.
#[derive(Debug, Clone, Copy)]
pub enum IceRole {
    Controlling(u64),
    Controlled(u64),
}

/// Parameters for one outgoing connectivity check.
pub struct BindingRequest<'a> {
    pub destination: SocketAddr,
    /// `peerUfrag:localUfrag`, short-term USERNAME.
    pub username: &'a str,
    /// Local password, used directly as the MESSAGE-INTEGRITY key.
    pub password: &'a [u8],
    pub priority: u32,
    pub role: IceRole,
    pub use_candidate: bool,
}

/// Issue a single Binding request and report its outcome.
///
/// `id` is caller-supplied so that the caller can cancel the check by
/// calling [`TransactionPool::cancel`] with the same id from elsewhere;
/// cancellation resolves this future with [`Error::Cancelled`] without a
/// second outcome ever being produced.
pub async fn check(
    pool: &TransactionPool,
    timers: &Timers,
    mode: Mode,
    id: TransactionId,
    request: BindingRequest<'_>,
    send: impl Fn(&[u8]) -> std::io::Result<()>,
) -> Result<SocketAddr, Error> {
    let mut buf = BytesMut::with_capacity(128);
    let mut encoder = MessageEncoder::new(BINDING_REQUEST, &id, &mut buf);

    encoder.append::<UserName>(request.username);
    encoder.append::<Priority>(request.priority);

    match request.role {
        IceRole::Controlling(tiebreaker) => encoder.append::<IceControlling>(tiebreaker),
        IceRole::Controlled(tiebreaker) => encoder.append::<IceControlled>(tiebreaker),
    }

    if request.use_candidate {
        encoder.append::<UseCandidate>(());
    }

    encoder.flush(Some(request.password))?;

    let bytes = pool
        .request(id, &buf, request.destination, mode, timers, send)
        .await?;

    let mut attrs = Attributes::default();
    let decoded = Message::decode(&bytes, &mut attrs)?;

    if let Method::Binding(MethodType::Error) = decoded.method() {
        let error = decoded.get::<ErrorCode>().ok_or(Error::Protocol)?;
        return Err(if error.code == ErrorType::RoleConflict as u16 {
            Error::Conflict
        } else {
            Error::Rejected(error.code, error.message.to_string())
        });
    }

    decoded
        .get::<XorMappedAddress>()
        .or_else(|| decoded.get::<MappedAddress>())
        .ok_or(Error::Protocol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::message::methods::{BINDING_ERROR, BINDING_RESPONSE};

    fn success_response(id: TransactionId, mapped: SocketAddr) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);
        let mut encoder = MessageEncoder::new(BINDING_RESPONSE, &id, &mut buf);
        encoder.append::<XorMappedAddress>(mapped);
        encoder.flush(None).unwrap();
        buf
    }

    fn error_response(id: TransactionId, error: ErrorCode<'_>) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);
        let mut encoder = MessageEncoder::new(BINDING_ERROR, &id, &mut buf);
        encoder.append::<ErrorCode>(error);
        encoder.flush(None).unwrap();
        buf
    }

    #[tokio::test]
    async fn check_resolves_the_peer_reflexive_address_from_xor_mapped_address() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        let destination: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        let mapped: SocketAddr = "203.0.113.9:5000".parse().unwrap();
        let response = success_response(id, mapped);

        let result = check(
            &pool,
            &Timers::default(),
            Mode::Udp,
            id,
            BindingRequest {
                destination,
                username: "peer:local",
                password: b"secret",
                priority: 12345,
                role: IceRole::Controlling(1),
                use_candidate: false,
            },
            |_| {
                pool.receive(destination, &response);
                Ok(())
            },
        )
        .await;

        assert_eq!(result.unwrap(), mapped);
    }

    #[tokio::test]
    async fn check_reports_role_conflict_distinctly_from_other_errors() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        let destination: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        let response = error_response(id, ErrorType::RoleConflict.into());

        let result = check(
            &pool,
            &Timers::default(),
            Mode::Udp,
            id,
            BindingRequest {
                destination,
                username: "peer:local",
                password: b"secret",
                priority: 12345,
                role: IceRole::Controlled(1),
                use_candidate: false,
            },
            |_| {
                pool.receive(destination, &response);
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Conflict)));
    }

    #[tokio::test]
    async fn check_surfaces_other_error_codes_as_rejected() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        let destination: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        let response = error_response(id, ErrorType::BadRequest.into());

        let result = check(
            &pool,
            &Timers::default(),
            Mode::Udp,
            id,
            BindingRequest {
                destination,
                username: "peer:local",
                password: b"secret",
                priority: 12345,
                role: IceRole::Controlling(1),
                use_candidate: true,
            },
            |_| {
                pool.receive(destination, &response);
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Rejected(code, _)) if code == ErrorType::BadRequest as u16));
    }
}
