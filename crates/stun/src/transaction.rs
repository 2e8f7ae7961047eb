use std::{net::SocketAddr, time::Duration};

use ahash::HashMap;
use codec::message::{
    Message,
    attributes::{ErrorCode, ErrorType, Nonce, Realm},
};
use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::oneshot;

use crate::Error;

pub type TransactionId = [u8; 12];

/// Whether a transaction runs the UDP retransmission schedule or the
/// single-shot TCP timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Udp,
    Tcp,
}

/// RTO/Rc/Rm/Ti timer parameters, defaulting to the RFC 5389 values.
#[derive(Debug, Clone, Copy)]
pub struct Timers {
    pub rto: Duration,
    pub rc: u32,
    pub rm: u32,
    pub ti: Duration,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            rto: Duration::from_millis(500),
            rc: 7,
            rm: 16,
            ti: Duration::from_millis(39_500),
        }
    }
}

struct Entry {
    destination: SocketAddr,
    sender: oneshot::Sender<Vec<u8>>,
}

/// Owns in-flight transactions keyed by 96-bit transaction id and
/// multiplexes incoming responses back to their originating transaction.
///
/// Holds no socket; the caller of [`TransactionPool::request`] supplies a
/// `send` closure, and feeds incoming bytes back in through
/// [`TransactionPool::receive`]. This keeps the pool reusable across a
/// plain STUN Binding transport and a TURN-encapsulated one.
pub struct TransactionPool {
    table: Mutex<HashMap<TransactionId, Entry>>,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self {
            table: Mutex::new(HashMap::with_capacity_and_hasher(32, Default::default())),
        }
    }
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh, random 96-bit transaction id.
    pub fn random_id() -> TransactionId {
        let mut id = [0u8; 12];
        rand::rng().fill_bytes(&mut id);
        id
    }

    /// Feed a raw, already-classified STUN message to the pool.
    ///
    /// Returns `true` if a live transaction matched `(id, source)` and was
    /// handed the bytes; `false` otherwise, which tells the caller (the
    /// Local Transport) to try decoding it as a TURN-encapsulated peer
    /// datagram instead.
    pub fn receive(&self, source: SocketAddr, bytes: &[u8]) -> bool {
        if bytes.len() < 20 {
            return false;
        }

        let mut id = [0u8; 12];
        id.copy_from_slice(&bytes[8..20]);

        let entry = {
            let mut table = self.table.lock();
            if table.get(&id).is_some_and(|e| e.destination == source) {
                table.remove(&id)
            } else {
                None
            }
        };

        match entry {
            Some(entry) => {
                let _ = entry.sender.send(bytes.to_vec());
                true
            }
            None => false,
        }
    }

    /// Detach a transaction without delivering an outcome to it; used for
    /// cancellation and for session-wide `stop`.
    pub fn cancel(&self, id: &TransactionId) {
        self.table.lock().remove(id);
    }

    /// Run one transaction to completion: register it, send the initial
    /// message, retransmit per `mode`'s schedule, and resolve with the raw
    /// bytes of the matching response or [`Error::Timeout`].
    ///
    /// `send` is invoked once per attempt (including retransmissions); the
    /// caller is responsible for encoding `message` once up front, since the
    /// id and message are fixed for the lifetime of one transaction.
    pub async fn request(
        &self,
        id: TransactionId,
        message: &[u8],
        destination: SocketAddr,
        mode: Mode,
        timers: &Timers,
        send: impl Fn(&[u8]) -> std::io::Result<()>,
    ) -> Result<Vec<u8>, Error> {
        let (tx, mut rx) = oneshot::channel();
        self.table.lock().insert(id, Entry { destination, sender: tx });

        let result = match mode {
            Mode::Udp => self.run_udp(message, timers, send, &mut rx).await,
            Mode::Tcp => self.run_tcp(message, timers, send, &mut rx).await,
        };

        self.table.lock().remove(&id);
        result
    }

    async fn run_udp(
        &self,
        message: &[u8],
        timers: &Timers,
        send: impl Fn(&[u8]) -> std::io::Result<()>,
        rx: &mut oneshot::Receiver<Vec<u8>>,
    ) -> Result<Vec<u8>, Error> {
        let mut rto = timers.rto;

        for attempt in 0..timers.rc {
            let _ = send(message);

            match tokio::time::timeout(rto, &mut *rx).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(_)) => return Err(Error::Cancelled),
                Err(_) => {
                    if attempt + 1 < timers.rc {
                        rto *= 2;
                    }
                }
            }
        }

        // final wait, per RFC 5389 §7.2.1: Rm * RTO with no further sends.
        match tokio::time::timeout(timers.rm * rto, rx).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn run_tcp(
        &self,
        message: &[u8],
        timers: &Timers,
        send: impl Fn(&[u8]) -> std::io::Result<()>,
        rx: &mut oneshot::Receiver<Vec<u8>>,
    ) -> Result<Vec<u8>, Error> {
        let _ = send(message);

        match tokio::time::timeout(timers.ti, rx).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Run a transaction that may be long-term-auth challenged.
    ///
    /// `build` (re-)encodes the request for a freshly minted transaction id,
    /// given the realm/nonce pair once a 401 challenge has been seen. Stops
    /// at the first success or error response other than 401/438, after at
    /// most one 401 retry and one 438 retry (three attempts total).
    pub async fn request_authenticated(
        &self,
        timers: &Timers,
        mode: Mode,
        destination: SocketAddr,
        send: impl Fn(&[u8]) -> std::io::Result<()>,
        mut build: impl FnMut(TransactionId, Option<(&str, &str)>) -> Vec<u8>,
    ) -> Result<Vec<u8>, Error> {
        let mut challenge: Option<(String, String)> = None;
        let mut challenged_once = false;

        for _ in 0..3 {
            let id = Self::random_id();
            let challenge_ref = challenge.as_ref().map(|(r, n)| (r.as_str(), n.as_str()));
            let message = build(id, challenge_ref);

            let bytes = self
                .request(id, &message, destination, mode, timers, &send)
                .await?;

            let mut attrs = codec::Attributes::default();
            let decoded = Message::decode(&bytes, &mut attrs)?;

            if !decoded.method().is_error() {
                return Ok(bytes);
            }

            let error = decoded.get::<ErrorCode>().ok_or(Error::Protocol)?;

            if error.code == ErrorType::Unauthorized as u16 && !challenged_once {
                let realm = decoded.get::<Realm>().ok_or(Error::Protocol)?.to_string();
                let nonce = decoded.get::<Nonce>().ok_or(Error::Protocol)?.to_string();
                challenge = Some((realm, nonce));
                challenged_once = true;
                continue;
            }

            if error.code == ErrorType::StaleNonce as u16 && challenged_once {
                let nonce = decoded.get::<Nonce>().ok_or(Error::Protocol)?.to_string();
                if let Some((_, n)) = challenge.as_mut() {
                    *n = nonce;
                }
                continue;
            }

            if error.code == ErrorType::RoleConflict as u16 {
                return Err(Error::Conflict);
            }

            return Err(Error::Rejected(error.code, error.message.to_string()));
        }

        Err(Error::Protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_response(id: TransactionId) -> Vec<u8> {
        let mut bytes = vec![0u8; 20];
        bytes[0] = 0x01;
        bytes[1] = 0x01;
        bytes[4..8].copy_from_slice(&0x2112A442u32.to_be_bytes());
        bytes[8..20].copy_from_slice(&id);
        bytes
    }

    #[tokio::test]
    async fn request_resolves_once_a_matching_response_is_received() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        let destination: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        let response = fake_response(id);
        let timers = Timers::default();

        let result = pool
            .request(id, b"request", destination, Mode::Udp, &timers, |_| {
                pool.receive(destination, &response);
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap(), response);
    }

    #[tokio::test]
    async fn receive_ignores_a_response_from_the_wrong_source() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        let destination: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        let wrong_source: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let response = fake_response(id);

        assert!(!pool.receive(wrong_source, &response));

        pool.table.lock().insert(
            id,
            Entry {
                destination,
                sender: oneshot::channel().0,
            },
        );
        assert!(!pool.receive(wrong_source, &response));
        assert!(pool.receive(destination, &response));
    }

    #[tokio::test]
    async fn a_transaction_with_no_response_times_out_after_rc_and_rm() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        let destination: SocketAddr = "127.0.0.1:3478".parse().unwrap();
        let timers = Timers {
            rto: Duration::from_millis(1),
            rc: 2,
            rm: 1,
            ti: Duration::from_millis(39_500),
        };

        let result = pool
            .request(id, b"request", destination, Mode::Udp, &timers, |_| Ok(()))
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert!(pool.table.lock().is_empty());
    }

    #[test]
    fn cancel_removes_a_registered_transaction() {
        let pool = TransactionPool::new();
        let id = TransactionPool::random_id();
        pool.table.lock().insert(
            id,
            Entry {
                destination: "127.0.0.1:3478".parse().unwrap(),
                sender: oneshot::channel().0,
            },
        );

        pool.cancel(&id);
        assert!(pool.table.lock().is_empty());
    }
}
