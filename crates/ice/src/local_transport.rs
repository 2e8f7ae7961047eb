use std::{net::SocketAddr, sync::Arc};

use parking_lot::Mutex;
use stun::transaction::{Mode, TransactionId, TransactionPool};
use tokio::net::UdpSocket;
use turn::{
    Client,
    allocation::{Allocation, Credentials},
};

use crate::Error;

/// Where a classified inbound datagram, or an outbound send, is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    Direct,
    Relayed,
}

/// One UDP socket plus its embedded STUN Binding and optional TURN client.
///
/// Demultiplexes every inbound datagram by source address: traffic from the
/// configured STUN/TURN server goes to the shared [`TransactionPool`] first;
/// anything the pool doesn't recognize as a live transaction is handed to
/// the TURN client to decode as an encapsulated peer datagram. Everything
/// else is a direct peer datagram on [`Path::Direct`].
pub struct LocalTransport {
    socket: Arc<UdpSocket>,
    pool: Arc<TransactionPool>,
    stun_server: Option<SocketAddr>,
    turn: Mutex<Option<Arc<Client>>>,
    reflexive_address: Mutex<Option<SocketAddr>>,
    mismatch_attempts: Mutex<u32>,
}

/// An event a Component reacts to by gathering a candidate or raising a
/// failure.
pub enum TransportEvent {
    Started(SocketAddr),
    ServerReflexiveAddressChanged(SocketAddr),
    RelayedAddressChanged(SocketAddr),
    /// A peer-origin STUN Binding request, classified instead of passed
    /// through as an opaque peer datagram so it can reach
    /// `Agent::handle_incoming_binding`.
    IncomingBinding {
        source: SocketAddr,
        id: TransactionId,
        priority: u32,
        use_candidate: bool,
    },
    PeerDatagram { source: SocketAddr, path: Path, data: Vec<u8> },
}

/// Recognize a peer-origin STUN Binding request among otherwise-opaque
/// bytes, pulling out the fields `Agent::handle_incoming_binding` needs.
/// Anything that doesn't decode as one is left for the caller to treat as
/// a plain peer datagram.
fn classify_incoming_binding(source: SocketAddr, bytes: &[u8]) -> Option<TransportEvent> {
    if bytes.len() < 20 || bytes[0] >> 6 != 0 {
        return None;
    }

    let mut attrs = codec::Attributes::default();
    let decoded = codec::message::Message::decode(bytes, &mut attrs).ok()?;

    if !matches!(
        decoded.method(),
        codec::message::methods::Method::Binding(codec::message::methods::MethodType::Request)
    ) {
        return None;
    }

    let mut id: TransactionId = [0u8; 12];
    id.copy_from_slice(decoded.token());

    let priority = decoded.get::<codec::message::attributes::Priority>().unwrap_or(0);
    let use_candidate = decoded.get::<codec::message::attributes::UseCandidate>().is_some();

    Some(TransportEvent::IncomingBinding { source, id, priority, use_candidate })
}

impl LocalTransport {
    pub async fn bind(local_addr: SocketAddr, stun_server: Option<SocketAddr>) -> Result<Self, Error> {
        let socket = UdpSocket::bind(local_addr).await.map_err(Error::Io)?;

        Ok(Self {
            socket: Arc::new(socket),
            pool: Arc::new(TransactionPool::new()),
            stun_server,
            turn: Mutex::new(None),
            reflexive_address: Mutex::new(None),
            mismatch_attempts: Mutex::new(0),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn pool(&self) -> &Arc<TransactionPool> {
        &self.pool
    }

    pub fn turn_client(&self) -> Option<Arc<Client>> {
        self.turn.lock().clone()
    }

    fn send_fn(&self) -> impl Fn(&[u8]) -> std::io::Result<()> + Send + Sync + 'static {
        let socket = self.socket.clone();
        let server = self.stun_server;
        move |bytes: &[u8]| {
            let Some(destination) = server else {
                return Err(std::io::Error::other("no server configured"));
            };
            let socket = socket.clone();
            let bytes = bytes.to_vec();
            tokio::spawn(async move {
                let _ = socket.send_to(&bytes, destination).await;
            });
            Ok(())
        }
    }

    /// Perform one Binding check against `stun_server` and report the
    /// learned reflexive address; the caller (the Component) turns this
    /// into a `ServerReflexiveAddressChanged` event.
    pub async fn discover_reflexive(&self) -> Result<SocketAddr, Error> {
        let server = self.stun_server.ok_or(Error::Protocol)?;
        let timers = stun::transaction::Timers::default();
        let id = TransactionPool::random_id();

        let request = stun::binding::BindingRequest {
            destination: server,
            username: "",
            password: &[],
            priority: 0,
            role: stun::binding::IceRole::Controlling(0),
            use_candidate: false,
        };

        let address = stun::binding::check(&self.pool, &timers, Mode::Udp, id, request, self.send_fn())
            .await
            .map_err(Error::Stun)?;

        *self.reflexive_address.lock() = Some(address);
        Ok(address)
    }

    /// Allocate a TURN relay on this transport; the caller turns the result
    /// into a `RelayedAddressChanged` event.
    pub async fn allocate_relay(
        &self,
        server: SocketAddr,
        credentials: Credentials,
    ) -> Result<(SocketAddr, SocketAddr), Error> {
        let allocation = Allocation::new(self.pool.clone(), server, credentials, Mode::Udp, self.send_fn());
        let client = Arc::new(Client::new(allocation));
        *self.turn.lock() = Some(client.clone());

        client.allocation.allocate().await.map_err(Error::Turn)
    }

    /// Feed one received datagram through the classification rules of
    /// §4.6, returning the event a Component should react to, if any.
    pub async fn receive(&self, source: SocketAddr, bytes: &[u8]) -> Option<TransportEvent> {
        let from_server = self.stun_server == Some(source)
            || self
                .turn
                .lock()
                .as_ref()
                .is_some_and(|c| c.allocation.relayed_address() == Some(source));

        if from_server && self.pool.receive(source, bytes) {
            return None;
        }

        if from_server {
            if let Ok(decoded) = codec::channel_data::ChannelData::decode(bytes) {
                return Some(TransportEvent::PeerDatagram {
                    source,
                    path: Path::Relayed,
                    data: decoded.as_bytes().to_vec(),
                });
            }
            return None;
        }

        if let Some(event) = classify_incoming_binding(source, bytes) {
            return Some(event);
        }

        Some(TransportEvent::PeerDatagram {
            source,
            path: Path::Direct,
            data: bytes.to_vec(),
        })
    }

    /// On a TCP-TURN `Mismatch`, rebind and re-allocate up to 3 times. UDP
    /// transports never see this error; TURN over UDP has no connection to
    /// lose.
    pub async fn recover_mismatch(
        &self,
        server: SocketAddr,
        credentials: Credentials,
    ) -> Result<(), Error> {
        let mut attempts = self.mismatch_attempts.lock();
        if *attempts >= 3 {
            return Err(Error::Turn(turn::Error::Mismatch));
        }
        *attempts += 1;
        drop(attempts);

        *self.reflexive_address.lock() = None;
        self.allocate_relay(server, credentials).await?;
        Ok(())
    }

    pub async fn send(&self, destination: SocketAddr, data: &[u8]) -> std::io::Result<()> {
        self.socket.send_to(data, destination).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_assigns_an_ephemeral_port() {
        let transport = LocalTransport::bind("127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();

        assert_ne!(transport.local_addr().unwrap().port(), 0);
        assert!(transport.turn_client().is_none());
    }

    #[tokio::test]
    async fn receive_classifies_unrecognized_traffic_as_direct_peer_datagram() {
        let transport = LocalTransport::bind("127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let event = transport.receive(peer, b"hello").await.unwrap();
        match event {
            TransportEvent::PeerDatagram { source, path, data } => {
                assert_eq!(source, peer);
                assert_eq!(path, Path::Direct);
                assert_eq!(data, b"hello");
            }
            _ => panic!("expected a direct peer datagram"),
        }
    }

    #[tokio::test]
    async fn receive_classifies_a_peer_binding_request_instead_of_a_raw_datagram() {
        let transport = LocalTransport::bind("127.0.0.1:0".parse().unwrap(), None)
            .await
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let id = TransactionPool::random_id();

        let mut buf = bytes::BytesMut::with_capacity(64);
        let mut encoder = codec::message::MessageEncoder::new(
            codec::message::methods::BINDING_REQUEST,
            &id,
            &mut buf,
        );
        encoder.append::<codec::message::attributes::Priority>(1000);
        encoder.append::<codec::message::attributes::UseCandidate>(());
        encoder.flush(None).unwrap();

        let event = transport.receive(peer, &buf).await.unwrap();
        match event {
            TransportEvent::IncomingBinding { source, id: received_id, priority, use_candidate } => {
                assert_eq!(source, peer);
                assert_eq!(received_id, id);
                assert_eq!(priority, 1000);
                assert!(use_candidate);
            }
            _ => panic!("expected an incoming binding request"),
        }
    }
}
