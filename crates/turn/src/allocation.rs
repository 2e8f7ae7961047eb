use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use ahash::HashMap;
use bytes::BytesMut;
use codec::{
    Attributes,
    channel_data::ChannelData,
    message::{
        Message, MessageEncoder,
        attributes::{
            Data, DontFragment, ErrorCode, ErrorType, Lifetime, Nonce, Realm, ReqeestedTransport,
            UserName, XorMappedAddress, XorPeerAddress, XorRelayedAddress,
        },
        methods::{
            ALLOCATE_REQUEST, CHANNEL_BIND_REQUEST, CREATE_PERMISSION_REQUEST, Method, MethodType,
            REFRESH_REQUEST, SEND_INDICATION,
        },
    },
    crypto::long_term_credential_digest,
};
use parking_lot::Mutex;
use stun::transaction::{Mode, Timers, TransactionPool};

use crate::Error;

/// Long-term credentials this client presents to the TURN server.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Started,
    Refreshing,
    Stopping,
    Erroring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermissionState {
    Pending,
    Active,
}

type SendFn = dyn Fn(&[u8]) -> std::io::Result<()> + Send + Sync;

/// A single TURN allocation: Allocate/Refresh/CreatePermission/ChannelBind
/// lifecycle plus peer-data encoding.
///
/// Owned behind an `Arc` because refresh/permission/channel timers are
/// scheduled as detached tasks holding only a `Weak` back-reference, the
/// same ownership shape the teacher's session sweep uses, adapted from one
/// spawned OS thread to one lightweight task per timer.
pub struct Allocation {
    pool: Arc<TransactionPool>,
    server: SocketAddr,
    credentials: Credentials,
    mode: Mode,
    timers: Timers,
    send: Arc<SendFn>,

    state: Mutex<State>,
    relayed_address: Mutex<Option<SocketAddr>>,
    reflexive_address: Mutex<Option<SocketAddr>>,
    dont_fragment_supported: Mutex<bool>,
    permissions: Mutex<HashMap<IpAddr, PermissionState>>,
    channels: Mutex<HashMap<u16, SocketAddr>>,
    peer_channels: Mutex<HashMap<SocketAddr, u16>>,
    pending_writes: Mutex<HashMap<SocketAddr, Vec<Vec<u8>>>>,
}

impl Allocation {
    pub fn new(
        pool: Arc<TransactionPool>,
        server: SocketAddr,
        credentials: Credentials,
        mode: Mode,
        send: impl Fn(&[u8]) -> std::io::Result<()> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            server,
            credentials,
            mode,
            timers: Timers::default(),
            send: Arc::new(send),
            state: Mutex::new(State::Stopped),
            relayed_address: Mutex::new(None),
            reflexive_address: Mutex::new(None),
            dont_fragment_supported: Mutex::new(true),
            permissions: Mutex::new(HashMap::default()),
            channels: Mutex::new(HashMap::default()),
            peer_channels: Mutex::new(HashMap::default()),
            pending_writes: Mutex::new(HashMap::default()),
        })
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn relayed_address(&self) -> Option<SocketAddr> {
        *self.relayed_address.lock()
    }

    pub fn reflexive_address(&self) -> Option<SocketAddr> {
        *self.reflexive_address.lock()
    }

    /// Drop the last observed reflexive address; used by the ErrorMismatch
    /// recovery path before re-issuing Allocate on a rebound socket.
    pub fn clear_reflexive_address(&self) {
        *self.reflexive_address.lock() = None;
    }

    /// Send Allocate with LIFETIME=3600, REQUESTED-TRANSPORT=UDP, and
    /// DONT-FRAGMENT unless a prior attempt learned the server doesn't
    /// support it. Retries once without DONT-FRAGMENT on 420.
    pub async fn allocate(self: &Arc<Self>) -> Result<(SocketAddr, SocketAddr), Error> {
        *self.state.lock() = State::Starting;

        for _ in 0..2 {
            let want_df = *self.dont_fragment_supported.lock();
            let bytes = self
                .issue_authenticated(ALLOCATE_REQUEST, |encoder| {
                    encoder.append::<Lifetime>(3600);
                    encoder.append::<ReqeestedTransport>(ReqeestedTransport::Udp);
                    if want_df {
                        encoder.append::<DontFragment>(());
                    }
                })
                .await?;

            let mut attrs = Attributes::default();
            let decoded = Message::decode(&bytes, &mut attrs)?;

            if let Method::Allocate(MethodType::Error) = decoded.method() {
                let error = decoded.get::<ErrorCode>().ok_or(Error::Protocol)?;

                if error.code == ErrorType::UnknownAttribute as u16 && want_df {
                    *self.dont_fragment_supported.lock() = false;
                    continue;
                }

                *self.state.lock() = State::Erroring;
                return Err(stun::Error::Rejected(error.code, error.message.to_string()).into());
            }

            let lifetime = decoded.get::<Lifetime>().ok_or(Error::Protocol)?;
            if lifetime < 120 {
                *self.state.lock() = State::Erroring;
                return Err(Error::Protocol);
            }

            let relayed = decoded.get::<XorRelayedAddress>().ok_or(Error::Protocol)?;
            let reflexive = decoded.get::<XorMappedAddress>().ok_or(Error::Protocol)?;

            *self.relayed_address.lock() = Some(relayed);
            *self.reflexive_address.lock() = Some(reflexive);
            *self.state.lock() = State::Started;

            self.schedule_refresh(lifetime);

            return Ok((relayed, reflexive));
        }

        *self.state.lock() = State::Erroring;
        Err(Error::Protocol)
    }

    fn schedule_refresh(self: &Arc<Self>, lifetime: u32) {
        let weak = Arc::downgrade(self);
        let delay = Duration::from_secs(lifetime.saturating_sub(60) as u64);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(allocation) = weak.upgrade() {
                let _ = allocation.refresh().await;
            }
        });
    }

    /// Periodic Refresh with LIFETIME=3600; stops the allocation on error.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), Error> {
        *self.state.lock() = State::Refreshing;

        let bytes = self
            .issue_authenticated(REFRESH_REQUEST, |encoder| {
                encoder.append::<Lifetime>(3600);
            })
            .await?;

        let mut attrs = Attributes::default();
        let decoded = Message::decode(&bytes, &mut attrs)?;

        if let Method::Refresh(MethodType::Error) = decoded.method() {
            *self.state.lock() = State::Erroring;
            let error = decoded.get::<ErrorCode>().ok_or(Error::Protocol)?;
            return Err(stun::Error::Rejected(error.code, error.message.to_string()).into());
        }

        let lifetime = decoded.get::<Lifetime>().ok_or(Error::Protocol)?;
        *self.state.lock() = State::Started;
        self.schedule_refresh(lifetime);

        Ok(())
    }

    /// Refresh with LIFETIME=0; 437 on cancellation is not an error.
    pub async fn stop(self: &Arc<Self>) -> Result<(), Error> {
        *self.state.lock() = State::Stopping;

        let result = self
            .issue_authenticated(REFRESH_REQUEST, |encoder| {
                encoder.append::<Lifetime>(0);
            })
            .await;

        *self.state.lock() = State::Stopped;

        match result {
            Ok(_) | Err(Error::Mismatch) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// Diff the desired set of peer IPs against the current permission
    /// table: new IPs each spawn a CreatePermission sub-task, dropped ones
    /// are removed immediately.
    pub fn set_permissions(self: &Arc<Self>, peers: &HashSet<IpAddr>) {
        let to_add: Vec<IpAddr> = {
            let mut current = self.permissions.lock();
            current.retain(|ip, _| peers.contains(ip));

            peers
                .iter()
                .filter(|ip| !current.contains_key(ip))
                .copied()
                .collect()
        };

        for ip in to_add {
            self.permissions.lock().insert(ip, PermissionState::Pending);

            let this = self.clone();
            tokio::spawn(async move {
                this.create_permission(ip).await;
            });
        }
    }

    async fn create_permission(self: &Arc<Self>, ip: IpAddr) {
        let peer = SocketAddr::new(ip, 0);

        let result = self
            .issue_authenticated(CREATE_PERMISSION_REQUEST, |encoder| {
                encoder.append::<XorPeerAddress>(peer);
            })
            .await;

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(_) => return,
        };

        let mut attrs = Attributes::default();
        let decoded = match Message::decode(&bytes, &mut attrs) {
            Ok(decoded) => decoded,
            Err(_) => return,
        };

        if let Method::CreatePermission(MethodType::Error) = decoded.method() {
            let Some(error) = decoded.get::<ErrorCode>() else {
                return;
            };

            if error.code == ErrorType::Forbidden as u16 {
                self.permissions.lock().remove(&ip);
            }
            // 508: leave Pending, retried by a later set_permissions diff.
            return;
        }

        self.permissions.lock().insert(ip, PermissionState::Active);

        let queued: Vec<Vec<u8>> = self
            .pending_writes
            .lock()
            .iter_mut()
            .filter(|(addr, _)| addr.ip() == ip)
            .flat_map(|(_, queue)| std::mem::take(queue))
            .collect();

        for datagram in queued {
            let _ = self.send_to(SocketAddr::new(ip, 0), &datagram);
        }

        self.pending_writes.lock().retain(|addr, _| addr.ip() != ip);
    }

    /// Install a channel binding for `peer`; requires an already-active
    /// permission for its IP. Channel numbers are allocated by linear scan.
    pub async fn bind_channel(self: &Arc<Self>, peer: SocketAddr) -> Result<u16, Error> {
        if !matches!(
            self.permissions.lock().get(&peer.ip()),
            Some(PermissionState::Active)
        ) {
            return Err(Error::Protocol);
        }

        let number = {
            let channels = self.channels.lock();
            (0x4000..=0x7FFFu16)
                .find(|n| !channels.contains_key(n))
                .ok_or(Error::Capacity)?
        };

        let bytes = self
            .issue_authenticated(CHANNEL_BIND_REQUEST, |encoder| {
                encoder.append::<codec::message::attributes::ChannelNumber>(number);
                encoder.append::<XorPeerAddress>(peer);
            })
            .await?;

        let mut attrs = Attributes::default();
        let decoded = Message::decode(&bytes, &mut attrs)?;

        if let Method::ChannelBind(MethodType::Error) = decoded.method() {
            let error = decoded.get::<ErrorCode>().ok_or(Error::Protocol)?;
            return Err(stun::Error::Rejected(error.code, error.message.to_string()).into());
        }

        self.channels.lock().insert(number, peer);
        self.peer_channels.lock().insert(peer, number);
        self.schedule_channel_refresh(number, peer);

        Ok(number)
    }

    fn schedule_channel_refresh(self: &Arc<Self>, number: u16, peer: SocketAddr) {
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(9 * 60)).await;
            if let Some(allocation) = weak.upgrade() {
                if allocation.channels.lock().get(&number) == Some(&peer) {
                    let _ = allocation.bind_channel(peer).await;
                }
            }
        });
    }

    /// Send application data to `peer`: ChannelData if a channel is bound,
    /// a Send indication if a permission is active, or queue it until the
    /// in-flight permission install confirms.
    pub fn send_to(&self, peer: SocketAddr, data: &[u8]) -> std::io::Result<()> {
        if let Some(&number) = self.peer_channels.lock().get(&peer) {
            let mut buf = BytesMut::with_capacity(4 + data.len());
            ChannelData { number, bytes: data }.encode(&mut buf);
            return (self.send)(&buf);
        }

        let active = matches!(
            self.permissions.lock().get(&peer.ip()),
            Some(PermissionState::Active)
        );

        if !active {
            self.pending_writes
                .lock()
                .entry(peer)
                .or_default()
                .push(data.to_vec());
            return Ok(());
        }

        let mut buf = BytesMut::with_capacity(64 + data.len());
        let id = TransactionPool::random_id();
        let mut encoder = MessageEncoder::new(SEND_INDICATION, &id, &mut buf);
        encoder.append::<XorPeerAddress>(peer);
        encoder.append::<Data>(data);
        encoder
            .flush(None)
            .map_err(|_| std::io::Error::other("encode failed"))?;

        (self.send)(&buf)
    }

    /// Run one long-term-auth-challenged request, appending USERNAME/REALM/
    /// NONCE once a challenge is known. `append` fills in the method-specific
    /// attributes; the auth header and MESSAGE-INTEGRITY are added here so
    /// callers don't duplicate that logic per method.
    async fn issue_authenticated(
        &self,
        method: codec::message::methods::Method,
        append: impl Fn(&mut MessageEncoder<'_>),
    ) -> Result<Vec<u8>, Error> {
        let username = self.credentials.username.clone();
        let password = self.credentials.password.clone();
        let send = self.send.clone();

        let bytes = self
            .pool
            .request_authenticated(
                &self.timers,
                self.mode,
                self.server,
                move |b| (send)(b),
                move |id, challenge| {
                    let mut buf = BytesMut::with_capacity(128);
                    let mut encoder = MessageEncoder::new(method, &id, &mut buf);
                    append(&mut encoder);

                    let key = challenge.map(|(realm, nonce)| {
                        encoder.append::<UserName>(username.as_str());
                        encoder.append::<Realm>(realm);
                        encoder.append::<Nonce>(nonce);
                        long_term_credential_digest(&username, &password, realm)
                    });

                    encoder.flush(key.as_ref().map(|k| k.as_slice())).ok();
                    buf.to_vec()
                },
            )
            .await?;

        Ok(bytes)
    }
}

/// The per-datagram header cost of each TURN relay path, for use by the
/// media layer when budgeting packet sizes.
#[derive(Debug, Clone, Copy)]
pub enum RelayPath {
    UdpChannelData,
    TcpChannelData,
    StunSend { dont_fragment: bool },
}

pub fn overhead(path: RelayPath) -> usize {
    match path {
        RelayPath::UdpChannelData => 4,
        RelayPath::TcpChannelData => 4 + 3,
        RelayPath::StunSend { dont_fragment: true } => 40 + 3,
        RelayPath::StunSend { dont_fragment: false } => 36 + 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_data_is_cheaper_than_stun_send() {
        assert!(overhead(RelayPath::UdpChannelData) < overhead(RelayPath::StunSend { dont_fragment: false }));
        assert!(overhead(RelayPath::TcpChannelData) < overhead(RelayPath::StunSend { dont_fragment: true }));
    }

    #[test]
    fn dont_fragment_adds_to_stun_send_overhead() {
        let with = overhead(RelayPath::StunSend { dont_fragment: true });
        let without = overhead(RelayPath::StunSend { dont_fragment: false });
        assert_eq!(with - without, 4);
    }

    #[test]
    fn credentials_clone_round_trips() {
        let original = Credentials {
            username: "alice".to_string(),
            password: "secret".to_string(),
        };
        let cloned = original.clone();
        assert_eq!(cloned.username, original.username);
        assert_eq!(cloned.password, original.password);
    }
}
