use std::{net::SocketAddr, sync::Arc};

use parking_lot::Mutex;
use turn::allocation::Credentials;

use crate::{
    Error,
    candidate::{CandidateInfo, CandidateType},
    local_transport::{LocalTransport, Path, TransportEvent},
};

/// Candidate gathering for one ICE component (RTP=1, RTCP=2, ...): owns
/// every Local Transport that backs it and the candidates they produced.
pub struct Component {
    pub id: u8,
    transports: Vec<Arc<LocalTransport>>,
    candidates: Mutex<Vec<CandidateInfo>>,
    stun_server: Option<SocketAddr>,
    turn_server: Option<(SocketAddr, Credentials)>,
}

/// Which optional gathering steps to run, mirroring the `use*` options.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatherOptions {
    pub use_local: bool,
    pub use_stun_bind: bool,
    pub use_stun_relay_udp: bool,
}

impl Component {
    pub fn new(id: u8, stun_server: Option<SocketAddr>, turn_server: Option<(SocketAddr, Credentials)>) -> Self {
        Self {
            id,
            transports: Vec::new(),
            candidates: Mutex::new(Vec::new()),
            stun_server,
            turn_server,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_candidates(id: u8, candidates: Vec<CandidateInfo>) -> Self {
        let component = Self::new(id, None, None);
        *component.candidates.lock() = candidates;
        component
    }

    pub fn candidates(&self) -> Vec<CandidateInfo> {
        self.candidates.lock().clone()
    }

    pub fn transports(&self) -> &[Arc<LocalTransport>] {
        &self.transports
    }

    /// For each configured local address: bind a Local Transport, emit a
    /// Host candidate, then run the configured reflexive/relay discovery.
    /// `local_addrs` order determines network index (and so local-pref).
    pub async fn gather(
        &mut self,
        local_addrs: &[SocketAddr],
        options: GatherOptions,
    ) -> Result<(), Error> {
        for (network, &local_addr) in local_addrs.iter().enumerate() {
            let transport = Arc::new(LocalTransport::bind(local_addr, self.stun_server).await?);
            let bound = transport.local_addr().map_err(Error::Io)?;

            if options.use_local {
                self.add_candidate(CandidateInfo::new(
                    CandidateType::Host,
                    bound,
                    bound,
                    self.id,
                    network as u32,
                    None,
                    0,
                ));
            }

            if options.use_stun_bind && self.stun_server.is_some() {
                if let Ok(reflexive) = transport.discover_reflexive().await {
                    self.add_candidate(CandidateInfo::new(
                        CandidateType::ServerReflexive,
                        reflexive,
                        bound,
                        self.id,
                        network as u32,
                        self.stun_server,
                        0,
                    ));
                }
            }

            if options.use_stun_relay_udp {
                if let Some((server, credentials)) = self.turn_server.clone() {
                    if let Ok((relayed, _reflexive)) = transport.allocate_relay(server, credentials).await {
                        self.add_candidate(CandidateInfo::new(
                            CandidateType::Relayed,
                            relayed,
                            relayed,
                            self.id,
                            network as u32,
                            Some(server),
                            1,
                        ));
                    }
                }
            }

            self.transports.push(transport);
        }

        Ok(())
    }

    /// §4.7 redundancy elimination: drop a candidate sharing (address,
    /// base) with one already emitted at equal or higher priority.
    fn add_candidate(&self, candidate: CandidateInfo) {
        let mut candidates = self.candidates.lock();

        let redundant = candidates.iter().any(|existing| {
            existing.address == candidate.address
                && existing.base == candidate.base
                && existing.priority >= candidate.priority
        });

        if !redundant {
            candidates.push(candidate);
        }
    }

    /// §4.7 peer-reflexive local candidate: added when a connectivity
    /// check response's MAPPED-ADDRESS doesn't match any known local
    /// candidate. `base` is the sending local candidate's address.
    pub fn add_peer_reflexive_local(
        &self,
        base: SocketAddr,
        address: SocketAddr,
        priority: u32,
        network: u32,
    ) -> CandidateInfo {
        let candidate = CandidateInfo {
            priority,
            ..CandidateInfo::new(CandidateType::PeerReflexive, address, base, self.id, network, None, 0)
        };

        self.candidates.lock().push(candidate.clone());
        candidate
    }

    /// Dispatch one datagram read from `transport` to the right handler;
    /// returns the peer datagram (and its path) for everything else to
    /// consume. Gathering milestones are consumed here; an incoming
    /// Binding request is consumed by `Agent::handle_transport_event`
    /// before it ever reaches this method.
    pub fn handle_event(&self, event: TransportEvent) -> Option<(SocketAddr, Path, Vec<u8>)> {
        match event {
            TransportEvent::Started(_)
            | TransportEvent::ServerReflexiveAddressChanged(_)
            | TransportEvent::RelayedAddressChanged(_)
            | TransportEvent::IncomingBinding { .. } => None,
            TransportEvent::PeerDatagram { source, path, data } => Some((source, path, data)),
        }
    }

    /// Install a TURN channel binding for `peer` on whichever transport
    /// owns the relayed candidate, lowering per-packet overhead for
    /// traffic the application has flagged as low-overhead.
    pub async fn request_low_overhead(&self, peer: SocketAddr) -> Result<(), Error> {
        for transport in &self.transports {
            if let Some(client) = transport.turn_client() {
                client.allocation.bind_channel(peer).await.map_err(Error::Turn)?;
                return Ok(());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(addr: &str) -> CandidateInfo {
        CandidateInfo::new(CandidateType::Host, addr.parse().unwrap(), addr.parse().unwrap(), 1, 0, None, 0)
    }

    #[test]
    fn add_candidate_drops_same_address_base_lower_priority() {
        let component = Component::new(1, None, None);
        component.add_candidate(host("10.0.0.1:1000"));
        component.add_candidate(host("10.0.0.1:1000"));

        assert_eq!(component.candidates().len(), 1);
    }

    #[test]
    fn add_candidate_keeps_distinct_addresses() {
        let component = Component::new(1, None, None);
        component.add_candidate(host("10.0.0.1:1000"));
        component.add_candidate(host("10.0.0.1:1001"));

        assert_eq!(component.candidates().len(), 2);
    }

    #[test]
    fn add_peer_reflexive_local_is_recorded_with_given_priority() {
        let component = Component::new(1, None, None);
        let base: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        let address: SocketAddr = "203.0.113.9:5000".parse().unwrap();

        let candidate = component.add_peer_reflexive_local(base, address, 999, 0);

        assert_eq!(candidate.priority, 999);
        assert_eq!(candidate.kind, CandidateType::PeerReflexive);
        assert_eq!(component.candidates().len(), 1);
    }

    #[test]
    fn handle_event_passes_through_peer_datagrams_only() {
        let component = Component::new(1, None, None);
        let source: SocketAddr = "10.0.0.2:2000".parse().unwrap();

        assert!(component.handle_event(TransportEvent::Started(source)).is_none());
        let routed = component.handle_event(TransportEvent::PeerDatagram {
            source,
            path: Path::Direct,
            data: vec![1, 2, 3],
        });
        assert_eq!(routed, Some((source, Path::Direct, vec![1, 2, 3])));
    }
}
