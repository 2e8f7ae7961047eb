use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use parking_lot::Mutex;
use rand::Rng;
use stun::{
    binding::{BindingRequest, IceRole},
    transaction::{Mode, Timers, TransactionId, TransactionPool},
};
use tokio::sync::mpsc;
use turn::allocation::Credentials as TurnCredentials;

use crate::{
    Error,
    candidate::{CandidateInfo, CandidatePair, CandidateType, CheckList, PairState},
    component::{Component, GatherOptions},
    local_transport::{LocalTransport, Path, TransportEvent},
};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn random_credential(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// §4.8 *Nomination (regular)*: the controlling side puts USE-CANDIDATE on
/// the wire either because aggressive nomination is in effect for every
/// check, or because this particular pair was re-triggered to nominate it.
fn use_candidate_for_check(role: Role, aggressive_nomination: bool, is_triggered_for_nominated: bool) -> bool {
    aggressive_nomination || (role == Role::Initiator && is_triggered_for_nominated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Short-term STUN credentials: local, generated at `start`, plus the
/// peer's, supplied out of band once SDP/signaling has exchanged them.
#[derive(Debug, Clone)]
pub struct LocalCredentials {
    pub ufrag: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub ufrag: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Stopped,
    Starting,
    Started,
    Stopping,
    Finished,
}

/// One line per `spec.md` §9's event-enum design note: the application
/// observes the agent exclusively through this channel rather than
/// polling getters.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    CandidateGathered(CandidateInfo),
    GatheringComplete,
    ComponentReady(u8),
    StateChanged(AgentState),
    Failed(String),
}

pub struct AgentOptions {
    pub role: Role,
    pub gather: GatherOptions,
    pub aggressive_nomination: bool,
    pub max_pairs_per_component: usize,
    pub tiebreaker: u64,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            role: Role::Initiator,
            gather: GatherOptions::default(),
            aggressive_nomination: false,
            max_pairs_per_component: 100,
            // spec.md §4.8: this implementation defaults the tiebreaker to
            // 0; a random 64-bit value may be supplied instead to enable
            // role-conflict resolution between two agents that both guess
            // the same default role.
            tiebreaker: 0,
        }
    }
}

/// The check-list, pairing, and nomination state machine (C8), owning a
/// Component per configured ICE component.
pub struct Agent {
    role: Mutex<Role>,
    local_credentials: Mutex<Option<LocalCredentials>>,
    remote_credentials: Mutex<Option<RemoteCredentials>>,
    tiebreaker: u64,
    aggressive_nomination: bool,
    max_pairs_per_component: usize,
    components: Mutex<Vec<Component>>,
    check_list: Mutex<CheckList>,
    state: Mutex<AgentState>,
    events: mpsc::UnboundedSender<AgentEvent>,
    nominated_components: Mutex<std::collections::HashSet<u8>>,
}

impl Agent {
    pub fn new(options: AgentOptions) -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let agent = Self {
            role: Mutex::new(options.role),
            local_credentials: Mutex::new(None),
            remote_credentials: Mutex::new(None),
            tiebreaker: options.tiebreaker,
            aggressive_nomination: options.aggressive_nomination,
            max_pairs_per_component: options.max_pairs_per_component,
            components: Mutex::new(Vec::new()),
            check_list: Mutex::new(CheckList::new()),
            state: Mutex::new(AgentState::Stopped),
            events: tx,
            nominated_components: Mutex::new(std::collections::HashSet::new()),
        };

        (agent, rx)
    }

    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    fn set_state(&self, state: AgentState) {
        *self.state.lock() = state;
        let _ = self.events.send(AgentEvent::StateChanged(state));
    }

    pub fn local_credentials(&self) -> Option<LocalCredentials> {
        self.local_credentials.lock().clone()
    }

    pub fn set_remote_credentials(&self, credentials: RemoteCredentials) {
        *self.remote_credentials.lock() = Some(credentials);
    }

    /// Generate local credentials, then gather candidates for
    /// `component_count` components across `local_addrs`.
    pub async fn start(
        &self,
        component_count: u8,
        local_addrs: &[SocketAddr],
        stun_server: Option<SocketAddr>,
        turn_server: Option<(SocketAddr, TurnCredentials)>,
        gather: GatherOptions,
    ) -> Result<(), Error> {
        self.set_state(AgentState::Starting);

        *self.local_credentials.lock() = Some(LocalCredentials {
            ufrag: random_credential(4),
            password: random_credential(22),
        });

        let mut components = Vec::with_capacity(component_count as usize);
        for id in 1..=component_count {
            let mut component = Component::new(id, stun_server, turn_server.clone());
            component.gather(local_addrs, gather).await?;

            for candidate in component.candidates() {
                let _ = self.events.send(AgentEvent::CandidateGathered(candidate));
            }

            components.push(component);
        }

        *self.components.lock() = components;
        let _ = self.events.send(AgentEvent::GatheringComplete);

        Ok(())
    }

    pub fn local_candidates(&self, component_id: u8) -> Vec<CandidateInfo> {
        self.components
            .lock()
            .iter()
            .find(|c| c.id == component_id)
            .map(|c| c.candidates())
            .unwrap_or_default()
    }

    /// §4.8 pairing: build pairs between every local candidate (excluding
    /// peer-reflexive locals) and the supplied remote candidates, then add
    /// them to the shared check list.
    pub fn add_remote_candidates(&self, component_id: u8, remotes: Vec<CandidateInfo>) {
        let locals = self.local_candidates(component_id);
        let controlling_is_local = *self.role.lock() == Role::Initiator;

        let mut pairs = Vec::new();

        for local in locals.iter().filter(|l| l.kind != CandidateType::PeerReflexive) {
            for remote in &remotes {
                if local.component_id != remote.component_id {
                    continue;
                }
                if local.address.is_ipv4() != remote.address.is_ipv4() {
                    continue;
                }
                if local.kind == CandidateType::Relayed && remote.address.ip().is_loopback() {
                    continue;
                }

                let mut remote = remote.clone();
                if let SocketAddr::V6(local_v6) = local.address {
                    if local_v6.ip().segments()[0] & 0xffc0 == 0xfe80 {
                        if let SocketAddr::V6(ref mut remote_v6) = remote {
                            remote_v6.set_scope_id(local_v6.scope_id());
                        }
                    }
                }

                pairs.push(CandidatePair::new(local.clone(), remote, controlling_is_local));
            }
        }

        // §3/§4.8: the check list is capped per-component, not session-wide.
        let component_count = self.components.lock().len().max(1);
        self.check_list
            .lock()
            .add_pairs(pairs, self.max_pairs_per_component * component_count);
    }

    /// One 20ms check-scheduling tick (§4.8): select the next pair per the
    /// triggered/waiting/frozen order and run a Binding check against it.
    pub async fn run_check_tick(&self) -> Result<(), Error> {
        let index = {
            let mut list = self.check_list.lock();
            let Some(index) = list.next_pair() else {
                return Ok(());
            };
            list.pairs[index].state = PairState::InProgress;
            index
        };

        let (local, remote, priority, role, is_triggered_for_nominated) = {
            let list = self.check_list.lock();
            let pair = &list.pairs[index];
            let role = match *self.role.lock() {
                Role::Initiator => IceRole::Controlling(self.tiebreaker),
                Role::Responder => IceRole::Controlled(self.tiebreaker),
            };
            (
                pair.local.clone(),
                pair.remote.clone(),
                pair.local.priority,
                role,
                pair.is_triggered_for_nominated,
            )
        };

        let use_candidate = use_candidate_for_check(
            *self.role.lock(),
            self.aggressive_nomination,
            is_triggered_for_nominated,
        );

        let components = self.components.lock();
        let Some(component) = components.iter().find(|c| c.id == local.component_id) else {
            return Ok(());
        };
        let Some(transport) = component.transports().get(local.path as usize) else {
            return Ok(());
        };

        let (local_ufrag, remote_ufrag, local_password) = {
            let local_creds = self.local_credentials.lock().clone().ok_or(Error::Protocol)?;
            let remote_creds = self.remote_credentials.lock().clone().ok_or(Error::Protocol)?;
            (local_creds.ufrag, remote_creds.ufrag, local_creds.password)
        };
        let username = format!("{remote_ufrag}:{local_ufrag}");

        let pool = transport.pool().clone();
        let timers = Timers::default();
        let id = TransactionPool::random_id();

        {
            let mut list = self.check_list.lock();
            if let Some(pair) = list.pairs.get_mut(index) {
                pair.transaction_id = Some(id);
            }
        }

        let request = BindingRequest {
            destination: remote.address,
            username: &username,
            password: local_password.as_bytes(),
            priority,
            role,
            use_candidate,
        };

        let socket_send = {
            let transport = transport.clone();
            let destination = remote.address;
            move |bytes: &[u8]| {
                let transport = transport.clone();
                let bytes = bytes.to_vec();
                tokio::spawn(async move {
                    let _ = transport.send(destination, &bytes).await;
                });
                Ok(())
            }
        };
        drop(components);

        let outcome = stun::binding::check(&pool, &timers, Mode::Udp, id, request, socket_send).await;

        self.on_check_outcome(index, priority, outcome).await
    }

    async fn on_check_outcome(
        &self,
        index: usize,
        local_priority: u32,
        outcome: Result<SocketAddr, stun::Error>,
    ) -> Result<(), Error> {
        match outcome {
            Ok(mapped) => {
                let Some(succeeded_index) = self.resolve_succeeded_pair(index, local_priority, mapped) else {
                    return Ok(());
                };

                let mut list = self.check_list.lock();
                let Some(pair) = list.pairs.get_mut(succeeded_index) else {
                    return Ok(());
                };
                pair.state = PairState::Succeeded;
                pair.is_valid = true;
                let component_id = pair.local.component_id;

                let already_nominated = self.nominated_components.lock().contains(&component_id);
                if pair.is_triggered_for_nominated && !already_nominated {
                    pair.is_nominated = true;
                    drop(list);
                    self.nominated_components.lock().insert(component_id);
                    let _ = self.events.send(AgentEvent::ComponentReady(component_id));
                }

                Ok(())
            }
            Err(stun::Error::Conflict) => {
                // Role conflict: flip role and let the next tick re-issue
                // the check under the new role, per RFC 8445 §7.3.1.1.
                let mut role = self.role.lock();
                *role = match *role {
                    Role::Initiator => Role::Responder,
                    Role::Responder => Role::Initiator,
                };
                let mut list = self.check_list.lock();
                if index < list.pairs.len() {
                    list.pairs[index].state = PairState::Waiting;
                }
                Ok(())
            }
            Err(_) => {
                let mut list = self.check_list.lock();
                if index < list.pairs.len() {
                    list.pairs[index].state = PairState::Failed;

                    let component_id = list.pairs[index].local.component_id;
                    if list.component_exhausted(component_id) {
                        drop(list);
                        self.check_component_failure(component_id).await;
                    }
                }
                Ok(())
            }
        }
    }

    /// §4.7/§4.8 peer-reflexive local discovery: if the MAPPED-ADDRESS in a
    /// successful Binding response doesn't match the pair's local candidate,
    /// derive a peer-reflexive local candidate from it and rebuild the pair
    /// around that candidate instead, reusing an existing rebuilt pair if
    /// one is already in the check list.
    fn resolve_succeeded_pair(&self, index: usize, local_priority: u32, mapped: SocketAddr) -> Option<usize> {
        let (matches_local, component_id, base, network, remote) = {
            let list = self.check_list.lock();
            let pair = list.pairs.get(index)?;
            (
                mapped == pair.local.address,
                pair.local.component_id,
                pair.local.address,
                pair.local.network,
                pair.remote.clone(),
            )
        };

        if matches_local {
            return Some(index);
        }

        let prflx_local = {
            let components = self.components.lock();
            let component = components.iter().find(|c| c.id == component_id)?;
            component.add_peer_reflexive_local(base, mapped, local_priority, network)
        };

        let controlling_is_local = matches!(*self.role.lock(), Role::Initiator);
        let key = (prflx_local.address, prflx_local.component_id, remote.address, remote.component_id);

        let mut list = self.check_list.lock();
        if let Some(existing) = list.find_by_key(key) {
            return Some(existing);
        }

        list.pairs.push(CandidatePair::new(prflx_local, remote, controlling_is_local));
        Some(list.pairs.len() - 1)
    }

    async fn check_component_failure(&self, component_id: u8) {
        if !self.nominated_components.lock().contains(&component_id) {
            let _ = self
                .events
                .send(AgentEvent::Failed(format!("component {component_id} failed")));
        }
    }

    /// Look up the transport a component reaches its peer through on
    /// `path` (0 = direct, 1 = relayed).
    fn transport_for(&self, component_id: u8, path: u8) -> Option<Arc<LocalTransport>> {
        let components = self.components.lock();
        let component = components.iter().find(|c| c.id == component_id)?;
        component.transports().get(path as usize).cloned()
    }

    /// §4.8 *Incoming Binding request*: reply with the mandatory Binding
    /// success response, XOR-MAPPED-ADDRESS set to the request's source,
    /// integrity-protected with the requester's own password.
    async fn reply_binding_success(&self, component_id: u8, path: u8, source: SocketAddr, id: TransactionId) {
        let Some(password) = self.remote_credentials.lock().clone().map(|c| c.password) else {
            return;
        };
        let Some(transport) = self.transport_for(component_id, path) else {
            return;
        };

        let mut buf = BytesMut::with_capacity(64);
        let mut encoder =
            codec::message::MessageEncoder::new(codec::message::methods::BINDING_RESPONSE, &id, &mut buf);
        encoder.append::<codec::message::attributes::XorMappedAddress>(source);

        if encoder.flush(Some(password.as_bytes())).is_err() {
            return;
        }

        let _ = transport.send(source, &buf).await;
    }

    /// Dispatch one classified transport event: an incoming Binding request
    /// is routed to `handle_incoming_binding` (and replied to); everything
    /// else is forwarded through the owning Component unchanged.
    pub async fn handle_transport_event(
        &self,
        component_id: u8,
        event: TransportEvent,
    ) -> Option<(SocketAddr, Path, Vec<u8>)> {
        match event {
            TransportEvent::IncomingBinding { source, id, priority, use_candidate } => {
                self.handle_incoming_binding(component_id, source, id, priority, use_candidate).await;
                None
            }
            other => {
                let components = self.components.lock();
                let component = components.iter().find(|c| c.id == component_id)?;
                component.handle_event(other)
            }
        }
    }

    /// Incoming Binding request handling (§4.8): validate, reply, then run
    /// the triggered-check pairing/promotion rules.
    pub async fn handle_incoming_binding(
        &self,
        component_id: u8,
        source: SocketAddr,
        id: TransactionId,
        remote_priority: u32,
        use_candidate: bool,
    ) {
        let is_responder = matches!(*self.role.lock(), Role::Responder);

        let existing_key = {
            let list = self.check_list.lock();
            list.pairs
                .iter()
                .position(|p| p.remote.address == source && p.local.component_id == component_id)
        };

        let index = match existing_key {
            Some(index) => index,
            None => {
                let components = self.components.lock();
                let Some(component) = components.iter().find(|c| c.id == component_id) else {
                    return;
                };
                let Some(local) = component.candidates().into_iter().next() else {
                    return;
                };
                drop(components);

                let remote = CandidateInfo {
                    priority: remote_priority,
                    ..CandidateInfo::new(
                        CandidateType::PeerReflexive,
                        source,
                        source,
                        component_id,
                        0,
                        None,
                        0,
                    )
                };

                let controlling_is_local = matches!(*self.role.lock(), Role::Initiator);
                let pair = CandidatePair::new(local, remote, controlling_is_local);

                let mut list = self.check_list.lock();
                list.pairs.push(pair);
                list.pairs.len() - 1
            }
        };

        let mut list = self.check_list.lock();
        let Some(pair) = list.pairs.get_mut(index) else {
            return;
        };
        let path = pair.local.path;

        let mut stale_transaction = None;
        match pair.state {
            PairState::Succeeded => {
                let pair_component_id = pair.local.component_id;
                let should_nominate = is_responder && use_candidate && !pair.is_nominated;
                if should_nominate {
                    pair.is_nominated = true;
                }
                drop(list);
                if should_nominate {
                    let newly_nominated = self.nominated_components.lock().insert(pair_component_id);
                    if newly_nominated {
                        let _ = self.events.send(AgentEvent::ComponentReady(pair_component_id));
                    }
                }
            }
            PairState::InProgress => {
                // §4.8 triggered-check semantics: a triggered check on an
                // in-progress pair cancels the stale transaction rather
                // than waiting it out.
                stale_transaction = pair.transaction_id.take();
                pair.state = PairState::Waiting;
                pair.is_triggered_for_nominated = use_candidate && is_responder;
                list.triggered.push_back(index);
                drop(list);
            }
            _ => {
                pair.state = PairState::Waiting;
                pair.is_triggered_for_nominated = use_candidate && is_responder;
                list.triggered.push_back(index);
                drop(list);
            }
        }

        if let Some(stale_id) = stale_transaction {
            if let Some(transport) = self.transport_for(component_id, path) {
                transport.pool().cancel(&stale_id);
            }
        }

        self.reply_binding_success(component_id, path, source, id).await;
    }

    /// Regular nomination: the controlling side promotes one already-valid
    /// pair by sending a second check with USE-CANDIDATE set.
    pub fn nominate(&self, component_id: u8) {
        let mut list = self.check_list.lock();
        let Some(index) = list
            .pairs
            .iter()
            .position(|p| p.local.component_id == component_id && p.is_valid && !p.is_nominated)
        else {
            return;
        };

        list.pairs[index].is_triggered_for_nominated = true;
        list.pairs[index].state = PairState::Waiting;
        list.triggered.push_back(index);
    }

    /// `stop` is idempotent (§5): in-flight transactions are left to drain
    /// and their outcomes ignored; any active TURN allocations are torn
    /// down before the transport sockets close.
    pub async fn stop(&self) {
        self.set_state(AgentState::Stopping);

        for component in self.components.lock().iter() {
            for transport in component.transports() {
                if let Some(client) = transport.turn_client() {
                    let _ = client.allocation.stop().await;
                }
            }
        }

        self.set_state(AgentState::Stopped);
    }

    /// Drive the 20ms check-scheduling tick until every component has
    /// either nominated a pair or exhausted its candidates.
    pub async fn run(&self) -> Result<(), Error> {
        loop {
            self.run_check_tick().await?;

            let components: Vec<u8> = self.components.lock().iter().map(|c| c.id).collect();
            let nominated = self.nominated_components.lock().clone();

            if components.iter().all(|id| nominated.contains(id)) && !components.is_empty() {
                self.set_state(AgentState::Started);
                return Ok(());
            }

            let list = self.check_list.lock();
            let all_exhausted = components
                .iter()
                .all(|id| list.component_exhausted(*id) && !nominated.contains(id));
            drop(list);

            if all_exhausted {
                return Err(Error::Protocol);
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Routes a classified inbound peer datagram to the component that owns
/// its component id, so the caller (the root event loop) doesn't need to
/// know which transport produced it.
pub fn route_peer_datagram(
    components: &[Component],
    component_id: u8,
) -> Option<(&Component, Path)> {
    components.iter().find(|c| c.id == component_id).map(|c| (c, Path::Direct))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(component_id: u8, addr: &str) -> CandidateInfo {
        CandidateInfo::new(CandidateType::Host, addr.parse().unwrap(), addr.parse().unwrap(), component_id, 0, None, 0)
    }

    fn peer_reflexive(component_id: u8, addr: &str) -> CandidateInfo {
        CandidateInfo::new(
            CandidateType::PeerReflexive,
            addr.parse().unwrap(),
            addr.parse().unwrap(),
            component_id,
            0,
            None,
            0,
        )
    }

    fn agent_with_local(candidates: Vec<CandidateInfo>) -> Agent {
        let (agent, _events) = Agent::new(AgentOptions::default());
        agent.components.lock().push(Component::with_candidates(1, candidates));
        agent
    }

    #[test]
    fn add_remote_candidates_pairs_matching_component_ids() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);

        assert_eq!(agent.check_list.lock().pairs.len(), 1);
    }

    #[test]
    fn add_remote_candidates_skips_mismatched_component_ids() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(2, "10.0.0.2:2000")]);

        assert!(agent.check_list.lock().pairs.is_empty());
    }

    #[test]
    fn add_remote_candidates_excludes_local_peer_reflexive_candidates() {
        let agent = agent_with_local(vec![peer_reflexive(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);

        assert!(agent.check_list.lock().pairs.is_empty());
    }

    #[test]
    fn add_remote_candidates_skips_mismatched_ip_families() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(1, "[::1]:2000")]);

        assert!(agent.check_list.lock().pairs.is_empty());
    }

    #[test]
    fn nominate_picks_a_valid_unnominated_pair() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);
        agent.check_list.lock().pairs[0].is_valid = true;

        agent.nominate(1);

        let list = agent.check_list.lock();
        assert!(list.pairs[0].is_triggered_for_nominated);
        assert_eq!(list.triggered.len(), 1);
    }

    #[tokio::test]
    async fn component_ready_fires_once_per_component_on_nomination() {
        let (agent, mut events) = Agent::new(AgentOptions {
            role: Role::Responder,
            ..AgentOptions::default()
        });
        agent.components.lock().push(Component::with_candidates(1, vec![host(1, "10.0.0.1:1000")]));
        let remote: SocketAddr = "10.0.0.2:2000".parse().unwrap();
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);
        agent.check_list.lock().pairs[0].state = PairState::Succeeded;

        agent.handle_incoming_binding(1, remote, TransactionPool::random_id(), 0, true).await;
        agent.handle_incoming_binding(1, remote, TransactionPool::random_id(), 0, true).await;

        let mut ready_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, AgentEvent::ComponentReady(1)) {
                ready_events += 1;
            }
        }
        assert_eq!(ready_events, 1);
    }

    #[test]
    fn use_candidate_for_check_follows_aggressive_or_triggered_nomination() {
        assert!(use_candidate_for_check(Role::Initiator, true, false));
        assert!(use_candidate_for_check(Role::Responder, true, false));
        assert!(use_candidate_for_check(Role::Initiator, false, true));
        assert!(!use_candidate_for_check(Role::Responder, false, true));
        assert!(!use_candidate_for_check(Role::Initiator, false, false));
    }

    #[tokio::test]
    async fn on_check_outcome_marks_the_original_pair_succeeded_when_mapped_address_matches() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);
        let local_priority = agent.check_list.lock().pairs[0].local.priority;
        let matched: SocketAddr = "10.0.0.1:1000".parse().unwrap();

        agent.on_check_outcome(0, local_priority, Ok(matched)).await.unwrap();

        let list = agent.check_list.lock();
        assert_eq!(list.pairs.len(), 1);
        assert_eq!(list.pairs[0].state, PairState::Succeeded);
        assert!(list.pairs[0].is_valid);
    }

    #[tokio::test]
    async fn on_check_outcome_rebuilds_the_pair_around_a_discovered_peer_reflexive_local() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);
        let local_priority = agent.check_list.lock().pairs[0].local.priority;
        let discovered: SocketAddr = "203.0.113.9:5000".parse().unwrap();

        agent.on_check_outcome(0, local_priority, Ok(discovered)).await.unwrap();

        let list = agent.check_list.lock();
        assert_eq!(list.pairs.len(), 2);
        assert_eq!(list.pairs[0].state, PairState::Frozen);
        let rebuilt = &list.pairs[1];
        assert_eq!(rebuilt.local.kind, CandidateType::PeerReflexive);
        assert_eq!(rebuilt.local.address, discovered);
        assert_eq!(rebuilt.local.priority, local_priority);
        assert!(rebuilt.is_valid);
        assert_eq!(rebuilt.state, PairState::Succeeded);
    }

    #[tokio::test]
    async fn handle_incoming_binding_requeues_an_in_progress_pair_and_clears_its_transaction() {
        let agent = agent_with_local(vec![host(1, "10.0.0.1:1000")]);
        let remote: SocketAddr = "10.0.0.2:2000".parse().unwrap();
        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);
        {
            let mut list = agent.check_list.lock();
            list.pairs[0].state = PairState::InProgress;
            list.pairs[0].transaction_id = Some(TransactionPool::random_id());
        }

        agent
            .handle_incoming_binding(1, remote, TransactionPool::random_id(), 0, false)
            .await;

        let list = agent.check_list.lock();
        assert_eq!(list.pairs[0].state, PairState::Waiting);
        assert!(list.pairs[0].transaction_id.is_none());
        assert_eq!(list.triggered.len(), 1);
    }

    #[test]
    fn check_list_cap_scales_with_component_count() {
        let (agent, _events) = Agent::new(AgentOptions {
            max_pairs_per_component: 1,
            ..AgentOptions::default()
        });
        agent.components.lock().push(Component::with_candidates(1, vec![host(1, "10.0.0.1:1000")]));
        agent.components.lock().push(Component::with_candidates(2, vec![host(2, "10.0.0.1:1001")]));

        agent.add_remote_candidates(1, vec![host(1, "10.0.0.2:2000")]);
        agent.add_remote_candidates(2, vec![host(2, "10.0.0.2:2001")]);

        assert_eq!(agent.check_list.lock().pairs.len(), 2);
    }
}
