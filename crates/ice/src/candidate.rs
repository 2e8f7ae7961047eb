use std::net::SocketAddr;

use rand::Rng;
use stun::transaction::TransactionId;

/// RFC 8445 candidate kinds, in descending type-preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateType {
    Host,
    PeerReflexive,
    ServerReflexive,
    Relayed,
}

impl CandidateType {
    fn type_preference(self) -> u32 {
        match self {
            CandidateType::Host => 126,
            CandidateType::PeerReflexive => 110,
            CandidateType::ServerReflexive => 100,
            CandidateType::Relayed => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CandidateType::Host => "host",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::Relayed => "relay",
        }
    }
}

/// `(2^24 * type-pref) + (2^8 * local-pref) + (256 - component-id)`.
///
/// ```
/// use ice_agent_ice::candidate::{candidate_priority, CandidateType};
///
/// let host = candidate_priority(CandidateType::Host, 65535, 1);
/// let relayed = candidate_priority(CandidateType::Relayed, 65535, 1);
/// assert!(host > relayed);
/// ```
pub fn candidate_priority(kind: CandidateType, local_pref: u32, component_id: u8) -> u32 {
    (1 << 24) * kind.type_preference() + (1 << 8) * local_pref + (256 - component_id as u32)
}

/// `local-pref = max_local_pref - 2 * network_index`, the tie-breaking rule
/// used when several local candidates of the same type compete on
/// different interfaces (e.g. a host candidate on eth0 vs. one on wlan0).
///
/// ```
/// use ice_agent_ice::candidate::local_preference;
///
/// assert!(local_preference(0) > local_preference(1));
/// ```
pub fn local_preference(network_index: u32) -> u32 {
    const MAX_LOCAL_PREF: u32 = 65535;
    MAX_LOCAL_PREF.saturating_sub(2 * network_index)
}

/// `2^32 * min(G,D) + 2 * max(G,D) + (G>D ? 1 : 0)`.
///
/// ```
/// use ice_agent_ice::candidate::pair_priority;
///
/// assert_eq!(pair_priority(10, 10), (1u64 << 32) * 10 + 20);
/// assert_eq!(pair_priority(20, 10), (1u64 << 32) * 10 + 40 + 1);
/// ```
pub fn pair_priority(controlling_priority: u32, controlled_priority: u32) -> u64 {
    let g = controlling_priority as u64;
    let d = controlled_priority as u64;
    (1u64 << 32) * g.min(d) + 2 * g.max(d) + if g > d { 1 } else { 0 }
}

fn random_id(len: usize) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Two candidates share a foundation iff they have the same type, base IP,
/// STUN/TURN server IP used to obtain them, and transport protocol. `server`
/// is `None` for host candidates.
///
/// ```
/// use ice_agent_ice::candidate::{foundation, CandidateType};
///
/// let a: std::net::SocketAddr = "192.0.2.1:4000".parse().unwrap();
/// let b: std::net::SocketAddr = "192.0.2.1:5000".parse().unwrap();
/// assert_eq!(foundation(CandidateType::Host, a, None), foundation(CandidateType::Host, b, None));
/// ```
pub fn foundation(kind: CandidateType, base: SocketAddr, server: Option<SocketAddr>) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = ahash::AHasher::default();
    kind.as_str().hash(&mut hasher);
    base.ip().hash(&mut hasher);
    server.map(|s| s.ip()).hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// One transport address a Component has gathered, owned by the Component
/// that produced it.
#[derive(Debug, Clone)]
pub struct CandidateInfo {
    pub id: String,
    pub kind: CandidateType,
    pub address: SocketAddr,
    pub base: SocketAddr,
    pub component_id: u8,
    pub priority: u32,
    pub foundation: String,
    pub network: u32,
    /// Index into the owning Component's transport list; `0` = direct
    /// (this candidate's own Local Transport), `1` = relayed (path via the
    /// TURN client embedded in that transport).
    pub path: u8,
}

impl CandidateInfo {
    pub fn new(
        kind: CandidateType,
        address: SocketAddr,
        base: SocketAddr,
        component_id: u8,
        network: u32,
        server: Option<SocketAddr>,
        path: u8,
    ) -> Self {
        let priority = candidate_priority(kind, local_preference(network), component_id);

        Self {
            id: random_id(10),
            kind,
            address,
            base,
            component_id,
            priority,
            foundation: foundation(kind, base, server),
            network,
            path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Frozen,
    Waiting,
    InProgress,
    Succeeded,
    Failed,
}

/// A `(local, remote)` candidate pair, owned by the session's Check List.
pub struct CandidatePair {
    pub local: CandidateInfo,
    pub remote: CandidateInfo,
    pub priority: u64,
    pub state: PairState,
    pub foundation: String,
    pub is_valid: bool,
    pub is_nominated: bool,
    pub is_triggered_for_nominated: bool,
    /// The in-flight Binding check's transaction id, if one is running;
    /// lets a triggered check cancel it instead of waiting it out.
    pub transaction_id: Option<TransactionId>,
}

impl CandidatePair {
    pub fn new(local: CandidateInfo, remote: CandidateInfo, controlling_is_local: bool) -> Self {
        let priority = if controlling_is_local {
            pair_priority(local.priority, remote.priority)
        } else {
            pair_priority(remote.priority, local.priority)
        };

        let foundation = format!("{}:{}", local.foundation, remote.foundation);

        Self {
            local,
            remote,
            priority,
            state: PairState::Frozen,
            foundation,
            is_valid: false,
            is_nominated: false,
            is_triggered_for_nominated: false,
            transaction_id: None,
        }
    }

    /// The `(local.address, local.component-id, remote.address,
    /// remote.component-id)` tuple pairs are deduplicated on.
    pub fn key(&self) -> (SocketAddr, u8, SocketAddr, u8) {
        (
            self.local.address,
            self.local.component_id,
            self.remote.address,
            self.remote.component_id,
        )
    }
}

/// Priority-sorted sequence of pairs plus the triggered-check FIFO, shared
/// across an entire session rather than kept per component.
#[derive(Default)]
pub struct CheckList {
    pub pairs: Vec<CandidatePair>,
    pub triggered: std::collections::VecDeque<usize>,
}

impl CheckList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add pairs, then sort, rewrite server-reflexive locals to their base,
    /// dedup, and truncate to `max_pairs` per RFC 8445 §6.1.2.
    pub fn add_pairs(&mut self, mut pairs: Vec<CandidatePair>, max_pairs: usize) {
        self.pairs.append(&mut pairs);

        self.pairs
            .sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.local.component_id.cmp(&b.local.component_id))
            });

        for pair in &mut self.pairs {
            if pair.local.kind == CandidateType::ServerReflexive {
                pair.local.address = pair.local.base;
            }
        }

        let mut seen = ahash::AHashSet::default();
        self.pairs.retain(|pair| seen.insert(pair.key()));
        self.pairs.truncate(max_pairs);
    }

    pub fn find_by_key(
        &self,
        key: (SocketAddr, u8, SocketAddr, u8),
    ) -> Option<usize> {
        self.pairs.iter().position(|p| p.key() == key)
    }

    /// §4.8 check scheduling: triggered first, then waiting, then the
    /// highest-priority frozen pair.
    pub fn next_pair(&mut self) -> Option<usize> {
        if let Some(index) = self.triggered.pop_front() {
            return Some(index);
        }

        if let Some(index) = self
            .pairs
            .iter()
            .position(|p| p.state == PairState::Waiting)
        {
            return Some(index);
        }

        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == PairState::Frozen)
            .max_by_key(|(_, p)| p.priority)
            .map(|(i, _)| i)
    }

    pub fn valid_pairs(&self) -> impl Iterator<Item = &CandidatePair> {
        self.pairs.iter().filter(|p| p.is_valid)
    }

    /// A component has failed only once both sides signalled end-of-
    /// gathering and no pair for it remains schedulable.
    pub fn component_exhausted(&self, component_id: u8) -> bool {
        !self.pairs.iter().any(|p| {
            p.local.component_id == component_id
                && matches!(
                    p.state,
                    PairState::Waiting | PairState::InProgress | PairState::Frozen
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(component_id: u8, addr: &str) -> CandidateInfo {
        CandidateInfo::new(
            CandidateType::Host,
            addr.parse().unwrap(),
            addr.parse().unwrap(),
            component_id,
            0,
            None,
            0,
        )
    }

    #[test]
    fn add_pairs_dedups_equal_keys() {
        let mut list = CheckList::new();
        let local = candidate(1, "10.0.0.1:1000");
        let remote = candidate(1, "10.0.0.2:2000");

        let first = CandidatePair::new(local.clone(), remote.clone(), true);
        let duplicate = CandidatePair::new(local, remote, true);

        list.add_pairs(vec![first, duplicate], 100);
        assert_eq!(list.pairs.len(), 1);
    }

    #[test]
    fn add_pairs_truncates_to_max() {
        let mut list = CheckList::new();
        let pairs: Vec<_> = (0..5)
            .map(|i| {
                let local = candidate(1, &format!("10.0.0.1:{}", 1000 + i));
                let remote = candidate(1, "10.0.0.2:2000");
                CandidatePair::new(local, remote, true)
            })
            .collect();

        list.add_pairs(pairs, 3);
        assert_eq!(list.pairs.len(), 3);
    }

    #[test]
    fn add_pairs_rewrites_server_reflexive_local_to_base() {
        let mut list = CheckList::new();
        let base: SocketAddr = "10.0.0.1:1000".parse().unwrap();
        let reflexive: SocketAddr = "203.0.113.5:40000".parse().unwrap();
        let mut local = candidate(1, "10.0.0.1:1000");
        local.kind = CandidateType::ServerReflexive;
        local.address = reflexive;
        local.base = base;
        let remote = candidate(1, "10.0.0.2:2000");

        list.add_pairs(vec![CandidatePair::new(local, remote, true)], 100);
        assert_eq!(list.pairs[0].local.address, base);
    }

    #[test]
    fn next_pair_prefers_triggered_over_waiting_and_frozen() {
        let mut list = CheckList::new();
        let low = CandidatePair::new(candidate(1, "10.0.0.1:1000"), candidate(1, "10.0.0.2:2000"), true);
        let mut high = CandidatePair::new(candidate(1, "10.0.0.1:1001"), candidate(1, "10.0.0.2:2001"), true);
        high.state = PairState::Waiting;

        list.add_pairs(vec![low, high], 100);
        list.triggered.push_back(0);

        let next = list.next_pair().unwrap();
        assert_eq!(next, 0);
    }

    #[test]
    fn component_exhausted_is_false_while_a_pair_is_schedulable() {
        let mut list = CheckList::new();
        let pair = CandidatePair::new(candidate(1, "10.0.0.1:1000"), candidate(1, "10.0.0.2:2000"), true);
        list.add_pairs(vec![pair], 100);

        assert!(!list.component_exhausted(1));
        assert!(list.component_exhausted(2));
    }
}
