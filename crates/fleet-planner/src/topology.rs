//! Peer topology — which workers each worker dials at startup.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use fleet_core::config::TopologyConfig;
use fleet_core::{TRACKING_WORKER, TopologyMode, WorkerId};

use crate::error::{PlanError, PlanResult};

static PEER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/ip4/(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})/udp/(\d{1,5})/quic-v1$")
        .expect("valid regex")
});

/// A QUIC peer multiaddress, `/ip4/A.B.C.D/udp/PORT/quic-v1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ip4/{}/udp/{}/quic-v1", self.ip, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidPeerAddress(s.to_string());
        let caps = PEER_RE.captures(s.trim()).ok_or_else(invalid)?;
        let mut octets = [0u8; 4];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = caps[i + 1].parse().map_err(|_| invalid())?;
        }
        let port: u16 = caps[5].parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Self::new(Ipv4Addr::from(octets), port))
    }
}

/// Port a worker listens on: `base_port + id`.
pub fn worker_port(base_port: u16, id: WorkerId) -> Option<u16> {
    u16::try_from(id).ok().and_then(|id| base_port.checked_add(id))
}

/// Peer lists for every worker in `ids`.
///
/// Custom entries that fail validation are dropped with a warning;
/// the rest of that worker's list and every other worker are kept.
pub fn topology(
    mode: TopologyMode,
    ids: &[WorkerId],
    base_port: u16,
    host: Ipv4Addr,
    custom: &BTreeMap<String, Vec<String>>,
) -> BTreeMap<WorkerId, Vec<PeerAddress>> {
    let address_of = |id: WorkerId| match worker_port(base_port, id) {
        Some(port) => Some(PeerAddress::new(host, port)),
        None => {
            warn!(worker = id, base_port, "worker port out of range, peer skipped");
            None
        }
    };

    ids.iter()
        .map(|&id| {
            let peers: Vec<PeerAddress> = match mode {
                TopologyMode::None => Vec::new(),
                TopologyMode::Central if id == TRACKING_WORKER => Vec::new(),
                TopologyMode::Central => address_of(TRACKING_WORKER).into_iter().collect(),
                TopologyMode::Mesh => ids
                    .iter()
                    .filter(|&&other| other != id)
                    .filter_map(|&other| address_of(other))
                    .collect(),
                TopologyMode::Custom => custom
                    .get(&id.to_string())
                    .map(|entries| parse_custom(id, entries))
                    .unwrap_or_default(),
            };
            (id, peers)
        })
        .collect()
}

/// Topology for `ids` as the config describes it.
pub fn topology_from_config(
    cfg: &TopologyConfig,
    ids: &[WorkerId],
) -> PlanResult<BTreeMap<WorkerId, Vec<PeerAddress>>> {
    let host: Ipv4Addr = cfg
        .host
        .parse()
        .map_err(|_| PlanError::InvalidPeerAddress(cfg.host.clone()))?;
    Ok(topology(cfg.mode, ids, cfg.base_port, host, &cfg.custom))
}

fn parse_custom(id: WorkerId, entries: &[String]) -> Vec<PeerAddress> {
    let mut seen = BTreeSet::new();
    entries
        .iter()
        .filter_map(|raw| match raw.parse::<PeerAddress>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(worker = id, error = %e, "peer entry dropped");
                None
            }
        })
        .filter(|addr| seen.insert(*addr))
        .collect()
}
